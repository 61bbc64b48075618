//! 引擎字符串编码
//!
//! 引擎内部以 CESU-8 保存字符串：BMP 以外的字符由脚本产生时
//! 是一对各占 3 字节的代理项。读取时把成对的代理项合并为 UTF-8，
//! 写入时把 BMP 以外的字符拆成代理项，脚本里的 `length` 因此与 UTF-16 一致。

use std::borrow::Cow;
use std::str::{self, Utf8Error};

/// 3 字节编码的代理项，`lead` 为第二字节的高四位（高位 0xA0，低位 0xB0）
fn surrogate(bytes: &[u8], lead: u8) -> Option<u32> {
    match *bytes {
        [0xed, b1, b2, ..] if b1 & 0xf0 == lead && b2 & 0xc0 == 0x80 => {
            Some(0xd000 | (u32::from(b1 & 0x3f) << 6) | u32::from(b2 & 0x3f))
        }
        _ => None,
    }
}

/// 引擎字节转换为 `str`，孤立的代理项仍然是错误
pub(crate) fn decode(bytes: &[u8]) -> Result<Cow<'_, str>, Utf8Error> {
    if let Ok(text) = str::from_utf8(bytes) {
        return Ok(Cow::Borrowed(text));
    }

    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let high = surrogate(&bytes[i..], 0xa0);
        let low = bytes.get(i + 3..).and_then(|rest| surrogate(rest, 0xb0));
        match (high, low) {
            (Some(high), Some(low)) => {
                let code = 0x10000 + ((high - 0xd800) << 10) + (low - 0xdc00);
                let c = char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER);
                out.extend_from_slice(c.encode_utf8(&mut [0; 4]).as_bytes());
                i += 6;
            }
            _ => {
                out.push(bytes[i]);
                i += 1;
            }
        }
    }
    String::from_utf8(out)
        .map(Cow::Owned)
        .map_err(|e| e.utf8_error())
}

/// `str` 转换为引擎字节
pub(crate) fn encode(text: &str) -> Cow<'_, [u8]> {
    if text.chars().all(|c| u32::from(c) < 0x10000) {
        return Cow::Borrowed(text.as_bytes());
    }

    let mut out = Vec::with_capacity(text.len() + 8);
    for c in text.chars() {
        if u32::from(c) < 0x10000 {
            out.extend_from_slice(c.encode_utf8(&mut [0; 4]).as_bytes());
            continue;
        }
        for unit in c.encode_utf16(&mut [0; 2]) {
            let unit = *unit;
            out.extend_from_slice(&[
                0xe0 | (unit >> 12) as u8,
                0x80 | ((unit >> 6) & 0x3f) as u8,
                0x80 | (unit & 0x3f) as u8,
            ]);
        }
    }
    Cow::Owned(out)
}
