//! In-process stand-in for the Duktape shared library
//!
//! Implements every entry point of `DukApi` in Rust so the marshaling layer
//! can be exercised without a native engine. The value stack, call frames,
//! objects, enumerators and the heap stash behave like Duktape's for the
//! subset the bridge uses. `eval` understands a tiny language:
//!
//! - a JSON literal, or `undefined`
//! - a global reference: `double`
//! - a global call whose arguments are JSON literals or global references:
//!   `apply(add, 2, [3])`
//! - `throw <json>`
//!
//! Built-in globals: `double`, `boom`, `echo`, `list`, `apply`,
//! `makeAdder`, `gc`, `pointer`, `badString`, `grin`, `cyclic`, `inherit`.
//! `gc()` frees every object not reachable from the globals, the stash or
//! the value stack. `inherit(f)` returns a new doubling function whose
//! prototype is `f`.
//!
//! Like Duktape, property primitives throw instead of returning failure:
//! assigning the global `readonly` and reading any property of the global
//! `trapped` raise an error. A throw lands in the innermost `duk_safe_call`;
//! one raised with no safe call between it and the engine entry would
//! abort the process or unwind across native frames on the real engine,
//! so it is counted in `escaped_throws()` and otherwise ignored.

#![allow(dead_code)]

use duktape_bridge::bindings::ffi::*;
use duktape_bridge::{DukApi, Interpreter, Lib};
use std::cell::{Cell, RefCell, RefMut};
use std::ffi::CString;
use std::os::raw::{c_char, c_void};
use std::slice;
use std::sync::Arc;

const GLOBAL_ID: usize = 0;
const STASH_ID: usize = 1;

thread_local! {
    static LIVE_HEAPS: Cell<usize> = const { Cell::new(0) };
    static ESCAPED_THROWS: Cell<usize> = const { Cell::new(0) };
}

/// Heaps created and not yet destroyed on this thread
pub fn live_heaps() -> usize {
    LIVE_HEAPS.with(Cell::get)
}

/// Errors thrown by an API primitive outside any `duk_safe_call`
pub fn escaped_throws() -> usize {
    ESCAPED_THROWS.with(Cell::get)
}

/// Binding backed by the fake engine
pub fn fake_lib() -> Arc<Lib> {
    Arc::new(unsafe { Lib::from_api(api()) })
}

/// Interpreter on a fresh fake heap
pub fn interpreter() -> Interpreter {
    Interpreter::with_lib(fake_lib()).expect("fake heap creation never fails")
}

#[derive(Clone, Debug)]
enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(Vec<u8>),
    Object(usize),
    Pointer(usize),
}

#[derive(Clone, Copy, Debug)]
enum Builtin {
    Double,
    Boom,
    Echo,
    List,
    Apply,
    MakeAdder,
    Adder(f64),
    Gc,
    Pointer,
    BadString,
    Grin,
    Cyclic,
    Inherit,
}

#[derive(Clone, Copy)]
enum FnKind {
    Native(duk_c_function),
    Builtin(Builtin),
}

enum Kind {
    Plain,
    Array(Vec<Value>),
    Function(FnKind),
    Error,
    Enumerator {
        keys: Vec<Vec<u8>>,
        target: usize,
        pos: usize,
    },
}

struct Object {
    kind: Kind,
    props: Vec<(Vec<u8>, Value)>,
    proto: Option<usize>,
    // Every property read throws, like a getter that always fails
    trap: bool,
}

impl Object {
    fn new(kind: Kind) -> Self {
        Self {
            kind,
            props: Vec::new(),
            proto: None,
            trap: false,
        }
    }

    fn get(&self, key: &[u8]) -> Option<&Value> {
        if let Kind::Array(items) = &self.kind {
            if let Some(i) = array_index(key) {
                return items.get(i);
            }
        }
        self.props.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    fn put(&mut self, key: &[u8], value: Value) {
        if let Kind::Array(items) = &mut self.kind {
            if let Some(i) = array_index(key) {
                if i >= items.len() {
                    items.resize(i + 1, Value::Undefined);
                }
                items[i] = value;
                return;
            }
        }
        match self.props.iter_mut().find(|(k, _)| k == key) {
            Some((_, slot)) => *slot = value,
            None => self.props.push((key.to_vec(), value)),
        }
    }
}

fn array_index(key: &[u8]) -> Option<usize> {
    std::str::from_utf8(key).ok()?.parse().ok()
}

struct Frame {
    base: usize,
    callee: usize,
}

/// Innermost construct a thrown error would reach
#[derive(Clone, Copy, PartialEq)]
enum Scope {
    SafeCall,
    Native,
}

struct State {
    stack: Vec<Value>,
    frames: Vec<Frame>,
    objects: Vec<Option<Object>>,
    scopes: Vec<Scope>,
    // Error thrown inside the running safe call
    pending: Option<Value>,
    // Keeps strings handed out by `duk_safe_to_stacktrace` alive
    cstrings: Vec<CString>,
}

impl State {
    fn new() -> Self {
        let mut state = Self {
            stack: Vec::new(),
            frames: Vec::new(),
            objects: Vec::new(),
            scopes: Vec::new(),
            pending: None,
            cstrings: Vec::new(),
        };
        state.alloc(Kind::Plain);
        state.alloc(Kind::Plain);

        let builtins = [
            ("double", Builtin::Double),
            ("boom", Builtin::Boom),
            ("echo", Builtin::Echo),
            ("list", Builtin::List),
            ("apply", Builtin::Apply),
            ("makeAdder", Builtin::MakeAdder),
            ("gc", Builtin::Gc),
            ("pointer", Builtin::Pointer),
            ("badString", Builtin::BadString),
            ("grin", Builtin::Grin),
            ("cyclic", Builtin::Cyclic),
            ("inherit", Builtin::Inherit),
        ];
        for (name, builtin) in builtins {
            let id = state.alloc(Kind::Function(FnKind::Builtin(builtin)));
            state.object_mut(GLOBAL_ID).put(name.as_bytes(), Value::Object(id));
        }

        let trapped = state.alloc(Kind::Plain);
        let obj = state.object_mut(trapped);
        obj.put(b"a", Value::Number(1.0));
        obj.trap = true;
        state.object_mut(GLOBAL_ID).put(b"trapped", Value::Object(trapped));
        state
    }

    /// Raise an error from an API primitive
    fn throw(&mut self, name: &str, message: &str) {
        let err = self.error(name, message);
        if self.scopes.last() == Some(&Scope::SafeCall) {
            self.pending.get_or_insert(err);
        } else {
            ESCAPED_THROWS.with(|n| n.set(n.get() + 1));
        }
    }

    /// Property read through the prototype chain, `Err` when it throws
    fn lookup(&self, id: usize, key: &[u8]) -> Result<Option<Value>, ()> {
        let mut current = Some(id);
        while let Some(id) = current {
            let obj = self.object(id);
            if obj.trap {
                return Err(());
            }
            if let Some(value) = obj.get(key) {
                return Ok(Some(value.clone()));
            }
            current = obj.proto;
        }
        Ok(None)
    }

    fn alloc(&mut self, kind: Kind) -> usize {
        self.objects.push(Some(Object::new(kind)));
        self.objects.len() - 1
    }

    fn object(&self, id: usize) -> &Object {
        self.objects[id].as_ref().expect("object freed")
    }

    fn object_mut(&mut self, id: usize) -> &mut Object {
        self.objects[id].as_mut().expect("object freed")
    }

    fn live(&self, id: usize) -> bool {
        matches!(self.objects.get(id), Some(Some(_)))
    }

    fn error(&mut self, name: &str, message: &str) -> Value {
        let id = self.alloc(Kind::Error);
        let obj = self.object_mut(id);
        obj.put(b"name", Value::Str(name.as_bytes().to_vec()));
        obj.put(b"message", Value::Str(message.as_bytes().to_vec()));
        Value::Object(id)
    }

    fn base(&self) -> usize {
        self.frames.last().map_or(0, |f| f.base)
    }

    fn abs(&self, idx: duk_idx_t) -> Option<usize> {
        let len = self.stack.len();
        let base = self.base();
        let pos = if idx < 0 {
            len.checked_sub(idx.unsigned_abs() as usize)?
        } else {
            base + idx as usize
        };
        (pos >= base && pos < len).then_some(pos)
    }

    fn get(&self, idx: duk_idx_t) -> Option<&Value> {
        self.abs(idx).map(|pos| &self.stack[pos])
    }

    fn object_at(&self, idx: duk_idx_t) -> Option<usize> {
        match self.get(idx) {
            Some(Value::Object(id)) => Some(*id),
            _ => None,
        }
    }

    fn push(&mut self, value: Value) -> duk_idx_t {
        self.stack.push(value);
        (self.stack.len() - 1 - self.base()) as duk_idx_t
    }

    fn pop(&mut self) -> Value {
        if self.stack.len() > self.base() {
            self.stack.pop().unwrap_or(Value::Undefined)
        } else {
            Value::Undefined
        }
    }

    fn from_json(&mut self, json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::Str(s.as_bytes().to_vec()),
            serde_json::Value::Array(items) => {
                let items = items.iter().map(|item| self.from_json(item)).collect();
                Value::Object(self.alloc(Kind::Array(items)))
            }
            serde_json::Value::Object(map) => {
                let id = self.alloc(Kind::Plain);
                for (key, item) in map {
                    let value = self.from_json(item);
                    self.object_mut(id).put(key.as_bytes(), value);
                }
                Value::Object(id)
            }
        }
    }

    fn to_display(&self, value: &Value) -> String {
        match value {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::Str(s) => String::from_utf8_lossy(s).into_owned(),
            Value::Pointer(p) => format!("{:#x}", p),
            Value::Object(id) if self.live(*id) => {
                let obj = self.object(*id);
                match obj.kind {
                    Kind::Error => {
                        let field = |key: &[u8]| {
                            obj.get(key)
                                .map(|v| self.to_display(v))
                                .unwrap_or_default()
                        };
                        format!("{}: {}\n    at fake (eval:1)", field(b"name"), field(b"message"))
                    }
                    Kind::Function(_) => "function () { [native code] }".to_string(),
                    _ => "[object Object]".to_string(),
                }
            }
            Value::Object(_) => "[object Dead]".to_string(),
        }
    }

    fn collect_garbage(&mut self) {
        let mut marked = vec![false; self.objects.len()];
        let mut work = vec![GLOBAL_ID, STASH_ID];
        work.extend(self.frames.iter().map(|f| f.callee));
        work.extend(self.stack.iter().filter_map(|v| match v {
            Value::Object(id) => Some(*id),
            _ => None,
        }));

        while let Some(id) = work.pop() {
            if marked[id] || !self.live(id) {
                continue;
            }
            marked[id] = true;
            let obj = self.object(id);
            work.extend(obj.proto);
            let mut refs: Vec<&Value> = obj.props.iter().map(|(_, v)| v).collect();
            match &obj.kind {
                Kind::Array(items) => refs.extend(items.iter()),
                Kind::Enumerator { target, .. } => work.push(*target),
                _ => {}
            }
            work.extend(refs.into_iter().filter_map(|v| match v {
                Value::Object(id) => Some(*id),
                _ => None,
            }));
        }

        for (id, slot) in self.objects.iter_mut().enumerate() {
            if !marked[id] {
                *slot = None;
            }
        }
    }
}

unsafe fn state<'a>(ctx: *mut duk_context) -> RefMut<'a, State> {
    (*ctx.cast::<RefCell<State>>().cast_const()).borrow_mut()
}

unsafe fn bytes<'a>(ptr: *const c_char, len: duk_size_t) -> &'a [u8] {
    if len == 0 {
        &[]
    } else {
        slice::from_raw_parts(ptr.cast(), len)
    }
}

fn heapptr(id: usize) -> *mut c_void {
    ((id + 1) * 16) as *mut c_void
}

fn heap_id(ptr: *mut c_void) -> Option<usize> {
    (ptr as usize / 16).checked_sub(1)
}

/// Call the function below `nargs` arguments; the function and arguments
/// are replaced by the result or the thrown value.
unsafe fn call_value(ctx: *mut duk_context, nargs: usize) -> bool {
    let (func_pos, target) = {
        let mut st = state(ctx);
        let Some(func_pos) = st.stack.len().checked_sub(nargs + 1) else {
            let err = st.error("RangeError", "invalid call");
            st.push(err);
            return false;
        };
        let target = match st.stack[func_pos] {
            Value::Object(id) if st.live(id) => match st.object(id).kind {
                Kind::Function(kind) => Some((id, kind)),
                _ => None,
            },
            _ => None,
        };
        (func_pos, target)
    };

    let outcome = match target {
        None => {
            let mut st = state(ctx);
            Err(st.error("TypeError", "not callable"))
        }
        Some((_, FnKind::Builtin(builtin))) => {
            let args = state(ctx).stack[func_pos + 1..].to_vec();
            run_builtin(ctx, builtin, args)
        }
        Some((id, FnKind::Native(func))) => {
            {
                let mut st = state(ctx);
                st.frames.push(Frame {
                    base: func_pos + 1,
                    callee: id,
                });
                st.scopes.push(Scope::Native);
            }
            let rc = func(ctx);
            let mut st = state(ctx);
            st.scopes.pop();
            let frame = st.frames.pop().expect("frame pushed above");
            if rc > 0 {
                if st.stack.len() > frame.base {
                    Ok(st.stack[st.stack.len() - 1].clone())
                } else {
                    Ok(Value::Undefined)
                }
            } else if rc == 0 {
                Ok(Value::Undefined)
            } else {
                Err(st.error("Error", &format!("error (rc {})", rc)))
            }
        }
    };

    let mut st = state(ctx);
    st.stack.truncate(func_pos);
    match outcome {
        Ok(value) => {
            st.stack.push(value);
            true
        }
        Err(thrown) => {
            st.stack.push(thrown);
            false
        }
    }
}

unsafe fn run_builtin(ctx: *mut duk_context, builtin: Builtin, args: Vec<Value>) -> Result<Value, Value> {
    let arg = |i: usize| args.get(i).cloned().unwrap_or(Value::Undefined);
    match builtin {
        Builtin::Double => match arg(0) {
            Value::Number(n) => Ok(Value::Number(n * 2.0)),
            _ => Err(state(ctx).error("TypeError", "double expects a number")),
        },
        Builtin::Adder(k) => match arg(0) {
            Value::Number(n) => Ok(Value::Number(n + k)),
            _ => Err(state(ctx).error("TypeError", "adder expects a number")),
        },
        Builtin::Boom => Err(state(ctx).error("Error", "boom")),
        Builtin::Echo => Ok(arg(0)),
        Builtin::List => Ok(Value::Object(state(ctx).alloc(Kind::Array(args.clone())))),
        Builtin::Apply => {
            {
                let mut st = state(ctx);
                for value in &args {
                    st.stack.push(value.clone());
                }
                if args.is_empty() {
                    st.stack.push(Value::Undefined);
                }
            }
            let ok = call_value(ctx, args.len().saturating_sub(1));
            let result = state(ctx).stack.pop().unwrap_or(Value::Undefined);
            if ok {
                Ok(result)
            } else {
                Err(result)
            }
        }
        Builtin::MakeAdder => match arg(0) {
            Value::Number(k) => {
                let id = state(ctx).alloc(Kind::Function(FnKind::Builtin(Builtin::Adder(k))));
                Ok(Value::Object(id))
            }
            _ => Err(state(ctx).error("TypeError", "makeAdder expects a number")),
        },
        Builtin::Gc => {
            state(ctx).collect_garbage();
            Ok(Value::Undefined)
        }
        Builtin::Pointer => Ok(Value::Pointer(0xdead)),
        // CESU-8 encoded lone surrogate U+D800
        Builtin::BadString => Ok(Value::Str(vec![0xed, 0xa0, 0x80])),
        // U+1F600 as a CESU-8 surrogate pair
        Builtin::Grin => Ok(Value::Str(vec![0xed, 0xa0, 0xbd, 0xed, 0xb8, 0x80])),
        Builtin::Inherit => {
            let mut st = state(ctx);
            let proto = match arg(0) {
                Value::Object(id) => Some(id),
                _ => None,
            };
            let id = st.alloc(Kind::Function(FnKind::Builtin(Builtin::Double)));
            st.object_mut(id).proto = proto;
            Ok(Value::Object(id))
        }
        Builtin::Cyclic => {
            let mut st = state(ctx);
            let id = st.alloc(Kind::Plain);
            st.object_mut(id).put(b"self", Value::Object(id));
            Ok(Value::Object(id))
        }
    }
}

// Mini evaluator

enum Expr {
    Literal(serde_json::Value),
    Undefined,
    Global(String),
    Call(String, Vec<Expr>),
    Throw(serde_json::Value),
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn parse_operand(src: &str) -> Option<Expr> {
    let src = src.trim();
    if src == "undefined" {
        return Some(Expr::Undefined);
    }
    if let Ok(json) = serde_json::from_str(src) {
        return Some(Expr::Literal(json));
    }
    is_ident(src).then(|| Expr::Global(src.to_string()))
}

/// Split call arguments on top-level commas
fn split_args(src: &str) -> Option<Vec<&str>> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    let mut start = 0;
    for (i, c) in src.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '[' | '{' | '(' => depth += 1,
            ']' | '}' | ')' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&src[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        if depth < 0 {
            return None;
        }
    }
    if depth != 0 || in_string {
        return None;
    }
    let last = &src[start..];
    if !(parts.is_empty() && last.trim().is_empty()) {
        parts.push(last);
    }
    Some(parts)
}

fn parse(src: &str) -> Option<Expr> {
    let src = src.trim().trim_end_matches(';').trim();
    if let Some(rest) = src.strip_prefix("throw ") {
        return serde_json::from_str(rest.trim()).ok().map(Expr::Throw);
    }
    if let Some(expr) = parse_operand(src) {
        return Some(expr);
    }
    if let Some(open) = src.find('(') {
        let name = src[..open].trim();
        let inner = src[open + 1..].strip_suffix(')')?;
        if !is_ident(name) {
            return None;
        }
        let args = split_args(inner)?
            .into_iter()
            .map(parse_operand)
            .collect::<Option<Vec<_>>>()?;
        return Some(Expr::Call(name.to_string(), args));
    }
    None
}

/// Push the value of an operand, `Err` with the thrown value pushed instead
fn operand(st: &mut State, expr: &Expr) -> Result<Value, Value> {
    match expr {
        Expr::Literal(json) => Ok(st.from_json(json)),
        Expr::Undefined => Ok(Value::Undefined),
        Expr::Global(name) => st
            .object(GLOBAL_ID)
            .get(name.as_bytes())
            .cloned()
            .ok_or_else(|| st.error("ReferenceError", &format!("identifier '{}' undefined", name))),
        Expr::Call(..) | Expr::Throw(_) => Err(st.error("SyntaxError", "nested expression")),
    }
}

unsafe fn evaluate(ctx: *mut duk_context, expr: Expr) -> bool {
    match expr {
        Expr::Throw(json) => {
            let mut st = state(ctx);
            let value = st.from_json(&json);
            st.stack.push(value);
            false
        }
        Expr::Call(name, args) => {
            let pushed = {
                let mut st = state(ctx);
                let mut values = Vec::with_capacity(args.len() + 1);
                let mut failure = None;
                for expr in std::iter::once(&Expr::Global(name)).chain(args.iter()) {
                    match operand(&mut st, expr) {
                        Ok(value) => values.push(value),
                        Err(thrown) => {
                            failure = Some(thrown);
                            break;
                        }
                    }
                }
                match failure {
                    Some(thrown) => {
                        st.stack.push(thrown);
                        false
                    }
                    None => {
                        st.stack.extend(values);
                        true
                    }
                }
            };
            pushed && call_value(ctx, args.len())
        }
        other => {
            let mut st = state(ctx);
            match operand(&mut st, &other) {
                Ok(value) => {
                    st.stack.push(value);
                    true
                }
                Err(thrown) => {
                    st.stack.push(thrown);
                    false
                }
            }
        }
    }
}

// Entry points

unsafe extern "C" fn create_heap(
    _alloc: Option<duk_alloc_function>,
    _realloc: Option<duk_realloc_function>,
    _free: Option<duk_free_function>,
    _udata: *mut c_void,
    _fatal: Option<duk_fatal_function>,
) -> *mut duk_context {
    LIVE_HEAPS.with(|n| n.set(n.get() + 1));
    Box::into_raw(Box::new(RefCell::new(State::new()))).cast()
}

unsafe extern "C" fn destroy_heap(ctx: *mut duk_context) {
    drop(Box::from_raw(ctx.cast::<RefCell<State>>()));
    LIVE_HEAPS.with(|n| n.set(n.get() - 1));
}

unsafe extern "C" fn get_top(ctx: *mut duk_context) -> duk_idx_t {
    let st = state(ctx);
    (st.stack.len() - st.base()) as duk_idx_t
}

unsafe extern "C" fn set_top(ctx: *mut duk_context, idx: duk_idx_t) {
    let mut st = state(ctx);
    let len = st.base() + idx.max(0) as usize;
    st.stack.resize(len, Value::Undefined);
}

unsafe extern "C" fn check_stack(_ctx: *mut duk_context, _extra: duk_idx_t) -> duk_bool_t {
    1
}

unsafe extern "C" fn get_type_mask(ctx: *mut duk_context, idx: duk_idx_t) -> duk_uint_t {
    match state(ctx).get(idx) {
        None => DUK_TYPE_MASK_NONE,
        Some(Value::Undefined) => DUK_TYPE_MASK_UNDEFINED,
        Some(Value::Null) => DUK_TYPE_MASK_NULL,
        Some(Value::Bool(_)) => DUK_TYPE_MASK_BOOLEAN,
        Some(Value::Number(_)) => DUK_TYPE_MASK_NUMBER,
        Some(Value::Str(_)) => DUK_TYPE_MASK_STRING,
        Some(Value::Object(_)) => DUK_TYPE_MASK_OBJECT,
        Some(Value::Pointer(_)) => DUK_TYPE_MASK_POINTER,
    }
}

unsafe extern "C" fn is_boolean(ctx: *mut duk_context, idx: duk_idx_t) -> duk_bool_t {
    matches!(state(ctx).get(idx), Some(Value::Bool(_))) as duk_bool_t
}

unsafe extern "C" fn is_number(ctx: *mut duk_context, idx: duk_idx_t) -> duk_bool_t {
    matches!(state(ctx).get(idx), Some(Value::Number(_))) as duk_bool_t
}

unsafe extern "C" fn is_string(ctx: *mut duk_context, idx: duk_idx_t) -> duk_bool_t {
    matches!(state(ctx).get(idx), Some(Value::Str(_))) as duk_bool_t
}

unsafe extern "C" fn is_array(ctx: *mut duk_context, idx: duk_idx_t) -> duk_bool_t {
    let st = state(ctx);
    st.object_at(idx)
        .is_some_and(|id| matches!(st.object(id).kind, Kind::Array(_))) as duk_bool_t
}

unsafe extern "C" fn is_function(ctx: *mut duk_context, idx: duk_idx_t) -> duk_bool_t {
    let st = state(ctx);
    st.object_at(idx)
        .is_some_and(|id| matches!(st.object(id).kind, Kind::Function(_))) as duk_bool_t
}

unsafe extern "C" fn is_object(ctx: *mut duk_context, idx: duk_idx_t) -> duk_bool_t {
    state(ctx).object_at(idx).is_some() as duk_bool_t
}

unsafe extern "C" fn get_boolean(ctx: *mut duk_context, idx: duk_idx_t) -> duk_bool_t {
    matches!(state(ctx).get(idx), Some(Value::Bool(true))) as duk_bool_t
}

unsafe extern "C" fn get_number(ctx: *mut duk_context, idx: duk_idx_t) -> duk_double_t {
    match state(ctx).get(idx) {
        Some(Value::Number(n)) => *n,
        _ => f64::NAN,
    }
}

unsafe extern "C" fn get_lstring(
    ctx: *mut duk_context,
    idx: duk_idx_t,
    out_len: *mut duk_size_t,
) -> *const c_char {
    let st = state(ctx);
    match st.get(idx) {
        Some(Value::Str(s)) => {
            if !out_len.is_null() {
                *out_len = s.len();
            }
            s.as_ptr().cast()
        }
        _ => std::ptr::null(),
    }
}

unsafe extern "C" fn get_heapptr(ctx: *mut duk_context, idx: duk_idx_t) -> *mut c_void {
    state(ctx)
        .object_at(idx)
        .map_or(std::ptr::null_mut(), heapptr)
}

unsafe extern "C" fn get_pointer(ctx: *mut duk_context, idx: duk_idx_t) -> *mut c_void {
    match state(ctx).get(idx) {
        Some(Value::Pointer(p)) => *p as *mut c_void,
        _ => std::ptr::null_mut(),
    }
}

unsafe extern "C" fn push_null(ctx: *mut duk_context) {
    state(ctx).push(Value::Null);
}

unsafe extern "C" fn push_boolean(ctx: *mut duk_context, b: duk_bool_t) {
    state(ctx).push(Value::Bool(b != 0));
}

unsafe extern "C" fn push_number(ctx: *mut duk_context, n: duk_double_t) {
    state(ctx).push(Value::Number(n));
}

unsafe extern "C" fn push_lstring(
    ctx: *mut duk_context,
    ptr: *const c_char,
    len: duk_size_t,
) -> *const c_char {
    let mut st = state(ctx);
    st.push(Value::Str(bytes(ptr, len).to_vec()));
    match st.stack.last() {
        Some(Value::Str(s)) => s.as_ptr().cast(),
        _ => std::ptr::null(),
    }
}

unsafe extern "C" fn push_array(ctx: *mut duk_context) -> duk_idx_t {
    let mut st = state(ctx);
    let id = st.alloc(Kind::Array(Vec::new()));
    st.push(Value::Object(id))
}

unsafe extern "C" fn push_object(ctx: *mut duk_context) -> duk_idx_t {
    let mut st = state(ctx);
    let id = st.alloc(Kind::Plain);
    st.push(Value::Object(id))
}

unsafe extern "C" fn push_heapptr(ctx: *mut duk_context, ptr: *mut c_void) -> duk_idx_t {
    let mut st = state(ctx);
    let value = match heap_id(ptr) {
        Some(id) if st.live(id) => Value::Object(id),
        _ => Value::Undefined,
    };
    st.push(value)
}

unsafe extern "C" fn push_pointer(ctx: *mut duk_context, ptr: *mut c_void) {
    state(ctx).push(Value::Pointer(ptr as usize));
}

unsafe extern "C" fn push_heap_stash(ctx: *mut duk_context) {
    state(ctx).push(Value::Object(STASH_ID));
}

unsafe extern "C" fn put_prop_index(
    ctx: *mut duk_context,
    obj_idx: duk_idx_t,
    index: duk_uarridx_t,
) -> duk_bool_t {
    let mut st = state(ctx);
    let target = st.object_at(obj_idx);
    let value = st.pop();
    match target {
        Some(id) => {
            st.object_mut(id).put(index.to_string().as_bytes(), value);
            1
        }
        None => {
            st.throw("TypeError", "invalid base value");
            0
        }
    }
}

unsafe extern "C" fn put_prop_lstring(
    ctx: *mut duk_context,
    obj_idx: duk_idx_t,
    key: *const c_char,
    len: duk_size_t,
) -> duk_bool_t {
    let mut st = state(ctx);
    let target = st.object_at(obj_idx);
    let value = st.pop();
    match target {
        Some(id) => {
            st.object_mut(id).put(bytes(key, len), value);
            1
        }
        None => {
            st.throw("TypeError", "invalid base value");
            0
        }
    }
}

unsafe extern "C" fn get_prop_lstring(
    ctx: *mut duk_context,
    obj_idx: duk_idx_t,
    key: *const c_char,
    len: duk_size_t,
) -> duk_bool_t {
    let mut st = state(ctx);
    let found = match st.object_at(obj_idx) {
        Some(id) => st.lookup(id, bytes(key, len)),
        None => Err(()),
    };
    match found {
        Ok(found) => {
            let present = found.is_some();
            st.push(found.unwrap_or(Value::Undefined));
            present as duk_bool_t
        }
        Err(()) => {
            st.throw("Error", "getter");
            0
        }
    }
}

unsafe extern "C" fn get_global_lstring(
    ctx: *mut duk_context,
    key: *const c_char,
    len: duk_size_t,
) -> duk_bool_t {
    let mut st = state(ctx);
    let found = st.object(GLOBAL_ID).get(bytes(key, len)).cloned();
    let present = found.is_some();
    st.push(found.unwrap_or(Value::Undefined));
    present as duk_bool_t
}

unsafe extern "C" fn put_global_lstring(
    ctx: *mut duk_context,
    key: *const c_char,
    len: duk_size_t,
) -> duk_bool_t {
    let mut st = state(ctx);
    let value = st.pop();
    let key = bytes(key, len);
    if key == b"readonly" {
        st.throw("TypeError", "not writable");
        return 0;
    }
    st.object_mut(GLOBAL_ID).put(key, value);
    1
}

unsafe extern "C" fn enum_props(ctx: *mut duk_context, obj_idx: duk_idx_t, flags: duk_uint_t) {
    let mut st = state(ctx);
    let Some(target) = st.object_at(obj_idx) else {
        let id = st.alloc(Kind::Plain);
        st.push(Value::Object(id));
        return;
    };

    let obj = st.object(target);
    let mut keys: Vec<Vec<u8>> = match &obj.kind {
        Kind::Array(items) => (0..items.len()).map(|i| i.to_string().into_bytes()).collect(),
        _ => Vec::new(),
    };
    if flags & DUK_ENUM_ARRAY_INDICES_ONLY == 0 {
        keys.extend(
            obj.props
                .iter()
                .map(|(k, _)| k)
                .filter(|k| k.first() != Some(&0xff))
                .cloned(),
        );
    }

    let id = st.alloc(Kind::Enumerator {
        keys,
        target,
        pos: 0,
    });
    st.push(Value::Object(id));
}

unsafe extern "C" fn next(
    ctx: *mut duk_context,
    enum_idx: duk_idx_t,
    get_value: duk_bool_t,
) -> duk_bool_t {
    let mut st = state(ctx);
    let Some(id) = st.object_at(enum_idx) else {
        return 0;
    };
    let (key, target) = match &mut st.object_mut(id).kind {
        Kind::Enumerator { keys, target, pos } if *pos < keys.len() => {
            *pos += 1;
            (keys[*pos - 1].clone(), *target)
        }
        _ => return 0,
    };

    st.push(Value::Str(key.clone()));
    if get_value != 0 {
        match st.lookup(target, &key) {
            Ok(value) => {
                st.push(value.unwrap_or(Value::Undefined));
            }
            Err(()) => {
                st.throw("Error", "getter");
                return 0;
            }
        }
    }
    1
}

unsafe extern "C" fn eval_raw(
    ctx: *mut duk_context,
    src: *const c_char,
    len: duk_size_t,
    _flags: duk_uint_t,
) -> duk_int_t {
    let source = String::from_utf8_lossy(bytes(src, len)).into_owned();
    let ok = match parse(&source) {
        Some(expr) => evaluate(ctx, expr),
        None => {
            let mut st = state(ctx);
            let err = st.error("SyntaxError", &format!("parse error in '{}'", source));
            st.push(err);
            false
        }
    };
    if ok {
        DUK_EXEC_SUCCESS
    } else {
        DUK_EXEC_ERROR
    }
}

unsafe extern "C" fn pcall(ctx: *mut duk_context, nargs: duk_idx_t) -> duk_int_t {
    if call_value(ctx, nargs.max(0) as usize) {
        DUK_EXEC_SUCCESS
    } else {
        DUK_EXEC_ERROR
    }
}

unsafe extern "C" fn safe_to_stacktrace(ctx: *mut duk_context, idx: duk_idx_t) -> *const c_char {
    let mut st = state(ctx);
    let Some(pos) = st.abs(idx) else {
        return std::ptr::null();
    };
    let text = st.to_display(&st.stack[pos]).replace('\0', "\\0");
    st.stack[pos] = Value::Str(text.clone().into_bytes());
    let cstring = CString::new(text).unwrap_or_default();
    let ptr = cstring.as_ptr();
    st.cstrings.push(cstring);
    ptr
}

unsafe extern "C" fn safe_call(
    ctx: *mut duk_context,
    func: duk_safe_call_function,
    udata: *mut c_void,
    nargs: duk_idx_t,
    nrets: duk_idx_t,
) -> duk_int_t {
    let retbase = {
        let mut st = state(ctx);
        st.scopes.push(Scope::SafeCall);
        st.stack.len() - nargs.max(0) as usize
    };
    let rets = func(ctx, udata);

    let mut st = state(ctx);
    st.scopes.pop();
    let nrets = nrets.max(0) as usize;
    let (results, rc) = match st.pending.take() {
        Some(thrown) => (vec![thrown], DUK_EXEC_ERROR),
        None => {
            let from = st.stack.len().saturating_sub(rets.max(0) as usize).max(retbase);
            (st.stack.split_off(from), DUK_EXEC_SUCCESS)
        }
    };
    st.stack.truncate(retbase);
    st.stack.extend(results);
    st.stack.resize(retbase + nrets, Value::Undefined);
    rc
}

unsafe extern "C" fn dup(ctx: *mut duk_context, idx: duk_idx_t) {
    let mut st = state(ctx);
    let value = st.get(idx).cloned().unwrap_or(Value::Undefined);
    st.push(value);
}

unsafe extern "C" fn get_c_function(
    ctx: *mut duk_context,
    idx: duk_idx_t,
) -> Option<duk_c_function> {
    let st = state(ctx);
    match st.object_at(idx).map(|id| &st.object(id).kind) {
        Some(Kind::Function(FnKind::Native(func))) => Some(*func),
        _ => None,
    }
}

unsafe extern "C" fn push_c_function(
    ctx: *mut duk_context,
    func: duk_c_function,
    _nargs: duk_idx_t,
) -> duk_idx_t {
    let mut st = state(ctx);
    let id = st.alloc(Kind::Function(FnKind::Native(func)));
    st.push(Value::Object(id))
}

unsafe extern "C" fn push_current_function(ctx: *mut duk_context) {
    let mut st = state(ctx);
    let value = st
        .frames
        .last()
        .map_or(Value::Undefined, |f| Value::Object(f.callee));
    st.push(value);
}

/// Function table of the fake engine
pub fn api() -> DukApi {
    DukApi {
        duk_create_heap: create_heap,
        duk_destroy_heap: destroy_heap,
        duk_get_top: get_top,
        duk_set_top: set_top,
        duk_check_stack: check_stack,
        duk_dup: dup,
        duk_get_type_mask: get_type_mask,
        duk_is_boolean: is_boolean,
        duk_is_number: is_number,
        duk_is_string: is_string,
        duk_is_array: is_array,
        duk_is_function: is_function,
        duk_is_object: is_object,
        duk_get_boolean: get_boolean,
        duk_get_number: get_number,
        duk_get_lstring: get_lstring,
        duk_get_heapptr: get_heapptr,
        duk_get_pointer: get_pointer,
        duk_get_c_function: get_c_function,
        duk_push_null: push_null,
        duk_push_boolean: push_boolean,
        duk_push_number: push_number,
        duk_push_lstring: push_lstring,
        duk_push_array: push_array,
        duk_push_object: push_object,
        duk_push_heapptr: push_heapptr,
        duk_push_pointer: push_pointer,
        duk_push_heap_stash: push_heap_stash,
        duk_put_prop_index: put_prop_index,
        duk_put_prop_lstring: put_prop_lstring,
        duk_get_prop_lstring: get_prop_lstring,
        duk_get_global_lstring: get_global_lstring,
        duk_put_global_lstring: put_global_lstring,
        duk_enum: enum_props,
        duk_next: next,
        duk_eval_raw: eval_raw,
        duk_pcall: pcall,
        duk_safe_call: safe_call,
        duk_safe_to_stacktrace: safe_to_stacktrace,
        duk_push_c_function: push_c_function,
        duk_push_current_function: push_current_function,
    }
}
