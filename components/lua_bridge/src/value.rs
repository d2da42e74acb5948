//! Dynamic type tags of interpreter values.
//!
//! Tags mirror the interpreter's own basic types. Integers and floats share
//! the `Number` tag, as they do inside the interpreter.

use mlua::Value;
use std::fmt;

/// Basic type of a value on the evaluation stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueTag {
    /// nil
    Nil,
    /// true / false
    Boolean,
    /// Raw host pointer, not managed by the collector
    LightUserData,
    /// Integer or float
    Number,
    /// Byte string
    String,
    /// Table
    Table,
    /// Lua or native function
    Function,
    /// Collector-managed userdata
    UserData,
    /// Coroutine
    Thread,
}

impl ValueTag {
    /// Tag of an interpreter value
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Nil => ValueTag::Nil,
            Value::Boolean(_) => ValueTag::Boolean,
            Value::LightUserData(_) => ValueTag::LightUserData,
            Value::Integer(_) | Value::Number(_) => ValueTag::Number,
            Value::String(_) => ValueTag::String,
            Value::Table(_) => ValueTag::Table,
            Value::Function(_) => ValueTag::Function,
            Value::Thread(_) => ValueTag::Thread,
            _ => ValueTag::UserData,
        }
    }

    /// Name used by the interpreter's `type()` function
    pub fn name(self) -> &'static str {
        match self {
            ValueTag::Nil => "nil",
            ValueTag::Boolean => "boolean",
            ValueTag::LightUserData => "lightuserdata",
            ValueTag::Number => "number",
            ValueTag::String => "string",
            ValueTag::Table => "table",
            ValueTag::Function => "function",
            ValueTag::UserData => "userdata",
            ValueTag::Thread => "thread",
        }
    }
}

impl fmt::Display for ValueTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Best-effort string rendering used by stack dumps and the REPL.
///
/// Strings and numbers render as the interpreter's `tostring` would;
/// reference types render as `<tag>: <address>`.
pub fn render(value: &Value) -> String {
    match value {
        Value::Nil => "nil".to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Number(n) => render_float(*n),
        Value::String(s) => String::from(s.to_string_lossy()),
        other => format!("{}: {:p}", ValueTag::of(other), other.to_pointer()),
    }
}

fn render_float(n: f64) -> String {
    if n.is_nan() {
        if n.is_sign_negative() { "-nan" } else { "nan" }.to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "inf" } else { "-inf" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e16 {
        format!("{:.1}", n)
    } else {
        n.to_string()
    }
}
