//! Evaluation stack and the stack-discipline protocol.
//!
//! [`Stack`] is the surface every host interaction goes through: values are
//! pushed, popped with typed checks, read and written through tables and
//! globals, and handed to callables. The bridge owns one stack; every native
//! callable invocation gets a fresh one holding its arguments.
//!
//! Indices follow the interpreter's convention: positive indices count from
//! the bottom (1 = first pushed), negative indices count from the top
//! (-1 = top). Index 0 is never valid.

use crate::error::{error_message, BridgeError, BridgeResult};
use crate::native::{self, HostFunction};
use crate::reference::{RefHandle, RefTable};
use crate::value::{render, ValueTag};
use mlua::{Function, Lua, MultiValue, Value};
use std::cell::RefCell;
use std::ffi::c_void;
use std::fmt;
use std::rc::Rc;

/// Key of a table field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKey {
    /// String key
    Name(String),
    /// Integer key
    Index(i64),
}

impl From<&str> for FieldKey {
    fn from(name: &str) -> Self {
        FieldKey::Name(name.to_string())
    }
}

impl From<String> for FieldKey {
    fn from(name: String) -> Self {
        FieldKey::Name(name)
    }
}

impl From<i64> for FieldKey {
    fn from(index: i64) -> Self {
        FieldKey::Index(index)
    }
}

impl From<i32> for FieldKey {
    fn from(index: i32) -> Self {
        FieldKey::Index(index.into())
    }
}

/// Evaluation stack bound to one interpreter
pub struct Stack {
    lua: Lua,
    values: Vec<Value>,
    refs: Rc<RefCell<RefTable>>,
}

impl fmt::Debug for Stack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stack")
            .field("depth", &self.values.len())
            .field("references", &self.refs.borrow().len())
            .finish()
    }
}

impl Stack {
    pub(crate) fn new(lua: Lua, refs: Rc<RefCell<RefTable>>) -> Self {
        Self::with_values(lua, refs, Vec::new())
    }

    pub(crate) fn with_values(lua: Lua, refs: Rc<RefCell<RefTable>>, values: Vec<Value>) -> Self {
        Self { lua, values, refs }
    }

    /// Interpreter this stack belongs to
    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    // ------------------------------------------------------------------
    // Depth and indexing
    // ------------------------------------------------------------------

    /// Number of values on the stack
    pub fn top(&self) -> usize {
        self.values.len()
    }

    /// Whether the stack holds no values
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn position(&self, index: i32) -> Option<usize> {
        let len = self.values.len() as i64;
        let index = i64::from(index);
        let absolute = match index {
            0 => return None,
            i if i > 0 => i,
            i => len + i + 1,
        };
        if absolute >= 1 && absolute <= len {
            Some((absolute - 1) as usize)
        } else {
            None
        }
    }

    /// Value at an index, without removing it
    pub fn peek(&self, index: i32) -> Option<&Value> {
        self.position(index).map(|pos| &self.values[pos])
    }

    /// Tag of the value at an index, `None` if the index holds no value
    pub fn type_at(&self, index: i32) -> Option<ValueTag> {
        self.peek(index).map(ValueTag::of)
    }

    /// Whether the value at an index is nil. An absent index is not nil.
    pub fn is_nil(&self, index: i32) -> bool {
        matches!(self.peek(index), Some(Value::Nil))
    }

    /// Set the stack top to `index`.
    ///
    /// A non-negative index becomes the new depth: entries above it are
    /// discarded and missing entries are filled with nil. A negative index
    /// is relative to the current top, so `-1` leaves the stack unchanged
    /// and `-2` drops one value.
    pub fn move_to_top(&mut self, index: i32) -> BridgeResult<()> {
        let len = self.values.len() as i64;
        let depth = if index >= 0 {
            i64::from(index)
        } else {
            len + i64::from(index) + 1
        };
        if depth < 0 {
            return Err(BridgeError::InvalidIndex(index));
        }
        self.values.resize(depth as usize, Value::Nil);
        Ok(())
    }

    /// Drop every value above `depth`; a no-op if the stack is not deeper
    pub fn truncate(&mut self, depth: usize) {
        self.values.truncate(depth);
    }

    fn require(&self, needed: usize) -> BridgeResult<()> {
        let available = self.values.len();
        if available < needed {
            return Err(BridgeError::StackUnderflow { needed, available });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Push
    // ------------------------------------------------------------------

    /// Push an arbitrary interpreter value
    pub fn push_value(&mut self, value: Value) {
        self.values.push(value);
    }

    /// Push a float
    pub fn push_number(&mut self, n: f64) {
        self.values.push(Value::Number(n));
    }

    /// Push an integer
    pub fn push_integer(&mut self, n: i64) {
        self.values.push(Value::Integer(n));
    }

    /// Push a boolean
    pub fn push_boolean(&mut self, b: bool) {
        self.values.push(Value::Boolean(b));
    }

    /// Push nil
    pub fn push_nil(&mut self) {
        self.values.push(Value::Nil);
    }

    /// Push a raw host pointer as light userdata.
    ///
    /// The interpreter never dereferences or frees it.
    pub fn push_light_pointer(&mut self, p: *mut c_void) {
        self.values.push(Value::LightUserData(mlua::LightUserData(p)));
    }

    /// Push a string
    pub fn push_string(&mut self, s: &str) -> BridgeResult<()> {
        self.push_bytes(s.as_bytes())
    }

    /// Push a byte string
    pub fn push_bytes(&mut self, bytes: &[u8]) -> BridgeResult<()> {
        let s = self.lua.create_string(bytes)?;
        self.values.push(Value::String(s));
        Ok(())
    }

    /// Push an error message, or nil when the interpreter cannot allocate it
    pub(crate) fn push_message(&mut self, message: &str) {
        match self.lua.create_string(message) {
            Ok(s) => self.values.push(Value::String(s)),
            Err(_) => self.values.push(Value::Nil),
        }
    }

    // ------------------------------------------------------------------
    // Pop
    // ------------------------------------------------------------------

    /// Remove the top value without inspecting it
    pub fn pop(&mut self) {
        if self.values.pop().is_none() {
            log::warn!("pop on an empty stack ignored");
        }
    }

    /// Remove and return the top value
    pub fn pop_value(&mut self) -> Option<Value> {
        self.values.pop()
    }

    fn pop_with<T>(
        &mut self,
        expected: &'static str,
        convert: impl FnOnce(&Value) -> Option<T>,
    ) -> BridgeResult<T> {
        match self.values.last().and_then(convert) {
            Some(converted) => {
                self.values.pop();
                Ok(converted)
            }
            None => Err(BridgeError::mismatch(expected, found(self.values.last()))),
        }
    }

    /// Pop the top value as an integer.
    ///
    /// Floats are accepted only when they hold an exact integer.
    pub fn pop_as_integer(&mut self) -> BridgeResult<i64> {
        self.pop_with("integer", as_integer)
    }

    /// Pop the top value as a float
    pub fn pop_as_number(&mut self) -> BridgeResult<f64> {
        self.pop_with("number", |value| match *value {
            Value::Integer(i) => Some(i as f64),
            Value::Number(n) => Some(n),
            _ => None,
        })
    }

    /// Pop the top value as a string, replacing invalid UTF-8
    pub fn pop_as_string(&mut self) -> BridgeResult<String> {
        self.pop_with("string", |value| match value {
            Value::String(s) => Some(String::from(s.to_string_lossy())),
            _ => None,
        })
    }

    /// Pop the top value as raw bytes
    pub fn pop_as_bytes(&mut self) -> BridgeResult<Vec<u8>> {
        self.pop_with("string", |value| match value {
            Value::String(s) => Some(s.as_bytes().to_vec()),
            _ => None,
        })
    }

    /// Pop the top value as a boolean
    pub fn pop_as_boolean(&mut self) -> BridgeResult<bool> {
        self.pop_with("boolean", |value| match *value {
            Value::Boolean(b) => Some(b),
            _ => None,
        })
    }

    /// Pop the top value as a pointer. Light and full userdata are accepted.
    pub fn pop_as_pointer(&mut self) -> BridgeResult<*mut c_void> {
        self.pop_with("userdata", |value| match value {
            Value::LightUserData(ud) => Some(ud.0),
            Value::UserData(_) => Some(value.to_pointer() as *mut c_void),
            _ => None,
        })
    }

    // ------------------------------------------------------------------
    // Tables
    // ------------------------------------------------------------------

    /// Push a new empty table
    pub fn create_table(&mut self) -> BridgeResult<()> {
        let table = self.lua.create_table()?;
        self.values.push(Value::Table(table));
        Ok(())
    }

    /// Push `table[key]` where the table is on top of the stack.
    ///
    /// The table stays beneath the pushed value.
    pub fn push_table_field(&mut self, key: impl Into<FieldKey>) -> BridgeResult<()> {
        let table = match self.values.last() {
            Some(Value::Table(table)) => table.clone(),
            other => return Err(BridgeError::mismatch("table", found(other))),
        };
        let value: Value = match key.into() {
            FieldKey::Name(name) => table.get(name)?,
            FieldKey::Index(index) => table.get(index)?,
        };
        self.values.push(value);
        Ok(())
    }

    /// Store `table[key] = value` with value, key and table on the stack
    /// from the top down. Value and key are popped; the table stays.
    pub fn set_table(&mut self) -> BridgeResult<()> {
        self.require(3)?;
        let len = self.values.len();
        let table = match &self.values[len - 3] {
            Value::Table(table) => table.clone(),
            other => return Err(BridgeError::mismatch("table", ValueTag::of(other).name())),
        };
        let key = self.values[len - 2].clone();
        let value = self.values[len - 1].clone();
        table.set(key, value)?;
        self.values.truncate(len - 2);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Globals
    // ------------------------------------------------------------------

    /// Push the global named `name`
    pub fn get_global(&mut self, name: &str) -> BridgeResult<()> {
        let value: Value = self.lua.globals().get(name)?;
        self.values.push(value);
        Ok(())
    }

    /// Pop the top value into the global named `name`
    pub fn set_global(&mut self, name: &str) -> BridgeResult<()> {
        self.require(1)?;
        let value = self.values[self.values.len() - 1].clone();
        self.lua.globals().set(name, value)?;
        self.values.pop();
        Ok(())
    }

    /// Push the value at a dotted path such as `io.open`.
    ///
    /// Resolution stops with nil at the first segment that is not a table.
    pub fn get_global_path(&mut self, path: &str) -> BridgeResult<()> {
        let mut current = Value::Table(self.lua.globals());
        for segment in path.split('.') {
            current = match current {
                Value::Table(table) => table.get(segment)?,
                _ => Value::Nil,
            };
        }
        self.values.push(current);
        Ok(())
    }

    /// Whether the global `name` holds a function. Stack depth is unchanged.
    pub fn function_exists(&mut self, name: &str) -> bool {
        let depth = self.values.len();
        let exists = match self.get_global(name) {
            Ok(()) => matches!(self.values.last(), Some(Value::Function(_))),
            Err(_) => false,
        };
        self.values.truncate(depth);
        exists
    }

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    /// Call the callable sitting below `nargs` arguments, in protected mode.
    ///
    /// The callable and its arguments are consumed. On success exactly
    /// `nresults` values are left on the stack, padded with nil or
    /// truncated. On failure the error message is left on the stack instead.
    pub fn call(&mut self, nargs: usize, nresults: usize) -> BridgeResult<()> {
        self.call_with(nargs, Some(nresults)).map(|_| ())
    }

    /// Like [`Stack::call`] but keeps every result; returns how many there are
    pub fn call_multret(&mut self, nargs: usize) -> BridgeResult<usize> {
        self.call_with(nargs, None)
    }

    fn call_with(&mut self, nargs: usize, nresults: Option<usize>) -> BridgeResult<usize> {
        self.require(nargs + 1)?;
        let base = self.values.len() - nargs - 1;
        let args: MultiValue = self.values.split_off(base + 1).into_iter().collect();
        let callee = self.values.pop().unwrap_or(Value::Nil);

        let outcome = match callee {
            Value::Function(function) => {
                log::trace!("calling function with {} arguments", nargs);
                function
                    .call::<MultiValue>(args)
                    .map_err(|e| error_message(&e))
            }
            other if has_call_metamethod(&other) => {
                log::trace!(
                    "calling {} through __call with {} arguments",
                    ValueTag::of(&other),
                    nargs
                );
                let mut args = args;
                args.push_front(other);
                self.call_trampoline()
                    .and_then(|trampoline| trampoline.call::<MultiValue>(args))
                    .map_err(|e| error_message(&e))
            }
            other => Err(format!("attempt to call a {} value", ValueTag::of(&other))),
        };

        match outcome {
            Ok(results) => {
                let mut results: Vec<Value> = results.into_iter().collect();
                if let Some(n) = nresults {
                    results.resize(n, Value::Nil);
                }
                let count = results.len();
                self.values.extend(results);
                Ok(count)
            }
            Err(message) => {
                log::error!("Error running function: {}", message);
                self.push_message(&message);
                Err(BridgeError::CallFailed(message))
            }
        }
    }

    /// Lua function forwarding its arguments to its first argument, so
    /// callable tables and userdata are invoked by the interpreter itself.
    fn call_trampoline(&self) -> mlua::Result<Function> {
        let cached: Option<Function> = self.lua.named_registry_value(CALL_TRAMPOLINE)?;
        if let Some(trampoline) = cached {
            return Ok(trampoline);
        }
        let trampoline: Function = self
            .lua
            .load("return function(f, ...) return f(...) end")
            .set_name("=call")
            .eval()?;
        self.lua.set_named_registry_value(CALL_TRAMPOLINE, trampoline.clone())?;
        Ok(trampoline)
    }

    /// Install a host function as the global `name`.
    ///
    /// The function runs with its own stack holding its arguments and
    /// returns how many values from the top of that stack are its results.
    pub fn register_native(&mut self, name: &str, function: impl HostFunction) -> BridgeResult<()> {
        let function = native::create_function(&self.lua, &self.refs, function)?;
        self.lua.globals().set(name, function)?;
        log::debug!("registered native function '{}'", name);
        Ok(())
    }

    /// Remove the top `count` values as a native callable's results
    pub(crate) fn take_results(&mut self, count: usize) -> BridgeResult<MultiValue> {
        self.require(count)?;
        let base = self.values.len() - count;
        Ok(self.values.split_off(base).into_iter().collect())
    }

    // ------------------------------------------------------------------
    // References
    // ------------------------------------------------------------------

    /// Pop the top value into the registry and return a handle to it
    pub fn to_reference(&mut self) -> BridgeResult<RefHandle> {
        self.require(1)?;
        let value = self.values[self.values.len() - 1].clone();
        let handle = self.refs.borrow_mut().retain(&self.lua, value)?;
        self.values.pop();
        Ok(handle)
    }

    /// Push the referenced value and release the handle.
    ///
    /// The handle is single-use: any later use fails with
    /// [`BridgeError::InvalidReference`] and pushes nothing.
    pub fn from_reference(&mut self, handle: RefHandle) -> BridgeResult<()> {
        let value = self.refs.borrow_mut().take(&self.lua, handle)?;
        self.values.push(value);
        Ok(())
    }

    /// Push the referenced value, keeping the handle live
    pub fn push_reference(&mut self, handle: RefHandle) -> BridgeResult<()> {
        let value = self.refs.borrow().get(&self.lua, handle)?;
        self.values.push(value);
        Ok(())
    }

    /// Release a handle without pushing its value
    pub fn release_reference(&mut self, handle: RefHandle) -> BridgeResult<()> {
        self.refs.borrow_mut().take(&self.lua, handle).map(|_| ())
    }

    /// Whether a handle is still live
    pub fn is_live_reference(&self, handle: RefHandle) -> bool {
        self.refs.borrow().contains(handle)
    }

    // ------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------

    /// Snapshot of the stack, top first
    pub fn stack_dump(&self) -> StackDump {
        StackDump {
            entries: self
                .values
                .iter()
                .rev()
                .map(|value| DumpEntry {
                    tag: ValueTag::of(value),
                    text: render(value),
                })
                .collect(),
        }
    }

    /// Log the stack contents at debug level
    pub fn dump_stack(&self) {
        log::debug!("{}", self.stack_dump());
    }
}

const CALL_TRAMPOLINE: &str = "lua_bridge.call";

fn has_call_metamethod(value: &Value) -> bool {
    match value {
        Value::Table(table) => table
            .metatable()
            .is_some_and(|mt| mt.contains_key("__call").unwrap_or(false)),
        Value::UserData(ud) => ud
            .metatable()
            .and_then(|mt| mt.contains("__call"))
            .unwrap_or(false),
        _ => false,
    }
}

fn found(value: Option<&Value>) -> &'static str {
    value.map_or("no value", |v| ValueTag::of(v).name())
}

const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;

fn as_integer(value: &Value) -> Option<i64> {
    match *value {
        Value::Integer(i) => Some(i),
        Value::Number(n) if n.fract() == 0.0 && n >= -TWO_POW_63 && n < TWO_POW_63 => {
            Some(n as i64)
        }
        _ => None,
    }
}

/// One rendered stack entry
#[derive(Debug, Clone, PartialEq)]
pub struct DumpEntry {
    /// Tag of the value
    pub tag: ValueTag,
    /// Best-effort string form
    pub text: String,
}

/// Rendered stack contents, top of stack first
#[derive(Debug, Clone, PartialEq)]
pub struct StackDump {
    /// Entries from the top down
    pub entries: Vec<DumpEntry>,
}

impl StackDump {
    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the stack was empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for StackDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Number of Elements on Stack: {}", self.entries.len())?;
        for (i, entry) in self.entries.iter().enumerate() {
            write!(f, "\nStack[{}]: {}", i + 1, entry.text)?;
        }
        Ok(())
    }
}
