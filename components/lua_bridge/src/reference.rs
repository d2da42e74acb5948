//! Registry references to interpreter-owned values.
//!
//! A [`RefHandle`] keeps a value alive in the interpreter registry
//! independent of its stack position. Handle ids come from one
//! process-wide counter and are never reused, so neither a released handle
//! nor a handle from another interpreter can alias a live value.

use crate::error::{BridgeError, BridgeResult};
use mlua::{Lua, RegistryKey, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque handle naming a value retained in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RefHandle(u64);

impl RefHandle {
    /// Raw id, for diagnostics
    pub fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RefHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Live references of one interpreter
#[derive(Debug, Default)]
pub struct RefTable {
    keys: HashMap<RefHandle, RegistryKey>,
}

impl RefTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value in the registry and return its handle
    pub fn retain(&mut self, lua: &Lua, value: Value) -> BridgeResult<RefHandle> {
        let key = lua.create_registry_value(value)?;
        let handle = RefHandle(NEXT_ID.fetch_add(1, Ordering::Relaxed));
        self.keys.insert(handle, key);
        Ok(handle)
    }

    /// Fetch the value behind a live handle
    pub fn get(&self, lua: &Lua, handle: RefHandle) -> BridgeResult<Value> {
        let Some(key) = self.keys.get(&handle) else {
            log::warn!("use of released reference {}", handle);
            return Err(BridgeError::InvalidReference(handle));
        };
        Ok(lua.registry_value::<Value>(key)?)
    }

    /// Release a handle, returning the value it held
    pub fn take(&mut self, lua: &Lua, handle: RefHandle) -> BridgeResult<Value> {
        let Some(key) = self.keys.remove(&handle) else {
            log::warn!("use of released reference {}", handle);
            return Err(BridgeError::InvalidReference(handle));
        };
        let value = lua.registry_value::<Value>(&key)?;
        lua.remove_registry_value(key)?;
        Ok(value)
    }

    /// Whether the handle is still live
    pub fn contains(&self, handle: RefHandle) -> bool {
        self.keys.contains_key(&handle)
    }

    /// Number of live handles
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether no handles are live
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Release every live handle
    pub fn clear(&mut self, lua: &Lua) {
        for (handle, key) in self.keys.drain() {
            if let Err(e) = lua.remove_registry_value(key) {
                log::warn!("failed to release reference {}: {}", handle, e);
            }
        }
    }
}
