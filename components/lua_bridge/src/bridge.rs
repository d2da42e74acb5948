//! The interpreter bridge.
//!
//! [`InterpreterBridge`] owns one interpreter and the evaluation stack host
//! code talks to it through. It dereferences to [`Stack`], so every stack
//! primitive is available directly on the bridge.
//!
//! The interpreter is not thread-safe and the bridge is neither `Send` nor
//! `Sync`: all access has to come from the thread that created it. Hosts
//! either construct a bridge and pass it around, or use the per-thread
//! shared instance through [`InterpreterBridge::with_instance`].

use crate::config::BridgeConfig;
use crate::error::{error_message, BridgeError, BridgeResult};
use crate::file::FileStatus;
use crate::reference::RefTable;
use crate::stack::Stack;
use mlua::{Lua, LuaOptions, Value};
use std::cell::RefCell;
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::rc::Rc;

thread_local! {
    static INSTANCE: RefCell<Option<InterpreterBridge>> = const { RefCell::new(None) };
}

/// Sole mediator between host code and one interpreter instance
#[derive(Debug)]
pub struct InterpreterBridge {
    stack: Stack,
    refs: Rc<RefCell<RefTable>>,
    pub(crate) status: Option<FileStatus>,
    config: BridgeConfig,
}

impl InterpreterBridge {
    /// Create an interpreter, open the configured libraries and run the
    /// command registration hook.
    ///
    /// # Errors
    /// Returns [`BridgeError::Init`] if the interpreter cannot be created or
    /// configured, or whatever error the registration hook returns.
    ///
    /// # Example
    /// ```
    /// use lua_bridge::{BridgeConfig, InterpreterBridge};
    ///
    /// let mut bridge = InterpreterBridge::new(BridgeConfig::default()).unwrap();
    /// bridge.push_integer(7);
    /// assert_eq!(bridge.pop_as_integer().unwrap(), 7);
    /// ```
    pub fn new(config: BridgeConfig) -> BridgeResult<Self> {
        let lua = Lua::new_with(config.libraries, LuaOptions::new())
            .map_err(|e| BridgeError::Init(error_message(&e)))?;
        if let Some(limit) = config.memory_limit {
            lua.set_memory_limit(limit)
                .map_err(|e| BridgeError::Init(error_message(&e)))?;
        }

        let refs = Rc::new(RefCell::new(RefTable::new()));
        let mut bridge = Self {
            stack: Stack::new(lua, Rc::clone(&refs)),
            refs,
            status: None,
            config,
        };

        if let Some(hook) = bridge.config.commands() {
            hook(&mut bridge)?;
        }
        log::debug!("interpreter bridge created ({:?})", bridge.config);
        Ok(bridge)
    }

    /// Run `f` against this thread's shared bridge, creating it with the
    /// default configuration on first use.
    ///
    /// # Errors
    /// [`BridgeError::InstanceBusy`] when called from inside another
    /// `with_instance` closure, or the construction error on first use.
    pub fn with_instance<R>(f: impl FnOnce(&mut InterpreterBridge) -> R) -> BridgeResult<R> {
        INSTANCE.with(|slot| {
            let mut slot = slot.try_borrow_mut().map_err(|_| BridgeError::InstanceBusy)?;
            let bridge = match slot.take() {
                Some(bridge) => bridge,
                None => InterpreterBridge::new(BridgeConfig::default())?,
            };
            Ok(f(slot.insert(bridge)))
        })
    }

    /// Make `bridge` this thread's shared instance
    pub fn install(bridge: InterpreterBridge) -> BridgeResult<()> {
        INSTANCE.with(|slot| {
            let mut slot = slot.try_borrow_mut().map_err(|_| BridgeError::InstanceBusy)?;
            if slot.is_some() {
                return Err(BridgeError::AlreadyInstalled);
            }
            *slot = Some(bridge);
            Ok(())
        })
    }

    /// Remove this thread's shared instance, if any
    pub fn take_instance() -> BridgeResult<Option<InterpreterBridge>> {
        INSTANCE.with(|slot| {
            let mut slot = slot.try_borrow_mut().map_err(|_| BridgeError::InstanceBusy)?;
            Ok(slot.take())
        })
    }

    /// Configuration the bridge was built with
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Number of live reference handles
    pub fn live_references(&self) -> usize {
        self.refs.borrow().len()
    }

    /// Run a Lua source file in protected mode.
    ///
    /// All results are left on the stack; the count is returned. On a
    /// compile or runtime failure the error message is left on the stack
    /// instead. The file is loaded as raw bytes, so sources need not be
    /// UTF-8.
    pub fn do_file(&mut self, path: impl AsRef<Path>) -> BridgeResult<usize> {
        let path = path.as_ref();
        let source = match std::fs::read(path) {
            Ok(source) => source,
            Err(e) => {
                log::error!("Error running file {}: {}", path.display(), e);
                return Err(e.into());
            }
        };
        self.run_chunk(&source, &format!("@{}", path.display()))
    }

    /// Run an in-memory chunk in protected mode, like [`Self::do_file`]
    pub fn do_string(&mut self, source: &str, name: &str) -> BridgeResult<usize> {
        self.run_chunk(source.as_bytes(), &format!("={}", name))
    }

    fn run_chunk(&mut self, source: &[u8], chunk_name: &str) -> BridgeResult<usize> {
        let loaded = self
            .stack
            .lua()
            .load(source)
            .set_name(chunk_name)
            .into_function();
        let function = match loaded {
            Ok(function) => function,
            Err(e) => {
                let message = error_message(&e);
                log::error!("Error loading chunk {}: {}", chunk_name, message);
                self.stack.push_message(&message);
                return Err(BridgeError::Load {
                    name: chunk_name.trim_start_matches(['@', '=']).to_string(),
                    message,
                });
            }
        };
        self.stack.push_value(Value::Function(function));
        self.stack.call_multret(0)
    }
}

impl Deref for InterpreterBridge {
    type Target = Stack;

    fn deref(&self) -> &Stack {
        &self.stack
    }
}

impl DerefMut for InterpreterBridge {
    fn deref_mut(&mut self) -> &mut Stack {
        &mut self.stack
    }
}

impl Drop for InterpreterBridge {
    fn drop(&mut self) {
        let lua = self.stack.lua().clone();
        self.stack.truncate(0);
        self.refs.borrow_mut().clear(&lua);
        log::debug!("interpreter bridge closed");
    }
}
