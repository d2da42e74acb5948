//! Bridge configuration.
//!
//! Configuration decides what the interpreter is created with; the bridge
//! applies it once, at construction.

use crate::bridge::InterpreterBridge;
use crate::error::BridgeResult;
use mlua::StdLib;
use std::fmt;
use std::rc::Rc;

/// Registration hook installing host commands into a fresh interpreter
pub type CommandHook = Rc<dyn Fn(&mut InterpreterBridge) -> BridgeResult<()>>;

/// Interpreter bridge configuration
#[derive(Clone)]
pub struct BridgeConfig {
    /// Standard libraries opened at construction
    pub libraries: StdLib,

    /// Upper bound on interpreter heap usage in bytes
    pub memory_limit: Option<usize>,

    commands: Option<CommandHook>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            libraries: StdLib::ALL_SAFE,
            memory_limit: None,
            commands: None,
        }
    }
}

impl fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("libraries", &self.libraries)
            .field("memory_limit", &self.memory_limit)
            .field("commands", &self.commands.is_some())
            .finish()
    }
}

impl BridgeConfig {
    /// Create a configuration with the safe standard libraries and no limit
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the standard libraries to open
    pub fn with_libraries(mut self, libraries: StdLib) -> Self {
        self.libraries = libraries;
        self
    }

    /// Cap interpreter memory usage
    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    /// Set the hook that installs host commands.
    ///
    /// The hook runs exactly once, during construction, before the bridge is
    /// handed to the caller.
    pub fn with_commands(
        mut self,
        hook: impl Fn(&mut InterpreterBridge) -> BridgeResult<()> + 'static,
    ) -> Self {
        self.commands = Some(Rc::new(hook));
        self
    }

    pub(crate) fn commands(&self) -> Option<CommandHook> {
        self.commands.clone()
    }
}
