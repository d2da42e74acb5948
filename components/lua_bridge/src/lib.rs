//! Stack-discipline bridge to an embedded Lua interpreter
//!
//! This crate lets host code exchange values with an embedded Lua 5.4
//! interpreter the way the interpreter's own C API does:
//! - Push arguments, call, pop results with typed checks
//! - Read and write globals and table fields through the stack
//! - Hold registry references to interpreter-owned values
//! - Install host functions callable from Lua code
//!
//! # Example
//!
//! ```
//! use lua_bridge::{BridgeConfig, BridgeResult, InterpreterBridge, Stack};
//!
//! let mut bridge = InterpreterBridge::new(BridgeConfig::default()).unwrap();
//!
//! bridge
//!     .register_native("double", |stack: &mut Stack| -> BridgeResult<usize> {
//!         let n = stack.pop_as_integer()?;
//!         stack.push_integer(n * 2);
//!         Ok(1)
//!     })
//!     .unwrap();
//!
//! bridge.get_global("double").unwrap();
//! bridge.push_integer(21);
//! bridge.call(1, 1).unwrap();
//! assert_eq!(bridge.pop_as_integer().unwrap(), 42);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bridge;
pub mod config;
pub mod error;
pub mod file;
pub mod native;
pub mod reference;
pub mod stack;
pub mod value;

// Re-export main types at crate root
pub use bridge::InterpreterBridge;
pub use config::{BridgeConfig, CommandHook};
pub use error::{BridgeError, BridgeResult};
pub use file::{FileHandle, FileStatus};
pub use native::HostFunction;
pub use reference::{RefHandle, RefTable};
pub use stack::{DumpEntry, FieldKey, Stack, StackDump};
pub use value::ValueTag;

pub use mlua::{StdLib, Value};
