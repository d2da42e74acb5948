//! Native callables installed into the interpreter.
//!
//! A host function follows the interpreter's native calling convention: it
//! reads its arguments from a stack, pushes its results onto the same stack
//! and reports how many results it pushed. Each invocation gets a fresh
//! [`Stack`] holding exactly its arguments, first argument at index 1.

use crate::error::BridgeResult;
use crate::reference::RefTable;
use crate::stack::Stack;
use mlua::{Function, Lua, MultiValue};
use std::cell::RefCell;
use std::rc::Rc;

/// Host function callable from interpreter code
pub trait HostFunction: 'static {
    /// Run the function against its argument stack and return the number
    /// of results left on top of it
    fn invoke(&self, stack: &mut Stack) -> BridgeResult<usize>;
}

impl<F> HostFunction for F
where
    F: Fn(&mut Stack) -> BridgeResult<usize> + 'static,
{
    fn invoke(&self, stack: &mut Stack) -> BridgeResult<usize> {
        self(stack)
    }
}

/// Wrap a host function as an interpreter function.
///
/// Errors returned by the host function are raised as interpreter errors,
/// so they unwind to the nearest protected call.
pub(crate) fn create_function<H: HostFunction>(
    lua: &Lua,
    refs: &Rc<RefCell<RefTable>>,
    host: H,
) -> mlua::Result<Function> {
    let refs = Rc::clone(refs);
    lua.create_function(move |lua, args: MultiValue| {
        let values = args.into_iter().collect();
        let mut frame = Stack::with_values(lua.clone(), Rc::clone(&refs), values);
        let count = host.invoke(&mut frame).map_err(mlua::Error::external)?;
        frame.take_results(count).map_err(mlua::Error::external)
    })
}
