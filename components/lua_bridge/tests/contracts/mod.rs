//! Contract tests for the bridge API
//!
//! These tests pin down the stack-discipline guarantees host code relies on.

use lua_bridge::{BridgeConfig, BridgeError, BridgeResult, InterpreterBridge, Stack, ValueTag};
use std::ffi::c_void;

fn bridge() -> InterpreterBridge {
    InterpreterBridge::new(BridgeConfig::default()).expect("bridge should initialize")
}

/// Matched pushes and pops leave the depth unchanged
#[test]
fn test_stack_balance_contract() {
    let mut b = bridge();
    b.push_integer(0);
    let before = b.top();

    b.push_number(1.5);
    b.push_string("s").unwrap();
    b.push_nil();
    b.push_boolean(true);
    b.create_table().unwrap();
    b.pop();
    b.pop_as_boolean().unwrap();
    b.pop();
    b.pop_as_string().unwrap();
    b.pop_as_number().unwrap();

    assert_eq!(b.top(), before, "matched push/pop should restore depth");
}

/// Typed pops return exactly what was pushed
#[test]
fn test_round_trip_contract() {
    let mut b = bridge();

    b.push_number(0.1 + 0.2);
    assert_eq!(b.pop_as_number().unwrap().to_bits(), (0.1f64 + 0.2).to_bits());

    b.push_integer(i64::MIN);
    assert_eq!(b.pop_as_integer().unwrap(), i64::MIN);

    b.push_string("héllo\tworld").unwrap();
    assert_eq!(b.pop_as_string().unwrap(), "héllo\tworld");

    b.push_bytes(&[0, 159, 255, 10]).unwrap();
    assert_eq!(b.pop_as_bytes().unwrap(), vec![0, 159, 255, 10]);

    let mut target = 17u32;
    let ptr = &mut target as *mut u32 as *mut c_void;
    b.push_light_pointer(ptr);
    assert_eq!(b.pop_as_pointer().unwrap(), ptr);

    assert_eq!(b.top(), 0);
}

/// A typed pop on the wrong tag fails and leaves the entry in place
#[test]
fn test_type_mismatch_contract() {
    let mut b = bridge();
    b.push_string("not a number").unwrap();

    assert_eq!(
        b.pop_as_integer(),
        Err(BridgeError::mismatch("integer", "string"))
    );
    assert_eq!(
        b.pop_as_number(),
        Err(BridgeError::mismatch("number", "string"))
    );
    assert_eq!(
        b.pop_as_pointer(),
        Err(BridgeError::mismatch("userdata", "string"))
    );
    assert_eq!(b.top(), 1, "failed pop must not remove the entry");
    assert_eq!(b.type_at(-1), Some(ValueTag::String));

    b.pop();
    b.push_integer(3);
    assert_eq!(
        b.pop_as_string(),
        Err(BridgeError::mismatch("string", "number"))
    );
    assert_eq!(b.top(), 1);
}

/// A reference yields its value once
#[test]
fn test_reference_single_use_contract() {
    let mut b = bridge();
    b.push_string("kept").unwrap();
    let handle = b.to_reference().unwrap();
    assert_eq!(b.top(), 0, "to_reference pops the value");

    b.from_reference(handle).unwrap();
    assert_eq!(b.pop_as_string().unwrap(), "kept");

    assert_eq!(
        b.from_reference(handle),
        Err(BridgeError::InvalidReference(handle))
    );
    assert_eq!(b.top(), 0, "stale handle pushes nothing");
}

/// Writing then reading a table field yields the written value
#[test]
fn test_table_round_trip_contract() {
    let mut b = bridge();
    b.create_table().unwrap();
    b.push_string("answer").unwrap();
    b.push_integer(42);
    b.set_table().unwrap();
    assert_eq!(b.top(), 1, "set_table leaves only the table");

    b.push_table_field("answer").unwrap();
    assert_eq!(b.pop_as_integer().unwrap(), 42);
    assert_eq!(b.type_at(-1), Some(ValueTag::Table));
}

/// A successful call leaves exactly the requested result count
#[test]
fn test_call_result_count_contract() {
    let mut b = bridge();
    b.do_string("function pair(a, b) return b, a end", "setup")
        .unwrap();
    b.push_integer(-1);
    let base = b.top();

    b.get_global("pair").unwrap();
    b.push_integer(1);
    b.push_integer(2);
    b.call(2, 2).unwrap();

    assert_eq!(b.top(), base + 2);
    assert_eq!(b.pop_as_integer().unwrap(), 1);
    assert_eq!(b.pop_as_integer().unwrap(), 2);
    assert_eq!(b.pop_as_integer().unwrap(), -1);
}

/// A native double function is callable through the stack protocol
#[test]
fn test_native_double_contract() {
    let mut b = bridge();
    b.register_native("double", |stack: &mut Stack| -> BridgeResult<usize> {
        let n = stack.pop_as_integer()?;
        stack.push_integer(n * 2);
        Ok(1)
    })
    .unwrap();

    b.get_global("double").unwrap();
    b.push_integer(21);
    b.call(1, 1).unwrap();
    assert_eq!(b.pop_as_integer().unwrap(), 42);
}

/// Unsupported modes never reach the interpreter
#[test]
fn test_open_unsupported_mode_contract() {
    let mut b = bridge();
    // Breaks io.open: a supported mode would now fail the call.
    b.do_string("io = nil", "setup").unwrap();

    let handle = b.open("missing.mode", "bogus").unwrap();
    assert!(handle.is_none());
    assert_eq!(b.status(), None, "status untouched for unsupported modes");
    assert_eq!(b.top(), 0);
}

/// Looking up an undefined function is side-effect free
#[test]
fn test_function_exists_contract() {
    let mut b = bridge();
    b.push_integer(1);

    assert!(!b.function_exists("undefined_name"));
    assert_eq!(b.top(), 1);

    assert!(b.function_exists("print"));
    assert_eq!(b.top(), 1);
}

/// Protected calls report failures without faulting the host
#[test]
fn test_protected_call_contract() {
    let mut b = bridge();
    b.push_integer(100);
    b.get_global("error").unwrap();
    b.push_string("kaboom").unwrap();
    b.push_integer(0);

    let err = b.call(2, 3).unwrap_err();
    assert_eq!(err, BridgeError::CallFailed("kaboom".to_string()));
    assert_eq!(b.top(), 2, "callable and args replaced by one error value");
    assert_eq!(b.pop_as_string().unwrap(), "kaboom");
    assert_eq!(b.pop_as_integer().unwrap(), 100);
}

/// Tables with a `__call` metamethod are callables; plain tables are not
#[test]
fn test_callable_table_contract() {
    let mut b = bridge();
    b.do_string(
        "inc = setmetatable({}, { __call = function(self, x) return x + 1 end }) plain = {}",
        "callables",
    )
    .unwrap();

    b.get_global("inc").unwrap();
    b.push_integer(41);
    b.call(1, 1).unwrap();
    assert_eq!(b.pop_as_integer().unwrap(), 42);
    assert_eq!(b.top(), 0);

    b.get_global("plain").unwrap();
    b.push_integer(41);
    let err = b.call(1, 1).unwrap_err();
    assert_eq!(
        err,
        BridgeError::CallFailed("attempt to call a table value".to_string())
    );
    assert_eq!(b.pop_as_string().unwrap(), "attempt to call a table value");
    assert_eq!(b.top(), 0);
}

/// A `__call` callable keeps the exact result count and error reporting
#[test]
fn test_callable_table_results_and_errors_contract() {
    let mut b = bridge();
    b.do_string(
        "pair = setmetatable({}, { __call = function(self, a, b) return b, a end })
         boom = setmetatable({}, { __call = function() error('inside', 0) end })",
        "callables",
    )
    .unwrap();

    b.get_global("pair").unwrap();
    b.push_integer(1);
    b.push_integer(2);
    b.call(2, 3).unwrap();
    assert_eq!(b.top(), 3);
    assert!(b.is_nil(-1));
    b.pop();
    assert_eq!(b.pop_as_integer().unwrap(), 1);
    assert_eq!(b.pop_as_integer().unwrap(), 2);

    b.get_global("boom").unwrap();
    let err = b.call(0, 0).unwrap_err();
    assert_eq!(err, BridgeError::CallFailed("inside".to_string()));
    assert_eq!(b.top(), 1);
}

/// A handle from one bridge is rejected by another
#[test]
fn test_reference_belongs_to_its_bridge_contract() {
    let mut first = bridge();
    let mut second = bridge();

    first.push_string("mine").unwrap();
    let handle = first.to_reference().unwrap();
    second.push_string("theirs").unwrap();
    second.to_reference().unwrap();

    assert_eq!(
        second.from_reference(handle),
        Err(BridgeError::InvalidReference(handle))
    );
    assert_eq!(second.top(), 0);

    first.from_reference(handle).unwrap();
    assert_eq!(first.pop_as_string().unwrap(), "mine");
}
