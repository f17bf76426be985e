//! Quill - a small embeddable scripting engine
//!
//! # Overview
//!
//! Quill is a JavaScript-like dynamically typed language compiled to a
//! compact byte-addressed instruction stream and executed on a stack machine
//! with a mark-and-sweep heap. It is meant to be embedded: the host owns the
//! VM, registers native functions, and calls script functions back.
//!
//! # Quick Start
//!
//! ```
//! use quill::{Value, Vm, compile, stdlib};
//! use quill::lexer::Token;
//!
//! let mut vm = Vm::new();
//! stdlib::install(&mut vm).unwrap();
//!
//! let mut token = Token::default();
//! compile(
//!     "function fib(n) { if (n < 2) { return n; } return fib(n - 1) + fib(n - 2); } \
//!      return fib(10);",
//!     &mut token,
//!     vm.program_mut(),
//! )
//! .unwrap();
//!
//! assert_eq!(vm.run(), Ok(Value::Number(55.0)));
//! ```
//!
//! # FFI Support
//!
//! Native functions take the VM and an argument slice, and report failure by
//! returning the error branch, which the VM throws into the script:
//!
//! ```
//! use quill::{Outcome, Value, Vm, compile};
//! use quill::lexer::Token;
//!
//! fn double(_vm: &mut Vm, arguments: &[Value]) -> Outcome {
//!     match arguments {
//!         [Value::Number(n)] => Ok(Value::Number(n * 2.0)),
//!         _ => Err(Value::Scripture("double needs one number")),
//!     }
//! }
//!
//! let mut vm = Vm::new();
//! vm.declare_variable("double", Value::Native(double)).unwrap();
//! let mut token = Token::default();
//! compile("return double(21);", &mut token, vm.program_mut()).unwrap();
//! assert_eq!(vm.run(), Ok(Value::Number(42.0)));
//! ```
//!
//! Reentrancy works the other way as well: a native function may call back
//! into the VM with [`Vm::call`], and the host can invoke any script
//! function with [`Vm::call_by_name`].

// Re-export the public API from quill_core
pub use quill_core::bytecode::{self, Program, disassemble};
pub use quill_core::compiler::{CompileError, compile};
pub use quill_core::lexer;
pub use quill_core::stdlib;
pub use quill_core::values::{self, Gc, Heap, Outcome, PropMap, Value};
pub use quill_core::vm::{self, NativeFn, Vm};
