//! Core of the Quill scripting engine: compiler, bytecode, and virtual
//! machine for a small JavaScript-like dynamically typed language.
//!
//! The pipeline is `source text -> tokens -> bytecode -> result`:
//!
//! ```ignore
//! use quill_core::{compile, stdlib, lexer::Token, vm::Vm};
//!
//! let mut vm = Vm::new();
//! stdlib::install(&mut vm).unwrap();
//! let mut token = Token::default();
//! compile("return 40 + 2;", &mut token, vm.program_mut()).unwrap();
//! let result = vm.run().unwrap();
//! assert_eq!(result.as_number(), Some(42.0));
//! ```
//!
//! Compilation is single-pass: the recursive-descent parser in [`compiler`]
//! emits bytecode directly into a [`bytecode::Program`], with no AST in
//! between. The [`vm`] executes that byte stream on a unified stack of typed
//! frames, with managed values owned by a mark-and-sweep [`values::Heap`].

pub mod bytecode;
pub mod compiler;
pub mod lexer;
pub mod stdlib;
pub mod values;
pub mod vm;

pub use bytecode::Program;
pub use compiler::{CompileError, compile};
pub use values::{Gc, Heap, Outcome, PropMap, Value};
pub use vm::{NativeFn, Vm};
