//! The virtual machine: a unified stack of typed frames, the bytecode
//! dispatch loop (in [`runtime`]), variable resolution, and the host-facing
//! API (declare/put/get/delete, reentrant `call`, `gc`).

pub mod stack;

mod runtime;


pub use crate::values::NativeFn;

use crate::bytecode::Program;
use crate::values::value::string_text;
use crate::values::{Heap, Outcome, PropMap, Value};
use crate::vm::stack::{Frame, FrameStack};

/// One executing context. Strictly single-threaded: bytecode, heap, stack,
/// globals, and program counter all belong to it exclusively.
#[derive(Debug, Default)]
pub struct Vm {
    pub(crate) program: Program,
    pub(crate) heap: Heap,
    pub(crate) globals: PropMap,
    pub(crate) stack: FrameStack,
    pub(crate) pc: u32,
}

impl Vm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run previously compiled (e.g. disk-loaded) bytecode from offset 0.
    pub fn with_program(program: Program) -> Self {
        Vm {
            program,
            ..Self::default()
        }
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// The compiler appends here; inscriptions keep working because values
    /// hold offsets, not addresses.
    pub fn program_mut(&mut self) -> &mut Program {
        &mut self.program
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    /// Next instruction offset. The REPL snapshots and restores this when a
    /// line fails.
    pub fn pc(&self) -> u32 {
        self.pc
    }

    pub fn set_pc(&mut self, pc: u32) {
        self.pc = pc;
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    // === Variable resolution ===
    //
    // Scopes are searched newest-frame-first: each non-value frame's locals,
    // and for function frames also the callee's captured closure. The
    // globals map is consulted last and only it receives top-level declares.

    fn current_scope_mut<'a>(
        stack: &'a mut FrameStack,
        globals: &'a mut PropMap,
    ) -> &'a mut PropMap {
        match stack.frames().iter().rposition(|f| f.locals().is_some()) {
            Some(index) => stack
                .get_mut(index)
                .locals_mut()
                .expect("frame has locals"),
            None => globals,
        }
    }

    fn declare_inner(
        stack: &mut FrameStack,
        globals: &mut PropMap,
        name: &str,
        value: Value,
    ) -> bool {
        let scope = Self::current_scope_mut(stack, globals);
        if scope.get(name) != Value::Undefined {
            return false;
        }
        scope.put(name, value);
        true
    }

    fn delete_inner(stack: &mut FrameStack, globals: &mut PropMap, name: &str) -> bool {
        let scope = Self::current_scope_mut(stack, globals);
        if scope.get(name) == Value::Undefined {
            return false;
        }
        scope.delete(name);
        true
    }

    fn get_inner(
        stack: &FrameStack,
        globals: &PropMap,
        heap: &Heap,
        name: &str,
    ) -> Option<Value> {
        for frame in stack.frames().iter().rev() {
            if let Some(locals) = frame.locals() {
                let found = locals.get(name);
                if found != Value::Undefined {
                    return Some(found);
                }
            }
            // nested functions may capture through several closure layers,
            // so every function frame's closure on the way down is searched
            if let Frame::Function {
                callee: Some(gc), ..
            } = frame
            {
                let found = heap.function(*gc).closure.get(name);
                if found != Value::Undefined {
                    return Some(found);
                }
            }
        }
        let found = globals.get(name);
        (found != Value::Undefined).then_some(found)
    }

    fn put_inner(
        stack: &mut FrameStack,
        globals: &mut PropMap,
        heap: &mut Heap,
        name: &str,
        value: Value,
    ) -> bool {
        for index in (0..stack.len()).rev() {
            if let Some(locals) = stack.get_mut(index).locals_mut() {
                if locals.get(name) != Value::Undefined {
                    locals.put(name, value);
                    return true;
                }
            }
            if let Frame::Function {
                callee: Some(gc), ..
            } = stack.get(index)
            {
                let gc = *gc;
                if heap.function(gc).closure.get(name) != Value::Undefined {
                    // closures are shared state on the function value
                    heap.function_mut(gc).closure.put(name, value);
                    return true;
                }
            }
        }
        if globals.get(name) != Value::Undefined {
            globals.put(name, value);
            return true;
        }
        false
    }

    // === Host API ===

    /// Bind `name` in the innermost scope (globals when no frame is live).
    /// Redeclaring an existing name in the same scope is an error.
    pub fn declare_variable(&mut self, name: &str, value: Value) -> Outcome {
        if Self::declare_inner(&mut self.stack, &mut self.globals, name, value) {
            Ok(Value::Null)
        } else {
            Err(self
                .heap
                .alloc_string(format!("Variable \"{name}\" already exists")))
        }
    }

    /// Remove `name` from the innermost scope.
    pub fn delete_variable(&mut self, name: &str) -> Outcome {
        if Self::delete_inner(&mut self.stack, &mut self.globals, name) {
            Ok(Value::Null)
        } else {
            Err(self.variable_not_found(name))
        }
    }

    pub fn get_variable(&mut self, name: &str) -> Outcome {
        match Self::get_inner(&self.stack, &self.globals, &self.heap, name) {
            Some(value) => Ok(value),
            None => Err(self.variable_not_found(name)),
        }
    }

    pub fn put_variable(&mut self, name: &str, value: Value) -> Outcome {
        if Self::put_inner(
            &mut self.stack,
            &mut self.globals,
            &mut self.heap,
            name,
            value,
        ) {
            Ok(Value::Null)
        } else {
            Err(self.variable_not_found(name))
        }
    }

    pub(crate) fn variable_not_found(&mut self, name: &str) -> Value {
        self.heap
            .alloc_string(format!("Variable \"{name}\" not found"))
    }

    /// Call a script or native callable from the host. Reentrant: the callee
    /// runs on this VM's stack behind a host-entry function frame
    /// (`egress == 0`), and `return` or an uncaught throw unwinds back here.
    pub fn call(&mut self, callee: Value, arguments: &[Value]) -> Outcome {
        match callee {
            Value::Function(gc) => {
                self.stack.push_value(callee);
                self.stack.push(Frame::Function {
                    locals: PropMap::new(),
                    egress: 0,
                    callee: Some(gc),
                    arguments: arguments.to_vec(),
                    cursor: 0,
                });
                let saved_pc = self.pc;
                self.pc = self.heap.function(gc).ingress;
                let result = self.run();
                self.pc = saved_pc;
                result
            }
            Value::Native(function) => {
                // the frame keeps the arguments rooted across the call
                self.stack.push_value(callee);
                self.stack.push(Frame::Function {
                    locals: PropMap::new(),
                    egress: 0,
                    callee: None,
                    arguments: arguments.to_vec(),
                    cursor: 0,
                });
                let result = function(self, arguments);
                self.stack.pop_n(2);
                result
            }
            other => Err(self
                .heap
                .alloc_string(format!("Value of type {} is not callable", other.type_name()))),
        }
    }

    pub fn call_by_name(&mut self, name: &str, arguments: &[Value]) -> Outcome {
        let callee = self.get_variable(name)?;
        self.call(callee, arguments)
    }

    /// Synchronous full collection. Roots: globals, every frame's locals,
    /// every value frame's value, and every function frame's callee and
    /// argument buffer (so in-flight native-call arguments survive).
    pub fn gc(&mut self) {
        for (_, value) in self.globals.iter() {
            self.heap.mark(value);
        }
        for frame in self.stack.frames() {
            match frame {
                Frame::Value(value) => self.heap.mark(*value),
                other => {
                    for (_, value) in other.locals().expect("non-value frame").iter() {
                        self.heap.mark(value);
                    }
                    if let Frame::Function {
                        callee, arguments, ..
                    } = other
                    {
                        if let Some(gc) = callee {
                            self.heap.mark(Value::Function(*gc));
                        }
                        for value in arguments {
                            self.heap.mark(*value);
                        }
                    }
                }
            }
        }
        self.heap.sweep();
    }

    // === Printing ===

    /// Human-facing rendering: strings print raw, containers JSON-ish.
    pub fn display_value(&self, value: Value) -> String {
        let mut out = String::new();
        self.write_value(&mut out, value, false, 0);
        out
    }

    fn write_value(&self, out: &mut String, value: Value, quoted: bool, depth: usize) {
        if depth > 32 {
            out.push_str("...");
            return;
        }
        match value {
            Value::Undefined => out.push_str("undefined"),
            Value::Null => out.push_str("null"),
            Value::Boolean(b) => out.push_str(if b { "true" } else { "false" }),
            Value::Number(n) => {
                out.push_str(&n.to_string());
            }
            Value::Scripture(_) | Value::Inscription { .. } | Value::String(_) => {
                let text = string_text(value, &self.heap, &self.program).expect("string value");
                if quoted {
                    out.push('"');
                    out.push_str(text);
                    out.push('"');
                } else {
                    out.push_str(text);
                }
            }
            Value::Array(gc) => {
                out.push('[');
                for (i, element) in self.heap.array(gc).iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    let element = if *element == Value::Undefined {
                        Value::Null
                    } else {
                        *element
                    };
                    self.write_value(out, element, true, depth + 1);
                }
                out.push(']');
            }
            Value::Object(gc) => {
                out.push('{');
                for (i, (key, member)) in self.heap.object(gc).iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(key);
                    out.push(':');
                    self.write_value(out, member, true, depth + 1);
                }
                out.push('}');
            }
            Value::Function(_) => out.push_str("<function>"),
            Value::Native(_) => out.push_str("<c_function>"),
        }
    }

    /// Diagnostic dump of heap, globals, stack, and program counter, for the
    /// REPL's `/d` and the `dump` binding.
    pub fn dump_state(&self) -> String {
        use core::fmt::Write;
        let mut out = String::new();
        let _ = writeln!(
            out,
            "heap: {} live bodies, {} bytecode bytes, pc={}",
            self.heap.live_count(),
            self.program.len(),
            self.pc
        );
        let _ = writeln!(out, "globals:");
        for (name, value) in self.globals.iter() {
            let _ = writeln!(out, "    {name} = {}", self.display_value(value));
        }
        let _ = writeln!(out, "stack ({} frames):", self.stack.len());
        for (depth, frame) in self.stack.frames().iter().rev().enumerate() {
            match frame {
                Frame::Value(value) => {
                    let _ = writeln!(out, "    {depth}: value {}", self.display_value(*value));
                }
                Frame::Block { locals } => {
                    let _ = writeln!(out, "    {depth}: block ({} locals)", locals.len());
                }
                Frame::Loop {
                    locals,
                    ingress,
                    egress,
                } => {
                    let _ = writeln!(
                        out,
                        "    {depth}: loop ingress={ingress} egress={egress} ({} locals)",
                        locals.len()
                    );
                }
                Frame::Try { locals, egress } => {
                    let _ = writeln!(out, "    {depth}: try egress={egress} ({} locals)", locals.len());
                }
                Frame::Function {
                    locals,
                    egress,
                    callee,
                    arguments,
                    ..
                } => {
                    let ingress = callee.map(|gc| self.heap.function(gc).ingress);
                    let _ = writeln!(
                        out,
                        "    {depth}: function egress={egress} ingress={ingress:?} \
                         ({} locals, {} arguments)",
                        locals.len(),
                        arguments.len()
                    );
                }
            }
        }
        out
    }
}
