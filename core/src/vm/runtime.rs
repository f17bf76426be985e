//! The dispatch loop. Executes the byte stream instruction by instruction;
//! every potentially failing opcode produces a thrown value that unwinds the
//! frame stack to the nearest `try` frame or out to the host.

use tracing::debug;

use crate::bytecode::{FrameKind, Opcode as Op, Operand};
use crate::values::value::{identical, string_bytes, string_cmp, string_text};
use crate::values::{Outcome, PropMap, Value};
use crate::vm::Vm;
use crate::vm::stack::Frame;

impl Vm {
    /// Execute from the current program counter until the program completes,
    /// a `return` crosses the outermost (or a host-entry) function frame, or
    /// an uncaught throw unwinds past the last `try`.
    pub fn run(&mut self) -> Outcome {
        macro_rules! throw {
            ($error:expr) => {{
                let error = $error;
                match self.unwind(error) {
                    Some(outcome) => return outcome,
                    None => continue,
                }
            }};
        }

        while let Some(ins) = self.program.fetch(&mut self.pc) {
            match ins.opcode {
                Op::Nop => {}

                Op::StackPush => {
                    let kind = FrameKind::from_byte(ins.uint8(0)).expect("bad frame kind");
                    match kind {
                        FrameKind::Value => match ins.operands[1] {
                            Operand::Undefined => self.stack.push_value(Value::Undefined),
                            Operand::Null => self.stack.push_value(Value::Null),
                            Operand::EmptyArray => {
                                let value = self.heap.alloc_array();
                                self.stack.push_value(value);
                            }
                            Operand::EmptyObject => {
                                let value = self.heap.alloc_object();
                                self.stack.push_value(value);
                            }
                            Operand::Boolean(b) => self.stack.push_value(Value::Boolean(b)),
                            Operand::Double(n) => self.stack.push_value(Value::Number(n)),
                            Operand::Inscription { offset, len } => {
                                self.stack.push_value(Value::Inscription { offset, len });
                            }
                            Operand::Function { ingress } => self.push_function_value(ingress),
                            other => panic!("invalid value payload {other:?}"),
                        },
                        FrameKind::Function => self.stack.push(Frame::function(ins.uint32(1))),
                        FrameKind::Try => self.stack.push(Frame::trying(ins.uint32(1))),
                        FrameKind::Block => self.stack.push(Frame::block()),
                        FrameKind::Loop => {
                            self.stack
                                .push(Frame::looping(ins.uint32(1), ins.uint32(2)));
                        }
                    }
                }

                Op::StackPop => self.stack.pop_n(ins.uint8(0) as usize),

                Op::StackDupe => {
                    let value = self.stack.peek_value(ins.uint8(0) as usize);
                    self.stack.push_value(value);
                }

                Op::StackSwap => {
                    self.stack
                        .swap(ins.uint8(0) as usize, ins.uint8(1) as usize);
                }

                Op::VariableDeclare => {
                    let (offset, len) = ins.inscription(0);
                    let value = self.stack.pop_value();
                    if !Self::declare_inner(
                        &mut self.stack,
                        &mut self.globals,
                        self.program.inscription_text(offset, len),
                        value,
                    ) {
                        let name = self.program.inscription_text(offset, len).to_owned();
                        throw!(
                            self.heap
                                .alloc_string(format!("Variable \"{name}\" already exists"))
                        );
                    }
                }

                Op::VariableDelete => {
                    let (offset, len) = ins.inscription(0);
                    if !Self::delete_inner(
                        &mut self.stack,
                        &mut self.globals,
                        self.program.inscription_text(offset, len),
                    ) {
                        let name = self.program.inscription_text(offset, len).to_owned();
                        throw!(self.variable_not_found(&name));
                    }
                }

                Op::VariablePut => {
                    let (offset, len) = ins.inscription(0);
                    let value = self.stack.pop_value();
                    if !Self::put_inner(
                        &mut self.stack,
                        &mut self.globals,
                        &mut self.heap,
                        self.program.inscription_text(offset, len),
                        value,
                    ) {
                        let name = self.program.inscription_text(offset, len).to_owned();
                        throw!(self.variable_not_found(&name));
                    }
                }

                Op::VariableGet => {
                    let (offset, len) = ins.inscription(0);
                    match Self::get_inner(
                        &self.stack,
                        &self.globals,
                        &self.heap,
                        self.program.inscription_text(offset, len),
                    ) {
                        Some(value) => self.stack.push_value(value),
                        None => {
                            let name = self.program.inscription_text(offset, len).to_owned();
                            throw!(self.variable_not_found(&name));
                        }
                    }
                }

                Op::MemberPut => {
                    let value = self.stack.pop_value();
                    let selector = self.stack.pop_value();
                    let container = self.stack.peek_value(0);
                    match (container, selector) {
                        (Value::Array(gc), Value::Number(number)) => {
                            let index = number as usize;
                            if index as f64 != number {
                                throw!(Value::Scripture(
                                    "Invalid array index, must be positive integer"
                                ));
                            }
                            self.heap.array_put(gc, index, value);
                        }
                        (Value::Object(gc), selector) if selector.is_string() => {
                            let key = string_text(selector, &self.heap, &self.program)
                                .expect("string selector")
                                .to_owned();
                            self.heap.object_put(gc, &key, value);
                        }
                        _ => throw!(Value::Scripture("Must be array[number] or object[string]")),
                    }
                }

                Op::MemberGet => {
                    let selector = self.stack.pop_value();
                    let container = self.stack.pop_value();
                    match (container, selector) {
                        (Value::Array(gc), Value::Number(number)) => {
                            let index = number as usize;
                            if index as f64 != number {
                                throw!(Value::Scripture(
                                    "Invalid array index, must be positive integer"
                                ));
                            }
                            let value = self.heap.array_get(gc, index);
                            self.stack.push_value(value);
                        }
                        (Value::Object(gc), selector) if selector.is_string() => {
                            let key = string_text(selector, &self.heap, &self.program)
                                .expect("string selector");
                            let value = self.heap.object_get(gc, key);
                            self.stack.push_value(value);
                        }
                        _ => throw!(Value::Scripture("Must be array[number] or object[string]")),
                    }
                }

                Op::ArrayAppend => {
                    let value = self.stack.pop_value();
                    match self.stack.peek_value(0) {
                        Value::Array(gc) => self.heap.array_push(gc, value),
                        _ => throw!(Value::Scripture("Must be array")),
                    }
                }

                Op::ArraySpread => {
                    let value = self.stack.pop_value();
                    match (self.stack.peek_value(0), value) {
                        (Value::Array(target), Value::Array(source)) => {
                            // holes spread as holes
                            let elements = self.heap.array(source).clone();
                            self.heap.array_mut(target).extend_from_slice(&elements);
                        }
                        _ => throw!(Value::Scripture("Must be array[...array]")),
                    }
                }

                Op::ObjectOptional => {
                    let selector = self.stack.pop_value();
                    let container = self.stack.pop_value();
                    match container {
                        Value::Object(gc) if selector.is_string() => {
                            let key = string_text(selector, &self.heap, &self.program)
                                .expect("string selector");
                            let value = self.heap.object_get(gc, key);
                            self.stack.push_value(value);
                        }
                        _ => self.stack.push_value(Value::Null),
                    }
                }

                Op::Add => {
                    let rhs = self.stack.pop_value();
                    let lhs = self.stack.pop_value();
                    match (lhs, rhs) {
                        (Value::Number(a), Value::Number(b)) => {
                            self.stack.push_value(Value::Number(a + b));
                        }
                        _ if lhs.is_string() && rhs.is_string() => {
                            let mut text = string_text(lhs, &self.heap, &self.program)
                                .expect("string lhs")
                                .to_owned();
                            text.push_str(
                                string_text(rhs, &self.heap, &self.program).expect("string rhs"),
                            );
                            let value = self.heap.alloc_string(text);
                            self.stack.push_value(value);
                        }
                        _ => throw!(Value::Scripture("Add operand must be number or string")),
                    }
                }

                Op::Sub | Op::Mul | Op::Pow | Op::Div | Op::Mod => {
                    let rhs = self.stack.pop_value();
                    let lhs = self.stack.pop_value();
                    let (Value::Number(a), Value::Number(b)) = (lhs, rhs) else {
                        throw!(Value::Scripture("Arithmatic operand must be number"));
                    };
                    let result = match ins.opcode {
                        Op::Sub => a - b,
                        Op::Mul => a * b,
                        Op::Pow => a.powf(b),
                        Op::Div => a / b,
                        _ => a % b,
                    };
                    self.stack.push_value(Value::Number(result));
                }

                Op::Eq | Op::Ne => {
                    let rhs = self.stack.pop_value();
                    let lhs = self.stack.pop_value();
                    let mut equal = if identical(lhs, rhs) {
                        true
                    } else if let (Value::Number(a), Value::Number(b)) = (lhs, rhs) {
                        // IEEE equality, so +0 == -0 and NaN != NaN
                        a == b
                    } else if lhs.is_string() && rhs.is_string() {
                        string_bytes(lhs, &self.heap, &self.program)
                            == string_bytes(rhs, &self.heap, &self.program)
                    } else {
                        false
                    };
                    if ins.opcode == Op::Ne {
                        equal = !equal;
                    }
                    self.stack.push_value(Value::Boolean(equal));
                }

                Op::Lt | Op::Le | Op::Gt | Op::Ge => {
                    use core::cmp::Ordering;
                    let rhs = self.stack.pop_value();
                    let lhs = self.stack.pop_value();
                    let outcome = if let (Value::Number(a), Value::Number(b)) = (lhs, rhs) {
                        match ins.opcode {
                            Op::Lt => a < b,
                            Op::Le => a <= b,
                            Op::Gt => a > b,
                            _ => a >= b,
                        }
                    } else if lhs.is_string() && rhs.is_string() {
                        let ordering = string_cmp(lhs, rhs, &self.heap, &self.program);
                        match ins.opcode {
                            Op::Lt => ordering == Ordering::Less,
                            Op::Le => ordering != Ordering::Greater,
                            Op::Gt => ordering == Ordering::Greater,
                            _ => ordering != Ordering::Less,
                        }
                    } else {
                        throw!(Value::Scripture(
                            "Relational operand must be number or string"
                        ));
                    };
                    self.stack.push_value(Value::Boolean(outcome));
                }

                Op::And | Op::Or => {
                    let rhs = self.stack.pop_value();
                    let lhs = self.stack.pop_value();
                    let (Value::Boolean(a), Value::Boolean(b)) = (lhs, rhs) else {
                        throw!(Value::Scripture("Logical operand must be boolean"));
                    };
                    let result = if ins.opcode == Op::And { a && b } else { a || b };
                    self.stack.push_value(Value::Boolean(result));
                }

                Op::Not => {
                    let operand = self.stack.pop_value();
                    let Value::Boolean(b) = operand else {
                        throw!(Value::Scripture("Logical operand must be boolean"));
                    };
                    self.stack.push_value(Value::Boolean(!b));
                }

                Op::Typeof => {
                    let operand = self.stack.pop_value();
                    self.stack.push_value(Value::Scripture(operand.type_name()));
                }

                Op::Jump => self.pc = ins.uint32(0),

                Op::JumpIfTrue | Op::JumpIfFalse => {
                    let condition = self.stack.pop_value();
                    let Value::Boolean(b) = condition else {
                        throw!(Value::Scripture("Conditional jump needs boolean"));
                    };
                    let taken = if ins.opcode == Op::JumpIfTrue { b } else { !b };
                    if taken {
                        self.pc = ins.uint32(0);
                    }
                }

                Op::Break => {
                    let found = self.stack.pop_to(FrameKind::Loop);
                    assert!(found, "break outside any loop frame");
                    let Frame::Loop { egress, .. } = self.stack.peek(0) else {
                        unreachable!()
                    };
                    self.pc = *egress;
                    self.stack.pop_n(1);
                }

                Op::Continue => {
                    let found = self.stack.pop_to(FrameKind::Loop);
                    assert!(found, "continue outside any loop frame");
                    let Frame::Loop { ingress, .. } = self.stack.peek(0) else {
                        unreachable!()
                    };
                    self.pc = *ingress;
                }

                Op::ArgumentFirst => match self.stack.peek_mut(0) {
                    Frame::Function { cursor, .. } => *cursor = 0,
                    other => panic!("argument_first outside function frame: {other:?}"),
                },

                Op::ArgumentAppend => {
                    let value = self.stack.pop_value();
                    match self.stack.peek_mut(0) {
                        Frame::Function { arguments, .. } => arguments.push(value),
                        other => panic!("argument_append outside function frame: {other:?}"),
                    }
                }

                Op::ArgumentSpread => {
                    let value = self.stack.pop_value();
                    let Value::Array(source) = value else {
                        throw!(Value::Scripture("Argument to be spreaded must be array"));
                    };
                    let elements = self.heap.array(source).clone();
                    match self.stack.peek_mut(0) {
                        Frame::Function { arguments, .. } => {
                            // holes surface as null to the callee
                            arguments.extend(elements.into_iter().map(|v| {
                                if v == Value::Undefined { Value::Null } else { v }
                            }));
                        }
                        other => panic!("argument_spread outside function frame: {other:?}"),
                    }
                }

                Op::ArgumentGetNext => {
                    let (offset, len) = ins.inscription(0);
                    // a default value may have been evaluated just before
                    let fallback = if matches!(self.stack.peek(0), Frame::Value(_)) {
                        self.stack.pop_value()
                    } else {
                        Value::Null
                    };
                    let argument = match self.stack.peek_mut(0) {
                        Frame::Function {
                            arguments, cursor, ..
                        } => {
                            let value = arguments
                                .get(*cursor as usize)
                                .copied()
                                .unwrap_or(Value::Null);
                            *cursor += 1;
                            if value == Value::Undefined {
                                Value::Null
                            } else {
                                value
                            }
                        }
                        other => panic!("argument_get_next outside function frame: {other:?}"),
                    };
                    let value = if argument != Value::Null {
                        argument
                    } else {
                        fallback
                    };
                    if !Self::declare_inner(
                        &mut self.stack,
                        &mut self.globals,
                        self.program.inscription_text(offset, len),
                        value,
                    ) {
                        let name = self.program.inscription_text(offset, len).to_owned();
                        throw!(
                            self.heap
                                .alloc_string(format!("Variable \"{name}\" already exists"))
                        );
                    }
                }

                Op::ArgumentGetRest => {
                    let (offset, len) = ins.inscription(0);
                    let rest = match self.stack.peek_mut(0) {
                        Frame::Function {
                            arguments, cursor, ..
                        } => {
                            let start = (*cursor as usize).min(arguments.len());
                            *cursor = arguments.len() as u16;
                            arguments[start..].to_vec()
                        }
                        other => panic!("argument_get_rest outside function frame: {other:?}"),
                    };
                    let array = self.heap.alloc_array();
                    let gc = array.as_gc().expect("fresh array");
                    for value in rest {
                        let value = if value == Value::Undefined {
                            Value::Null
                        } else {
                            value
                        };
                        self.heap.array_push(gc, value);
                    }
                    if !Self::declare_inner(
                        &mut self.stack,
                        &mut self.globals,
                        self.program.inscription_text(offset, len),
                        array,
                    ) {
                        let name = self.program.inscription_text(offset, len).to_owned();
                        throw!(
                            self.heap
                                .alloc_string(format!("Variable \"{name}\" already exists"))
                        );
                    }
                }

                Op::Call => {
                    let callee = self.stack.peek_value(1);
                    match callee {
                        Value::Function(gc) => {
                            match self.stack.peek_mut(0) {
                                Frame::Function { callee, .. } => *callee = Some(gc),
                                other => panic!("call without function frame: {other:?}"),
                            }
                            self.pc = self.heap.function(gc).ingress;
                        }
                        Value::Native(function) => {
                            let arguments = match self.stack.peek(0) {
                                Frame::Function { arguments, .. } => arguments.clone(),
                                other => panic!("call without function frame: {other:?}"),
                            };
                            match function(self, &arguments) {
                                Ok(value) => {
                                    self.stack.pop_n(2);
                                    self.stack.push_value(value);
                                }
                                Err(error) => throw!(error),
                            }
                        }
                        other => {
                            throw!(self.heap.alloc_string(format!(
                                "Value of type {} is not callable",
                                other.type_name()
                            )));
                        }
                    }
                }

                Op::Return => {
                    // bare `return;` has no value frame on top (or, at the
                    // top level, no frame at all)
                    let has_value =
                        !self.stack.is_empty() && matches!(self.stack.peek(0), Frame::Value(_));
                    let value = if has_value {
                        self.stack.pop_value()
                    } else {
                        Value::Null
                    };
                    if !self.stack.pop_to(FrameKind::Function) {
                        // return outside any function ends the program
                        return Ok(value);
                    }
                    let egress = match self.stack.peek(0) {
                        Frame::Function { egress, .. } => *egress,
                        _ => unreachable!(),
                    };
                    if egress == 0 {
                        // called by the host; unwind back through run
                        self.stack.pop_n(2);
                        return Ok(value);
                    }
                    self.pc = egress;
                    self.stack.pop_n(2); // function frame and callee value
                    self.stack.push_value(value);
                }

                Op::ForInNext | Op::ForOfNext => {
                    let egress = ins.uint32(0);
                    let want_key = ins.opcode == Op::ForInNext;
                    let cursor = self.stack.pop_value();
                    let mut index = cursor
                        .as_number()
                        .expect("iteration cursor must be a number")
                        as usize;
                    let container = self.stack.peek_value(0);
                    let mut yielded: Option<Value> = None;
                    let mut pending_key: Option<String> = None;
                    match container {
                        Value::Array(gc) => {
                            let elements = self.heap.array(gc);
                            while index < elements.len() {
                                let element = elements[index];
                                if element != Value::Undefined && element != Value::Null {
                                    yielded = Some(if want_key {
                                        Value::Number(index as f64)
                                    } else {
                                        element
                                    });
                                    break;
                                }
                                index += 1;
                            }
                        }
                        Value::Object(gc) => {
                            let members = self.heap.object(gc);
                            while index < members.capacity() {
                                if let Some((key, member)) = members.slot_at(index) {
                                    if member != Value::Undefined && member != Value::Null {
                                        if want_key {
                                            pending_key = Some(key.to_owned());
                                        } else {
                                            yielded = Some(member);
                                        }
                                        break;
                                    }
                                }
                                index += 1;
                            }
                        }
                        _ => throw!(Value::Scripture(
                            "'for in/of' operand must be array or object"
                        )),
                    }
                    if let Some(key) = pending_key {
                        yielded = Some(self.heap.alloc_string(key));
                    }
                    self.stack.push_value(Value::Number((index + 1) as f64));
                    match yielded {
                        Some(value) => self.stack.push_value(value),
                        None => self.pc = egress,
                    }
                }

                Op::Catch => {
                    let (offset, len) = ins.inscription(0);
                    let egress = ins.uint32(1);
                    let value = self.stack.pop_value();
                    if value == Value::Undefined {
                        // the guarded block completed; skip the catch body
                        self.pc = egress;
                    } else {
                        self.stack.push(Frame::block());
                        if !Self::declare_inner(
                            &mut self.stack,
                            &mut self.globals,
                            self.program.inscription_text(offset, len),
                            value,
                        ) {
                            let name = self.program.inscription_text(offset, len).to_owned();
                            throw!(
                                self.heap
                                    .alloc_string(format!("Variable \"{name}\" already exists"))
                            );
                        }
                    }
                }

                Op::Throw => {
                    let error = self.stack.pop_value();
                    throw!(error);
                }
            }
        }
        Ok(Value::Null)
    }

    /// Construct the function value for a `stack_push function` instruction,
    /// capturing the closure at this very moment: every binding visible in
    /// the enclosing frames, walked top-down to the first script function
    /// frame, whose own captured closure is folded in last.
    fn push_function_value(&mut self, ingress: u32) {
        let value = self.heap.alloc_function(ingress);
        let inside_function = self
            .stack
            .frames()
            .iter()
            .any(|f| matches!(f, Frame::Function { .. }));
        if inside_function {
            // top-level functions need no closure; the globals always resolve
            let mut captured = PropMap::new();
            'capture: for frame in self.stack.frames().iter().rev() {
                if let Some(locals) = frame.locals() {
                    for (name, bound) in locals.iter() {
                        if captured.get(name) == Value::Undefined {
                            captured.put(name, bound);
                        }
                    }
                }
                if let Frame::Function {
                    callee: Some(gc), ..
                } = frame
                {
                    for (name, bound) in self.heap.function(*gc).closure.iter() {
                        if captured.get(name) == Value::Undefined {
                            captured.put(name, bound);
                        }
                    }
                    break 'capture;
                }
            }
            let gc = value.as_gc().expect("fresh function");
            self.heap.function_mut(gc).closure = captured;
        }
        self.stack.push_value(value);
    }

    /// Unwind after a throw: pop frames until a `try` frame accepts the
    /// error (push it, resume at the catch header) or a host-entry function
    /// frame bounces it back out of `run`.
    fn unwind(&mut self, error: Value) -> Option<Outcome> {
        while !self.stack.is_empty() {
            match self.stack.peek(0) {
                Frame::Try { egress, .. } => {
                    self.pc = *egress;
                    self.stack.pop_n(1);
                    self.stack.push_value(error);
                    return None;
                }
                Frame::Function { egress: 0, .. } => {
                    // host boundary: drop the entry frame and its callee so
                    // the next reentrant call starts clean
                    self.stack.pop_n(2);
                    return Some(Err(error));
                }
                _ => self.stack.pop_n(1),
            }
        }
        debug!("uncaught error reached the stack bottom");
        Some(Err(error))
    }
}
