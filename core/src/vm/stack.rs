//! The unified stack: evaluation values and call/scope frames share one
//! vector of typed frames.

use crate::bytecode::FrameKind;
use crate::values::{Gc, PropMap, Value};

/// One frame. Non-value frames all carry a `locals` scope; loop, try, and
/// function frames additionally carry control-flow offsets.
#[derive(Debug)]
pub enum Frame {
    Value(Value),
    Block {
        locals: PropMap,
    },
    Loop {
        locals: PropMap,
        ingress: u32,
        egress: u32,
    },
    Try {
        locals: PropMap,
        egress: u32,
    },
    Function {
        locals: PropMap,
        /// Return-to offset; `0` marks a host-entry frame, whose `return`
        /// unwinds all the way back to the host.
        egress: u32,
        /// The script callee, once `call` binds it; `None` while a native
        /// call is in flight. Resolution searches the callee's closure
        /// through this.
        callee: Option<Gc>,
        /// The argument buffer; spread makes its length a runtime matter.
        arguments: Vec<Value>,
        /// Read cursor for the parameter-binding prologue.
        cursor: u16,
    },
}

impl Frame {
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Value(_) => FrameKind::Value,
            Frame::Block { .. } => FrameKind::Block,
            Frame::Loop { .. } => FrameKind::Loop,
            Frame::Try { .. } => FrameKind::Try,
            Frame::Function { .. } => FrameKind::Function,
        }
    }

    pub fn block() -> Frame {
        Frame::Block {
            locals: PropMap::new(),
        }
    }

    pub fn looping(ingress: u32, egress: u32) -> Frame {
        Frame::Loop {
            locals: PropMap::new(),
            ingress,
            egress,
        }
    }

    pub fn trying(egress: u32) -> Frame {
        Frame::Try {
            locals: PropMap::new(),
            egress,
        }
    }

    pub fn function(egress: u32) -> Frame {
        Frame::Function {
            locals: PropMap::new(),
            egress,
            callee: None,
            arguments: Vec::new(),
            cursor: 0,
        }
    }

    /// The frame's own scope; `None` for value frames.
    pub fn locals(&self) -> Option<&PropMap> {
        match self {
            Frame::Value(_) => None,
            Frame::Block { locals }
            | Frame::Loop { locals, .. }
            | Frame::Try { locals, .. }
            | Frame::Function { locals, .. } => Some(locals),
        }
    }

    pub fn locals_mut(&mut self) -> Option<&mut PropMap> {
        match self {
            Frame::Value(_) => None,
            Frame::Block { locals }
            | Frame::Loop { locals, .. }
            | Frame::Try { locals, .. }
            | Frame::Function { locals, .. } => Some(locals),
        }
    }
}

/// Stack helpers. Shape violations (peeking past the bottom, popping a
/// non-value as a value) are compiled-code invariants and panic.
#[derive(Debug, Default)]
pub struct FrameStack {
    frames: Vec<Frame>,
}

impl FrameStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Bottom-up index access, for resolution walks that need split borrows.
    pub fn get(&self, index: usize) -> &Frame {
        &self.frames[index]
    }

    pub fn get_mut(&mut self, index: usize) -> &mut Frame {
        &mut self.frames[index]
    }

    pub fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub fn push_value(&mut self, value: Value) {
        self.frames.push(Frame::Value(value));
    }

    /// Depth counts from the top: 0 is the topmost frame.
    pub fn peek(&self, depth: usize) -> &Frame {
        let index = self
            .frames
            .len()
            .checked_sub(1 + depth)
            .expect("stack underflow");
        &self.frames[index]
    }

    pub fn peek_mut(&mut self, depth: usize) -> &mut Frame {
        let index = self
            .frames
            .len()
            .checked_sub(1 + depth)
            .expect("stack underflow");
        &mut self.frames[index]
    }

    pub fn peek_value(&self, depth: usize) -> Value {
        match self.peek(depth) {
            Frame::Value(value) => *value,
            other => panic!("expected value frame at depth {depth}, found {other:?}"),
        }
    }

    pub fn pop_n(&mut self, count: usize) {
        debug_assert!(self.frames.len() >= count, "stack underflow");
        self.frames.truncate(self.frames.len() - count);
    }

    pub fn pop_value(&mut self) -> Value {
        let value = self.peek_value(0);
        self.pop_n(1);
        value
    }

    /// Pop frames until the top is of `kind`. Returns false (with the stack
    /// emptied) if no such frame exists.
    pub fn pop_to(&mut self, kind: FrameKind) -> bool {
        while let Some(top) = self.frames.last() {
            if top.kind() == kind {
                return true;
            }
            self.frames.pop();
        }
        false
    }

    /// Swap the frames at two depths (for the `::` bind rotation).
    pub fn swap(&mut self, a: usize, b: usize) {
        let len = self.frames.len();
        let ia = len.checked_sub(1 + a).expect("stack underflow");
        let ib = len.checked_sub(1 + b).expect("stack underflow");
        self.frames.swap(ia, ib);
    }
}
