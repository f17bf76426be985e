//! Single-pass compiler: recursive descent over filtered tokens, emitting
//! bytecode directly. There is no AST; forward control flow is wired up by
//! emitting placeholder jumps and patching them once the target offset is
//! known.
//!
//! Precedence, lowest to highest: ternary, logical-or, logical-and,
//! relational/equality, additive, multiplicative, exponentiation, prefix
//! (`typeof` `!` unary `+`/`-`), access/call (member, index, `?.`, bind
//! `::`, call).
//!
//! Errors are threaded through `Result` returns; after a failure, partial
//! bytecode may remain in the program buffer and callers are expected to
//! discard or roll it back.

mod error;

#[cfg(test)]
mod tests;

pub use error::CompileError;

use crate::bytecode::{EmitOperand as O, FrameKind, Opcode as Op, Program};
use crate::lexer::{Token, TokenState as Ts, scan_filtered};

/// Compile statements from `source` until end of input, appending to
/// `program`. Idempotent over fresh state; the REPL calls it repeatedly with
/// the same growing source buffer and persistent token.
pub fn compile(source: &str, token: &mut Token, program: &mut Program) -> Result<(), CompileError> {
    let mut parser = Parser {
        source,
        token,
        program,
    };
    // only this loop treats end-of-file specially; everywhere else it is an
    // ordinary non-matching token
    parser.advance()?;
    if parser.token.state == Ts::EndOfFile {
        return Ok(());
    }
    loop {
        parser.statement(false)?;
        if parser.token.state == Ts::EndOfFile {
            return Ok(());
        }
    }
}

/// Decode string-literal escapes. `\a \b \f \n \r \t \v` follow C; `\u` is
/// kept verbatim; any other escaped byte stands for itself.
fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut control = false;
    for ch in text.chars() {
        if control {
            match ch {
                'u' => out.push_str("\\u"),
                'a' => out.push('\x07'),
                'b' => out.push('\x08'),
                'f' => out.push('\x0c'),
                'n' => out.push('\n'),
                'r' => out.push('\r'),
                't' => out.push('\t'),
                'v' => out.push('\x0b'),
                other => out.push(other),
            }
            control = false;
        } else if ch == '\\' {
            control = true;
        } else {
            out.push(ch);
        }
    }
    out
}

/// What the accessor machinery has left on the stack, which decides how an
/// l-value is read and written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Accessor<'s> {
    /// A plain value is on the stack.
    Value,
    /// Nothing is on the stack yet; the name resolves through scopes.
    Identifier(&'s str),
    /// Container and key are on the stack.
    MemberAccess,
    /// Container and key are on the stack, `?.` flavored.
    OptionalChaining,
}

struct Parser<'s, 'p> {
    source: &'s str,
    token: &'p mut Token,
    program: &'p mut Program,
}

impl<'s> Parser<'s, '_> {
    fn advance(&mut self) -> Result<(), CompileError> {
        scan_filtered(self.source, self.token)
    }

    fn fail(&self, message: impl Into<String>) -> CompileError {
        CompileError::at(self.source, self.token, message)
    }

    fn expect(&mut self, state: Ts) -> Result<(), CompileError> {
        if self.token.state == state {
            self.advance()
        } else {
            Err(self.fail(format!("Expect {state:?}")))
        }
    }

    fn text(&self) -> &'s str {
        self.token.text(self.source)
    }

    fn here(&self) -> u32 {
        self.program.len()
    }

    /// Emit with a cross-reference entry for the current line.
    fn emit(&mut self, opcode: Op, operands: &[O]) {
        self.program.record_line(self.token.head_line);
        self.program.emit(opcode, operands);
    }

    fn patch(&mut self, at: u32, opcode: Op, operands: &[O]) {
        self.program.patch(at, opcode, operands);
    }

    fn emit_push_value(&mut self, payload: O) {
        self.emit(
            Op::StackPush,
            &[O::Uint8(FrameKind::Value as u8), payload],
        );
    }

    fn emit_pop(&mut self, count: u8) {
        self.emit(Op::StackPop, &[O::Uint8(count)]);
    }

    // === Literals ===

    fn value_literal(&mut self) -> Result<(), CompileError> {
        match self.token.state {
            Ts::Null => {
                self.emit_push_value(O::Null);
                self.advance()
            }
            Ts::True => {
                self.emit_push_value(O::Boolean(true));
                self.advance()
            }
            Ts::False => {
                self.emit_push_value(O::Boolean(false));
                self.advance()
            }
            Ts::Number => {
                self.emit_push_value(O::Double(self.token.number));
                self.advance()
            }
            Ts::String => {
                let decoded = unescape(self.token.string_text(self.source));
                self.emit_push_value(O::Inscription(&decoded));
                self.advance()
            }
            Ts::LeftBracket => self.array_literal(),
            Ts::LeftBrace => self.object_literal(),
            Ts::Function => {
                self.advance()?;
                self.function_literal()
            }
            _ => Err(self.fail("Not a value literal")),
        }
    }

    fn array_literal(&mut self) -> Result<(), CompileError> {
        self.emit_push_value(O::EmptyArray);
        self.advance()?;
        if self.token.state == Ts::RightBracket {
            return self.advance();
        }
        loop {
            if self.token.state == Ts::Spread {
                self.advance()?;
                self.expression()?;
                self.emit(Op::ArraySpread, &[]);
            } else {
                self.expression()?;
                self.emit(Op::ArrayAppend, &[]);
            }
            match self.token.state {
                Ts::Comma => self.advance()?,
                Ts::RightBracket => return self.advance(),
                _ => return Err(self.fail("Expect , or ]")),
            }
        }
    }

    fn object_literal(&mut self) -> Result<(), CompileError> {
        self.emit_push_value(O::EmptyObject);
        self.advance()?;
        if self.token.state == Ts::RightBrace {
            return self.advance();
        }
        loop {
            match self.token.state {
                Ts::String => {
                    let decoded = unescape(self.token.string_text(self.source));
                    self.emit_push_value(O::Inscription(&decoded));
                }
                Ts::Identifier => {
                    let key = self.text();
                    self.emit_push_value(O::Inscription(key));
                }
                _ => return Err(self.fail("Expect string or identifier")),
            }
            self.advance()?;
            self.expect(Ts::Colon)?;
            self.expression()?;
            self.emit(Op::MemberPut, &[]);
            match self.token.state {
                Ts::Comma => self.advance()?,
                Ts::RightBrace => return self.advance(),
                _ => return Err(self.fail("Expect , or }")),
            }
        }
    }

    /// `function` keyword (and any name) already consumed. Emits a jump over
    /// the body, the parameter prologue, the body, a trailing `return`, and
    /// finally the push of the function value.
    fn function_literal(&mut self) -> Result<(), CompileError> {
        let skip_at = self.here();
        self.emit(Op::Jump, &[O::Uint32(0)]);
        let ingress = self.here();
        self.expect(Ts::LeftParenthesis)?;
        if self.token.state == Ts::RightParenthesis {
            self.advance()?;
        } else {
            self.emit(Op::ArgumentFirst, &[]);
            loop {
                if self.token.state == Ts::Spread {
                    self.advance()?;
                    if self.token.state != Ts::Identifier {
                        return Err(self.fail("Expect parameter name"));
                    }
                    let name = self.text();
                    self.emit(Op::ArgumentGetRest, &[O::Inscription(name)]);
                    self.advance()?;
                    self.expect(Ts::RightParenthesis)?;
                    break;
                }
                if self.token.state != Ts::Identifier {
                    return Err(self.fail("Expect parameter name"));
                }
                let name = self.text();
                self.advance()?;
                if self.token.state == Ts::Assignment {
                    // default value, evaluated when the argument is absent
                    self.advance()?;
                    self.expression()?;
                }
                self.emit(Op::ArgumentGetNext, &[O::Inscription(name)]);
                match self.token.state {
                    Ts::Comma => self.advance()?,
                    Ts::RightParenthesis => {
                        self.advance()?;
                        break;
                    }
                    _ => return Err(self.fail("Expect , or )")),
                }
            }
        }
        self.expect(Ts::LeftBrace)?;
        while self.token.state != Ts::RightBrace {
            self.statement(false)?;
        }
        self.advance()?;
        self.emit(Op::Return, &[]); // default return at function end
        let egress = self.here();
        self.emit(
            Op::StackPush,
            &[O::Uint8(FrameKind::Value as u8), O::Function(ingress)],
        );
        self.patch(skip_at, Op::Jump, &[O::Uint32(egress)]);
        Ok(())
    }

    // === Accessors ===

    fn accessor_put(&mut self, accessor: Accessor) -> Result<(), CompileError> {
        match accessor {
            Accessor::Identifier(name) => {
                self.emit(Op::VariablePut, &[O::Inscription(name)]);
                Ok(())
            }
            Accessor::MemberAccess => {
                self.emit(Op::MemberPut, &[]);
                self.emit_pop(1); // member_put leaves the container
                Ok(())
            }
            _ => Err(self.fail("Illegal accessor type for put operation")),
        }
    }

    fn accessor_get(&mut self, accessor: Accessor) {
        match accessor {
            Accessor::Identifier(name) => self.emit(Op::VariableGet, &[O::Inscription(name)]),
            Accessor::MemberAccess => self.emit(Op::MemberGet, &[]),
            Accessor::OptionalChaining => self.emit(Op::ObjectOptional, &[]),
            Accessor::Value => {}
        }
    }

    /// Parse a primary plus its whole access/bind/call chain, leaving the
    /// last step unresolved so assignment can decide between get and put.
    fn accessor(&mut self) -> Result<Accessor<'s>, CompileError> {
        // a pending `::` bind value waiting for the next call to consume it
        let mut bind = false;
        'beginning: loop {
            let mut accessor = match self.token.state {
                Ts::LeftParenthesis => {
                    self.advance()?;
                    self.expression()?;
                    self.expect(Ts::RightParenthesis)?;
                    Accessor::Value
                }
                Ts::Identifier => {
                    let name = self.text();
                    self.advance()?;
                    Accessor::Identifier(name)
                }
                _ => {
                    self.value_literal()?;
                    Accessor::Value
                }
            };
            loop {
                match self.token.state {
                    Ts::LeftBracket => {
                        self.advance()?;
                        self.accessor_get(accessor);
                        self.additive_expression()?;
                        self.expect(Ts::RightBracket)?;
                        accessor = Accessor::MemberAccess;
                    }
                    Ts::MemberAccess => {
                        self.advance()?;
                        self.accessor_get(accessor);
                        if self.token.state != Ts::Identifier {
                            return Err(self.fail("Must be object.identifier"));
                        }
                        let key = self.text();
                        self.emit_push_value(O::Inscription(key));
                        self.advance()?;
                        accessor = Accessor::MemberAccess;
                    }
                    Ts::OptionalChaining => {
                        self.advance()?;
                        self.accessor_get(accessor);
                        if self.token.state != Ts::Identifier {
                            return Err(self.fail("Must be object?.identifier"));
                        }
                        let key = self.text();
                        self.emit_push_value(O::Inscription(key));
                        self.advance()?;
                        accessor = Accessor::OptionalChaining;
                    }
                    Ts::DoubleColon => {
                        self.advance()?;
                        self.accessor_get(accessor);
                        bind = true;
                        // the bound callee must restart from a primary
                        continue 'beginning;
                    }
                    Ts::LeftParenthesis => {
                        self.advance()?;
                        self.accessor_get(accessor);
                        let call_at = self.here();
                        self.emit(
                            Op::StackPush,
                            &[O::Uint8(FrameKind::Function as u8), O::Uint32(0)],
                        );
                        if bind {
                            // rotate the bind value above the function frame
                            // and hand it over as the first argument
                            self.emit(Op::StackSwap, &[O::Uint8(0), O::Uint8(2)]);
                            self.emit(Op::StackSwap, &[O::Uint8(1), O::Uint8(2)]);
                            self.emit(Op::ArgumentAppend, &[]);
                        }
                        bind = false;
                        if self.token.state == Ts::RightParenthesis {
                            self.advance()?;
                        } else {
                            loop {
                                if self.token.state == Ts::Spread {
                                    self.advance()?;
                                    self.expression()?;
                                    self.emit(Op::ArgumentSpread, &[]);
                                } else {
                                    self.expression()?;
                                    self.emit(Op::ArgumentAppend, &[]);
                                }
                                match self.token.state {
                                    Ts::Comma => self.advance()?,
                                    Ts::RightParenthesis => {
                                        self.advance()?;
                                        break;
                                    }
                                    _ => return Err(self.fail("Expect , or )")),
                                }
                            }
                        }
                        self.emit(Op::Call, &[]);
                        let egress = self.here();
                        self.patch(
                            call_at,
                            Op::StackPush,
                            &[O::Uint8(FrameKind::Function as u8), O::Uint32(egress)],
                        );
                        accessor = Accessor::Value;
                    }
                    _ => break,
                }
            }
            if bind {
                return Err(self.fail("No function consume bind value"));
            }
            return Ok(accessor);
        }
    }

    fn access_call_expression(&mut self) -> Result<(), CompileError> {
        let accessor = self.accessor()?;
        self.accessor_get(accessor);
        Ok(())
    }

    // === Operators, by precedence ===

    fn prefix_expression(&mut self) -> Result<(), CompileError> {
        let state = self.token.state;
        if matches!(state, Ts::Typeof | Ts::Not | Ts::Plus | Ts::Minus) {
            if state == Ts::Minus {
                // unary minus is 0 - x
                self.emit_push_value(O::Double(0.0));
            }
            self.advance()?;
            self.access_call_expression()?;
            match state {
                Ts::Typeof => self.emit(Op::Typeof, &[]),
                Ts::Not => self.emit(Op::Not, &[]),
                Ts::Minus => self.emit(Op::Sub, &[]),
                _ => {} // unary plus is a no-op
            }
            Ok(())
        } else {
            self.access_call_expression()
        }
    }

    fn exponential_expression(&mut self) -> Result<(), CompileError> {
        self.prefix_expression()?;
        while self.token.state == Ts::Exponentiation {
            self.advance()?;
            self.prefix_expression()?;
            self.emit(Op::Pow, &[]);
        }
        Ok(())
    }

    fn multiplicative_expression(&mut self) -> Result<(), CompileError> {
        self.exponential_expression()?;
        while matches!(
            self.token.state,
            Ts::Multiplication | Ts::Division | Ts::Mod
        ) {
            let state = self.token.state;
            self.advance()?;
            self.exponential_expression()?;
            match state {
                Ts::Multiplication => self.emit(Op::Mul, &[]),
                Ts::Division => self.emit(Op::Div, &[]),
                _ => self.emit(Op::Mod, &[]),
            }
        }
        Ok(())
    }

    fn additive_expression(&mut self) -> Result<(), CompileError> {
        self.multiplicative_expression()?;
        while matches!(self.token.state, Ts::Plus | Ts::Minus) {
            let state = self.token.state;
            self.advance()?;
            self.multiplicative_expression()?;
            match state {
                Ts::Plus => self.emit(Op::Add, &[]),
                _ => self.emit(Op::Sub, &[]),
            }
        }
        Ok(())
    }

    /// Relational and equality; deliberately non-associative.
    fn relational_expression(&mut self) -> Result<(), CompileError> {
        self.additive_expression()?;
        let state = self.token.state;
        if matches!(
            state,
            Ts::EqualTo
                | Ts::NotEqualTo
                | Ts::LessThan
                | Ts::LessThanOrEqualTo
                | Ts::GreaterThan
                | Ts::GreaterThanOrEqualTo
        ) {
            self.advance()?;
            self.additive_expression()?;
            match state {
                Ts::EqualTo => self.emit(Op::Eq, &[]),
                Ts::NotEqualTo => self.emit(Op::Ne, &[]),
                Ts::LessThan => self.emit(Op::Lt, &[]),
                Ts::LessThanOrEqualTo => self.emit(Op::Le, &[]),
                Ts::GreaterThan => self.emit(Op::Gt, &[]),
                _ => self.emit(Op::Ge, &[]),
            }
        }
        Ok(())
    }

    /// `&&` short-circuits by duplicating the left value and conditionally
    /// jumping past the rest of the chain; the jump consumes the duplicate.
    fn logical_and_expression(&mut self) -> Result<(), CompileError> {
        let mut pending: Vec<u32> = Vec::new();
        self.relational_expression()?;
        while self.token.state == Ts::And {
            self.emit(Op::StackDupe, &[O::Uint8(0)]);
            pending.push(self.here());
            self.emit(Op::JumpIfFalse, &[O::Uint32(0)]);
            self.advance()?;
            self.relational_expression()?;
            self.emit(Op::And, &[]);
        }
        let egress = self.here();
        for at in pending {
            self.patch(at, Op::JumpIfFalse, &[O::Uint32(egress)]);
        }
        Ok(())
    }

    fn logical_or_expression(&mut self) -> Result<(), CompileError> {
        let mut pending: Vec<u32> = Vec::new();
        self.logical_and_expression()?;
        while self.token.state == Ts::Or {
            self.emit(Op::StackDupe, &[O::Uint8(0)]);
            pending.push(self.here());
            self.emit(Op::JumpIfTrue, &[O::Uint32(0)]);
            self.advance()?;
            self.logical_and_expression()?;
            self.emit(Op::Or, &[]);
        }
        let egress = self.here();
        for at in pending {
            self.patch(at, Op::JumpIfTrue, &[O::Uint32(egress)]);
        }
        Ok(())
    }

    /// Ternary sits at the root. Both arms compile to separate basic blocks
    /// bridged by jumps, so only the taken arm executes.
    fn expression(&mut self) -> Result<(), CompileError> {
        self.logical_or_expression()?;
        if self.token.state == Ts::Question {
            let branch_at = self.here();
            self.emit(Op::JumpIfFalse, &[O::Uint32(0)]);
            self.advance()?;
            self.logical_or_expression()?;
            let skip_at = self.here();
            self.emit(Op::Jump, &[O::Uint32(0)]);
            let alternative = self.here();
            self.expect(Ts::Colon)?;
            self.logical_or_expression()?;
            let egress = self.here();
            self.patch(branch_at, Op::JumpIfFalse, &[O::Uint32(alternative)]);
            self.patch(skip_at, Op::Jump, &[O::Uint32(egress)]);
        }
        Ok(())
    }

    // === Statements ===

    fn assignment_expression(&mut self) -> Result<(), CompileError> {
        let accessor = self.accessor()?;
        let state = self.token.state;
        if state == Ts::Assignment {
            if !matches!(accessor, Accessor::Identifier(_) | Accessor::MemberAccess) {
                return Err(self.fail(
                    "Assignment expression's l-value can only be identifier or member access",
                ));
            }
            self.advance()?;
            self.expression()?;
            self.accessor_put(accessor)?;
        } else if matches!(
            state,
            Ts::PlusAssignment
                | Ts::MinusAssignment
                | Ts::MultiplicationAssignment
                | Ts::ExponentiationAssignment
                | Ts::DivisionAssignment
                | Ts::ModAssignment
                | Ts::PlusPlus
                | Ts::MinusMinus
        ) {
            if !matches!(accessor, Accessor::Identifier(_) | Accessor::MemberAccess) {
                return Err(self.fail(
                    "Assignment expression's l-value can only be identifier or member access",
                ));
            }
            if accessor == Accessor::MemberAccess {
                // keep container and key around for the write-back
                self.emit(Op::StackDupe, &[O::Uint8(1)]);
                self.emit(Op::StackDupe, &[O::Uint8(1)]);
            }
            self.accessor_get(accessor);
            self.advance()?;
            match state {
                Ts::PlusPlus => {
                    self.emit_push_value(O::Double(1.0));
                    self.emit(Op::Add, &[]);
                }
                Ts::MinusMinus => {
                    self.emit_push_value(O::Double(1.0));
                    self.emit(Op::Sub, &[]);
                }
                _ => {
                    self.expression()?;
                    match state {
                        Ts::PlusAssignment => self.emit(Op::Add, &[]),
                        Ts::MinusAssignment => self.emit(Op::Sub, &[]),
                        Ts::MultiplicationAssignment => self.emit(Op::Mul, &[]),
                        Ts::DivisionAssignment => self.emit(Op::Div, &[]),
                        Ts::ModAssignment => self.emit(Op::Mod, &[]),
                        _ => self.emit(Op::Pow, &[]),
                    }
                }
            }
            self.accessor_put(accessor)?;
        } else {
            // expression statement with no assignment; drop leftovers
            match accessor {
                Accessor::Value => self.emit_pop(1),
                Accessor::MemberAccess | Accessor::OptionalChaining => self.emit_pop(2),
                Accessor::Identifier(_) => {}
            }
        }
        Ok(())
    }

    fn declaration_expression(&mut self) -> Result<(), CompileError> {
        self.expect(Ts::Let)?;
        loop {
            if self.token.state != Ts::Identifier {
                return Err(self.fail("Expect variable name"));
            }
            let name = self.text();
            self.advance()?;
            if self.token.state == Ts::Assignment {
                self.advance()?;
                self.expression()?;
            } else {
                self.emit_push_value(O::Null);
            }
            self.emit(Op::VariableDeclare, &[O::Inscription(name)]);
            if self.token.state == Ts::Comma {
                self.advance()?;
            } else {
                return Ok(());
            }
        }
    }

    fn statement(&mut self, in_loop: bool) -> Result<(), CompileError> {
        match self.token.state {
            Ts::Semicolon => self.advance(),
            Ts::LeftBrace => {
                self.emit(Op::StackPush, &[O::Uint8(FrameKind::Block as u8)]);
                self.advance()?;
                while self.token.state != Ts::RightBrace {
                    self.statement(in_loop)?;
                }
                self.emit_pop(1);
                self.advance()
            }
            Ts::If => {
                self.advance()?;
                self.expect(Ts::LeftParenthesis)?;
                self.expression()?;
                let branch_at = self.here();
                self.emit(Op::JumpIfFalse, &[O::Uint32(0)]);
                self.expect(Ts::RightParenthesis)?;
                self.statement(in_loop)?;
                let skip_at = self.here();
                self.emit(Op::Jump, &[O::Uint32(0)]);
                let alternative = self.here();
                if self.token.state == Ts::Else {
                    self.advance()?;
                    self.statement(in_loop)?;
                }
                let egress = self.here();
                self.patch(branch_at, Op::JumpIfFalse, &[O::Uint32(alternative)]);
                self.patch(skip_at, Op::Jump, &[O::Uint32(egress)]);
                Ok(())
            }
            Ts::While => {
                self.advance()?;
                let loop_at = self.here();
                self.emit(
                    Op::StackPush,
                    &[
                        O::Uint8(FrameKind::Loop as u8),
                        O::Uint32(0),
                        O::Uint32(0),
                    ],
                );
                self.expect(Ts::LeftParenthesis)?;
                let ingress = self.here();
                self.expression()?;
                let branch_at = self.here();
                self.emit(Op::JumpIfFalse, &[O::Uint32(0)]);
                self.expect(Ts::RightParenthesis)?;
                self.statement(true)?;
                self.emit(Op::Jump, &[O::Uint32(ingress)]);
                let cleanup = self.here();
                self.emit_pop(1);
                let egress = self.here();
                self.patch(
                    loop_at,
                    Op::StackPush,
                    &[
                        O::Uint8(FrameKind::Loop as u8),
                        O::Uint32(ingress),
                        O::Uint32(egress),
                    ],
                );
                self.patch(branch_at, Op::JumpIfFalse, &[O::Uint32(cleanup)]);
                Ok(())
            }
            Ts::Do => {
                self.advance()?;
                let loop_at = self.here();
                self.emit(
                    Op::StackPush,
                    &[
                        O::Uint8(FrameKind::Loop as u8),
                        O::Uint32(0),
                        O::Uint32(0),
                    ],
                );
                let ingress = self.here();
                self.statement(true)?;
                self.expect(Ts::While)?;
                self.expect(Ts::LeftParenthesis)?;
                self.expression()?;
                self.emit(Op::JumpIfTrue, &[O::Uint32(ingress)]);
                self.expect(Ts::RightParenthesis)?;
                self.expect(Ts::Semicolon)?;
                self.emit_pop(1);
                let egress = self.here();
                self.patch(
                    loop_at,
                    Op::StackPush,
                    &[
                        O::Uint8(FrameKind::Loop as u8),
                        O::Uint32(ingress),
                        O::Uint32(egress),
                    ],
                );
                Ok(())
            }
            Ts::For => self.for_statement(),
            Ts::Break => {
                self.advance()?;
                self.expect(Ts::Semicolon)?;
                if !in_loop {
                    return Err(self.fail("Statement 'break' can't be outside loop"));
                }
                self.emit(Op::Break, &[]);
                Ok(())
            }
            Ts::Continue => {
                self.advance()?;
                self.expect(Ts::Semicolon)?;
                if !in_loop {
                    return Err(self.fail("Statement 'continue' can't be outside loop"));
                }
                self.emit(Op::Continue, &[]);
                Ok(())
            }
            Ts::Function => {
                self.advance()?;
                if self.token.state != Ts::Identifier {
                    return Err(self.fail("Expect function name"));
                }
                let name = self.text();
                self.advance()?;
                self.function_literal()?;
                self.emit(Op::VariableDeclare, &[O::Inscription(name)]);
                Ok(())
            }
            Ts::Return => {
                self.advance()?;
                if self.token.state == Ts::Semicolon {
                    self.advance()?;
                    self.emit(Op::Return, &[]);
                    Ok(())
                } else {
                    self.expression()?;
                    self.emit(Op::Return, &[]);
                    self.expect(Ts::Semicolon)
                }
            }
            Ts::Delete => {
                self.advance()?;
                if self.token.state != Ts::Identifier {
                    return Err(self.fail("Expect identifier"));
                }
                let name = self.text();
                self.emit(Op::VariableDelete, &[O::Inscription(name)]);
                self.advance()?;
                self.expect(Ts::Semicolon)
            }
            Ts::Try => {
                self.advance()?;
                self.expect(Ts::LeftBrace)?;
                let try_at = self.here();
                self.emit(
                    Op::StackPush,
                    &[O::Uint8(FrameKind::Try as u8), O::Uint32(0)],
                );
                while self.token.state != Ts::RightBrace {
                    self.statement(in_loop)?;
                }
                self.emit_pop(1);
                // completion sentinel for the catch header
                self.emit_push_value(O::Undefined);
                let catch_header = self.here();
                self.patch(
                    try_at,
                    Op::StackPush,
                    &[O::Uint8(FrameKind::Try as u8), O::Uint32(catch_header)],
                );
                self.advance()?;
                // 'finally' is not supported, so 'catch' is mandatory
                self.expect(Ts::Catch)?;
                self.expect(Ts::LeftParenthesis)?;
                if self.token.state != Ts::Identifier {
                    return Err(self.fail("Expect variable name"));
                }
                let name = self.text();
                self.advance()?;
                self.expect(Ts::RightParenthesis)?;
                self.expect(Ts::LeftBrace)?;
                let catch_at = self.here();
                self.emit(
                    Op::Catch,
                    &[O::Inscription(name), O::Uint32(0)],
                );
                while self.token.state != Ts::RightBrace {
                    self.statement(in_loop)?;
                }
                self.emit_pop(1);
                let egress = self.here();
                self.patch(
                    catch_at,
                    Op::Catch,
                    &[O::Inscription(name), O::Uint32(egress)],
                );
                self.advance()
            }
            Ts::Throw => {
                self.advance()?;
                self.expression()?;
                self.emit(Op::Throw, &[]);
                self.expect(Ts::Semicolon)
            }
            Ts::Let => {
                self.declaration_expression()?;
                self.expect(Ts::Semicolon)
            }
            _ => {
                self.assignment_expression()?;
                self.expect(Ts::Semicolon)
            }
        }
    }

    fn for_statement(&mut self) -> Result<(), CompileError> {
        enum ForKind {
            Classic,
            ForIn,
            ForOf,
        }
        self.advance()?;
        let loop_at = self.here();
        self.emit(
            Op::StackPush,
            &[
                O::Uint8(FrameKind::Loop as u8),
                O::Uint32(0),
                O::Uint32(0),
            ],
        );
        self.expect(Ts::LeftParenthesis)?;
        let mut accessor = Accessor::Value;
        let kind;
        if self.token.state == Ts::Let {
            self.advance()?;
            if self.token.state != Ts::Identifier {
                return Err(self.fail("Expect variable name"));
            }
            let name = self.text();
            self.advance()?;
            match self.token.state {
                Ts::Assignment => {
                    self.advance()?;
                    self.expression()?;
                    self.emit(Op::VariableDeclare, &[O::Inscription(name)]);
                    self.expect(Ts::Semicolon)?;
                    kind = ForKind::Classic;
                }
                Ts::In | Ts::Of => {
                    // the loop variable lives in the loop frame
                    kind = if self.token.state == Ts::In {
                        ForKind::ForIn
                    } else {
                        ForKind::ForOf
                    };
                    self.advance()?;
                    self.emit_push_value(O::Null);
                    self.emit(Op::VariableDeclare, &[O::Inscription(name)]);
                    accessor = Accessor::Identifier(name);
                }
                _ => return Err(self.fail("Unknown for loop type")),
            }
        } else if self.token.state == Ts::Semicolon {
            self.advance()?;
            kind = ForKind::Classic;
        } else {
            accessor = self.accessor()?;
            match self.token.state {
                Ts::Assignment => {
                    self.advance()?;
                    self.expression()?;
                    self.accessor_put(accessor)?;
                    self.expect(Ts::Semicolon)?;
                    kind = ForKind::Classic;
                }
                Ts::In => {
                    self.advance()?;
                    kind = ForKind::ForIn;
                }
                Ts::Of => {
                    self.advance()?;
                    kind = ForKind::ForOf;
                }
                _ => return Err(self.fail("Unknown for loop type")),
            }
        }
        if matches!(kind, ForKind::Classic) {
            let condition = self.here();
            if self.token.state == Ts::Semicolon {
                // empty condition is true
                self.advance()?;
                self.emit_push_value(O::Boolean(true));
            } else {
                self.expression()?;
                self.expect(Ts::Semicolon)?;
            }
            let branch_at = self.here();
            self.emit(Op::JumpIfFalse, &[O::Uint32(0)]);
            let enter_at = self.here();
            self.emit(Op::Jump, &[O::Uint32(0)]);
            let increment = self.here();
            if self.token.state == Ts::RightParenthesis {
                self.advance()?;
            } else {
                self.assignment_expression()?;
                self.expect(Ts::RightParenthesis)?;
            }
            self.emit(Op::Jump, &[O::Uint32(condition)]);
            let body = self.here();
            self.statement(true)?;
            self.emit(Op::Jump, &[O::Uint32(increment)]);
            let cleanup = self.here();
            self.emit_pop(1);
            let egress = self.here();
            self.patch(
                loop_at,
                Op::StackPush,
                &[
                    O::Uint8(FrameKind::Loop as u8),
                    O::Uint32(increment),
                    O::Uint32(egress),
                ],
            );
            self.patch(branch_at, Op::JumpIfFalse, &[O::Uint32(cleanup)]);
            self.patch(enter_at, Op::Jump, &[O::Uint32(body)]);
        } else {
            let next_op = if matches!(kind, ForKind::ForIn) {
                Op::ForInNext
            } else {
                Op::ForOfNext
            };
            // container, then the numeric cursor
            self.access_call_expression()?;
            self.emit_push_value(O::Double(0.0));
            let ingress = self.here();
            self.emit(next_op, &[O::Uint32(0)]);
            if matches!(accessor, Accessor::Identifier(_)) {
                self.accessor_put(accessor)?;
            } else {
                // re-dupe container and key below the yielded value, then
                // write through the member accessor
                self.emit(Op::StackDupe, &[O::Uint8(4)]);
                self.emit(Op::StackDupe, &[O::Uint8(4)]);
                self.emit(Op::StackDupe, &[O::Uint8(2)]);
                self.accessor_put(accessor)?;
                self.emit_pop(1);
            }
            self.expect(Ts::RightParenthesis)?;
            self.statement(true)?;
            self.emit(Op::Jump, &[O::Uint32(ingress)]);
            let cleanup = self.here();
            let leftovers = if matches!(accessor, Accessor::Identifier(_)) {
                2 // container + cursor
            } else {
                4 // container-of-accessor + key + container + cursor
            };
            self.emit_pop(leftovers);
            self.emit_pop(1); // the loop frame
            let egress = self.here();
            self.patch(
                loop_at,
                Op::StackPush,
                &[
                    O::Uint8(FrameKind::Loop as u8),
                    O::Uint32(ingress),
                    O::Uint32(egress),
                ],
            );
            self.patch(ingress, next_op, &[O::Uint32(cleanup)]);
        }
        Ok(())
    }
}
