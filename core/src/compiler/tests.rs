use pretty_assertions::assert_eq;

use crate::bytecode::{Instruction, Opcode as Op, Program};
use crate::compiler::{CompileError, compile};
use crate::lexer::Token;

fn compile_source(source: &str) -> Program {
    let mut program = Program::new();
    let mut token = Token::default();
    compile(source, &mut token, &mut program).expect("compile should succeed");
    program
}

fn compile_failure(source: &str) -> CompileError {
    let mut program = Program::new();
    let mut token = Token::default();
    compile(source, &mut token, &mut program).expect_err("compile should fail")
}

fn listing(program: &Program) -> Vec<(u32, Instruction)> {
    let mut out = Vec::new();
    let mut pc = 0;
    loop {
        let offset = pc;
        match program.fetch(&mut pc) {
            Some(instruction) => out.push((offset, instruction)),
            None => return out,
        }
    }
}

fn opcodes(program: &Program) -> Vec<Op> {
    listing(program).into_iter().map(|(_, i)| i.opcode).collect()
}

#[test]
fn empty_source_emits_nothing() {
    let program = compile_source("");
    assert!(program.is_empty());
    let program = compile_source("// just a comment\n");
    assert!(program.is_empty());
}

#[test]
fn declaration_shape() {
    assert_eq!(
        opcodes(&compile_source("let a = 1;")),
        vec![Op::StackPush, Op::VariableDeclare]
    );
    // no initializer defaults to null
    assert_eq!(
        opcodes(&compile_source("let a;")),
        vec![Op::StackPush, Op::VariableDeclare]
    );
    assert_eq!(
        opcodes(&compile_source("let a, b = 2;")),
        vec![
            Op::StackPush,
            Op::VariableDeclare,
            Op::StackPush,
            Op::VariableDeclare
        ]
    );
}

#[test]
fn expression_statement_drops_leftovers() {
    assert_eq!(
        opcodes(&compile_source("1;")),
        vec![Op::StackPush, Op::StackPop]
    );
    // a bare identifier emits nothing at all
    assert_eq!(opcodes(&compile_source("a;")), vec![]);
    // member access leaves container and key to drop
    assert_eq!(
        opcodes(&compile_source("a.b;")),
        vec![Op::VariableGet, Op::StackPush, Op::StackPop]
    );
}

#[test]
fn assignment_shapes() {
    assert_eq!(
        opcodes(&compile_source("a = 1;")),
        vec![Op::StackPush, Op::VariablePut]
    );
    assert_eq!(
        opcodes(&compile_source("a.b = 1;")),
        vec![
            Op::VariableGet,
            Op::StackPush,
            Op::StackPush,
            Op::MemberPut,
            Op::StackPop
        ]
    );
    // compound assignment re-reads through duplicated container and key
    assert_eq!(
        opcodes(&compile_source("a.b += 1;")),
        vec![
            Op::VariableGet,
            Op::StackPush,
            Op::StackDupe,
            Op::StackDupe,
            Op::MemberGet,
            Op::StackPush,
            Op::Add,
            Op::MemberPut,
            Op::StackPop
        ]
    );
    assert_eq!(
        opcodes(&compile_source("a++;")),
        vec![Op::VariableGet, Op::StackPush, Op::Add, Op::VariablePut]
    );
}

#[test]
fn unary_minus_is_zero_minus() {
    assert_eq!(
        opcodes(&compile_source("let a = -b;")),
        vec![
            Op::StackPush,
            Op::VariableGet,
            Op::Sub,
            Op::VariableDeclare
        ]
    );
    // unary plus is a no-op
    assert_eq!(
        opcodes(&compile_source("let a = +b;")),
        vec![Op::VariableGet, Op::VariableDeclare]
    );
}

#[test]
fn short_circuit_and_patches_to_chain_end() {
    let program = compile_source("let a = true && false;");
    let instructions = listing(&program);
    assert_eq!(
        instructions.iter().map(|(_, i)| i.opcode).collect::<Vec<_>>(),
        vec![
            Op::StackPush,
            Op::StackDupe,
            Op::JumpIfFalse,
            Op::StackPush,
            Op::And,
            Op::VariableDeclare
        ]
    );
    let declare_offset = instructions
        .iter()
        .find(|(_, i)| i.opcode == Op::VariableDeclare)
        .map(|(offset, _)| *offset)
        .unwrap();
    let branch = instructions
        .iter()
        .find(|(_, i)| i.opcode == Op::JumpIfFalse)
        .map(|(_, i)| i.uint32(0))
        .unwrap();
    assert_eq!(branch, declare_offset);
}

#[test]
fn ternary_arms_are_separate_blocks() {
    let program = compile_source("let a = true ? 1 : 2;");
    let ops = opcodes(&program);
    assert_eq!(
        ops,
        vec![
            Op::StackPush,    // condition
            Op::JumpIfFalse,  // to alternative
            Op::StackPush,    // consequent
            Op::Jump,         // past alternative
            Op::StackPush,    // alternative
            Op::VariableDeclare
        ]
    );
    let instructions = listing(&program);
    let branch = instructions[1].1.uint32(0);
    assert_eq!(branch, instructions[4].0, "jump_if_false lands on the alternative");
    let skip = instructions[3].1.uint32(0);
    assert_eq!(skip, instructions[5].0, "jump lands past the alternative");
}

#[test]
fn while_loop_frame_carries_ingress_and_egress() {
    let program = compile_source("while (true) { }");
    let instructions = listing(&program);
    assert_eq!(
        instructions.iter().map(|(_, i)| i.opcode).collect::<Vec<_>>(),
        vec![
            Op::StackPush,    // loop frame
            Op::StackPush,    // condition
            Op::JumpIfFalse,  // exit
            Op::StackPush,    // block
            Op::StackPop,
            Op::Jump,         // back to condition
            Op::StackPop      // loop frame cleanup
        ]
    );
    let loop_push = &instructions[0].1;
    let ingress = loop_push.uint32(1);
    let egress = loop_push.uint32(2);
    assert_eq!(ingress, instructions[1].0, "ingress re-evaluates the condition");
    assert_eq!(
        egress,
        instructions[6].0 + instructions_len(&program, instructions[6].0),
        "egress is past the cleanup pop"
    );
}

fn instructions_len(program: &Program, at: u32) -> u32 {
    let mut pc = at;
    program.fetch(&mut pc).expect("instruction at offset");
    pc - at
}

#[test]
fn named_function_jump_skips_body() {
    let program = compile_source("function f(a, b) { return a; }");
    let instructions = listing(&program);
    assert_eq!(instructions[0].1.opcode, Op::Jump);
    let skip_to = instructions[0].1.uint32(0);
    let push = instructions
        .iter()
        .find(|(offset, i)| *offset == skip_to && i.opcode == Op::StackPush)
        .expect("jump lands on the function push");
    let ingress = match push.1.operands[1] {
        crate::bytecode::Operand::Function { ingress } => ingress,
        ref other => panic!("expected function operand, got {other:?}"),
    };
    assert_eq!(ingress, instructions[1].0, "ingress is the parameter prologue");
    let ops = opcodes(&program);
    assert_eq!(
        ops,
        vec![
            Op::Jump,
            Op::ArgumentFirst,
            Op::ArgumentGetNext,
            Op::ArgumentGetNext,
            Op::VariableGet, // a
            Op::Return,      // return a;
            Op::Return,      // implicit trailing return
            Op::StackPush,   // the function value
            Op::VariableDeclare
        ]
    );
}

#[test]
fn default_parameter_evaluates_before_binding() {
    assert_eq!(
        opcodes(&compile_source("function f(a = 1) { }")),
        vec![
            Op::Jump,
            Op::ArgumentFirst,
            Op::StackPush, // the default value
            Op::ArgumentGetNext,
            Op::Return,
            Op::StackPush,
            Op::VariableDeclare
        ]
    );
}

#[test]
fn rest_parameter() {
    assert_eq!(
        opcodes(&compile_source("function f(...rest) { }")),
        vec![
            Op::Jump,
            Op::ArgumentFirst,
            Op::ArgumentGetRest,
            Op::Return,
            Op::StackPush,
            Op::VariableDeclare
        ]
    );
}

#[test]
fn call_with_spread_arguments() {
    assert_eq!(
        opcodes(&compile_source("f(...xs, 4);")),
        vec![
            Op::VariableGet,     // f
            Op::StackPush,       // function frame
            Op::VariableGet,     // xs
            Op::ArgumentSpread,
            Op::StackPush,       // 4
            Op::ArgumentAppend,
            Op::Call,
            Op::StackPop         // drop the result
        ]
    );
}

#[test]
fn bind_rotates_receiver_into_first_argument() {
    assert_eq!(
        opcodes(&compile_source("a::b();")),
        vec![
            Op::VariableGet, // a
            Op::VariableGet, // b
            Op::StackPush,   // function frame
            Op::StackSwap,
            Op::StackSwap,
            Op::ArgumentAppend,
            Op::Call,
            Op::StackPop
        ]
    );
}

#[test]
fn bind_without_call_is_rejected() {
    assert_eq!(
        compile_failure("a::b;").message,
        "No function consume bind value"
    );
}

#[test]
fn object_literal_shape() {
    assert_eq!(
        opcodes(&compile_source("let o = {a: 1, \"b c\": 2};")),
        vec![
            Op::StackPush, // {}
            Op::StackPush, // "a"
            Op::StackPush, // 1
            Op::MemberPut,
            Op::StackPush, // "b c"
            Op::StackPush, // 2
            Op::MemberPut,
            Op::VariableDeclare
        ]
    );
}

#[test]
fn array_literal_with_spread() {
    assert_eq!(
        opcodes(&compile_source("let a = [1, ...b];")),
        vec![
            Op::StackPush, // []
            Op::StackPush, // 1
            Op::ArrayAppend,
            Op::VariableGet, // b
            Op::ArraySpread,
            Op::VariableDeclare
        ]
    );
}

#[test]
fn try_egress_is_the_catch_header() {
    let program = compile_source("try { } catch (e) { }");
    let instructions = listing(&program);
    assert_eq!(
        instructions.iter().map(|(_, i)| i.opcode).collect::<Vec<_>>(),
        vec![
            Op::StackPush, // try frame
            Op::StackPop,
            Op::StackPush, // undefined sentinel
            Op::Catch,
            Op::StackPop
        ]
    );
    let try_egress = instructions[0].1.uint32(1);
    assert_eq!(try_egress, instructions[3].0);
    let catch_egress = instructions[3].1.uint32(1);
    assert_eq!(
        catch_egress,
        instructions[4].0 + instructions_len(&program, instructions[4].0)
    );
}

#[test]
fn break_and_continue_require_a_loop() {
    assert_eq!(
        compile_failure("break;").message,
        "Statement 'break' can't be outside loop"
    );
    assert_eq!(
        compile_failure("continue;").message,
        "Statement 'continue' can't be outside loop"
    );
    // allowed through nested non-loop statements
    compile_source("while (true) { if (true) { break; } }");
    // but not across a function boundary
    assert_eq!(
        compile_failure("while (true) { let f = function() { break; }; }").message,
        "Statement 'break' can't be outside loop"
    );
}

#[test]
fn for_in_statement_shape() {
    let program = compile_source("for (let k in c) { }");
    let ops = opcodes(&program);
    assert_eq!(
        ops,
        vec![
            Op::StackPush,       // loop frame
            Op::StackPush,       // null
            Op::VariableDeclare, // k in the loop frame
            Op::VariableGet,     // c
            Op::StackPush,       // cursor 0
            Op::ForInNext,
            Op::VariablePut,     // k
            Op::StackPush,       // block
            Op::StackPop,
            Op::Jump,
            Op::StackPop,        // container + cursor
            Op::StackPop         // loop frame
        ]
    );
}

#[test]
fn parse_error_messages() {
    assert_eq!(compile_failure("let 1 = 2;").message, "Expect variable name");
    assert_eq!(compile_failure("let a = ;").message, "Not a value literal");
    assert_eq!(compile_failure("a = 1").message, "Expect Semicolon");
    assert_eq!(compile_failure("f(1;").message, "Expect , or )");
    assert_eq!(compile_failure("for (x) {}").message, "Unknown for loop type");
    assert_eq!(compile_failure("let x = a ? 1 , 2;").message, "Expect Colon");
    assert_eq!(compile_failure("1 = 2;").message,
        "Assignment expression's l-value can only be identifier or member access");
}

#[test]
fn error_carries_position() {
    let error = compile_failure("let a = 1;\nlet b = ;");
    assert_eq!(error.line(), 1);
    assert_eq!(error.text, ";");
}

#[test]
fn incremental_compilation_appends() {
    let mut program = Program::new();
    let mut token = Token::default();
    let mut source = String::from("let a = 1;");
    compile(&source, &mut token, &mut program).unwrap();
    let first_len = program.len();
    source.push_str(" a = 2;");
    compile(&source, &mut token, &mut program).unwrap();
    assert!(program.len() > first_len);
    assert_eq!(
        opcodes(&program),
        vec![
            Op::StackPush,
            Op::VariableDeclare,
            Op::StackPush,
            Op::VariablePut
        ]
    );
}

#[test]
fn cross_reference_tracks_lines() {
    let program = compile_source("let a = 1;\nlet b = 2;\nlet c = 3;");
    let xref = program.xref();
    assert_eq!(xref.len(), 3);
    assert_eq!(xref[0], 0);
    assert!(xref[1] > xref[0]);
    assert!(xref[2] > xref[1]);
}

#[test]
fn string_literal_unescape() {
    use super::unescape;
    assert_eq!(unescape(r"a\nb"), "a\nb");
    assert_eq!(unescape(r"a\tb\\"), "a\tb\\");
    assert_eq!(unescape(r#"say \"hi\""#), "say \"hi\"");
    assert_eq!(unescape(r"\a\b\f\v"), "\x07\x08\x0c\x0b");
    // \u stays encoded
    assert_eq!(unescape(r"\u0041"), r"\u0041");
    assert_eq!(unescape(r"\q"), "q");
}
