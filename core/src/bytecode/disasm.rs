//! Bytecode disassembler, behind `-u`/`--unassemble` and the REPL `/u`
//! command.

use core::fmt::Write;

use hashbrown::HashMap;

use crate::bytecode::{FrameKind, Instruction, Opcode, Operand, Program};

fn jump_target(instruction: &Instruction) -> Option<u32> {
    match instruction.opcode {
        Opcode::Jump | Opcode::JumpIfTrue | Opcode::JumpIfFalse => Some(instruction.uint32(0)),
        _ => None,
    }
}

/// Render the whole program, one instruction per line, with `L<n>:` labels
/// on jump targets and a trailing comment naming pushed frame kinds.
pub fn disassemble(program: &Program) -> String {
    // First pass: collect jump targets so they can be labeled.
    let mut targets: Vec<u32> = Vec::new();
    let mut pc = 0u32;
    while let Some(instruction) = program.fetch(&mut pc) {
        if let Some(target) = jump_target(&instruction) {
            targets.push(target);
        }
    }
    targets.sort_unstable();
    targets.dedup();
    let labels: HashMap<u32, usize> = targets
        .into_iter()
        .enumerate()
        .map(|(label, offset)| (offset, label))
        .collect();

    // Second pass: print.
    let mut out = String::new();
    let mut pc = 0u32;
    loop {
        let offset = pc;
        let Some(instruction) = program.fetch(&mut pc) else {
            break;
        };
        let label = labels
            .get(&offset)
            .map(|l| format!("L{l}:"))
            .unwrap_or_default();
        let _ = write!(out, "{offset:6}  {label:>5} {:<20}", instruction.opcode.name());
        for operand in &instruction.operands {
            let _ = match *operand {
                Operand::Undefined => write!(out, "  undefined"),
                Operand::Null => write!(out, "  null"),
                Operand::EmptyArray => write!(out, "  []"),
                Operand::EmptyObject => write!(out, "  {{}}"),
                Operand::Boolean(v) => write!(out, "  {v}"),
                Operand::Uint8(v) => write!(out, "  <u8 {v}>"),
                Operand::Uint16(v) => write!(out, "  <u16 {v}>"),
                Operand::Uint32(v) => match labels.get(&v) {
                    Some(l) if jump_target(&instruction).is_some() => write!(out, "  L{l}"),
                    _ => write!(out, "  <u32 {v}>"),
                },
                Operand::Double(v) => write!(out, "  {v}"),
                Operand::Inscription { offset, len } => {
                    write!(out, "  ''{}''", program.inscription_text(offset, len))
                }
                Operand::Function { ingress } => write!(out, "  <function {ingress}>"),
            };
        }
        if instruction.opcode == Opcode::StackPush {
            if let Some(&Operand::Uint8(byte)) = instruction.operands.first() {
                if let Some(kind) = FrameKind::from_byte(byte) {
                    if kind != FrameKind::Value {
                        let _ = write!(out, "  ; {}", kind.name());
                    }
                }
            }
        }
        out.push('\n');
    }
    out
}
