//! Chunk disassembler, used by `--show-assembly` and VM tests

use super::{main_op, secondary, Chunk, OpCode, SecondaryFlags, INVALID_LINE};
use crate::heap::Heap;
use std::fmt::Write;

/// Render a whole chunk, one instruction per line, as
/// `offset  line  [secondary|MAIN] operands`.
pub fn disassemble(chunk: &Chunk, heap: &Heap, name: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "== {} ==", name);

    let mut offset = 0;
    while offset < chunk.code.len() {
        offset = disassemble_instruction(chunk, heap, offset, &mut out);
    }
    out
}

fn disassemble_instruction(chunk: &Chunk, heap: &Heap, offset: usize, out: &mut String) -> usize {
    let _ = write!(out, "{:08}", offset);

    let line = chunk.line_of(offset);
    if offset > 0 && line == chunk.line_of(offset - 1) {
        let _ = write!(out, "{:>10}  ", "|");
    } else if line == INVALID_LINE {
        let _ = write!(out, "{:>10}  ", "<invalid>");
    } else {
        let _ = write!(out, "{:>10}  ", line);
    }

    let word = chunk.code[offset];
    let op = match main_op(word) {
        Some(op) => op,
        None => {
            let _ = writeln!(out, "{:>27}", "<INVALID>");
            return offset + 1;
        }
    };
    let flags = secondary(word);
    let _ = write!(out, "[{:08b}|{:<18?}]", flags.bits(), op);

    let constant = |idx: u32| -> String {
        chunk
            .constants
            .get(idx as usize)
            .map(|v| heap.display_value(v))
            .unwrap_or_else(|| "<bad constant>".to_string())
    };

    match op {
        OpCode::Constant => {
            let idx = chunk.code[offset + 1];
            let _ = writeln!(out, " {} '{}'", idx, constant(idx));
            offset + 2
        }
        OpCode::PopN | OpCode::MakeList | OpCode::MapInit | OpCode::Call | OpCode::SetProperty => {
            let _ = writeln!(out, " {}", chunk.code[offset + 1]);
            offset + 2
        }
        OpCode::Jump | OpCode::JumpIfFalse => {
            let jump = chunk.code[offset + 1] as usize;
            let _ = writeln!(out, " {} -> {}", offset, offset + 2 + jump);
            offset + 2
        }
        OpCode::Loop => {
            let jump = chunk.code[offset + 1] as usize;
            let _ = writeln!(out, " {} -> {}", offset, offset + 2 - jump);
            offset + 2
        }
        OpCode::Get | OpCode::Set | OpCode::Define | OpCode::Inc | OpCode::Dec => {
            let operand = chunk.code[offset + 1];
            if flags.contains(SecondaryFlags::GLOBAL) || flags.contains(SecondaryFlags::CLASS) {
                let _ = writeln!(out, " {} '{}'", operand, constant(operand));
            } else if flags.contains(SecondaryFlags::LOCAL) {
                let _ = writeln!(out, " (stack slot) {}", operand);
            } else if flags.contains(SecondaryFlags::UPVALUE) {
                let _ = writeln!(out, " (upvalue) {}", operand);
            } else if flags.contains(SecondaryFlags::FUNCTION) {
                let _ = writeln!(out, " (function) ID={}", operand);
            } else {
                let _ = writeln!(out, " {}", operand);
            }
            offset + 2
        }
        OpCode::GetProperty => {
            let operand = chunk.code[offset + 1];
            if flags.contains(SecondaryFlags::METHOD) {
                let _ = writeln!(out, " (method) ID={}", operand);
            } else {
                let _ = writeln!(out, " (field) {}", operand);
            }
            offset + 2
        }
        OpCode::GetSuper => {
            let _ = writeln!(out, " ID={}", chunk.code[offset + 1]);
            offset + 2
        }
        OpCode::Invoke | OpCode::SuperInvoke | OpCode::Instance => {
            let _ = writeln!(
                out,
                " ID={}, argc={}",
                chunk.code[offset + 1],
                chunk.code[offset + 2]
            );
            offset + 3
        }
        OpCode::Class => {
            let idx = chunk.code[offset + 1];
            let _ = writeln!(
                out,
                " {} '{}', fields={}",
                idx,
                constant(idx),
                chunk.code[offset + 2]
            );
            offset + 3
        }
        OpCode::Method => {
            let _ = writeln!(out, " ID={}", chunk.code[offset + 1]);
            offset + 2
        }
        OpCode::Closure => {
            let idx = chunk.code[offset + 1];
            let count = chunk.code[offset + 2] as usize;
            let _ = write!(out, " {} '{}'", idx, constant(idx));
            let mut next = offset + 3;
            for _ in 0..count {
                let is_local = chunk.code[next] == 1;
                let index = chunk.code[next + 1];
                let _ = write!(
                    out,
                    " ({} {})",
                    if is_local { "local" } else { "upvalue" },
                    index
                );
                next += 2;
            }
            let _ = writeln!(out);
            next
        }
        _ => {
            let _ = writeln!(out);
            offset + 1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{Chunk, OpCode, SecondaryFlags};
    use crate::heap::Heap;
    use crate::value::Value;
    use std::rc::Rc;

    #[test]
    fn test_disassemble_constant_and_jump() {
        let mut chunk = Chunk::new(Rc::from("test"));
        let idx = chunk.add_constant(Value::Int(7)).unwrap();
        chunk.write_op(OpCode::Constant, SecondaryFlags::empty(), 1);
        chunk.write_operand(idx as u32);
        chunk.write_op(OpCode::JumpIfFalse, SecondaryFlags::empty(), 2);
        chunk.write_operand(1);
        chunk.write_op(OpCode::Pop, SecondaryFlags::empty(), 2);

        let heap = Heap::new();
        let text = disassemble(&chunk, &heap, "main");
        assert!(text.contains("== main =="));
        assert!(text.contains("Constant"));
        assert!(text.contains("'7'"));
        assert!(text.contains("2 -> 5"));
    }
}
