//! Instruction-stream disassembler, used by tests and the `--bytecode` dump.

use std::fmt::Write;

use crate::bytecode::compiler::Bytecode;
use crate::bytecode::instruction::{read_operands, Op};
use crate::bytecode::value::Value;

/// Render an instruction stream as one `OFFSET NAME OPERANDS` line per
/// instruction.
pub fn disassemble(ins: &[u8]) -> String {
    let mut out = String::new();

    let mut i = 0;
    while i < ins.len() {
        let Some(op) = Op::from_u8(ins[i]) else {
            writeln!(out, "ERROR: opcode {} undefined", ins[i]).unwrap();
            i += 1;
            continue;
        };

        let (operands, read) = read_operands(op, &ins[i + 1..]);
        writeln!(out, "{:04} {}", i, format_instruction(op, &operands)).unwrap();

        i += 1 + read;
    }

    out
}

/// Render a whole compiled unit: the main instructions followed by the
/// body of every function in the constant pool.
pub fn disassemble_bytecode(bytecode: &Bytecode) -> String {
    let mut out = String::new();

    writeln!(out, "== main ==").unwrap();
    out.push_str(&disassemble(&bytecode.instructions));

    for (index, constant) in bytecode.constants.iter().enumerate() {
        if let Value::Function(func) = constant {
            writeln!(
                out,
                "\n== fn constant {} (locals: {}, params: {}) ==",
                index, func.num_locals, func.num_parameters
            )
            .unwrap();
            out.push_str(&disassemble(&func.instructions));
        }
    }

    out
}

fn format_instruction(op: Op, operands: &[usize]) -> String {
    match operands {
        [] => op.name().to_string(),
        [a] => format!("{} {}", op.name(), a),
        [a, b] => format!("{} {} {}", op.name(), a, b),
        _ => format!("ERROR: unhandled operand count for {}", op.name()),
    }
}
