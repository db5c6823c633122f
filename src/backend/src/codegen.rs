//! Lowers the IR to Intel-syntax x86-64 (SysV AMD64).
//!
//! The operand stack maps onto the hardware stack, one 8-byte slot per
//! value. Frames are 16-rounded by the layout pass, but pending operands
//! at a call site make the stack pointer arbitrary, so every call is
//! wrapped in its own realignment sequence.

use {
    super::x86::{Line, Program},
    middle::ir,
    std::collections::BTreeSet,
    thiserror::Error,
    velcro::vec,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot emit assembly: {message}")]
pub struct CodegenError {
    message: String,
}

const ARG_REGS: [&str; 6] = ["rdi", "rsi", "rdx", "rcx", "r8", "r9"];
const ARG_REGS_32: [&str; 6] = ["edi", "esi", "edx", "ecx", "r8d", "r9d"];

fn ins(text: impl Into<String>) -> Line {
    Line::Instruction(text.into())
}

fn label(text: impl Into<String>) -> Line {
    Line::Label(text.into())
}

fn directive(text: impl Into<String>) -> Line {
    Line::Directive(text.into())
}

fn escape(bytes: &[u8]) -> String {
    let mut out = String::new();
    for &byte in bytes {
        match byte {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\t' => out.push_str("\\t"),
            b'\r' => out.push_str("\\r"),
            0x20..=0x7e => out.push(byte as char),
            _ => out.push_str(&format!("\\{byte:03o}")),
        }
    }
    out
}

/// The per-call-site alignment protocol: save the pending stack pointer,
/// align for the callee, and restore afterwards. Register arguments must
/// already be popped when this runs.
fn call_sequence(callee: &str) -> Vec<Line> {
    vec![
        ins("mov r10, rsp"),
        ins("and rsp, -16"),
        ins("push r10"),
        ins("sub rsp, 8"),
        ins(format!("call {callee}")),
        ins("mov rsp, QWORD PTR [rsp + 8]"),
        ins("push rax"),
    ]
}

// `rcx` holds the right operand; it and `r10` are caller-saved, so the
// emitted code never touches a register the SysV convention requires a
// callee to preserve.
fn binary_sequence(op: ir::BinOp) -> Vec<Line> {
    let body: Vec<Line> = match op {
        ir::BinOp::Add => vec![ins("add rax, rcx")],
        ir::BinOp::Sub => vec![ins("sub rax, rcx")],
        ir::BinOp::Mul => vec![ins("imul rax, rcx")],
        ir::BinOp::Div => vec![ins("cqo"), ins("idiv rcx")],
        ir::BinOp::Rem => vec![ins("cqo"), ins("idiv rcx"), ins("mov rax, rdx")],
        ir::BinOp::Shl => vec![ins("sal rax, cl")],
        ir::BinOp::Shr => vec![ins("sar rax, cl")],
        ir::BinOp::BitAnd => vec![ins("and rax, rcx")],
        ir::BinOp::BitXor => vec![ins("xor rax, rcx")],
        ir::BinOp::BitOr => vec![ins("or rax, rcx")],
        ir::BinOp::Lt
        | ir::BinOp::Gt
        | ir::BinOp::Le
        | ir::BinOp::Ge
        | ir::BinOp::Eq
        | ir::BinOp::Ne => {
            let set = match op {
                ir::BinOp::Lt => "setl",
                ir::BinOp::Gt => "setg",
                ir::BinOp::Le => "setle",
                ir::BinOp::Ge => "setge",
                ir::BinOp::Eq => "sete",
                _ => "setne",
            };
            vec![
                ins("cmp rax, rcx"),
                ins(format!("{set} al")),
                ins("movzx rax, al"),
            ]
        }
    };
    vec![ins("pop rcx"), ins("pop rax"), ..body, ins("push rax")]
}

pub(super) fn compile(program: &ir::Program) -> Result<Program, CodegenError> {
    let mut lines = vec![directive(".intel_syntax noprefix")];

    if !program.strings.is_empty() {
        lines.push(directive(".section .rodata"));
        for (id, string) in program.strings.iter().enumerate() {
            lines.push(label(format!(".LC{id}")));
            lines.push(ins(format!(".string \"{}\"", escape(string))));
        }
    }

    if program.globals_size > 0 {
        let mut image = vec![0u8; program.globals_size];
        for &(offset, value) in &program.global_inits {
            image[offset..offset + 4].copy_from_slice(&(value as i32).to_le_bytes());
        }
        lines.extend([
            directive(".data"),
            directive(".align 8"),
            label("globals"),
        ]);
        // the layout keeps the global region a multiple of 4 bytes
        for chunk in image.chunks(4) {
            lines.push(ins(format!(
                ".long {}",
                u32::from_le_bytes(chunk.try_into().unwrap())
            )));
        }
    }

    lines.push(directive(".text"));
    for (fid, func) in program.functions.iter().enumerate() {
        lines.push(directive(format!(".globl {}", func.name)));
        lines.push(label(func.name.clone()));
        lines.extend([ins("push rbp"), ins("mov rbp, rsp")]);
        if func.frame_size > 0 {
            lines.push(ins(format!("sub rsp, {}", func.frame_size)));
            // fresh activations are zeroed, matching the runtime target's
            // semantics for partially initialized arrays
            for offset in (8..=func.frame_size).step_by(8) {
                lines.push(ins(format!("mov QWORD PTR [rbp - {offset}], 0")));
            }
        }
        for (i, param) in func.params.iter().enumerate() {
            let slot = func.frame_size - param.offset;
            if i < ARG_REGS.len() {
                lines.push(match param.width {
                    ir::Width::Int => {
                        ins(format!("mov DWORD PTR [rbp - {slot}], {}", ARG_REGS_32[i]))
                    }
                    ir::Width::Ptr => {
                        ins(format!("mov QWORD PTR [rbp - {slot}], {}", ARG_REGS[i]))
                    }
                });
            } else {
                let incoming = 16 + 8 * (i - ARG_REGS.len());
                lines.push(ins(format!("mov rax, QWORD PTR [rbp + {incoming}]")));
                lines.push(match param.width {
                    ir::Width::Int => ins(format!("mov DWORD PTR [rbp - {slot}], eax")),
                    ir::Width::Ptr => ins(format!("mov QWORD PTR [rbp - {slot}], rax")),
                });
            }
        }

        let targets: BTreeSet<usize> = func
            .ops
            .iter()
            .filter_map(|op| match op {
                ir::Op::Jump(target) | ir::Op::JumpIfZero(target) => Some(*target),
                _ => None,
            })
            .collect();

        for (i, op) in func.ops.iter().enumerate() {
            if targets.contains(&i) {
                lines.push(label(format!(".L{fid}_{i}")));
            }
            match *op {
                ir::Op::PushImm(value) => {
                    lines.extend([ins(format!("mov rax, {value}")), ins("push rax")]);
                }
                ir::Op::PushFrameAddr { offset } => {
                    let slot = func.frame_size - offset;
                    lines.extend([ins(format!("lea rax, [rbp - {slot}]")), ins("push rax")]);
                }
                ir::Op::PushGlobalAddr { offset } => {
                    lines.push(ins("lea rax, [rip + globals]"));
                    if offset > 0 {
                        lines.push(ins(format!("add rax, {offset}")));
                    }
                    lines.push(ins("push rax"));
                }
                ir::Op::PushStr(id) => {
                    lines.extend([ins(format!("lea rax, [rip + .LC{id}]")), ins("push rax")]);
                }
                ir::Op::Load(width) => {
                    lines.push(ins("pop rax"));
                    lines.push(match width {
                        ir::Width::Int => ins("movsxd rax, DWORD PTR [rax]"),
                        ir::Width::Ptr => ins("mov rax, QWORD PTR [rax]"),
                    });
                    lines.push(ins("push rax"));
                }
                ir::Op::Store(width) => {
                    lines.extend([ins("pop rcx"), ins("pop rax")]);
                    lines.push(match width {
                        ir::Width::Int => ins("mov DWORD PTR [rax], ecx"),
                        ir::Width::Ptr => ins("mov QWORD PTR [rax], rcx"),
                    });
                }
                ir::Op::Dup => {
                    lines.extend([ins("mov rax, QWORD PTR [rsp]"), ins("push rax")]);
                }
                ir::Op::Swap => {
                    lines.extend([
                        ins("mov rax, QWORD PTR [rsp]"),
                        ins("mov rcx, QWORD PTR [rsp + 8]"),
                        ins("mov QWORD PTR [rsp], rcx"),
                        ins("mov QWORD PTR [rsp + 8], rax"),
                    ]);
                }
                ir::Op::Pop => lines.push(ins("add rsp, 8")),
                ir::Op::Binary(op) => lines.extend(binary_sequence(op)),
                ir::Op::Unary(op) => {
                    let body: Vec<Line> = match op {
                        ir::UnOp::Neg => vec![ins("neg rax")],
                        ir::UnOp::BitNot => vec![ins("not rax")],
                        ir::UnOp::LogicalNot => vec![
                            ins("cmp rax, 0"),
                            ins("sete al"),
                            ins("movzx rax, al"),
                        ],
                    };
                    lines.extend(vec![ins("pop rax"), ..body, ins("push rax")]);
                }
                ir::Op::Jump(target) => lines.push(ins(format!("jmp .L{fid}_{target}"))),
                ir::Op::JumpIfZero(target) => {
                    lines.extend([
                        ins("pop rax"),
                        ins("test rax, rax"),
                        ins(format!("jz .L{fid}_{target}")),
                    ]);
                }
                ir::Op::Call(callee) => {
                    let callee = &program.functions[callee];
                    if callee.params.len() > ARG_REGS.len() {
                        return Err(CodegenError {
                            message: format!(
                                "`{}` takes more than {} arguments",
                                callee.name,
                                ARG_REGS.len()
                            ),
                        });
                    }
                    for i in (0..callee.params.len()).rev() {
                        lines.push(ins(format!("pop {}", ARG_REGS[i])));
                    }
                    lines.extend(call_sequence(&callee.name));
                }
                ir::Op::Printf { format, args } => {
                    if args > ARG_REGS.len() - 1 {
                        return Err(CodegenError {
                            message: format!(
                                "printf call passes more than {} values",
                                ARG_REGS.len() - 1
                            ),
                        });
                    }
                    for i in (0..args).rev() {
                        lines.push(ins(format!("pop {}", ARG_REGS[i + 1])));
                    }
                    lines.extend(vec![
                        ins(format!("lea rdi, [rip + .LC{format}]")),
                        // variadic call: no vector register arguments
                        ins("xor eax, eax"),
                        ..call_sequence("printf"),
                    ]);
                }
                ir::Op::Return => {
                    lines.extend([
                        ins("pop rax"),
                        ins("mov rsp, rbp"),
                        ins("pop rbp"),
                        ins("ret"),
                    ]);
                }
            }
        }
        if targets.contains(&func.ops.len()) {
            lines.push(label(format!(".L{fid}_{}", func.ops.len())));
        }
    }

    lines.push(directive(".section .note.GNU-stack,\"\",@progbits"));
    Ok(Program { lines })
}
