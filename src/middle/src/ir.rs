//! The operand-stack IR and its runtime execution target.
//!
//! Every function body is a flat `Vec<Op>` with jump targets resolved to
//! instruction indices at lowering time. `Machine` executes a whole
//! program against a single byte arena holding the global region, the
//! interned strings, and the activation frames. Operand values live on a
//! separate stack of `i64`s; ints are sign-extended on load and truncated
//! on store, pointers are arena byte addresses.

use {
    crate::{error::RuntimeError, layout::STACK_ALIGN},
    std::io::Write as IoWrite,
};

/// Activations beyond this depth are reported as a stack overflow rather
/// than exhausting host memory.
pub const MAX_CALL_DEPTH: usize = 1 << 16;

pub type FuncId = usize;
pub type StrId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    Int,
    Ptr,
}

impl Width {
    pub const fn bytes(self) -> usize {
        match self {
            Width::Int => 4,
            Width::Ptr => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitXor,
    BitOr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    LogicalNot,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    PushImm(i64),
    /// Pushes `frame_base + offset` of the current activation.
    PushFrameAddr { offset: usize },
    PushGlobalAddr { offset: usize },
    /// Pushes the arena address of an interned string.
    PushStr(StrId),
    /// Pops an address, pushes the value read there.
    Load(Width),
    /// Pops a value, then an address, and writes the value there.
    Store(Width),
    Dup,
    Swap,
    Pop,
    /// Pops rhs, then lhs, pushes `lhs op rhs`.
    Binary(BinOp),
    Unary(UnOp),
    Jump(usize),
    JumpIfZero(usize),
    /// Pops the callee's arguments (last argument on top) into a fresh
    /// frame's parameter slots.
    Call(FuncId),
    /// Pops `args` values (last on top), renders the interned format
    /// string, and pushes the number of bytes written.
    Printf { format: StrId, args: usize },
    /// Pops the return value; control returns to the caller with the
    /// value on its operand stack.
    Return,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSlot {
    pub offset: usize,
    pub width: Width,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub params: Vec<ParamSlot>,
    pub frame_size: usize,
    pub ops: Vec<Op>,
}

#[derive(Debug, Clone)]
pub struct Program {
    pub functions: Vec<Function>,
    pub main: FuncId,
    /// Interned string bodies, unescaped, without the trailing NUL.
    pub strings: Vec<Vec<u8>>,
    pub globals_size: usize,
    /// Constant global initializers as (offset, value); uninitialized
    /// globals stay zero.
    pub global_inits: Vec<(usize, i64)>,
}

impl Program {
    pub fn execute(&self, stdout: &mut impl IoWrite) -> Result<i32, RuntimeError> {
        Machine::new(self).run(stdout)
    }
}

#[derive(Debug, Clone, Copy)]
struct Activation {
    func: FuncId,
    pc: usize,
    frame_base: usize,
}

#[derive(Debug)]
pub struct Machine<'prog> {
    program: &'prog Program,
    arena: Vec<u8>,
    str_addrs: Vec<usize>,
    operands: Vec<i64>,
    frames: Vec<Activation>,
}

impl<'prog> Machine<'prog> {
    pub fn new(program: &'prog Program) -> Self {
        let mut arena = vec![0u8; program.globals_size];
        for &(offset, value) in &program.global_inits {
            arena[offset..offset + Width::Int.bytes()]
                .copy_from_slice(&(value as i32).to_le_bytes());
        }
        let str_addrs = program
            .strings
            .iter()
            .map(|string| {
                let addr = arena.len();
                arena.extend_from_slice(string);
                arena.push(0);
                addr
            })
            .collect();
        let mut machine = Machine {
            program,
            arena,
            str_addrs,
            operands: vec![],
            frames: vec![],
        };
        machine.push_frame(program.main);
        machine
    }

    fn push_frame(&mut self, func: FuncId) {
        let frame_base = self.arena.len().next_multiple_of(STACK_ALIGN);
        self.arena
            .resize(frame_base + self.program.functions[func].frame_size, 0);
        self.frames.push(Activation {
            func,
            pc: 0,
            frame_base,
        });
    }

    fn load(&self, addr: usize, width: Width) -> Result<i64, RuntimeError> {
        let bytes = self
            .arena
            .get(addr..addr + width.bytes())
            .ok_or(RuntimeError::InvalidAccess { address: addr })?;
        Ok(match width {
            Width::Int => i64::from(i32::from_le_bytes(bytes.try_into().unwrap())),
            Width::Ptr => i64::from_le_bytes(bytes.try_into().unwrap()),
        })
    }

    fn store(&mut self, addr: usize, width: Width, value: i64) -> Result<(), RuntimeError> {
        let bytes = self
            .arena
            .get_mut(addr..addr + width.bytes())
            .ok_or(RuntimeError::InvalidAccess { address: addr })?;
        match width {
            Width::Int => bytes.copy_from_slice(&(value as i32).to_le_bytes()),
            Width::Ptr => bytes.copy_from_slice(&value.to_le_bytes()),
        }
        Ok(())
    }

    fn pop(&mut self) -> i64 {
        self.operands.pop().unwrap_or(0)
    }

    fn printf(
        &mut self,
        format: StrId,
        arg_count: usize,
        stdout: &mut impl IoWrite,
    ) -> Result<(), RuntimeError> {
        let mut args = self.operands.split_off(self.operands.len() - arg_count);
        args.reverse();
        let mut args = args.into_iter();
        let format = &self.program.strings[format];
        let mut out = Vec::new();
        let mut i = 0;
        while i < format.len() {
            let byte = format[i];
            i += 1;
            if byte != b'%' {
                out.push(byte);
                continue;
            }
            let Some(&directive) = format.get(i) else {
                out.push(b'%');
                break;
            };
            i += 1;
            // `%%` and unknown directives consume no argument; a known
            // directive with no remaining argument renders literally
            match directive {
                b'%' => out.push(b'%'),
                b'd' | b'c' | b's' => match args.next() {
                    Some(arg) => match directive {
                        b'd' => out.extend_from_slice((arg as i32).to_string().as_bytes()),
                        b'c' => out.push(arg as u8),
                        _ => {
                            let mut addr = arg as usize;
                            loop {
                                match self.arena.get(addr) {
                                    Some(0) => break,
                                    Some(&byte) => out.push(byte),
                                    None => {
                                        return Err(RuntimeError::InvalidAccess { address: addr })
                                    }
                                }
                                addr += 1;
                            }
                        }
                    },
                    None => {
                        out.push(b'%');
                        out.push(directive);
                    }
                },
                _ => {
                    out.push(b'%');
                    out.push(directive);
                }
            }
        }
        stdout.write_all(&out).unwrap();
        let _ = stdout.flush();
        self.operands.push(out.len() as i64);
        Ok(())
    }

    pub fn run(&mut self, stdout: &mut impl IoWrite) -> Result<i32, RuntimeError> {
        loop {
            let frame = *self.frames.last().unwrap();
            let op = self.program.functions[frame.func].ops[frame.pc];
            self.frames.last_mut().unwrap().pc += 1;
            match op {
                Op::PushImm(value) => self.operands.push(value),
                Op::PushFrameAddr { offset } => {
                    self.operands.push((frame.frame_base + offset) as i64)
                }
                Op::PushGlobalAddr { offset } => self.operands.push(offset as i64),
                Op::PushStr(id) => self.operands.push(self.str_addrs[id] as i64),
                Op::Load(width) => {
                    let addr = self.pop() as usize;
                    let value = self.load(addr, width)?;
                    self.operands.push(value);
                }
                Op::Store(width) => {
                    let value = self.pop();
                    let addr = self.pop() as usize;
                    self.store(addr, width, value)?;
                }
                Op::Dup => {
                    let top = *self.operands.last().unwrap();
                    self.operands.push(top);
                }
                Op::Swap => {
                    let len = self.operands.len();
                    self.operands.swap(len - 1, len - 2);
                }
                Op::Pop => {
                    self.pop();
                }
                Op::Binary(op) => {
                    let rhs = self.pop();
                    let lhs = self.pop();
                    let value = match op {
                        BinOp::Add => lhs.wrapping_add(rhs),
                        BinOp::Sub => lhs.wrapping_sub(rhs),
                        BinOp::Mul => lhs.wrapping_mul(rhs),
                        BinOp::Div | BinOp::Rem if rhs == 0 => {
                            return Err(RuntimeError::DivisionByZero)
                        }
                        // truncates toward zero; remainder follows the dividend
                        BinOp::Div => lhs.wrapping_div(rhs),
                        BinOp::Rem => lhs.wrapping_rem(rhs),
                        BinOp::Shl => lhs.wrapping_shl(rhs as u32),
                        BinOp::Shr => lhs.wrapping_shr(rhs as u32),
                        BinOp::Lt => i64::from(lhs < rhs),
                        BinOp::Gt => i64::from(lhs > rhs),
                        BinOp::Le => i64::from(lhs <= rhs),
                        BinOp::Ge => i64::from(lhs >= rhs),
                        BinOp::Eq => i64::from(lhs == rhs),
                        BinOp::Ne => i64::from(lhs != rhs),
                        BinOp::BitAnd => lhs & rhs,
                        BinOp::BitXor => lhs ^ rhs,
                        BinOp::BitOr => lhs | rhs,
                    };
                    self.operands.push(value);
                }
                Op::Unary(op) => {
                    let value = self.pop();
                    self.operands.push(match op {
                        UnOp::Neg => value.wrapping_neg(),
                        UnOp::LogicalNot => i64::from(value == 0),
                        UnOp::BitNot => !value,
                    });
                }
                Op::Jump(target) => self.frames.last_mut().unwrap().pc = target,
                Op::JumpIfZero(target) => {
                    if self.pop() == 0 {
                        self.frames.last_mut().unwrap().pc = target;
                    }
                }
                Op::Call(func) => {
                    if self.frames.len() >= MAX_CALL_DEPTH {
                        return Err(RuntimeError::StackOverflow {
                            max_depth: MAX_CALL_DEPTH,
                        });
                    }
                    self.push_frame(func);
                    let frame_base = self.frames.last().unwrap().frame_base;
                    let params = self.program.functions[func].params.clone();
                    for param in params.into_iter().rev() {
                        let value = self.pop();
                        self.store(frame_base + param.offset, param.width, value)?;
                    }
                }
                Op::Printf { format, args } => self.printf(format, args, stdout)?,
                Op::Return => {
                    let value = self.pop();
                    let frame = self.frames.pop().unwrap();
                    self.arena.truncate(frame.frame_base);
                    if self.frames.is_empty() {
                        return Ok(value as i32);
                    }
                    self.operands.push(value);
                }
            }
        }
    }
}
