//! Lowers the AST to the operand-stack IR.
//!
//! A declaration pass first assigns function ids and global offsets, then
//! each function is compiled with its own scope stack and frame layout.
//! Expressions push exactly one value; lvalues are compiled as addresses
//! and loaded or stored through explicitly, so compound assignment and
//! increment compute each address exactly once.

use {
    super::{
        error::CompileError,
        ir,
        layout::FrameLayout,
        symbols::{ScopeStack, Storage},
        types::Type,
    },
    frontend::ast,
    std::collections::BTreeMap,
};

fn unescape(s: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(s.len());
    let mut src = s.bytes();
    while let Some(byte) = src.next() {
        if byte != b'\\' {
            bytes.push(byte);
            continue;
        }
        match src.next() {
            Some(b'n') => bytes.push(b'\n'),
            Some(b'r') => bytes.push(b'\r'),
            Some(b't') => bytes.push(b'\t'),
            Some(b'0') => bytes.push(0),
            Some(other) => bytes.push(other),
            None => break,
        }
    }
    bytes
}

/// What an expression looks like in a diagnostic.
fn describe(expr: &ast::Expr) -> &'static str {
    match expr {
        ast::Expr::Int(_) => "an integer literal",
        ast::Expr::Str(_) => "a string literal",
        ast::Expr::Var(_) => "a variable",
        ast::Expr::Unary { .. } => "a unary expression",
        ast::Expr::Binary { .. } => "a binary expression",
        ast::Expr::Assign { .. } => "an assignment",
        ast::Expr::IncDec { .. } => "an increment expression",
        ast::Expr::Index { .. } => "an index expression",
        ast::Expr::Call { .. } => "a call expression",
    }
}

/// Variables and globals: arrays must carry a length, `void` is not a
/// value type.
fn convert_type(ty: &ast::TypeExpr) -> Result<Type, CompileError> {
    match ty {
        ast::TypeExpr::Int => Ok(Type::Int),
        ast::TypeExpr::Void => Err(CompileError::TypeMismatch {
            context: "variable declared with type `void`".to_owned(),
        }),
        ast::TypeExpr::Ptr(pointee) => Ok(Type::Ptr(Box::new(convert_type(pointee)?))),
        ast::TypeExpr::Array(elem, Some(len)) => {
            Ok(Type::Array(Box::new(convert_type(elem)?), *len))
        }
        ast::TypeExpr::Array(_, None) => Err(CompileError::TypeMismatch {
            context: "array declaration requires a length".to_owned(),
        }),
    }
}

/// Parameters: array parameters adjust to a pointer to their element.
fn convert_param_type(ty: &ast::TypeExpr) -> Result<Type, CompileError> {
    match ty {
        ast::TypeExpr::Array(elem, _) => Ok(Type::Ptr(Box::new(convert_type(elem)?))),
        _ => convert_type(ty),
    }
}

fn convert_ret_type(ty: &ast::TypeExpr) -> Result<Option<Type>, CompileError> {
    match ty {
        ast::TypeExpr::Void => Ok(None),
        _ => convert_type(ty).map(Some),
    }
}

fn const_eval(expr: &ast::Expr) -> Result<i64, CompileError> {
    match expr {
        ast::Expr::Int(value) => Ok(*value),
        ast::Expr::Unary {
            op: ast::UnaryOp::Neg,
            operand,
        } => Ok(-const_eval(operand)?),
        _ => Err(CompileError::TypeMismatch {
            context: format!("global initializer must be a constant, found {}", describe(expr)),
        }),
    }
}

struct FuncSig {
    params: Vec<Type>,
    ret: Option<Type>,
}

struct GlobalVar {
    offset: usize,
    ty: Type,
}

#[derive(Default)]
struct GlobalContext<'src> {
    func_ids: BTreeMap<&'src str, ir::FuncId>,
    sigs: Vec<FuncSig>,
    globals: BTreeMap<&'src str, GlobalVar>,
    globals_size: usize,
    global_inits: Vec<(usize, i64)>,
    str_ids: BTreeMap<Vec<u8>, ir::StrId>,
    strings: Vec<Vec<u8>>,
}

impl<'src> GlobalContext<'src> {
    fn declare_function(&mut self, func: &ast::Function<'src>) -> Result<(), CompileError> {
        if self.func_ids.contains_key(func.name) {
            return Err(CompileError::DuplicateDeclaration {
                name: func.name.to_owned(),
                scope: "the program".to_owned(),
            });
        }
        self.func_ids.insert(func.name, self.sigs.len());
        self.sigs.push(FuncSig {
            params: func
                .params
                .iter()
                .map(|param| convert_param_type(&param.ty))
                .collect::<Result<_, _>>()?,
            ret: convert_ret_type(&func.ret)?,
        });
        Ok(())
    }

    fn declare_global(
        &mut self,
        name: &'src str,
        ty: &ast::TypeExpr,
        init: Option<&ast::Expr<'src>>,
    ) -> Result<(), CompileError> {
        if self.globals.contains_key(name) {
            return Err(CompileError::DuplicateDeclaration {
                name: name.to_owned(),
                scope: "the global scope".to_owned(),
            });
        }
        let ty = convert_type(ty)?;
        let offset = self.globals_size.next_multiple_of(ty.align_of());
        self.globals_size = offset + ty.size_of();
        if let Some(init) = init {
            if let Type::Array(..) = ty {
                return Err(CompileError::TypeMismatch {
                    context: format!("global array `{name}` cannot have an initializer"),
                });
            }
            self.global_inits.push((offset, const_eval(init)?));
        }
        self.globals.insert(name, GlobalVar { offset, ty });
        Ok(())
    }

    fn intern(&mut self, bytes: Vec<u8>) -> ir::StrId {
        if let Some(&id) = self.str_ids.get(&bytes) {
            return id;
        }
        let id = self.strings.len();
        self.strings.push(bytes.clone());
        self.str_ids.insert(bytes, id);
        id
    }
}

struct FuncContext<'ctx, 'src> {
    global: &'ctx mut GlobalContext<'src>,
    scopes: ScopeStack<'src>,
    layout: FrameLayout,
    ops: Vec<ir::Op>,
    ret: Option<Type>,
}

impl<'ctx, 'src> FuncContext<'ctx, 'src> {
    fn emit(&mut self, op: ir::Op) -> usize {
        self.ops.push(op);
        self.ops.len() - 1
    }

    /// Redirects the forward jump at `at` to the current end of the ops.
    fn patch_jump(&mut self, at: usize) {
        let target = self.ops.len();
        match &mut self.ops[at] {
            ir::Op::Jump(t) | ir::Op::JumpIfZero(t) => *t = target,
            _ => unreachable!("patching a non-jump op"),
        }
    }

    /// Pushes the address of an lvalue and returns its (undecayed) type.
    fn compile_place(&mut self, expr: &ast::Expr<'src>) -> Result<Type, CompileError> {
        match expr {
            ast::Expr::Var(name) => {
                if let Some(var) = self.scopes.resolve(name) {
                    let (offset, ty) = (var.offset, var.ty.clone());
                    self.emit(ir::Op::PushFrameAddr { offset });
                    Ok(ty)
                } else if let Some(global) = self.global.globals.get(name) {
                    let (offset, ty) = (global.offset, global.ty.clone());
                    self.emit(ir::Op::PushGlobalAddr { offset });
                    Ok(ty)
                } else {
                    Err(CompileError::UnknownIdentifier {
                        name: (*name).to_owned(),
                    })
                }
            }
            ast::Expr::Unary {
                op: ast::UnaryOp::Deref,
                operand,
            } => {
                let ty = self.compile_expr(operand)?;
                match ty {
                    Type::Ptr(pointee) => Ok(*pointee),
                    _ => Err(CompileError::TypeMismatch {
                        context: format!("dereference of non-pointer `{ty}`"),
                    }),
                }
            }
            ast::Expr::Index { base, index } => {
                let base_ty = self.compile_expr(base)?;
                let Type::Ptr(elem) = base_ty else {
                    return Err(CompileError::TypeMismatch {
                        context: format!("indexing into non-pointer `{base_ty}`"),
                    });
                };
                let index_ty = self.compile_expr(index)?;
                if index_ty != Type::Int {
                    return Err(CompileError::TypeMismatch {
                        context: format!("array index of type `{index_ty}`"),
                    });
                }
                self.emit(ir::Op::PushImm(elem.size_of() as i64));
                self.emit(ir::Op::Binary(ir::BinOp::Mul));
                self.emit(ir::Op::Binary(ir::BinOp::Add));
                Ok(*elem)
            }
            _ => Err(CompileError::InvalidLvalue {
                context: format!("{} cannot be assigned or addressed", describe(expr)),
            }),
        }
    }

    /// Pushes the address of an lvalue and then loads through it unless
    /// the slot is an array, which decays to its address.
    fn compile_place_value(&mut self, expr: &ast::Expr<'src>) -> Result<Type, CompileError> {
        let ty = self.compile_place(expr)?;
        match ty {
            Type::Array(..) => Ok(ty.decayed()),
            _ => {
                self.emit(ir::Op::Load(ty.width()));
                Ok(ty)
            }
        }
    }

    /// Compiles an rvalue; exactly one value is pushed. Array-typed
    /// lvalues decay to pointers here.
    fn compile_expr(&mut self, expr: &ast::Expr<'src>) -> Result<Type, CompileError> {
        match expr {
            ast::Expr::Int(value) => {
                self.emit(ir::Op::PushImm(*value));
                Ok(Type::Int)
            }
            ast::Expr::Str(s) => {
                let id = self.global.intern(unescape(s));
                self.emit(ir::Op::PushStr(id));
                Ok(Type::Ptr(Box::new(Type::Int)))
            }
            ast::Expr::Var(_)
            | ast::Expr::Index { .. }
            | ast::Expr::Unary {
                op: ast::UnaryOp::Deref,
                ..
            } => self.compile_place_value(expr),
            ast::Expr::Unary {
                op: ast::UnaryOp::AddrOf,
                operand,
            } => {
                let ty = self.compile_place(operand)?;
                // &arr denotes the same address as arr; keep the element
                // pointer type so arithmetic scales usefully
                Ok(match ty {
                    Type::Array(elem, _) => Type::Ptr(elem),
                    _ => Type::Ptr(Box::new(ty)),
                })
            }
            ast::Expr::Unary { op, operand } => {
                let ty = self.compile_expr(operand)?;
                let (op, result) = match op {
                    ast::UnaryOp::Neg => (ir::UnOp::Neg, Type::Int),
                    ast::UnaryOp::BitNot => (ir::UnOp::BitNot, Type::Int),
                    ast::UnaryOp::LogicalNot => (ir::UnOp::LogicalNot, Type::Int),
                    ast::UnaryOp::Deref | ast::UnaryOp::AddrOf => unreachable!(),
                };
                if ty != Type::Int && !matches!(op, ir::UnOp::LogicalNot) {
                    return Err(CompileError::TypeMismatch {
                        context: format!("unary operator applied to `{ty}`"),
                    });
                }
                self.emit(ir::Op::Unary(op));
                Ok(result)
            }
            ast::Expr::Binary { op, lhs, rhs } => self.compile_binary(*op, lhs, rhs),
            ast::Expr::Assign { target, op, value } => self.compile_assign(target, *op, value),
            ast::Expr::IncDec {
                target,
                dec,
                postfix,
            } => self.compile_inc_dec(target, *dec, *postfix),
            ast::Expr::Call { func, args } => match self.compile_call(func, args)? {
                Some(ty) => Ok(ty),
                None => Err(CompileError::TypeMismatch {
                    context: format!("void return value of `{func}` used as a value"),
                }),
            },
        }
    }

    fn compile_binary(
        &mut self,
        op: ast::BinaryOp,
        lhs: &ast::Expr<'src>,
        rhs: &ast::Expr<'src>,
    ) -> Result<Type, CompileError> {
        // && and || short-circuit through jumps and produce 0 or 1
        match op {
            ast::BinaryOp::And => {
                self.compile_expr(lhs)?;
                let short = self.emit(ir::Op::JumpIfZero(usize::MAX));
                self.compile_expr(rhs)?;
                let short2 = self.emit(ir::Op::JumpIfZero(usize::MAX));
                self.emit(ir::Op::PushImm(1));
                let done = self.emit(ir::Op::Jump(usize::MAX));
                self.patch_jump(short);
                self.patch_jump(short2);
                self.emit(ir::Op::PushImm(0));
                self.patch_jump(done);
                return Ok(Type::Int);
            }
            ast::BinaryOp::Or => {
                self.compile_expr(lhs)?;
                let try_rhs = self.emit(ir::Op::JumpIfZero(usize::MAX));
                self.emit(ir::Op::PushImm(1));
                let done = self.emit(ir::Op::Jump(usize::MAX));
                self.patch_jump(try_rhs);
                self.compile_expr(rhs)?;
                let falsy = self.emit(ir::Op::JumpIfZero(usize::MAX));
                self.emit(ir::Op::PushImm(1));
                let done2 = self.emit(ir::Op::Jump(usize::MAX));
                self.patch_jump(falsy);
                self.emit(ir::Op::PushImm(0));
                self.patch_jump(done);
                self.patch_jump(done2);
                return Ok(Type::Int);
            }
            _ => {}
        }

        let lhs_ty = self.compile_expr(lhs)?;
        let rhs_ty = self.compile_expr(rhs)?;
        match op {
            ast::BinaryOp::Add => match (&lhs_ty, &rhs_ty) {
                (Type::Int, Type::Int) => {
                    self.emit(ir::Op::Binary(ir::BinOp::Add));
                    Ok(Type::Int)
                }
                (Type::Ptr(elem), Type::Int) => {
                    self.emit(ir::Op::PushImm(elem.size_of() as i64));
                    self.emit(ir::Op::Binary(ir::BinOp::Mul));
                    self.emit(ir::Op::Binary(ir::BinOp::Add));
                    Ok(lhs_ty)
                }
                (Type::Int, Type::Ptr(elem)) => {
                    // bring the integer to the top so it can be scaled
                    self.emit(ir::Op::Swap);
                    self.emit(ir::Op::PushImm(elem.size_of() as i64));
                    self.emit(ir::Op::Binary(ir::BinOp::Mul));
                    self.emit(ir::Op::Binary(ir::BinOp::Add));
                    Ok(rhs_ty)
                }
                _ => Err(CompileError::TypeMismatch {
                    context: format!("`{lhs_ty}` + `{rhs_ty}`"),
                }),
            },
            ast::BinaryOp::Sub => match (&lhs_ty, &rhs_ty) {
                (Type::Int, Type::Int) => {
                    self.emit(ir::Op::Binary(ir::BinOp::Sub));
                    Ok(Type::Int)
                }
                (Type::Ptr(elem), Type::Int) => {
                    self.emit(ir::Op::PushImm(elem.size_of() as i64));
                    self.emit(ir::Op::Binary(ir::BinOp::Mul));
                    self.emit(ir::Op::Binary(ir::BinOp::Sub));
                    Ok(lhs_ty)
                }
                (Type::Ptr(lhs_elem), Type::Ptr(rhs_elem)) if lhs_elem == rhs_elem => {
                    // pointer difference in elements
                    self.emit(ir::Op::Binary(ir::BinOp::Sub));
                    self.emit(ir::Op::PushImm(lhs_elem.size_of() as i64));
                    self.emit(ir::Op::Binary(ir::BinOp::Div));
                    Ok(Type::Int)
                }
                _ => Err(CompileError::TypeMismatch {
                    context: format!("`{lhs_ty}` - `{rhs_ty}`"),
                }),
            },
            ast::BinaryOp::Lt
            | ast::BinaryOp::Gt
            | ast::BinaryOp::Le
            | ast::BinaryOp::Ge
            | ast::BinaryOp::Eq
            | ast::BinaryOp::Ne => {
                if lhs_ty != rhs_ty {
                    return Err(CompileError::TypeMismatch {
                        context: format!("comparison of `{lhs_ty}` with `{rhs_ty}`"),
                    });
                }
                self.emit(ir::Op::Binary(comparison_op(op)));
                Ok(Type::Int)
            }
            _ => {
                if lhs_ty != Type::Int || rhs_ty != Type::Int {
                    return Err(CompileError::TypeMismatch {
                        context: format!("`{lhs_ty}` and `{rhs_ty}` in arithmetic"),
                    });
                }
                self.emit(ir::Op::Binary(arithmetic_op(op)));
                Ok(Type::Int)
            }
        }
    }

    fn compile_assign(
        &mut self,
        target: &ast::Expr<'src>,
        op: ast::AssignOp,
        value: &ast::Expr<'src>,
    ) -> Result<Type, CompileError> {
        let target_ty = self.compile_place(target)?;
        if let Type::Array(..) = target_ty {
            return Err(CompileError::TypeMismatch {
                context: "assignment to an array".to_owned(),
            });
        }
        let width = target_ty.width();
        match op {
            ast::AssignOp::Assign => {
                // [addr] -> [addr, addr, value] -> store -> [addr] -> load
                self.emit(ir::Op::Dup);
                let value_ty = self.compile_expr(value)?;
                if value_ty != target_ty {
                    return Err(CompileError::TypeMismatch {
                        context: format!("assigning `{value_ty}` to `{target_ty}`"),
                    });
                }
                self.emit(ir::Op::Store(width));
                self.emit(ir::Op::Load(width));
            }
            _ => {
                // the address is computed once and duplicated for the
                // read-modify-write
                self.emit(ir::Op::Dup);
                self.emit(ir::Op::Dup);
                self.emit(ir::Op::Load(width));
                let value_ty = self.compile_expr(value)?;
                if value_ty != Type::Int {
                    return Err(CompileError::TypeMismatch {
                        context: format!("compound assignment with `{value_ty}` operand"),
                    });
                }
                let bin_op = match (&target_ty, op) {
                    (Type::Int, ast::AssignOp::Add) => ir::BinOp::Add,
                    (Type::Int, ast::AssignOp::Sub) => ir::BinOp::Sub,
                    (Type::Int, ast::AssignOp::Mul) => ir::BinOp::Mul,
                    (Type::Int, ast::AssignOp::Div) => ir::BinOp::Div,
                    (Type::Int, ast::AssignOp::Rem) => ir::BinOp::Rem,
                    (Type::Ptr(elem), ast::AssignOp::Add | ast::AssignOp::Sub) => {
                        self.emit(ir::Op::PushImm(elem.size_of() as i64));
                        self.emit(ir::Op::Binary(ir::BinOp::Mul));
                        if let ast::AssignOp::Add = op {
                            ir::BinOp::Add
                        } else {
                            ir::BinOp::Sub
                        }
                    }
                    _ => {
                        return Err(CompileError::TypeMismatch {
                            context: format!("compound assignment on `{target_ty}`"),
                        })
                    }
                };
                self.emit(ir::Op::Binary(bin_op));
                self.emit(ir::Op::Store(width));
                self.emit(ir::Op::Load(width));
            }
        }
        Ok(target_ty)
    }

    fn compile_inc_dec(
        &mut self,
        target: &ast::Expr<'src>,
        dec: bool,
        postfix: bool,
    ) -> Result<Type, CompileError> {
        let ty = self.compile_place(target)?;
        let step = match &ty {
            Type::Int => 1,
            Type::Ptr(elem) => elem.size_of() as i64,
            Type::Array(..) => {
                return Err(CompileError::TypeMismatch {
                    context: "increment of an array".to_owned(),
                })
            }
        };
        let width = ty.width();
        let bin_op = if dec { ir::BinOp::Sub } else { ir::BinOp::Add };
        if postfix {
            // [addr] -> [old, addr] -> store old+step -> [old]
            self.emit(ir::Op::Dup);
            self.emit(ir::Op::Load(width));
            self.emit(ir::Op::Swap);
            self.emit(ir::Op::Dup);
            self.emit(ir::Op::Load(width));
            self.emit(ir::Op::PushImm(step));
            self.emit(ir::Op::Binary(bin_op));
            self.emit(ir::Op::Store(width));
        } else {
            self.emit(ir::Op::Dup);
            self.emit(ir::Op::Dup);
            self.emit(ir::Op::Load(width));
            self.emit(ir::Op::PushImm(step));
            self.emit(ir::Op::Binary(bin_op));
            self.emit(ir::Op::Store(width));
            self.emit(ir::Op::Load(width));
        }
        Ok(ty)
    }

    /// Compiles a call; a value is always pushed (void callees push a
    /// zero), but `None` is returned for void callees so value contexts
    /// can reject them.
    fn compile_call(
        &mut self,
        func: &str,
        args: &[ast::Expr<'src>],
    ) -> Result<Option<Type>, CompileError> {
        if func == "printf" && !self.global.func_ids.contains_key("printf") {
            let Some((format, rest)) = args.split_first() else {
                return Err(CompileError::TypeMismatch {
                    context: "printf requires a format string".to_owned(),
                });
            };
            let ast::Expr::Str(s) = format else {
                return Err(CompileError::TypeMismatch {
                    context: "printf format must be a string literal".to_owned(),
                });
            };
            let format = self.global.intern(unescape(s));
            for arg in rest {
                self.compile_expr(arg)?;
            }
            self.emit(ir::Op::Printf {
                format,
                args: rest.len(),
            });
            return Ok(Some(Type::Int));
        }

        let Some(&id) = self.global.func_ids.get(func) else {
            return Err(CompileError::UnknownIdentifier {
                name: func.to_owned(),
            });
        };
        let param_count = self.global.sigs[id].params.len();
        if args.len() != param_count {
            return Err(CompileError::TypeMismatch {
                context: format!(
                    "`{func}` takes {param_count} arguments, {} supplied",
                    args.len()
                ),
            });
        }
        for (i, arg) in args.iter().enumerate() {
            let arg_ty = self.compile_expr(arg)?;
            let param_ty = &self.global.sigs[id].params[i];
            if arg_ty != *param_ty {
                return Err(CompileError::TypeMismatch {
                    context: format!("argument {} of `{func}`: expected `{param_ty}`, found `{arg_ty}`", i + 1),
                });
            }
        }
        self.emit(ir::Op::Call(id));
        Ok(self.global.sigs[id].ret.clone())
    }

    /// Expression statements discard the pushed value.
    fn compile_expr_stmt(&mut self, expr: &ast::Expr<'src>) -> Result<(), CompileError> {
        match expr {
            ast::Expr::Call { func, args } => {
                self.compile_call(func, args)?;
            }
            _ => {
                self.compile_expr(expr)?;
            }
        }
        self.emit(ir::Op::Pop);
        Ok(())
    }

    fn compile_stmt(&mut self, stmt: &ast::Stmt<'src>) -> Result<(), CompileError> {
        match stmt {
            ast::Stmt::Declare { name, ty, init } => {
                let ty = convert_type(ty)?;
                let offset =
                    self.scopes
                        .declare(name, ty.clone(), Storage::Local, &mut self.layout)?;
                match (init, &ty) {
                    (None, _) => {}
                    (Some(ast::Init::Scalar(_)), Type::Array(..)) => {
                        return Err(CompileError::TypeMismatch {
                            context: format!("array `{name}` initialized without a brace list"),
                        });
                    }
                    (Some(ast::Init::Scalar(value)), _) => {
                        self.emit(ir::Op::PushFrameAddr { offset });
                        let value_ty = self.compile_expr(value)?;
                        if value_ty != ty {
                            return Err(CompileError::TypeMismatch {
                                context: format!("initializing `{ty}` with `{value_ty}`"),
                            });
                        }
                        self.emit(ir::Op::Store(ty.width()));
                    }
                    (Some(ast::Init::List(values)), Type::Array(elem, len)) => {
                        if values.len() > *len {
                            return Err(CompileError::TypeMismatch {
                                context: format!(
                                    "{} initializers for `{ty}` `{name}`",
                                    values.len()
                                ),
                            });
                        }
                        // unfilled elements stay zero; frames are zeroed
                        // per activation
                        let elem = (**elem).clone();
                        for (i, value) in values.iter().enumerate() {
                            self.emit(ir::Op::PushFrameAddr {
                                offset: offset + i * elem.size_of(),
                            });
                            let value_ty = self.compile_expr(value)?;
                            if value_ty != elem {
                                return Err(CompileError::TypeMismatch {
                                    context: format!("initializing `{elem}` with `{value_ty}`"),
                                });
                            }
                            self.emit(ir::Op::Store(elem.width()));
                        }
                    }
                    (Some(ast::Init::List(_)), _) => {
                        return Err(CompileError::TypeMismatch {
                            context: format!("brace list initializer for scalar `{name}`"),
                        });
                    }
                }
                Ok(())
            }
            ast::Stmt::Expr(expr) => self.compile_expr_stmt(expr),
            ast::Stmt::Return(expr) => {
                match expr {
                    Some(expr) => {
                        let ty = self.compile_expr(expr)?;
                        match &self.ret {
                            Some(ret) if *ret == ty => {}
                            Some(ret) => {
                                return Err(CompileError::TypeMismatch {
                                    context: format!(
                                        "returning `{ty}` from a function returning `{ret}`"
                                    ),
                                })
                            }
                            None => {
                                return Err(CompileError::TypeMismatch {
                                    context: "returning a value from a void function".to_owned(),
                                })
                            }
                        }
                    }
                    None => {
                        self.emit(ir::Op::PushImm(0));
                    }
                }
                self.emit(ir::Op::Return);
                Ok(())
            }
            ast::Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.compile_expr(cond)?;
                let skip_then = self.emit(ir::Op::JumpIfZero(usize::MAX));
                self.compile_stmt(then_branch)?;
                match else_branch {
                    Some(else_branch) => {
                        let skip_else = self.emit(ir::Op::Jump(usize::MAX));
                        self.patch_jump(skip_then);
                        self.compile_stmt(else_branch)?;
                        self.patch_jump(skip_else);
                    }
                    None => self.patch_jump(skip_then),
                }
                Ok(())
            }
            ast::Stmt::While { cond, body } => {
                let top = self.ops.len();
                self.compile_expr(cond)?;
                let exit = self.emit(ir::Op::JumpIfZero(usize::MAX));
                self.compile_stmt(body)?;
                self.emit(ir::Op::Jump(top));
                self.patch_jump(exit);
                Ok(())
            }
            ast::Stmt::For {
                init,
                cond,
                step,
                body,
            } => {
                // the init clause scopes over the whole loop
                self.scopes.enter_scope();
                if let Some(init) = init {
                    self.compile_stmt(init)?;
                }
                let top = self.ops.len();
                let exit = match cond {
                    Some(cond) => {
                        self.compile_expr(cond)?;
                        Some(self.emit(ir::Op::JumpIfZero(usize::MAX)))
                    }
                    None => None,
                };
                self.compile_stmt(body)?;
                if let Some(step) = step {
                    self.compile_expr_stmt(step)?;
                }
                self.emit(ir::Op::Jump(top));
                if let Some(exit) = exit {
                    self.patch_jump(exit);
                }
                self.scopes.exit_scope();
                Ok(())
            }
            ast::Stmt::Block(stmts) => {
                self.scopes.enter_scope();
                for stmt in stmts {
                    self.compile_stmt(stmt)?;
                }
                self.scopes.exit_scope();
                Ok(())
            }
        }
    }
}

fn comparison_op(op: ast::BinaryOp) -> ir::BinOp {
    match op {
        ast::BinaryOp::Lt => ir::BinOp::Lt,
        ast::BinaryOp::Gt => ir::BinOp::Gt,
        ast::BinaryOp::Le => ir::BinOp::Le,
        ast::BinaryOp::Ge => ir::BinOp::Ge,
        ast::BinaryOp::Eq => ir::BinOp::Eq,
        ast::BinaryOp::Ne => ir::BinOp::Ne,
        _ => unreachable!(),
    }
}

fn arithmetic_op(op: ast::BinaryOp) -> ir::BinOp {
    match op {
        ast::BinaryOp::Mul => ir::BinOp::Mul,
        ast::BinaryOp::Div => ir::BinOp::Div,
        ast::BinaryOp::Rem => ir::BinOp::Rem,
        ast::BinaryOp::Shl => ir::BinOp::Shl,
        ast::BinaryOp::Shr => ir::BinOp::Shr,
        ast::BinaryOp::BitAnd => ir::BinOp::BitAnd,
        ast::BinaryOp::BitXor => ir::BinOp::BitXor,
        ast::BinaryOp::BitOr => ir::BinOp::BitOr,
        _ => unreachable!(),
    }
}

fn compile_function<'src>(
    global: &mut GlobalContext<'src>,
    func: &ast::Function<'src>,
) -> Result<ir::Function, CompileError> {
    let mut scopes = ScopeStack::new(func.name);
    let mut layout = FrameLayout::new();
    let mut params = Vec::with_capacity(func.params.len());
    for param in &func.params {
        let ty = convert_param_type(&param.ty)?;
        let width = ty.width();
        let offset = scopes.declare(param.name, ty, Storage::Param, &mut layout)?;
        params.push(ir::ParamSlot { offset, width });
    }
    let ret = convert_ret_type(&func.ret)?;
    let mut ctx = FuncContext {
        global,
        scopes,
        layout,
        ops: vec![],
        ret,
    };
    for stmt in &func.body {
        ctx.compile_stmt(stmt)?;
    }
    // falling off the end returns zero, `main` included
    ctx.emit(ir::Op::PushImm(0));
    ctx.emit(ir::Op::Return);
    Ok(ir::Function {
        name: func.name.to_owned(),
        params,
        frame_size: ctx.layout.frame_size(),
        ops: ctx.ops,
    })
}

pub(super) fn lower(ast: &ast::Ast) -> Result<ir::Program, CompileError> {
    let mut global = GlobalContext::default();
    for item in &ast.items {
        match item {
            ast::Item::Function(func) => global.declare_function(func)?,
            ast::Item::Global { name, ty, init } => {
                global.declare_global(name, ty, init.as_ref())?;
            }
        }
    }
    let Some(&main) = global.func_ids.get("main") else {
        return Err(CompileError::UnknownIdentifier {
            name: "main".to_owned(),
        });
    };
    let mut functions = vec![];
    for item in &ast.items {
        if let ast::Item::Function(func) = item {
            functions.push(compile_function(&mut global, func)?);
        }
    }
    Ok(ir::Program {
        functions,
        main,
        strings: global.strings,
        globals_size: global.globals_size,
        global_inits: global.global_inits,
    })
}
