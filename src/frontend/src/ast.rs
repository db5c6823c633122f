//! AST for the supported C subset.
//!
//! The shape is deliberately close to the grammar: `else` is an
//! `Option` on the `If` node, so dangling-else binding is decided here
//! by the parser, never downstream.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeExpr {
    Int,
    Void,
    Ptr(Box<TypeExpr>),
    Array(Box<TypeExpr>, Option<usize>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
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
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    LogicalNot,
    BitNot,
    Deref,
    AddrOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone)]
pub enum Expr<'src> {
    Int(i64),
    Str(&'src str),
    Var(&'src str),
    Unary {
        op: UnaryOp,
        operand: Box<Expr<'src>>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr<'src>>,
        rhs: Box<Expr<'src>>,
    },
    Assign {
        target: Box<Expr<'src>>,
        op: AssignOp,
        value: Box<Expr<'src>>,
    },
    IncDec {
        target: Box<Expr<'src>>,
        dec: bool,
        postfix: bool,
    },
    Index {
        base: Box<Expr<'src>>,
        index: Box<Expr<'src>>,
    },
    Call {
        func: &'src str,
        args: Vec<Expr<'src>>,
    },
}

#[derive(Debug, Clone)]
pub enum Init<'src> {
    Scalar(Expr<'src>),
    List(Vec<Expr<'src>>),
}

#[derive(Debug, Clone)]
pub enum Stmt<'src> {
    Declare {
        name: &'src str,
        ty: TypeExpr,
        init: Option<Init<'src>>,
    },
    Expr(Expr<'src>),
    Return(Option<Expr<'src>>),
    If {
        cond: Expr<'src>,
        then_branch: Box<Stmt<'src>>,
        else_branch: Option<Box<Stmt<'src>>>,
    },
    While {
        cond: Expr<'src>,
        body: Box<Stmt<'src>>,
    },
    For {
        init: Option<Box<Stmt<'src>>>,
        cond: Option<Expr<'src>>,
        step: Option<Expr<'src>>,
        body: Box<Stmt<'src>>,
    },
    Block(Vec<Stmt<'src>>),
}

#[derive(Debug, Clone)]
pub struct Param<'src> {
    pub name: &'src str,
    pub ty: TypeExpr,
}

#[derive(Debug, Clone)]
pub struct Function<'src> {
    pub name: &'src str,
    pub ret: TypeExpr,
    pub params: Vec<Param<'src>>,
    pub body: Vec<Stmt<'src>>,
}

#[derive(Debug, Clone)]
pub enum Item<'src> {
    Function(Function<'src>),
    Global {
        name: &'src str,
        ty: TypeExpr,
        init: Option<Expr<'src>>,
    },
}

#[derive(Debug, Clone)]
pub struct Ast<'src> {
    pub items: Vec<Item<'src>>,
}
