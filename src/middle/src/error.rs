use thiserror::Error;

/// Errors that abort lowering. Each names the offending construct; no
/// source positions are tracked.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("duplicate declaration of `{name}` in {scope}")]
    DuplicateDeclaration { name: String, scope: String },
    #[error("unknown identifier `{name}`")]
    UnknownIdentifier { name: String },
    #[error("invalid lvalue: {context}")]
    InvalidLvalue { context: String },
    #[error("type mismatch: {context}")]
    TypeMismatch { context: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("call depth exceeded {max_depth} activations")]
    StackOverflow { max_depth: usize },
    #[error("division by zero")]
    DivisionByZero,
    #[error("invalid memory access at address {address}")]
    InvalidAccess { address: usize },
}
