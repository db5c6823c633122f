pub mod error;
pub mod ir;
pub mod layout;
mod lowering;
pub mod symbols;
pub mod types;

use frontend::ast::Ast;

impl TryFrom<&Ast<'_>> for ir::Program {
    type Error = error::CompileError;

    fn try_from(ast: &Ast<'_>) -> Result<Self, Self::Error> {
        lowering::lower(ast)
    }
}
