mod codegen;
pub mod x86;

pub use codegen::CodegenError;

use middle::ir;

impl TryFrom<&ir::Program> for x86::Program {
    type Error = CodegenError;

    fn try_from(program: &ir::Program) -> Result<Self, Self::Error> {
        codegen::compile(program)
    }
}
