//! The per-function symbol table: a flat stack of variables tagged with
//! their scope depth. Lookup walks from the innermost end, so shadowing
//! falls out of the ordering.

use crate::{error::CompileError, layout::FrameLayout, types::Type};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    Param,
    Local,
}

#[derive(Debug, Clone)]
pub struct Var<'src> {
    pub name: &'src str,
    pub ty: Type,
    pub storage: Storage,
    pub offset: usize,
    depth: usize,
}

#[derive(Debug)]
pub struct ScopeStack<'src> {
    func_name: &'src str,
    vars: Vec<Var<'src>>,
    depth: usize,
}

impl<'src> ScopeStack<'src> {
    pub fn new(func_name: &'src str) -> Self {
        Self {
            func_name,
            vars: vec![],
            depth: 0,
        }
    }

    pub fn enter_scope(&mut self) {
        self.depth += 1;
    }

    pub fn exit_scope(&mut self) {
        while self
            .vars
            .last()
            .is_some_and(|var| var.depth == self.depth)
        {
            self.vars.pop();
        }
        self.depth -= 1;
    }

    /// Declares `name` in the current scope and immediately reserves its
    /// frame slot, so offsets are fixed by declaration order. Redeclaring
    /// a name within the same scope is an error; shadowing an outer scope
    /// is not.
    pub fn declare(
        &mut self,
        name: &'src str,
        ty: Type,
        storage: Storage,
        layout: &mut FrameLayout,
    ) -> Result<usize, CompileError> {
        if self
            .vars
            .iter()
            .any(|var| var.depth == self.depth && var.name == name)
        {
            return Err(CompileError::DuplicateDeclaration {
                name: name.to_owned(),
                scope: format!("function `{}`", self.func_name),
            });
        }
        let offset = layout.reserve(ty.size_of(), ty.align_of());
        self.vars.push(Var {
            name,
            ty,
            storage,
            offset,
            depth: self.depth,
        });
        Ok(offset)
    }

    pub fn resolve(&self, name: &str) -> Option<&Var<'src>> {
        self.vars.iter().rev().find(|var| var.name == name)
    }
}
