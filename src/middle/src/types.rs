//! The type and size model: `int` scalars, pointers, and one-dimensional
//! arrays. Sizes and alignments are pure functions of the type.

use crate::ir::Width;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Int,
    Ptr(Box<Type>),
    Array(Box<Type>, usize),
}

impl Type {
    pub fn size_of(&self) -> usize {
        match self {
            Type::Int => 4,
            Type::Ptr(_) => 8,
            Type::Array(elem, len) => elem.size_of() * len,
        }
    }

    pub fn align_of(&self) -> usize {
        match self {
            Type::Int => 4,
            Type::Ptr(_) => 8,
            Type::Array(elem, _) => elem.align_of(),
        }
    }

    /// Size of the pointee/element, i.e. the scaling factor for pointer
    /// arithmetic on this type. `None` for `int`.
    pub fn element_size(&self) -> Option<usize> {
        match self {
            Type::Int => None,
            Type::Ptr(pointee) => Some(pointee.size_of()),
            Type::Array(elem, _) => Some(elem.size_of()),
        }
    }

    /// Arrays decay to a pointer to their element; other types are
    /// unchanged.
    pub fn decayed(&self) -> Type {
        match self {
            Type::Array(elem, _) => Type::Ptr(elem.clone()),
            _ => self.clone(),
        }
    }

    pub fn width(&self) -> Width {
        match self {
            Type::Int => Width::Int,
            Type::Ptr(_) | Type::Array(..) => Width::Ptr,
        }
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Type::Int => write!(f, "int"),
            Type::Ptr(pointee) => write!(f, "{pointee}*"),
            Type::Array(elem, len) => write!(f, "{elem}[{len}]"),
        }
    }
}
