//! Error types for bonded-codegen.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodegenError {
    #[error("term has no tuples")]
    EmptyTerm,

    #[error("term tuples have zero atoms")]
    ZeroArity,

    #[error("tuple {tuple} has {found} atoms, expected {expected}")]
    RaggedTuple {
        tuple: usize,
        expected: usize,
        found: usize,
    },

    #[error("term has {count} tuples, more than a u32 loop bound can address")]
    TooManyTuples { count: usize },

    #[error("group {0} does not fit in a 32-bit group mask")]
    GroupOutOfRange(u32),

    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("invalid WGSL type name: {0:?}")]
    InvalidTypeName(String),
}

pub type Result<T> = std::result::Result<T, CodegenError>;
