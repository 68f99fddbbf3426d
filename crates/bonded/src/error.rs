//! Error types for the bonded-force module.

use thiserror::Error;

use crate::forces::LifecycleState;

#[derive(Debug, Error)]
pub enum BondedError {
    #[error("invalid force term: {0}")]
    Configuration(String),

    #[error("tuple {tuple} has {found} atoms, but the term's arity is {expected}")]
    InconsistentArity {
        tuple: usize,
        expected: usize,
        found: usize,
    },

    #[error("group {0} is out of range (0..=31)")]
    GroupOutOfRange(u32),

    #[error("atom index {index} in tuple {tuple} is out of range for {num_atoms} atoms")]
    AtomIndexOutOfRange {
        tuple: usize,
        index: u32,
        num_atoms: usize,
    },

    #[error("kernel compilation failed:\n{diagnostic}")]
    Compile { diagnostic: String },

    #[error("`{operation}` is not valid in the {state:?} state")]
    InvalidState {
        operation: &'static str,
        state: LifecycleState,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GPU error: {0}")]
    Gpu(#[from] bonded_gpu::GpuError),

    #[error("code generation error: {0}")]
    Codegen(#[from] bonded_codegen::CodegenError),
}

pub type Result<T> = std::result::Result<T, BondedError>;
