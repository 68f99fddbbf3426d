//! Error types for GPU compute operations.

use thiserror::Error;

/// Errors that can occur while compiling, binding or launching a kernel.
#[derive(Error, Debug)]
pub enum GpuError {
    /// No compatible GPU adapter was found.
    #[error("no compatible GPU adapter found")]
    NoAdapter,

    /// Failed to request GPU device.
    #[error("failed to request GPU device: {0}")]
    DeviceRequest(String),

    /// Shader compilation failed; carries the compiler's diagnostic verbatim.
    #[error("shader compilation failed:\n{0}")]
    ShaderCompilation(String),

    /// The entry point could not be turned into a pipeline.
    #[error("compute pipeline creation failed for `{entry_point}`: {message}")]
    PipelineCreation { entry_point: String, message: String },

    /// Argument list does not match the kernel's parameter list.
    #[error("kernel expects {expected} arguments, got {found}")]
    BindingMismatch { expected: usize, found: usize },

    /// An argument of the wrong role was supplied at `binding`.
    #[error("argument {binding} does not match parameter kind {expected}")]
    ArgumentKind { binding: usize, expected: String },

    /// Buffer creation failed.
    #[error("buffer creation failed: {0}")]
    BufferCreation(String),

    /// Buffer mapping failed.
    #[error("buffer mapping failed: {0}")]
    BufferMapping(String),
}

pub type Result<T> = std::result::Result<T, GpuError>;
