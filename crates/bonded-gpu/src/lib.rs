//! GPU backend for fused bonded-force kernels using wgpu compute shaders.
//!
//! Provides the [`ComputeBackend`] seam the bonded-force pipeline runs
//! against, its wgpu implementation on [`GpuContext`], and the host side of
//! the fixed-point force and energy accumulators.

pub mod accumulators;
pub mod backend;
pub mod context;
pub mod error;
pub mod kernel;

pub use accumulators::{
    ATOM_PADDING, SLOT_BYTES, decode_energy, decode_forces, energy_accumulator_bytes,
    f64_to_fixed, fixed_to_f64, force_accumulator_bytes, padded_atom_count,
};
pub use backend::{ComputeBackend, KernelArg, render_defines};
pub use context::{GpuContext, GpuContextOptions};
pub use error::{GpuError, Result};
pub use kernel::WgpuKernel;
pub use wgpu;
