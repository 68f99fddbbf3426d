//! Fused GPU kernel for bonded force terms.
//!
//! Bonds, angles, torsions and other fixed-arity terms are registered as atom
//! tuples plus a WGSL snippet. [`BondedForces`] packs the tuples into index
//! buffers, generates one grid-strided block per term, compiles the fused
//! kernel once and then launches it every step with a mask selecting the
//! active force groups. Forces and energy land in fixed-point accumulators
//! shared with the rest of the simulation.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use bonded::terms::{HarmonicBond, add_harmonic_bonds};
//! use bonded::{BondedConfig, BondedForces, GpuContext, SharedAccumulators};
//!
//! let ctx = Arc::new(GpuContext::new()?);
//! let accumulators = SharedAccumulators::allocate(&ctx, 4, 1024)?;
//! let mut forces = BondedForces::new(Arc::clone(&ctx), accumulators, BondedConfig::default())?;
//!
//! let bonds = [
//!     HarmonicBond { atoms: [0, 1], length: 1.0, k: 100.0 },
//!     HarmonicBond { atoms: [2, 3], length: 1.0, k: 100.0 },
//! ];
//! add_harmonic_bonds(&mut forces, &bonds, 0)?;
//! forces.initialize()?;
//!
//! let positions = [
//!     [0.0, 0.0, 0.0, 0.0],
//!     [1.2, 0.0, 0.0, 0.0],
//!     [0.0, 2.0, 0.0, 0.0],
//!     [0.0, 2.9, 0.0, 0.0],
//! ];
//! forces.accumulators().upload_positions(&ctx, &positions);
//! forces.accumulators().clear(&ctx);
//! forces.dispatch(0b1)?;
//! let f = forces.accumulators().read_forces(&ctx)?;
//! println!("force on atom 0: {:?}", f[0]);
//! # Ok::<(), bonded::BondedError>(())
//! ```

pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod forces;
pub mod pipeline;
pub mod registry;
pub mod terms;

#[cfg(test)]
mod testing;

pub use bonded_codegen;
pub use bonded_gpu;
pub use bonded_gpu::{ComputeBackend, GpuContext};

pub use config::BondedConfig;
pub use context::SharedAccumulators;
pub use error::{BondedError, Result};
pub use forces::{BondedForces, LifecycleState};
pub use pipeline::KernelSummary;
pub use registry::{ExternalArgument, ForceTerm, Registry};
