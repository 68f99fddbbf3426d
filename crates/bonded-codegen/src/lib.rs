//! Bonded-force kernel generator: fuses local force terms into one WGSL kernel.
//!
//! `bonded-codegen` is the host-only half of the bonded-force module. It
//! never touches a device; it turns registered terms into packed index data
//! and kernel source text:
//!
//! - Atom-index packing into `u32` / `vec4<u32>` buffers
//! - Per-term, group-gated, grid-strided code blocks
//! - A typed fragment IR that is flattened to text only at the end
//! - Fixed-point atomic accumulation helpers for forces and energy
//!
//! # Example: one harmonic bond term
//!
//! ```
//! use bonded_codegen::{KernelAssembler, pack_term};
//!
//! let tuples = vec![vec![0, 1], vec![2, 3]];
//! let packed = pack_term(&tuples).unwrap();
//! let windows: Vec<_> = packed.iter().map(|p| p.window).collect();
//!
//! let mut asm = KernelAssembler::new("compute_bonded_forces").unwrap();
//! let params = asm.external("vec2<f32>").unwrap();
//! asm.add_term(
//!     0,
//!     tuples.len() as u32,
//!     &windows,
//!     format!(
//!         "let p = {params}[index];\n\
//!          let d = pos2.xyz - pos1.xyz;\n\
//!          let r = length(d);\n\
//!          let dr = r - p.x;\n\
//!          energy += 0.5 * p.y * dr * dr;\n\
//!          let f = (p.y * dr / r) * d;\n\
//!          force1 += f;\n\
//!          force2 -= f;"
//!     ),
//! )
//! .unwrap();
//!
//! let program = asm.finish();
//! assert_eq!(program.param_count(), 4 + 1 + 1);
//! assert!(program.render().contains("fn compute_bonded_forces("));
//! ```

pub mod assembler;
pub mod error;
pub mod generator;
pub mod ir;
pub mod packer;

pub use assembler::{KernelAssembler, external_arg_name, validate_identifier, validate_type_name};
pub use error::{CodegenError, Result};
pub use generator::{IndexLoad, MAX_GROUPS, TermBlock, index_buffer_name};
pub use ir::{
    BindingAccess, FIXED_PARAM_COUNT, FIXED_POINT_FRACTION_BITS, Fragment, KernelParam,
    KernelProgram, NUM_ATOMS, PADDED_NUM_ATOMS, ParamKind, WORKGROUP_SIZE,
};
pub use packer::{
    IndexWidth, MAX_WINDOW_ATOMS, PackedIndices, Window, pack_term, plan_windows, term_arity,
};
