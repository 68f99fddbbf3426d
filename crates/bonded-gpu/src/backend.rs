//! Compute backend seam.
//!
//! The bonded-force pipeline only needs five things from a device: immutable
//! uploads, a compilation service, entry-point lookup, argument binding and a
//! launch. [`ComputeBackend`] names exactly those, so the pipeline can be
//! driven by [`GpuContext`](crate::GpuContext) or by a recording stand-in.

use bonded_codegen::ParamKind;
use indexmap::IndexMap;

use crate::error::Result;

/// One kernel argument, in binding order.
#[derive(Debug)]
pub enum KernelArg<'a, B> {
    /// A device buffer bound at this slot.
    Buffer(&'a B),
    /// The backend-owned group-mask uniform, updated on each launch.
    GroupMask,
}

// Manual impls so `B` itself need not be `Clone`.
impl<B> Clone for KernelArg<'_, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B> Copy for KernelArg<'_, B> {}

pub trait ComputeBackend {
    type Buffer;
    type Module;
    type Kernel;
    type Bindings;

    /// Upload `bytes` once into a read-only storage buffer.
    fn upload_immutable(&self, label: &str, bytes: &[u8]) -> Result<Self::Buffer>;

    /// Compile `source` with `defines` injected as compile-time constants.
    fn create_module(
        &self,
        label: &str,
        source: &str,
        defines: &IndexMap<String, String>,
    ) -> Result<Self::Module>;

    /// Look up `entry_point` and build a callable kernel for `params`.
    fn get_kernel(
        &self,
        module: &Self::Module,
        entry_point: &str,
        params: &[ParamKind],
    ) -> Result<Self::Kernel>;

    /// Bind `args` to the kernel's parameters once, for repeated launches.
    fn bind(
        &self,
        kernel: &Self::Kernel,
        args: &[KernelArg<'_, Self::Buffer>],
    ) -> Result<Self::Bindings>;

    /// Launch `workgroups` workgroups with `group_mask` as the active mask.
    fn launch(
        &self,
        kernel: &Self::Kernel,
        bindings: &Self::Bindings,
        group_mask: u32,
        workgroups: u32,
    ) -> Result<()>;
}

/// Render definitions as WGSL module-scope constants, in insertion order.
pub fn render_defines(defines: &IndexMap<String, String>) -> String {
    let mut out = String::new();
    for (name, value) in defines {
        out.push_str("const ");
        out.push_str(name);
        out.push_str(" = ");
        out.push_str(value);
        out.push_str(";\n");
    }
    if !out.is_empty() {
        out.push('\n');
    }
    out
}
