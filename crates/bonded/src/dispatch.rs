//! Per-step kernel launch.

use bonded_gpu::{ComputeBackend, KernelArg};
use tracing::trace;

use crate::context::SharedAccumulators;
use crate::error::Result;
use crate::pipeline::{BuiltKernel, CompiledKernel, KernelSummary};

struct Bound<B: ComputeBackend> {
    compiled: CompiledKernel<B>,
    bindings: B::Bindings,
}

/// A built kernel with its arguments bound, ready to launch every step.
pub struct ReadyKernel<B: ComputeBackend> {
    bound: Option<Bound<B>>,
    pub summary: KernelSummary,
}

/// Bind every kernel argument once, in parameter order.
pub fn prepare<B: ComputeBackend>(
    backend: &B,
    built: BuiltKernel<B>,
    accumulators: &SharedAccumulators<B>,
) -> Result<ReadyKernel<B>> {
    let BuiltKernel { compiled, summary } = built;
    let Some(compiled) = compiled else {
        return Ok(ReadyKernel {
            bound: None,
            summary,
        });
    };

    let mut args = vec![
        KernelArg::Buffer(&*accumulators.forces),
        KernelArg::Buffer(&*accumulators.energy),
        KernelArg::Buffer(&*accumulators.positions),
        KernelArg::GroupMask,
    ];
    args.extend(compiled.index_buffers.iter().map(KernelArg::Buffer));
    args.extend(compiled.arguments.iter().map(|a| KernelArg::Buffer(&**a)));

    let bindings = backend.bind(&compiled.kernel, &args)?;

    Ok(ReadyKernel {
        bound: Some(Bound { compiled, bindings }),
        summary,
    })
}

impl<B: ComputeBackend> ReadyKernel<B> {
    /// Launch with `group_mask` selecting the active groups.
    ///
    /// A kernel built without terms launches nothing.
    pub fn dispatch(&self, backend: &B, group_mask: u32) -> Result<()> {
        let Some(bound) = &self.bound else {
            trace!(group_mask, "no bonded terms; skipping dispatch");
            return Ok(());
        };
        trace!(
            group_mask,
            workgroups = self.summary.workgroups,
            "dispatching bonded kernel"
        );
        backend.launch(
            &bound.compiled.kernel,
            &bound.bindings,
            group_mask,
            self.summary.workgroups,
        )?;
        Ok(())
    }
}
