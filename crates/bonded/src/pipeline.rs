//! Kernel build: pack, generate, assemble, compile.

use std::sync::Arc;

use bonded_codegen::{
    KernelAssembler, NUM_ATOMS, PADDED_NUM_ATOMS, WORKGROUP_SIZE, index_buffer_name, pack_term,
};
use bonded_gpu::{ComputeBackend, GpuError};
use tracing::{debug, info, warn};

use crate::config::BondedConfig;
use crate::context::SharedAccumulators;
use crate::error::{BondedError, Result};
use crate::registry::Registry;

/// Scalars describing a built kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelSummary {
    pub num_terms: usize,
    pub num_index_buffers: usize,
    pub param_count: usize,
    pub max_tuple_count: usize,
    pub workgroups: u32,
    /// Rendered source, defines excluded. `None` when no term was registered.
    pub source: Option<String>,
}

/// Device resources that survive the build.
pub struct CompiledKernel<B: ComputeBackend> {
    pub kernel: B::Kernel,
    /// Packed index buffers, term-then-window order.
    pub index_buffers: Vec<B::Buffer>,
    /// External arguments, registration order.
    pub arguments: Vec<Arc<B::Buffer>>,
}

/// Result of a successful build. `compiled` is `None` for an empty build.
pub struct BuiltKernel<B: ComputeBackend> {
    pub compiled: Option<CompiledKernel<B>>,
    pub summary: KernelSummary,
}

fn compile_error(e: GpuError) -> BondedError {
    match e {
        GpuError::ShaderCompilation(diagnostic) => BondedError::Compile { diagnostic },
        GpuError::PipelineCreation {
            entry_point,
            message,
        } => BondedError::Compile {
            diagnostic: format!("entry point `{entry_point}`: {message}"),
        },
        other => BondedError::Gpu(other),
    }
}

/// Build the fused kernel from everything in `registry`.
pub fn build<B: ComputeBackend>(
    backend: &B,
    registry: Registry<B::Buffer>,
    accumulators: &SharedAccumulators<B>,
    config: &BondedConfig,
) -> Result<BuiltKernel<B>> {
    let max_tuple_count = registry.max_tuple_count();
    let workgroups = config.workgroups_for(max_tuple_count);
    let (terms, prefix, arguments) = registry.into_parts();

    if terms.is_empty() {
        warn!("no bonded terms registered; dispatch will do nothing");
        return Ok(BuiltKernel {
            compiled: None,
            summary: KernelSummary {
                num_terms: 0,
                num_index_buffers: 0,
                param_count: 0,
                max_tuple_count: 0,
                workgroups: 0,
                source: None,
            },
        });
    }

    let threads = config.threads_for(max_tuple_count);
    if accumulators.energy_slots < threads {
        return Err(BondedError::Configuration(format!(
            "energy accumulator has {} slots but a dispatch runs {threads} threads",
            accumulators.energy_slots
        )));
    }

    let mut asm = KernelAssembler::new(config.entry_point.as_str())?;
    if !prefix.is_empty() {
        asm.prefix(prefix.concat());
    }
    asm.define(PADDED_NUM_ATOMS, format!("{}u", accumulators.padded_num_atoms))?;
    asm.define(NUM_ATOMS, format!("{}u", accumulators.num_atoms))?;
    asm.define(WORKGROUP_SIZE, format!("{}u", config.workgroup_size))?;

    let mut index_buffers = Vec::new();
    for (term, def) in terms.into_iter().enumerate() {
        let packed = pack_term(&def.tuples)?;
        let mut windows = Vec::with_capacity(packed.len());
        for (window, indices) in packed.iter().enumerate() {
            let label = index_buffer_name(term, window);
            let buffer = backend.upload_immutable(&label, bytemuck::cast_slice(&indices.data))?;
            index_buffers.push(buffer);
            windows.push(indices.window);
        }
        debug!(
            term,
            group = def.group,
            arity = def.arity,
            tuples = def.tuples.len(),
            buffers = windows.len(),
            "packed term"
        );
        // tuple counts were bounded to u32 by `term_arity`
        asm.add_term(def.group, def.tuples.len() as u32, &windows, def.expression)?;
    }

    for argument in &arguments {
        let name = asm.external(&argument.type_name)?;
        debug_assert_eq!(name, argument.name);
    }

    let program = asm.finish();
    let source = program.render();
    for (name, value) in &program.defines {
        debug!(name = %name, value = %value, "kernel define");
    }

    let module = backend
        .create_module(&config.label, &source, &program.defines)
        .map_err(compile_error)?;
    let kernel = backend
        .get_kernel(&module, &program.entry_point, &program.param_kinds())
        .map_err(compile_error)?;

    let summary = KernelSummary {
        num_terms: program.terms().count(),
        num_index_buffers: index_buffers.len(),
        param_count: program.param_count(),
        max_tuple_count,
        workgroups,
        source: Some(source),
    };
    info!(
        terms = summary.num_terms,
        index_buffers = summary.num_index_buffers,
        params = summary.param_count,
        max_tuples = summary.max_tuple_count,
        workgroups = summary.workgroups,
        "bonded kernel built"
    );

    Ok(BuiltKernel {
        compiled: Some(CompiledKernel {
            kernel,
            index_buffers,
            arguments: arguments.into_iter().map(|a| a.buffer).collect(),
        }),
        summary,
    })
}
