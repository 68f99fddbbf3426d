//! wgpu implementation of [`ComputeBackend`].
//!
//! Bind-group layouts are built explicitly from the kernel's parameter list
//! rather than derived from the shader, so a binding a kernel never reads
//! still lines up with the argument the caller passes for it.

use bonded_codegen::{BindingAccess, ParamKind};
use bytemuck::{Pod, Zeroable};
use indexmap::IndexMap;
use wgpu::util::DeviceExt;

use crate::backend::{ComputeBackend, KernelArg, render_defines};
use crate::context::GpuContext;
use crate::error::{GpuError, Result};

/// Group-mask uniform; padded to a full 16-byte uniform slot.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct GroupMaskUniform {
    mask: u32,
    _padding: [u32; 3],
}

/// A compiled entry point with its layout and group-mask uniform.
pub struct WgpuKernel {
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
    mask_buffer: wgpu::Buffer,
    params: Vec<ParamKind>,
    label: String,
}

fn layout_entry(binding: u32, kind: &ParamKind) -> wgpu::BindGroupLayoutEntry {
    let ty = match kind.access() {
        BindingAccess::StorageReadOnly => wgpu::BufferBindingType::Storage { read_only: true },
        BindingAccess::StorageReadWrite => wgpu::BufferBindingType::Storage { read_only: false },
        BindingAccess::Uniform => wgpu::BufferBindingType::Uniform,
    };
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl GpuContext {
    /// Run `f` inside a validation error scope and return its first error.
    fn with_validation_scope<T>(&self, f: impl FnOnce() -> T) -> (T, Option<wgpu::Error>) {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f();
        let error = pollster::block_on(self.device.pop_error_scope());
        (value, error)
    }
}

impl ComputeBackend for GpuContext {
    type Buffer = wgpu::Buffer;
    type Module = wgpu::ShaderModule;
    type Kernel = WgpuKernel;
    type Bindings = wgpu::BindGroup;

    fn upload_immutable(&self, label: &str, bytes: &[u8]) -> Result<wgpu::Buffer> {
        if bytes.is_empty() {
            return Err(GpuError::BufferCreation(format!(
                "`{label}` would be an empty storage buffer"
            )));
        }
        Ok(self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytes,
                usage: wgpu::BufferUsages::STORAGE,
            }))
    }

    fn create_module(
        &self,
        label: &str,
        source: &str,
        defines: &IndexMap<String, String>,
    ) -> Result<wgpu::ShaderModule> {
        let full_source = format!("{}{}", render_defines(defines), source);
        let (module, error) = self.with_validation_scope(|| {
            self.device
                .create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(label),
                    source: wgpu::ShaderSource::Wgsl(full_source.into()),
                })
        });
        match error {
            Some(e) => Err(GpuError::ShaderCompilation(e.to_string())),
            None => Ok(module),
        }
    }

    fn get_kernel(
        &self,
        module: &wgpu::ShaderModule,
        entry_point: &str,
        params: &[ParamKind],
    ) -> Result<WgpuKernel> {
        let entries: Vec<wgpu::BindGroupLayoutEntry> = params
            .iter()
            .enumerate()
            .map(|(binding, kind)| layout_entry(binding as u32, kind))
            .collect();

        let ((layout, pipeline), error) = self.with_validation_scope(|| {
            let layout = self
                .device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("bonded_bind_group_layout"),
                    entries: &entries,
                });
            let pipeline_layout =
                self.device
                    .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                        label: Some("bonded_pipeline_layout"),
                        bind_group_layouts: &[&layout],
                        push_constant_ranges: &[],
                    });
            let pipeline = self
                .device
                .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(entry_point),
                    layout: Some(&pipeline_layout),
                    module,
                    entry_point: Some(entry_point),
                    compilation_options: Default::default(),
                    cache: None,
                });
            (layout, pipeline)
        });
        if let Some(e) = error {
            return Err(GpuError::PipelineCreation {
                entry_point: entry_point.to_string(),
                message: e.to_string(),
            });
        }

        let mask_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("group_mask"),
                contents: bytemuck::bytes_of(&GroupMaskUniform {
                    mask: 0,
                    _padding: [0; 3],
                }),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });

        Ok(WgpuKernel {
            pipeline,
            layout,
            mask_buffer,
            params: params.to_vec(),
            label: entry_point.to_string(),
        })
    }

    fn bind(
        &self,
        kernel: &WgpuKernel,
        args: &[KernelArg<'_, wgpu::Buffer>],
    ) -> Result<wgpu::BindGroup> {
        if args.len() != kernel.params.len() {
            return Err(GpuError::BindingMismatch {
                expected: kernel.params.len(),
                found: args.len(),
            });
        }

        let mut entries = Vec::with_capacity(args.len());
        for (binding, (arg, kind)) in args.iter().zip(&kernel.params).enumerate() {
            let buffer = match (arg, kind) {
                (KernelArg::GroupMask, ParamKind::GroupMask) => &kernel.mask_buffer,
                (KernelArg::Buffer(buffer), kind) if *kind != ParamKind::GroupMask => *buffer,
                _ => {
                    return Err(GpuError::ArgumentKind {
                        binding,
                        expected: format!("{kind:?}"),
                    });
                }
            };
            entries.push(wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: buffer.as_entire_binding(),
            });
        }

        let (bind_group, error) = self.with_validation_scope(|| {
            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("bonded_bind_group"),
                layout: &kernel.layout,
                entries: &entries,
            })
        });
        match error {
            Some(e) => Err(GpuError::BufferCreation(e.to_string())),
            None => Ok(bind_group),
        }
    }

    fn launch(
        &self,
        kernel: &WgpuKernel,
        bindings: &wgpu::BindGroup,
        group_mask: u32,
        workgroups: u32,
    ) -> Result<()> {
        self.queue.write_buffer(
            &kernel.mask_buffer,
            0,
            bytemuck::bytes_of(&GroupMaskUniform {
                mask: group_mask,
                _padding: [0; 3],
            }),
        );

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("bonded_encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(kernel.label.as_str()),
                timestamp_writes: None,
            });
            pass.set_pipeline(&kernel.pipeline);
            pass.set_bind_group(0, bindings, &[]);
            pass.dispatch_workgroups(workgroups, 1, 1);
        }
        self.queue.submit(Some(encoder.finish()));
        Ok(())
    }
}
