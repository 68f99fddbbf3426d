//! GPU context management for wgpu device and queue.

use std::sync::Arc;

use crate::error::{GpuError, Result};

/// GPU context holding wgpu device and queue.
///
/// Create one context and share it across every force module; the device
/// and queue are reference counted so buffers can outlive a borrow of it.
pub struct GpuContext {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    adapter_info: wgpu::AdapterInfo,
}

/// Options for GPU context creation.
#[derive(Debug, Clone)]
pub struct GpuContextOptions {
    /// Backend APIs to consider.
    pub backends: wgpu::Backends,
    /// Power preference for adapter selection.
    pub power_preference: wgpu::PowerPreference,
    /// Storage buffers a single kernel may bind. Every index buffer and
    /// external argument takes one slot.
    pub max_storage_buffers_per_shader_stage: u32,
}

impl Default for GpuContextOptions {
    fn default() -> Self {
        Self {
            backends: wgpu::Backends::PRIMARY,
            power_preference: wgpu::PowerPreference::HighPerformance,
            max_storage_buffers_per_shader_stage: 16,
        }
    }
}

impl GpuContext {
    /// Create a new GPU context with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`GpuError::NoAdapter`] if no compatible GPU is found.
    /// Returns [`GpuError::DeviceRequest`] if device creation fails.
    pub fn new() -> Result<Self> {
        Self::with_options(GpuContextOptions::default())
    }

    pub fn with_options(options: GpuContextOptions) -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: options.backends,
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: options.power_preference,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or(GpuError::NoAdapter)?;

        let adapter_info = adapter.get_info();
        tracing::info!(
            adapter = %adapter_info.name,
            backend = ?adapter_info.backend,
            device_type = ?adapter_info.device_type,
            "GPU adapter selected"
        );

        // Ask for more storage bindings than the default, capped by the adapter
        let supported = adapter.limits();
        let required_limits = wgpu::Limits {
            max_storage_buffers_per_shader_stage: options
                .max_storage_buffers_per_shader_stage
                .min(supported.max_storage_buffers_per_shader_stage),
            ..wgpu::Limits::default()
        };

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("bonded-gpu-device"),
                required_features: wgpu::Features::empty(),
                required_limits,
                memory_hints: Default::default(),
            },
            None,
        ))
        .map_err(|e| GpuError::DeviceRequest(e.to_string()))?;

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            adapter_info,
        })
    }

    /// Get adapter name for diagnostics.
    pub fn adapter_name(&self) -> &str {
        &self.adapter_info.name
    }

    pub fn backend(&self) -> wgpu::Backend {
        self.adapter_info.backend
    }

    /// Largest number of storage buffers one kernel can bind on this device.
    pub fn max_storage_buffers(&self) -> u32 {
        self.device.limits().max_storage_buffers_per_shader_stage
    }

    /// Create a storage buffer; `readback` adds `COPY_SRC` for staging copies.
    pub fn create_storage_buffer(&self, label: &str, size: u64, readback: bool) -> wgpu::Buffer {
        let mut usage = wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST;
        if readback {
            usage |= wgpu::BufferUsages::COPY_SRC;
        }
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage,
            mapped_at_creation: false,
        })
    }

    /// Create a staging buffer for CPU readback.
    pub fn create_staging_buffer(&self, label: &str, size: u64) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// Upload data to a buffer.
    pub fn upload_buffer<T: bytemuck::Pod>(&self, buffer: &wgpu::Buffer, data: &[T]) {
        self.queue.write_buffer(buffer, 0, bytemuck::cast_slice(data));
    }

    /// Zero a buffer on the device.
    pub fn clear_buffer(&self, buffer: &wgpu::Buffer) {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("clear_encoder"),
            });
        encoder.clear_buffer(buffer, 0, None);
        self.queue.submit(Some(encoder.finish()));
    }

    /// Copy `buffer` to a staging buffer and read it back as `u32` words.
    pub async fn read_words(&self, buffer: &wgpu::Buffer) -> Result<Vec<u32>> {
        let size = buffer.size();
        let staging = self.create_staging_buffer("readback_staging", size);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback_encoder"),
            });
        encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, size);
        self.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            tx.send(result).ok();
        });

        self.device.poll(wgpu::Maintain::Wait);

        rx.receive()
            .await
            .ok_or_else(|| GpuError::BufferMapping("map callback dropped".to_string()))?
            .map_err(|e| GpuError::BufferMapping(format!("{e:?}")))?;

        let data = slice.get_mapped_range();
        let words: Vec<u32> = bytemuck::cast_slice(&data).to_vec();
        drop(data);
        staging.unmap();

        Ok(words)
    }

    /// Blocking form of [`read_words`](Self::read_words).
    pub fn read_words_blocking(&self, buffer: &wgpu::Buffer) -> Result<Vec<u32>> {
        pollster::block_on(self.read_words(buffer))
    }
}
