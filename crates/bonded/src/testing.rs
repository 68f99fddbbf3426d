//! In-memory backend that records every call, for tests without a device.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use bonded_codegen::ParamKind;
use bonded_gpu::{ComputeBackend, GpuError, KernelArg};
use indexmap::IndexMap;

use crate::context::SharedAccumulators;

static NEXT_BUFFER: AtomicUsize = AtomicUsize::new(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecBuffer {
    pub id: usize,
    pub label: String,
    pub words: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecKernel {
    pub entry_point: String,
    pub params: Vec<ParamKind>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Upload { label: String, words: Vec<u32> },
    Module {
        label: String,
        source: String,
        defines: IndexMap<String, String>,
    },
    Kernel { entry_point: String, params: Vec<ParamKind> },
    Bind { args: Vec<Option<usize>> },
    Launch { group_mask: u32, workgroups: u32 },
}

#[derive(Debug, Default)]
pub struct RecordingBackend {
    calls: Mutex<Vec<Call>>,
    compile_error: Mutex<Option<String>>,
}

fn buffer(label: &str, words: Vec<u32>) -> RecBuffer {
    RecBuffer {
        id: NEXT_BUFFER.fetch_add(1, Ordering::Relaxed),
        label: label.to_string(),
        words,
    }
}

impl RecordingBackend {
    /// A buffer the backend never saw, standing in for a caller allocation.
    pub fn detached_buffer() -> RecBuffer {
        buffer("detached", Vec::new())
    }

    pub fn accumulators(
        &self,
        num_atoms: usize,
        energy_slots: usize,
    ) -> SharedAccumulators<RecordingBackend> {
        SharedAccumulators::new(
            Arc::new(buffer("forces", Vec::new())),
            Arc::new(buffer("energy", Vec::new())),
            Arc::new(buffer("positions", Vec::new())),
            num_atoms,
            energy_slots,
        )
        .unwrap()
    }

    /// Make the next `create_module` fail with `diagnostic`.
    pub fn fail_compile(&self, diagnostic: &str) {
        *self.compile_error.lock().unwrap() = Some(diagnostic.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    pub fn uploads(&self) -> Vec<(String, Vec<u32>)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Upload { label, words } => Some((label, words)),
                _ => None,
            })
            .collect()
    }

    pub fn launches(&self) -> Vec<(u32, u32)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Launch {
                    group_mask,
                    workgroups,
                } => Some((group_mask, workgroups)),
                _ => None,
            })
            .collect()
    }

    pub fn defines(&self) -> IndexMap<String, String> {
        self.calls()
            .into_iter()
            .find_map(|c| match c {
                Call::Module { defines, .. } => Some(defines),
                _ => None,
            })
            .unwrap_or_default()
    }

    pub fn kernel_params(&self) -> Vec<ParamKind> {
        self.calls()
            .into_iter()
            .find_map(|c| match c {
                Call::Kernel { params, .. } => Some(params),
                _ => None,
            })
            .unwrap_or_default()
    }

    pub fn bound_args(&self) -> Vec<Option<usize>> {
        self.calls()
            .into_iter()
            .find_map(|c| match c {
                Call::Bind { args } => Some(args),
                _ => None,
            })
            .unwrap_or_default()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl ComputeBackend for RecordingBackend {
    type Buffer = RecBuffer;
    type Module = String;
    type Kernel = RecKernel;
    type Bindings = Vec<Option<usize>>;

    fn upload_immutable(&self, label: &str, bytes: &[u8]) -> bonded_gpu::Result<RecBuffer> {
        let words: Vec<u32> = bytes
            .chunks_exact(4)
            .map(|b| u32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        self.record(Call::Upload {
            label: label.to_string(),
            words: words.clone(),
        });
        Ok(buffer(label, words))
    }

    fn create_module(
        &self,
        label: &str,
        source: &str,
        defines: &IndexMap<String, String>,
    ) -> bonded_gpu::Result<String> {
        self.record(Call::Module {
            label: label.to_string(),
            source: source.to_string(),
            defines: defines.clone(),
        });
        match self.compile_error.lock().unwrap().take() {
            Some(diagnostic) => Err(GpuError::ShaderCompilation(diagnostic)),
            None => Ok(source.to_string()),
        }
    }

    fn get_kernel(
        &self,
        module: &String,
        entry_point: &str,
        params: &[ParamKind],
    ) -> bonded_gpu::Result<RecKernel> {
        self.record(Call::Kernel {
            entry_point: entry_point.to_string(),
            params: params.to_vec(),
        });
        if !module.contains(&format!("fn {entry_point}(")) {
            return Err(GpuError::PipelineCreation {
                entry_point: entry_point.to_string(),
                message: "entry point not found".to_string(),
            });
        }
        Ok(RecKernel {
            entry_point: entry_point.to_string(),
            params: params.to_vec(),
        })
    }

    fn bind(
        &self,
        kernel: &RecKernel,
        args: &[KernelArg<'_, RecBuffer>],
    ) -> bonded_gpu::Result<Vec<Option<usize>>> {
        if args.len() != kernel.params.len() {
            return Err(GpuError::BindingMismatch {
                expected: kernel.params.len(),
                found: args.len(),
            });
        }
        let ids: Vec<Option<usize>> = args
            .iter()
            .map(|a| match a {
                KernelArg::Buffer(b) => Some(b.id),
                KernelArg::GroupMask => None,
            })
            .collect();
        self.record(Call::Bind { args: ids.clone() });
        Ok(ids)
    }

    fn launch(
        &self,
        _kernel: &RecKernel,
        _bindings: &Vec<Option<usize>>,
        group_mask: u32,
        workgroups: u32,
    ) -> bonded_gpu::Result<()> {
        self.record(Call::Launch {
            group_mask,
            workgroups,
        });
        Ok(())
    }
}
