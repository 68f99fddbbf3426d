//! Kernel IR: typed source fragments and named parameter slots.
//!
//! A [`KernelProgram`] is an ordered list of [`Fragment`]s plus the kernel's
//! parameter list. Nothing is turned into text until [`KernelProgram::render`],
//! so each fragment can be inspected and tested on its own.

use std::fmt::Write as _;

use indexmap::IndexMap;

use crate::generator::TermBlock;
use crate::packer::IndexWidth;

/// Fractional bits of the fixed-point accumulators.
pub const FIXED_POINT_FRACTION_BITS: u32 = 32;

/// Parameters every kernel declares ahead of its index buffers.
pub const FIXED_PARAM_COUNT: usize = 4;

pub const FORCE_BUFFER: &str = "force_buffer";
pub const ENERGY_BUFFER: &str = "energy_buffer";
pub const POSITIONS: &str = "posq";
pub const GROUP_MASK: &str = "groups";

/// Define holding the atom count rounded up for lane striding.
pub const PADDED_NUM_ATOMS: &str = "PADDED_NUM_ATOMS";
pub const NUM_ATOMS: &str = "NUM_ATOMS";
pub const WORKGROUP_SIZE: &str = "WORKGROUP_SIZE";

/// How a parameter is bound on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingAccess {
    StorageReadOnly,
    StorageReadWrite,
    Uniform,
}

/// Role of a kernel parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamKind {
    /// Three fixed-point force lanes, shared with other force modules.
    ForceAccumulator,
    /// Per-thread fixed-point energy slots.
    EnergyAccumulator,
    /// Per-atom `vec4<f32>` positions.
    Positions,
    /// Active-group bitmask, updated every dispatch.
    GroupMask,
    /// One packed index buffer of a term.
    AtomIndices(IndexWidth),
    /// Caller-supplied buffer referenced by expression snippets.
    External { type_name: String },
}

impl ParamKind {
    pub fn access(&self) -> BindingAccess {
        match self {
            ParamKind::ForceAccumulator | ParamKind::EnergyAccumulator => {
                BindingAccess::StorageReadWrite
            }
            ParamKind::GroupMask => BindingAccess::Uniform,
            ParamKind::Positions | ParamKind::AtomIndices(_) | ParamKind::External { .. } => {
                BindingAccess::StorageReadOnly
            }
        }
    }

    fn wgsl_type(&self) -> String {
        match self {
            ParamKind::ForceAccumulator | ParamKind::EnergyAccumulator => {
                "array<atomic<u32>>".to_string()
            }
            ParamKind::Positions => "array<vec4<f32>>".to_string(),
            ParamKind::GroupMask => "GroupMask".to_string(),
            ParamKind::AtomIndices(width) => format!("array<{}>", width.wgsl_type()),
            ParamKind::External { type_name } => format!("array<{type_name}>"),
        }
    }
}

/// A named kernel parameter; its position in the list is its binding index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelParam {
    pub name: String,
    pub kind: ParamKind,
}

impl KernelParam {
    pub fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// WGSL declaration of this parameter at `binding`.
    pub fn declaration(&self, binding: usize) -> String {
        let space = match self.kind.access() {
            BindingAccess::StorageReadOnly => "storage, read",
            BindingAccess::StorageReadWrite => "storage, read_write",
            BindingAccess::Uniform => "uniform",
        };
        format!(
            "@group(0) @binding({binding}) var<{space}> {}: {};",
            self.name,
            self.kind.wgsl_type()
        )
    }
}

/// One piece of kernel source, in emission order.
#[derive(Debug, Clone)]
pub enum Fragment {
    /// Raw caller code, emitted verbatim.
    Prefix(String),
    /// Group-mask struct and fixed-point accumulation helpers.
    Support,
    /// Binding declarations for every kernel parameter.
    Signature,
    /// Entry-point header, thread indexing and the energy accumulator.
    EntryOpen { entry_point: String },
    /// Per-term block.
    Term(TermBlock),
    /// Per-thread energy flush and closing brace.
    Epilogue,
}

impl Fragment {
    /// Render this fragment; `params` supplies the signature.
    pub fn render(&self, params: &[KernelParam], out: &mut String) {
        match self {
            Fragment::Prefix(code) => out.push_str(code),
            Fragment::Support => out.push_str(SUPPORT_SOURCE),
            Fragment::Signature => {
                for (binding, param) in params.iter().enumerate() {
                    out.push_str(&param.declaration(binding));
                    out.push('\n');
                }
                out.push('\n');
            }
            Fragment::EntryOpen { entry_point } => {
                let _ = write!(
                    out,
                    "@compute @workgroup_size({WORKGROUP_SIZE})\n\
                     fn {entry_point}(\n    \
                         @builtin(global_invocation_id) global_id: vec3<u32>,\n    \
                         @builtin(num_workgroups) workgroup_count: vec3<u32>,\n\
                     ) {{\n    \
                         let thread_index = global_id.x;\n    \
                         let thread_count = workgroup_count.x * {WORKGROUP_SIZE};\n    \
                         var energy: f32 = 0.0;\n"
                );
            }
            Fragment::Term(block) => block.render(out),
            Fragment::Epilogue => {
                out.push_str("    add_energy_fixed(thread_index, energy);\n}\n");
            }
        }
    }
}

/// Fixed-point helpers shared by every term.
///
/// Values carry 32 fractional bits in a 64-bit two's-complement integer kept
/// as a (low, high) pair of `u32` words. The carry out of the low word is read
/// back from `atomicAdd`, so concurrent additions stay exact in any order.
const SUPPORT_SOURCE: &str = "\
struct GroupMask {
    mask: u32,
}

fn to_fixed_point(value: f32) -> vec2<u32> {
    let whole = floor(value);
    let fraction = u32((value - whole) * 4294967296.0);
    return vec2<u32>(fraction, bitcast<u32>(i32(whole)));
}

fn add_force_fixed(slot: u32, value: f32) {
    let fixed = to_fixed_point(value);
    let previous = atomicAdd(&force_buffer[2u * slot], fixed.x);
    let carry = select(0u, 1u, previous + fixed.x < previous);
    atomicAdd(&force_buffer[2u * slot + 1u], fixed.y + carry);
}

fn add_energy_fixed(slot: u32, value: f32) {
    let fixed = to_fixed_point(value);
    let previous = atomicAdd(&energy_buffer[2u * slot], fixed.x);
    let carry = select(0u, 1u, previous + fixed.x < previous);
    atomicAdd(&energy_buffer[2u * slot + 1u], fixed.y + carry);
}

";

/// A fully assembled kernel, not yet flattened to text.
#[derive(Debug, Clone)]
pub struct KernelProgram {
    pub entry_point: String,
    pub defines: IndexMap<String, String>,
    pub params: Vec<KernelParam>,
    pub fragments: Vec<Fragment>,
}

impl KernelProgram {
    /// Number of kernel parameters (bindings).
    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// Parameter roles in binding order.
    pub fn param_kinds(&self) -> Vec<ParamKind> {
        self.params.iter().map(|p| p.kind.clone()).collect()
    }

    /// Term blocks in registration order.
    pub fn terms(&self) -> impl Iterator<Item = &TermBlock> {
        self.fragments.iter().filter_map(|f| match f {
            Fragment::Term(block) => Some(block),
            _ => None,
        })
    }

    /// Flatten every fragment into one WGSL source string.
    ///
    /// Defines are not included; the compilation service injects them.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for fragment in &self.fragments {
            fragment.render(&self.params, &mut out);
        }
        out
    }
}
