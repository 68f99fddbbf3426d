//! Per-term WGSL block generation.
//!
//! Each registered term becomes one group-gated, grid-strided loop over its
//! tuples. Inside the loop the block loads the tuple's atom indices and
//! positions, declares zeroed per-atom force vectors, splices the caller's
//! snippet and finally pushes every force component into the shared
//! fixed-point accumulator.
//!
//! Names visible to a snippet:
//!
//! | name          | meaning                                   |
//! |---------------|-------------------------------------------|
//! | `atom1..N`    | `u32` atom index of slot k (1-based)      |
//! | `pos1..N`     | `vec4<f32>` position of atom k            |
//! | `force1..N`   | `vec3<f32>` force on atom k, starts at 0  |
//! | `energy`      | `f32` per-thread energy accumulator       |
//! | `index`       | `u32` tuple index within the term         |
//! | `customArgK`  | external argument buffers (1-based)       |

use std::fmt::Write as _;

use crate::error::{CodegenError, Result};
use crate::ir::{PADDED_NUM_ATOMS, POSITIONS};
use crate::packer::{IndexWidth, Window};

/// Number of distinct force groups a mask can gate.
pub const MAX_GROUPS: u32 = 32;

/// Load of one packed index buffer inside a term block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexLoad {
    /// Kernel parameter holding the buffer.
    pub param: String,
    pub window: Window,
}

/// Name of the index buffer for window `window` of term `term`.
pub fn index_buffer_name(term: usize, window: usize) -> String {
    format!("atom_indices{term}_{window}")
}

/// Source block for one force term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermBlock {
    pub term: usize,
    pub group: u32,
    pub tuple_count: u32,
    pub arity: usize,
    pub loads: Vec<IndexLoad>,
    pub expression: String,
}

impl TermBlock {
    pub fn new(
        term: usize,
        group: u32,
        tuple_count: u32,
        windows: &[Window],
        expression: impl Into<String>,
    ) -> Result<Self> {
        if group >= MAX_GROUPS {
            return Err(CodegenError::GroupOutOfRange(group));
        }
        let arity = windows.iter().map(|w| w.atoms).sum();
        if arity == 0 {
            return Err(CodegenError::ZeroArity);
        }
        let loads = windows
            .iter()
            .enumerate()
            .map(|(i, &window)| IndexLoad {
                param: index_buffer_name(term, i),
                window,
            })
            .collect();
        Ok(Self {
            term,
            group,
            tuple_count,
            arity,
            loads,
            expression: expression.into(),
        })
    }

    /// Bit tested against the group mask.
    pub fn group_bit(&self) -> u32 {
        1u32 << self.group
    }

    pub fn render(&self, out: &mut String) {
        let _ = writeln!(
            out,
            "    // term {}: group {}, {} tuples of {} atoms",
            self.term, self.group, self.tuple_count, self.arity
        );
        let _ = writeln!(
            out,
            "    if ((groups.mask & {}u) != 0u) {{",
            self.group_bit()
        );
        let _ = writeln!(
            out,
            "        for (var index = thread_index; index < {}u; index += thread_count) {{",
            self.tuple_count
        );

        const BODY: &str = "            ";
        for (buffer, load) in self.loads.iter().enumerate() {
            let window = load.window;
            match window.width {
                IndexWidth::Scalar => {
                    let _ = writeln!(
                        out,
                        "{BODY}let atom{} = {}[index];",
                        window.first_atom + 1,
                        load.param
                    );
                }
                IndexWidth::Vec4 => {
                    let _ = writeln!(out, "{BODY}let atoms{buffer} = {}[index];", load.param);
                    for (lane, slot) in window.slots().enumerate() {
                        let _ = writeln!(
                            out,
                            "{BODY}let atom{} = atoms{buffer}{};",
                            slot + 1,
                            window.width.component(lane)
                        );
                    }
                }
            }
        }
        for k in 1..=self.arity {
            let _ = writeln!(out, "{BODY}let pos{k} = {POSITIONS}[atom{k}];");
        }
        for k in 1..=self.arity {
            let _ = writeln!(out, "{BODY}var force{k} = vec3<f32>(0.0);");
        }

        let _ = writeln!(out, "{BODY}{{");
        for line in self.expression.lines() {
            if line.trim().is_empty() {
                out.push('\n');
            } else {
                let _ = writeln!(out, "{BODY}    {line}");
            }
        }
        let _ = writeln!(out, "{BODY}}}");

        for k in 1..=self.arity {
            let _ = writeln!(out, "{BODY}add_force_fixed(atom{k}, force{k}.x);");
            let _ = writeln!(
                out,
                "{BODY}add_force_fixed(atom{k} + {PADDED_NUM_ATOMS}, force{k}.y);"
            );
            let _ = writeln!(
                out,
                "{BODY}add_force_fixed(atom{k} + 2u * {PADDED_NUM_ATOMS}, force{k}.z);"
            );
        }
        out.push_str("        }\n    }\n");
    }
}
