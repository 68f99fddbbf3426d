//! Atom-index packing.
//!
//! A term's tuples are consumed left to right in windows of at most four atom
//! slots. Each window becomes one index buffer laid out row-major by tuple and
//! then by slot, so a single `vec4<u32>` (or `u32`) load fetches every index a
//! thread needs from that window.
//!
//! ```text
//! arity 1 → [1]
//! arity 2 → [2→4]
//! arity 3 → [3→4]
//! arity 5 → [4][1]
//! arity 7 → [4][3→4]
//! ```
//!
//! Windows of two or three atoms are stored four wide. The padding lanes repeat
//! the window's last atom so the extra read always lands on a valid index.

use crate::error::{CodegenError, Result};

/// Largest number of atom slots a single index buffer covers.
pub const MAX_WINDOW_ATOMS: usize = 4;

/// Storage width of one packed index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexWidth {
    /// One index per tuple, loaded as `u32`.
    Scalar,
    /// Four indices per tuple, loaded as `vec4<u32>`.
    Vec4,
}

impl IndexWidth {
    /// Number of `u32` lanes per tuple.
    pub const fn lanes(self) -> usize {
        match self {
            IndexWidth::Scalar => 1,
            IndexWidth::Vec4 => 4,
        }
    }

    /// WGSL element type of the buffer.
    pub const fn wgsl_type(self) -> &'static str {
        match self {
            IndexWidth::Scalar => "u32",
            IndexWidth::Vec4 => "vec4<u32>",
        }
    }

    /// Component accessor for lane `lane` of a loaded element.
    pub(crate) const fn component(self, lane: usize) -> &'static str {
        match self {
            IndexWidth::Scalar => "",
            IndexWidth::Vec4 => match lane {
                0 => ".x",
                1 => ".y",
                2 => ".z",
                _ => ".w",
            },
        }
    }
}

/// A run of consecutive atom slots packed into one index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// Zero-based slot of the first atom covered.
    pub first_atom: usize,
    /// Number of atom slots covered (1..=4).
    pub atoms: usize,
    /// Storage width of the buffer.
    pub width: IndexWidth,
}

impl Window {
    /// Lanes that re-read the window's last atom.
    pub fn padding(&self) -> usize {
        self.width.lanes() - self.atoms
    }

    /// Atom slots covered by this window.
    pub fn slots(&self) -> std::ops::Range<usize> {
        self.first_atom..self.first_atom + self.atoms
    }
}

/// Split `arity` atom slots into index-buffer windows.
///
/// Produces `ceil(arity / 4)` windows. Only the final window can be narrower
/// than four atoms; a single remaining atom is stored one wide, anything else
/// four wide.
pub fn plan_windows(arity: usize) -> Vec<Window> {
    let mut windows = Vec::with_capacity(arity.div_ceil(MAX_WINDOW_ATOMS));
    let mut first_atom = 0;
    while first_atom < arity {
        let atoms = (arity - first_atom).min(MAX_WINDOW_ATOMS);
        let width = if atoms == 1 {
            IndexWidth::Scalar
        } else {
            IndexWidth::Vec4
        };
        windows.push(Window {
            first_atom,
            atoms,
            width,
        });
        first_atom += atoms;
    }
    windows
}

/// Host-side contents of one index buffer, ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedIndices {
    pub window: Window,
    pub data: Vec<u32>,
}

impl PackedIndices {
    /// Number of tuples stored in the buffer.
    pub fn tuple_count(&self) -> usize {
        self.data.len() / self.window.width.lanes()
    }

    /// Indices stored for `tuple`, padding lanes included.
    pub fn row(&self, tuple: usize) -> &[u32] {
        let lanes = self.window.width.lanes();
        &self.data[tuple * lanes..(tuple + 1) * lanes]
    }
}

/// Check that every tuple has the same, non-zero arity and return it.
pub fn term_arity(tuples: &[Vec<u32>]) -> Result<usize> {
    let first = tuples.first().ok_or(CodegenError::EmptyTerm)?;
    let arity = first.len();
    if arity == 0 {
        return Err(CodegenError::ZeroArity);
    }
    if u32::try_from(tuples.len()).is_err() {
        return Err(CodegenError::TooManyTuples {
            count: tuples.len(),
        });
    }
    if let Some((tuple, found)) = tuples
        .iter()
        .map(Vec::len)
        .enumerate()
        .find(|&(_, len)| len != arity)
    {
        return Err(CodegenError::RaggedTuple {
            tuple,
            expected: arity,
            found,
        });
    }
    Ok(arity)
}

/// Pack a term's tuples into one buffer per window.
pub fn pack_term(tuples: &[Vec<u32>]) -> Result<Vec<PackedIndices>> {
    let arity = term_arity(tuples)?;
    Ok(plan_windows(arity)
        .into_iter()
        .map(|window| pack_window(tuples, window))
        .collect())
}

fn pack_window(tuples: &[Vec<u32>], window: Window) -> PackedIndices {
    let mut data = Vec::with_capacity(window.width.lanes() * tuples.len());
    for tuple in tuples {
        let slots = &tuple[window.slots()];
        data.extend_from_slice(slots);
        if let Some(&last) = slots.last() {
            data.extend(std::iter::repeat_n(last, window.padding()));
        }
    }
    PackedIndices { window, data }
}
