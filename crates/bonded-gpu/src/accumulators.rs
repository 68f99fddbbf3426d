//! Fixed-point accumulator layout and host-side readback.
//!
//! Both accumulators are arrays of 64-bit fixed-point slots with 32
//! fractional bits, each slot stored as a (low, high) pair of `u32` words.
//! The force accumulator holds three lanes of `padded_num_atoms` slots (x, y,
//! z); the energy accumulator holds one slot per launched thread.

use bonded_codegen::FIXED_POINT_FRACTION_BITS;

use crate::context::GpuContext;
use crate::error::Result;

/// Atom counts are padded to a multiple of this before lane striding.
pub const ATOM_PADDING: usize = 32;

/// Bytes per fixed-point slot.
pub const SLOT_BYTES: u64 = 8;

const FIXED_SCALE: f64 = (1u64 << FIXED_POINT_FRACTION_BITS) as f64;

/// Round `num_atoms` up to the lane stride used by the force accumulator.
pub fn padded_atom_count(num_atoms: usize) -> usize {
    num_atoms.div_ceil(ATOM_PADDING) * ATOM_PADDING
}

/// Bytes a force accumulator needs for `padded_num_atoms` atoms.
pub fn force_accumulator_bytes(padded_num_atoms: usize) -> u64 {
    3 * padded_num_atoms as u64 * SLOT_BYTES
}

/// Bytes an energy accumulator needs for `slots` threads.
pub fn energy_accumulator_bytes(slots: usize) -> u64 {
    slots as u64 * SLOT_BYTES
}

/// Decode one slot to a float.
pub fn fixed_to_f64(lo: u32, hi: u32) -> f64 {
    slot_value(lo, hi) as f64 / FIXED_SCALE
}

/// Encode a float as a (low, high) slot, truncating toward negative infinity.
pub fn f64_to_fixed(value: f64) -> [u32; 2] {
    let raw = (value * FIXED_SCALE).floor() as i64 as u64;
    [raw as u32, (raw >> 32) as u32]
}

fn slot_value(lo: u32, hi: u32) -> i64 {
    (((hi as u64) << 32) | lo as u64) as i64
}

/// Decode per-atom forces from a force accumulator's words.
///
/// Only the first `num_atoms` atoms are returned; padding atoms are dropped.
pub fn decode_forces(words: &[u32], num_atoms: usize, padded_num_atoms: usize) -> Vec<[f64; 3]> {
    let slot = |s: usize| fixed_to_f64(words[2 * s], words[2 * s + 1]);
    (0..num_atoms)
        .map(|atom| {
            [
                slot(atom),
                slot(atom + padded_num_atoms),
                slot(atom + 2 * padded_num_atoms),
            ]
        })
        .collect()
}

/// Sum every energy slot.
///
/// Slots are summed as integers first so the total does not depend on how
/// many threads contributed.
pub fn decode_energy(words: &[u32]) -> f64 {
    let total = words
        .chunks_exact(2)
        .fold(0i64, |acc, pair| acc.wrapping_add(slot_value(pair[0], pair[1])));
    total as f64 / FIXED_SCALE
}

impl GpuContext {
    /// Force accumulator for `padded_num_atoms` atoms, three lanes.
    pub fn create_force_accumulator(&self, padded_num_atoms: usize) -> wgpu::Buffer {
        self.create_storage_buffer(
            "force_accumulator",
            force_accumulator_bytes(padded_num_atoms),
            true,
        )
    }

    /// Energy accumulator with one slot per thread.
    pub fn create_energy_accumulator(&self, slots: usize) -> wgpu::Buffer {
        self.create_storage_buffer("energy_accumulator", energy_accumulator_bytes(slots), true)
    }

    /// Position buffer of `vec4<f32>` per atom.
    pub fn create_positions(&self, num_atoms: usize) -> wgpu::Buffer {
        self.create_storage_buffer(
            "positions",
            (num_atoms * std::mem::size_of::<[f32; 4]>()) as u64,
            false,
        )
    }

    pub fn upload_positions(&self, buffer: &wgpu::Buffer, positions: &[[f32; 4]]) {
        self.upload_buffer(buffer, positions);
    }

    /// Read back forces for the first `num_atoms` atoms.
    pub fn read_forces(
        &self,
        buffer: &wgpu::Buffer,
        num_atoms: usize,
        padded_num_atoms: usize,
    ) -> Result<Vec<[f64; 3]>> {
        let words = self.read_words_blocking(buffer)?;
        Ok(decode_forces(&words, num_atoms, padded_num_atoms))
    }

    /// Read back the total energy.
    pub fn read_energy(&self, buffer: &wgpu::Buffer) -> Result<f64> {
        let words = self.read_words_blocking(buffer)?;
        Ok(decode_energy(&words))
    }
}
