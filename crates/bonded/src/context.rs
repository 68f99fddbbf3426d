//! Accumulation buffers shared with the other force modules of a simulation.

use std::sync::Arc;

use bonded_gpu::{
    ComputeBackend, GpuContext, energy_accumulator_bytes, force_accumulator_bytes,
    padded_atom_count, wgpu,
};

use crate::error::{BondedError, Result};

/// Force, energy and position buffers owned by the simulation context.
///
/// The bonded module only reads positions and atomically adds into the
/// accumulators; the non-bonded module holds clones of the same handles.
pub struct SharedAccumulators<B: ComputeBackend> {
    /// Three fixed-point lanes of `padded_num_atoms` slots.
    pub forces: Arc<B::Buffer>,
    /// `energy_slots` fixed-point slots, one per thread.
    pub energy: Arc<B::Buffer>,
    /// One `vec4<f32>` per atom.
    pub positions: Arc<B::Buffer>,
    pub num_atoms: usize,
    pub padded_num_atoms: usize,
    pub energy_slots: usize,
}

impl<B: ComputeBackend> Clone for SharedAccumulators<B> {
    fn clone(&self) -> Self {
        Self {
            forces: Arc::clone(&self.forces),
            energy: Arc::clone(&self.energy),
            positions: Arc::clone(&self.positions),
            num_atoms: self.num_atoms,
            padded_num_atoms: self.padded_num_atoms,
            energy_slots: self.energy_slots,
        }
    }
}

impl<B: ComputeBackend> SharedAccumulators<B> {
    /// Wrap buffers the host has already allocated.
    pub fn new(
        forces: Arc<B::Buffer>,
        energy: Arc<B::Buffer>,
        positions: Arc<B::Buffer>,
        num_atoms: usize,
        energy_slots: usize,
    ) -> Result<Self> {
        if num_atoms == 0 {
            return Err(BondedError::InvalidConfig(
                "a simulation needs at least one atom".to_string(),
            ));
        }
        if energy_slots == 0 {
            return Err(BondedError::InvalidConfig(
                "energy accumulator needs at least one slot".to_string(),
            ));
        }
        Ok(Self {
            forces,
            energy,
            positions,
            num_atoms,
            padded_num_atoms: padded_atom_count(num_atoms),
            energy_slots,
        })
    }
}

/// Check that accumulators of `force_bytes` and `energy_bytes` hold every
/// slot a kernel for `num_atoms` atoms and `energy_slots` threads writes.
pub fn check_capacity(
    force_bytes: u64,
    energy_bytes: u64,
    num_atoms: usize,
    energy_slots: usize,
) -> Result<()> {
    let needed = force_accumulator_bytes(padded_atom_count(num_atoms));
    if force_bytes < needed {
        return Err(BondedError::InvalidConfig(format!(
            "force accumulator is {force_bytes} bytes, {num_atoms} atoms need {needed}"
        )));
    }
    let needed = energy_accumulator_bytes(energy_slots);
    if energy_bytes < needed {
        return Err(BondedError::InvalidConfig(format!(
            "energy accumulator is {energy_bytes} bytes, {energy_slots} slots need {needed}"
        )));
    }
    Ok(())
}

impl SharedAccumulators<GpuContext> {
    /// Allocate fresh, zeroed buffers on `ctx`.
    pub fn allocate(ctx: &GpuContext, num_atoms: usize, energy_slots: usize) -> Result<Self> {
        let padded = padded_atom_count(num_atoms);
        Self::from_buffers(
            Arc::new(ctx.create_force_accumulator(padded)),
            Arc::new(ctx.create_energy_accumulator(energy_slots)),
            Arc::new(ctx.create_positions(num_atoms)),
            num_atoms,
            energy_slots,
        )
    }

    /// Wrap device buffers allocated elsewhere, rejecting undersized ones.
    pub fn from_buffers(
        forces: Arc<wgpu::Buffer>,
        energy: Arc<wgpu::Buffer>,
        positions: Arc<wgpu::Buffer>,
        num_atoms: usize,
        energy_slots: usize,
    ) -> Result<Self> {
        check_capacity(forces.size(), energy.size(), num_atoms, energy_slots)?;
        Self::new(forces, energy, positions, num_atoms, energy_slots)
    }

    /// Zero both accumulators before the next step.
    pub fn clear(&self, ctx: &GpuContext) {
        ctx.clear_buffer(&self.forces);
        ctx.clear_buffer(&self.energy);
    }

    pub fn upload_positions(&self, ctx: &GpuContext, positions: &[[f32; 4]]) {
        ctx.upload_positions(&self.positions, positions);
    }

    /// Per-atom forces, decoded from fixed point.
    pub fn read_forces(&self, ctx: &GpuContext) -> Result<Vec<[f64; 3]>> {
        Ok(ctx.read_forces(&self.forces, self.num_atoms, self.padded_num_atoms)?)
    }

    /// Total energy over every thread's slot.
    pub fn read_energy(&self, ctx: &GpuContext) -> Result<f64> {
        Ok(ctx.read_energy(&self.energy)?)
    }

    /// Raw accumulator words, for bitwise comparisons.
    pub fn read_raw(&self, ctx: &GpuContext) -> Result<(Vec<u32>, Vec<u32>)> {
        let forces = ctx.read_words_blocking(&self.forces)?;
        let energy = ctx.read_words_blocking(&self.energy)?;
        Ok((forces, energy))
    }
}
