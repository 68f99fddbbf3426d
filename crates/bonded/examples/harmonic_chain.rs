//! Relax a bent chain of atoms held together by harmonic bonds and angles.
//!
//! Run with `RUST_LOG=bonded=debug` to see the generated kernel summary.

use std::sync::Arc;

use bonded::terms::{HarmonicAngle, HarmonicBond, add_harmonic_angles, add_harmonic_bonds};
use bonded::{BondedConfig, BondedForces, GpuContext, SharedAccumulators};
use tracing_subscriber::EnvFilter;

const NUM_ATOMS: usize = 16;
const STEPS: usize = 200;
const DT: f32 = 0.002;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let ctx = Arc::new(GpuContext::new()?);
    println!("adapter: {}", ctx.adapter_name());

    let config = BondedConfig::default();
    let accumulators = SharedAccumulators::allocate(&ctx, NUM_ATOMS, 4096)?;
    let mut forces = BondedForces::new(Arc::clone(&ctx), accumulators, config)?;

    let bonds: Vec<HarmonicBond> = (0..NUM_ATOMS as u32 - 1)
        .map(|i| HarmonicBond {
            atoms: [i, i + 1],
            length: 1.0,
            k: 200.0,
        })
        .collect();
    let angles: Vec<HarmonicAngle> = (0..NUM_ATOMS as u32 - 2)
        .map(|i| HarmonicAngle {
            atoms: [i, i + 1, i + 2],
            angle: std::f32::consts::PI,
            k: 20.0,
        })
        .collect();
    add_harmonic_bonds(&mut forces, &bonds, 0)?;
    add_harmonic_angles(&mut forces, &angles, 1)?;
    forces.initialize()?;

    if let Some(summary) = forces.summary() {
        println!(
            "kernel: {} terms, {} index buffers, {} parameters",
            summary.num_terms, summary.num_index_buffers, summary.param_count
        );
    }

    // Zig-zag start, slightly stretched
    let mut positions: Vec<[f32; 4]> = (0..NUM_ATOMS)
        .map(|i| [i as f32 * 1.1, if i % 2 == 0 { 0.0 } else { 0.4 }, 0.0, 0.0])
        .collect();

    let acc = forces.accumulators().clone();
    for step in 0..STEPS {
        acc.upload_positions(&ctx, &positions);
        acc.clear(&ctx);
        forces.dispatch(0b11)?;

        let f = acc.read_forces(&ctx)?;
        // Steepest descent
        for (p, f) in positions.iter_mut().zip(&f) {
            for axis in 0..3 {
                p[axis] += DT * f[axis] as f32;
            }
        }
        if step % 50 == 0 {
            println!("step {step:4}: energy = {:.6}", acc.read_energy(&ctx)?);
        }
    }

    // Energy with bonds only
    acc.upload_positions(&ctx, &positions);
    acc.clear(&ctx);
    forces.dispatch(0b01)?;
    println!("final bond energy = {:.6}", acc.read_energy(&ctx)?);

    Ok(())
}
