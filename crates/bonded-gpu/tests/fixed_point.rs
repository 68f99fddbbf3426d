//! Device tests for the fixed-point accumulation helpers.

use approx::assert_relative_eq;
use bonded_codegen::{KernelAssembler, pack_term};
use bonded_gpu::{ComputeBackend, GpuContext, KernelArg, padded_atom_count};

/// One single-atom term per tuple, each adding `value` to x and energy.
fn accumulate(
    ctx: &GpuContext,
    tuples: &[Vec<u32>],
    value: &str,
    num_atoms: usize,
) -> (Vec<[f64; 3]>, f64) {
    let padded = padded_atom_count(num_atoms);
    let workgroup_size = 64u32;
    let workgroups = 2u32;

    let packed = pack_term(tuples).unwrap();
    let windows: Vec<_> = packed.iter().map(|p| p.window).collect();

    let mut asm = KernelAssembler::new("accumulate").unwrap();
    asm.define("PADDED_NUM_ATOMS", format!("{padded}u")).unwrap();
    asm.define("NUM_ATOMS", format!("{num_atoms}u")).unwrap();
    asm.define("WORKGROUP_SIZE", format!("{workgroup_size}u")).unwrap();
    asm.add_term(
        0,
        tuples.len() as u32,
        &windows,
        format!("force1.x += {value};\nenergy += {value};"),
    )
    .unwrap();
    let program = asm.finish();

    let forces = ctx.create_force_accumulator(padded);
    let energy = ctx.create_energy_accumulator((workgroups * workgroup_size) as usize);
    let positions = ctx.create_positions(num_atoms);
    ctx.upload_positions(&positions, &vec![[0.0; 4]; num_atoms]);
    let indices = ctx
        .upload_immutable("indices", bytemuck::cast_slice(&packed[0].data))
        .unwrap();

    let module = ctx
        .create_module("accumulate", &program.render(), &program.defines)
        .unwrap();
    let kernel = ctx
        .get_kernel(&module, "accumulate", &program.param_kinds())
        .unwrap();
    let bindings = ctx
        .bind(
            &kernel,
            &[
                KernelArg::Buffer(&forces),
                KernelArg::Buffer(&energy),
                KernelArg::Buffer(&positions),
                KernelArg::GroupMask,
                KernelArg::Buffer(&indices),
            ],
        )
        .unwrap();
    ctx.launch(&kernel, &bindings, 1, workgroups).unwrap();

    (
        ctx.read_forces(&forces, num_atoms, padded).unwrap(),
        ctx.read_energy(&energy).unwrap(),
    )
}

#[test]
#[ignore = "requires GPU"]
fn test_negative_contributions_carry_into_high_word() {
    let ctx = GpuContext::new().unwrap();
    // 300 contributions to atom 0 across 128 threads
    let tuples = vec![vec![0u32]; 300];
    let (forces, energy) = accumulate(&ctx, &tuples, "-0.25", 2);

    assert_relative_eq!(forces[0][0], -75.0);
    assert_eq!(forces[0][1], 0.0);
    assert_eq!(forces[1], [0.0, 0.0, 0.0]);
    assert_relative_eq!(energy, -75.0);
}

#[test]
#[ignore = "requires GPU"]
fn test_mixed_sign_contributions_cancel_exactly() {
    let ctx = GpuContext::new().unwrap();
    let tuples: Vec<Vec<u32>> = (0..256).map(|i| vec![i % 4]).collect();
    let value = "select(-0.375, 0.375, (index & 4u) == 0u)";
    let (forces, energy) = accumulate(&ctx, &tuples, value, 4);

    for f in &forces {
        assert_eq!(*f, [0.0, 0.0, 0.0]);
    }
    assert_eq!(energy, 0.0);
}
