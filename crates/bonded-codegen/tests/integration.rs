//! Integration tests for bonded-codegen.

use bonded_codegen::{
    FIXED_PARAM_COUNT, IndexWidth, KernelAssembler, ParamKind, Window, pack_term,
};

fn windows_of(tuples: &[Vec<u32>]) -> Vec<Window> {
    pack_term(tuples)
        .unwrap()
        .into_iter()
        .map(|p| p.window)
        .collect()
}

#[test]
fn test_mixed_arity_kernel() {
    let bonds = vec![vec![0, 1], vec![1, 2], vec![2, 3]];
    let angles = vec![vec![0, 1, 2], vec![1, 2, 3]];
    let cmap = vec![vec![0, 1, 2, 3, 4]];

    let mut asm = KernelAssembler::new("compute_bonded_forces").unwrap();
    asm.add_term(0, 3, &windows_of(&bonds), "energy += 1.0;")
        .unwrap();
    asm.add_term(1, 2, &windows_of(&angles), "energy += 2.0;")
        .unwrap();
    asm.add_term(5, 1, &windows_of(&cmap), "energy += 3.0;")
        .unwrap();
    let arg = asm.external("f32").unwrap();
    let program = asm.finish();

    // 1 + 1 + 2 index buffers, one external argument
    assert_eq!(program.param_count(), FIXED_PARAM_COUNT + 4 + 1);
    assert_eq!(arg, "customArg1");

    let src = program.render();
    assert!(src.contains("@compute @workgroup_size(WORKGROUP_SIZE)"));
    assert!(src.contains("fn compute_bonded_forces("));
    assert!(src.contains("var<storage, read_write> force_buffer: array<atomic<u32>>"));
    assert!(src.contains("var<storage, read> posq: array<vec4<f32>>"));
    assert!(src.contains("@binding(7) var<storage, read> atom_indices2_1: array<u32>"));
    assert!(src.contains("@binding(8) var<storage, read> customArg1: array<f32>"));
    assert!(src.contains("if ((groups.mask & 32u) != 0u)"));

    // Terms appear in registration order
    let t0 = src.find("// term 0").unwrap();
    let t1 = src.find("// term 1").unwrap();
    let t2 = src.find("// term 2").unwrap();
    assert!(t0 < t1 && t1 < t2);
}

#[test]
fn test_param_kinds_follow_windows() {
    let tuples = vec![vec![0, 1, 2, 3, 4, 5, 6]];
    let mut asm = KernelAssembler::new("k").unwrap();
    asm.add_term(0, 1, &windows_of(&tuples), "").unwrap();
    let program = asm.finish();

    let kinds = program.param_kinds();
    assert_eq!(kinds[0], ParamKind::ForceAccumulator);
    assert_eq!(kinds[1], ParamKind::EnergyAccumulator);
    assert_eq!(kinds[2], ParamKind::Positions);
    assert_eq!(kinds[3], ParamKind::GroupMask);
    assert_eq!(kinds[4], ParamKind::AtomIndices(IndexWidth::Vec4));
    assert_eq!(kinds[5], ParamKind::AtomIndices(IndexWidth::Vec4));
    assert_eq!(kinds.len(), 6);
}

#[test]
fn test_every_atom_flushes_three_lanes() {
    for arity in 1..=8usize {
        let tuple: Vec<u32> = (0..arity as u32).collect();
        let mut asm = KernelAssembler::new("k").unwrap();
        asm.add_term(0, 1, &windows_of(&[tuple]), "").unwrap();
        let src = asm.finish().render();

        for k in 1..=arity {
            assert_eq!(src.matches(&format!("let atom{k} = ")).count(), 1, "arity {arity}");
            assert!(src.contains(&format!("add_force_fixed(atom{k}, force{k}.x);")));
            assert!(src.contains(&format!(
                "add_force_fixed(atom{k} + PADDED_NUM_ATOMS, force{k}.y);"
            )));
            assert!(src.contains(&format!(
                "add_force_fixed(atom{k} + 2u * PADDED_NUM_ATOMS, force{k}.z);"
            )));
        }
        assert!(!src.contains(&format!("let atom{} = ", arity + 1)));
    }
}

#[test]
fn test_invalid_inputs_rejected() {
    assert!(KernelAssembler::new("not valid").is_err());

    let mut asm = KernelAssembler::new("k").unwrap();
    assert!(asm.external("vec2<f32").is_err());
    assert!(asm.define("1X", "0").is_err());
    assert!(
        asm.add_term(32, 1, &windows_of(&[vec![0]]), "")
            .is_err()
    );
    assert_eq!(asm.num_terms(), 0);
}
