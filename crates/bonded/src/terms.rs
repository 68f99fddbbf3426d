//! Standard bonded terms built on [`BondedForces`].
//!
//! Each helper uploads its per-tuple parameters as one external argument and
//! registers a single term whose snippet indexes that argument by `index`.

use std::sync::Arc;

use bonded_gpu::ComputeBackend;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::forces::BondedForces;

/// `E = 0.5 * k * (r - length)^2` between two atoms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HarmonicBond {
    pub atoms: [u32; 2],
    /// Rest length.
    pub length: f32,
    /// Force constant.
    pub k: f32,
}

/// `E = 0.5 * k * (theta - angle)^2` for atoms 1-2-3, with 2 at the vertex.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HarmonicAngle {
    pub atoms: [u32; 3],
    /// Rest angle in radians.
    pub angle: f32,
    /// Force constant.
    pub k: f32,
}

pub fn harmonic_bond_expression(params: &str) -> String {
    format!(
        "let p = {params}[index];
let delta = pos2.xyz - pos1.xyz;
let r = length(delta);
let dr = r - p.x;
energy += 0.5 * p.y * dr * dr;
let f = (p.y * dr / max(r, 1e-6)) * delta;
force1 += f;
force2 -= f;"
    )
}

pub fn harmonic_angle_expression(params: &str) -> String {
    format!(
        "let p = {params}[index];
let v0 = pos2.xyz - pos1.xyz;
let v1 = pos2.xyz - pos3.xyz;
let cp = cross(v0, v1);
let rp = max(length(cp), 1e-6);
let r21 = dot(v0, v0);
let r23 = dot(v1, v1);
let cosine = clamp(dot(v0, v1) / sqrt(r21 * r23), -1.0, 1.0);
let delta_ideal = acos(cosine) - p.x;
energy += 0.5 * p.y * delta_ideal * delta_ideal;
let de_dangle = p.y * delta_ideal;
let c21 = cross(v0, cp) * (de_dangle / (r21 * rp));
let c23 = cross(v1, cp) * (-de_dangle / (r23 * rp));
force1 += c21;
force2 -= c21 + c23;
force3 += c23;"
    )
}

/// Register harmonic bonds in `group`. An empty slice registers nothing.
pub fn add_harmonic_bonds<B: ComputeBackend>(
    forces: &mut BondedForces<B>,
    bonds: &[HarmonicBond],
    group: u32,
) -> Result<()> {
    if bonds.is_empty() {
        return Ok(());
    }
    let params: Vec<[f32; 2]> = bonds.iter().map(|b| [b.length, b.k]).collect();
    let buffer = forces
        .backend()
        .upload_immutable("harmonic_bond_params", bytemuck::cast_slice(&params))?;
    let name = forces.add_argument(Arc::new(buffer), "vec2<f32>")?;
    let tuples = bonds.iter().map(|b| b.atoms.to_vec()).collect();
    forces.add_interaction(tuples, harmonic_bond_expression(&name), group)
}

/// Register harmonic angles in `group`. An empty slice registers nothing.
pub fn add_harmonic_angles<B: ComputeBackend>(
    forces: &mut BondedForces<B>,
    angles: &[HarmonicAngle],
    group: u32,
) -> Result<()> {
    if angles.is_empty() {
        return Ok(());
    }
    let params: Vec<[f32; 2]> = angles.iter().map(|a| [a.angle, a.k]).collect();
    let buffer = forces
        .backend()
        .upload_immutable("harmonic_angle_params", bytemuck::cast_slice(&params))?;
    let name = forces.add_argument(Arc::new(buffer), "vec2<f32>")?;
    let tuples = angles.iter().map(|a| a.atoms.to_vec()).collect();
    forces.add_interaction(tuples, harmonic_angle_expression(&name), group)
}

/// Host reference for one harmonic bond: `(energy, force on atom 1)`.
/// The force on atom 2 is the negation.
pub fn harmonic_bond_reference(
    p1: [f64; 3],
    p2: [f64; 3],
    length: f64,
    k: f64,
) -> (f64, [f64; 3]) {
    let delta = sub(p2, p1);
    let r = dot(delta, delta).sqrt();
    let dr = r - length;
    (0.5 * k * dr * dr, scale(delta, k * dr / r.max(1e-6)))
}

fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn scale(a: [f64; 3], s: f64) -> [f64; 3] {
    [a[0] * s, a[1] * s, a[2] * s]
}

/// Host reference for one harmonic angle: `(energy, forces on atoms 1, 2, 3)`.
pub fn harmonic_angle_reference(
    p1: [f64; 3],
    p2: [f64; 3],
    p3: [f64; 3],
    angle: f64,
    k: f64,
) -> (f64, [[f64; 3]; 3]) {
    let v0 = sub(p2, p1);
    let v1 = sub(p2, p3);
    let cp = cross(v0, v1);
    let rp = dot(cp, cp).sqrt().max(1e-6);
    let r21 = dot(v0, v0);
    let r23 = dot(v1, v1);
    let cosine = (dot(v0, v1) / (r21 * r23).sqrt()).clamp(-1.0, 1.0);
    let delta_ideal = cosine.acos() - angle;
    let de_dangle = k * delta_ideal;
    let c21 = scale(cross(v0, cp), de_dangle / (r21 * rp));
    let c23 = scale(cross(v1, cp), -de_dangle / (r23 * rp));
    let f2 = [-(c21[0] + c23[0]), -(c21[1] + c23[1]), -(c21[2] + c23[2])];
    (0.5 * k * delta_ideal * delta_ideal, [c21, f2, c23])
}
