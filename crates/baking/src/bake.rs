//! Texture baking and material permutation sweeps
//!
//! The baker rasterizes every UV triangle of the mesh into a raster, invoking
//! a [`SurfaceShader`] at each covered texel. Sampling is stochastic but fully
//! deterministic: jitter offsets come from an integer hash of the texel and
//! sample index, so identical inputs always produce identical pixels.
//!
//! [`permute_and_bake`] drives the full sweep: it enumerates the Cartesian
//! product of every slot's candidate materials, binds each combination to a
//! [`ShadingStack`], bakes it, and writes `bake_{index}.png` per combination.

use std::path::{Path, PathBuf};

use glam::{Vec2, Vec3};
use retex_config::BakeConfig;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::material::SlotGroup;
use crate::mesh::Mesh;
use crate::raster::Raster;
use crate::shading::{ShadingStack, SurfacePoint, SurfaceShader};

/// Resolved bake parameters
#[derive(Debug, Clone, Copy)]
pub struct BakeSettings {
    /// Output raster edge length in pixels
    pub resolution: u32,
    /// Stochastic samples per texel; 1 samples the texel center exactly
    pub samples: u32,
    /// Run the post-bake smoothing pass over covered texels
    pub denoise: bool,
}

impl From<&BakeConfig> for BakeSettings {
    fn from(config: &BakeConfig) -> Self {
        Self {
            resolution: config.resolution,
            samples: config.samples.max(1),
            denoise: config.denoise,
        }
    }
}

/// Record of one completed permutation bake
#[derive(Debug, Clone, Serialize)]
pub struct BakedPermutation {
    pub index: usize,
    /// Output stem, `bake_{index}`
    pub name: String,
    /// Slot name -> chosen material name; `None` when the slot had no
    /// candidates and was left unchanged
    pub assignments: Vec<(String, Option<String>)>,
    pub path: PathBuf,
}

// Integer hash (Wang-style) used to derive deterministic jitter
#[inline]
fn hash_u32(mut x: u32) -> u32 {
    x = (x ^ 61) ^ (x >> 16);
    x = x.wrapping_mul(9);
    x ^= x >> 4;
    x = x.wrapping_mul(0x27d4_eb2d);
    x ^ (x >> 15)
}

/// Jitter offset in [0, 1)^2 for a texel's n-th sample
#[inline]
fn sample_jitter(x: u32, y: u32, sample: u32) -> Vec2 {
    let seed = hash_u32(x.wrapping_mul(73856093) ^ y.wrapping_mul(19349663) ^ sample);
    let a = (seed & 0xffff) as f32 / 65536.0;
    let b = (seed >> 16) as f32 / 65536.0;
    Vec2::new(a, b)
}

// Tangent frame from UV-space derivatives, falling back to an arbitrary
// orthonormal basis when the parameterization is degenerate
fn tangent_frame(
    p0: Vec3,
    p1: Vec3,
    p2: Vec3,
    uv0: Vec2,
    uv1: Vec2,
    uv2: Vec2,
    normal: Vec3,
) -> (Vec3, Vec3) {
    let e1 = p1 - p0;
    let e2 = p2 - p0;
    let d1 = uv1 - uv0;
    let d2 = uv2 - uv0;
    let det = d1.x * d2.y - d1.y * d2.x;
    if det.abs() < 1e-12 {
        let (t, b) = normal.any_orthonormal_pair();
        return (t, b);
    }
    let r = 1.0 / det;
    let tangent = ((e1 * d2.y - e2 * d1.y) * r).normalize_or(Vec3::X);
    let bitangent = ((e2 * d1.x - e1 * d2.x) * r).normalize_or(Vec3::Y);
    (tangent, bitangent)
}

/// Rasterize the mesh's bake UV set into a square raster, shading every
/// covered texel with `shader`.
///
/// Texels covered by no triangle stay transparent black. A texel whose
/// samples straddle a triangle edge averages the hits it got, so coverage
/// is anti-aliased at sample counts above one.
pub fn bake(
    mesh: &Mesh,
    shader: &dyn SurfaceShader,
    settings: &BakeSettings,
) -> Result<Raster, PipelineError> {
    if mesh.primary_uvs().is_none() {
        return Err(PipelineError::Bake {
            permutation: 0,
            reason: "mesh has no UV unwrap".to_string(),
        });
    }

    let size = settings.resolution.max(1);
    let samples = settings.samples.max(1);
    let pixel_count = (size as usize) * (size as usize);
    let mut sums = vec![[0.0f32; 4]; pixel_count];
    let mut counts = vec![0u32; pixel_count];

    for face in 0..mesh.face_count() {
        let Some((uv0, uv1, uv2)) = mesh.face_uvs(face) else {
            continue;
        };
        let (p0, p1, p2) = mesh.face_positions(face);
        let (n0, n1, n2) = if mesh.normals.len() == mesh.vertex_count() {
            mesh.face_normals(face)
        } else {
            let n = (p1 - p0).cross(p2 - p0).normalize_or(Vec3::Z);
            (n, n, n)
        };
        let slot = mesh.face_slots.get(face).copied().flatten();

        // UV-space edge function denominator; degenerate triangles raster
        // nothing
        let denom = (uv1 - uv0).perp_dot(uv2 - uv0);
        if denom.abs() < 1e-12 {
            continue;
        }
        let inv_denom = 1.0 / denom;

        // Pixel-space bounding box of the triangle; UV v=1 is pixel row 0
        let to_px = |uv: Vec2| -> Vec2 {
            Vec2::new(uv.x * size as f32, (1.0 - uv.y) * size as f32)
        };
        let (a, b, c) = (to_px(uv0), to_px(uv1), to_px(uv2));
        let min_x = a.x.min(b.x).min(c.x).floor().max(0.0) as u32;
        let max_x = (a.x.max(b.x).max(c.x).ceil() as u32).min(size);
        let min_y = a.y.min(b.y).min(c.y).floor().max(0.0) as u32;
        let max_y = (a.y.max(b.y).max(c.y).ceil() as u32).min(size);

        for y in min_y..max_y {
            for x in min_x..max_x {
                for s in 0..samples {
                    let offset = if samples == 1 {
                        Vec2::splat(0.5)
                    } else {
                        sample_jitter(x, y, s)
                    };
                    let uv = Vec2::new(
                        (x as f32 + offset.x) / size as f32,
                        1.0 - (y as f32 + offset.y) / size as f32,
                    );
                    // Barycentric coordinates in UV space
                    let w1 = (uv - uv0).perp_dot(uv2 - uv0) * inv_denom;
                    let w2 = (uv0 - uv).perp_dot(uv1 - uv0) * inv_denom;
                    let w0 = 1.0 - w1 - w2;
                    if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                        continue;
                    }

                    let position = p0 * w0 + p1 * w1 + p2 * w2;
                    let normal = (n0 * w0 + n1 * w1 + n2 * w2).normalize_or(Vec3::Z);
                    let (tangent, bitangent) =
                        tangent_frame(p0, p1, p2, uv0, uv1, uv2, normal);
                    let point = SurfacePoint {
                        position,
                        normal,
                        tangent,
                        bitangent,
                        uv,
                        slot,
                    };
                    let color = shader.shade(&point);
                    let idx = (y as usize) * (size as usize) + (x as usize);
                    for i in 0..4 {
                        sums[idx][i] += color[i];
                    }
                    counts[idx] += 1;
                }
            }
        }
    }

    let mut raster = Raster::new(size, size);
    for (idx, pixel) in raster.pixels_mut().iter_mut().enumerate() {
        if counts[idx] > 0 {
            let inv = 1.0 / counts[idx] as f32;
            *pixel = sums[idx].map(|c| c * inv);
        }
    }

    if settings.denoise {
        denoise_covered(&mut raster, &counts);
    }

    debug!(
        resolution = size,
        samples,
        covered = counts.iter().filter(|&&c| c > 0).count(),
        "baked raster"
    );
    Ok(raster)
}

// 3x3 box smoothing restricted to covered texels. Uncovered neighbors are
// excluded from the average so island edges do not bleed toward black.
fn denoise_covered(raster: &mut Raster, counts: &[u32]) {
    let (w, h) = (raster.width as i64, raster.height as i64);
    let source = raster.pixels().to_vec();
    let covered = |x: i64, y: i64| -> bool {
        x >= 0 && y >= 0 && x < w && y < h && counts[(y * w + x) as usize] > 0
    };

    for y in 0..h {
        for x in 0..w {
            if !covered(x, y) {
                continue;
            }
            let mut sum = [0.0f32; 4];
            let mut n = 0u32;
            for dy in -1..=1 {
                for dx in -1..=1 {
                    if covered(x + dx, y + dy) {
                        let p = source[((y + dy) * w + x + dx) as usize];
                        for i in 0..4 {
                            sum[i] += p[i];
                        }
                        n += 1;
                    }
                }
            }
            let inv = 1.0 / n as f32;
            raster.set_pixel(x as u32, y as u32, sum.map(|c| c * inv));
        }
    }
}

/// Enumerate every material combination and bake each to a PNG in
/// `output_dir`.
///
/// The product follows slot order with the last slot varying fastest; a slot
/// with no candidates contributes a single leave-unchanged option. Outputs
/// are named `bake_0.png`, `bake_1.png`, ... in enumeration order, so the
/// index in an error maps directly back to a combination; a `manifest.json`
/// records every combination's slot assignments.
///
/// Fails before the sweep when the group is empty or the mesh carries no
/// material slots: every binding would skip and the sweep would only emit
/// identical default-gray rasters.
pub fn permute_and_bake(
    mesh: &mut Mesh,
    group: &SlotGroup,
    config: &BakeConfig,
    output_dir: impl AsRef<Path>,
) -> Result<Vec<BakedPermutation>, PipelineError> {
    if group.is_empty() {
        return Err(PipelineError::Bake {
            permutation: 0,
            reason: "no material slots to permute".to_string(),
        });
    }
    if mesh.slots.is_empty() {
        return Err(PipelineError::Bake {
            permutation: 0,
            reason: "mesh has no material slots".to_string(),
        });
    }

    mesh.ensure_uv_unwrap();
    if mesh.normals.len() != mesh.vertex_count() {
        mesh.compute_normals();
    }

    let output_dir = output_dir.as_ref();
    std::fs::create_dir_all(output_dir).map_err(|source| PipelineError::Io {
        path: output_dir.to_path_buf(),
        source,
    })?;

    let settings = BakeSettings::from(config);
    let slots = group.slots();
    let counts: Vec<usize> = slots.iter().map(|(_, m)| m.len().max(1)).collect();
    let total = group.combination_count();
    info!(total, slots = slots.len(), "starting permutation sweep");

    let mut results = Vec::with_capacity(total);
    for index in 0..total {
        // Mixed-radix decode, last slot fastest
        let mut rem = index;
        let mut picks = vec![0usize; slots.len()];
        for i in (0..slots.len()).rev() {
            picks[i] = rem % counts[i];
            rem /= counts[i];
        }

        let mut stack = ShadingStack::new(mesh);
        let mut assignments = Vec::with_capacity(slots.len());
        for (i, (slot, materials)) in slots.iter().enumerate() {
            match materials.get(picks[i]) {
                Some(material) => {
                    stack.bind(slot, material);
                    assignments.push((slot.clone(), Some(material.name.clone())));
                }
                None => assignments.push((slot.clone(), None)),
            }
        }

        let raster = bake(mesh, &stack, &settings).map_err(|err| match err {
            PipelineError::Bake { reason, .. } => PipelineError::Bake {
                permutation: index,
                reason,
            },
            other => other,
        })?;

        let name = format!("bake_{index}");
        let path = output_dir.join(format!("{name}.png"));
        raster.save_png(&path)?;
        info!(index, path = %path.display(), "baked permutation");
        results.push(BakedPermutation {
            index,
            name,
            assignments,
            path,
        });
    }

    let manifest_path = output_dir.join("manifest.json");
    let manifest = serde_json::to_string_pretty(&results).map_err(|source| PipelineError::Io {
        path: manifest_path.clone(),
        source: std::io::Error::other(source),
    })?;
    std::fs::write(&manifest_path, manifest).map_err(|source| PipelineError::Io {
        path: manifest_path,
        source,
    })?;

    Ok(results)
}
