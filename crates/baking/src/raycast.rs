//! Ray-mesh visibility queries for projective texturing
//!
//! Moller-Trumbore intersection against the consolidated mesh, used by the
//! projective accumulator's optional occlusion rejection to keep a photograph
//! from smearing through geometry onto surfaces the camera cannot see.

use glam::Vec3;

use crate::mesh::Mesh;

const EPSILON: f32 = 1e-6;

/// Result of a ray-triangle intersection test
#[derive(Debug, Clone, Copy)]
pub struct TriangleHit {
    /// Distance along the (normalized) ray direction
    pub t: f32,
    /// Barycentric weight of vertex 1
    pub u: f32,
    /// Barycentric weight of vertex 2
    pub v: f32,
}

/// Moller-Trumbore ray-triangle intersection.
///
/// `ray_dir` should be normalized so `t` is a distance. Hits behind the ray
/// origin are rejected.
pub fn ray_triangle(
    ray_origin: Vec3,
    ray_dir: Vec3,
    v0: Vec3,
    v1: Vec3,
    v2: Vec3,
) -> Option<TriangleHit> {
    let edge1 = v1 - v0;
    let edge2 = v2 - v0;

    let pvec = ray_dir.cross(edge2);
    let det = edge1.dot(pvec);
    // Near-zero determinant: ray parallel to the triangle plane
    if det.abs() < EPSILON {
        return None;
    }
    let inv_det = 1.0 / det;

    let tvec = ray_origin - v0;
    let u = tvec.dot(pvec) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let qvec = tvec.cross(edge1);
    let v = ray_dir.dot(qvec) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = edge2.dot(qvec) * inv_det;
    if t < EPSILON {
        return None;
    }

    Some(TriangleHit { t, u, v })
}

/// Whether any mesh face stands between `camera` and `point`.
///
/// The face the point itself lies on registers a hit at roughly the full
/// ray length, so hits are only counted strictly in front of the point.
pub fn occluded(mesh: &Mesh, camera: Vec3, point: Vec3) -> bool {
    let to_point = point - camera;
    let distance = to_point.length();
    if distance <= EPSILON {
        return false;
    }
    let dir = to_point / distance;
    let cutoff = distance * (1.0 - 1e-3);

    for face in 0..mesh.face_count() {
        let (v0, v1, v2) = mesh.face_positions(face);
        if let Some(hit) = ray_triangle(camera, dir, v0, v1, v2) {
            if hit.t < cutoff {
                return true;
            }
        }
    }
    false
}
