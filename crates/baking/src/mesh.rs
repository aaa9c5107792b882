//! Consolidated mesh storage
//!
//! One pipeline run owns exactly one [`Mesh`]: an indexed triangle list with
//! per-vertex normals, one or more UV sets, and an ordered list of named
//! material slots. The consolidator builds it (join + weld), the compositor
//! binds shading to its slots, and both bake paths read it.

use std::collections::HashMap;

use glam::{Vec2, Vec3};
use tracing::debug;

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Maximum pairwise distance between box corners
    pub fn diagonal(&self) -> f32 {
        (self.max - self.min).length()
    }
}

/// Indexed triangle mesh with named material slots.
///
/// Invariants: every face indexes existing vertices; every `face_slots` entry
/// is either `None` or a valid index into `slots`; every UV set is parallel
/// to `positions`.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub positions: Vec<Vec3>,
    /// Per-vertex normals, parallel to `positions` (empty until computed)
    pub normals: Vec<Vec3>,
    /// UV coordinate sets; set 0 is the bake parameterization
    pub uv_sets: Vec<Vec<Vec2>>,
    pub faces: Vec<[u32; 3]>,
    /// Per-face material slot reference, parallel to `faces`
    pub face_slots: Vec<Option<u16>>,
    /// Ordered, named material slots
    pub slots: Vec<String>,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Bounding box of all vertices, or None for an empty mesh
    pub fn bounds(&self) -> Option<Aabb> {
        let mut iter = self.positions.iter();
        let first = *iter.next()?;
        let mut min = first;
        let mut max = first;
        for p in iter {
            min = min.min(*p);
            max = max.max(*p);
        }
        Some(Aabb { min, max })
    }

    /// The bake UV set, if any
    pub fn primary_uvs(&self) -> Option<&[Vec2]> {
        self.uv_sets.first().map(|set| set.as_slice())
    }

    pub fn slot_index(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|s| s == name)
    }

    /// Add a named slot, reusing an existing one with the same name
    pub fn add_slot(&mut self, name: impl Into<String>) -> u16 {
        let name = name.into();
        if let Some(idx) = self.slot_index(&name) {
            return idx as u16;
        }
        self.slots.push(name);
        (self.slots.len() - 1) as u16
    }

    /// Vertex positions of a face
    pub fn face_positions(&self, face: usize) -> (Vec3, Vec3, Vec3) {
        let [i0, i1, i2] = self.faces[face];
        (
            self.positions[i0 as usize],
            self.positions[i1 as usize],
            self.positions[i2 as usize],
        )
    }

    /// Vertex normals of a face (requires `compute_normals` to have run)
    pub fn face_normals(&self, face: usize) -> (Vec3, Vec3, Vec3) {
        let [i0, i1, i2] = self.faces[face];
        (
            self.normals[i0 as usize],
            self.normals[i1 as usize],
            self.normals[i2 as usize],
        )
    }

    /// Primary UVs of a face, or None when the mesh has no unwrap
    pub fn face_uvs(&self, face: usize) -> Option<(Vec2, Vec2, Vec2)> {
        let uvs = self.primary_uvs()?;
        let [i0, i1, i2] = self.faces[face];
        Some((uvs[i0 as usize], uvs[i1 as usize], uvs[i2 as usize]))
    }

    /// Recompute smooth per-vertex normals, area-weighted by face normals.
    pub fn compute_normals(&mut self) {
        let mut accum = vec![Vec3::ZERO; self.positions.len()];
        for face in &self.faces {
            let p0 = self.positions[face[0] as usize];
            let p1 = self.positions[face[1] as usize];
            let p2 = self.positions[face[2] as usize];
            // Cross product length is proportional to face area
            let n = (p1 - p0).cross(p2 - p0);
            for &i in face {
                accum[i as usize] += n;
            }
        }
        self.normals = accum
            .into_iter()
            .map(|n| {
                let len = n.length();
                if len > 0.0 { n / len } else { Vec3::Z }
            })
            .collect();
    }

    /// Join several meshes into one, offsetting face indices and deduplicating
    /// material slots by name. UV sets common to all inputs are preserved.
    pub fn join(meshes: Vec<Mesh>) -> Mesh {
        let uv_set_count = meshes.iter().map(|m| m.uv_sets.len()).min().unwrap_or(0);
        let mut merged = Mesh::new();
        merged.uv_sets = vec![Vec::new(); uv_set_count];

        for mesh in meshes {
            let vertex_offset = merged.positions.len() as u32;
            // Slot indices shift as names deduplicate across inputs
            let slot_remap: Vec<u16> = mesh
                .slots
                .iter()
                .map(|name| merged.add_slot(name.clone()))
                .collect();

            merged.positions.extend_from_slice(&mesh.positions);
            merged.normals.extend_from_slice(&mesh.normals);
            for (set, src) in merged.uv_sets.iter_mut().zip(&mesh.uv_sets) {
                set.extend_from_slice(src);
            }
            merged.faces.extend(
                mesh.faces
                    .iter()
                    .map(|f| [f[0] + vertex_offset, f[1] + vertex_offset, f[2] + vertex_offset]),
            );
            merged.face_slots.extend(
                mesh.face_slots
                    .iter()
                    .map(|slot| slot.map(|s| slot_remap[s as usize])),
            );
        }
        merged
    }

    /// Merge vertices whose positions lie within `tolerance` of each other,
    /// re-indexing faces and dropping faces that collapse to a line or point.
    ///
    /// The first vertex encountered wins and keeps its attributes, which makes
    /// the operation idempotent: a second pass with the same tolerance finds
    /// no surviving pair closer than the tolerance.
    ///
    /// Returns the number of vertices removed.
    pub fn weld(&mut self, tolerance: f32) -> usize {
        if tolerance <= 0.0 || self.positions.is_empty() {
            return 0;
        }

        let inv_cell = 1.0 / tolerance;
        let cell_of = |p: Vec3| -> (i64, i64, i64) {
            (
                (p.x * inv_cell).floor() as i64,
                (p.y * inv_cell).floor() as i64,
                (p.z * inv_cell).floor() as i64,
            )
        };

        let mut grid: HashMap<(i64, i64, i64), Vec<u32>> = HashMap::new();
        let mut remap = vec![0u32; self.positions.len()];
        let mut kept: Vec<u32> = Vec::with_capacity(self.positions.len());

        for (i, &p) in self.positions.iter().enumerate() {
            let (cx, cy, cz) = cell_of(p);
            let mut target = None;
            'search: for dx in -1..=1 {
                for dy in -1..=1 {
                    for dz in -1..=1 {
                        if let Some(candidates) = grid.get(&(cx + dx, cy + dy, cz + dz)) {
                            for &c in candidates {
                                if self.positions[c as usize].distance(p) <= tolerance {
                                    target = Some(c);
                                    break 'search;
                                }
                            }
                        }
                    }
                }
            }
            match target {
                Some(representative) => remap[i] = representative,
                None => {
                    remap[i] = i as u32;
                    grid.entry((cx, cy, cz)).or_default().push(i as u32);
                    kept.push(i as u32);
                }
            }
        }

        let removed = self.positions.len() - kept.len();
        if removed == 0 {
            return 0;
        }

        // Compact surviving vertices and their attributes
        let mut compact = vec![0u32; self.positions.len()];
        for (new_idx, &old_idx) in kept.iter().enumerate() {
            compact[old_idx as usize] = new_idx as u32;
        }
        self.positions = kept
            .iter()
            .map(|&i| self.positions[i as usize])
            .collect();
        if !self.normals.is_empty() {
            self.normals = kept.iter().map(|&i| self.normals[i as usize]).collect();
        }
        for set in &mut self.uv_sets {
            *set = kept.iter().map(|&i| set[i as usize]).collect();
        }

        // Re-index faces, dropping ones that became degenerate
        let mut faces = Vec::with_capacity(self.faces.len());
        let mut face_slots = Vec::with_capacity(self.face_slots.len());
        for (face, slot) in self.faces.iter().zip(&self.face_slots) {
            let f = [
                compact[remap[face[0] as usize] as usize],
                compact[remap[face[1] as usize] as usize],
                compact[remap[face[2] as usize] as usize],
            ];
            if f[0] != f[1] && f[1] != f[2] && f[0] != f[2] {
                faces.push(f);
                face_slots.push(*slot);
            }
        }
        self.faces = faces;
        self.face_slots = face_slots;

        debug!(removed, remaining = self.positions.len(), "welded vertices");
        removed
    }

    /// Synthesize a default single unwrap when the mesh has no UV set.
    ///
    /// Each triangle is packed into its own cell of a square grid atlas, with
    /// a small inset so neighboring cells do not bleed into each other during
    /// filtering. Vertices are split per-corner so every face owns its UVs.
    ///
    /// Returns true if an unwrap was synthesized, false if one already existed.
    pub fn ensure_uv_unwrap(&mut self) -> bool {
        if !self.uv_sets.is_empty() {
            return false;
        }
        if self.normals.len() != self.positions.len() {
            self.compute_normals();
        }

        let face_count = self.faces.len();
        let grid = (face_count as f32).sqrt().ceil().max(1.0) as usize;
        let cell = 1.0 / grid as f32;
        let inset = cell * 0.05;

        let mut positions = Vec::with_capacity(face_count * 3);
        let mut normals = Vec::with_capacity(face_count * 3);
        let mut uvs = Vec::with_capacity(face_count * 3);
        let mut faces = Vec::with_capacity(face_count);

        for (i, face) in self.faces.iter().enumerate() {
            let col = (i % grid) as f32;
            let row = (i / grid) as f32;
            let origin = Vec2::new(col * cell, row * cell);

            let corners = [
                origin + Vec2::splat(inset),
                origin + Vec2::new(cell - inset, inset),
                origin + Vec2::new(inset, cell - inset),
            ];

            let base = positions.len() as u32;
            for (corner, &vi) in corners.iter().zip(face.iter()) {
                positions.push(self.positions[vi as usize]);
                normals.push(self.normals[vi as usize]);
                uvs.push(*corner);
            }
            faces.push([base, base + 1, base + 2]);
        }

        self.positions = positions;
        self.normals = normals;
        self.uv_sets = vec![uvs];
        self.faces = faces;
        debug!(faces = face_count, grid, "synthesized default unwrap");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad_mesh() -> Mesh {
        // Two triangles sharing an edge, duplicated shared vertices
        let mut mesh = Mesh::new();
        mesh.positions = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, 0.0), // duplicate of 0
            Vec3::new(1.0, 1.0, 0.0), // duplicate of 2
            Vec3::new(0.0, 1.0, 0.0),
        ];
        mesh.faces = vec![[0, 1, 2], [3, 4, 5]];
        mesh.face_slots = vec![None, None];
        mesh
    }

    #[test]
    fn test_bounds() {
        let mesh = quad_mesh();
        let bounds = mesh.bounds().expect("bounds");
        assert_eq!(bounds.min, Vec3::ZERO);
        assert_eq!(bounds.max, Vec3::new(1.0, 1.0, 0.0));
        assert!((bounds.diagonal() - 2.0_f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_weld_merges_duplicates() {
        let mut mesh = quad_mesh();
        let removed = mesh.weld(1e-4);
        assert_eq!(removed, 2);
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.face_count(), 2);
        // Faces now share vertices 0 and 2
        assert_eq!(mesh.faces[1][0], 0);
        assert_eq!(mesh.faces[1][1], 2);
    }

    #[test]
    fn test_weld_is_idempotent() {
        let mut mesh = quad_mesh();
        mesh.weld(1e-4);
        let verts = mesh.vertex_count();
        let faces = mesh.face_count();
        let removed_again = mesh.weld(1e-4);
        assert_eq!(removed_again, 0);
        assert_eq!(mesh.vertex_count(), verts);
        assert_eq!(mesh.face_count(), faces);
    }

    #[test]
    fn test_weld_drops_degenerate_faces() {
        let mut mesh = Mesh::new();
        mesh.positions = vec![
            Vec3::ZERO,
            Vec3::new(1e-6, 0.0, 0.0), // within tolerance of vertex 0
            Vec3::new(0.0, 1.0, 0.0),
        ];
        mesh.faces = vec![[0, 1, 2]];
        mesh.face_slots = vec![None];
        mesh.weld(1e-4);
        assert_eq!(mesh.face_count(), 0);
    }

    #[test]
    fn test_compute_normals_flat_triangle() {
        let mut mesh = Mesh::new();
        mesh.positions = vec![Vec3::ZERO, Vec3::X, Vec3::Y];
        mesh.faces = vec![[0, 1, 2]];
        mesh.face_slots = vec![None];
        mesh.compute_normals();
        for n in &mesh.normals {
            assert!((*n - Vec3::Z).length() < 1e-6);
        }
    }

    #[test]
    fn test_join_offsets_and_remaps_slots() {
        let mut a = Mesh::new();
        a.positions = vec![Vec3::ZERO, Vec3::X, Vec3::Y];
        a.faces = vec![[0, 1, 2]];
        a.slots = vec!["primary".to_string()];
        a.face_slots = vec![Some(0)];

        let mut b = Mesh::new();
        b.positions = vec![Vec3::Z, Vec3::X, Vec3::Y];
        b.faces = vec![[0, 1, 2]];
        b.slots = vec!["secondary".to_string(), "primary".to_string()];
        b.face_slots = vec![Some(1)];

        let merged = Mesh::join(vec![a, b]);
        assert_eq!(merged.vertex_count(), 6);
        assert_eq!(merged.faces[1], [3, 4, 5]);
        // "primary" deduplicated across inputs
        assert_eq!(merged.slots, vec!["primary", "secondary"]);
        assert_eq!(merged.face_slots, vec![Some(0), Some(0)]);
    }

    #[test]
    fn test_ensure_uv_unwrap_covers_all_faces() {
        let mut mesh = quad_mesh();
        mesh.compute_normals();
        assert!(mesh.ensure_uv_unwrap());

        let uvs = mesh.primary_uvs().expect("uvs").to_vec();
        assert_eq!(uvs.len(), mesh.vertex_count());
        for face in 0..mesh.face_count() {
            let (uv0, uv1, uv2) = mesh.face_uvs(face).expect("face uvs");
            for uv in [uv0, uv1, uv2] {
                assert!((0.0..=1.0).contains(&uv.x));
                assert!((0.0..=1.0).contains(&uv.y));
            }
            // Non-degenerate in UV space
            let area = (uv1 - uv0).perp_dot(uv2 - uv0).abs();
            assert!(area > 0.0);
        }

        // Idempotent: a second call does not rebuild
        assert!(!mesh.ensure_uv_unwrap());
    }
}
