//! Mesh consolidation
//!
//! Imports every object of an OBJ file, joins them into one [`Mesh`] with
//! deduplicated material slots, welds coincident vertices within a tolerance,
//! and recomputes smooth normals over the merged surface. The result is the
//! single mesh the rest of the pipeline operates on.

use std::io::{BufWriter, Write};
use std::path::Path;

use glam::{Vec2, Vec3};
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::mesh::Mesh;

fn model_to_mesh(model: &tobj::Model, materials: &[tobj::Material]) -> Mesh {
    let src = &model.mesh;
    let mut mesh = Mesh::new();

    mesh.positions = src
        .positions
        .chunks_exact(3)
        .map(|p| Vec3::new(p[0], p[1], p[2]))
        .collect();
    if src.normals.len() == src.positions.len() {
        mesh.normals = src
            .normals
            .chunks_exact(3)
            .map(|n| Vec3::new(n[0], n[1], n[2]))
            .collect();
    }
    if !src.texcoords.is_empty() && src.texcoords.len() / 2 == mesh.positions.len() {
        mesh.uv_sets = vec![
            src.texcoords
                .chunks_exact(2)
                .map(|t| Vec2::new(t[0], t[1]))
                .collect(),
        ];
    }

    let slot = src.material_id.and_then(|id| {
        materials
            .get(id)
            .map(|material| mesh.add_slot(material.name.clone()))
    });
    mesh.faces = src
        .indices
        .chunks_exact(3)
        .map(|f| [f[0], f[1], f[2]])
        .collect();
    mesh.face_slots = vec![slot; mesh.faces.len()];
    mesh
}

/// Import an OBJ file and consolidate every object it contains into one mesh.
///
/// Objects are joined with their material slots deduplicated by name, then
/// vertices within `tolerance` of each other are welded so the seams between
/// scanned fragments close up, and smooth normals are recomputed over the
/// merged surface. A source containing no triangles is an error.
pub fn consolidate(path: impl AsRef<Path>, tolerance: f32) -> Result<Mesh, PipelineError> {
    let path = path.as_ref();
    let (models, materials) =
        tobj::load_obj(path, &tobj::GPU_LOAD_OPTIONS).map_err(|source| {
            PipelineError::MeshLoad {
                path: path.to_path_buf(),
                source,
            }
        })?;
    let materials = match materials {
        Ok(materials) => materials,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "material library not loaded");
            Vec::new()
        }
    };

    let parts: Vec<Mesh> = models
        .iter()
        .map(|model| model_to_mesh(model, &materials))
        .collect();
    let mut mesh = Mesh::join(parts);
    if mesh.face_count() == 0 {
        return Err(PipelineError::Import {
            path: path.to_path_buf(),
        });
    }

    let before = mesh.vertex_count();
    let removed = mesh.weld(tolerance);
    mesh.compute_normals();
    info!(
        path = %path.display(),
        objects = models.len(),
        vertices = mesh.vertex_count(),
        welded = removed,
        faces = mesh.face_count(),
        "consolidated mesh"
    );
    debug_assert!(mesh.vertex_count() + removed == before);
    Ok(mesh)
}

/// Write the consolidated mesh back out as an OBJ with an MTL sidecar.
///
/// Slots become `usemtl` groups; the sidecar declares each slot as a plain
/// gray material so downstream tools resolve the references.
pub fn export_obj(mesh: &Mesh, path: impl AsRef<Path>) -> Result<(), PipelineError> {
    let path = path.as_ref();
    let io_err = |source: std::io::Error| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mtl_path = path.with_extension("mtl");
    let mtl_name = mtl_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "materials.mtl".to_string());

    let file = std::fs::File::create(path).map_err(io_err)?;
    let mut out = BufWriter::new(file);

    if !mesh.slots.is_empty() {
        writeln!(out, "mtllib {mtl_name}").map_err(io_err)?;
    }
    for p in &mesh.positions {
        writeln!(out, "v {} {} {}", p.x, p.y, p.z).map_err(io_err)?;
    }
    let has_uvs = mesh.primary_uvs().is_some();
    if let Some(uvs) = mesh.primary_uvs() {
        for uv in uvs {
            writeln!(out, "vt {} {}", uv.x, uv.y).map_err(io_err)?;
        }
    }
    let has_normals = mesh.normals.len() == mesh.vertex_count();
    if has_normals {
        for n in &mesh.normals {
            writeln!(out, "vn {} {} {}", n.x, n.y, n.z).map_err(io_err)?;
        }
    }

    // Faces grouped by slot, unassigned first. OBJ has no way to clear a
    // usemtl once set, so an unassigned face after an assigned one would
    // silently inherit the previous material on reload.
    let slot_of = |face: usize| mesh.face_slots.get(face).copied().flatten();
    let mut order: Vec<usize> = (0..mesh.faces.len()).collect();
    order.sort_by_key(|&face| slot_of(face).map(|s| s as u32 + 1).unwrap_or(0));

    let mut current_slot: Option<Option<u16>> = None;
    for face_index in order {
        let slot = slot_of(face_index);
        if current_slot != Some(slot) {
            match slot {
                Some(slot) => {
                    let name = &mesh.slots[slot as usize];
                    writeln!(out, "o {name}").map_err(io_err)?;
                    writeln!(out, "usemtl {name}").map_err(io_err)?;
                }
                None => writeln!(out, "o unassigned").map_err(io_err)?,
            }
            current_slot = Some(slot);
        }
        let face = mesh.faces[face_index];
        write!(out, "f").map_err(io_err)?;
        for i in face {
            let i = i + 1;
            match (has_uvs, has_normals) {
                (true, true) => write!(out, " {i}/{i}/{i}"),
                (true, false) => write!(out, " {i}/{i}"),
                (false, true) => write!(out, " {i}//{i}"),
                (false, false) => write!(out, " {i}"),
            }
            .map_err(io_err)?;
        }
        writeln!(out).map_err(io_err)?;
    }
    out.flush().map_err(io_err)?;

    if !mesh.slots.is_empty() {
        let file = std::fs::File::create(&mtl_path).map_err(|source| PipelineError::Io {
            path: mtl_path.clone(),
            source,
        })?;
        let mut out = BufWriter::new(file);
        for slot in &mesh.slots {
            writeln!(out, "newmtl {slot}").map_err(io_err)?;
            writeln!(out, "Kd 0.8 0.8 0.8").map_err(io_err)?;
            writeln!(out).map_err(io_err)?;
        }
        out.flush().map_err(io_err)?;
    }

    info!(path = %path.display(), "exported consolidated mesh");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(name);
        std::fs::write(&path, contents).expect("write temp obj");
        path
    }

    #[test]
    fn test_consolidate_joins_and_welds() {
        // Two objects sharing an edge; the shared vertices only fuse after
        // welding
        let path = write_temp(
            "baking_test_consolidate.obj",
            "o first\n\
             v 0 0 0\nv 1 0 0\nv 0 1 0\n\
             f 1 2 3\n\
             o second\n\
             v 1 0 0\nv 1 1 0\nv 0 1 0\n\
             f 4 5 6\n",
        );

        let mesh = consolidate(&path, 1e-4).expect("consolidate");
        assert_eq!(mesh.face_count(), 2);
        assert_eq!(mesh.vertex_count(), 4);
        // Normals were recomputed over the merged surface
        assert_eq!(mesh.normals.len(), 4);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_consolidate_empty_source_fails() {
        let path = write_temp("baking_test_consolidate_empty.obj", "# nothing here\n");
        let err = consolidate(&path, 1e-4).unwrap_err();
        assert!(matches!(err, PipelineError::Import { .. }));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_export_roundtrip() {
        let path = write_temp(
            "baking_test_export_src.obj",
            "v 0 0 0\nv 1 0 0\nv 0 1 0\nv 1 1 0\n\
             f 1 2 3\nf 2 4 3\n",
        );
        let mesh = consolidate(&path, 1e-4).expect("consolidate");

        let out = std::env::temp_dir().join("baking_test_export_out.obj");
        export_obj(&mesh, &out).expect("export");

        let reloaded = consolidate(&out, 1e-4).expect("reload");
        assert_eq!(reloaded.vertex_count(), mesh.vertex_count());
        assert_eq!(reloaded.face_count(), mesh.face_count());

        std::fs::remove_file(&path).ok();
        std::fs::remove_file(&out).ok();
    }

    #[test]
    fn test_export_keeps_unassigned_faces_unassigned() {
        // An assigned face written before an unassigned one must not leak
        // its usemtl onto the unassigned face through the reload
        let mut mesh = Mesh::new();
        mesh.positions = vec![
            Vec3::ZERO,
            Vec3::X,
            Vec3::Y,
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(3.0, 0.0, 0.0),
            Vec3::new(2.0, 1.0, 0.0),
        ];
        mesh.faces = vec![[0, 1, 2], [3, 4, 5]];
        let slot = mesh.add_slot("primary");
        mesh.face_slots = vec![Some(slot), None];
        mesh.compute_normals();

        let out = std::env::temp_dir().join("baking_test_export_unassigned.obj");
        export_obj(&mesh, &out).expect("export");

        let reloaded = consolidate(&out, 1e-4).expect("reload");
        assert_eq!(reloaded.face_count(), 2);
        assert_eq!(reloaded.slots, vec!["primary"]);
        let assigned = reloaded
            .face_slots
            .iter()
            .filter(|slot| slot.is_some())
            .count();
        assert_eq!(assigned, 1);

        std::fs::remove_file(&out).ok();
        std::fs::remove_file(out.with_extension("mtl")).ok();
    }
}
