//! Material graph compositing
//!
//! Composes a [`Material`]'s texture channels into a single per-surface
//! shading function and binds it to the mesh's material slots. The binding
//! table is an owned builder keyed by slot name: re-binding the same slot
//! replaces the previous shading instead of accumulating duplicates, and a
//! reference to a slot the mesh does not have is skipped with a diagnostic,
//! never a fatal error.

use glam::{Vec2, Vec3};
use tracing::warn;

use crate::material::Material;
use crate::mesh::Mesh;

/// Engine default base color used when no diffuse channel is bound
pub const DEFAULT_BASE_COLOR: [f32; 3] = [0.8, 0.8, 0.8];

/// Engine default roughness
pub const DEFAULT_ROUGHNESS: f32 = 0.5;

/// Engine default metallic
pub const DEFAULT_METALLIC: f32 = 0.0;

/// A point on the mesh surface handed to shading during a bake
#[derive(Debug, Clone, Copy)]
pub struct SurfacePoint {
    pub position: Vec3,
    pub normal: Vec3,
    pub tangent: Vec3,
    pub bitangent: Vec3,
    /// Bake-parameterization UV (unscaled)
    pub uv: Vec2,
    /// Material slot of the face this point lies on
    pub slot: Option<u16>,
}

/// The capability the baker consumes: evaluate a color for a surface point.
///
/// Implemented by [`ShadingStack`] for synthetic material permutations and by
/// the projective blend pass for photograph-derived textures.
pub trait SurfaceShader {
    fn shade(&self, point: &SurfacePoint) -> [f32; 4];
}

/// Fully resolved shading inputs at one surface point
#[derive(Debug, Clone, Copy)]
pub struct ShadingSample {
    /// Diffuse color, already multiplied by occlusion
    pub base_color: [f32; 3],
    pub roughness: f32,
    pub metallic: f32,
    pub occlusion: f32,
    /// World-space shading normal (tangent-space map applied when present)
    pub normal: Vec3,
}

/// One material composed into a per-slot shading function
#[derive(Debug)]
pub struct SlotShading<'a> {
    material: &'a Material,
}

impl SlotShading<'_> {
    pub fn material(&self) -> &Material {
        self.material
    }

    /// Evaluate the composed channels at a surface point.
    ///
    /// Missing channels resolve to engine defaults. A combined ORM map feeds
    /// occlusion from its red channel, roughness from green, metallic from
    /// blue; standalone maps win over the combined one.
    pub fn sample(&self, point: &SurfacePoint) -> ShadingSample {
        let m = self.material;
        let uv = point.uv * m.scale;

        let orm = m.orm.as_ref().map(|t| t.sample(uv));

        let diffuse = m
            .diffuse
            .as_ref()
            .map(|t| {
                let c = t.sample(uv);
                [c[0], c[1], c[2]]
            })
            .unwrap_or(DEFAULT_BASE_COLOR);

        let occlusion = m
            .ambient_occlusion
            .as_ref()
            .map(|t| t.sample(uv)[0])
            .or(orm.map(|c| c[0]))
            .unwrap_or(1.0);

        let roughness = m
            .roughness
            .as_ref()
            .map(|t| t.sample(uv)[0])
            .or(orm.map(|c| c[1]))
            .unwrap_or(DEFAULT_ROUGHNESS);

        let metallic = m
            .metallic
            .as_ref()
            .map(|t| t.sample(uv)[0])
            .or(orm.map(|c| c[2]))
            .unwrap_or(DEFAULT_METALLIC);

        let normal = match &m.normal {
            Some(map) => {
                let c = map.sample(uv);
                let n = Vec3::new(c[0] * 2.0 - 1.0, c[1] * 2.0 - 1.0, c[2] * 2.0 - 1.0);
                (point.tangent * n.x + point.bitangent * n.y + point.normal * n.z)
                    .normalize_or(point.normal)
            }
            None => point.normal,
        };

        ShadingSample {
            base_color: [
                diffuse[0] * occlusion,
                diffuse[1] * occlusion,
                diffuse[2] * occlusion,
            ],
            roughness,
            metallic,
            occlusion,
            normal,
        }
    }
}

/// Outcome of a slot binding attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    /// The slot was empty and now holds this material
    Bound,
    /// The slot already held a shading; it was replaced, not duplicated
    Replaced,
    /// The mesh has no such slot; nothing was bound
    Skipped,
}

/// Owned shading bindings for one mesh, keyed by slot name.
///
/// This replaces ambient scene state: the stack is built per bake, consulted
/// through [`SurfaceShader`], and dropped when the bake target is torn down.
#[derive(Debug)]
pub struct ShadingStack<'a> {
    slot_names: Vec<String>,
    bindings: Vec<Option<SlotShading<'a>>>,
}

impl<'a> ShadingStack<'a> {
    /// An empty stack mirroring the mesh's slot order
    pub fn new(mesh: &Mesh) -> Self {
        let slot_names = mesh.slots.clone();
        let bindings = (0..slot_names.len()).map(|_| None).collect();
        Self {
            slot_names,
            bindings,
        }
    }

    /// Bind a material to a named slot.
    ///
    /// Idempotent: binding the same slot twice replaces the shading. An
    /// unknown slot name logs a skip diagnostic and leaves the stack as-is.
    pub fn bind(&mut self, slot: &str, material: &'a Material) -> BindOutcome {
        let Some(index) = self.slot_names.iter().position(|s| s == slot) else {
            warn!(slot, material = material.name, "slot assignment skipped: mesh has no such slot");
            return BindOutcome::Skipped;
        };
        if !material.has_visible_channels() {
            warn!(
                slot,
                material = material.name,
                "material has no texture channels, baking engine defaults"
            );
        }
        let replaced = self.bindings[index].is_some();
        self.bindings[index] = Some(SlotShading { material });
        if replaced {
            BindOutcome::Replaced
        } else {
            BindOutcome::Bound
        }
    }

    /// The shading bound to a slot index, if any
    pub fn binding(&self, slot: u16) -> Option<&SlotShading<'a>> {
        self.bindings.get(slot as usize)?.as_ref()
    }

    /// Resolve the full shading inputs at a surface point.
    ///
    /// Points on faces with no slot, or on slots with nothing bound, get the
    /// engine defaults.
    pub fn sample(&self, point: &SurfacePoint) -> ShadingSample {
        match point.slot.and_then(|slot| self.binding(slot)) {
            Some(shading) => shading.sample(point),
            None => ShadingSample {
                base_color: DEFAULT_BASE_COLOR,
                roughness: DEFAULT_ROUGHNESS,
                metallic: DEFAULT_METALLIC,
                occlusion: 1.0,
                normal: point.normal,
            },
        }
    }
}

impl SurfaceShader for ShadingStack<'_> {
    fn shade(&self, point: &SurfacePoint) -> [f32; 4] {
        let sample = self.sample(point);
        [
            sample.base_color[0],
            sample.base_color[1],
            sample.base_color[2],
            1.0,
        ]
    }
}
