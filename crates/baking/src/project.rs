//! Projective texture accumulation
//!
//! Folds a sequence of (camera view, photograph) pairs into a single bake
//! raster. Each step re-bakes the mesh with a shader that perspective-projects
//! the surface point into the photograph and linearly blends the sampled color
//! over the previous step's result; the base for the first step is a flat
//! reference bake. The fold is explicit and ordered, with no hidden render
//! state between steps.

use glam::Vec4Swizzles;
use retex_config::{BakeConfig, PipelineConfig};
use tracing::info;

use crate::bake::{BakeSettings, bake};
use crate::error::PipelineError;
use crate::material::Texture;
use crate::mesh::Mesh;
use crate::raster::Raster;
use crate::raycast::occluded;
use crate::rig::{CameraPose, ViewSet};
use crate::shading::{SurfacePoint, SurfaceShader};

/// Base color baked wherever no photograph has contributed yet
pub const DEFAULT_REFERENCE_COLOR: [f32; 4] = [0.5, 0.5, 0.5, 1.0];

/// Parameters of the projective fold
#[derive(Debug, Clone, Copy)]
pub struct ProjectionSettings {
    /// Linear blend factor per step: 1.0 replaces, 0.0 keeps the base
    pub alpha: f32,
    /// Color of the initial reference bake
    pub reference_color: [f32; 4],
    /// Photograph aspect ratio (width / height), matching the capture rig
    pub aspect: f32,
    /// Reject samples on surfaces the camera cannot see. Off by default:
    /// closed scanned surfaces rarely self-occlude from a fitted ring, and
    /// the raycast is a full sweep over the mesh per texel sample.
    pub occlusion_culling: bool,
}

impl Default for ProjectionSettings {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            reference_color: DEFAULT_REFERENCE_COLOR,
            aspect: 1.0,
            occlusion_culling: false,
        }
    }
}

impl From<&PipelineConfig> for ProjectionSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            alpha: config.blend_alpha.0,
            aspect: config.rig.aspect,
            ..Self::default()
        }
    }
}

// Bakes the flat reference color over every covered texel
struct ReferenceShader([f32; 4]);

impl SurfaceShader for ReferenceShader {
    fn shade(&self, _point: &SurfacePoint) -> [f32; 4] {
        self.0
    }
}

/// One step of the fold: projects the photograph onto the surface and blends
/// it over the previous accumulation.
pub struct ProjectionPass<'a> {
    mesh: &'a Mesh,
    pose: &'a CameraPose,
    photo: &'a Texture,
    base: &'a Raster,
    settings: ProjectionSettings,
}

impl<'a> ProjectionPass<'a> {
    pub fn new(
        mesh: &'a Mesh,
        pose: &'a CameraPose,
        photo: &'a Texture,
        base: &'a Raster,
        settings: ProjectionSettings,
    ) -> Self {
        Self {
            mesh,
            pose,
            photo,
            base,
            settings,
        }
    }
}

impl SurfaceShader for ProjectionPass<'_> {
    fn shade(&self, point: &SurfacePoint) -> [f32; 4] {
        let base = self.base.sample(point.uv);

        let clip = self.pose.view_projection(self.settings.aspect)
            * point.position.extend(1.0);
        // Behind the camera plane: this view says nothing about the point
        if clip.w <= 0.0 {
            return base;
        }
        let ndc = clip.xy() / clip.w;

        if self.settings.occlusion_culling
            && occluded(self.mesh, self.pose.position, point.position)
        {
            return base;
        }

        let photo_uv = (ndc + glam::Vec2::ONE) * 0.5;
        let color = self.photo.sample_clamped(photo_uv);

        let alpha = self.settings.alpha;
        let mut out = [0.0f32; 4];
        for i in 0..4 {
            out[i] = base[i] * (1.0 - alpha) + color[i] * alpha;
        }
        out
    }
}

/// Fold every (view, photograph) pair into one accumulated bake raster.
///
/// Fails before any baking when the photograph count does not match the view
/// count. Zero views is valid and yields the plain reference bake.
pub fn accumulate_views(
    mesh: &mut Mesh,
    views: &ViewSet,
    photos: &[Texture],
    config: &BakeConfig,
    settings: &ProjectionSettings,
) -> Result<Raster, PipelineError> {
    if photos.len() != views.len() {
        return Err(PipelineError::ProjectionInputMismatch {
            views: views.len(),
            photos: photos.len(),
        });
    }

    mesh.ensure_uv_unwrap();
    if mesh.normals.len() != mesh.vertex_count() {
        mesh.compute_normals();
    }

    let bake_settings = BakeSettings::from(config);
    let mut accumulated = bake(
        mesh,
        &ReferenceShader(settings.reference_color),
        &bake_settings,
    )?;

    for (step, (view, photo)) in views.iter().zip(photos).enumerate() {
        let next = {
            let pass = ProjectionPass::new(mesh, &view.pose, photo, &accumulated, *settings);
            bake(mesh, &pass, &bake_settings).map_err(|err| match err {
                PipelineError::Bake { reason, .. } => PipelineError::Bake {
                    permutation: step,
                    reason,
                },
                other => other,
            })?
        };
        accumulated = next;
        info!(step, angle = view.angle_degrees, "projected view");
    }

    Ok(accumulated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec2, Vec3};
    use retex_config::RigConfig;

    use crate::rig::plan_ring;

    // Vertical quad in the XZ plane, unwrapped over the full UV square
    fn vertical_quad() -> Mesh {
        let mut mesh = Mesh::new();
        mesh.positions = vec![
            Vec3::new(-1.0, 0.0, -1.0),
            Vec3::new(1.0, 0.0, -1.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(-1.0, 0.0, 1.0),
        ];
        mesh.faces = vec![[0, 1, 2], [0, 2, 3]];
        mesh.face_slots = vec![None, None];
        mesh.uv_sets = vec![vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
        ]];
        mesh.compute_normals();
        mesh
    }

    fn flat_config() -> BakeConfig {
        BakeConfig {
            resolution: 8,
            samples: 1,
            denoise: false,
        }
    }

    #[test]
    fn test_mismatched_photo_count_fails_before_baking() {
        let mut mesh = vertical_quad();
        mesh.uv_sets.clear();
        let views = plan_ring(
            &mesh.bounds().expect("bounds"),
            &RigConfig {
                view_count: 2,
                ..RigConfig::default()
            },
        );
        let photos = vec![Texture::solid([1.0; 4])];

        let err = accumulate_views(
            &mut mesh,
            &views,
            &photos,
            &flat_config(),
            &ProjectionSettings::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ProjectionInputMismatch {
                views: 2,
                photos: 1
            }
        ));
        // Nothing ran: the mesh was not even unwrapped
        assert!(mesh.primary_uvs().is_none());
    }

    #[test]
    fn test_zero_views_yields_reference_bake() {
        let mut mesh = vertical_quad();
        let raster = accumulate_views(
            &mut mesh,
            &ViewSet::default(),
            &[],
            &flat_config(),
            &ProjectionSettings::default(),
        )
        .expect("bake");

        let inside = raster.sample(Vec2::new(0.5, 0.5));
        for i in 0..4 {
            assert!((inside[i] - DEFAULT_REFERENCE_COLOR[i]).abs() < 1e-6);
        }
    }

    #[test]
    fn test_full_alpha_last_view_wins() {
        let bounds = vertical_quad().bounds().expect("bounds");
        let rig = RigConfig {
            view_count: 4,
            ..RigConfig::default()
        };
        let views = plan_ring(&bounds, &rig);
        let photos = vec![
            Texture::solid([1.0, 0.0, 0.0, 1.0]),
            Texture::solid([0.0, 1.0, 0.0, 1.0]),
            Texture::solid([0.0, 0.0, 1.0, 1.0]),
            Texture::from_pixels(
                2,
                1,
                vec![[1.0, 1.0, 0.0, 1.0], [0.0, 1.0, 1.0, 1.0]],
            ),
        ];
        let settings = ProjectionSettings {
            alpha: 1.0,
            ..ProjectionSettings::default()
        };

        let mut mesh = vertical_quad();
        let all = accumulate_views(&mut mesh, &views, &photos, &flat_config(), &settings)
            .expect("fold");

        // With full replacement only the final view matters
        let last_view = ViewSet::new(vec![*views.get(3).expect("view")]);
        let mut mesh = vertical_quad();
        let only_last = accumulate_views(
            &mut mesh,
            &last_view,
            &photos[3..],
            &flat_config(),
            &settings,
        )
        .expect("fold");

        assert_eq!(all.as_bytes(), only_last.as_bytes());
    }

    #[test]
    fn test_zero_alpha_keeps_reference() {
        let bounds = vertical_quad().bounds().expect("bounds");
        let views = plan_ring(
            &bounds,
            &RigConfig {
                view_count: 3,
                ..RigConfig::default()
            },
        );
        let photos = vec![Texture::solid([1.0, 0.0, 0.0, 1.0]); 3];
        let settings = ProjectionSettings {
            alpha: 0.0,
            ..ProjectionSettings::default()
        };

        let mut mesh = vertical_quad();
        let raster = accumulate_views(&mut mesh, &views, &photos, &flat_config(), &settings)
            .expect("fold");

        let inside = raster.sample(Vec2::new(0.5, 0.5));
        for i in 0..4 {
            assert!((inside[i] - DEFAULT_REFERENCE_COLOR[i]).abs() < 1e-5);
        }
    }

    #[test]
    fn test_settings_from_pipeline_config() {
        let mut config = PipelineConfig::default();
        config.blend_alpha.0 = 0.3;
        config.rig.aspect = 1.5;
        let settings = ProjectionSettings::from(&config);
        assert!((settings.alpha - 0.3).abs() < 1e-6);
        assert!((settings.aspect - 1.5).abs() < 1e-6);
        assert!(!settings.occlusion_culling);
    }

    #[test]
    fn test_partial_alpha_blends_toward_photo() {
        let bounds = vertical_quad().bounds().expect("bounds");
        let views = plan_ring(
            &bounds,
            &RigConfig {
                view_count: 1,
                ..RigConfig::default()
            },
        );
        let photos = vec![Texture::solid([1.0, 0.0, 0.0, 1.0])];
        let settings = ProjectionSettings {
            alpha: 0.5,
            ..ProjectionSettings::default()
        };

        let mut mesh = vertical_quad();
        let raster = accumulate_views(&mut mesh, &views, &photos, &flat_config(), &settings)
            .expect("fold");

        // Halfway between the gray reference and the red photograph
        let inside = raster.sample(Vec2::new(0.5, 0.5));
        assert!((inside[0] - 0.75).abs() < 1e-5);
        assert!((inside[1] - 0.25).abs() < 1e-5);
    }
}
