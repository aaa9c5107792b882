//! Camera rig planning
//!
//! Computes a ring of camera poses that frame the consolidated object from
//! evenly spaced angles. Orientation is never stored: each pose keeps its
//! target point and derives a look-at view matrix on demand, so moving the
//! camera can never leave a stale rotation behind.
//!
//! The world is Z-up; the ring lies in the XY plane with a tunable height
//! offset above the object center.

use glam::{Mat4, Vec3};
use retex_config::RigConfig;
use tracing::debug;

use crate::mesh::Aabb;

/// A camera placement: position plus the target it must point at.
#[derive(Debug, Clone, Copy)]
pub struct CameraPose {
    pub position: Vec3,
    pub target: Vec3,
    /// Vertical field of view in radians
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
}

impl CameraPose {
    /// Unit vector from the camera toward its target
    pub fn forward(&self) -> Vec3 {
        (self.target - self.position).normalize()
    }

    /// Look-at view matrix, recomputed from the target every time
    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, Vec3::Z)
    }

    pub fn projection(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, aspect, self.near, self.far)
    }

    pub fn view_projection(&self, aspect: f32) -> Mat4 {
        self.projection(aspect) * self.view()
    }
}

/// One ring entry: the view's angle identifier and its pose
#[derive(Debug, Clone, Copy)]
pub struct ViewPose {
    pub angle_degrees: f32,
    pub pose: CameraPose,
}

/// Ordered, angle-ascending set of ring views.
///
/// Deterministic for identical inputs; consumed by both bake paths.
#[derive(Debug, Clone, Default)]
pub struct ViewSet {
    views: Vec<ViewPose>,
}

impl ViewSet {
    pub fn new(views: Vec<ViewPose>) -> Self {
        Self { views }
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ViewPose> {
        self.views.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ViewPose> {
        self.views.iter()
    }
}

/// Camera distance that frames the whole bounding box with a margin.
///
/// `distance = diagonal * margin / (2 * tan(fov / 2))`, widening the
/// effective field of view for portrait aspect ratios.
pub fn fit_distance(bounds: &Aabb, fov_y: f32, aspect: f32, margin: f32) -> f32 {
    let fov = if aspect >= 1.0 { fov_y } else { fov_y / aspect };
    (bounds.diagonal() * margin) / (2.0 * (fov * 0.5).tan())
}

/// Plan `config.view_count` poses evenly spaced around the object.
///
/// Angles are exactly `k * 360 / N` degrees for k in 0..N, ascending. Counts
/// that do not divide 360 produce fractional-degree steps rather than the
/// truncated integer stepping some rigs use, so the requested view count is
/// always honored.
pub fn plan_ring(bounds: &Aabb, config: &RigConfig) -> ViewSet {
    let fov_y = config.fov_degrees.to_radians();
    let distance = fit_distance(bounds, fov_y, config.aspect, config.margin);
    let height = distance * config.height_factor;
    let center = bounds.center();
    let count = config.view_count.max(1);

    debug!(count, distance, height, "planned camera ring");

    let views = (0..count)
        .map(|i| {
            let angle_degrees = i as f32 * 360.0 / count as f32;
            let angle = angle_degrees.to_radians();
            let position = center
                + Vec3::new(angle.cos() * distance, angle.sin() * distance, height);
            ViewPose {
                angle_degrees,
                pose: CameraPose {
                    position,
                    target: center,
                    fov_y,
                    near: config.near,
                    far: config.far,
                },
            }
        })
        .collect();

    ViewSet::new(views)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_bounds() -> Aabb {
        Aabb {
            min: Vec3::new(-1.0, -1.0, -1.0),
            max: Vec3::new(1.0, 1.0, 1.0),
        }
    }

    #[test]
    fn test_even_division_angles() {
        let set = plan_ring(&unit_bounds(), &RigConfig::default());
        assert_eq!(set.len(), 8);
        for (i, view) in set.iter().enumerate() {
            assert!((view.angle_degrees - i as f32 * 45.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_uneven_division_still_yields_requested_count() {
        let config = RigConfig {
            view_count: 7,
            ..RigConfig::default()
        };
        let set = plan_ring(&unit_bounds(), &config);
        // 360/7 is fractional; the count is honored anyway
        assert_eq!(set.len(), 7);
        let step = 360.0 / 7.0;
        for (i, view) in set.iter().enumerate() {
            assert!((view.angle_degrees - i as f32 * step).abs() < 1e-3);
        }
    }

    #[test]
    fn test_poses_point_at_center() {
        let set = plan_ring(&unit_bounds(), &RigConfig::default());
        let center = unit_bounds().center();
        for view in set.iter() {
            let toward_center = (center - view.pose.position).normalize();
            assert!((view.pose.forward() - toward_center).length() < 1e-5);
        }
    }

    #[test]
    fn test_fit_distance_formula() {
        let bounds = unit_bounds();
        let fov: f32 = 45.0_f32.to_radians();
        let d = fit_distance(&bounds, fov, 1.0, 1.2);
        let expected = bounds.diagonal() * 1.2 / (2.0 * (fov / 2.0).tan());
        assert!((d - expected).abs() < 1e-5);

        // Portrait aspect widens the effective fov, pulling the camera in
        let portrait = fit_distance(&bounds, fov, 0.5, 1.2);
        assert!(portrait < d);
    }

    #[test]
    fn test_height_offset_scales_with_distance() {
        let config = RigConfig {
            height_factor: 0.2,
            ..RigConfig::default()
        };
        let set = plan_ring(&unit_bounds(), &config);
        let fov = config.fov_degrees.to_radians();
        let distance = fit_distance(&unit_bounds(), fov, config.aspect, config.margin);
        for view in set.iter() {
            let height = view.pose.position.z - unit_bounds().center().z;
            assert!((height - distance * 0.2).abs() < 1e-4);
        }
    }

    #[test]
    fn test_deterministic_for_identical_inputs() {
        let a = plan_ring(&unit_bounds(), &RigConfig::default());
        let b = plan_ring(&unit_bounds(), &RigConfig::default());
        for (va, vb) in a.iter().zip(b.iter()) {
            assert_eq!(va.angle_degrees, vb.angle_degrees);
            assert_eq!(va.pose.position, vb.pose.position);
            assert_eq!(va.pose.target, vb.pose.target);
        }
    }
}
