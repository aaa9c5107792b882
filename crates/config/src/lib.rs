//! Shared configuration for the Retex pipeline
//!
//! This crate provides the single source of truth for bake, camera-rig, and
//! projection settings, plus the JSON material-specification schema exchanged
//! with callers. The core engine crate consumes these types; nothing here
//! depends on the engine itself.

use serde::{Deserialize, Serialize};

/// Default bake target resolution in pixels (square)
pub const DEFAULT_BAKE_RESOLUTION: u32 = 2048;

/// Default stochastic sample count per texel
pub const DEFAULT_BAKE_SAMPLES: u32 = 20;

/// Default vertex merge tolerance in local units
pub const DEFAULT_MERGE_TOLERANCE: f32 = 1e-4;

/// Default number of ring views
pub const DEFAULT_VIEW_COUNT: u32 = 8;

/// Default vertical field of view in degrees
pub const DEFAULT_FOV_DEGREES: f32 = 45.0;

/// Default framing margin applied to the fitted camera distance
pub const DEFAULT_FRAME_MARGIN: f32 = 1.2;

/// Default camera height offset as a fraction of the fitted distance
pub const DEFAULT_HEIGHT_FACTOR: f32 = 0.2;

/// Default UV tiling scale for materials that do not specify one
pub const DEFAULT_MATERIAL_SCALE: f32 = 20.0;

/// Bake target configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BakeConfig {
    /// Raster resolution in pixels (square)
    pub resolution: u32,
    /// Stochastic samples per texel
    pub samples: u32,
    /// Run the denoise pass after sampling
    pub denoise: bool,
}

impl Default for BakeConfig {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_BAKE_RESOLUTION,
            samples: DEFAULT_BAKE_SAMPLES,
            denoise: true,
        }
    }
}

/// Camera rig configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RigConfig {
    /// Number of evenly spaced views around the object
    pub view_count: u32,
    /// Vertical field of view in degrees
    pub fov_degrees: f32,
    /// Render aspect ratio (width / height)
    pub aspect: f32,
    /// Framing margin multiplier on the fitted distance
    pub margin: f32,
    /// Camera height offset as a fraction of the fitted distance
    pub height_factor: f32,
    /// Near clip distance
    pub near: f32,
    /// Far clip distance
    pub far: f32,
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            view_count: DEFAULT_VIEW_COUNT,
            fov_degrees: DEFAULT_FOV_DEGREES,
            aspect: 1.0,
            margin: DEFAULT_FRAME_MARGIN,
            height_factor: DEFAULT_HEIGHT_FACTOR,
            near: 0.01,
            far: 1000.0,
        }
    }
}

/// Complete pipeline configuration for one run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Vertex merge tolerance used during mesh consolidation
    pub merge_tolerance: MergeTolerance,
    pub bake: BakeConfig,
    pub rig: RigConfig,
    /// Linear blend factor for projective accumulation (1.0 = replace)
    pub blend_alpha: BlendAlpha,
}

/// Newtype wrapper so the tolerance default survives `#[serde(default)]`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MergeTolerance(pub f32);

impl Default for MergeTolerance {
    fn default() -> Self {
        Self(DEFAULT_MERGE_TOLERANCE)
    }
}

/// Newtype wrapper so the blend default survives `#[serde(default)]`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlendAlpha(pub f32);

impl Default for BlendAlpha {
    fn default() -> Self {
        Self(1.0)
    }
}

/// One material record in the JSON specification
///
/// Every field except `name` is optional; texture fields hold file paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialRecord {
    pub name: String,
    #[serde(default)]
    pub diffuse: Option<String>,
    #[serde(default)]
    pub roughness: Option<String>,
    #[serde(default)]
    pub metallic: Option<String>,
    #[serde(default)]
    pub normal: Option<String>,
    #[serde(default)]
    pub ambient_occlusion: Option<String>,
    #[serde(default)]
    pub orm: Option<String>,
    #[serde(default = "default_material_scale")]
    pub scale: f32,
}

fn default_material_scale() -> f32 {
    DEFAULT_MATERIAL_SCALE
}

impl MaterialRecord {
    /// Create a record with only a name; channels are filled by the caller
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            diffuse: None,
            roughness: None,
            metallic: None,
            normal: None,
            ambient_occlusion: None,
            orm: None,
            scale: DEFAULT_MATERIAL_SCALE,
        }
    }
}

/// The full material specification: an ordered list of slot groups, each a
/// list of candidate material records to permute over.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaterialSpec {
    pub groups: Vec<Vec<MaterialRecord>>,
}

impl MaterialSpec {
    /// Parse a specification from its JSON form
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize back to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
