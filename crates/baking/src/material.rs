//! Materials and texture channel storage
//!
//! A [`Material`] is a named bundle of optional texture channels plus a UV
//! tiling scale. Channels reference CPU [`Texture`]s decoded up front; a
//! channel whose image is missing is skipped with a diagnostic and simply
//! leaves the corresponding shading input at the engine default.

use std::path::Path;

use glam::Vec2;
use retex_config::{MaterialRecord, MaterialSpec};
use tracing::warn;

use crate::error::PipelineError;

/// Slot names assigned to the first three unnamed groups of a material spec
pub const DEFAULT_SLOT_NAMES: [&str; 3] = ["primary", "secondary", "tertiary"];

/// CPU texture: RGBA f32 pixels in row-major order, row 0 at the top.
#[derive(Debug, Clone)]
pub struct Texture {
    pub width: u32,
    pub height: u32,
    pixels: Vec<[f32; 4]>,
}

impl Texture {
    /// Decode an image file into an RGBA f32 texture
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let image = image::open(path).map_err(|source| PipelineError::Image {
            path: path.to_path_buf(),
            source,
        })?;
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        let pixels = rgba
            .pixels()
            .map(|p| {
                [
                    p[0] as f32 / 255.0,
                    p[1] as f32 / 255.0,
                    p[2] as f32 / 255.0,
                    p[3] as f32 / 255.0,
                ]
            })
            .collect();
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Build a texture from raw pixel data (row-major, row 0 at the top)
    pub fn from_pixels(width: u32, height: u32, pixels: Vec<[f32; 4]>) -> Self {
        assert_eq!(pixels.len(), (width as usize) * (height as usize));
        Self {
            width,
            height,
            pixels,
        }
    }

    /// A 1x1 texture of a single color
    pub fn solid(color: [f32; 4]) -> Self {
        Self::from_pixels(1, 1, vec![color])
    }

    #[inline]
    fn texel(&self, x: u32, y: u32) -> [f32; 4] {
        self.pixels[(y as usize) * (self.width as usize) + (x as usize)]
    }

    /// Bilinear sample with repeat wrapping; UV origin bottom-left.
    pub fn sample(&self, uv: Vec2) -> [f32; 4] {
        self.sample_impl(uv, true)
    }

    /// Bilinear sample clamped to the image edges; UV origin bottom-left.
    pub fn sample_clamped(&self, uv: Vec2) -> [f32; 4] {
        self.sample_impl(uv, false)
    }

    fn sample_impl(&self, uv: Vec2, wrap: bool) -> [f32; 4] {
        let (w, h) = (self.width as i64, self.height as i64);
        // Flip V: UV origin is bottom-left, pixel row 0 is the top
        let px = uv.x * w as f32 - 0.5;
        let py = (1.0 - uv.y) * h as f32 - 0.5;

        let x0 = px.floor() as i64;
        let y0 = py.floor() as i64;
        let fx = px - x0 as f32;
        let fy = py - y0 as f32;

        let resolve = |v: i64, limit: i64| -> u32 {
            if wrap {
                v.rem_euclid(limit) as u32
            } else {
                v.clamp(0, limit - 1) as u32
            }
        };

        let x1 = resolve(x0 + 1, w);
        let y1 = resolve(y0 + 1, h);
        let x0 = resolve(x0, w);
        let y0 = resolve(y0, h);

        let c00 = self.texel(x0, y0);
        let c10 = self.texel(x1, y0);
        let c01 = self.texel(x0, y1);
        let c11 = self.texel(x1, y1);

        let mut out = [0.0f32; 4];
        for i in 0..4 {
            let top = c00[i] * (1.0 - fx) + c10[i] * fx;
            let bottom = c01[i] * (1.0 - fx) + c11[i] * fx;
            out[i] = top * (1.0 - fy) + bottom * fy;
        }
        out
    }
}

/// A named bundle of optional texture channels and a UV tiling scale.
///
/// At least one channel should be present for the material to have a visible
/// effect; absent channels fall back to engine defaults, never to an error.
#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    pub diffuse: Option<Texture>,
    pub roughness: Option<Texture>,
    pub metallic: Option<Texture>,
    pub normal: Option<Texture>,
    pub ambient_occlusion: Option<Texture>,
    /// Combined occlusion-roughness-metallic map (R = AO, G = rough, B = metal)
    pub orm: Option<Texture>,
    /// UV tiling scale applied before every texture lookup
    pub scale: f32,
}

impl Material {
    /// An empty material with only a name; all lookups fall back to defaults
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            diffuse: None,
            roughness: None,
            metallic: None,
            normal: None,
            ambient_occlusion: None,
            orm: None,
            scale: 1.0,
        }
    }

    /// Load a material from a spec record, decoding each referenced image.
    ///
    /// A channel whose file cannot be decoded is dropped with a warning; the
    /// remaining channels still take effect.
    pub fn from_record(record: &MaterialRecord) -> Self {
        let load = |channel: &str, path: &Option<String>| -> Option<Texture> {
            let path = path.as_ref()?;
            match Texture::from_path(path) {
                Ok(texture) => Some(texture),
                Err(err) => {
                    warn!(
                        material = record.name,
                        channel,
                        path,
                        error = %err,
                        "missing texture, channel skipped"
                    );
                    None
                }
            }
        };

        Self {
            name: record.name.clone(),
            diffuse: load("diffuse", &record.diffuse),
            roughness: load("roughness", &record.roughness),
            metallic: load("metallic", &record.metallic),
            normal: load("normal", &record.normal),
            ambient_occlusion: load("ambient_occlusion", &record.ambient_occlusion),
            orm: load("orm", &record.orm),
            scale: record.scale,
        }
    }

    /// Whether any texture channel is present
    pub fn has_visible_channels(&self) -> bool {
        self.diffuse.is_some()
            || self.roughness.is_some()
            || self.metallic.is_some()
            || self.normal.is_some()
            || self.ambient_occlusion.is_some()
            || self.orm.is_some()
    }
}

/// Ordered slot -> candidate-material-list assignments to permute over.
///
/// An empty candidate list means "no material assigned to this slot for this
/// permutation" and contributes a single leave-unchanged option to the
/// Cartesian product; it is never an error.
#[derive(Debug, Clone, Default)]
pub struct SlotGroup {
    slots: Vec<(String, Vec<Material>)>,
}

impl SlotGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a slot with its candidate materials; order is permutation order
    pub fn push(&mut self, slot: impl Into<String>, materials: Vec<Material>) {
        self.slots.push((slot.into(), materials));
    }

    pub fn slots(&self) -> &[(String, Vec<Material>)] {
        &self.slots
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of combinations the Cartesian product will produce
    pub fn combination_count(&self) -> usize {
        self.slots
            .iter()
            .map(|(_, materials)| materials.len().max(1))
            .product()
    }

    /// Build a slot group from the JSON specification, loading every texture.
    ///
    /// The first three groups take the conventional slot names; further groups
    /// are numbered.
    pub fn from_spec(spec: &MaterialSpec) -> Self {
        let mut group = Self::new();
        for (i, records) in spec.groups.iter().enumerate() {
            let name = DEFAULT_SLOT_NAMES
                .get(i)
                .map(|s| s.to_string())
                .unwrap_or_else(|| format!("slot_{i}"));
            let materials = records.iter().map(Material::from_record).collect();
            group.push(name, materials);
        }
        group
    }
}
