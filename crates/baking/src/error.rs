use std::path::PathBuf;

use thiserror::Error;

/// Fatal errors surfaced by the pipeline.
///
/// Missing textures and skipped slot assignments are deliberately *not* here:
/// those degrade gracefully with a `tracing::warn!` diagnostic so a partial
/// shading setup still bakes. Only mesh import, engine-level bake failures,
/// and the fail-fast projection precondition abort a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The source asset contained no mesh geometry
    #[error("no mesh geometry found in {path}")]
    Import { path: PathBuf },

    /// The source asset could not be parsed at all
    #[error("failed to load mesh from {path}: {source}")]
    MeshLoad {
        path: PathBuf,
        #[source]
        source: tobj::LoadError,
    },

    /// An image referenced by the pipeline could not be decoded
    #[error("failed to decode image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Filesystem failure while persisting an output
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Baking could not start or failed mid-sweep; carries the permutation
    /// (or view) index so the caller can resume externally
    #[error("bake failed at permutation {permutation}: {reason}")]
    Bake { permutation: usize, reason: String },

    /// Photograph count does not match the view count; raised before any
    /// camera movement or baking occurs
    #[error("photograph count {photos} does not match view count {views}")]
    ProjectionInputMismatch { views: usize, photos: usize },
}
