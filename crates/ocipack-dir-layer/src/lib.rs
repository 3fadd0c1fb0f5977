//! Walks a host directory into a single [`ocipack_layer::LayerFs`], the way
//! a Dockerfile `COPY` or a Go-binary install step turns host files into a
//! layer: hard-link detection, symlink capture, timestamp clamping, owner
//! rewriting, and an optional path prefix.

mod error;
mod walk;

pub use error::DirLayerError;
pub use walk::{build_dir_layer, DirLayerOptions, OwnerOverride};
