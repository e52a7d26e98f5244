use std::path::PathBuf;

use thiserror::Error;

/// Reasons a photo could not be turned into a working buffer.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("image dimensions are zero: {0}")]
    ZeroDimensions(PathBuf),
}
