// Error type for the fallible edges of the crate (files, geometry strings, window).
// The difference engine itself never fails: "not ready" is an empty result, not an error.
// Every variant states *where* things went wrong.
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Reading a raw YUV or image file failed
    #[error("Source open error ({path}): {source}")]
    SourceOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Decoding/encoding a still image failed
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Frame data could not be sliced into frames of the requested geometry
    #[error("Source format error: {0}")]
    SourceFormat(String),

    /// A `WxH` size or similar geometry string did not parse
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    /// A coding order name that is not implemented
    #[error("Unknown coding order: {0}")]
    UnknownCodingOrder(String),

    /// Creating the viewer window failed
    #[error("Window init error: {0}")]
    WindowInit(String),

    /// Updating the window buffer failed
    #[error("Window update error: {0}")]
    WindowUpdate(String),
}
