//! Error taxonomy for the encoding pipeline.
//!
//! Every variant is fatal for the APK being encoded. A missing `.so`
//! section is deliberately not represented here: it is an expected case
//! (goodware without native code) and is handled by the zero-image
//! fallback in `encode`, not by error propagation.

use std::io;

use thiserror::Error;

use crate::apk::SectionKind;

#[derive(Debug, Error)]
pub enum EncodeError {
    /// The input is not a readable ZIP archive.
    #[error("container parse failure: {0}")]
    Container(#[from] zip::result::ZipError),

    /// A section that every APK is expected to carry came back empty.
    #[error("required {0} section is empty")]
    MissingSection(SectionKind),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("PNG encoding failed: {0}")]
    Png(#[from] image::ImageError),
}
