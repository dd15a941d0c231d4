//! droidscan-core — shared library for image-based Android malware detection.
//!
//! Provides APK section extraction, composite image encoding, batch
//! orchestration, dataset bookkeeping, ONNX inference, and result
//! reporting used by the CLI frontend.

pub mod apk;
pub mod batch;
pub mod dataset;
pub mod encode;
pub mod error;
pub mod inference;
pub mod report;
