//! Section-to-image encoding.
//!
//! Each section byte stream becomes a single-column grayscale image
//! (one byte per row), is resampled to a fixed 16384-row column with
//! two-tap bilinear interpolation, and the three columns are packed as
//! the channels of one RGB image:
//!
//! - channel 0: `.dex`
//! - channel 1: `.so`, or all zeros when the APK has no native code
//! - channel 2: `.xml`
//!
//! The whole transform is deterministic: the same APK bytes always
//! produce a bit-identical composite.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use image::{GrayImage, Luma, Rgb, RgbImage};
use ndarray::{s, Array3};

use crate::apk::{extract_section, ApkContainer, ApkFile, SectionKind, SectionStream};
use crate::error::EncodeError;

/// Side length the byte stream is normalized against; the resampled
/// column has `IMG_SIZE * IMG_SIZE` rows.
pub const IMG_SIZE: usize = 128;

/// Row count of every resampled section column.
pub const RESAMPLED_ROWS: usize = IMG_SIZE * IMG_SIZE;

/// File-name suffix of the composite output.
pub const COLOR_SUFFIX: &str = ".color.png";

/// Resample a single-column byte image to `dst_rows` rows.
///
/// Standard two-tap linear interpolation along the row axis: each
/// output row maps to a center-aligned source coordinate, and its value
/// is the weighted average of the two nearest input rows. Border rows
/// clamp (no wraparound, no reflection). Output values are rounded and
/// clipped back to the 8-bit range.
///
/// Panics if `src` is empty: zero-length streams must be special-cased
/// by the caller before resampling.
pub fn resample_column(src: &[u8], dst_rows: usize) -> Vec<u8> {
    assert!(!src.is_empty(), "cannot resample an empty section stream");

    let scale = src.len() as f64 / dst_rows as f64;
    let max_coord = (src.len() - 1) as f64;

    let mut out = Vec::with_capacity(dst_rows);
    for row in 0..dst_rows {
        let center = ((row as f64 + 0.5) * scale - 0.5).clamp(0.0, max_coord);
        let lo = center.floor() as usize;
        let hi = (lo + 1).min(src.len() - 1);
        let frac = center - lo as f64;

        let value = src[lo] as f64 * (1.0 - frac) + src[hi] as f64 * frac;
        out.push(value.round().clamp(0.0, 255.0) as u8);
    }
    out
}

/// The finished 16384x1x3 composite for one APK.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeImage {
    data: Array3<u8>,
    so_present: bool,
}

impl CompositeImage {
    /// Pack three resampled columns into channel order (dex, so, xml).
    /// A `None` so-column gets the all-zero fallback at the canonical
    /// shape; the other two channels are mandatory.
    pub fn from_channels(dex: Vec<u8>, so: Option<Vec<u8>>, xml: Vec<u8>) -> Self {
        let so_present = so.is_some();
        let so = so.unwrap_or_else(|| vec![0u8; RESAMPLED_ROWS]);
        assert_eq!(dex.len(), RESAMPLED_ROWS);
        assert_eq!(so.len(), RESAMPLED_ROWS);
        assert_eq!(xml.len(), RESAMPLED_ROWS);

        let mut data = Array3::zeros((RESAMPLED_ROWS, 1, 3));
        for row in 0..RESAMPLED_ROWS {
            data[[row, 0, 0]] = dex[row];
            data[[row, 0, 1]] = so[row];
            data[[row, 0, 2]] = xml[row];
        }
        Self { data, so_present }
    }

    pub fn data(&self) -> &Array3<u8> {
        &self.data
    }

    /// Whether the green channel carries real `.so` bytes or the zero
    /// fallback.
    pub fn so_present(&self) -> bool {
        self.so_present
    }

    /// One channel as a flat column.
    pub fn channel(&self, kind: SectionKind) -> Vec<u8> {
        self.data.slice(s![.., 0, kind.channel()]).to_vec()
    }

    /// Render as a 1-pixel-wide RGB image (width 1, height 16384).
    pub fn to_rgb_image(&self) -> RgbImage {
        RgbImage::from_fn(1, RESAMPLED_ROWS as u32, |_x, y| {
            let row = y as usize;
            Rgb([
                self.data[[row, 0, 0]],
                self.data[[row, 0, 1]],
                self.data[[row, 0, 2]],
            ])
        })
    }

    /// Write the composite PNG. The write is all-or-nothing: the PNG is
    /// encoded in memory, written to a temporary file next to the
    /// destination, and renamed into place, so a failure never leaves a
    /// partial output behind.
    pub fn save(&self, path: &Path) -> Result<(), EncodeError> {
        let mut png = Vec::new();
        self.to_rgb_image()
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)?;

        let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
        let mut tmp = tempfile::NamedTempFile::new_in(dir.unwrap_or(Path::new(".")))?;
        tmp.write_all(&png)?;
        tmp.persist(path).map_err(|e| EncodeError::Io(e.error))?;
        Ok(())
    }

    /// Write per-section grayscale PNGs (`<stem>.dex.png` etc.) for
    /// debugging. The `.so` image is skipped when the channel is the
    /// zero fallback. Returns the paths written.
    pub fn save_sections(&self, dir: &Path, stem: &str) -> Result<Vec<PathBuf>, EncodeError> {
        let mut written = Vec::new();
        for kind in SectionKind::ALL {
            if kind == SectionKind::So && !self.so_present {
                continue;
            }
            let column = self.channel(kind);
            let gray = GrayImage::from_fn(1, RESAMPLED_ROWS as u32, |_x, y| {
                Luma([column[y as usize]])
            });
            let path = dir.join(format!("{stem}{}.png", kind.extension()));
            gray.save(&path)?;
            written.push(path);
        }
        Ok(written)
    }
}

/// Extract and resample one required section. An empty stream is fatal:
/// `.dex` and `.xml` are assumed present in every valid APK, and a
/// degenerate image must not be produced silently for them.
fn required_channel<C: ApkContainer>(
    container: &mut C,
    kind: SectionKind,
) -> Result<Vec<u8>, EncodeError> {
    debug_assert!(kind.is_required());
    match extract_section(container, kind)? {
        SectionStream::Present(bytes) => Ok(resample_column(&bytes, RESAMPLED_ROWS)),
        SectionStream::Absent => Err(EncodeError::MissingSection(kind)),
    }
}

/// Extract and resample the optional `.so` section. Absence and
/// extraction failure both collapse into the zero-image fallback.
fn optional_channel<C: ApkContainer>(container: &mut C) -> Option<Vec<u8>> {
    match extract_section(container, SectionKind::So) {
        Ok(SectionStream::Present(bytes)) => Some(resample_column(&bytes, RESAMPLED_ROWS)),
        Ok(SectionStream::Absent) => None,
        Err(err) => {
            log::debug!("so extraction failed, using zero fallback: {err}");
            None
        }
    }
}

/// Encode one opened container into its composite image.
pub fn encode_container<C: ApkContainer>(container: &mut C) -> Result<CompositeImage, EncodeError> {
    let dex = required_channel(container, SectionKind::Dex)?;
    let xml = required_channel(container, SectionKind::Xml)?;
    let so = optional_channel(container);
    Ok(CompositeImage::from_channels(dex, so, xml))
}

/// Encode one APK file into its composite image.
pub fn encode_apk(path: &Path) -> Result<CompositeImage, EncodeError> {
    let mut apk = ApkFile::open(path)?;
    encode_container(&mut apk)
}

/// Base name of an APK: the file name up to the first `.`. Dataset
/// samples are hash-named, so this strips exactly the `.apk` suffix.
pub fn apk_stem(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.split_once('.') {
        Some((stem, _)) => stem.to_owned(),
        None => name,
    }
}

/// Destination of the composite for `apk_path`: `<stem>.color.png` in
/// `out_dir`, or next to the APK when no output directory is given.
pub fn color_image_path(apk_path: &Path, out_dir: Option<&Path>) -> PathBuf {
    let file = format!("{}{COLOR_SUFFIX}", apk_stem(apk_path));
    match out_dir {
        Some(dir) => dir.join(file),
        None => apk_path.with_file_name(file),
    }
}
