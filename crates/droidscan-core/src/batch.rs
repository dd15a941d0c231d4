//! Batch encoding orchestrator with progress tracking.
//!
//! APKs are independent units of work: no shared state, no ordering
//! requirement. The batch runner fans the work list out over a rayon
//! pool and isolates failures per APK, so one unreadable archive never
//! aborts its siblings.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use rayon::prelude::*;
use walkdir::WalkDir;

use crate::dataset::sha256_file;
use crate::encode::{color_image_path, encode_apk, COLOR_SUFFIX};
use crate::report::EncodeOutcome;

/// Configuration for a batch encode run.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Files or directories to encode.
    pub target_paths: Vec<PathBuf>,
    /// Destination directory; `None` writes next to each APK.
    pub out_dir: Option<PathBuf>,
    /// Name outputs by the SHA-256 of the APK contents instead of the
    /// file stem (the layout the training pipeline consumes).
    pub by_hash: bool,
    /// Also write per-section grayscale PNGs for debugging.
    pub write_sections: bool,
}

/// Atomic progress tracking — safe to poll from another thread.
pub struct BatchProgress {
    pub total_apks: AtomicUsize,
    pub encoded: AtomicUsize,
    pub failed: AtomicUsize,
    pub cancel: AtomicBool,
}

impl BatchProgress {
    pub fn new() -> Self {
        Self {
            total_apks: AtomicUsize::new(0),
            encoded: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            cancel: AtomicBool::new(false),
        }
    }
}

impl Default for BatchProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Collect APK paths from the given paths, expanding directories.
pub fn collect_apks(paths: &[PathBuf]) -> Vec<PathBuf> {
    let is_apk = |p: &PathBuf| {
        p.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("apk"))
    };

    let mut apks = Vec::new();
    for path in paths {
        if path.is_file() {
            // Explicitly named files are taken as-is, whatever the suffix.
            apks.push(path.clone());
        } else if path.is_dir() {
            for entry in WalkDir::new(path).follow_links(false).into_iter().flatten() {
                let p = entry.into_path();
                if p.is_file() && is_apk(&p) {
                    apks.push(p);
                }
            }
        }
    }
    apks
}

/// Encode one APK to disk and return the composite path.
fn encode_one(apk: &PathBuf, config: &BatchConfig) -> Result<PathBuf> {
    let image = encode_apk(apk)?;

    let dest = if config.by_hash {
        let stem = sha256_file(apk)?;
        let dir = config
            .out_dir
            .clone()
            .or_else(|| apk.parent().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("."));
        dir.join(format!("{stem}{COLOR_SUFFIX}"))
    } else {
        color_image_path(apk, config.out_dir.as_deref())
    };

    image.save(&dest)?;

    if config.write_sections {
        let stem = crate::encode::apk_stem(&dest);
        let dir = dest.parent().unwrap_or_else(|| std::path::Path::new("."));
        image.save_sections(dir, &stem)?;
    }

    Ok(dest)
}

/// Run a full batch encode with progress tracking. Blocking — call from
/// a background thread if a front-end needs to stay responsive.
pub fn run_batch(config: &BatchConfig, progress: &Arc<BatchProgress>) -> Result<Vec<EncodeOutcome>> {
    if let Some(dir) = &config.out_dir {
        std::fs::create_dir_all(dir)?;
    }

    let apks = collect_apks(&config.target_paths);
    progress.total_apks.store(apks.len(), Ordering::Relaxed);

    if apks.is_empty() {
        return Ok(Vec::new());
    }

    let results: Vec<EncodeOutcome> = apks
        .par_iter()
        .filter_map(|apk| {
            if progress.cancel.load(Ordering::Relaxed) {
                return None;
            }

            let outcome = match encode_one(apk, config) {
                Ok(dest) => {
                    progress.encoded.fetch_add(1, Ordering::Relaxed);
                    EncodeOutcome {
                        apk: apk.clone(),
                        image: Some(dest),
                        error: None,
                    }
                }
                Err(e) => {
                    progress.failed.fetch_add(1, Ordering::Relaxed);
                    log::warn!("failed to encode {}: {e:#}", apk.display());
                    EncodeOutcome {
                        apk: apk.clone(),
                        image: None,
                        error: Some(format!("{e:#}")),
                    }
                }
            };
            Some(outcome)
        })
        .collect();

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apk::tests::write_test_zip;

    fn valid_members() -> Vec<(&'static str, &'static [u8])> {
        vec![
            ("classes.dex", b"\x01\x02\x03\x04".as_slice()),
            ("AndroidManifest.xml", b"\x42\x42".as_slice()),
        ]
    }

    #[test]
    fn collect_filters_directories_to_apks() {
        let dir = tempfile::tempdir().unwrap();
        write_test_zip(&dir.path().join("a.apk"), &valid_members());
        write_test_zip(&dir.path().join("b.APK"), &valid_members());
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let mut found = collect_apks(&[dir.path().to_path_buf()]);
        found.sort();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.apk", "b.APK"]);
    }

    #[test]
    fn batch_isolates_per_apk_failures() {
        let in_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();

        write_test_zip(&in_dir.path().join("good.apk"), &valid_members());
        std::fs::write(in_dir.path().join("broken.apk"), b"not a zip").unwrap();
        // Valid archive, but the required dex section is missing.
        write_test_zip(
            &in_dir.path().join("nodex.apk"),
            &[("AndroidManifest.xml", b"\x42".as_slice())],
        );

        let config = BatchConfig {
            target_paths: vec![in_dir.path().to_path_buf()],
            out_dir: Some(out_dir.path().to_path_buf()),
            by_hash: false,
            write_sections: false,
        };
        let progress = Arc::new(BatchProgress::new());
        let results = run_batch(&config, &progress).unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(progress.total_apks.load(Ordering::Relaxed), 3);
        assert_eq!(progress.encoded.load(Ordering::Relaxed), 1);
        assert_eq!(progress.failed.load(Ordering::Relaxed), 2);

        assert!(out_dir.path().join("good.color.png").exists());
        // Failures leave no partial outputs behind.
        assert!(!out_dir.path().join("broken.color.png").exists());
        assert!(!out_dir.path().join("nodex.color.png").exists());
    }

    #[test]
    fn by_hash_names_output_from_contents() {
        let in_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let apk = in_dir.path().join("sample.apk");
        write_test_zip(&apk, &valid_members());

        let config = BatchConfig {
            target_paths: vec![apk.clone()],
            out_dir: Some(out_dir.path().to_path_buf()),
            by_hash: true,
            write_sections: false,
        };
        let progress = Arc::new(BatchProgress::new());
        let results = run_batch(&config, &progress).unwrap();

        let expected = out_dir
            .path()
            .join(format!("{}{COLOR_SUFFIX}", sha256_file(&apk).unwrap()));
        assert_eq!(results[0].image.as_deref(), Some(expected.as_path()));
        assert!(expected.exists());
    }

    #[test]
    fn write_sections_emits_debug_pngs() {
        let in_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        write_test_zip(&in_dir.path().join("s.apk"), &valid_members());

        let config = BatchConfig {
            target_paths: vec![in_dir.path().to_path_buf()],
            out_dir: Some(out_dir.path().to_path_buf()),
            by_hash: false,
            write_sections: true,
        };
        let progress = Arc::new(BatchProgress::new());
        run_batch(&config, &progress).unwrap();

        assert!(out_dir.path().join("s.color.png").exists());
        assert!(out_dir.path().join("s.dex.png").exists());
        assert!(out_dir.path().join("s.xml.png").exists());
    }

    #[test]
    fn empty_work_list_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let config = BatchConfig {
            target_paths: vec![dir.path().to_path_buf()],
            out_dir: None,
            by_hash: false,
            write_sections: false,
        };
        let progress = Arc::new(BatchProgress::new());
        let results = run_batch(&config, &progress).unwrap();
        assert!(results.is_empty());
    }
}
