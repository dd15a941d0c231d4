//! Dataset bookkeeping for the training pipeline.
//!
//! The downstream consumer expects, for every sample, a file named
//! `<hash>.color.png` under an images root, plus pre-partitioned
//! plain-text split lists (one hash per line) under `data_splits/`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::encode::COLOR_SUFFIX;

/// Directory of split lists, relative to the images root.
pub const SPLIT_DIR: &str = "data_splits";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Valid,
    Test,
}

impl Split {
    /// Split-list file name for one evaluation round, e.g. `test3.txt`.
    pub fn file_name(self, round: u32) -> String {
        let prefix = match self {
            Split::Train => "train",
            Split::Valid => "valid",
            Split::Test => "test",
        };
        format!("{prefix}{round}.txt")
    }
}

impl std::str::FromStr for Split {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "train" => Ok(Split::Train),
            "valid" => Ok(Split::Valid),
            "test" => Ok(Split::Test),
            _ => Err(format!("unknown split: {s}. Use 'train', 'valid' or 'test'.")),
        }
    }
}

/// Binary class label. Samples under a `goodware` directory are class 0,
/// everything else is class 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Goodware,
    Malware,
}

impl Label {
    /// Label from the sample's parent directory component.
    pub fn from_path(path: &Path) -> Label {
        let parent = path
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned());
        match parent.as_deref() {
            Some("goodware") => Label::Goodware,
            _ => Label::Malware,
        }
    }

    pub fn is_malware(self) -> bool {
        matches!(self, Label::Malware)
    }
}

/// Read one split list: sample hashes, one per line, blank lines skipped.
pub fn load_split(images_root: &Path, split: Split, round: u32) -> Result<Vec<String>> {
    let path = images_root.join(SPLIT_DIR).join(split.file_name(round));
    let contents = fs::read_to_string(&path)
        .with_context(|| format!("cannot read split list {}", path.display()))?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect())
}

/// Composite image path for one sample hash. Hashes may carry a
/// relative prefix (`goodware/<hash>`), which is preserved.
pub fn image_path(images_root: &Path, hash: &str) -> PathBuf {
    images_root.join(format!("{hash}{COLOR_SUFFIX}"))
}

/// SHA-256 of a file's contents, lowercase hex. Dataset samples are
/// named by this digest.
pub fn sha256_file(path: &Path) -> Result<String> {
    use sha2::{Digest, Sha256};

    let data = fs::read(path).with_context(|| format!("Cannot read {}", path.display()))?;
    let hash = Sha256::digest(&data);
    Ok(format!("{:x}", hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn split_file_names_follow_round_numbering() {
        assert_eq!(Split::Train.file_name(1), "train1.txt");
        assert_eq!(Split::Valid.file_name(7), "valid7.txt");
        assert_eq!(Split::Test.file_name(10), "test10.txt");
    }

    #[test]
    fn load_split_skips_blank_lines() {
        let root = tempfile::tempdir().unwrap();
        let splits = root.path().join(SPLIT_DIR);
        std::fs::create_dir(&splits).unwrap();
        std::fs::write(splits.join("test1.txt"), "abc123\n\n  \ndef456\n").unwrap();

        let hashes = load_split(root.path(), Split::Test, 1).unwrap();
        assert_eq!(hashes, vec!["abc123", "def456"]);
    }

    #[test]
    fn load_split_missing_file_names_the_path() {
        let root = tempfile::tempdir().unwrap();
        let err = load_split(root.path(), Split::Train, 3).unwrap_err();
        assert!(format!("{err:#}").contains("train3.txt"));
    }

    #[test]
    fn image_path_appends_color_suffix() {
        let root = Path::new("/data/images");
        assert_eq!(
            image_path(root, "abc123"),
            Path::new("/data/images/abc123.color.png")
        );
        assert_eq!(
            image_path(root, "goodware/abc123"),
            Path::new("/data/images/goodware/abc123.color.png")
        );
    }

    #[test]
    fn label_from_parent_directory() {
        assert_eq!(
            Label::from_path(Path::new("/x/goodware/a.color.png")),
            Label::Goodware
        );
        assert_eq!(
            Label::from_path(Path::new("/x/malware/a.color.png")),
            Label::Malware
        );
        // Anything not explicitly goodware counts as malware.
        assert_eq!(
            Label::from_path(Path::new("/x/other/a.color.png")),
            Label::Malware
        );
    }

    #[test]
    fn sha256_file_known_content() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"hello world").unwrap();
        tmp.flush().unwrap();

        let hash = sha256_file(tmp.path()).unwrap();
        // SHA-256 of "hello world"
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn sha256_file_not_found() {
        let result = sha256_file(Path::new("/nonexistent/file"));
        assert!(result.is_err());
    }
}
