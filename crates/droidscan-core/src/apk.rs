//! APK container access and section extraction.
//!
//! An APK is a ZIP archive; the pipeline only needs two capabilities
//! from it: the member listing and raw member bytes. Those are modeled
//! by the [`ApkContainer`] trait so extraction logic can be exercised
//! against an in-memory container without a real archive on disk.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::EncodeError;

/// One of the three member-file categories encoded as an image channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKind {
    Dex,
    So,
    Xml,
}

impl SectionKind {
    /// All sections, in channel order (dex = R, so = G, xml = B).
    pub const ALL: [SectionKind; 3] = [SectionKind::Dex, SectionKind::So, SectionKind::Xml];

    pub fn extension(self) -> &'static str {
        match self {
            SectionKind::Dex => ".dex",
            SectionKind::So => ".so",
            SectionKind::Xml => ".xml",
        }
    }

    /// Case-sensitive suffix match on the full member path.
    ///
    /// This is a suffix match, not a per-component extension match: a
    /// member `dir.dex/weird.so` belongs to the `.so` section only.
    pub fn matches(self, member: &str) -> bool {
        member.ends_with(self.extension())
    }

    /// `.dex` and `.xml` are expected in every APK; `.so` is optional.
    pub fn is_required(self) -> bool {
        !matches!(self, SectionKind::So)
    }

    /// Channel index in the composite image.
    pub fn channel(self) -> usize {
        match self {
            SectionKind::Dex => 0,
            SectionKind::So => 1,
            SectionKind::Xml => 2,
        }
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SectionKind::Dex => "dex",
            SectionKind::So => "so",
            SectionKind::Xml => "xml",
        })
    }
}

/// Capability view of an APK archive: a member listing and member reads.
pub trait ApkContainer {
    /// Member paths in the archive's own listing order.
    fn member_names(&self) -> &[String];

    /// Raw bytes of one member.
    fn read_member(&mut self, name: &str) -> Result<Vec<u8>, EncodeError>;
}

/// Extraction result for one section.
///
/// A section with no matching members is an expected situation, not an
/// error; the encoder pattern-matches on the tag instead of catching
/// exceptions for the common no-native-code case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionStream {
    Present(Vec<u8>),
    Absent,
}

impl SectionStream {
    pub fn len(&self) -> usize {
        match self {
            SectionStream::Present(bytes) => bytes.len(),
            SectionStream::Absent => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Concatenate the bytes of every member matching `kind`, in the
/// container's listing order. No deduplication, no re-sorting.
pub fn extract_section<C: ApkContainer>(
    container: &mut C,
    kind: SectionKind,
) -> Result<SectionStream, EncodeError> {
    let matching: Vec<String> = container
        .member_names()
        .iter()
        .filter(|name| kind.matches(name))
        .cloned()
        .collect();

    let mut stream = Vec::new();
    for name in &matching {
        stream.extend_from_slice(&container.read_member(name)?);
    }

    if stream.is_empty() {
        Ok(SectionStream::Absent)
    } else {
        Ok(SectionStream::Present(stream))
    }
}

/// A real APK archive on disk, backed by the `zip` crate.
#[derive(Debug)]
pub struct ApkFile {
    archive: zip::ZipArchive<File>,
    names: Vec<String>,
}

impl ApkFile {
    /// Open and parse the archive. Parse failures propagate; they are
    /// fatal for this APK.
    pub fn open(path: &Path) -> Result<Self, EncodeError> {
        let file = File::open(path)?;
        let mut archive = zip::ZipArchive::new(file)?;

        // by_index preserves the archive's listing order; the name map
        // the crate keeps internally does not.
        let mut names = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            names.push(archive.by_index(i)?.name().to_owned());
        }

        Ok(Self { archive, names })
    }
}

impl ApkContainer for ApkFile {
    fn member_names(&self) -> &[String] {
        &self.names
    }

    fn read_member(&mut self, name: &str) -> Result<Vec<u8>, EncodeError> {
        let mut member = self.archive.by_name(name)?;
        let mut bytes = Vec::with_capacity(member.size() as usize);
        member.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    /// In-memory container for exercising extraction without an archive.
    pub(crate) struct MemContainer {
        names: Vec<String>,
        members: HashMap<String, Vec<u8>>,
    }

    impl MemContainer {
        pub(crate) fn new(members: &[(&str, &[u8])]) -> Self {
            Self {
                names: members.iter().map(|(n, _)| (*n).to_owned()).collect(),
                members: members
                    .iter()
                    .map(|(n, b)| ((*n).to_owned(), b.to_vec()))
                    .collect(),
            }
        }
    }

    impl ApkContainer for MemContainer {
        fn member_names(&self) -> &[String] {
            &self.names
        }

        fn read_member(&mut self, name: &str) -> Result<Vec<u8>, EncodeError> {
            Ok(self.members[name].clone())
        }
    }

    /// Write a stored (uncompressed) zip with the given members, in order.
    pub(crate) fn write_test_zip(path: &Path, members: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::FileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        for (name, bytes) in members {
            writer.start_file(*name, options).unwrap();
            writer.write_all(bytes).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn concatenates_in_listing_order() {
        // Listing order is not alphabetical and not size order.
        let mut apk = MemContainer::new(&[
            ("classes2.dex", b"BBBB"),
            ("classes.dex", b"AA"),
            ("res/layout/main.xml", b"x"),
        ]);

        let stream = extract_section(&mut apk, SectionKind::Dex).unwrap();
        assert_eq!(stream, SectionStream::Present(b"BBBBAA".to_vec()));
    }

    #[test]
    fn no_matching_members_is_absent_not_error() {
        let mut apk = MemContainer::new(&[("classes.dex", b"AA".as_slice())]);
        let stream = extract_section(&mut apk, SectionKind::So).unwrap();
        assert_eq!(stream, SectionStream::Absent);
        assert!(stream.is_empty());
    }

    #[test]
    fn suffix_match_is_path_wide_and_case_sensitive() {
        assert!(SectionKind::So.matches("lib/arm64-v8a/libfoo.so"));
        assert!(SectionKind::So.matches("dir.dex/weird.so"));
        assert!(!SectionKind::Dex.matches("dir.dex/weird.so"));
        assert!(!SectionKind::Dex.matches("classes.DEX"));
        assert!(SectionKind::Xml.matches("AndroidManifest.xml"));
    }

    #[test]
    fn zip_backed_container_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.apk");
        write_test_zip(
            &path,
            &[
                ("zz.dex", b"22"),
                ("aa.dex", b"11"),
                ("AndroidManifest.xml", b"<m/>"),
            ],
        );

        let mut apk = ApkFile::open(&path).unwrap();
        assert_eq!(apk.member_names(), &["zz.dex", "aa.dex", "AndroidManifest.xml"]);

        let stream = extract_section(&mut apk, SectionKind::Dex).unwrap();
        assert_eq!(stream, SectionStream::Present(b"2211".to_vec()));
    }

    #[test]
    fn unparseable_archive_is_a_container_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.apk");
        std::fs::write(&path, b"this is not a zip archive").unwrap();

        let err = ApkFile::open(&path).unwrap_err();
        assert!(matches!(err, EncodeError::Container(_)));
    }
}
