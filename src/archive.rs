//! Uploaded archives in, packaged archives out.

use crate::error::ArchiveError;
use std::fs::{self, File};
use std::io::{self, Cursor, Read, Write};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const EMPTY_ZIP_MAGIC: &[u8] = b"PK\x05\x06";
const RAR_MAGIC: &[u8] = b"Rar!\x1a\x07";

/// An uploaded site archive.
#[derive(Debug, Clone)]
pub struct Archive {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    Rar,
    Unknown,
}

impl Archive {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    /// File name without directories or extension, safe to use as a path segment.
    pub fn stem(&self) -> String {
        let stem = Path::new(&self.file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("site");
        let cleaned: String = stem
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        if cleaned.is_empty() {
            "site".to_string()
        } else {
            cleaned
        }
    }

    /// Format from the content's magic bytes, falling back to the extension.
    pub fn format(&self) -> ArchiveFormat {
        if self.bytes.starts_with(ZIP_MAGIC) || self.bytes.starts_with(EMPTY_ZIP_MAGIC) {
            return ArchiveFormat::Zip;
        }
        if self.bytes.starts_with(RAR_MAGIC) {
            return ArchiveFormat::Rar;
        }
        let extension = Path::new(&self.file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase);
        match extension.as_deref() {
            Some("zip") => ArchiveFormat::Zip,
            Some("rar") => ArchiveFormat::Rar,
            _ => ArchiveFormat::Unknown,
        }
    }

    /// Fail early for anything that cannot be extracted.
    pub fn ensure_supported(&self) -> Result<(), ArchiveError> {
        match self.format() {
            ArchiveFormat::Zip => Ok(()),
            ArchiveFormat::Rar => Err(ArchiveError::Unsupported {
                archive: self.file_name.clone(),
                format: "rar".to_string(),
            }),
            ArchiveFormat::Unknown => Err(ArchiveError::Unsupported {
                archive: self.file_name.clone(),
                format: "unknown".to_string(),
            }),
        }
    }

    /// Extract every entry below `target`. Returns the number of files written.
    ///
    /// Extraction stops with `ArchiveError::TooLarge` once the written bytes
    /// exceed `max_bytes`, whatever sizes the entry headers declare.
    pub fn extract_into(&self, target: &Path, max_bytes: u64) -> Result<usize, ArchiveError> {
        let mut archive = ZipArchive::new(Cursor::new(self.bytes.as_slice()))
            .map_err(|e| ArchiveError::zip("extract.decode", &self.file_name, e))?;
        let too_large = || ArchiveError::TooLarge {
            archive: self.file_name.clone(),
            limit: max_bytes,
        };
        let mut files = 0;
        let mut written: u64 = 0;

        for index in 0..archive.len() {
            let mut entry = archive
                .by_index(index)
                .map_err(|e| ArchiveError::zip("extract.read_entry", &self.file_name, e))?;
            let entry_path = self.sanitize_entry(entry.name())?;
            let destination = target.join(&entry_path);

            if entry.is_dir() {
                fs::create_dir_all(&destination)
                    .map_err(|e| ArchiveError::io("extract.create_dir", &destination, e))?;
                continue;
            }

            let remaining = max_bytes.saturating_sub(written);
            if entry.size() > remaining {
                return Err(too_large());
            }

            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| ArchiveError::io("extract.create_parent", parent, e))?;
            }

            let mut output = File::create(&destination)
                .map_err(|e| ArchiveError::io("extract.create_file", &destination, e))?;
            let copied = io::copy(&mut (&mut entry).take(remaining.saturating_add(1)), &mut output)
                .map_err(|e| ArchiveError::io("extract.copy", &destination, e))?;
            if copied > remaining {
                return Err(too_large());
            }
            written += copied;
            files += 1;
        }

        Ok(files)
    }

    /// Reject absolute paths and parent traversal.
    fn sanitize_entry(&self, entry: &str) -> Result<PathBuf, ArchiveError> {
        let unsafe_entry = || ArchiveError::UnsafeEntry {
            archive: self.file_name.clone(),
            entry: entry.to_string(),
        };

        let mut clean = PathBuf::new();
        for component in Path::new(entry).components() {
            match component {
                Component::Normal(part) => clean.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(unsafe_entry())
                }
            }
        }
        if clean.as_os_str().is_empty() {
            return Err(unsafe_entry());
        }
        Ok(clean)
    }
}

/// A packaged archive ready for download.
#[derive(Debug, Clone)]
pub struct OutputArtifact {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl OutputArtifact {
    /// Add one file at the archive root. The artifact is unchanged on error.
    pub fn append_entry(&mut self, name: &str, content: &[u8]) -> Result<(), ArchiveError> {
        let existing = ZipArchive::new(Cursor::new(self.bytes.as_slice()))
            .map_err(|e| ArchiveError::zip("artifact.open", &self.file_name, e))?;
        if existing.file_names().any(|entry| entry == name) {
            return Err(ArchiveError::DuplicateEntry {
                archive: self.file_name.clone(),
                entry: name.to_string(),
            });
        }

        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut writer = ZipWriter::new_append(Cursor::new(self.bytes.clone()))
            .map_err(|e| ArchiveError::zip("artifact.append", &self.file_name, e))?;
        writer
            .start_file(name, options)
            .map_err(|e| ArchiveError::zip("artifact.start_file", &self.file_name, e))?;
        writer
            .write_all(content)
            .map_err(|e| ArchiveError::io("artifact.write", name, e))?;
        let cursor = writer
            .finish()
            .map_err(|e| ArchiveError::zip("artifact.finish", &self.file_name, e))?;

        self.bytes = cursor.into_inner();
        Ok(())
    }
}

/// ZIP output assembled incrementally from workspace trees.
pub struct OutputPackage {
    file_name: String,
    writer: ZipWriter<Cursor<Vec<u8>>>,
}

impl OutputPackage {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            writer: ZipWriter::new(Cursor::new(Vec::new())),
        }
    }

    /// Add every file below `root` under `prefix` (empty prefix = archive root).
    ///
    /// Files are added in sorted order so identical trees give identical
    /// entry lists.
    pub fn append_tree(&mut self, prefix: &str, root: &Path) -> Result<usize, ArchiveError> {
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut added = 0;

        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                ArchiveError::io("package.walk", path, io::Error::new(io::ErrorKind::Other, e))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(root)
                .map_err(|e| ArchiveError::io("package.relative_path", entry.path(), io::Error::new(io::ErrorKind::Other, e)))?;
            let name = entry_name(prefix, relative);

            let bytes = fs::read(entry.path())
                .map_err(|e| ArchiveError::io("package.read", entry.path(), e))?;
            self.writer
                .start_file(name, options)
                .map_err(|e| ArchiveError::zip("package.start_file", &self.file_name, e))?;
            self.writer
                .write_all(&bytes)
                .map_err(|e| ArchiveError::io("package.write", entry.path(), e))?;
            added += 1;
        }

        Ok(added)
    }

    pub fn finish(mut self) -> Result<OutputArtifact, ArchiveError> {
        let cursor = self
            .writer
            .finish()
            .map_err(|e| ArchiveError::zip("package.finish", &self.file_name, e))?;
        Ok(OutputArtifact {
            file_name: self.file_name,
            bytes: cursor.into_inner(),
        })
    }
}

/// Forward-slash ZIP entry name for a relative path under a prefix.
fn entry_name(prefix: &str, relative: &Path) -> String {
    let relative = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/");
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        relative
    } else {
        format!("{}/{}", prefix, relative)
    }
}

/// Build an in-memory ZIP from `(name, content)` pairs.
pub fn zip_from_entries<'a, I, B>(entries: I) -> Result<Vec<u8>, ArchiveError>
where
    I: IntoIterator<Item = (&'a str, B)>,
    B: AsRef<[u8]>,
{
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, content) in entries {
        writer
            .start_file(name, options)
            .map_err(|e| ArchiveError::zip("zip.start_file", name, e))?;
        writer
            .write_all(content.as_ref())
            .map_err(|e| ArchiveError::io("zip.write", name, e))?;
    }
    let cursor = writer
        .finish()
        .map_err(|e| ArchiveError::zip("zip.finish", "in-memory", e))?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    const LIMIT: u64 = 1024 * 1024;

    fn read_entries(bytes: &[u8]) -> Vec<(String, String)> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        (0..archive.len())
            .map(|i| {
                let mut entry = archive.by_index(i).unwrap();
                let mut content = String::new();
                entry.read_to_string(&mut content).unwrap();
                (entry.name().to_string(), content)
            })
            .collect()
    }

    // ==================== Format Tests ====================

    #[test]
    fn test_format_from_magic_bytes() {
        let zip = zip_from_entries([("index.html", "<p>x</p>")]).unwrap();
        assert_eq!(Archive::new("upload.bin", zip).format(), ArchiveFormat::Zip);
        assert_eq!(
            Archive::new("upload.bin", b"Rar!\x1a\x07\x01\x00".to_vec()).format(),
            ArchiveFormat::Rar
        );
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(Archive::new("site.RAR", vec![1, 2, 3]).format(), ArchiveFormat::Rar);
        assert_eq!(Archive::new("site.txt", vec![1, 2, 3]).format(), ArchiveFormat::Unknown);
    }

    #[test]
    fn test_rar_is_unsupported() {
        let err = Archive::new("site.rar", vec![]).ensure_supported().unwrap_err();
        assert!(matches!(err, ArchiveError::Unsupported { ref format, .. } if format == "rar"));
    }

    #[test]
    fn test_stem_is_path_safe() {
        assert_eq!(Archive::new("my site (1).zip", vec![]).stem(), "my_site__1_");
        assert_eq!(Archive::new("../evil.zip", vec![]).stem(), "evil");
        assert_eq!(Archive::new(".zip", vec![]).stem(), "_zip");
    }

    // ==================== Extraction Tests ====================

    #[test]
    fn test_extract_nested_files() {
        let zip = zip_from_entries([
            ("index.html", "<h1>Home</h1>"),
            ("pages/about.html", "<h1>About</h1>"),
            ("css/site.css", "body{}"),
        ])
        .unwrap();
        let dir = tempfile::tempdir().unwrap();

        let files = Archive::new("site.zip", zip).extract_into(dir.path(), LIMIT).unwrap();

        assert_eq!(files, 3);
        assert_eq!(
            fs::read_to_string(dir.path().join("pages/about.html")).unwrap(),
            "<h1>About</h1>"
        );
    }

    #[test]
    fn test_extract_rejects_traversal() {
        let zip = zip_from_entries([("../outside.html", "<p>x</p>")]).unwrap();
        let dir = tempfile::tempdir().unwrap();

        let err = Archive::new("evil.zip", zip).extract_into(dir.path(), LIMIT).unwrap_err();
        assert!(matches!(err, ArchiveError::UnsafeEntry { .. }));
        assert!(!dir.path().parent().unwrap().join("outside.html").exists());
    }

    #[test]
    fn test_extract_corrupt_archive() {
        let dir = tempfile::tempdir().unwrap();
        let err = Archive::new("broken.zip", b"PK\x03\x04garbage".to_vec())
            .extract_into(dir.path(), LIMIT)
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Zip { .. }));
    }

    #[test]
    fn test_extract_stops_at_size_limit() {
        let zip = zip_from_entries([
            ("a.html", "x".repeat(600)),
            ("b.html", "y".repeat(600)),
        ])
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let archive = Archive::new("big.zip", zip);

        let err = archive.extract_into(dir.path(), 1000).unwrap_err();
        assert!(matches!(err, ArchiveError::TooLarge { limit: 1000, .. }));
        assert!(!dir.path().join("b.html").exists());

        let other = tempfile::tempdir().unwrap();
        assert_eq!(archive.extract_into(other.path(), 1200).unwrap(), 2);
    }

    #[test]
    fn test_extract_keeps_raw_bytes() {
        let latin1: &[u8] = b"<p>Caf\xe9 cr\xe8me</p>";
        let zip = zip_from_entries([("index.html", latin1)]).unwrap();
        let dir = tempfile::tempdir().unwrap();

        Archive::new("site.zip", zip).extract_into(dir.path(), LIMIT).unwrap();
        assert_eq!(fs::read(dir.path().join("index.html")).unwrap(), latin1);
    }

    // ==================== Packaging Tests ====================

    #[test]
    fn test_append_tree_with_prefix() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("pages")).unwrap();
        fs::write(dir.path().join("index.html"), "<h1>Home</h1>").unwrap();
        fs::write(dir.path().join("pages/about.html"), "<h1>About</h1>").unwrap();

        let mut package = OutputPackage::new("out.zip");
        assert_eq!(package.append_tree("variant_1/01_site/", dir.path()).unwrap(), 2);
        assert_eq!(package.append_tree("", dir.path()).unwrap(), 2);

        let artifact = package.finish().unwrap();
        assert_eq!(artifact.file_name, "out.zip");
        let names: Vec<String> = read_entries(&artifact.bytes).into_iter().map(|(n, _)| n).collect();
        assert_eq!(
            names,
            vec![
                "variant_1/01_site/index.html",
                "variant_1/01_site/pages/about.html",
                "index.html",
                "pages/about.html",
            ]
        );
    }

    #[test]
    fn test_round_trip_through_workspace() {
        let zip = zip_from_entries([("index.html", "<h1>Привіт</h1>")]).unwrap();
        let dir = tempfile::tempdir().unwrap();
        Archive::new("site.zip", zip).extract_into(dir.path(), LIMIT).unwrap();

        let mut package = OutputPackage::new("out.zip");
        package.append_tree("v1", dir.path()).unwrap();
        let entries = read_entries(&package.finish().unwrap().bytes);

        assert_eq!(entries, vec![("v1/index.html".to_string(), "<h1>Привіт</h1>".to_string())]);
    }

    #[test]
    fn test_append_entry_to_artifact() {
        let mut artifact = OutputArtifact {
            file_name: "out.zip".into(),
            bytes: zip_from_entries([("index.html", "<p>x</p>")]).unwrap(),
        };

        artifact.append_entry("rewrite_summary.json", b"{}").unwrap();
        assert_eq!(
            read_entries(&artifact.bytes),
            vec![
                ("index.html".to_string(), "<p>x</p>".to_string()),
                ("rewrite_summary.json".to_string(), "{}".to_string()),
            ]
        );

        let before = artifact.bytes.clone();
        let err = artifact.append_entry("index.html", b"<p>y</p>").unwrap_err();
        assert!(matches!(err, ArchiveError::DuplicateEntry { .. }));
        assert_eq!(artifact.bytes, before);
    }
}
