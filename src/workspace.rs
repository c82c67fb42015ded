//! Per (variant, archive) extraction workspaces.
//!
//! Each workspace is its own temporary directory. Dropping it removes the
//! directory, so every exit path (success, error, cancelled future) cleans up.

use crate::archive::Archive;
use crate::error::ArchiveError;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use walkdir::WalkDir;

const DOCUMENT_EXTENSIONS: &[&str] = &["html", "htm"];

pub struct Workspace {
    dir: TempDir,
    pub variant: u32,
    pub archive_index: usize,
    pub archive_name: String,
    archive_stem: String,
}

impl Workspace {
    /// Extract `archive` into a fresh directory below `base`.
    pub fn materialize(
        base: &Path,
        variant: u32,
        archive_index: usize,
        archive: &Archive,
        max_bytes: u64,
    ) -> Result<Self, ArchiveError> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("v{}-a{}-", variant, archive_index + 1))
            .tempdir_in(base)
            .map_err(|e| ArchiveError::io("workspace.create", base, e))?;
        archive.extract_into(dir.path(), max_bytes)?;

        Ok(Self {
            dir,
            variant,
            archive_index,
            archive_name: archive.file_name.clone(),
            archive_stem: archive.stem(),
        })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Path prefix identifying this workspace inside a combined package.
    pub fn combined_prefix(&self) -> String {
        format!("variant_{}/{}", self.variant, self.archive_label())
    }

    /// `01_site`-style label; the index keeps equal file names apart.
    pub fn archive_label(&self) -> String {
        format!("{:02}_{}", self.archive_index + 1, self.archive_stem)
    }

    /// Text documents in the workspace, sorted by path.
    pub fn documents(&self) -> Vec<PathBuf> {
        WalkDir::new(self.root())
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file() && is_document(entry.path()))
            .map(|entry| entry.into_path())
            .collect()
    }

    /// Path relative to the workspace root, for messages.
    pub fn relative<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(self.root()).unwrap_or(path)
    }
}

fn is_document(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| DOCUMENT_EXTENSIONS.iter().any(|d| ext.eq_ignore_ascii_case(d)))
        .unwrap_or(false)
}
