//! Zipped shapefile extraction.

use crate::error::{Error, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A zip archive extracted into a scratch directory.
///
/// The directory and everything in it is removed when this value is dropped.
#[derive(Debug)]
pub struct ExtractedArchive {
    dir: TempDir,
    files: Vec<PathBuf>,
}

impl ExtractedArchive {
    /// Extract `path` into a fresh temporary directory.
    pub fn extract<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| Error::Archive(format!("cannot open {}: {}", path.display(), e)))?;
        let mut zip = zip::ZipArchive::new(file)?;

        let dir = tempfile::Builder::new().prefix("fieldzones-").tempdir()?;
        zip.extract(dir.path())?;

        let mut files = Vec::new();
        collect_files(dir.path(), &mut files)?;
        // Stable order independent of archive layout.
        files.sort_by_key(|p| relative_key(dir.path(), p));

        tracing::debug!(
            "Extracted {} file(s) from {} into {}",
            files.len(),
            path.display(),
            dir.path().display()
        );
        Ok(Self { dir, files })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Extracted regular files, sorted by lowercase relative path
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// The first `.shp` file by sorted name, searched recursively
    pub fn first_shapefile(&self) -> Option<&Path> {
        self.files
            .iter()
            .find(|p| has_extension(p, "shp"))
            .map(PathBuf::as_path)
    }
}

/// The `.prj` next to a `.shp` (same stem, any extension case).
pub fn sibling_prj(shp: &Path) -> Option<PathBuf> {
    let stem = shp.file_stem()?.to_string_lossy().to_lowercase();
    let parent = shp.parent()?;
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(parent)
        .ok()?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            has_extension(p, "prj")
                && p.file_stem()
                    .is_some_and(|s| s.to_string_lossy().to_lowercase() == stem)
        })
        .collect();
    candidates.sort();
    candidates.into_iter().next()
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .is_some_and(|e| e.to_string_lossy().eq_ignore_ascii_case(ext))
}

fn relative_key(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .to_lowercase()
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else if path.is_file() {
            out.push(path);
        }
    }
    Ok(())
}
