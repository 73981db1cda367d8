//! Writing output documents into the output directory.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::serialize::{OutputDocument, OutputFormat};
use crate::types::SourceName;

/// Destination of rendered documents.
pub trait OutputWriter {
    /// Persist `document` for `source`, returning where it went.
    fn write(&self, source: SourceName, document: &OutputDocument) -> Result<PathBuf>;
}

/// Writes `<source>_authority<ext>` files into one directory.
#[derive(Debug, Clone)]
pub struct FileOutputWriter {
    dir: PathBuf,
}

impl FileOutputWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File name of the document for `source` in `format`.
    ///
    /// # Examples
    /// ```
    /// use authority_harvester::output::FileOutputWriter;
    /// use authority_harvester::serialize::OutputFormat;
    /// use authority_harvester::types::SourceName;
    ///
    /// assert_eq!(
    ///     FileOutputWriter::file_name(SourceName::Thesauri, OutputFormat::MarcXml),
    ///     "thesauri_authority.marcxml"
    /// );
    /// ```
    #[must_use]
    pub fn file_name(source: SourceName, format: OutputFormat) -> String {
        format!("{source}_authority{}", format.extension())
    }

    #[must_use]
    pub fn path_for(&self, source: SourceName, format: OutputFormat) -> PathBuf {
        self.dir.join(Self::file_name(source, format))
    }
}

impl OutputWriter for FileOutputWriter {
    fn write(&self, source: SourceName, document: &OutputDocument) -> Result<PathBuf> {
        let path = self.path_for(source, document.format);
        write_atomic(&path, &document.bytes)?;
        tracing::info!(
            path = %path.display(),
            records = document.record_count,
            bytes = document.bytes.len(),
            "Output written"
        );
        Ok(path)
    }
}

/// Replace `path` with `bytes` so readers never see a partial file.
///
/// Writes a hidden temp file next to the target, syncs it, then renames.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_file = dir.join(format!(".{file_name}.tmp"));

    // Write to temp file first, then sync and rename for atomicity
    {
        let mut file = File::create(&temp_file)?;
        file.write_all(bytes)?;
        file.sync_all()?; // Ensure data is flushed to disk
    }

    // On Windows, rename fails if the destination already exists
    #[cfg(target_os = "windows")]
    if path.exists() {
        fs::remove_file(path)?;
    }

    fs::rename(&temp_file, path)?;
    sync_dir(dir)
}

/// Persist directory entries (the rename) on filesystems that need it.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_document() {
        let temp_dir = tempdir().unwrap();
        let writer = FileOutputWriter::new(temp_dir.path().join("2024-05-01"));
        let document = OutputDocument {
            format: OutputFormat::Marc,
            record_count: 0,
            bytes: b"abc".to_vec(),
        };

        let path = writer.write(SourceName::Gazetteer, &document).unwrap();
        assert!(path.ends_with("2024-05-01/gazetteer_authority.mrc"));
        assert_eq!(fs::read(&path).unwrap(), b"abc");
        assert!(!temp_dir
            .path()
            .join("2024-05-01/.gazetteer_authority.mrc.tmp")
            .exists());
    }

    #[test]
    fn test_write_atomic_replaces() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("out.bin");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"second");
    }

    #[test]
    fn test_sync_dir() {
        let temp_dir = tempdir().unwrap();
        sync_dir(temp_dir.path()).unwrap();
        #[cfg(unix)]
        assert!(sync_dir(&temp_dir.path().join("missing")).is_err());
    }
}
