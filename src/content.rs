//! Host-side collaborators: where source bytes come from, where the text
//! goes, and where scratch files live.

use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

pub trait ContentReader {
    fn mimetype(&self) -> &str;
    /// Describes the content for log lines, e.g. a URL or path.
    fn describe(&self) -> String;
    /// Copies the content into `file`, replacing whatever is there.
    fn get_content(&self, file: &Path) -> io::Result<()>;
}

pub trait ContentWriter {
    fn mimetype(&self) -> &str;
    /// Takes the content of `file` as the produced artifact.
    fn put_content(&mut self, file: &Path) -> io::Result<()>;
}

/// Reads content from a file already on disk.
#[derive(Debug, Clone)]
pub struct FileReader {
    path: PathBuf,
    mimetype: String,
}

impl FileReader {
    pub fn new(path: impl Into<PathBuf>, mimetype: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mimetype: mimetype.into(),
        }
    }
}

impl ContentReader for FileReader {
    fn mimetype(&self) -> &str {
        &self.mimetype
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn get_content(&self, file: &Path) -> io::Result<()> {
        std::fs::copy(&self.path, file)?;
        Ok(())
    }
}

/// Writes content to a fixed destination path.
#[derive(Debug, Clone)]
pub struct FileWriter {
    path: PathBuf,
    mimetype: String,
}

impl FileWriter {
    pub fn new(path: impl Into<PathBuf>, mimetype: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mimetype: mimetype.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ContentWriter for FileWriter {
    fn mimetype(&self) -> &str {
        &self.mimetype
    }

    fn put_content(&mut self, file: &Path) -> io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(file, &self.path)?;
        Ok(())
    }
}

/// Allocates uniquely named scratch files. Cleanup belongs to the host.
pub trait TempFileProvider: Send + Sync {
    fn create_temp_file(&self, prefix: &str, suffix: &str) -> io::Result<PathBuf>;
}

#[derive(Debug, Clone, Default)]
pub struct TempDirProvider {
    dir: Option<PathBuf>,
}

impl TempDirProvider {
    /// `None` uses the OS temp directory.
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }
}

impl TempFileProvider for TempDirProvider {
    fn create_temp_file(&self, prefix: &str, suffix: &str) -> io::Result<PathBuf> {
        let dir = self.dir.clone().unwrap_or_else(std::env::temp_dir);
        std::fs::create_dir_all(&dir)?;
        let file = tempfile::Builder::new()
            .prefix(prefix)
            .suffix(suffix)
            .tempfile_in(&dir)?;
        let (_, path) = file.keep().map_err(|e| e.error)?;
        debug!("temp file {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_files_are_unique_and_kept() {
        let dir = tempfile::tempdir().unwrap();
        let p = TempDirProvider::new(Some(dir.path().to_path_buf()));
        let a = p.create_temp_file("ocr_source_", ".png").unwrap();
        let b = p.create_temp_file("ocr_source_", ".png").unwrap();
        assert_ne!(a, b);
        assert!(a.exists() && b.exists());
        let name = a.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("ocr_source_") && name.ends_with(".png"));
    }

    #[test]
    fn file_reader_and_writer_copy_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("in.png");
        std::fs::write(&src, b"\x89PNG").unwrap();

        let staged = dir.path().join("staged.png");
        FileReader::new(&src, "image/png").get_content(&staged).unwrap();
        assert_eq!(std::fs::read(&staged).unwrap(), b"\x89PNG");

        let mut w = FileWriter::new(dir.path().join("nested/out.txt"), "text/plain");
        w.put_content(&staged).unwrap();
        assert_eq!(std::fs::read(w.path()).unwrap(), b"\x89PNG");
    }

    #[test]
    fn writer_reports_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = FileWriter::new(dir.path().join("out.txt"), "text/plain");
        let err = w.put_content(&dir.path().join("absent.txt")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
