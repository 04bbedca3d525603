use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Destination for finished attendance images.
pub trait DownloadSink: Send {
    /// Store `bytes` under `filename`, returning where it ended up.
    fn deliver(&mut self, filename: &str, bytes: &[u8]) -> Result<PathBuf>;
}

/// Writes downloads into a local directory, creating it on first use.
///
/// Same-named files are overwritten; names carry a minute-resolution timestamp.
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl DownloadSink for DirectorySink {
    fn deliver(&mut self, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating download directory {}", self.dir.display()))?;
        let path = self.dir.join(sanitize_filename(filename));
        std::fs::write(&path, bytes)
            .with_context(|| format!("writing download {}", path.display()))?;
        Ok(path)
    }
}

/// Keep a download inside its directory: path separators and NUL become `_`.
fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_sink_creates_dir_and_writes() -> Result<()> {
        let root = tempfile::tempdir()?;
        let mut sink = DirectorySink::new(root.path().join("downloads"));

        let path = sink.deliver("Alice_note.png", b"png-bytes")?;
        assert_eq!(path, root.path().join("downloads").join("Alice_note.png"));
        assert_eq!(std::fs::read(&path)?, b"png-bytes");
        Ok(())
    }

    #[test]
    fn separators_cannot_escape_directory() -> Result<()> {
        let root = tempfile::tempdir()?;
        let mut sink = DirectorySink::new(root.path());

        let path = sink.deliver("../evil/name.png", b"x")?;
        assert_eq!(path.parent(), Some(root.path()));
        assert_eq!(path.file_name().unwrap(), ".._evil_name.png");
        Ok(())
    }
}
