// ABOUTME: Reads the target source and replaces it atomically
use remedy_core::{RemedyError, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// The Python file under repair.
#[derive(Debug, Clone)]
pub struct SourceFile {
    path: PathBuf,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    pub async fn read(&self) -> Result<String> {
        Ok(tokio::fs::read_to_string(&self.path).await?)
    }

    /// Write `contents` to a sibling temp file and rename it over the
    /// target, so readers see either the old or the new text.
    pub async fn write_atomic(&self, contents: &str) -> Result<()> {
        let path = self.path.clone();
        let contents = contents.to_owned();
        tokio::task::spawn_blocking(move || persist(&path, &contents))
            .await
            .map_err(|e| RemedyError::InvalidOperation(format!("write task failed: {}", e)))??;
        debug!(path = %self.path.display(), "source replaced");
        Ok(())
    }
}

fn persist(path: &Path, contents: &str) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.as_file().sync_all()?;

    // keep the original permissions on the replacement
    if let Ok(metadata) = std::fs::metadata(path) {
        std::fs::set_permissions(tmp.path(), metadata.permissions())?;
    }

    tmp.persist(path).map_err(|e| RemedyError::Io(e.error))?;
    Ok(())
}
