// ABOUTME: Writes run artifacts (report, diff, correctness log) without ever overwriting one
// ABOUTME: Also renders the unified diff between the original and patched source
use chrono::{DateTime, Utc};
use remedy_core::{Result, Stage};
use similar::TextDiff;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// UTC stamp used in artifact names, e.g. `20260418-093015`.
pub fn timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d-%H%M%S").to_string()
}

/// Unified diff with `{file} (before)` / `{file} (after)` headers.
pub fn unified_diff(before: &str, after: &str, file_name: &str) -> String {
    TextDiff::from_lines(before, after)
        .unified_diff()
        .context_radius(3)
        .header(
            &format!("{} (before)", file_name),
            &format!("{} (after)", file_name),
        )
        .to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Report,
    Diff,
    Log,
}

impl ArtifactKind {
    fn prefix(&self) -> &'static str {
        match self {
            ArtifactKind::Report => "cpu-report",
            ArtifactKind::Diff => "cpu-fix",
            ArtifactKind::Log => "pytest",
        }
    }

    fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::Report => "md",
            ArtifactKind::Diff => "patch",
            ArtifactKind::Log => "log",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn write_report(&self, stage: Stage, content: &str) -> Result<PathBuf> {
        self.write(ArtifactKind::Report, stage, Utc::now(), content)
            .await
    }

    pub async fn write_diff(&self, stage: Stage, content: &str) -> Result<PathBuf> {
        self.write(ArtifactKind::Diff, stage, Utc::now(), content)
            .await
    }

    pub async fn write_log(&self, stage: Stage, content: &str) -> Result<PathBuf> {
        self.write(ArtifactKind::Log, stage, Utc::now(), content)
            .await
    }

    /// Create `{prefix}-{stage}-{stamp}.{ext}`, adding `-1`, `-2`, ... to the
    /// stem while a file of that name already exists.
    pub async fn write(
        &self,
        kind: ArtifactKind,
        stage: Stage,
        at: DateTime<Utc>,
        content: &str,
    ) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).await?;
        let stem = format!("{}-{}-{}", kind.prefix(), stage, timestamp(at));

        let mut attempt = 0u32;
        loop {
            let name = if attempt == 0 {
                format!("{}.{}", stem, kind.extension())
            } else {
                format!("{}-{}.{}", stem, attempt, kind.extension())
            };
            let path = self.dir.join(name);

            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(mut file) => {
                    file.write_all(content.as_bytes()).await?;
                    file.flush().await?;
                    debug!(path = %path.display(), bytes = content.len(), "artifact written");
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }
}
