use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Serialize;

/// Per-run output directory. Every artifact is written whole, replacing any
/// previous file of the same name.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// Opens `dir`, creating it (and parents) when missing. Returns whether it was created.
    pub fn create(dir: impl Into<PathBuf>) -> anyhow::Result<(Self, bool)> {
        let dir = dir.into();
        let created = !dir.exists();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("create output dir: {}", dir.display()))?;
        Ok((Self { dir }, created))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn write_text(&self, name: &str, contents: &str) -> anyhow::Result<PathBuf> {
        let path = self.path(name);
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .with_context(|| format!("open artifact: {}", path.display()))?;
        file.write_all(contents.as_bytes())
            .with_context(|| format!("write artifact: {}", path.display()))?;
        file.flush()
            .with_context(|| format!("flush artifact: {}", path.display()))?;
        tracing::debug!(path = %path.display(), bytes = contents.len(), "wrote artifact");
        Ok(path)
    }

    pub fn write_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> anyhow::Result<PathBuf> {
        let json = serde_json::to_string_pretty(value).with_context(|| format!("serialize {name}"))?;
        self.write_text(name, &json)
    }

    pub fn write_yaml<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> anyhow::Result<PathBuf> {
        let yaml = serde_yaml::to_string(value).with_context(|| format!("serialize {name}"))?;
        self.write_text(name, &yaml)
    }

    /// Reads a previously written artifact; `None` when it does not exist.
    pub fn read_text(&self, name: &str) -> anyhow::Result<Option<String>> {
        let path = self.path(name);
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("read artifact: {}", path.display())),
        }
    }

    /// Deletes an artifact; `false` when there was nothing to delete.
    pub fn remove(&self, name: &str) -> anyhow::Result<bool> {
        let path = self.path(name);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err).with_context(|| format!("remove artifact: {}", path.display())),
        }
    }
}
