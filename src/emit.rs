//! The emit collaborator: where production bundles and per-language HTML documents go.

use crate::error::BundlerError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    collections::BTreeMap,
    path::{Component, Path, PathBuf},
};

#[async_trait]
pub trait AssetEmitter: Send + Sync {
    /// `file_name` is relative to the output root and uses forward slashes.
    async fn emit(&self, file_name: &str, content: &str) -> Result<(), BundlerError>;
}

/// Writes emitted assets below an output directory.
#[derive(Debug, Clone)]
pub struct FsEmitter {
    out_dir: PathBuf,
}

impl FsEmitter {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        FsEmitter {
            out_dir: out_dir.into(),
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    fn target_path(&self, file_name: &str) -> Result<PathBuf, BundlerError> {
        let relative = Path::new(file_name.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(BundlerError::InvariantViolation(format!(
                "refusing to emit '{file_name}' outside of {:?}",
                self.out_dir
            )));
        }
        Ok(self.out_dir.join(relative))
    }
}

#[async_trait]
impl AssetEmitter for FsEmitter {
    async fn emit(&self, file_name: &str, content: &str) -> Result<(), BundlerError> {
        let path = self.target_path(file_name)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tracing::debug!("[FsEmitter] Writing {:?}", path);
        tokio::fs::write(&path, content).await?;
        Ok(())
    }
}

/// Keeps emitted assets in memory, keyed by file name.
#[derive(Debug, Default)]
pub struct MemoryEmitter {
    assets: Mutex<BTreeMap<String, String>>,
}

impl MemoryEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, file_name: &str) -> Option<String> {
        self.assets.lock().get(file_name).cloned()
    }

    pub fn file_names(&self) -> Vec<String> {
        self.assets.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.assets.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.lock().is_empty()
    }
}

#[async_trait]
impl AssetEmitter for MemoryEmitter {
    async fn emit(&self, file_name: &str, content: &str) -> Result<(), BundlerError> {
        self.assets
            .lock()
            .insert(file_name.to_string(), content.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test(tokio::test)]
    async fn test_fs_emitter_creates_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let emitter = FsEmitter::new(dir.path());
        emitter.emit("i18n/messages.en.json", "{}").await.unwrap();
        emitter.emit("/fr/index.html", "<html></html>").await.unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("i18n/messages.en.json")).unwrap(),
            "{}"
        );
        assert!(dir.path().join("fr/index.html").exists());
    }

    #[test(tokio::test)]
    async fn test_fs_emitter_rejects_escape() {
        let dir = tempfile::tempdir().unwrap();
        let emitter = FsEmitter::new(dir.path());
        assert!(matches!(
            emitter.emit("../evil.json", "{}").await,
            Err(BundlerError::InvariantViolation(_))
        ));
    }
}
