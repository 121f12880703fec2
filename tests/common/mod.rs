//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use async_trait::async_trait;
use locale_bundler::{
    addresser::parse_file_name,
    config::{DynamicOptions, TargetConfig, TargetMode},
    generator::{GeneratedBundle, GeneratedModule, TranslationGenerator},
    BundlerError,
};
use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};
use tempfile::TempDir;
use tokio::sync::{Notify, Semaphore};

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times; subsequent calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Creates `<temp_dir>/<name>/translations` with one source file per `(file name, text)`.
#[allow(dead_code)]
pub fn create_translations(temp_dir: &TempDir, name: &str, sources: &[(&str, &str)]) -> PathBuf {
    let dir = temp_dir.path().join(name).join("translations");
    std::fs::create_dir_all(&dir).unwrap();
    for (file_name, text) in sources {
        std::fs::write(dir.join(file_name), text).unwrap();
    }
    dir
}

#[allow(dead_code)]
pub fn dynamic_target(
    temp_dir: &TempDir,
    name: &str,
    translation_dir: &Path,
    default_language: Option<&str>,
) -> TargetConfig {
    TargetConfig::new(
        name,
        translation_dir,
        TargetMode::Dynamic(DynamicOptions {
            default_language: default_language.map(str::to_string),
            ..Default::default()
        }),
    )
    .with_generated_path(temp_dir.path().join(name).join("src/Translations.elm"))
}

/// Turns every `<identifier>.<language>.<ext>` source into a `<identifier>.<language>.json`
/// bundle holding `{"text": <file contents>}`. Inline targets get the texts in the generated
/// source instead.
#[derive(Debug, Default)]
pub struct FileGenerator;

#[async_trait]
impl TranslationGenerator for FileGenerator {
    async fn generate(
        &self,
        target: &TargetConfig,
        sources: &[PathBuf],
        _dev_mode: bool,
    ) -> Result<GeneratedModule, BundlerError> {
        let mut generated_source = String::from("module Translations exposing (..)\n");
        let mut bundles = Vec::new();
        for source in sources {
            let file_name = source
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default();
            let parsed = parse_file_name(file_name)?;
            let text = tokio::fs::read_to_string(source).await?;
            generated_source.push_str(&format!("-- {}\n", parsed.identity));
            match target.mode {
                TargetMode::Inline => generated_source.push_str(&format!("-- {}\n", text.trim())),
                TargetMode::Dynamic(_) => bundles.push(GeneratedBundle {
                    filename: format!("{}.json", parsed.identity),
                    content: serde_json::json!({ "text": text.trim() }).to_string(),
                }),
            }
        }
        Ok(GeneratedModule {
            generated_source,
            bundles,
        })
    }
}

/// A [`FileGenerator`] that announces each run and then waits for a permit before answering.
#[derive(Debug)]
pub struct GatedGenerator {
    pub started: Notify,
    pub gate: Semaphore,
    pub runs: AtomicUsize,
}

#[allow(dead_code)]
impl GatedGenerator {
    pub fn new() -> Self {
        GatedGenerator {
            started: Notify::new(),
            gate: Semaphore::new(0),
            runs: AtomicUsize::new(0),
        }
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranslationGenerator for GatedGenerator {
    async fn generate(
        &self,
        target: &TargetConfig,
        sources: &[PathBuf],
        dev_mode: bool,
    ) -> Result<GeneratedModule, BundlerError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.started.notify_one();
        self.gate
            .acquire()
            .await
            .map_err(|e| BundlerError::Custom(e.to_string()))?
            .forget();
        FileGenerator.generate(target, sources, dev_mode).await
    }
}

/// Panics on its first run once a permit is granted, then behaves like [`FileGenerator`].
#[derive(Debug)]
pub struct PanicOnceGenerator {
    pub started: Notify,
    pub gate: Semaphore,
    panicked: AtomicBool,
}

#[allow(dead_code)]
impl PanicOnceGenerator {
    pub fn new() -> Self {
        PanicOnceGenerator {
            started: Notify::new(),
            gate: Semaphore::new(0),
            panicked: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl TranslationGenerator for PanicOnceGenerator {
    async fn generate(
        &self,
        target: &TargetConfig,
        sources: &[PathBuf],
        dev_mode: bool,
    ) -> Result<GeneratedModule, BundlerError> {
        if !self.panicked.swap(true, Ordering::SeqCst) {
            self.started.notify_one();
            self.gate
                .acquire()
                .await
                .map_err(|e| BundlerError::Custom(e.to_string()))?
                .forget();
            panic!("generator crashed");
        }
        FileGenerator.generate(target, sources, dev_mode).await
    }
}
