//! Shared test utilities for in-crate tests

use crate::{
    config::{DynamicOptions, TargetConfig, TargetMode},
    error::BundlerError,
    generator::{GeneratedBundle, GeneratedModule, TranslationGenerator},
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};

/// Returns whatever module it was last given, regardless of the sources.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    output: Mutex<GeneratedModule>,
}

impl ScriptedGenerator {
    pub fn new(module: GeneratedModule) -> Self {
        ScriptedGenerator {
            output: Mutex::new(module),
        }
    }

    pub fn set(&self, module: GeneratedModule) {
        *self.output.lock() = module;
    }
}

#[async_trait]
impl TranslationGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        _target: &TargetConfig,
        _sources: &[PathBuf],
        _dev_mode: bool,
    ) -> Result<GeneratedModule, BundlerError> {
        Ok(self.output.lock().clone())
    }
}

pub fn module(generated_source: &str, bundles: &[(&str, &str)]) -> GeneratedModule {
    GeneratedModule {
        generated_source: generated_source.to_string(),
        bundles: bundles
            .iter()
            .map(|(filename, content)| GeneratedBundle {
                filename: filename.to_string(),
                content: content.to_string(),
            })
            .collect(),
    }
}

/// A dynamic target rooted at `root/<name>`, with its translation directory created.
pub fn dynamic_target(root: &Path, name: &str, default_language: Option<&str>) -> TargetConfig {
    let translation_dir = root.join(name).join("translations");
    std::fs::create_dir_all(&translation_dir).unwrap();
    TargetConfig::new(
        name,
        translation_dir,
        TargetMode::Dynamic(DynamicOptions {
            default_language: default_language.map(str::to_string),
            ..Default::default()
        }),
    )
    .with_generated_path(root.join(name).join("src/Translations.elm"))
}
