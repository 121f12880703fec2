//! The translation generator collaborator.
//!
//! The generator turns translation source files into a generated source module and, for
//! dynamic targets, one bundle per (identifier, language). Its internals are opaque here;
//! [`CommandGenerator`] adapts any external program that prints a [`GeneratedModule`] as JSON.

use crate::{
    config::{GeneratorConfig, TargetConfig, TargetMode},
    error::BundlerError,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    process::Stdio,
};
use tokio::process::Command;
use walkdir::WalkDir;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedBundle {
    pub filename: String,
    pub content: String,
}

/// One generator invocation's output. Immutable once returned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedModule {
    pub generated_source: String,
    #[serde(default)]
    pub bundles: Vec<GeneratedBundle>,
}

#[async_trait]
pub trait TranslationGenerator: Send + Sync {
    async fn generate(
        &self,
        target: &TargetConfig,
        sources: &[PathBuf],
        dev_mode: bool,
    ) -> Result<GeneratedModule, BundlerError>;
}

/// Every regular, non-hidden file directly inside `dir`, as absolute paths in lexical order.
pub fn collect_sources(dir: &Path) -> Result<Vec<PathBuf>, BundlerError> {
    let mut sources = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let hidden = entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with('.'))
            .unwrap_or(false);
        if hidden {
            continue;
        }
        sources.push(std::path::absolute(entry.path())?);
    }
    Ok(sources)
}

/// Runs an external generator program.
///
/// The program is called as
/// `<program> <args..> --mode <inline|dynamic> [--dev] [--i18n-arg-first] [--json-dir <dir>] -- <sources..>`
/// and must print a JSON [`GeneratedModule`] on stdout.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    program: String,
    args: Vec<String>,
}

impl CommandGenerator {
    pub fn new(program: impl Into<String>) -> Self {
        CommandGenerator {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    fn command_args(&self, target: &TargetConfig, sources: &[PathBuf], dev_mode: bool) -> Vec<String> {
        let mut args = self.args.clone();
        args.push("--mode".to_string());
        args.push(target.mode.as_str().to_string());
        if dev_mode {
            args.push("--dev".to_string());
        }
        if target.i18n_arg_first {
            args.push("--i18n-arg-first".to_string());
        }
        if let TargetMode::Dynamic(opts) = &target.mode {
            args.push("--json-dir".to_string());
            args.push(opts.json_dir.clone());
        }
        args.push("--".to_string());
        args.extend(sources.iter().map(|p| p.display().to_string()));
        args
    }
}

impl TryFrom<&GeneratorConfig> for CommandGenerator {
    type Error = BundlerError;

    fn try_from(config: &GeneratorConfig) -> Result<Self, Self::Error> {
        if config.program.trim().is_empty() {
            return Err(BundlerError::Config(
                "[generator] program must be set".to_string(),
            ));
        }
        Ok(CommandGenerator::new(config.program.clone()).with_args(config.args.iter().cloned()))
    }
}

#[async_trait]
impl TranslationGenerator for CommandGenerator {
    async fn generate(
        &self,
        target: &TargetConfig,
        sources: &[PathBuf],
        dev_mode: bool,
    ) -> Result<GeneratedModule, BundlerError> {
        let args = self.command_args(target, sources, dev_mode);
        tracing::debug!("[CommandGenerator] Running {} {:?}", self.program, args);
        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                BundlerError::Generator(format!("could not start '{}': {e}", self.program))
            })?;

        if !output.status.success() {
            return Err(BundlerError::Generator(format!(
                "'{}' exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DynamicOptions;

    #[test]
    fn test_collect_sources_skips_hidden_and_dirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("messages.fr.ftl"), "").unwrap();
        std::fs::write(dir.path().join("messages.en.ftl"), "").unwrap();
        std::fs::write(dir.path().join(".DS_Store"), "").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/other.en.ftl"), "").unwrap();

        let sources = collect_sources(dir.path()).unwrap();
        let names: Vec<_> = sources
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["messages.en.ftl", "messages.fr.ftl"]);
        assert!(sources.iter().all(|p| p.is_absolute()));
    }

    #[test]
    fn test_collect_sources_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let err = collect_sources(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, BundlerError::NotFound(_)), "{err:?}");
    }

    #[test]
    fn test_command_args() {
        let generator = CommandGenerator::new("gen").with_args(["--quiet"]);
        let mut target = TargetConfig::new(
            "app",
            "translations",
            TargetMode::Dynamic(DynamicOptions::default()),
        );
        target.i18n_arg_first = true;
        let args = generator.command_args(&target, &[PathBuf::from("/t/messages.en.ftl")], true);
        assert_eq!(
            args,
            vec![
                "--quiet",
                "--mode",
                "dynamic",
                "--dev",
                "--i18n-arg-first",
                "--json-dir",
                "i18n",
                "--",
                "/t/messages.en.ftl"
            ]
        );
    }

    #[test]
    fn test_generated_module_json() {
        let module: GeneratedModule = serde_json::from_str(
            r#"{"generated_source":"module T exposing (..)","bundles":[{"filename":"messages.en.json","content":"{}"}]}"#,
        )
        .unwrap();
        assert_eq!(module.bundles.len(), 1);

        let inline: GeneratedModule =
            serde_json::from_str(r#"{"generated_source":"module T exposing (..)"}"#).unwrap();
        assert!(inline.bundles.is_empty());
    }
}
