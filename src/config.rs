//! Configuration for one or more build targets.
//!
//! A configuration file (conventionally `locale-bundler.toml`) looks like:
//!
//! ```toml
//! [generator]
//! program = "travelm-agency"
//!
//! [[targets]]
//! name = "app"
//! translation_dir = "translations"
//! generated_path = "src/Translations.elm"
//!
//! [targets.mode]
//! kind = "dynamic"
//! json_dir = "i18n"
//! content_hash = true
//! default_language = "en"
//!
//! [html]
//! documents = ["index.html"]
//! ```
//!
//! Target modes are a tagged union: an `inline` target embeds translations in the generated
//! source and never has bundles, a `dynamic` target produces one JSON bundle per
//! (identifier, language) pair and carries the options that only make sense for bundles.

use crate::error::BundlerError;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeSet,
    fmt,
    fs::read_to_string,
    path::{Path, PathBuf},
};

pub const DEFAULT_CONFIG_FILE: &str = "locale-bundler.toml";
pub const DEFAULT_PLACEHOLDER_PREFIX: &str = "LOCALE_BUNDLE";
pub const DEFAULT_PORT: u16 = 9037;

/// Name of a build target. Registry entries carry the id of the target that produced them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(pub String);

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TargetId {
    fn from(s: &str) -> Self {
        TargetId(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TargetMode {
    Inline,
    Dynamic(DynamicOptions),
}

impl Default for TargetMode {
    fn default() -> Self {
        TargetMode::Dynamic(DynamicOptions::default())
    }
}

impl TargetMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetMode::Inline => "inline",
            TargetMode::Dynamic(_) => "dynamic",
        }
    }

    pub fn dynamic(&self) -> Option<&DynamicOptions> {
        match self {
            TargetMode::Inline => None,
            TargetMode::Dynamic(opts) => Some(opts),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicOptions {
    /// Directory, relative to the served root, that bundles are requested from.
    pub json_dir: String,
    /// Embed a content digest in each bundle file name.
    pub content_hash: bool,
    /// Language rendered at the unprefixed HTML path when no client language is known.
    pub default_language: Option<String>,
}

impl Default for DynamicOptions {
    fn default() -> Self {
        DynamicOptions {
            json_dir: "i18n".to_string(),
            content_hash: true,
            default_language: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub name: TargetId,
    pub translation_dir: PathBuf,
    #[serde(default = "default_generated_path")]
    pub generated_path: PathBuf,
    #[serde(default)]
    pub i18n_arg_first: bool,
    /// Overrides the dev flag handed to the generator. Defaults to the build mode.
    #[serde(default)]
    pub dev_mode: Option<bool>,
    #[serde(default)]
    pub mode: TargetMode,
}

fn default_generated_path() -> PathBuf {
    PathBuf::from("src/Translations.elm")
}

impl TargetConfig {
    pub fn new(name: &str, translation_dir: impl Into<PathBuf>, mode: TargetMode) -> Self {
        TargetConfig {
            name: TargetId::from(name),
            translation_dir: translation_dir.into(),
            generated_path: default_generated_path(),
            i18n_arg_first: false,
            dev_mode: None,
            mode,
        }
    }

    pub fn with_generated_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.generated_path = path.into();
        self
    }

    pub fn default_language(&self) -> Option<&str> {
        self.mode
            .dynamic()
            .and_then(|opts| opts.default_language.as_deref())
    }

    /// Resolves relative paths against `root`.
    pub fn resolve_paths(&mut self, root: &Path) {
        if self.translation_dir.is_relative() {
            self.translation_dir = root.join(&self.translation_dir);
        }
        if self.generated_path.is_relative() {
            self.generated_path = root.join(&self.generated_path);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HtmlConfig {
    /// Placeholders take the form `__<prefix>_<bundle>__`.
    pub placeholder_prefix: String,
    /// HTML templates to fan out per language, relative to the server root.
    pub documents: Vec<PathBuf>,
}

impl Default for HtmlConfig {
    fn default() -> Self {
        HtmlConfig {
            placeholder_prefix: DEFAULT_PLACEHOLDER_PREFIX.to_string(),
            documents: Vec::new(),
        }
    }
}

/// What the dev router does with `ActiveLanguage` on requests it does not recognize.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveLanguagePolicy {
    /// Keep the last observed language.
    #[default]
    Sticky,
    /// Clear the active language.
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub root: PathBuf,
    pub port: u16,
    pub active_language: ActiveLanguagePolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            root: PathBuf::from("."),
            port: DEFAULT_PORT,
            active_language: ActiveLanguagePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundlerConfig {
    #[serde(default)]
    pub generator: GeneratorConfig,
    pub targets: Vec<TargetConfig>,
    #[serde(default)]
    pub html: HtmlConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl BundlerConfig {
    pub fn new(targets: Vec<TargetConfig>) -> Self {
        BundlerConfig {
            targets,
            ..Default::default()
        }
    }

    /// Reads and validates a configuration file. Relative paths inside the file are resolved
    /// against the file's directory.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, BundlerError> {
        let path = path.as_ref();
        tracing::debug!("Reading configuration from: {:?}", path);
        let content = read_to_string(path)?;
        let mut config: BundlerConfig = toml::from_str(&content)?;
        let root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        config.resolve_paths(&root);
        config.validate()?;
        Ok(config)
    }

    pub fn resolve_paths(&mut self, root: &Path) {
        if self.server.root.is_relative() {
            self.server.root = root.join(&self.server.root);
        }
        for target in self.targets.iter_mut() {
            target.resolve_paths(root);
        }
    }

    pub fn target(&self, id: &TargetId) -> Option<&TargetConfig> {
        self.targets.iter().find(|t| &t.name == id)
    }

    /// Checks everything that can be checked before the first build runs.
    pub fn validate(&self) -> Result<(), BundlerError> {
        if self.targets.is_empty() {
            return Err(BundlerError::Config(
                "at least one [[targets]] entry is required".to_string(),
            ));
        }

        let mut seen = BTreeSet::new();
        for target in self.targets.iter() {
            if target.name.0.trim().is_empty() {
                return Err(BundlerError::Config(
                    "build target names must not be empty".to_string(),
                ));
            }
            if !seen.insert(&target.name) {
                return Err(BundlerError::Config(format!(
                    "duplicate build target name '{}'",
                    target.name
                )));
            }
            if target.translation_dir.as_os_str().is_empty() {
                return Err(BundlerError::Config(format!(
                    "target '{}' has an empty translation_dir",
                    target.name
                )));
            }
            if let TargetMode::Dynamic(opts) = &target.mode {
                if let Some(lang) = &opts.default_language {
                    if !is_language_code(lang) {
                        return Err(BundlerError::Config(format!(
                            "target '{}' has invalid default_language '{lang}'",
                            target.name
                        )));
                    }
                }
                let json_dir = opts.json_dir.trim_matches('/');
                if json_dir.split('/').any(|seg| seg == "..") {
                    return Err(BundlerError::Config(format!(
                        "target '{}' json_dir '{}' must stay inside the served root",
                        target.name, opts.json_dir
                    )));
                }
            }
        }

        let prefix = &self.html.placeholder_prefix;
        if prefix.is_empty()
            || prefix.starts_with('_')
            || prefix.ends_with('_')
            || !prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(BundlerError::Config(format!(
                "invalid html.placeholder_prefix '{prefix}'"
            )));
        }
        Ok(())
    }
}

/// A language code is a single non-empty path and dot segment.
pub fn is_language_code(lang: &str) -> bool {
    !lang.is_empty()
        && lang
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
