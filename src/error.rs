use std::{io, path::StripPrefixError};

use http::status::StatusCode;
use regex::Error as RegexError;
use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use thiserror::Error;

#[cfg(feature = "service")]
use notify::{Error as NotifyError, ErrorKind as NotifyErrorKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum BundlerError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Unresolved bundle placeholder '{bundle}' for language '{language}'")]
    Resolution { bundle: String, language: String },
    #[error("Bundle '{bundle}' ({language}) belongs to build target '{found}', but this document already uses bundles from '{expected}'")]
    CrossTarget {
        bundle: String,
        language: String,
        expected: String,
        found: String,
    },
    #[error("Internal consistency error: {0}")]
    InvariantViolation(String),
    #[error("Invalid bundle file name '{0}': expected <identifier>.<language>[.<hash>].<extension>")]
    InvalidBundleName(String),
    #[error("Translation generator failed: {0}")]
    Generator(String),
    #[error("File System error: {0}")]
    Io(String),
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
    #[error("Custom error: {0}")]
    Custom(String),
}

impl BundlerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            BundlerError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            BundlerError::Resolution { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            BundlerError::CrossTarget { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            BundlerError::InvariantViolation(_) => StatusCode::INTERNAL_SERVER_ERROR,
            BundlerError::InvalidBundleName(_) => StatusCode::BAD_REQUEST,
            BundlerError::Generator(_) => StatusCode::BAD_GATEWAY,
            BundlerError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            BundlerError::NotFound(_) => StatusCode::NOT_FOUND,
            BundlerError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            BundlerError::Custom(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True for errors caused by user input rather than a defect in the pipeline.
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, BundlerError::InvariantViolation(_))
    }
}

impl From<StripPrefixError> for BundlerError {
    fn from(src: StripPrefixError) -> BundlerError {
        BundlerError::NotFound(format!("Strip prefix failed for path. Error: {src}"))
    }
}

impl From<toml::de::Error> for BundlerError {
    fn from(src: toml::de::Error) -> BundlerError {
        BundlerError::Serialization(format!("Toml deserialization error: {src}"))
    }
}

impl From<JsonError> for BundlerError {
    fn from(src: JsonError) -> BundlerError {
        BundlerError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<io::Error> for BundlerError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => BundlerError::NotFound(format!("{x}")),
            _ => BundlerError::Io(format!("IOError: {}: {x}", x.kind())),
        }
    }
}

impl From<walkdir::Error> for BundlerError {
    fn from(x: walkdir::Error) -> Self {
        let path = x.path().map(|p| p.display().to_string());
        match x.into_io_error() {
            Some(io_error) => io_error.into(),
            None => BundlerError::Io(format!("directory walk failed at {path:?}")),
        }
    }
}

impl From<RegexError> for BundlerError {
    fn from(x: RegexError) -> Self {
        BundlerError::Config(format!("Placeholder pattern failed to compile: {x}"))
    }
}

#[cfg(feature = "service")]
impl From<NotifyError> for BundlerError {
    fn from(notify_error: NotifyError) -> Self {
        let paths = notify_error.paths;
        match notify_error.kind {
            NotifyErrorKind::Generic(msg) => BundlerError::Custom(format!(
                "watching {paths:?} for translation changes failed: {msg}"
            )),
            NotifyErrorKind::Io(io_error) => BundlerError::Io(format!(
                "watching {paths:?} for translation changes failed: {io_error}"
            )),
            NotifyErrorKind::PathNotFound => BundlerError::NotFound(format!(
                "translation directory to watch does not exist: {paths:?}"
            )),
            NotifyErrorKind::WatchNotFound => BundlerError::NotFound(format!(
                "no active watch on translation directory {paths:?}"
            )),
            NotifyErrorKind::InvalidConfig(config) => BundlerError::Config(format!(
                "invalid file watcher configuration: {config:?}"
            )),
            NotifyErrorKind::MaxFilesWatch => BundlerError::Custom(format!(
                "file watch limit reached while watching {paths:?}"
            )),
        }
    }
}
