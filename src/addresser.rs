//! Derives stable bundle identities and request paths from generated bundle file names.
//!
//! ## File name grammar
//!
//! ```text
//! filename   := identifier "." language [ "." hash ] "." extension
//! identifier := segment ( "." segment )*
//! language   := segment
//! hash       := 8..=64 lowercase hex digits
//! extension  := segment
//! ```
//!
//! Parsing works from the right: the extension is the last segment, the hash is the next
//! segment when it has the hash shape and at least four segments are present, the language is
//! the segment before that and everything left over is the identifier. Identities never
//! include the hash, so two builds of a bundle converge to the same [`BundleIdentity`] even when
//! their request paths differ.

use crate::{config::DynamicOptions, error::BundlerError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Number of hex digits of the SHA-256 content digest embedded in hashed file names.
pub const HASH_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BundleIdentity {
    pub identifier: String,
    pub language: String,
}

impl BundleIdentity {
    pub fn new(identifier: impl Into<String>, language: impl Into<String>) -> Self {
        BundleIdentity {
            identifier: identifier.into(),
            language: language.into(),
        }
    }

    /// `identifier.language`, the key exposed through the virtual module.
    pub fn key(&self) -> String {
        format!("{}.{}", self.identifier, self.language)
    }
}

impl fmt::Display for BundleIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.identifier, self.language)
    }
}

/// The pieces of a bundle file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFileName {
    pub identity: BundleIdentity,
    pub hash: Option<String>,
    pub extension: String,
}

impl ParsedFileName {
    /// The file name with any hash segment removed.
    pub fn normalized(&self) -> String {
        format!("{}.{}", self.identity, self.extension)
    }

    pub fn to_file_name(&self) -> String {
        match &self.hash {
            Some(hash) => format!("{}.{}.{}", self.identity, hash, self.extension),
            None => self.normalized(),
        }
    }
}

fn is_hash_segment(segment: &str) -> bool {
    (HASH_LEN..=64).contains(&segment.len())
        && segment
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

/// Splits a bundle file name according to the grammar in the module docs.
pub fn parse_file_name(file_name: &str) -> Result<ParsedFileName, BundlerError> {
    let invalid = || BundlerError::InvalidBundleName(file_name.to_string());
    let base = file_name.rsplit('/').next().unwrap_or(file_name);
    let mut segments: Vec<&str> = base.split('.').collect();
    if segments.len() < 3 || segments.iter().any(|s| s.is_empty()) {
        return Err(invalid());
    }

    let extension = segments.pop().ok_or_else(invalid)?.to_string();
    let hash = match segments.last() {
        Some(candidate) if segments.len() >= 3 && is_hash_segment(candidate) => {
            let hash = candidate.to_string();
            segments.pop();
            Some(hash)
        }
        _ => None,
    };
    let language = segments.pop().ok_or_else(invalid)?.to_string();
    if segments.is_empty() {
        return Err(invalid());
    }
    let identifier = segments.join(".");

    Ok(ParsedFileName {
        identity: BundleIdentity::new(identifier, language),
        hash,
        extension,
    })
}

/// First [`HASH_LEN`] hex digits of the SHA-256 digest of `content`.
pub fn content_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    let mut hash = hex::encode(digest);
    hash.truncate(HASH_LEN);
    hash
}

/// A bundle with its identity and where it lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressedBundle {
    pub identity: BundleIdentity,
    /// Hash-free file name, stable across builds.
    pub normalized_name: String,
    /// Path relative to the output directory, e.g. `i18n/messages.en.1a2b3c4d.json`.
    pub file_name: String,
    /// Root-relative request path, e.g. `/i18n/messages.en.1a2b3c4d.json`.
    pub request_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentAddresser {
    base_dir: String,
    content_hash: bool,
}

impl ContentAddresser {
    pub fn new(base_dir: &str, content_hash: bool) -> Self {
        ContentAddresser {
            base_dir: normalize_dir(base_dir),
            content_hash,
        }
    }

    pub fn base_dir(&self) -> &str {
        &self.base_dir
    }

    /// Computes identity and paths for a generated bundle. Any hash the generator put in the
    /// name is discarded; when hashing is enabled the digest of `content` replaces it.
    pub fn address(&self, file_name: &str, content: &str) -> Result<AddressedBundle, BundlerError> {
        let mut parsed = parse_file_name(file_name)?;
        parsed.hash = self.content_hash.then(|| content_hash(content));

        let name = parsed.to_file_name();
        let file_name = if self.base_dir.is_empty() {
            name
        } else {
            format!("{}/{}", self.base_dir, name)
        };
        let request_path = format!("/{file_name}");

        Ok(AddressedBundle {
            normalized_name: parsed.normalized(),
            identity: parsed.identity,
            file_name,
            request_path,
        })
    }
}

impl From<&DynamicOptions> for ContentAddresser {
    fn from(opts: &DynamicOptions) -> Self {
        ContentAddresser::new(&opts.json_dir, opts.content_hash)
    }
}

/// Forward slashes only, no leading, trailing or empty segments.
fn normalize_dir(dir: &str) -> String {
    dir.replace('\\', "/")
        .split('/')
        .filter(|seg| !seg.is_empty() && *seg != ".")
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_name() {
        let parsed = parse_file_name("messages.en.json").unwrap();
        assert_eq!(parsed.identity, BundleIdentity::new("messages", "en"));
        assert_eq!(parsed.hash, None);
        assert_eq!(parsed.extension, "json");
    }

    #[test]
    fn test_parse_hashed_name() {
        let parsed = parse_file_name("messages.fr.0123abcd.json").unwrap();
        assert_eq!(parsed.identity, BundleIdentity::new("messages", "fr"));
        assert_eq!(parsed.hash.as_deref(), Some("0123abcd"));
        assert_eq!(parsed.normalized(), "messages.fr.json");
    }

    #[test]
    fn test_parse_dotted_identifier() {
        // "errors" is not hash-shaped, so it stays part of the identifier
        let parsed = parse_file_name("app.errors.de.json").unwrap();
        assert_eq!(parsed.identity, BundleIdentity::new("app.errors", "de"));
        assert_eq!(parsed.hash, None);

        // Three segments never carry a hash, even if the middle one looks like one
        let parsed = parse_file_name("messages.deadbeef.json").unwrap();
        assert_eq!(parsed.identity, BundleIdentity::new("messages", "deadbeef"));
    }

    #[test]
    fn test_parse_rejects_malformed_names() {
        for bad in ["messages.json", "messages", ".en.json", "messages..json", ""] {
            assert!(
                matches!(
                    parse_file_name(bad),
                    Err(BundlerError::InvalidBundleName(_))
                ),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_file_name_round_trip() {
        for name in [
            "messages.en.json",
            "messages.en.0123abcd.json",
            "app.errors.pt-BR.ffffffff00.json",
        ] {
            assert_eq!(parse_file_name(name).unwrap().to_file_name(), name);
        }
    }

    #[test]
    fn test_address_without_hash_is_stable() {
        let addresser = ContentAddresser::new("/i18n/", false);
        let first = addresser.address("messages.en.json", "{\"a\":1}").unwrap();
        let second = addresser.address("messages.en.json", "{\"a\":2}").unwrap();
        assert_eq!(first.request_path, "/i18n/messages.en.json");
        assert_eq!(first.file_name, "i18n/messages.en.json");
        assert_eq!(first.request_path, second.request_path);
    }

    #[test]
    fn test_address_with_hash_changes_path_but_not_identity() {
        let addresser = ContentAddresser::new("i18n", true);
        let first = addresser.address("messages.en.json", "{\"a\":1}").unwrap();
        let second = addresser.address("messages.en.json", "{\"a\":2}").unwrap();
        let again = addresser.address("messages.en.json", "{\"a\":1}").unwrap();

        assert_eq!(first.identity, second.identity);
        assert_eq!(first.normalized_name, "messages.en.json");
        assert_ne!(first.request_path, second.request_path);
        assert_eq!(first, again);

        let hash = content_hash("{\"a\":1}");
        assert_eq!(hash.len(), HASH_LEN);
        assert_eq!(first.request_path, format!("/i18n/messages.en.{hash}.json"));
    }

    #[test]
    fn test_address_replaces_generator_hash() {
        let addresser = ContentAddresser::new("", false);
        let addressed = addresser
            .address("messages.en.0123abcd.json", "{}")
            .unwrap();
        assert_eq!(addressed.request_path, "/messages.en.json");
    }
}
