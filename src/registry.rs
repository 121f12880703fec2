//! The authoritative mapping from bundle identity to the request path and content currently
//! being served for it.
//!
//! The registry keeps two views in sync:
//!
//! - `entries`: [`BundleIdentity`] → [`RegistryEntry`] (request path, owning target)
//! - `assets`: request path → content, the only way content is reachable
//!
//! Re-registering an identity under a new request path (a content-hash change) evicts the old
//! path first, so at most one request path is live per identity. The set of known languages is
//! memoized and dropped whenever the key set changes.

use crate::{addresser::BundleIdentity, config::TargetId};
use once_cell::sync::OnceCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// `identifier.language.extension`, with the extension taken from the request path.
fn normalized_name(identity: &BundleIdentity, request_path: &str) -> String {
    let file = request_path.rsplit('/').next().unwrap_or(request_path);
    match file.rsplit_once('.') {
        Some((_, extension)) => format!("{identity}.{extension}"),
        None => identity.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub request_path: String,
    pub target: TargetId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct StoredAsset {
    identity: BundleIdentity,
    content: String,
}

#[derive(Debug, Default)]
pub struct AssetRegistry {
    entries: BTreeMap<BundleIdentity, RegistryEntry>,
    assets: HashMap<String, StoredAsset>,
    /// Hash-free file name → live request path. Used to find what to evict when a hashed
    /// file name changes.
    by_normalized_name: HashMap<String, String>,
    languages: OnceCell<BTreeSet<String>>,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registers `content` at `request_path` for `identity`, evicting whatever path the
    /// identity was previously served from.
    pub fn upsert(
        &mut self,
        identity: BundleIdentity,
        request_path: String,
        content: String,
        target: TargetId,
    ) {
        let normalized = normalized_name(&identity, &request_path);
        match self.entries.get(&identity) {
            Some(existing) if existing.request_path != request_path => {
                tracing::debug!(
                    "[AssetRegistry] Evicting {} (superseded by {})",
                    existing.request_path,
                    request_path
                );
                self.assets.remove(&existing.request_path);
            }
            Some(_) => {}
            None => {
                self.languages = OnceCell::new();
            }
        }

        // A path previously owned by another identity is taken over.
        if let Some(previous) = self.assets.get(&request_path) {
            if previous.identity != identity {
                let stale = previous.identity.clone();
                tracing::warn!(
                    "[AssetRegistry] Request path {} moved from {} to {}",
                    request_path,
                    stale,
                    identity
                );
                self.entries.remove(&stale);
                self.by_normalized_name
                    .remove(&normalized_name(&stale, &request_path));
                self.languages = OnceCell::new();
            }
        }

        self.by_normalized_name
            .insert(normalized, request_path.clone());
        self.assets.insert(
            request_path.clone(),
            StoredAsset {
                identity: identity.clone(),
                content,
            },
        );
        self.entries.insert(
            identity,
            RegistryEntry {
                request_path,
                target,
            },
        );
    }

    /// Removes an identity and its content.
    pub fn remove(&mut self, identity: &BundleIdentity) -> Option<RegistryEntry> {
        let entry = self.entries.remove(identity)?;
        self.assets.remove(&entry.request_path);
        self.by_normalized_name
            .remove(&normalized_name(identity, &entry.request_path));
        self.languages = OnceCell::new();
        Some(entry)
    }

    /// Drops every identity owned by `target` that is not in `live`. Returns the removed
    /// identities.
    pub fn prune(
        &mut self,
        target: &TargetId,
        live: &BTreeSet<BundleIdentity>,
    ) -> Vec<BundleIdentity> {
        let stale: Vec<BundleIdentity> = self
            .entries
            .iter()
            .filter(|(identity, entry)| &entry.target == target && !live.contains(*identity))
            .map(|(identity, _)| identity.clone())
            .collect();
        for identity in stale.iter() {
            self.remove(identity);
        }
        stale
    }

    pub fn lookup(&self, request_path: &str) -> Option<&str> {
        self.assets
            .get(request_path)
            .map(|asset| asset.content.as_str())
    }

    /// The identity currently served at `request_path`.
    pub fn identity_at(&self, request_path: &str) -> Option<&BundleIdentity> {
        self.assets.get(request_path).map(|asset| &asset.identity)
    }

    pub fn lookup_by_identity(&self, identity: &BundleIdentity) -> Option<&RegistryEntry> {
        self.entries.get(identity)
    }

    /// Content and owning target for an identity.
    pub fn resolve(&self, identity: &BundleIdentity) -> Option<(&str, &TargetId)> {
        let entry = self.entries.get(identity)?;
        let content = self.lookup(&entry.request_path)?;
        Some((content, &entry.target))
    }

    /// Live request path for a hash-free file name such as `messages.en.json`.
    pub fn lookup_by_normalized_name(&self, normalized: &str) -> Option<&str> {
        self.by_normalized_name.get(normalized).map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&BundleIdentity, &RegistryEntry)> {
        self.entries.iter()
    }

    /// All languages with at least one registered bundle.
    pub fn languages(&self) -> &BTreeSet<String> {
        self.languages.get_or_init(|| {
            tracing::debug!("[AssetRegistry] Recomputing language catalog");
            self.entries
                .keys()
                .filter_map(|identity| identity.language.rsplit('.').next())
                .map(str::to_string)
                .collect()
        })
    }

    /// Target owning the bundles named `identifier`, if any are registered.
    pub fn owner_of(&self, identifier: &str) -> Option<&TargetId> {
        self.entries
            .iter()
            .find(|(identity, _)| identity.identifier == identifier)
            .map(|(_, entry)| &entry.target)
    }

    /// Languages `target` has at least one bundle for.
    pub fn target_languages(&self, target: &TargetId) -> BTreeSet<String> {
        self.entries
            .iter()
            .filter(|(_, entry)| &entry.target == target)
            .map(|(identity, _)| identity.language.clone())
            .collect()
    }

    pub fn has_language(&self, language: &str) -> bool {
        self.languages().contains(language)
    }

    /// `identity key → request path` for every live entry.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .map(|(identity, entry)| (identity.key(), entry.request_path.clone()))
            .collect()
    }
}
