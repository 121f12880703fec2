//! Decides whether a rebuild should reload connected development clients.
//!
//! Clients are only disturbed when a changed translation source belongs to the language they
//! are currently viewing. Everything else rebuilds silently.

use crate::state::AssetState;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;

/// Notification sent to connected clients
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerNotification {
    /// Content for the active language changed, reload page
    Reload {
        /// Source file that triggered the reload
        path: Option<PathBuf>,
    },
    /// Server is shutting down, close connection
    Shutdown,
}

/// Language code embedded in a translation source file name: the last dot segment of the
/// file stem (`messages.fr.ftl` → `fr`).
pub fn source_language(path: &Path) -> Option<&str> {
    let stem = path.file_stem()?.to_str()?;
    stem.rsplit('.').next().filter(|s| !s.is_empty())
}

#[derive(Debug, Clone)]
pub struct ReloadNotifier {
    tx: broadcast::Sender<ServerNotification>,
}

impl Default for ReloadNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ReloadNotifier {
    pub fn new() -> Self {
        // Channel capacity: keep last 100 notifications
        let (tx, _) = broadcast::channel(100);
        ReloadNotifier { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerNotification> {
        self.tx.subscribe()
    }

    pub fn sender(&self) -> broadcast::Sender<ServerNotification> {
        self.tx.clone()
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(ServerNotification::Shutdown);
    }

    /// The first changed file whose language is the active one, if any.
    pub fn affected<'a>(
        changed: impl IntoIterator<Item = &'a PathBuf>,
        active_language: Option<&str>,
    ) -> Option<&'a PathBuf> {
        let active = active_language?;
        changed
            .into_iter()
            .find(|path| source_language(path) == Some(active))
    }

    /// Broadcasts a reload if any changed file belongs to the active language. Returns whether
    /// a reload was sent.
    pub fn notify_changes<'a>(
        &self,
        state: &AssetState,
        changed: impl IntoIterator<Item = &'a PathBuf>,
    ) -> bool {
        let active = state.active_language();
        match Self::affected(changed, active.as_deref()) {
            Some(path) => {
                tracing::info!(
                    "[ReloadNotifier] {:?} changed for active language {:?}, reloading clients",
                    path,
                    active
                );
                // No receivers is fine: nobody to reload.
                let _ = self.tx.send(ServerNotification::Reload {
                    path: Some(path.clone()),
                });
                true
            }
            None => {
                tracing::debug!(
                    "[ReloadNotifier] Change does not affect active language {:?}, rebuilding silently",
                    active
                );
                false
            }
        }
    }
}
