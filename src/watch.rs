//! File watching for development builds.
//!
//! [`WatchService`] keeps one debounced watcher per target translation directory. Changed paths
//! are funneled through a single channel to a dispatcher task, which routes each path to the
//! first orchestrator whose directory contains it and triggers a rebuild there. A target that is
//! already building coalesces the trigger into its pending follow-up.
//!
//! ```rust,no_run
//! # async fn run(orchestrators: Vec<std::sync::Arc<locale_bundler::orchestrator::BuildOrchestrator>>)
//! # -> Result<(), locale_bundler::BundlerError> {
//! use locale_bundler::watch::{WatchService, DEFAULT_DEBOUNCE};
//!
//! let service = WatchService::new(orchestrators, DEFAULT_DEBOUNCE);
//! service.watch_all()?;
//! # Ok(())
//! # }
//! ```

use crate::{
    error::BundlerError,
    orchestrator::{route_change, BuildOrchestrator, BuildTrigger, TriggerOutcome},
};
use notify_debouncer_full::{
    new_debouncer,
    notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher},
    DebounceEventResult, Debouncer, FileIdMap,
};
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// A file system watcher with debouncing for a translation directory
type TargetWatcher = Debouncer<RecommendedWatcher, FileIdMap>;

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

pub struct WatchService {
    watchers: Mutex<HashMap<PathBuf, TargetWatcher>>,
    orchestrators: Arc<Vec<Arc<BuildOrchestrator>>>,
    tx: UnboundedSender<PathBuf>,
    dispatcher: JoinHandle<()>,
    debounce: Duration,
}

impl WatchService {
    /// Spawns the dispatcher on the current tokio runtime.
    pub fn new(orchestrators: Vec<Arc<BuildOrchestrator>>, debounce: Duration) -> Self {
        let orchestrators = Arc::new(orchestrators);
        let (tx, rx) = unbounded_channel::<PathBuf>();
        let dispatcher = tokio::spawn(dispatch_changes(orchestrators.clone(), rx));
        WatchService {
            watchers: Mutex::new(HashMap::new()),
            orchestrators,
            tx,
            dispatcher,
            debounce,
        }
    }

    pub fn orchestrators(&self) -> &[Arc<BuildOrchestrator>] {
        &self.orchestrators
    }

    /// Watches every target's translation directory. Directories shared by several targets
    /// are watched once.
    pub fn watch_all(&self) -> Result<(), BundlerError> {
        let mut dirs: Vec<PathBuf> = self
            .orchestrators
            .iter()
            .map(|o| o.config().translation_dir.clone())
            .collect();
        dirs.sort();
        dirs.dedup();
        for dir in dirs.iter() {
            self.watch(dir)?;
        }
        Ok(())
    }

    pub fn watch(&self, dir: &Path) -> Result<(), BundlerError> {
        let mut watchers = self.watchers.lock();
        if watchers.contains_key(dir) {
            return Err(BundlerError::Custom(format!(
                "WatchService already contains a file watcher for {dir:?}"
            )));
        }

        // Generated sources may live next to translations; writing them must not loop back.
        let generated: Vec<PathBuf> = self
            .orchestrators
            .iter()
            .filter_map(|o| std::path::absolute(&o.config().generated_path).ok())
            .collect();
        let tx = self.tx.clone();
        let mut debouncer = new_debouncer(
            self.debounce,
            None,
            move |result: DebounceEventResult| match result {
                Ok(events) => {
                    for event in events.iter() {
                        if !matches!(
                            event.event.kind,
                            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                        ) {
                            continue;
                        }
                        for path in event.paths.iter() {
                            if is_hidden(path) || generated.iter().any(|g| g == path) {
                                continue;
                            }
                            tracing::debug!("[WatchService] Change detected: {:?}", path);
                            if tx.send(path.clone()).is_err() {
                                tracing::warn!("[WatchService] Dispatcher stopped, dropping {:?}", path);
                            }
                        }
                    }
                }
                Err(errors) => {
                    tracing::error!("Notify debouncer returned errors: {:?}", errors);
                }
            },
        )?;
        debouncer.watcher().watch(dir, RecursiveMode::Recursive)?;
        tracing::info!("[WatchService] Watching {:?}", dir);
        watchers.insert(dir.to_path_buf(), debouncer);
        Ok(())
    }

    pub fn unwatch(&self, dir: &Path) -> Result<(), BundlerError> {
        if let Some(mut debouncer) = self.watchers.lock().remove(dir) {
            let unwatch_res = debouncer.watcher().unwatch(dir);
            tracing::debug!("Unwatch_res(path: {:?}) = {:?}", dir, unwatch_res);
            unwatch_res?;
        }
        Ok(())
    }

    /// Feeds a path to the dispatcher as if the watcher had reported it.
    pub fn dispatch(&self, path: PathBuf) -> Result<(), BundlerError> {
        self.tx
            .send(path)
            .map_err(|e| BundlerError::Custom(format!("dispatcher stopped: {e}")))
    }
}

impl Drop for WatchService {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}

async fn dispatch_changes(
    orchestrators: Arc<Vec<Arc<BuildOrchestrator>>>,
    mut rx: UnboundedReceiver<PathBuf>,
) {
    while let Some(path) = rx.recv().await {
        let Some(orchestrator) = route_change(&orchestrators, &path).cloned() else {
            tracing::debug!("[WatchService] No target owns {:?}, ignoring", path);
            continue;
        };
        tokio::spawn(async move {
            let id = orchestrator.id().clone();
            match orchestrator.trigger(BuildTrigger::SourceChanged(path)).await {
                Ok(TriggerOutcome::Completed { builds, report }) => tracing::info!(
                    "[WatchService] Rebuilt '{}' ({} build(s), {} bundle(s), reloaded={})",
                    id,
                    builds,
                    report.bundles.len(),
                    report.reloaded
                ),
                Ok(TriggerOutcome::Coalesced) => {
                    tracing::debug!("[WatchService] Change folded into running build of '{}'", id)
                }
                Err(e) => tracing::error!("[WatchService] Rebuild of '{}' failed: {}", id, e),
            }
        });
    }
}
