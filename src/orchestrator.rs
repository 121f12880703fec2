//! Runs the translation generator for one build target and reconciles its output.
//!
//! ## Lifecycle
//!
//! Each target moves through `Idle → Generating → Reconciling → Idle`. Only one build is in
//! flight per target. A trigger that arrives while a build is running is folded into a single
//! pending slot; when the running build finishes, the slot is drained and exactly one
//! follow-up build runs for everything collected meanwhile. Triggers are never dropped and a
//! build is never run twice for the same trigger.
//!
//! ```text
//!   trigger ──► Idle? ──yes──► Generating ──► Reconciling ──► pending? ──no──► Idle
//!                 │                  ▲                            │
//!                 no                 └────────────yes─────────────┘
//!                 ▼
//!          add to pending slot
//! ```
//!
//! ## Reconciliation
//!
//! 1. Every bundle is addressed and checked for duplicates and identities owned by another
//!    target. A failed check ends the build before anything on disk or in the registry changes.
//! 2. The generated source is written only when it differs from what is on disk, so identical
//!    output never triggers downstream rebuilds.
//! 3. For dynamic targets every bundle is emitted (production builds) and upserted into the
//!    shared registry. Bundles the generator stopped producing are pruned.
//! 4. In development builds triggered by a source change, the reload notifier decides whether
//!    clients viewing the changed language must reload.
//!
//! Builds are not cancellable. A generator call that never returns stalls this target's
//! pipeline; other targets are unaffected.

use crate::{
    addresser::{AddressedBundle, BundleIdentity, ContentAddresser},
    config::{TargetConfig, TargetId, TargetMode},
    emit::AssetEmitter,
    error::BundlerError,
    generator::{collect_sources, GeneratedModule, TranslationGenerator},
    notifier::ReloadNotifier,
    state::SharedState,
};
use parking_lot::Mutex;
use std::{
    collections::BTreeSet,
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BuildState {
    #[default]
    Idle,
    Generating,
    Reconciling,
}

#[derive(Clone)]
pub enum BuildMode {
    /// Bundles are only registered for the dev server.
    Development,
    /// Bundles are registered and handed to the emitter.
    Production(Arc<dyn AssetEmitter>),
}

impl BuildMode {
    pub fn is_development(&self) -> bool {
        matches!(self, BuildMode::Development)
    }
}

impl fmt::Debug for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildMode::Development => write!(f, "Development"),
            BuildMode::Production(_) => write!(f, "Production"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildTrigger {
    /// Initial build when the host build starts.
    Start,
    /// A file under the target's translation directory changed.
    SourceChanged(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub target: TargetId,
    pub sources: usize,
    /// Whether the generated source file was (re)written.
    pub source_written: bool,
    /// Request paths registered by this build.
    pub bundles: Vec<String>,
    /// Identities that disappeared from the generator output.
    pub pruned: Vec<BundleIdentity>,
    /// Source changes this build covered.
    pub changed: Vec<PathBuf>,
    pub reloaded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// This call ran `builds` builds back to back; `report` is the last one.
    Completed { builds: usize, report: BuildReport },
    /// A build was already running; the trigger was queued for its follow-up.
    Coalesced,
}

#[derive(Debug, Default)]
struct BuildSlot {
    state: BuildState,
    pending: Option<BTreeSet<PathBuf>>,
    generator_runs: usize,
}

pub struct BuildOrchestrator {
    config: TargetConfig,
    generator: Arc<dyn TranslationGenerator>,
    state: SharedState,
    mode: BuildMode,
    notifier: Option<ReloadNotifier>,
    slot: Mutex<BuildSlot>,
}

impl BuildOrchestrator {
    pub fn new(
        config: TargetConfig,
        generator: Arc<dyn TranslationGenerator>,
        state: SharedState,
        mode: BuildMode,
    ) -> Self {
        BuildOrchestrator {
            config,
            generator,
            state,
            mode,
            notifier: None,
            slot: Mutex::new(BuildSlot::default()),
        }
    }

    pub fn with_notifier(mut self, notifier: ReloadNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn id(&self) -> &TargetId {
        &self.config.name
    }

    pub fn config(&self) -> &TargetConfig {
        &self.config
    }

    pub fn build_state(&self) -> BuildState {
        self.slot.lock().state
    }

    /// Number of generator invocations so far.
    pub fn generator_runs(&self) -> usize {
        self.slot.lock().generator_runs
    }

    /// Whether `path` lies inside this target's translation directory.
    pub fn owns(&self, path: &Path) -> bool {
        let (Ok(dir), Ok(path)) = (
            std::path::absolute(&self.config.translation_dir),
            std::path::absolute(path),
        ) else {
            return false;
        };
        path.starts_with(dir)
    }

    /// Starts a build, or queues the trigger if one is already running for this target.
    pub async fn trigger(&self, trigger: BuildTrigger) -> Result<TriggerOutcome, BundlerError> {
        let mut changed: BTreeSet<PathBuf> = match trigger {
            BuildTrigger::Start => BTreeSet::new(),
            BuildTrigger::SourceChanged(path) => BTreeSet::from([path]),
        };

        {
            let mut slot = self.slot.lock();
            if slot.state != BuildState::Idle {
                tracing::info!(
                    "[BuildOrchestrator] Target '{}' is busy ({:?}), queueing follow-up build",
                    self.config.name,
                    slot.state
                );
                slot.pending.get_or_insert_with(BTreeSet::new).extend(changed);
                return Ok(TriggerOutcome::Coalesced);
            }
            // Left behind by an interrupted build
            if let Some(leftover) = slot.pending.take() {
                changed.extend(leftover);
            }
            slot.state = BuildState::Generating;
        }

        let mut active = ActiveBuild {
            orchestrator: self,
            in_flight: changed,
            finished: false,
        };
        let mut builds = 0;
        loop {
            builds += 1;
            let result = self.build(&active.in_flight).await;

            let next = {
                let mut slot = self.slot.lock();
                match slot.pending.take() {
                    Some(next) => {
                        slot.state = BuildState::Generating;
                        Some(next)
                    }
                    None => {
                        slot.state = BuildState::Idle;
                        active.finished = true;
                        None
                    }
                }
            };

            match (result, next) {
                (Ok(report), None) => return Ok(TriggerOutcome::Completed { builds, report }),
                (Err(e), None) => return Err(e),
                (Ok(_), Some(next)) => active.in_flight = next,
                (Err(e), Some(next)) => {
                    tracing::error!(
                        "[BuildOrchestrator] Build for '{}' failed, running queued follow-up: {}",
                        self.config.name,
                        e
                    );
                    active.in_flight = next;
                }
            }
        }
    }

    fn set_state(&self, state: BuildState) {
        self.slot.lock().state = state;
    }

    #[tracing::instrument(skip_all, fields(target = %self.config.name))]
    async fn build(&self, changed: &BTreeSet<PathBuf>) -> Result<BuildReport, BundlerError> {
        self.set_state(BuildState::Generating);
        let sources = collect_sources(&self.config.translation_dir)?;
        let dev_mode = self
            .config
            .dev_mode
            .unwrap_or_else(|| self.mode.is_development());

        tracing::info!(
            "[BuildOrchestrator] Generating '{}' from {} source(s), dev_mode={}",
            self.config.name,
            sources.len(),
            dev_mode
        );
        self.slot.lock().generator_runs += 1;
        let module = self
            .generator
            .generate(&self.config, &sources, dev_mode)
            .await?;

        self.set_state(BuildState::Reconciling);
        let addressed = self.address_bundles(&module)?;
        let source_written =
            write_if_changed(&self.config.generated_path, &module.generated_source).await?;
        let (bundles, pruned) = self.reconcile_bundles(addressed).await?;

        let reloaded = match (&self.mode, &self.notifier) {
            (BuildMode::Development, Some(notifier)) if !changed.is_empty() => {
                notifier.notify_changes(&self.state, changed.iter())
            }
            _ => false,
        };

        tracing::info!(
            "[BuildOrchestrator] '{}' reconciled: {} bundle(s), source_written={}, reloaded={}",
            self.config.name,
            bundles.len(),
            source_written,
            reloaded
        );

        Ok(BuildReport {
            target: self.config.name.clone(),
            sources: sources.len(),
            source_written,
            bundles,
            pruned,
            changed: changed.iter().cloned().collect(),
            reloaded,
        })
    }

    /// Addresses every bundle and checks it against the registry. Fails before anything is
    /// written or registered.
    fn address_bundles<'m>(
        &self,
        module: &'m GeneratedModule,
    ) -> Result<Vec<(AddressedBundle, &'m str)>, BundlerError> {
        let opts = match &self.config.mode {
            TargetMode::Dynamic(opts) => opts,
            TargetMode::Inline => {
                if !module.bundles.is_empty() {
                    return Err(BundlerError::InvariantViolation(format!(
                        "target '{}' is inline but the generator produced {} bundle(s); inline targets have no bundles to emit",
                        self.config.name,
                        module.bundles.len()
                    )));
                }
                return Ok(Vec::new());
            }
        };

        let addresser = ContentAddresser::from(opts);
        let mut addressed: Vec<(AddressedBundle, &str)> = Vec::with_capacity(module.bundles.len());
        let mut seen = BTreeSet::new();
        for bundle in module.bundles.iter() {
            let bundle_address = addresser.address(&bundle.filename, &bundle.content)?;
            if !seen.insert(bundle_address.identity.clone()) {
                return Err(BundlerError::InvariantViolation(format!(
                    "generator produced bundle '{}' more than once for target '{}'",
                    bundle_address.identity, self.config.name
                )));
            }
            addressed.push((bundle_address, bundle.content.as_str()));
        }

        let registry = self.state.registry();
        for (bundle_address, _) in addressed.iter() {
            if let Some(entry) = registry.lookup_by_identity(&bundle_address.identity) {
                if entry.target != self.config.name {
                    return Err(BundlerError::Config(format!(
                        "bundle '{}' is produced by both target '{}' and target '{}'",
                        bundle_address.identity, entry.target, self.config.name
                    )));
                }
            }
        }
        Ok(addressed)
    }

    /// Emits (production builds) and registers addressed bundles, then prunes the ones this
    /// target no longer produces. The registry is untouched if any emit fails.
    async fn reconcile_bundles(
        &self,
        addressed: Vec<(AddressedBundle, &str)>,
    ) -> Result<(Vec<String>, Vec<BundleIdentity>), BundlerError> {
        if let BuildMode::Production(emitter) = &self.mode {
            for (bundle_address, content) in addressed.iter() {
                emitter.emit(&bundle_address.file_name, content).await?;
            }
        }

        let live: BTreeSet<BundleIdentity> = addressed
            .iter()
            .map(|(bundle_address, _)| bundle_address.identity.clone())
            .collect();
        let mut registry = self.state.registry_mut();
        let mut paths = Vec::with_capacity(addressed.len());
        for (bundle_address, content) in addressed {
            tracing::debug!(
                "[BuildOrchestrator] Registering {} at {}",
                bundle_address.identity,
                bundle_address.request_path
            );
            paths.push(bundle_address.request_path.clone());
            registry.upsert(
                bundle_address.identity,
                bundle_address.request_path,
                content.to_string(),
                self.config.name.clone(),
            );
        }
        let pruned = registry.prune(&self.config.name, &live);
        if !pruned.is_empty() {
            tracing::info!(
                "[BuildOrchestrator] Pruned {} bundle(s) no longer produced by '{}'",
                pruned.len(),
                self.config.name
            );
        }
        Ok((paths, pruned))
    }
}

/// Returns a target to `Idle` when its build loop is abandoned mid-build, by a panicking
/// generator or a dropped trigger future. The changes of the abandoned build go back into the
/// pending slot so the next trigger covers them.
struct ActiveBuild<'a> {
    orchestrator: &'a BuildOrchestrator,
    in_flight: BTreeSet<PathBuf>,
    finished: bool,
}

impl Drop for ActiveBuild<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let mut slot = self.orchestrator.slot.lock();
        slot.state = BuildState::Idle;
        if !self.in_flight.is_empty() {
            slot.pending
                .get_or_insert_with(BTreeSet::new)
                .append(&mut self.in_flight);
        }
        tracing::warn!(
            "[BuildOrchestrator] Build for '{}' was interrupted; {} change(s) kept for the next trigger",
            self.orchestrator.config.name,
            slot.pending.as_ref().map_or(0, BTreeSet::len)
        );
    }
}

/// Writes `text` to `path` unless the file already holds exactly that text. A file that is
/// missing or unreadable counts as different. Returns whether a write happened.
pub async fn write_if_changed(path: &Path, text: &str) -> Result<bool, BundlerError> {
    let unchanged = match tokio::fs::read_to_string(path).await {
        Ok(existing) => existing == text,
        Err(e) => {
            tracing::debug!(
                "[BuildOrchestrator] Could not read {:?} ({}), writing it",
                path,
                e
            );
            false
        }
    };
    if unchanged {
        tracing::debug!("[BuildOrchestrator] {:?} is up to date", path);
        return Ok(false);
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, text).await?;
    Ok(true)
}

/// Picks the first target whose translation directory contains `path`. Changes are never
/// fanned out to several targets.
pub fn route_change<'a>(
    orchestrators: &'a [Arc<BuildOrchestrator>],
    path: &Path,
) -> Option<&'a Arc<BuildOrchestrator>> {
    orchestrators.iter().find(|orchestrator| orchestrator.owns(path))
}
