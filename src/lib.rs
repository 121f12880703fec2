//! # locale-bundler
//!
//! Build-time orchestration for per-language translation bundles.
//!
//! An external code generator turns a directory of translation sources into a generated
//! source module plus, optionally, one JSON bundle per `(identifier, language)` pair. This
//! crate runs that generator on startup and whenever a source changes, gives every bundle a
//! content-addressed request path, keeps the registry of live bundles current, and feeds it to
//! the places a web build needs it:
//!
//! - a virtual module mapping `identifier.language` to request paths
//! - HTML templates whose `__LOCALE_BUNDLE_<name>__` placeholders expand into one document per
//!   language
//! - a development router that serves bundles from memory and tracks the language the client
//!   is viewing, so only edits to that language reload the page
//!
//! ## Architecture
//!
//! - **[`config`]**: build targets, generator command, HTML and dev server settings
//! - **[`addresser`]**: bundle file name grammar and content hashing
//! - **[`registry`]** / **[`state`]**: the live bundle registry, its language catalog and the
//!   active language, shared between all collaborators
//! - **[`generator`]**: the generator seam (`TranslationGenerator`) and its external command
//!   implementation
//! - **[`orchestrator`]**: one serialized build pipeline per target
//! - **[`virtual_module`]**, **[`html`]**, **[`router`]**, **[`notifier`]**: consumers of the
//!   registry
//! - **[`watch`]** (feature `service`): debounced file watching feeding the orchestrators
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use locale_bundler::{
//!     config::BundlerConfig,
//!     emit::FsEmitter,
//!     generator::CommandGenerator,
//!     orchestrator::{BuildMode, BuildOrchestrator, BuildTrigger},
//!     state::AssetState,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BundlerConfig::from_file("locale-bundler.toml")?;
//!     let generator = Arc::new(CommandGenerator::try_from(&config.generator)?);
//!     let state = AssetState::shared();
//!     let emitter = Arc::new(FsEmitter::new("dist"));
//!
//!     for target in config.targets.iter() {
//!         let orchestrator = BuildOrchestrator::new(
//!             target.clone(),
//!             generator.clone(),
//!             state.clone(),
//!             BuildMode::Production(emitter.clone()),
//!         );
//!         orchestrator.trigger(BuildTrigger::Start).await?;
//!     }
//!     println!("{:?}", state.registry().snapshot());
//!     Ok(())
//! }
//! ```

pub mod addresser;
pub mod config;
pub mod emit;
pub mod error;
pub mod generator;
pub mod html;
pub mod notifier;
pub mod orchestrator;
pub mod registry;
pub mod router;
pub mod state;
#[cfg(test)]
mod tests;
pub mod virtual_module;
#[cfg(feature = "service")]
pub mod watch;

pub use error::*;
