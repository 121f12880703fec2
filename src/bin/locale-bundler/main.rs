//! locale-bundler CLI
//!
//! ## Commands
//!
//! - `build`: run every target's generator once, emit content-addressed bundles and one HTML
//!   document per language into the output directory
//! - `serve`: build, then watch the translation directories and run the development server
//!
//! Both commands read `locale-bundler.toml` from the current directory unless `--config` says
//! otherwise.

mod dev_server;

use clap::{Parser, Subcommand};
use locale_bundler::{
    config::{BundlerConfig, DEFAULT_CONFIG_FILE},
    emit::FsEmitter,
    generator::CommandGenerator,
    html::HtmlMultiplexer,
    notifier::ReloadNotifier,
    orchestrator::{BuildMode, BuildOrchestrator, BuildTrigger, TriggerOutcome},
    state::AssetState,
    watch::{WatchService, DEFAULT_DEBOUNCE},
    BundlerError,
};
use std::{path::PathBuf, sync::Arc};
use tokio::sync::Notify;

#[derive(Parser)]
#[command(name = "locale-bundler")]
#[command(author, version, about = "Builds and serves per-language translation bundles", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build every target once and write bundles and HTML documents
    Build {
        /// Output directory
        #[arg(short, long, default_value = "dist")]
        out: PathBuf,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Watch translation sources and serve the site with live reload
    Serve {
        /// Port for dev server (defaults to server.port from the configuration)
        #[arg(long)]
        port: Option<u16>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = BundlerConfig::from_file(&cli.config)?;

    match cli.command {
        Commands::Build { out, verbose } => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            runtime.block_on(build(config, out, verbose))?;
            Ok(())
        }
        Commands::Serve { port } => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(serve(config, port))
        }
    }
}

async fn build(config: BundlerConfig, out: PathBuf, verbose: bool) -> Result<(), BundlerError> {
    let generator = Arc::new(CommandGenerator::try_from(&config.generator)?);
    let state = AssetState::shared();
    let emitter = Arc::new(FsEmitter::new(&out));

    for target in config.targets.iter() {
        let orchestrator = BuildOrchestrator::new(
            target.clone(),
            generator.clone(),
            state.clone(),
            BuildMode::Production(emitter.clone()),
        );
        if let TriggerOutcome::Completed { report, .. } =
            orchestrator.trigger(BuildTrigger::Start).await?
        {
            println!(
                "{}: {} source(s), {} bundle(s){}",
                report.target,
                report.sources,
                report.bundles.len(),
                if report.source_written {
                    ", generated source updated"
                } else {
                    ""
                }
            );
            if verbose {
                for path in report.bundles.iter() {
                    println!("  {path}");
                }
            }
        }
    }

    let multiplexer = HtmlMultiplexer::from_config(state, &config)?;
    for document in config.html.documents.iter() {
        let html = std::fs::read_to_string(config.server.root.join(document))?;
        let fan_out = multiplexer.fan_out(&html, &document.to_string_lossy())?;
        fan_out.emit_all(emitter.as_ref()).await?;
        if verbose {
            for doc in fan_out.documents() {
                println!("  {}", doc.path);
            }
        }
    }

    println!("Output written to {}", out.display());
    Ok(())
}

async fn serve(config: BundlerConfig, port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let generator = Arc::new(CommandGenerator::try_from(&config.generator)?);
    let state = AssetState::shared();
    let notifier = ReloadNotifier::new();

    let mut orchestrators = Vec::with_capacity(config.targets.len());
    for target in config.targets.iter() {
        let orchestrator = Arc::new(
            BuildOrchestrator::new(
                target.clone(),
                generator.clone(),
                state.clone(),
                BuildMode::Development,
            )
            .with_notifier(notifier.clone()),
        );
        // A broken source should not keep the server from starting; the next edit retries.
        if let Err(e) = orchestrator.trigger(BuildTrigger::Start).await {
            tracing::error!("Initial build of '{}' failed: {}", target.name, e);
        }
        orchestrators.push(orchestrator);
    }

    let service = WatchService::new(orchestrators, DEFAULT_DEBOUNCE);
    service.watch_all()?;

    // Set up Ctrl-C handler
    let shutdown = Arc::new(Notify::new());
    let signal = shutdown.clone();
    ctrlc::set_handler(move || {
        println!("\nShutting down...");
        signal.notify_one();
    })?;

    let port = port.unwrap_or(config.server.port);
    let dev_server = dev_server::DevServer::new(&config, state, notifier, port)?;
    dev_server
        .serve(async move { shutdown.notified().await })
        .await?;

    for target in config.targets.iter() {
        service.unwatch(&target.translation_dir)?;
    }
    println!("Shutdown complete");
    Ok(())
}
