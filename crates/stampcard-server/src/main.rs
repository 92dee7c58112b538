//! stampcard pass service
//!
//! Wallet web service, lifecycle sweeps and offline stamp previews.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use stampcard_core::Config;
use stampcard_core::config::{OfferDesign, load_config};
use stampcard_core::tracing_init::init_tracing;
use stampcard_render::{CanvasKind, Rgb, StampRenderer, StampVisual};
use stampcard_server::lifecycle::{
    LifecycleManager, LifecyclePolicy, SweepOptions, SweepReport, spawn_sweep_loop,
};
use stampcard_server::push::{ApnsDispatcher, NoopDispatcher, PushDispatcher};
use stampcard_server::routes::build_router;
use stampcard_server::storage::PassDatabase;

#[derive(Parser, Debug)]
#[command(name = "stampcard-server")]
#[command(version, about = "stampcard pass service - wallet web service and lifecycle sweeps")]
struct Cli {
    /// Path to a JSON settings file layered over the global settings.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to the SQLite database file.
    #[arg(long, global = true, env = "STAMPCARD_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the wallet web service and the periodic sweep.
    Serve {
        /// Address to listen on (overrides `server.addr`).
        #[arg(long)]
        addr: Option<SocketAddr>,
    },

    /// Run one lifecycle sweep and print its report.
    Sweep {
        /// Report what would change without writing.
        #[arg(long)]
        dry_run: bool,

        /// Grace period for completed passes without a scheduled expiration.
        /// Passes completed through progress events already carry their
        /// deadline and ignore this.
        #[arg(long)]
        grace_days: Option<u32>,

        /// Days an expired pass is kept before it is soft deleted.
        #[arg(long)]
        retention_days: Option<u32>,
    },

    /// Render a progress image to a PNG file.
    Render {
        #[arg(long)]
        earned: u32,

        #[arg(long)]
        required: u32,

        #[arg(long, default_value = "stamp")]
        icon: String,

        /// Canvas profile: strip or thumbnail.
        #[arg(long, default_value = "strip")]
        profile: CanvasKind,

        /// Background color (`#RRGGBB`).
        #[arg(long)]
        background: Option<String>,

        /// Glyph color (`#RRGGBB`).
        #[arg(long)]
        foreground: Option<String>,

        #[arg(long)]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    let level = &config.server.log_level;
    init_tracing(
        &format!("stampcard_server={level},stampcard_render={level}"),
        cli.log_json,
    );

    match cli.command {
        Command::Serve { addr } => serve(&config, cli.db_path.as_deref(), addr).await,
        Command::Sweep {
            dry_run,
            grace_days,
            retention_days,
        } => {
            let options = SweepOptions {
                grace_days: grace_days.unwrap_or(config.lifecycle.grace_days),
                retention_days: retention_days.unwrap_or(config.lifecycle.retention_days),
                dry_run,
            };
            sweep_once(&config, cli.db_path.as_deref(), &options).await
        }
        Command::Render {
            earned,
            required,
            icon,
            profile,
            background,
            foreground,
            out,
        } => {
            let renderer = StampRenderer::from_config(&config.render)?;
            let design = OfferDesign::default();
            let background = background.unwrap_or(design.background_color);
            let foreground = foreground.unwrap_or(design.foreground_color);
            let visual = StampVisual::new(icon, earned, required, renderer.profile(profile))
                .with_colors(
                    Rgb::parse_or(&background, Rgb::BLACK),
                    Rgb::parse_or(&foreground, Rgb::WHITE),
                );
            let image = renderer.render(&visual, None, None);
            std::fs::write(&out, &image.png)
                .with_context(|| format!("Failed to write {}", out.display()))?;
            info!(
                path = %out.display(),
                width = image.width,
                height = image.height,
                content_tag = %image.content_tag,
                "Preview written"
            );
            Ok(())
        }
    }
}

async fn open_database(config: &Config, db_path: Option<&Path>) -> anyhow::Result<PassDatabase> {
    let path = db_path
        .map(Path::to_path_buf)
        .or_else(|| config.server.database_path.clone())
        .or_else(stampcard_core::config::database_path)
        .ok_or_else(|| anyhow::anyhow!("Cannot determine database path; pass --db-path"))?;

    info!(path = %path.display(), "Opening pass database");
    Ok(PassDatabase::open(&path).await?)
}

fn push_dispatcher(config: &Config) -> anyhow::Result<Arc<dyn PushDispatcher>> {
    if config.push.enabled {
        Ok(Arc::new(ApnsDispatcher::new(
            &config.push,
            &config.server.pass_type_identifier,
        )?))
    } else {
        warn!("Push delivery disabled; devices only see updates when they poll");
        Ok(Arc::new(NoopDispatcher))
    }
}

async fn serve(
    config: &Config,
    db_path: Option<&Path>,
    addr: Option<SocketAddr>,
) -> anyhow::Result<()> {
    let addr: SocketAddr = match addr {
        Some(addr) => addr,
        None => config
            .server
            .addr
            .parse()
            .with_context(|| format!("Invalid listen address {}", config.server.addr))?,
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %addr,
        "Starting stampcard-server"
    );

    let db = open_database(config, db_path).await?;
    let renderer = StampRenderer::from_config(&config.render)?;
    let manager = Arc::new(LifecycleManager::new(
        db.clone(),
        push_dispatcher(config)?,
        LifecyclePolicy::from(&config.lifecycle),
    ));

    let sweeper = spawn_sweep_loop(
        Arc::clone(&manager),
        Duration::from_secs(config.lifecycle.sweep_interval_secs.max(1)),
        SweepOptions::from(manager.policy()),
    );

    let app = build_router(stampcard_server::app_state(config, db, renderer));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tokio::select! {
        result = axum::serve(listener, app).into_future() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    sweeper.abort();
    info!("Server stopped");
    Ok(())
}

async fn sweep_once(
    config: &Config,
    db_path: Option<&Path>,
    options: &SweepOptions,
) -> anyhow::Result<()> {
    let db = open_database(config, db_path).await?;
    let manager = LifecycleManager::new(
        db,
        push_dispatcher(config)?,
        LifecyclePolicy::from(&config.lifecycle),
    );
    let report = manager.sweep(options).await?;
    print_report(&report)
}

#[allow(clippy::print_stdout)]
fn print_report(report: &SweepReport) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}
