use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use specd::{
    config::{Mode, ServerConfig},
    html_api::ingest,
    server, tree, AppContext,
};

#[derive(Parser)]
#[command(
    name = "specd",
    about = "Living style-guide server with the Clarify section-extraction pipeline",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// HTTP server port
    #[arg(long, short = 'p', env = "SPECD_PORT")]
    port: Option<u16>,

    /// Bind hostname (default: 127.0.0.1; use 0.0.0.0 for LAN access)
    #[arg(long, env = "SPECD_HOSTNAME")]
    hostname: Option<String>,

    /// Root of the managed spec tree (default: current directory)
    #[arg(long, env = "SPECD_CONTENT_DIR")]
    content_dir: Option<PathBuf>,

    /// Data directory for the section cache (default: {content_dir}/.specd)
    #[arg(long, env = "SPECD_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "SPECD_LOG")]
    log: Option<String>,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "SPECD_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Server mode: development (default) or production
    #[arg(long, env = "SPECD_MODE")]
    mode: Option<Mode>,

    /// Directory with the core-bundled clarify templates
    #[arg(long, env = "SPECD_CORE_VIEWS")]
    core_views: Option<PathBuf>,

    /// Run with the content-tree watcher disabled
    #[arg(long)]
    no_watch: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Start the server (default when no subcommand given).
    Serve,
    /// Scan the content tree and print the discovered specs.
    Scan,
    /// Refresh the cached section API for every spec.
    ///
    /// Requires a running specd instance to fetch the pages from; use this
    /// to warm the cache after bulk markup edits.
    Refresh,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let content_dir = args
        .content_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("."))
        .canonicalize()
        .context("content directory does not exist")?;

    let config = ServerConfig::new(
        args.port,
        args.hostname.clone(),
        content_dir,
        args.data_dir.clone(),
        args.log.clone(),
        args.mode,
        args.core_views.clone(),
        args.no_watch,
    );

    let _log_guard = init_logging(&config.log, args.log_file.as_deref());

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        match args.command.unwrap_or(Command::Serve) {
            Command::Serve => serve(config).await,
            Command::Scan => scan(config).await,
            Command::Refresh => refresh(config).await,
        }
    })
}

async fn serve(config: ServerConfig) -> Result<()> {
    let ctx = Arc::new(AppContext::new(config).await?);

    let specs = ctx.tree.scan().await?;
    info!(specs, "startup scan complete");

    // The debouncer must stay alive for the watcher to keep firing.
    let _watcher = if ctx.config.watch {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let watcher = tree::watcher::start_watcher(
            &ctx.config.content_dir,
            &ctx.config.data_dir,
            move || {
                let _ = tx.send(());
            },
        )?;

        let tree_ctx = ctx.clone();
        tokio::spawn(async move {
            while rx.recv().await.is_some() {
                if let Err(e) = tree_ctx.tree.scan().await {
                    warn!(err = %e, "watcher-triggered rescan failed");
                }
            }
        });
        Some(watcher)
    } else {
        None
    };

    server::start(ctx).await
}

async fn scan(config: ServerConfig) -> Result<()> {
    let ctx = AppContext::new(config).await?;
    ctx.tree.scan().await?;

    let mut ids = ctx.tree.spec_ids().await;
    ids.sort();
    for id in &ids {
        println!("{id}");
    }
    println!("{} specs", ids.len());
    Ok(())
}

async fn refresh(config: ServerConfig) -> Result<()> {
    let ctx = AppContext::new(config).await?;
    ctx.tree.scan().await?;

    let mut specs = Vec::new();
    for id in ctx.tree.spec_ids().await {
        if let Some(spec) = ctx.tree.lookup(&id).await {
            specs.push(spec);
        }
    }

    let refreshed =
        ingest::refresh_all(&ctx.http, &ctx.store, &ctx.config.base_url(), &specs).await;
    println!("{refreshed}/{} specs refreshed", specs.len());
    Ok(())
}

/// Set up tracing. Returns a guard that must outlive the process when
/// logging to a file — dropping it flushes the non-blocking writer.
fn init_logging(
    filter: &str,
    log_file: Option<&std::path::Path>,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let env_filter =
        EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));

    match log_file {
        Some(path) => {
            let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let file = path.file_name().map(|f| f.to_string_lossy().into_owned());
            let appender = tracing_appender::rolling::daily(
                dir,
                file.unwrap_or_else(|| "specd.log".to_string()),
            );
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(env_filter).init();
            None
        }
    }
}
