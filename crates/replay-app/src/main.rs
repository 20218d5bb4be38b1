//! Replay - offline viewer for web archives.
//!
//! This is the main binary that runs the full application:
//! - Interception front serving the UI bundle, archived pages and live traffic
//! - Control API through which the archive service answers lookups

use std::panic;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use directories::ProjectDirs;
use replay_proxy::{
    launch_url, ArchiveContext, ArchiveResolver, LaunchTarget, LiveProxy, MemoryBlobStore,
    PassthroughRewriter, PendingResolutions, RequestRouter, ResolverConfig, RouterConfig,
};
use replay_server::{AppState, Server, ServerConfig};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Replay - offline viewer for web archives
#[derive(Parser, Debug)]
#[command(name = "replay", version, about)]
struct Args {
    /// Archive file to open at startup
    source: Option<PathBuf>,

    /// Page inside the archive to open
    #[arg(long, requires = "source")]
    url: Option<String>,

    /// Capture timestamp of the page to open
    #[arg(long, requires = "source")]
    ts: Option<String>,

    /// Directory holding the UI bundle
    #[arg(long, default_value = "./")]
    content_root: PathBuf,

    /// Port of the local origin
    #[arg(long, default_value_t = replay_proxy::DEFAULT_ORIGIN_PORT)]
    port: u16,

    /// Port of the control API
    #[arg(long, default_value_t = replay_server::DEFAULT_CONTROL_PORT)]
    control_port: u16,

    /// User-Agent sent on live requests
    #[arg(long)]
    user_agent: Option<String>,

    /// Give up on archive lookups after this many seconds (default: wait forever)
    #[arg(long)]
    lookup_timeout_secs: Option<u64>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Get the logs directory path.
fn logs_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "replay", "Replay").map(|dirs| dirs.data_dir().join("logs"))
}

/// Initialize logging with file rotation.
fn init_logging(args: &Args) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_level = if args.debug { "debug" } else { &args.log_level };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("replay={},warn", log_level)));

    if let Some(log_dir) = logs_dir() {
        if std::fs::create_dir_all(&log_dir).is_ok() {
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .max_log_files(5)
                .filename_prefix("replay")
                .filename_suffix("log")
                .build(&log_dir)
                .ok();

            if let Some(appender) = file_appender {
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);

                if args.debug {
                    tracing_subscriber::registry()
                        .with(env_filter)
                        .with(fmt::layer().with_writer(std::io::stdout))
                        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                        .init();
                } else {
                    tracing_subscriber::registry()
                        .with(env_filter)
                        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                        .init();
                }

                tracing::info!("Logging to {:?}", log_dir);
                return Some(guard);
            }
        }
    }

    // Fallback: console logging only
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::warn!("File logging unavailable, using console only");
    None
}

/// Wire the router and both servers from the command line.
fn build_server(args: &Args) -> anyhow::Result<Server> {
    let (lookup_tx, lookup_rx) = tokio::sync::mpsc::unbounded_channel();
    let blobs = MemoryBlobStore::new();

    let mut resolver_config = ResolverConfig::default();
    if let Some(secs) = args.lookup_timeout_secs {
        resolver_config = resolver_config.with_lookup_timeout(Duration::from_secs(secs));
    }
    let archive = ArchiveResolver::new(
        ArchiveContext::new(),
        PendingResolutions::new(),
        Arc::new(lookup_tx),
        Arc::new(PassthroughRewriter),
    )
    .with_config(resolver_config);

    let mut live = LiveProxy::new(Arc::new(blobs.clone()))?;
    if let Some(ua) = &args.user_agent {
        live = live.with_user_agent(ua);
    }

    let router_config = RouterConfig::new(&args.content_root).with_port(args.port);
    let router = RequestRouter::new(router_config, archive, live);

    let server_config = ServerConfig::default()
        .with_port(args.port)
        .with_control_port(args.control_port);

    Ok(Server::new(
        server_config,
        AppState::new(router, lookup_rx, blobs),
    )?)
}

fn launch_target(args: &Args) -> LaunchTarget {
    LaunchTarget {
        source_file: args.source.clone(),
        url: args.url.clone(),
        timestamp: args.ts.clone(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Keep guard alive for the duration of the program
    let _log_guard = init_logging(&args);

    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        tracing::error!("PANIC: {}", panic_info);
        default_hook(panic_info);
    }));

    tracing::info!("Starting Replay...");
    tracing::info!("Args: {:?}", args);

    let server = build_server(&args)?;

    let router_config = RouterConfig::new(&args.content_root).with_port(args.port);
    tracing::info!(
        "Open {}",
        launch_url(&router_config, &launch_target(&args))
    );

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted"),
    }

    tracing::info!("Replay shutting down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(["replay"]).unwrap();
        assert_eq!(args.port, 5471);
        assert_eq!(args.control_port, 5472);
        assert_eq!(args.content_root, PathBuf::from("./"));
        assert!(args.lookup_timeout_secs.is_none());
        assert_eq!(launch_target(&args), LaunchTarget::default());
    }

    #[test]
    fn source_with_page() {
        let args = Args::try_parse_from([
            "replay",
            "/data/a.wacz",
            "--url",
            "https://example.com/",
            "--ts",
            "20230101000000",
        ])
        .unwrap();
        assert_eq!(
            launch_target(&args),
            LaunchTarget::file("/data/a.wacz")
                .with_url("https://example.com/")
                .with_timestamp("20230101000000")
        );
    }

    #[test]
    fn page_requires_source() {
        assert!(Args::try_parse_from(["replay", "--url", "https://example.com/"]).is_err());
    }

    #[tokio::test]
    async fn server_uses_requested_ports() {
        let args = Args::try_parse_from([
            "replay",
            "--port",
            "8100",
            "--control-port",
            "8101",
            "--lookup-timeout-secs",
            "30",
        ])
        .unwrap();
        let server = build_server(&args).unwrap();
        assert_eq!(server.addr().port(), 8100);
        assert_eq!(server.control_addr().port(), 8101);
    }
}
