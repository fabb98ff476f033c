use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;

use aviatord::{bootstrap, config::AppConfig};

#[derive(Parser)]
#[command(
    name = "aviatord",
    about = "AviatorAI backend: always-on study-assistant daemon",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// HTTP API server port
    #[arg(long, env = "AVIATOR_PORT")]
    port: Option<u16>,

    /// Data directory for the SQLite database and config
    #[arg(long, env = "AVIATOR_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "AVIATOR_LOG")]
    log: Option<String>,

    /// Bind address for the HTTP server (default: 127.0.0.1; use 0.0.0.0 for LAN access)
    #[arg(long, env = "AVIATOR_BIND")]
    bind_address: Option<String>,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "AVIATOR_LOG_FILE")]
    log_file: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the daemon server (default when no subcommand given).
    ///
    /// Runs aviatord in the foreground.
    ///
    /// Examples:
    ///   aviatord serve
    ///   aviatord
    Serve,
    /// Show daemon status (running, version, uptime).
    ///
    /// Connects to the running daemon and prints a summary line.
    /// Exits 0 if healthy, 1 if stopped or unresponsive.
    ///
    /// Examples:
    ///   aviatord status
    ///   aviatord status --json
    Status {
        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // ── Logging setup ────────────────────────────────────────────────────────
    // Init once; must happen before any tracing calls.
    let log_level = args.log.as_deref().unwrap_or("info").to_owned();
    let log_format =
        std::env::var("AVIATOR_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());
    let _file_guard = setup_logging(&log_level, args.log_file.as_deref(), &log_format);

    match args.command {
        Some(Command::Status { json }) => {
            let config = AppConfig::new(
                args.port,
                args.data_dir,
                Some("error".to_string()),
                args.bind_address,
            );
            let exit_code = run_status(&config, json).await;
            std::process::exit(exit_code);
        }
        None | Some(Command::Serve) => {
            run_server(args.port, args.data_dir, args.log, args.bind_address).await?;
        }
    }

    Ok(())
}

async fn run_server(
    port: Option<u16>,
    data_dir: Option<std::path::PathBuf>,
    log: Option<String>,
    bind_address: Option<String>,
) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "aviatord starting");

    let config = Arc::new(AppConfig::new(port, data_dir, log, bind_address));
    info!(
        data_dir = %config.data_dir.display(),
        port = config.port,
        flow_service = config.flow_base_url.as_deref().unwrap_or("(simulated)"),
        "config loaded"
    );

    bootstrap::run(config).await
}

async fn run_status(config: &AppConfig, json: bool) -> i32 {
    let url = format!("http://127.0.0.1:{}/api/v1/health", config.port);
    let client = match reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(3))
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return 1;
        }
    };

    match client.get(&url).send().await {
        Ok(resp) if resp.status().is_success() => {
            let body: serde_json::Value = resp.json().await.unwrap_or_default();
            if json {
                println!("{body}");
            } else {
                println!(
                    "aviatord running: version {}, up {}s",
                    body["version"].as_str().unwrap_or("?"),
                    body["uptime_secs"].as_u64().unwrap_or(0)
                );
            }
            0
        }
        Ok(resp) => {
            eprintln!("aviatord unhealthy: HTTP {}", resp.status());
            1
        }
        Err(_) => {
            if json {
                println!("{{\"status\":\"stopped\"}}");
            } else {
                eprintln!("aviatord not running on port {}", config.port);
            }
            1
        }
    }
}

/// Initialize the tracing subscriber.
/// With `log_file` set, logs go to a daily-rolling file; otherwise stdout.
/// Returns a `WorkerGuard` that must stay alive for the process lifetime.
///
/// `log_format` may be `"pretty"` (default, human-readable compact format) or
/// `"json"` (structured JSON for log aggregators). A log directory that
/// cannot be created falls back to stdout with a warning; never panics.
fn setup_logging(
    log_level: &str,
    log_file: Option<&std::path::Path>,
    log_format: &str,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let file_writer = log_file.and_then(|path| {
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let filename = path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("aviatord.log"));
        // The directory must exist before tracing-appender opens the file.
        match std::fs::create_dir_all(dir) {
            Ok(()) => Some(tracing_appender::non_blocking(
                tracing_appender::rolling::daily(dir, filename),
            )),
            Err(e) => {
                eprintln!(
                    "warn: could not create log directory '{}': {e}; logging to stdout",
                    dir.display()
                );
                None
            }
        }
    });

    let registry = tracing_subscriber::registry().with(EnvFilter::new(log_level));
    let use_json = log_format == "json";
    match file_writer {
        Some((writer, guard)) => {
            if use_json {
                registry
                    .with(fmt::layer().json().with_writer(writer))
                    .init();
            } else {
                registry
                    .with(fmt::layer().with_ansi(false).with_writer(writer))
                    .init();
            }
            Some(guard)
        }
        None => {
            if use_json {
                registry.with(fmt::layer().json()).init();
            } else {
                registry.with(fmt::layer().compact()).init();
            }
            None
        }
    }
}
