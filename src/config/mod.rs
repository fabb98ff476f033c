use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::error;

const DEFAULT_PORT: u16 = 7478;
const DEFAULT_FLOW_TIMEOUT_SECS: u64 = 60;
const DEFAULT_FEEDBACK_RETENTION_DAYS: u32 = 90;
const DEFAULT_DOWNVOTE_THRESHOLD: u32 = 5;

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

// ─── FeedbackConfig ───────────────────────────────────────────────────────────

/// Feedback-loop configuration (`[feedback]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FeedbackConfig {
    /// Downvote count at which a related item is flagged in the daily report
    /// (default: 5).
    pub downvote_threshold: u32,
    /// How many days of feedback to keep before pruning (default: 90; 0 = never).
    pub retention_days: u32,
    /// Hours between feedback-analysis runs (default: 24).
    pub analysis_interval_hours: u64,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            downvote_threshold: DEFAULT_DOWNVOTE_THRESHOLD,
            retention_days: DEFAULT_FEEDBACK_RETENTION_DAYS,
            analysis_interval_hours: 24,
        }
    }
}

// ─── ObservabilityConfig ─────────────────────────────────────────────────────

/// Daemon observability configuration (`[observability]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log SQLite queries that exceed this threshold (milliseconds). Default: 100.
    /// Set to 0 to disable slow query logging.
    pub slow_query_threshold_ms: u64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            slow_query_threshold_ms: 100,
        }
    }
}

// ─── TOML config file ─────────────────────────────────────────────────────────

/// `{data_dir}/config.toml`; all fields are optional overrides.
/// Priority: CLI / env var  >  TOML  >  built-in default.
#[derive(Deserialize, Default)]
struct TomlConfig {
    /// HTTP server port (default: 7478).
    port: Option<u16>,
    /// Log level filter string, e.g. "debug", "info,aviatord=trace" (default: "info").
    log: Option<String>,
    /// Bind address for the HTTP server (default: "127.0.0.1"; use "0.0.0.0" for LAN access).
    bind_address: Option<String>,
    /// Base URL of the remote Genkit flow service. Omit to run with simulated flows.
    flow_base_url: Option<String>,
    /// API key sent to the flow service as a bearer token.
    flow_api_key: Option<String>,
    /// Per-request timeout for flow invocations, in seconds (default: 60).
    flow_timeout_secs: Option<u64>,
    /// Bearer token required on API requests. None = auth disabled
    /// (local-only, trusted loopback use).
    api_token: Option<String>,
    /// Log output format: "pretty" (default, human-readable) | "json"
    /// (structured for log aggregators).
    log_format: Option<String>,
    /// Feedback-loop tuning (`[feedback]`).
    feedback: Option<FeedbackConfig>,
    /// Observability configuration (`[observability]`).
    observability: Option<ObservabilityConfig>,
}

fn load_toml(data_dir: &Path) -> Option<TomlConfig> {
    let path = data_dir.join("config.toml");
    let contents = std::fs::read_to_string(&path).ok()?;
    match toml::from_str::<TomlConfig>(&contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            error!(path = %path.display(), err = %e, "failed to parse config.toml, using defaults");
            None
        }
    }
}

// ─── AppConfig ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    pub log: String,
    /// Bind address for the HTTP server (AVIATOR_BIND env var, default: "127.0.0.1").
    pub bind_address: String,
    /// Remote flow service base URL (AVIATOR_FLOW_URL env var).
    /// None means the simulated runner serves flow calls.
    pub flow_base_url: Option<String>,
    /// Bearer API key for the flow service (AVIATOR_FLOW_API_KEY env var).
    pub flow_api_key: Option<String>,
    /// Per-request flow invocation timeout, in seconds.
    pub flow_timeout_secs: u64,
    /// Bearer token required to call the API (AVIATOR_API_TOKEN env var).
    /// None = authentication disabled.
    pub api_token: Option<String>,
    /// Log output format: "pretty" (default) | "json".
    pub log_format: String,
    /// Feedback loop: downvote threshold, retention, analysis cadence.
    pub feedback: FeedbackConfig,
    /// Observability: slow query threshold.
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Build config from CLI/env args + optional TOML file.
    ///
    /// Priority (highest to lowest):
    ///   1. CLI / env: passed as `Some(value)` from clap
    ///   2. TOML file at `{data_dir}/config.toml`
    ///   3. Built-in defaults
    pub fn new(
        port: Option<u16>,
        data_dir: Option<PathBuf>,
        log: Option<String>,
        bind_address: Option<String>,
    ) -> Self {
        let data_dir = data_dir.unwrap_or_else(default_data_dir);

        // Load TOML as the lowest-priority override layer
        let toml = load_toml(&data_dir).unwrap_or_default();

        let port = port.or(toml.port).unwrap_or(DEFAULT_PORT);
        let log = log.or(toml.log).unwrap_or_else(|| "info".to_string());

        let bind_address = bind_address
            .or(std::env::var("AVIATOR_BIND").ok().filter(|s| !s.is_empty()))
            .or(toml.bind_address)
            .unwrap_or_else(default_bind_address);

        let flow_base_url = std::env::var("AVIATOR_FLOW_URL")
            .ok()
            .filter(|s| !s.is_empty())
            .or(toml.flow_base_url)
            // Trailing slash would double up when joining flow paths.
            .map(|u| u.trim_end_matches('/').to_string());

        let flow_api_key = std::env::var("AVIATOR_FLOW_API_KEY")
            .ok()
            .filter(|s| !s.is_empty())
            .or(toml.flow_api_key);

        let flow_timeout_secs = toml.flow_timeout_secs.unwrap_or(DEFAULT_FLOW_TIMEOUT_SECS);

        let api_token = std::env::var("AVIATOR_API_TOKEN")
            .ok()
            .filter(|s| !s.is_empty())
            .or(toml.api_token);

        let log_format = std::env::var("AVIATOR_LOG_FORMAT")
            .ok()
            .filter(|s| !s.is_empty())
            .or(toml.log_format)
            .unwrap_or_else(|| "pretty".to_string());

        let feedback = toml.feedback.unwrap_or_default();
        let observability = toml.observability.unwrap_or_default();

        Self {
            port,
            data_dir,
            log,
            bind_address,
            flow_base_url,
            flow_api_key,
            flow_timeout_secs,
            api_token,
            log_format,
            feedback,
            observability,
        }
    }
}

fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        // ~/Library/Application Support/aviatord
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("aviatord");
        }
    }
    #[cfg(target_os = "linux")]
    {
        // $XDG_DATA_HOME/aviatord or ~/.local/share/aviatord
        if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
            return PathBuf::from(xdg).join("aviatord");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join(".local")
                .join("share")
                .join("aviatord");
        }
    }
    #[cfg(target_os = "windows")]
    {
        // %APPDATA%\aviatord
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("aviatord");
        }
    }
    // Fallback
    PathBuf::from(".aviatord")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_nothing_configured() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = AppConfig::new(None, Some(dir.path().to_path_buf()), None, None);
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.bind_address, "127.0.0.1");
        assert_eq!(cfg.log, "info");
        assert!(cfg.flow_base_url.is_none());
        assert_eq!(cfg.feedback.downvote_threshold, 5);
        assert_eq!(cfg.feedback.retention_days, 90);
    }

    #[test]
    fn toml_overrides_defaults_but_not_cli() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            r#"
port = 9000
log = "debug"
flow_base_url = "http://flows.internal:3400/"

[feedback]
downvote_threshold = 3
"#,
        )
        .unwrap();

        let cfg = AppConfig::new(None, Some(dir.path().to_path_buf()), None, None);
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.log, "debug");
        // Trailing slash trimmed for clean path joins.
        assert_eq!(cfg.flow_base_url.as_deref(), Some("http://flows.internal:3400"));
        assert_eq!(cfg.feedback.downvote_threshold, 3);

        // CLI wins over TOML.
        let cfg = AppConfig::new(
            Some(4000),
            Some(dir.path().to_path_buf()),
            Some("warn".into()),
            None,
        );
        assert_eq!(cfg.port, 4000);
        assert_eq!(cfg.log, "warn");
    }

    #[test]
    fn malformed_toml_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.toml"), "port = \"not a number").unwrap();
        let cfg = AppConfig::new(None, Some(dir.path().to_path_buf()), None, None);
        assert_eq!(cfg.port, DEFAULT_PORT);
    }
}
