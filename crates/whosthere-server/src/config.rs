//! Server configuration loading from file and environment variables.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use whosthere_flow::{CaptureFailurePolicy, FlowSettings, RateLimitSettings};
use whosthere_matcher::PassphraseSet;
use whosthere_observe::DbRuntimeSettings;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    /// Passphrases and decision limits.
    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub session: SessionConfig,

    /// Speech, intercom and transcription backends.
    #[serde(default)]
    pub collaborators: CollaboratorConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Span store settings.
    #[serde(default)]
    pub trace: TraceConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Secret passphrases and match settings.
///
/// `Debug` never prints the passphrases.
#[derive(Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub passphrases: Vec<String>,

    /// Minimum similarity score (0 to 100) that opens the door.
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

/// Per-visit timing and session store limits.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Length of each answer recording.
    #[serde(default = "default_recording_seconds")]
    pub recording_seconds: u64,

    /// Time from doorbell press until the visit must be decided.
    #[serde(default = "default_deadline_seconds")]
    pub deadline_seconds: u64,

    /// How long finished sessions stay queryable.
    #[serde(default = "default_retention_seconds")]
    pub retention_seconds: u64,

    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,

    #[serde(default = "default_max_live_sessions")]
    pub max_live_sessions: usize,

    /// When false, failed captures are re-prompted for free up to
    /// `max_free_repeats` times per visit.
    #[serde(default = "default_true")]
    pub capture_failures_consume_attempts: bool,

    #[serde(default = "default_max_free_repeats")]
    pub max_free_repeats: u32,
}

/// Collaborator backends.
#[derive(Debug, Clone, Deserialize)]
pub struct CollaboratorConfig {
    /// Upper bound for any single speech, capture or transcription call.
    #[serde(default = "default_call_timeout_seconds")]
    pub call_timeout_seconds: u64,

    /// Directory holding the pre-rendered phrase clips.
    #[serde(default = "default_audio_dir")]
    pub audio_dir: PathBuf,

    /// Clip the simulated intercom returns for every recording.
    #[serde(default)]
    pub sample_recording: Option<PathBuf>,

    /// whisper.cpp-compatible binary. Without it the fixed transcript is used.
    #[serde(default)]
    pub stt_binary: Option<PathBuf>,

    #[serde(default)]
    pub stt_model: Option<PathBuf>,

    #[serde(default = "default_stt_language")]
    pub stt_language: String,

    /// Transcript returned when no STT binary is configured.
    #[serde(default)]
    pub stt_fixed_text: String,
}

/// Doorbell events allowed per device and window.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_limit_max_events")]
    pub max_events: u32,

    #[serde(default = "default_rate_limit_window_seconds")]
    pub window_seconds: u64,
}

/// Span store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TraceConfig {
    /// SQLite file for trace spans. Spans only go to the log when unset.
    #[serde(default)]
    pub db_path: Option<String>,

    /// Busy timeout for SQLite connections, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled SQLite connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "whosthere_flow=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    3000
}

fn default_threshold() -> f64 {
    80.0
}

fn default_max_attempts() -> u32 {
    3
}

fn default_recording_seconds() -> u64 {
    5
}

fn default_deadline_seconds() -> u64 {
    60
}

fn default_retention_seconds() -> u64 {
    300
}

fn default_sweep_interval_seconds() -> u64 {
    10
}

fn default_max_live_sessions() -> usize {
    1024
}

fn default_true() -> bool {
    true
}

fn default_max_free_repeats() -> u32 {
    1
}

fn default_call_timeout_seconds() -> u64 {
    15
}

fn default_audio_dir() -> PathBuf {
    PathBuf::from("audio")
}

fn default_stt_language() -> String {
    "de".to_string()
}

fn default_rate_limit_max_events() -> u32 {
    5
}

fn default_rate_limit_window_seconds() -> u64 {
    60
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    4
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            passphrases: Vec::new(),
            threshold: default_threshold(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("passphrases", &format_args!("[{} redacted]", self.passphrases.len()))
            .field("threshold", &self.threshold)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            recording_seconds: default_recording_seconds(),
            deadline_seconds: default_deadline_seconds(),
            retention_seconds: default_retention_seconds(),
            sweep_interval_seconds: default_sweep_interval_seconds(),
            max_live_sessions: default_max_live_sessions(),
            capture_failures_consume_attempts: true,
            max_free_repeats: default_max_free_repeats(),
        }
    }
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            call_timeout_seconds: default_call_timeout_seconds(),
            audio_dir: default_audio_dir(),
            sample_recording: None,
            stt_binary: None,
            stt_model: None,
            stt_language: default_stt_language(),
            stt_fixed_text: String::new(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_events: default_rate_limit_max_events(),
            window_seconds: default_rate_limit_window_seconds(),
        }
    }
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration cannot run a doorbell.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl Config {
    /// Checks everything the orchestrator would otherwise reject later.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.passphrase_set()?;
        self.flow_settings()
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.session.max_live_sessions == 0 {
            return Err(ConfigError::Invalid(
                "session.max_live_sessions must be at least 1".to_string(),
            ));
        }
        if self.session.sweep_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "session.sweep_interval_seconds must be at least 1".to_string(),
            ));
        }
        if self.collaborators.stt_binary.is_some() != self.collaborators.stt_model.is_some() {
            return Err(ConfigError::Invalid(
                "collaborators.stt_binary and collaborators.stt_model must be set together"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// The immutable settings handed to the orchestrator.
    pub fn flow_settings(&self) -> FlowSettings {
        let capture_failure_policy = if self.session.capture_failures_consume_attempts {
            CaptureFailurePolicy::ConsumesAttempt
        } else {
            CaptureFailurePolicy::FreeRepeat {
                max_free_repeats: self.session.max_free_repeats,
            }
        };

        FlowSettings {
            threshold: self.auth.threshold,
            max_attempts: self.auth.max_attempts,
            recording_window: Duration::from_secs(self.session.recording_seconds),
            session_deadline: Duration::from_secs(self.session.deadline_seconds),
            call_timeout: Duration::from_secs(self.collaborators.call_timeout_seconds),
            capture_failure_policy,
            rate_limit: RateLimitSettings {
                max_events: self.rate_limit.max_events,
                window: Duration::from_secs(self.rate_limit.window_seconds),
            },
        }
    }

    /// The normalized passphrase set. Errors name positions, never text.
    pub fn passphrase_set(&self) -> Result<PassphraseSet, ConfigError> {
        PassphraseSet::new(&self.auth.passphrases)
            .map_err(|e| ConfigError::Invalid(format!("auth.passphrases: {}", e)))
    }

    pub fn db_runtime_settings(&self) -> DbRuntimeSettings {
        DbRuntimeSettings {
            busy_timeout_ms: self.trace.busy_timeout_ms,
            pool_max_size: self.trace.pool_max_size,
        }
    }
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `WHOSTHERE_HOST` overrides `server.host`
/// - `WHOSTHERE_PORT` overrides `server.port`
/// - `WHOSTHERE_PASSPHRASES` overrides `auth.passphrases` (comma separated)
/// - `WHOSTHERE_THRESHOLD` overrides `auth.threshold`
/// - `WHOSTHERE_MAX_ATTEMPTS` overrides `auth.max_attempts`
/// - `WHOSTHERE_AUDIO_DIR` overrides `collaborators.audio_dir`
/// - `WHOSTHERE_TRACE_DB_PATH` overrides `trace.db_path`
/// - `WHOSTHERE_LOG_LEVEL` overrides `logging.level`
/// - `WHOSTHERE_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// The result is not validated; callers run [`Config::validate`].
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed,
/// or if `WHOSTHERE_THRESHOLD` or `WHOSTHERE_MAX_ATTEMPTS` is malformed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    Ok(config)
}

/// Applies `WHOSTHERE_*` overrides read through `lookup`.
///
/// A malformed threshold or attempt limit is an error rather than being
/// skipped, so the file's value never silently stays in force.
pub fn apply_env_overrides(
    config: &mut Config,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    if let Some(host) = lookup("WHOSTHERE_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = lookup("WHOSTHERE_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(phrases) = lookup("WHOSTHERE_PASSPHRASES") {
        config.auth.passphrases = phrases
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
    }
    if let Some(threshold) = lookup("WHOSTHERE_THRESHOLD") {
        config.auth.threshold = parse_override("WHOSTHERE_THRESHOLD", &threshold)?;
    }
    if let Some(max_attempts) = lookup("WHOSTHERE_MAX_ATTEMPTS") {
        config.auth.max_attempts = parse_override("WHOSTHERE_MAX_ATTEMPTS", &max_attempts)?;
    }
    if let Some(dir) = lookup("WHOSTHERE_AUDIO_DIR") {
        config.collaborators.audio_dir = PathBuf::from(dir);
    }
    if let Some(db_path) = lookup("WHOSTHERE_TRACE_DB_PATH") {
        config.trace.db_path = Some(db_path);
    }
    if let Some(level) = lookup("WHOSTHERE_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("WHOSTHERE_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    Ok(())
}

fn parse_override<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{} is not a valid number", key)))
}

/// Picks the config file: first CLI argument, then `WHOSTHERE_CONFIG_PATH`,
/// then `config.toml`. Returns the path and where it came from.
pub fn resolve_config_path(cli_arg: Option<String>) -> (String, &'static str) {
    if let Some(path) = cli_arg.filter(|value| !value.trim().is_empty()) {
        return (path, "cli-arg");
    }

    if let Ok(path) = std::env::var("WHOSTHERE_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (path, "env-var");
        }
    }

    ("config.toml".to_string(), "default")
}
