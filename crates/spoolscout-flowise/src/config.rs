use std::time::Duration;

const DEFAULT_COMMAND: &str = "npx";
const DEFAULT_ARGS: &str = "flowise start";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_READY_MARKER: &str = "Server listening on";
const DEFAULT_STARTUP_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_QUERY_TIMEOUT_MS: u64 = 20_000;
const DEFAULT_STOP_GRACE_MS: u64 = 5_000;
const DEFAULT_LOG_MAX_LINES: usize = 1000;

pub(crate) fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse::<u64>().ok())
}

pub(crate) fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
}

pub(crate) fn env_bool(name: &str) -> Option<bool> {
    std::env::var(name).ok().and_then(|v| parse_bool(&v))
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn split_args(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(|s| s.to_string()).collect()
}

/// How to launch and talk to the Flowise child.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub command: String,
    pub args: Vec<String>,
    /// Passed to the child as `PORT`; also where queries and the port probe go.
    pub port: u16,
    pub ready_marker: String,
    pub startup_timeout: Duration,
    /// Treat the port accepting connections as readiness, alongside the marker.
    pub port_probe: bool,
    pub chatflow_id: Option<String>,
    pub query_timeout: Duration,
    /// Time between SIGTERM and SIGKILL on `stop()`.
    pub stop_grace: Duration,
    pub log_max_lines: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_COMMAND.to_string(),
            args: split_args(DEFAULT_ARGS),
            port: DEFAULT_PORT,
            ready_marker: DEFAULT_READY_MARKER.to_string(),
            startup_timeout: Duration::from_millis(DEFAULT_STARTUP_TIMEOUT_MS),
            port_probe: true,
            chatflow_id: None,
            query_timeout: Duration::from_millis(DEFAULT_QUERY_TIMEOUT_MS),
            stop_grace: Duration::from_millis(DEFAULT_STOP_GRACE_MS),
            log_max_lines: DEFAULT_LOG_MAX_LINES,
        }
    }
}

impl SupervisorConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            command: env_string("SPOOLSCOUT_FLOWISE_COMMAND").unwrap_or(defaults.command),
            args: env_string("SPOOLSCOUT_FLOWISE_ARGS")
                .map(|v| split_args(&v))
                .unwrap_or(defaults.args),
            port: env_u64("SPOOLSCOUT_FLOWISE_PORT")
                .and_then(|v| u16::try_from(v).ok())
                .filter(|v| *v != 0)
                .unwrap_or(defaults.port),
            ready_marker: std::env::var("SPOOLSCOUT_FLOWISE_READY_MARKER")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.ready_marker),
            startup_timeout: Duration::from_millis(
                env_u64("SPOOLSCOUT_FLOWISE_STARTUP_TIMEOUT_MS")
                    .map(|v| v.clamp(1000, 10 * 60 * 1000))
                    .unwrap_or(DEFAULT_STARTUP_TIMEOUT_MS),
            ),
            port_probe: env_bool("SPOOLSCOUT_FLOWISE_PORT_PROBE").unwrap_or(defaults.port_probe),
            chatflow_id: env_string("SPOOLSCOUT_FLOWISE_CHATFLOW_ID"),
            query_timeout: Duration::from_millis(
                env_u64("SPOOLSCOUT_FLOWISE_QUERY_TIMEOUT_MS")
                    .map(|v| v.clamp(500, 5 * 60 * 1000))
                    .unwrap_or(DEFAULT_QUERY_TIMEOUT_MS),
            ),
            stop_grace: Duration::from_millis(
                env_u64("SPOOLSCOUT_FLOWISE_STOP_GRACE_MS")
                    .map(|v| v.clamp(100, 60_000))
                    .unwrap_or(DEFAULT_STOP_GRACE_MS),
            ),
            log_max_lines: env_usize("SPOOLSCOUT_FLOWISE_LOG_MAX_LINES")
                .map(|v| v.clamp(100, 50_000))
                .unwrap_or(DEFAULT_LOG_MAX_LINES),
        }
    }
}
