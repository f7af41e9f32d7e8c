use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("failed to spawn flowise ({command}): {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("flowise startup timeout after {}ms", timeout.as_millis())]
    StartupTimeout { timeout: Duration },
    #[error("flowise exited before becoming ready (exit code {code:?})")]
    ExitedBeforeReady { code: Option<i32> },
    #[error("flowise was stopped before becoming ready")]
    Stopped,
}

/// Enrichment failures. Callers recover from all of these.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("flowise is not running")]
    NotRunning,
    #[error("no flowise chatflow configured")]
    NotConfigured,
    #[error("flowise request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("flowise returned {status}: {body}")]
    Status { status: u16, body: String },
}
