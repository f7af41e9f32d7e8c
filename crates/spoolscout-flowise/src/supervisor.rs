use std::{process::Stdio, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use spoolscout_process::{RunningStatus, ServiceState, ServiceStatus};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, BufReader},
    process::{Child, ChildStderr, ChildStdout, Command},
    sync::{Mutex, watch},
};

use crate::{
    LOG_TARGET,
    config::SupervisorConfig,
    error::{QueryError, SupervisorError},
    log_buffer::LogBuffer,
};

const PORT_PROBE_INTERVAL: Duration = Duration::from_millis(250);
const MAX_ERROR_BODY_BYTES: usize = 2048;
const MAX_TAIL_LINES: usize = 1000;
const KILL_REAP_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Default)]
struct Snapshot {
    generation: u64,
    status: ServiceStatus,
}

/// Mutable supervisor state. Only touched with the `inner` lock held, and every
/// change is republished through the watch channel before the lock drops.
#[derive(Debug, Default)]
struct Inner {
    // Bumped on every launch and every stop. Observers carry the generation
    // they were spawned for and become inert once it moves on.
    generation: u64,
    state: ServiceState,
    pid: Option<u32>,
    pgid: Option<i32>,
    exit_code: Option<i32>,
    message: Option<String>,
    exited: Option<watch::Receiver<bool>>,
}

impl Inner {
    fn snapshot(&self) -> Snapshot {
        Snapshot {
            generation: self.generation,
            status: ServiceStatus {
                state: self.state,
                running: self.state.is_running(),
                pid: self.pid,
                exit_code: self.exit_code,
                message: self.message.clone(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct PredictionRequest<'a> {
    question: &'a str,
}

#[derive(Debug, Deserialize)]
struct PredictionResponse {
    text: Option<String>,
}

/// Owns the lifecycle of a single Flowise child process.
///
/// Cheap to clone; clones share the same process handle.
#[derive(Clone)]
pub struct Supervisor {
    config: Arc<SupervisorConfig>,
    inner: Arc<Mutex<Inner>>,
    published: Arc<watch::Sender<Snapshot>>,
    // Held by launch and for the whole of stop(), so a new child is never
    // spawned while the previous group is still shutting down.
    lifecycle: Arc<Mutex<()>>,
    logs: Arc<Mutex<LogBuffer>>,
    http: reqwest::Client,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("command", &self.config.command)
            .field("port", &self.config.port)
            .field("status", &self.service_status())
            .finish()
    }
}

impl Supervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        let (published, _) = watch::channel(Snapshot::default());
        let logs = LogBuffer::new(config.log_max_lines);
        Self {
            config: Arc::new(config),
            inner: Arc::new(Mutex::new(Inner::default())),
            published: Arc::new(published),
            lifecycle: Arc::new(Mutex::new(())),
            logs: Arc::new(Mutex::new(logs)),
            // Flowise is always on loopback.
            http: reqwest::Client::builder()
                .no_proxy()
                .build()
                .unwrap_or_default(),
        }
    }

    /// Never blocks.
    pub fn status(&self) -> RunningStatus {
        self.published.borrow().status.running_status()
    }

    pub fn service_status(&self) -> ServiceStatus {
        self.published.borrow().status.clone()
    }

    /// Launches Flowise and waits until it is ready.
    ///
    /// Returns immediately when already running. A call made while another
    /// launch is in flight waits on that launch instead of spawning again.
    /// On [`SupervisorError::StartupTimeout`] the child stays attached and may
    /// still turn `running` later.
    pub async fn start(&self) -> Result<(), SupervisorError> {
        let generation = {
            let _gate = self.lifecycle.lock().await;
            let mut inner = self.inner.lock().await;
            match inner.state {
                ServiceState::Running => {
                    tracing::info!("flowise is already running");
                    return Ok(());
                }
                ServiceState::Starting => {
                    tracing::info!("flowise is already starting; waiting for readiness");
                    inner.generation
                }
                ServiceState::Idle | ServiceState::Stopped | ServiceState::Failed => {
                    self.launch(&mut inner).await?
                }
            }
        };

        self.wait_until_ready(generation).await
    }

    /// Terminates the child process group, if any. Safe in every state.
    ///
    /// Returns once the child has exited or been killed; a concurrent
    /// `start()` waits for that before spawning again.
    pub async fn stop(&self) {
        let _gate = self.lifecycle.lock().await;
        let (pgid, mut exited) = {
            let mut inner = self.inner.lock().await;
            if !inner.state.is_active() && inner.pgid.is_none() {
                tracing::debug!("flowise is not running; nothing to stop");
                return;
            }

            let pgid = inner.pgid.take();
            let exited = inner.exited.take();
            inner.generation = inner.generation.wrapping_add(1);
            inner.state = ServiceState::Stopped;
            inner.pid = None;
            inner.exit_code = None;
            inner.message = Some("stopped".to_string());
            self.publish(&inner);
            (pgid, exited)
        };

        if let Some(pgid) = pgid {
            terminate_group(pgid);
            self.emit("[spoolscout] stop: sent SIGTERM").await;

            let exited_in_time = match exited.as_mut() {
                Some(rx) => {
                    tokio::time::timeout(self.config.stop_grace, rx.wait_for(|done| *done))
                        .await
                        .is_ok_and(|r| r.is_ok())
                }
                None => false,
            };
            if !exited_in_time {
                kill_group(pgid);
                tracing::warn!(
                    pgid,
                    grace_ms = self.config.stop_grace.as_millis() as u64,
                    "flowise did not exit after SIGTERM; sent SIGKILL"
                );
                self.emit("[spoolscout] stop: sent SIGKILL (grace elapsed)")
                    .await;

                if let Some(rx) = exited.as_mut() {
                    let reaped = tokio::time::timeout(KILL_REAP_TIMEOUT, rx.wait_for(|done| *done))
                        .await
                        .is_ok_and(|r| r.is_ok());
                    if !reaped {
                        tracing::error!(pgid, "flowise did not exit after SIGKILL");
                    }
                }
            }
        }

        tracing::info!("flowise stopped");
    }

    /// Asks Flowise for an enrichment of `text`.
    pub async fn query(&self, text: &str) -> Result<String, QueryError> {
        tracing::info!(target: LOG_TARGET, query = text, "querying flowise");

        if !self.status().running {
            return Err(QueryError::NotRunning);
        }
        let chatflow_id = self
            .config
            .chatflow_id
            .as_deref()
            .ok_or(QueryError::NotConfigured)?;

        let url = format!(
            "http://127.0.0.1:{}/api/v1/prediction/{}",
            self.config.port, chatflow_id
        );
        let resp = self
            .http
            .post(url)
            .timeout(self.config.query_timeout)
            .json(&PredictionRequest { question: text })
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(QueryError::Status {
                status: status.as_u16(),
                body: truncate_utf8(&body, MAX_ERROR_BODY_BYTES),
            });
        }

        Ok(extract_prediction_text(body))
    }

    /// Recent child output after `cursor`, oldest first, plus the cursor to
    /// resume from. A zero cursor returns the latest page.
    pub async fn tail_logs(&self, cursor: u64, limit: usize) -> (Vec<String>, u64) {
        self.logs
            .lock()
            .await
            .tail_after(cursor, limit.clamp(1, MAX_TAIL_LINES))
    }

    fn publish(&self, inner: &Inner) {
        self.published.send_replace(inner.snapshot());
    }

    async fn emit(&self, line: impl Into<String>) {
        self.logs.lock().await.push_line(line.into());
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.config.command);
        cmd.args(&self.config.args)
            .env("PORT", self.config.port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        {
            unsafe {
                cmd.pre_exec(|| {
                    // New session so stop() can signal npx and everything it forks.
                    set_parent_death_signal()?;
                    if libc::setsid() == -1 {
                        return Err(std::io::Error::last_os_error());
                    }
                    Ok(())
                });
            }
        }

        cmd
    }

    async fn launch(&self, inner: &mut Inner) -> Result<u64, SupervisorError> {
        inner.generation = inner.generation.wrapping_add(1);
        let generation = inner.generation;

        tracing::info!(
            command = %self.config.command,
            args = ?self.config.args,
            port = self.config.port,
            "starting flowise"
        );
        self.emit(format!(
            "[spoolscout] exec: {} {} (PORT={})",
            self.config.command,
            self.config.args.join(" "),
            self.config.port
        ))
        .await;

        let mut child = match self.command().spawn() {
            Ok(child) => child,
            Err(source) => {
                inner.state = ServiceState::Failed;
                inner.pid = None;
                inner.pgid = None;
                inner.exit_code = None;
                inner.exited = None;
                inner.message = Some(format!("spawn failed: {source}"));
                self.publish(inner);

                tracing::error!(%source, command = %self.config.command, "failed to start flowise");
                self.emit(format!("[spoolscout] spawn failed: {source}"))
                    .await;
                return Err(SupervisorError::Spawn {
                    command: self.config.command.clone(),
                    source,
                });
            }
        };

        let pid = child.id();
        let (exited_tx, exited_rx) = watch::channel(false);
        inner.state = ServiceState::Starting;
        inner.pid = pid;
        inner.pgid = pid.and_then(|p| i32::try_from(p).ok());
        inner.exit_code = None;
        inner.exited = Some(exited_rx);
        inner.message = Some("waiting for readiness".to_string());
        self.publish(inner);

        if let Some(out) = child.stdout.take() {
            self.watch_stdout(generation, out);
        }
        if let Some(err) = child.stderr.take() {
            self.watch_stderr(err);
        }
        if self.config.port_probe {
            self.probe_port(generation);
        }
        self.watch_exit(generation, child, exited_tx);

        Ok(generation)
    }

    async fn wait_until_ready(&self, generation: u64) -> Result<(), SupervisorError> {
        let mut rx = self.published.subscribe();
        // Copy out of the watch guard right away; it must not live across an await.
        let waited = tokio::time::timeout(
            self.config.startup_timeout,
            rx.wait_for(|s| s.generation != generation || s.status.state != ServiceState::Starting),
        )
        .await
        .map(|r| r.map(|snap| (snap.generation, snap.status.state, snap.status.exit_code)));

        let observed = match waited {
            Ok(Ok(seen)) => Some(seen),
            Ok(Err(_)) => return Err(SupervisorError::Stopped),
            Err(_) => None,
        };

        match observed {
            Some((g, _, _)) if g != generation => Err(SupervisorError::Stopped),
            // Stopped within the same generation means it was ready, then exited.
            Some((_, ServiceState::Running | ServiceState::Stopped, _)) => Ok(()),
            Some((_, _, code)) => Err(SupervisorError::ExitedBeforeReady { code }),
            None => self.on_startup_timeout(generation).await,
        }
    }

    async fn on_startup_timeout(&self, generation: u64) -> Result<(), SupervisorError> {
        let timeout = self.config.startup_timeout;
        {
            let mut inner = self.inner.lock().await;
            if inner.generation == generation {
                if inner.state == ServiceState::Running {
                    return Ok(());
                }
                if inner.state == ServiceState::Starting {
                    inner.message = Some(format!(
                        "startup timed out after {}ms; still waiting for readiness",
                        timeout.as_millis()
                    ));
                    self.publish(&inner);
                }
            }
        }

        tracing::warn!(
            timeout_ms = timeout.as_millis() as u64,
            "flowise startup timeout"
        );
        Err(SupervisorError::StartupTimeout { timeout })
    }

    async fn mark_ready(&self, generation: u64, via: &'static str) {
        {
            let mut inner = self.inner.lock().await;
            if inner.generation != generation || inner.state != ServiceState::Starting {
                return;
            }
            inner.state = ServiceState::Running;
            inner.message = None;
            self.publish(&inner);
        }

        tracing::info!(port = self.config.port, via, "flowise started successfully");
        self.emit(format!("[spoolscout] ready ({via})")).await;
    }

    async fn mark_exited(&self, generation: u64, res: std::io::Result<std::process::ExitStatus>) {
        let code = res.as_ref().ok().and_then(|s| s.code());
        let previous = {
            let mut inner = self.inner.lock().await;
            if inner.generation != generation {
                // Already released by stop().
                None
            } else {
                let previous = inner.state;
                inner.state = if previous == ServiceState::Starting {
                    ServiceState::Failed
                } else {
                    ServiceState::Stopped
                };
                inner.pid = None;
                inner.pgid = None;
                inner.exited = None;
                inner.exit_code = code;
                inner.message = Some(match &res {
                    Ok(status) => format!("exited ({status})"),
                    Err(err) => format!("wait failed: {err}"),
                });
                self.publish(&inner);
                Some(previous)
            }
        };

        match previous {
            Some(ServiceState::Running) => {
                tracing::warn!(exit_code = ?code, "flowise exited unexpectedly")
            }
            Some(ServiceState::Starting) => {
                tracing::warn!(exit_code = ?code, "flowise exited before becoming ready")
            }
            _ => tracing::info!(exit_code = ?code, "flowise exited"),
        }
        self.emit(format!("[spoolscout] process exited: exit_code={code:?}"))
            .await;
    }

    fn watch_stdout(&self, generation: u64, out: ChildStdout) {
        let this = self.clone();
        tokio::spawn(async move {
            let mut reader = BufReader::new(out);
            let mut buf = Vec::new();
            while let Some(line) = next_line_lossy(&mut reader, &mut buf).await {
                tracing::info!(target: LOG_TARGET, "{line}");
                let ready = line.contains(this.config.ready_marker.as_str());
                this.emit(format!("[stdout] {line}")).await;
                if ready {
                    this.mark_ready(generation, "readiness marker").await;
                }
            }
        });
    }

    fn watch_stderr(&self, err: ChildStderr) {
        let this = self.clone();
        tokio::spawn(async move {
            let mut reader = BufReader::new(err);
            let mut buf = Vec::new();
            while let Some(line) = next_line_lossy(&mut reader, &mut buf).await {
                tracing::warn!(target: LOG_TARGET, "{line}");
                this.emit(format!("[stderr] {line}")).await;
            }
        });
    }

    fn probe_port(&self, generation: u64) {
        let this = self.clone();
        let port = self.config.port;
        tokio::spawn(async move {
            loop {
                {
                    let snap = this.published.borrow();
                    if snap.generation != generation
                        || snap.status.state != ServiceState::Starting
                    {
                        return;
                    }
                }
                if let Ok(s) = tokio::net::TcpStream::connect(("127.0.0.1", port)).await {
                    drop(s);
                    this.mark_ready(generation, "port accepting connections")
                        .await;
                    return;
                }
                tokio::time::sleep(PORT_PROBE_INTERVAL).await;
            }
        });
    }

    fn watch_exit(&self, generation: u64, mut child: Child, exited: watch::Sender<bool>) {
        let this = self.clone();
        tokio::spawn(async move {
            let res = child.wait().await;
            let _ = exited.send(true);
            this.mark_exited(generation, res).await;
        });
    }
}

/// Next output line with invalid UTF-8 replaced, or `None` at EOF.
///
/// The pipe must keep being drained whatever the child prints; closing it
/// early would kill the child on its next write.
async fn next_line_lossy<R>(reader: &mut R, buf: &mut Vec<u8>) -> Option<String>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    match reader.read_until(b'\n', buf).await {
        Ok(0) => None,
        Ok(_) => {
            while matches!(buf.last(), Some(b'\n' | b'\r')) {
                buf.pop();
            }
            Some(String::from_utf8_lossy(buf).into_owned())
        }
        Err(err) => {
            tracing::warn!(%err, "failed to read flowise output");
            None
        }
    }
}

fn extract_prediction_text(body: String) -> String {
    match serde_json::from_str::<PredictionResponse>(&body) {
        Ok(PredictionResponse { text: Some(text) }) => text,
        _ => body,
    }
}

fn truncate_utf8(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }

    let suffix = "…(truncated)";
    let keep = max_bytes.saturating_sub(suffix.len()).max(1);
    let mut end = keep.min(s.len());
    while end > 0 && !s.is_char_boundary(end) {
        end = end.saturating_sub(1);
    }
    let mut out = s[..end].to_string();
    out.push_str(suffix);
    out
}

#[cfg(unix)]
fn signal_group(pgid: i32, signal: libc::c_int) {
    if pgid <= 0 {
        return;
    }
    unsafe {
        libc::kill(-pgid, signal);
    }
}

#[cfg(unix)]
fn terminate_group(pgid: i32) {
    signal_group(pgid, libc::SIGTERM);
}

#[cfg(unix)]
fn kill_group(pgid: i32) {
    signal_group(pgid, libc::SIGKILL);
}

// Without process groups the child is only reaped through kill_on_drop.
#[cfg(not(unix))]
fn terminate_group(_pgid: i32) {}

#[cfg(not(unix))]
fn kill_group(_pgid: i32) {}

#[cfg(target_os = "linux")]
unsafe fn set_parent_death_signal() -> std::io::Result<()> {
    // If this server dies without running stop(), the child still gets SIGTERM.
    let rc = unsafe { libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) };
    if rc == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(all(unix, not(target_os = "linux")))]
unsafe fn set_parent_death_signal() -> std::io::Result<()> {
    Ok(())
}
