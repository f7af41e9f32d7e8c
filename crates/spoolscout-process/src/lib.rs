/// Lifecycle state of a supervised external service.
///
/// `Starting` covers everything between spawn and the first readiness signal,
/// including the window after a caller's start timeout has already elapsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ServiceState {
    #[default]
    Idle,
    Starting,
    Running,
    Stopped,
    Failed,
}

impl ServiceState {
    pub fn is_running(self) -> bool {
        matches!(self, ServiceState::Running)
    }

    /// A process handle is attached in these states.
    pub fn is_active(self) -> bool {
        matches!(self, ServiceState::Starting | ServiceState::Running)
    }
}

/// Public `{running}` view served by `/api/status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RunningStatus {
    pub running: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ServiceStatus {
    pub state: ServiceState,
    pub running: bool,
    pub pid: Option<u32>,
    pub exit_code: Option<i32>,
    pub message: Option<String>,
}

impl ServiceStatus {
    pub fn idle() -> Self {
        Self {
            state: ServiceState::Idle,
            running: false,
            pid: None,
            exit_code: None,
            message: None,
        }
    }

    pub fn running_status(&self) -> RunningStatus {
        RunningStatus {
            running: self.running,
        }
    }
}

impl Default for ServiceStatus {
    fn default() -> Self {
        Self::idle()
    }
}
