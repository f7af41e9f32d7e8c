use spoolscout_flowise::{QueryError, Supervisor, SupervisorError};
use spoolscout_process::ServiceStatus;

/// The LLM enrichment service as seen by the HTTP layer.
#[async_trait::async_trait]
pub trait LlmBackend: Send + Sync {
    fn status(&self) -> ServiceStatus;
    async fn start(&self) -> Result<(), SupervisorError>;
    async fn stop(&self);
    async fn query(&self, text: &str) -> Result<String, QueryError>;
    async fn tail_logs(&self, cursor: u64, limit: usize) -> (Vec<String>, u64);
}

#[async_trait::async_trait]
impl LlmBackend for Supervisor {
    fn status(&self) -> ServiceStatus {
        self.service_status()
    }

    async fn start(&self) -> Result<(), SupervisorError> {
        Supervisor::start(self).await
    }

    async fn stop(&self) {
        Supervisor::stop(self).await
    }

    async fn query(&self, text: &str) -> Result<String, QueryError> {
        Supervisor::query(self, text).await
    }

    async fn tail_logs(&self, cursor: u64, limit: usize) -> (Vec<String>, u64) {
        Supervisor::tail_logs(self, cursor, limit).await
    }
}
