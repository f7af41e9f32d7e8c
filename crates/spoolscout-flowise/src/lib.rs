//! Lifecycle supervision for the Flowise LLM service.
//!
//! A [`Supervisor`] owns at most one Flowise child process. It spawns the
//! child, watches its output for readiness, forwards enrichment queries to it
//! and tears the whole process group down on `stop()`.

pub mod config;
pub mod error;
mod log_buffer;
pub mod supervisor;

pub use config::SupervisorConfig;
pub use error::{QueryError, SupervisorError};
pub use supervisor::Supervisor;

/// `tracing` target for everything the child prints.
pub const LOG_TARGET: &str = "flowise";
