//! # scanhub-agent
//!
//! The scan agent that runs on each scanner device:
//!
//! - **Orchestrator**: send a scan now when connectivity allows, queue it
//!   otherwise
//! - **Retry worker**: background drain of the durable queue, woken early
//!   when connectivity returns
//! - **Context**: every collaborator (store, mapper, registration, sender,
//!   monitor) constructed once at startup and injected
//! - **Config**: environment-driven settings with defaults
//! - **Console**: the operator's line protocol on standard input

pub mod config;
pub mod console;
pub mod context;
pub mod notifier;
pub mod orchestrator;
pub mod retry_worker;

mod error;

#[cfg(test)]
pub(crate) mod testing;

pub use config::AgentConfig;
pub use console::{Console, HeldScan, Reply};
pub use context::AgentContext;
pub use error::{AgentError, Result};
pub use notifier::ScanNotifier;
pub use orchestrator::{ConnectionStatus, DrainReport, Orchestrator, SendOutcome, SignalReport};
pub use retry_worker::{RetryWorker, RetryWorkerHandle};
