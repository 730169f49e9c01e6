//! Error types for the streaming engine.
//!
//! This module defines the central `Error` enum, which captures every
//! reportable failure of the engine, its driver task and individual request
//! streams. The type is `Clone` so a single fatal condition can be handed to
//! every outstanding and future consumer.
//!
//! ## Error Cases
//! - `EngineDead`: The driver task exited without being cancelled. Permanent.
//! - `AlreadyRunning`: A second driver was started while one is active.
//! - `NoRuntime`: The driver was started outside of a Tokio runtime.
//! - `Generation`: A single request failed; delivered to that request only.
//! - `Step`: A stepper failed to advance. Fatal for the driver.
//! - `ProducerDropped`: A stream's producer went away without terminating it.
//! - `Shutdown`: The engine was shut down while the request was in flight.
//! - `ConfigNotFound`: No canonical config file could be resolved.

use std::path::PathBuf;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the streaming engine.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// The background driver terminated unexpectedly.
    ///
    /// Once observed, the engine is permanently dead and every current and
    /// future `generate` call fails with this error.
    #[error("Engine terminated unexpectedly: {reason}")]
    EngineDead { reason: String },

    /// `start_driver` was called while a driver task is still running.
    #[error("Background driver is already running")]
    AlreadyRunning,

    /// `start_driver` was called outside of a Tokio runtime context.
    #[error("No Tokio runtime available to spawn the driver")]
    NoRuntime,

    /// Producing output for a single request failed.
    #[error("Generation failed for request {request_id}: {reason}")]
    Generation { request_id: String, reason: String },

    /// A stepper could not advance. Treated as a collaborator bug.
    #[error("Stepper failed: {reason}")]
    Step { reason: String },

    /// The producing side of an output channel was dropped before it sent an
    /// end-of-stream marker or an error.
    #[error("Output producer dropped before finishing")]
    ProducerDropped,

    /// The engine was shut down.
    #[error("Engine is shut down")]
    Shutdown,

    /// The given path neither is nor contains the canonical config file.
    #[error("Config file not found: {}", path.display())]
    ConfigNotFound { path: PathBuf },
}

impl Error {
    /// Returns `true` for the fatal, engine-wide failure.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::EngineDead { .. })
    }
}
