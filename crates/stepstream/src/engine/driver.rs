//! The background driver and its supervisor.
//!
//! [`driver_loop`] is the single task that advances the shared work engine.
//! It is expected to run until it is cancelled. [`supervise`] joins it and
//! turns every other way of ending (a stepper error, a panic, or the loop
//! simply returning) into a fatal [`Error::EngineDead`].

use super::state::{EngineStatus, Shared};
use crate::{Error, Result, config::EngineConfig};
use std::{any::Any, sync::Arc};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

/// Ticks the shared work engine until `shutdown` is cancelled.
///
/// Each iteration runs one tick and then yields to the scheduler exactly
/// once, so consumers and new registrations get a turn between ticks. With
/// [`EngineConfig::park_when_idle`], an empty engine waits for the next
/// registration instead of spinning.
///
/// # Errors
///
/// Propagates the first stepper error. The supervisor treats it as fatal.
pub(crate) async fn driver_loop(
    shared: Arc<Shared>,
    shutdown: CancellationToken,
    config: EngineConfig,
) -> Result<()> {
    #[cfg(feature = "tracing")]
    tracing::debug!("Driver started");

    loop {
        if shutdown.is_cancelled() {
            #[cfg(feature = "tracing")]
            tracing::debug!("Driver received shutdown");
            return Ok(());
        }

        let report = {
            let mut work = shared.work.lock();
            if work.is_empty() {
                None
            } else {
                Some(work.tick()?)
            }
        };

        match report {
            Some(_report) => {
                #[cfg(feature = "tracing")]
                if config.log_every_ticks > 0 && _report.tick % config.log_every_ticks == 0 {
                    tracing::debug!(
                        tick = _report.tick,
                        stepped = _report.stepped,
                        retired = _report.retired,
                        "Engine tick"
                    );
                }
                tokio::task::yield_now().await;
            }
            None if config.park_when_idle => {
                tokio::select! {
                    biased;
                    () = shutdown.cancelled() => {}
                    () = shared.wake.notified() => {}
                }
            }
            None => tokio::task::yield_now().await,
        }
    }
}

/// Joins the driver and publishes how it ended.
///
/// Cancellation (through the shutdown token or the runtime aborting the
/// task) leaves the engine [`EngineStatus::Stopped`]. Any other outcome marks
/// the engine [`EngineStatus::Dead`], which fails every in-flight and future
/// request and resolves [`StreamingEngine::wait_fatal`].
///
/// [`StreamingEngine::wait_fatal`]: crate::StreamingEngine::wait_fatal
pub(crate) async fn supervise(
    driver: JoinHandle<Result<()>>,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
) {
    let status = classify(driver.await, shutdown.is_cancelled());

    match &status {
        EngineStatus::Dead(_err) => {
            #[cfg(feature = "tracing")]
            tracing::error!("Driver died: {_err}");
        }
        _ => {
            #[cfg(feature = "tracing")]
            tracing::info!("Driver stopped");
        }
    }

    shared.retire(status);
}

fn classify(outcome: core::result::Result<Result<()>, JoinError>, cancelled: bool) -> EngineStatus {
    let reason = match outcome {
        Ok(Ok(())) if cancelled => return EngineStatus::Stopped,
        Err(err) if err.is_cancelled() => return EngineStatus::Stopped,
        Ok(Ok(())) => "driver loop returned without being cancelled".to_string(),
        Ok(Err(err)) => err.to_string(),
        Err(err) => format!("driver panicked: {}", panic_message(err.into_panic())),
    };
    EngineStatus::Dead(Error::EngineDead { reason })
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
