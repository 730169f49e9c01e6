//! The public facade: one supervised driver, many token streams.
//!
//! [`StreamingEngine`] owns the shared work engine and the single background
//! driver that ticks it. Each [`generate`](StreamingEngine::generate) call
//! builds a stepper through the configured [`StepperFactory`], wires the
//! stepper's callback to a fresh output channel and hands the consuming half
//! back as a [`TokenStream`].
//!
//! ## Cancellation
//!
//! Two cancellation domains are kept apart:
//!
//! - Dropping an unfinished [`TokenStream`] cancels that request only. The
//!   stepper is removed from the work engine and the factory's abort hook
//!   runs exactly once.
//! - [`StreamingEngine::shutdown`] cancels the driver. This is the sanctioned
//!   way to stop the engine and never takes the fatal path.

use super::{
    driver::{driver_loop, supervise},
    state::{EngineStatus, Shared},
    work::StepperKey,
};
use crate::{
    Error, Result,
    channel::{OutputStream, output_channel},
    config::EngineConfig,
    request::{GenerateRequest, RequestId},
    stepper::{StepperFactory, StreamCallback},
};
use core::{
    pin::Pin,
    task::{Context, Poll, ready},
};
use futures::{Stream, stream::FusedStream};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::{
    runtime::Handle,
    task::{AbortHandle, JoinHandle},
};
use tokio_util::sync::CancellationToken;

/// The most recently started driver. Kept until a later start replaces it,
/// so a stopping driver still blocks [`StreamingEngine::start_driver`].
struct DriverSlot {
    driver: AbortHandle,
    supervisor: AbortHandle,
    /// Taken by the first `shutdown` to join the supervisor.
    join: Option<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl DriverSlot {
    fn is_active(&self) -> bool {
        !self.driver.is_finished() || !self.supervisor.is_finished()
    }
}

/// Streams tokens for many concurrent requests from one background driver.
///
/// The engine is an explicitly owned context: create it, call
/// [`start_driver`](Self::start_driver) from inside a Tokio runtime, and
/// share it (for example behind an [`Arc`]) with request handlers.
///
/// Requests may be registered before the driver starts; they are stepped
/// once it runs. If the driver ever exits without being cancelled the engine
/// is dead for good: streams in flight end with [`Error::EngineDead`], new
/// requests are refused with it, and [`wait_fatal`](Self::wait_fatal)
/// resolves so the owner can escalate.
pub struct StreamingEngine {
    shared: Arc<Shared>,
    driver: Mutex<Option<DriverSlot>>,
    config: EngineConfig,
}

impl StreamingEngine {
    /// Creates an engine that builds its steppers with `factory`.
    pub fn new(factory: impl StepperFactory) -> Self {
        Self::with_config(factory, EngineConfig::default())
    }

    pub fn with_config(factory: impl StepperFactory, config: EngineConfig) -> Self {
        Self {
            shared: Arc::new(Shared::new(Arc::new(factory))),
            driver: Mutex::new(None),
            config,
        }
    }

    /// Spawns the background driver and its supervisor on the current Tokio
    /// runtime.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyRunning`] if a driver task is still unfinished. The
    ///   running driver is left untouched.
    /// - [`Error::EngineDead`] if a previous driver died.
    /// - [`Error::NoRuntime`] when called outside of a Tokio runtime.
    pub fn start_driver(&self) -> Result<()> {
        let mut slot = self.driver.lock();

        // A finished driver whose supervisor has not published the outcome yet
        // still counts as running; restarting now would race the teardown.
        if slot.as_ref().is_some_and(DriverSlot::is_active) {
            return Err(Error::AlreadyRunning);
        }
        if let EngineStatus::Dead(err) = self.shared.current_status() {
            return Err(err);
        }
        let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;

        let shutdown = CancellationToken::new();
        self.shared.set_running();

        let driver = runtime.spawn(driver_loop(
            Arc::clone(&self.shared),
            shutdown.clone(),
            self.config.clone(),
        ));
        let abort = driver.abort_handle();
        let supervisor = runtime.spawn(supervise(
            driver,
            Arc::clone(&self.shared),
            shutdown.clone(),
        ));

        #[cfg(feature = "tracing")]
        tracing::info!("Background driver started");

        *slot = Some(DriverSlot {
            driver: abort,
            supervisor: supervisor.abort_handle(),
            join: Some(supervisor),
            shutdown,
        });
        Ok(())
    }

    /// Returns `true` while a driver task exists and has not finished.
    pub fn is_running(&self) -> bool {
        self.driver
            .lock()
            .as_ref()
            .is_some_and(|slot| !slot.driver.is_finished())
    }

    /// Current lifecycle status.
    pub fn status(&self) -> EngineStatus {
        self.shared.current_status()
    }

    /// Number of requests whose steppers are still registered.
    pub fn active_requests(&self) -> usize {
        self.shared.work.lock().len()
    }

    /// Starts streaming tokens for `request`.
    ///
    /// The stepper is registered immediately and first stepped on the next
    /// tick. Tokens arrive in the order the stepper emitted them; the stream
    /// ends when the stepper signals completion.
    ///
    /// # Errors
    ///
    /// Fails fast with [`Error::EngineDead`] once the driver has died and
    /// with [`Error::Shutdown`] after [`shutdown`](Self::shutdown).
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(request_id = %request.request_id)))]
    pub fn generate(&self, request: GenerateRequest) -> Result<TokenStream> {
        if let Some(err) = self.shared.current_status().rejection() {
            return Err(err);
        }

        let (sender, output) = output_channel();
        let callback = StreamCallback::new(request.request_id.clone(), sender);
        let stepper = self.shared.factory.build(&request, callback);

        // The status is checked again under the work lock so a request cannot
        // slip in after the supervisor has retired the engine.
        let key = self.shared.register(request.request_id.clone(), stepper)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(interval = request.interval, "Request registered");

        Ok(TokenStream {
            output,
            guard: AbortGuard {
                key,
                request_id: request.request_id,
                shared: Arc::clone(&self.shared),
                armed: true,
            },
        })
    }

    /// Cancels the driver and waits for the supervisor to record the stop.
    ///
    /// Streams still in flight end with [`Error::Shutdown`]. Does nothing if
    /// no driver was started. Until the supervisor has finished,
    /// [`start_driver`](Self::start_driver) keeps reporting
    /// [`Error::AlreadyRunning`]; afterwards the engine may be started again.
    pub async fn shutdown(&self) {
        let join = {
            let mut slot = self.driver.lock();
            let Some(slot) = slot.as_mut() else {
                return;
            };
            slot.shutdown.cancel();
            slot.join.take()
        };

        #[cfg(feature = "tracing")]
        tracing::info!("Shutting down background driver");

        match join {
            Some(join) => {
                if let Err(_e) = join.await {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Driver supervisor did not complete: {_e}");
                }
            }
            // Another caller is joining the supervisor; wait for the outcome
            // it publishes instead.
            None => {
                let mut status = self.shared.status.subscribe();
                let _ = status
                    .wait_for(|current| !matches!(current, EngineStatus::Running))
                    .await;
            }
        }
    }

    /// Resolves with the fatal error once the driver has died.
    ///
    /// Never resolves for an engine that only ever stops through
    /// [`shutdown`](Self::shutdown).
    pub async fn wait_fatal(&self) -> Error {
        let mut status = self.shared.status.subscribe();
        let dead = status.wait_for(EngineStatus::is_dead).await;
        match dead.as_deref() {
            Ok(EngineStatus::Dead(err)) => err.clone(),
            // The sender lives as long as `self`, so the channel cannot close
            // while we are borrowed.
            _ => Error::EngineDead {
                reason: "status channel closed".to_string(),
            },
        }
    }
}

impl Drop for StreamingEngine {
    fn drop(&mut self) {
        if let Some(slot) = self.driver.get_mut().take() {
            slot.shutdown.cancel();
        }
    }
}

/// Runs the abort path for a request unless its stream completed normally.
struct AbortGuard {
    key: StepperKey,
    request_id: RequestId,
    shared: Arc<Shared>,
    armed: bool,
}

impl AbortGuard {
    fn fire(&mut self) {
        if core::mem::take(&mut self.armed) {
            self.shared.abort(self.key, &self.request_id);
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for AbortGuard {
    fn drop(&mut self) {
        self.fire();
    }
}

/// Token stream of a single request, returned by
/// [`StreamingEngine::generate`].
///
/// Yields `Ok(token)` until the stepper completes, then `None`. If the
/// request fails, the error is yielded once after the request has been
/// aborted. Dropping the stream before it ends aborts the request.
#[must_use = "streams do nothing unless polled"]
pub struct TokenStream {
    output: OutputStream<String>,
    guard: AbortGuard,
}

impl TokenStream {
    pub fn request_id(&self) -> &RequestId {
        &self.guard.request_id
    }

    /// Maps a producer that vanished to the reason the engine let it go.
    fn resolve(&self, err: Error) -> Error {
        match err {
            Error::ProducerDropped => self
                .guard
                .shared
                .current_status()
                .rejection()
                .unwrap_or(Error::ProducerDropped),
            other => other,
        }
    }
}

impl Stream for TokenStream {
    type Item = Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match ready!(this.output.poll_item(cx)) {
            Some(Ok(token)) => Poll::Ready(Some(Ok(token))),
            Some(Err(err)) => {
                let err = this.resolve(err);
                this.guard.fire();
                Poll::Ready(Some(Err(err)))
            }
            None => {
                this.guard.disarm();
                Poll::Ready(None)
            }
        }
    }
}

impl FusedStream for TokenStream {
    fn is_terminated(&self) -> bool {
        self.output.is_terminated()
    }
}
