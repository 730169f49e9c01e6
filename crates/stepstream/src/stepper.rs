//! Contracts for the units of work driven by the engine.
//!
//! A [`Stepper`] is advanced one increment at a time by the driver and emits
//! its output through a [`StreamCallback`]. A [`StepperFactory`] builds one
//! stepper per request and owns the cleanup hook that runs when a request
//! ends abnormally.

use crate::{
    Error, Result,
    channel::OutputSender,
    request::{GenerateRequest, RequestId},
};

/// A unit of work advanced by the driver, one non-blocking step per tick.
///
/// `step` may invoke the stepper's callback any number of times, including
/// zero. Once `is_finished` returns `true` the stepper is retired and never
/// stepped again.
///
/// Returning an error from `step` is a bug in the stepper: the engine treats
/// it as fatal and shuts the driver down. Failures that only concern the
/// stepper's own request belong in [`StreamCallback::fail`].
pub trait Stepper: Send {
    fn step(&mut self) -> Result<()>;

    fn is_finished(&self) -> bool;
}

/// Builds steppers for incoming requests.
pub trait StepperFactory: Send + Sync + 'static {
    /// Builds the stepper for `request`, wiring its output to `callback`.
    fn build(&self, request: &GenerateRequest, callback: StreamCallback) -> Box<dyn Stepper>;

    /// Releases resources tied to `request_id` after its stream ended with an
    /// error or was dropped before completion.
    ///
    /// Best effort. Runs on the consumer's task, possibly from a destructor,
    /// so it must not block and must not panic.
    fn abort(&self, _request_id: &RequestId) {}
}

/// Output callback handed to a stepper.
///
/// Tokens are delivered with [`call`](Self::call); passing `None` signals
/// completion and ends the consumer's stream.
pub struct StreamCallback {
    request_id: RequestId,
    sender: OutputSender<String>,
}

impl StreamCallback {
    pub fn new(request_id: RequestId, sender: OutputSender<String>) -> Self {
        Self { request_id, sender }
    }

    /// Delivers the token at `index`, or completes the stream on `None`.
    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    pub fn call(&mut self, index: usize, value: Option<String>) {
        match value {
            Some(token) => {
                #[cfg(feature = "tracing")]
                tracing::trace!(request_id = %self.request_id, index, "token emitted");
                self.sender.push(token);
            }
            None => {
                #[cfg(feature = "tracing")]
                tracing::trace!(request_id = %self.request_id, index, "stream finished");
                self.sender.finish();
            }
        }
    }

    /// Terminates this request's stream with a generation error. Other
    /// requests are unaffected.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.sender.push_error(Error::Generation {
            request_id: self.request_id.to_string(),
            reason: reason.into(),
        });
    }

    pub const fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Returns `true` when further output would be discarded, either because
    /// the stream already terminated or because its consumer is gone.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}
