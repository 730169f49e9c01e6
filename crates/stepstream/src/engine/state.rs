use super::work::{StepperKey, WorkEngine};
use crate::{
    Error,
    request::RequestId,
    stepper::{Stepper, StepperFactory},
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{Notify, watch};

/// Lifecycle of a [`StreamingEngine`](crate::StreamingEngine).
///
/// `Idle -> Running -> (Stopped | Dead)`. `Stopped` engines may be started
/// again; `Dead` is permanent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineStatus {
    /// No driver has been started yet.
    Idle,
    /// A driver task is ticking the work engine.
    Running,
    /// The driver was cancelled through `shutdown`.
    Stopped,
    /// The driver exited on its own. Carries the fatal error.
    Dead(Error),
}

impl EngineStatus {
    pub const fn is_dead(&self) -> bool {
        matches!(self, Self::Dead(_))
    }

    /// Error a new or in-flight request should fail with, if any.
    pub(crate) fn rejection(&self) -> Option<Error> {
        match self {
            Self::Idle | Self::Running => None,
            Self::Stopped => Some(Error::Shutdown),
            Self::Dead(err) => Some(err.clone()),
        }
    }
}

/// State shared between the engine handle, its driver, the supervisor and
/// every in-flight stream.
///
/// The work engine is locked by the driver once per tick and briefly by
/// registrations and aborts; the lock is never held across an `.await`.
/// Lock order is `work` before `status`.
pub(crate) struct Shared {
    pub(crate) work: Mutex<WorkEngine>,
    pub(crate) wake: Notify,
    pub(crate) status: watch::Sender<EngineStatus>,
    pub(crate) factory: Arc<dyn StepperFactory>,
}

impl Shared {
    pub(crate) fn new(factory: Arc<dyn StepperFactory>) -> Self {
        let (status, _) = watch::channel(EngineStatus::Idle);
        Self {
            work: Mutex::new(WorkEngine::new()),
            wake: Notify::new(),
            status,
            factory,
        }
    }

    /// Registers `stepper` unless the engine refuses new work.
    pub(crate) fn register(
        &self,
        request_id: RequestId,
        stepper: Box<dyn Stepper>,
    ) -> Result<StepperKey, Error> {
        let key = {
            let mut work = self.work.lock();
            if let Some(err) = self.status.borrow().rejection() {
                return Err(err);
            }
            work.register(request_id, stepper)
        };
        self.wake.notify_one();
        Ok(key)
    }

    /// Removes the registration under `key` and runs the factory's abort
    /// hook for `request_id`.
    pub(crate) fn abort(&self, key: StepperKey, request_id: &RequestId) {
        let _removed = self.work.lock().remove(key);

        #[cfg(feature = "tracing")]
        tracing::debug!(%request_id, removed = _removed, "Aborting request");

        self.factory.abort(request_id);
    }

    /// Publishes the driver's final status, then drops every active stepper.
    ///
    /// Publishing first guarantees that a consumer woken by its producer
    /// being dropped already observes why.
    pub(crate) fn retire(&self, status: EngineStatus) {
        let mut work = self.work.lock();
        self.status.send_replace(status);
        work.clear();
    }

    pub(crate) fn set_running(&self) {
        self.status.send_replace(EngineStatus::Running);
    }

    pub(crate) fn current_status(&self) -> EngineStatus {
        self.status.borrow().clone()
    }
}
