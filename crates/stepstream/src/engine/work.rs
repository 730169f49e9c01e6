use crate::{Result, request::RequestId, stepper::Stepper};

/// Handle to one registration in a [`WorkEngine`].
///
/// Keys are unique for the lifetime of the engine, so two registrations that
/// share a [`RequestId`] can still be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StepperKey(u64);

struct ActiveStepper {
    key: StepperKey,
    stepper: Box<dyn Stepper>,
}

/// Outcome of a single [`WorkEngine::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickReport {
    /// Zero-based index of the tick.
    pub tick: u64,
    /// Steppers advanced during the tick.
    pub stepped: usize,
    /// Steppers retired at the end of the tick.
    pub retired: usize,
}

/// Owns the active steppers and advances them in lockstep.
///
/// Each [`tick`](Self::tick) steps every stepper that was active when the tick
/// started exactly once, in registration order, and then retires the ones
/// that report finished. Callers must not rely on the cross-request order.
///
/// The engine is synchronous and never blocks; pacing is up to whoever calls
/// `tick`.
#[derive(Default)]
pub struct WorkEngine {
    active: Vec<ActiveStepper>,
    next_key: u64,
    ticks: u64,
}

impl WorkEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `stepper` to the active set. It is first stepped on the next tick.
    ///
    /// `request_id` is only used for diagnostics; the returned key identifies
    /// this registration.
    pub fn register(&mut self, _request_id: RequestId, stepper: Box<dyn Stepper>) -> StepperKey {
        let key = StepperKey(self.next_key);
        self.next_key += 1;

        #[cfg(feature = "tracing")]
        tracing::trace!(request_id = %_request_id, key = key.0, "Stepper registered");

        self.active.push(ActiveStepper { key, stepper });
        key
    }

    /// Removes the stepper registered under `key`, returning whether it was
    /// still active. Dropping a stepper drops its callback, which releases
    /// the request's output channel.
    pub fn remove(&mut self, key: StepperKey) -> bool {
        match self.active.iter().position(|active| active.key == key) {
            Some(index) => {
                self.active.remove(index);
                true
            }
            None => false,
        }
    }

    /// Advances every active stepper once and retires the finished ones.
    ///
    /// A stepper that was already finished when the tick started is retired
    /// without being stepped.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a stepper. The remaining steppers
    /// are not advanced; the caller is expected to treat this as fatal.
    pub fn tick(&mut self) -> Result<TickReport> {
        let tick = self.ticks;
        self.ticks += 1;

        let mut stepped = 0;
        for active in &mut self.active {
            if active.stepper.is_finished() {
                continue;
            }
            active.stepper.step()?;
            stepped += 1;
        }

        let before = self.active.len();
        self.active.retain(|active| !active.stepper.is_finished());

        Ok(TickReport {
            tick,
            stepped,
            retired: before - self.active.len(),
        })
    }

    /// Drops every active stepper.
    pub fn clear(&mut self) {
        self.active.clear();
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Number of ticks performed so far.
    pub const fn ticks(&self) -> u64 {
        self.ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    /// Finishes after `steps` calls and counts every call it receives.
    struct CountingStepper {
        steps: usize,
        calls: Arc<AtomicUsize>,
        finished: bool,
    }

    impl CountingStepper {
        fn boxed(steps: usize) -> (Box<dyn Stepper>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let stepper = Self {
                steps,
                calls: Arc::clone(&calls),
                finished: steps == 0,
            };
            (Box::new(stepper), calls)
        }
    }

    impl Stepper for CountingStepper {
        fn step(&mut self) -> Result<()> {
            assert!(!self.finished, "stepped after finishing");
            let calls = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
            self.finished = calls >= self.steps;
            Ok(())
        }

        fn is_finished(&self) -> bool {
            self.finished
        }
    }

    struct FailingStepper;

    impl Stepper for FailingStepper {
        fn step(&mut self) -> Result<()> {
            Err(Error::Step {
                reason: "bad state".into(),
            })
        }

        fn is_finished(&self) -> bool {
            false
        }
    }

    #[test]
    fn tick_steps_each_active_stepper_exactly_once() {
        let mut engine = WorkEngine::new();
        let (a, a_calls) = CountingStepper::boxed(3);
        let (b, b_calls) = CountingStepper::boxed(1);
        engine.register("a".into(), a);
        engine.register("b".into(), b);

        let report = engine.tick().unwrap();
        assert_eq!(
            report,
            TickReport {
                tick: 0,
                stepped: 2,
                retired: 1
            }
        );
        assert_eq!(a_calls.load(Ordering::Relaxed), 1);
        assert_eq!(b_calls.load(Ordering::Relaxed), 1);
        assert_eq!(engine.len(), 1);

        // Registered between ticks: first stepped on the following tick.
        let (c, c_calls) = CountingStepper::boxed(2);
        engine.register("c".into(), c);
        assert_eq!(c_calls.load(Ordering::Relaxed), 0);

        engine.tick().unwrap();
        engine.tick().unwrap();
        assert_eq!(a_calls.load(Ordering::Relaxed), 3);
        assert_eq!(b_calls.load(Ordering::Relaxed), 1);
        assert_eq!(c_calls.load(Ordering::Relaxed), 2);
        assert!(engine.is_empty());

        // Finished steppers are never stepped again (CountingStepper asserts).
        let report = engine.tick().unwrap();
        assert_eq!(report.stepped, 0);
        assert_eq!(engine.ticks(), 4);
    }

    #[test]
    fn interleaved_registrations_keep_per_tick_counts() {
        let mut engine = WorkEngine::new();
        let mut handles = Vec::new();

        for round in 0..16_usize {
            let (stepper, calls) = CountingStepper::boxed(round % 5 + 1);
            engine.register(format!("r{round}").into(), stepper);
            handles.push((round % 5 + 1, calls));
            if round % 3 == 0 {
                engine.tick().unwrap();
            }
        }
        while !engine.is_empty() {
            engine.tick().unwrap();
        }

        for (expected, calls) in handles {
            assert_eq!(calls.load(Ordering::Relaxed), expected);
        }
    }

    #[test]
    fn already_finished_stepper_is_retired_without_stepping() {
        let mut engine = WorkEngine::new();
        let (done, calls) = CountingStepper::boxed(0);
        engine.register("done".into(), done);

        let report = engine.tick().unwrap();
        assert_eq!(report.stepped, 0);
        assert_eq!(report.retired, 1);
        assert_eq!(calls.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn remove_only_drops_the_keyed_registration() {
        let mut engine = WorkEngine::new();
        let (a, a_calls) = CountingStepper::boxed(10);
        let (b, b_calls) = CountingStepper::boxed(10);
        // Same request id on purpose: only the key decides what is removed.
        let a_key = engine.register("shared".into(), a);
        let b_key = engine.register("shared".into(), b);
        assert_ne!(a_key, b_key);

        assert!(engine.remove(a_key));
        assert!(!engine.remove(a_key));
        engine.tick().unwrap();

        assert_eq!(a_calls.load(Ordering::Relaxed), 0);
        assert_eq!(b_calls.load(Ordering::Relaxed), 1);
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn step_error_surfaces_from_tick() {
        let mut engine = WorkEngine::new();
        engine.register("bad".into(), Box::new(FailingStepper));

        let err = engine.tick().unwrap_err();
        assert_eq!(
            err,
            Error::Step {
                reason: "bad state".into()
            }
        );
    }
}
