//! Reference stepper that echoes its prompt back one word at a time.
//!
//! Useful for demos, tests and benchmarks: it exercises pacing, completion
//! signalling and abort routing without any real generation behind it.

use crate::{
    Result,
    request::{GenerateRequest, RequestId},
    stepper::{Stepper, StepperFactory, StreamCallback},
};

/// Emits one word of its prompt every `interval` steps.
///
/// Words are emitted on the steps where the internal counter is a multiple of
/// `interval`; in between, the step only advances the counter. After the last
/// word, the next emitting step signals completion with `None`.
pub struct EchoStepper {
    words: Vec<String>,
    interval: usize,
    counter: usize,
    callback: StreamCallback,
    finished: bool,
}

impl EchoStepper {
    /// Splits `prompt` on runs of whitespace, so repeated spaces never yield
    /// empty tokens. An `interval` of zero is treated as one.
    pub fn new(prompt: &str, interval: usize, callback: StreamCallback) -> Self {
        Self {
            words: prompt.split_whitespace().map(str::to_owned).collect(),
            interval: interval.max(1),
            counter: 0,
            callback,
            finished: false,
        }
    }
}

impl Stepper for EchoStepper {
    fn step(&mut self) -> Result<()> {
        if self.counter % self.interval != 0 {
            self.counter += 1;
            return Ok(());
        }

        let index = self.counter / self.interval;
        match self.words.get(index) {
            Some(word) => {
                self.callback.call(index, Some(word.clone()));
                self.counter += 1;
            }
            None => {
                self.callback.call(index, None);
                self.finished = true;
            }
        }
        Ok(())
    }

    fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Builds an [`EchoStepper`] per request.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoFactory;

impl StepperFactory for EchoFactory {
    fn build(&self, request: &GenerateRequest, callback: StreamCallback) -> Box<dyn Stepper> {
        Box::new(EchoStepper::new(&request.prompt, request.interval, callback))
    }

    fn abort(&self, _request_id: &RequestId) {
        // Echo steppers hold no resources beyond what the engine drops.
        #[cfg(feature = "tracing")]
        tracing::trace!(request_id = %_request_id, "Echo request aborted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{channel::output_channel, engine::WorkEngine};
    use futures::{FutureExt, StreamExt};

    #[test]
    fn paced_emission_lands_on_even_ticks() {
        let (sender, mut output) = output_channel();
        let callback = StreamCallback::new("r2".into(), sender);
        let mut engine = WorkEngine::new();
        engine.register("r2".into(), Box::new(EchoStepper::new("a b c", 2, callback)));

        let mut emissions = Vec::new();
        let mut finished_at = None;
        for tick in 0..16_u64 {
            if engine.is_empty() {
                break;
            }
            engine.tick().unwrap();
            loop {
                match output.next().now_or_never() {
                    Some(Some(Ok(token))) => emissions.push((tick, token)),
                    Some(None) => {
                        finished_at = Some(tick);
                        break;
                    }
                    Some(Some(Err(err))) => panic!("unexpected error: {err}"),
                    None => break,
                }
            }
        }

        assert_eq!(
            emissions,
            vec![
                (0, "a".to_string()),
                (2, "b".to_string()),
                (4, "c".to_string())
            ]
        );
        assert_eq!(finished_at, Some(6));
        assert!(engine.is_empty());
    }

    #[test]
    fn empty_prompt_completes_on_first_step() {
        let (sender, output) = output_channel();
        let mut stepper = EchoStepper::new("   ", 3, StreamCallback::new("e".into(), sender));
        stepper.step().unwrap();
        assert!(stepper.is_finished());

        let items = futures::executor::block_on(output.collect::<Vec<_>>());
        assert!(items.is_empty());
    }

    #[test]
    fn zero_interval_behaves_like_one() {
        let (sender, output) = output_channel();
        let mut stepper = EchoStepper::new("x y", 0, StreamCallback::new("z".into(), sender));
        while !stepper.is_finished() {
            stepper.step().unwrap();
        }

        let items = futures::executor::block_on(output.collect::<Vec<_>>());
        assert_eq!(items, vec![Ok("x".to_string()), Ok("y".to_string())]);
    }

    #[test]
    fn repeated_whitespace_yields_no_empty_tokens() {
        let (sender, output) = output_channel();
        let mut stepper = EchoStepper::new("  a   b\t\nc ", 1, StreamCallback::new("w".into(), sender));
        while !stepper.is_finished() {
            stepper.step().unwrap();
        }

        let items = futures::executor::block_on(output.collect::<Vec<_>>());
        assert_eq!(
            items,
            vec![Ok("a".to_string()), Ok("b".to_string()), Ok("c".to_string())]
        );
    }
}
