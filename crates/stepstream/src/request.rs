use core::fmt;

/// Caller-supplied identifier of a single `generate` request.
///
/// Handed to [`StepperFactory::abort`](crate::StepperFactory::abort) and used
/// in diagnostics. The engine tracks each registration by its own key, so
/// requests sharing an id never interfere with each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(String);

impl RequestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Parameters of one streaming request.
///
/// `interval` is the pacing interval handed to the stepper factory: a stepper
/// built from it is expected to emit at most one token every `interval`
/// ticks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateRequest {
    pub prompt: String,
    pub interval: usize,
    pub request_id: RequestId,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>, interval: usize, request_id: impl Into<RequestId>) -> Self {
        Self {
            prompt: prompt.into(),
            interval,
            request_id: request_id.into(),
        }
    }
}
