//! # `stepstream`: async token streams over a synchronous step engine
//!
//! `stepstream` adapts a synchronous, callback-driven "step engine" into an
//! asynchronous, per-request token-streaming API. Many concurrent requests are
//! multiplexed onto a single background driver task that advances every
//! active unit of work one step per tick and yields to the scheduler between
//! ticks.
//!
//! ## Highlights
//!
//! - **One Driver**: A single cooperative Tokio task ticks all requests.
//! - **Push to Pull**: Stepper callbacks push into an unbounded channel that
//!   consumers pull as a [`futures::Stream`].
//! - **Request Cancellation**: Dropping a [`TokenStream`] aborts only that
//!   request.
//! - **Fail Loud**: A driver that exits without being cancelled marks the
//!   engine dead; every in-flight and future request observes
//!   [`Error::EngineDead`].
//!
//! ## Example
//!
//! ```rust
//! use futures::StreamExt;
//! use stepstream::{EchoFactory, GenerateRequest, StreamingEngine};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> stepstream::Result<()> {
//! let engine = StreamingEngine::new(EchoFactory);
//! engine.start_driver()?;
//!
//! let mut tokens = engine.generate(GenerateRequest::new("hello world", 1, "r1"))?;
//! while let Some(token) = tokens.next().await {
//!     println!("{}", token?);
//! }
//!
//! engine.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - [`channel`] - Single-producer/single-consumer output channel.
//! - [`engine`] - Work engine, driver, supervisor and the streaming facade.
//! - [`stepper`] - Traits implemented by units of work and their factories.
//! - [`config`] - Engine tuning and config file resolution.
//! - `echo` - Reference stepper that echoes its prompt (feature `echo`).

pub mod channel;
pub mod config;
#[cfg(feature = "echo")]
mod echo;
pub mod engine;
mod error;
mod request;
pub mod stepper;

pub use crate::channel::{OutputSender, OutputStream, output_channel};
pub use crate::config::{CONFIG_FILE_NAME, EngineConfig, detect_config};
#[cfg(feature = "echo")]
pub use crate::echo::*;
pub use crate::engine::{
    EngineStatus, StepperKey, StreamingEngine, TickReport, TokenStream, WorkEngine,
};
pub use crate::error::*;
pub use crate::request::*;
pub use crate::stepper::{Stepper, StepperFactory, StreamCallback};
