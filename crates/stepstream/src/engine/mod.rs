//! Scheduling core: the work engine, its background driver and the
//! streaming facade.
//!
//! ## Submodules
//!
//! - [`work`] - Synchronous set of active steppers, advanced one tick at a
//!   time.
//! - `driver` - The cooperative driver loop and the supervisor that escalates
//!   its unexpected termination.
//! - `state` - State shared between the facade, the driver and the streams.
//! - [`streaming`] - [`StreamingEngine`] and the per-request [`TokenStream`].

mod driver;
mod state;
pub mod streaming;
pub mod work;


pub use state::EngineStatus;
pub use streaming::{StreamingEngine, TokenStream};
pub use work::{StepperKey, TickReport, WorkEngine};
