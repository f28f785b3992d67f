//! fleet-scaler — sizes the agent pool to the build queue.
//!
//! Each tick reads the pending job count, snapshots the registry, and
//! computes a [`Decision`] with the pure [`decide`] function. The decision
//! is then executed by fanning out provider calls, one task per instance,
//! with every outcome written back to the registry.
//!
//! ```text
//!  Driver ──tick──▶ Scaler ──▶ QueueSource (pending, concurrency)
//!                     │──────▶ Registry    (snapshot)
//!                     │  decide()
//!                     │──────▶ Provider    (create / destroy, fan-out)
//!                     └──────▶ Registry    (Running / Stopped / Error)
//! ```
//!
//! Ticks are serialized by a lock inside [`Scaler`]; the [`Driver`] owns
//! the interval and the shutdown signal.

pub mod decision;
pub mod driver;
pub mod error;
pub mod names;
pub mod scaler;

pub use decision::{Decision, ScaleAction, decide};
pub use driver::{DEFAULT_GRACE, Driver};
pub use error::{ScalerError, ScalerResult};
pub use names::generate_name;
pub use scaler::{BatchReport, Clock, InstanceTemplate, Scaler, TickOutcome, TickReport};
