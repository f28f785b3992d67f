//! fleet-queue — where the scaler learns how much work is waiting.
//!
//! A [`QueueSource`] reports the number of pending jobs and how many jobs
//! one agent runs at once. When the source cannot be reached the scaler
//! skips its decision for that tick rather than scaling on missing data.

pub mod drone;
pub mod error;
pub mod source;

pub use drone::DroneQueue;
pub use error::QueueError;
pub use source::{QueueSource, StaticQueue};
