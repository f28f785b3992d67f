//! fleet-provider — the capability contract vendor adapters implement.
//!
//! The scaler only ever talks to a `dyn Provider`. Retry, backoff and
//! request timeouts are the adapter's business; the contract just says
//! "create this" and "destroy that" and reports a [`ProviderError`] when
//! the vendor refuses.
//!
//! [`MockProvider`] is an in-process adapter used by the test suites and
//! for dry runs of the daemon.

pub mod error;
pub mod mock;
pub mod provider;

pub use error::ProviderError;
pub use mock::MockProvider;
pub use provider::{InstanceSpec, Provider, ProvisionedInstance};
