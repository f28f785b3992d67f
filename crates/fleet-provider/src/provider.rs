//! The provider trait and its request/response types.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use fleet_registry::Instance;

use crate::error::ProviderError;

/// Parameters for one instance creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSpec {
    pub name: String,
    pub region: String,
    pub size: String,
    pub image: String,
    pub tags: Vec<String>,
}

impl InstanceSpec {
    /// Build the creation request from a registry record.
    pub fn from_instance(instance: &Instance) -> Self {
        Self {
            name: instance.name.clone(),
            region: instance.region.clone(),
            size: instance.size.clone(),
            image: instance.image.clone(),
            tags: instance.tags.clone(),
        }
    }
}

/// What the vendor reports for a live instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedInstance {
    /// Public IPv4 or IPv6 address.
    pub address: String,
    /// Vendor-side identifier, if the vendor has one distinct from the name.
    pub provider_id: Option<String>,
}

/// A cloud vendor adapter.
///
/// Calls block on network I/O. When `cancel` fires (process shutdown) an
/// adapter should abandon its vendor request and return
/// [`ProviderError::Cancelled`] promptly, so the caller can still record
/// the outcome. Creation is not idempotent: a timeout or cancellation after
/// the vendor accepted the request can leave an instance the caller never
/// hears about.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Adapter kind recorded on each instance (e.g. "mock").
    fn kind(&self) -> &str;

    /// Provision an instance and wait until it has an address.
    async fn create_instance(
        &self,
        spec: &InstanceSpec,
        cancel: &CancellationToken,
    ) -> Result<ProvisionedInstance, ProviderError>;

    /// Tear down an instance. Returns `ProviderError::NotFound` if the
    /// vendor no longer knows it.
    async fn destroy_instance(
        &self,
        instance: &Instance,
        cancel: &CancellationToken,
    ) -> Result<(), ProviderError>;
}
