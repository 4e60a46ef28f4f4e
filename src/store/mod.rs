//! Object store client seams for the member and hub clusters
//!
//! The reconcilers never touch `kube::Client` directly; they speak to these
//! traits so that tests can substitute mocks and so that the two store scopes
//! (member cluster, reserved hub namespace) stay explicit. Gets map NotFound
//! to `None`, deletes treat NotFound as success, and every other store error
//! is surfaced unmodified for the caller's requeue policy to handle.

mod hub;
mod member;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::discovery::v1::EndpointSlice;

#[cfg(test)]
use mockall::automock;

pub use hub::HubClientImpl;
pub use member::MemberClientImpl;

use crate::crd::{EndpointSliceExport, InternalServiceExport, ServiceExport};
use crate::Error;

/// Store operations scoped to the member cluster
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MemberClient: Send + Sync {
    /// Get a ServiceExport; absence maps to `None`
    async fn get_service_export(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ServiceExport>, Error>;

    /// Replace a ServiceExport (metadata and spec, not status).
    ///
    /// Carries the object's optimistic-concurrency token; a concurrent write
    /// surfaces as a conflict error.
    async fn update_service_export(&self, export: &ServiceExport) -> Result<(), Error>;

    /// Replace the status of a ServiceExport.
    ///
    /// Takes the full object so the write carries its optimistic-concurrency
    /// token; a status written concurrently by another agent surfaces as a
    /// conflict error instead of being overwritten.
    async fn update_service_export_status(&self, export: &ServiceExport) -> Result<(), Error>;

    /// Get a Service; absence maps to `None`
    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>, Error>;

    /// Get an EndpointSlice; absence maps to `None`
    async fn get_endpoint_slice(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<EndpointSlice>, Error>;

    /// Replace an EndpointSlice (used for label bookkeeping only)
    async fn update_endpoint_slice(&self, slice: &EndpointSlice) -> Result<(), Error>;
}

/// Store operations scoped to this member's reserved namespace on the hub
/// cluster
#[cfg_attr(test, automock)]
#[async_trait]
pub trait HubClient: Send + Sync {
    /// Get an InternalServiceExport; absence maps to `None`
    async fn get_internal_service_export(
        &self,
        name: &str,
    ) -> Result<Option<InternalServiceExport>, Error>;

    /// Create an InternalServiceExport in the reserved namespace
    async fn create_internal_service_export(
        &self,
        export: &InternalServiceExport,
    ) -> Result<(), Error>;

    /// Replace an InternalServiceExport
    async fn update_internal_service_export(
        &self,
        export: &InternalServiceExport,
    ) -> Result<(), Error>;

    /// Delete an InternalServiceExport; absence is success, since it signals
    /// a teardown race already resolved
    async fn delete_internal_service_export(&self, name: &str) -> Result<(), Error>;

    /// Get an EndpointSliceExport; absence maps to `None`
    async fn get_endpoint_slice_export(
        &self,
        name: &str,
    ) -> Result<Option<EndpointSliceExport>, Error>;

    /// Create an EndpointSliceExport in the reserved namespace
    async fn create_endpoint_slice_export(&self, export: &EndpointSliceExport)
        -> Result<(), Error>;

    /// Replace an EndpointSliceExport
    async fn update_endpoint_slice_export(&self, export: &EndpointSliceExport)
        -> Result<(), Error>;

    /// Delete an EndpointSliceExport; absence is success
    async fn delete_endpoint_slice_export(&self, name: &str) -> Result<(), Error>;
}
