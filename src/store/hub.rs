//! Hub-cluster store client implementation
//!
//! All reads and writes are scoped to the reserved namespace assigned to this
//! member cluster on the hub; projection objects carry names derived by the
//! unique name assigner, so no other addressing is needed.

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::HubClient;
use crate::crd::{EndpointSliceExport, InternalServiceExport};
use crate::Error;

/// Real hub-cluster store client wrapping a kube Client and the reserved
/// per-member namespace
pub struct HubClientImpl {
    client: Client,
    namespace: String,
}

impl HubClientImpl {
    /// Create a new HubClientImpl scoped to the given reserved namespace
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    fn api<K>(&self) -> Api<K>
    where
        K: Resource<Scope = kube::core::NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    /// Create a projection, stamping the reserved namespace onto a snapshot
    /// of the object.
    async fn create_projection<K>(&self, obj: &K) -> Result<(), Error>
    where
        K: Resource<Scope = kube::core::NamespaceResourceScope>
            + Clone
            + Serialize
            + DeserializeOwned
            + std::fmt::Debug,
        K::DynamicType: Default,
    {
        let mut stamped = obj.clone();
        stamped.meta_mut().namespace = Some(self.namespace.clone());
        self.api::<K>()
            .create(&PostParams::default(), &stamped)
            .await?;
        Ok(())
    }

    async fn update_projection<K>(&self, obj: &K) -> Result<(), Error>
    where
        K: Resource<Scope = kube::core::NamespaceResourceScope>
            + Clone
            + Serialize
            + DeserializeOwned
            + std::fmt::Debug,
        K::DynamicType: Default,
    {
        self.api::<K>()
            .replace(&obj.name_any(), &PostParams::default(), obj)
            .await?;
        Ok(())
    }

    /// Delete a projection, treating absence as success.
    async fn delete_projection<K>(&self, name: &str) -> Result<(), Error>
    where
        K: Resource<Scope = kube::core::NamespaceResourceScope> + Clone + DeserializeOwned + std::fmt::Debug,
        K::DynamicType: Default,
    {
        match self.api::<K>().delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl HubClient for HubClientImpl {
    async fn get_internal_service_export(
        &self,
        name: &str,
    ) -> Result<Option<InternalServiceExport>, Error> {
        Ok(self.api::<InternalServiceExport>().get_opt(name).await?)
    }

    async fn create_internal_service_export(
        &self,
        export: &InternalServiceExport,
    ) -> Result<(), Error> {
        self.create_projection(export).await
    }

    async fn update_internal_service_export(
        &self,
        export: &InternalServiceExport,
    ) -> Result<(), Error> {
        self.update_projection(export).await
    }

    async fn delete_internal_service_export(&self, name: &str) -> Result<(), Error> {
        self.delete_projection::<InternalServiceExport>(name).await
    }

    async fn get_endpoint_slice_export(
        &self,
        name: &str,
    ) -> Result<Option<EndpointSliceExport>, Error> {
        Ok(self.api::<EndpointSliceExport>().get_opt(name).await?)
    }

    async fn create_endpoint_slice_export(
        &self,
        export: &EndpointSliceExport,
    ) -> Result<(), Error> {
        self.create_projection(export).await
    }

    async fn update_endpoint_slice_export(
        &self,
        export: &EndpointSliceExport,
    ) -> Result<(), Error> {
        self.update_projection(export).await
    }

    async fn delete_endpoint_slice_export(&self, name: &str) -> Result<(), Error> {
        self.delete_projection::<EndpointSliceExport>(name).await
    }
}
