//! Member-cluster store client implementation

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::discovery::v1::EndpointSlice;
use kube::api::{Api, PostParams};
use kube::{Client, ResourceExt};

use super::MemberClient;
use crate::crd::ServiceExport;
use crate::Error;

/// Real member-cluster store client wrapping a kube Client
pub struct MemberClientImpl {
    client: Client,
}

impl MemberClientImpl {
    /// Create a new MemberClientImpl wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn service_exports(&self, namespace: &str) -> Api<ServiceExport> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn services(&self, namespace: &str) -> Api<Service> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn endpoint_slices(&self, namespace: &str) -> Api<EndpointSlice> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn object_namespace<K: ResourceExt>(obj: &K) -> Result<String, Error> {
    obj.namespace()
        .ok_or_else(|| Error::validation(format!("object {} has no namespace", obj.name_any())))
}

#[async_trait]
impl MemberClient for MemberClientImpl {
    async fn get_service_export(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ServiceExport>, Error> {
        Ok(self.service_exports(namespace).get_opt(name).await?)
    }

    async fn update_service_export(&self, export: &ServiceExport) -> Result<(), Error> {
        let namespace = object_namespace(export)?;
        self.service_exports(&namespace)
            .replace(&export.name_any(), &PostParams::default(), export)
            .await?;
        Ok(())
    }

    async fn update_service_export_status(&self, export: &ServiceExport) -> Result<(), Error> {
        let namespace = object_namespace(export)?;
        // replace_status keeps the object's resourceVersion in the request,
        // so a concurrent status write (the hub agent stamping the Conflict
        // condition) fails with 409 instead of being silently overwritten.
        let data = serde_json::to_vec(export).map_err(|e| Error::serialization(e.to_string()))?;
        self.service_exports(&namespace)
            .replace_status(&export.name_any(), &PostParams::default(), data)
            .await?;
        Ok(())
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>, Error> {
        Ok(self.services(namespace).get_opt(name).await?)
    }

    async fn get_endpoint_slice(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<EndpointSlice>, Error> {
        Ok(self.endpoint_slices(namespace).get_opt(name).await?)
    }

    async fn update_endpoint_slice(&self, slice: &EndpointSlice) -> Result<(), Error> {
        let namespace = object_namespace(slice)?;
        self.endpoint_slices(&namespace)
            .replace(&slice.name_any(), &PostParams::default(), slice)
            .await?;
        Ok(())
    }
}
