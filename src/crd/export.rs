//! Hub-side projection Custom Resource Definitions
//!
//! These are data transport types: member clusters use them to upload the
//! spec of exported Services and EndpointSlices into the reserved per-member
//! namespace on the hub cluster. They are owned exclusively by the member's
//! controllers; nothing else writes them.

use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::discovery::v1::EndpointSlice;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// IP protocol of an exported port; defaults to TCP
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExportedProtocol {
    /// Transmission Control Protocol
    #[default]
    Tcp,
    /// User Datagram Protocol
    Udp,
    /// Stream Control Transmission Protocol
    Sctp,
}

impl From<Option<&str>> for ExportedProtocol {
    fn from(value: Option<&str>) -> Self {
        match value {
            Some("UDP") => Self::Udp,
            Some("SCTP") => Self::Sctp,
            _ => Self::Tcp,
        }
    }
}

/// Number or name of the target port of an exported port
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(untagged)]
pub enum TargetPort {
    /// Numeric target port
    Number(i32),
    /// Named target port, resolved against the backing workload's port names
    Name(String),
}

/// One port exposed by an exported Service
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExportedPort {
    /// The name of the exported port in this Service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// The IP protocol for this exported port
    #[serde(default)]
    pub protocol: ExportedProtocol,

    /// The application protocol for this port, following standard Kubernetes
    /// label syntax
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_protocol: Option<String>,

    /// The exported port
    pub port: i32,

    /// The number or name of the target port
    pub target_port: TargetPort,
}

/// Specification of an exported Service; only the ports of the Service are
/// synchronized at this stage
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "networking.fleetlink.dev",
    version = "v1alpha1",
    kind = "InternalServiceExport",
    plural = "internalserviceexports",
    namespaced
)]
pub struct InternalServiceExportSpec {
    /// A list of ports exposed by the exported Service
    #[serde(default)]
    pub ports: Vec<ExportedPort>,
}

impl InternalServiceExportSpec {
    /// Build the projected spec from the current state of a Service.
    ///
    /// The projection is rebuilt in full on every pass; any drift on the hub
    /// side self-heals at the next write.
    pub fn from_service(svc: &Service) -> Self {
        let ports = svc
            .spec
            .as_ref()
            .and_then(|spec| spec.ports.as_ref())
            .map(|ports| {
                ports
                    .iter()
                    .map(|p| ExportedPort {
                        name: p.name.clone(),
                        protocol: ExportedProtocol::from(p.protocol.as_deref()),
                        app_protocol: p.app_protocol.clone(),
                        port: p.port,
                        target_port: match &p.target_port {
                            Some(IntOrString::Int(i)) => TargetPort::Number(*i),
                            Some(IntOrString::String(s)) => TargetPort::Name(s.clone()),
                            // targetPort defaults to the service port itself
                            None => TargetPort::Number(p.port),
                        },
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self { ports }
    }
}

/// One endpoint of an exported EndpointSlice
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ExportedEndpoint {
    /// Addresses of this endpoint, copied from the member-side slice
    pub addresses: Vec<String>,
}

/// One port of an exported EndpointSlice, copied verbatim from the
/// member-side slice
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExportedEndpointPort {
    /// The name of this port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// The IP protocol for this port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,

    /// The application protocol for this port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_protocol: Option<String>,

    /// The port number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
}

/// Provenance reference from a hub projection back to the member-side object
/// it was derived from
///
/// Downstream consumers compare the resource version and generation against
/// later uploads to detect staleness.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExportedObjectReference {
    /// ID of the member cluster the object was exported from
    pub cluster_id: String,
    /// API version of the source object
    pub api_version: String,
    /// Kind of the source object
    pub kind: String,
    /// Namespace of the source object in the member cluster
    pub namespace: String,
    /// Name of the source object in the member cluster
    pub name: String,
    /// Resource version of the source object at export time
    pub resource_version: String,
    /// Generation of the source object at export time
    pub generation: i64,
    /// UID of the source object
    pub uid: String,
}

/// Specification of an exported EndpointSlice
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "networking.fleetlink.dev",
    version = "v1alpha1",
    kind = "EndpointSliceExport",
    plural = "endpointsliceexports",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct EndpointSliceExportSpec {
    /// Address family of the exported endpoints; only IPv4 slices are
    /// exported
    pub address_type: String,

    /// Endpoints extracted from the member-side slice
    #[serde(default)]
    pub endpoints: Vec<ExportedEndpoint>,

    /// Ports copied verbatim from the member-side slice
    #[serde(default)]
    pub ports: Vec<ExportedEndpointPort>,

    /// Reference to the member-side EndpointSlice this projection was derived
    /// from
    pub endpoint_slice_reference: ExportedObjectReference,
}

impl EndpointSliceExportSpec {
    /// Build the projected spec from the current state of an EndpointSlice.
    ///
    /// Endpoint addresses and ports are copied as-is; the provenance reference
    /// captures the slice's identity and versioning for staleness detection.
    pub fn from_slice(cluster_id: &str, slice: &EndpointSlice) -> Self {
        let endpoints = slice
            .endpoints
            .iter()
            .map(|ep| ExportedEndpoint {
                addresses: ep.addresses.clone(),
            })
            .collect();
        let ports = slice
            .ports
            .as_ref()
            .map(|ports| {
                ports
                    .iter()
                    .map(|p| ExportedEndpointPort {
                        name: p.name.clone(),
                        protocol: p.protocol.clone(),
                        app_protocol: p.app_protocol.clone(),
                        port: p.port,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            address_type: "IPv4".to_string(),
            endpoints,
            ports,
            endpoint_slice_reference: ExportedObjectReference {
                cluster_id: cluster_id.to_string(),
                api_version: "discovery.k8s.io/v1".to_string(),
                kind: "EndpointSlice".to_string(),
                namespace: slice.namespace().unwrap_or_default(),
                name: slice.name_any(),
                resource_version: slice.resource_version().unwrap_or_default(),
                generation: slice.metadata.generation.unwrap_or_default(),
                uid: slice.uid().unwrap_or_default(),
            },
        }
    }
}
