//! Export eligibility policies
//!
//! Both controllers defer eligibility judgments to injected policy values, so
//! type restrictions can vary by deployment without touching the
//! reconciliation protocol itself.

use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::discovery::v1::EndpointSlice;

#[cfg(test)]
use mockall::automock;

/// IPv4 address family tag on an EndpointSlice
pub const ADDRESS_TYPE_IPV4: &str = "IPv4";

/// Policy deciding whether a Service may currently be exported to the hub
#[cfg_attr(test, automock)]
pub trait ExportEligibility: Send + Sync {
    /// Whether the Service is eligible for export
    fn is_eligible(&self, svc: &Service) -> bool;
}

/// Default export eligibility policy.
///
/// ExternalName Services resolve to DNS names outside the cluster and carry
/// no endpoints to publish; headless Services have no cluster IP to load
/// balance against. Neither can be meaningfully served from the hub.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultEligibility;

impl ExportEligibility for DefaultEligibility {
    fn is_eligible(&self, svc: &Service) -> bool {
        let Some(spec) = svc.spec.as_ref() else {
            return false;
        };
        if spec.type_.as_deref() == Some("ExternalName") {
            return false;
        }
        if spec.cluster_ip.as_deref() == Some("None") {
            return false;
        }
        true
    }
}

/// Policy deciding whether an EndpointSlice can never be exported, regardless
/// of the state of its governing ServiceExport
#[cfg_attr(test, automock)]
pub trait SliceExportability: Send + Sync {
    /// Whether the EndpointSlice is permanently unexportable
    fn is_permanently_unexportable(&self, slice: &EndpointSlice) -> bool;
}

/// Default slice exportability policy: hub projections carry a fixed IPv4
/// address family, so slices of any other family are permanently
/// unexportable.
#[derive(Clone, Copy, Debug, Default)]
pub struct Ipv4OnlyExportability;

impl SliceExportability for Ipv4OnlyExportability {
    fn is_permanently_unexportable(&self, slice: &EndpointSlice) -> bool {
        slice.address_type != ADDRESS_TYPE_IPV4
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ServiceSpec;

    fn service_of_type(type_: Option<&str>, cluster_ip: Option<&str>) -> Service {
        Service {
            spec: Some(ServiceSpec {
                type_: type_.map(String::from),
                cluster_ip: cluster_ip.map(String::from),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_cluster_ip_service_is_eligible() {
        let svc = service_of_type(Some("ClusterIP"), Some("10.96.0.10"));
        assert!(DefaultEligibility.is_eligible(&svc));
    }

    #[test]
    fn test_external_name_service_is_ineligible() {
        let svc = service_of_type(Some("ExternalName"), None);
        assert!(!DefaultEligibility.is_eligible(&svc));
    }

    #[test]
    fn test_headless_service_is_ineligible() {
        let svc = service_of_type(Some("ClusterIP"), Some("None"));
        assert!(!DefaultEligibility.is_eligible(&svc));
    }

    #[test]
    fn test_service_without_spec_is_ineligible() {
        assert!(!DefaultEligibility.is_eligible(&Service::default()));
    }

    #[test]
    fn test_ipv6_slice_is_permanently_unexportable() {
        let slice = EndpointSlice {
            address_type: "IPv6".to_string(),
            ..Default::default()
        };
        assert!(Ipv4OnlyExportability.is_permanently_unexportable(&slice));

        let slice = EndpointSlice {
            address_type: "IPv4".to_string(),
            ..Default::default()
        };
        assert!(!Ipv4OnlyExportability.is_permanently_unexportable(&slice));
    }
}
