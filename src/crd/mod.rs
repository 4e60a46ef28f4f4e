//! Custom Resource Definitions for Fleetlink
//!
//! This module contains the member-side export intent CRD and the hub-side
//! projection CRDs that member clusters use to upload exported state.

mod export;
mod service_export;
mod types;

pub use export::{
    EndpointSliceExport, EndpointSliceExportSpec, ExportedEndpoint, ExportedEndpointPort,
    ExportedObjectReference, ExportedPort, ExportedProtocol, InternalServiceExport,
    InternalServiceExportSpec, TargetPort,
};
pub use service_export::{
    ServiceExport, ServiceExportSpec, ServiceExportStatus, CONDITION_CONFLICT, CONDITION_VALID,
    REASON_SOURCE_INELIGIBLE, REASON_SOURCE_NOT_FOUND,
};
pub use types::{Condition, ConditionStatus};
