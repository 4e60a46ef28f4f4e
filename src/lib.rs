//! Fleetlink - member-to-hub export synchronization for multi-cluster networking
//!
//! Fleetlink republishes selected networking objects from a member cluster into
//! a reserved namespace on a shared hub cluster, so that a hub-side aggregation
//! layer can build cross-cluster service discovery on top of consistent,
//! deduplicated data.
//!
//! # Architecture
//!
//! Two level-triggered controllers run per member cluster:
//! - The ServiceExport controller publishes a Service's port spec to the hub
//!   as an InternalServiceExport when the Service is eligible for export, and
//!   tears the projection down (hub delete first, finalizer removal second)
//!   when eligibility is lost or the export intent is deleted.
//! - The EndpointSlice controller publishes the endpoint sets backing an
//!   exported Service as EndpointSliceExports, keyed by a fleet-wide-unique
//!   name held in a label on the member-side EndpointSlice. It re-evaluates
//!   its decision whenever the slice itself or its governing ServiceExport
//!   changes.
//!
//! # Modules
//!
//! - [`crd`] - Custom Resource Definitions (ServiceExport and the hub-side
//!   projection types)
//! - [`controller`] - reconciliation logic for both controllers
//! - [`store`] - member- and hub-scoped object store client seams
//! - [`policy`] - injected export eligibility policies
//! - [`unique_name`] - fleet-wide-unique name assignment
//! - [`runner`] - controller future construction and watch wiring
//! - [`error`] - error types

#![deny(missing_docs)]

pub mod controller;
pub mod crd;
pub mod error;
pub mod policy;
pub mod runner;
pub mod store;
pub mod unique_name;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Standard label naming the Service an EndpointSlice belongs to.
///
/// An EndpointSlice without this label is not in use by any Service and is
/// never exported.
pub const SERVICE_NAME_LABEL: &str = "kubernetes.io/service-name";

/// Label carrying the fleet-wide-unique name assigned to an exported
/// EndpointSlice.
///
/// Once assigned the value is stable for the slice's lifetime; it is the sole
/// source of truth for the hub projection's name and is removed only after the
/// projection has been deleted.
pub const UNIQUE_NAME_LABEL: &str = "networking.fleetlink.dev/unique-name";

/// Cleanup finalizer added to a ServiceExport before its Service is first
/// exported to the hub.
///
/// Its presence guarantees that deleting the ServiceExport triggers unexport
/// before the object leaves the store; it is removed only after the hub
/// projection has been deleted.
pub const CLEANUP_FINALIZER: &str = "networking.fleetlink.dev/service-export-cleanup";

/// Field manager name used for server-side apply of the CRD manifests
pub const FIELD_MANAGER: &str = "fleetlink-controller";
