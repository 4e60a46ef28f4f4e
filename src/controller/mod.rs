//! Controller implementations for Fleetlink
//!
//! This module contains the reconciliation logic for the export/unexport
//! protocol. Controllers follow the Kubernetes controller pattern with
//! level-triggered observe-decide-act loops: every pass re-reads current
//! state from the stores rather than trusting the triggering event.

mod endpoint_slice;
mod service_export;

pub use endpoint_slice::{
    decide, error_policy as slice_error_policy, reconcile as reconcile_endpoint_slice,
    ExportDecision, SliceContext,
};
pub use service_export::{
    error_policy as export_error_policy, reconcile as reconcile_service_export, ExportContext,
};
