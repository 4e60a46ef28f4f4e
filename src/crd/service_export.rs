//! ServiceExport Custom Resource Definition
//!
//! A ServiceExport is the user-declared intent to publish a namespace-local
//! Service to the hub cluster. The spec carries no fields; the identity of the
//! ServiceExport (namespace/name) names the Service to export. The controller
//! records the outcome of each reconciliation pass in the status conditions
//! and tracks teardown obligations with a cleanup finalizer.

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Condition, ConditionStatus};
use crate::CLEANUP_FINALIZER;

/// Condition type recording whether the Service behind a ServiceExport is
/// currently valid for export
pub const CONDITION_VALID: &str = "Valid";

/// Condition type recording whether the exported Service conflicts with an
/// export of the same Service from another member cluster.
///
/// This condition is written by the hub-side aggregation layer, not by this
/// controller; it is read here to decide whether endpoint sets may be
/// exported.
pub const CONDITION_CONFLICT: &str = "Conflict";

/// Condition reason set when the Service named by a ServiceExport does not
/// exist or has been deleted
pub const REASON_SOURCE_NOT_FOUND: &str = "SourceNotFound";

/// Condition reason set when the Service exists but fails the export
/// eligibility policy
pub const REASON_SOURCE_INELIGIBLE: &str = "SourceIneligible";

/// Specification for a ServiceExport
///
/// Intentionally empty: exporting is a pure intent, parameterized only by the
/// object's identity.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "networking.fleetlink.dev",
    version = "v1alpha1",
    kind = "ServiceExport",
    plural = "serviceexports",
    shortname = "svcexport",
    status = "ServiceExportStatus",
    namespaced,
    printcolumn = r#"{"name":"Valid","type":"string","jsonPath":".status.conditions[?(@.type==\"Valid\")].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
pub struct ServiceExportSpec {}

/// Status for a ServiceExport
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ServiceExportStatus {
    /// Conditions describing the state of the export
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl ServiceExportStatus {
    /// Find the condition with the given type, if present
    pub fn find_condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    /// Add a condition and return self for chaining
    ///
    /// An existing condition of the same type is replaced, never appended to.
    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.retain(|c| c.type_ != condition.type_);
        self.conditions.push(condition);
        self
    }
}

impl ServiceExport {
    /// Whether the cleanup finalizer is present.
    ///
    /// Its absence guarantees the Service has never been exported to the hub.
    pub fn has_cleanup_finalizer(&self) -> bool {
        self.finalizers().iter().any(|f| f == CLEANUP_FINALIZER)
    }

    /// Whether the ServiceExport has been scheduled for deletion
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Whether the export is currently valid with no cross-cluster conflict.
    ///
    /// Requires the Valid condition to be True and the Conflict condition to
    /// be present and False; a missing Conflict condition means the hub-side
    /// conflict resolution has not yet run, so endpoint export must wait.
    pub fn is_valid_with_no_conflict(&self) -> bool {
        let Some(status) = self.status.as_ref() else {
            return false;
        };
        let valid = status
            .find_condition(CONDITION_VALID)
            .map(|c| c.status == ConditionStatus::True)
            .unwrap_or(false);
        let no_conflict = status
            .find_condition(CONDITION_CONFLICT)
            .map(|c| c.status == ConditionStatus::False)
            .unwrap_or(false);
        valid && no_conflict
    }
}
