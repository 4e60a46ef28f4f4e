//! EndpointSlice controller implementation
//!
//! Owns the lifecycle of the hub projections derived from EndpointSlices.
//! A slice's projection mirrors the validity of the ServiceExport governing
//! its Service and the slice's own deletion timestamp, not the slice's spec
//! content; the three-way Skip / Unexport / Continue decision is computed
//! fresh on every pass.
//!
//! The controller is triggered by changes to EndpointSlices directly and by
//! changes to ServiceExports indirectly, via the label-selector fan-out in
//! the runner, so eligibility changes propagate to dependents that have not
//! themselves changed.

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::discovery::v1::EndpointSlice;
use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::{debug, error, info, instrument};

use crate::crd::{EndpointSliceExport, EndpointSliceExportSpec, ServiceExport};
use crate::policy::{Ipv4OnlyExportability, SliceExportability};
use crate::store::{HubClient, MemberClient};
use crate::{unique_name, Error, SERVICE_NAME_LABEL, UNIQUE_NAME_LABEL};

/// Controller context for the EndpointSlice controller
pub struct SliceContext {
    /// Member-cluster store client
    pub member: Arc<dyn MemberClient>,
    /// Hub store client scoped to this member's reserved namespace
    pub hub: Arc<dyn HubClient>,
    /// ID of this member cluster, folded into assigned unique names and
    /// provenance references
    pub cluster_id: String,
    /// Policy deciding whether a slice can never be exported
    pub exportability: Arc<dyn SliceExportability>,
}

impl SliceContext {
    /// Create a context with the default exportability policy
    pub fn new(
        member: Arc<dyn MemberClient>,
        hub: Arc<dyn HubClient>,
        cluster_id: impl Into<String>,
    ) -> Self {
        Self {
            member,
            hub,
            cluster_id: cluster_id.into(),
            exportability: Arc::new(Ipv4OnlyExportability),
        }
    }

    /// Replace the exportability policy
    pub fn with_exportability(mut self, exportability: Arc<dyn SliceExportability>) -> Self {
        self.exportability = exportability;
        self
    }
}

/// Outcome of the per-pass export decision for an EndpointSlice
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportDecision {
    /// The slice requires no action this pass
    Skip,
    /// The slice's hub projection must be deleted and its unique-name label
    /// removed
    Unexport,
    /// The slice must be exported (create-or-update its hub projection)
    Continue,
}

/// Decide what to do with an EndpointSlice.
///
/// A total, order-independent function of the slice's labels, the governing
/// ServiceExport lookup result, the slice's deletion timestamp, and the
/// permanently-unexportable predicate:
/// - a slice can only be exported while it is in use by a Service whose
///   export is valid with no conflicts, and it is not being deleted;
/// - a slice that has been exported before (unique-name label present) but no
///   longer qualifies must be unexported;
/// - a slice that neither qualifies nor has been exported is skipped.
pub fn decide(
    slice: &EndpointSlice,
    svc_export: Option<&ServiceExport>,
    permanently_unexportable: bool,
) -> ExportDecision {
    if permanently_unexportable {
        return ExportDecision::Skip;
    }

    let has_service_name_label = slice.labels().contains_key(SERVICE_NAME_LABEL);
    // No unique-name label means no attempt has ever been made to export the
    // slice, so there can be nothing on the hub to tear down.
    let has_unique_name_label = slice.labels().contains_key(UNIQUE_NAME_LABEL);

    if !has_service_name_label {
        // Not in use by any Service; an exported slice in this state is an
        // orphan and must be unexported.
        return if has_unique_name_label {
            ExportDecision::Unexport
        } else {
            ExportDecision::Skip
        };
    }

    let governing_export_active = svc_export
        .map(|export| export.is_valid_with_no_conflict())
        .unwrap_or(false);
    if !governing_export_active {
        return if has_unique_name_label {
            ExportDecision::Unexport
        } else {
            ExportDecision::Skip
        };
    }

    if has_unique_name_label && slice.metadata.deletion_timestamp.is_some() {
        return ExportDecision::Unexport;
    }

    ExportDecision::Continue
}

/// Reconcile an EndpointSlice
#[instrument(skip(slice, ctx), fields(
    namespace = %slice.namespace().unwrap_or_default(),
    name = %slice.name_any(),
))]
pub async fn reconcile(slice: Arc<EndpointSlice>, ctx: Arc<SliceContext>) -> Result<Action, Error> {
    let namespace = slice
        .namespace()
        .ok_or_else(|| Error::validation("EndpointSlice has no namespace"))?;
    let name = slice.name_any();

    // Re-fetch the slice. If it is gone, nothing is owed here; a projection
    // left on the hub without a member-side slice is a leftover for the
    // hub-side janitor to reclaim, not this controller.
    let Some(slice) = ctx.member.get_endpoint_slice(&namespace, &name).await? else {
        debug!("endpoint slice no longer exists");
        return Ok(Action::await_change());
    };

    // Look up the governing ServiceExport, if the slice is in use by a
    // Service at all.
    let svc_export = match slice.labels().get(SERVICE_NAME_LABEL) {
        Some(svc_name) => ctx.member.get_service_export(&namespace, svc_name).await?,
        None => None,
    };

    let permanently_unexportable = ctx.exportability.is_permanently_unexportable(&slice);
    match decide(&slice, svc_export.as_ref(), permanently_unexportable) {
        ExportDecision::Skip => {
            debug!("endpoint slice skipped");
            Ok(Action::await_change())
        }
        ExportDecision::Unexport => {
            info!("unexporting endpoint slice");
            unexport_slice(&ctx, &slice).await?;
            Ok(Action::await_change())
        }
        ExportDecision::Continue => {
            export_slice(&ctx, &slice).await?;
            Ok(Action::await_change())
        }
    }
}

/// Error policy for the EndpointSlice controller
pub fn error_policy(slice: Arc<EndpointSlice>, error: &Error, _ctx: Arc<SliceContext>) -> Action {
    if error.is_conflict() {
        debug!(
            name = %slice.name_any(),
            "conflicting write detected, requeueing against fresh state"
        );
    } else {
        error!(
            ?error,
            name = %slice.name_any(),
            "endpoint slice reconciliation failed"
        );
    }
    Action::requeue(Duration::from_secs(5))
}

/// Unexport an EndpointSlice by deleting its hub projection, then removing
/// the unique-name label.
///
/// Deleting the hub side first means a member-side slice never loses its
/// label while a projection it names still exists; the remaining gap (crash
/// after the hub delete, before the label removal) re-derives Unexport on the
/// next pass and retries the label removal, which is idempotent.
async fn unexport_slice(ctx: &SliceContext, slice: &EndpointSlice) -> Result<(), Error> {
    let Some(fleet_name) = slice.labels().get(UNIQUE_NAME_LABEL) else {
        // Decision table only yields Unexport when the label is present.
        return Ok(());
    };

    // A unique name is always assigned before a slice is exported, so the
    // projection may legitimately not exist yet; absence is success.
    ctx.hub.delete_endpoint_slice_export(fleet_name).await?;

    let mut updated = slice.clone();
    if let Some(labels) = updated.metadata.labels.as_mut() {
        labels.remove(UNIQUE_NAME_LABEL);
    }
    ctx.member.update_endpoint_slice(&updated).await
}

/// Export an EndpointSlice: ensure a unique name is assigned, then
/// create-or-update the hub projection with a spec rebuilt in full from the
/// current slice.
async fn export_slice(ctx: &SliceContext, slice: &EndpointSlice) -> Result<(), Error> {
    let fleet_name = match slice.labels().get(UNIQUE_NAME_LABEL) {
        Some(name) => name.clone(),
        None => assign_unique_name(ctx, slice).await?,
    };

    let spec = EndpointSliceExportSpec::from_slice(&ctx.cluster_id, slice);
    match ctx.hub.get_endpoint_slice_export(&fleet_name).await? {
        None => {
            let projection = EndpointSliceExport::new(&fleet_name, spec);
            ctx.hub.create_endpoint_slice_export(&projection).await?;
            info!(projection = %fleet_name, "endpoint slice exported to hub");
        }
        Some(existing) => {
            let mut updated = existing.clone();
            updated.spec = spec;
            ctx.hub.update_endpoint_slice_export(&updated).await?;
            debug!(projection = %fleet_name, "exported endpoint slice updated");
        }
    }
    Ok(())
}

/// Assign a fleet-wide-unique name to an EndpointSlice as a label and
/// persist it.
///
/// The label must be visible in the member store before the first hub write,
/// so that teardown can always find the projection by reading the slice.
async fn assign_unique_name(ctx: &SliceContext, slice: &EndpointSlice) -> Result<String, Error> {
    let namespace = slice
        .namespace()
        .ok_or_else(|| Error::validation("EndpointSlice has no namespace"))?;
    let fleet_name =
        unique_name::fleet_unique_name(&ctx.cluster_id, &namespace, &slice.name_any());

    let mut updated = slice.clone();
    updated
        .metadata
        .labels
        .get_or_insert_with(Default::default)
        .insert(UNIQUE_NAME_LABEL.to_string(), fleet_name.clone());
    ctx.member.update_endpoint_slice(&updated).await?;
    debug!(unique_name = %fleet_name, "unique name assigned");
    Ok(fleet_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{
        Condition, ConditionStatus, ServiceExportSpec, ServiceExportStatus, CONDITION_CONFLICT,
        CONDITION_VALID,
    };
    use crate::policy::MockSliceExportability;
    use crate::store::{MockHubClient, MockMemberClient};
    use k8s_openapi::api::discovery::v1::{Endpoint, EndpointPort};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    const CLUSTER_ID: &str = "member-1";

    fn slice_with_labels(name: &str, labels: &[(&str, &str)]) -> EndpointSlice {
        let labels: BTreeMap<String, String> = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EndpointSlice {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                labels: (!labels.is_empty()).then_some(labels),
                ..Default::default()
            },
            address_type: "IPv4".to_string(),
            endpoints: vec![Endpoint {
                addresses: vec!["10.0.0.1".to_string()],
                ..Default::default()
            }],
            ports: Some(vec![EndpointPort {
                name: Some("http".to_string()),
                port: Some(8080),
                protocol: Some("TCP".to_string()),
                app_protocol: None,
            }]),
        }
    }

    fn unexported_slice(name: &str) -> EndpointSlice {
        slice_with_labels(name, &[(SERVICE_NAME_LABEL, "svc-1")])
    }

    fn exported_slice(name: &str) -> EndpointSlice {
        slice_with_labels(
            name,
            &[
                (SERVICE_NAME_LABEL, "svc-1"),
                (UNIQUE_NAME_LABEL, "member-1-default-svc-1-slice"),
            ],
        )
    }

    fn export_with_validity(valid: bool) -> ServiceExport {
        let valid_cond = if valid {
            Condition::new(CONDITION_VALID, ConditionStatus::True, "ServiceExported", "")
        } else {
            Condition::new(CONDITION_VALID, ConditionStatus::False, "SourceNotFound", "")
        };
        ServiceExport {
            metadata: ObjectMeta {
                name: Some("svc-1".to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            spec: ServiceExportSpec::default(),
            status: Some(
                ServiceExportStatus::default()
                    .condition(valid_cond)
                    .condition(Condition::new(
                        CONDITION_CONFLICT,
                        ConditionStatus::False,
                        "NoConflictDetected",
                        "",
                    )),
            ),
        }
    }

    fn exportable() -> Arc<MockSliceExportability> {
        let mut policy = MockSliceExportability::new();
        policy
            .expect_is_permanently_unexportable()
            .return_const(false);
        Arc::new(policy)
    }

    fn ctx(member: MockMemberClient, hub: MockHubClient) -> Arc<SliceContext> {
        Arc::new(
            SliceContext::new(Arc::new(member), Arc::new(hub), CLUSTER_ID)
                .with_exportability(exportable()),
        )
    }

    mod decision_table {
        use super::*;

        #[test]
        fn test_permanently_unexportable_always_skips() {
            // Even a fully qualifying slice is skipped when the predicate
            // marks it permanently unexportable.
            let slice = exported_slice("svc-1-abc");
            let export = export_with_validity(true);
            assert_eq!(decide(&slice, Some(&export), true), ExportDecision::Skip);
        }

        #[test]
        fn test_no_labels_skips() {
            let slice = slice_with_labels("svc-1-abc", &[]);
            assert_eq!(decide(&slice, None, false), ExportDecision::Skip);
        }

        #[test]
        fn test_orphaned_exported_slice_unexports() {
            // Unique-name label without a service-name label: the slice was
            // exported once and then detached from its Service.
            let slice = slice_with_labels("svc-1-abc", &[(UNIQUE_NAME_LABEL, "u")]);
            assert_eq!(decide(&slice, None, false), ExportDecision::Unexport);
        }

        #[test]
        fn test_missing_export_skips_when_never_exported() {
            let slice = unexported_slice("svc-1-abc");
            assert_eq!(decide(&slice, None, false), ExportDecision::Skip);
        }

        #[test]
        fn test_missing_export_unexports_when_previously_exported() {
            let slice = exported_slice("svc-1-abc");
            assert_eq!(decide(&slice, None, false), ExportDecision::Unexport);
        }

        #[test]
        fn test_invalid_export_skips_when_never_exported() {
            let slice = unexported_slice("svc-1-abc");
            let export = export_with_validity(false);
            assert_eq!(decide(&slice, Some(&export), false), ExportDecision::Skip);
        }

        #[test]
        fn test_invalid_export_unexports_when_previously_exported() {
            let slice = exported_slice("svc-1-abc");
            let export = export_with_validity(false);
            assert_eq!(
                decide(&slice, Some(&export), false),
                ExportDecision::Unexport
            );
        }

        #[test]
        fn test_deleted_exported_slice_unexports() {
            let mut slice = exported_slice("svc-1-abc");
            slice.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
            let export = export_with_validity(true);
            assert_eq!(
                decide(&slice, Some(&export), false),
                ExportDecision::Unexport
            );
        }

        #[test]
        fn test_valid_export_continues() {
            let export = export_with_validity(true);
            assert_eq!(
                decide(&unexported_slice("a"), Some(&export), false),
                ExportDecision::Continue
            );
            assert_eq!(
                decide(&exported_slice("a"), Some(&export), false),
                ExportDecision::Continue
            );
        }
    }

    /// Story: a slice deleted before the controller could see it is a no-op.
    #[tokio::test]
    async fn story_missing_slice_is_a_no_op() {
        let mut member = MockMemberClient::new();
        member.expect_get_endpoint_slice().returning(|_, _| Ok(None));
        let hub = MockHubClient::new();

        let action = reconcile(
            Arc::new(unexported_slice("svc-1-abc")),
            ctx(member, hub),
        )
        .await
        .expect("reconcile should succeed");
        assert_eq!(action, Action::await_change());
    }

    /// Story: a slice backing a validly exported Service gets a unique name
    /// assigned as a label before the hub projection is created under that
    /// name.
    #[tokio::test]
    async fn story_first_export_assigns_unique_name_then_creates_projection() {
        let label_persisted = Arc::new(Mutex::new(false));
        let label_flag = label_persisted.clone();
        let label_before_write = label_persisted.clone();

        let mut member = MockMemberClient::new();
        member
            .expect_get_endpoint_slice()
            .returning(|_, name| Ok(Some(unexported_slice(name))));
        member
            .expect_get_service_export()
            .returning(|_, _| Ok(Some(export_with_validity(true))));
        member
            .expect_update_endpoint_slice()
            .withf(|slice| {
                slice.labels().get(UNIQUE_NAME_LABEL).map(String::as_str)
                    == Some("member-1-default-svc-1-abc")
            })
            .times(1)
            .returning(move |_| {
                *label_flag.lock().unwrap() = true;
                Ok(())
            });

        let mut hub = MockHubClient::new();
        hub.expect_get_endpoint_slice_export().returning(|_| Ok(None));
        hub.expect_create_endpoint_slice_export()
            .withf(move |projection| {
                // The label must be persisted before the first hub write.
                *label_before_write.lock().unwrap()
                    && projection.metadata.name.as_deref() == Some("member-1-default-svc-1-abc")
                    && projection.spec.address_type == "IPv4"
                    && projection.spec.endpoints.len() == 1
                    && projection.spec.endpoint_slice_reference.cluster_id == CLUSTER_ID
            })
            .times(1)
            .returning(|_| Ok(()));

        reconcile(Arc::new(unexported_slice("svc-1-abc")), ctx(member, hub))
            .await
            .expect("reconcile should succeed");
    }

    /// Story: once assigned, the unique name in the label is reused verbatim
    /// and the existing projection is updated in place.
    #[tokio::test]
    async fn story_assigned_name_is_stable_across_passes() {
        let mut member = MockMemberClient::new();
        member
            .expect_get_endpoint_slice()
            .returning(|_, name| Ok(Some(exported_slice(name))));
        member
            .expect_get_service_export()
            .returning(|_, _| Ok(Some(export_with_validity(true))));
        // No update_endpoint_slice expectation: re-assigning would panic.

        let mut hub = MockHubClient::new();
        hub.expect_get_endpoint_slice_export()
            .withf(|name| name == "member-1-default-svc-1-slice")
            .returning(|name| {
                Ok(Some(EndpointSliceExport::new(
                    name,
                    EndpointSliceExportSpec::default(),
                )))
            });
        hub.expect_update_endpoint_slice_export()
            .withf(|projection| {
                projection.metadata.name.as_deref() == Some("member-1-default-svc-1-slice")
                    && projection.spec.endpoints.len() == 1
            })
            .times(1)
            .returning(|_| Ok(()));

        reconcile(Arc::new(exported_slice("svc-1-abc")), ctx(member, hub))
            .await
            .expect("reconcile should succeed");
    }

    /// Story: when the governing export turns invalid, the next pass deletes
    /// the hub projection first and removes the unique-name label second.
    #[tokio::test]
    async fn story_export_turned_invalid_unexports_in_order() {
        let hub_deleted = Arc::new(Mutex::new(false));
        let hub_deleted_flag = hub_deleted.clone();
        let hub_deleted_before_update = hub_deleted.clone();

        let mut member = MockMemberClient::new();
        member
            .expect_get_endpoint_slice()
            .returning(|_, name| Ok(Some(exported_slice(name))));
        member
            .expect_get_service_export()
            .returning(|_, _| Ok(Some(export_with_validity(false))));
        member
            .expect_update_endpoint_slice()
            .withf(move |slice| {
                *hub_deleted_before_update.lock().unwrap()
                    && !slice.labels().contains_key(UNIQUE_NAME_LABEL)
            })
            .times(1)
            .returning(|_| Ok(()));

        let mut hub = MockHubClient::new();
        hub.expect_delete_endpoint_slice_export()
            .withf(|name| name == "member-1-default-svc-1-slice")
            .times(1)
            .returning(move |_| {
                *hub_deleted_flag.lock().unwrap() = true;
                Ok(())
            });

        reconcile(Arc::new(exported_slice("svc-1-abc")), ctx(member, hub))
            .await
            .expect("reconcile should succeed");
    }

    /// Story: an orphaned slice (unique-name label, no service-name label)
    /// is unexported without consulting any ServiceExport.
    #[tokio::test]
    async fn story_orphaned_slice_is_unexported() {
        let mut member = MockMemberClient::new();
        member.expect_get_endpoint_slice().returning(|_, name| {
            Ok(Some(slice_with_labels(name, &[(UNIQUE_NAME_LABEL, "u-1")])))
        });
        member
            .expect_update_endpoint_slice()
            .times(1)
            .returning(|_| Ok(()));

        let mut hub = MockHubClient::new();
        hub.expect_delete_endpoint_slice_export()
            .withf(|name| name == "u-1")
            .times(1)
            .returning(|_| Ok(()));

        reconcile(
            Arc::new(slice_with_labels("svc-1-abc", &[(UNIQUE_NAME_LABEL, "u-1")])),
            ctx(member, hub),
        )
        .await
        .expect("reconcile should succeed");
    }

    /// Story: a crash between the hub delete and the label removal re-derives
    /// Unexport on the next pass; the already-absent projection is success
    /// and the label removal is retried.
    #[tokio::test]
    async fn story_unexport_retry_after_partial_teardown_succeeds() {
        let mut member = MockMemberClient::new();
        member
            .expect_get_endpoint_slice()
            .returning(|_, name| Ok(Some(exported_slice(name))));
        member
            .expect_get_service_export()
            .returning(|_, _| Ok(Some(export_with_validity(false))));
        member
            .expect_update_endpoint_slice()
            .withf(|slice| !slice.labels().contains_key(UNIQUE_NAME_LABEL))
            .times(1)
            .returning(|_| Ok(()));

        let mut hub = MockHubClient::new();
        // Projection already deleted by the crashed pass; absence is success.
        hub.expect_delete_endpoint_slice_export()
            .times(1)
            .returning(|_| Ok(()));

        reconcile(Arc::new(exported_slice("svc-1-abc")), ctx(member, hub))
            .await
            .expect("repeated unexport must succeed");
    }

    /// Story: a slice whose Service has no export intent is skipped without
    /// side effects.
    #[tokio::test]
    async fn story_unexported_slice_without_intent_is_skipped() {
        let mut member = MockMemberClient::new();
        member
            .expect_get_endpoint_slice()
            .returning(|_, name| Ok(Some(unexported_slice(name))));
        member
            .expect_get_service_export()
            .returning(|_, _| Ok(None));
        // No hub expectations: any hub call would panic.
        let hub = MockHubClient::new();

        reconcile(Arc::new(unexported_slice("svc-1-abc")), ctx(member, hub))
            .await
            .expect("reconcile should succeed");
    }
}
