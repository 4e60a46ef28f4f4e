//! ServiceExport controller implementation
//!
//! Owns the lifecycle of a single export intent: computes eligibility of the
//! Service it names, manages the cleanup finalizer, and create-or-updates or
//! deletes the InternalServiceExport projection on the hub.
//!
//! Ordering invariants enforced here:
//! - the cleanup finalizer is added before the first hub write, so a later
//!   deletion of the ServiceExport is guaranteed to trigger unexport;
//! - on unexport the hub projection is deleted before the finalizer is
//!   removed, so a crash between the two steps leaves a retryable state, not
//!   an orphaned projection.

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::Service;
use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::{debug, error, info, instrument, warn};

use crate::crd::{
    Condition, ConditionStatus, InternalServiceExport, InternalServiceExportSpec, ServiceExport,
    CONDITION_VALID, REASON_SOURCE_INELIGIBLE, REASON_SOURCE_NOT_FOUND,
};
use crate::policy::{DefaultEligibility, ExportEligibility};
use crate::store::{HubClient, MemberClient};
use crate::{unique_name, Error, CLEANUP_FINALIZER};

/// Condition reason set when the Service has been exported to the hub
const REASON_SERVICE_EXPORTED: &str = "ServiceExported";

/// Controller context for the ServiceExport controller
///
/// Shared across all reconciliation passes; holds the two store-client seams
/// and the injected eligibility policy.
pub struct ExportContext {
    /// Member-cluster store client
    pub member: Arc<dyn MemberClient>,
    /// Hub store client scoped to this member's reserved namespace
    pub hub: Arc<dyn HubClient>,
    /// Policy deciding whether a Service may be exported
    pub eligibility: Arc<dyn ExportEligibility>,
}

impl ExportContext {
    /// Create a context with the default eligibility policy
    pub fn new(member: Arc<dyn MemberClient>, hub: Arc<dyn HubClient>) -> Self {
        Self {
            member,
            hub,
            eligibility: Arc::new(DefaultEligibility),
        }
    }

    /// Replace the eligibility policy
    pub fn with_eligibility(mut self, eligibility: Arc<dyn ExportEligibility>) -> Self {
        self.eligibility = eligibility;
        self
    }
}

/// Reconcile a ServiceExport
///
/// The triggering object is used only for its identity; all state is
/// re-fetched so that duplicate or missed notifications self-heal.
#[instrument(skip(export, ctx), fields(
    namespace = %export.namespace().unwrap_or_default(),
    name = %export.name_any(),
))]
pub async fn reconcile(
    export: Arc<ServiceExport>,
    ctx: Arc<ExportContext>,
) -> Result<Action, Error> {
    let namespace = export
        .namespace()
        .ok_or_else(|| Error::validation("ServiceExport has no namespace"))?;
    let name = export.name_any();

    // Re-fetch the ServiceExport. If it is gone, the object was deleted
    // before this pass ran; if it was ever exported, the cleanup finalizer
    // would have kept it alive, so nothing is owed here.
    let Some(export) = ctx.member.get_service_export(&namespace, &name).await? else {
        debug!("service export no longer exists");
        return Ok(Action::await_change());
    };

    // A deleted ServiceExport needs cleanup only when the cleanup finalizer
    // is present; its absence guarantees the Service has never been exported.
    if export.has_cleanup_finalizer() && export.is_deleting() {
        info!("unexporting service for deleted service export");
        unexport(&ctx, &export).await?;
        return Ok(Action::await_change());
    }

    // Check that the Service to export exists and is not being deleted.
    let svc = ctx.member.get_service(&namespace, &name).await?;
    let svc = match svc {
        Some(svc) if svc.metadata.deletion_timestamp.is_none() => svc,
        _ => {
            if export.has_cleanup_finalizer() {
                info!("unexporting service: source no longer present");
                unexport(&ctx, &export).await?;
            }
            mark_invalid(
                &ctx,
                &export,
                REASON_SOURCE_NOT_FOUND,
                format!("service {namespace}/{name} is not found"),
            )
            .await?;
            return Ok(Action::await_change());
        }
    };

    // Check that the Service passes the eligibility policy.
    if !ctx.eligibility.is_eligible(&svc) {
        if export.has_cleanup_finalizer() {
            info!("unexporting service: source no longer eligible");
            unexport(&ctx, &export).await?;
        }
        mark_invalid(
            &ctx,
            &export,
            REASON_SOURCE_INELIGIBLE,
            format!("service {namespace}/{name} is not eligible for export"),
        )
        .await?;
        return Ok(Action::await_change());
    }

    // The cleanup finalizer must be persisted before the Service is actually
    // exported.
    if !export.has_cleanup_finalizer() {
        add_cleanup_finalizer(&ctx, &export).await?;
    }

    export_service(&ctx, &export, &svc).await?;
    mark_valid(&ctx, &export).await?;
    Ok(Action::await_change())
}

/// Error policy for the ServiceExport controller: requeue with a fixed
/// backoff and let the next pass re-read state
pub fn error_policy(export: Arc<ServiceExport>, error: &Error, _ctx: Arc<ExportContext>) -> Action {
    if error.is_conflict() {
        debug!(
            name = %export.name_any(),
            "conflicting write detected, requeueing against fresh state"
        );
    } else {
        error!(
            ?error,
            name = %export.name_any(),
            "service export reconciliation failed"
        );
    }
    Action::requeue(Duration::from_secs(5))
}

/// Unexport a Service by deleting its hub projection, then removing the
/// cleanup finalizer
async fn unexport(ctx: &ExportContext, export: &ServiceExport) -> Result<(), Error> {
    let namespace = export
        .namespace()
        .ok_or_else(|| Error::validation("ServiceExport has no namespace"))?;
    let hub_name = unique_name::hub_export_name(&namespace, &export.name_any());

    // The finalizer is always added before the Service is actually exported,
    // so the projection may legitimately not exist yet; absence is success.
    ctx.hub.delete_internal_service_export(&hub_name).await?;

    // Remove the finalizer; this must happen after the successful hub delete.
    let mut updated = export.clone();
    if let Some(finalizers) = updated.metadata.finalizers.as_mut() {
        finalizers.retain(|f| f != CLEANUP_FINALIZER);
    }
    ctx.member.update_service_export(&updated).await
}

/// Add the cleanup finalizer to a ServiceExport and persist it
async fn add_cleanup_finalizer(ctx: &ExportContext, export: &ServiceExport) -> Result<(), Error> {
    let mut updated = export.clone();
    updated
        .metadata
        .finalizers
        .get_or_insert_with(Vec::new)
        .push(CLEANUP_FINALIZER.to_string());
    ctx.member.update_service_export(&updated).await?;
    debug!("cleanup finalizer added");
    Ok(())
}

/// Mark a ServiceExport as invalid with the given reason.
///
/// No-ops when the Valid condition already carries the same status and
/// reason, so repeated passes do not churn the object.
async fn mark_invalid(
    ctx: &ExportContext,
    export: &ServiceExport,
    reason: &str,
    message: String,
) -> Result<(), Error> {
    set_valid_condition(ctx, export, ConditionStatus::False, reason, message).await
}

/// Mark a ServiceExport as valid after a successful export
async fn mark_valid(ctx: &ExportContext, export: &ServiceExport) -> Result<(), Error> {
    let namespace = export.namespace().unwrap_or_default();
    let name = export.name_any();
    set_valid_condition(
        ctx,
        export,
        ConditionStatus::True,
        REASON_SERVICE_EXPORTED,
        format!("service {namespace}/{name} is exported"),
    )
    .await
}

async fn set_valid_condition(
    ctx: &ExportContext,
    export: &ServiceExport,
    status: ConditionStatus,
    reason: &str,
    message: String,
) -> Result<(), Error> {
    let unchanged = export
        .status
        .as_ref()
        .and_then(|s| s.find_condition(CONDITION_VALID))
        .map(|c| c.status == status && c.reason == reason)
        .unwrap_or(false);
    if unchanged {
        debug!(reason, "valid condition already up to date");
        return Ok(());
    }

    // The write sends the freshly fetched object back in full: it carries the
    // concurrency token, and conditions owned by other agents (Conflict) ride
    // along instead of being overwritten.
    let mut updated = export.clone();
    updated.status = Some(
        export
            .status
            .clone()
            .unwrap_or_default()
            .condition(Condition::new(CONDITION_VALID, status, reason, message)),
    );
    ctx.member.update_service_export_status(&updated).await?;
    warn_on_invalid(reason);
    Ok(())
}

fn warn_on_invalid(reason: &str) {
    if reason == REASON_SOURCE_NOT_FOUND || reason == REASON_SOURCE_INELIGIBLE {
        warn!(reason, "service export marked invalid");
    } else {
        info!(reason, "service export marked valid");
    }
}

/// Create or update the hub projection for an exported Service.
///
/// The projection spec is rebuilt in full from the current Service on every
/// pass (no field-level merge), so hub-side drift self-heals.
async fn export_service(
    ctx: &ExportContext,
    export: &ServiceExport,
    svc: &Service,
) -> Result<(), Error> {
    let namespace = export
        .namespace()
        .ok_or_else(|| Error::validation("ServiceExport has no namespace"))?;
    let hub_name = unique_name::hub_export_name(&namespace, &export.name_any());
    let spec = InternalServiceExportSpec::from_service(svc);

    match ctx.hub.get_internal_service_export(&hub_name).await? {
        None => {
            let projection = InternalServiceExport::new(&hub_name, spec);
            ctx.hub.create_internal_service_export(&projection).await?;
            info!(projection = %hub_name, "service exported to hub");
        }
        Some(existing) => {
            let mut updated = existing.clone();
            updated.spec = spec;
            ctx.hub.update_internal_service_export(&updated).await?;
            debug!(projection = %hub_name, "exported service updated");
        }
    }
    Ok(())
}
