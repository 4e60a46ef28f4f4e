//! Controller runner - builds controller futures for the export protocol
//!
//! Each `build_*` function returns a Vec of boxed futures that can be composed
//! by the caller. This keeps controller construction pure and testable.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::discovery::v1::EndpointSlice;
use kube::runtime::reflector::{self, ObjectRef, Store};
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::{watcher, Controller, WatchStreamExt};
use kube::{Api, Client, ResourceExt};

use crate::controller::{
    export_error_policy, reconcile_endpoint_slice, reconcile_service_export, slice_error_policy,
    ExportContext, SliceContext,
};
use crate::crd::ServiceExport;
use crate::store::{HubClientImpl, MemberClientImpl};
use crate::SERVICE_NAME_LABEL;

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
/// This forces the API server to close the watch before the client times out,
/// preventing "body read timed out" errors on idle watches.
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Runner configuration for one member cluster
#[derive(Clone, Debug)]
pub struct RunnerConfig {
    /// Fleet-wide ID of this member cluster
    pub cluster_id: String,
    /// Reserved namespace on the hub holding this member's projections
    pub hub_namespace: String,
}

/// Build the export controller futures.
///
/// `member` talks to the member cluster (exports, Services, EndpointSlices);
/// `hub` talks to the hub cluster and is scoped to the member's reserved
/// namespace. Both may be the same client in single-cluster setups.
pub fn build_export_controllers(
    member: Client,
    hub: Client,
    cfg: &RunnerConfig,
) -> Vec<Pin<Box<dyn Future<Output = ()> + Send>>> {
    let member_store = Arc::new(MemberClientImpl::new(member.clone()));
    let hub_store = Arc::new(HubClientImpl::new(hub, &cfg.hub_namespace));

    let export_ctx = Arc::new(ExportContext::new(member_store.clone(), hub_store.clone()));
    let slice_ctx = Arc::new(SliceContext::new(
        member_store,
        hub_store,
        cfg.cluster_id.clone(),
    ));

    let exports: Api<ServiceExport> = Api::all(member.clone());
    let services: Api<Service> = Api::all(member.clone());
    let slices: Api<EndpointSlice> = Api::all(member.clone());

    // A ServiceExport names its Service by identity, so Service events map
    // straight back to the export of the same namespace/name.
    let export_ctrl = Controller::new(
        exports.clone(),
        WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
    )
    .watches(
        services,
        WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
        map_service_to_export,
    )
    .shutdown_on_signal()
    .run(reconcile_service_export, export_error_policy, export_ctx)
    .for_each(log_reconcile_result("ServiceExport"));

    // The EndpointSlice controller also needs to wake up when a ServiceExport
    // changes validity. The fan-out from an export to its slices is a label
    // query, answered from a reflector cache since watch mappers are
    // synchronous. The cache is fed by the controller's own trigger stream,
    // so the kind is watched exactly once.
    let (slice_cache, writer) = reflector::store::<EndpointSlice>();
    let slice_stream = reflector::reflector(
        writer,
        watcher(
            slices,
            WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
        ),
    )
    .default_backoff()
    .touched_objects();

    let cache_for_watch = slice_cache.clone();
    let slice_ctrl = Controller::for_stream(slice_stream, slice_cache)
        .watches(
            exports,
            WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
            move |export| map_export_to_slices(&cache_for_watch, &export),
        )
        .shutdown_on_signal()
        .run(reconcile_endpoint_slice, slice_error_policy, slice_ctx)
        .for_each(log_reconcile_result("EndpointSlice"));

    tracing::info!("- ServiceExport controller");
    tracing::info!("- EndpointSlice controller");

    vec![Box::pin(export_ctrl), Box::pin(slice_ctrl)]
}

/// Map a Service event to the ServiceExport of the same namespace/name
fn map_service_to_export(service: Service) -> Option<ObjectRef<ServiceExport>> {
    let namespace = service.metadata.namespace.as_deref()?;
    let name = service.metadata.name.as_deref()?;
    Some(ObjectRef::new(name).within(namespace))
}

/// Map a ServiceExport event to every cached EndpointSlice in use by the
/// exported Service
fn map_export_to_slices(
    cache: &Store<EndpointSlice>,
    export: &ServiceExport,
) -> Vec<ObjectRef<EndpointSlice>> {
    let Some(namespace) = export.namespace() else {
        return vec![];
    };
    let name = export.name_any();

    let affected: Vec<ObjectRef<EndpointSlice>> = cache
        .state()
        .iter()
        .filter(|slice| {
            slice.namespace().as_deref() == Some(namespace.as_str())
                && slice.labels().get(SERVICE_NAME_LABEL) == Some(&name)
        })
        .map(|slice| ObjectRef::new(&slice.name_any()).within(&namespace))
        .collect();

    tracing::debug!(
        export = %name,
        namespace = %namespace,
        affected_count = affected.len(),
        "Triggering re-reconciliation of backing endpoint slices"
    );
    affected
}

/// Creates a closure for logging reconciliation results.
fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
