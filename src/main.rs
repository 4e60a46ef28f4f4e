//! Fleetlink member agent - exports Services from a member cluster to the hub

use clap::Parser;
use futures::future;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config, CustomResourceExt};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fleetlink::crd::{EndpointSliceExport, InternalServiceExport, ServiceExport};
use fleetlink::runner::{build_export_controllers, RunnerConfig};
use fleetlink::FIELD_MANAGER;

/// Fleetlink - exports Services and their endpoints from a member cluster to
/// a fleet hub cluster
#[derive(Parser, Debug)]
#[command(name = "fleetlink", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    /// Fleet-wide ID of this member cluster
    #[arg(long, env = "FLEETLINK_CLUSTER_ID", default_value = "member")]
    cluster_id: String,

    /// Reserved namespace on the hub for this member's exported state
    ///
    /// Defaults to `fleet-member-{cluster-id}`.
    #[arg(long, env = "FLEETLINK_HUB_NAMESPACE")]
    hub_namespace: Option<String>,

    /// Path to a kubeconfig for the hub cluster
    ///
    /// When omitted, the hub is assumed to be reachable through the same
    /// client as the member cluster (single-cluster and test setups).
    #[arg(long, env = "FLEETLINK_HUB_KUBECONFIG")]
    hub_kubeconfig: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.crd {
        // Generate CRD YAML
        for crd in [
            ServiceExport::crd(),
            InternalServiceExport::crd(),
            EndpointSliceExport::crd(),
        ] {
            let yaml = serde_yaml::to_string(&crd)
                .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
            println!("---\n{yaml}");
        }
        return Ok(());
    }

    run_controllers(cli).await
}

/// Run the export controllers against the member and hub clusters
async fn run_controllers(cli: Cli) -> anyhow::Result<()> {
    tracing::info!(cluster_id = %cli.cluster_id, "Fleetlink member agent starting...");

    let member = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create member cluster client: {}", e))?;

    let hub = match cli.hub_kubeconfig {
        Some(ref path) => hub_client_from_kubeconfig(path).await?,
        None => member.clone(),
    };

    ensure_crds_installed(&member, &hub).await?;

    let cfg = RunnerConfig {
        hub_namespace: cli
            .hub_namespace
            .unwrap_or_else(|| format!("fleet-member-{}", cli.cluster_id)),
        cluster_id: cli.cluster_id,
    };
    tracing::info!(namespace = %cfg.hub_namespace, "Exporting into hub namespace");

    tracing::info!("Starting controllers:");
    let controllers = build_export_controllers(member, hub, &cfg);
    future::join_all(controllers).await;

    tracing::info!("Controllers stopped");
    Ok(())
}

/// Build a hub cluster client from a kubeconfig file
async fn hub_client_from_kubeconfig(path: &std::path::Path) -> anyhow::Result<Client> {
    let kubeconfig = Kubeconfig::read_from(path)
        .map_err(|e| anyhow::anyhow!("Failed to read hub kubeconfig {:?}: {}", path, e))?;
    let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load hub kubeconfig {:?}: {}", path, e))?;
    Client::try_from(config).map_err(|e| anyhow::anyhow!("Failed to create hub client: {}", e))
}

/// Install the CRDs this agent owns: the export intent CRD on the member
/// cluster and the projection CRDs on the hub.
async fn ensure_crds_installed(member: &Client, hub: &Client) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::api::{Patch, PatchParams};

    let params = PatchParams::apply(FIELD_MANAGER).force();

    tracing::info!("Installing ServiceExport CRD...");
    let member_crds: Api<CustomResourceDefinition> = Api::all(member.clone());
    member_crds
        .patch(
            "serviceexports.networking.fleetlink.dev",
            &params,
            &Patch::Apply(&ServiceExport::crd()),
        )
        .await
        .map_err(|e| anyhow::anyhow!("Failed to install ServiceExport CRD: {}", e))?;

    tracing::info!("Installing InternalServiceExport CRD...");
    let hub_crds: Api<CustomResourceDefinition> = Api::all(hub.clone());
    hub_crds
        .patch(
            "internalserviceexports.networking.fleetlink.dev",
            &params,
            &Patch::Apply(&InternalServiceExport::crd()),
        )
        .await
        .map_err(|e| anyhow::anyhow!("Failed to install InternalServiceExport CRD: {}", e))?;

    tracing::info!("Installing EndpointSliceExport CRD...");
    hub_crds
        .patch(
            "endpointsliceexports.networking.fleetlink.dev",
            &params,
            &Patch::Apply(&EndpointSliceExport::crd()),
        )
        .await
        .map_err(|e| anyhow::anyhow!("Failed to install EndpointSliceExport CRD: {}", e))?;

    tracing::info!("All Fleetlink CRDs installed/updated");
    Ok(())
}
