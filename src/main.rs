// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::Result;
use clap::{Parser, Subcommand};
use kube::Client;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rawfile_localpv_operator::config::Config;
use rawfile_localpv_operator::controller::{resync, Controller};
use rawfile_localpv_operator::kubernetes::{
    ConfigMapInputSource, ConfigMapStatusSink, InputsWatcher, KubeClusterClient, ResourceWatcher,
};
use rawfile_localpv_operator::manifests::{build_desired_state, DesiredState};
use rawfile_localpv_operator::reconcile::{actions, rollout, InputSource, Reconciler, StatusReporter, Trigger};
use rawfile_localpv_operator::types::Owner;

#[derive(Parser)]
#[command(version, about = "Deploys and reconciles the rawfile local-PV provisioner")]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Run the operator until the provisioner is removed (default)
    Run,
    /// Print the desired manifests as a YAML stream
    Render,
    /// Compare the desired resources with the cluster
    ListResources,
    /// Delete owned resources that are no longer desired
    ScrubResources,
    /// Create desired resources missing from the cluster
    SyncResources,
    /// Show rollout state and container images of the workloads
    ListVersions,
}

async fn desired_state(inputs: &ConfigMapInputSource, owner: &Owner) -> Result<DesiredState> {
    let options = inputs.configuration().await?;
    let relation = inputs.relation_data().await?;
    Ok(build_desired_state(owner, &options, &relation)?)
}

async fn run(client: Client, config: Config, inputs: ConfigMapInputSource, owner: Owner) -> Result<()> {
    let sink = ConfigMapStatusSink::new(client.clone(), &config.operator_namespace, &config.status_configmap());
    // A recorded teardown holds until the inputs ConfigMap is created again
    let removed = sink.removal_recorded().await? && !inputs.exists().await?;

    let reconciler = Reconciler::new(
        Arc::new(KubeClusterClient::new(client.clone())),
        Arc::new(inputs),
        StatusReporter::new(Arc::new(sink)),
        owner.clone(),
    );
    let (controller, handle) = Controller::new(reconciler, config.retry_interval());
    let controller = if removed {
        info!("Provisioner was removed, waiting for the inputs ConfigMap to be recreated");
        controller.start_removed()
    } else {
        handle.send(Trigger::ConfigChanged);
        controller
    };

    let inputs_watcher = InputsWatcher::new(
        client.clone(),
        &config.operator_namespace,
        &config.inputs_configmap(),
        handle.clone(),
    );
    let resource_watcher = ResourceWatcher::new(client, owner, handle.clone());

    info!("Starting controller and watchers...");

    tokio::select! {
        res = controller.run() => res?,
        res = async {
            tokio::try_join!(
                resync(handle, config.resync_interval()),
                inputs_watcher.run(),
                resource_watcher.run()
            )
        } => {
            res?;
            warn!("All watchers stopped unexpectedly");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = cli.config;
    info!(
        "Configuration loaded: app={}, namespace={}",
        config.app_name, config.operator_namespace
    );

    let client = Client::try_default().await?;
    let owner = Owner::new(&config.app_name);
    let inputs = ConfigMapInputSource::new(client.clone(), &config.operator_namespace, &config.inputs_configmap());

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            info!("Starting rawfile-localpv operator");
            run(client, config, inputs, owner).await?;
        }
        Command::Render => {
            print!("{}", desired_state(&inputs, &owner).await?.to_yaml()?);
        }
        Command::ListResources => {
            let desired = desired_state(&inputs, &owner).await?;
            let cluster = KubeClusterClient::new(client);
            print!("{}", actions::analyze(&cluster, &owner, &desired).await?);
        }
        Command::ScrubResources => {
            let desired = desired_state(&inputs, &owner).await?;
            let cluster = KubeClusterClient::new(client);
            for id in actions::scrub(&cluster, &owner, &desired).await? {
                println!("deleted {}", id);
            }
        }
        Command::SyncResources => {
            let desired = desired_state(&inputs, &owner).await?;
            let cluster = KubeClusterClient::new(client);
            for id in actions::sync_missing(&cluster, &owner, &desired).await? {
                println!("created {}", id);
            }
        }
        Command::ListVersions => {
            let desired = desired_state(&inputs, &owner).await?;
            let cluster = KubeClusterClient::new(client);
            for workload in rollout::workloads(&cluster, &desired).await? {
                print!("{}", workload);
            }
        }
    }
    Ok(())
}
