// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Watchers that turn cluster events into triggers for the controller.

use crate::controller::ControllerHandle;
use crate::reconcile::Trigger;
use crate::types::{Owner, ResourceKind};
use futures::{stream, StreamExt};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::DynamicObject;
use kube::{Api, Client};
use kube_runtime::watcher::{self, Event};
use kube_runtime::WatchStreamExt;
use tracing::{debug, info, warn};

/// Inputs ConfigMap changes request a pass; its deletion removes the provisioner
pub fn input_trigger<K>(event: &Event<K>) -> Option<Trigger> {
    match event {
        Event::Apply(_) | Event::InitApply(_) => Some(Trigger::ConfigChanged),
        Event::Delete(_) => Some(Trigger::Remove),
        Event::Init | Event::InitDone => None,
    }
}

/// Any change to an owned resource, or a relist that may have missed one
pub fn resource_trigger<K>(event: &Event<K>) -> Option<Trigger> {
    match event {
        Event::Apply(_) | Event::Delete(_) | Event::InitDone => Some(Trigger::ResourceChangedExternally),
        Event::Init | Event::InitApply(_) => None,
    }
}

/// Watches the inputs ConfigMap
pub struct InputsWatcher {
    client: Client,
    namespace: String,
    name: String,
    handle: ControllerHandle,
}

impl InputsWatcher {
    pub fn new(client: Client, namespace: &str, name: &str, handle: ControllerHandle) -> Self {
        Self {
            client,
            namespace: namespace.to_string(),
            name: name.to_string(),
            handle,
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let configmaps: Api<ConfigMap> = Api::namespaced(self.client.clone(), &self.namespace);
        let config = watcher::Config::default().fields(&format!("metadata.name={}", self.name));
        info!("Watching inputs ConfigMap {}/{}", self.namespace, self.name);

        let handle = &self.handle;
        watcher::watcher(configmaps, config)
            .default_backoff()
            .for_each(|res| async move {
                match res {
                    Ok(event) => {
                        if let Some(trigger) = input_trigger(&event) {
                            debug!("Inputs changed, dispatch {:?}", handle.send(trigger));
                        }
                    }
                    Err(e) => warn!("Inputs watch error: {}", e),
                }
            })
            .await;

        Ok(())
    }
}

/// Watches every managed kind carrying this instance's owner label
pub struct ResourceWatcher {
    client: Client,
    owner: Owner,
    handle: ControllerHandle,
}

impl ResourceWatcher {
    pub fn new(client: Client, owner: Owner, handle: ControllerHandle) -> Self {
        Self { client, owner, handle }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let selector = self.owner.selector();
        let streams = ResourceKind::MANAGED.iter().map(|kind| {
            let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &kind.api_resource());
            let config = watcher::Config::default().labels(&selector);
            watcher::watcher(api, config).default_backoff().boxed()
        });
        info!("Watching managed resources with {}", selector);

        let handle = &self.handle;
        stream::select_all(streams)
            .for_each(|res| async move {
                match res {
                    Ok(event) => {
                        if let Some(trigger) = resource_trigger(&event) {
                            debug!("Managed resource changed, dispatch {:?}", handle.send(trigger));
                        }
                    }
                    Err(e) => warn!("Resource watch error: {}", e),
                }
            })
            .await;

        Ok(())
    }
}
