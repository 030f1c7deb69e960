// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Gateway to the cluster API for typed resource identities.

use crate::constants::OPERATOR_NAME;
use crate::error::ClientError;
use crate::types::{ObservedResource, ResourceDescriptor, ResourceId, ResourceKind};
use async_trait::async_trait;
use kube::api::{DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams, Preconditions};
use kube::{Api, Client};
use serde_json::Value;
use tracing::{debug, instrument};

/// Capabilities the reconciler needs from the cluster.
///
/// Mutations carry the concurrency token observed by the caller; a stale token
/// fails with `Conflict` and is never overwritten blindly.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Fetch the current object, `None` when it does not exist
    async fn get(&self, id: &ResourceId) -> Result<Option<ObservedResource>, ClientError>;

    /// List objects of a kind across all namespaces matching a label selector
    async fn list(&self, kind: ResourceKind, selector: &str) -> Result<Vec<ObservedResource>, ClientError>;

    async fn create(&self, descriptor: &ResourceDescriptor) -> Result<(), ClientError>;

    /// Apply a JSON merge patch, guarded by `expected_version`
    async fn patch(&self, id: &ResourceId, delta: &Value, expected_version: &str) -> Result<(), ClientError>;

    async fn delete(&self, id: &ResourceId, expected_version: &str) -> Result<(), ClientError>;

    /// Create a namespace that is not owned by the operator
    async fn create_namespace(&self, name: &str) -> Result<(), ClientError>;
}

/// Add the resource version precondition to a merge patch body
pub fn with_resource_version(delta: &Value, expected_version: &str) -> Value {
    let mut body = delta.clone();
    if expected_version.is_empty() {
        return body;
    }
    if let Some(obj) = body.as_object_mut() {
        let meta = obj
            .entry("metadata")
            .or_insert_with(|| Value::Object(Default::default()));
        if let Some(meta) = meta.as_object_mut() {
            meta.insert(
                "resourceVersion".to_string(),
                Value::String(expected_version.to_string()),
            );
        }
    }
    body
}

/// `ClusterClient` backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, id: &ResourceId) -> Api<DynamicObject> {
        let ar = id.kind.api_resource();
        match &id.namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
            None => Api::all_with(self.client.clone(), &ar),
        }
    }

    fn field_manager() -> Option<String> {
        Some(OPERATOR_NAME.to_string())
    }
}

fn observed_from(kind: ResourceKind, obj: DynamicObject) -> Result<ObservedResource, ClientError> {
    let name = obj.metadata.name.clone().unwrap_or_default();
    let id = match (&obj.metadata.namespace, kind.is_namespaced()) {
        (Some(ns), true) => ResourceId::namespaced(kind, ns, &name),
        _ => ResourceId::cluster(kind, &name),
    };
    let body = serde_json::to_value(&obj)?;
    Ok(ObservedResource::from_value(id, body))
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    #[instrument(skip(self), fields(resource = %id))]
    async fn get(&self, id: &ResourceId) -> Result<Option<ObservedResource>, ClientError> {
        match self.api(id).get_opt(&id.name).await? {
            Some(obj) => Ok(Some(observed_from(id.kind, obj)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    async fn list(&self, kind: ResourceKind, selector: &str) -> Result<Vec<ObservedResource>, ClientError> {
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &kind.api_resource());
        let list = api.list(&ListParams::default().labels(selector)).await?;

        list.items
            .into_iter()
            .map(|obj| observed_from(kind, obj))
            .collect()
    }

    #[instrument(skip(self, descriptor), fields(resource = %descriptor.id))]
    async fn create(&self, descriptor: &ResourceDescriptor) -> Result<(), ClientError> {
        let obj: DynamicObject = serde_json::from_value(descriptor.manifest()?)?;
        let pp = PostParams {
            field_manager: Self::field_manager(),
            ..Default::default()
        };
        self.api(&descriptor.id).create(&pp, &obj).await?;
        debug!("Created {}", descriptor.id);
        Ok(())
    }

    #[instrument(skip(self, delta), fields(resource = %id))]
    async fn patch(&self, id: &ResourceId, delta: &Value, expected_version: &str) -> Result<(), ClientError> {
        let body = with_resource_version(delta, expected_version);
        let pp = PatchParams {
            field_manager: Self::field_manager(),
            ..Default::default()
        };
        self.api(id).patch(&id.name, &pp, &Patch::Merge(&body)).await?;
        debug!("Patched {}", id);
        Ok(())
    }

    #[instrument(skip(self), fields(resource = %id))]
    async fn delete(&self, id: &ResourceId, expected_version: &str) -> Result<(), ClientError> {
        let preconditions = (!expected_version.is_empty()).then(|| Preconditions {
            resource_version: Some(expected_version.to_string()),
            uid: None,
        });
        let dp = DeleteParams {
            preconditions,
            ..Default::default()
        };
        self.api(id).delete(&id.name, &dp).await?;
        debug!("Deleted {}", id);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn create_namespace(&self, name: &str) -> Result<(), ClientError> {
        let id = ResourceId::cluster(ResourceKind::Namespace, name);
        let ar = ResourceKind::Namespace.api_resource();
        let ns = DynamicObject::new(name, &ar).data(Value::Object(Default::default()));
        let pp = PostParams {
            field_manager: Self::field_manager(),
            ..Default::default()
        };
        self.api(&id).create(&pp, &ns).await?;
        debug!("Created namespace {}", name);
        Ok(())
    }
}
