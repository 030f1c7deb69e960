// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Resource identities, declared descriptors and observed cluster objects.

use crate::constants::labels;
use k8s_openapi::api::apps::v1::{DaemonSet, StatefulSet};
use k8s_openapi::api::core::v1::{Namespace, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use k8s_openapi::api::storage::v1::{CSIDriver, StorageClass};
use kube::api::ObjectMeta;
use kube::core::ApiResource;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Kinds of cluster resources the operator reads or writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    Namespace,
    ServiceAccount,
    ClusterRole,
    ClusterRoleBinding,
    CsiDriver,
    StorageClass,
    DaemonSet,
    StatefulSet,
}

impl ResourceKind {
    /// Kinds that carry ownership labels and are garbage collected
    pub const MANAGED: [ResourceKind; 7] = [
        ResourceKind::ServiceAccount,
        ResourceKind::ClusterRole,
        ResourceKind::ClusterRoleBinding,
        ResourceKind::CsiDriver,
        ResourceKind::StorageClass,
        ResourceKind::DaemonSet,
        ResourceKind::StatefulSet,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Namespace => "Namespace",
            ResourceKind::ServiceAccount => "ServiceAccount",
            ResourceKind::ClusterRole => "ClusterRole",
            ResourceKind::ClusterRoleBinding => "ClusterRoleBinding",
            ResourceKind::CsiDriver => "CSIDriver",
            ResourceKind::StorageClass => "StorageClass",
            ResourceKind::DaemonSet => "DaemonSet",
            ResourceKind::StatefulSet => "StatefulSet",
        }
    }

    pub fn is_namespaced(&self) -> bool {
        matches!(
            self,
            ResourceKind::ServiceAccount | ResourceKind::DaemonSet | ResourceKind::StatefulSet
        )
    }

    /// Dependency tier used for resources that are only known from the cluster
    pub fn default_wave(&self) -> ApplyWave {
        match self {
            ResourceKind::ClusterRoleBinding => ApplyWave::Binding,
            ResourceKind::DaemonSet | ResourceKind::StatefulSet => ApplyWave::Workload,
            _ => ApplyWave::Identity,
        }
    }

    pub fn api_resource(&self) -> ApiResource {
        match self {
            ResourceKind::Namespace => ApiResource::erase::<Namespace>(&()),
            ResourceKind::ServiceAccount => ApiResource::erase::<ServiceAccount>(&()),
            ResourceKind::ClusterRole => ApiResource::erase::<ClusterRole>(&()),
            ResourceKind::ClusterRoleBinding => ApiResource::erase::<ClusterRoleBinding>(&()),
            ResourceKind::CsiDriver => ApiResource::erase::<CSIDriver>(&()),
            ResourceKind::StorageClass => ApiResource::erase::<StorageClass>(&()),
            ResourceKind::DaemonSet => ApiResource::erase::<DaemonSet>(&()),
            ResourceKind::StatefulSet => ApiResource::erase::<StatefulSet>(&()),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a cluster resource: (kind, namespace, name)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId {
    pub kind: ResourceKind,
    pub namespace: Option<String>,
    pub name: String,
}

impl ResourceId {
    pub fn cluster(kind: ResourceKind, name: &str) -> Self {
        Self {
            kind,
            namespace: None,
            name: name.to_string(),
        }
    }

    pub fn namespaced(kind: ResourceKind, namespace: &str, name: &str) -> Self {
        Self {
            kind,
            namespace: Some(namespace.to_string()),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", self.kind, ns, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

/// Declared dependency tier. Everything in a wave is applied before the next wave starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ApplyWave {
    /// Objects nothing else in the set depends on being bound first
    Identity,
    /// Bindings referencing identities
    Binding,
    /// Workloads referencing service accounts and bindings
    Workload,
}

impl ApplyWave {
    pub const ORDER: [ApplyWave; 3] = [ApplyWave::Identity, ApplyWave::Binding, ApplyWave::Workload];
}

/// Typed object for each kind the operator declares
#[derive(Debug, Clone, PartialEq)]
pub enum ManagedObject {
    ServiceAccount(ServiceAccount),
    ClusterRole(ClusterRole),
    ClusterRoleBinding(ClusterRoleBinding),
    CsiDriver(CSIDriver),
    StorageClass(StorageClass),
    DaemonSet(DaemonSet),
    StatefulSet(StatefulSet),
}

impl ManagedObject {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ManagedObject::ServiceAccount(_) => ResourceKind::ServiceAccount,
            ManagedObject::ClusterRole(_) => ResourceKind::ClusterRole,
            ManagedObject::ClusterRoleBinding(_) => ResourceKind::ClusterRoleBinding,
            ManagedObject::CsiDriver(_) => ResourceKind::CsiDriver,
            ManagedObject::StorageClass(_) => ResourceKind::StorageClass,
            ManagedObject::DaemonSet(_) => ResourceKind::DaemonSet,
            ManagedObject::StatefulSet(_) => ResourceKind::StatefulSet,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            ManagedObject::ServiceAccount(o) => &o.metadata,
            ManagedObject::ClusterRole(o) => &o.metadata,
            ManagedObject::ClusterRoleBinding(o) => &o.metadata,
            ManagedObject::CsiDriver(o) => &o.metadata,
            ManagedObject::StorageClass(o) => &o.metadata,
            ManagedObject::DaemonSet(o) => &o.metadata,
            ManagedObject::StatefulSet(o) => &o.metadata,
        }
    }

    /// Full JSON manifest including apiVersion and kind
    pub fn to_value(&self) -> serde_json::Result<Value> {
        match self {
            ManagedObject::ServiceAccount(o) => serde_json::to_value(o),
            ManagedObject::ClusterRole(o) => serde_json::to_value(o),
            ManagedObject::ClusterRoleBinding(o) => serde_json::to_value(o),
            ManagedObject::CsiDriver(o) => serde_json::to_value(o),
            ManagedObject::StorageClass(o) => serde_json::to_value(o),
            ManagedObject::DaemonSet(o) => serde_json::to_value(o),
            ManagedObject::StatefulSet(o) => serde_json::to_value(o),
        }
    }
}

/// A desired resource: identity, dependency wave and the typed object
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDescriptor {
    pub id: ResourceId,
    pub wave: ApplyWave,
    pub object: ManagedObject,
}

impl ResourceDescriptor {
    pub fn new(object: ManagedObject, wave: ApplyWave) -> Self {
        let kind = object.kind();
        let meta = object.metadata();
        let name = meta.name.clone().unwrap_or_default();
        let id = match (&meta.namespace, kind.is_namespaced()) {
            (Some(ns), true) => ResourceId::namespaced(kind, ns, &name),
            _ => ResourceId::cluster(kind, &name),
        };
        Self { id, wave, object }
    }

    pub fn manifest(&self) -> serde_json::Result<Value> {
        self.object.to_value()
    }
}

/// The cluster's current representation of a resource identity
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedResource {
    pub id: ResourceId,
    /// Concurrency token for optimistic updates
    pub resource_version: String,
    pub labels: BTreeMap<String, String>,
    pub body: Value,
}

impl ObservedResource {
    /// Build from a raw JSON object, reading the token and labels out of its metadata
    pub fn from_value(id: ResourceId, body: Value) -> Self {
        let metadata = body.get("metadata");
        let resource_version = metadata
            .and_then(|m| m.get("resourceVersion"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let labels = metadata
            .and_then(|m| m.get("labels"))
            .and_then(Value::as_object)
            .map(|l| {
                l.iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            id,
            resource_version,
            labels,
            body,
        }
    }
}

/// Ownership marker of this operator instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner {
    app: String,
}

impl Owner {
    pub fn new(app: &str) -> Self {
        Self {
            app: app.to_string(),
        }
    }

    pub fn app(&self) -> &str {
        &self.app
    }

    /// Labels stamped on every managed resource
    pub fn labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (labels::MANAGED_BY.to_string(), self.app.clone()),
            (labels::PART_OF.to_string(), labels::PART_OF_VALUE.to_string()),
            (labels::MANIFEST.to_string(), labels::MANIFEST_VALUE.to_string()),
        ])
    }

    /// Label selector matching every resource owned by this instance
    pub fn selector(&self) -> String {
        format!("{}={}", labels::MANAGED_BY, self.app)
    }

    pub fn owns(&self, observed: &ObservedResource) -> bool {
        observed
            .labels
            .get(labels::MANAGED_BY)
            .is_some_and(|v| *v == self.app)
    }
}
