// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Desired state of the provisioner, derived from options and relation data.

pub mod rbac;
pub mod storage;
pub mod workloads;

use crate::constants::upstream;
use crate::error::{OperatorError, Result};
use crate::types::{Options, Owner, RelationData, ResourceDescriptor, ResourceId, ResourceKind};
use kube::api::ObjectMeta;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use workloads::WorkloadParams;

/// Length of the hex prefix used as revision
const REVISION_LEN: usize = 12;

pub(crate) fn object_meta(owner: &Owner, name: &str, namespace: Option<&str>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: namespace.map(str::to_string),
        labels: Some(owner.labels()),
        ..Default::default()
    }
}

/// Immutable snapshot of every resource the operator declares for one pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DesiredState {
    descriptors: BTreeMap<ResourceId, ResourceDescriptor>,
    revision: String,
}

impl DesiredState {
    fn from_descriptors(descriptors: Vec<ResourceDescriptor>) -> Result<Self> {
        let mut by_id = BTreeMap::new();
        for desc in descriptors {
            if by_id.contains_key(&desc.id) {
                return Err(OperatorError::invalid_config(
                    option_for(desc.id.kind),
                    format!("resource {} would be declared twice", desc.id),
                ));
            }
            by_id.insert(desc.id.clone(), desc);
        }

        let mut hasher = Sha256::new();
        for desc in by_id.values() {
            hasher.update(serde_json::to_vec(&desc.manifest()?)?);
        }
        let revision = format!("{:x}", hasher.finalize())
            .chars()
            .take(REVISION_LEN)
            .collect();

        Ok(Self {
            descriptors: by_id,
            revision,
        })
    }

    pub fn get(&self, id: &ResourceId) -> Option<&ResourceDescriptor> {
        self.descriptors.get(id)
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.descriptors.contains_key(id)
    }

    /// Descriptors in identity order
    pub fn descriptors(&self) -> impl Iterator<Item = &ResourceDescriptor> {
        self.descriptors.values()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Content hash of the declared manifests
    pub fn revision(&self) -> &str {
        &self.revision
    }

    /// Multi-document YAML of all manifests
    pub fn to_yaml(&self) -> Result<String> {
        let mut out = String::new();
        for desc in self.descriptors.values() {
            out.push_str("---\n");
            out.push_str(&serde_yaml::to_string(&desc.manifest()?)?);
        }
        Ok(out)
    }
}

fn option_for(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::ClusterRole | ResourceKind::ClusterRoleBinding => "rbacNameFormatter",
        ResourceKind::CsiDriver => "csiDriverFormatter",
        ResourceKind::StorageClass => "storageClassName",
        _ => "namespace",
    }
}

/// Compute the desired state. Pure and deterministic; fails only on invalid input.
pub fn build_desired_state(
    owner: &Owner,
    options: &Options,
    relation: &RelationData,
) -> Result<DesiredState> {
    let app = owner.app();
    let namespace = options.namespace()?;
    let driver_name = options.csi_driver_name(app)?;
    let kubelet_root = relation.kubelet_root_dir()?;

    let params = WorkloadParams {
        namespace,
        driver_name: &driver_name,
        image: options.image()?,
        storage_root: options.storage_root()?,
        kubelet_root: &kubelet_root,
        node_selector: options.node_selector()?,
    };

    let mut descriptors = vec![rbac::service_account(owner, namespace)];
    descriptors.extend(rbac::cluster_roles(
        owner,
        namespace,
        &options.rbac_name(upstream::PROVISIONER_ROLE, app)?,
        &options.rbac_name(upstream::RESIZER_ROLE, app)?,
    ));
    descriptors.push(storage::csi_driver(owner, &driver_name));
    descriptors.push(storage::storage_class(
        owner,
        options.storage_class_name()?,
        &driver_name,
        options.reclaim_policy()?,
    ));
    descriptors.push(workloads::node_daemonset(owner, &params));
    descriptors.push(workloads::controller_statefulset(owner, &params));

    DesiredState::from_descriptors(descriptors)
}
