// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Service account and cluster RBAC for the provisioner.

use super::object_meta;
use crate::constants::upstream;
use crate::types::{ApplyWave, ManagedObject, Owner, ResourceDescriptor};
use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, PolicyRule, RoleRef, Subject};

pub fn service_account(owner: &Owner, namespace: &str) -> ResourceDescriptor {
    let sa = ServiceAccount {
        metadata: object_meta(owner, upstream::SERVICE_ACCOUNT, Some(namespace)),
        ..Default::default()
    };
    ResourceDescriptor::new(ManagedObject::ServiceAccount(sa), ApplyWave::Identity)
}

/// The provisioner role and the resizer role, each with a binding to the
/// driver's service account.
pub fn cluster_roles(
    owner: &Owner,
    namespace: &str,
    provisioner_role: &str,
    resizer_role: &str,
) -> Vec<ResourceDescriptor> {
    vec![
        cluster_role(owner, provisioner_role, provisioner_rules()),
        binding(owner, provisioner_role, namespace),
        cluster_role(owner, resizer_role, resizer_rules()),
        binding(owner, resizer_role, namespace),
    ]
}

fn cluster_role(owner: &Owner, name: &str, rules: Vec<PolicyRule>) -> ResourceDescriptor {
    let role = ClusterRole {
        metadata: object_meta(owner, name, None),
        rules: Some(rules),
        ..Default::default()
    };
    ResourceDescriptor::new(ManagedObject::ClusterRole(role), ApplyWave::Identity)
}

fn binding(owner: &Owner, role: &str, namespace: &str) -> ResourceDescriptor {
    let binding = ClusterRoleBinding {
        metadata: object_meta(owner, role, None),
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "ClusterRole".to_string(),
            name: role.to_string(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: upstream::SERVICE_ACCOUNT.to_string(),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        }]),
    };
    ResourceDescriptor::new(ManagedObject::ClusterRoleBinding(binding), ApplyWave::Binding)
}

fn rule(api_group: &str, resources: &[&str], verbs: &[&str]) -> PolicyRule {
    PolicyRule {
        api_groups: Some(vec![api_group.to_string()]),
        resources: Some(resources.iter().map(|r| r.to_string()).collect()),
        verbs: verbs.iter().map(|v| v.to_string()).collect(),
        ..Default::default()
    }
}

fn provisioner_rules() -> Vec<PolicyRule> {
    vec![
        rule("", &["persistentvolumes"], &["get", "list", "watch", "create", "delete"]),
        rule("", &["persistentvolumeclaims"], &["get", "list", "watch", "update"]),
        rule("", &["events"], &["list", "watch", "create", "update", "patch"]),
        rule("", &["nodes"], &["get", "list", "watch"]),
        rule("storage.k8s.io", &["storageclasses", "csinodes"], &["get", "list", "watch"]),
        rule(
            "storage.k8s.io",
            &["csistoragecapacities"],
            &["get", "list", "watch", "create", "update", "patch", "delete"],
        ),
    ]
}

fn resizer_rules() -> Vec<PolicyRule> {
    vec![
        rule("", &["persistentvolumes"], &["get", "list", "watch", "patch"]),
        rule("", &["persistentvolumeclaims"], &["get", "list", "watch"]),
        rule("", &["persistentvolumeclaims/status"], &["patch"]),
        rule("", &["pods"], &["get", "list", "watch"]),
        rule("", &["events"], &["list", "watch", "create", "update", "patch"]),
    ]
}
