// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Field-ownership diff between an observed resource and its descriptor.
//!
//! Only fields the descriptor declares are compared. Anything else on the
//! observed object (server defaults, fields written by other managers) is
//! left alone.

use crate::error::Result;
use crate::types::{ObservedResource, Owner, ResourceDescriptor};
use serde_json::{Map, Value};

/// Action required to bring one identity to its desired state
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    NoOp,
    Create,
    /// Merge patch touching only `fields`
    Patch { fields: Vec<String>, delta: Value },
    Delete,
    /// Identity is taken by a resource this operator does not own
    Collision,
}

impl Action {
    pub fn is_mutation(&self) -> bool {
        matches!(self, Action::Create | Action::Patch { .. } | Action::Delete)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Action::NoOp => "no-op",
            Action::Create => "create",
            Action::Patch { .. } => "patch",
            Action::Delete => "delete",
            Action::Collision => "collision",
        }
    }
}

pub fn diff(
    observed: Option<&ObservedResource>,
    desired: Option<&ResourceDescriptor>,
    owner: &Owner,
) -> Result<Action> {
    match (observed, desired) {
        (None, None) => Ok(Action::NoOp),
        (None, Some(_)) => Ok(Action::Create),
        (Some(o), None) if owner.owns(o) => Ok(Action::Delete),
        (Some(_), None) => Ok(Action::NoOp),
        (Some(o), Some(_)) if !owner.owns(o) => Ok(Action::Collision),
        (Some(o), Some(d)) => {
            let declared = declared_fields(d.manifest()?);
            let mut fields = Vec::new();
            match delta(&declared, &o.body, "", &mut fields) {
                Some(delta) => Ok(Action::Patch { fields, delta }),
                None => Ok(Action::NoOp),
            }
        }
    }
}

/// Strip identity fields from a manifest, leaving what the operator owns
fn declared_fields(mut manifest: Value) -> Value {
    if let Some(obj) = manifest.as_object_mut() {
        obj.remove("apiVersion");
        obj.remove("kind");
        if let Some(meta) = obj.get_mut("metadata").and_then(Value::as_object_mut) {
            meta.remove("name");
            meta.remove("namespace");
            if meta.is_empty() {
                obj.remove("metadata");
            }
        }
    }
    manifest
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}

/// Whether every declared field is present with the same value in `observed`
fn covers(desired: &Value, observed: &Value) -> bool {
    let mut scratch = Vec::new();
    delta(desired, observed, "", &mut scratch).is_none()
}

/// Merge-patch fragment that makes `observed` cover `desired`, recording the
/// changed field paths. `None` when nothing differs.
fn delta(desired: &Value, observed: &Value, path: &str, fields: &mut Vec<String>) -> Option<Value> {
    match (desired, observed) {
        (Value::Object(want), Value::Object(have)) => {
            let mut patch = Map::new();
            for (key, want_value) in want {
                let child = join(path, key);
                match have.get(key) {
                    Some(have_value) => {
                        if let Some(sub) = delta(want_value, have_value, &child, fields) {
                            patch.insert(key.clone(), sub);
                        }
                    }
                    None => {
                        fields.push(child);
                        patch.insert(key.clone(), want_value.clone());
                    }
                }
            }
            (!patch.is_empty()).then_some(Value::Object(patch))
        }
        // Merge patches replace lists whole, so a differing list is sent as declared
        (Value::Array(want), Value::Array(have)) => {
            let same = want.len() == have.len() && want.iter().zip(have).all(|(w, h)| covers(w, h));
            if same {
                None
            } else {
                fields.push(path.to_string());
                Some(desired.clone())
            }
        }
        _ if desired == observed => None,
        _ => {
            fields.push(path.to_string());
            Some(desired.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifests::storage::storage_class;
    use crate::types::{ResourceId, ResourceKind};
    use serde_json::json;

    fn observed(body: Value) -> ObservedResource {
        ObservedResource::from_value(ResourceId::cluster(ResourceKind::StorageClass, "local-raw"), body)
    }

    fn owned_class(reclaim: &str) -> Value {
        json!({
            "apiVersion": "storage.k8s.io/v1",
            "kind": "StorageClass",
            "metadata": {
                "name": "local-raw",
                "resourceVersion": "7",
                "uid": "abc",
                "labels": {
                    "app.kubernetes.io/managed-by": "localpv",
                    "app.kubernetes.io/part-of": "rawfile-localpv",
                    "rawfile-localpv.io/manifest": "rawfile-local-pv"
                }
            },
            "provisioner": "rawfile.csi.openebs.io",
            "reclaimPolicy": reclaim,
            "volumeBindingMode": "WaitForFirstConsumer",
            "allowVolumeExpansion": true,
            "mountOptions": ["noatime"]
        })
    }

    #[test]
    fn test_absent_desired_is_created() {
        let owner = Owner::new("localpv");
        let desired = storage_class(&owner, "local-raw", "rawfile.csi.openebs.io", "Delete");
        assert_eq!(diff(None, Some(&desired), &owner).unwrap(), Action::Create);
    }

    #[test]
    fn test_matching_resource_is_noop_despite_extra_fields() {
        let owner = Owner::new("localpv");
        let desired = storage_class(&owner, "local-raw", "rawfile.csi.openebs.io", "Delete");
        let current = observed(owned_class("Delete"));
        assert_eq!(diff(Some(&current), Some(&desired), &owner).unwrap(), Action::NoOp);
    }

    #[test]
    fn test_differing_field_is_patched_alone() {
        let owner = Owner::new("localpv");
        let desired = storage_class(&owner, "local-raw", "rawfile.csi.openebs.io", "Delete");
        let current = observed(owned_class("Retain"));

        let action = diff(Some(&current), Some(&desired), &owner).unwrap();
        assert_eq!(
            action,
            Action::Patch {
                fields: vec!["reclaimPolicy".to_string()],
                delta: json!({"reclaimPolicy": "Delete"}),
            }
        );
    }

    #[test]
    fn test_foreign_resource_is_a_collision() {
        let owner = Owner::new("localpv");
        let desired = storage_class(&owner, "local-raw", "rawfile.csi.openebs.io", "Delete");
        let current = observed(json!({"metadata": {"name": "local-raw", "resourceVersion": "1"}}));
        assert_eq!(diff(Some(&current), Some(&desired), &owner).unwrap(), Action::Collision);
    }

    #[test]
    fn test_undesired_resources() {
        let owner = Owner::new("localpv");
        let owned = observed(owned_class("Delete"));
        assert_eq!(diff(Some(&owned), None, &owner).unwrap(), Action::Delete);

        let foreign = observed(json!({"metadata": {"name": "local-raw"}}));
        assert_eq!(diff(Some(&foreign), None, &owner).unwrap(), Action::NoOp);
        assert_eq!(diff(None, None, &owner).unwrap(), Action::NoOp);
    }

    #[test]
    fn test_missing_label_patches_only_that_label() {
        let owner = Owner::new("localpv");
        let desired = storage_class(&owner, "local-raw", "rawfile.csi.openebs.io", "Delete");
        let mut body = owned_class("Delete");
        body["metadata"]["labels"]
            .as_object_mut()
            .unwrap()
            .remove("rawfile-localpv.io/manifest");

        let Action::Patch { fields, delta } = diff(Some(&observed(body)), Some(&desired), &owner).unwrap() else {
            panic!("expected a patch");
        };
        assert_eq!(fields, vec!["metadata.labels.rawfile-localpv.io/manifest"]);
        assert_eq!(
            delta,
            json!({"metadata": {"labels": {"rawfile-localpv.io/manifest": "rawfile-local-pv"}}})
        );
    }

    #[test]
    fn test_lists_compare_elementwise_and_replace_whole() {
        let desired = json!({"containers": [{"name": "a", "image": "x:1"}]});
        let defaulted = json!({"containers": [{"name": "a", "image": "x:1", "imagePullPolicy": "IfNotPresent"}]});
        assert!(covers(&desired, &defaulted));

        let changed = json!({"containers": [{"name": "a", "image": "x:0"}]});
        let mut fields = Vec::new();
        let patch = delta(&desired, &changed, "", &mut fields).unwrap();
        assert_eq!(fields, vec!["containers"]);
        assert_eq!(patch, desired);
    }
}
