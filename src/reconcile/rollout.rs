// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Rollout state and image versions of the provisioner workloads.

use crate::error::ClientError;
use crate::kubernetes::ClusterClient;
use crate::manifests::DesiredState;
use crate::types::{ObservedResource, ResourceId, ResourceKind};
use futures::future::join_all;
use serde_json::Value;
use std::fmt;

/// Observed state of one DaemonSet or StatefulSet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadStatus {
    pub id: ResourceId,
    /// Why the workload is not rolled out yet; `None` once it is
    pub pending: Option<String>,
    /// Container name to image, in pod template order
    pub images: Vec<(String, String)>,
}

impl WorkloadStatus {
    pub fn is_ready(&self) -> bool {
        self.pending.is_none()
    }

    fn missing(id: &ResourceId) -> Self {
        Self {
            id: id.clone(),
            pending: Some("not found".to_string()),
            images: Vec::new(),
        }
    }

    fn from_observed(observed: &ObservedResource) -> Self {
        let body = &observed.body;
        let pending = match observed.id.kind {
            ResourceKind::DaemonSet => daemonset_pending(body),
            ResourceKind::StatefulSet => statefulset_pending(body),
            _ => None,
        };
        let images: Vec<(String, String)> = body["spec"]["template"]["spec"]["containers"]
            .as_array()
            .map(|containers| {
                containers
                    .iter()
                    .filter_map(|c| Some((c["name"].as_str()?.to_string(), c["image"].as_str()?.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            id: observed.id.clone(),
            pending,
            images,
        }
    }
}

impl fmt::Display for WorkloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.pending {
            None => writeln!(f, "{} (ready)", self.id)?,
            Some(reason) => writeln!(f, "{} ({})", self.id, reason)?,
        }
        for (container, image) in &self.images {
            writeln!(f, "  {}: {}", container, image)?;
        }
        Ok(())
    }
}

fn count(value: &Value) -> i64 {
    value.as_i64().unwrap_or(0)
}

/// A newer spec the workload controller has not acted on yet
fn generation_pending(body: &Value) -> bool {
    match (body["metadata"]["generation"].as_i64(), body["status"]["observedGeneration"].as_i64()) {
        (Some(generation), Some(observed)) => observed < generation,
        _ => false,
    }
}

fn daemonset_pending(body: &Value) -> Option<String> {
    let status = &body["status"];
    if status.is_null() || generation_pending(body) {
        return Some("rollout not started".to_string());
    }
    let desired = count(&status["desiredNumberScheduled"]);
    let ready = count(&status["numberReady"]);
    let updated = count(&status["updatedNumberScheduled"]);
    if ready < desired || updated < desired {
        return Some(format!("{}/{} ready, {}/{} updated", ready, desired, updated, desired));
    }
    None
}

fn statefulset_pending(body: &Value) -> Option<String> {
    let status = &body["status"];
    if status.is_null() || generation_pending(body) {
        return Some("rollout not started".to_string());
    }
    let desired = body["spec"]["replicas"].as_i64().unwrap_or(1);
    let ready = count(&status["readyReplicas"]);
    let updated = count(&status["updatedReplicas"]);
    if ready < desired || updated < desired {
        return Some(format!("{}/{} ready, {}/{} updated", ready, desired, updated, desired));
    }
    None
}

/// Rollout state of every desired workload
pub async fn workloads(
    client: &dyn ClusterClient,
    desired: &DesiredState,
) -> std::result::Result<Vec<WorkloadStatus>, ClientError> {
    let ids: Vec<&ResourceId> = desired
        .descriptors()
        .map(|d| &d.id)
        .filter(|id| matches!(id.kind, ResourceKind::DaemonSet | ResourceKind::StatefulSet))
        .collect();

    let observed = join_all(ids.iter().map(|id| client.get(id))).await;
    ids.into_iter()
        .zip(observed)
        .map(|(id, observed)| -> std::result::Result<WorkloadStatus, ClientError> {
            Ok(match observed? {
                Some(resource) => WorkloadStatus::from_observed(&resource),
                None => WorkloadStatus::missing(id),
            })
        })
        .collect()
}

/// Tag of an image reference, or the whole reference when it has none
pub fn short_version(image: &str) -> &str {
    let image = image.split('@').next().unwrap_or(image);
    let name = image.rsplit('/').next().unwrap_or(image);
    match name.rsplit_once(':') {
        Some((_, tag)) if !tag.is_empty() => tag,
        _ => image,
    }
}
