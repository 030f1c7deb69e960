// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Status ConfigMap written with server-side apply.

use crate::constants::{configmap, OPERATOR_NAME};
use crate::error::Result;
use crate::reconcile::{ReconciliationOutcome, StatusSink};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{ObjectMeta, Patch, PatchParams};
use kube::{Api, Client};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

pub struct ConfigMapStatusSink {
    api: Api<ConfigMap>,
    namespace: String,
    name: String,
}

impl ConfigMapStatusSink {
    pub fn new(client: Client, namespace: &str, name: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// Whether the last published outcome was a completed teardown
    pub async fn removal_recorded(&self) -> Result<bool> {
        let recorded = self
            .api
            .get_opt(&self.name)
            .await?
            .and_then(|cm| cm.data)
            .and_then(|mut data| data.remove(configmap::REMOVED_KEY))
            .is_some_and(|removed| removed == "true");
        Ok(recorded)
    }

    fn configmap(&self, outcome: &ReconciliationOutcome) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace.clone()),
                ..Default::default()
            },
            data: Some(status_data(outcome)),
            ..Default::default()
        }
    }
}

/// ConfigMap data for an outcome; revisions are empty until known
pub fn status_data(outcome: &ReconciliationOutcome) -> BTreeMap<String, String> {
    BTreeMap::from([
        (configmap::STATUS_KEY.to_string(), outcome.status.to_string()),
        (configmap::MESSAGE_KEY.to_string(), outcome.message.clone()),
        (
            configmap::REVISION_KEY.to_string(),
            outcome.revision.clone().unwrap_or_default(),
        ),
        (
            configmap::LAST_APPLIED_KEY.to_string(),
            outcome.last_applied_revision.clone().unwrap_or_default(),
        ),
        (
            configmap::VERSION_KEY.to_string(),
            outcome.version.clone().unwrap_or_default(),
        ),
        (configmap::REMOVED_KEY.to_string(), outcome.removed.to_string()),
    ])
}

#[async_trait]
impl StatusSink for ConfigMapStatusSink {
    #[instrument(skip(self, outcome), fields(configmap = %self.name, status = %outcome.status))]
    async fn publish(&self, outcome: &ReconciliationOutcome) -> Result<()> {
        let params = PatchParams::apply(OPERATOR_NAME).force();
        self.api
            .patch(&self.name, &params, &Patch::Apply(&self.configmap(outcome)))
            .await?;
        debug!("Published status");
        Ok(())
    }
}
