// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Operator inputs read from a ConfigMap in the operator namespace.

use crate::constants::configmap;
use crate::error::Result;
use crate::reconcile::InputSource;
use crate::types::{Options, RelationData};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{Api, Client};
use tracing::{debug, instrument};

/// Reads `config.yaml` and `relation.yaml` from the inputs ConfigMap.
/// A missing ConfigMap or key means defaults and no relation data.
pub struct ConfigMapInputSource {
    api: Api<ConfigMap>,
    name: String,
}

impl ConfigMapInputSource {
    pub fn new(client: Client, namespace: &str, name: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            name: name.to_string(),
        }
    }

    pub async fn exists(&self) -> Result<bool> {
        Ok(self.api.get_opt(&self.name).await?.is_some())
    }

    async fn entry(&self, key: &str) -> Result<Option<String>> {
        let Some(cm) = self.api.get_opt(&self.name).await? else {
            debug!("Inputs ConfigMap {} not found, using defaults", self.name);
            return Ok(None);
        };
        Ok(cm.data.and_then(|mut data| data.remove(key)))
    }
}

#[async_trait]
impl InputSource for ConfigMapInputSource {
    #[instrument(skip(self), fields(configmap = %self.name))]
    async fn configuration(&self) -> Result<Options> {
        match self.entry(configmap::CONFIG_KEY).await? {
            Some(raw) => Options::from_yaml(&raw),
            None => Ok(Options::default()),
        }
    }

    #[instrument(skip(self), fields(configmap = %self.name))]
    async fn relation_data(&self) -> Result<RelationData> {
        match self.entry(configmap::RELATION_KEY).await? {
            Some(raw) => RelationData::from_yaml(&raw),
            None => Ok(RelationData::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OperatorError;
    use crate::test_utils::{configmap_json, not_found_json, MockService};

    const PATH: &str = "/api/v1/namespaces/operators/configmaps/localpv-inputs";

    fn source(service: MockService) -> ConfigMapInputSource {
        ConfigMapInputSource::new(service.into_client(), "operators", "localpv-inputs")
    }

    #[tokio::test]
    async fn test_reads_configuration_and_relation() {
        let body = configmap_json(
            "operators",
            "localpv-inputs",
            &[
                ("config.yaml", "storageRoot: /var/snap/local-pv\nreclaimPolicy: Retain\n"),
                ("relation.yaml", "k8s/0:\n  kubelet-root-dir: /var/lib/k0s/kubelet\n"),
            ],
        );
        let inputs = source(MockService::new().on_get(PATH, 200, &body));

        let options = inputs.configuration().await.unwrap();
        assert_eq!(options.storage_root, "/var/snap/local-pv");
        assert_eq!(options.reclaim_policy, "Retain");
        assert_eq!(options.storage_class_name, "csi-rawfile-default");

        let relation = inputs.relation_data().await.unwrap();
        assert_eq!(relation.kubelet_root_dir().unwrap(), "/var/lib/k0s/kubelet");
    }

    #[tokio::test]
    async fn test_missing_configmap_means_defaults() {
        let inputs = source(MockService::new().on_get(PATH, 404, &not_found_json("configmaps", "localpv-inputs")));

        assert_eq!(inputs.configuration().await.unwrap(), Options::default());
        assert!(inputs.relation_data().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_option_is_invalid() {
        let body = configmap_json("operators", "localpv-inputs", &[("config.yaml", "storagePath: /data\n")]);
        let inputs = source(MockService::new().on_get(PATH, 200, &body));

        let err = inputs.configuration().await.unwrap_err();
        assert!(matches!(err, OperatorError::InvalidConfiguration { .. }));
    }

    #[tokio::test]
    async fn test_exists() {
        let body = configmap_json("operators", "localpv-inputs", &[]);
        assert!(source(MockService::new().on_get(PATH, 200, &body)).exists().await.unwrap());

        let missing = source(MockService::new().on_get(PATH, 404, &not_found_json("configmaps", "localpv-inputs")));
        assert!(!missing.exists().await.unwrap());
    }
}
