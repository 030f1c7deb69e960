// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Operator options and their validation.

use crate::constants::upstream;
use crate::error::{OperatorError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const RECLAIM_POLICIES: [&str; 2] = ["Delete", "Retain"];

/// Options declared by the operator's user. Empty strings are kept as given so
/// that validation can report them.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Options {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub create_namespace: bool,
    /// Space separated `key=value` pairs
    #[serde(default)]
    pub node_selector: String,
    #[serde(default = "default_storage_root")]
    pub storage_root: String,
    #[serde(default = "default_storage_class_name")]
    pub storage_class_name: String,
    #[serde(default = "default_reclaim_policy")]
    pub reclaim_policy: String,
    #[serde(default = "default_image")]
    pub image: String,
    #[serde(default = "default_formatter")]
    pub csi_driver_formatter: String,
    #[serde(default = "default_formatter")]
    pub rbac_name_formatter: String,
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_storage_root() -> String {
    "/var/snap/k8s/common/rawfile-storage".to_string()
}

fn default_storage_class_name() -> String {
    "csi-rawfile-default".to_string()
}

fn default_reclaim_policy() -> String {
    "Delete".to_string()
}

fn default_image() -> String {
    upstream::DEFAULT_IMAGE.to_string()
}

fn default_formatter() -> String {
    "{name}".to_string()
}

impl Default for Options {
    fn default() -> Self {
        Options {
            namespace: default_namespace(),
            create_namespace: false,
            node_selector: String::new(),
            storage_root: default_storage_root(),
            storage_class_name: default_storage_class_name(),
            reclaim_policy: default_reclaim_policy(),
            image: default_image(),
            csi_driver_formatter: default_formatter(),
            rbac_name_formatter: default_formatter(),
        }
    }
}

impl Options {
    pub fn from_yaml(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Options::default());
        }
        serde_yaml::from_str(raw).map_err(|e| OperatorError::invalid_config("config.yaml", e.to_string()))
    }

    pub fn namespace(&self) -> Result<&str> {
        if !is_dns_label(&self.namespace) {
            return Err(OperatorError::invalid_config(
                "namespace",
                format!("'{}' is not a valid namespace name", self.namespace),
            ));
        }
        Ok(&self.namespace)
    }

    pub fn storage_root(&self) -> Result<&str> {
        let path = self.storage_root.as_str();
        let reason = if path.is_empty() {
            Some("must not be empty")
        } else if !path.starts_with('/') {
            Some("must be an absolute path")
        } else if path.trim_end_matches('/').is_empty() {
            Some("must not be the filesystem root")
        } else if path.split('/').any(|segment| segment == "..") {
            Some("must not contain '..'")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(OperatorError::invalid_config("storageRoot", reason)),
            None => Ok(path),
        }
    }

    pub fn storage_class_name(&self) -> Result<&str> {
        if !is_dns_subdomain(&self.storage_class_name) {
            return Err(OperatorError::invalid_config(
                "storageClassName",
                format!("'{}' is not a valid resource name", self.storage_class_name),
            ));
        }
        Ok(&self.storage_class_name)
    }

    pub fn reclaim_policy(&self) -> Result<&str> {
        if !RECLAIM_POLICIES.contains(&self.reclaim_policy.as_str()) {
            return Err(OperatorError::invalid_config(
                "reclaimPolicy",
                format!(
                    "'{}' is not one of {}",
                    self.reclaim_policy,
                    RECLAIM_POLICIES.join(", ")
                ),
            ));
        }
        Ok(&self.reclaim_policy)
    }

    pub fn image(&self) -> Result<&str> {
        let image = self.image.trim();
        if image.is_empty() || image.contains(char::is_whitespace) {
            return Err(OperatorError::invalid_config(
                "image",
                "must be a non-empty image reference",
            ));
        }
        Ok(image)
    }

    /// Parsed node selector, `None` when unset
    pub fn node_selector(&self) -> Result<Option<BTreeMap<String, String>>> {
        let mut parsed = BTreeMap::new();

        for token in self.node_selector.split_whitespace() {
            let Some((key, value)) = token.split_once('=') else {
                return Err(OperatorError::invalid_config(
                    "nodeSelector",
                    format!("'{}' is not a key=value pair", token),
                ));
            };
            if !is_label_key(key) {
                return Err(OperatorError::invalid_config(
                    "nodeSelector",
                    format!("'{}' is not a valid label key", key),
                ));
            }
            if !is_label_value(value) {
                return Err(OperatorError::invalid_config(
                    "nodeSelector",
                    format!("'{}' is not a valid label value", value),
                ));
            }
            parsed.insert(key.to_string(), value.to_string());
        }

        Ok((!parsed.is_empty()).then_some(parsed))
    }

    /// Name of the CSI driver, formatted with `csiDriverFormatter`
    pub fn csi_driver_name(&self, app: &str) -> Result<String> {
        format_name(
            "csiDriverFormatter",
            &self.csi_driver_formatter,
            upstream::DRIVER_NAME,
            app,
        )
    }

    /// Name of a cluster-scoped RBAC object, formatted with `rbacNameFormatter`
    pub fn rbac_name(&self, name: &str, app: &str) -> Result<String> {
        format_name("rbacNameFormatter", &self.rbac_name_formatter, name, app)
    }
}

fn format_name(option: &str, formatter: &str, name: &str, app: &str) -> Result<String> {
    let formatted = formatter.replace("{name}", name).replace("{app}", app);

    if formatted.contains('{') || formatted.contains('}') {
        return Err(OperatorError::invalid_config(
            option,
            format!("'{}' uses a placeholder other than {{name}} and {{app}}", formatter),
        ));
    }
    if !is_dns_subdomain(&formatted) {
        return Err(OperatorError::invalid_config(
            option,
            format!("'{}' produces the invalid name '{}'", formatter, formatted),
        ));
    }
    Ok(formatted)
}

fn is_alnum(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit()
}

pub fn is_dns_label(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 63
        && s.chars().all(|c| is_alnum(c) || c == '-')
        && s.starts_with(is_alnum)
        && s.ends_with(is_alnum)
}

pub fn is_dns_subdomain(s: &str) -> bool {
    !s.is_empty() && s.len() <= 253 && s.split('.').all(is_dns_label)
}

fn is_label_name(s: &str) -> bool {
    let edge = |c: char| c.is_ascii_alphanumeric();
    !s.is_empty()
        && s.len() <= 63
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && s.starts_with(edge)
        && s.ends_with(edge)
}

fn is_label_key(key: &str) -> bool {
    match key.split_once('/') {
        Some((prefix, name)) => is_dns_subdomain(prefix) && is_label_name(name),
        None => is_label_name(key),
    }
}

fn is_label_value(value: &str) -> bool {
    value.is_empty() || is_label_name(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn option_of(err: OperatorError) -> String {
        match err {
            OperatorError::InvalidConfiguration { option, .. } => option,
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_defaults_from_empty_yaml() {
        assert_eq!(Options::from_yaml("").unwrap(), Options::default());
    }

    #[test]
    fn test_camel_case_keys() {
        let options = Options::from_yaml(
            "storageRoot: /var/snap/local-pv\nstorageClassName: local-raw\nreclaimPolicy: Retain\ncreateNamespace: true\n",
        )
        .unwrap();
        assert_eq!(options.storage_root, "/var/snap/local-pv");
        assert_eq!(options.storage_class_name, "local-raw");
        assert_eq!(options.reclaim_policy, "Retain");
        assert!(options.create_namespace);
        assert_eq!(options.namespace, "default");
    }

    #[test]
    fn test_unknown_option_is_invalid() {
        let err = Options::from_yaml("storagePath: /data\n").unwrap_err();
        assert_eq!(option_of(err), "config.yaml");
    }

    #[test]
    fn test_storage_root_validation() {
        for bad in ["", "relative/path", "/", "/var/../etc"] {
            let options = Options {
                storage_root: bad.to_string(),
                ..Default::default()
            };
            assert_eq!(option_of(options.storage_root().unwrap_err()), "storageRoot", "{}", bad);
        }

        let options = Options {
            storage_root: "/var/snap/local-pv".to_string(),
            ..Default::default()
        };
        assert_eq!(options.storage_root().unwrap(), "/var/snap/local-pv");
    }

    #[test]
    fn test_reclaim_policy_must_be_enumerated() {
        let options = Options {
            reclaim_policy: "Recycle".to_string(),
            ..Default::default()
        };
        assert_eq!(option_of(options.reclaim_policy().unwrap_err()), "reclaimPolicy");
    }

    #[test]
    fn test_node_selector_parsing() {
        let options = Options {
            node_selector: "storagePool=primary  kubernetes.io/os=linux".to_string(),
            ..Default::default()
        };
        let selector = options.node_selector().unwrap().unwrap();
        assert_eq!(selector.get("storagePool").unwrap(), "primary");
        assert_eq!(selector.get("kubernetes.io/os").unwrap(), "linux");

        assert_eq!(Options::default().node_selector().unwrap(), None);
    }

    #[test]
    fn test_node_selector_rejects_malformed_tokens() {
        for bad in ["storagePool", "=primary", "bad key=x"] {
            let options = Options {
                node_selector: bad.to_string(),
                ..Default::default()
            };
            assert_eq!(option_of(options.node_selector().unwrap_err()), "nodeSelector", "{}", bad);
        }
    }

    #[test]
    fn test_formatters() {
        let options = Options {
            rbac_name_formatter: "{app}-{name}".to_string(),
            ..Default::default()
        };
        assert_eq!(
            options.rbac_name("rawfile-csi-provisioner", "primary").unwrap(),
            "primary-rawfile-csi-provisioner"
        );
        assert_eq!(options.csi_driver_name("primary").unwrap(), "rawfile.csi.openebs.io");
    }

    #[test]
    fn test_formatter_unknown_placeholder() {
        let options = Options {
            csi_driver_formatter: "{unit}.{name}".to_string(),
            ..Default::default()
        };
        assert_eq!(
            option_of(options.csi_driver_name("primary").unwrap_err()),
            "csiDriverFormatter"
        );
    }

    #[test]
    fn test_name_validators() {
        assert!(is_dns_label("kube-system"));
        assert!(!is_dns_label("Kube"));
        assert!(!is_dns_label("-edge"));
        assert!(is_dns_subdomain("rawfile.csi.openebs.io"));
        assert!(!is_dns_subdomain("double..dot"));
    }
}
