// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Relation data published by peer units of related applications.

use crate::constants::{relation, upstream};
use crate::error::{OperatorError, Result};
use serde_yaml::Value;
use std::collections::BTreeMap;

/// Mapping of unit identity (`<app>/<n>`) to a flat key/value mapping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationData {
    units: BTreeMap<String, BTreeMap<String, String>>,
}

impl RelationData {
    pub fn new(units: BTreeMap<String, BTreeMap<String, String>>) -> Self {
        Self { units }
    }

    /// Parse relation data, rejecting anything that is not a flat mapping per unit
    pub fn from_yaml(raw: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(raw)
            .map_err(|e| OperatorError::InputUnavailable(format!("relation data is not YAML: {}", e)))?;

        let entries = match value {
            Value::Null => return Ok(Self::default()),
            Value::Mapping(m) => m,
            _ => {
                return Err(OperatorError::InputUnavailable(
                    "relation data must be a mapping of unit to key/value pairs".to_string(),
                ))
            }
        };

        let mut units = BTreeMap::new();
        for (unit, data) in entries {
            let Some(unit) = unit.as_str().filter(|u| is_unit_name(u)) else {
                return Err(OperatorError::InputUnavailable(format!(
                    "'{}' is not a unit identity of the form <app>/<n>",
                    scalar_to_string(&unit).unwrap_or_else(|| "?".to_string())
                )));
            };

            let mut flat = BTreeMap::new();
            match data {
                Value::Null => {}
                Value::Mapping(m) => {
                    for (key, value) in m {
                        let key = key.as_str().ok_or_else(|| {
                            OperatorError::InputUnavailable(format!("unit {} has a non-string key", unit))
                        })?;
                        let value = scalar_to_string(&value).ok_or_else(|| {
                            OperatorError::InputUnavailable(format!(
                                "unit {} key '{}' is not a flat value",
                                unit, key
                            ))
                        })?;
                        flat.insert(key.to_string(), value);
                    }
                }
                _ => {
                    return Err(OperatorError::InputUnavailable(format!(
                        "unit {} data is not a key/value mapping",
                        unit
                    )))
                }
            }
            units.insert(unit.to_string(), flat);
        }

        Ok(Self { units })
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn units(&self) -> impl Iterator<Item = (&String, &BTreeMap<String, String>)> {
        self.units.iter()
    }

    /// Kubelet root directory agreed on by every unit that publishes one
    pub fn kubelet_root_dir(&self) -> Result<String> {
        let mut agreed: Option<(&str, &str)> = None;

        for (unit, data) in &self.units {
            let Some(raw) = data.get(relation::KUBELET_ROOT_DIR) else {
                continue;
            };
            if !raw.starts_with('/') {
                return Err(OperatorError::InputUnavailable(format!(
                    "unit {} published a relative {}: '{}'",
                    unit,
                    relation::KUBELET_ROOT_DIR,
                    raw
                )));
            }
            let dir = raw.trim_end_matches('/');
            if dir.is_empty() {
                return Err(OperatorError::InputUnavailable(format!(
                    "unit {} published the filesystem root as {}",
                    unit,
                    relation::KUBELET_ROOT_DIR
                )));
            }
            match agreed {
                Some((other_unit, other)) if other != dir => {
                    return Err(OperatorError::InputUnavailable(format!(
                        "units {} and {} disagree on {} ('{}' vs '{}')",
                        other_unit,
                        unit,
                        relation::KUBELET_ROOT_DIR,
                        other,
                        dir
                    )));
                }
                Some(_) => {}
                None => agreed = Some((unit.as_str(), dir)),
            }
        }

        Ok(agreed
            .map(|(_, dir)| dir.to_string())
            .unwrap_or_else(|| upstream::DEFAULT_KUBELET_ROOT.to_string()))
    }
}

fn is_unit_name(unit: &str) -> bool {
    unit.split_once('/').is_some_and(|(app, n)| {
        !app.is_empty() && !n.is_empty() && n.chars().all(|c| c.is_ascii_digit())
    })
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
