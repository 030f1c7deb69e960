// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::timing;
use clap::Args;
use std::time::Duration;

/// Operator process configuration, from flags or environment variables
#[derive(Debug, Clone, Args)]
pub struct Config {
    /// Application name, used for ownership labels and name formatting
    #[arg(long, env = "APP_NAME", default_value = "rawfile-localpv")]
    pub app_name: String,

    /// Namespace the operator runs in; holds the inputs and status ConfigMaps
    #[arg(long, env = "OPERATOR_NAMESPACE")]
    pub operator_namespace: String,

    /// Inputs ConfigMap name [default: <app-name>-inputs]
    #[arg(long, env = "INPUTS_CONFIGMAP")]
    inputs_configmap: Option<String>,

    /// Status ConfigMap name [default: <app-name>-status]
    #[arg(long, env = "STATUS_CONFIGMAP")]
    status_configmap: Option<String>,

    /// Seconds between periodic resyncs
    #[arg(
        long = "resync-interval",
        env = "RESYNC_INTERVAL_SECS",
        default_value_t = timing::RESYNC_INTERVAL_SECS
    )]
    resync_secs: u64,

    /// Seconds before a retryable outcome is retried
    #[arg(
        long = "retry-interval",
        env = "RETRY_INTERVAL_SECS",
        default_value_t = timing::RETRY_INTERVAL_SECS
    )]
    retry_secs: u64,
}

impl Config {
    /// Configuration with defaults derived from the application name
    pub fn new(app_name: &str, operator_namespace: &str) -> Self {
        Config {
            app_name: app_name.to_string(),
            operator_namespace: operator_namespace.to_string(),
            inputs_configmap: None,
            status_configmap: None,
            resync_secs: timing::RESYNC_INTERVAL_SECS,
            retry_secs: timing::RETRY_INTERVAL_SECS,
        }
    }

    pub fn inputs_configmap(&self) -> String {
        self.inputs_configmap
            .clone()
            .unwrap_or_else(|| format!("{}-inputs", self.app_name))
    }

    pub fn status_configmap(&self) -> String {
        self.status_configmap
            .clone()
            .unwrap_or_else(|| format!("{}-status", self.app_name))
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_secs)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_secs)
    }
}
