// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Outcome of a reconciliation pass and where it gets published.

use crate::error::Result;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ready,
    /// Waiting on an input change or a retry
    Blocked,
    /// A request was rejected and will not be retried with the same inputs
    Error,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Ready => "Ready",
            Status::Blocked => "Blocked",
            Status::Error => "Error",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationOutcome {
    pub status: Status,
    pub message: String,
    /// Revision of the desired state the pass worked towards
    pub revision: Option<String>,
    /// Revision last fully applied to the cluster
    pub last_applied_revision: Option<String>,
    /// Whether the controller should requeue without waiting for an input change
    pub retryable: bool,
    /// Tag of the deployed provisioner image
    pub version: Option<String>,
    /// The provisioner was torn down
    pub removed: bool,
}

impl ReconciliationOutcome {
    pub fn ready(revision: &str) -> Self {
        Self {
            status: Status::Ready,
            message: String::new(),
            revision: Some(revision.to_string()),
            last_applied_revision: Some(revision.to_string()),
            retryable: false,
            version: None,
            removed: false,
        }
    }

    pub fn blocked(message: impl Into<String>, retryable: bool) -> Self {
        Self {
            status: Status::Blocked,
            message: message.into(),
            revision: None,
            last_applied_revision: None,
            retryable,
            version: None,
            removed: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            message: message.into(),
            revision: None,
            last_applied_revision: None,
            retryable: false,
            version: None,
            removed: false,
        }
    }

    /// Every owned resource is gone
    pub fn removed() -> Self {
        Self {
            removed: true,
            ..Self::blocked("Removed Kubernetes resources", false)
        }
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = Some(version.to_string());
        self
    }

    pub fn with_revision(mut self, revision: &str) -> Self {
        self.revision = Some(revision.to_string());
        self
    }

    pub fn with_last_applied(mut self, last_applied: Option<String>) -> Self {
        self.last_applied_revision = last_applied;
        self
    }
}

impl fmt::Display for ReconciliationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.status)
        } else {
            write!(f, "{}: {}", self.status, self.message)
        }
    }
}

/// Destination for pass outcomes
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn publish(&self, outcome: &ReconciliationOutcome) -> Result<()>;
}

/// Publishes outcomes, never failing the pass when the sink does
#[derive(Clone)]
pub struct StatusReporter {
    sink: Arc<dyn StatusSink>,
}

impl StatusReporter {
    pub fn new(sink: Arc<dyn StatusSink>) -> Self {
        Self { sink }
    }

    pub async fn report(&self, outcome: &ReconciliationOutcome) {
        info!(status = %outcome.status, revision = ?outcome.revision, "{}", outcome);
        if let Err(e) = self.sink.publish(outcome).await {
            warn!("Failed to publish status: {}", e);
        }
    }
}
