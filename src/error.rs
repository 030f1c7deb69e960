// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OperatorError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("invalid configuration option '{option}': {reason}")]
    InvalidConfiguration { option: String, reason: String },

    #[error("relation data unavailable: {0}")]
    InputUnavailable(String),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

impl OperatorError {
    pub fn invalid_config(option: &str, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            option: option.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether re-running the same pass later may succeed without an input change.
    pub fn is_retryable(&self) -> bool {
        match self {
            OperatorError::KubeError(_) => true,
            OperatorError::Client(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// Outcome of a single cluster API call that did not succeed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("transient connectivity failure: {0}")]
    Transient(String),
}

impl ClientError {
    /// `Rejected` is the only failure that a later attempt with the same input cannot fix.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ClientError::Rejected(_))
    }
}

impl From<kube::Error> for ClientError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(resp) => match (resp.code, resp.reason.as_str()) {
                (404, _) => ClientError::NotFound(resp.message),
                (409, "AlreadyExists") => ClientError::AlreadyExists(resp.message),
                (409, _) => ClientError::Conflict(resp.message),
                (400 | 401 | 403 | 405 | 415 | 422, _) => ClientError::Rejected(resp.message),
                _ => ClientError::Transient(resp.message),
            },
            other => ClientError::Transient(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Rejected(format!("unable to encode object: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, OperatorError>;

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{} happened", reason),
            reason: reason.to_string(),
            code,
        })
    }

    #[test]
    fn test_not_found_mapping() {
        assert!(matches!(
            ClientError::from(api_error(404, "NotFound")),
            ClientError::NotFound(_)
        ));
    }

    #[test]
    fn test_conflict_and_already_exists_are_distinguished() {
        assert!(matches!(
            ClientError::from(api_error(409, "AlreadyExists")),
            ClientError::AlreadyExists(_)
        ));
        assert!(matches!(
            ClientError::from(api_error(409, "Conflict")),
            ClientError::Conflict(_)
        ));
    }

    #[test]
    fn test_validation_failures_are_rejected() {
        let err = ClientError::from(api_error(422, "Invalid"));
        assert!(matches!(err, ClientError::Rejected(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_server_errors_are_transient() {
        let err = ClientError::from(api_error(503, "ServiceUnavailable"));
        assert!(matches!(err, ClientError::Transient(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_invalid_configuration_names_option() {
        let err = OperatorError::invalid_config("storageRoot", "must not be empty");
        assert_eq!(
            err.to_string(),
            "invalid configuration option 'storageRoot': must not be empty"
        );
        assert!(!err.is_retryable());
    }
}
