//! Error types for the Fleetlink controllers

use thiserror::Error;

/// Main error type for Fleetlink operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Validation error for object specs or identities
    #[error("validation error: {0}")]
    Validation(String),

    /// Serialization error while preparing an object for the wire
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Whether this error is an optimistic-concurrency conflict.
    ///
    /// Conflicts mean the object changed between our read and write; the pass
    /// is requeued and retried against fresh state rather than handled here.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Kube(kube::Error::Api(ae)) if ae.code == 409)
    }

    /// Whether this error is a NotFound from the API server
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Kube(kube::Error::Api(ae)) if ae.code == 404)
    }
}
