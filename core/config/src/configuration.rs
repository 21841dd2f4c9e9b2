// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

pub trait Configuration {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Validate the component configuration
    fn validate(&self) -> Result<(), Self::Error>;
}

/// Generic validation failure, for components that do not need a richer error.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid configuration for {field}: {reason}")]
pub struct ConfigurationError {
    pub field: &'static str,
    pub reason: String,
}

impl ConfigurationError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}
