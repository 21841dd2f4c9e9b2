// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use thiserror::Error;

use transit_config::{Configuration, ConfigurationError};
use transit_tracing::TracingConfiguration;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProxyConfigError {
    #[error("service_override must not be empty when set")]
    EmptyServiceOverride,
}

fn default_clear_routing() -> bool {
    true
}

/// How a proxy handler rewrites requests before forwarding them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Service name set on forwarded requests, when present
    #[serde(default)]
    pub service_override: Option<String>,

    /// Clear routing key and routing delegate before forwarding
    #[serde(default = "default_clear_routing")]
    pub clear_routing: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        ProxyConfig {
            service_override: None,
            clear_routing: default_clear_routing(),
        }
    }
}

impl ProxyConfig {
    pub fn with_service_override(mut self, service: impl Into<String>) -> Self {
        self.service_override = Some(service.into());
        self
    }
}

impl Configuration for ProxyConfig {
    type Error = ProxyConfigError;

    fn validate(&self) -> Result<(), Self::Error> {
        match &self.service_override {
            Some(service) if service.is_empty() => Err(ProxyConfigError::EmptyServiceOverride),
            _ => Ok(()),
        }
    }
}

/// Settings of a relay process: logging plus the proxy rewrite rules
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub tracing: TracingConfiguration,

    #[serde(default)]
    pub proxy: ProxyConfig,
}

impl RelayConfig {
    /// Validate everything, then install the global subscriber
    pub fn init(&self) -> Result<(), ConfigurationError> {
        self.validate()?;
        self.tracing
            .setup_tracing_subscriber()
            .map_err(|err| ConfigurationError::new("tracing", err.to_string()))
    }
}

impl Configuration for RelayConfig {
    type Error = ConfigurationError;

    fn validate(&self) -> Result<(), Self::Error> {
        self.tracing
            .validate()
            .map_err(|err| ConfigurationError::new("tracing", err.to_string()))?;
        self.proxy
            .validate()
            .map_err(|err| ConfigurationError::new("proxy", err.to_string()))
    }
}
