// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use transit_config::Configuration;

#[derive(Error, Debug)]
pub enum TracingError {
    #[error("unknown log level: {0}")]
    UnknownLevel(String),
    #[error("invalid filter directive: {0}")]
    InvalidFilter(String),
    #[error("a global subscriber is already installed")]
    AlreadyInstalled,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct TracingConfiguration {
    #[serde(default = "default_log_level")]
    log_level: String,

    #[serde(default = "default_display_thread_names")]
    display_thread_names: bool,

    #[serde(default = "default_display_thread_ids")]
    display_thread_ids: bool,

    /// Optional `EnvFilter` directives, e.g. `transit_relay=debug,info`.
    /// Empty means "use log_level for everything".
    #[serde(default)]
    filter: String,
}

impl Default for TracingConfiguration {
    fn default() -> Self {
        TracingConfiguration {
            log_level: default_log_level(),
            display_thread_names: default_display_thread_names(),
            display_thread_ids: default_display_thread_ids(),
            filter: String::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_display_thread_names() -> bool {
    true
}

fn default_display_thread_ids() -> bool {
    false
}

// function to convert string tracing level to tracing::Level
fn resolve_level(level: &str) -> Option<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

impl TracingConfiguration {
    pub fn with_log_level(self, log_level: impl Into<String>) -> Self {
        TracingConfiguration {
            log_level: log_level.into(),
            ..self
        }
    }

    pub fn with_display_thread_names(self, display_thread_names: bool) -> Self {
        TracingConfiguration {
            display_thread_names,
            ..self
        }
    }

    pub fn with_display_thread_ids(self, display_thread_ids: bool) -> Self {
        TracingConfiguration {
            display_thread_ids,
            ..self
        }
    }

    pub fn with_filter(self, filter: impl Into<String>) -> Self {
        TracingConfiguration {
            filter: filter.into(),
            ..self
        }
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn display_thread_names(&self) -> bool {
        self.display_thread_names
    }

    pub fn display_thread_ids(&self) -> bool {
        self.display_thread_ids
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    fn env_filter(&self) -> Result<EnvFilter, TracingError> {
        let directives = if self.filter.is_empty() {
            self.log_level.to_lowercase()
        } else {
            self.filter.clone()
        };
        EnvFilter::try_new(&directives).map_err(|_| TracingError::InvalidFilter(directives))
    }

    /// Set up a subscriber that logs to stdout
    pub fn setup_tracing_subscriber(&self) -> Result<(), TracingError> {
        self.validate()?;

        tracing_subscriber::fmt::Subscriber::builder()
            .with_env_filter(self.env_filter()?)
            .with_thread_names(self.display_thread_names)
            .with_thread_ids(self.display_thread_ids)
            .try_init()
            .map_err(|_| TracingError::AlreadyInstalled)
    }
}

impl Configuration for TracingConfiguration {
    type Error = TracingError;

    fn validate(&self) -> Result<(), Self::Error> {
        if resolve_level(&self.log_level).is_none() {
            return Err(TracingError::UnknownLevel(self.log_level.clone()));
        }
        self.env_filter().map(|_| ())
    }
}

// tests
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tracing_configuration() {
        let config = TracingConfiguration::default();
        assert_eq!(config.log_level, default_log_level());
        assert_eq!(config.display_thread_names, default_display_thread_names());
        assert_eq!(config.display_thread_ids, default_display_thread_ids());
        assert_eq!(config.filter, "");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_resolve_level() {
        assert_eq!(resolve_level("trace"), Some(Level::TRACE));
        assert_eq!(resolve_level("debug"), Some(Level::DEBUG));
        assert_eq!(resolve_level("INFO"), Some(Level::INFO));
        assert_eq!(resolve_level("warn"), Some(Level::WARN));
        assert_eq!(resolve_level("error"), Some(Level::ERROR));
        assert_eq!(resolve_level("invalid"), None);
    }

    #[test]
    fn test_validate_rejects_unknown_level() {
        let config = TracingConfiguration::default().with_log_level("loud");
        assert!(matches!(
            config.validate(),
            Err(TracingError::UnknownLevel(level)) if level == "loud"
        ));
    }

    #[test]
    fn test_from_yaml() {
        let config: TracingConfiguration = serde_yaml::from_str(
            "log_level: debug\ndisplay_thread_ids: true\nfilter: transit_relay=trace,info\n",
        )
        .unwrap();
        assert_eq!(config.log_level(), "debug");
        assert!(config.display_thread_names());
        assert!(config.display_thread_ids());
        assert_eq!(config.filter(), "transit_relay=trace,info");
        assert!(config.validate().is_ok());
    }
}
