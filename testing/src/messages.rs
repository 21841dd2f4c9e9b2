// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Messages used across the integration tests
//!
//! They behave like generated protobuf types: binary through prost, JSON
//! through serde, and a type URL under the `transit.testing` package.

use serde::{Deserialize, Serialize};

/// Simple request message for testing
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct EchoRequest {
    #[prost(string, tag = "1")]
    pub value: String,
}

impl prost::Name for EchoRequest {
    const NAME: &'static str = "EchoRequest";
    const PACKAGE: &'static str = "transit.testing";
}

impl EchoRequest {
    pub fn new(value: impl Into<String>) -> Self {
        EchoRequest {
            value: value.into(),
        }
    }
}

/// Simple response message for testing
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct EchoResponse {
    #[prost(string, tag = "1")]
    pub value: String,
    #[prost(string, tag = "2")]
    pub served_by: String,
}

impl prost::Name for EchoResponse {
    const NAME: &'static str = "EchoResponse";
    const PACKAGE: &'static str = "transit.testing";
}

/// Error detail pointing at an invalid request field
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldViolation {
    #[prost(string, tag = "1")]
    pub field: String,
    #[prost(string, tag = "2")]
    pub description: String,
}

impl prost::Name for FieldViolation {
    const NAME: &'static str = "FieldViolation";
    const PACKAGE: &'static str = "transit.testing";
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, description: impl Into<String>) -> Self {
        FieldViolation {
            field: field.into(),
            description: description.into(),
        }
    }
}

/// Error detail telling the caller when to try again
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryInfo {
    #[prost(uint64, tag = "1")]
    pub retry_after_ms: u64,
}

impl prost::Name for RetryInfo {
    const NAME: &'static str = "RetryInfo";
    const PACKAGE: &'static str = "transit.testing";
}
