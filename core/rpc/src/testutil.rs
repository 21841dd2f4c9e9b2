// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Messages shared by the unit tests of this crate

use serde::{Deserialize, Serialize};

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct Echo {
    #[prost(string, tag = "1")]
    pub value: String,
}

impl prost::Name for Echo {
    const NAME: &'static str = "Echo";
    const PACKAGE: &'static str = "transit.test";
}

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
    const PACKAGE: &'static str = "transit.test";
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryInfo {
    #[prost(uint64, tag = "1")]
    pub retry_after_ms: u64,
}

impl prost::Name for RetryInfo {
    const NAME: &'static str = "RetryInfo";
    const PACKAGE: &'static str = "transit.test";
}
