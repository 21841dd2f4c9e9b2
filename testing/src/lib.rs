// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Test utilities for the transit crates
//!
//! Provides prost test messages and in-memory transports that dispatch through
//! a [`Router`](transit_rpc::Router) without any network.

pub mod memory;
pub mod messages;

pub use memory::{MemoryOutbound, MemoryStream, RecordedCall, RecordingOutbound};
pub use messages::{EchoRequest, EchoResponse, FieldViolation, RetryInfo};
