// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Relay routing and proxying on top of `transit-rpc`
//!
//! A [`RelayRouter`] falls back to service, shard key and default handlers
//! when its base router does not know a procedure. [`ProxyHandler`] and
//! [`OnewayProxyHandler`] forward requests to another peer.

pub mod config;
pub mod metrics;
pub mod proxy;
pub mod router;

pub use config::{ProxyConfig, ProxyConfigError, RelayConfig};
pub use metrics::{
    CountingMetrics, FORWARD_FAILURE_COUNTER, MetricsSink, NOT_FOUND_COUNTER, NoopMetrics,
    ROUTE_COUNTER,
};
pub use proxy::{OnewayProxyHandler, ProxyHandler};
pub use router::{RelayRouter, Route, ServiceHandler, ShardHandler};
