// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Handlers forwarding requests to another peer
//!
//! The request body is passed through untouched, whatever its encoding.

use std::sync::Arc;

use async_trait::async_trait;

use transit_rpc::{
    Context, OnewayOutbound, OnewayTransportHandler, Request, RequestMeta, ResponseWriter, Status,
    UnaryOutbound, UnaryTransportHandler,
};

use crate::config::ProxyConfig;
use crate::metrics::{FORWARD_FAILURE_COUNTER, MetricsSink, NoopMetrics};

fn rewrite(config: &ProxyConfig, meta: &mut RequestMeta) {
    if config.clear_routing {
        meta.routing_key.clear();
        meta.routing_delegate.clear();
    }
    if let Some(service) = &config.service_override {
        meta.service.clone_from(service);
    }
}

/// Report a failed forward. Application errors raised by the peer's handler
/// are relayed as-is and do not count as forwarding failures.
fn forward_failed(metrics: &dyn MetricsSink, rpc_type: &str, meta: &RequestMeta, status: &Status) {
    if status.is_application_error() {
        tracing::debug!(
            caller = %meta.caller,
            service = %meta.service,
            procedure = %meta.procedure,
            error = %status,
            "forwarded request returned an application error"
        );
        return;
    }
    tracing::error!(
        caller = %meta.caller,
        service = %meta.service,
        procedure = %meta.procedure,
        shard_key = %meta.shard_key,
        error = %status,
        "failed to forward request"
    );
    metrics.increment(FORWARD_FAILURE_COUNTER, &[("rpc_type", rpc_type)]);
}

/// Unary handler relaying every request through an outbound
pub struct ProxyHandler {
    outbound: Arc<dyn UnaryOutbound>,
    config: ProxyConfig,
    metrics: Arc<dyn MetricsSink>,
}

impl ProxyHandler {
    pub fn new(outbound: Arc<dyn UnaryOutbound>, config: ProxyConfig) -> Self {
        ProxyHandler {
            outbound,
            config,
            metrics: Arc::new(NoopMetrics),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}

#[async_trait]
impl UnaryTransportHandler for ProxyHandler {
    async fn handle(
        &self,
        ctx: &Context,
        mut request: Request,
        writer: &mut dyn ResponseWriter,
    ) -> Result<(), Status> {
        rewrite(&self.config, &mut request.meta);
        let meta = request.meta.clone();

        let response = match self.outbound.call(ctx, request).await {
            Ok(response) => response,
            Err(status) => {
                forward_failed(self.metrics.as_ref(), "unary", &meta, &status);
                if status.is_application_error() {
                    writer.set_application_error();
                }
                return Err(status);
            }
        };

        writer.add_headers(response.headers);
        if response.application_error {
            writer.set_application_error();
        }
        if let Some(app_meta) = response.application_error_meta {
            writer.set_application_error_meta(app_meta);
        }

        let body = response
            .body
            .read_all(ctx)
            .await
            .map_err(|err| Status::new(err.code(), err.message()))?;
        writer
            .write(&body)
            .map_err(|err| Status::internal(format!("failed to write response: {err}")))
    }
}

/// Oneway handler relaying every request through an outbound
pub struct OnewayProxyHandler {
    outbound: Arc<dyn OnewayOutbound>,
    config: ProxyConfig,
    metrics: Arc<dyn MetricsSink>,
}

impl OnewayProxyHandler {
    pub fn new(outbound: Arc<dyn OnewayOutbound>, config: ProxyConfig) -> Self {
        OnewayProxyHandler {
            outbound,
            config,
            metrics: Arc::new(NoopMetrics),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }
}

#[async_trait]
impl OnewayTransportHandler for OnewayProxyHandler {
    async fn handle_oneway(&self, ctx: &Context, mut request: Request) -> Result<(), Status> {
        rewrite(&self.config, &mut request.meta);
        let meta = request.meta.clone();

        match self.outbound.call_oneway(ctx, request).await {
            Ok(_) => Ok(()),
            Err(status) => {
                forward_failed(self.metrics.as_ref(), "oneway", &meta, &status);
                Err(status)
            }
        }
    }
}
