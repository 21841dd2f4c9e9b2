// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Typed clients over the outbound capabilities
//!
//! A client marshals the request with the configured encoding, hands it to
//! the outbound under the call context and decodes the result. A failed call
//! surfaces as an [`RpcError`] rebuilt from the wire status, so details sent
//! by the handler are available through
//! [`get_error_details`](crate::get_error_details).

use std::sync::Arc;

use crate::body::Body;
use crate::codec::{CodecRegistry, PROTO_ENCODING};
use crate::context::Context;
use crate::error::RpcError;
use crate::headers::Headers;
use crate::message::Message;
use crate::stream::MessageStream;
use crate::transport::{
    Ack, OnewayOutbound, Request, RequestMeta, StreamOutbound, StreamRequest, UnaryOutbound,
};
use crate::wire::from_wire_status;

/// Caller and callee identity shared by the typed clients
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub caller: String,
    pub service: String,
    pub encoding: String,
    pub registry: Arc<CodecRegistry>,
}

impl ClientConfig {
    pub fn new(
        registry: Arc<CodecRegistry>,
        caller: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        ClientConfig {
            caller: caller.into(),
            service: service.into(),
            encoding: PROTO_ENCODING.to_string(),
            registry,
        }
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }

    fn meta(&self, procedure: &str, headers: Headers) -> RequestMeta {
        RequestMeta::new(&self.caller, &self.service, procedure, &self.encoding)
            .with_headers(headers)
    }

    fn request(
        &self,
        procedure: &str,
        headers: Headers,
        message: &dyn Message,
    ) -> Result<Request, RpcError> {
        let buf = self.registry.marshal(&self.encoding, message)?;
        Ok(Request::new(self.meta(procedure, headers), Body::Pooled(buf)))
    }
}

#[derive(Clone)]
pub struct UnaryClient {
    config: ClientConfig,
    outbound: Arc<dyn UnaryOutbound>,
}

impl UnaryClient {
    pub fn new(config: ClientConfig, outbound: Arc<dyn UnaryOutbound>) -> Self {
        UnaryClient { config, outbound }
    }

    pub async fn call<Req, Resp>(
        &self,
        ctx: &Context,
        procedure: &str,
        request: &Req,
    ) -> Result<Resp, RpcError>
    where
        Req: Message,
        Resp: Message + Default,
    {
        self.call_with_headers(ctx, procedure, Headers::new(), request)
            .await
    }

    pub async fn call_with_headers<Req, Resp>(
        &self,
        ctx: &Context,
        procedure: &str,
        headers: Headers,
        request: &Req,
    ) -> Result<Resp, RpcError>
    where
        Req: Message,
        Resp: Message + Default,
    {
        let config = &self.config;
        let request = config.request(procedure, headers, request)?;

        let response = ctx
            .run(self.outbound.call(ctx, request))
            .await?
            .map_err(|status| from_wire_status(&config.registry, &config.encoding, &status))?;

        let data = response.body.read_all(ctx).await?;
        let mut message = Resp::default();
        config
            .registry
            .unmarshal(&config.encoding, &data, &mut message)
            .map_err(|err| {
                RpcError::internal(format!(
                    "failed to decode {:?} response body for procedure {procedure:?} of service {:?}: {err}",
                    config.encoding, config.service
                ))
            })?;
        Ok(message)
    }
}

#[derive(Clone)]
pub struct OnewayClient {
    config: ClientConfig,
    outbound: Arc<dyn OnewayOutbound>,
}

impl OnewayClient {
    pub fn new(config: ClientConfig, outbound: Arc<dyn OnewayOutbound>) -> Self {
        OnewayClient { config, outbound }
    }

    pub async fn call_oneway<Req: Message>(
        &self,
        ctx: &Context,
        procedure: &str,
        request: &Req,
    ) -> Result<Ack, RpcError> {
        let config = &self.config;
        let request = config.request(procedure, Headers::new(), request)?;
        ctx.run(self.outbound.call_oneway(ctx, request))
            .await?
            .map_err(|status| from_wire_status(&config.registry, &config.encoding, &status))
    }
}

#[derive(Clone)]
pub struct StreamClient {
    config: ClientConfig,
    outbound: Arc<dyn StreamOutbound>,
}

impl StreamClient {
    pub fn new(config: ClientConfig, outbound: Arc<dyn StreamOutbound>) -> Self {
        StreamClient { config, outbound }
    }

    /// Open a stream to `procedure`
    pub async fn call_stream(
        &self,
        ctx: &Context,
        procedure: &str,
    ) -> Result<MessageStream, RpcError> {
        let config = &self.config;
        let request = StreamRequest {
            meta: config.meta(procedure, Headers::new()),
        };
        let stream = ctx
            .run(self.outbound.call_stream(ctx, request))
            .await?
            .map_err(|status| from_wire_status(&config.registry, &config.encoding, &status))?;
        Ok(MessageStream::new(
            stream,
            config.registry.clone(),
            &config.encoding,
        ))
    }
}
