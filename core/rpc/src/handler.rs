// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Business handlers and their transport adapters
//!
//! Business code implements [`UnaryHandler`], [`OnewayHandler`] or
//! [`StreamHandler`] with concrete message types. The adapters turn them into
//! transport handlers that check the encoding, read and decode the body, call
//! the handler, encode the response and translate failures into a wire
//! [`Status`]. A request that fails to decode never reaches the handler.

use std::any::type_name;
use std::error::Error as StdError;
use std::sync::Arc;

use async_trait::async_trait;

use crate::codec::{CodecRegistry, JSON_ENCODING, PROTO_ENCODING};
use crate::context::Context;
use crate::error::RpcError;
use crate::message::Message;
use crate::status::Status;
use crate::stream::MessageStream;
use crate::transport::{
    HandlerSpec, OnewayTransportHandler, Procedure, Request, ResponseWriter,
    StreamTransportHandler, TransportStream, UnaryTransportHandler,
};
use crate::wire::to_wire_status;

/// Error type returned by business handlers. An [`RpcError`] anywhere in the
/// source chain keeps its code, message and details on the wire.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

#[async_trait]
pub trait UnaryHandler: Send + Sync + 'static {
    type Request: Message + Default;
    type Response: Message;

    async fn handle(
        &self,
        ctx: &Context,
        request: Self::Request,
    ) -> Result<Self::Response, BoxError>;
}

#[async_trait]
pub trait OnewayHandler: Send + Sync + 'static {
    type Request: Message + Default;

    async fn handle_oneway(&self, ctx: &Context, request: Self::Request) -> Result<(), BoxError>;
}

#[async_trait]
pub trait StreamHandler: Send + Sync + 'static {
    async fn handle_stream(&self, ctx: &Context, stream: MessageStream) -> Result<(), BoxError>;
}

/// State shared by the three adapters
#[derive(Debug, Clone)]
struct Decoder {
    registry: Arc<CodecRegistry>,
    encodings: Vec<String>,
}

impl Decoder {
    fn new(registry: Arc<CodecRegistry>) -> Self {
        Decoder {
            registry,
            encodings: vec![PROTO_ENCODING.to_string(), JSON_ENCODING.to_string()],
        }
    }

    fn check_encoding(&self, encoding: &str, procedure: &str) -> Result<(), RpcError> {
        if self.encodings.iter().any(|accepted| accepted == encoding) {
            return Ok(());
        }
        tracing::debug!(%encoding, %procedure, "request with unexpected encoding");
        Err(RpcError::invalid_argument(format!(
            "unexpected encoding {encoding:?} for procedure {procedure:?}, expected one of {:?}",
            self.encodings
        )))
    }

    async fn decode<M: Message + Default>(
        &self,
        ctx: &Context,
        request: Request,
    ) -> Result<M, RpcError> {
        let meta = request.meta;
        self.check_encoding(&meta.encoding, &meta.procedure)?;

        let data = request.body.read_all(ctx).await?;
        let mut message = M::default();
        self.registry
            .unmarshal(&meta.encoding, &data, &mut message)
            .map_err(|err| {
                tracing::debug!(
                    caller = %meta.caller,
                    service = %meta.service,
                    procedure = %meta.procedure,
                    error = %err,
                    "failed to decode request"
                );
                err.into_rpc_error(format_args!(
                    "failed to decode {:?} request body for procedure {:?} of service {:?} from caller {:?}",
                    meta.encoding, meta.procedure, meta.service, meta.caller
                ))
            })?;
        Ok(message)
    }

    fn status(
        &self,
        encoding: &str,
        err: &(dyn StdError + 'static),
        writer: Option<&mut dyn ResponseWriter>,
    ) -> Status {
        to_wire_status(&self.registry, encoding, err, writer)
    }
}

/// Transport handler serving a [`UnaryHandler`]
#[derive(Debug)]
pub struct UnaryAdapter<H> {
    handler: H,
    decoder: Decoder,
}

impl<H: UnaryHandler> UnaryAdapter<H> {
    pub fn new(registry: Arc<CodecRegistry>, handler: H) -> Self {
        UnaryAdapter {
            handler,
            decoder: Decoder::new(registry),
        }
    }

    /// Replace the accepted encodings, `proto` and `json` by default
    pub fn with_encodings<I, S>(mut self, encodings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.decoder.encodings = encodings.into_iter().map(Into::into).collect();
        self
    }
}

#[async_trait]
impl<H: UnaryHandler> UnaryTransportHandler for UnaryAdapter<H> {
    async fn handle(
        &self,
        ctx: &Context,
        request: Request,
        writer: &mut dyn ResponseWriter,
    ) -> Result<(), Status> {
        let encoding = request.meta.encoding.clone();
        let request = match self.decoder.decode::<H::Request>(ctx, request).await {
            Ok(request) => request,
            Err(err) => return Err(self.decoder.status(&encoding, &err, None)),
        };

        match self.handler.handle(ctx, request).await {
            Ok(response) => {
                let buf = self
                    .decoder
                    .registry
                    .marshal(&encoding, &response)
                    .map_err(|err| self.decoder.status(&encoding, &RpcError::from(err), None))?;
                writer
                    .write(buf.as_slice())
                    .map_err(|err| Status::unknown(format!("failed to write response: {err}")))
            }
            Err(err) => {
                tracing::debug!(%encoding, error = %err, "handler returned an application error");
                writer.set_application_error();
                Err(self
                    .decoder
                    .status(&encoding, &*err, Some(writer))
                    .with_application_error())
            }
        }
    }
}

/// Transport handler serving a [`OnewayHandler`]
#[derive(Debug)]
pub struct OnewayAdapter<H> {
    handler: H,
    decoder: Decoder,
}

impl<H: OnewayHandler> OnewayAdapter<H> {
    pub fn new(registry: Arc<CodecRegistry>, handler: H) -> Self {
        OnewayAdapter {
            handler,
            decoder: Decoder::new(registry),
        }
    }

    pub fn with_encodings<I, S>(mut self, encodings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.decoder.encodings = encodings.into_iter().map(Into::into).collect();
        self
    }
}

#[async_trait]
impl<H: OnewayHandler> OnewayTransportHandler for OnewayAdapter<H> {
    async fn handle_oneway(&self, ctx: &Context, request: Request) -> Result<(), Status> {
        let encoding = request.meta.encoding.clone();
        let request = match self.decoder.decode::<H::Request>(ctx, request).await {
            Ok(request) => request,
            Err(err) => return Err(self.decoder.status(&encoding, &err, None)),
        };

        self.handler
            .handle_oneway(ctx, request)
            .await
            .map_err(|err| {
                tracing::debug!(%encoding, error = %err, "oneway handler failed");
                self.decoder
                    .status(&encoding, &*err, None)
                    .with_application_error()
            })
    }
}

/// Transport handler serving a [`StreamHandler`]
#[derive(Debug)]
pub struct StreamAdapter<H> {
    handler: H,
    decoder: Decoder,
}

impl<H: StreamHandler> StreamAdapter<H> {
    pub fn new(registry: Arc<CodecRegistry>, handler: H) -> Self {
        StreamAdapter {
            handler,
            decoder: Decoder::new(registry),
        }
    }

    pub fn with_encodings<I, S>(mut self, encodings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.decoder.encodings = encodings.into_iter().map(Into::into).collect();
        self
    }
}

#[async_trait]
impl<H: StreamHandler> StreamTransportHandler for StreamAdapter<H> {
    async fn handle_stream(
        &self,
        ctx: &Context,
        stream: Box<dyn TransportStream>,
    ) -> Result<(), Status> {
        let meta = stream.request().meta.clone();
        if let Err(err) = self.decoder.check_encoding(&meta.encoding, &meta.procedure) {
            return Err(self.decoder.status(&meta.encoding, &err, None));
        }

        let stream = MessageStream::new(stream, self.decoder.registry.clone(), &meta.encoding);
        self.handler
            .handle_stream(ctx, stream)
            .await
            .map_err(|err| {
                tracing::debug!(encoding = %meta.encoding, error = %err, "stream handler failed");
                self.decoder
                    .status(&meta.encoding, &*err, None)
                    .with_application_error()
            })
    }
}

fn method_name(service: &str, method: &str) -> String {
    format!("{service}::{method}")
}

/// Procedure entry for a unary handler, named `Service::Method`
pub fn unary_procedure<H: UnaryHandler>(
    registry: Arc<CodecRegistry>,
    service: &str,
    method: &str,
    handler: H,
) -> Procedure {
    let signature = format!(
        "{method}({}) ({})",
        type_name::<H::Request>(),
        type_name::<H::Response>()
    );
    Procedure::new(
        service,
        method_name(service, method),
        HandlerSpec::Unary(Arc::new(UnaryAdapter::new(registry, handler))),
        signature,
    )
}

/// Procedure entry for a oneway handler
pub fn oneway_procedure<H: OnewayHandler>(
    registry: Arc<CodecRegistry>,
    service: &str,
    method: &str,
    handler: H,
) -> Procedure {
    let signature = format!("{method}({}) (oneway)", type_name::<H::Request>());
    Procedure::new(
        service,
        method_name(service, method),
        HandlerSpec::Oneway(Arc::new(OnewayAdapter::new(registry, handler))),
        signature,
    )
}

/// Procedure entry for a stream handler
pub fn stream_procedure<H: StreamHandler>(
    registry: Arc<CodecRegistry>,
    service: &str,
    method: &str,
    handler: H,
) -> Procedure {
    Procedure::new(
        service,
        method_name(service, method),
        HandlerSpec::Stream(Arc::new(StreamAdapter::new(registry, handler))),
        format!("{method}(stream) (stream)"),
    )
}
