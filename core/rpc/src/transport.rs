// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Transport facing request/response model
//!
//! Concrete transports live outside this crate. They plug in through the
//! outbound traits ([`UnaryOutbound`], [`OnewayOutbound`], [`StreamOutbound`])
//! on the calling side, and by invoking a [`HandlerSpec`] chosen by a
//! [`Router`](crate::Router) on the serving side.

use std::fmt;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::BytesMut;

use crate::body::Body;
use crate::code::Code;
use crate::context::Context;
use crate::headers::Headers;
use crate::status::Status;

/// Everything about a request except its body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMeta {
    /// Name of the calling service
    pub caller: String,
    /// Name of the service being called
    pub service: String,
    /// Procedure name, in `Service::Method` form
    pub procedure: String,
    /// Encoding tag of the body
    pub encoding: String,
    pub headers: Headers,
    pub shard_key: String,
    pub routing_key: String,
    pub routing_delegate: String,
}

impl RequestMeta {
    pub fn new(
        caller: impl Into<String>,
        service: impl Into<String>,
        procedure: impl Into<String>,
        encoding: impl Into<String>,
    ) -> Self {
        RequestMeta {
            caller: caller.into(),
            service: service.into(),
            procedure: procedure.into(),
            encoding: encoding.into(),
            ..Default::default()
        }
    }

    pub fn with_shard_key(mut self, shard_key: impl Into<String>) -> Self {
        self.shard_key = shard_key.into();
        self
    }

    pub fn with_routing_key(mut self, routing_key: impl Into<String>) -> Self {
        self.routing_key = routing_key.into();
        self
    }

    pub fn with_routing_delegate(mut self, routing_delegate: impl Into<String>) -> Self {
        self.routing_delegate = routing_delegate.into();
        self
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers.merge(headers);
        self
    }
}

/// A unary or oneway request
#[derive(Debug, Default)]
pub struct Request {
    pub meta: RequestMeta,
    pub body: Body,
}

impl Request {
    pub fn new(meta: RequestMeta, body: impl Into<Body>) -> Self {
        Request {
            meta,
            body: body.into(),
        }
    }
}

/// Opening request of a stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamRequest {
    pub meta: RequestMeta,
}

/// One frame of a stream
#[derive(Debug, Default)]
pub struct StreamMessage {
    pub body: Body,
}

impl StreamMessage {
    pub fn new(body: impl Into<Body>) -> Self {
        StreamMessage { body: body.into() }
    }
}

/// Observability data about an application error, not sent on the wire
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicationErrorMeta {
    pub code: Option<Code>,
    /// Short name of the first detail type, e.g. `FieldViolation`
    pub name: String,
    /// Human readable rendering of every detail
    pub details: String,
}

/// Response of a unary call
#[derive(Debug, Default)]
pub struct Response {
    pub headers: Headers,
    pub body: Body,
    /// Set when the handler failed. Orthogonal to the transport outcome.
    pub application_error: bool,
    pub application_error_meta: Option<ApplicationErrorMeta>,
}

/// Acknowledgement of a oneway call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ack;

/// Sink a unary handler writes its response into
pub trait ResponseWriter: Send {
    fn write(&mut self, data: &[u8]) -> io::Result<()>;

    fn add_headers(&mut self, headers: Headers);

    fn set_application_error(&mut self);

    /// Optional capability, ignored by writers that have no use for it
    fn set_application_error_meta(&mut self, _meta: ApplicationErrorMeta) {}
}

/// A [`ResponseWriter`] buffering everything in memory
#[derive(Debug, Default)]
pub struct ResponseRecorder {
    headers: Headers,
    body: BytesMut,
    application_error: bool,
    application_error_meta: Option<ApplicationErrorMeta>,
}

impl ResponseRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn is_application_error(&self) -> bool {
        self.application_error
    }

    pub fn application_error_meta(&self) -> Option<&ApplicationErrorMeta> {
        self.application_error_meta.as_ref()
    }

    pub fn into_response(self) -> Response {
        Response {
            headers: self.headers,
            body: Body::Bytes(self.body.freeze()),
            application_error: self.application_error,
            application_error_meta: self.application_error_meta,
        }
    }
}

impl ResponseWriter for ResponseRecorder {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.body.extend_from_slice(data);
        Ok(())
    }

    fn add_headers(&mut self, headers: Headers) {
        self.headers.merge(headers);
    }

    fn set_application_error(&mut self) {
        self.application_error = true;
    }

    fn set_application_error_meta(&mut self, meta: ApplicationErrorMeta) {
        self.application_error_meta = Some(meta);
    }
}

/// Sends unary requests to a remote peer
#[async_trait]
pub trait UnaryOutbound: Send + Sync {
    async fn call(&self, ctx: &Context, request: Request) -> Result<Response, Status>;
}

/// Sends fire-and-forget requests to a remote peer
#[async_trait]
pub trait OnewayOutbound: Send + Sync {
    async fn call_oneway(&self, ctx: &Context, request: Request) -> Result<Ack, Status>;
}

/// Opens streams to a remote peer
#[async_trait]
pub trait StreamOutbound: Send + Sync {
    async fn call_stream(
        &self,
        ctx: &Context,
        request: StreamRequest,
    ) -> Result<Box<dyn TransportStream>, Status>;
}

/// A duplex stream of frames. Frames on one stream are delivered in order.
#[async_trait]
pub trait TransportStream: Send + Sync {
    fn request(&self) -> &StreamRequest;

    async fn send_message(&self, ctx: &Context, message: StreamMessage) -> Result<(), Status>;

    /// Next frame, `Ok(None)` once the peer closed its sending side
    async fn receive_message(&self, ctx: &Context) -> Result<Option<StreamMessage>, Status>;

    /// Half-close: no more frames will be sent on this side
    async fn close_send(&self, ctx: &Context) -> Result<(), Status>;
}

#[async_trait]
pub trait UnaryTransportHandler: Send + Sync {
    async fn handle(
        &self,
        ctx: &Context,
        request: Request,
        writer: &mut dyn ResponseWriter,
    ) -> Result<(), Status>;
}

#[async_trait]
pub trait OnewayTransportHandler: Send + Sync {
    async fn handle_oneway(&self, ctx: &Context, request: Request) -> Result<(), Status>;
}

#[async_trait]
pub trait StreamTransportHandler: Send + Sync {
    async fn handle_stream(
        &self,
        ctx: &Context,
        stream: Box<dyn TransportStream>,
    ) -> Result<(), Status>;
}

/// The callable part of a routing entry
#[derive(Clone)]
pub enum HandlerSpec {
    Unary(Arc<dyn UnaryTransportHandler>),
    Oneway(Arc<dyn OnewayTransportHandler>),
    Stream(Arc<dyn StreamTransportHandler>),
}

impl HandlerSpec {
    pub fn rpc_type(&self) -> &'static str {
        match self {
            HandlerSpec::Unary(_) => "unary",
            HandlerSpec::Oneway(_) => "oneway",
            HandlerSpec::Stream(_) => "stream",
        }
    }

    pub fn unary(&self) -> Option<&Arc<dyn UnaryTransportHandler>> {
        match self {
            HandlerSpec::Unary(handler) => Some(handler),
            _ => None,
        }
    }

    pub fn oneway(&self) -> Option<&Arc<dyn OnewayTransportHandler>> {
        match self {
            HandlerSpec::Oneway(handler) => Some(handler),
            _ => None,
        }
    }

    pub fn stream(&self) -> Option<&Arc<dyn StreamTransportHandler>> {
        match self {
            HandlerSpec::Stream(handler) => Some(handler),
            _ => None,
        }
    }

    /// Whether both specs point at the very same handler
    pub fn ptr_eq(&self, other: &HandlerSpec) -> bool {
        match (self, other) {
            (HandlerSpec::Unary(a), HandlerSpec::Unary(b)) => {
                Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
            }
            (HandlerSpec::Oneway(a), HandlerSpec::Oneway(b)) => {
                Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
            }
            (HandlerSpec::Stream(a), HandlerSpec::Stream(b)) => {
                Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
            }
            _ => false,
        }
    }
}

impl fmt::Debug for HandlerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HandlerSpec::{}", self.rpc_type())
    }
}

/// A registered procedure
#[derive(Debug, Clone)]
pub struct Procedure {
    /// `Service::Method`
    pub name: String,
    pub service: String,
    pub handler: HandlerSpec,
    /// Human readable request/response shape
    pub signature: String,
}

impl Procedure {
    pub fn new(
        service: impl Into<String>,
        name: impl Into<String>,
        handler: HandlerSpec,
        signature: impl Into<String>,
    ) -> Self {
        Procedure {
            name: name.into(),
            service: service.into(),
            handler,
            signature: signature.into(),
        }
    }
}
