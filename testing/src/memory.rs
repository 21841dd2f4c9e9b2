// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! In-memory transports
//!
//! [`MemoryOutbound`] dispatches calls straight into the handlers chosen by a
//! router. [`RecordingOutbound`] stands in for a remote peer: it keeps every
//! request it receives and answers with a canned reply.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use transit_rpc::{
    Ack, Body, Code, Context, Headers, OnewayOutbound, Request, RequestMeta, Response,
    ResponseRecorder, RouteError, Router, RpcError, Status, StreamMessage, StreamOutbound,
    StreamRequest, TransportStream, UnaryOutbound,
};

type Frame = Result<StreamMessage, Status>;

const STREAM_BUFFER: usize = 16;

/// One end of an in-memory duplex stream
pub struct MemoryStream {
    request: StreamRequest,
    tx: Mutex<Option<mpsc::Sender<Frame>>>,
    rx: tokio::sync::Mutex<mpsc::Receiver<Frame>>,
}

impl MemoryStream {
    /// Two connected ends: whatever one sends, the other receives
    pub fn pair(request: StreamRequest) -> (MemoryStream, MemoryStream) {
        let (client, server, _) = Self::connected(request);
        (client, server)
    }

    /// Like [`MemoryStream::pair`], also returning an extra sender feeding the
    /// first end. The first end sees the end of the stream only once both the
    /// second end and this sender are gone.
    fn connected(request: StreamRequest) -> (MemoryStream, MemoryStream, mpsc::Sender<Frame>) {
        let (to_server, from_client) = mpsc::channel(STREAM_BUFFER);
        let (to_client, from_server) = mpsc::channel(STREAM_BUFFER);

        let client = MemoryStream {
            request: request.clone(),
            tx: Mutex::new(Some(to_server)),
            rx: tokio::sync::Mutex::new(from_server),
        };
        let server = MemoryStream {
            request,
            tx: Mutex::new(Some(to_client.clone())),
            rx: tokio::sync::Mutex::new(from_client),
        };
        (client, server, to_client)
    }
}

#[async_trait]
impl TransportStream for MemoryStream {
    fn request(&self) -> &StreamRequest {
        &self.request
    }

    async fn send_message(&self, _ctx: &Context, message: StreamMessage) -> Result<(), Status> {
        let tx = self.tx.lock().clone().ok_or_else(|| {
            Status::new(Code::FailedPrecondition, "send side of the stream is closed")
        })?;
        tx.send(Ok(message))
            .await
            .map_err(|_| Status::unavailable("stream peer is gone"))
    }

    async fn receive_message(&self, _ctx: &Context) -> Result<Option<StreamMessage>, Status> {
        match self.rx.lock().await.recv().await {
            Some(Ok(message)) => Ok(Some(message)),
            Some(Err(status)) => Err(status),
            None => Ok(None),
        }
    }

    async fn close_send(&self, _ctx: &Context) -> Result<(), Status> {
        self.tx.lock().take();
        Ok(())
    }
}

fn route_status(err: RouteError) -> Status {
    let err = RpcError::from(err);
    Status::new(err.code(), err.message())
}

/// Outbound delivering every call to the handler its router picks
#[derive(Clone)]
pub struct MemoryOutbound {
    router: Arc<dyn Router>,
}

impl MemoryOutbound {
    pub fn new(router: Arc<dyn Router>) -> Self {
        MemoryOutbound { router }
    }
}

#[async_trait]
impl UnaryOutbound for MemoryOutbound {
    async fn call(&self, ctx: &Context, request: Request) -> Result<Response, Status> {
        let spec = self
            .router
            .choose(ctx, &request.meta)
            .map_err(route_status)?;
        let handler = spec.unary().cloned().ok_or_else(|| {
            Status::unimplemented(format!(
                "procedure {:?} is not a unary procedure",
                request.meta.procedure
            ))
        })?;

        let mut recorder = ResponseRecorder::new();
        match handler.handle(ctx, request, &mut recorder).await {
            Ok(()) => Ok(recorder.into_response()),
            Err(status) if recorder.is_application_error() => {
                Err(status.with_application_error())
            }
            Err(status) => Err(status),
        }
    }
}

#[async_trait]
impl OnewayOutbound for MemoryOutbound {
    async fn call_oneway(&self, ctx: &Context, request: Request) -> Result<Ack, Status> {
        let spec = self
            .router
            .choose(ctx, &request.meta)
            .map_err(route_status)?;
        let handler = spec.oneway().cloned().ok_or_else(|| {
            Status::unimplemented(format!(
                "procedure {:?} is not a oneway procedure",
                request.meta.procedure
            ))
        })?;

        handler.handle_oneway(ctx, request).await?;
        Ok(Ack)
    }
}

#[async_trait]
impl StreamOutbound for MemoryOutbound {
    async fn call_stream(
        &self,
        ctx: &Context,
        request: StreamRequest,
    ) -> Result<Box<dyn TransportStream>, Status> {
        let spec = self
            .router
            .choose(ctx, &request.meta)
            .map_err(route_status)?;
        let handler = spec.stream().cloned().ok_or_else(|| {
            Status::unimplemented(format!(
                "procedure {:?} is not a stream procedure",
                request.meta.procedure
            ))
        })?;

        let (client, server, to_client) = MemoryStream::connected(request);
        let ctx = ctx.child();
        tokio::spawn(async move {
            if let Err(status) = handler.handle_stream(&ctx, Box::new(server)).await {
                tracing::debug!(%status, "stream handler failed");
                // the client may be gone already
                let _ = to_client.send(Err(status)).await;
            }
        });

        Ok(Box::new(client))
    }
}

/// A request as seen by a [`RecordingOutbound`]
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub meta: RequestMeta,
    pub body: Bytes,
}

#[derive(Debug, Clone)]
enum Reply {
    Respond { body: Bytes, application_error: bool },
    Fail(Status),
}

/// Outbound recording every request and answering with a canned reply
#[derive(Debug)]
pub struct RecordingOutbound {
    calls: Mutex<Vec<RecordedCall>>,
    reply: Reply,
}

impl Default for RecordingOutbound {
    fn default() -> Self {
        Self::responding(Bytes::new())
    }
}

impl RecordingOutbound {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every call with `body`
    pub fn responding(body: impl Into<Bytes>) -> Self {
        RecordingOutbound {
            calls: Mutex::new(Vec::new()),
            reply: Reply::Respond {
                body: body.into(),
                application_error: false,
            },
        }
    }

    /// Fail every call with `status`
    pub fn failing(status: Status) -> Self {
        RecordingOutbound {
            calls: Mutex::new(Vec::new()),
            reply: Reply::Fail(status),
        }
    }

    /// Flag successful responses as application errors
    pub fn with_application_error(mut self) -> Self {
        if let Reply::Respond {
            application_error, ..
        } = &mut self.reply
        {
            *application_error = true;
        }
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    async fn record(&self, ctx: &Context, request: Request) -> Result<Reply, Status> {
        let body = request
            .body
            .read_all(ctx)
            .await
            .map_err(|err| Status::new(err.code(), err.message()))?;
        self.calls.lock().push(RecordedCall {
            meta: request.meta,
            body,
        });
        Ok(self.reply.clone())
    }
}

#[async_trait]
impl UnaryOutbound for RecordingOutbound {
    async fn call(&self, ctx: &Context, request: Request) -> Result<Response, Status> {
        match self.record(ctx, request).await? {
            Reply::Respond {
                body,
                application_error,
            } => Ok(Response {
                headers: Headers::new().with("x-recorded", "true"),
                body: Body::Bytes(body),
                application_error,
                application_error_meta: None,
            }),
            Reply::Fail(status) => Err(status),
        }
    }
}

#[async_trait]
impl OnewayOutbound for RecordingOutbound {
    async fn call_oneway(&self, ctx: &Context, request: Request) -> Result<Ack, Status> {
        match self.record(ctx, request).await? {
            Reply::Respond { .. } => Ok(Ack),
            Reply::Fail(status) => Err(status),
        }
    }
}
