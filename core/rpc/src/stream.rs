// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Typed message framing over a transport stream
//!
//! One message is one frame. Sent messages are marshalled into pooled buffers
//! that travel inside the frame body and go back to the pool once the peer
//! has read them. Received frames are read and closed before decoding.

use std::sync::Arc;

use crate::body::Body;
use crate::codec::CodecRegistry;
use crate::context::Context;
use crate::error::RpcError;
use crate::message::Message;
use crate::status::Status;
use crate::transport::{StreamMessage, StreamRequest, TransportStream};
use crate::wire::from_wire_status;

/// Typed view of a [`TransportStream`] for one encoding
pub struct MessageStream {
    stream: Box<dyn TransportStream>,
    registry: Arc<CodecRegistry>,
    encoding: String,
}

impl std::fmt::Debug for MessageStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageStream")
            .field("request", self.stream.request())
            .field("encoding", &self.encoding)
            .finish()
    }
}

impl MessageStream {
    pub fn new(
        stream: Box<dyn TransportStream>,
        registry: Arc<CodecRegistry>,
        encoding: impl Into<String>,
    ) -> Self {
        MessageStream {
            stream,
            registry,
            encoding: encoding.into(),
        }
    }

    pub fn request(&self) -> &StreamRequest {
        self.stream.request()
    }

    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    fn status_error(&self, status: &Status) -> RpcError {
        from_wire_status(&self.registry, &self.encoding, status)
    }

    /// Send one message as one frame
    pub async fn send<M: Message>(&self, ctx: &Context, message: &M) -> Result<(), RpcError> {
        let buf = self.registry.marshal(&self.encoding, message)?;
        let frame = StreamMessage::new(Body::Pooled(buf));
        ctx.run(self.stream.send_message(ctx, frame))
            .await?
            .map_err(|status| self.status_error(&status))
    }

    /// Receive the next message, `Ok(None)` once the peer is done sending
    pub async fn receive<M: Message + Default>(
        &self,
        ctx: &Context,
    ) -> Result<Option<M>, RpcError> {
        let frame = match ctx.run(self.stream.receive_message(ctx)).await? {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(None),
            Err(status) => {
                tracing::debug!(
                    procedure = %self.request().meta.procedure,
                    %status,
                    "stream receive failed"
                );
                return Err(self.status_error(&status));
            }
        };

        let data = frame.body.read_all(ctx).await?;
        let mut message = M::default();
        self.registry
            .unmarshal(&self.encoding, &data, &mut message)
            .map_err(|err| {
                err.into_rpc_error(format_args!(
                    "failed to decode {:?} stream message for procedure {:?}",
                    self.encoding,
                    self.request().meta.procedure
                ))
            })?;
        Ok(Some(message))
    }

    /// Signal that no more messages will be sent
    pub async fn close_send(&self, ctx: &Context) -> Result<(), RpcError> {
        ctx.run(self.stream.close_send(ctx))
            .await?
            .map_err(|status| self.status_error(&status))
    }

    pub fn into_inner(self) -> Box<dyn TransportStream> {
        self.stream
    }
}
