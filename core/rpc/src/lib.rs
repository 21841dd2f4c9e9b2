// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Encoding-aware RPC middleware
//!
//! One logical request can be encoded with several codecs (`proto`, `json`,
//! `raw` or any registered one) and carried by any transport implementing the
//! outbound traits. Handlers return typed errors whose code, message and
//! details survive the trip to the caller.

pub mod body;
pub mod buffer;
pub mod client;
pub mod code;
pub mod codec;
pub mod context;
pub mod error;
pub mod errors;
pub mod handler;
pub mod headers;
pub mod message;
pub mod router;
pub mod status;
pub mod stream;
pub mod transport;
pub mod wire;

#[cfg(test)]
mod testutil;

pub use body::{Body, ReReader};
pub use buffer::{BufferPool, BufferPoolConfig, BufferPoolConfigError, PooledBuffer};
pub use client::{ClientConfig, OnewayClient, StreamClient, UnaryClient};
pub use code::{Code, GrpcCode, InvalidGrpcCode};
pub use codec::{
    Codec, CodecError, CodecRegistry, JSON_ENCODING, JsonCodec, PROTO_ENCODING, ProtoCodec,
    RAW_ENCODING, RawCodec,
};
pub use context::Context;
pub use error::{Detail, RpcError, UndecodableDetail, get_error_details, new_error};
pub use errors::{RegistrationError, RouteError};
pub use handler::{
    BoxError, OnewayAdapter, OnewayHandler, StreamAdapter, StreamHandler, UnaryAdapter,
    UnaryHandler, oneway_procedure, stream_procedure, unary_procedure,
};
pub use headers::Headers;
pub use message::{Message, MessageError, RawMessage};
pub use router::{ProcedureRouter, Router};
pub use status::Status;
pub use stream::MessageStream;
pub use transport::{
    Ack, ApplicationErrorMeta, HandlerSpec, OnewayOutbound, OnewayTransportHandler, Procedure,
    Request, RequestMeta, Response, ResponseRecorder, ResponseWriter, StreamMessage,
    StreamOutbound, StreamRequest, StreamTransportHandler, TransportStream, UnaryOutbound,
    UnaryTransportHandler,
};
pub use wire::{DetailEnvelope, StatusEnvelope, from_wire_status, to_wire_status};
