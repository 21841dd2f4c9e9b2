// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Codecs and the codec registry
//!
//! A [`Codec`] turns a [`Message`] into bytes and back for one encoding tag.
//! The [`CodecRegistry`] is built once at startup, with every codec and detail
//! type registered through `&mut self`, and then shared behind an `Arc`. After
//! that point lookups are plain map reads with no locking.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use thiserror::Error;

use crate::buffer::{BufferPool, PooledBuffer};
use crate::error::{Detail, RpcError, UndecodableDetail};
use crate::message::{Message, MessageError, RawMessage};

pub const PROTO_ENCODING: &str = "proto";
pub const JSON_ENCODING: &str = "json";
pub const RAW_ENCODING: &str = "raw";

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("unrecognized encoding: {0:?}")]
    UnrecognizedEncoding(String),
    #[error("codec {codec:?} cannot handle message of type {type_url}: not a message")]
    NotAMessage { codec: String, type_url: String },
    #[error("failed to marshal with {codec:?}: {source}")]
    Encode {
        codec: String,
        #[source]
        source: MessageError,
    },
    #[error("failed to unmarshal with {codec:?}: {source}")]
    Decode {
        codec: String,
        #[source]
        source: MessageError,
    },
}

impl CodecError {
    /// Both variants signal a negotiation bug rather than bad caller input
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            CodecError::UnrecognizedEncoding(_) | CodecError::NotAMessage { .. }
        )
    }

    /// Same classification as `From<CodecError> for RpcError`, with `context`
    /// prefixed to the message
    pub fn into_rpc_error(self, context: impl fmt::Display) -> RpcError {
        let message = format!("{context}: {self}");
        match self {
            CodecError::Decode { .. } => RpcError::invalid_argument(message),
            _ => RpcError::internal(message),
        }
    }
}

impl From<CodecError> for RpcError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Decode { .. } => RpcError::invalid_argument(err.to_string()),
            _ => RpcError::internal(err.to_string()),
        }
    }
}

/// Marshal and unmarshal messages for one encoding
pub trait Codec: Send + Sync {
    /// Encoding tag this codec is registered under
    fn name(&self) -> &str;

    fn marshal(&self, message: &dyn Message, buf: &mut BytesMut) -> Result<(), CodecError>;

    fn unmarshal(&self, data: &[u8], message: &mut dyn Message) -> Result<(), CodecError>;
}

fn not_a_message(codec: &str, message: &dyn Message) -> CodecError {
    CodecError::NotAMessage {
        codec: codec.to_string(),
        type_url: message.type_url(),
    }
}

fn is_raw(message: &dyn Message) -> bool {
    message.as_any().is::<RawMessage>()
}

/// Binary protocol buffers
#[derive(Debug, Default, Clone, Copy)]
pub struct ProtoCodec;

impl Codec for ProtoCodec {
    fn name(&self) -> &str {
        PROTO_ENCODING
    }

    fn marshal(&self, message: &dyn Message, buf: &mut BytesMut) -> Result<(), CodecError> {
        if is_raw(message) {
            return Err(not_a_message(self.name(), message));
        }
        message
            .encode_binary(buf)
            .map_err(|source| CodecError::Encode {
                codec: self.name().to_string(),
                source,
            })
    }

    fn unmarshal(&self, data: &[u8], message: &mut dyn Message) -> Result<(), CodecError> {
        if is_raw(message) {
            return Err(not_a_message(self.name(), message));
        }
        message
            .merge_binary(data)
            .map_err(|source| CodecError::Decode {
                codec: self.name().to_string(),
                source,
            })
    }
}

/// JSON mapping of protocol buffer messages
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn name(&self) -> &str {
        JSON_ENCODING
    }

    fn marshal(&self, message: &dyn Message, buf: &mut BytesMut) -> Result<(), CodecError> {
        if is_raw(message) {
            return Err(not_a_message(self.name(), message));
        }
        message.encode_json(buf).map_err(|source| CodecError::Encode {
            codec: self.name().to_string(),
            source,
        })
    }

    fn unmarshal(&self, data: &[u8], message: &mut dyn Message) -> Result<(), CodecError> {
        if is_raw(message) {
            return Err(not_a_message(self.name(), message));
        }
        message.merge_json(data).map_err(|source| CodecError::Decode {
            codec: self.name().to_string(),
            source,
        })
    }
}

/// Pass-through bytes, only accepts [`RawMessage`]
#[derive(Debug, Default, Clone, Copy)]
pub struct RawCodec;

impl Codec for RawCodec {
    fn name(&self) -> &str {
        RAW_ENCODING
    }

    fn marshal(&self, message: &dyn Message, buf: &mut BytesMut) -> Result<(), CodecError> {
        let raw = message
            .as_any()
            .downcast_ref::<RawMessage>()
            .ok_or_else(|| not_a_message(self.name(), message))?;
        buf.extend_from_slice(&raw.0);
        Ok(())
    }

    fn unmarshal(&self, data: &[u8], message: &mut dyn Message) -> Result<(), CodecError> {
        let type_url = message.type_url();
        let raw = message
            .as_any_mut()
            .downcast_mut::<RawMessage>()
            .ok_or_else(|| CodecError::NotAMessage {
                codec: RAW_ENCODING.to_string(),
                type_url,
            })?;
        raw.0 = Bytes::copy_from_slice(data);
        Ok(())
    }
}

type DetailFactory = Arc<dyn Fn() -> Box<dyn Message> + Send + Sync>;

/// Encoding name to codec map, plus the known error detail types
pub struct CodecRegistry {
    codecs: HashMap<String, Arc<dyn Codec>>,
    details: HashMap<String, DetailFactory>,
    pool: BufferPool,
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut encodings: Vec<_> = self.codecs.keys().collect();
        encodings.sort();
        let mut details: Vec<_> = self.details.keys().collect();
        details.sort();
        f.debug_struct("CodecRegistry")
            .field("encodings", &encodings)
            .field("details", &details)
            .field("pool", &self.pool)
            .finish()
    }
}

impl CodecRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::with_pool(BufferPool::default())
    }

    /// An empty registry marshalling into buffers taken from `pool`
    pub fn with_pool(pool: BufferPool) -> Self {
        CodecRegistry {
            codecs: HashMap::new(),
            details: HashMap::new(),
            pool,
        }
    }

    /// A registry with the `proto`, `json` and `raw` codecs
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_codec(Arc::new(ProtoCodec));
        registry.register_codec(Arc::new(JsonCodec));
        registry.register_codec(Arc::new(RawCodec));
        registry
    }

    /// Register a codec under its name, returning the one it replaced
    pub fn register_codec(&mut self, codec: Arc<dyn Codec>) -> Option<Arc<dyn Codec>> {
        let name = codec.name().to_string();
        tracing::debug!(encoding = %name, "registering codec");
        self.codecs.insert(name, codec)
    }

    /// Make `M` decodable when it shows up as an error detail
    pub fn register_detail<M: Message + Default>(&mut self) {
        let type_url = M::default().type_url();
        tracing::debug!(%type_url, "registering error detail type");
        self.details
            .insert(type_url, Arc::new(|| Box::new(M::default()) as Box<dyn Message>));
    }

    pub fn get_codec_for_encoding(&self, encoding: &str) -> Option<&Arc<dyn Codec>> {
        self.codecs.get(encoding)
    }

    /// Registered encoding tags, sorted
    pub fn encodings(&self) -> Vec<&str> {
        let mut encodings: Vec<&str> = self.codecs.keys().map(String::as_str).collect();
        encodings.sort_unstable();
        encodings
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    fn codec(&self, encoding: &str) -> Result<&Arc<dyn Codec>, CodecError> {
        self.codecs
            .get(encoding)
            .ok_or_else(|| CodecError::UnrecognizedEncoding(encoding.to_string()))
    }

    /// Marshal into a pooled buffer. The buffer is released when the returned
    /// guard is dropped; on error it has already gone back to the pool.
    pub fn marshal(
        &self,
        encoding: &str,
        message: &dyn Message,
    ) -> Result<PooledBuffer, CodecError> {
        let codec = self.codec(encoding)?;
        let mut buf = self.pool.acquire();
        codec.marshal(message, &mut buf)?;
        Ok(buf)
    }

    pub fn unmarshal(
        &self,
        encoding: &str,
        data: &[u8],
        message: &mut dyn Message,
    ) -> Result<(), CodecError> {
        self.codec(encoding)?.unmarshal(data, message)
    }

    /// Decode one error detail entry. Unknown types and decode failures give
    /// [`Detail::Undecodable`] holding the original bytes.
    pub fn decode_detail(&self, encoding: &str, type_url: &str, value: Bytes) -> Detail {
        let undecodable = |error: String| {
            Detail::Undecodable(UndecodableDetail {
                type_url: type_url.to_string(),
                value: value.clone(),
                error,
            })
        };

        let Some(factory) = self.details.get(type_url) else {
            return undecodable(format!("unknown detail type {type_url}"));
        };

        let mut message = factory();
        match self.unmarshal(encoding, &value, message.as_mut()) {
            Ok(()) => Detail::Message(Arc::from(message)),
            Err(err) => {
                tracing::debug!(
                    %type_url,
                    %encoding,
                    error = %err,
                    "failed to decode error detail"
                );
                undecodable(err.to_string())
            }
        }
    }
}
