// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Message abstraction shared by every codec
//!
//! Codecs operate on `&dyn Message`, so a single registry can hold codecs for
//! several wire formats. Any prost message that also implements
//! `serde::{Serialize, Deserialize}` and `prost::Name` is a [`Message`]
//! through the blanket implementation below.

use std::any::Any;
use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use prost::Message as ProstMessage;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Errors produced while serializing a single message
#[derive(Error, Debug)]
pub enum MessageError {
    #[error("binary encode error: {0}")]
    Encode(#[from] prost::EncodeError),
    #[error("binary decode error: {0}")]
    Decode(#[from] prost::DecodeError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Unsupported(&'static str),
}

/// A value that can be carried in a request, response, stream frame or error detail
pub trait Message: Any + Send + Sync + fmt::Debug {
    /// Type identifier of the message, as produced by `prost::Name::type_url`
    fn type_url(&self) -> String;

    /// Append the binary (protobuf) form of the message to `buf`
    fn encode_binary(&self, buf: &mut BytesMut) -> Result<(), MessageError>;

    /// Replace the content of the message with the decoded binary form
    fn merge_binary(&mut self, data: &[u8]) -> Result<(), MessageError>;

    /// Append the JSON form of the message to `buf`
    fn encode_json(&self, buf: &mut BytesMut) -> Result<(), MessageError>;

    /// Replace the content of the message with the decoded JSON form
    fn merge_json(&mut self, data: &[u8]) -> Result<(), MessageError>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T> Message for T
where
    T: ProstMessage + prost::Name + Serialize + DeserializeOwned + Default + 'static,
{
    fn type_url(&self) -> String {
        T::type_url()
    }

    fn encode_binary(&self, buf: &mut BytesMut) -> Result<(), MessageError> {
        buf.reserve(self.encoded_len());
        ProstMessage::encode(self, buf)?;
        Ok(())
    }

    fn merge_binary(&mut self, data: &[u8]) -> Result<(), MessageError> {
        self.clear();
        ProstMessage::merge(self, data)?;
        Ok(())
    }

    fn encode_json(&self, buf: &mut BytesMut) -> Result<(), MessageError> {
        serde_json::to_writer(BufMut::writer(&mut *buf), self)?;
        Ok(())
    }

    fn merge_json(&mut self, data: &[u8]) -> Result<(), MessageError> {
        *self = serde_json::from_slice(data)?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Opaque bytes, used by the `raw` encoding
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawMessage(pub Bytes);

pub const RAW_TYPE_URL: &str = "type.googleapis.com/transit.Raw";

impl RawMessage {
    pub fn new(data: impl Into<Bytes>) -> Self {
        RawMessage(data.into())
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl Message for RawMessage {
    fn type_url(&self) -> String {
        RAW_TYPE_URL.to_string()
    }

    fn encode_binary(&self, buf: &mut BytesMut) -> Result<(), MessageError> {
        buf.put_slice(&self.0);
        Ok(())
    }

    fn merge_binary(&mut self, data: &[u8]) -> Result<(), MessageError> {
        self.0 = Bytes::copy_from_slice(data);
        Ok(())
    }

    fn encode_json(&self, _buf: &mut BytesMut) -> Result<(), MessageError> {
        Err(MessageError::Unsupported("raw messages have no JSON form"))
    }

    fn merge_json(&mut self, _data: &[u8]) -> Result<(), MessageError> {
        Err(MessageError::Unsupported("raw messages have no JSON form"))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Strip the type URL prefix and the package from a message name:
/// `type.googleapis.com/foo.bar.Baz` becomes `Baz`.
pub fn short_name(type_url: &str) -> &str {
    let full = type_url.rsplit('/').next().unwrap_or(type_url);
    full.rsplit('.').next().unwrap_or(full)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_name() {
        assert_eq!(short_name("type.googleapis.com/foo.bar.Baz"), "Baz");
        assert_eq!(short_name("foo.Baz"), "Baz");
        assert_eq!(short_name("Baz"), "Baz");
    }

    #[test]
    fn test_raw_message() {
        let msg = RawMessage::new(vec![1, 2, 3]);
        let mut buf = BytesMut::new();
        msg.encode_binary(&mut buf).unwrap();
        assert_eq!(&buf[..], &[1, 2, 3]);

        let mut decoded = RawMessage::default();
        decoded.merge_binary(&buf).unwrap();
        assert_eq!(decoded, msg);

        assert!(matches!(
            msg.encode_json(&mut buf),
            Err(MessageError::Unsupported(_))
        ));
    }
}
