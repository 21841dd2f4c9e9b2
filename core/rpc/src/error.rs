// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Typed application errors
//!
//! [`RpcError`] is the error value business handlers return and clients
//! receive: a non-OK [`Code`], a message and an ordered list of typed
//! [`Detail`]s. An `RpcError` with code OK cannot be built through the public
//! constructors: [`RpcError::new`] and [`new_error`] return `None` instead.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use crate::code::Code;
use crate::message::{Message, short_name};

/// Payload of a detail entry that could not be decoded on the receiving side.
///
/// The original bytes are kept so the entry can be forwarded verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndecodableDetail {
    pub type_url: String,
    pub value: Bytes,
    pub error: String,
}

impl fmt::Display for UndecodableDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to decode {}, underlying error: {}",
            short_name(&self.type_url),
            self.error
        )
    }
}

/// A structured payload attached to an [`RpcError`]
#[derive(Debug, Clone)]
pub enum Detail {
    Message(Arc<dyn Message>),
    Undecodable(UndecodableDetail),
}

impl Detail {
    pub fn new<M: Message>(message: M) -> Self {
        Detail::Message(Arc::new(message))
    }

    pub fn type_url(&self) -> String {
        match self {
            Detail::Message(message) => message.type_url(),
            Detail::Undecodable(undecodable) => undecodable.type_url.clone(),
        }
    }

    /// Message name without its namespace, e.g. `FieldViolation`
    pub fn name(&self) -> String {
        short_name(&self.type_url()).to_string()
    }

    pub fn downcast_ref<M: Message>(&self) -> Option<&M> {
        match self {
            Detail::Message(message) => message.as_any().downcast_ref::<M>(),
            Detail::Undecodable(_) => None,
        }
    }

    pub fn is_undecodable(&self) -> bool {
        matches!(self, Detail::Undecodable(_))
    }

    /// Human readable rendering, used for logs and application error metadata
    pub fn render(&self) -> String {
        match self {
            Detail::Message(message) => {
                let mut buf = BytesMut::new();
                match message.encode_json(&mut buf) {
                    Ok(()) => format!("{}{}", self.name(), String::from_utf8_lossy(&buf)),
                    Err(_) => format!("{}{{{:?}}}", self.name(), message),
                }
            }
            Detail::Undecodable(undecodable) => undecodable.to_string(),
        }
    }

    fn binary(message: &dyn Message) -> Option<BytesMut> {
        let mut buf = BytesMut::new();
        message.encode_binary(&mut buf).ok().map(|_| buf)
    }
}

impl PartialEq for Detail {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Detail::Message(a), Detail::Message(b)) => {
                a.type_url() == b.type_url()
                    && match (Self::binary(a.as_ref()), Self::binary(b.as_ref())) {
                        (Some(a), Some(b)) => a == b,
                        _ => false,
                    }
            }
            (Detail::Undecodable(a), Detail::Undecodable(b)) => a == b,
            _ => false,
        }
    }
}

/// Application level error with code, message and typed details
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("code:{code} message:{message}")]
pub struct RpcError {
    code: Code,
    message: String,
    details: Vec<Detail>,
}

impl RpcError {
    /// Create a new error. Returns `None` when `code` is [`Code::Ok`].
    pub fn new(code: Code, message: impl Into<String>) -> Option<Self> {
        code.is_err().then(|| Self::of(code, message))
    }

    fn of(code: Code, message: impl Into<String>) -> Self {
        debug_assert!(code.is_err());
        Self {
            code,
            message: message.into(),
            details: Vec::new(),
        }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::of(Code::Cancelled, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::of(Code::Unknown, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::of(Code::InvalidArgument, message)
    }

    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::of(Code::DeadlineExceeded, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::of(Code::NotFound, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::of(Code::AlreadyExists, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::of(Code::PermissionDenied, message)
    }

    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        Self::of(Code::ResourceExhausted, message)
    }

    pub fn failed_precondition(message: impl Into<String>) -> Self {
        Self::of(Code::FailedPrecondition, message)
    }

    pub fn aborted(message: impl Into<String>) -> Self {
        Self::of(Code::Aborted, message)
    }

    pub fn out_of_range(message: impl Into<String>) -> Self {
        Self::of(Code::OutOfRange, message)
    }

    pub fn unimplemented(message: impl Into<String>) -> Self {
        Self::of(Code::Unimplemented, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::of(Code::Internal, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::of(Code::Unavailable, message)
    }

    pub fn data_loss(message: impl Into<String>) -> Self {
        Self::of(Code::DataLoss, message)
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::of(Code::Unauthenticated, message)
    }

    /// Append a detail
    pub fn with_detail(mut self, detail: Detail) -> Self {
        self.details.push(detail);
        self
    }

    /// Append several details, keeping their order
    pub fn with_details(mut self, details: impl IntoIterator<Item = Detail>) -> Self {
        self.details.extend(details);
        self
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> &[Detail] {
        &self.details
    }

    pub fn into_parts(self) -> (Code, String, Vec<Detail>) {
        (self.code, self.message, self.details)
    }

    /// Find the first `RpcError` in an error chain
    pub fn find<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a RpcError> {
        let mut current = Some(err);
        while let Some(err) = current {
            if let Some(rpc) = err.downcast_ref::<RpcError>() {
                return Some(rpc);
            }
            current = err.source();
        }
        None
    }

    /// Convert any error into an `RpcError`, keeping code, message and details
    /// of a wrapped `RpcError` and falling back to [`Code::Unknown`].
    pub fn from_error(err: &(dyn StdError + 'static)) -> RpcError {
        match Self::find(err) {
            Some(rpc) => rpc.clone(),
            None => RpcError::unknown(err.to_string()),
        }
    }
}

/// Build an error with details. Returns `None` when `code` is [`Code::Ok`],
/// whatever the message and details are.
pub fn new_error(
    code: Code,
    message: impl Into<String>,
    details: impl IntoIterator<Item = Detail>,
) -> Option<RpcError> {
    RpcError::new(code, message).map(|err| err.with_details(details))
}

/// Details of the first [`RpcError`] found in the error chain.
///
/// Returns an empty slice when the chain holds no `RpcError`.
pub fn get_error_details<'a>(err: &'a (dyn StdError + 'static)) -> &'a [Detail] {
    RpcError::find(err).map(RpcError::details).unwrap_or(&[])
}
