// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Transport boundary status
//!
//! [`Status`] is what crosses an outbound or a transport handler: a code, a
//! message and an optional blob holding the serialized status envelope. The
//! blob is produced and consumed by [`crate::wire`]; transports carry it as-is
//! (a trailer, a header, a frame) without looking inside.

use std::fmt;

use bytes::Bytes;

use crate::code::Code;

/// Wire-visible status with out-of-band details
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    code: Code,
    message: String,
    details: Option<Bytes>,
    application_error: bool,
}

impl Status {
    /// Create a new status
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            application_error: false,
        }
    }

    /// Create a success status
    pub fn ok() -> Self {
        Self::new(Code::Ok, "")
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(Code::Cancelled, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(Code::Unknown, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(Code::DeadlineExceeded, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Code::NotFound, message)
    }

    pub fn unimplemented(message: impl Into<String>) -> Self {
        Self::new(Code::Unimplemented, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Code::Internal, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(Code::Unavailable, message)
    }

    /// Attach the serialized status envelope
    pub fn with_details(mut self, details: impl Into<Bytes>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Mark the status as produced by a failed handler rather than by the
    /// transport
    pub fn with_application_error(mut self) -> Self {
        self.application_error = true;
        self
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Serialized status envelope, if any
    pub fn details(&self) -> Option<&Bytes> {
        self.details.as_ref()
    }

    pub fn is_application_error(&self) -> bool {
        self.application_error
    }

    pub fn is_ok(&self) -> bool {
        self.code.is_ok()
    }

    pub fn is_err(&self) -> bool {
        self.code.is_err()
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::ok()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "status code:{}", self.code)?;
        if !self.message.is_empty() {
            write!(f, " message:{}", self.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for Status {}

impl From<Code> for Status {
    fn from(code: Code) -> Self {
        Self::new(code, "")
    }
}
