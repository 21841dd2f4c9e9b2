// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Status codes
//!
//! Two code spaces live here: [`Code`] is the transport-agnostic taxonomy used
//! by [`RpcError`](crate::RpcError) and [`Status`](crate::Status), while
//! [`GrpcCode`] is the gRPC status code space used inside the serialized status
//! envelope. The two are linked by a closed, bidirectional table.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Outcome categories, independent of any wire format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Code {
    /// Success
    #[default]
    Ok,
    /// The operation was cancelled
    Cancelled,
    /// Unknown error
    Unknown,
    /// Client specified an invalid argument
    InvalidArgument,
    /// Deadline expired before operation could complete
    DeadlineExceeded,
    /// Some requested entity was not found
    NotFound,
    /// Some entity that we attempted to create already exists
    AlreadyExists,
    /// The caller does not have permission to execute the specified operation
    PermissionDenied,
    /// Some resource has been exhausted
    ResourceExhausted,
    /// The system is not in a state required for the operation's execution
    FailedPrecondition,
    /// The operation was aborted
    Aborted,
    /// Operation was attempted past the valid range
    OutOfRange,
    /// Operation is not implemented or not supported
    Unimplemented,
    /// Internal errors
    Internal,
    /// The service is currently unavailable
    Unavailable,
    /// Unrecoverable data loss or corruption
    DataLoss,
    /// The request does not have valid authentication credentials
    Unauthenticated,
}

/// gRPC status codes, as carried in the status envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum GrpcCode {
    Ok = 0,
    Cancelled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

/// The translation table. Every code appears exactly once on each side.
const CODE_TABLE: [(Code, GrpcCode); 17] = [
    (Code::Ok, GrpcCode::Ok),
    (Code::Cancelled, GrpcCode::Cancelled),
    (Code::Unknown, GrpcCode::Unknown),
    (Code::InvalidArgument, GrpcCode::InvalidArgument),
    (Code::DeadlineExceeded, GrpcCode::DeadlineExceeded),
    (Code::NotFound, GrpcCode::NotFound),
    (Code::AlreadyExists, GrpcCode::AlreadyExists),
    (Code::PermissionDenied, GrpcCode::PermissionDenied),
    (Code::ResourceExhausted, GrpcCode::ResourceExhausted),
    (Code::FailedPrecondition, GrpcCode::FailedPrecondition),
    (Code::Aborted, GrpcCode::Aborted),
    (Code::OutOfRange, GrpcCode::OutOfRange),
    (Code::Unimplemented, GrpcCode::Unimplemented),
    (Code::Internal, GrpcCode::Internal),
    (Code::Unavailable, GrpcCode::Unavailable),
    (Code::DataLoss, GrpcCode::DataLoss),
    (Code::Unauthenticated, GrpcCode::Unauthenticated),
];

impl Code {
    /// All codes, in table order
    pub fn all() -> impl Iterator<Item = Code> {
        CODE_TABLE.iter().map(|(code, _)| *code)
    }

    /// Returns true if this is a success code
    pub fn is_ok(&self) -> bool {
        matches!(self, Code::Ok)
    }

    /// Returns true if this is an error code
    pub fn is_err(&self) -> bool {
        !self.is_ok()
    }

    /// Translate into the gRPC code space
    pub fn to_grpc(self) -> GrpcCode {
        CODE_TABLE
            .iter()
            .find(|(code, _)| *code == self)
            .map(|(_, grpc)| *grpc)
            .unwrap_or(GrpcCode::Unknown)
    }

    /// Get the string representation of this code
    pub fn as_str(&self) -> &'static str {
        match self {
            Code::Ok => "ok",
            Code::Cancelled => "cancelled",
            Code::Unknown => "unknown",
            Code::InvalidArgument => "invalid-argument",
            Code::DeadlineExceeded => "deadline-exceeded",
            Code::NotFound => "not-found",
            Code::AlreadyExists => "already-exists",
            Code::PermissionDenied => "permission-denied",
            Code::ResourceExhausted => "resource-exhausted",
            Code::FailedPrecondition => "failed-precondition",
            Code::Aborted => "aborted",
            Code::OutOfRange => "out-of-range",
            Code::Unimplemented => "unimplemented",
            Code::Internal => "internal",
            Code::Unavailable => "unavailable",
            Code::DataLoss => "data-loss",
            Code::Unauthenticated => "unauthenticated",
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown code name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown code name: {0:?}")]
pub struct UnknownCodeName(pub String);

impl FromStr for Code {
    type Err = UnknownCodeName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Code::all()
            .find(|code| code.as_str() == s)
            .ok_or_else(|| UnknownCodeName(s.to_string()))
    }
}

impl GrpcCode {
    /// Translate back into the transport-agnostic code space
    pub fn to_code(self) -> Code {
        CODE_TABLE
            .iter()
            .find(|(_, grpc)| *grpc == self)
            .map(|(code, _)| *code)
            .unwrap_or(Code::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GrpcCode::Ok => "OK",
            GrpcCode::Cancelled => "CANCELLED",
            GrpcCode::Unknown => "UNKNOWN",
            GrpcCode::InvalidArgument => "INVALID_ARGUMENT",
            GrpcCode::DeadlineExceeded => "DEADLINE_EXCEEDED",
            GrpcCode::NotFound => "NOT_FOUND",
            GrpcCode::AlreadyExists => "ALREADY_EXISTS",
            GrpcCode::PermissionDenied => "PERMISSION_DENIED",
            GrpcCode::ResourceExhausted => "RESOURCE_EXHAUSTED",
            GrpcCode::FailedPrecondition => "FAILED_PRECONDITION",
            GrpcCode::Aborted => "ABORTED",
            GrpcCode::OutOfRange => "OUT_OF_RANGE",
            GrpcCode::Unimplemented => "UNIMPLEMENTED",
            GrpcCode::Internal => "INTERNAL",
            GrpcCode::Unavailable => "UNAVAILABLE",
            GrpcCode::DataLoss => "DATA_LOSS",
            GrpcCode::Unauthenticated => "UNAUTHENTICATED",
        }
    }
}

impl fmt::Display for GrpcCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<GrpcCode> for i32 {
    fn from(code: GrpcCode) -> i32 {
        code as i32
    }
}

/// Error returned when trying to convert an invalid i32 to GrpcCode
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid status code: {0}")]
pub struct InvalidGrpcCode(pub i32);

impl TryFrom<i32> for GrpcCode {
    type Error = InvalidGrpcCode;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        CODE_TABLE
            .iter()
            .map(|(_, grpc)| *grpc)
            .find(|grpc| *grpc as i32 == value)
            .ok_or(InvalidGrpcCode(value))
    }
}

impl From<Code> for GrpcCode {
    fn from(code: Code) -> Self {
        code.to_grpc()
    }
}

impl From<GrpcCode> for Code {
    fn from(code: GrpcCode) -> Self {
        code.to_code()
    }
}
