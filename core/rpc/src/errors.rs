// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

use crate::error::RpcError;

/// Conflicting entries found while registering handlers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("procedure {procedure:?} of service {service:?} is already registered")]
    DuplicateProcedure { service: String, procedure: String },
    #[error("a handler for service {0:?} is already registered")]
    DuplicateService(String),
    #[error("a handler for shard key {0:?} is already registered")]
    DuplicateShardKey(String),
}

/// Failure to pick a handler for a request
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RouteError {
    #[error("unrecognized procedure {procedure:?} for service {service:?}")]
    UnrecognizedProcedure { service: String, procedure: String },
    #[error(transparent)]
    Rpc(#[from] RpcError),
}

impl RouteError {
    pub fn unrecognized_procedure(
        service: impl Into<String>,
        procedure: impl Into<String>,
    ) -> Self {
        RouteError::UnrecognizedProcedure {
            service: service.into(),
            procedure: procedure.into(),
        }
    }

    pub fn is_unrecognized_procedure(&self) -> bool {
        matches!(self, RouteError::UnrecognizedProcedure { .. })
    }
}

impl From<RouteError> for RpcError {
    fn from(err: RouteError) -> Self {
        match err {
            RouteError::UnrecognizedProcedure { .. } => RpcError::unimplemented(err.to_string()),
            RouteError::Rpc(err) => err,
        }
    }
}
