// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Exact procedure routing
//!
//! [`ProcedureRouter`] is the base router: it maps a `(service, procedure)`
//! pair to the handler registered for it and reports anything else as an
//! unrecognized procedure. Registration takes the write lock once per batch;
//! lookups only take the read lock.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::context::Context;
use crate::errors::{RegistrationError, RouteError};
use crate::transport::{HandlerSpec, Procedure, RequestMeta};

/// Picks the handler serving a request
pub trait Router: Send + Sync {
    fn choose(&self, ctx: &Context, meta: &RequestMeta) -> Result<HandlerSpec, RouteError>;

    /// Every procedure known to this router
    fn procedures(&self) -> Vec<Procedure>;
}

/// Router keyed by service and procedure name
#[derive(Default)]
pub struct ProcedureRouter {
    procedures: RwLock<HashMap<(String, String), Procedure>>,
}

impl std::fmt::Debug for ProcedureRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let procedures = self.procedures.read();
        let mut keys: Vec<_> = procedures.keys().collect();
        keys.sort();
        f.debug_struct("ProcedureRouter")
            .field("procedures", &keys)
            .finish()
    }
}

impl ProcedureRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a batch of procedures. Nothing is registered if any of them
    /// conflicts with an existing entry or with another one of the batch.
    pub fn try_register(
        &self,
        procedures: impl IntoIterator<Item = Procedure>,
    ) -> Result<(), RegistrationError> {
        let procedures: Vec<Procedure> = procedures.into_iter().collect();
        let mut registry = self.procedures.write();

        let mut batch = HashMap::with_capacity(procedures.len());
        for procedure in procedures {
            let key = (procedure.service.clone(), procedure.name.clone());
            if registry.contains_key(&key) || batch.contains_key(&key) {
                return Err(RegistrationError::DuplicateProcedure {
                    service: key.0,
                    procedure: key.1,
                });
            }
            batch.insert(key, procedure);
        }

        for (key, procedure) in batch {
            tracing::debug!(
                service = %key.0,
                procedure = %key.1,
                rpc_type = procedure.handler.rpc_type(),
                "registering procedure"
            );
            registry.insert(key, procedure);
        }
        Ok(())
    }

    /// Like [`ProcedureRouter::try_register`], panicking on conflicts
    pub fn register(&self, procedures: impl IntoIterator<Item = Procedure>) {
        if let Err(err) = self.try_register(procedures) {
            panic!("{err}");
        }
    }
}

impl Router for ProcedureRouter {
    fn choose(&self, _ctx: &Context, meta: &RequestMeta) -> Result<HandlerSpec, RouteError> {
        self.procedures
            .read()
            .get(&(meta.service.clone(), meta.procedure.clone()))
            .map(|procedure| procedure.handler.clone())
            .ok_or_else(|| RouteError::unrecognized_procedure(&meta.service, &meta.procedure))
    }

    fn procedures(&self) -> Vec<Procedure> {
        let mut procedures: Vec<Procedure> = self.procedures.read().values().cloned().collect();
        procedures.sort_by(|a, b| (&a.service, &a.name).cmp(&(&b.service, &b.name)));
        procedures
    }
}
