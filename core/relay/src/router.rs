// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Relay router
//!
//! Wraps a base router and adds three fallbacks, tried in this order when the
//! base router does not recognize the procedure: a handler registered for the
//! request service, then one registered for the request shard key, then the
//! default handler. Any other failure of the base router is returned as is.
//!
//! Registries are meant to be filled at startup. Registering a service or a
//! shard key twice is a configuration bug: the `register_*` methods panic and
//! the `try_register_*` methods return a [`RegistrationError`].

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use transit_rpc::{
    Context, HandlerSpec, Procedure, RegistrationError, RequestMeta, RouteError, Router,
};

use crate::metrics::{MetricsSink, NOT_FOUND_COUNTER, NoopMetrics, ROUTE_COUNTER};

/// Handler serving every procedure of a service
#[derive(Debug, Clone)]
pub struct ServiceHandler {
    pub service: String,
    pub handler: HandlerSpec,
}

impl ServiceHandler {
    pub fn new(service: impl Into<String>, handler: HandlerSpec) -> Self {
        ServiceHandler {
            service: service.into(),
            handler,
        }
    }
}

/// Handler serving every request carrying a shard key
#[derive(Debug, Clone)]
pub struct ShardHandler {
    pub shard_key: String,
    pub handler: HandlerSpec,
}

impl ShardHandler {
    pub fn new(shard_key: impl Into<String>, handler: HandlerSpec) -> Self {
        ShardHandler {
            shard_key: shard_key.into(),
            handler,
        }
    }
}

/// Which registry served a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Exact,
    Service,
    Shard,
    Default,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Exact => "exact",
            Route::Service => "service",
            Route::Shard => "shard",
            Route::Default => "default",
        }
    }
}

type Registry = RwLock<HashMap<String, HandlerSpec>>;

fn try_insert_all<I>(
    registry: &Registry,
    kind: &'static str,
    entries: I,
    duplicate: fn(String) -> RegistrationError,
) -> Result<(), RegistrationError>
where
    I: IntoIterator<Item = (String, HandlerSpec)>,
{
    let entries: Vec<(String, HandlerSpec)> = entries.into_iter().collect();
    let mut registry = registry.write();

    let mut batch = HashMap::with_capacity(entries.len());
    for (key, handler) in entries {
        if registry.contains_key(&key) || batch.contains_key(&key) {
            return Err(duplicate(key));
        }
        batch.insert(key, handler);
    }

    for (key, handler) in batch {
        tracing::debug!(%key, kind, rpc_type = handler.rpc_type(), "registering relay handler");
        registry.insert(key, handler);
    }
    Ok(())
}

pub struct RelayRouter {
    base: Arc<dyn Router>,
    by_service: Registry,
    by_shard_key: Registry,
    default_handler: RwLock<Option<HandlerSpec>>,
    metrics: Arc<dyn MetricsSink>,
}

impl std::fmt::Debug for RelayRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut services: Vec<String> = self.by_service.read().keys().cloned().collect();
        services.sort();
        let mut shard_keys: Vec<String> = self.by_shard_key.read().keys().cloned().collect();
        shard_keys.sort();
        f.debug_struct("RelayRouter")
            .field("services", &services)
            .field("shard_keys", &shard_keys)
            .field("default", &self.default_handler.read().is_some())
            .finish()
    }
}

impl RelayRouter {
    pub fn new(base: Arc<dyn Router>) -> Self {
        RelayRouter {
            base,
            by_service: RwLock::new(HashMap::new()),
            by_shard_key: RwLock::new(HashMap::new()),
            default_handler: RwLock::new(None),
            metrics: Arc::new(NoopMetrics),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Register service handlers. Nothing is registered if any service is
    /// already known or appears twice in `handlers`.
    pub fn try_register_service(
        &self,
        handlers: impl IntoIterator<Item = ServiceHandler>,
    ) -> Result<(), RegistrationError> {
        try_insert_all(
            &self.by_service,
            "service",
            handlers.into_iter().map(|h| (h.service, h.handler)),
            RegistrationError::DuplicateService,
        )
    }

    /// Register service handlers, panicking on a duplicate service
    pub fn register_service(&self, handlers: impl IntoIterator<Item = ServiceHandler>) {
        if let Err(err) = self.try_register_service(handlers) {
            panic!("{err}");
        }
    }

    /// Register shard handlers. Nothing is registered if any shard key is
    /// already known or appears twice in `handlers`.
    pub fn try_register_shard(
        &self,
        handlers: impl IntoIterator<Item = ShardHandler>,
    ) -> Result<(), RegistrationError> {
        try_insert_all(
            &self.by_shard_key,
            "shard",
            handlers.into_iter().map(|h| (h.shard_key, h.handler)),
            RegistrationError::DuplicateShardKey,
        )
    }

    /// Register shard handlers, panicking on a duplicate shard key
    pub fn register_shard(&self, handlers: impl IntoIterator<Item = ShardHandler>) {
        if let Err(err) = self.try_register_shard(handlers) {
            panic!("{err}");
        }
    }

    /// Set the handler used when nothing else matches. The last call wins.
    pub fn register_default(&self, handler: HandlerSpec) {
        if self.default_handler.write().replace(handler).is_some() {
            tracing::debug!("replacing relay default handler");
        }
    }

    /// Pick a handler and tell which registry it came from
    pub fn route(
        &self,
        ctx: &Context,
        meta: &RequestMeta,
    ) -> Result<(Route, HandlerSpec), RouteError> {
        let not_found = match self.base.choose(ctx, meta) {
            Ok(handler) => return Ok((Route::Exact, handler)),
            Err(err) if !err.is_unrecognized_procedure() => return Err(err),
            Err(err) => err,
        };

        if let Some(handler) = self.by_service.read().get(&meta.service) {
            return Ok((Route::Service, handler.clone()));
        }

        if let Some(handler) = self.by_shard_key.read().get(&meta.shard_key) {
            return Ok((Route::Shard, handler.clone()));
        }

        if let Some(handler) = self.default_handler.read().as_ref() {
            return Ok((Route::Default, handler.clone()));
        }

        Err(not_found)
    }
}

impl Router for RelayRouter {
    fn choose(&self, ctx: &Context, meta: &RequestMeta) -> Result<HandlerSpec, RouteError> {
        match self.route(ctx, meta) {
            Ok((route, handler)) => {
                if route != Route::Exact {
                    tracing::debug!(
                        route = route.as_str(),
                        service = %meta.service,
                        procedure = %meta.procedure,
                        shard_key = %meta.shard_key,
                        "relay fallback chosen"
                    );
                }
                self.metrics
                    .increment(ROUTE_COUNTER, &[("route", route.as_str())]);
                Ok(handler)
            }
            Err(err) => {
                if err.is_unrecognized_procedure() {
                    self.metrics.increment(NOT_FOUND_COUNTER, &[]);
                }
                Err(err)
            }
        }
    }

    fn procedures(&self) -> Vec<Procedure> {
        let mut procedures = self.base.procedures();

        let mut services: Vec<(String, HandlerSpec)> = self
            .by_service
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        services.sort_by(|a, b| a.0.cmp(&b.0));
        procedures.extend(services.into_iter().map(|(service, handler)| {
            let signature = format!("relay service {service}");
            Procedure::new(service, "*", handler, signature)
        }));

        let mut shards: Vec<(String, HandlerSpec)> = self
            .by_shard_key
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        shards.sort_by(|a, b| a.0.cmp(&b.0));
        procedures.extend(shards.into_iter().map(|(shard_key, handler)| {
            Procedure::new("*", "*", handler, format!("relay shard {shard_key}"))
        }));

        if let Some(handler) = self.default_handler.read().clone() {
            procedures.push(Procedure::new("*", "*", handler, "relay default"));
        }
        procedures
    }
}
