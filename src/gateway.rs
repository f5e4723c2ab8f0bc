//! Gateway builder and main orchestration: wires a compiled [`Blueprint`]
//! to an [`Upstream`] HTTP client, an optional process-wide [`HttpCache`],
//! middlewares, and the in-memory schema [`Registry`], then exposes the
//! result as an `axum` [`Router`] (spec §6 "External interfaces").

use crate::blueprint::{Blueprint, Digest};
use crate::config::Config;
use crate::dataloader::{ReqwestUpstream, Upstream};
use crate::error::{Error, Result};
use crate::http_cache::HttpCache;
use crate::middleware::Middleware;
use crate::registry::Registry;
use crate::runtime::ServeMux;
use axum::Router;
use std::sync::Arc;
use std::time::Duration;

/// Main Gateway struct: entry point for the library.
pub struct Gateway {
    mux: ServeMux,
    registry: Registry,
    digest: Digest,
}

impl Gateway {
    /// Start building a gateway from a [`Config`] (JSON/YAML/SDL already
    /// decoded into the structural form).
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }

    /// Content digest of the blueprint this gateway is serving.
    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    /// Access the schema registry backing `/graphql/{digest}` and the admin
    /// routes.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Convert gateway into an Axum router.
    pub fn into_router(self) -> Router {
        self.mux.into_router()
    }
}

/// Builder for creating a [`Gateway`].
pub struct GatewayBuilder {
    blueprint: Option<Blueprint>,
    upstream: Option<Arc<dyn Upstream>>,
    http_cache: Option<Arc<HttpCache>>,
    middlewares: Vec<Arc<dyn Middleware>>,
    registry: Registry,
}

impl GatewayBuilder {
    pub fn new() -> Self {
        Self {
            blueprint: None,
            upstream: None,
            http_cache: None,
            middlewares: Vec::new(),
            registry: Registry::new(),
        }
    }

    /// Provide a config document (already decoded from JSON/YAML/SDL) to
    /// compile into this gateway's [`Blueprint`].
    pub fn with_config(mut self, config: &Config) -> Result<Self> {
        self.blueprint = Some(config.compile()?);
        Ok(self)
    }

    /// Provide an already-compiled blueprint directly.
    pub fn with_blueprint(mut self, blueprint: Blueprint) -> Self {
        self.blueprint = Some(blueprint);
        self
    }

    /// Override the upstream HTTP client (tests substitute a mock here;
    /// production defaults to [`ReqwestUpstream`]).
    pub fn with_upstream(mut self, upstream: Arc<dyn Upstream>) -> Self {
        self.upstream = Some(upstream);
        self
    }

    /// Reuse an existing registry instead of starting from an empty one
    /// (so several gateways, or the CLI's `start`/`publish` commands, can
    /// share one process-wide map of published digests).
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    /// Add middleware to the request pipeline. Middlewares run in the order
    /// they're added, before the GraphQL document is executed.
    pub fn add_middleware<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    /// Build the gateway: publish the compiled blueprint into the registry,
    /// wire up the process-wide HTTP cache if `@upstream(httpCache: true)`
    /// was set, and assemble the `ServeMux`.
    pub fn build(self) -> Result<Gateway> {
        let blueprint = self
            .blueprint
            .ok_or_else(|| Error::Config("gateway builder requires a blueprint or config".to_string()))?;

        let http_cache = if blueprint.upstream.http_cache {
            Some(self.http_cache.unwrap_or_default())
        } else {
            None
        };

        let upstream = self.upstream.unwrap_or_else(|| Arc::new(ReqwestUpstream::new()) as Arc<dyn Upstream>);

        let digest = self.registry.publish(blueprint.clone());

        let mut middlewares = self.middlewares;
        if blueprint.requires_auth() {
            middlewares.push(Arc::new(crate::middleware::RequireAuthMiddleware));
        }

        let timeout = blueprint.server.timeout_ms.map(Duration::from_millis);

        let mux = ServeMux::new(self.registry.clone(), digest.clone(), upstream, http_cache, timeout)
            .with_middlewares(middlewares);

        Ok(Gateway { mux, registry: self.registry, digest })
    }

    /// Build and start the gateway server, binding `@server(hostname, port)`
    /// (or the explicit `addr` override).
    pub async fn serve(self, addr: impl Into<String>) -> Result<()> {
        let gateway = self.build()?;
        let addr = addr.into();
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        tracing::info!(digest = %gateway.digest(), "gateway server listening on {addr}");

        let app = gateway.into_router();
        axum::serve(listener, app).await?;

        Ok(())
    }
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}
