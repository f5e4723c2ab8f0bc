//! Runtime support for the gateway: HTTP routing, per-request `DataLoader`
//! wiring, and the admin schema-registry surface (spec §6 "External
//! interfaces").

use crate::blueprint::{Blueprint, Digest};
use crate::config::Config;
use crate::dataloader::{DataLoader, Upstream};
use crate::error::{Error, GraphQLError, Result};
use crate::eval::Context as EvalContext;
use crate::http_cache::HttpCache;
use crate::middleware::{Context as MiddlewareContext, Middleware};
use crate::registry::Registry;
use crate::schema::{DynamicSchema, SchemaBuilder};
use crate::value::DynamicValue;
use async_graphql::ServerError;
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::{
    extract::{Path as AxumPath, Query, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse},
    routing::{delete, get, post, put},
    Json, Router,
};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// `ServeMux` — the main gateway handler. Handles routing of GraphQL
/// requests, running middlewares, building a request-scoped `DataLoader`
/// and `Context`, and invoking the dynamic schema; also serves the admin
/// registry surface. Convertible into an Axum router.
#[derive(Clone)]
pub struct ServeMux {
    registry: Registry,
    default_digest: Digest,
    upstream: Arc<dyn Upstream>,
    http_cache: Option<Arc<HttpCache>>,
    timeout: Option<Duration>,
    middlewares: Vec<Arc<dyn Middleware>>,
    error_handler: Option<Arc<dyn Fn(Vec<GraphQLError>) + Send + Sync>>,
    schemas: Arc<Mutex<HashMap<String, DynamicSchema>>>,
}

impl ServeMux {
    /// `registry` must already contain `default_digest`'s blueprint (the
    /// gateway publishes it at build time before constructing this).
    pub fn new(
        registry: Registry,
        default_digest: Digest,
        upstream: Arc<dyn Upstream>,
        http_cache: Option<Arc<HttpCache>>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            registry,
            default_digest,
            upstream,
            http_cache,
            timeout,
            middlewares: Vec::new(),
            error_handler: None,
            schemas: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_middlewares(mut self, middlewares: Vec<Arc<dyn Middleware>>) -> Self {
        self.middlewares = middlewares;
        self
    }

    pub fn add_middleware(&mut self, middleware: Arc<dyn Middleware>) {
        self.middlewares.push(middleware);
    }

    pub fn set_error_handler_arc(&mut self, handler: Arc<dyn Fn(Vec<GraphQLError>) + Send + Sync>) {
        self.error_handler = Some(handler);
    }

    pub fn set_error_handler<F>(&mut self, handler: F)
    where
        F: Fn(Vec<GraphQLError>) + Send + Sync + 'static,
    {
        self.set_error_handler_arc(Arc::new(handler));
    }

    /// Resolve (and lazily build/cache) the `DynamicSchema` for a digest,
    /// or the gateway's default digest when `digest` is `None` (plain
    /// `/graphql`, spec §6).
    fn resolve(&self, digest: Option<&str>) -> Result<(Arc<Blueprint>, DynamicSchema)> {
        let hex = digest.unwrap_or(self.default_digest.0.as_str());
        if let Some(schema) = self.schemas.lock().unwrap().get(hex) {
            return Ok((schema.blueprint.clone(), schema.clone()));
        }
        let blueprint = self
            .registry
            .get(hex)
            .ok_or_else(|| Error::Config(format!("no blueprint published under digest `{hex}`")))?;
        let schema = SchemaBuilder::new().with_blueprint(blueprint.clone()).build()?;
        self.schemas.lock().unwrap().insert(hex.to_string(), schema.clone());
        Ok((blueprint, schema))
    }

    /// Whitelist request headers per `@upstream(allowedHeaders: [...])`,
    /// lower-casing names, as the root `Context.headers` every resolver
    /// templates against (spec §3 "Context").
    fn context_headers(blueprint: &Blueprint, headers: &HeaderMap) -> DynamicValue {
        let mut map = IndexMap::new();
        for name in &blueprint.upstream.allowed_headers {
            if let Some(value) = headers.get(name) {
                if let Ok(value) = value.to_str() {
                    map.insert(name.to_ascii_lowercase(), DynamicValue::String(value.to_string()));
                }
            }
        }
        DynamicValue::Object(map)
    }

    fn context_vars(blueprint: &Blueprint) -> DynamicValue {
        DynamicValue::object(
            blueprint
                .server
                .vars
                .iter()
                .map(|(k, v)| (k.clone(), DynamicValue::String(v.clone()))),
        )
    }

    async fn execute_with_middlewares(
        &self,
        headers: HeaderMap,
        digest: Option<&str>,
        request: GraphQLRequest,
    ) -> Result<async_graphql::Response> {
        let (blueprint, schema) = self.resolve(digest)?;

        let mut ctx = MiddlewareContext { headers: headers.clone(), extensions: HashMap::new() };
        for middleware in &self.middlewares {
            middleware.call(&mut ctx).await?;
        }

        let loader = DataLoader::with_batch_config(
            self.upstream.clone(),
            self.http_cache.clone(),
            Duration::from_millis(blueprint.upstream.batch_delay_ms),
            blueprint.upstream.batch_max_size,
        );

        let root_ctx = Arc::new(EvalContext::root(
            DynamicValue::Null,
            Self::context_headers(&blueprint, &headers),
            Self::context_vars(&blueprint),
        ));

        let mut gql_request = request.into_inner();
        gql_request = gql_request.data(root_ctx);
        gql_request = gql_request.data(loader);

        let execution = schema.execute(gql_request);
        let response = match self.timeout {
            Some(duration) => tokio::time::timeout(duration, execution)
                .await
                .map_err(|_| Error::Upstream("request timed out".to_string()))?,
            None => execution.await,
        };

        Ok(response)
    }

    /// Handle a GraphQL HTTP request: run middlewares, execute against the
    /// resolved schema, translate any pipeline-level error (schema lookup,
    /// middleware rejection, timeout) into a top-level GraphQL error.
    pub async fn handle_http(
        &self,
        headers: HeaderMap,
        digest: Option<&str>,
        request: GraphQLRequest,
    ) -> GraphQLResponse {
        match self.execute_with_middlewares(headers, digest, request).await {
            Ok(resp) => resp.into(),
            Err(err) => {
                let gql_err: GraphQLError = err.into();
                if let Some(handler) = &self.error_handler {
                    handler(vec![gql_err.clone()]);
                }
                let server_err = ServerError::new(gql_err.message.clone(), None);
                async_graphql::Response::from_errors(vec![server_err]).into()
            }
        }
    }

    /// Convert to an Axum router: the GraphQL façade plus the admin schema
    /// registry (spec §6). CORS and request tracing are real `tower-http`
    /// layers, not middleware placeholders — a browser-hosted GraphQL
    /// client needs actual CORS headers, not a struct that says it would
    /// add them.
    pub fn into_router(self) -> Router {
        let state = Arc::new(self);
        Router::new()
            .route("/graphql", post(handle_default_post).get(graphql_playground))
            .route("/graphql/{digest}", post(handle_digest_post).get(graphql_playground))
            .route("/schemas", put(publish_schema).get(list_schemas))
            .route("/schemas/{hex}", get(show_schema).delete(drop_schema))
            .layer(tower_http::trace::TraceLayer::new_for_http())
            .layer(
                tower_http::cors::CorsLayer::new()
                    .allow_origin(tower_http::cors::Any)
                    .allow_methods(tower_http::cors::Any)
                    .allow_headers(tower_http::cors::Any),
            )
            .with_state(state)
    }
}

async fn handle_default_post(
    State(mux): State<Arc<ServeMux>>,
    headers: HeaderMap,
    request: GraphQLRequest,
) -> impl IntoResponse {
    mux.handle_http(headers, None, request).await
}

async fn handle_digest_post(
    State(mux): State<Arc<ServeMux>>,
    AxumPath(digest): AxumPath<String>,
    headers: HeaderMap,
    request: GraphQLRequest,
) -> impl IntoResponse {
    mux.handle_http(headers, Some(&digest), request).await
}

async fn graphql_playground() -> impl IntoResponse {
    Html(async_graphql::http::playground_source(
        async_graphql::http::GraphQLPlaygroundConfig::new("/graphql"),
    ))
}

#[derive(serde::Deserialize, Default)]
struct ListQuery {
    #[serde(default)]
    index: Option<usize>,
    #[serde(default)]
    max: Option<usize>,
}

#[derive(serde::Serialize)]
struct DigestResponse {
    hex: String,
    alg: &'static str,
}

/// `PUT /schemas`: the body is the `Config` document (JSON) to compile and
/// publish. Spec §6 describes the body as "blueprint JSON"; `Blueprint`
/// itself carries non-serializable pieces (`http::Method`, boxed `Expr`
/// graphs), so this admin surface accepts the pre-compile `Config` form
/// instead and compiles it server-side — documented in DESIGN.md as the
/// registry's one simplification.
async fn publish_schema(
    State(mux): State<Arc<ServeMux>>,
    Json(config): Json<Config>,
) -> axum::response::Result<Json<DigestResponse>> {
    let blueprint = config
        .compile()
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    let digest = mux.registry.publish(blueprint);
    Ok(Json(DigestResponse { hex: digest.0, alg: "sha256" }))
}

async fn list_schemas(
    State(mux): State<Arc<ServeMux>>,
    Query(q): Query<ListQuery>,
) -> Json<Vec<String>> {
    let offset = q.index.unwrap_or(0);
    let limit = q.max.unwrap_or(usize::MAX);
    Json(mux.registry.list(offset, limit))
}

#[derive(serde::Serialize)]
struct SchemaSummary {
    hex: String,
    query: String,
    mutation: Option<String>,
    types: usize,
}

async fn show_schema(
    State(mux): State<Arc<ServeMux>>,
    AxumPath(hex): AxumPath<String>,
) -> axum::response::Result<Json<SchemaSummary>> {
    let blueprint = mux
        .registry
        .get(&hex)
        .ok_or((StatusCode::NOT_FOUND, format!("no blueprint under digest `{hex}`")))?;
    Ok(Json(SchemaSummary {
        hex,
        query: blueprint.schema.query.clone(),
        mutation: blueprint.schema.mutation.clone(),
        types: blueprint.types.len(),
    }))
}

async fn drop_schema(
    State(mux): State<Arc<ServeMux>>,
    AxumPath(hex): AxumPath<String>,
) -> StatusCode {
    if mux.registry.drop_digest(&hex) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}
