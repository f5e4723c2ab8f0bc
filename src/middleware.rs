//! Middleware support for the gateway

use crate::error::Result;
use axum::http::Request;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Context passed to middleware
#[derive(Debug)]
pub struct Context {
    /// Request headers and metadata
    pub headers: axum::http::HeaderMap,

    /// Additional context data
    pub extensions: std::collections::HashMap<String, serde_json::Value>,
}

impl Context {
    /// Create a new context from request
    pub fn from_request<B>(req: &Request<B>) -> Self {
        Self {
            headers: req.headers().clone(),
            extensions: std::collections::HashMap::new(),
        }
    }

    /// Insert extension data
    pub fn insert(&mut self, key: String, value: serde_json::Value) {
        self.extensions.insert(key, value);
    }

    /// Get extension data
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.extensions.get(key)
    }
}

/// Middleware trait for processing requests
///
/// Middleware can intercept requests before they are processed by the GraphQL engine.
///
/// # Example
///
/// ```rust
/// use tailwind_gateway::middleware::{Middleware, Context};
/// use tailwind_gateway::Result;
///
/// struct MyMiddleware;
///
/// #[async_trait::async_trait]
/// impl Middleware for MyMiddleware {
///     async fn call(&self, ctx: &mut Context) -> Result<()> {
///         println!("Processing request");
///         Ok(())
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait Middleware: Send + Sync {
    /// Process the request context
    async fn call(&self, ctx: &mut Context) -> Result<()>;
}

/// Type alias for boxed middleware
pub type BoxMiddleware = Box<dyn Middleware>;

/// Middleware function type
pub type MiddlewareFn =
    Arc<dyn Fn(&mut Context) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> + Send + Sync>;

/// Enforces `@protected` (spec §10.6): rejects any request lacking a bearer
/// token. It does not validate the token's contents, only its presence —
/// the gateway has no identity provider of its own to validate against.
#[derive(Debug, Clone, Default)]
pub struct RequireAuthMiddleware;

#[async_trait::async_trait]
impl Middleware for RequireAuthMiddleware {
    async fn call(&self, ctx: &mut Context) -> Result<()> {
        let has_bearer_token = ctx
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("Bearer ") && v.len() > "Bearer ".len())
            .unwrap_or(false);

        if has_bearer_token {
            Ok(())
        } else {
            Err(crate::error::Error::Unauthorized(
                "this schema has @protected fields; a bearer token is required".to_string(),
            ))
        }
    }
}
