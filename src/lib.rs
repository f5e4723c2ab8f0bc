//! # tailwind-gateway
//!
//! A configuration-driven GraphQL orchestration gateway: operators describe
//! a GraphQL schema whose fields are bound to upstream REST/GraphQL
//! endpoints via directives, and the gateway serves GraphQL queries by
//! planning, batching, and composing upstream calls.
//!
//! ## Pipeline
//!
//! A [`Config`] (decoded from JSON, YAML, or GraphQL SDL) compiles into a
//! [`Blueprint`]: a validated, content-addressed executable schema. Each
//! field's resolver is an [`expr::Expr`], interpreted by the
//! [`EvaluationRuntime`] against a per-field [`Context`]. Calls to upstream
//! endpoints are routed through a request-scoped [`DataLoader`], which
//! deduplicates identical calls and batches group-annotated ones to avoid
//! the N+1 problem. [`Gateway`] wires all of this into an `axum` router.
//!
//! ## Example
//!
//! ```rust,no_run
//! use tailwind_gateway::{Config, Gateway};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let raw = br#"{"server": {}, "upstream": {}, "types": {}, "schema": {}}"#;
//!     let config = Config::decode_json(raw)?;
//!     let gateway = Gateway::builder().with_config(&config)?.build()?;
//!
//!     let app = gateway.into_router();
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
//!     axum::serve(listener, app).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod blueprint;
pub mod config;
pub mod dataloader;
pub mod endpoint;
pub mod error;
pub mod eval;
pub mod expr;
pub mod gateway;
pub mod http_cache;
pub mod middleware;
pub mod mustache;
pub mod path;
pub mod registry;
pub mod runtime;
pub mod schema;
pub mod step;
pub mod value;

pub use blueprint::{Blueprint, Digest};
pub use config::Config;
pub use dataloader::DataLoader;
pub use error::{Error, Result};
pub use eval::{Context, EvaluationRuntime};
pub use gateway::{Gateway, GatewayBuilder};
pub use middleware::Middleware;
pub use registry::Registry;
pub use runtime::ServeMux;
pub use value::DynamicValue;
