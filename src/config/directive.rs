//! Directive payloads: the structural, serde-friendly surface that
//! `@server`/`@upstream`/`@http`/`@graphQL`/`@grpc`/`@const`/`@expr`/`@modify`/
//! `@cache`/`@protected` decode into, shared by the JSON/YAML and SDL
//! surfaces (spec §6 "Config formats", §10.3).

use crate::error::{Error, Result};
use crate::expr::{DynamicExpr, Expr, JsonT};
use crate::value::{DynamicValue, TSchema};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SchemaDirective {
    pub query: Option<String>,
    pub mutation: Option<String>,
}

/// `@server(...)`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ServerDirective {
    pub port: Option<u16>,
    pub hostname: Option<String>,
    pub timeout: Option<u64>,
    #[serde(default)]
    pub enable_federation: Option<bool>,
    #[serde(default)]
    pub introspection: Option<bool>,
    #[serde(default)]
    pub query_validation: Option<bool>,
    #[serde(default)]
    pub vars: indexmap::IndexMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct BatchDirective {
    pub delay: Option<u64>,
    pub max_size: Option<usize>,
    #[serde(default)]
    pub headers: Vec<String>,
}

/// `@upstream(...)`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct UpstreamDirective {
    pub base_url: Option<String>,
    pub http_cache: Option<bool>,
    #[serde(default)]
    pub allowed_headers: Vec<String>,
    pub batch: Option<BatchDirective>,
    pub proxy: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

fn default_method() -> String {
    "GET".to_string()
}

/// `@http(...)`: the common case, a REST call templated from field args.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HttpDirective {
    /// Absolute or upstream-relative; relative paths are joined with
    /// `@upstream.baseURL` at compile time.
    pub path: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub query: Vec<KeyValue>,
    #[serde(default)]
    pub headers: Vec<KeyValue>,
    /// Dotted path into the merged args/parent projected as the request body.
    pub body: Option<String>,
    /// Present on fields living under a list-producing parent: batches
    /// sibling calls sharing the same shape (spec §4.3(b)).
    #[serde(default)]
    pub batch_key: Vec<String>,
    #[serde(default)]
    pub group_by: Vec<String>,
}

/// `@graphQL(...)`: a templated upstream GraphQL query, compiled down to the
/// same `Unsafe::endpointCall` machinery as `@http` (a POST with a `query`
/// + `variables` JSON body), since the evaluation runtime has exactly one
/// notion of "call an upstream and parse its response" (spec §4.1).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphQLDirective {
    pub name: String,
    #[serde(default)]
    pub args: Vec<KeyValue>,
    #[serde(default)]
    pub batch: bool,
    /// Upstream GraphQL endpoint path; defaults to `/graphql`.
    pub path: Option<String>,
}

/// `@grpc(...)`: parsed into the model so `check`/`generate` round-trip it,
/// but never compiled to an executable resolver (§1 Non-goals, §10.3).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GrpcDirective {
    pub service: Option<String>,
    pub method: Option<String>,
    pub body: Option<String>,
    #[serde(default)]
    pub batch_key: Vec<String>,
}

/// `@cache(maxAge: N)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheDirective {
    pub max_age: u64,
}

/// `@modify(name: "...", omit: true)` / `@inline(path: [...])`, folded into
/// the compiled `FieldDefinition` at blueprint-compile time (spec §4.6).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ModifyDirective {
    pub name: Option<String>,
    #[serde(default)]
    pub omit: bool,
    #[serde(default)]
    pub inline: Vec<String>,
}

/// `@link(...)`: imports from another config document. Parsed for
/// round-tripping; multi-file composition is out of scope (spec.md
/// Non-goals — a single compiled `Config` per `check`/`publish` call).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkDirective {
    pub src: String,
    #[serde(rename = "type", default)]
    pub type_of: Option<String>,
}

/// `@const(data: <json>)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConstDirective(pub serde_json::Value);

/// `@expr(body: <json>)`. A small declarative subset of the full `Expr` IR —
/// `{"const": <json>}` literals, `{"path": "a.b.c"}` total projections, and
/// arrays composing steps left-to-right via `Pipe` — rather than exposing
/// every `Expr` variant through config surface syntax. Resolvers that need
/// the full IR (endpoint calls, batching, lexical binding) are produced by
/// `@http`/`@graphQL` instead; `@expr` covers the "reshape a value with no
/// upstream call" case.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExprDirective(pub serde_json::Value);

/// `@addField(name: "...", path: [...])`: projects a sub-path of the parent
/// value out as a new top-level field, compiled as a `Dynamic::path`
/// resolver (no upstream call).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AddFieldDirective {
    pub name: String,
    pub path: Vec<String>,
    #[serde(rename = "type")]
    pub type_of: String,
}

/// `@call(steps: [...])`: chains existing resolvers rather than declaring a
/// fresh one; each step names another field on the same object whose
/// resolver is spliced in as a `Pipe`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallDirective {
    pub steps: Vec<String>,
}

/// `@protected`: the field (or every field on the type) requires an
/// authenticated caller. Enforcement lives in `middleware.rs`; this is just
/// the parsed marker.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ProtectedDirective {}

pub fn parse_expr_directive(value: &serde_json::Value) -> Result<Expr> {
    match value {
        serde_json::Value::Array(steps) => {
            let mut iter = steps.iter();
            let first = iter
                .next()
                .ok_or_else(|| Error::Config("@expr: array body must not be empty".to_string()))?;
            let mut expr = parse_expr_directive(first)?;
            for step in iter {
                expr = expr.pipe(parse_expr_directive(step)?);
            }
            Ok(expr)
        }
        serde_json::Value::Object(map) if map.len() == 1 && map.contains_key("const") => {
            let dv = DynamicValue::from_json(&map["const"]);
            let schema = TSchema::infer(&dv);
            Ok(Expr::Literal(dv, schema))
        }
        serde_json::Value::Object(map) if map.len() == 1 && map.contains_key("path") => {
            let path = map["path"]
                .as_str()
                .ok_or_else(|| Error::Config("@expr: path must be a string".to_string()))?;
            let segments: Vec<String> =
                path.split('.').filter(|s| !s.is_empty()).map(String::from).collect();
            Ok(Expr::Dynamic(DynamicExpr::JsonTransform(JsonT::Path(segments))))
        }
        other => Err(Error::Config(format!(
            "@expr: unsupported body shape {other}"
        ))),
    }
}
