//! Blueprint: the compiled, validated, content-addressable executable form
//! of a user configuration. See spec §3 "Blueprint" / "Digest".

use crate::endpoint::{Endpoint, Scheme};
use crate::expr::{
    BatchHint, DictExpr, DynamicExpr, Expr, JsonT, LogicalExpr, MathExpr, OptExpr, UnsafeExpr,
};
use crate::value::{DynamicValue, TSchema};
use indexmap::IndexMap;
use sha2::{Digest as _, Sha256};
use std::sync::Arc;

/// SHA-256 over the blueprint's canonical JSON encoding (spec §3 "Digest").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest(pub String);

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct ArgumentDefinition {
    pub name: String,
    pub schema: TSchema,
    pub default: Option<DynamicValue>,
    /// The originally-declared GraphQL type name (`"Int"`, `"UserInput"`,
    /// ...). `schema` flattens named input types structurally, which loses
    /// their name; schema building needs the name back to emit a proper
    /// GraphQL input object rather than an anonymous shape.
    pub type_name: String,
}

/// A field's declared output shape: a scalar/structural `TSchema`, a named
/// reference into `Blueprint::types` (possibly cyclic), or a list of either.
#[derive(Debug, Clone)]
pub enum OutputType {
    Scalar(TSchema),
    Named(String),
    List(Box<OutputType>),
}

#[derive(Debug, Clone)]
pub struct FieldDefinition {
    pub name: String,
    pub output_type: OutputType,
    pub nullable: bool,
    pub args: Vec<ArgumentDefinition>,
    /// `None` for a field with no resolver (spec §4.5 rule 1: wraps the
    /// parent value and dispatches on its declared type).
    pub resolver: Option<Expr>,
    pub batch: Option<BatchHint>,
    pub cache_max_age: Option<u64>,
    /// `@protected` on this field or its declaring type (spec §10.6).
    pub protected: bool,
}

#[derive(Debug, Clone)]
pub struct ObjectType {
    pub name: String,
    pub fields: Vec<FieldDefinition>,
}

#[derive(Debug, Clone)]
pub struct InputFieldDefinition {
    pub name: String,
    pub schema: TSchema,
    pub default: Option<DynamicValue>,
    pub type_name: String,
}

#[derive(Debug, Clone)]
pub struct InputType {
    pub name: String,
    pub fields: Vec<InputFieldDefinition>,
}

#[derive(Debug, Clone)]
pub enum TypeDef {
    Object(ObjectType),
    Input(InputType),
}

#[derive(Debug, Clone)]
pub struct SchemaRoots {
    pub query: String,
    pub mutation: Option<String>,
}

/// `@server(...)` directive, compiled.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub hostname: String,
    pub timeout_ms: Option<u64>,
    pub enable_federation: bool,
    pub introspection: bool,
    pub query_validation: bool,
    pub vars: IndexMap<String, String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            hostname: "0.0.0.0".to_string(),
            timeout_ms: None,
            enable_federation: false,
            introspection: false,
            query_validation: true,
            vars: IndexMap::new(),
        }
    }
}

/// `@upstream(...)` directive, compiled.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub base_url: Option<String>,
    pub http_cache: bool,
    pub allowed_headers: Vec<String>,
    pub batch_delay_ms: u64,
    pub batch_max_size: usize,
    pub batch_headers: Vec<String>,
    pub proxy: Option<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            http_cache: false,
            allowed_headers: Vec::new(),
            batch_delay_ms: 0,
            batch_max_size: usize::MAX,
            batch_headers: Vec::new(),
            proxy: None,
        }
    }
}

/// Compiled schema + resolver graph. Immutable once published; identified
/// by its [`digest`](Blueprint::digest).
#[derive(Debug, Clone)]
pub struct Blueprint {
    pub schema: SchemaRoots,
    pub types: IndexMap<String, TypeDef>,
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
}

impl Blueprint {
    pub fn object_type(&self, name: &str) -> Option<&ObjectType> {
        match self.types.get(name) {
            Some(TypeDef::Object(o)) => Some(o),
            _ => None,
        }
    }

    pub fn query_type(&self) -> Option<&ObjectType> {
        self.object_type(&self.schema.query)
    }

    pub fn mutation_type(&self) -> Option<&ObjectType> {
        self.schema.mutation.as_deref().and_then(|name| self.object_type(name))
    }

    /// Whether any field anywhere in the schema is `@protected`. Used to
    /// decide whether the gateway's auth middleware runs at all for a given
    /// blueprint (spec §10.6).
    pub fn requires_auth(&self) -> bool {
        self.types.values().any(|t| match t {
            TypeDef::Object(o) => o.fields.iter().any(|f| f.protected),
            TypeDef::Input(_) => false,
        })
    }

    /// SHA-256 over a canonical JSON rendering of the whole blueprint.
    pub fn digest(&self) -> Digest {
        let rendered = serde_json::json!({
            "schema": {"query": self.schema.query, "mutation": self.schema.mutation},
            "types": self
                .types
                .iter()
                .map(|(name, t)| (name.clone(), type_digest(t)))
                .collect::<serde_json::Map<String, serde_json::Value>>(),
        });
        let bytes = serde_json::to_vec(&rendered).unwrap_or_default();
        let hash = Sha256::digest(&bytes);
        Digest(hex::encode(hash))
    }
}

fn schema_digest(schema: &TSchema) -> serde_json::Value {
    match schema {
        TSchema::String => serde_json::json!("string"),
        TSchema::Int => serde_json::json!("int"),
        TSchema::Bool => serde_json::json!("bool"),
        TSchema::Optional(inner) => serde_json::json!({"optional": schema_digest(inner)}),
        TSchema::Array(inner) => serde_json::json!({"array": schema_digest(inner)}),
        TSchema::Dict(inner) => serde_json::json!({"dict": schema_digest(inner)}),
        TSchema::Object(fields) => serde_json::Value::Object(
            fields.iter().map(|(k, v)| (k.clone(), schema_digest(v))).collect(),
        ),
    }
}

fn endpoint_digest(ep: &Endpoint) -> serde_json::Value {
    serde_json::json!({
        "method": ep.method.as_str(),
        "scheme": match ep.scheme { Scheme::Http => "http", Scheme::Https => "https" },
        "host": ep.host.render_template(),
        "port": ep.port,
        "path": ep.path.render_template(),
        "query": ep.query.iter().map(|(k, m)| serde_json::json!([k, m.render_template()])).collect::<Vec<_>>(),
        "headers": ep.headers.iter().map(|(k, m)| serde_json::json!([k, m.render_template()])).collect::<Vec<_>>(),
        "body": ep.body.as_ref().map(|p| p.to_string()),
        "inputSchema": ep.input_schema.as_ref().map(schema_digest),
        "outputSchema": ep.output_schema.as_ref().map(schema_digest),
    })
}

fn batch_hint_digest(b: &BatchHint) -> serde_json::Value {
    serde_json::json!({"groupBy": b.group_by, "batchKey": b.batch_key})
}

fn expr_digest(expr: &Expr) -> serde_json::Value {
    match expr {
        Expr::Literal(value, schema) => {
            serde_json::json!({"t": "literal", "value": value.to_json(), "schema": schema_digest(schema)})
        }
        Expr::Identity => serde_json::json!({"t": "identity"}),
        Expr::Pipe(a, b) => serde_json::json!({"t": "pipe", "a": expr_digest(a), "b": expr_digest(b)}),
        Expr::FunctionDef(id, body) => serde_json::json!({"t": "fn", "id": id, "body": expr_digest(body)}),
        Expr::Lookup(id) => serde_json::json!({"t": "lookup", "id": id}),
        Expr::EqualTo(l, r, tag) => {
            serde_json::json!({"t": "eq", "l": expr_digest(l), "r": expr_digest(r), "tag": schema_digest(tag)})
        }
        Expr::Math(m) => serde_json::json!({"t": "math", "op": math_digest(m)}),
        Expr::Logical(l) => serde_json::json!({"t": "logical", "op": logical_digest(l)}),
        Expr::Opt(o) => serde_json::json!({"t": "opt", "op": opt_digest(o)}),
        Expr::Dict(d) => serde_json::json!({"t": "dict", "op": dict_digest(d)}),
        Expr::Dynamic(d) => serde_json::json!({"t": "dynamic", "op": dynamic_digest(d)}),
        Expr::Unsafe(u) => serde_json::json!({"t": "unsafe", "op": unsafe_digest(u)}),
    }
}

fn math_digest(m: &MathExpr) -> serde_json::Value {
    match m {
        MathExpr::Add(l, r, tag) => {
            serde_json::json!({"add": [expr_digest(l), expr_digest(r)], "tag": schema_digest(tag)})
        }
        MathExpr::Sub(l, r, tag) => {
            serde_json::json!({"sub": [expr_digest(l), expr_digest(r)], "tag": schema_digest(tag)})
        }
        MathExpr::Mul(l, r, tag) => {
            serde_json::json!({"mul": [expr_digest(l), expr_digest(r)], "tag": schema_digest(tag)})
        }
        MathExpr::Div(l, r, tag) => {
            serde_json::json!({"div": [expr_digest(l), expr_digest(r)], "tag": schema_digest(tag)})
        }
        MathExpr::Mod(l, r, tag) => {
            serde_json::json!({"mod": [expr_digest(l), expr_digest(r)], "tag": schema_digest(tag)})
        }
        MathExpr::Gt(l, r, tag) => {
            serde_json::json!({"gt": [expr_digest(l), expr_digest(r)], "tag": schema_digest(tag)})
        }
        MathExpr::Gte(l, r, tag) => {
            serde_json::json!({"gte": [expr_digest(l), expr_digest(r)], "tag": schema_digest(tag)})
        }
        MathExpr::Neg(x, tag) => {
            serde_json::json!({"neg": expr_digest(x), "tag": schema_digest(tag)})
        }
    }
}

fn logical_digest(l: &LogicalExpr) -> serde_json::Value {
    match l {
        LogicalExpr::And(a, b) => serde_json::json!({"and": [expr_digest(a), expr_digest(b)]}),
        LogicalExpr::Or(a, b) => serde_json::json!({"or": [expr_digest(a), expr_digest(b)]}),
        LogicalExpr::Not(a) => serde_json::json!({"not": expr_digest(a)}),
        LogicalExpr::Cond { cond, then, els } => {
            serde_json::json!({"cond": expr_digest(cond), "then": expr_digest(then), "else": expr_digest(els)})
        }
    }
}

fn opt_digest(o: &OptExpr) -> serde_json::Value {
    match o {
        OptExpr::IsSome(x) => serde_json::json!({"isSome": expr_digest(x)}),
        OptExpr::IsNone(x) => serde_json::json!({"isNone": expr_digest(x)}),
        OptExpr::Fold { opt, none, some } => serde_json::json!({
            "fold": {"opt": expr_digest(opt), "none": expr_digest(none), "some": expr_digest(some)}
        }),
        OptExpr::Apply(x) => serde_json::json!({"apply": expr_digest(x)}),
        OptExpr::Wrap(x) => serde_json::json!({"wrap": expr_digest(x)}),
    }
}

fn dict_digest(d: &DictExpr) -> serde_json::Value {
    match d {
        DictExpr::Get { key, map } => {
            serde_json::json!({"get": {"key": expr_digest(key), "map": expr_digest(map)}})
        }
        DictExpr::Put { key, value, map } => serde_json::json!({
            "put": {"key": expr_digest(key), "value": expr_digest(value), "map": expr_digest(map)}
        }),
        DictExpr::ToPair(x) => serde_json::json!({"toPair": expr_digest(x)}),
    }
}

fn json_t_digest(t: &JsonT) -> serde_json::Value {
    match t {
        JsonT::Identity => serde_json::json!("identity"),
        JsonT::Path(p) => serde_json::json!({"path": p}),
        JsonT::Object(fields) => serde_json::json!({
            "object": fields
                .iter()
                .map(|(k, v)| (k.clone(), json_t_digest(v)))
                .collect::<serde_json::Map<String, serde_json::Value>>()
        }),
        JsonT::Array(items) => serde_json::json!({"array": items.iter().map(json_t_digest).collect::<Vec<_>>()}),
    }
}

fn dynamic_digest(d: &DynamicExpr) -> serde_json::Value {
    match d {
        DynamicExpr::ToTyped(schema, x) => {
            serde_json::json!({"toTyped": {"schema": schema_digest(schema), "expr": expr_digest(x)}})
        }
        DynamicExpr::ToDynamic(schema, x) => {
            serde_json::json!({"toDynamic": {"schema": schema_digest(schema), "expr": expr_digest(x)}})
        }
        DynamicExpr::Path(p) => serde_json::json!({"path": p}),
        DynamicExpr::JsonTransform(t) => serde_json::json!({"jsonTransform": json_t_digest(t)}),
    }
}

fn unsafe_digest(u: &UnsafeExpr) -> serde_json::Value {
    match u {
        UnsafeExpr::EndpointCall { endpoint, batch } => serde_json::json!({
            "endpointCall": {
                "endpoint": endpoint_digest(endpoint),
                "batch": batch.as_ref().map(batch_hint_digest),
            }
        }),
        UnsafeExpr::Debug(prefix, x) => serde_json::json!({"debug": {"prefix": prefix, "expr": expr_digest(x)}}),
        UnsafeExpr::Die(message) => serde_json::json!({"die": message}),
    }
}

fn output_type_digest(t: &OutputType) -> serde_json::Value {
    match t {
        OutputType::Scalar(s) => serde_json::json!({"scalar": schema_digest(s)}),
        OutputType::Named(n) => serde_json::json!({"named": n}),
        OutputType::List(inner) => serde_json::json!({"list": output_type_digest(inner)}),
    }
}

fn arg_digest(a: &ArgumentDefinition) -> serde_json::Value {
    serde_json::json!({
        "name": a.name,
        "typeName": a.type_name,
        "schema": schema_digest(&a.schema),
        "default": a.default.as_ref().map(DynamicValue::to_json),
    })
}

fn field_digest(f: &FieldDefinition) -> serde_json::Value {
    serde_json::json!({
        "name": f.name,
        "outputType": output_type_digest(&f.output_type),
        "nullable": f.nullable,
        "args": f.args.iter().map(arg_digest).collect::<Vec<_>>(),
        "resolver": f.resolver.as_ref().map(expr_digest),
        "batch": f.batch.as_ref().map(batch_hint_digest),
        "cacheMaxAge": f.cache_max_age,
        "protected": f.protected,
    })
}

fn type_digest(t: &TypeDef) -> serde_json::Value {
    match t {
        TypeDef::Object(o) => serde_json::json!({
            "object": {"name": o.name, "fields": o.fields.iter().map(field_digest).collect::<Vec<_>>()}
        }),
        TypeDef::Input(i) => serde_json::json!({
            "input": {
                "name": i.name,
                "fields": i.fields.iter().map(|f| serde_json::json!({
                    "name": f.name,
                    "typeName": f.type_name,
                    "schema": schema_digest(&f.schema),
                    "default": f.default.as_ref().map(DynamicValue::to_json),
                })).collect::<Vec<_>>(),
            }
        }),
    }
}

/// Convenience used by the config compiler to build the `Unsafe::endpointCall`
/// resolver for a simple `@http`-style field.
pub fn endpoint_call_resolver(endpoint: Endpoint, batch: Option<BatchHint>) -> Expr {
    Expr::Unsafe(UnsafeExpr::EndpointCall {
        endpoint: Arc::new(endpoint),
        batch,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Scheme;
    use http::Method;

    fn sample_blueprint(field_name: &str) -> Blueprint {
        let endpoint = Endpoint::new(Method::GET, Scheme::Https, "api.example.com", "/users/{{value.id}}");
        let field = FieldDefinition {
            name: field_name.to_string(),
            output_type: OutputType::Named("User".to_string()),
            nullable: true,
            args: vec![ArgumentDefinition {
                name: "id".to_string(),
                schema: TSchema::Int,
                default: None,
                type_name: "Int".to_string(),
            }],
            resolver: Some(endpoint_call_resolver(endpoint, None)),
            batch: None,
            cache_max_age: None,
            protected: false,
        };
        let query = ObjectType {
            name: "Query".to_string(),
            fields: vec![field],
        };
        let mut types = IndexMap::new();
        types.insert("Query".to_string(), TypeDef::Object(query));
        Blueprint {
            schema: SchemaRoots {
                query: "Query".to_string(),
                mutation: None,
            },
            types,
            server: ServerConfig::default(),
            upstream: UpstreamConfig::default(),
        }
    }

    #[test]
    fn digest_is_deterministic_and_sensitive_to_content() {
        let a = sample_blueprint("user");
        let b = sample_blueprint("user");
        assert_eq!(a.digest(), b.digest());

        let c = sample_blueprint("userRenamed");
        assert_ne!(a.digest(), c.digest());
    }

    #[test]
    fn query_type_lookup_resolves_named_root() {
        let bp = sample_blueprint("user");
        let query = bp.query_type().expect("query type present");
        assert_eq!(query.fields[0].name, "user");
        assert!(bp.mutation_type().is_none());
    }
}
