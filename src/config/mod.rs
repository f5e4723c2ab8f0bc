//! Config: the serde-friendly surface representation that JSON, YAML and
//! GraphQL-SDL documents all decode into, and the compiler that lowers it
//! into a [`Blueprint`]. See spec §6 "Config formats" / §10.3.

pub mod directive;
mod sdl;

use crate::blueprint::{
    endpoint_call_resolver, ArgumentDefinition, Blueprint, FieldDefinition, InputFieldDefinition,
    InputType, ObjectType, OutputType, SchemaRoots, ServerConfig, TypeDef, UpstreamConfig,
};
use crate::endpoint::{Endpoint, Scheme};
use crate::error::{Error, Result};
use crate::expr::{BatchHint, Expr};
use crate::mustache::Mustache;
use crate::path::Path as DotPath;
use crate::value::{DynamicValue, TSchema};
use directive::{
    parse_expr_directive, AddFieldDirective, CallDirective, GraphQLDirective, GrpcDirective,
    HttpDirective, ModifyDirective, SchemaDirective, ServerDirective, UpstreamDirective,
};
use http::Method;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub use sdl::{decode_sdl, encode_sdl};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ArgConfig {
    #[serde(rename = "type")]
    pub type_of: String,
    #[serde(default)]
    pub list: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct FieldConfig {
    #[serde(rename = "type")]
    pub type_of: String,
    #[serde(default)]
    pub list: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub args: IndexMap<String, ArgConfig>,
    #[serde(default)]
    pub http: Option<HttpDirective>,
    #[serde(default)]
    pub graphql: Option<GraphQLDirective>,
    #[serde(default)]
    pub grpc: Option<GrpcDirective>,
    #[serde(rename = "const", default)]
    pub const_value: Option<serde_json::Value>,
    #[serde(default)]
    pub expr: Option<serde_json::Value>,
    #[serde(default)]
    pub modify: Option<ModifyDirective>,
    #[serde(default)]
    pub call: Option<CallDirective>,
    #[serde(default)]
    pub cache: Option<directive::CacheDirective>,
    #[serde(default)]
    pub protected: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TypeConfig {
    #[serde(default)]
    pub fields: IndexMap<String, FieldConfig>,
    #[serde(default)]
    pub input: bool,
    #[serde(default)]
    pub add_fields: Vec<AddFieldDirective>,
    #[serde(default)]
    pub protected: bool,
}

/// The structural form every config surface (JSON, YAML, GraphQL SDL)
/// decodes into and re-encodes from. See spec §6/§8.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub server: ServerDirective,
    #[serde(default)]
    pub upstream: UpstreamDirective,
    #[serde(default)]
    pub schema: SchemaDirective,
    #[serde(default)]
    pub types: IndexMap<String, TypeConfig>,
}

impl Config {
    pub fn decode_json(bytes: &[u8]) -> Result<Config> {
        serde_json::from_slice(bytes).map_err(Error::from)
    }

    pub fn decode_yaml(bytes: &[u8]) -> Result<Config> {
        serde_yaml_ng::from_slice(bytes)
            .map_err(|e| Error::Config(format!("invalid YAML config: {e}")))
    }

    /// Encodes through [`Config::compress`] first, so the JSON surface never
    /// writes out the redundant optional-field noise `compress` strips
    /// (spec §8).
    pub fn encode_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(&self.clone().compress()).map_err(Error::from)
    }

    /// Encodes through [`Config::compress`] first; see [`Config::encode_json`].
    pub fn encode_yaml(&self) -> Result<Vec<u8>> {
        serde_yaml_ng::to_string(&self.clone().compress())
            .map(String::into_bytes)
            .map_err(|e| Error::Config(format!("failed to encode YAML: {e}")))
    }

    /// Remove every optional field that's still at its decode-time default,
    /// so that `decode(encode(c.compress())) == c.compress()` holds
    /// regardless of which surface `c` originally came from (spec §8).
    /// Called by every `encode_*` method, so this is exercised on every
    /// `check`/`generate`/`publish` round trip, not just when invoked
    /// directly.
    pub fn compress(mut self) -> Self {
        if matches!(self.server.enable_federation, Some(false)) {
            self.server.enable_federation = None;
        }
        if matches!(self.server.introspection, Some(false)) {
            self.server.introspection = None;
        }
        if matches!(self.server.query_validation, Some(false)) {
            self.server.query_validation = None;
        }
        if matches!(self.upstream.http_cache, Some(false)) {
            self.upstream.http_cache = None;
        }
        for type_cfg in self.types.values_mut() {
            for field in type_cfg.fields.values_mut() {
                for arg in field.args.values_mut() {
                    if matches!(&arg.default, Some(serde_json::Value::Null)) {
                        arg.default = None;
                    }
                }
            }
        }
        self
    }

    /// Lower this configuration into an executable [`Blueprint`]. Validates
    /// every directive and type reference; the first problem found is
    /// reported as `Error::Config` (spec §6 "check").
    pub fn compile(&self) -> Result<Blueprint> {
        compile(self)
    }
}

fn scalar_schema(type_of: &str) -> Option<TSchema> {
    match type_of {
        "String" | "ID" => Some(TSchema::String),
        "Int" | "Float" => Some(TSchema::Int),
        "Boolean" | "Bool" => Some(TSchema::Bool),
        _ => None,
    }
}

fn resolve_schema(config: &Config, type_of: &str, list: bool, required: bool) -> Result<TSchema> {
    let base = if let Some(s) = scalar_schema(type_of) {
        s
    } else if let Some(type_cfg) = config.types.get(type_of) {
        if !type_cfg.input {
            return Err(Error::Config(format!(
                "`{type_of}` is an object type and cannot be used as an argument or input field type"
            )));
        }
        let mut map = IndexMap::new();
        for (name, f) in &type_cfg.fields {
            map.insert(name.clone(), resolve_schema(config, &f.type_of, f.list, f.required)?);
        }
        TSchema::Object(map)
    } else {
        return Err(Error::Config(format!("reference to unknown type `{type_of}`")));
    };
    let base = if list { TSchema::Array(Box::new(base)) } else { base };
    Ok(if required { base } else { TSchema::Optional(Box::new(base)) })
}

fn resolve_output_type(config: &Config, field: &FieldConfig) -> Result<OutputType> {
    let base = if let Some(s) = scalar_schema(&field.type_of) {
        OutputType::Scalar(s)
    } else if let Some(type_cfg) = config.types.get(&field.type_of) {
        if type_cfg.input {
            return Err(Error::Config(format!(
                "field returns `{}`, which is declared as an input type",
                field.type_of
            )));
        }
        OutputType::Named(field.type_of.clone())
    } else {
        return Err(Error::Config(format!(
            "field references unknown type `{}`",
            field.type_of
        )));
    };
    Ok(if field.list { OutputType::List(Box::new(base)) } else { base })
}

fn batch_hint(http: &HttpDirective) -> Option<BatchHint> {
    if http.batch_key.is_empty() {
        None
    } else {
        Some(BatchHint { group_by: http.group_by.clone(), batch_key: http.batch_key.clone() })
    }
}

/// `groupBy` keys are reserved: the data-loader appends one repeated query
/// parameter per batched call under that name (spec §4.3(b)), so a field
/// that also pins a literal value under the same key at compile time would
/// make the merged upstream call ambiguous. Disallowed at compile time per
/// spec §9 open question (c).
fn check_group_by_collision(field_name: &str, http: &HttpDirective) -> Result<()> {
    for group_key in &http.group_by {
        if http.query.iter().any(|kv| &kv.key == group_key) {
            return Err(Error::Config(format!(
                "field `{field_name}`: groupBy key `{group_key}` collides with a user-supplied @http query parameter of the same name"
            )));
        }
    }
    Ok(())
}

/// Build the `Endpoint` a `@http` directive describes, joining its (usually
/// relative) path against `@upstream.baseURL`.
fn build_http_endpoint(config: &Config, http: &HttpDirective) -> Result<Endpoint> {
    let base = config
        .upstream
        .base_url
        .as_deref()
        .ok_or_else(|| Error::Config("@http requires @upstream(baseURL: ...) to be set".to_string()))?;
    build_endpoint(base, &http.method, &http.path, &http.query, &http.headers, http.body.as_deref())
}

fn build_graphql_endpoint(config: &Config, gql: &GraphQLDirective) -> Result<Endpoint> {
    let base = config.upstream.base_url.as_deref().ok_or_else(|| {
        Error::Config("@graphQL requires @upstream(baseURL: ...) to be set".to_string())
    })?;
    let path = gql.path.as_deref().unwrap_or("/graphql");
    // Forwards the merged parent value as the POST body rather than
    // assembling a `{query, variables}` envelope; only reachable once
    // `resolve_field_resolver` has confirmed `gql.args` is empty and
    // `gql.batch` is false, since both need machinery this core doesn't have
    // (see DESIGN.md).
    build_endpoint(base, "POST", path, &[], &[], Some(""))
}

fn build_endpoint(
    base_url: &str,
    method: &str,
    path: &str,
    query: &[directive::KeyValue],
    headers: &[directive::KeyValue],
    body: Option<&str>,
) -> Result<Endpoint> {
    let parsed = url::Url::parse(base_url)
        .map_err(|e| Error::Config(format!("invalid @upstream baseURL `{base_url}`: {e}")))?;
    let scheme = match parsed.scheme() {
        "https" => Scheme::Https,
        "http" => Scheme::Http,
        other => return Err(Error::Config(format!("unsupported upstream scheme `{other}`"))),
    };
    let host = parsed
        .host_str()
        .ok_or_else(|| Error::Config(format!("@upstream baseURL `{base_url}` has no host")))?;
    let method = Method::from_bytes(method.to_uppercase().as_bytes())
        .map_err(|_| Error::Config(format!("invalid HTTP method `{method}`")))?;

    let prefix = parsed.path().trim_end_matches('/');
    let suffix = if path.starts_with('/') { path.to_string() } else { format!("/{path}") };
    let full_path = format!("{prefix}{suffix}");

    let mut endpoint = Endpoint::new(method, scheme, host, full_path);
    endpoint.port = parsed.port();
    for kv in query {
        endpoint.query.push((kv.key.clone(), Mustache::parse(&kv.value)));
    }
    for kv in headers {
        endpoint.headers.push((kv.key.clone(), Mustache::parse(&kv.value)));
    }
    if let Some(body) = body {
        if !body.is_empty() {
            endpoint.body = Some(DotPath::parse(body));
        }
    }
    Ok(endpoint)
}

/// Compile one field's resolver, recursing through `@call` chains that name
/// sibling fields on the same type.
fn resolve_field_resolver(
    config: &Config,
    type_cfg: &TypeConfig,
    field_name: &str,
    field: &FieldConfig,
) -> Result<Option<Expr>> {
    if let Some(http) = &field.http {
        check_group_by_collision(field_name, http)?;
        let endpoint = build_http_endpoint(config, http)?;
        return Ok(Some(endpoint_call_resolver(endpoint, batch_hint(http))));
    }
    if let Some(gql) = &field.graphql {
        if gql.batch {
            return Err(Error::Config(format!(
                "field `{field_name}` uses @graphQL(batch: true), which this evaluation runtime does not execute: positional GraphQL-batch coalescing needs the caller's downstream selection set to synthesize each sibling's `query` text, and no selection-set AST flows into `Endpoint`/`DataLoader` at this layer (see DESIGN.md)"
            )));
        }
        if !gql.args.is_empty() {
            return Err(Error::Config(format!(
                "field `{field_name}` uses @graphQL(args: ...), which this evaluation runtime does not forward: synthesizing a `{{query, variables}}` envelope from field arguments is out of scope for this core (see DESIGN.md)"
            )));
        }
        let endpoint = build_graphql_endpoint(config, gql)?;
        return Ok(Some(endpoint_call_resolver(endpoint, None)));
    }
    if field.grpc.is_some() {
        return Err(Error::Config(format!(
            "field `{field_name}` uses @grpc, which is parsed but not executable by this evaluation runtime"
        )));
    }
    if let Some(value) = &field.const_value {
        let dv = DynamicValue::from_json(value);
        let schema = TSchema::infer(&dv);
        return Ok(Some(Expr::Literal(dv, schema)));
    }
    if let Some(value) = &field.expr {
        return Ok(Some(parse_expr_directive(value)?));
    }
    if let Some(call) = &field.call {
        let mut expr: Option<Expr> = None;
        for step_name in &call.steps {
            let step_field = type_cfg.fields.get(step_name).ok_or_else(|| {
                Error::Config(format!("@call: unknown step `{step_name}` from field `{field_name}`"))
            })?;
            let step_expr = resolve_field_resolver(config, type_cfg, step_name, step_field)?
                .ok_or_else(|| {
                    Error::Config(format!("@call: step `{step_name}` has no resolver of its own"))
                })?;
            expr = Some(match expr {
                Some(e) => e.pipe(step_expr),
                None => step_expr,
            });
        }
        return Ok(expr);
    }
    Ok(None)
}

fn compile_arg(config: &Config, name: &str, arg: &ArgConfig) -> Result<ArgumentDefinition> {
    let schema = resolve_schema(config, &arg.type_of, arg.list, arg.required)?;
    let default = match &arg.default {
        Some(v) => Some(DynamicValue::from_json(v)),
        None => None,
    };
    Ok(ArgumentDefinition { name: name.to_string(), schema, default, type_name: arg.type_of.clone() })
}

fn compile_field(config: &Config, type_cfg: &TypeConfig, name: &str, field: &FieldConfig) -> Result<FieldDefinition> {
    let output_type = resolve_output_type(config, field)?;
    let args = field
        .args
        .iter()
        .map(|(arg_name, arg)| compile_arg(config, arg_name, arg))
        .collect::<Result<Vec<_>>>()?;
    let resolver = resolve_field_resolver(config, type_cfg, name, field)?;
    let cache_max_age = field.cache.as_ref().map(|c| c.max_age);

    let name = match &field.modify {
        Some(ModifyDirective { name: Some(renamed), .. }) => renamed.clone(),
        _ => name.to_string(),
    };
    let resolver = match &field.modify {
        Some(ModifyDirective { inline, .. }) if !inline.is_empty() => {
            let inline_path = Expr::Dynamic(crate::expr::DynamicExpr::JsonTransform(
                crate::expr::JsonT::Path(inline.clone()),
            ));
            Some(match resolver {
                Some(e) => e.pipe(inline_path),
                None => inline_path,
            })
        }
        _ => resolver,
    };

    Ok(FieldDefinition {
        name,
        output_type,
        nullable: !field.required,
        args,
        resolver,
        batch: field.http.as_ref().and_then(batch_hint),
        cache_max_age,
        protected: field.protected || type_cfg.protected,
    })
}

fn compile_add_field(config: &Config, add: &AddFieldDirective) -> Result<FieldDefinition> {
    let output_type = resolve_output_type(
        config,
        &FieldConfig { type_of: add.type_of.clone(), ..FieldConfig::default() },
    )?;
    let resolver = Expr::Dynamic(crate::expr::DynamicExpr::JsonTransform(crate::expr::JsonT::Path(
        add.path.clone(),
    )));
    Ok(FieldDefinition {
        name: add.name.clone(),
        output_type,
        nullable: true,
        args: vec![],
        resolver: Some(resolver),
        batch: None,
        cache_max_age: None,
        protected: false,
    })
}

fn compile_type(config: &Config, name: &str, type_cfg: &TypeConfig) -> Result<TypeDef> {
    if type_cfg.input {
        let fields = type_cfg
            .fields
            .iter()
            .map(|(field_name, field)| {
                let schema = resolve_schema(config, &field.type_of, field.list, field.required)?;
                let default = field.const_value.as_ref().map(DynamicValue::from_json);
                Ok(InputFieldDefinition {
                    name: field_name.clone(),
                    schema,
                    default,
                    type_name: field.type_of.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        return Ok(TypeDef::Input(InputType { name: name.to_string(), fields }));
    }

    let mut fields = type_cfg
        .fields
        .iter()
        .filter(|(_, f)| !matches!(&f.modify, Some(ModifyDirective { omit: true, .. })))
        .map(|(field_name, field)| compile_field(config, type_cfg, field_name, field))
        .collect::<Result<Vec<_>>>()?;
    for add in &type_cfg.add_fields {
        fields.push(compile_add_field(config, add)?);
    }
    Ok(TypeDef::Object(ObjectType { name: name.to_string(), fields }))
}

fn compile_server(server: &ServerDirective) -> ServerConfig {
    let defaults = ServerConfig::default();
    ServerConfig {
        port: server.port.unwrap_or(defaults.port),
        hostname: server.hostname.clone().unwrap_or(defaults.hostname),
        timeout_ms: server.timeout,
        enable_federation: server.enable_federation.unwrap_or(defaults.enable_federation),
        introspection: server.introspection.unwrap_or(defaults.introspection),
        query_validation: server.query_validation.unwrap_or(defaults.query_validation),
        vars: server.vars.clone(),
    }
}

fn compile_upstream(upstream: &UpstreamDirective) -> UpstreamConfig {
    let defaults = UpstreamConfig::default();
    UpstreamConfig {
        base_url: upstream.base_url.clone(),
        http_cache: upstream.http_cache.unwrap_or(defaults.http_cache),
        allowed_headers: upstream.allowed_headers.clone(),
        batch_delay_ms: upstream.batch.as_ref().and_then(|b| b.delay).unwrap_or(defaults.batch_delay_ms),
        batch_max_size: upstream.batch.as_ref().and_then(|b| b.max_size).unwrap_or(defaults.batch_max_size),
        batch_headers: upstream.batch.as_ref().map(|b| b.headers.clone()).unwrap_or_default(),
        proxy: upstream.proxy.clone(),
    }
}

pub fn compile(config: &Config) -> Result<Blueprint> {
    let query = config
        .schema
        .query
        .clone()
        .ok_or_else(|| Error::Config("config declares no `schema.query` root".to_string()))?;
    if !config.types.contains_key(&query) {
        return Err(Error::Config(format!("schema.query root `{query}` is not a declared type")));
    }
    if let Some(mutation) = &config.schema.mutation {
        if !config.types.contains_key(mutation) {
            return Err(Error::Config(format!(
                "schema.mutation root `{mutation}` is not a declared type"
            )));
        }
    }

    let mut types = IndexMap::new();
    for (name, type_cfg) in &config.types {
        types.insert(name.clone(), compile_type(config, name, type_cfg)?);
    }

    tracing::debug!(types = types.len(), query = %query, "compiled blueprint from config");

    Ok(Blueprint {
        schema: SchemaRoots { query, mutation: config.schema.mutation.clone() },
        types,
        server: compile_server(&config.server),
        upstream: compile_upstream(&config.upstream),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> Config {
        let json = serde_json::json!({
            "server": {"port": 9000},
            "upstream": {"baseURL": "https://api.example.com"},
            "schema": {"query": "Query"},
            "types": {
                "Query": {
                    "fields": {
                        "user": {
                            "type": "User",
                            "args": {"id": {"type": "Int", "required": true}},
                            "http": {"path": "/users/{{args.id}}", "method": "GET"}
                        }
                    }
                },
                "User": {
                    "fields": {
                        "id": {"type": "Int", "required": true},
                        "name": {"type": "String"}
                    }
                }
            }
        });
        Config::decode_json(serde_json::to_vec(&json).unwrap().as_slice()).unwrap()
    }

    #[test]
    fn decode_json_round_trips_through_encode() {
        let config = sample_config();
        let bytes = config.encode_json().unwrap();
        let decoded = Config::decode_json(&bytes).unwrap();
        assert_eq!(config, decoded);
    }

    #[test]
    fn compress_strips_redundant_false_and_null_defaults() {
        let mut config = sample_config();
        config.server.enable_federation = Some(false);
        config.upstream.http_cache = Some(false);
        config.types.get_mut("Query").unwrap().fields.get_mut("user").unwrap().args.insert(
            "extra".to_string(),
            ArgConfig {
                type_of: "Int".to_string(),
                list: false,
                required: false,
                default: Some(serde_json::Value::Null),
            },
        );

        let compressed = config.compress();
        assert_eq!(compressed.server.enable_federation, None);
        assert_eq!(compressed.upstream.http_cache, None);
        assert_eq!(
            compressed.types["Query"].fields["user"].args["extra"].default,
            None
        );
    }

    #[test]
    fn encode_json_compresses_before_serializing() {
        let mut config = sample_config();
        config.server.introspection = Some(false);
        let bytes = config.encode_json().unwrap();
        let encoded: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(encoded["server"]["introspection"], serde_json::Value::Null);
    }

    #[test]
    fn compile_produces_an_http_resolver_for_the_query_field() {
        let config = sample_config();
        let blueprint = config.compile().unwrap();
        let query = blueprint.query_type().unwrap();
        let user_field = query.fields.iter().find(|f| f.name == "user").unwrap();
        assert!(user_field.resolver.is_some());
        assert_eq!(blueprint.server.port, 9000);
        assert_eq!(blueprint.upstream.base_url.as_deref(), Some("https://api.example.com"));
    }

    #[test]
    fn compile_rejects_missing_query_root() {
        let mut config = sample_config();
        config.schema.query = None;
        let err = config.compile().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn compile_rejects_grpc_fields_at_blueprint_time() {
        let mut config = sample_config();
        let query = config.types.get_mut("Query").unwrap();
        query.fields.get_mut("user").unwrap().http = None;
        query.fields.get_mut("user").unwrap().grpc = Some(GrpcDirective {
            service: Some("UserService".to_string()),
            method: Some("GetUser".to_string()),
            body: None,
            batch_key: vec![],
        });
        let err = config.compile().unwrap_err();
        match err {
            Error::Config(msg) => assert!(msg.contains("@grpc")),
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn compile_rejects_graphql_batch_at_blueprint_time() {
        let mut config = sample_config();
        let query = config.types.get_mut("Query").unwrap();
        query.fields.get_mut("user").unwrap().http = None;
        query.fields.get_mut("user").unwrap().graphql = Some(GraphQLDirective {
            name: "user".to_string(),
            args: vec![],
            batch: true,
            path: None,
        });
        let err = config.compile().unwrap_err();
        match err {
            Error::Config(msg) => assert!(msg.contains("@graphQL") && msg.contains("batch")),
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn compile_rejects_graphql_args_at_blueprint_time() {
        let mut config = sample_config();
        let query = config.types.get_mut("Query").unwrap();
        query.fields.get_mut("user").unwrap().http = None;
        query.fields.get_mut("user").unwrap().graphql = Some(GraphQLDirective {
            name: "user".to_string(),
            args: vec![directive::KeyValue { key: "id".to_string(), value: "{{args.id}}".to_string() }],
            batch: false,
            path: None,
        });
        let err = config.compile().unwrap_err();
        match err {
            Error::Config(msg) => assert!(msg.contains("@graphQL") && msg.contains("args")),
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn const_directive_compiles_to_a_literal_resolver() {
        let mut config = sample_config();
        let query = config.types.get_mut("Query").unwrap();
        query.fields.get_mut("user").unwrap().http = None;
        query.fields.get_mut("user").unwrap().const_value = Some(serde_json::json!({"id": 1, "name": "FOO"}));
        let blueprint = config.compile().unwrap();
        let field = blueprint.query_type().unwrap().fields.iter().find(|f| f.name == "user").unwrap();
        assert!(matches!(field.resolver, Some(Expr::Literal(..))));
    }

    #[test]
    fn group_by_colliding_with_a_literal_query_param_is_a_compile_error() {
        let mut config = sample_config();
        let query = config.types.get_mut("Query").unwrap();
        let http = query.fields.get_mut("user").unwrap().http.as_mut().unwrap();
        http.query.push(directive::KeyValue { key: "fooId".to_string(), value: "1".to_string() });
        http.group_by = vec!["fooId".to_string()];
        http.batch_key = vec!["fooId".to_string()];

        let err = config.compile().unwrap_err();
        match err {
            Error::Config(msg) => assert!(msg.contains("fooId") && msg.contains("collides")),
            other => panic!("expected Config error, got {other:?}"),
        }
    }
}
