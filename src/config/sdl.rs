//! GraphQL-SDL codec for [`Config`](super::Config): the `schema { ... }` +
//! directive-annotated type surface from spec §6 "Config formats".
//!
//! Decoding walks a [`graphql_parser`] document; encoding is a hand-rolled
//! printer over `Config` directly (simpler and more predictable than
//! re-assembling a `graphql_parser` AST just to print it).

use super::directive::{
    AddFieldDirective, BatchDirective, CacheDirective, CallDirective, GraphQLDirective,
    GrpcDirective, HttpDirective, KeyValue, ModifyDirective, ServerDirective, UpstreamDirective,
};
use super::{ArgConfig, Config, FieldConfig, TypeConfig};
use crate::error::{Error, Result};
use graphql_parser::schema::{
    Definition, Directive as GqlDirective, Document, Field as GqlField, Type as GqlType,
    TypeDefinition, Value as GqlValue,
};
use indexmap::IndexMap;
use std::fmt::Write as _;

pub fn decode_sdl(source: &str) -> Result<Config> {
    let document: Document<'_, String> = graphql_parser::schema::parse_schema::<String>(source)
        .map_err(|e| Error::Config(format!("invalid SDL: {e}")))?;

    let mut config = Config::default();

    for definition in &document.definitions {
        match definition {
            Definition::SchemaDefinition(schema) => {
                config.schema.query = schema.query.clone();
                config.schema.mutation = schema.mutation.clone();
                for directive in &schema.directives {
                    apply_schema_level_directive(&mut config, directive)?;
                }
            }
            Definition::TypeDefinition(TypeDefinition::Object(obj)) => {
                let mut type_cfg = TypeConfig::default();
                for directive in &obj.directives {
                    if directive.name == "addField" {
                        type_cfg.add_fields.push(parse_add_field(directive)?);
                    } else if directive.name == "protected" {
                        type_cfg.protected = true;
                    }
                }
                for field in &obj.fields {
                    type_cfg.fields.insert(field.name.clone(), decode_field(field)?);
                }
                config.types.insert(obj.name.clone(), type_cfg);
            }
            Definition::TypeDefinition(TypeDefinition::InputObject(input)) => {
                let mut type_cfg = TypeConfig { input: true, ..TypeConfig::default() };
                for value in &input.fields {
                    let (type_of, list, required) = type_shape(&value.value_type);
                    type_cfg.fields.insert(
                        value.name.clone(),
                        FieldConfig {
                            type_of,
                            list,
                            required,
                            const_value: value.default_value.as_ref().map(value_to_json),
                            ..FieldConfig::default()
                        },
                    );
                }
                config.types.insert(input.name.clone(), type_cfg);
            }
            // Scalars, interfaces, unions, enums and directive definitions are
            // round-trip-neutral for this gateway's resolver model and are
            // not represented in `Config` (spec.md Non-goals: no bespoke
            // scalar/interface resolution logic).
            _ => {}
        }
    }

    Ok(config)
}

fn decode_field(field: &GqlField<'_, String>) -> Result<FieldConfig> {
    let (type_of, list, required) = type_shape(&field.field_type);
    let mut cfg = FieldConfig { type_of, list, required, ..FieldConfig::default() };

    for arg in &field.arguments {
        let (arg_type, arg_list, arg_required) = type_shape(&arg.value_type);
        cfg.args.insert(
            arg.name.clone(),
            ArgConfig {
                type_of: arg_type,
                list: arg_list,
                required: arg_required,
                default: arg.default_value.as_ref().map(value_to_json),
            },
        );
    }

    for directive in &field.directives {
        match directive.name.as_str() {
            "http" => cfg.http = Some(parse_http(directive)?),
            "graphQL" => cfg.graphql = Some(parse_graphql(directive)?),
            "grpc" => cfg.grpc = Some(parse_grpc(directive)),
            "const" => {
                cfg.const_value = Some(
                    get_arg(directive, "data")
                        .map(value_to_json)
                        .unwrap_or(serde_json::Value::Null),
                )
            }
            "expr" => {
                cfg.expr = Some(
                    get_arg(directive, "body")
                        .map(value_to_json)
                        .unwrap_or(serde_json::Value::Null),
                )
            }
            "modify" => cfg.modify = Some(parse_modify(directive)),
            "call" => cfg.call = Some(parse_call(directive)),
            "cache" => cfg.cache = Some(parse_cache(directive)?),
            "protected" => cfg.protected = true,
            _ => {}
        }
    }

    Ok(cfg)
}

fn apply_schema_level_directive(config: &mut Config, directive: &GqlDirective<'_, String>) -> Result<()> {
    match directive.name.as_str() {
        "server" => config.server = parse_server(directive),
        "upstream" => config.upstream = parse_upstream(directive),
        _ => {}
    }
    Ok(())
}

fn type_shape(t: &GqlType<'_, String>) -> (String, bool, bool) {
    match t {
        GqlType::NonNullType(inner) => {
            let (name, list, _) = type_shape(inner);
            (name, list, true)
        }
        GqlType::ListType(inner) => {
            let (name, _, _) = type_shape(inner);
            (name, true, false)
        }
        GqlType::NamedType(name) => (name.clone(), false, false),
    }
}

fn get_arg<'a, 'd>(dir: &'d GqlDirective<'a, String>, name: &str) -> Option<&'d GqlValue<'a, String>> {
    dir.arguments.iter().find(|(k, _)| k == name).map(|(_, v)| v)
}

fn value_to_json(v: &GqlValue<'_, String>) -> serde_json::Value {
    match v {
        GqlValue::Variable(_) | GqlValue::Null => serde_json::Value::Null,
        GqlValue::Int(n) => serde_json::json!(n.as_i64().unwrap_or(0)),
        GqlValue::Float(f) => serde_json::json!(f),
        GqlValue::String(s) => serde_json::json!(s),
        GqlValue::Boolean(b) => serde_json::json!(b),
        GqlValue::Enum(e) => serde_json::json!(e),
        GqlValue::List(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
        GqlValue::Object(map) => {
            serde_json::Value::Object(map.iter().map(|(k, v)| (k.clone(), value_to_json(v))).collect())
        }
    }
}

fn value_to_string(v: &GqlValue<'_, String>) -> Option<String> {
    match v {
        GqlValue::String(s) => Some(s.clone()),
        GqlValue::Enum(e) => Some(e.clone()),
        _ => None,
    }
}

fn value_to_u64(v: &GqlValue<'_, String>) -> Option<u64> {
    match v {
        GqlValue::Int(n) => n.as_i64().map(|i| i.max(0) as u64),
        _ => None,
    }
}

fn value_to_bool(v: &GqlValue<'_, String>) -> Option<bool> {
    match v {
        GqlValue::Boolean(b) => Some(*b),
        _ => None,
    }
}

fn value_to_string_list(v: &GqlValue<'_, String>) -> Vec<String> {
    match v {
        GqlValue::List(items) => items.iter().filter_map(value_to_string).collect(),
        other => value_to_string(other).into_iter().collect(),
    }
}

/// `@http(key: "value", ...)`-style object arguments decode as key/value
/// pairs, used for `query`/`headers`.
fn value_to_kv_list(v: &GqlValue<'_, String>) -> Vec<KeyValue> {
    match v {
        GqlValue::Object(map) => map
            .iter()
            .filter_map(|(k, v)| value_to_string(v).map(|value| KeyValue { key: k.clone(), value }))
            .collect(),
        GqlValue::List(items) => items
            .iter()
            .filter_map(|item| match item {
                GqlValue::Object(map) => {
                    let key = map.get("key").and_then(value_to_string)?;
                    let value = map.get("value").and_then(value_to_string)?;
                    Some(KeyValue { key, value })
                }
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn parse_http(dir: &GqlDirective<'_, String>) -> Result<HttpDirective> {
    let path = get_arg(dir, "path")
        .and_then(value_to_string)
        .ok_or_else(|| Error::Config("@http requires a `path` argument".to_string()))?;
    Ok(HttpDirective {
        path,
        method: get_arg(dir, "method").and_then(value_to_string).unwrap_or_else(|| "GET".to_string()),
        query: get_arg(dir, "query").map(value_to_kv_list).unwrap_or_default(),
        headers: get_arg(dir, "headers").map(value_to_kv_list).unwrap_or_default(),
        body: get_arg(dir, "body").and_then(value_to_string),
        batch_key: get_arg(dir, "batchKey").map(value_to_string_list).unwrap_or_default(),
        group_by: get_arg(dir, "groupBy").map(value_to_string_list).unwrap_or_default(),
    })
}

fn parse_graphql(dir: &GqlDirective<'_, String>) -> Result<GraphQLDirective> {
    let name = get_arg(dir, "name")
        .and_then(value_to_string)
        .ok_or_else(|| Error::Config("@graphQL requires a `name` argument".to_string()))?;
    Ok(GraphQLDirective {
        name,
        args: get_arg(dir, "args").map(value_to_kv_list).unwrap_or_default(),
        batch: get_arg(dir, "batch").and_then(value_to_bool).unwrap_or(false),
        path: get_arg(dir, "path").and_then(value_to_string),
    })
}

fn parse_grpc(dir: &GqlDirective<'_, String>) -> GrpcDirective {
    GrpcDirective {
        service: get_arg(dir, "service").and_then(value_to_string),
        method: get_arg(dir, "method").and_then(value_to_string),
        body: get_arg(dir, "body").and_then(value_to_string),
        batch_key: get_arg(dir, "batchKey").map(value_to_string_list).unwrap_or_default(),
    }
}

fn parse_modify(dir: &GqlDirective<'_, String>) -> ModifyDirective {
    ModifyDirective {
        name: get_arg(dir, "name").and_then(value_to_string),
        omit: get_arg(dir, "omit").and_then(value_to_bool).unwrap_or(false),
        inline: get_arg(dir, "inline").map(value_to_string_list).unwrap_or_default(),
    }
}

fn parse_call(dir: &GqlDirective<'_, String>) -> CallDirective {
    CallDirective { steps: get_arg(dir, "steps").map(value_to_string_list).unwrap_or_default() }
}

fn parse_cache(dir: &GqlDirective<'_, String>) -> Result<CacheDirective> {
    let max_age = get_arg(dir, "maxAge")
        .and_then(value_to_u64)
        .ok_or_else(|| Error::Config("@cache requires an integer `maxAge` argument".to_string()))?;
    Ok(CacheDirective { max_age })
}

fn parse_add_field(dir: &GqlDirective<'_, String>) -> Result<AddFieldDirective> {
    let name = get_arg(dir, "name")
        .and_then(value_to_string)
        .ok_or_else(|| Error::Config("@addField requires a `name` argument".to_string()))?;
    let type_of = get_arg(dir, "type")
        .and_then(value_to_string)
        .ok_or_else(|| Error::Config("@addField requires a `type` argument".to_string()))?;
    let path = get_arg(dir, "path").map(value_to_string_list).unwrap_or_default();
    Ok(AddFieldDirective { name, path, type_of })
}

fn parse_server(dir: &GqlDirective<'_, String>) -> ServerDirective {
    let mut vars = IndexMap::new();
    if let Some(GqlValue::Object(map)) = get_arg(dir, "vars") {
        for (k, v) in map {
            if let Some(s) = value_to_string(v) {
                vars.insert(k.clone(), s);
            }
        }
    }
    ServerDirective {
        port: get_arg(dir, "port").and_then(value_to_u64).map(|p| p as u16),
        hostname: get_arg(dir, "hostname").and_then(value_to_string),
        timeout: get_arg(dir, "timeout").and_then(value_to_u64),
        enable_federation: get_arg(dir, "enableFederation").and_then(value_to_bool),
        introspection: get_arg(dir, "introspection").and_then(value_to_bool),
        query_validation: get_arg(dir, "queryValidation").and_then(value_to_bool),
        vars,
    }
}

fn parse_upstream(dir: &GqlDirective<'_, String>) -> UpstreamDirective {
    let batch = if get_arg(dir, "batchDelay").is_some()
        || get_arg(dir, "batchMaxSize").is_some()
        || get_arg(dir, "batchHeaders").is_some()
    {
        Some(BatchDirective {
            delay: get_arg(dir, "batchDelay").and_then(value_to_u64),
            max_size: get_arg(dir, "batchMaxSize").and_then(value_to_u64).map(|n| n as usize),
            headers: get_arg(dir, "batchHeaders").map(value_to_string_list).unwrap_or_default(),
        })
    } else {
        None
    };
    UpstreamDirective {
        base_url: get_arg(dir, "baseURL").and_then(value_to_string),
        http_cache: get_arg(dir, "httpCache").and_then(value_to_bool),
        allowed_headers: get_arg(dir, "allowedHeaders").map(value_to_string_list).unwrap_or_default(),
        batch,
        proxy: get_arg(dir, "proxy").and_then(value_to_string),
    }
}

/// Print a `Config` back out as GraphQL SDL. Only round-trips the subset of
/// directive arguments `decode_sdl` understands; unknown-to-us directives
/// never survive a JSON/YAML → SDL → JSON/YAML trip (documented in
/// DESIGN.md as the SDL surface's scope boundary).
pub fn encode_sdl(config: &Config) -> Result<String> {
    let config = config.clone().compress();
    let config = &config;
    let mut out = String::new();

    write!(out, "schema").unwrap();
    write_schema_directives(&mut out, config);
    writeln!(out, " {{").unwrap();
    if let Some(query) = &config.schema.query {
        writeln!(out, "  query: {query}").unwrap();
    }
    if let Some(mutation) = &config.schema.mutation {
        writeln!(out, "  mutation: {mutation}").unwrap();
    }
    writeln!(out, "}}\n").unwrap();

    for (name, type_cfg) in &config.types {
        if type_cfg.input {
            writeln!(out, "input {name} {{").unwrap();
            for (field_name, field) in &type_cfg.fields {
                writeln!(out, "  {field_name}: {}", render_type(field)).unwrap();
            }
            writeln!(out, "}}\n").unwrap();
            continue;
        }

        write!(out, "type {name}").unwrap();
        if type_cfg.protected {
            write!(out, " @protected").unwrap();
        }
        for add in &type_cfg.add_fields {
            write!(
                out,
                " @addField(name: \"{}\", type: \"{}\", path: [{}])",
                add.name,
                add.type_of,
                quoted_list(&add.path)
            )
            .unwrap();
        }
        writeln!(out, " {{").unwrap();
        for (field_name, field) in &type_cfg.fields {
            write!(out, "  {field_name}").unwrap();
            if !field.args.is_empty() {
                let args = field
                    .args
                    .iter()
                    .map(|(n, a)| format!("{n}: {}", render_arg_type(a)))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(out, "({args})").unwrap();
            }
            write!(out, ": {}", render_type(field)).unwrap();
            write_field_directives(&mut out, field);
            writeln!(out).unwrap();
        }
        writeln!(out, "}}\n").unwrap();
    }

    Ok(out)
}

fn quoted_list(items: &[String]) -> String {
    items.iter().map(|s| format!("\"{s}\"")).collect::<Vec<_>>().join(", ")
}

fn render_type(field: &FieldConfig) -> String {
    render_shape(&field.type_of, field.list, field.required)
}

fn render_arg_type(arg: &ArgConfig) -> String {
    render_shape(&arg.type_of, arg.list, arg.required)
}

fn render_shape(type_of: &str, list: bool, required: bool) -> String {
    let base = if list { format!("[{type_of}]") } else { type_of.to_string() };
    if required {
        format!("{base}!")
    } else {
        base
    }
}

/// Render a `key: "value"` list as SDL's `[{key: "...", value: "..."}]`
/// object-list form, the same shape `value_to_kv_list` decodes back.
fn render_kv_list(items: &[KeyValue]) -> String {
    let rendered = items
        .iter()
        .map(|kv| format!("{{key: \"{}\", value: \"{}\"}}", kv.key, kv.value))
        .collect::<Vec<_>>()
        .join(", ");
    format!("[{rendered}]")
}

fn write_schema_directives(out: &mut String, config: &Config) {
    let server = &config.server;
    if *server != ServerDirective::default() {
        let mut parts = Vec::new();
        if let Some(port) = server.port {
            parts.push(format!("port: {port}"));
        }
        if let Some(host) = &server.hostname {
            parts.push(format!("hostname: \"{host}\""));
        }
        if let Some(timeout) = server.timeout {
            parts.push(format!("timeout: {timeout}"));
        }
        if let Some(enable_federation) = server.enable_federation {
            parts.push(format!("enableFederation: {enable_federation}"));
        }
        if let Some(introspection) = server.introspection {
            parts.push(format!("introspection: {introspection}"));
        }
        if let Some(query_validation) = server.query_validation {
            parts.push(format!("queryValidation: {query_validation}"));
        }
        if !server.vars.is_empty() {
            let vars = server
                .vars
                .iter()
                .map(|(k, v)| format!("{k}: \"{v}\""))
                .collect::<Vec<_>>()
                .join(", ");
            parts.push(format!("vars: {{{vars}}}"));
        }
        write!(out, " @server({})", parts.join(", ")).unwrap();
    }

    let upstream = &config.upstream;
    if *upstream != UpstreamDirective::default() {
        let mut parts = Vec::new();
        if let Some(base_url) = &upstream.base_url {
            parts.push(format!("baseURL: \"{base_url}\""));
        }
        if let Some(http_cache) = upstream.http_cache {
            parts.push(format!("httpCache: {http_cache}"));
        }
        if !upstream.allowed_headers.is_empty() {
            parts.push(format!("allowedHeaders: [{}]", quoted_list(&upstream.allowed_headers)));
        }
        if let Some(batch) = &upstream.batch {
            if let Some(delay) = batch.delay {
                parts.push(format!("batchDelay: {delay}"));
            }
            if let Some(max_size) = batch.max_size {
                parts.push(format!("batchMaxSize: {max_size}"));
            }
            if !batch.headers.is_empty() {
                parts.push(format!("batchHeaders: [{}]", quoted_list(&batch.headers)));
            }
        }
        if let Some(proxy) = &upstream.proxy {
            parts.push(format!("proxy: \"{proxy}\""));
        }
        write!(out, " @upstream({})", parts.join(", ")).unwrap();
    }
}

fn write_field_directives(out: &mut String, field: &FieldConfig) {
    if let Some(http) = &field.http {
        let mut parts = vec![format!("path: \"{}\"", http.path), format!("method: \"{}\"", http.method)];
        if !http.query.is_empty() {
            parts.push(format!("query: {}", render_kv_list(&http.query)));
        }
        if !http.headers.is_empty() {
            parts.push(format!("headers: {}", render_kv_list(&http.headers)));
        }
        if let Some(body) = &http.body {
            parts.push(format!("body: \"{body}\""));
        }
        if !http.batch_key.is_empty() {
            parts.push(format!("batchKey: [{}]", quoted_list(&http.batch_key)));
        }
        if !http.group_by.is_empty() {
            parts.push(format!("groupBy: [{}]", quoted_list(&http.group_by)));
        }
        write!(out, " @http({})", parts.join(", ")).unwrap();
    }
    if let Some(gql) = &field.graphql {
        let mut parts = vec![format!("name: \"{}\"", gql.name)];
        if !gql.args.is_empty() {
            parts.push(format!("args: {}", render_kv_list(&gql.args)));
        }
        if gql.batch {
            parts.push("batch: true".to_string());
        }
        if let Some(path) = &gql.path {
            parts.push(format!("path: \"{path}\""));
        }
        write!(out, " @graphQL({})", parts.join(", ")).unwrap();
    }
    if let Some(grpc) = &field.grpc {
        let mut parts = Vec::new();
        if let Some(service) = &grpc.service {
            parts.push(format!("service: \"{service}\""));
        }
        if let Some(method) = &grpc.method {
            parts.push(format!("method: \"{method}\""));
        }
        if let Some(body) = &grpc.body {
            parts.push(format!("body: \"{body}\""));
        }
        if !grpc.batch_key.is_empty() {
            parts.push(format!("batchKey: [{}]", quoted_list(&grpc.batch_key)));
        }
        write!(out, " @grpc({})", parts.join(", ")).unwrap();
    }
    if let Some(value) = &field.const_value {
        write!(out, " @const(data: {value})").unwrap();
    }
    if let Some(body) = &field.expr {
        write!(out, " @expr(body: {body})").unwrap();
    }
    if let Some(modify) = &field.modify {
        let mut parts = Vec::new();
        if let Some(name) = &modify.name {
            parts.push(format!("name: \"{name}\""));
        }
        if modify.omit {
            parts.push("omit: true".to_string());
        }
        if !modify.inline.is_empty() {
            parts.push(format!("inline: [{}]", quoted_list(&modify.inline)));
        }
        write!(out, " @modify({})", parts.join(", ")).unwrap();
    }
    if let Some(call) = &field.call {
        write!(out, " @call(steps: [{}])", quoted_list(&call.steps)).unwrap();
    }
    if field.protected {
        write!(out, " @protected").unwrap();
    }
    if let Some(cache) = &field.cache {
        write!(out, " @cache(maxAge: {})", cache.max_age).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_sdl_parses_schema_root_and_http_field() {
        let source = r#"
            schema @server(port: 9000) @upstream(baseURL: "https://api.example.com") {
              query: Query
            }

            type Query {
              user(id: Int!): User @http(path: "/users/{{args.id}}", method: "GET")
            }

            type User @protected {
              id: Int!
              name: String
            }
        "#;

        let config = decode_sdl(source).unwrap();
        assert_eq!(config.schema.query.as_deref(), Some("Query"));
        assert_eq!(config.server.port, Some(9000));
        assert_eq!(config.upstream.base_url.as_deref(), Some("https://api.example.com"));

        let user_field = &config.types["Query"].fields["user"];
        assert_eq!(user_field.type_of, "User");
        assert!(user_field.args["id"].required);
        let http = user_field.http.as_ref().unwrap();
        assert_eq!(http.path, "/users/{{args.id}}");
        assert_eq!(http.method, "GET");

        assert!(config.types["User"].protected);
        assert!(!config.types["User"].fields["name"].required);
    }

    #[test]
    fn decode_sdl_parses_const_and_cache_directives() {
        let source = r#"
            schema { query: Query }
            type Query {
              greeting: String @const(data: "hello") @cache(maxAge: 60)
            }
        "#;

        let config = decode_sdl(source).unwrap();
        let field = &config.types["Query"].fields["greeting"];
        assert_eq!(field.const_value, Some(serde_json::json!("hello")));
        assert_eq!(field.cache.as_ref().unwrap().max_age, 60);
    }

    #[test]
    fn encode_sdl_round_trips_query_root_and_http_directive() {
        let mut config = Config { schema: super::super::SchemaDirective { query: Some("Query".to_string()), mutation: None }, ..Config::default() };
        let mut fields = IndexMap::new();
        fields.insert(
            "user".to_string(),
            FieldConfig {
                type_of: "User".to_string(),
                http: Some(HttpDirective {
                    path: "/users".to_string(),
                    method: "GET".to_string(),
                    query: vec![],
                    headers: vec![],
                    body: None,
                    batch_key: vec![],
                    group_by: vec![],
                }),
                ..FieldConfig::default()
            },
        );
        config.types.insert("Query".to_string(), TypeConfig { fields, ..TypeConfig::default() });

        let sdl = encode_sdl(&config).unwrap();
        assert!(sdl.contains("query: Query"));
        assert!(sdl.contains("@http(path: \"/users\", method: \"GET\")"));

        let decoded = decode_sdl(&sdl).unwrap();
        assert_eq!(decoded.schema.query.as_deref(), Some("Query"));
        assert_eq!(decoded.types["Query"].fields["user"].http.as_ref().unwrap().path, "/users");
    }
}
