//! Builds an `async-graphql` dynamic [`Schema`](AsyncSchema) from a compiled
//! [`Blueprint`], and executes fields by driving [`StepGenerator`] and
//! [`EvaluationRuntime`] against per-request [`eval::Context`]s threaded
//! through `async-graphql`'s resolver context. See spec §4 "Dispatch" and
//! §10.6 (request-scoped `DataLoader`/`Context` injection).

use crate::blueprint::{ArgumentDefinition, Blueprint, FieldDefinition, OutputType, TypeDef};
use crate::dataloader::DataLoader;
use crate::error::{Error, Result};
use crate::eval::{Bindings, Context as EvalContext, EvaluationRuntime};
use crate::step::{Step, StepGenerator};
use crate::value::{DynamicValue, TSchema};
use async_graphql::dynamic::{
    Field, FieldFuture, FieldValue, InputObject, InputValue, Object, ResolverContext,
    Schema as AsyncSchema, TypeRef,
};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Dynamic schema wrapper, mirroring the shape every caller (runtime, CLI
/// `check`) expects: an executor plus the blueprint it was built from.
#[derive(Clone)]
pub struct DynamicSchema {
    inner: AsyncSchema,
    pub blueprint: Arc<Blueprint>,
}

impl DynamicSchema {
    /// Execute a GraphQL request.
    pub async fn execute(&self, request: async_graphql::Request) -> async_graphql::Response {
        self.inner.execute(request).await
    }

    /// Access the executor directly (used by `async-graphql-axum` handlers).
    pub fn executor(&self) -> AsyncSchema {
        self.inner.clone()
    }
}

/// Builds a [`DynamicSchema`] from a [`Blueprint`].
pub struct SchemaBuilder {
    blueprint: Option<Arc<Blueprint>>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self { blueprint: None }
    }

    pub fn with_blueprint(mut self, blueprint: Arc<Blueprint>) -> Self {
        self.blueprint = Some(blueprint);
        self
    }

    pub fn build(self) -> Result<DynamicSchema> {
        let blueprint = self
            .blueprint
            .ok_or_else(|| Error::Config("schema builder requires a blueprint".to_string()))?;

        let mut registry = TypeRegistry::default();

        let query_name = blueprint.schema.query.clone();
        registry.ensure_object(&blueprint, &query_name)?;
        let query_obj = registry
            .objects
            .remove(&query_name)
            .expect("query root was just registered");

        let mutation_obj = match &blueprint.schema.mutation {
            Some(mutation_name) => {
                registry.ensure_object(&blueprint, mutation_name)?;
                Some(
                    registry
                        .objects
                        .remove(mutation_name)
                        .expect("mutation root was just registered"),
                )
            }
            None => None,
        };

        let mut schema_builder = AsyncSchema::build(
            query_obj.type_name(),
            mutation_obj.as_ref().map(Object::type_name),
            None,
        );

        schema_builder = schema_builder.register(query_obj);
        if let Some(mutation_obj) = mutation_obj {
            schema_builder = schema_builder.register(mutation_obj);
        }
        for (_, obj) in registry.objects {
            schema_builder = schema_builder.register(obj);
        }
        for (_, input) in registry.input_objects {
            schema_builder = schema_builder.register(input);
        }

        if !blueprint.server.introspection {
            schema_builder = schema_builder.disable_introspection();
        }

        let schema = schema_builder
            .finish()
            .map_err(|e| Error::Config(format!("failed to build GraphQL schema: {e}")))?;

        Ok(DynamicSchema { inner: schema, blueprint })
    }
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks objects/input objects already built, plus a `building` reservation
/// set. A name is reserved in `building` *before* its fields are walked, so a
/// type that refers to itself (directly or through a cycle) sees its own name
/// already known and returns a `TypeRef` rather than recursing forever.
#[derive(Default)]
struct TypeRegistry {
    objects: HashMap<String, Object>,
    input_objects: HashMap<String, InputObject>,
    building: HashSet<String>,
}

impl TypeRegistry {
    fn ensure_object(&mut self, blueprint: &Arc<Blueprint>, name: &str) -> Result<TypeRef> {
        if self.objects.contains_key(name) || self.building.contains(name) {
            return Ok(TypeRef::named(name));
        }
        let object_type = blueprint
            .object_type(name)
            .ok_or_else(|| Error::Config(format!("type `{name}` is not a declared object type")))?;

        self.building.insert(name.to_string());
        let mut obj = Object::new(name);
        for field in &object_type.fields {
            let gql_field = self.build_field(blueprint, field)?;
            obj = obj.field(gql_field);
        }
        self.building.remove(name);

        self.objects.insert(name.to_string(), obj);
        Ok(TypeRef::named(name))
    }

    fn ensure_input_object(&mut self, blueprint: &Arc<Blueprint>, name: &str) -> Result<TypeRef> {
        if self.input_objects.contains_key(name) || self.building.contains(name) {
            return Ok(TypeRef::named(name));
        }
        let input_type = match blueprint.types.get(name) {
            Some(TypeDef::Input(input)) => input,
            _ => return Err(Error::Config(format!("type `{name}` is not a declared input type"))),
        };

        self.building.insert(name.to_string());
        let mut input = InputObject::new(name);
        for field in &input_type.fields {
            let ty = self.type_ref_for_named(blueprint, &field.type_name, &field.schema, true)?;
            let mut iv = InputValue::new(&field.name, ty);
            if let Some(default) = &field.default {
                iv = iv.default_value(default.to_graphql_value());
            }
            input = input.field(iv);
        }
        self.building.remove(name);

        self.input_objects.insert(name.to_string(), input);
        Ok(TypeRef::named(name))
    }

    /// Resolve the `TypeRef` for a declared type name (`"Int"`, a scalar, or
    /// a named input/object type), shaped by `schema`'s `Optional`/`Array`
    /// wrapping. Used for arguments and input-object fields, both of which
    /// carry their original GraphQL type name alongside a flattened
    /// `TSchema`.
    fn type_ref_for_named(
        &mut self,
        blueprint: &Arc<Blueprint>,
        type_name: &str,
        schema: &TSchema,
        is_input: bool,
    ) -> Result<TypeRef> {
        let (nullable, list) = schema_shape(schema);
        let base = if let Some(scalar) = scalar_type_ref_by_name(type_name) {
            scalar
        } else if is_input {
            self.ensure_input_object(blueprint, type_name)?
        } else {
            self.ensure_object(blueprint, type_name)?
        };

        let mut ty = base;
        if list {
            ty = TypeRef::List(Box::new(TypeRef::NonNull(Box::new(ty))));
        }
        if !nullable {
            ty = TypeRef::NonNull(Box::new(ty));
        }
        Ok(ty)
    }

    /// Resolve the `TypeRef` for a field's declared [`OutputType`]. List
    /// elements are always non-null by convention; the outer nullability
    /// follows `FieldDefinition::nullable`.
    fn type_ref_for_output(
        &mut self,
        blueprint: &Arc<Blueprint>,
        output_type: &OutputType,
        nullable: bool,
    ) -> Result<TypeRef> {
        match output_type {
            OutputType::Scalar(schema) => {
                let base = scalar_type_ref_for_schema(schema);
                Ok(wrap_nullable(base, nullable))
            }
            OutputType::Named(name) => {
                if matches!(blueprint.types.get(name), Some(TypeDef::Input(_))) {
                    return Err(Error::Config(format!(
                        "field returns `{name}`, which is declared as an input type"
                    )));
                }
                let base = self.ensure_object(blueprint, name)?;
                Ok(wrap_nullable(base, nullable))
            }
            OutputType::List(inner) => {
                let elem = self.type_ref_for_output(blueprint, inner, false)?;
                let list = TypeRef::List(Box::new(elem));
                Ok(wrap_nullable(list, nullable))
            }
        }
    }

    fn build_field(&mut self, blueprint: &Arc<Blueprint>, field: &FieldDefinition) -> Result<Field> {
        let ty = self.type_ref_for_output(blueprint, &field.output_type, field.nullable)?;

        let mut arg_specs = Vec::with_capacity(field.args.len());
        for arg in &field.args {
            let arg_ty = self.type_ref_for_named(blueprint, &arg.type_name, &arg.schema, true)?;
            arg_specs.push((arg.name.clone(), arg_ty, arg.default.clone()));
        }

        let field_def = field.clone();
        let bp = blueprint.clone();
        let mut gql_field = Field::new(field.name.clone(), ty, move |ctx| {
            let field_def = field_def.clone();
            let bp = bp.clone();
            FieldFuture::new(async move { resolve_field(&bp, &field_def, ctx).await })
        });

        for (name, ty, default) in arg_specs {
            let mut iv = InputValue::new(name, ty);
            if let Some(default) = default {
                iv = iv.default_value(default.to_graphql_value());
            }
            gql_field = gql_field.argument(iv);
        }

        Ok(gql_field)
    }
}

fn wrap_nullable(ty: TypeRef, nullable: bool) -> TypeRef {
    if nullable {
        ty
    } else {
        TypeRef::NonNull(Box::new(ty))
    }
}

/// Whether `schema` is `Optional` (nullable) and/or an `Array` (list),
/// unwrapping at most one level of each — the shape `resolve_schema`
/// actually produces for arguments and input fields (spec §3 "TSchema").
fn schema_shape(schema: &TSchema) -> (bool, bool) {
    match schema {
        TSchema::Optional(inner) => {
            let (_, list) = schema_shape(inner);
            (true, list)
        }
        TSchema::Array(_) => (false, true),
        _ => (false, false),
    }
}

fn scalar_type_ref_by_name(type_name: &str) -> Option<TypeRef> {
    match type_name {
        "String" => Some(TypeRef::named(TypeRef::STRING)),
        "Int" | "Float" => Some(TypeRef::named(TypeRef::INT)),
        "Boolean" | "Bool" => Some(TypeRef::named(TypeRef::BOOLEAN)),
        "ID" => Some(TypeRef::named(TypeRef::ID)),
        _ => None,
    }
}

/// `OutputType::Scalar` only ever carries `TSchema::{String,Int,Bool}`
/// (`resolve_output_type` never produces anything else); the original
/// `Int`-vs-`Float`/`String`-vs-`ID` distinction isn't retained past that
/// point, so both widen to their `TSchema` counterpart here.
fn scalar_type_ref_for_schema(schema: &TSchema) -> TypeRef {
    match schema {
        TSchema::String => TypeRef::named(TypeRef::STRING),
        TSchema::Int => TypeRef::named(TypeRef::INT),
        TSchema::Bool => TypeRef::named(TypeRef::BOOLEAN),
        _ => TypeRef::named(TypeRef::STRING),
    }
}

/// Fetch the evaluation context this field resolves against: the parent
/// field's own context if we're nested under one (threaded via
/// `FieldValue::owned_any`), or the request's root context injected as
/// request-local data otherwise (spec §10.6).
fn parent_context(ctx: &ResolverContext<'_>) -> async_graphql::Result<Arc<EvalContext>> {
    if let Some(parent) = ctx.parent_value.downcast_ref::<Arc<EvalContext>>() {
        return Ok(parent.clone());
    }
    ctx.data::<Arc<EvalContext>>()
        .cloned()
        .map_err(|_| async_graphql::Error::new("no evaluation context available for this field"))
}

fn read_args(ctx: &ResolverContext<'_>, args: &[ArgumentDefinition]) -> DynamicValue {
    let mut map = IndexMap::new();
    for arg in args {
        if let Some(accessor) = ctx.args.get(&arg.name) {
            map.insert(arg.name.clone(), DynamicValue::from_graphql_value(accessor.as_value()));
        }
    }
    DynamicValue::Object(map)
}

async fn resolve_field(
    blueprint: &Arc<Blueprint>,
    field: &FieldDefinition,
    ctx: ResolverContext<'_>,
) -> async_graphql::Result<Option<FieldValue<'static>>> {
    let parent_ctx = parent_context(&ctx)?;
    let loader = ctx
        .data::<Arc<DataLoader>>()
        .map_err(|_| async_graphql::Error::new("missing request-scoped DataLoader"))?
        .clone();

    let provided_args = read_args(&ctx, &field.args);
    let step_gen = StepGenerator::new(blueprint);

    // A field with no resolver of its own wraps its parent *object's own
    // property of the same name* (spec §4.5 rule 1) — the ordinary default
    // field-resolution convention. A field with a resolver ignores this
    // projection entirely: `field_step`'s `Query` branch never looks at it.
    let own_property = parent_ctx
        .value
        .get_segment(&field.name)
        .cloned()
        .unwrap_or(DynamicValue::Null);

    // Every field invocation is wrapped in a `FunctionStep` (spec §4.5
    // glossary "Step"): unwrap it to get the merged arguments and the
    // `Query`/`Pure` step that consumes them.
    let (merged_args, inner_step) = match step_gen.field_step(field, &own_property, &provided_args) {
        Step::Function(args, inner) => (args, *inner),
        _ => unreachable!("StepGenerator::field_step always returns a Function step"),
    };

    let field_ctx = Arc::new(EvalContext::child(
        parent_ctx.clone(),
        parent_ctx.value.clone(),
        merged_args,
    ));

    let resolved = match inner_step {
        Step::Pure(value) => value,
        Step::Query(expr) => {
            let runtime = EvaluationRuntime::new(loader);
            let mut bindings = Bindings::new();
            runtime
                .evaluate(&expr, &mut bindings, &field_ctx.to_value())
                .await
                .map_err(|e| async_graphql::Error::new(e.to_string()))?
        }
        Step::Function(..) | Step::Object(..) | Step::List(_) => {
            unreachable!("StepGenerator::field_step only ever wraps Pure or Query")
        }
    };

    let dispatched = step_gen.dispatch(&field.output_type, resolved);
    Ok(step_into_field_value(dispatched, &field_ctx))
}

/// Convert a dispatched [`Step`] into the `FieldValue` async-graphql expects:
/// a plain scalar/list value for `Pure`, or a new request-scoped context
/// carried by pointer for `Object`, so the object's own fields can recover it
/// via [`parent_context`].
fn step_into_field_value(step: Step, parent: &Arc<EvalContext>) -> Option<FieldValue<'static>> {
    match step {
        Step::Pure(value) => {
            if value.is_null() {
                None
            } else {
                Some(FieldValue::value(value.to_graphql_value()))
            }
        }
        Step::Object(_name, value) => {
            let child = Arc::new(EvalContext::child(parent.clone(), value, DynamicValue::empty_object()));
            Some(FieldValue::owned_any(child))
        }
        Step::List(items) => Some(FieldValue::list(
            items.into_iter().filter_map(|item| step_into_field_value(item, parent)),
        )),
        Step::Function(..) | Step::Query(_) => {
            unreachable!("StepGenerator::dispatch only ever produces Pure, Object, or List")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprint::{
        endpoint_call_resolver, ArgumentDefinition, ObjectType, SchemaRoots, ServerConfig,
        UpstreamConfig,
    };
    use crate::dataloader::{Upstream, UpstreamResponse};
    use crate::endpoint::{Endpoint, Request, Scheme};
    use http::Method;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockUpstream {
        calls: AtomicUsize,
        responder: Box<dyn Fn(&Request) -> UpstreamResponse + Send + Sync>,
    }

    impl MockUpstream {
        fn new(responder: impl Fn(&Request) -> UpstreamResponse + Send + Sync + 'static) -> Arc<Self> {
            Arc::new(Self { calls: AtomicUsize::new(0), responder: Box::new(responder) })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl Upstream for MockUpstream {
        async fn send(&self, request: &Request) -> Result<UpstreamResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok((self.responder)(request))
        }
    }

    fn json_response(body: serde_json::Value) -> UpstreamResponse {
        UpstreamResponse { status: 200, headers: vec![], body: serde_json::to_vec(&body).unwrap() }
    }

    /// `Query { user(id: Int!): User }`, `User { id: Int!, name: String,
    /// friend: User }`: the self-referential `friend` field exercises the
    /// cycle-safe registry.
    fn sample_blueprint() -> Blueprint {
        let user_endpoint = Endpoint::new(Method::GET, Scheme::Https, "api.example.com", "/users/{{args.id}}");
        let user_field = FieldDefinition {
            name: "user".to_string(),
            output_type: OutputType::Named("User".to_string()),
            nullable: true,
            args: vec![ArgumentDefinition {
                name: "id".to_string(),
                schema: TSchema::Int,
                default: None,
                type_name: "Int".to_string(),
            }],
            resolver: Some(endpoint_call_resolver(user_endpoint, None)),
            batch: None,
            cache_max_age: None,
            protected: false,
        };
        let id_field = FieldDefinition {
            name: "id".to_string(),
            output_type: OutputType::Scalar(TSchema::Int),
            nullable: false,
            args: vec![],
            resolver: None,
            batch: None,
            cache_max_age: None,
            protected: false,
        };
        // No resolver: resolves to the parent User object's own "name"
        // property, per the default field-resolution convention.
        let name_field = FieldDefinition {
            name: "name".to_string(),
            output_type: OutputType::Scalar(TSchema::String),
            nullable: true,
            args: vec![],
            resolver: None,
            batch: None,
            cache_max_age: None,
            protected: false,
        };
        let friend_field = FieldDefinition {
            name: "friend".to_string(),
            output_type: OutputType::Named("User".to_string()),
            nullable: true,
            args: vec![],
            resolver: None,
            batch: None,
            cache_max_age: None,
            protected: false,
        };

        let mut types = IndexMap::new();
        types.insert(
            "Query".to_string(),
            TypeDef::Object(ObjectType { name: "Query".to_string(), fields: vec![user_field] }),
        );
        types.insert(
            "User".to_string(),
            TypeDef::Object(ObjectType {
                name: "User".to_string(),
                fields: vec![id_field, name_field, friend_field],
            }),
        );

        Blueprint {
            schema: SchemaRoots { query: "Query".to_string(), mutation: None },
            types,
            server: ServerConfig::default(),
            upstream: UpstreamConfig::default(),
        }
    }

    fn root_eval_context() -> Arc<EvalContext> {
        Arc::new(EvalContext::root(
            DynamicValue::Null,
            DynamicValue::empty_object(),
            DynamicValue::empty_object(),
        ))
    }

    #[test]
    fn self_referential_type_does_not_recurse_forever() {
        let blueprint = Arc::new(sample_blueprint());
        let schema = SchemaBuilder::new().with_blueprint(blueprint).build();
        assert!(schema.is_ok(), "cyclic User.friend: User must not hang/stack-overflow the builder");
    }

    #[tokio::test]
    async fn field_selection_resolves_through_http_and_projects_parent_value() {
        let upstream = MockUpstream::new(|_| json_response(serde_json::json!({"id": 1, "name": "Ada"})));
        let loader = DataLoader::new(upstream.clone(), None);

        let blueprint = Arc::new(sample_blueprint());
        let schema = SchemaBuilder::new().with_blueprint(blueprint).build().unwrap();

        let request = async_graphql::Request::new("{ user(id: 1) { id name } }")
            .data(root_eval_context())
            .data(loader);
        let response = schema.execute(request).await;

        assert!(response.errors.is_empty(), "unexpected errors: {:?}", response.errors);
        let data = response.data.into_json().unwrap();
        assert_eq!(data["user"]["id"], serde_json::json!(1));
        assert_eq!(data["user"]["name"], serde_json::json!("Ada"));
        assert_eq!(upstream.call_count(), 1);
    }

    #[tokio::test]
    async fn duplicate_field_selections_dedupe_through_the_request_scoped_loader() {
        let upstream = MockUpstream::new(|_| json_response(serde_json::json!({"id": 1, "name": "Ada"})));
        let loader = DataLoader::new(upstream.clone(), None);

        let blueprint = Arc::new(sample_blueprint());
        let schema = SchemaBuilder::new().with_blueprint(blueprint).build().unwrap();

        // Two aliased selections of the same logical endpoint call within a
        // single request must still hit the upstream exactly once (spec
        // §4.3(a) "Deduplication").
        let request = async_graphql::Request::new("{ a: user(id: 1) { id } b: user(id: 1) { id } }")
            .data(root_eval_context())
            .data(loader);
        let response = schema.execute(request).await;

        assert!(response.errors.is_empty(), "unexpected errors: {:?}", response.errors);
        assert_eq!(upstream.call_count(), 1);
    }
}
