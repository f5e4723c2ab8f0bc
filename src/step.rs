//! StepGenerator: walks a blueprint field to produce the resolver step that
//! glues `Expr` evaluation to GraphQL type dispatch. See spec §4.5.
//!
//! `@modify`/`@inline` (§4.6) are applied earlier, at blueprint-compile
//! time in `config`: renaming a field is just writing a different
//! `FieldDefinition::name`, and `@inline(path)` is folded into the
//! resolver's `Expr` graph as a trailing `Dynamic::path` pipe. By the time a
//! `Step` is built here both have already taken effect, matching the rule
//! that they apply "at step-construction time, not at evaluation time."

use crate::blueprint::{Blueprint, FieldDefinition, OutputType};
use crate::expr::Expr;
use crate::value::DynamicValue;

#[derive(Debug, Clone)]
pub enum Step {
    /// Already-resolved value: a field with no resolver wraps its parent's
    /// value (spec §4.5 rule 1), or a leaf scalar once dispatch completes.
    Pure(DynamicValue),
    /// `FunctionStep(args -> Step)`: field arguments merged with their
    /// schema-declared defaults, wrapping the `Query`/`Pure` step that
    /// consumes them. Every field invocation is wrapped in exactly one of
    /// these before its inner step runs (spec §4.5 glossary "Step").
    Function(DynamicValue, Box<Step>),
    /// A resolver expression awaiting evaluation by the `EvaluationRuntime`;
    /// its result becomes `ctx.value` for the field's own child selection
    /// (spec §4.5 rule 2).
    Query(Expr),
    /// Resolved value dispatched to a named object type for further field
    /// selection (rule 3); recursive types resolve because the blueprint's
    /// type table is keyed by name rather than by eagerly-built pointer, so
    /// no explicit two-pass slot-filling is needed here.
    Object(String, DynamicValue),
    /// Resolved sequence; each element dispatches per the inner output type
    /// (rule 4).
    List(Vec<Step>),
}

pub struct StepGenerator<'a> {
    blueprint: &'a Blueprint,
}

impl<'a> StepGenerator<'a> {
    pub fn new(blueprint: &'a Blueprint) -> Self {
        Self { blueprint }
    }

    /// `FunctionStep`: merge the arguments a query actually supplied with
    /// any defaults the field declares.
    pub fn merge_args(&self, field: &FieldDefinition, provided: &DynamicValue) -> DynamicValue {
        let mut merged = provided.as_object().cloned().unwrap_or_default();
        for arg in &field.args {
            if !merged.contains_key(&arg.name) {
                if let Some(default) = &arg.default {
                    merged.insert(arg.name.clone(), default.clone());
                }
            }
        }
        DynamicValue::Object(merged)
    }

    /// Build the `FunctionStep` for one field invocation: the merged
    /// arguments, wrapping either a `Query` (resolver present) or a `Pure`
    /// passthrough of the parent value (rules 1-2).
    pub fn field_step(
        &self,
        field: &FieldDefinition,
        parent_value: &DynamicValue,
        provided_args: &DynamicValue,
    ) -> Step {
        let args = self.merge_args(field, provided_args);
        let inner = match &field.resolver {
            Some(expr) => Step::Query(expr.clone()),
            None => Step::Pure(parent_value.clone()),
        };
        Step::Function(args, Box::new(inner))
    }

    /// After a field's value is known (whether via `Pure` or an evaluated
    /// `Query`), dispatch it through the declared output type (rules 3-4).
    pub fn dispatch(&self, output_type: &OutputType, value: DynamicValue) -> Step {
        match output_type {
            OutputType::List(inner) => match value {
                DynamicValue::Array(items) => {
                    Step::List(items.into_iter().map(|item| self.dispatch(inner, item)).collect())
                }
                other => Step::Pure(other),
            },
            OutputType::Named(name) => {
                debug_assert!(
                    self.blueprint.object_type(name).is_some() || self.blueprint.types.contains_key(name),
                    "dispatch to undeclared type {name}"
                );
                Step::Object(name.clone(), value)
            }
            OutputType::Scalar(_) => Step::Pure(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprint::{ArgumentDefinition, ObjectType, SchemaRoots, ServerConfig, TypeDef, UpstreamConfig};
    use crate::value::TSchema;
    use indexmap::IndexMap;

    fn blueprint_with(field: FieldDefinition) -> Blueprint {
        let mut types = IndexMap::new();
        types.insert(
            "Query".to_string(),
            TypeDef::Object(ObjectType {
                name: "Query".to_string(),
                fields: vec![field],
            }),
        );
        Blueprint {
            schema: SchemaRoots { query: "Query".to_string(), mutation: None },
            types,
            server: ServerConfig::default(),
            upstream: UpstreamConfig::default(),
        }
    }

    #[test]
    fn merge_args_fills_in_declared_defaults() {
        let field = FieldDefinition {
            name: "widgets".to_string(),
            output_type: OutputType::Scalar(TSchema::Int),
            nullable: true,
            args: vec![ArgumentDefinition {
                name: "limit".to_string(),
                schema: TSchema::Int,
                default: Some(DynamicValue::Int(10)),
                type_name: "Int".to_string(),
            }],
            resolver: None,
            batch: None,
            cache_max_age: None,
            protected: false,
        };
        let bp = blueprint_with(field.clone());
        let gen = StepGenerator::new(&bp);

        let merged = gen.merge_args(&field, &DynamicValue::empty_object());
        assert_eq!(merged.get_segment("limit"), Some(&DynamicValue::Int(10)));

        let provided = DynamicValue::object([("limit".to_string(), DynamicValue::Int(5))]);
        let merged = gen.merge_args(&field, &provided);
        assert_eq!(merged.get_segment("limit"), Some(&DynamicValue::Int(5)));
    }

    #[test]
    fn field_step_wraps_merged_args_in_a_function_step() {
        let field = FieldDefinition {
            name: "widgets".to_string(),
            output_type: OutputType::Scalar(TSchema::Int),
            nullable: true,
            args: vec![ArgumentDefinition {
                name: "limit".to_string(),
                schema: TSchema::Int,
                default: Some(DynamicValue::Int(10)),
                type_name: "Int".to_string(),
            }],
            resolver: None,
            batch: None,
            cache_max_age: None,
            protected: false,
        };
        let bp = blueprint_with(field.clone());
        let gen = StepGenerator::new(&bp);
        let step = gen.field_step(&field, &DynamicValue::Null, &DynamicValue::empty_object());
        match step {
            Step::Function(args, _) => {
                assert_eq!(args.get_segment("limit"), Some(&DynamicValue::Int(10)));
            }
            _ => panic!("expected Function step"),
        }
    }

    #[test]
    fn field_with_no_resolver_passes_through_parent_value() {
        let field = FieldDefinition {
            name: "name".to_string(),
            output_type: OutputType::Scalar(TSchema::String),
            nullable: false,
            args: vec![],
            resolver: None,
            batch: None,
            cache_max_age: None,
            protected: false,
        };
        let bp = blueprint_with(field.clone());
        let gen = StepGenerator::new(&bp);
        let parent = DynamicValue::String("FOO".into());
        let step = gen.field_step(&field, &parent, &DynamicValue::empty_object());
        match step {
            Step::Function(_, inner) => match *inner {
                Step::Pure(v) => assert_eq!(v, parent),
                _ => panic!("expected Pure inner step"),
            },
            _ => panic!("expected Function step"),
        }
    }

    #[test]
    fn list_output_dispatches_each_element() {
        let field = FieldDefinition {
            name: "items".to_string(),
            output_type: OutputType::List(Box::new(OutputType::Scalar(TSchema::Int))),
            nullable: false,
            args: vec![],
            resolver: None,
            batch: None,
            cache_max_age: None,
            protected: false,
        };
        let bp = blueprint_with(field.clone());
        let gen = StepGenerator::new(&bp);
        let value = DynamicValue::Array(vec![DynamicValue::Int(1), DynamicValue::Int(2)]);
        match gen.dispatch(&field.output_type, value) {
            Step::List(items) => assert_eq!(items.len(), 2),
            _ => panic!("expected List step"),
        }
    }

    #[test]
    fn named_output_dispatches_to_object_step() {
        let field = FieldDefinition {
            name: "user".to_string(),
            output_type: OutputType::Named("User".to_string()),
            nullable: true,
            args: vec![],
            resolver: None,
            batch: None,
            cache_max_age: None,
            protected: false,
        };
        let bp = blueprint_with(field.clone());
        let gen = StepGenerator::new(&bp);
        let value = DynamicValue::object([("id".to_string(), DynamicValue::Int(1))]);
        match gen.dispatch(&field.output_type, value) {
            Step::Object(name, _) => assert_eq!(name, "User"),
            _ => panic!("expected Object step"),
        }
    }
}
