//! Expression: the tagged-variant IR interpreted by the
//! [`EvaluationRuntime`](crate::eval). See spec §3 "Expression" / §4.2.

use crate::endpoint::Endpoint;
use crate::value::{DynamicValue, TSchema};
use std::sync::Arc;

/// Identifies a lexical binding introduced by `FunctionDef`. Bindings are
/// small integers assigned freshly at compile time (spec §9 "Lexical
/// binding") rather than dynamic variables.
pub type BindingId = u32;

#[derive(Debug, Clone)]
pub enum Expr {
    Literal(DynamicValue, TSchema),
    /// Yields the current input unchanged.
    Identity,
    /// `Pipe(a, b).eval(x) = b.eval(a.eval(x))`.
    Pipe(Box<Expr>, Box<Expr>),
    FunctionDef(BindingId, Box<Expr>),
    Lookup(BindingId),
    /// `tag` is the declared `TSchema` both operands are checked against
    /// before comparison (spec §3 `EqualTo(l, r, tag)`).
    EqualTo(Box<Expr>, Box<Expr>, TSchema),
    Math(MathExpr),
    Logical(LogicalExpr),
    Opt(OptExpr),
    Dict(DictExpr),
    Dynamic(DynamicExpr),
    Unsafe(UnsafeExpr),
}

impl Expr {
    pub fn pipe(self, next: Expr) -> Expr {
        Expr::Pipe(Box::new(self), Box::new(next))
    }
}

/// Each variant carries the `tag` parameter spec §3 attaches to `Math(op,
/// tag)`: the declared `TSchema` its operand(s) are checked against before
/// the arithmetic/comparison runs.
#[derive(Debug, Clone)]
pub enum MathExpr {
    Add(Box<Expr>, Box<Expr>, TSchema),
    Sub(Box<Expr>, Box<Expr>, TSchema),
    Mul(Box<Expr>, Box<Expr>, TSchema),
    Div(Box<Expr>, Box<Expr>, TSchema),
    Mod(Box<Expr>, Box<Expr>, TSchema),
    Gt(Box<Expr>, Box<Expr>, TSchema),
    Gte(Box<Expr>, Box<Expr>, TSchema),
    Neg(Box<Expr>, TSchema),
}

#[derive(Debug, Clone)]
pub enum LogicalExpr {
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Cond {
        cond: Box<Expr>,
        then: Box<Expr>,
        els: Box<Expr>,
    },
}

#[derive(Debug, Clone)]
pub enum OptExpr {
    IsSome(Box<Expr>),
    IsNone(Box<Expr>),
    /// Evaluate `none` if the operand is `Null`/absent, else evaluate `some`
    /// with the unwrapped payload bound via an enclosing `FunctionDef`.
    Fold {
        opt: Box<Expr>,
        none: Box<Expr>,
        some: Box<Expr>,
    },
    /// Unwrap `Some(x) -> x`, fail evaluation on `None`.
    Apply(Box<Expr>),
    /// Wrap a value as `Enum("Some", x)`.
    Wrap(Box<Expr>),
}

#[derive(Debug, Clone)]
pub enum DictExpr {
    Get { key: Box<Expr>, map: Box<Expr> },
    Put { key: Box<Expr>, value: Box<Expr>, map: Box<Expr> },
    ToPair(Box<Expr>),
}

/// A minimal declarative reshape used by `Dynamic::jsonTransform`: project
/// sub-paths and rebuild an object from them. Missing paths become `Null`
/// rather than failing, matching `Dynamic::path`'s total semantics.
#[derive(Debug, Clone)]
pub enum JsonT {
    Identity,
    Path(Vec<String>),
    Object(Vec<(String, JsonT)>),
    Array(Vec<JsonT>),
}

impl JsonT {
    pub fn apply(&self, dv: &DynamicValue) -> DynamicValue {
        match self {
            JsonT::Identity => dv.clone(),
            JsonT::Path(path) => dv.project(path).cloned().unwrap_or(DynamicValue::Null),
            JsonT::Object(fields) => DynamicValue::object(
                fields
                    .iter()
                    .map(|(name, t)| (name.clone(), t.apply(dv))),
            ),
            JsonT::Array(items) => DynamicValue::Array(items.iter().map(|t| t.apply(dv)).collect()),
        }
    }
}

/// Batching hint attached to an endpoint call: when present, the
/// `DataLoader` accumulates calls sharing the same endpoint shape into a
/// batch window instead of dispatching immediately. See spec §4.3(b).
#[derive(Debug, Clone)]
pub struct BatchHint {
    pub group_by: Vec<String>,
    pub batch_key: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum DynamicExpr {
    ToTyped(TSchema, Box<Expr>),
    ToDynamic(TSchema, Box<Expr>),
    Path(Vec<String>),
    JsonTransform(JsonT),
}

#[derive(Debug, Clone)]
pub enum UnsafeExpr {
    EndpointCall {
        endpoint: Arc<Endpoint>,
        batch: Option<BatchHint>,
    },
    Debug(String, Box<Expr>),
    Die(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipe_builder_nests_boxes() {
        let expr = Expr::Identity.pipe(Expr::Logical(LogicalExpr::Not(Box::new(Expr::Identity))));
        match expr {
            Expr::Pipe(a, b) => {
                assert!(matches!(*a, Expr::Identity));
                assert!(matches!(*b, Expr::Logical(LogicalExpr::Not(_))));
            }
            _ => panic!("expected Pipe"),
        }
    }

    #[test]
    fn json_transform_object_projects_missing_as_null() {
        let t = JsonT::Object(vec![
            ("name".to_string(), JsonT::Path(vec!["name".to_string()])),
            ("missing".to_string(), JsonT::Path(vec!["nope".to_string()])),
        ]);
        let dv = DynamicValue::object([("name".to_string(), DynamicValue::String("FOO".into()))]);
        let out = t.apply(&dv);
        assert_eq!(
            out.get_segment("missing"),
            Some(&DynamicValue::Null)
        );
    }
}
