//! EvaluationRuntime: the interpreter for [`Expr`](crate::expr::Expr), plus
//! `Context` and `Bindings`. See spec §3 "Context" / §4.2 / §9 "Lexical
//! binding".

use crate::dataloader::DataLoader;
use crate::error::{Error, Result};
use crate::expr::{BindingId, DictExpr, DynamicExpr, Expr, LogicalExpr, MathExpr, OptExpr, UnsafeExpr};
use crate::value::DynamicValue;
use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;

/// Per-field input to a resolver expression: `{value, args, parent, headers,
/// vars}`. Dropped when the field completes.
#[derive(Debug, Clone)]
pub struct Context {
    pub value: DynamicValue,
    pub args: DynamicValue,
    pub parent: Option<Arc<Context>>,
    pub headers: DynamicValue,
    pub vars: DynamicValue,
}

impl Context {
    pub fn root(value: DynamicValue, headers: DynamicValue, vars: DynamicValue) -> Self {
        Self {
            value,
            args: DynamicValue::empty_object(),
            parent: None,
            headers,
            vars,
        }
    }

    /// Build the context for a child field, inheriting `headers`/`vars` from
    /// the parent and pointing `parent` at it for templating against
    /// grandparents.
    pub fn child(parent: Arc<Context>, value: DynamicValue, args: DynamicValue) -> Self {
        Self {
            value,
            args,
            headers: parent.headers.clone(),
            vars: parent.vars.clone(),
            parent: Some(parent),
        }
    }

    /// Flatten into the `DynamicValue` a resolver expression is evaluated
    /// against.
    pub fn to_value(&self) -> DynamicValue {
        DynamicValue::object([
            ("value".to_string(), self.value.clone()),
            ("args".to_string(), self.args.clone()),
            (
                "parent".to_string(),
                self.parent
                    .as_ref()
                    .map(|p| p.to_value())
                    .unwrap_or(DynamicValue::Null),
            ),
            ("headers".to_string(), self.headers.clone()),
            ("vars".to_string(), self.vars.clone()),
        ])
    }
}

/// Lexical binding table: a stack rather than a dynamic variable, per spec
/// §9. Lookup scans from the top so shadowing a binding id (nested
/// `FunctionDef`s reusing an id is never produced by the compiler, but
/// shadowing is still handled correctly if it ever occurs).
#[derive(Debug, Default, Clone)]
pub struct Bindings(Vec<(BindingId, Arc<DynamicValue>)>);

impl Bindings {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    fn push(&mut self, id: BindingId, value: Arc<DynamicValue>) {
        self.0.push((id, value));
    }

    fn pop(&mut self) {
        self.0.pop();
    }

    fn lookup(&self, id: BindingId) -> Option<Arc<DynamicValue>> {
        self.0.iter().rev().find(|(bid, _)| *bid == id).map(|(_, v)| v.clone())
    }
}

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn from_value(v: &DynamicValue) -> Result<Num> {
        match v {
            DynamicValue::Int(i) => Ok(Num::Int(*i)),
            DynamicValue::Float(f) => Ok(Num::Float(*f)),
            _ => Err(Error::Evaluation("expected a numeric value".to_string())),
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }
}

fn as_bool(v: &DynamicValue) -> Result<bool> {
    match v {
        DynamicValue::Bool(b) => Ok(*b),
        _ => Err(Error::Evaluation("expected a boolean value".to_string())),
    }
}

fn is_some(v: &DynamicValue) -> bool {
    !matches!(v, DynamicValue::Null)
}

/// Unwrap the `Enum("Some", payload)`/`Null` optional convention. Any other
/// value is treated as an implicit `Some` (a plain value standing in for an
/// always-present optional).
fn unwrap_some(v: &DynamicValue) -> Option<DynamicValue> {
    match v {
        DynamicValue::Null => None,
        DynamicValue::Enum(tag, payload) if tag == "Some" => Some((**payload).clone()),
        other => Some(other.clone()),
    }
}

/// Single-threaded cooperative interpreter for [`Expr`]. One instance is
/// shared by every field resolution within a request; it carries no
/// per-call state of its own besides a reference to that request's
/// `DataLoader`.
pub struct EvaluationRuntime {
    loader: Arc<DataLoader>,
}

impl EvaluationRuntime {
    pub fn new(loader: Arc<DataLoader>) -> Self {
        Self { loader }
    }

    /// `evaluate(expr, bindings) -> value`, the single entry point named in
    /// spec §2.4.
    pub fn evaluate<'a>(
        &'a self,
        expr: &'a Expr,
        bindings: &'a mut Bindings,
        input: &'a DynamicValue,
    ) -> BoxFuture<'a, Result<DynamicValue>> {
        async move {
            match expr {
                Expr::Literal(value, schema) => {
                    if schema.matches(value) {
                        Ok(value.clone())
                    } else {
                        Err(Error::Evaluation(
                            "literal value does not match its declared schema".to_string(),
                        ))
                    }
                }
                Expr::Identity => Ok(input.clone()),
                Expr::Pipe(a, b) => {
                    let mid = self.evaluate(a, bindings, input).await?;
                    self.evaluate(b, bindings, &mid).await
                }
                Expr::FunctionDef(id, body) => {
                    bindings.push(*id, Arc::new(input.clone()));
                    let result = self.evaluate(body, bindings, input).await;
                    bindings.pop();
                    result
                }
                Expr::Lookup(id) => bindings
                    .lookup(*id)
                    .map(|v| (*v).clone())
                    .ok_or_else(|| Error::Evaluation(format!("no binding for id {id}"))),
                Expr::EqualTo(l, r, tag) => {
                    let lv = self.evaluate(l, bindings, input).await?;
                    let rv = self.evaluate(r, bindings, input).await?;
                    if !tag.matches(&lv) || !tag.matches(&rv) {
                        return Err(Error::Evaluation(
                            "EqualTo operand does not match the declared tag schema".to_string(),
                        ));
                    }
                    Ok(DynamicValue::Bool(lv == rv))
                }
                Expr::Math(m) => self.eval_math(m, bindings, input).await,
                Expr::Logical(l) => self.eval_logical(l, bindings, input).await,
                Expr::Opt(o) => self.eval_opt(o, bindings, input).await,
                Expr::Dict(d) => self.eval_dict(d, bindings, input).await,
                Expr::Dynamic(d) => self.eval_dynamic(d, bindings, input).await,
                Expr::Unsafe(u) => self.eval_unsafe(u, bindings, input).await,
            }
        }
        .boxed()
    }

    async fn eval_numeric_pair(
        &self,
        l: &Expr,
        r: &Expr,
        tag: &crate::value::TSchema,
        bindings: &mut Bindings,
        input: &DynamicValue,
    ) -> Result<(Num, Num)> {
        let lv = self.evaluate(l, bindings, input).await?;
        let rv = self.evaluate(r, bindings, input).await?;
        if !tag.matches(&lv) || !tag.matches(&rv) {
            return Err(Error::Evaluation(
                "Math operand does not match the declared tag schema".to_string(),
            ));
        }
        Ok((Num::from_value(&lv)?, Num::from_value(&rv)?))
    }

    async fn eval_math(
        &self,
        expr: &MathExpr,
        bindings: &mut Bindings,
        input: &DynamicValue,
    ) -> Result<DynamicValue> {
        match expr {
            MathExpr::Add(l, r, tag) => {
                let (a, b) = self.eval_numeric_pair(l, r, tag, bindings, input).await?;
                Ok(match (a, b) {
                    (Num::Int(x), Num::Int(y)) => DynamicValue::Int(x.wrapping_add(y)),
                    (a, b) => DynamicValue::Float(a.as_f64() + b.as_f64()),
                })
            }
            MathExpr::Sub(l, r, tag) => {
                let (a, b) = self.eval_numeric_pair(l, r, tag, bindings, input).await?;
                Ok(match (a, b) {
                    (Num::Int(x), Num::Int(y)) => DynamicValue::Int(x.wrapping_sub(y)),
                    (a, b) => DynamicValue::Float(a.as_f64() - b.as_f64()),
                })
            }
            MathExpr::Mul(l, r, tag) => {
                let (a, b) = self.eval_numeric_pair(l, r, tag, bindings, input).await?;
                Ok(match (a, b) {
                    (Num::Int(x), Num::Int(y)) => DynamicValue::Int(x.wrapping_mul(y)),
                    (a, b) => DynamicValue::Float(a.as_f64() * b.as_f64()),
                })
            }
            MathExpr::Div(l, r, tag) => {
                let (a, b) = self.eval_numeric_pair(l, r, tag, bindings, input).await?;
                if b.as_f64() == 0.0 {
                    return Err(Error::Evaluation("division by zero".to_string()));
                }
                Ok(match (a, b) {
                    (Num::Int(x), Num::Int(y)) => DynamicValue::Int(x / y),
                    (a, b) => DynamicValue::Float(a.as_f64() / b.as_f64()),
                })
            }
            MathExpr::Mod(l, r, tag) => {
                let (a, b) = self.eval_numeric_pair(l, r, tag, bindings, input).await?;
                if b.as_f64() == 0.0 {
                    return Err(Error::Evaluation("modulo by zero".to_string()));
                }
                Ok(match (a, b) {
                    (Num::Int(x), Num::Int(y)) => DynamicValue::Int(x % y),
                    (a, b) => DynamicValue::Float(a.as_f64() % b.as_f64()),
                })
            }
            MathExpr::Gt(l, r, tag) => {
                let (a, b) = self.eval_numeric_pair(l, r, tag, bindings, input).await?;
                Ok(DynamicValue::Bool(a.as_f64() > b.as_f64()))
            }
            MathExpr::Gte(l, r, tag) => {
                let (a, b) = self.eval_numeric_pair(l, r, tag, bindings, input).await?;
                Ok(DynamicValue::Bool(a.as_f64() >= b.as_f64()))
            }
            MathExpr::Neg(x, tag) => {
                let v = self.evaluate(x, bindings, input).await?;
                if !tag.matches(&v) {
                    return Err(Error::Evaluation(
                        "Math operand does not match the declared tag schema".to_string(),
                    ));
                }
                match Num::from_value(&v)? {
                    Num::Int(i) => Ok(DynamicValue::Int(-i)),
                    Num::Float(f) => Ok(DynamicValue::Float(-f)),
                }
            }
        }
    }

    async fn eval_logical(
        &self,
        expr: &LogicalExpr,
        bindings: &mut Bindings,
        input: &DynamicValue,
    ) -> Result<DynamicValue> {
        match expr {
            LogicalExpr::And(l, r) => {
                if !as_bool(&self.evaluate(l, bindings, input).await?)? {
                    return Ok(DynamicValue::Bool(false));
                }
                Ok(DynamicValue::Bool(as_bool(
                    &self.evaluate(r, bindings, input).await?,
                )?))
            }
            LogicalExpr::Or(l, r) => {
                if as_bool(&self.evaluate(l, bindings, input).await?)? {
                    return Ok(DynamicValue::Bool(true));
                }
                Ok(DynamicValue::Bool(as_bool(
                    &self.evaluate(r, bindings, input).await?,
                )?))
            }
            LogicalExpr::Not(x) => {
                let v = as_bool(&self.evaluate(x, bindings, input).await?)?;
                Ok(DynamicValue::Bool(!v))
            }
            LogicalExpr::Cond { cond, then, els } => {
                if as_bool(&self.evaluate(cond, bindings, input).await?)? {
                    self.evaluate(then, bindings, input).await
                } else {
                    self.evaluate(els, bindings, input).await
                }
            }
        }
    }

    async fn eval_opt(
        &self,
        expr: &OptExpr,
        bindings: &mut Bindings,
        input: &DynamicValue,
    ) -> Result<DynamicValue> {
        match expr {
            OptExpr::IsSome(x) => {
                let v = self.evaluate(x, bindings, input).await?;
                Ok(DynamicValue::Bool(is_some(&v)))
            }
            OptExpr::IsNone(x) => {
                let v = self.evaluate(x, bindings, input).await?;
                Ok(DynamicValue::Bool(!is_some(&v)))
            }
            OptExpr::Fold { opt, none, some } => {
                let v = self.evaluate(opt, bindings, input).await?;
                match unwrap_some(&v) {
                    Some(payload) => self.evaluate(some, bindings, &payload).await,
                    None => self.evaluate(none, bindings, input).await,
                }
            }
            OptExpr::Apply(x) => {
                let v = self.evaluate(x, bindings, input).await?;
                unwrap_some(&v)
                    .ok_or_else(|| Error::Evaluation("applied Opt::apply to None".to_string()))
            }
            OptExpr::Wrap(x) => {
                let v = self.evaluate(x, bindings, input).await?;
                Ok(DynamicValue::Enum("Some".to_string(), Box::new(v)))
            }
        }
    }

    async fn eval_dict(
        &self,
        expr: &DictExpr,
        bindings: &mut Bindings,
        input: &DynamicValue,
    ) -> Result<DynamicValue> {
        match expr {
            DictExpr::Get { key, map } => {
                let k = self.evaluate(key, bindings, input).await?;
                let m = self.evaluate(map, bindings, input).await?;
                let key_str = k
                    .as_str()
                    .ok_or_else(|| Error::Evaluation("Dict::get key must be a string".to_string()))?;
                let obj = m
                    .as_object()
                    .ok_or_else(|| Error::Evaluation("Dict::get target must be an object".to_string()))?;
                Ok(obj.get(key_str).cloned().unwrap_or(DynamicValue::Null))
            }
            DictExpr::Put { key, value, map } => {
                let k = self.evaluate(key, bindings, input).await?;
                let v = self.evaluate(value, bindings, input).await?;
                let m = self.evaluate(map, bindings, input).await?;
                let key_str = k
                    .as_str()
                    .ok_or_else(|| Error::Evaluation("Dict::put key must be a string".to_string()))?
                    .to_string();
                let mut obj = m.as_object().cloned().unwrap_or_default();
                obj.insert(key_str, v);
                Ok(DynamicValue::Object(obj))
            }
            DictExpr::ToPair(x) => {
                let v = self.evaluate(x, bindings, input).await?;
                let obj = v.as_object().ok_or_else(|| {
                    Error::Evaluation("Dict::toPair target must be an object".to_string())
                })?;
                let pairs = obj
                    .iter()
                    .map(|(k, v)| DynamicValue::Array(vec![DynamicValue::String(k.clone()), v.clone()]))
                    .collect();
                Ok(DynamicValue::Array(pairs))
            }
        }
    }

    async fn eval_dynamic(
        &self,
        expr: &DynamicExpr,
        bindings: &mut Bindings,
        input: &DynamicValue,
    ) -> Result<DynamicValue> {
        match expr {
            DynamicExpr::ToTyped(schema, x) => {
                let v = self.evaluate(x, bindings, input).await?;
                if schema.matches(&v) {
                    Ok(DynamicValue::Enum("Some".to_string(), Box::new(v)))
                } else {
                    Ok(DynamicValue::Null)
                }
            }
            DynamicExpr::ToDynamic(_schema, x) => self.evaluate(x, bindings, input).await,
            DynamicExpr::Path(path) => match input.project(path) {
                Some(v) => Ok(DynamicValue::Enum("Some".to_string(), Box::new(v.clone()))),
                None => Ok(DynamicValue::Null),
            },
            DynamicExpr::JsonTransform(t) => Ok(t.apply(input)),
        }
    }

    async fn eval_unsafe(
        &self,
        expr: &UnsafeExpr,
        bindings: &mut Bindings,
        input: &DynamicValue,
    ) -> Result<DynamicValue> {
        match expr {
            UnsafeExpr::EndpointCall { endpoint, batch } => {
                self.loader.load(endpoint, input, batch.as_ref()).await
            }
            UnsafeExpr::Debug(prefix, x) => {
                let v = self.evaluate(x, bindings, input).await?;
                tracing::debug!(prefix = %prefix, value = %v.stringify(), "expression debug");
                Ok(v)
            }
            UnsafeExpr::Die(message) => Err(Error::Evaluation(message.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataloader::{DataLoader, ReqwestUpstream};
    use crate::expr::JsonT;

    fn runtime() -> EvaluationRuntime {
        EvaluationRuntime::new(DataLoader::new(Arc::new(ReqwestUpstream::new()), None))
    }

    #[tokio::test]
    async fn identity_and_pipe() {
        let rt = runtime();
        let mut b = Bindings::new();
        let input = DynamicValue::Int(41);
        let expr = Expr::Identity.pipe(Expr::Math(MathExpr::Add(
            Box::new(Expr::Identity),
            Box::new(Expr::Literal(DynamicValue::Int(1), crate::value::TSchema::Int)),
            crate::value::TSchema::Int,
        )));
        let out = rt.evaluate(&expr, &mut b, &input).await.unwrap();
        assert_eq!(out, DynamicValue::Int(42));
    }

    #[tokio::test]
    async fn function_def_binds_and_unbinds() {
        let rt = runtime();
        let mut b = Bindings::new();
        let expr = Expr::FunctionDef(7, Box::new(Expr::Lookup(7)));
        let out = rt
            .evaluate(&expr, &mut b, &DynamicValue::String("hi".into()))
            .await
            .unwrap();
        assert_eq!(out, DynamicValue::String("hi".into()));

        let dangling = Expr::Lookup(7);
        let err = rt.evaluate(&dangling, &mut b, &DynamicValue::Null).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn equal_to_compares_operands_matching_their_tag() {
        let rt = runtime();
        let mut b = Bindings::new();
        let expr = Expr::EqualTo(
            Box::new(Expr::Literal(DynamicValue::Int(3), crate::value::TSchema::Int)),
            Box::new(Expr::Literal(DynamicValue::Int(3), crate::value::TSchema::Int)),
            crate::value::TSchema::Int,
        );
        let out = rt.evaluate(&expr, &mut b, &DynamicValue::Null).await.unwrap();
        assert_eq!(out, DynamicValue::Bool(true));
    }

    #[tokio::test]
    async fn equal_to_rejects_an_operand_that_does_not_match_its_tag() {
        let rt = runtime();
        let mut b = Bindings::new();
        let expr = Expr::EqualTo(
            Box::new(Expr::Literal(DynamicValue::String("3".into()), crate::value::TSchema::String)),
            Box::new(Expr::Literal(DynamicValue::Int(3), crate::value::TSchema::Int)),
            crate::value::TSchema::Int,
        );
        let err = rt.evaluate(&expr, &mut b, &DynamicValue::Null).await.unwrap_err();
        assert!(matches!(err, Error::Evaluation(_)));
    }

    #[tokio::test]
    async fn division_by_zero_is_an_evaluation_error() {
        let rt = runtime();
        let mut b = Bindings::new();
        let expr = Expr::Math(MathExpr::Div(
            Box::new(Expr::Literal(DynamicValue::Int(1), crate::value::TSchema::Int)),
            Box::new(Expr::Literal(DynamicValue::Int(0), crate::value::TSchema::Int)),
            crate::value::TSchema::Int,
        ));
        let err = rt.evaluate(&expr, &mut b, &DynamicValue::Null).await.unwrap_err();
        assert!(matches!(err, Error::Evaluation(_)));
    }

    #[tokio::test]
    async fn cond_requires_boolean_condition() {
        let rt = runtime();
        let mut b = Bindings::new();
        let expr = Expr::Logical(LogicalExpr::Cond {
            cond: Box::new(Expr::Identity),
            then: Box::new(Expr::Literal(DynamicValue::Int(1), crate::value::TSchema::Int)),
            els: Box::new(Expr::Literal(DynamicValue::Int(0), crate::value::TSchema::Int)),
        });
        let err = rt
            .evaluate(&expr, &mut b, &DynamicValue::String("not a bool".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Evaluation(_)));
    }

    #[tokio::test]
    async fn opt_fold_unwraps_some_and_falls_back_on_none() {
        let rt = runtime();
        let mut b = Bindings::new();

        let fold = |opt: DynamicValue| Expr::Opt(OptExpr::Fold {
            opt: Box::new(Expr::Literal(opt, crate::value::TSchema::Optional(Box::new(crate::value::TSchema::Int)))),
            none: Box::new(Expr::Literal(DynamicValue::Int(-1), crate::value::TSchema::Int)),
            some: Box::new(Expr::Identity),
        });

        let some = DynamicValue::Enum("Some".to_string(), Box::new(DynamicValue::Int(9)));
        let out = rt.evaluate(&fold(some), &mut b, &DynamicValue::Null).await.unwrap();
        assert_eq!(out, DynamicValue::Int(9));

        let out = rt
            .evaluate(&fold(DynamicValue::Null), &mut b, &DynamicValue::Null)
            .await
            .unwrap();
        assert_eq!(out, DynamicValue::Int(-1));
    }

    #[tokio::test]
    async fn dynamic_path_is_total() {
        let rt = runtime();
        let mut b = Bindings::new();
        let input = DynamicValue::object([("name".to_string(), DynamicValue::String("FOO".into()))]);

        let found = Expr::Dynamic(DynamicExpr::Path(vec!["name".to_string()]));
        let out = rt.evaluate(&found, &mut b, &input).await.unwrap();
        assert_eq!(out, DynamicValue::Enum("Some".to_string(), Box::new(DynamicValue::String("FOO".into()))));

        let missing = Expr::Dynamic(DynamicExpr::Path(vec!["nope".to_string()]));
        let out = rt.evaluate(&missing, &mut b, &input).await.unwrap();
        assert_eq!(out, DynamicValue::Null);
    }

    #[tokio::test]
    async fn json_transform_builds_object_from_paths() {
        let rt = runtime();
        let mut b = Bindings::new();
        let input = DynamicValue::object([("id".to_string(), DynamicValue::Int(1))]);
        let expr = Expr::Dynamic(DynamicExpr::JsonTransform(JsonT::Object(vec![(
            "userId".to_string(),
            JsonT::Path(vec!["id".to_string()]),
        )])));
        let out = rt.evaluate(&expr, &mut b, &input).await.unwrap();
        assert_eq!(out.get_segment("userId"), Some(&DynamicValue::Int(1)));
    }

    #[tokio::test]
    async fn die_fails_with_explicit_message() {
        let rt = runtime();
        let mut b = Bindings::new();
        let expr = Expr::Unsafe(UnsafeExpr::Die("boom".to_string()));
        let err = rt.evaluate(&expr, &mut b, &DynamicValue::Null).await.unwrap_err();
        match err {
            Error::Evaluation(msg) => assert_eq!(msg, "boom"),
            other => panic!("expected Evaluation error, got {other:?}"),
        }
    }

    #[test]
    fn context_to_value_flattens_parent_chain() {
        let root = Arc::new(Context::root(
            DynamicValue::String("root-value".into()),
            DynamicValue::empty_object(),
            DynamicValue::empty_object(),
        ));
        let child = Context::child(root, DynamicValue::Int(1), DynamicValue::empty_object());
        let value = child.to_value();
        assert_eq!(value.get_segment("value"), Some(&DynamicValue::Int(1)));
        let parent = value.get_segment("parent").unwrap();
        assert_eq!(
            parent.get_segment("value"),
            Some(&DynamicValue::String("root-value".into()))
        );
    }
}
