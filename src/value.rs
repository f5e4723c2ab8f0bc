//! DynamicValue: the untyped, self-describing value that flows through the
//! interpreter, and TSchema, the structural type descriptor used to shape it.

use indexmap::IndexMap;
use std::fmt;

/// Untyped value flowing between resolvers, upstream responses and GraphQL
/// arguments. See spec §3 "DynamicValue".
#[derive(Debug, Clone, PartialEq)]
pub enum DynamicValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Binary(Vec<u8>),
    Array(Vec<DynamicValue>),
    /// Insertion-order preserved mapping with unique keys.
    Object(IndexMap<String, DynamicValue>),
    /// Tagged enum: constructor name plus payload.
    Enum(String, Box<DynamicValue>),
}

impl DynamicValue {
    pub fn object(pairs: impl IntoIterator<Item = (String, DynamicValue)>) -> Self {
        DynamicValue::Object(pairs.into_iter().collect())
    }

    pub fn empty_object() -> Self {
        DynamicValue::Object(IndexMap::new())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, DynamicValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DynamicValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[DynamicValue]> {
        match self {
            DynamicValue::Array(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&IndexMap<String, DynamicValue>> {
        match self {
            DynamicValue::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a single named child, whether `self` is an object (key lookup),
    /// an array (decimal-digit index), or an enum payload (constructor name).
    pub fn get_segment(&self, segment: &str) -> Option<&DynamicValue> {
        match self {
            DynamicValue::Object(map) => map.get(segment),
            DynamicValue::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            DynamicValue::Enum(tag, payload) if tag == segment => Some(payload.as_ref()),
            _ => None,
        }
    }

    /// Walk a dotted path, unwrapping `Some(...)` enum wrappers transparently
    /// at each step (and at the final leaf). Shared by `Mustache` and `Path`
    /// evaluation. Returns `None` if any segment is missing.
    pub fn project(&self, path: &[String]) -> Option<&DynamicValue> {
        fn unwrap_optional(mut current: &DynamicValue) -> &DynamicValue {
            while let DynamicValue::Enum(tag, payload) = current {
                if tag == "Some" {
                    current = payload;
                } else {
                    break;
                }
            }
            current
        }

        let mut current = self;
        for seg in path {
            current = unwrap_optional(current).get_segment(seg)?;
        }
        Some(unwrap_optional(current))
    }

    /// Stringify for mustache substitution: strings emit unquoted, everything
    /// else emits its canonical/JSON textual form.
    pub fn stringify(&self) -> String {
        match self {
            DynamicValue::Null => String::new(),
            DynamicValue::String(s) => s.clone(),
            DynamicValue::Bool(b) => b.to_string(),
            DynamicValue::Int(i) => i.to_string(),
            DynamicValue::Float(f) => {
                if f.fract() == 0.0 && f.is_finite() {
                    format!("{f:.0}")
                } else {
                    f.to_string()
                }
            }
            DynamicValue::Binary(bytes) => {
                use base64::Engine;
                base64::engine::general_purpose::STANDARD.encode(bytes)
            }
            other => other.to_json().to_string(),
        }
    }

    /// Convert a `serde_json::Value` into a `DynamicValue`. Total: every JSON
    /// value has a DynamicValue representation.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => DynamicValue::Null,
            serde_json::Value::Bool(b) => DynamicValue::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    DynamicValue::Int(i)
                } else {
                    DynamicValue::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => DynamicValue::String(s.clone()),
            serde_json::Value::Array(items) => {
                DynamicValue::Array(items.iter().map(DynamicValue::from_json).collect())
            }
            serde_json::Value::Object(map) => DynamicValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), DynamicValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Inverse of [`from_json`](Self::from_json); `Enum` payloads are flattened
    /// to `{"<tag>": <payload>}`, `Binary` is base64-encoded.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            DynamicValue::Null => serde_json::Value::Null,
            DynamicValue::Bool(b) => serde_json::Value::Bool(*b),
            DynamicValue::Int(i) => serde_json::Value::Number((*i).into()),
            DynamicValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            DynamicValue::String(s) => serde_json::Value::String(s.clone()),
            DynamicValue::Binary(bytes) => {
                use base64::Engine;
                serde_json::Value::String(base64::engine::general_purpose::STANDARD.encode(bytes))
            }
            DynamicValue::Array(items) => {
                serde_json::Value::Array(items.iter().map(DynamicValue::to_json).collect())
            }
            DynamicValue::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            DynamicValue::Enum(tag, payload) => {
                let mut map = serde_json::Map::new();
                map.insert(tag.clone(), payload.to_json());
                serde_json::Value::Object(map)
            }
        }
    }

    /// Convert to an `async-graphql` dynamic `Value` for handing off to the
    /// schema executor.
    pub fn to_graphql_value(&self) -> async_graphql::Value {
        use async_graphql::{Name, Value as GqlValue};
        match self {
            DynamicValue::Null => GqlValue::Null,
            DynamicValue::Bool(b) => GqlValue::Boolean(*b),
            DynamicValue::Int(i) => GqlValue::Number((*i).into()),
            DynamicValue::Float(f) => async_graphql::Number::from_f64(*f)
                .map(GqlValue::Number)
                .unwrap_or(GqlValue::Null),
            DynamicValue::String(s) => GqlValue::String(s.clone()),
            DynamicValue::Binary(bytes) => {
                use base64::Engine;
                GqlValue::String(base64::engine::general_purpose::STANDARD.encode(bytes))
            }
            DynamicValue::Array(items) => {
                GqlValue::List(items.iter().map(DynamicValue::to_graphql_value).collect())
            }
            DynamicValue::Object(map) => GqlValue::Object(
                map.iter()
                    .map(|(k, v)| (Name::new(k), v.to_graphql_value()))
                    .collect(),
            ),
            DynamicValue::Enum(tag, payload) => {
                let mut map = async_graphql::indexmap::IndexMap::new();
                map.insert(Name::new(tag), payload.to_graphql_value());
                GqlValue::Object(map)
            }
        }
    }

    /// Convert GraphQL argument values (already decoded by async-graphql) back
    /// into a `DynamicValue` for feeding a resolver `Context`.
    pub fn from_graphql_value(value: &async_graphql::Value) -> Self {
        use async_graphql::Value as GqlValue;
        match value {
            GqlValue::Null => DynamicValue::Null,
            GqlValue::Boolean(b) => DynamicValue::Bool(*b),
            GqlValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    DynamicValue::Int(i)
                } else {
                    DynamicValue::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            GqlValue::String(s) => DynamicValue::String(s.clone()),
            GqlValue::Enum(name) => DynamicValue::String(name.to_string()),
            GqlValue::List(items) => {
                DynamicValue::Array(items.iter().map(DynamicValue::from_graphql_value).collect())
            }
            GqlValue::Object(map) => DynamicValue::Object(
                map.iter()
                    .map(|(k, v)| (k.to_string(), DynamicValue::from_graphql_value(v)))
                    .collect(),
            ),
            GqlValue::Binary(bytes) => DynamicValue::Binary(bytes.to_vec()),
        }
    }
}

impl fmt::Display for DynamicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.stringify())
    }
}

/// Structural type descriptor used to validate/shape `DynamicValue`s.
#[derive(Debug, Clone, PartialEq)]
pub enum TSchema {
    String,
    Int,
    Bool,
    Optional(Box<TSchema>),
    Array(Box<TSchema>),
    Dict(Box<TSchema>),
    Object(IndexMap<String, TSchema>),
}

impl TSchema {
    /// Does `value` structurally match this schema?
    pub fn matches(&self, value: &DynamicValue) -> bool {
        match (self, value) {
            (TSchema::Optional(_), DynamicValue::Null) => true,
            (TSchema::Optional(inner), v) => inner.matches(v),
            (TSchema::String, DynamicValue::String(_)) => true,
            (TSchema::Int, DynamicValue::Int(_)) => true,
            (TSchema::Bool, DynamicValue::Bool(_)) => true,
            (TSchema::Array(inner), DynamicValue::Array(items)) => {
                items.iter().all(|i| inner.matches(i))
            }
            (TSchema::Dict(inner), DynamicValue::Object(map)) => {
                map.values().all(|v| inner.matches(v))
            }
            (TSchema::Object(fields), DynamicValue::Object(map)) => fields
                .iter()
                .all(|(name, schema)| match map.get(name) {
                    Some(v) => schema.matches(v),
                    None => matches!(schema, TSchema::Optional(_)),
                }),
            _ => false,
        }
    }

    /// Build a schema matching exactly the shape of `value`. Used to type a
    /// `@const`/`Literal` payload whose author never declares a schema
    /// explicitly. `TSchema` has no distinct numeric-float variant (spec §3
    /// only lists `int` among the primitives), so `Float` widens to `Int`;
    /// this is a deliberate approximation, not a round-trippable schema.
    pub fn infer(value: &DynamicValue) -> TSchema {
        match value {
            DynamicValue::Null => TSchema::Optional(Box::new(TSchema::String)),
            DynamicValue::Bool(_) => TSchema::Bool,
            DynamicValue::Int(_) | DynamicValue::Float(_) => TSchema::Int,
            DynamicValue::String(_) | DynamicValue::Binary(_) => TSchema::String,
            DynamicValue::Array(items) => {
                let inner = items.first().map(TSchema::infer).unwrap_or(TSchema::String);
                TSchema::Array(Box::new(inner))
            }
            DynamicValue::Object(map) => TSchema::Object(
                map.iter().map(|(k, v)| (k.clone(), TSchema::infer(v))).collect(),
            ),
            DynamicValue::Enum(_, payload) => TSchema::Optional(Box::new(TSchema::infer(payload))),
        }
    }

    /// Structural, width-covariant subtype relation: `self <= other` iff for
    /// every field `other` requires, `self` has a subtype-compatible field.
    pub fn is_subtype_of(&self, other: &TSchema) -> bool {
        match (self, other) {
            (a, b) if a == b => true,
            (TSchema::Optional(a), TSchema::Optional(b)) => a.is_subtype_of(b),
            (a, TSchema::Optional(b)) => a.is_subtype_of(b),
            (TSchema::Array(a), TSchema::Array(b)) => a.is_subtype_of(b),
            (TSchema::Dict(a), TSchema::Dict(b)) => a.is_subtype_of(b),
            (TSchema::Object(a_fields), TSchema::Object(b_fields)) => {
                b_fields.iter().all(|(name, b_ty)| {
                    a_fields
                        .get(name)
                        .map(|a_ty| a_ty.is_subtype_of(b_ty))
                        .unwrap_or(false)
                })
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trip_preserves_primitives() {
        let original = serde_json::json!({
            "id": 1,
            "name": "FOO",
            "active": true,
            "score": 1.5,
            "tags": ["a", "b"],
            "nested": {"x": null}
        });
        let dv = DynamicValue::from_json(&original);
        assert_eq!(dv.to_json(), original);
    }

    #[test]
    fn get_segment_walks_object_array_and_enum() {
        let dv = DynamicValue::object([(
            "company".to_string(),
            DynamicValue::Array(vec![DynamicValue::String("x".into())]),
        )]);
        let company = dv.get_segment("company").unwrap();
        assert_eq!(company.get_segment("0"), Some(&DynamicValue::String("x".into())));

        let e = DynamicValue::Enum("Some".into(), Box::new(DynamicValue::Int(3)));
        assert_eq!(e.get_segment("Some"), Some(&DynamicValue::Int(3)));
    }

    #[test]
    fn stringify_numbers_and_bools_canonically() {
        assert_eq!(DynamicValue::Int(42).stringify(), "42");
        assert_eq!(DynamicValue::Float(42.0).stringify(), "42");
        assert_eq!(DynamicValue::Float(1.5).stringify(), "1.5");
        assert_eq!(DynamicValue::Bool(true).stringify(), "true");
        assert_eq!(DynamicValue::Null.stringify(), "");
    }

    #[test]
    fn infer_builds_a_schema_matching_its_source_value() {
        let dv = DynamicValue::object([
            ("id".to_string(), DynamicValue::Int(1)),
            ("tags".to_string(), DynamicValue::Array(vec![DynamicValue::String("a".into())])),
        ]);
        let schema = TSchema::infer(&dv);
        assert!(schema.matches(&dv));
    }

    #[test]
    fn object_subtype_is_width_covariant() {
        let mut wide = IndexMap::new();
        wide.insert("name".to_string(), TSchema::String);
        wide.insert("extra".to_string(), TSchema::Int);
        let wide = TSchema::Object(wide);

        let mut narrow = IndexMap::new();
        narrow.insert("name".to_string(), TSchema::String);
        let narrow = TSchema::Object(narrow);

        assert!(wide.is_subtype_of(&narrow));
        assert!(!narrow.is_subtype_of(&wide));
    }
}
