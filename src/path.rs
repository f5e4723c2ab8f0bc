//! Path: dotted-path projection into a `DynamicValue`, the non-templating
//! twin of `Mustache` used by `Dynamic::path` expressions and by
//! `Endpoint.body` (which projects a sub-value rather than substituting
//! text). See spec §3/§4.2.

use crate::value::DynamicValue;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Path(pub Vec<String>);

impl Path {
    /// Accepts either a bare dotted path (`a.b.c`) or a single mustache
    /// param (`{{a.b.c}}`); both name a sub-path into a `DynamicValue`.
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        let inner = trimmed
            .strip_prefix("{{")
            .and_then(|s| s.strip_suffix("}}"))
            .map(str::trim)
            .unwrap_or(trimmed);
        Path(inner.split('.').filter(|s| !s.is_empty()).map(String::from).collect())
    }

    pub fn from_segments(segments: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Path(segments.into_iter().map(Into::into).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `Some(sub)` if every segment resolves, `None` otherwise — never an error.
    pub fn evaluate<'a>(&self, dv: &'a DynamicValue) -> Option<&'a DynamicValue> {
        if self.0.is_empty() {
            return Some(dv);
        }
        dv.project(&self.0)
    }
}

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}
