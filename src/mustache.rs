//! Mustache: the `{{a.b.c}}` substitution language used by endpoint
//! templates. See spec §3/§4.1.

use crate::value::DynamicValue;
use nom::bytes::complete::{tag, take_while1};
use nom::character::complete::{char, multispace0};
use nom::multi::many0;
use nom::sequence::preceded;
use nom::IResult;

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Text(String),
    /// A non-empty dotted path, e.g. `["value", "company", "name"]`.
    Param(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Mustache(pub Vec<Segment>);

impl Mustache {
    pub fn parse(input: &str) -> Self {
        let mut segments = Vec::new();
        let mut rest = input;
        while !rest.is_empty() {
            if let Ok((next, seg)) = parse_param(rest) {
                segments.push(seg);
                rest = next;
                continue;
            }
            if let Ok((next, seg)) = parse_text(rest) {
                segments.push(seg);
                rest = next;
                continue;
            }
            // Unterminated `{{` or similar: emit the remainder literally.
            segments.push(Segment::Text(rest.to_string()));
            break;
        }
        Mustache(segments)
    }

    /// True when the template contains no `{{...}}` substitutions.
    pub fn is_const(&self) -> bool {
        self.0.iter().all(|s| matches!(s, Segment::Text(_)))
    }

    /// Inverse of [`parse`](Self::parse): total and exact.
    pub fn render_template(&self) -> String {
        let mut out = String::new();
        for seg in &self.0 {
            match seg {
                Segment::Text(t) => out.push_str(t),
                Segment::Param(path) => {
                    out.push_str("{{");
                    out.push_str(&path.join("."));
                    out.push_str("}}");
                }
            }
        }
        out
    }

    /// Evaluate against a `DynamicValue`: resolved params are stringified and
    /// substituted; unresolved ones re-emit as literal `{{...}}`.
    pub fn evaluate(&self, dv: &DynamicValue) -> String {
        let mut out = String::new();
        for seg in &self.0 {
            match seg {
                Segment::Text(t) => out.push_str(t),
                Segment::Param(path) => match resolve_path(dv, path) {
                    Some(v) => out.push_str(&v.stringify()),
                    None => {
                        out.push_str("{{");
                        out.push_str(&path.join("."));
                        out.push_str("}}");
                    }
                },
            }
        }
        out
    }
}

impl From<&str> for Mustache {
    fn from(value: &str) -> Self {
        Mustache::parse(value)
    }
}

impl std::fmt::Display for Mustache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.render_template())
    }
}

fn resolve_path<'a>(dv: &'a DynamicValue, path: &[String]) -> Option<&'a DynamicValue> {
    dv.project(path)
}

fn ident(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric() || c == '_')(input)
}

fn parse_param(input: &str) -> IResult<&str, Segment> {
    let (input, _) = tag("{{")(input)?;
    let (input, _) = multispace0(input)?;
    let (input, first) = ident(input)?;
    let (input, rest) = many0(preceded(char('.'), ident))(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = tag("}}")(input)?;

    let mut path = vec![first.to_string()];
    path.extend(rest.into_iter().map(String::from));
    Ok((input, Segment::Param(path)))
}

fn parse_text(input: &str) -> IResult<&str, Segment> {
    let idx = input.find("{{").unwrap_or(input.len());
    if idx == 0 {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::TakeUntil,
        )));
    }
    Ok((&input[idx..], Segment::Text(input[..idx].to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_print_identity() {
        let cases = [
            "hello {{a.b.c}} world",
            "{{only}}",
            "no params here",
            "{{a}}{{b}}{{c}}",
            "",
        ];
        for case in cases {
            let m = Mustache::parse(case);
            assert_eq!(m.render_template(), case, "round trip failed for {case:?}");
        }
    }

    #[test]
    fn evaluate_substitutes_nested_path() {
        let dv = DynamicValue::object([(
            "company".to_string(),
            DynamicValue::object([("name".to_string(), DynamicValue::String("FOO".into()))]),
        )]);
        let m = Mustache::parse("{{company.name}}!");
        assert_eq!(m.evaluate(&dv), "FOO!");
    }

    #[test]
    fn evaluate_leaves_unresolved_segments_literal() {
        let dv = DynamicValue::Null;
        let m = Mustache::parse("{{missing.path}}");
        assert_eq!(m.evaluate(&dv), "{{missing.path}}");
    }

    #[test]
    fn evaluate_unwraps_optional_mid_path() {
        let dv = DynamicValue::Enum(
            "Some".into(),
            Box::new(DynamicValue::object([(
                "id".to_string(),
                DynamicValue::Int(7),
            )])),
        );
        let m = Mustache::parse("{{id}}");
        assert_eq!(m.evaluate(&dv), "7");
    }

    #[test]
    fn evaluate_array_index_by_digit_segment() {
        let dv = DynamicValue::Array(vec![DynamicValue::String("a".into()), DynamicValue::String("b".into())]);
        let m = Mustache::parse("{{1}}");
        assert_eq!(m.evaluate(&dv), "b");
    }
}
