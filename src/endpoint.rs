//! Endpoint: a templated HTTP request description that can be evaluated
//! against a dynamic input to produce a concrete `Request`. See spec §3/§4.1.

use crate::mustache::Mustache;
use crate::path::Path as DotPath;
use crate::value::{DynamicValue, TSchema};
use http::Method;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    fn default_port(self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

/// A fully templated description of an upstream HTTP call.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub method: Method,
    pub scheme: Scheme,
    pub host: Mustache,
    pub port: Option<u16>,
    pub path: Mustache,
    pub query: Vec<(String, Mustache)>,
    pub headers: Vec<(String, Mustache)>,
    /// `Some(path)` projects a sub-value out of the evaluation input before
    /// serializing it as the request body; `None` serializes the whole input.
    pub body: Option<DotPath>,
    pub input_schema: Option<TSchema>,
    pub output_schema: Option<TSchema>,
}

impl Endpoint {
    pub fn new(method: Method, scheme: Scheme, host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method,
            scheme,
            host: Mustache::parse(&host.into()),
            port: None,
            path: Mustache::parse(&path.into()),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
            input_schema: None,
            output_schema: None,
        }
    }

    fn has_body_method(&self) -> bool {
        !matches!(self.method, Method::GET | Method::DELETE)
    }

    /// Substitute all mustache templates against `input` and produce a
    /// concrete, ready-to-send [`Request`].
    pub fn evaluate(&self, input: &DynamicValue) -> Request {
        let host = self.host.evaluate(input);
        let raw_path = self.path.evaluate(input);
        let path = if raw_path.starts_with('/') {
            raw_path
        } else {
            format!("/{raw_path}")
        };

        let mut url = url::Url::parse(&format!("{}://{}", self.scheme.as_str(), host))
            .unwrap_or_else(|_| url::Url::parse("http://invalid.invalid").unwrap());

        if let Some(port) = self.port {
            if port != self.scheme.default_port() {
                let _ = url.set_port(Some(port));
            }
        }
        url.set_path(&path);

        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, template) in &self.query {
                pairs.append_pair(key, &template.evaluate(input));
            }
        }

        let mut headers: Vec<(String, String)> = self
            .headers
            .iter()
            .map(|(name, template)| (name.clone(), template.evaluate(input)))
            .collect();

        let body = if self.has_body_method() {
            let projected = match &self.body {
                Some(path) => path.evaluate(input).cloned().unwrap_or(DynamicValue::Null),
                None => input.clone(),
            };
            Some(serde_json::to_vec(&projected.to_json()).unwrap_or_default())
        } else {
            None
        };

        if let Some(bytes) = &body {
            if !bytes.is_empty() {
                headers.push(("content-type".to_string(), "application/json".to_string()));
                headers.push(("content-length".to_string(), bytes.len().to_string()));
            }
        }

        Request {
            method: self.method.clone(),
            url,
            headers,
            body,
        }
    }
}

/// A concrete, evaluated HTTP request ready to be dispatched by the
/// [`DataLoader`](crate::dataloader::DataLoader).
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: url::Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl Request {
    pub fn body_len(&self) -> usize {
        self.body.as_ref().map(Vec::len).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(id: i64) -> DynamicValue {
        DynamicValue::object([(
            "value".to_string(),
            DynamicValue::object([("id".to_string(), DynamicValue::Int(id))]),
        )])
    }

    #[test]
    fn evaluate_builds_get_with_no_body() {
        let ep = Endpoint::new(Method::GET, Scheme::Https, "api.example.com", "/users/{{value.id}}");
        let req = ep.evaluate(&ctx(1));
        assert_eq!(req.url.as_str(), "https://api.example.com/users/1");
        assert!(req.body.is_none());
    }

    #[test]
    fn default_ports_are_omitted() {
        let mut ep = Endpoint::new(Method::GET, Scheme::Https, "api.example.com", "/x");
        ep.port = Some(443);
        let req = ep.evaluate(&DynamicValue::Null);
        assert_eq!(req.url.port(), None);

        let mut ep2 = Endpoint::new(Method::GET, Scheme::Http, "api.example.com", "/x");
        ep2.port = Some(8080);
        let req2 = ep2.evaluate(&DynamicValue::Null);
        assert_eq!(req2.url.port(), Some(8080));
    }

    #[test]
    fn post_body_projects_sub_path_and_sets_headers() {
        let mut ep = Endpoint::new(Method::POST, Scheme::Https, "api.example.com", "/users");
        ep.body = Some(DotPath::parse("{{value}}"));
        let req = ep.evaluate(&ctx(7));
        let body: serde_json::Value = serde_json::from_slice(&req.body.unwrap()).unwrap();
        assert_eq!(body, serde_json::json!({"id": 7}));
        assert!(req
            .headers
            .iter()
            .any(|(k, v)| k == "content-type" && v == "application/json"));
        assert!(req.headers.iter().any(|(k, _)| k == "content-length"));
    }

    #[test]
    fn query_params_are_mustache_substituted() {
        let mut ep = Endpoint::new(Method::GET, Scheme::Https, "api.example.com", "/bars");
        ep.query.push(("fooId".to_string(), Mustache::parse("{{value.id}}")));
        let req = ep.evaluate(&ctx(3));
        assert_eq!(req.url.query(), Some("fooId=3"));
    }
}
