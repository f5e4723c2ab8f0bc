//! DataLoader: the request-scoped dedup + batching component in front of
//! the HTTP client. This is the heart of the core (spec §4.3).
//!
//! Two collaborating mechanisms live here: (a) fingerprint-based
//! deduplication, ensuring at most one physical call per distinct
//! `(method, url, headers, body)` within a request, and (b) group-keyed
//! batching, which accumulates calls sharing an endpoint shape into a
//! time-bounded window and distributes the merged response back by
//! `batchKey`.

use crate::endpoint::{Endpoint, Request};
use crate::error::{Error, Result};
use crate::expr::BatchHint;
use crate::http_cache::{CacheKey, HttpCache};
use crate::value::{DynamicValue, TSchema};
use futures::future::{BoxFuture, FutureExt, Shared};
use http::Method;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Raw bytes received from an upstream call.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// Collaborator that actually performs HTTP I/O. Kept as a trait so tests
/// can substitute a deterministic mock instead of hitting the network.
#[async_trait::async_trait]
pub trait Upstream: Send + Sync {
    async fn send(&self, request: &Request) -> Result<UpstreamResponse>;
}

/// Default [`Upstream`] backed by `reqwest`.
pub struct ReqwestUpstream {
    client: reqwest::Client,
}

impl ReqwestUpstream {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for ReqwestUpstream {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Upstream for ReqwestUpstream {
    async fn send(&self, request: &Request) -> Result<UpstreamResponse> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Upstream(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Upstream(e.to_string()))?
            .to_vec();

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}

/// Canonical `(method, url, headers, body)` tuple used as the dedup key.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
struct Fingerprint {
    method: String,
    url: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Fingerprint {
    fn new(request: &Request) -> Self {
        let mut headers = request.headers.clone();
        headers.sort();
        Self {
            method: request.method.to_string(),
            url: request.url.to_string(),
            headers,
            body: request.body.clone().unwrap_or_default(),
        }
    }
}

/// Canonicalized endpoint shape: two calls fall into the same batch window
/// iff they agree on everything except their `groupBy` query values.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
struct BatchShapeKey {
    method: String,
    base_url: String,
    headers: Vec<(String, String)>,
    non_group_query: Vec<(String, String)>,
}

fn batch_shape_key(request: &Request, group_keys: &[String]) -> BatchShapeKey {
    let mut non_group: Vec<(String, String)> = request
        .url
        .query_pairs()
        .filter(|(k, _)| !group_keys.iter().any(|g| g == k))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    non_group.sort();

    let mut base = request.url.clone();
    base.set_query(None);

    let mut headers = request.headers.clone();
    headers.sort();

    BatchShapeKey {
        method: request.method.to_string(),
        base_url: base.to_string(),
        headers,
        non_group_query: non_group,
    }
}

struct BatchEntry {
    group_value: String,
    responder: oneshot::Sender<Result<DynamicValue>>,
}

struct BatchWindow {
    template: Request,
    group_key: String,
    batch_key_path: Vec<String>,
    output_schema: Option<TSchema>,
    entries: Vec<BatchEntry>,
    max_size: usize,
}

type SharedUpstreamResult = Result<Arc<UpstreamResponse>, Arc<Error>>;

/// Request-scoped cache and batcher. Create one per inbound GraphQL
/// request; drop it when the request completes (spec §3 "Lifecycles").
pub struct DataLoader {
    upstream: Arc<dyn Upstream>,
    cache: Option<Arc<HttpCache>>,
    in_flight: Mutex<HashMap<Fingerprint, Shared<BoxFuture<'static, SharedUpstreamResult>>>>,
    batches: Mutex<HashMap<BatchShapeKey, Arc<Mutex<BatchWindow>>>>,
    delay: Duration,
    max_size: usize,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl DataLoader {
    pub fn new(upstream: Arc<dyn Upstream>, cache: Option<Arc<HttpCache>>) -> Arc<Self> {
        Self::with_batch_config(upstream, cache, Duration::from_millis(0), usize::MAX)
    }

    /// `delay` is the batch-window width (spec §4.3(b) `delay` in ms);
    /// `max_size` closes a window early once reached.
    pub fn with_batch_config(
        upstream: Arc<dyn Upstream>,
        cache: Option<Arc<HttpCache>>,
        delay: Duration,
        max_size: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            upstream,
            cache,
            in_flight: Mutex::new(HashMap::new()),
            batches: Mutex::new(HashMap::new()),
            delay,
            max_size: max_size.max(1),
            handles: Mutex::new(Vec::new()),
        })
    }

    /// Resolve one logical endpoint call. `batch` is `Some` when the
    /// originating blueprint field declared `groupBy`/`batchKey`.
    pub async fn load(
        self: &Arc<Self>,
        endpoint: &Endpoint,
        input: &DynamicValue,
        batch: Option<&BatchHint>,
    ) -> Result<DynamicValue> {
        let request = endpoint.evaluate(input);

        if request.method == Method::GET {
            if let Some(cache) = &self.cache {
                let key = CacheKey::new(&request.method, request.url.as_str());
                if let Some(hit) = cache.get(&key).await {
                    return decode_body(&hit.body, endpoint.output_schema.as_ref());
                }
            }
        }

        match batch {
            Some(hint) => self.load_batched(endpoint, &request, hint).await,
            None => self.load_deduped(&request, endpoint.output_schema.as_ref()).await,
        }
    }

    async fn load_deduped(
        self: &Arc<Self>,
        request: &Request,
        output_schema: Option<&TSchema>,
    ) -> Result<DynamicValue> {
        let fingerprint = Fingerprint::new(request);

        let shared = {
            let mut in_flight = self.in_flight.lock().unwrap();
            if let Some(existing) = in_flight.get(&fingerprint) {
                existing.clone()
            } else {
                let loader = self.clone();
                let req = request.clone();
                let fut: BoxFuture<'static, SharedUpstreamResult> = async move {
                    match loader.dispatch(&req).await {
                        Ok(resp) => Ok(Arc::new(resp)),
                        Err(e) => Err(Arc::new(e)),
                    }
                }
                .boxed();
                let shared = fut.shared();
                in_flight.insert(fingerprint, shared.clone());
                shared
            }
        };

        match shared.await {
            Ok(resp) => decode_body(&resp.body, output_schema),
            Err(e) => Err(e.duplicate()),
        }
    }

    async fn load_batched(
        self: &Arc<Self>,
        endpoint: &Endpoint,
        request: &Request,
        hint: &BatchHint,
    ) -> Result<DynamicValue> {
        let group_key = hint
            .group_by
            .first()
            .cloned()
            .ok_or_else(|| Error::Config("groupBy must name at least one field".to_string()))?;

        let group_value = request
            .url
            .query_pairs()
            .find(|(k, _)| *k == group_key)
            .map(|(_, v)| v.to_string())
            .ok_or_else(|| {
                Error::Config(format!(
                    "groupBy key '{group_key}' is not present in the templated query"
                ))
            })?;

        let shape_key = batch_shape_key(request, &hint.group_by);
        let (tx, rx) = oneshot::channel();

        let spawn_delay_closer = {
            let mut batches = self.batches.lock().unwrap();
            let window = batches
                .entry(shape_key.clone())
                .or_insert_with(|| {
                    Arc::new(Mutex::new(BatchWindow {
                        template: request.clone(),
                        group_key: group_key.clone(),
                        batch_key_path: hint.batch_key.clone(),
                        output_schema: endpoint.output_schema.clone(),
                        entries: Vec::new(),
                        max_size: self.max_size,
                    }))
                })
                .clone();

            let (is_first, should_close_now) = {
                let mut w = window.lock().unwrap();
                w.entries.push(BatchEntry {
                    group_value,
                    responder: tx,
                });
                (w.entries.len() == 1, w.entries.len() >= w.max_size)
            };

            if should_close_now {
                batches.remove(&shape_key);
                let loader = self.clone();
                let handle = tokio::spawn(async move {
                    loader.close_window(window).await;
                });
                self.handles.lock().unwrap().push(handle);
                false
            } else {
                is_first
            }
        };

        if spawn_delay_closer {
            let loader = self.clone();
            let delay = self.delay;
            let key = shape_key;
            let handle = tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let window = {
                    let mut batches = loader.batches.lock().unwrap();
                    batches.remove(&key)
                };
                if let Some(window) = window {
                    loader.close_window(window).await;
                }
            });
            self.handles.lock().unwrap().push(handle);
        }

        rx.await
            .map_err(|_| Error::Batching("batch window was cancelled before it closed".to_string()))?
    }

    /// Issue the merged upstream call for a closed batch window and
    /// distribute results by `batchKey`, indexing rather than zipping so
    /// arbitrary upstream reordering or omission is handled correctly.
    async fn close_window(self: &Arc<Self>, window: Arc<Mutex<BatchWindow>>) {
        let (merged_request, batch_key_path, output_schema, entries) = {
            let mut w = window.lock().unwrap();
            let entries = std::mem::take(&mut w.entries);

            let kept: Vec<(String, String)> = w
                .template
                .url
                .query_pairs()
                .filter(|(k, _)| *k != w.group_key)
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();

            let mut url = w.template.url.clone();
            url.set_query(None);
            {
                let mut pairs = url.query_pairs_mut();
                for (k, v) in &kept {
                    pairs.append_pair(k, v);
                }
                for entry in &entries {
                    pairs.append_pair(&w.group_key, &entry.group_value);
                }
            }

            let merged = Request {
                method: w.template.method.clone(),
                url,
                headers: w.template.headers.clone(),
                body: w.template.body.clone(),
            };
            (merged, w.batch_key_path.clone(), w.output_schema.clone(), entries)
        };

        if entries.is_empty() {
            return;
        }

        match self.dispatch(&merged_request).await {
            Err(e) => {
                for entry in entries {
                    let _ = entry
                        .responder
                        .send(Err(Error::Batching(e.duplicate().to_string())));
                }
            }
            Ok(resp) => {
                let parsed: std::result::Result<serde_json::Value, _> =
                    serde_json::from_slice(&resp.body);
                let array = match parsed {
                    Ok(serde_json::Value::Array(items)) => items,
                    Ok(_) => {
                        for entry in entries {
                            let _ = entry.responder.send(Err(Error::Decoding(
                                "batched upstream response was not a JSON array".to_string(),
                            )));
                        }
                        return;
                    }
                    Err(e) => {
                        for entry in entries {
                            let _ = entry
                                .responder
                                .send(Err(Error::Upstream(format!("malformed JSON body: {e}"))));
                        }
                        return;
                    }
                };

                let mut index: HashMap<String, DynamicValue> = HashMap::new();
                for item in &array {
                    let dv = DynamicValue::from_json(item);
                    if let Some(key_val) = dv.project(&batch_key_path) {
                        index.entry(key_val.stringify()).or_insert(dv.clone());
                    }
                }

                for entry in entries {
                    let result = match index.get(&entry.group_value) {
                        Some(v) => match &output_schema {
                            Some(schema) if !schema.matches(v) => Err(Error::Decoding(
                                "batched element does not match the declared output schema"
                                    .to_string(),
                            )),
                            _ => Ok(v.clone()),
                        },
                        None => Ok(DynamicValue::Null),
                    };
                    let _ = entry.responder.send(result);
                }
            }
        }
    }

    async fn dispatch(&self, request: &Request) -> Result<UpstreamResponse> {
        let response = self.upstream.send(request).await?;

        if let Some(cache) = &self.cache {
            cache
                .maybe_store(
                    &request.method,
                    request.url.as_str(),
                    response.status,
                    &response.headers,
                    &response.body,
                )
                .await;
        }

        if !(200..300).contains(&response.status) {
            return Err(Error::Upstream(format!(
                "upstream responded with status {}",
                response.status
            )));
        }

        Ok(response)
    }
}

impl Drop for DataLoader {
    fn drop(&mut self) {
        if let Ok(mut handles) = self.handles.lock() {
            for handle in handles.drain(..) {
                handle.abort();
            }
        }
    }
}

fn decode_body(body: &[u8], output_schema: Option<&TSchema>) -> Result<DynamicValue> {
    let json: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| Error::Upstream(format!("malformed JSON body: {e}")))?;
    let value = DynamicValue::from_json(&json);
    if let Some(schema) = output_schema {
        if !schema.matches(&value) {
            return Err(Error::Decoding(
                "response does not match the declared output schema".to_string(),
            ));
        }
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Scheme;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockUpstream {
        calls: AtomicUsize,
        responder: Box<dyn Fn(&Request) -> UpstreamResponse + Send + Sync>,
    }

    impl MockUpstream {
        fn new(responder: impl Fn(&Request) -> UpstreamResponse + Send + Sync + 'static) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                responder: Box::new(responder),
            })
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
        UpstreamResponse {
            status: 200,
            headers: vec![],
            body: serde_json::to_vec(&body).unwrap(),
        }
    }

    #[tokio::test]
    async fn duplicate_logical_calls_hit_upstream_once() {
        let upstream = MockUpstream::new(|_| json_response(serde_json::json!({"id": 1})));
        let loader = DataLoader::new(upstream.clone(), None);
        let ep = Endpoint::new(http::Method::GET, Scheme::Https, "api.example.com", "/users/1");

        let (a, b) = tokio::join!(
            loader.load(&ep, &DynamicValue::Null, None),
            loader.load(&ep, &DynamicValue::Null, None)
        );
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(upstream.call_count(), 1);
    }

    #[tokio::test]
    async fn batched_calls_collapse_to_one_upstream_request_and_distribute_by_batch_key() {
        let upstream = MockUpstream::new(|req| {
            let ids: Vec<String> = req
                .url
                .query_pairs()
                .filter(|(k, _)| k == "fooId")
                .map(|(_, v)| v.to_string())
                .collect();
            assert_eq!(ids, vec!["1".to_string(), "2".to_string()]);
            json_response(serde_json::json!([
                {"fooId": 2, "id": 20},
                {"fooId": 1, "id": 10}
            ]))
        });
        let loader =
            DataLoader::with_batch_config(upstream.clone(), None, Duration::from_millis(20), usize::MAX);

        let mut ep = Endpoint::new(http::Method::GET, Scheme::Https, "api.example.com", "/bars");
        ep.query
            .push(("fooId".to_string(), crate::mustache::Mustache::parse("{{value.id}}")));
        let hint = BatchHint {
            group_by: vec!["fooId".to_string()],
            batch_key: vec!["fooId".to_string()],
        };

        let input1 = DynamicValue::object([(
            "value".to_string(),
            DynamicValue::object([("id".to_string(), DynamicValue::Int(1))]),
        )]);
        let input2 = DynamicValue::object([(
            "value".to_string(),
            DynamicValue::object([("id".to_string(), DynamicValue::Int(2))]),
        )]);

        let (r1, r2) = tokio::join!(
            loader.load(&ep, &input1, Some(&hint)),
            loader.load(&ep, &input2, Some(&hint))
        );

        assert_eq!(upstream.call_count(), 1);
        assert_eq!(r1.unwrap().get_segment("id"), Some(&DynamicValue::Int(10)));
        assert_eq!(r2.unwrap().get_segment("id"), Some(&DynamicValue::Int(20)));
    }

    #[tokio::test]
    async fn batched_call_with_no_matching_element_resolves_to_null() {
        let upstream = MockUpstream::new(|_| json_response(serde_json::json!([{"fooId": 1, "id": 10}])));
        let loader =
            DataLoader::with_batch_config(upstream, None, Duration::from_millis(10), usize::MAX);

        let mut ep = Endpoint::new(http::Method::GET, Scheme::Https, "api.example.com", "/bars");
        ep.query
            .push(("fooId".to_string(), crate::mustache::Mustache::parse("{{value.id}}")));
        let hint = BatchHint {
            group_by: vec!["fooId".to_string()],
            batch_key: vec!["fooId".to_string()],
        };
        let input = DynamicValue::object([(
            "value".to_string(),
            DynamicValue::object([("id".to_string(), DynamicValue::Int(99))]),
        )]);

        let result = loader.load(&ep, &input, Some(&hint)).await.unwrap();
        assert_eq!(result, DynamicValue::Null);
    }

    #[tokio::test]
    async fn failed_batch_fails_every_logical_caller() {
        let upstream = MockUpstream::new(|_| UpstreamResponse {
            status: 500,
            headers: vec![],
            body: b"boom".to_vec(),
        });
        let loader =
            DataLoader::with_batch_config(upstream, None, Duration::from_millis(10), usize::MAX);

        let mut ep = Endpoint::new(http::Method::GET, Scheme::Https, "api.example.com", "/bars");
        ep.query
            .push(("fooId".to_string(), crate::mustache::Mustache::parse("{{value.id}}")));
        let hint = BatchHint {
            group_by: vec!["fooId".to_string()],
            batch_key: vec!["fooId".to_string()],
        };
        let input1 = DynamicValue::object([(
            "value".to_string(),
            DynamicValue::object([("id".to_string(), DynamicValue::Int(1))]),
        )]);
        let input2 = DynamicValue::object([(
            "value".to_string(),
            DynamicValue::object([("id".to_string(), DynamicValue::Int(2))]),
        )]);

        let (r1, r2) = tokio::join!(
            loader.load(&ep, &input1, Some(&hint)),
            loader.load(&ep, &input2, Some(&hint))
        );
        assert!(r1.is_err());
        assert!(r2.is_err());
    }

    #[tokio::test]
    async fn max_size_closes_window_before_delay_elapses() {
        let upstream = MockUpstream::new(|_| {
            json_response(serde_json::json!([{"fooId": 1, "id": 10}, {"fooId": 2, "id": 20}]))
        });
        let loader = DataLoader::with_batch_config(
            upstream.clone(),
            None,
            Duration::from_secs(60),
            2,
        );

        let mut ep = Endpoint::new(http::Method::GET, Scheme::Https, "api.example.com", "/bars");
        ep.query
            .push(("fooId".to_string(), crate::mustache::Mustache::parse("{{value.id}}")));
        let hint = BatchHint {
            group_by: vec!["fooId".to_string()],
            batch_key: vec!["fooId".to_string()],
        };
        let input1 = DynamicValue::object([(
            "value".to_string(),
            DynamicValue::object([("id".to_string(), DynamicValue::Int(1))]),
        )]);
        let input2 = DynamicValue::object([(
            "value".to_string(),
            DynamicValue::object([("id".to_string(), DynamicValue::Int(2))]),
        )]);

        let (r1, r2) = tokio::join!(
            loader.load(&ep, &input1, Some(&hint)),
            loader.load(&ep, &input2, Some(&hint))
        );
        assert!(r1.is_ok());
        assert!(r2.is_ok());
        assert_eq!(upstream.call_count(), 1);
    }
}
