//! Process-wide TTL cache of GET responses honoring `Cache-Control`/
//! `Expires`, per spec §4.4.

use http::Method;
use moka::future::Cache;
use moka::Expiry;
use std::time::{Duration, Instant};

/// `(method, url)` cache key — only `GET` is ever stored.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct CacheKey {
    pub method: String,
    pub url: String,
}

impl CacheKey {
    pub fn new(method: &Method, url: &str) -> Self {
        Self {
            method: method.to_string(),
            url: url.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    ttl: Duration,
}

struct TtlExpiry;

impl Expiry<CacheKey, CachedResponse> for TtlExpiry {
    fn expire_after_create(
        &self,
        _key: &CacheKey,
        value: &CachedResponse,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Process-wide, concurrent-map-backed HTTP cache shared across requests.
/// Writers never block readers on a hit (moka's lock-free read path).
#[derive(Clone)]
pub struct HttpCache {
    inner: Cache<CacheKey, CachedResponse>,
}

impl Default for HttpCache {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpCache {
    pub fn new() -> Self {
        Self {
            inner: Cache::builder().expire_after(TtlExpiry).build(),
        }
    }

    /// Lazily-expiring read: a logically-expired entry simply isn't returned.
    pub async fn get(&self, key: &CacheKey) -> Option<CachedResponse> {
        self.inner.get(key).await
    }

    /// Store a response if it is cacheable per [`ttl_for_headers`]. Never
    /// stores non-2xx responses (spec §7: "the HTTP cache never stores
    /// failures").
    pub async fn maybe_store(
        &self,
        method: &Method,
        url: &str,
        status: u16,
        headers: &[(String, String)],
        body: &[u8],
    ) {
        if method != Method::GET || !(200..300).contains(&status) {
            return;
        }
        if let Some(ttl) = ttl_for_headers(headers) {
            let key = CacheKey::new(method, url);
            self.inner
                .insert(
                    key,
                    CachedResponse {
                        status,
                        headers: headers.to_vec(),
                        body: body.to_vec(),
                        ttl,
                    },
                )
                .await;
        }
    }
}

fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// One comma-separated `Cache-Control` directive, lowercased name plus an
/// optional `=value`.
fn directives(raw: &str) -> impl Iterator<Item = (String, Option<&str>)> + '_ {
    raw.split(',').filter_map(|part| {
        let part = part.trim();
        if part.is_empty() {
            return None;
        }
        match part.split_once('=') {
            Some((name, value)) => Some((name.trim().to_ascii_lowercase(), Some(value.trim().trim_matches('"')))),
            None => Some((part.to_ascii_lowercase(), None)),
        }
    })
}

/// Compute TTL per the table in spec §4.4:
/// - `Cache-Control: max-age=N` (no `private`/`no-store`) -> `N` seconds.
/// - Else `Expires: <HTTP-date>` -> `max(0, expires - now)`.
/// - Else -> not cached.
/// - `Expires: -1`, `max-age=0`, or `private` -> not cached.
/// - Both present -> `Cache-Control: max-age` wins.
pub fn ttl_for_headers(headers: &[(String, String)]) -> Option<Duration> {
    if let Some(raw) = header_value(headers, "cache-control") {
        let mut no_store_or_private = false;
        let mut max_age: Option<u64> = None;
        for (name, value) in directives(raw) {
            match name.as_str() {
                "no-store" | "private" => no_store_or_private = true,
                "max-age" => max_age = value.and_then(|v| v.parse::<u64>().ok()),
                _ => {}
            }
        }
        if no_store_or_private {
            return None;
        }
        if let Some(secs) = max_age {
            return if secs == 0 { None } else { Some(Duration::from_secs(secs)) };
        }
    }

    let raw = header_value(headers, "expires")?;
    let trimmed = raw.trim();
    if trimmed == "-1" || trimmed == "0" {
        return None;
    }
    let expires = chrono::DateTime::parse_from_rfc2822(trimmed).ok()?;
    let now = chrono::Utc::now();
    let delta = expires.with_timezone(&chrono::Utc) - now;
    let secs = delta.num_seconds().max(0);
    Some(Duration::from_secs(secs as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn max_age_sets_ttl() {
        let h = headers(&[("Cache-Control", "max-age=1000")]);
        assert_eq!(ttl_for_headers(&h), Some(Duration::from_secs(1000)));
    }

    #[test]
    fn private_overrides_max_age() {
        let h = headers(&[("Cache-Control", "max-age=1000, private")]);
        assert_eq!(ttl_for_headers(&h), None);
    }

    #[test]
    fn max_age_zero_is_not_cached() {
        let h = headers(&[("Cache-Control", "max-age=0")]);
        assert_eq!(ttl_for_headers(&h), None);
    }

    #[test]
    fn expires_minus_one_is_not_cached() {
        let h = headers(&[("Expires", "-1")]);
        assert_eq!(ttl_for_headers(&h), None);
    }

    #[test]
    fn cache_control_wins_over_expires_when_both_present() {
        let h = headers(&[
            ("Cache-Control", "max-age=5"),
            ("Expires", "Mon, 01 Jan 2035 00:00:00 GMT"),
        ]);
        assert_eq!(ttl_for_headers(&h), Some(Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn store_and_get_round_trips_until_expiry_check() {
        let cache = HttpCache::new();
        let headers = headers(&[("Cache-Control", "max-age=1000")]);
        cache
            .maybe_store(&Method::GET, "http://x/y", 200, &headers, b"body")
            .await;
        let key = CacheKey::new(&Method::GET, "http://x/y");
        let hit = cache.get(&key).await.expect("cache hit");
        assert_eq!(hit.body, b"body");
    }

    #[tokio::test]
    async fn failures_are_never_stored() {
        let cache = HttpCache::new();
        let headers = headers(&[("Cache-Control", "max-age=1000")]);
        cache
            .maybe_store(&Method::GET, "http://x/y", 500, &headers, b"err")
            .await;
        let key = CacheKey::new(&Method::GET, "http://x/y");
        assert!(cache.get(&key).await.is_none());
    }
}
