//! Search session against the archive's `/search` endpoint.
//!
//! A [`SearchSession`] issues authenticated `GET /search?<filter>` requests
//! and folds each response into one shared [`SearchState`] (results, stats,
//! loading flag, surfaced error). The session is cheap to clone; clones share
//! state, so searches started from different tasks settle into the same
//! snapshot.
//!
//! # Response shapes
//!
//! | Body | Interpretation |
//! |------|----------------|
//! | `{"results": [...], "total": n, "filtered": m}` | results + stats (missing keys default to `[]` / `0`) |
//! | `[...]` | legacy shape: results only, stats reset to `{0, 0}` |
//! | anything else | malformed, surfaced as `"Search failed"` |
//!
//! Non-2xx bodies surface `message`, else `error`, else `"Search failed"`.
//!
//! # Ordering
//!
//! Overlapping searches are never cancelled. With `discard_stale` (the
//! default) every request carries a sequence number and a response is dropped
//! once a newer request's response has been applied. Without it the last
//! response to arrive wins.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;

use crate::auth::{AuthProvider, SessionAuth};
use crate::client::{build_http_client, ApiBase};
use crate::config::Config;
use crate::models::{SearchPage, SearchResult, SearchStats};
use crate::query::Filter;

/// Fallback message for rejected or unreadable search responses.
pub const SEARCH_FAILED: &str = "Search failed";

/// Errors surfaced by a search. `Display` is the user-facing message.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// The auth capability reports no active session; nothing was sent.
    #[error("Sign in to search recordings")]
    SignInRequired,

    /// A search from this view is still loading.
    #[error("A search is already in progress")]
    Busy,

    /// Transport failure (offline, DNS, TLS, timeout, truncated body).
    #[error("Network error")]
    Network(#[source] reqwest::Error),

    /// The backend answered with a non-2xx status.
    #[error("{message}")]
    Rejected { status: u16, message: String },

    /// The backend answered 2xx with a body of neither accepted shape.
    #[error("Search failed")]
    Malformed(#[source] serde_json::Error),
}

/// Observable snapshot of a search session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchState {
    pub results: Vec<SearchResult>,
    pub stats: SearchStats,
    pub loading: bool,
    /// Message of the last failed search, cleared by the next success.
    pub error: Option<String>,
}

#[derive(Default)]
struct Shared {
    state: SearchState,
    in_flight: usize,
    /// Sequence number of the newest response folded into `state`.
    applied_seq: u64,
}

struct Inner {
    client: reqwest::Client,
    base: ApiBase,
    auth: Arc<dyn AuthProvider>,
    discard_stale: bool,
    next_seq: AtomicU64,
    shared: Mutex<Shared>,
}

#[derive(Clone)]
pub struct SearchSession {
    inner: Arc<Inner>,
}

impl SearchSession {
    pub fn new(client: reqwest::Client, base: ApiBase, auth: Arc<dyn AuthProvider>) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                base,
                auth,
                discard_stale: true,
                next_seq: AtomicU64::new(0),
                shared: Mutex::new(Shared::default()),
            }),
        }
    }

    /// Build a session from config, sharing `client` and `auth` with the caller.
    pub fn from_config(
        config: &Config,
        client: reqwest::Client,
        auth: Arc<dyn AuthProvider>,
    ) -> Result<Self> {
        let session = Self::new(client, config.api_base()?, auth);
        Ok(session.discard_stale(config.search.discard_stale))
    }

    /// Convenience constructor: own HTTP client, credentials from `[auth]`.
    pub fn connect(config: &Config) -> Result<Self> {
        let client = build_http_client(&config.http)?;
        let auth: Arc<dyn AuthProvider> = Arc::new(SessionAuth::from_config(&config.auth));
        Self::from_config(config, client, auth)
    }

    /// Choose between sequence fencing (`true`) and last-write-wins (`false`).
    ///
    /// Only meaningful before the session is cloned or used.
    pub fn discard_stale(self, enabled: bool) -> Self {
        match Arc::try_unwrap(self.inner) {
            Ok(mut inner) => {
                inner.discard_stale = enabled;
                Self {
                    inner: Arc::new(inner),
                }
            }
            Err(inner) => Self { inner },
        }
    }

    pub fn auth(&self) -> &Arc<dyn AuthProvider> {
        &self.inner.auth
    }

    pub fn state(&self) -> SearchState {
        self.lock().state.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.lock().state.loading
    }

    /// `/search?` followed by the filter's query string.
    pub fn search_url(&self, filter: &Filter) -> url::Url {
        let mut url = self.inner.base.endpoint(&["search"]);
        url.set_query(Some(&filter.serialize()));
        url
    }

    /// Run one search and fold its outcome into the shared state.
    ///
    /// Returns the state as it stands after this response settled. A failed
    /// search clears the results and is also returned as `Err`.
    pub async fn search(&self, filter: &Filter) -> Result<SearchState, SearchError> {
        if !self.inner.auth.is_authenticated() {
            tracing::debug!("search skipped: not signed in");
            return Err(SearchError::SignInRequired);
        }

        let url = self.search_url(filter);
        let seq = self.inner.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut shared = self.lock();
            shared.in_flight += 1;
            shared.state.loading = true;
        }
        tracing::debug!(seq, url = %url, "search issued");

        let outcome = self.fetch(url).await;
        self.settle(seq, outcome)
    }

    /// Reset `filter`, then search with it ("show all").
    ///
    /// The reset completes before the request is built, so the search always
    /// sees the empty filter.
    pub async fn clear(&self, filter: &mut Filter) -> Result<SearchState, SearchError> {
        if !self.inner.auth.is_authenticated() {
            return Err(SearchError::SignInRequired);
        }
        filter.reset();
        self.search(filter).await
    }

    async fn fetch(&self, url: url::Url) -> Result<SearchPage, SearchError> {
        let request = self.inner.auth.authorize(self.inner.client.get(url));
        let response = request.send().await.map_err(SearchError::Network)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(SearchError::Network)?;
        interpret_response(status, &body)
    }

    fn settle(
        &self,
        seq: u64,
        outcome: Result<SearchPage, SearchError>,
    ) -> Result<SearchState, SearchError> {
        let mut shared = self.lock();
        shared.in_flight = shared.in_flight.saturating_sub(1);
        shared.state.loading = shared.in_flight > 0;

        if self.inner.discard_stale && seq < shared.applied_seq {
            tracing::debug!(
                seq,
                applied = shared.applied_seq,
                "discarding stale search response"
            );
            return Ok(shared.state.clone());
        }
        shared.applied_seq = seq;

        match outcome {
            Ok(page) => {
                tracing::info!(
                    seq,
                    results = page.results.len(),
                    total = page.stats.total,
                    filtered = page.stats.filtered,
                    "search settled"
                );
                shared.state.results = page.results;
                shared.state.stats = page.stats;
                shared.state.error = None;
                Ok(shared.state.clone())
            }
            Err(err) => {
                tracing::warn!(seq, error = %err, "search failed");
                shared.state.results.clear();
                shared.state.error = Some(err.to_string());
                Err(err)
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.inner
            .shared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Interpret a `/search` response from its status code and raw body.
pub fn interpret_response(status: u16, body: &[u8]) -> Result<SearchPage, SearchError> {
    if !(200..300).contains(&status) {
        return Err(SearchError::Rejected {
            status,
            message: rejection_message(body, SEARCH_FAILED),
        });
    }

    let value: Value = serde_json::from_slice(body).map_err(SearchError::Malformed)?;
    match value {
        Value::Array(items) => {
            let results =
                serde_json::from_value(Value::Array(items)).map_err(SearchError::Malformed)?;
            Ok(SearchPage {
                results,
                stats: SearchStats::default(),
            })
        }
        Value::Object(mut map) => {
            let results = match map.remove("results") {
                None | Some(Value::Null) => Vec::new(),
                Some(raw) => serde_json::from_value(raw).map_err(SearchError::Malformed)?,
            };
            Ok(SearchPage {
                results,
                stats: SearchStats {
                    total: count(map.get("total")),
                    filtered: count(map.get("filtered")),
                },
            })
        }
        other => Err(SearchError::Malformed(serde::de::Error::custom(format!(
            "expected an object or array, got {}",
            json_kind(&other)
        )))),
    }
}

/// Pick the user-facing message out of an error body.
///
/// `message` wins over `error`; blank or non-string values and unparseable
/// bodies fall back to `fallback`.
pub fn rejection_message(body: &[u8], fallback: &str) -> String {
    let parsed: Option<Value> = serde_json::from_slice(body).ok();
    let pick = |key: &str| {
        parsed
            .as_ref()
            .and_then(|v| v.get(key))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    pick("message")
        .or_else(|| pick("error"))
        .unwrap_or_else(|| fallback.to_string())
}

fn count(value: Option<&Value>) -> u64 {
    match value {
        Some(v) => v
            .as_u64()
            .or_else(|| v.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .unwrap_or(0),
        None => 0,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// CLI entry point: run one search and print the results.
pub async fn run_search(config: &Config, filter: &Filter, json: bool) -> Result<()> {
    let session = SearchSession::connect(config)?;

    let state = match session.search(filter).await {
        Ok(state) => state,
        Err(SearchError::SignInRequired) => anyhow::bail!(
            "Authentication required. Set [auth].token or {}.",
            crate::auth::TOKEN_ENV
        ),
        Err(e) => anyhow::bail!("{}", e),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&state)?);
        return Ok(());
    }

    println!(
        "Showing {} of {} videos",
        state.stats.filtered, state.stats.total
    );

    if state.results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    println!();
    for (i, result) in state.results.iter().enumerate() {
        println!(
            "{}. {} / {}",
            i + 1,
            display_or_unknown(&result.camera_id),
            display_or_unknown(&result.filename)
        );
        println!("    uploaded: {}", display_or_unknown(&result.upload_date_ist));
        if !result.plates_found.is_empty() {
            println!("    plates: {}", result.plates_found.join(", "));
        }
        if result.file_size > 0 {
            println!("    size: {}", format_bytes(result.file_size));
        }
        println!("    id: {}", result.video_id);
        println!();
    }

    Ok(())
}

fn display_or_unknown(s: &str) -> &str {
    if s.is_empty() {
        "Unknown"
    } else {
        s
    }
}

pub(crate) fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::FilterField;

    fn result(id: &str) -> Value {
        serde_json::json!({
            "video_id": id,
            "filename": format!("{}.enc", id),
            "upload_date_ist": "2024-03-01 09:00:00",
            "camera_id": "cam_01",
        })
    }

    fn body(value: Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    fn session(auth: SessionAuth) -> SearchSession {
        SearchSession::new(
            reqwest::Client::new(),
            ApiBase::parse("http://127.0.0.1:9").unwrap(),
            Arc::new(auth),
        )
    }

    #[test]
    fn test_paged_shape() {
        let page = interpret_response(
            200,
            &body(serde_json::json!({
                "results": [result("r1"), result("r2")],
                "total": 10,
                "filtered": 2,
            })),
        )
        .unwrap();

        let ids: Vec<&str> = page.results.iter().map(|r| r.video_id.as_str()).collect();
        assert_eq!(ids, ["r1", "r2"]);
        assert_eq!(page.stats, SearchStats { total: 10, filtered: 2 });
    }

    #[test]
    fn test_legacy_array_shape() {
        let page = interpret_response(200, &body(serde_json::json!([result("r1")]))).unwrap();
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.results[0].video_id, "r1");
        assert_eq!(page.stats, SearchStats::default());
    }

    #[test]
    fn test_object_missing_keys_defaults() {
        let page = interpret_response(200, b"{}").unwrap();
        assert!(page.results.is_empty());
        assert_eq!(page.stats, SearchStats::default());

        let page =
            interpret_response(200, &body(serde_json::json!({"results": null, "total": "7"})))
                .unwrap();
        assert!(page.results.is_empty());
        assert_eq!(page.stats.total, 0);
    }

    #[test]
    fn test_non_json_success_is_malformed() {
        let err = interpret_response(200, b"<html>oops</html>").unwrap_err();
        assert!(matches!(err, SearchError::Malformed(_)));
        assert_eq!(err.to_string(), "Search failed");
    }

    #[test]
    fn test_scalar_success_is_malformed() {
        let err = interpret_response(200, b"\"ok\"").unwrap_err();
        assert!(matches!(err, SearchError::Malformed(_)));
    }

    #[test]
    fn test_rejection_uses_error_field() {
        let err = interpret_response(400, &body(serde_json::json!({"error": "bad date"})))
            .unwrap_err();
        match &err {
            SearchError::Rejected { status, message } => {
                assert_eq!(*status, 400);
                assert_eq!(message, "bad date");
            }
            other => panic!("expected Rejected, got {:?}", other),
        }
        assert_eq!(err.to_string(), "bad date");
    }

    #[test]
    fn test_rejection_prefers_message_over_error() {
        let msg = rejection_message(
            &body(serde_json::json!({"message": "token expired", "error": "unauthorized"})),
            SEARCH_FAILED,
        );
        assert_eq!(msg, "token expired");
    }

    #[test]
    fn test_rejection_fallbacks() {
        assert_eq!(rejection_message(b"", SEARCH_FAILED), SEARCH_FAILED);
        assert_eq!(rejection_message(b"Bad Gateway", SEARCH_FAILED), SEARCH_FAILED);
        assert_eq!(
            rejection_message(&body(serde_json::json!({"message": ""})), SEARCH_FAILED),
            SEARCH_FAILED
        );
        assert_eq!(
            rejection_message(&body(serde_json::json!({"error": 42})), SEARCH_FAILED),
            SEARCH_FAILED
        );
    }

    #[test]
    fn test_search_url_carries_filter() {
        let s = session(SessionAuth::bearer("t"));
        let filter = Filter::new()
            .with(FilterField::Date, "2024-03-01")
            .with(FilterField::Plate, "KA01");
        assert_eq!(
            s.search_url(&filter).as_str(),
            "http://127.0.0.1:9/search?date=2024-03-01&plate=KA01"
        );
        assert_eq!(
            s.search_url(&Filter::new()).as_str(),
            "http://127.0.0.1:9/search?"
        );
    }

    #[tokio::test]
    async fn test_unauthenticated_search_is_noop() {
        let s = session(SessionAuth::anonymous());
        let err = s.search(&Filter::new()).await.unwrap_err();
        assert!(matches!(err, SearchError::SignInRequired));
        assert_eq!(s.state(), SearchState::default());
    }

    #[tokio::test]
    async fn test_unauthenticated_clear_keeps_filter() {
        let s = session(SessionAuth::anonymous());
        let mut filter = Filter::new().with(FilterField::CameraId, "cam_01");
        assert!(s.clear(&mut filter).await.is_err());
        assert_eq!(filter.camera_id, "cam_01");
    }

    #[test]
    fn test_failure_clears_results_keeps_stats() {
        let s = session(SessionAuth::bearer("t"));
        let page = interpret_response(
            200,
            &body(serde_json::json!({"results": [result("r1")], "total": 3, "filtered": 1})),
        );
        s.settle(1, page).unwrap();

        let err = s
            .settle(
                2,
                Err(SearchError::Rejected {
                    status: 500,
                    message: SEARCH_FAILED.into(),
                }),
            )
            .unwrap_err();
        assert_eq!(err.to_string(), SEARCH_FAILED);

        let state = s.state();
        assert!(state.results.is_empty());
        assert_eq!(state.stats, SearchStats { total: 3, filtered: 1 });
        assert_eq!(state.error.as_deref(), Some(SEARCH_FAILED));
    }

    #[test]
    fn test_stale_settle_is_discarded() {
        let s = session(SessionAuth::bearer("t"));
        let newer = interpret_response(200, &body(serde_json::json!([result("new")])));
        let older = interpret_response(200, &body(serde_json::json!([result("old")])));

        s.settle(2, newer).unwrap();
        let state = s.settle(1, older).unwrap();
        assert_eq!(state.results[0].video_id, "new");
    }

    #[test]
    fn test_last_write_wins_without_fencing() {
        let s = session(SessionAuth::bearer("t")).discard_stale(false);
        let newer = interpret_response(200, &body(serde_json::json!([result("new")])));
        let older = interpret_response(200, &body(serde_json::json!([result("old")])));

        s.settle(2, newer).unwrap();
        let state = s.settle(1, older).unwrap();
        assert_eq!(state.results[0].video_id, "old");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }
}
