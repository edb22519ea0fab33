//! Analysis synchronization: one authoritative in-memory snapshot per
//! process, persisted across restarts and broadcast to subscribers.
//!
//! The snapshot follows stale-while-revalidate rules: a failed or
//! rate-limited fetch records an error next to the previous result, it
//! never erases it. Concurrent fetches resolve most-recent-wins via a
//! sequence number issued when a request is marked pending; a completion
//! whose sequence is no longer current is returned to its caller but
//! does not touch the snapshot, storage, or subscribers.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use chrono::DateTime;
use chrono::Utc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;
use vizor_protocol::AnalysisEvent;
use vizor_protocol::AnalysisRequest;
use vizor_protocol::AnalysisResult;
use vizor_protocol::AnalysisSnapshot;
use vizor_protocol::FailureKind;
use vizor_protocol::SyncFailure;
use vizor_protocol::SyncStatus;

use crate::client::AnalysisError;
use crate::client::ApiClient;
use crate::session::SessionStore;
use crate::storage::keys;
use crate::storage::LocalStore;
use crate::storage::StorageError;

#[derive(Debug)]
struct SyncState {
    snapshot: AnalysisSnapshot,
    /// Sequence of the most recently issued request (or invalidation).
    /// A completion whose sequence no longer matches is stale.
    issued: u64,
}

/// What a read of the persisted analysis pair found.
enum Persisted {
    Absent,
    Corrupt,
    Value(AnalysisResult, DateTime<Utc>),
}

#[derive(Debug, Clone)]
pub struct AnalysisManager {
    store: Arc<LocalStore>,
    client: Arc<ApiClient>,
    session: SessionStore,
    state: Arc<Mutex<SyncState>>,
    /// Broadcast channel for snapshot change events.
    events_tx: broadcast::Sender<AnalysisEvent>,
    /// Parent of every per-request token handed out by [`Self::analyze`].
    cancel_root: CancellationToken,
}

impl AnalysisManager {
    /// Build a manager hydrated from storage. Corrupt persisted data is
    /// discarded (both keys removed) and the snapshot starts empty.
    pub fn new(store: Arc<LocalStore>, client: Arc<ApiClient>, session: SessionStore) -> Self {
        let (events_tx, _) = broadcast::channel(64);
        let snapshot = match read_persisted(&store) {
            Persisted::Value(result, fetched_at) => AnalysisSnapshot {
                result: Some(result),
                fetched_at: Some(fetched_at),
                ..Default::default()
            },
            Persisted::Absent => AnalysisSnapshot::default(),
            Persisted::Corrupt => {
                discard_persisted(&store);
                AnalysisSnapshot::default()
            }
        };
        Self {
            store,
            client,
            session,
            state: Arc::new(Mutex::new(SyncState { snapshot, issued: 0 })),
            events_tx,
            cancel_root: CancellationToken::new(),
        }
    }

    /// Current snapshot. Cheap synchronous clone; never blocks on I/O.
    pub fn snapshot(&self) -> AnalysisSnapshot {
        self.lock_state().snapshot.clone()
    }

    /// Subscribe to snapshot change events. Dropping the receiver is the
    /// whole teardown; slow readers miss events rather than block the
    /// sender.
    pub fn subscribe(&self) -> broadcast::Receiver<AnalysisEvent> {
        self.events_tx.subscribe()
    }

    /// Run one analysis under a fresh child of the root cancel token, so
    /// [`Self::shutdown`] aborts it.
    pub async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResult, AnalysisError> {
        let cancel = self.cancel_root.child_token();
        self.analyze_with_cancel(request, &cancel).await
    }

    /// Run one analysis that the caller can cancel independently.
    ///
    /// Requires a stored session token; without one this returns
    /// [`AnalysisError::NotAuthenticated`] before any network traffic
    /// and leaves the snapshot untouched.
    pub async fn analyze_with_cancel(
        &self,
        mut request: AnalysisRequest,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult, AnalysisError> {
        let token = match self.session.token() {
            Ok(token) => token,
            Err(err) => {
                warn!("could not read session token: {err}");
                None
            }
        };
        let Some(token) = token else {
            return Err(AnalysisError::NotAuthenticated);
        };

        request.website = normalize_website(&request.website);

        let seq = {
            let mut state = self.lock_state();
            state.issued += 1;
            state.snapshot.status = SyncStatus::Pending;
            state.snapshot.error = None;
            state.issued
        };

        match self.client.analyze(&request, Some(&token), cancel).await {
            Ok(result) => {
                let fetched_at = Utc::now();
                let state = self.lock_state();
                if state.issued != seq {
                    debug!("discarding stale analysis completion (seq {seq})");
                    return Ok(result);
                }
                self.apply_result(state, &result, fetched_at);
                Ok(result)
            }
            Err(err) => {
                let mut state = self.lock_state();
                if state.issued == seq {
                    state.snapshot.status = SyncStatus::Error;
                    state.snapshot.error = Some(failure_for(&err));
                }
                Err(err)
            }
        }
    }

    /// Discard the stored result and reset the snapshot. Idempotent, and
    /// invalidates any request still in flight.
    pub fn clear(&self) -> Result<(), StorageError> {
        let mut state = self.lock_state();
        self.store.remove(keys::ANALYSIS_DATA)?;
        self.store.remove(keys::ANALYSIS_TIMESTAMP)?;
        state.issued += 1;
        state.snapshot = AnalysisSnapshot::default();
        drop(state);
        // Ignore error if no subscribers.
        let _ = self.events_tx.send(AnalysisEvent::Cleared);
        Ok(())
    }

    /// Dismiss a recorded failure without touching the result.
    pub fn clear_error(&self) {
        let mut state = self.lock_state();
        if state.snapshot.status == SyncStatus::Error {
            state.snapshot.status = SyncStatus::Idle;
        }
        state.snapshot.error = None;
    }

    /// Re-read storage and adopt whatever another process has written.
    ///
    /// No-op when storage matches the in-memory `fetched_at` (our own
    /// write echoed back), or when the persisted pair is unreadable. An
    /// in-flight request keeps its pending marker either way.
    pub fn resync_from_storage(&self) {
        match read_persisted(&self.store) {
            Persisted::Value(result, fetched_at) => {
                let mut state = self.lock_state();
                if state.snapshot.fetched_at == Some(fetched_at) {
                    return;
                }
                state.snapshot.result = Some(result.clone());
                state.snapshot.fetched_at = Some(fetched_at);
                if !state.snapshot.is_pending() {
                    state.snapshot.status = SyncStatus::Idle;
                    state.snapshot.error = None;
                }
                drop(state);
                // Ignore error if no subscribers.
                let _ = self
                    .events_tx
                    .send(AnalysisEvent::Updated { result, fetched_at });
            }
            Persisted::Absent => {
                let mut state = self.lock_state();
                if !state.snapshot.has_result() {
                    return;
                }
                let pending = state.snapshot.is_pending();
                state.snapshot = AnalysisSnapshot::default();
                if pending {
                    state.snapshot.status = SyncStatus::Pending;
                }
                drop(state);
                // Ignore error if no subscribers.
                let _ = self.events_tx.send(AnalysisEvent::Cleared);
            }
            // Keep the in-memory snapshot; a later write will resync.
            Persisted::Corrupt => {}
        }
    }

    /// Cancel every request started through [`Self::analyze`].
    pub fn shutdown(&self) {
        self.cancel_root.cancel();
    }

    /// Persist then publish a fresh result. Takes the guard so storage
    /// write order matches snapshot apply order.
    fn apply_result(
        &self,
        mut state: MutexGuard<'_, SyncState>,
        result: &AnalysisResult,
        fetched_at: DateTime<Utc>,
    ) {
        self.persist(result, fetched_at);
        state.snapshot.result = Some(result.clone());
        state.snapshot.fetched_at = Some(fetched_at);
        state.snapshot.status = SyncStatus::Idle;
        state.snapshot.error = None;
        drop(state);
        // Ignore error if no subscribers.
        let _ = self.events_tx.send(AnalysisEvent::Updated {
            result: result.clone(),
            fetched_at,
        });
    }

    /// Best-effort write of the result pair. A persistence failure is
    /// logged but never blocks the in-memory snapshot.
    fn persist(&self, result: &AnalysisResult, fetched_at: DateTime<Utc>) {
        let data = match serde_json::to_string(result) {
            Ok(data) => data,
            Err(err) => {
                warn!("could not serialize analysis result: {err}");
                return;
            }
        };
        if let Err(err) = self.store.set(keys::ANALYSIS_DATA, &data) {
            warn!("could not persist analysis data: {err}");
            return;
        }
        if let Err(err) = self
            .store
            .set(keys::ANALYSIS_TIMESTAMP, &fetched_at.to_rfc3339())
        {
            warn!("could not persist analysis timestamp: {err}");
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn failure_for(err: &AnalysisError) -> SyncFailure {
    let kind = match err {
        AnalysisError::RateLimited => FailureKind::RateLimited,
        _ => FailureKind::RequestFailed,
    };
    SyncFailure {
        kind,
        message: err.to_string(),
    }
}

/// Prefix bare domains with `https://`; explicit schemes pass through.
fn normalize_website(raw: &str) -> String {
    if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    }
}

fn read_persisted(store: &LocalStore) -> Persisted {
    let data = match store.get(keys::ANALYSIS_DATA) {
        Ok(value) => value,
        Err(err) => {
            warn!("could not read persisted analysis data: {err}");
            return Persisted::Corrupt;
        }
    };
    let stamp = match store.get(keys::ANALYSIS_TIMESTAMP) {
        Ok(value) => value,
        Err(err) => {
            warn!("could not read persisted analysis timestamp: {err}");
            return Persisted::Corrupt;
        }
    };
    match (data, stamp) {
        (Some(data), Some(stamp)) => {
            let result = match serde_json::from_str(&data) {
                Ok(result) => result,
                Err(err) => {
                    warn!("persisted analysis data is corrupt: {err}");
                    return Persisted::Corrupt;
                }
            };
            let fetched_at = match DateTime::parse_from_rfc3339(&stamp) {
                Ok(fetched_at) => fetched_at.with_timezone(&Utc),
                Err(err) => {
                    warn!("persisted analysis timestamp is corrupt: {err}");
                    return Persisted::Corrupt;
                }
            };
            Persisted::Value(result, fetched_at)
        }
        (None, None) => Persisted::Absent,
        // A lone key can appear while another process is mid-write.
        // Treat it as absent; a later resync picks up the pair.
        _ => {
            debug!("lone analysis key in storage, treating as absent");
            Persisted::Absent
        }
    }
}

fn discard_persisted(store: &LocalStore) {
    if let Err(err) = store.remove(keys::ANALYSIS_DATA) {
        warn!("could not remove corrupt analysis data: {err}");
    }
    if let Err(err) = store.remove(keys::ANALYSIS_TIMESTAMP) {
        warn!("could not remove corrupt analysis timestamp: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use serde_json::Value;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::broadcast::error::TryRecvError;
    use wiremock::matchers::body_partial_json;
    use wiremock::matchers::method;
    use wiremock::matchers::path;
    use wiremock::Mock;
    use wiremock::MockServer;
    use wiremock::ResponseTemplate;

    fn build_manager(home: &Path, base_url: String) -> (Arc<LocalStore>, AnalysisManager) {
        let store = Arc::new(LocalStore::new(home).expect("create store"));
        let config = Config {
            base_url,
            request_timeout_secs: 5,
        };
        let client = Arc::new(ApiClient::new(&config).expect("build client"));
        let session = SessionStore::new(store.clone(), client.clone());
        let manager = AnalysisManager::new(store.clone(), client, session);
        (store, manager)
    }

    fn signed_in(store: &LocalStore) {
        store.set(keys::AUTH_TOKEN, "tok-test").expect("seed token");
        store
            .set(
                keys::USER,
                r#"{"id":"1","name":"Vizor User","email":"me@acme.io","plan":"Starter Plan"}"#,
            )
            .expect("seed user");
    }

    fn body_with_citations(count: u32) -> Value {
        json!({
            "llm_citations": count,
            "avg_position": 3.2,
            "avg_summarizability": 70,
            "ai_visibility": 55,
            "sentiment": [],
            "brand_visibility": [{"model": "ChatGPT", "mentions": 30}],
            "industry_rankings": [{"name": "Acme", "mentions": 10}],
            "visibility": {
                "Content Quality & Structure": 7,
                "Trusted External Sources": 6,
                "Intent-Mapped Keywords & Pages": 7,
                "Freshness & Update Frequency": 4,
                "Internal Linking & Structure": 6,
                "Backlink Diversity": 5,
                "Page Accessibility (speed, mobile, crawlability)": 8,
                "Schema & Structured Data": 7,
                "Social Mentions": 4,
                "UX/UI Visual Design": 8
            }
        })
    }

    fn request_named(brand: &str) -> AnalysisRequest {
        AnalysisRequest {
            category: "Fashion".to_string(),
            brand_name: brand.to_string(),
            location: "Global".to_string(),
            keywords: vec!["sneakers".to_string()],
            website: "acme.com".to_string(),
        }
    }

    #[tokio::test]
    async fn unauthenticated_analyze_is_rejected_before_the_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body_with_citations(1)))
            .expect(0)
            .mount(&server)
            .await;

        let home = TempDir::new().expect("temp home");
        let (_store, manager) = build_manager(home.path(), server.uri());

        let err = manager
            .analyze(request_named("Acme"))
            .await
            .expect_err("must fail");

        assert!(matches!(err, AnalysisError::NotAuthenticated));
        assert_eq!(AnalysisSnapshot::default(), manager.snapshot());
    }

    #[tokio::test]
    async fn successful_analyze_updates_snapshot_storage_and_subscribers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .and(body_partial_json(json!({"website": "https://acme.com"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(body_with_citations(42)))
            .expect(1)
            .mount(&server)
            .await;

        let home = TempDir::new().expect("temp home");
        let (store, manager) = build_manager(home.path(), server.uri());
        signed_in(&store);
        let mut events = manager.subscribe();

        let result = manager
            .analyze(request_named("Acme"))
            .await
            .expect("analyze");
        assert_eq!(42, result.llm_citations);

        let snapshot = manager.snapshot();
        assert_eq!(SyncStatus::Idle, snapshot.status);
        assert_eq!(None, snapshot.error);
        assert_eq!(Some(result.clone()), snapshot.result);
        let fetched_at = snapshot.fetched_at.expect("fetched_at set");

        let data = store
            .get(keys::ANALYSIS_DATA)
            .expect("read data")
            .expect("data persisted");
        let persisted: AnalysisResult = serde_json::from_str(&data).expect("parse data");
        assert_eq!(result, persisted);
        let stamp = store
            .get(keys::ANALYSIS_TIMESTAMP)
            .expect("read stamp")
            .expect("stamp persisted");
        let parsed = DateTime::parse_from_rfc3339(&stamp)
            .expect("parse stamp")
            .with_timezone(&Utc);
        assert_eq!(fetched_at, parsed);

        match events.try_recv().expect("one event") {
            AnalysisEvent::Updated {
                result: published,
                fetched_at: published_at,
            } => {
                assert_eq!(result, published);
                assert_eq!(fetched_at, published_at);
            }
            other => panic!("expected Updated, got {other:?}"),
        }
        assert_eq!(Err(TryRecvError::Empty), events.try_recv());
    }

    #[tokio::test]
    async fn restart_rehydrates_the_persisted_snapshot() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body_with_citations(7)))
            .mount(&server)
            .await;

        let home = TempDir::new().expect("temp home");
        let (store, manager) = build_manager(home.path(), server.uri());
        signed_in(&store);
        manager
            .analyze(request_named("Acme"))
            .await
            .expect("analyze");
        let before = manager.snapshot();

        let (_store, restarted) = build_manager(home.path(), server.uri());
        let after = restarted.snapshot();

        assert_eq!(before.result, after.result);
        assert_eq!(before.fetched_at, after.fetched_at);
        assert_eq!(SyncStatus::Idle, after.status);
        assert_eq!(None, after.error);
    }

    #[tokio::test]
    async fn rate_limited_response_keeps_the_previous_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body_with_citations(7)))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"rateLimitReached": true})),
            )
            .mount(&server)
            .await;

        let home = TempDir::new().expect("temp home");
        let (store, manager) = build_manager(home.path(), server.uri());
        signed_in(&store);
        manager
            .analyze(request_named("Acme"))
            .await
            .expect("first analyze");
        let first = manager.snapshot();

        let err = manager
            .analyze(request_named("Acme"))
            .await
            .expect_err("second must fail");
        assert!(matches!(err, AnalysisError::RateLimited));

        let snapshot = manager.snapshot();
        assert_eq!(SyncStatus::Error, snapshot.status);
        let failure = snapshot.error.expect("failure recorded");
        assert_eq!(FailureKind::RateLimited, failure.kind);
        assert_eq!("rate limit reached", failure.message);
        // The previous result and its timestamp survive the failure.
        assert_eq!(first.result, snapshot.result);
        assert_eq!(first.fetched_at, snapshot.fetched_at);
        let data = store
            .get(keys::ANALYSIS_DATA)
            .expect("read data")
            .expect("still persisted");
        let persisted: AnalysisResult = serde_json::from_str(&data).expect("parse data");
        assert_eq!(7, persisted.llm_citations);
    }

    #[tokio::test]
    async fn corrupt_persisted_data_resets_and_removes_the_keys() {
        let server = MockServer::start().await;
        let home = TempDir::new().expect("temp home");
        let store = Arc::new(LocalStore::new(home.path()).expect("create store"));
        store
            .set(keys::ANALYSIS_DATA, "{definitely not json")
            .expect("seed data");
        store
            .set(keys::ANALYSIS_TIMESTAMP, "2026-08-25T12:00:00+00:00")
            .expect("seed stamp");

        let (store, manager) = build_manager(home.path(), server.uri());

        assert_eq!(AnalysisSnapshot::default(), manager.snapshot());
        assert_eq!(None, store.get(keys::ANALYSIS_DATA).expect("read data"));
        assert_eq!(
            None,
            store.get(keys::ANALYSIS_TIMESTAMP).expect("read stamp")
        );
    }

    #[tokio::test]
    async fn lone_timestamp_reads_as_absent_but_stays_on_disk() {
        let server = MockServer::start().await;
        let home = TempDir::new().expect("temp home");
        let store = Arc::new(LocalStore::new(home.path()).expect("create store"));
        store
            .set(keys::ANALYSIS_TIMESTAMP, "2026-08-25T12:00:00+00:00")
            .expect("seed stamp");

        let (store, manager) = build_manager(home.path(), server.uri());

        assert_eq!(AnalysisSnapshot::default(), manager.snapshot());
        assert!(store
            .get(keys::ANALYSIS_TIMESTAMP)
            .expect("read stamp")
            .is_some());
    }

    #[tokio::test]
    async fn error_body_feeds_the_failure_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .respond_with(
                ResponseTemplate::new(503)
                    .insert_header("content-type", "text/plain")
                    .set_body_string("Service Unavailable"),
            )
            .mount(&server)
            .await;

        let home = TempDir::new().expect("temp home");
        let (store, manager) = build_manager(home.path(), server.uri());
        signed_in(&store);

        let err = manager
            .analyze(request_named("Acme"))
            .await
            .expect_err("must fail");
        match err {
            AnalysisError::RequestFailed(message) => assert_eq!("Service Unavailable", message),
            other => panic!("expected RequestFailed, got {other:?}"),
        }

        let snapshot = manager.snapshot();
        assert_eq!(SyncStatus::Error, snapshot.status);
        let failure = snapshot.error.expect("failure recorded");
        assert_eq!(FailureKind::RequestFailed, failure.kind);
        assert_eq!("Service Unavailable", failure.message);
    }

    #[tokio::test]
    async fn newest_request_wins_the_race() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .and(body_partial_json(json!({"brandName": "SlowCo"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(body_with_citations(1))
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .and(body_partial_json(json!({"brandName": "FastCo"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(body_with_citations(2)))
            .mount(&server)
            .await;

        let home = TempDir::new().expect("temp home");
        let (store, manager) = build_manager(home.path(), server.uri());
        signed_in(&store);
        let mut events = manager.subscribe();

        let slow = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.analyze(request_named("SlowCo")).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        let fast = manager
            .analyze(request_named("FastCo"))
            .await
            .expect("fast analyze");
        assert_eq!(2, fast.llm_citations);

        // The stale completion is still handed to its caller.
        let slow_result = slow.await.expect("join").expect("slow analyze");
        assert_eq!(1, slow_result.llm_citations);

        let snapshot = manager.snapshot();
        assert_eq!(SyncStatus::Idle, snapshot.status);
        assert_eq!(2, snapshot.result.expect("kept result").llm_citations);
        let data = store
            .get(keys::ANALYSIS_DATA)
            .expect("read data")
            .expect("data persisted");
        let persisted: AnalysisResult = serde_json::from_str(&data).expect("parse data");
        assert_eq!(2, persisted.llm_citations);

        // Exactly one broadcast: the stale completion publishes nothing.
        assert!(matches!(
            events.try_recv().expect("one event"),
            AnalysisEvent::Updated { result, .. } if result.llm_citations == 2
        ));
        assert_eq!(Err(TryRecvError::Empty), events.try_recv());
    }

    #[tokio::test]
    async fn cancelled_request_reports_cancelled() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(body_with_citations(1))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let home = TempDir::new().expect("temp home");
        let (store, manager) = build_manager(home.path(), server.uri());
        signed_in(&store);

        let cancel = CancellationToken::new();
        let handle = {
            let manager = manager.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { manager.analyze_with_cancel(request_named("Acme"), &cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();

        let err = handle.await.expect("join").expect_err("cancelled");
        assert!(matches!(err, AnalysisError::Cancelled));

        let snapshot = manager.snapshot();
        assert_eq!(SyncStatus::Error, snapshot.status);
        let failure = snapshot.error.expect("failure recorded");
        assert_eq!(FailureKind::RequestFailed, failure.kind);
        assert_eq!("analysis request cancelled", failure.message);
    }

    #[tokio::test]
    async fn shutdown_cancels_in_flight_requests() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(body_with_citations(1))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let home = TempDir::new().expect("temp home");
        let (store, manager) = build_manager(home.path(), server.uri());
        signed_in(&store);

        let handle = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.analyze(request_named("Acme")).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        manager.shutdown();

        let err = handle.await.expect("join").expect_err("cancelled");
        assert!(matches!(err, AnalysisError::Cancelled));
    }

    #[tokio::test]
    async fn clear_removes_keys_and_is_idempotent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body_with_citations(7)))
            .mount(&server)
            .await;

        let home = TempDir::new().expect("temp home");
        let (store, manager) = build_manager(home.path(), server.uri());
        signed_in(&store);
        manager
            .analyze(request_named("Acme"))
            .await
            .expect("analyze");
        let mut events = manager.subscribe();

        manager.clear().expect("clear");
        assert_eq!(AnalysisSnapshot::default(), manager.snapshot());
        assert_eq!(None, store.get(keys::ANALYSIS_DATA).expect("read data"));
        assert_eq!(
            None,
            store.get(keys::ANALYSIS_TIMESTAMP).expect("read stamp")
        );
        assert!(matches!(
            events.try_recv().expect("cleared event"),
            AnalysisEvent::Cleared
        ));

        // A second clear is a no-op apart from the event.
        manager.clear().expect("clear again");
        assert_eq!(AnalysisSnapshot::default(), manager.snapshot());
        assert_eq!(None, store.get(keys::ANALYSIS_DATA).expect("read data"));
    }

    #[tokio::test]
    async fn clear_invalidates_in_flight_requests() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(body_with_citations(1))
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;

        let home = TempDir::new().expect("temp home");
        let (store, manager) = build_manager(home.path(), server.uri());
        signed_in(&store);
        let mut events = manager.subscribe();

        let handle = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.analyze(request_named("Acme")).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        manager.clear().expect("clear");

        // The fetch still succeeds for its caller but no longer lands.
        handle.await.expect("join").expect("analyze");
        assert_eq!(AnalysisSnapshot::default(), manager.snapshot());
        assert_eq!(None, store.get(keys::ANALYSIS_DATA).expect("read data"));
        assert!(matches!(
            events.try_recv().expect("cleared event"),
            AnalysisEvent::Cleared
        ));
        assert_eq!(Err(TryRecvError::Empty), events.try_recv());
    }

    #[tokio::test]
    async fn clear_error_returns_to_idle() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .respond_with(ResponseTemplate::new(503).set_body_string("boom"))
            .mount(&server)
            .await;

        let home = TempDir::new().expect("temp home");
        let (store, manager) = build_manager(home.path(), server.uri());
        signed_in(&store);
        manager
            .analyze(request_named("Acme"))
            .await
            .expect_err("must fail");
        assert_eq!(SyncStatus::Error, manager.snapshot().status);

        manager.clear_error();

        let snapshot = manager.snapshot();
        assert_eq!(SyncStatus::Idle, snapshot.status);
        assert_eq!(None, snapshot.error);
    }

    #[tokio::test]
    async fn resync_adopts_changes_written_by_another_process() {
        let server = MockServer::start().await;
        let home = TempDir::new().expect("temp home");
        let (store, manager) = build_manager(home.path(), server.uri());
        let mut events = manager.subscribe();

        let body = serde_json::to_string(&body_with_citations(9)).expect("serialize");
        store.set(keys::ANALYSIS_DATA, &body).expect("write data");
        store
            .set(keys::ANALYSIS_TIMESTAMP, "2026-08-25T12:00:00+00:00")
            .expect("write stamp");

        manager.resync_from_storage();
        let snapshot = manager.snapshot();
        assert_eq!(9, snapshot.result.expect("adopted").llm_citations);
        assert!(matches!(
            events.try_recv().expect("updated event"),
            AnalysisEvent::Updated { .. }
        ));

        // Same timestamp again: nothing to adopt, nothing published.
        manager.resync_from_storage();
        assert_eq!(Err(TryRecvError::Empty), events.try_recv());

        store.remove(keys::ANALYSIS_DATA).expect("remove data");
        store
            .remove(keys::ANALYSIS_TIMESTAMP)
            .expect("remove stamp");
        manager.resync_from_storage();
        assert_eq!(AnalysisSnapshot::default(), manager.snapshot());
        assert!(matches!(
            events.try_recv().expect("cleared event"),
            AnalysisEvent::Cleared
        ));

        manager.resync_from_storage();
        assert_eq!(Err(TryRecvError::Empty), events.try_recv());
    }

    #[tokio::test]
    async fn resync_ignores_corrupt_storage() {
        let server = MockServer::start().await;
        let home = TempDir::new().expect("temp home");
        let store = Arc::new(LocalStore::new(home.path()).expect("create store"));
        let body = serde_json::to_string(&body_with_citations(9)).expect("serialize");
        store.set(keys::ANALYSIS_DATA, &body).expect("write data");
        store
            .set(keys::ANALYSIS_TIMESTAMP, "2026-08-25T12:00:00+00:00")
            .expect("write stamp");

        let (store, manager) = build_manager(home.path(), server.uri());
        let mut events = manager.subscribe();
        store
            .set(keys::ANALYSIS_DATA, "{torn write")
            .expect("corrupt data");

        manager.resync_from_storage();

        let snapshot = manager.snapshot();
        assert_eq!(9, snapshot.result.expect("kept result").llm_citations);
        assert_eq!(Err(TryRecvError::Empty), events.try_recv());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn persistence_failure_does_not_block_the_snapshot() {
        use std::os::unix::fs::PermissionsExt;

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body_with_citations(3)))
            .mount(&server)
            .await;

        let home = TempDir::new().expect("temp home");
        let (store, manager) = build_manager(home.path(), server.uri());
        signed_in(&store);

        let mut perms = std::fs::metadata(store.base_dir())
            .expect("stat storage dir")
            .permissions();
        perms.set_mode(0o500);
        std::fs::set_permissions(store.base_dir(), perms.clone()).expect("make read-only");

        let result = manager
            .analyze(request_named("Acme"))
            .await
            .expect("analyze");
        assert_eq!(3, result.llm_citations);
        let snapshot = manager.snapshot();
        assert_eq!(SyncStatus::Idle, snapshot.status);
        assert_eq!(3, snapshot.result.expect("in-memory result").llm_citations);

        perms.set_mode(0o700);
        std::fs::set_permissions(store.base_dir(), perms).expect("restore permissions");
    }

    #[test]
    fn bare_domains_gain_https() {
        assert_eq!("https://acme.com", normalize_website("acme.com"));
        assert_eq!("http://acme.com", normalize_website("http://acme.com"));
        assert_eq!("https://acme.com", normalize_website("https://acme.com"));
    }
}
