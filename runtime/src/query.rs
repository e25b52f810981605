//! Debounced incremental search against a remote source.
//!
//! Each keystroke goes through [`DebouncedQuery::submit`]. After the quiet
//! period the latest text is dispatched under a fresh sequence number, and
//! only the response for the latest sequence number ever reaches the consumer.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use stride_core::error::{RemoteError, ValidationError};

use crate::config::QueryConfig;
use crate::consumer::QueryConsumer;
use crate::lifecycle::{Completion, RequestLifecycle, with_timeout};

/// A remote source of search results.
pub trait SearchSource: Send + Sync + 'static {
    type Item: Clone + Send + 'static;

    fn search(
        &self,
        query: &str,
    ) -> impl Future<Output = Result<Vec<Self::Item>, RemoteError>> + Send;
}

/// Text as typed, and the form that is measured and sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryText {
    pub raw: String,
    /// Trimmed, with internal whitespace runs collapsed to one space
    pub normalized: String,
}

impl QueryText {
    pub fn new(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            normalized: raw.split_whitespace().collect::<Vec<_>>().join(" "),
        }
    }

    /// Length in characters, not bytes.
    pub fn len(&self) -> usize {
        self.normalized.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.normalized.is_empty()
    }
}

/// A query that was dispatched to the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Query {
    pub text: QueryText,
    /// Assigned at dispatch, strictly increasing per controller, never reused
    pub seq: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryPhase {
    Idle,
    Debouncing,
    Fetching,
}

/// What the controller settled on the last time it was idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryOutcome {
    Empty,
    Results,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Slot {
    Debounce,
    Fetch,
}

#[derive(Debug)]
enum Step<T> {
    TimerFired,
    Fetched {
        seq: u64,
        result: Result<Vec<T>, RemoteError>,
    },
}

/// A timer or fetch completion waiting to be applied on the update thread.
pub struct QueryEvent<T>(Completion<Slot, Step<T>>);

impl<T> fmt::Debug for QueryEvent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryEvent")
            .field("slot", self.0.key())
            .field("generation", &self.0.generation())
            .finish()
    }
}

pub struct DebouncedQuery<S: SearchSource> {
    name: &'static str,
    config: QueryConfig,
    source: Arc<S>,
    lifecycle: RequestLifecycle<Slot, Step<S::Item>>,
    pending: Option<QueryText>,
    in_flight: Option<Query>,
    latest_seq: u64,
    phase: QueryPhase,
    outcome: QueryOutcome,
    results: Vec<S::Item>,
    error: Option<String>,
}

impl<S: SearchSource> DebouncedQuery<S> {
    pub fn new(name: &'static str, source: Arc<S>, config: QueryConfig) -> Self {
        Self {
            name,
            config,
            source,
            lifecycle: RequestLifecycle::new(name),
            pending: None,
            in_flight: None,
            latest_seq: 0,
            phase: QueryPhase::Idle,
            outcome: QueryOutcome::Empty,
            results: Vec::new(),
            error: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    pub fn phase(&self) -> QueryPhase {
        self.phase
    }

    pub fn outcome(&self) -> QueryOutcome {
        self.outcome
    }

    /// Sequence number of the most recently dispatched query (0 before the first).
    pub fn latest_seq(&self) -> u64 {
        self.latest_seq
    }

    pub fn current_query(&self) -> Option<&Query> {
        self.in_flight.as_ref()
    }

    pub fn results(&self) -> &[S::Item] {
        &self.results
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Records a text change. Cancels the pending timer and any in-flight
    /// fetch. Text below the minimum length clears results synchronously and
    /// is rejected without touching the network.
    pub fn submit<C>(&mut self, raw: &str, consumer: &mut C) -> Result<(), ValidationError>
    where
        C: QueryConsumer<S::Item>,
    {
        let text = QueryText::new(raw);
        self.lifecycle.cancel_all();
        self.in_flight = None;

        if text.len() < self.config.min_chars {
            self.pending = None;
            self.reset_results(consumer);
            return Err(ValidationError::QueryTooShort {
                min_chars: self.config.min_chars,
                actual: text.len(),
            });
        }

        self.pending = Some(text);
        if self.config.debounce.is_zero() {
            self.dispatch();
        } else {
            let debounce = self.config.debounce;
            self.lifecycle.start(Slot::Debounce, async move {
                tokio::time::sleep(debounce).await;
                Step::TimerFired
            });
            self.phase = QueryPhase::Debouncing;
            tracing::debug!(
                controller = self.name,
                debounce_ms = debounce.as_millis() as u64,
                "debounce scheduled"
            );
        }
        Ok(())
    }

    /// Fires a pending debounce immediately (e.g. the keyboard search key).
    pub fn flush(&mut self) {
        if self.pending.is_some() {
            self.lifecycle.cancel(&Slot::Debounce);
            self.dispatch();
        }
    }

    /// Cancels everything and clears results, e.g. when the screen goes away.
    pub fn clear<C>(&mut self, consumer: &mut C)
    where
        C: QueryConsumer<S::Item>,
    {
        self.lifecycle.cancel_all();
        self.pending = None;
        self.in_flight = None;
        self.reset_results(consumer);
    }

    fn reset_results<C>(&mut self, consumer: &mut C)
    where
        C: QueryConsumer<S::Item>,
    {
        self.phase = QueryPhase::Idle;
        self.outcome = QueryOutcome::Empty;
        self.results.clear();
        self.error = None;
        consumer.on_results_changed(self.latest_seq, &[]);
    }

    fn dispatch(&mut self) {
        let Some(text) = self.pending.take() else {
            return;
        };
        self.lifecycle.cancel(&Slot::Fetch);
        self.latest_seq += 1;
        let seq = self.latest_seq;

        let source = Arc::clone(&self.source);
        let needle = text.normalized.clone();
        let timeout = self.config.request_timeout;
        self.lifecycle.start(Slot::Fetch, async move {
            let result = with_timeout(timeout, source.search(&needle)).await;
            Step::Fetched { seq, result }
        });

        tracing::debug!(controller = self.name, seq, query = %text.normalized, "fetch started");
        self.in_flight = Some(Query { text, seq });
        self.phase = QueryPhase::Fetching;
    }

    /// Waits for the next timer or fetch completion.
    pub async fn next_event(&mut self) -> QueryEvent<S::Item> {
        QueryEvent(self.lifecycle.next().await)
    }

    /// Applies a completion on the update thread. Completions of canceled
    /// flights and responses for superseded sequence numbers are dropped.
    pub fn apply<C>(&mut self, event: QueryEvent<S::Item>, consumer: &mut C)
    where
        C: QueryConsumer<S::Item>,
    {
        let Some((_, step)) = self.lifecycle.accept(event.0) else {
            return;
        };
        match step {
            Step::TimerFired => self.dispatch(),
            Step::Fetched { seq, result } => {
                if seq != self.latest_seq {
                    tracing::debug!(
                        controller = self.name,
                        seq,
                        latest = self.latest_seq,
                        "dropping stale search result"
                    );
                    return;
                }
                self.in_flight = None;
                self.phase = QueryPhase::Idle;
                match result {
                    Ok(items) => {
                        self.results = items;
                        self.error = None;
                        self.outcome = QueryOutcome::Results;
                        consumer.on_results_changed(seq, &self.results);
                    }
                    Err(err) => {
                        tracing::warn!(controller = self.name, seq, error = %err, "search failed");
                        let message = err.to_string();
                        self.results.clear();
                        self.error = Some(message.clone());
                        self.outcome = QueryOutcome::Error;
                        consumer.on_results_changed(seq, &[]);
                        consumer.on_error(&message);
                    }
                }
            }
        }
    }

    /// Waits for one completion and applies it.
    pub async fn step<C>(&mut self, consumer: &mut C)
    where
        C: QueryConsumer<S::Item>,
    {
        let event = self.next_event().await;
        self.apply(event, consumer);
    }

    /// Drives the controller until it is idle again. Hangs on a source that
    /// never answers when no request timeout is configured.
    pub async fn settle<C>(&mut self, consumer: &mut C)
    where
        C: QueryConsumer<S::Item>,
    {
        while self.phase != QueryPhase::Idle {
            self.step(consumer).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::consumer::ResultList;
    use crate::testing::{GatedSource, RecordingConsumer, Notice};

    fn controller(source: &Arc<GatedSource<String>>) -> DebouncedQuery<GatedSource<String>> {
        DebouncedQuery::new("test", Arc::clone(source), QueryConfig::default())
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn normalization_trims_and_collapses_whitespace() {
        let text = QueryText::new("  trail \t run  club ");
        assert_eq!(text.normalized, "trail run club");
        assert_eq!(text.raw, "  trail \t run  club ");
        assert_eq!(QueryText::new("  é ").len(), 1);
        assert!(QueryText::new("   ").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn short_query_clears_results_without_fetching() {
        let source = Arc::new(GatedSource::new());
        let mut query = controller(&source);
        let mut consumer = RecordingConsumer::default();

        let err = query.submit(" a ", &mut consumer).unwrap_err();
        assert_eq!(err, ValidationError::QueryTooShort { min_chars: 2, actual: 1 });
        assert_eq!(consumer.notices, vec![Notice::Results { seq: 0, items: vec![] }]);
        assert_eq!(query.phase(), QueryPhase::Idle);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(source.call_count(), 0);
        assert!(query.lifecycle.try_next().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn short_query_cancels_pending_fetch() {
        let source = Arc::new(GatedSource::new());
        let mut query = controller(&source);
        let mut results = ResultList::new();

        query.submit("run", &mut results).unwrap();
        query.step(&mut results).await;
        source.wait_for_calls(1).await;
        assert_eq!(query.phase(), QueryPhase::Fetching);

        query.submit("r", &mut results).unwrap_err();
        source.release(0, Ok(strings(&["running"])));
        assert_eq!(query.phase(), QueryPhase::Idle);

        let waited = tokio::time::timeout(Duration::from_secs(1), query.next_event()).await;
        assert!(waited.is_err(), "canceled fetch must not produce an event");
        assert!(results.items().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_coalesces_rapid_keystrokes_into_one_fetch() {
        let source = Arc::new(GatedSource::new());
        let mut query = controller(&source);
        let mut results = ResultList::new();

        for text in ["pa", "pad", "padd", "padel"] {
            query.submit(text, &mut results).unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(query.phase(), QueryPhase::Debouncing);
        assert_eq!(source.call_count(), 0);

        query.step(&mut results).await;
        source.wait_for_calls(1).await;
        assert_eq!(source.calls(), strings(&["padel"]));
        assert_eq!(query.latest_seq(), 1);

        source.release(0, Ok(strings(&["Padel Tuesday"])));
        query.settle(&mut results).await;
        assert_eq!(results.seq(), 1);
        assert_eq!(results.items(), strings(&["Padel Tuesday"]).as_slice());
        assert_eq!(query.outcome(), QueryOutcome::Results);
    }

    #[tokio::test(start_paused = true)]
    async fn newer_query_supersedes_in_flight_fetch() {
        let source = Arc::new(GatedSource::new());
        let mut query = controller(&source);
        let mut consumer = RecordingConsumer::default();

        assert!(query.submit("a", &mut consumer).is_err());
        assert_eq!(source.call_count(), 0);

        query.submit("ab", &mut consumer).unwrap();
        query.step(&mut consumer).await;
        source.wait_for_calls(1).await;
        assert_eq!(query.current_query().map(|q| q.seq), Some(1));

        query.submit("abc", &mut consumer).unwrap();
        query.step(&mut consumer).await;
        source.wait_for_calls(2).await;
        assert_eq!(query.current_query().map(|q| q.seq), Some(2));

        // Fetch #1 resolves late; it was canceled and must be ignored.
        source.release(0, Ok(strings(&["X"])));
        source.release(1, Ok(strings(&["Y"])));
        query.settle(&mut consumer).await;

        assert_eq!(consumer.last_results(), Some((2, strings(&["Y"]))));
        let stale = strings(&["X"]);
        assert!(!consumer
            .notices
            .iter()
            .any(|n| matches!(n, Notice::Results { items, .. } if items == &stale)));
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_order_responses_show_only_latest_query() {
        let source = Arc::new(GatedSource::new());
        let mut query = controller(&source);
        let mut results = ResultList::new();

        for (i, text) in ["yo", "yog", "yoga"].into_iter().enumerate() {
            query.submit(text, &mut results).unwrap();
            query.step(&mut results).await;
            source.wait_for_calls(i + 1).await;
        }

        source.release(2, Ok(strings(&["yoga flow"])));
        source.release(0, Ok(strings(&["yo-yo"])));
        source.release(1, Ok(strings(&["yoghurt"])));
        query.settle(&mut results).await;

        let waited = tokio::time::timeout(Duration::from_secs(1), query.next_event()).await;
        assert!(waited.is_err());
        assert_eq!(results.seq(), 3);
        assert_eq!(results.items(), strings(&["yoga flow"]).as_slice());
    }

    #[tokio::test(start_paused = true)]
    async fn failure_clears_results_and_reports_error() {
        let source = Arc::new(GatedSource::new());
        let mut query = controller(&source);
        let mut consumer = RecordingConsumer::default();

        query.submit("swim", &mut consumer).unwrap();
        query.step(&mut consumer).await;
        source.wait_for_calls(1).await;
        source.release(0, Ok(strings(&["Swim squad"])));
        query.settle(&mut consumer).await;

        query.submit("swimm", &mut consumer).unwrap();
        query.step(&mut consumer).await;
        source.wait_for_calls(2).await;
        source.release(1, Err(RemoteError::Network("connection reset".to_string())));
        query.settle(&mut consumer).await;

        assert!(query.results().is_empty());
        assert_eq!(query.outcome(), QueryOutcome::Error);
        assert_eq!(query.error(), Some("network error: connection reset"));
        assert_eq!(
            &consumer.notices[consumer.notices.len() - 2..],
            &[
                Notice::Results { seq: 2, items: vec![] },
                Notice::Error("network error: connection reset".to_string()),
            ]
        );
        // No automatic retry.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(source.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn success_after_failure_clears_error() {
        let source = Arc::new(GatedSource::new());
        let mut query = controller(&source);
        let mut results = ResultList::new();

        query.submit("hike", &mut results).unwrap();
        query.step(&mut results).await;
        source.wait_for_calls(1).await;
        source.release(0, Err(RemoteError::Status { status: 503, message: "busy".to_string() }));
        query.settle(&mut results).await;
        assert!(results.error().is_some());

        query.submit("hiker", &mut results).unwrap();
        query.step(&mut results).await;
        source.wait_for_calls(2).await;
        source.release(1, Ok(strings(&["Hikers united"])));
        query.settle(&mut results).await;

        assert_eq!(results.error(), None);
        assert_eq!(query.error(), None);
        assert_eq!(results.items(), strings(&["Hikers united"]).as_slice());
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_fetch_times_out_without_blocking_new_queries() {
        let source = Arc::new(GatedSource::new());
        let config = QueryConfig {
            request_timeout: Some(Duration::from_secs(3)),
            ..QueryConfig::default()
        };
        let mut query = DebouncedQuery::new("test", Arc::clone(&source), config);
        let mut results = ResultList::new();

        query.submit("climb", &mut results).unwrap();
        query.settle(&mut results).await;
        assert_eq!(query.outcome(), QueryOutcome::Error);
        assert_eq!(results.error(), Some("request timed out after 3000ms"));

        query.submit("climbing", &mut results).unwrap();
        query.step(&mut results).await;
        source.wait_for_calls(2).await;
        source.release(1, Ok(strings(&["Climbing gym"])));
        query.settle(&mut results).await;
        assert_eq!(results.items(), strings(&["Climbing gym"]).as_slice());
    }

    #[tokio::test(start_paused = true)]
    async fn flush_skips_the_debounce_window() {
        let source = Arc::new(GatedSource::new());
        let mut query = controller(&source);
        let mut results = ResultList::new();

        query.submit("row", &mut results).unwrap();
        query.flush();
        assert_eq!(query.phase(), QueryPhase::Fetching);
        source.wait_for_calls(1).await;
        assert_eq!(source.calls(), strings(&["row"]));
    }

    #[tokio::test(start_paused = true)]
    async fn clear_discards_in_flight_results() {
        let source = Arc::new(GatedSource::new());
        let mut query = controller(&source);
        let mut results = ResultList::new();

        query.submit("box", &mut results).unwrap();
        query.step(&mut results).await;
        source.wait_for_calls(1).await;
        query.clear(&mut results);
        source.release(0, Ok(strings(&["Boxing"])));

        let waited = tokio::time::timeout(Duration::from_secs(1), query.next_event()).await;
        assert!(waited.is_err());
        assert!(results.items().is_empty());
        assert_eq!(query.phase(), QueryPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn controllers_keep_independent_sequence_numbers() {
        let chats = Arc::new(GatedSource::new());
        let people = Arc::new(GatedSource::new());
        let mut chat_query = controller(&chats);
        let mut people_query = controller(&people);
        let mut chat_results = ResultList::new();
        let mut people_results = ResultList::new();

        chat_query.submit("team", &mut chat_results).unwrap();
        chat_query.step(&mut chat_results).await;
        people_query.submit("anna", &mut people_results).unwrap();
        people_query.step(&mut people_results).await;
        chat_query.submit("teams", &mut chat_results).unwrap();
        chat_query.step(&mut chat_results).await;

        assert_eq!(chat_query.latest_seq(), 2);
        assert_eq!(people_query.latest_seq(), 1);

        // Superseding a chat search leaves the people search alive.
        people.wait_for_calls(1).await;
        people.release(0, Ok(strings(&["Anna K."])));
        people_query.settle(&mut people_results).await;
        assert_eq!(people_results.items(), strings(&["Anna K."]).as_slice());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_debounce_dispatches_synchronously() {
        let source = Arc::new(GatedSource::<String>::new());
        let config = QueryConfig {
            debounce: Duration::ZERO,
            ..QueryConfig::default()
        };
        let mut query = DebouncedQuery::new("test", Arc::clone(&source), config);
        let mut results = ResultList::new();

        query.submit("gym", &mut results).unwrap();
        assert_eq!(query.phase(), QueryPhase::Fetching);
        assert_eq!(query.latest_seq(), 1);

        source.wait_for_calls(1).await;
        assert_eq!(source.calls(), vec!["gym".to_string()]);
    }
}
