use std::sync::Arc;
use std::time::Duration;

use clap::ValueEnum;
use serde::Serialize;
use serde_json::json;
use stride_core::error::ValidationError;
use stride_runtime::query::{DebouncedQuery, QueryText, SearchSource};
use stride_runtime::search::{activity_search, chat_search, place_search, user_search};
use stride_runtime::{EngineConfig, ResultList};

use crate::http::HttpBackend;
use crate::util::{EXIT_OK, EXIT_SERVER, EXIT_USAGE, print_error, print_json};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchKind {
    Chats,
    Users,
    Places,
    Activities,
}

/// What the controller showed once typing stopped and the last fetch landed.
#[derive(Debug, Serialize)]
pub struct Settled<T> {
    pub query: String,
    pub seq: u64,
    pub fetches: u64,
    pub results: Vec<T>,
    pub error: Option<String>,
}

pub async fn run(
    backend: Arc<HttpBackend>,
    config: EngineConfig,
    kind: SearchKind,
    text: &str,
    keystroke_ms: u64,
) -> i32 {
    let min_chars = config.query.min_chars;
    let actual = QueryText::new(text).len();
    if actual < min_chars {
        let err = ValidationError::QueryTooShort { min_chars, actual };
        print_error(
            err.code(),
            &err.to_string(),
            Some("Type a longer query or lower STRIDE_MIN_QUERY_CHARS"),
        );
        return EXIT_USAGE;
    }

    let pace = Duration::from_millis(keystroke_ms);
    match kind {
        SearchKind::Chats => {
            let search = chat_search(backend, config.query);
            report(kind, type_out(search, text, pace).await)
        }
        SearchKind::Users => {
            let search = user_search(backend, config.query);
            report(kind, type_out(search, text, pace).await)
        }
        SearchKind::Places => {
            let search = place_search(backend, config.query);
            report(kind, type_out(search, text, pace).await)
        }
        SearchKind::Activities => {
            let search = activity_search(backend, config.query);
            report(kind, type_out(search, text, pace).await)
        }
    }
}

fn report<T: Serialize>(kind: SearchKind, settled: Settled<T>) -> i32 {
    let failed = settled.error.is_some();
    print_json(&json!({
        "kind": kind,
        "query": settled.query,
        "seq": settled.seq,
        "fetches": settled.fetches,
        "results": settled.results,
        "error": settled.error,
    }));
    if failed { EXIT_SERVER } else { EXIT_OK }
}

/// Feeds `text` into the controller one character at a time, `pace` apart,
/// then waits for the controller to go idle.
pub async fn type_out<S>(
    mut search: DebouncedQuery<S>,
    text: &str,
    pace: Duration,
) -> Settled<S::Item>
where
    S: SearchSource,
{
    let mut list = ResultList::new();
    let mut typed = String::new();

    for ch in text.chars() {
        typed.push(ch);
        // Prefixes below the minimum length are rejected and clear the list.
        if let Err(err) = search.submit(&typed, &mut list) {
            tracing::debug!(
                controller = search.name(),
                prefix = %typed,
                error = %err,
                "prefix not searched"
            );
        }

        let pause = tokio::time::sleep(pace);
        tokio::pin!(pause);
        loop {
            tokio::select! {
                _ = &mut pause => break,
                event = search.next_event() => search.apply(event, &mut list),
            }
        }
    }
    search.settle(&mut list).await;

    Settled {
        query: text.to_string(),
        seq: list.seq(),
        fetches: search.latest_seq(),
        results: list.items().to_vec(),
        error: list.error().map(str::to_string),
    }
}
