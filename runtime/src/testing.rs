//! Scripted collaborators for tests. Every call parks on a gate that the
//! test releases explicitly, so completions can be ordered at will.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use stride_core::error::RemoteError;
use stride_core::ids::TempId;
use tokio::sync::oneshot;

use crate::consumer::QueryConsumer;
use crate::mutation::{Confirmed, MutationBackend};
use crate::query::SearchSource;

type Gate<T> = oneshot::Sender<Result<T, RemoteError>>;

struct Calls<A, T> {
    args: Vec<A>,
    gates: Vec<Option<Gate<T>>>,
}

struct GateBook<A, T>(Mutex<Calls<A, T>>);

impl<A: Clone, T> GateBook<A, T> {
    fn new() -> Self {
        GateBook(Mutex::new(Calls {
            args: Vec::new(),
            gates: Vec::new(),
        }))
    }

    fn register(&self, arg: A) -> oneshot::Receiver<Result<T, RemoteError>> {
        let (tx, rx) = oneshot::channel();
        let mut calls = self.0.lock().unwrap();
        calls.args.push(arg);
        calls.gates.push(Some(tx));
        rx
    }

    fn args(&self) -> Vec<A> {
        self.0.lock().unwrap().args.clone()
    }

    fn len(&self) -> usize {
        self.0.lock().unwrap().args.len()
    }

    /// Resolves call `index`. A canceled caller has dropped its end; that is fine.
    fn release(&self, index: usize, result: Result<T, RemoteError>) {
        let gate = self.0.lock().unwrap().gates[index]
            .take()
            .expect("gate released twice");
        let _ = gate.send(result);
    }

    async fn wait_for(&self, n: usize) {
        for _ in 0..1000 {
            if self.len() >= n {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("expected {n} calls, saw {}", self.len());
    }
}

async fn wait_gate<T>(rx: oneshot::Receiver<Result<T, RemoteError>>) -> Result<T, RemoteError> {
    rx.await
        .unwrap_or_else(|_| Err(RemoteError::Network("gate dropped".to_string())))
}

/// Search source whose responses are released by the test.
pub struct GatedSource<T> {
    book: GateBook<String, Vec<T>>,
}

impl<T: Clone + Send + 'static> GatedSource<T> {
    pub fn new() -> Self {
        Self {
            book: GateBook::new(),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.book.args()
    }

    pub fn call_count(&self) -> usize {
        self.book.len()
    }

    pub fn release(&self, index: usize, result: Result<Vec<T>, RemoteError>) {
        self.book.release(index, result);
    }

    pub async fn wait_for_calls(&self, n: usize) {
        self.book.wait_for(n).await;
    }
}

impl<T: Clone + Send + 'static> SearchSource for GatedSource<T> {
    type Item = T;

    async fn search(&self, query: &str) -> Result<Vec<T>, RemoteError> {
        let rx = self.book.register(query.to_string());
        wait_gate(rx).await
    }
}

/// Mutation backend for `String` payloads whose commits are released by the test.
pub struct GatedBackend {
    book: GateBook<(TempId, String), Confirmed<String>>,
}

impl GatedBackend {
    pub fn new() -> Self {
        Self {
            book: GateBook::new(),
        }
    }

    pub fn calls(&self) -> Vec<(TempId, String)> {
        self.book.args()
    }

    pub fn call_count(&self) -> usize {
        self.book.len()
    }

    pub fn confirm(&self, index: usize, id: &str) {
        self.confirm_at(index, id, Utc::now());
    }

    pub fn confirm_at(&self, index: usize, id: &str, at: DateTime<Utc>) {
        let content = self.calls()[index].1.clone();
        self.book.release(
            index,
            Ok(Confirmed {
                id: id.to_string(),
                content,
                confirmed_at: at,
            }),
        );
    }

    pub fn fail(&self, index: usize, err: RemoteError) {
        self.book.release(index, Err(err));
    }

    pub async fn wait_for_calls(&self, n: usize) {
        self.book.wait_for(n).await;
    }
}

impl MutationBackend for GatedBackend {
    type Payload = String;

    async fn commit(
        &self,
        temp_id: TempId,
        payload: &String,
    ) -> Result<Confirmed<String>, RemoteError> {
        let rx = self.book.register((temp_id, payload.clone()));
        wait_gate(rx).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Results { seq: u64, items: Vec<String> },
    Error(String),
}

/// Query consumer that records every callback in order.
#[derive(Default)]
pub struct RecordingConsumer {
    pub notices: Vec<Notice>,
}

impl RecordingConsumer {
    pub fn last_results(&self) -> Option<(u64, Vec<String>)> {
        self.notices.iter().rev().find_map(|notice| match notice {
            Notice::Results { seq, items } => Some((*seq, items.clone())),
            Notice::Error(_) => None,
        })
    }
}

impl QueryConsumer<String> for RecordingConsumer {
    fn on_results_changed(&mut self, seq: u64, items: &[String]) {
        self.notices.push(Notice::Results {
            seq,
            items: items.to_vec(),
        });
    }

    fn on_error(&mut self, message: &str) {
        self.notices.push(Notice::Error(message.to_string()));
    }
}
