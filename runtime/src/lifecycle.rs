//! Keyed, single-flight request lifecycle.
//!
//! Work runs on the tokio runtime; its output is sent back over a channel and
//! only touches state once the owner hands it to [`RequestLifecycle::accept`]
//! on the update thread. Every flight carries a generation number, and a
//! completion is accepted only while its generation is still the live one for
//! its key. Canceling a key drops its flight immediately, so anything the
//! canceled work produces afterwards (or already produced and queued) is
//! rejected at `accept`.

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::time::Duration;

use stride_core::error::RemoteError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Output of one finished unit of work, tagged with the flight that produced it.
#[derive(Debug)]
pub struct Completion<K, T> {
    key: K,
    generation: u64,
    output: T,
}

impl<K, T> Completion<K, T> {
    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug)]
struct Flight {
    generation: u64,
    token: CancellationToken,
}

pub struct RequestLifecycle<K, T> {
    name: &'static str,
    next_generation: u64,
    flights: HashMap<K, Flight>,
    tx: mpsc::UnboundedSender<Completion<K, T>>,
    rx: mpsc::UnboundedReceiver<Completion<K, T>>,
    cancel_on_drop: bool,
}

impl<K, T> RequestLifecycle<K, T>
where
    K: Eq + Hash + Clone + Debug + Send + 'static,
    T: Send + 'static,
{
    /// Lifecycle whose outstanding work is canceled when it is dropped.
    pub fn new(name: &'static str) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            name,
            next_generation: 0,
            flights: HashMap::new(),
            tx,
            rx,
            cancel_on_drop: true,
        }
    }

    /// Lifecycle whose outstanding work keeps running after it is dropped.
    /// Used for writes, where abandoning the request would not undo it server-side.
    pub fn detached(name: &'static str) -> Self {
        let mut lifecycle = Self::new(name);
        lifecycle.cancel_on_drop = false;
        lifecycle
    }

    /// Starts `work` under `key`, canceling whatever was running under the
    /// same key first. Returns the generation of the new flight.
    pub fn start<F>(&mut self, key: K, work: F) -> u64
    where
        F: Future<Output = T> + Send + 'static,
    {
        self.cancel(&key);

        self.next_generation += 1;
        let generation = self.next_generation;
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let tx = self.tx.clone();
        let task_key = key.clone();

        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancelled.cancelled() => {}
                output = work => {
                    // Receiver only disappears with the lifecycle itself.
                    let _ = tx.send(Completion { key: task_key, generation, output });
                }
            }
        });

        tracing::debug!(lifecycle = self.name, key = ?key, generation, "flight started");
        self.flights.insert(key, Flight { generation, token });
        generation
    }

    /// Requests cancellation of the flight under `key`. Once this returns, no
    /// completion of that flight will be accepted.
    pub fn cancel(&mut self, key: &K) -> bool {
        match self.flights.remove(key) {
            Some(flight) => {
                flight.token.cancel();
                tracing::debug!(
                    lifecycle = self.name,
                    key = ?key,
                    generation = flight.generation,
                    "flight canceled"
                );
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, flight) in self.flights.drain() {
            flight.token.cancel();
        }
    }

    pub fn is_running(&self, key: &K) -> bool {
        self.flights.contains_key(key)
    }

    pub fn generation(&self, key: &K) -> Option<u64> {
        self.flights.get(key).map(|flight| flight.generation)
    }

    pub fn in_flight(&self) -> usize {
        self.flights.len()
    }

    /// Admits a completion if its flight is still live, ending the flight.
    /// Returns `None` for completions of canceled or superseded flights.
    pub fn accept(&mut self, completion: Completion<K, T>) -> Option<(K, T)> {
        let live = self
            .flights
            .get(&completion.key)
            .is_some_and(|flight| flight.generation == completion.generation);
        if !live {
            tracing::debug!(
                lifecycle = self.name,
                key = ?completion.key,
                generation = completion.generation,
                "dropping completion of a canceled flight"
            );
            return None;
        }
        self.flights.remove(&completion.key);
        Some((completion.key, completion.output))
    }

    /// Waits for the next completion. Pending forever when nothing is in flight,
    /// so it can sit in a `select!` next to other event sources.
    pub async fn next(&mut self) -> Completion<K, T> {
        match self.rx.recv().await {
            Some(completion) => completion,
            // We hold a sender, so the channel never closes.
            None => std::future::pending().await,
        }
    }

    pub fn try_next(&mut self) -> Option<Completion<K, T>> {
        self.rx.try_recv().ok()
    }
}

impl<K, T> Drop for RequestLifecycle<K, T> {
    fn drop(&mut self) {
        if self.cancel_on_drop {
            for (_, flight) in self.flights.drain() {
                flight.token.cancel();
            }
        }
    }
}

/// Bounds a collaborator call by an optional timeout.
pub(crate) async fn with_timeout<F, T>(limit: Option<Duration>, call: F) -> Result<T, RemoteError>
where
    F: Future<Output = Result<T, RemoteError>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .unwrap_or_else(|_| Err(RemoteError::Timeout(limit))),
        None => call.await,
    }
}
