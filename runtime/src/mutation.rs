//! Optimistic mutations with background reconciliation.
//!
//! A submit shows a placeholder entity immediately and commits in the
//! background. Success replaces the placeholder in place; failure leaves it
//! where it is, marked failed, until the user retries or discards it.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use stride_core::error::{MutationError, RemoteError, ValidationError};
use stride_core::ids::{EntityId, TempId};

use crate::config::MutationConfig;
use crate::consumer::MutationConsumer;
use crate::lifecycle::{Completion, RequestLifecycle, with_timeout};

/// User-submitted content.
pub trait Payload: Clone + Send + Sync + 'static {
    /// Blank payloads are rejected before anything is shown or sent.
    fn is_blank(&self) -> bool;
}

impl Payload for String {
    fn is_blank(&self) -> bool {
        self.trim().is_empty()
    }
}

/// What the backend returns for an accepted mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmed<P> {
    /// Canonical server id
    pub id: String,
    pub content: P,
    pub confirmed_at: DateTime<Utc>,
}

/// The create/send operation behind a coordinator.
pub trait MutationBackend: Send + Sync + 'static {
    type Payload: Payload;

    /// `temp_id` is stable across explicit retries of the same action.
    fn commit(
        &self,
        temp_id: TempId,
        payload: &Self::Payload,
    ) -> impl Future<Output = Result<Confirmed<Self::Payload>, RemoteError>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Optimistic,
    Confirmed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationState {
    Pending,
    Confirmed,
    Failed,
}

/// A visible item of an ordered list, optimistic or confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entity<T> {
    /// Temp id while optimistic, server id once confirmed
    pub id: EntityId,
    pub content: T,
    pub origin: Origin,
    pub state: MutationState,
    /// Local insertion order; assigned by the list and kept across reconciliation
    pub position: u64,
    pub submitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl<T> Entity<T> {
    pub fn optimistic(temp_id: TempId, content: T, submitted_at: DateTime<Utc>) -> Self {
        Self {
            id: EntityId::Temp(temp_id),
            content,
            origin: Origin::Optimistic,
            state: MutationState::Pending,
            position: 0,
            submitted_at,
            confirmed_at: None,
        }
    }

    /// An entity the server already knows about (loaded, or just confirmed).
    pub fn confirmed(
        id: impl Into<String>,
        content: T,
        submitted_at: DateTime<Utc>,
        confirmed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EntityId::Server(id.into()),
            content,
            origin: Origin::Confirmed,
            state: MutationState::Confirmed,
            position: 0,
            submitted_at,
            confirmed_at: Some(confirmed_at),
        }
    }

    pub fn temp_id(&self) -> Option<TempId> {
        self.id.temp()
    }

    pub fn server_id(&self) -> Option<&str> {
        self.id.server()
    }
}

/// A submitted mutation the coordinator still owns: in flight or failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingMutation<P> {
    pub temp_id: TempId,
    pub payload: P,
    pub submitted_at: DateTime<Utc>,
    pub state: MutationState,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

type CommitResult<P> = Result<Confirmed<P>, RemoteError>;

/// A commit completion waiting to be applied on the update thread.
pub struct MutationEvent<P>(Completion<TempId, CommitResult<P>>);

impl<P> fmt::Debug for MutationEvent<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationEvent")
            .field("temp_id", self.0.key())
            .field("generation", &self.0.generation())
            .finish()
    }
}

pub struct MutationCoordinator<B: MutationBackend> {
    name: &'static str,
    config: MutationConfig,
    backend: Arc<B>,
    lifecycle: RequestLifecycle<TempId, CommitResult<B::Payload>>,
    mutations: BTreeMap<TempId, PendingMutation<B::Payload>>,
}

impl<B: MutationBackend> MutationCoordinator<B> {
    pub fn new(name: &'static str, backend: Arc<B>, config: MutationConfig) -> Self {
        Self {
            name,
            config,
            backend,
            // Commits already on the wire are left to finish if the screen goes away.
            lifecycle: RequestLifecycle::detached(name),
            mutations: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Shows `payload` immediately as a placeholder at the tail of the
    /// consumer's list and commits it in the background.
    pub fn submit<C>(
        &mut self,
        payload: B::Payload,
        consumer: &mut C,
    ) -> Result<TempId, ValidationError>
    where
        C: MutationConsumer<B::Payload>,
    {
        if payload.is_blank() {
            return Err(ValidationError::EmptyPayload);
        }

        let temp_id = TempId::next();
        let submitted_at = Utc::now();
        consumer.on_mutation_placed(Entity::optimistic(temp_id, payload.clone(), submitted_at));

        self.mutations.insert(
            temp_id,
            PendingMutation {
                temp_id,
                payload,
                submitted_at,
                state: MutationState::Pending,
                attempts: 0,
                last_error: None,
            },
        );
        self.launch(temp_id);
        Ok(temp_id)
    }

    /// Commits a failed mutation again under the same temp id.
    pub fn retry<C>(&mut self, temp_id: TempId, consumer: &mut C) -> Result<(), MutationError>
    where
        C: MutationConsumer<B::Payload>,
    {
        let mutation = self
            .mutations
            .get_mut(&temp_id)
            .ok_or(MutationError::UnknownMutation(temp_id))?;
        if mutation.state != MutationState::Failed {
            return Err(MutationError::NotFailed(temp_id));
        }
        mutation.state = MutationState::Pending;
        consumer.on_mutation_retried(temp_id);
        self.launch(temp_id);
        Ok(())
    }

    /// Drops a failed mutation at the user's request.
    pub fn discard<C>(
        &mut self,
        temp_id: TempId,
        consumer: &mut C,
    ) -> Result<B::Payload, MutationError>
    where
        C: MutationConsumer<B::Payload>,
    {
        let Entry::Occupied(entry) = self.mutations.entry(temp_id) else {
            return Err(MutationError::UnknownMutation(temp_id));
        };
        if entry.get().state != MutationState::Failed {
            return Err(MutationError::NotFailed(temp_id));
        }
        let mutation = entry.remove();
        consumer.on_mutation_discarded(temp_id);
        Ok(mutation.payload)
    }

    fn launch(&mut self, temp_id: TempId) {
        let Some(mutation) = self.mutations.get_mut(&temp_id) else {
            return;
        };
        mutation.attempts += 1;
        let attempt = mutation.attempts;
        let payload = mutation.payload.clone();
        let backend = Arc::clone(&self.backend);
        let timeout = self.config.request_timeout;

        self.lifecycle.start(temp_id, async move {
            with_timeout(timeout, backend.commit(temp_id, &payload)).await
        });
        tracing::debug!(coordinator = self.name, temp_id = %temp_id, attempt, "commit started");
    }

    pub fn get(&self, temp_id: TempId) -> Option<&PendingMutation<B::Payload>> {
        self.mutations.get(&temp_id)
    }

    /// Mutations still waiting on the backend, oldest first.
    pub fn pending(&self) -> impl Iterator<Item = &PendingMutation<B::Payload>> {
        self.mutations
            .values()
            .filter(|m| m.state == MutationState::Pending)
    }

    /// Failed mutations the user may retry or discard, oldest first.
    pub fn failed(&self) -> impl Iterator<Item = &PendingMutation<B::Payload>> {
        self.mutations
            .values()
            .filter(|m| m.state == MutationState::Failed)
    }

    pub fn has_pending(&self) -> bool {
        self.pending().next().is_some()
    }

    pub async fn next_event(&mut self) -> MutationEvent<B::Payload> {
        MutationEvent(self.lifecycle.next().await)
    }

    /// Applies a commit result on the update thread.
    pub fn apply<C>(&mut self, event: MutationEvent<B::Payload>, consumer: &mut C)
    where
        C: MutationConsumer<B::Payload>,
    {
        let Some((temp_id, result)) = self.lifecycle.accept(event.0) else {
            return;
        };
        let Some(mutation) = self.mutations.get_mut(&temp_id) else {
            return;
        };
        match result {
            Ok(confirmed) => {
                let submitted_at = mutation.submitted_at;
                self.mutations.remove(&temp_id);
                tracing::info!(
                    coordinator = self.name,
                    temp_id = %temp_id,
                    id = %confirmed.id,
                    "mutation confirmed"
                );
                consumer.on_mutation_confirmed(
                    temp_id,
                    Entity::confirmed(
                        confirmed.id,
                        confirmed.content,
                        submitted_at,
                        confirmed.confirmed_at,
                    ),
                );
            }
            Err(err) => {
                tracing::warn!(
                    coordinator = self.name,
                    temp_id = %temp_id,
                    attempts = mutation.attempts,
                    error = %err,
                    "mutation failed"
                );
                mutation.state = MutationState::Failed;
                mutation.last_error = Some(err.to_string());
                consumer.on_mutation_failed(temp_id, &err);
            }
        }
    }

    pub async fn step<C>(&mut self, consumer: &mut C)
    where
        C: MutationConsumer<B::Payload>,
    {
        let event = self.next_event().await;
        self.apply(event, consumer);
    }

    /// Drives until no mutation is in flight.
    pub async fn settle<C>(&mut self, consumer: &mut C)
    where
        C: MutationConsumer<B::Payload>,
    {
        while self.has_pending() {
            self.step(consumer).await;
        }
    }
}
