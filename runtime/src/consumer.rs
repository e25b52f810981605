//! Result consumer contracts and the two reference state containers.
//!
//! Controllers call consumers synchronously on the update thread. The
//! containers notify their subscribers synchronously after every change, in
//! registration order.

use std::collections::HashSet;

use stride_core::error::RemoteError;
use stride_core::ids::TempId;

use crate::mutation::{Entity, MutationState, Origin};

/// Receives the output of a debounced query controller.
pub trait QueryConsumer<T> {
    /// Authoritative result set for `seq`. An empty slice clears the list.
    fn on_results_changed(&mut self, seq: u64, items: &[T]);

    /// Non-fatal failure of the latest query. Results were cleared just before.
    fn on_error(&mut self, message: &str);
}

/// Receives the output of an optimistic mutation coordinator.
pub trait MutationConsumer<T> {
    /// A new placeholder, to be appended at the tail of the list.
    fn on_mutation_placed(&mut self, entity: Entity<T>);

    /// The backend accepted the mutation behind `temp_id`.
    fn on_mutation_confirmed(&mut self, temp_id: TempId, entity: Entity<T>);

    /// The commit failed. The placeholder must stay visible.
    fn on_mutation_failed(&mut self, temp_id: TempId, error: &RemoteError);

    /// An explicit retry put a failed mutation back in flight.
    fn on_mutation_retried(&mut self, _temp_id: TempId) {}

    /// The user discarded a failed mutation.
    fn on_mutation_discarded(&mut self, _temp_id: TempId) {}
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener<S> = Box<dyn FnMut(&S) + Send>;

struct Listeners<S> {
    next_id: u64,
    entries: Vec<(SubscriptionId, Listener<S>)>,
}

impl<S> Default for Listeners<S> {
    fn default() -> Self {
        Self {
            next_id: 0,
            entries: Vec::new(),
        }
    }
}

impl<S> Listeners<S> {
    fn add(&mut self, listener: Listener<S>) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.entries.push((id, listener));
        id
    }

    fn remove(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }
}

/// Query results as a screen sees them.
pub struct ResultList<T> {
    seq: u64,
    items: Vec<T>,
    error: Option<String>,
    listeners: Listeners<ResultList<T>>,
}

impl<T: Clone> ResultList<T> {
    pub fn new() -> Self {
        Self {
            seq: 0,
            items: Vec::new(),
            error: None,
            listeners: Listeners::default(),
        }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn subscribe(
        &mut self,
        listener: impl FnMut(&ResultList<T>) + Send + 'static,
    ) -> SubscriptionId {
        self.listeners.add(Box::new(listener))
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.listeners.remove(id)
    }

    fn notify(&mut self) {
        let mut listeners = std::mem::take(&mut self.listeners);
        for (_, listener) in listeners.entries.iter_mut() {
            listener(self);
        }
        self.listeners = listeners;
    }
}

impl<T: Clone> Default for ResultList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> QueryConsumer<T> for ResultList<T> {
    fn on_results_changed(&mut self, seq: u64, items: &[T]) {
        self.seq = seq;
        self.items = items.to_vec();
        self.error = None;
        self.notify();
    }

    fn on_error(&mut self, message: &str) {
        self.error = Some(message.to_string());
        self.notify();
    }
}

/// Ordered list of entities, ordered by local insertion and never re-sorted.
pub struct EntityList<T> {
    entities: Vec<Entity<T>>,
    next_position: u64,
    /// Server ids confirmed through this list that no load has returned yet
    confirmed_here: HashSet<String>,
    listeners: Listeners<EntityList<T>>,
}

impl<T> EntityList<T> {
    pub fn new() -> Self {
        Self {
            entities: Vec::new(),
            next_position: 0,
            confirmed_here: HashSet::new(),
            listeners: Listeners::default(),
        }
    }

    pub fn entities(&self) -> &[Entity<T>] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn find_temp(&self, temp_id: TempId) -> Option<usize> {
        self.entities
            .iter()
            .position(|entity| entity.temp_id() == Some(temp_id))
    }

    pub fn find_server(&self, id: &str) -> Option<usize> {
        self.entities
            .iter()
            .position(|entity| entity.server_id() == Some(id))
    }

    /// Replaces the list with entities loaded from the server, in server
    /// order. Placeholders that are still pending or failed stay at the tail,
    /// and so do entities confirmed here that the load does not contain yet
    /// (it may have been read before they were committed).
    pub fn reset(&mut self, loaded: Vec<Entity<T>>) {
        self.confirmed_here
            .retain(|id| !loaded.iter().any(|entity| entity.server_id() == Some(id.as_str())));
        let confirmed_here = &self.confirmed_here;
        let kept: Vec<_> = self
            .entities
            .drain(..)
            .filter(|entity| match entity.server_id() {
                Some(id) => confirmed_here.contains(id),
                None => entity.origin == Origin::Optimistic,
            })
            .collect();
        for entity in loaded {
            self.push(entity);
        }
        for entity in kept {
            self.push(entity);
        }
        self.notify();
    }

    /// Drops everything, placeholders included.
    pub fn clear(&mut self) {
        self.entities.clear();
        self.confirmed_here.clear();
        self.notify();
    }

    pub fn subscribe(
        &mut self,
        listener: impl FnMut(&EntityList<T>) + Send + 'static,
    ) -> SubscriptionId {
        self.listeners.add(Box::new(listener))
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.listeners.remove(id)
    }

    fn push(&mut self, mut entity: Entity<T>) {
        entity.position = self.next_position;
        self.next_position += 1;
        self.entities.push(entity);
    }

    fn notify(&mut self) {
        let mut listeners = std::mem::take(&mut self.listeners);
        for (_, listener) in listeners.entries.iter_mut() {
            listener(self);
        }
        self.listeners = listeners;
    }
}

impl<T> Default for EntityList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MutationConsumer<T> for EntityList<T> {
    fn on_mutation_placed(&mut self, entity: Entity<T>) {
        self.push(entity);
        self.notify();
    }

    fn on_mutation_confirmed(&mut self, temp_id: TempId, mut entity: Entity<T>) {
        let server_id = entity.server_id().map(str::to_string);
        match self.find_temp(temp_id) {
            Some(index) => {
                entity.position = self.entities[index].position;
                self.entities[index] = entity;
                if let Some(server_id) = &server_id {
                    self.confirmed_here.insert(server_id.clone());
                }
                // A reload may already have delivered the server copy.
                if let Some(server_id) = server_id {
                    let mut current = 0;
                    self.entities.retain(|other| {
                        let keep =
                            current == index || other.server_id() != Some(server_id.as_str());
                        current += 1;
                        keep
                    });
                }
            }
            None => {
                let already_present = server_id
                    .as_deref()
                    .is_some_and(|id| self.find_server(id).is_some());
                if already_present {
                    tracing::debug!(
                        temp_id = %temp_id,
                        "confirmed entity already present after reload"
                    );
                    return;
                }
                if let Some(server_id) = server_id {
                    self.confirmed_here.insert(server_id);
                }
                self.push(entity);
            }
        }
        self.notify();
    }

    fn on_mutation_failed(&mut self, temp_id: TempId, _error: &RemoteError) {
        if let Some(index) = self.find_temp(temp_id) {
            self.entities[index].state = MutationState::Failed;
            self.notify();
        }
    }

    fn on_mutation_retried(&mut self, temp_id: TempId) {
        if let Some(index) = self.find_temp(temp_id) {
            self.entities[index].state = MutationState::Pending;
            self.notify();
        }
    }

    fn on_mutation_discarded(&mut self, temp_id: TempId) {
        if let Some(index) = self.find_temp(temp_id) {
            self.entities.remove(index);
            self.notify();
        }
    }
}
