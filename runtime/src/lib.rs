//! Asynchronous interaction engine shared by Stride screens.
//!
//! All state lives with the owner of a controller and changes only through
//! `&mut self` calls on one update thread. Network work runs on tokio tasks
//! and comes back as events (`next_event` / `apply`), so late or canceled
//! completions are filtered in one place before they can touch a screen.

pub mod backend;
pub mod chat;
pub mod config;
pub mod consumer;
pub mod lifecycle;
pub mod mutation;
pub mod query;
pub mod search;

#[cfg(test)]
mod testing;

pub use config::{EngineConfig, MutationConfig, QueryConfig};
pub use consumer::{EntityList, MutationConsumer, QueryConsumer, ResultList};
pub use lifecycle::RequestLifecycle;
pub use mutation::{Entity, MutationCoordinator, MutationState, Origin};
pub use query::{DebouncedQuery, QueryOutcome, QueryPhase};
