use std::sync::Arc;

use serde_json::json;
use stride_core::error::RemoteError;
use stride_core::ids::TempId;
use stride_runtime::backend::ChatBackend;
use stride_runtime::chat::MessageSender;
use stride_runtime::{Entity, EngineConfig, MutationConsumer, MutationCoordinator};

use crate::util::{EXIT_OK, EXIT_USAGE, print_error, print_json, report_remote};

/// Prints each step of a single send as one JSON document.
#[derive(Default)]
struct Delivery {
    confirmed: Option<Entity<String>>,
    failure: Option<RemoteError>,
}

impl MutationConsumer<String> for Delivery {
    fn on_mutation_placed(&mut self, entity: Entity<String>) {
        print_json(&json!({ "event": "placed", "entity": entity }));
    }

    fn on_mutation_confirmed(&mut self, temp_id: TempId, entity: Entity<String>) {
        print_json(&json!({ "event": "confirmed", "temp_id": temp_id, "entity": entity }));
        self.confirmed = Some(entity);
    }

    fn on_mutation_failed(&mut self, temp_id: TempId, error: &RemoteError) {
        print_json(&json!({ "event": "failed", "temp_id": temp_id, "error": error.to_string() }));
        self.failure = Some(error.clone());
    }
}

pub async fn run<B: ChatBackend>(
    backend: Arc<B>,
    config: EngineConfig,
    chat_id: &str,
    text: &str,
) -> i32 {
    let sender = Arc::new(MessageSender::new(backend, chat_id));
    let mut coordinator = MutationCoordinator::new("chat_send", sender, config.mutation);
    let mut delivery = Delivery::default();

    if let Err(err) = coordinator.submit(text.to_string(), &mut delivery) {
        print_error(err.code(), &err.to_string(), Some("Message text must not be blank"));
        return EXIT_USAGE;
    }
    coordinator.settle(&mut delivery).await;

    match delivery.failure {
        Some(err) => report_remote(&err),
        None => EXIT_OK,
    }
}
