//! One open chat: message loading, optimistic sending and read receipts.

use std::sync::Arc;

use stride_core::chat::{Message, SendMessageRequest};
use stride_core::error::{MutationError, RemoteError, ValidationError};
use stride_core::ids::TempId;
use uuid::Uuid;

use crate::backend::ChatBackend;
use crate::config::EngineConfig;
use crate::consumer::EntityList;
use crate::lifecycle::{Completion, RequestLifecycle, with_timeout};
use crate::mutation::{Confirmed, Entity, MutationBackend, MutationCoordinator, MutationEvent};

/// Keys of the chat's single-flight operations.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChatOp {
    LoadMessages(String),
}

/// Sends messages into one chat.
pub struct MessageSender<B> {
    backend: Arc<B>,
    chat_id: String,
    session: Uuid,
}

impl<B: ChatBackend> MessageSender<B> {
    pub fn new(backend: Arc<B>, chat_id: impl Into<String>) -> Self {
        Self {
            backend,
            chat_id: chat_id.into(),
            session: Uuid::now_v7(),
        }
    }
}

impl<B: ChatBackend> MutationBackend for MessageSender<B> {
    type Payload = String;

    async fn commit(
        &self,
        temp_id: TempId,
        payload: &String,
    ) -> Result<Confirmed<String>, RemoteError> {
        let request = SendMessageRequest::for_action(self.session, temp_id, payload.clone());
        let message = self.backend.send_message(&self.chat_id, &request).await?;
        Ok(Confirmed {
            id: message.id,
            content: message.text,
            confirmed_at: message.sent_at,
        })
    }
}

/// An event for [`ChatSession::apply`].
#[derive(Debug)]
pub enum ChatEvent {
    Loaded(Completion<ChatOp, Result<Vec<Message>, RemoteError>>),
    Sent(MutationEvent<String>),
}

pub struct ChatSession<B: ChatBackend> {
    chat_id: String,
    backend: Arc<B>,
    config: EngineConfig,
    loader: RequestLifecycle<ChatOp, Result<Vec<Message>, RemoteError>>,
    sender: MutationCoordinator<MessageSender<B>>,
    messages: EntityList<String>,
    draft: String,
    load_error: Option<String>,
}

impl<B: ChatBackend> ChatSession<B> {
    pub fn new(backend: Arc<B>, chat_id: impl Into<String>, config: EngineConfig) -> Self {
        let chat_id = chat_id.into();
        let sender = MutationCoordinator::new(
            "chat_send",
            Arc::new(MessageSender::new(Arc::clone(&backend), chat_id.clone())),
            config.mutation.clone(),
        );
        Self {
            chat_id,
            backend,
            config,
            loader: RequestLifecycle::new("chat_load"),
            sender,
            messages: EntityList::new(),
            draft: String::new(),
            load_error: None,
        }
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    pub fn messages(&self) -> &EntityList<String> {
        &self.messages
    }

    /// For subscribing presentation adapters.
    pub fn messages_mut(&mut self) -> &mut EntityList<String> {
        &mut self.messages
    }

    pub fn sender(&self) -> &MutationCoordinator<MessageSender<B>> {
        &self.sender
    }

    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.loader.is_running(&ChatOp::LoadMessages(self.chat_id.clone()))
    }

    /// Loads messages and marks the chat read.
    pub fn open(&mut self) {
        self.reload();
        self.mark_read();
    }

    /// Loads messages, superseding a load that is still running.
    pub fn reload(&mut self) {
        let backend = Arc::clone(&self.backend);
        let chat_id = self.chat_id.clone();
        let timeout = self.config.query.request_timeout;
        self.loader
            .start(ChatOp::LoadMessages(self.chat_id.clone()), async move {
                with_timeout(timeout, backend.fetch_messages(&chat_id)).await
            });
    }

    /// Fire-and-forget read receipt. Failures are only logged.
    pub fn mark_read(&self) {
        let backend = Arc::clone(&self.backend);
        let chat_id = self.chat_id.clone();
        let timeout = self.config.mutation.request_timeout;
        tokio::spawn(async move {
            if let Err(err) = with_timeout(timeout, backend.mark_chat_as_read(&chat_id)).await {
                tracing::warn!(chat_id = %chat_id, error = %err, "mark as read failed");
            }
        });
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    /// Sends the input buffer. The buffer is cleared once the placeholder is
    /// shown and kept when the text is rejected as blank.
    pub fn send_draft(&mut self) -> Result<TempId, ValidationError> {
        let temp_id = self.sender.submit(self.draft.clone(), &mut self.messages)?;
        self.draft.clear();
        Ok(temp_id)
    }

    pub fn send(&mut self, text: impl Into<String>) -> Result<TempId, ValidationError> {
        self.sender.submit(text.into(), &mut self.messages)
    }

    pub fn retry(&mut self, temp_id: TempId) -> Result<(), MutationError> {
        self.sender.retry(temp_id, &mut self.messages)
    }

    pub fn discard(&mut self, temp_id: TempId) -> Result<String, MutationError> {
        self.sender.discard(temp_id, &mut self.messages)
    }

    pub async fn next_event(&mut self) -> ChatEvent {
        tokio::select! {
            completion = self.loader.next() => ChatEvent::Loaded(completion),
            event = self.sender.next_event() => ChatEvent::Sent(event),
        }
    }

    pub fn apply(&mut self, event: ChatEvent) {
        match event {
            ChatEvent::Loaded(completion) => {
                let Some((_, result)) = self.loader.accept(completion) else {
                    return;
                };
                match result {
                    Ok(messages) => {
                        self.load_error = None;
                        let loaded: Vec<_> = messages
                            .into_iter()
                            .map(|m| Entity::confirmed(m.id, m.text, m.sent_at, m.sent_at))
                            .collect();
                        self.messages.reset(loaded);
                    }
                    Err(err) => {
                        tracing::warn!(
                            chat_id = %self.chat_id,
                            error = %err,
                            "loading messages failed"
                        );
                        self.load_error = Some(err.to_string());
                    }
                }
            }
            ChatEvent::Sent(event) => self.sender.apply(event, &mut self.messages),
        }
    }

    pub async fn step(&mut self) {
        let event = self.next_event().await;
        self.apply(event);
    }

    /// Drives until no load or send is in flight.
    pub async fn settle(&mut self) {
        while self.is_loading() || self.sender.has_pending() {
            self.step().await;
        }
    }
}
