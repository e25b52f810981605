use std::future::Future;

use stride_core::chat::{Chat, Message, SendMessageRequest};
use stride_core::directory::{Activity, PlaceName, User};
use stride_core::error::RemoteError;

/// Chat operations of the remote backend.
pub trait ChatBackend: Send + Sync + 'static {
    /// Chat summaries matching `search`, in display order.
    fn fetch_chats(
        &self,
        search: &str,
    ) -> impl Future<Output = Result<Vec<Chat>, RemoteError>> + Send;

    fn fetch_messages(
        &self,
        chat_id: &str,
    ) -> impl Future<Output = Result<Vec<Message>, RemoteError>> + Send;

    fn send_message(
        &self,
        chat_id: &str,
        request: &SendMessageRequest,
    ) -> impl Future<Output = Result<Message, RemoteError>> + Send;

    fn mark_chat_as_read(&self, chat_id: &str)
    -> impl Future<Output = Result<(), RemoteError>> + Send;
}

/// Person search. Callers enforce the minimum query length.
pub trait UserDirectory: Send + Sync + 'static {
    fn search_users(&self, query: &str)
    -> impl Future<Output = Result<Vec<User>, RemoteError>> + Send;
}

/// Location / admin-area completion provider.
pub trait PlaceCompleter: Send + Sync + 'static {
    fn complete_places(
        &self,
        query: &str,
    ) -> impl Future<Output = Result<Vec<PlaceName>, RemoteError>> + Send;
}

pub trait ActivityDirectory: Send + Sync + 'static {
    fn search_activities(
        &self,
        query: &str,
    ) -> impl Future<Output = Result<Vec<Activity>, RemoteError>> + Send;
}
