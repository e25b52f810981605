use std::sync::Arc;

use stride_core::chat::Chat;
use stride_core::directory::{Activity, PlaceName, User};
use stride_core::error::RemoteError;

use crate::backend::{ActivityDirectory, ChatBackend, PlaceCompleter, UserDirectory};
use crate::config::QueryConfig;
use crate::query::{DebouncedQuery, SearchSource};

/// Chat list search over `fetchChats`.
pub struct ChatSearch<B>(pub Arc<B>);

impl<B: ChatBackend> SearchSource for ChatSearch<B> {
    type Item = Chat;

    async fn search(&self, query: &str) -> Result<Vec<Chat>, RemoteError> {
        self.0.fetch_chats(query).await
    }
}

pub struct UserSearch<B>(pub Arc<B>);

impl<B: UserDirectory> SearchSource for UserSearch<B> {
    type Item = User;

    async fn search(&self, query: &str) -> Result<Vec<User>, RemoteError> {
        self.0.search_users(query).await
    }
}

/// Location suggestions. A failed completion clears the suggestion list like
/// any other failed search.
pub struct PlaceSearch<B>(pub Arc<B>);

impl<B: PlaceCompleter> SearchSource for PlaceSearch<B> {
    type Item = PlaceName;

    async fn search(&self, query: &str) -> Result<Vec<PlaceName>, RemoteError> {
        self.0.complete_places(query).await
    }
}

pub struct ActivitySearch<B>(pub Arc<B>);

impl<B: ActivityDirectory> SearchSource for ActivitySearch<B> {
    type Item = Activity;

    async fn search(&self, query: &str) -> Result<Vec<Activity>, RemoteError> {
        self.0.search_activities(query).await
    }
}

pub fn chat_search<B: ChatBackend>(
    backend: Arc<B>,
    config: QueryConfig,
) -> DebouncedQuery<ChatSearch<B>> {
    DebouncedQuery::new("chat_search", Arc::new(ChatSearch(backend)), config)
}

pub fn user_search<B: UserDirectory>(
    backend: Arc<B>,
    config: QueryConfig,
) -> DebouncedQuery<UserSearch<B>> {
    DebouncedQuery::new("user_search", Arc::new(UserSearch(backend)), config)
}

pub fn place_search<B: PlaceCompleter>(
    backend: Arc<B>,
    config: QueryConfig,
) -> DebouncedQuery<PlaceSearch<B>> {
    DebouncedQuery::new("place_search", Arc::new(PlaceSearch(backend)), config)
}

pub fn activity_search<B: ActivityDirectory>(
    backend: Arc<B>,
    config: QueryConfig,
) -> DebouncedQuery<ActivitySearch<B>> {
    DebouncedQuery::new("activity_search", Arc::new(ActivitySearch(backend)), config)
}
