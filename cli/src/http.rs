use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use stride_core::chat::{Chat, Message, SendMessageRequest};
use stride_core::directory::{Activity, PlaceName, User};
use stride_core::error::RemoteError;
use stride_runtime::backend::{ActivityDirectory, ChatBackend, PlaceCompleter, UserDirectory};
use url::Url;

/// List endpoints wrap their items in `data`.
#[derive(Deserialize)]
struct DataEnvelope<T> {
    data: Vec<T>,
}

/// The Stride API over HTTP + JSON.
pub struct HttpBackend {
    client: reqwest::Client,
    base: Url,
    token: Option<String>,
}

impl HttpBackend {
    pub fn new(api_url: &str, token: Option<String>) -> Result<Self, url::ParseError> {
        let base = Url::parse(api_url)?;
        Ok(Self {
            client: reqwest::Client::new(),
            base,
            token,
        })
    }

    /// Builds `{base}/{segments...}?{query}` with every segment percent-encoded.
    fn endpoint(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url, RemoteError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| {
                RemoteError::Network(format!("{} cannot be used as a base URL", self.base))
            })?
            .pop_if_empty()
            .extend(segments);
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, RemoteError> {
        let request = match &self.token {
            Some(token) => request.header("Authorization", format!("Bearer {token}")),
            None => request,
        };
        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(RemoteError::from_response_body(status.as_u16(), &body))
    }

    async fn get_list<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, RemoteError> {
        let url = self.endpoint(segments, query)?;
        let response = self.execute(self.client.get(url)).await?;
        let envelope: DataEnvelope<T> = response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        Ok(envelope.data)
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<reqwest::Response, RemoteError> {
        let url = self.endpoint(segments, &[])?;
        self.execute(self.client.post(url).json(body)).await
    }
}

impl ChatBackend for HttpBackend {
    async fn fetch_chats(&self, search: &str) -> Result<Vec<Chat>, RemoteError> {
        self.get_list(&["v1", "chats"], &[("search", search)]).await
    }

    async fn fetch_messages(&self, chat_id: &str) -> Result<Vec<Message>, RemoteError> {
        self.get_list(&["v1", "chats", chat_id, "messages"], &[]).await
    }

    async fn send_message(
        &self,
        chat_id: &str,
        request: &SendMessageRequest,
    ) -> Result<Message, RemoteError> {
        let response = self.post(&["v1", "chats", chat_id, "messages"], request).await?;
        response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))
    }

    async fn mark_chat_as_read(&self, chat_id: &str) -> Result<(), RemoteError> {
        self.post(&["v1", "chats", chat_id, "read"], &serde_json::json!({}))
            .await
            .map(|_| ())
    }
}

impl UserDirectory for HttpBackend {
    async fn search_users(&self, query: &str) -> Result<Vec<User>, RemoteError> {
        self.get_list(&["v1", "users"], &[("query", query)]).await
    }
}

impl PlaceCompleter for HttpBackend {
    async fn complete_places(&self, query: &str) -> Result<Vec<PlaceName>, RemoteError> {
        self.get_list(&["v1", "places"], &[("query", query)]).await
    }
}

impl ActivityDirectory for HttpBackend {
    async fn search_activities(&self, query: &str) -> Result<Vec<Activity>, RemoteError> {
        self.get_list(&["v1", "activities"], &[("query", query)]).await
    }
}
