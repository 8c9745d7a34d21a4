use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use parley_types::api::{
    GetUpdatesJson, MessageJson, NewConversationJson, NewConversationRequest, SendMessageRequest,
};
use parley_types::models::Message;
use parley_types::{ChannelId, MessageId, UserId};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Chat transport the store talks to.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn send_message(&self, message: &Message) -> Result<MessageJson, ApiError>;

    /// Open a PM conversation with `user_id`, carrying its first message.
    async fn new_conversation(
        &self,
        user_id: UserId,
        message: &Message,
    ) -> Result<NewConversationJson, ApiError>;

    /// Everything that changed after `since` (a message id watermark).
    async fn get_updates(&self, since: MessageId) -> Result<GetUpdatesJson, ApiError>;

    async fn mark_as_read(&self, channel_id: ChannelId, message_id: MessageId)
    -> Result<(), ApiError>;

    /// Leave a channel on the server.
    async fn part_channel(&self, channel_id: ChannelId) -> Result<(), ApiError>;
}

/// `ChatApi` over the JSON REST endpoints.
pub struct HttpChatApi {
    client: Client,
    base_url: String,
    token: Option<String>,
    user_id: UserId,
}

impl HttpChatApi {
    pub fn new(base_url: &str, token: Option<String>, user_id: UserId) -> Self {
        Self::with_client(Client::new(), base_url, token, user_id)
    }

    pub fn with_client(client: Client, base_url: &str, token: Option<String>, user_id: UserId) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            user_id,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, self.endpoint(path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn execute(&self, builder: reqwest::RequestBuilder) -> Result<String, ApiError> {
        let resp = builder.send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }
        Ok(body)
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let text = self.execute(self.request(Method::POST, path).json(body)).await?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn send_message(&self, message: &Message) -> Result<MessageJson, ApiError> {
        debug!("POST message to channel {}", message.channel_id);
        let body = SendMessageRequest {
            message: message.content.clone(),
            is_action: message.is_action,
            uuid: message.uuid,
        };
        self.post_json(&format!("/chat/channels/{}/messages", message.channel_id), &body)
            .await
    }

    async fn new_conversation(
        &self,
        user_id: UserId,
        message: &Message,
    ) -> Result<NewConversationJson, ApiError> {
        debug!("POST new conversation with user {}", user_id);
        let body = NewConversationRequest {
            target_id: user_id,
            message: message.content.clone(),
            is_action: message.is_action,
            uuid: message.uuid,
        };
        self.post_json("/chat/new", &body).await
    }

    async fn get_updates(&self, since: MessageId) -> Result<GetUpdatesJson, ApiError> {
        let builder = self.request(Method::GET, "/chat/updates").query(&[
            ("since", since.max(0).to_string()),
            ("includes[]", "presence".to_string()),
            ("includes[]", "messages".to_string()),
            ("includes[]", "silences".to_string()),
        ]);
        let text = self.execute(builder).await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn mark_as_read(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<(), ApiError> {
        let path = format!("/chat/channels/{}/mark-as-read/{}", channel_id, message_id);
        self.execute(self.request(Method::PUT, &path)).await?;
        Ok(())
    }

    async fn part_channel(&self, channel_id: ChannelId) -> Result<(), ApiError> {
        let path = format!("/chat/channels/{}/users/{}", channel_id, self.user_id);
        self.execute(self.request(Method::DELETE, &path)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answer a single request with `status` and `body`, returning the base url.
    async fn serve_once(status: &'static str, body: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = vec![0u8; 4096];
            let _ = socket.read(&mut request).await;
            let response = format!(
                "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        });
        format!("http://{}", addr)
    }

    fn local_api(base_url: &str) -> HttpChatApi {
        let client = Client::builder().no_proxy().build().unwrap();
        HttpChatApi::with_client(client, base_url, Some("secret".into()), 1)
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let api = HttpChatApi::new("https://chat.example/api/v2/", None, 1);
        assert_eq!(
            api.endpoint("/chat/updates"),
            "https://chat.example/api/v2/chat/updates"
        );
    }

    #[test]
    fn test_status_error_display() {
        let err = ApiError::Status { status: 422, body: "silenced".into() };
        assert_eq!(err.to_string(), "server returned 422: silenced");
    }

    #[test]
    fn test_request_carries_bearer_token() {
        let api = HttpChatApi::new("http://localhost", Some("secret".into()), 1);
        let request = api.request(Method::GET, "/chat/updates").build().unwrap();
        assert_eq!(
            request.headers().get("authorization").and_then(|v| v.to_str().ok()),
            Some("Bearer secret")
        );
        assert_eq!(request.url().as_str(), "http://localhost/chat/updates");
    }

    #[tokio::test]
    async fn test_error_status_keeps_truncated_body() {
        let base_url = serve_once("500 Internal Server Error", "x".repeat(300)).await;

        match local_api(&base_url).get_updates(10).await {
            Err(ApiError::Status { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "x".repeat(200));
            }
            other => panic!("expected a status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let base_url = serve_once("200 OK", "{\"presence\": 5}".to_string()).await;

        let err = local_api(&base_url).get_updates(10).await.unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)), "got {:?}", err);
    }
}
