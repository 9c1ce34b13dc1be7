//! REST client for tokens, contacts and message history.
//!
//! Routes (all JSON):
//! - `POST /api/tokens` `{username, password}` → `{token}`
//! - `GET /api/tokens/current` → `{username}`
//! - `GET /api/chats` → `["peer", ...]`
//! - `GET /api/chats/{peer}/messages?limit=N` → most-recent-first messages

use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use chatinterface_core::error::{ChatError, ChatResult};
use chatinterface_core::messages::Message;

/// Default request timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = ChatResult<T>> + Send + 'a>>;

/// What the server knows about a token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenInfo {
    pub username: String,
}

/// The REST side of the chat server.
pub trait ChatApi: Send + Sync {
    /// Exchange a username and password for a bearer credential.
    fn create_token<'a>(&'a self, username: &'a str, password: &'a str) -> ApiFuture<'a, String>;

    /// Look up the account a credential belongs to.
    fn show_token_info<'a>(&'a self, credential: &'a str) -> ApiFuture<'a, TokenInfo>;

    /// Peers we have conversations with.
    fn get_contacts(&self) -> ApiFuture<'_, BTreeSet<String>>;

    /// Up to `limit` messages exchanged with `peer`, most recent first.
    fn get_messages<'a>(&'a self, peer: &'a str, limit: u32) -> ApiFuture<'a, Vec<Message>>;
}

#[derive(Serialize)]
struct CreateTokenRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct CreateTokenResponse {
    token: String,
}

/// [`ChatApi`] over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpChatApi {
    origin: Url,
    client: Client,
}

impl HttpChatApi {
    /// Build a client for `origin` (e.g. `https://chat.example.com`).
    ///
    /// When `credential` is given it is sent as `Authorization` on every
    /// request.
    pub fn new(origin: &str, credential: Option<&str>, timeout: Duration) -> ChatResult<Self> {
        let origin =
            Url::parse(origin).map_err(|e| ChatError::InvalidUrl(format!("{origin}: {e}")))?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(credential) = credential {
            let value = HeaderValue::from_str(credential)
                .map_err(|_| ChatError::AuthFailed("credential is not a valid header value".into()))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| ChatError::Http(e.to_string()))?;

        Ok(Self { origin, client })
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// `{origin}/{segments...}` with each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> ChatResult<Url> {
        let mut url = self.origin.clone();
        url.path_segments_mut()
            .map_err(|_| ChatError::InvalidUrl(format!("{} cannot be a base", self.origin)))?
            .clear()
            .extend(segments);
        Ok(url)
    }

    fn messages_url(&self, peer: &str, limit: u32) -> ChatResult<Url> {
        let mut url = self.endpoint(&["api", "chats", peer, "messages"])?;
        url.query_pairs_mut().append_pair("limit", &limit.to_string());
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> ChatResult<T> {
        let response = self.client.get(url).send().await.map_err(request_error)?;
        decode(response).await
    }
}

impl ChatApi for HttpChatApi {
    fn create_token<'a>(&'a self, username: &'a str, password: &'a str) -> ApiFuture<'a, String> {
        Box::pin(async move {
            let url = self.endpoint(&["api", "tokens"])?;
            let response = self
                .client
                .post(url)
                .json(&CreateTokenRequest { username, password })
                .send()
                .await
                .map_err(request_error)?;
            let created: CreateTokenResponse = decode(response).await?;
            tracing::info!(username, "token created");
            Ok(created.token)
        })
    }

    fn show_token_info<'a>(&'a self, credential: &'a str) -> ApiFuture<'a, TokenInfo> {
        Box::pin(async move {
            let url = self.endpoint(&["api", "tokens", "current"])?;
            let response = self
                .client
                .get(url)
                .header(AUTHORIZATION, credential)
                .send()
                .await
                .map_err(request_error)?;
            decode(response).await
        })
    }

    fn get_contacts(&self) -> ApiFuture<'_, BTreeSet<String>> {
        Box::pin(async move {
            let url = self.endpoint(&["api", "chats"])?;
            self.get_json(url).await
        })
    }

    fn get_messages<'a>(&'a self, peer: &'a str, limit: u32) -> ApiFuture<'a, Vec<Message>> {
        Box::pin(async move {
            let url = self.messages_url(peer, limit)?;
            self.get_json(url).await
        })
    }
}

/// Check the status and decode the JSON body.
async fn decode<T: DeserializeOwned>(response: Response) -> ChatResult<T> {
    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(ChatError::HttpStatus {
            status: status.as_u16(),
            message,
        });
    }
    let body = response.bytes().await.map_err(request_error)?;
    serde_json::from_slice(&body).map_err(|e| ChatError::InvalidJson(e.to_string()))
}

/// Classify a reqwest failure.
fn request_error(e: reqwest::Error) -> ChatError {
    if e.is_builder() {
        ChatError::InvalidUrl(e.to_string())
    } else if e.is_connect() || e.is_timeout() {
        ChatError::Network(e.to_string())
    } else if let Some(status) = e.status() {
        ChatError::HttpStatus {
            status: status.as_u16(),
            message: e.to_string(),
        }
    } else if e.is_decode() {
        ChatError::InvalidJson(e.to_string())
    } else {
        ChatError::Http(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answer one request with a canned response; hand back the request head.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let origin = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&request).to_string()
        });
        (origin, handle)
    }

    fn api(origin: &str) -> HttpChatApi {
        HttpChatApi::new(origin, Some("secret-token"), REQUEST_TIMEOUT).unwrap()
    }

    #[test]
    fn messages_url_encodes_peer() {
        let api = api("https://chat.example.com");
        assert_eq!(
            api.messages_url("alice b", 100).unwrap().as_str(),
            "https://chat.example.com/api/chats/alice%20b/messages?limit=100"
        );
    }

    #[test]
    fn bad_origin_is_invalid_url() {
        assert!(matches!(
            HttpChatApi::new("not a url", None, REQUEST_TIMEOUT),
            Err(ChatError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn contacts_are_fetched_with_credential() {
        let (origin, server) = serve_once("200 OK", r#"["bob","alice","bob"]"#).await;
        let contacts = api(&origin).get_contacts().await.unwrap();
        assert_eq!(contacts.into_iter().collect::<Vec<_>>(), vec!["alice", "bob"]);

        let request = server.await.unwrap().to_lowercase();
        assert!(request.starts_with("get /api/chats "));
        assert!(request.contains("authorization: secret-token"));
        assert!(request.contains("accept: application/json"));
    }

    #[tokio::test]
    async fn history_is_decoded_in_server_order() {
        let (origin, _server) = serve_once(
            "200 OK",
            r#"[{"sender":"alice","data":"hi","timestamp":"t2"},{"sender":"alice","data":"hello","timestamp":"t1"}]"#,
        )
        .await;
        let messages = api(&origin).get_messages("alice", 100).await.unwrap();
        assert_eq!(
            messages,
            vec![
                Message::new("alice", "hi").with_timestamp("t2"),
                Message::new("alice", "hello").with_timestamp("t1"),
            ]
        );
    }

    #[tokio::test]
    async fn error_status_is_http_status() {
        let (origin, _server) = serve_once("500 Internal Server Error", r#"{"detail":"boom"}"#).await;
        match api(&origin).get_contacts().await {
            Err(ChatError::HttpStatus { status, message }) => {
                assert_eq!(status, 500);
                assert!(message.contains("boom"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_body_is_invalid_json() {
        let (origin, _server) = serve_once("200 OK", "<html>").await;
        assert!(matches!(
            api(&origin).get_contacts().await,
            Err(ChatError::InvalidJson(_))
        ));
    }

    #[tokio::test]
    async fn refused_connection_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let origin = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);
        assert!(matches!(
            api(&origin).get_contacts().await,
            Err(ChatError::Network(_))
        ));
    }

    #[tokio::test]
    async fn create_token_posts_credentials() {
        let (origin, server) = serve_once("201 Created", r#"{"token":"abc"}"#).await;
        let api = HttpChatApi::new(&origin, None, REQUEST_TIMEOUT).unwrap();
        assert_eq!(api.create_token("alice", "pw").await.unwrap(), "abc");
        assert!(server.await.unwrap().starts_with("POST /api/tokens "));
    }
}
