//! WebSocket transport for the chat socket.
//!
//! The bearer credential is sent as the `Authorization` header of the upgrade
//! request; a 401/403 answer to the upgrade is an authentication failure.
//! After the upgrade every frame is one text message.

use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use chatinterface_core::error::{ChatError, ChatResult};
use chatinterface_core::transport::{Connector, FrameSink, FrameSource, Link, TransportFuture};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Default handshake timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

/// Opens WebSocket links.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    timeout: Duration,
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self {
            timeout: CONNECT_TIMEOUT,
        }
    }
}

impl WebSocketConnector {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Connector for WebSocketConnector {
    fn connect<'a>(&'a self, url: &'a str, credential: &'a str) -> TransportFuture<'a, Link> {
        Box::pin(async move {
            let mut request = url
                .into_client_request()
                .map_err(|e| ChatError::InvalidUrl(format!("{url}: {e}")))?;
            let auth = HeaderValue::from_str(credential)
                .map_err(|_| ChatError::AuthFailed("credential is not a valid header value".into()))?;
            request.headers_mut().insert("Authorization", auth);

            let (ws_stream, _response) = match time::timeout(self.timeout, connect_async(request)).await
            {
                Ok(result) => result.map_err(handshake_error)?,
                Err(_) => {
                    return Err(ChatError::Network(format!("timed out connecting to {url}")));
                }
            };

            tracing::info!("WebSocket connected to {}", url);

            let (sink, stream) = ws_stream.split();
            Ok(Link {
                sink: Box::new(WsSink { sink }),
                source: Box::new(WsSource { stream }),
            })
        })
    }
}

/// Classify an upgrade failure.
fn handshake_error(e: WsError) -> ChatError {
    match e {
        WsError::Http(response) => {
            let status = response.status();
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                ChatError::AuthFailed(format!("server rejected credential ({status})"))
            } else {
                ChatError::Network(format!("WebSocket upgrade rejected with HTTP {status}"))
            }
        }
        WsError::Url(e) => ChatError::InvalidUrl(e.to_string()),
        other => ChatError::Network(format!("WebSocket connect error: {other}")),
    }
}

struct WsSink {
    sink: SplitSink<WsStream, Message>,
}

impl FrameSink for WsSink {
    fn send_text(&mut self, text: String) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            self.sink
                .send(Message::Text(text))
                .await
                .map_err(|e| ChatError::Network(format!("WS write error: {e}")))
        })
    }

    fn close(&mut self) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            let _ = self.sink.send(Message::Close(None)).await;
            let _ = self.sink.close().await;
            Ok(())
        })
    }
}

struct WsSource {
    stream: SplitStream<WsStream>,
}

impl FrameSource for WsSource {
    fn next_text(
        &mut self,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Option<ChatResult<String>>> + Send + '_>>
    {
        Box::pin(async move {
            while let Some(msg) = self.stream.next().await {
                match msg {
                    Ok(Message::Text(text)) => return Some(Ok(text)),
                    Ok(Message::Binary(data)) => match String::from_utf8(data) {
                        Ok(text) => return Some(Ok(text)),
                        Err(_) => tracing::warn!("dropping non-UTF-8 binary frame"),
                    },
                    Ok(Message::Close(frame)) => {
                        tracing::debug!("WebSocket close frame received: {:?}", frame);
                        return None;
                    }
                    Ok(_) => continue, // pings are answered by tungstenite
                    Err(e) => return Some(Err(ChatError::Network(format!("WS read error: {e}")))),
                }
            }
            None
        })
    }
}
