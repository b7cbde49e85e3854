//! WebSocket connection and frame handling for the live stream

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::models::ConversationId;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

pub struct LiveSocket {
    stream: WsStream,
}

impl LiveSocket {
    /// Connect to the live endpoint, authenticating with the bearer token.
    pub async fn connect(url: &str, token: Option<&str>) -> Result<Self> {
        tracing::info!("Connecting live stream to {}", url);

        let mut request = url
            .into_client_request()
            .with_context(|| format!("Invalid live URL {}", url))?;
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .context("Api token is not a valid header value")?;
            request.headers_mut().insert("Authorization", value);
        }

        let (stream, response) = connect_async(request)
            .await
            .context("WebSocket connection failed")?;

        tracing::info!("Live stream connected (status={})", response.status());

        Ok(Self { stream })
    }

    /// Send a text frame.
    pub async fn send_text(&mut self, msg: &str) -> Result<()> {
        tracing::debug!("WS send: {}", msg);
        self.stream
            .send(Message::Text(msg.to_string()))
            .await
            .context("Failed to send WebSocket message")
    }

    /// Join the room of `conversation`.
    pub async fn join(&mut self, conversation: &ConversationId) -> Result<()> {
        let frame = room_frame("join", conversation);
        self.send_text(&frame).await
    }

    /// Leave the room and close the socket.
    pub async fn leave(&mut self, conversation: &ConversationId) -> Result<()> {
        let frame = room_frame("leave", conversation);
        self.send_text(&frame).await?;
        self.stream
            .close(None)
            .await
            .context("Failed to close WebSocket")
    }

    pub async fn heartbeat(&mut self) -> Result<()> {
        self.send_text(r#"{"action":"ping"}"#).await
    }

    /// Receive the next text frame, answering pings and skipping pongs.
    pub async fn recv_frame(&mut self) -> Result<Option<String>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    tracing::debug!("WS recv: {}", text);
                    return Ok(Some(text));
                }
                Some(Ok(Message::Ping(data))) => {
                    self.stream
                        .send(Message::Pong(data))
                        .await
                        .context("Failed to send pong")?;
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!("WebSocket closed: {:?}", frame);
                    return Ok(None);
                }
                Some(Ok(other)) => {
                    tracing::debug!("WS frame (ignored): {:?}", other);
                }
                Some(Err(e)) => {
                    return Err(e).context("WebSocket receive error");
                }
                None => {
                    return Ok(None);
                }
            }
        }
    }
}

fn room_frame(action: &str, conversation: &ConversationId) -> String {
    json!({
        "action": action,
        "room": conversation.as_str(),
        "requestId": uuid::Uuid::new_v4().to_string(),
    })
    .to_string()
}
