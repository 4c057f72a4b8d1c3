//! Socket transport behind the supervisor.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::config::SupervisorConfig;
use crate::error::FeedError;

/// One frame read from a feed socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    Binary(Vec<u8>),
    /// Ping, pong or raw frame; counts as activity only.
    Control,
}

/// An established duplex feed connection.
#[async_trait]
pub trait FeedSocket: Send {
    /// Read the next frame. `Ok(None)` means the peer closed cleanly.
    async fn next_message(&mut self) -> Result<Option<Inbound>, FeedError>;

    /// Send a heartbeat ping.
    async fn ping(&mut self) -> Result<(), FeedError>;

    /// Close the socket, ignoring errors.
    async fn close(&mut self);
}

/// Opens feed sockets.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        uri: &str,
        config: &SupervisorConfig,
    ) -> Result<Box<dyn FeedSocket>, FeedError>;
}

/// WebSocket connector backed by tokio-tungstenite.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(
        &self,
        uri: &str,
        config: &SupervisorConfig,
    ) -> Result<Box<dyn FeedSocket>, FeedError> {
        let ws_config = WebSocketConfig {
            max_message_size: Some(config.max_message_size),
            max_frame_size: Some(config.max_message_size),
            ..Default::default()
        };

        let handshake = connect_async_with_config(uri, Some(ws_config), true);
        match tokio::time::timeout(config.connection_timeout, handshake).await {
            Err(_) => Err(FeedError::Timeout(config.connection_timeout)),
            Ok(Err(e)) => Err(e.into()),
            Ok(Ok((stream, response))) => {
                debug!("Handshake with {} completed: HTTP {}", uri, response.status());
                Ok(Box::new(WsSocket { stream }))
            }
        }
    }
}

struct WsSocket {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl FeedSocket for WsSocket {
    async fn next_message(&mut self) -> Result<Option<Inbound>, FeedError> {
        match self.stream.next().await {
            Some(Ok(Message::Text(text))) => Ok(Some(Inbound::Text(text))),
            Some(Ok(Message::Binary(bytes))) => Ok(Some(Inbound::Binary(bytes))),
            Some(Ok(Message::Close(frame))) => {
                debug!("Close frame received: {:?}", frame);
                Ok(None)
            }
            Some(Ok(_)) => Ok(Some(Inbound::Control)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    async fn ping(&mut self) -> Result<(), FeedError> {
        self.stream.send(Message::Ping(Vec::new())).await?;
        Ok(())
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!("Error closing socket: {}", e);
        }
    }
}
