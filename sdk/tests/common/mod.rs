//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use wiremock::MockServer;

/// Starts a mock REST server.
pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

/// Command for one accepted socket.
pub enum ServerCommand {
    /// Send a text frame.
    Send(String),
    /// Drop the connection without a close handshake.
    Drop,
    /// Close with a status code.
    Close(u16),
}

/// Handle to one accepted socket.
pub struct ServerConnection {
    /// Request path and query of the handshake.
    pub path: String,
    /// Text frames received from the client, pings excluded.
    pub frames: mpsc::UnboundedReceiver<serde_json::Value>,
    heartbeats: mpsc::UnboundedReceiver<()>,
    commands: mpsc::UnboundedSender<ServerCommand>,
}

impl ServerConnection {
    /// Sends a JSON frame to the client.
    pub fn send(&self, frame: serde_json::Value) {
        let _ = self.commands.send(ServerCommand::Send(frame.to_string()));
    }

    /// Drops the socket.
    pub fn drop_connection(&self) {
        let _ = self.commands.send(ServerCommand::Drop);
    }

    /// Closes the socket with `code`.
    pub fn close_with(&self, code: u16) {
        let _ = self.commands.send(ServerCommand::Close(code));
    }

    /// Waits for the next `ping` frame from the client.
    pub async fn next_heartbeat(&mut self) {
        tokio::time::timeout(Duration::from_secs(5), self.heartbeats.recv())
            .await
            .expect("heartbeat within timeout")
            .expect("connection open");
    }

    /// Waits for the next client frame.
    pub async fn next_frame(&mut self) -> serde_json::Value {
        tokio::time::timeout(Duration::from_secs(5), self.frames.recv())
            .await
            .expect("frame within timeout")
            .expect("connection open")
    }

    /// Asserts that no frame arrives within `wait`.
    pub async fn assert_silent(&mut self, wait: Duration) {
        if let Ok(Some(frame)) = tokio::time::timeout(wait, self.frames.recv()).await {
            panic!("unexpected frame: {}", frame);
        }
    }
}

/// Local WebSocket server that hands out one [`ServerConnection`] per
/// accepted client.
pub struct WsServer {
    /// `ws://` URL of the server.
    pub url: String,
    connections: mpsc::UnboundedReceiver<ServerConnection>,
}

impl WsServer {
    /// Binds to an ephemeral port and starts accepting.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let (conn_tx, connections) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let mut path = String::new();
                let record_path = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                    path = req.uri().to_string();
                    Ok(resp)
                };
                let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, record_path).await else {
                    continue;
                };
                let (frames_tx, frames) = mpsc::unbounded_channel();
                let (heartbeat_tx, heartbeats) = mpsc::unbounded_channel();
                let (commands, mut command_rx) = mpsc::unbounded_channel();
                let conn = ServerConnection {
                    path,
                    frames,
                    heartbeats,
                    commands,
                };
                if conn_tx.send(conn).is_err() {
                    return;
                }

                tokio::spawn(async move {
                    let (mut write, mut read) = ws.split();
                    loop {
                        tokio::select! {
                            msg = read.next() => match msg {
                                Some(Ok(Message::Text(text))) => {
                                    let Ok(value) = serde_json::from_str::<serde_json::Value>(text.as_str()) else {
                                        continue;
                                    };
                                    if value["action"] == "ping" {
                                        let _ = heartbeat_tx.send(());
                                        continue;
                                    }
                                    let _ = frames_tx.send(value);
                                }
                                Some(Ok(_)) => {}
                                _ => break,
                            },
                            cmd = command_rx.recv() => match cmd {
                                Some(ServerCommand::Send(text)) => {
                                    if write.send(Message::Text(text.into())).await.is_err() {
                                        break;
                                    }
                                }
                                Some(ServerCommand::Close(code)) => {
                                    let frame = CloseFrame {
                                        code: CloseCode::from(code),
                                        reason: "rejected".into(),
                                    };
                                    let _ = write.send(Message::Close(Some(frame))).await;
                                    break;
                                }
                                Some(ServerCommand::Drop) | None => break,
                            },
                        }
                    }
                });
            }
        });

        Self {
            url: format!("ws://{}/ws", addr),
            connections,
        }
    }

    /// Waits for the next client connection.
    pub async fn accept(&mut self) -> ServerConnection {
        tokio::time::timeout(Duration::from_secs(5), self.connections.recv())
            .await
            .expect("connection within timeout")
            .expect("server running")
    }
}
