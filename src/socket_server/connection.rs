//! WebSocket connection handler
//!
//! One task per socket. The task owns the socket: it drains the outbound
//! queue the [`SessionHub`](crate::delivery::SessionHub) fills and answers
//! the client's control messages.

use std::future::Future;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};

use crate::dispatcher::fan_out;
use crate::error::Result;
use crate::socket_server::context::DaemonContext;
use crate::socket_server::protocol::{ClientMessage, ServerMessage};

/// Accept sockets until the task is cancelled
pub async fn serve(listener: TcpListener, ctx: Arc<DaemonContext>) {
    serve_until(listener, ctx, std::future::pending()).await
}

/// Accept sockets until `shutdown` completes, then stop every connection
/// task and deregister its socket.
///
/// When this returns no task holds `ctx` any more, so the registry is
/// released with the caller's last handle.
pub async fn serve_until<F>(listener: TcpListener, ctx: Arc<DaemonContext>, shutdown: F)
where
    F: Future<Output = ()>,
{
    let mut connections = JoinSet::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,

            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    tracing::debug!("Accepted connection from {}", addr);
                    connections.spawn(handle_connection(stream, Arc::clone(&ctx)));
                }
                Err(e) => {
                    tracing::error!("Failed to accept connection: {}", e);
                }
            },

            // Reap finished connection tasks
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    let open = connections.len();
    connections.shutdown().await;

    // Aborted tasks skipped their own cleanup
    for connection_id in ctx.hub.connection_ids() {
        ctx.hub.detach(&connection_id);
        ctx.lifecycle.on_disconnect(&connection_id);
    }
    tracing::info!("Stopped accepting; closed {} open connection(s)", open);
}

/// Handle a single WebSocket connection
pub async fn handle_connection(stream: TcpStream, ctx: Arc<DaemonContext>) {
    let addr = stream.peer_addr().ok();

    let mut ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::error!("WebSocket handshake failed: {}", e);
            return;
        }
    };

    let connection_id = uuid::Uuid::new_v4().to_string();
    let outbound = ctx.hub.attach(&connection_id);

    // Registration must succeed before the socket is used for anything
    if ctx.lifecycle.on_connect(&connection_id).is_err() {
        ctx.hub.detach(&connection_id);
        let frame = CloseFrame {
            code: CloseCode::Error,
            reason: "registration failed".into(),
        };
        let _ = ws.close(Some(frame)).await;
        return;
    }
    tracing::info!("Connection {} established from {:?}", connection_id, addr);

    let mut conn = ConnectionState {
        ws,
        ctx,
        connection_id,
        outbound,
    };
    conn.run().await;
    conn.cleanup();

    tracing::info!("Connection closed from {:?}", addr);
}

/// State for a single connection
struct ConnectionState {
    ws: WebSocketStream<TcpStream>,
    ctx: Arc<DaemonContext>,
    connection_id: String,
    outbound: mpsc::Receiver<String>,
}

impl ConnectionState {
    async fn run(&mut self) {
        let connected = ServerMessage::Connected {
            connection_id: self.connection_id.clone(),
        };
        if let Err(e) = self.send(&connected).await {
            tracing::warn!("Failed to greet {}: {}", self.connection_id, e);
            return;
        }

        loop {
            tokio::select! {
                msg = self.ws.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Err(e) = self.handle_message(&text).await {
                                tracing::warn!("Dropping connection {}: {}", self.connection_id, e);
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) => {
                            tracing::debug!("Client {} requested close", self.connection_id);
                            break;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            let _ = self.ws.send(Message::Pong(data)).await;
                        }
                        Some(Err(e)) => {
                            tracing::warn!("WebSocket error on {}: {}", self.connection_id, e);
                            break;
                        }
                        None => break,
                        _ => {}
                    }
                }

                // Pushes queued by the hub
                payload = self.outbound.recv() => {
                    match payload {
                        Some(payload) => {
                            if let Err(e) = self.ws.send(Message::Text(payload)).await {
                                tracing::warn!("Push to {} failed on the socket: {}", self.connection_id, e);
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }
    }

    async fn handle_message(&mut self, text: &str) -> Result<()> {
        let msg: ClientMessage = match serde_json::from_str(text) {
            Ok(msg) => msg,
            Err(e) => {
                return self
                    .send(&ServerMessage::error("bad_request", e.to_string()))
                    .await;
            }
        };

        match msg {
            ClientMessage::Ping => self.send(&ServerMessage::Pong).await,

            ClientMessage::Info => {
                let info = ServerMessage::Connected {
                    connection_id: self.connection_id.clone(),
                };
                self.send(&info).await
            }

            ClientMessage::SendMessage { message } => {
                let reply = match self.relay(message).await {
                    Ok(delivered) => ServerMessage::Relayed { delivered },
                    Err(e) => ServerMessage::error("registry_unavailable", e.to_string()),
                };
                self.send(&reply).await
            }
        }
    }

    /// Relay to every other registered connection through the same
    /// prune-on-gone path change batches use
    async fn relay(&self, message: serde_json::Value) -> Result<usize> {
        let targets: Vec<String> = self
            .ctx
            .registry
            .list_all()?
            .into_iter()
            .filter(|id| id != &self.connection_id)
            .collect();

        let payload = ServerMessage::Message {
            from: self.connection_id.clone(),
            message,
        }
        .to_json();

        let report = fan_out(
            self.ctx.registry.as_ref(),
            self.ctx.channel.as_ref(),
            &targets,
            &payload,
        )
        .await;
        tracing::debug!(
            "Relayed message from {} to {} of {} connection(s)",
            self.connection_id,
            report.delivered.len(),
            targets.len()
        );
        Ok(report.delivered.len())
    }

    async fn send(&mut self, msg: &ServerMessage) -> Result<()> {
        self.ws.send(Message::Text(msg.to_json())).await?;
        Ok(())
    }

    fn cleanup(&mut self) {
        self.ctx.hub.detach(&self.connection_id);
        self.ctx.lifecycle.on_disconnect(&self.connection_id);
    }
}
