//! A push daemon on 127.0.0.1 with WebSocket helpers

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use pinstream::links::PassthroughLinks;
use pinstream::socket_server::{serve, DaemonContext, ServerMessage};
use pinstream::{ChangeDispatcher, SessionHub, SqliteConnectionRegistry};

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const WAIT: Duration = Duration::from_secs(5);

pub struct Daemon {
    pub addr: SocketAddr,
    pub registry: Arc<SqliteConnectionRegistry>,
    pub dispatcher: ChangeDispatcher,
    server: tokio::task::JoinHandle<()>,
}

impl Daemon {
    pub async fn start() -> Self {
        let registry = Arc::new(SqliteConnectionRegistry::open_in_memory().unwrap());
        let hub = Arc::new(SessionHub::new(64 * 1024, Duration::from_secs(1), 16));
        let ctx = Arc::new(DaemonContext::new(registry.clone(), hub.clone()));
        let dispatcher = ChangeDispatcher::new(registry.clone(), hub, Arc::new(PassthroughLinks));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve(listener, ctx));

        Self {
            addr,
            registry,
            dispatcher,
            server,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Connect and consume the greeting; returns the socket and its id
    pub async fn connect(&self) -> (Client, String) {
        let (mut ws, _) = connect_async(self.url()).await.unwrap();
        match next_json::<ServerMessage>(&mut ws).await {
            ServerMessage::Connected { connection_id } => (ws, connection_id),
            other => panic!("expected greeting, got {:?}", other),
        }
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        self.server.abort();
    }
}

pub async fn next_text(ws: &mut Client) -> String {
    loop {
        let msg = tokio::time::timeout(WAIT, ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = msg {
            return text;
        }
    }
}

pub async fn next_json<T: serde::de::DeserializeOwned>(ws: &mut Client) -> T {
    serde_json::from_str(&next_text(ws).await).unwrap()
}

pub async fn send_text(ws: &mut Client, text: &str) {
    ws.send(Message::Text(text.to_string())).await.unwrap();
}
