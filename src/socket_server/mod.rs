//! Pinstream push daemon
//!
//! A standalone daemon that keeps one WebSocket per client and fans change
//! batches out to all of them.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    PINSTREAM PUSH DAEMON (pinstream-daemon)             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  change log (JSON Lines) ──► ChangeDispatcher ──► fan_out ──┐           │
//! │                                     │                       │           │
//! │                                     ▼                       ▼           │
//! │                      SqliteConnectionRegistry ◄── prune  SessionHub     │
//! │                                     ▲                       │           │
//! │                  on_connect/on_disconnect              mpsc queue       │
//! │                                     │                       ▼           │
//! │  WebSocket Server ──────────► ConnectionState per client ──► socket     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol
//!
//! ```json
//! // Client -> Server
//! {"type": "ping"}
//! {"type": "info"}
//! {"type": "send_message", "message": {...}}
//!
//! // Server -> Client
//! {"type": "connected", "connection_id": "..."}
//! {"type": "pong"}
//! {"type": "message", "from": "...", "message": {...}}
//! {"type": "relayed", "delivered": 2}
//! {"type": "error", "code": "bad_request", "message": "..."}
//! [{"pointUrl": "10,20", "eventName": "MODIFY", "newImage": {...}}]
//! ```

pub mod connection;
pub mod context;
pub mod protocol;

pub use connection::{handle_connection, serve, serve_until};
pub use context::DaemonContext;
pub use protocol::{ClientMessage, ServerMessage};
