//! Push daemon tests over real WebSockets on 127.0.0.1
