//! Relays monitor envelopes to remote parents over WebSocket.

pub mod server;

pub use server::{RelayError, WebSocketChannel};
