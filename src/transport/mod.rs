//! Transport Layer
//!
//! A session talks to its peer through a pair of frame halves: a source of
//! inbound frames and a sink for outbound text. The WebSocket transport is
//! the production implementation; the in-memory one backs embedding and tests.

pub mod memory;
mod websocket;

pub use memory::{memory_transport, MemoryPeer, MemorySink, MemorySource};
pub use websocket::{accept_upgraded, accept_with, HandshakeRequest, Rejection, WsSink, WsSource};

use std::io;

use async_trait::async_trait;

/// An inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    /// Peer closed the connection
    Close,
}

/// Read half of a connection
#[async_trait]
pub trait FrameSource: Send {
    /// Next frame from the peer, `None` once the stream has ended
    async fn next_frame(&mut self) -> Option<io::Result<Frame>>;
}

/// Write half of a connection. Not safe for concurrent writers; sessions
/// serialize access behind their own lock.
#[async_trait]
pub trait FrameSink: Send {
    async fn send_text(&mut self, text: String) -> io::Result<()>;

    async fn close(&mut self) -> io::Result<()>;
}
