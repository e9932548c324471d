//! In-process transport
//!
//! Channel-backed frame halves for driving a session without a socket.
//! The [`MemoryPeer`] plays the remote end: it injects inbound frames and
//! reads what the session wrote.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Frame, FrameSink, FrameSource};

/// Create a connected source/sink pair and the peer that controls them
pub fn memory_transport() -> (MemorySource, MemorySink, MemoryPeer) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let fail_writes = Arc::new(AtomicBool::new(false));
    let closed = Arc::new(AtomicBool::new(false));

    (
        MemorySource { inbound: inbound_rx },
        MemorySink {
            outbound: outbound_tx,
            fail_writes: fail_writes.clone(),
            closed: closed.clone(),
        },
        MemoryPeer {
            inbound: Some(inbound_tx),
            outbound: outbound_rx,
            fail_writes,
            closed,
        },
    )
}

pub struct MemorySource {
    inbound: mpsc::UnboundedReceiver<io::Result<Frame>>,
}

#[async_trait]
impl FrameSource for MemorySource {
    async fn next_frame(&mut self) -> Option<io::Result<Frame>> {
        self.inbound.recv().await
    }
}

pub struct MemorySink {
    outbound: mpsc::UnboundedSender<String>,
    fail_writes: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send_text(&mut self, text: String) -> io::Result<()> {
        if self.fail_writes.load(Ordering::Acquire) || self.closed.load(Ordering::Acquire) {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        self.outbound
            .send(text)
            .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))
    }

    async fn close(&mut self) -> io::Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Remote end of an in-memory connection
pub struct MemoryPeer {
    inbound: Option<mpsc::UnboundedSender<io::Result<Frame>>>,
    outbound: mpsc::UnboundedReceiver<String>,
    fail_writes: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl MemoryPeer {
    pub fn send_text(&self, text: impl Into<String>) {
        self.push(Ok(Frame::Text(text.into())));
    }

    pub fn send_binary(&self, data: Vec<u8>) {
        self.push(Ok(Frame::Binary(data)));
    }

    /// Make the session's next read fail
    pub fn fail_read(&self, kind: io::ErrorKind) {
        self.push(Err(kind.into()));
    }

    /// Make every subsequent write by the session fail
    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::Release);
    }

    /// End the inbound stream
    pub fn hang_up(&mut self) {
        self.inbound = None;
    }

    /// Whether the session closed its sink
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn push(&self, frame: io::Result<Frame>) {
        if let Some(ref tx) = self.inbound {
            let _ = tx.send(frame);
        }
    }

    /// Next frame the session wrote, waiting at most `wait`
    pub async fn recv_timeout(&mut self, wait: Duration) -> Option<String> {
        tokio::time::timeout(wait, self.outbound.recv())
            .await
            .ok()
            .flatten()
    }

    /// Next frame the session wrote, decoded as JSON
    pub async fn recv_json(&mut self) -> Option<serde_json::Value> {
        let text = self.recv_timeout(Duration::from_secs(2)).await?;
        serde_json::from_str(&text).ok()
    }
}
