//! Connection sessions
//!
//! A [`Session`] is one live WebSocket (or in-memory) connection attached to
//! a hub. It tracks the topics it joined, serializes every write to its
//! transport, and tears itself down on the first transport error.
//!
//! Two background tasks run per session once [`Session::run`] is called:
//! - the read loop decodes inbound frames and answers each request with
//!   exactly one RESPONSE frame
//! - the supervisor waits on the error channel; the first error closes the
//!   transport, stops the read loop and detaches the session from its hub

mod process;

pub use process::{process, Origin};

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use ahash::AHashSet;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, warn};

use crate::hub::Hub;
use crate::protocol::{Message, Outbound, ProcessError, Request};
use crate::transport::{Frame, FrameSink, FrameSource};


static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque session identifier, minted when a connection is accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub fn mint() -> Self {
        SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Transport failures. Any of these ends the session.
#[derive(Debug)]
pub enum SessionError {
    /// Read or write failed
    Io(io::Error),
    /// A write did not complete in time
    WriteTimeout(Duration),
    /// Peer closed the connection, or the session is already closed
    Closed,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Io(e) => write!(f, "IO error: {}", e),
            SessionError::WriteTimeout(d) => write!(f, "write timed out after {:?}", d),
            SessionError::Closed => write!(f, "connection closed"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for SessionError {
    fn from(e: io::Error) -> Self {
        SessionError::Io(e)
    }
}

pub struct Session {
    id: SessionId,
    hub: Arc<Hub>,
    created_at: SystemTime,
    topics: Mutex<AHashSet<String>>,
    /// Held for the duration of every transport write
    writer: tokio::sync::Mutex<Box<dyn FrameSink>>,
    errors: mpsc::Sender<SessionError>,
    /// Taken by the supervisor when the session starts running
    pending_errors: Mutex<Option<mpsc::Receiver<SessionError>>>,
    shutdown: Notify,
    closed: AtomicBool,
}

impl Session {
    /// Attach a new connection to `hub`. Nothing is read until [`run`](Self::run).
    pub fn open(hub: Arc<Hub>, sink: impl FrameSink + 'static) -> Arc<Self> {
        // Only the first error matters; later ones are dropped
        let (errors, pending) = mpsc::channel(1);
        if let Some(m) = hub.metrics() {
            m.session_opened();
        }

        let session = Arc::new(Self {
            id: SessionId::mint(),
            hub,
            created_at: SystemTime::now(),
            topics: Mutex::new(AHashSet::new()),
            writer: tokio::sync::Mutex::new(Box::new(sink)),
            errors,
            pending_errors: Mutex::new(Some(pending)),
            shutdown: Notify::new(),
            closed: AtomicBool::new(false),
        });
        debug!("Opened {}", session.id);
        session
    }

    /// Start the read loop and the supervisor
    pub fn run(self: &Arc<Self>, source: impl FrameSource + 'static) {
        let Some(errors) = self.pending_errors.lock().take() else {
            error!("{} is already running", self.id);
            return;
        };
        tokio::spawn(self.clone().supervise(errors));
        tokio::spawn(self.clone().read_loop(Box::new(source)));
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Topics this session joined, sorted
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.topics.lock().iter().cloned().collect();
        topics.sort();
        topics
    }

    /// Welcome a freshly accepted connection and join the global topic
    pub async fn greet(self: &Arc<Self>) {
        if !self.push(&Outbound::ok("connected")).await {
            return;
        }
        let global = self.hub.options().global_topic.clone();
        if !global.is_empty() {
            self.subscribe(&global).await;
        }
    }

    /// Join a topic. Returns `false` if already subscribed or closed.
    pub async fn subscribe(self: &Arc<Self>, topic: &str) -> bool {
        if self.is_closed() || !self.topics.lock().insert(topic.to_string()) {
            return false;
        }
        self.hub.subscribe(topic, self).await
    }

    /// Publish with this session as the source: no echo, feedback with the
    /// subscriber count comes back to this connection. A closed session
    /// publishes nothing.
    pub async fn publish_via(self: &Arc<Self>, topic: &str, message: &Arc<Message>) -> usize {
        if self.is_closed() {
            return 0;
        }
        self.hub.publish(topic, message, Some(self)).await
    }

    /// Fan-out target: deliver a message published on `topic`
    pub async fn send(&self, topic: &str, message: &Message) {
        if !self.push(&Outbound::delivery(topic, message)).await {
            if let Some(m) = self.hub.metrics() {
                m.delivery_failed();
            }
        }
    }

    /// Write one text frame while holding the session's write lock
    pub async fn write_safe(&self, text: String) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed);
        }
        let limit = self.hub.options().write_timeout;
        let mut writer = self.writer.lock().await;
        match tokio::time::timeout(limit, writer.send_text(text)).await {
            Ok(result) => result.map_err(SessionError::Io),
            Err(_) => Err(SessionError::WriteTimeout(limit)),
        }
    }

    /// Encode and write a frame. Write failures go to the error channel;
    /// returns whether the frame was written.
    pub async fn push(&self, frame: &Outbound<'_>) -> bool {
        let text = match frame.encode() {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to encode frame for {}: {}", self.id, e);
                return false;
            }
        };
        match self.write_safe(text).await {
            Ok(()) => true,
            Err(e) => {
                self.report(e);
                false
            }
        }
    }

    /// Hand an error to the supervisor
    pub fn report(&self, err: SessionError) {
        // Full: an error is already pending. Closed: already torn down.
        let _ = self.errors.try_send(err);
    }

    async fn read_loop(self: Arc<Self>, mut source: Box<dyn FrameSource>) {
        loop {
            let frame = tokio::select! {
                biased;

                _ = self.shutdown.notified() => break,
                frame = source.next_frame() => frame,
            };

            let reply = match frame {
                Some(Ok(Frame::Text(text))) => {
                    let result = match Request::decode(text.as_bytes()) {
                        Ok(request) => process(request, Origin::Connection(&self)).await,
                        Err(e) => Err(e),
                    };
                    if let Err(ref e) = result {
                        debug!("Request from {} rejected: {}", self.id, e);
                    }
                    Outbound::from_result(result)
                }
                Some(Ok(Frame::Binary(_))) => Outbound::err(ProcessError::UnsupportedFrame),
                Some(Ok(Frame::Close)) | None => {
                    self.report(SessionError::Closed);
                    break;
                }
                Some(Err(e)) => {
                    self.report(SessionError::Io(e));
                    break;
                }
            };

            if !self.push(&reply).await {
                break;
            }
        }
        debug!("Read loop of {} finished", self.id);
    }

    async fn supervise(self: Arc<Self>, mut errors: mpsc::Receiver<SessionError>) {
        let Some(err) = errors.recv().await else {
            return;
        };
        match err {
            SessionError::Closed => debug!("{} closed by peer", self.id),
            e => warn!("{} failed: {}", self.id, e),
        }

        self.closed.store(true, Ordering::Release);
        self.shutdown.notify_one();
        self.hub.remove_session(self.id);

        if let Err(e) = self.writer.lock().await.close().await {
            debug!("Error closing transport of {}: {}", self.id, e);
        }
        if let Some(m) = self.hub.metrics() {
            m.session_closed();
        }
        debug!("{} torn down", self.id);
    }
}
