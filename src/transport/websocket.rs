//! WebSocket Transport
//!
//! Splits an accepted tokio-tungstenite stream into the frame halves used by
//! sessions. Two entry points: [`accept_with`] runs the whole handshake on a
//! raw TCP stream, resolving the request path and credentials before the
//! upgrade so that bad requests never become sessions; [`accept_upgraded`]
//! takes over a connection the HTTP server already switched to WebSocket.

use std::io;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{header, HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::protocol::{Message, Role};
use tokio_tungstenite::WebSocketStream;

use super::{Frame, FrameSink, FrameSource};

/// What the handshake callback gets to see of the upgrade request
#[derive(Debug, Clone, Copy)]
pub struct HandshakeRequest<'a> {
    pub path: &'a str,
    pub authorization: Option<&'a str>,
}

/// Reason for refusing an upgrade
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    NotFound,
    Unauthorized(String),
}

impl Rejection {
    fn into_response(self) -> ErrorResponse {
        match self {
            Rejection::NotFound => {
                let mut resp = ErrorResponse::new(Some("not found".to_string()));
                *resp.status_mut() = StatusCode::NOT_FOUND;
                resp
            }
            Rejection::Unauthorized(reason) => {
                let mut resp = ErrorResponse::new(Some(reason));
                *resp.status_mut() = StatusCode::UNAUTHORIZED;
                resp.headers_mut().insert(
                    header::WWW_AUTHENTICATE,
                    HeaderValue::from_static("Basic realm=\"msghub\""),
                );
                resp
            }
        }
    }
}

/// Accept a WebSocket upgrade, letting `resolve` inspect the request first.
///
/// Whatever `resolve` returns travels with the split stream halves; a
/// rejection is answered with the matching HTTP status and fails the accept.
pub async fn accept_with<T, F>(
    stream: TcpStream,
    resolve: F,
) -> Result<(T, WsSource, WsSink), io::Error>
where
    F: FnOnce(HandshakeRequest<'_>) -> Result<T, Rejection>,
{
    let mut resolved = None;
    let mut resolve = Some(resolve);

    let ws = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, response: Response| {
        let handshake = HandshakeRequest {
            path: req.uri().path(),
            authorization: req
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok()),
        };
        let Some(resolve) = resolve.take() else {
            return Err(Rejection::NotFound.into_response());
        };
        match resolve(handshake) {
            Ok(value) => {
                resolved = Some(value);
                Ok(response)
            }
            Err(rejection) => Err(rejection.into_response()),
        }
    })
    .await
    .map_err(io::Error::other)?;

    let value = resolved.ok_or_else(|| io::Error::other("handshake callback did not run"))?;
    let (source, sink) = split(ws);
    Ok((value, source, sink))
}

/// Wrap a connection whose upgrade handshake was already answered
pub async fn accept_upgraded<S>(io: S) -> (WsSource<S>, WsSink<S>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    split(WebSocketStream::from_raw_socket(io, Role::Server, None).await)
}

fn split<S>(ws: WebSocketStream<S>) -> (WsSource<S>, WsSink<S>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (sink, stream) = ws.split();
    (WsSource { stream }, WsSink { sink })
}

/// Read half of an accepted WebSocket
pub struct WsSource<S = TcpStream> {
    stream: SplitStream<WebSocketStream<S>>,
}

#[async_trait]
impl<S> FrameSource for WsSource<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn next_frame(&mut self) -> Option<io::Result<Frame>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(io::Error::other(e))),
            };
            let frame = match message {
                Message::Text(text) => Frame::Text(text),
                Message::Binary(data) => Frame::Binary(data),
                Message::Close(_) => Frame::Close,
                // Pongs are queued by tungstenite itself
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            };
            return Some(Ok(frame));
        }
    }
}

/// Write half of an accepted WebSocket
pub struct WsSink<S = TcpStream> {
    sink: SplitSink<WebSocketStream<S>, Message>,
}

#[async_trait]
impl<S> FrameSink for WsSink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send_text(&mut self, text: String) -> io::Result<()> {
        self.sink
            .send(Message::Text(text))
            .await
            .map_err(io::Error::other)
    }

    async fn close(&mut self) -> io::Result<()> {
        self.sink.close().await.map_err(io::Error::other)
    }
}
