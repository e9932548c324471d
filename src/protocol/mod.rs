//! Wire types
//!
//! Inbound requests, the message payload shared by every topic a request
//! publishes to, and the closed set of outbound frames the hub produces.

mod error;

pub use error::ProcessError;

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::hub::{HubStatus, ReplayBatch};

#[cfg(test)]
mod tests;

/// Kind of content carried by a [`Message`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageType {
    Plain,
    Markdown,
    Json,
    Html,
    Image,
    Video,
}

impl MessageType {
    pub const ALL: [MessageType; 6] = [
        MessageType::Plain,
        MessageType::Markdown,
        MessageType::Json,
        MessageType::Html,
        MessageType::Image,
        MessageType::Video,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Plain => "PLAIN",
            MessageType::Markdown => "MARKDOWN",
            MessageType::Json => "JSON",
            MessageType::Html => "HTML",
            MessageType::Image => "IMAGE",
            MessageType::Video => "VIDEO",
        }
    }
}

impl FromStr for MessageType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PLAIN" => Ok(MessageType::Plain),
            "MARKDOWN" => Ok(MessageType::Markdown),
            "JSON" => Ok(MessageType::Json),
            "HTML" => Ok(MessageType::Html),
            // older clients send PHOTO
            "IMAGE" | "PHOTO" => Ok(MessageType::Image),
            "VIDEO" => Ok(MessageType::Video),
            _ => Err(()),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated message, immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// Raw text or base64 of bytes
    pub data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

impl Message {
    pub fn new(kind: MessageType, data: impl Into<String>) -> Self {
        Self {
            kind,
            data: data.into(),
            caption: None,
        }
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    /// Serialized form stored in the replay buffer
    pub fn to_json(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }
}

/// Message exactly as received, before validation
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RawMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: String,
    pub caption: Option<String>,
}

impl RawMessage {
    /// Accept the message only if its type is recognised and it has data.
    pub fn validate(&self) -> Result<Message, ProcessError> {
        let kind = self
            .kind
            .parse::<MessageType>()
            .map_err(|_| ProcessError::InvalidMessage)?;
        if self.data.is_empty() {
            return Err(ProcessError::InvalidMessage);
        }
        Ok(Message {
            kind,
            data: self.data.clone(),
            caption: self.caption.clone().filter(|c| !c.is_empty()),
        })
    }
}

/// Request action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Action {
    #[serde(rename = "PUB")]
    Pub,
    #[serde(rename = "SUB")]
    Sub,
    #[serde(other)]
    Unsupported,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Pub => f.write_str("PUB"),
            Action::Sub => f.write_str("SUB"),
            Action::Unsupported => f.write_str("UNSUPPORTED"),
        }
    }
}

/// A decoded client request
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Request {
    pub action: Action,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub message: RawMessage,
}

impl Request {
    pub fn subscribe<I, S>(topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            action: Action::Sub,
            topics: topics.into_iter().map(Into::into).collect(),
            message: RawMessage::default(),
        }
    }

    pub fn publish<I, S>(topics: I, kind: &str, data: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            action: Action::Pub,
            topics: topics.into_iter().map(Into::into).collect(),
            message: RawMessage {
                kind: kind.to_string(),
                data: data.to_string(),
                caption: None,
            },
        }
    }

    /// Decode a request from a text frame or HTTP body
    pub fn decode(raw: &[u8]) -> Result<Self, ProcessError> {
        serde_json::from_slice(raw).map_err(|e| ProcessError::Decode(e.to_string()))
    }
}

/// Body of a RESPONSE frame
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ResponseBody {
    Text(String),
    Replay(ReplayBatch),
    Status(HubStatus),
    Document(serde_json::Value),
}

impl From<String> for ResponseBody {
    fn from(s: String) -> Self {
        ResponseBody::Text(s)
    }
}

impl From<&str> for ResponseBody {
    fn from(s: &str) -> Self {
        ResponseBody::Text(s.to_string())
    }
}

impl From<ReplayBatch> for ResponseBody {
    fn from(batch: ReplayBatch) -> Self {
        ResponseBody::Replay(batch)
    }
}

impl From<HubStatus> for ResponseBody {
    fn from(status: HubStatus) -> Self {
        ResponseBody::Status(status)
    }
}

impl From<serde_json::Value> for ResponseBody {
    fn from(document: serde_json::Value) -> Self {
        ResponseBody::Document(document)
    }
}

/// Every frame the hub writes to a client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum Outbound<'a> {
    /// Asynchronous acknowledgement of the client's own action
    Feedback { message: Cow<'a, str> },
    /// A message published on a subscribed topic
    Message {
        topic: &'a str,
        message: &'a Message,
    },
    /// The single reply to a processed request
    Response { success: bool, message: ResponseBody },
}

impl<'a> Outbound<'a> {
    pub fn feedback(message: impl Into<Cow<'a, str>>) -> Self {
        Outbound::Feedback {
            message: message.into(),
        }
    }

    pub fn delivery(topic: &'a str, message: &'a Message) -> Self {
        Outbound::Message { topic, message }
    }

    pub fn ok(body: impl Into<ResponseBody>) -> Self {
        Outbound::Response {
            success: true,
            message: body.into(),
        }
    }

    pub fn err(error: impl fmt::Display) -> Self {
        Outbound::Response {
            success: false,
            message: ResponseBody::Text(error.to_string()),
        }
    }

    /// Response frame for the outcome of processing a request
    pub fn from_result<T, E>(result: Result<T, E>) -> Self
    where
        T: Into<ResponseBody>,
        E: fmt::Display,
    {
        match result {
            Ok(body) => Outbound::ok(body),
            Err(e) => Outbound::err(e),
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Render names the way responses list them: `[a, b]`
pub fn repr_list<S: AsRef<str>>(items: &[S]) -> String {
    let joined = items
        .iter()
        .map(|item| item.as_ref())
        .collect::<Vec<_>>()
        .join(", ");
    format!("[{}]", joined)
}
