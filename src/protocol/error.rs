//! Request processing errors.
//!
//! None of these close the connection: they are reported in the RESPONSE
//! frame of the request that caused them.

use std::fmt;

use super::{repr_list, Action, MessageType};

/// Errors produced while decoding or processing a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    /// Request lists no topics
    MissingTopics,
    /// Message type not recognised or data empty
    InvalidMessage,
    /// Action not available on the calling transport
    ActionNotSupported(Action),
    /// Action not recognised at all
    UnsupportedAction,
    /// Non-text frame received on a connection
    UnsupportedFrame,
    /// Body or frame is not a valid request
    Decode(String),
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingTopics => write!(f, "missing topics"),
            Self::InvalidMessage => write!(
                f,
                "message data not provided or type is not in {}",
                repr_list(&MessageType::ALL.map(|t| t.as_str()))
            ),
            Self::ActionNotSupported(action) => {
                write!(f, "HTTP does not support action {}", action)
            }
            Self::UnsupportedAction => write!(f, "unsupported action"),
            Self::UnsupportedFrame => write!(f, "binary message is not supported"),
            Self::Decode(e) => write!(f, "invalid request: {}", e),
        }
    }
}

impl std::error::Error for ProcessError {}
