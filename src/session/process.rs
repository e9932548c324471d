//! Request processing shared by WebSocket sessions and the HTTP API.

use std::sync::Arc;

use tracing::debug;

use super::Session;
use crate::hub::Hub;
use crate::protocol::{repr_list, Action, ProcessError, Request};

/// Where a request came from
#[derive(Clone, Copy)]
pub enum Origin<'a> {
    /// A live connection; publishes are attributed to it
    Connection(&'a Arc<Session>),
    /// A one-shot HTTP request against a hub
    Http(&'a Hub),
}

/// Validate and execute a request, returning the text of the success
/// response.
pub async fn process(request: Request, origin: Origin<'_>) -> Result<String, ProcessError> {
    if request.topics.is_empty() {
        return Err(ProcessError::MissingTopics);
    }
    let topics = repr_list(&request.topics);

    match request.action {
        Action::Pub => {
            let message = Arc::new(request.message.validate()?);
            for topic in &request.topics {
                match origin {
                    Origin::Connection(session) => {
                        session.publish_via(topic, &message).await;
                    }
                    Origin::Http(hub) => {
                        hub.publish(topic, &message, None).await;
                    }
                }
            }
            Ok(format!("publish requests on topics {} are processing", topics))
        }
        Action::Sub => {
            let Origin::Connection(session) = origin else {
                return Err(ProcessError::ActionNotSupported(Action::Sub));
            };
            for topic in &request.topics {
                session.subscribe(topic).await;
            }
            let text = format!("subscribe requests on topics {} are processing", topics);
            debug!("{}: {}", session.id(), text);
            Ok(text)
        }
        Action::Unsupported => Err(ProcessError::UnsupportedAction),
    }
}
