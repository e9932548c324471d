//! Wire type tests

use super::*;
use pretty_assertions::assert_eq;
use serde_json::json;

#[test]
fn test_decode_publish_request() {
    let raw = br#"{"action":"PUB","topics":["news","sport"],"message":{"type":"PLAIN","data":"hi"}}"#;
    let request = Request::decode(raw).unwrap();
    assert_eq!(request.action, Action::Pub);
    assert_eq!(request.topics, vec!["news", "sport"]);
    assert_eq!(request.message.kind, "PLAIN");
    assert_eq!(request.message.data, "hi");
}

#[test]
fn test_decode_subscribe_without_message() {
    let request = Request::decode(br#"{"action":"SUB","topics":[]}"#).unwrap();
    assert_eq!(request.action, Action::Sub);
    assert!(request.topics.is_empty());
    assert_eq!(request.message, RawMessage::default());
}

#[test]
fn test_decode_unknown_action() {
    let request = Request::decode(br#"{"action":"PING","topics":["a"]}"#).unwrap();
    assert_eq!(request.action, Action::Unsupported);
}

#[test]
fn test_decode_invalid_json() {
    let err = Request::decode(b"not json").unwrap_err();
    assert!(matches!(err, ProcessError::Decode(_)));
    assert!(err.to_string().starts_with("invalid request: "));
}

#[test]
fn test_validate_rejects_empty_type() {
    let raw = RawMessage {
        kind: String::new(),
        data: "x".to_string(),
        caption: None,
    };
    assert_eq!(raw.validate(), Err(ProcessError::InvalidMessage));
    assert_eq!(
        ProcessError::InvalidMessage.to_string(),
        "message data not provided or type is not in [PLAIN, MARKDOWN, JSON, HTML, IMAGE, VIDEO]"
    );
}

#[test]
fn test_validate_rejects_empty_data() {
    let raw = RawMessage {
        kind: "PLAIN".to_string(),
        data: String::new(),
        caption: None,
    };
    assert_eq!(raw.validate(), Err(ProcessError::InvalidMessage));
}

#[test]
fn test_validate_accepts_photo_alias() {
    let raw = RawMessage {
        kind: "PHOTO".to_string(),
        data: "aGVsbG8=".to_string(),
        caption: Some("sunset".to_string()),
    };
    let message = raw.validate().unwrap();
    assert_eq!(message.kind, MessageType::Image);
    assert_eq!(message.caption.as_deref(), Some("sunset"));
}

#[test]
fn test_validate_drops_empty_caption() {
    let raw = RawMessage {
        kind: "MARKDOWN".to_string(),
        data: "*bold*".to_string(),
        caption: Some(String::new()),
    };
    assert_eq!(raw.validate().unwrap().caption, None);
}

#[test]
fn test_message_json_omits_missing_caption() {
    let message = Message::new(MessageType::Plain, "hi");
    let value: serde_json::Value = serde_json::from_slice(&message.to_json().unwrap()).unwrap();
    assert_eq!(value, json!({"type": "PLAIN", "data": "hi"}));
}

#[test]
fn test_outbound_frames() {
    let message = Message::new(MessageType::Plain, "hi");

    let delivery = Outbound::delivery("news", &message).encode().unwrap();
    let value: serde_json::Value = serde_json::from_str(&delivery).unwrap();
    assert_eq!(
        value,
        json!({"type": "MESSAGE", "topic": "news", "message": {"type": "PLAIN", "data": "hi"}})
    );

    let feedback = Outbound::feedback("done").encode().unwrap();
    let value: serde_json::Value = serde_json::from_str(&feedback).unwrap();
    assert_eq!(value, json!({"type": "FEEDBACK", "message": "done"}));

    let failure = Outbound::from_result::<String, _>(Err(ProcessError::MissingTopics))
        .encode()
        .unwrap();
    let value: serde_json::Value = serde_json::from_str(&failure).unwrap();
    assert_eq!(
        value,
        json!({"type": "RESPONSE", "success": false, "message": "missing topics"})
    );
}

#[test]
fn test_repr_list() {
    assert_eq!(repr_list(&["a", "b"]), "[a, b]");
    assert_eq!(repr_list::<&str>(&[]), "[]");
}
