use crate::error::{Result, SlackError};
use crate::types::{ConversationMessage, InboundEvent, SendAck};
use serde::Deserialize;
use serde_json::Value;

const MESSAGE_TYPE: &str = "message";

#[derive(Debug, Default, Deserialize)]
struct Discriminator {
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    reply_to: Option<i64>,
}

enum FrameKind {
    Message,
    Ack,
    Other,
}

impl Discriminator {
    fn kind(&self) -> FrameKind {
        match self.kind.as_deref() {
            Some(MESSAGE_TYPE) => FrameKind::Message,
            Some(kind) if !kind.is_empty() => FrameKind::Other,
            _ if self.reply_to.is_some_and(|id| id > 0) => FrameKind::Ack,
            _ => FrameKind::Other,
        }
    }
}

/// Turns one raw frame into a typed [`InboundEvent`].
///
/// An explicit `type` wins over `reply_to`: a typed frame that is not a
/// conversation message is passed through raw even when it carries a
/// correlation id.
pub fn classify(data: &[u8]) -> Result<InboundEvent> {
    let payload: Value = serde_json::from_slice(data)?;
    let discriminator = match &payload {
        Value::Object(_) => Discriminator::deserialize(&payload)?,
        Value::Null => Discriminator::default(),
        other => {
            return Err(SlackError::Decode(format!(
                "expected a json object frame, got {}",
                json_kind(other)
            )));
        }
    };

    match discriminator.kind() {
        FrameKind::Message => Ok(InboundEvent::Message(ConversationMessage::deserialize(
            payload,
        )?)),
        FrameKind::Ack => Ok(InboundEvent::Ack(SendAck::deserialize(payload)?)),
        FrameKind::Other => Ok(InboundEvent::Raw(String::from_utf8_lossy(data).into_owned())),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::classify;
    use crate::error::SlackError;
    use crate::types::{AckError, ConversationMessage, InboundEvent, SendAck};

    #[test]
    fn conversation_message_is_classified_by_type() {
        let frame = br#"{"type":"message","user":"U9","channel":"C1","text":"<@U123> echo hi","ts":"1716572940.000100"}"#;
        let event = classify(frame).expect("classify message");
        assert_eq!(
            event,
            InboundEvent::Message(ConversationMessage {
                user: "U9".into(),
                channel: "C1".into(),
                text: "<@U123> echo hi".to_string(),
                timestamp: "1716572940.000100".to_string(),
            })
        );
    }

    #[test]
    fn positive_reply_to_is_an_ack() {
        let frame = br#"{"ok":true,"reply_to":4,"ts":"1716572940.000200","text":"hi","error":null}"#;
        let event = classify(frame).expect("classify ack");
        assert_eq!(
            event,
            InboundEvent::Ack(SendAck {
                ok: true,
                reply_to: 4,
                timestamp: "1716572940.000200".to_string(),
                text: "hi".to_string(),
                error: None,
            })
        );
    }

    #[test]
    fn failed_ack_carries_error_detail() {
        let frame = br#"{"ok":false,"reply_to":2,"error":{"code":2,"msg":"message text is missing"}}"#;
        let InboundEvent::Ack(ack) = classify(frame).expect("classify ack") else {
            panic!("expected ack");
        };
        assert!(!ack.ok);
        assert_eq!(
            ack.error,
            Some(AckError {
                code: 2,
                msg: "message text is missing".to_string(),
            })
        );
    }

    #[test]
    fn null_message_fields_read_as_empty() {
        let frame = br#"{"type":"message","user":null,"channel":"C1","text":null,"ts":null}"#;
        let event = classify(frame).expect("nulls are not malformed");
        assert_eq!(
            event,
            InboundEvent::Message(ConversationMessage {
                user: "".into(),
                channel: "C1".into(),
                text: String::new(),
                timestamp: String::new(),
            })
        );
    }

    #[test]
    fn null_ack_fields_read_as_defaults() {
        let frame = br#"{"ok":null,"reply_to":5,"ts":null,"text":null,"error":{"code":null,"msg":null}}"#;
        let InboundEvent::Ack(ack) = classify(frame).expect("nulls are not malformed") else {
            panic!("expected ack");
        };
        assert!(!ack.ok);
        assert_eq!(ack.reply_to, 5);
        assert!(ack.timestamp.is_empty());
        assert!(ack.text.is_empty());
        assert_eq!(
            ack.error,
            Some(AckError {
                code: 0,
                msg: String::new(),
            })
        );
    }

    #[test]
    fn unknown_frames_pass_through_raw() {
        for frame in [
            r#"{"type":"hello"}"#,
            r#"{"type":"pong","reply_to":3}"#,
            r#"{"reply_to":0}"#,
            r#"{"reply_to":-1}"#,
            r#"{"whatever":true}"#,
            "null",
        ] {
            let event = classify(frame.as_bytes()).expect("classify raw");
            assert_eq!(event, InboundEvent::Raw(frame.to_string()), "frame {frame}");
        }
    }

    #[test]
    fn field_type_mismatch_is_a_decode_failure() {
        let err = classify(br#"{"type":"message","text":42}"#).expect_err("bad text");
        assert!(matches!(err, SlackError::Decode(_)));

        let err = classify(br#"{"reply_to":"seven"}"#).expect_err("bad reply_to");
        assert!(matches!(err, SlackError::Decode(_)));
    }

    #[test]
    fn non_object_frames_fail() {
        assert!(classify(b"not json").is_err());
        assert!(classify(b"[1,2]").is_err());
        assert!(classify(br#""text""#).is_err());
    }
}
