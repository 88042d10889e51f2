use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::ops::Deref;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl Deref for $name {
            type Target = str;

            fn deref(&self) -> &Self::Target {
                self.as_str()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

id_newtype!(ChannelId);
id_newtype!(UserId);

/// Who the hub says we are. Fetched once by the identity check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub display_name: String,
}

impl Identity {
    /// The literal token other users type to address this identity.
    pub fn mention(&self) -> String {
        format!("<@{}>", self.user_id)
    }
}

/// A typed frame received from the hub.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Message(ConversationMessage),
    Ack(SendAck),
    Raw(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConversationMessage {
    #[serde(default, deserialize_with = "null_as_default")]
    pub user: UserId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub channel: ChannelId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub text: String,
    #[serde(default, rename = "ts", deserialize_with = "null_as_default")]
    pub timestamp: String,
}

impl ConversationMessage {
    /// Wall-clock time encoded in the hub timestamp (`"<secs>.<micros>"`).
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        let ts = parse_hub_timestamp(&self.timestamp)?;
        DateTime::from_timestamp(ts.seconds, (ts.micros * 1_000) as u32)
    }
}

/// Hub reply to one of our outbound messages, correlated by `reply_to`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SendAck {
    #[serde(default, deserialize_with = "null_as_default")]
    pub ok: bool,
    pub reply_to: u64,
    #[serde(default, rename = "ts", deserialize_with = "null_as_default")]
    pub timestamp: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub text: String,
    #[serde(default)]
    pub error: Option<AckError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AckError {
    #[serde(default, deserialize_with = "null_as_default")]
    pub code: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub msg: String,
}

/// A frame waiting to be written. `id` stays 0 until the queue consumer
/// assigns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    #[serde(rename = "ping")]
    Ping { id: u64 },
    #[serde(rename = "message")]
    Say {
        id: u64,
        channel: ChannelId,
        text: String,
    },
}

impl OutboundMessage {
    pub fn ping() -> Self {
        Self::Ping { id: 0 }
    }

    pub fn say(channel: impl Into<ChannelId>, text: impl Into<String>) -> Self {
        Self::Say {
            id: 0,
            channel: channel.into(),
            text: text.into(),
        }
    }

    pub fn id(&self) -> u64 {
        match self {
            Self::Ping { id } | Self::Say { id, .. } => *id,
        }
    }

    /// Sets the identifier unless one is already present. Returns whether
    /// the assignment took effect.
    pub(crate) fn assign_id(&mut self, next: u64) -> bool {
        let slot = match self {
            Self::Ping { id } | Self::Say { id, .. } => id,
        };
        if *slot != 0 || next == 0 {
            return false;
        }
        *slot = next;
        true
    }
}

/// The hub sends `null` for absent values; treat it like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct HubTimestamp {
    seconds: i64,
    micros: i64,
}

fn parse_hub_timestamp(raw: &str) -> Option<HubTimestamp> {
    let mut parts = raw.trim().split('.');
    let seconds = parts.next()?.parse::<i64>().ok()?;
    let micros_raw = parts.next().unwrap_or("0");
    let micros_digits = micros_raw.chars().take(6).collect::<String>();
    let micros_padded = format!("{micros_digits:0<6}");
    let micros = micros_padded.parse::<i64>().ok()?;
    Some(HubTimestamp { seconds, micros })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hub_timestamp_normalizes_fractional_precision() {
        let ts = parse_hub_timestamp("1716572940.000123").expect("timestamp should parse");
        assert_eq!(ts.seconds, 1716572940);
        assert_eq!(ts.micros, 123);

        let short = parse_hub_timestamp("1716572940.5").expect("timestamp should parse");
        assert_eq!(short.micros, 500_000);
        assert!(parse_hub_timestamp("not-a-ts").is_none());
    }

    #[test]
    fn sent_at_converts_hub_timestamp() {
        let message = ConversationMessage {
            user: "U1".into(),
            channel: "C1".into(),
            text: "hi".to_string(),
            timestamp: "1716572940.000123".to_string(),
        };
        let sent_at = message.sent_at().expect("valid timestamp");
        assert_eq!(sent_at.timestamp(), 1716572940);
        assert_eq!(sent_at.timestamp_subsec_micros(), 123);
    }

    #[test]
    fn outbound_wire_shapes() {
        let mut say = OutboundMessage::say("C42", "hello");
        assert!(say.assign_id(7));
        assert_eq!(
            serde_json::to_value(&say).expect("encode say"),
            serde_json::json!({"id": 7, "type": "message", "channel": "C42", "text": "hello"})
        );

        let mut ping = OutboundMessage::ping();
        assert!(ping.assign_id(8));
        assert_eq!(
            serde_json::to_value(&ping).expect("encode ping"),
            serde_json::json!({"id": 8, "type": "ping"})
        );
    }

    #[test]
    fn identifier_is_assigned_once() {
        let mut ping = OutboundMessage::ping();
        assert_eq!(ping.id(), 0);
        assert!(!ping.assign_id(0));
        assert!(ping.assign_id(3));
        assert!(!ping.assign_id(4));
        assert_eq!(ping.id(), 3);
    }

    #[test]
    fn mention_token_wraps_user_id() {
        let identity = Identity {
            user_id: "U123".into(),
            display_name: "wagerbot".to_string(),
        };
        assert_eq!(identity.mention(), "<@U123>");
    }
}
