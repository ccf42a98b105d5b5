//! # Inbound Messages
//!
//! Every packet the broker delivers becomes a [`Message`]: the topic, the raw
//! payload, and whatever could be decoded from a JSON body of the form
//! `{"c": code, "t": token, "ip": "host:port"}`. Decoding is best-effort. A
//! body that is not JSON still yields a message with the raw payload intact
//! and empty decoded fields.

use heapless::{String, Vec};
use serde::Deserialize;

use crate::error::DecodeError;
use crate::store::Token;

/// Maximum topic length kept in a [`Message`].
pub const MAX_TOPIC_LEN: usize = 128;

/// Maximum payload length kept in a [`Message`].
pub const MAX_PAYLOAD_LEN: usize = 256;

/// Maximum length of a decoded command code.
pub const MAX_CODE_LEN: usize = 32;

/// Maximum length of a decoded `host:port` field.
pub const MAX_IP_LEN: usize = 64;

/// Fields decoded from a JSON body. Empty when absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageData {
    /// The `c` field, lowercased.
    pub code: String<MAX_CODE_LEN>,
    /// The `t` field.
    pub token: Token,
    /// The `ip` field.
    pub ip: String<MAX_IP_LEN>,
}

/// A packet received on one of the session's topics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Topic the packet arrived on.
    pub topic: String<MAX_TOPIC_LEN>,
    /// Raw payload bytes.
    pub payload: Vec<u8, MAX_PAYLOAD_LEN>,
    /// Best-effort decoded body.
    pub data: MessageData,
    /// `true` if the topic or payload was cut to fit.
    pub truncated: bool,
}

/// The JSON object shape shared by coordinator replies and control messages.
#[derive(Deserialize)]
pub(crate) struct WireBody<'a> {
    #[serde(rename = "c", default, borrow)]
    pub(crate) code: Option<&'a str>,
    #[serde(rename = "t", default, borrow)]
    pub(crate) token: Option<&'a str>,
    #[serde(default, borrow)]
    pub(crate) ip: Option<&'a str>,
}

impl Message {
    /// Builds a message from a delivered packet.
    pub fn from_packet(topic: &str, payload: &[u8]) -> Self {
        let mut truncated = false;

        let mut owned_topic = String::new();
        for ch in topic.chars() {
            if owned_topic.push(ch).is_err() {
                truncated = true;
                break;
            }
        }

        let kept = payload.len().min(MAX_PAYLOAD_LEN);
        truncated |= kept < payload.len();
        let mut owned_payload = Vec::new();
        let _ = owned_payload.extend_from_slice(&payload[..kept]);

        // Fields always describe the stored payload.
        let data = match decode_body(&payload[..kept]) {
            Ok(data) => data,
            Err(e) => {
                debug!("undecodable body on {}: {:?}", topic, e);
                MessageData::default()
            }
        };

        Self {
            topic: owned_topic,
            payload: owned_payload,
            data,
            truncated,
        }
    }

    /// The payload as text, if it is valid UTF-8.
    pub fn payload_str(&self) -> Option<&str> {
        core::str::from_utf8(&self.payload).ok()
    }

    /// The decoded command code, lowercased. Empty if there was none.
    pub fn code(&self) -> &str {
        &self.data.code
    }
}

/// Decodes a `{"c", "t", "ip"}` JSON body. Unknown fields are ignored.
pub fn decode_body(payload: &[u8]) -> Result<MessageData, DecodeError> {
    let (body, _) =
        serde_json_core::from_slice::<WireBody<'_>>(payload).map_err(|_| DecodeError::Malformed)?;

    let mut data = MessageData::default();
    if let Some(code) = body.code {
        for ch in code.chars() {
            data.code
                .push(ch.to_ascii_lowercase())
                .map_err(|_| DecodeError::FieldTooLong)?;
        }
    }
    if let Some(token) = body.token {
        data.token
            .push_str(token)
            .map_err(|_| DecodeError::FieldTooLong)?;
    }
    if let Some(ip) = body.ip {
        data.ip
            .push_str(ip)
            .map_err(|_| DecodeError::FieldTooLong)?;
    }
    Ok(data)
}
