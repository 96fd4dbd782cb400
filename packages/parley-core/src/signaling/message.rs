//! Signaling envelope.
//!
//! Wire form is a flat JSON object `{"type": ..., ...payload}`:
//!
//! | type       | payload                |
//! |------------|------------------------|
//! | `join`     | none                   |
//! | `join_ack` | none                   |
//! | `offer`    | `sdp`                  |
//! | `answer`   | `sdp`                  |
//! | `candidate`| `candidate`            |
//! | `bye`      | none                   |

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Opaque session description blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionDescription(pub String);

impl SessionDescription {
    /// Wrap an SDP string.
    pub fn new(sdp: impl Into<String>) -> Self {
        Self(sdp.into())
    }

    /// The raw SDP.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Opaque connectivity-path descriptor, forwarded as whatever JSON the
/// transport produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IceCandidate(pub serde_json::Value);

impl IceCandidate {
    /// Wrap a transport-produced candidate.
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// Messages exchanged with the other participant through the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalingMessage {
    /// "I am attached and ready"
    Join,
    /// Reply to `Join`
    JoinAck,
    /// Initiator's session description
    Offer {
        /// Offer SDP
        sdp: SessionDescription,
    },
    /// Receiver's session description
    Answer {
        /// Answer SDP
        sdp: SessionDescription,
    },
    /// Trickled transport candidate
    Candidate {
        /// The candidate
        candidate: IceCandidate,
    },
    /// The sender has ended the call
    Bye,
}

/// Payload-free discriminant of [`SignalingMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// `join`
    Join,
    /// `join_ack`
    JoinAck,
    /// `offer`
    Offer,
    /// `answer`
    Answer,
    /// `candidate`
    Candidate,
    /// `bye`
    Bye,
}

impl MessageKind {
    /// All kinds, in wire order.
    pub const ALL: [MessageKind; 6] = [
        MessageKind::Join,
        MessageKind::JoinAck,
        MessageKind::Offer,
        MessageKind::Answer,
        MessageKind::Candidate,
        MessageKind::Bye,
    ];

    /// Wire tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Join => "join",
            MessageKind::JoinAck => "join_ack",
            MessageKind::Offer => "offer",
            MessageKind::Answer => "answer",
            MessageKind::Candidate => "candidate",
            MessageKind::Bye => "bye",
        }
    }

    /// Look up a wire tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == tag)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SignalingMessage {
    /// Discriminant of this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            SignalingMessage::Join => MessageKind::Join,
            SignalingMessage::JoinAck => MessageKind::JoinAck,
            SignalingMessage::Offer { .. } => MessageKind::Offer,
            SignalingMessage::Answer { .. } => MessageKind::Answer,
            SignalingMessage::Candidate { .. } => MessageKind::Candidate,
            SignalingMessage::Bye => MessageKind::Bye,
        }
    }

    /// Serialize to the JSON envelope.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a JSON envelope.
    ///
    /// An unrecognised `type` is [`Error::UnknownMessageType`]; a known type
    /// with a bad payload is [`Error::MalformedMessage`].
    pub fn decode(text: &str) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| Error::MalformedMessage(e.to_string()))?;

        let tag = value
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or_else(|| Error::MalformedMessage("missing string field `type`".into()))?;

        if MessageKind::from_tag(tag).is_none() {
            return Err(Error::UnknownMessageType(tag.to_string()));
        }

        serde_json::from_value(value).map_err(|e| Error::MalformedMessage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_free_kinds_encode_bare() {
        assert_eq!(SignalingMessage::Join.encode().unwrap(), r#"{"type":"join"}"#);
        assert_eq!(SignalingMessage::JoinAck.encode().unwrap(), r#"{"type":"join_ack"}"#);
        assert_eq!(SignalingMessage::Bye.encode().unwrap(), r#"{"type":"bye"}"#);
    }

    #[test]
    fn test_offer_carries_sdp_field() {
        let msg = SignalingMessage::Offer {
            sdp: SessionDescription::new("v=0\r\n"),
        };
        let value: serde_json::Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(value, json!({"type": "offer", "sdp": "v=0\r\n"}));
    }

    #[test]
    fn test_decode_browser_candidate() {
        let text = r#"{"type":"candidate","candidate":{"candidate":"candidate:1 1 udp 2122260223 10.0.0.2 54321 typ host","sdpMid":"0","sdpMLineIndex":0}}"#;
        match SignalingMessage::decode(text).unwrap() {
            SignalingMessage::Candidate { candidate } => {
                assert_eq!(candidate.0["sdpMid"], "0");
            }
            other => panic!("Wrong variant: {:?}", other),
        }
    }

    #[test]
    fn test_decode_answer() {
        let msg = SignalingMessage::decode(r#"{"type":"answer","sdp":"answer-sdp"}"#).unwrap();
        assert_eq!(
            msg,
            SignalingMessage::Answer {
                sdp: SessionDescription::new("answer-sdp")
            }
        );
        assert_eq!(msg.kind(), MessageKind::Answer);
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let err = SignalingMessage::decode(r#"{"type":"renegotiate"}"#).unwrap_err();
        assert!(matches!(err, Error::UnknownMessageType(ref t) if t == "renegotiate"));
    }

    #[test]
    fn test_missing_type_is_malformed() {
        let err = SignalingMessage::decode(r#"{"sdp":"x"}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedMessage(_)));
    }

    #[test]
    fn test_offer_without_sdp_is_malformed() {
        let err = SignalingMessage::decode(r#"{"type":"offer"}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedMessage(_)));
    }

    #[test]
    fn test_not_json_is_malformed() {
        assert!(matches!(
            SignalingMessage::decode("hello").unwrap_err(),
            Error::MalformedMessage(_)
        ));
    }

    #[test]
    fn test_kind_tags_match_serde_tags() {
        for kind in MessageKind::ALL {
            assert_eq!(MessageKind::from_tag(kind.as_str()), Some(kind));
        }
        assert_eq!(SignalingMessage::JoinAck.kind().as_str(), "join_ack");
    }
}
