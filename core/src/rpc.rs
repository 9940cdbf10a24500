//! RPC message and status types
//!
//! Transport-agnostic shapes of the facade's requests, responses, and stream
//! items. Byte fields serialize as lowercase hex strings.

use crate::hci::{Disconnect, LeConnectionComplete, PacketError, LE_META_EVENT};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Request to connect to a peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeConnectionMsg {
    /// `AA:BB:CC:DD:EE:FF`
    pub address: String,
    pub address_type: u32,
}

/// Request naming a connection handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeHandleMsg {
    pub handle: u16,
}

/// ACL payload tagged with its connection handle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeAclData {
    pub handle: u16,
    #[serde(with = "hex_bytes")]
    pub payload: Vec<u8>,
}

/// One item of a connection request stream: a serialized HCI packet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeConnectionEvent {
    #[serde(with = "hex_bytes")]
    pub event: Vec<u8>,
}

/// Decoded form of a [`LeConnectionEvent`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedEvent {
    ConnectionComplete(LeConnectionComplete),
    Disconnect(Disconnect),
}

impl LeConnectionEvent {
    pub fn new(event: Vec<u8>) -> Self {
        Self { event }
    }

    /// Decode the carried packet
    pub fn decode(&self) -> Result<DecodedEvent, PacketError> {
        match self.event.first() {
            Some(&LE_META_EVENT) => {
                LeConnectionComplete::parse(&self.event).map(DecodedEvent::ConnectionComplete)
            }
            _ => Disconnect::parse(&self.event).map(DecodedEvent::Disconnect),
        }
    }
}

/// RPC status codes surfaced to drivers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    Ok,
    InvalidArgument,
    ResourceExhausted,
    Aborted,
    Internal,
    Unavailable,
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusCode::Ok => write!(f, "OK"),
            StatusCode::InvalidArgument => write!(f, "INVALID_ARGUMENT"),
            StatusCode::ResourceExhausted => write!(f, "RESOURCE_EXHAUSTED"),
            StatusCode::Aborted => write!(f, "ABORTED"),
            StatusCode::Internal => write!(f, "INTERNAL"),
            StatusCode::Unavailable => write!(f, "UNAVAILABLE"),
        }
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        hex::decode(text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hci::{ClockAccuracy, DisconnectReason, ErrorCode, Role};

    #[test]
    fn test_acl_data_json_uses_hex() {
        let data = LeAclData {
            handle: 0x10,
            payload: vec![0xde, 0xad, 0xbe, 0xef],
        };
        let json = serde_json::to_string(&data).expect("serialize");
        assert_eq!(json, r#"{"handle":16,"payload":"deadbeef"}"#);

        let back: LeAclData = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, data);
    }

    #[test]
    fn test_acl_data_rejects_bad_hex() {
        let result = serde_json::from_str::<LeAclData>(r#"{"handle":16,"payload":"xyz"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_connection_complete() {
        let packet = LeConnectionComplete {
            status: ErrorCode::PAGE_TIMEOUT,
            connection_handle: 0,
            role: Role::Central,
            peer_address_type: crate::hci::AddressType::RandomDeviceAddress,
            peer_address: "01:02:03:04:05:06".parse().expect("address"),
            conn_interval: 0,
            conn_latency: 0,
            supervision_timeout: 0,
            clock_accuracy: ClockAccuracy::Ppm20,
        };
        let event = LeConnectionEvent::new(packet.to_bytes());
        assert_eq!(
            event.decode().expect("decode"),
            DecodedEvent::ConnectionComplete(packet)
        );
    }

    #[test]
    fn test_decode_disconnect() {
        let packet = Disconnect::new(0x12, DisconnectReason(0x16));
        let event = LeConnectionEvent::new(packet.to_bytes());
        assert_eq!(event.decode().expect("decode"), DecodedEvent::Disconnect(packet));
    }

    #[test]
    fn test_status_display() {
        assert_eq!(StatusCode::ResourceExhausted.to_string(), "RESOURCE_EXHAUSTED");
        let json = serde_json::to_string(&StatusCode::InvalidArgument).expect("serialize");
        assert_eq!(json, r#""INVALID_ARGUMENT""#);
    }
}
