//! Builders and parsers for synthesized HCI packets
//!
//! The facade reports link outcomes to drivers as raw controller packets:
//! an LE Connection Complete event when an attempt resolves, and a Disconnect
//! command carrying the handle and reason when a link goes away.

use super::address::{Address, AddressType};
use super::codes::{ClockAccuracy, DisconnectReason, ErrorCode, Role};
use thiserror::Error;

/// HCI event code for LE meta events
pub const LE_META_EVENT: u8 = 0x3E;

/// LE meta subevent code for connection complete
pub const LE_CONNECTION_COMPLETE_SUBEVENT: u8 = 0x01;

/// Opcode of the Disconnect command (OGF 0x01, OCF 0x0006)
pub const DISCONNECT_OPCODE: u16 = 0x0406;

/// Connection handles occupy the low 12 bits
pub const HANDLE_MASK: u16 = 0x0FFF;

/// Errors for packet decoding
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("Packet too short: expected {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },
    #[error("Unexpected event code: 0x{0:02x}")]
    UnexpectedEvent(u8),
    #[error("Unexpected subevent code: 0x{0:02x}")]
    UnexpectedSubevent(u8),
    #[error("Unexpected opcode: 0x{0:04x}")]
    UnexpectedOpcode(u16),
    #[error("Parameter length mismatch: header says {header}, body has {body}")]
    LengthMismatch { header: usize, body: usize },
    #[error("Invalid field {field}: 0x{value:02x}")]
    InvalidField { field: &'static str, value: u8 },
}

/// LE Connection Complete event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeConnectionComplete {
    pub status: ErrorCode,
    pub connection_handle: u16,
    pub role: Role,
    pub peer_address_type: AddressType,
    pub peer_address: Address,
    pub conn_interval: u16,
    pub conn_latency: u16,
    pub supervision_timeout: u16,
    pub clock_accuracy: ClockAccuracy,
}

impl LeConnectionComplete {
    /// Parameter length (subevent code included)
    pub const PARAMETER_LENGTH: usize = 19;

    /// Event header: event code + parameter length
    const HEADER_SIZE: usize = 2;

    /// Total encoded size
    pub const SIZE: usize = Self::HEADER_SIZE + Self::PARAMETER_LENGTH;

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::SIZE);
        bytes.push(LE_META_EVENT);
        bytes.push(Self::PARAMETER_LENGTH as u8);
        bytes.push(LE_CONNECTION_COMPLETE_SUBEVENT);
        bytes.push(self.status.0);
        bytes.extend_from_slice(&(self.connection_handle & HANDLE_MASK).to_le_bytes());
        bytes.push(self.role.value());
        bytes.push(self.peer_address_type.value());
        bytes.extend_from_slice(&self.peer_address.to_le_bytes());
        bytes.extend_from_slice(&self.conn_interval.to_le_bytes());
        bytes.extend_from_slice(&self.conn_latency.to_le_bytes());
        bytes.extend_from_slice(&self.supervision_timeout.to_le_bytes());
        bytes.push(self.clock_accuracy.value());
        bytes
    }

    /// Deserialize from bytes
    pub fn parse(bytes: &[u8]) -> Result<Self, PacketError> {
        if bytes.len() < Self::SIZE {
            return Err(PacketError::TooShort {
                expected: Self::SIZE,
                actual: bytes.len(),
            });
        }
        if bytes[0] != LE_META_EVENT {
            return Err(PacketError::UnexpectedEvent(bytes[0]));
        }
        let header_len = bytes[1] as usize;
        let body_len = bytes.len() - Self::HEADER_SIZE;
        if header_len != Self::PARAMETER_LENGTH || body_len != header_len {
            return Err(PacketError::LengthMismatch {
                header: header_len,
                body: body_len,
            });
        }
        if bytes[2] != LE_CONNECTION_COMPLETE_SUBEVENT {
            return Err(PacketError::UnexpectedSubevent(bytes[2]));
        }

        let role = Role::from_value(bytes[6]).ok_or(PacketError::InvalidField {
            field: "role",
            value: bytes[6],
        })?;
        let peer_address_type =
            AddressType::try_from(bytes[7] as u32).map_err(|_| PacketError::InvalidField {
                field: "peer_address_type",
                value: bytes[7],
            })?;
        let mut addr = [0u8; 6];
        addr.copy_from_slice(&bytes[8..14]);
        let clock_accuracy =
            ClockAccuracy::from_value(bytes[20]).ok_or(PacketError::InvalidField {
                field: "clock_accuracy",
                value: bytes[20],
            })?;

        Ok(Self {
            status: ErrorCode(bytes[3]),
            connection_handle: u16::from_le_bytes([bytes[4], bytes[5]]) & HANDLE_MASK,
            role,
            peer_address_type,
            peer_address: Address::from_le_bytes(addr),
            conn_interval: u16::from_le_bytes([bytes[14], bytes[15]]),
            conn_latency: u16::from_le_bytes([bytes[16], bytes[17]]),
            supervision_timeout: u16::from_le_bytes([bytes[18], bytes[19]]),
            clock_accuracy,
        })
    }
}

/// Disconnect command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disconnect {
    pub connection_handle: u16,
    pub reason: DisconnectReason,
}

impl Disconnect {
    pub const PARAMETER_LENGTH: usize = 3;

    /// Command header: opcode + parameter length
    const HEADER_SIZE: usize = 3;

    pub const SIZE: usize = Self::HEADER_SIZE + Self::PARAMETER_LENGTH;

    pub fn new(connection_handle: u16, reason: DisconnectReason) -> Self {
        Self {
            connection_handle,
            reason,
        }
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::SIZE);
        bytes.extend_from_slice(&DISCONNECT_OPCODE.to_le_bytes());
        bytes.push(Self::PARAMETER_LENGTH as u8);
        bytes.extend_from_slice(&(self.connection_handle & HANDLE_MASK).to_le_bytes());
        bytes.push(self.reason.0);
        bytes
    }

    /// Deserialize from bytes
    pub fn parse(bytes: &[u8]) -> Result<Self, PacketError> {
        if bytes.len() < Self::SIZE {
            return Err(PacketError::TooShort {
                expected: Self::SIZE,
                actual: bytes.len(),
            });
        }
        let opcode = u16::from_le_bytes([bytes[0], bytes[1]]);
        if opcode != DISCONNECT_OPCODE {
            return Err(PacketError::UnexpectedOpcode(opcode));
        }
        let header_len = bytes[2] as usize;
        let body_len = bytes.len() - Self::HEADER_SIZE;
        if header_len != Self::PARAMETER_LENGTH || body_len != header_len {
            return Err(PacketError::LengthMismatch {
                header: header_len,
                body: body_len,
            });
        }

        Ok(Self {
            connection_handle: u16::from_le_bytes([bytes[3], bytes[4]]) & HANDLE_MASK,
            reason: DisconnectReason(bytes[5]),
        })
    }
}
