//! HCI status codes and small parameter enums

use serde::{Deserialize, Serialize};
use std::fmt;

/// HCI status / error code
///
/// Controllers report arbitrary codes, so this is a transparent byte with
/// named constants for the values the facade cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorCode(pub u8);

impl ErrorCode {
    pub const SUCCESS: Self = Self(0x00);
    pub const UNKNOWN_CONNECTION: Self = Self(0x02);
    pub const PAGE_TIMEOUT: Self = Self(0x04);
    pub const AUTHENTICATION_FAILURE: Self = Self(0x05);
    pub const CONNECTION_TIMEOUT: Self = Self(0x08);
    pub const CONNECTION_LIMIT_EXCEEDED: Self = Self(0x09);
    pub const CONNECTION_ALREADY_EXISTS: Self = Self(0x0B);
    pub const COMMAND_DISALLOWED: Self = Self(0x0C);
    pub const CONNECTION_ACCEPT_TIMEOUT: Self = Self(0x10);
    pub const REMOTE_USER_TERMINATED_CONNECTION: Self = Self(0x13);
    pub const REMOTE_DEVICE_TERMINATED_CONNECTION_LOW_RESOURCES: Self = Self(0x14);
    pub const REMOTE_DEVICE_TERMINATED_CONNECTION_POWER_OFF: Self = Self(0x15);
    pub const CONNECTION_TERMINATED_BY_LOCAL_HOST: Self = Self(0x16);
    pub const UNSPECIFIED_ERROR: Self = Self(0x1F);
    pub const CONNECTION_FAILED_ESTABLISHMENT: Self = Self(0x3E);

    pub fn is_success(&self) -> bool {
        *self == Self::SUCCESS
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}", self.0)
    }
}

/// Reason carried by an HCI Disconnect command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DisconnectReason(pub u8);

impl DisconnectReason {
    pub const AUTHENTICATION_FAILURE: Self = Self(0x05);
    pub const REMOTE_USER_TERMINATED_CONNECTION: Self = Self(0x13);
    pub const REMOTE_DEVICE_TERMINATED_CONNECTION_LOW_RESOURCES: Self = Self(0x14);
    pub const REMOTE_DEVICE_TERMINATED_CONNECTION_POWER_OFF: Self = Self(0x15);
    pub const UNSUPPORTED_REMOTE_FEATURE: Self = Self(0x1A);
    pub const PAIRING_WITH_UNIT_KEY_NOT_SUPPORTED: Self = Self(0x29);
    pub const UNACCEPTABLE_CONNECTION_PARAMETERS: Self = Self(0x3B);
}

/// Reported disconnection codes are carried through unchanged.
impl From<ErrorCode> for DisconnectReason {
    fn from(code: ErrorCode) -> Self {
        Self(code.0)
    }
}

impl From<DisconnectReason> for ErrorCode {
    fn from(reason: DisconnectReason) -> Self {
        Self(reason.0)
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}", self.0)
    }
}

/// Link-layer role of the local device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Initiator of the connection ("master" in older core versions)
    Central = 0x00,
    Peripheral = 0x01,
}

impl Role {
    pub fn value(&self) -> u8 {
        *self as u8
    }

    pub fn from_value(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Central),
            0x01 => Some(Self::Peripheral),
            _ => None,
        }
    }
}

/// Sleep clock accuracy of the central
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClockAccuracy {
    Ppm500 = 0x00,
    Ppm250 = 0x01,
    Ppm150 = 0x02,
    Ppm100 = 0x03,
    Ppm75 = 0x04,
    Ppm50 = 0x05,
    Ppm30 = 0x06,
    Ppm20 = 0x07,
}

impl ClockAccuracy {
    pub fn value(&self) -> u8 {
        *self as u8
    }

    pub fn from_value(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Ppm500),
            0x01 => Some(Self::Ppm250),
            0x02 => Some(Self::Ppm150),
            0x03 => Some(Self::Ppm100),
            0x04 => Some(Self::Ppm75),
            0x05 => Some(Self::Ppm50),
            0x06 => Some(Self::Ppm30),
            0x07 => Some(Self::Ppm20),
            _ => None,
        }
    }
}
