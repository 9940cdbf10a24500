//! Bluetooth device addresses
//!
//! Addresses are written most-significant byte first (`AA:BB:CC:DD:EE:FF`)
//! and stored least-significant byte first, the order they take on the wire.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors for address parsing
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("Malformed address: {0}")]
    Malformed(String),
    #[error("Unknown address type: {0}")]
    UnknownType(u32),
}

/// A 48-bit Bluetooth device address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Address {
    /// Little-endian bytes: `bytes[0]` is the last octet of the text form
    bytes: [u8; 6],
}

impl Address {
    /// Number of octets in an address
    pub const LENGTH: usize = 6;

    /// Build from wire-order (least significant first) bytes
    pub fn from_le_bytes(bytes: [u8; 6]) -> Self {
        Self { bytes }
    }

    /// Wire-order bytes
    pub fn to_le_bytes(&self) -> [u8; 6] {
        self.bytes
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let octets: Vec<&str> = s.split(':').collect();
        if octets.len() != Self::LENGTH {
            return Err(AddressError::Malformed(s.to_string()));
        }

        let mut bytes = [0u8; 6];
        for (i, octet) in octets.iter().enumerate() {
            if octet.len() != 2 {
                return Err(AddressError::Malformed(s.to_string()));
            }
            let value =
                u8::from_str_radix(octet, 16).map_err(|_| AddressError::Malformed(s.to_string()))?;
            bytes[Self::LENGTH - 1 - i] = value;
        }

        Ok(Self { bytes })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.bytes;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[5], b[4], b[3], b[2], b[1], b[0]
        )
    }
}

/// LE address type as carried in HCI parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressType {
    PublicDeviceAddress = 0x00,
    RandomDeviceAddress = 0x01,
    PublicIdentityAddress = 0x02,
    RandomIdentityAddress = 0x03,
}

impl AddressType {
    /// Numeric value on the wire
    pub fn value(&self) -> u8 {
        *self as u8
    }
}

impl TryFrom<u32> for AddressType {
    type Error = AddressError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Self::PublicDeviceAddress),
            0x01 => Ok(Self::RandomDeviceAddress),
            0x02 => Ok(Self::PublicIdentityAddress),
            0x03 => Ok(Self::RandomIdentityAddress),
            other => Err(AddressError::UnknownType(other)),
        }
    }
}

impl fmt::Display for AddressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PublicDeviceAddress => write!(f, "public"),
            Self::RandomDeviceAddress => write!(f, "random"),
            Self::PublicIdentityAddress => write!(f, "public-identity"),
            Self::RandomIdentityAddress => write!(f, "random-identity"),
        }
    }
}

/// Peer identity: address plus address type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AddressWithType {
    pub address: Address,
    pub address_type: AddressType,
}

impl AddressWithType {
    pub fn new(address: Address, address_type: AddressType) -> Self {
        Self {
            address,
            address_type,
        }
    }

    /// Parse the pair the way RPC requests carry it
    pub fn parse(address: &str, address_type: u32) -> Result<Self, AddressError> {
        Ok(Self {
            address: address.parse()?,
            address_type: AddressType::try_from(address_type)?,
        })
    }
}

impl fmt::Display for AddressWithType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.address, self.address_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stores_little_endian() {
        let addr: Address = "AA:BB:CC:DD:EE:FF".parse().expect("valid address");
        assert_eq!(addr.to_le_bytes(), [0xFF, 0xEE, 0xDD, 0xCC, 0xBB, 0xAA]);
    }

    #[test]
    fn test_display_matches_input() {
        let addr: Address = "01:23:45:67:89:ab".parse().expect("valid address");
        assert_eq!(addr.to_string(), "01:23:45:67:89:AB");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("AA:BB:CC:DD:EE".parse::<Address>().is_err());
        assert!("AA:BB:CC:DD:EE:FF:00".parse::<Address>().is_err());
        assert!("AA:BB:CC:DD:EE:GG".parse::<Address>().is_err());
        assert!("AAA:BB:CC:DD:EE:F".parse::<Address>().is_err());
        assert!("".parse::<Address>().is_err());
    }

    #[test]
    fn test_address_type_conversion() {
        assert_eq!(
            AddressType::try_from(0).expect("public"),
            AddressType::PublicDeviceAddress
        );
        assert_eq!(
            AddressType::try_from(3).expect("random identity"),
            AddressType::RandomIdentityAddress
        );
        assert_eq!(
            AddressType::try_from(4),
            Err(AddressError::UnknownType(4))
        );
    }

    #[test]
    fn test_address_with_type_parse() {
        let peer = AddressWithType::parse("AA:BB:CC:DD:EE:FF", 1).expect("valid peer");
        assert_eq!(peer.address_type, AddressType::RandomDeviceAddress);
        assert_eq!(peer.to_string(), "[AA:BB:CC:DD:EE:FF, random]");
    }
}
