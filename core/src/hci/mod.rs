//! HCI-level vocabulary shared by the facade
//!
//! This module provides the small slice of the Host Controller Interface that
//! the facade needs to talk about LE links:
//!
//! - **address**: device addresses and their LE address types
//! - **codes**: status/error codes, disconnect reasons, roles, clock accuracy
//! - **packets**: builders and parsers for the packets the facade synthesizes
//!
//! Everything is encoded little-endian, without the H4 packet-type prefix.

pub mod address;
pub mod codes;
pub mod packets;

pub use address::{Address, AddressError, AddressType, AddressWithType};
pub use codes::{ClockAccuracy, DisconnectReason, ErrorCode, Role};
pub use packets::{Disconnect, LeConnectionComplete, PacketError, LE_META_EVENT};
