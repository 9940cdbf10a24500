// LE ACL Manager Facade
//
// Lets a remote test driver command and observe LE ACL connections:
// requests in, connection manager calls out, callbacks back as ordered
// event streams.

pub mod channel;
pub mod config;
pub mod facade;
pub mod hci;
pub mod manager;
pub mod rpc;
pub mod sim;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use channel::{ChannelError, EventChannel, EventListener};
pub use config::FacadeConfig;
pub use facade::{
    to_handle, AclDataStream, ConnectionEventStream, FacadeError, FacadeStatus, LeAclFacade,
    FAILED_CONNECTION_HANDLE, HANDLE_OFFSET, HANDLE_SPACE,
};
pub use hci::{
    Address, AddressError, AddressType, AddressWithType, ClockAccuracy, Disconnect,
    DisconnectReason, ErrorCode, LeConnectionComplete, PacketError, Role,
};
pub use manager::{
    ConnectOutcome, ConnectOutcomeHandler, ConnectionManager, ConnectionParameters, EnqueueFn,
    LeConnection, LinkEvent, LinkEventHandler,
};
pub use rpc::{
    DecodedEvent, LeAclData, LeConnectionEvent, LeConnectionMsg, LeHandleMsg, StatusCode,
};
pub use sim::{SimError, SimLink, SimOptions, SimulatedController};

/// Crate version, reported by status endpoints
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
