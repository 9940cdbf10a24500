//! Connection manager interface
//!
//! The facade drives an LE connection manager it does not own. This module
//! defines the seam: what the facade calls on the manager and on individual
//! connections, and the two callback roles the manager calls back into.
//! Callbacks are delivered on the manager's dispatch thread, one at a time.

use crate::hci::{AddressWithType, DisconnectReason, ErrorCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

/// Produces the outbound payload once the queue can take it.
///
/// Invoked at most once, on the dispatch thread. Dropping it without
/// invoking it means the queue went away.
pub type EnqueueFn = Box<dyn FnOnce() -> Vec<u8> + Send>;

/// Link parameters reported by a connection update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParameters {
    /// Connection interval in 1.25 ms units
    pub interval: u16,
    /// Peripheral latency in connection events
    pub latency: u16,
    /// Supervision timeout in 10 ms units
    pub supervision_timeout: u16,
}

impl Default for ConnectionParameters {
    fn default() -> Self {
        Self {
            interval: 1,
            latency: 2,
            supervision_timeout: 3,
        }
    }
}

/// Result of a connection attempt
pub enum ConnectOutcome {
    Success {
        peer: AddressWithType,
        connection: Box<dyn LeConnection>,
    },
    Failure {
        peer: AddressWithType,
        reason: ErrorCode,
    },
}

impl ConnectOutcome {
    pub fn peer(&self) -> AddressWithType {
        match self {
            Self::Success { peer, .. } | Self::Failure { peer, .. } => *peer,
        }
    }
}

impl fmt::Debug for ConnectOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success { peer, .. } => write!(f, "Success {{ peer: {} }}", peer),
            Self::Failure { peer, reason } => {
                write!(f, "Failure {{ peer: {}, reason: {} }}", peer, reason)
            }
        }
    }
}

/// Events reported on an established link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// At least one inbound packet can be dequeued
    DataReady,
    /// The link is gone; delivered once
    Disconnected(ErrorCode),
    /// Link parameters changed
    ParametersUpdated(ConnectionParameters),
}

/// Receives connection attempt outcomes
pub trait ConnectOutcomeHandler: Send + Sync {
    fn on_connect_outcome(&self, outcome: ConnectOutcome);
}

/// Receives per-link events
pub trait LinkEventHandler: Send + Sync {
    fn on_link_event(&self, event: LinkEvent);
}

/// The LE connection manager
#[cfg_attr(test, automock)]
pub trait ConnectionManager: Send + Sync {
    /// Route all connection outcomes to `handler`
    fn register_callbacks(&self, handler: Arc<dyn ConnectOutcomeHandler>);

    /// Stop delivering connection outcomes
    fn unregister_callbacks(&self);

    /// Begin connecting to `peer`; the outcome arrives later via the handler
    fn initiate_connection(&self, peer: AddressWithType);

    /// Abandon a connection attempt started with `initiate_connection`
    fn cancel_connection(&self, peer: AddressWithType);
}

/// One established LE ACL link
pub trait LeConnection: Send + Sync {
    fn peer(&self) -> AddressWithType;

    /// Route this link's events to `handler`
    fn register_link_handler(&self, handler: Arc<dyn LinkEventHandler>);

    /// Stop `DataReady` notifications
    fn unregister_dequeue(&self);

    /// Take the oldest inbound packet
    fn try_dequeue(&self) -> Option<Vec<u8>>;

    /// Ask the outbound queue for one payload when it has room
    fn register_enqueue(&self, produce: EnqueueFn);

    fn disconnect(&self, reason: DisconnectReason);

    /// Release link resources after disconnection
    fn finish(&self);
}
