//! Callback roles registered with the connection manager
//!
//! The manager and each connection hold these relays; the relays hold only a
//! weak reference back to the facade state, so a facade that has been dropped
//! simply stops reacting.

use super::service::Shared;
use crate::manager::{ConnectOutcome, ConnectOutcomeHandler, LeConnection, LinkEvent, LinkEventHandler};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Forwards connection outcomes to the facade
pub(crate) struct OutcomeRelay {
    shared: Weak<Shared>,
}

impl OutcomeRelay {
    pub(crate) fn new(shared: Weak<Shared>) -> Self {
        Self { shared }
    }
}

impl ConnectOutcomeHandler for OutcomeRelay {
    fn on_connect_outcome(&self, outcome: ConnectOutcome) {
        match self.shared.upgrade() {
            Some(shared) => shared.on_connect_outcome(outcome),
            None => debug!("Facade gone, dropping outcome {:?}", outcome),
        }
    }
}

/// Forwards one link's events to the facade, tagged with its handle and
/// originating request
pub(crate) struct LinkRelay {
    shared: Weak<Shared>,
    connection: Weak<dyn LeConnection>,
    handle: u16,
    seq: u32,
    disconnected: AtomicBool,
}

impl LinkRelay {
    pub(crate) fn new(
        shared: Weak<Shared>,
        connection: Weak<dyn LeConnection>,
        handle: u16,
        seq: u32,
    ) -> Self {
        Self {
            shared,
            connection,
            handle,
            seq,
            disconnected: AtomicBool::new(false),
        }
    }

    fn targets(&self) -> Option<(Arc<Shared>, Arc<dyn LeConnection>)> {
        Some((self.shared.upgrade()?, self.connection.upgrade()?))
    }
}

impl LinkEventHandler for LinkRelay {
    fn on_link_event(&self, event: LinkEvent) {
        match event {
            LinkEvent::DataReady => {
                if self.disconnected.load(Ordering::Acquire) {
                    debug!("Handle 0x{:03x}: data after disconnection ignored", self.handle);
                    return;
                }
                if let Some((shared, connection)) = self.targets() {
                    shared.on_incoming_acl(&connection, self.handle);
                }
            }
            LinkEvent::Disconnected(code) => {
                if self.disconnected.swap(true, Ordering::AcqRel) {
                    debug!("Handle 0x{:03x}: repeated disconnection ignored", self.handle);
                    return;
                }
                if let Some((shared, connection)) = self.targets() {
                    shared.on_disconnect(connection, self.handle, self.seq, code);
                }
            }
            LinkEvent::ParametersUpdated(params) => {
                debug!(
                    "Handle 0x{:03x}: interval: 0x{:x}, latency: 0x{:x}, timeout 0x{:x}",
                    self.handle, params.interval, params.latency, params.supervision_timeout
                );
            }
        }
    }
}
