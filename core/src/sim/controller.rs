//! Simulated LE connection manager
//!
//! Stands in for a controller-side stack: outcomes, link events, and outbound
//! queue service all run serially on one dispatch thread. A driver (test or
//! CLI) decides when attempts succeed or fail and what arrives on each link.

use super::connection::{SimConnection, SimLink};
use super::dispatch::{Dispatcher, SimError};
use crate::hci::{AddressWithType, ErrorCode};
use crate::manager::{ConnectOutcome, ConnectOutcomeHandler, ConnectionManager};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Behavior switches for the simulated controller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimOptions {
    /// Complete every connection attempt as soon as it is initiated
    pub auto_connect: bool,
    /// Loop every sent payload back as inbound data on the same link
    pub echo: bool,
}

struct ControllerState {
    handler: Option<Arc<dyn ConnectOutcomeHandler>>,
    pending: VecDeque<AddressWithType>,
    initiated: Vec<AddressWithType>,
    cancelled: Vec<AddressWithType>,
    links: Vec<Arc<SimLink>>,
}

pub struct SimulatedController {
    options: SimOptions,
    dispatcher: Arc<Dispatcher>,
    state: Arc<Mutex<ControllerState>>,
}

impl SimulatedController {
    /// Start the controller and its dispatch thread
    pub fn new(options: SimOptions) -> Result<Self, SimError> {
        let dispatcher = Arc::new(Dispatcher::start("le-sim-dispatch")?);
        info!(
            "Simulated controller up (auto_connect: {}, echo: {})",
            options.auto_connect, options.echo
        );
        Ok(Self {
            options,
            dispatcher,
            state: Arc::new(Mutex::new(ControllerState {
                handler: None,
                pending: VecDeque::new(),
                initiated: Vec::new(),
                cancelled: Vec::new(),
                links: Vec::new(),
            })),
        })
    }

    pub fn options(&self) -> SimOptions {
        self.options
    }

    // ------------------------------------------------------------------------
    // Driver controls
    // ------------------------------------------------------------------------

    /// Succeed the oldest outstanding attempt
    pub fn complete_pending(&self) -> Option<Arc<SimLink>> {
        let peer = self.state.lock().pending.pop_front()?;
        Some(self.establish(peer))
    }

    /// Fail the oldest outstanding attempt with `reason`
    pub fn fail_pending(&self, reason: ErrorCode) -> Option<AddressWithType> {
        let peer = self.state.lock().pending.pop_front()?;
        self.report_failure(peer, reason);
        Some(peer)
    }

    /// A remote peer connects to us
    pub fn accept_incoming(&self, peer: AddressWithType) -> Arc<SimLink> {
        self.establish(peer)
    }

    /// An incoming connection fails during establishment
    pub fn fail_incoming(&self, peer: AddressWithType, reason: ErrorCode) {
        self.report_failure(peer, reason);
    }

    /// Wait until every job queued so far has run
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.dispatcher.post(Box::new(move || {
            let _ = tx.send(());
        })) {
            let _ = rx.await;
        }
    }

    /// Stop the dispatch thread after draining queued work
    pub fn shutdown(&self) {
        self.dispatcher.stop();
    }

    // ------------------------------------------------------------------------
    // Observations
    // ------------------------------------------------------------------------

    /// Peers passed to `initiate_connection`, in order
    pub fn initiated(&self) -> Vec<AddressWithType> {
        self.state.lock().initiated.clone()
    }

    /// Peers passed to `cancel_connection`, in order
    pub fn cancelled(&self) -> Vec<AddressWithType> {
        self.state.lock().cancelled.clone()
    }

    /// Attempts initiated but not yet resolved
    pub fn pending(&self) -> Vec<AddressWithType> {
        self.state.lock().pending.iter().copied().collect()
    }

    /// Every link established so far, oldest first
    pub fn links(&self) -> Vec<Arc<SimLink>> {
        self.state.lock().links.clone()
    }

    pub fn has_callbacks(&self) -> bool {
        self.state.lock().handler.is_some()
    }

    fn establish(&self, peer: AddressWithType) -> Arc<SimLink> {
        let link = SimLink::new(peer, self.options.echo, Arc::clone(&self.dispatcher));
        self.state.lock().links.push(Arc::clone(&link));

        let state = Arc::clone(&self.state);
        let connection = SimConnection::new(Arc::clone(&link));
        self.dispatcher.post(Box::new(move || {
            let handler = state.lock().handler.clone();
            match handler {
                Some(handler) => handler.on_connect_outcome(ConnectOutcome::Success {
                    peer,
                    connection: Box::new(connection),
                }),
                None => warn!("No callbacks registered, dropping connection to {}", peer),
            }
        }));
        link
    }

    fn report_failure(&self, peer: AddressWithType, reason: ErrorCode) {
        let state = Arc::clone(&self.state);
        self.dispatcher.post(Box::new(move || {
            let handler = state.lock().handler.clone();
            match handler {
                Some(handler) => handler.on_connect_outcome(ConnectOutcome::Failure { peer, reason }),
                None => warn!("No callbacks registered, dropping failure for {}", peer),
            }
        }));
    }
}

impl ConnectionManager for SimulatedController {
    fn register_callbacks(&self, handler: Arc<dyn ConnectOutcomeHandler>) {
        self.state.lock().handler = Some(handler);
        debug!("Connection callbacks registered");
    }

    fn unregister_callbacks(&self) {
        self.state.lock().handler = None;
        debug!("Connection callbacks unregistered");
    }

    fn initiate_connection(&self, peer: AddressWithType) {
        {
            let mut state = self.state.lock();
            state.initiated.push(peer);
            if !self.options.auto_connect {
                state.pending.push_back(peer);
            }
        }
        debug!("Connecting to {}", peer);
        if self.options.auto_connect {
            self.establish(peer);
        }
    }

    fn cancel_connection(&self, peer: AddressWithType) {
        let mut state = self.state.lock();
        state.cancelled.push(peer);
        if let Some(index) = state.pending.iter().position(|p| *p == peer) {
            state.pending.remove(index);
        }
        debug!("Cancelled connection to {}", peer);
    }
}

impl Drop for SimulatedController {
    fn drop(&mut self) {
        self.dispatcher.stop();
    }
}
