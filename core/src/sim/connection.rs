//! Simulated LE link

use super::dispatch::Dispatcher;
use crate::hci::{AddressWithType, DisconnectReason, ErrorCode};
use crate::manager::{ConnectionParameters, EnqueueFn, LeConnection, LinkEvent, LinkEventHandler};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info};

struct LinkState {
    handler: Option<Arc<dyn LinkEventHandler>>,
    dequeue_registered: bool,
    connected: bool,
    finished: bool,
    outbound_ready: bool,
    inbound: VecDeque<Vec<u8>>,
    waiting: VecDeque<EnqueueFn>,
    sent: Vec<Vec<u8>>,
    disconnect_requests: Vec<DisconnectReason>,
}

/// Driver-side view of one simulated link.
///
/// Every state change that produces a callback runs on the dispatch thread.
pub struct SimLink {
    peer: AddressWithType,
    echo: bool,
    dispatcher: Arc<Dispatcher>,
    state: Mutex<LinkState>,
}

impl SimLink {
    pub(crate) fn new(peer: AddressWithType, echo: bool, dispatcher: Arc<Dispatcher>) -> Arc<Self> {
        Arc::new(Self {
            peer,
            echo,
            dispatcher,
            state: Mutex::new(LinkState {
                handler: None,
                dequeue_registered: false,
                connected: true,
                finished: false,
                outbound_ready: true,
                inbound: VecDeque::new(),
                waiting: VecDeque::new(),
                sent: Vec::new(),
                disconnect_requests: Vec::new(),
            }),
        })
    }

    pub fn peer(&self) -> AddressWithType {
        self.peer
    }

    // ------------------------------------------------------------------------
    // Driver controls
    // ------------------------------------------------------------------------

    /// Queue an inbound packet and announce it
    pub fn deliver_inbound(self: &Arc<Self>, payload: Vec<u8>) {
        let link = Arc::clone(self);
        self.dispatcher.post(Box::new(move || {
            link.state.lock().inbound.push_back(payload);
            link.notify_data_ready();
        }));
    }

    /// Open or close the outbound queue. Closed queues hold enqueue requests
    /// until reopened.
    pub fn set_outbound_ready(self: &Arc<Self>, ready: bool) {
        let link = Arc::clone(self);
        self.dispatcher.post(Box::new(move || {
            link.state.lock().outbound_ready = ready;
            if ready {
                link.serve_outbound();
            }
        }));
    }

    /// Tear the link down as if the controller reported `reason`
    pub fn drop_link(self: &Arc<Self>, reason: ErrorCode) {
        let link = Arc::clone(self);
        self.dispatcher.post(Box::new(move || link.disconnected(reason)));
    }

    /// Report a connection parameter update
    pub fn update_parameters(self: &Arc<Self>, params: ConnectionParameters) {
        let link = Arc::clone(self);
        self.dispatcher.post(Box::new(move || {
            if let Some(handler) = link.state.lock().handler.clone() {
                handler.on_link_event(LinkEvent::ParametersUpdated(params));
            }
        }));
    }

    // ------------------------------------------------------------------------
    // Observations
    // ------------------------------------------------------------------------

    /// Payloads the outbound queue accepted, in order
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.state.lock().sent.clone()
    }

    /// Enqueue requests waiting for the queue to open
    pub fn waiting_sends(&self) -> usize {
        self.state.lock().waiting.len()
    }

    pub fn disconnect_requests(&self) -> Vec<DisconnectReason> {
        self.state.lock().disconnect_requests.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    pub fn is_finished(&self) -> bool {
        self.state.lock().finished
    }

    pub fn dequeue_registered(&self) -> bool {
        self.state.lock().dequeue_registered
    }

    // ------------------------------------------------------------------------
    // Dispatch-thread work
    // ------------------------------------------------------------------------

    fn notify_data_ready(&self) {
        let handler = {
            let state = self.state.lock();
            if !state.dequeue_registered || state.inbound.is_empty() {
                return;
            }
            state.handler.clone()
        };
        if let Some(handler) = handler {
            handler.on_link_event(LinkEvent::DataReady);
        }
    }

    fn serve_outbound(&self) {
        let mut echoed = 0;
        {
            let mut state = self.state.lock();
            while state.connected && state.outbound_ready {
                let Some(produce) = state.waiting.pop_front() else {
                    break;
                };
                // Runs under the lock so the payload is recorded before the
                // sender is woken
                let payload = produce();
                debug!("{}: sent {} bytes", self.peer, payload.len());
                if self.echo {
                    state.inbound.push_back(payload.clone());
                    echoed += 1;
                }
                state.sent.push(payload);
            }
        }
        for _ in 0..echoed {
            self.notify_data_ready();
        }
    }

    fn disconnected(&self, reason: ErrorCode) {
        let (handler, dropped) = {
            let mut state = self.state.lock();
            if !state.connected {
                return;
            }
            state.connected = false;
            let dropped = state.waiting.len();
            state.waiting.clear();
            (state.handler.clone(), dropped)
        };
        info!(
            "{}: link down ({}), {} pending sends dropped",
            self.peer, reason, dropped
        );
        if let Some(handler) = handler {
            handler.on_link_event(LinkEvent::Disconnected(reason));
        }
    }
}

/// The connection object handed to the connection manager's client
pub(crate) struct SimConnection {
    link: Arc<SimLink>,
}

impl SimConnection {
    pub(crate) fn new(link: Arc<SimLink>) -> Self {
        Self { link }
    }
}

impl LeConnection for SimConnection {
    fn peer(&self) -> AddressWithType {
        self.link.peer
    }

    fn register_link_handler(&self, handler: Arc<dyn LinkEventHandler>) {
        let backlog = {
            let mut state = self.link.state.lock();
            state.handler = Some(handler);
            state.dequeue_registered = true;
            state.inbound.len()
        };
        // Announce anything that arrived before registration
        if backlog > 0 {
            let link = Arc::clone(&self.link);
            self.link.dispatcher.post(Box::new(move || {
                for _ in 0..backlog {
                    link.notify_data_ready();
                }
            }));
        }
    }

    fn unregister_dequeue(&self) {
        self.link.state.lock().dequeue_registered = false;
    }

    fn try_dequeue(&self) -> Option<Vec<u8>> {
        self.link.state.lock().inbound.pop_front()
    }

    fn register_enqueue(&self, produce: EnqueueFn) {
        {
            let mut state = self.link.state.lock();
            if !state.connected {
                debug!("{}: enqueue on closed link dropped", self.link.peer);
                return;
            }
            state.waiting.push_back(produce);
        }
        let link = Arc::clone(&self.link);
        self.link.dispatcher.post(Box::new(move || link.serve_outbound()));
    }

    fn disconnect(&self, reason: DisconnectReason) {
        self.link.state.lock().disconnect_requests.push(reason);
        let link = Arc::clone(&self.link);
        self.link.dispatcher.post(Box::new(move || {
            link.disconnected(ErrorCode::CONNECTION_TERMINATED_BY_LOCAL_HOST)
        }));
    }

    fn finish(&self) {
        self.link.state.lock().finished = true;
    }
}
