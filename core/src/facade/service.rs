//! LE ACL facade service
//!
//! Receives driver RPCs, keeps the handle -> connection registry, and relays
//! connection manager callbacks into per-request streams and the shared
//! inbound data stream.

use super::error::FacadeError;
use super::handle::{to_handle, FAILED_CONNECTION_HANDLE};
use super::registry::ConnectionRegistry;
use super::relay::{LinkRelay, OutcomeRelay};
use super::request_log::{Release, RequestKind, RequestLog};
use crate::channel::{EventChannel, EventListener};
use crate::config::FacadeConfig;
use crate::hci::{
    AddressWithType, Disconnect, DisconnectReason, ErrorCode, LeConnectionComplete, Role,
};
use crate::manager::{ConnectOutcome, ConnectionManager, ConnectionParameters, LeConnection};
use crate::rpc::{LeAclData, LeConnectionEvent, LeConnectionMsg, LeHandleMsg};
use futures::Stream;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Stream of inbound payloads from every open connection
pub type AclDataStream = EventListener<LeAclData>;

/// Point-in-time view of the facade
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacadeStatus {
    /// Sequence number of the next connection outcome
    pub sequence: u32,
    /// Handle the next outcome will be assigned
    pub next_handle: u16,
    /// Whether a request is awaiting its outcome
    pub request_pending: bool,
    /// Handles with a live connection
    pub open_handles: Vec<u16>,
    /// Request slots still held, including connected ones
    pub tracked_requests: usize,
}

/// State shared between RPC callers and the dispatch thread
pub(crate) struct Shared {
    config: FacadeConfig,
    registry: ConnectionRegistry,
    requests: Mutex<RequestLog>,
    acl_data: Arc<EventChannel<LeAclData>>,
}

impl Shared {
    pub(crate) fn on_connect_outcome(self: &Arc<Self>, outcome: ConnectOutcome) {
        debug!("Connection outcome for {}", outcome.peer());
        match outcome {
            ConnectOutcome::Success { peer, connection } => {
                self.on_connect_success(peer, Arc::from(connection))
            }
            ConnectOutcome::Failure { peer, reason } => self.on_connect_fail(peer, reason),
        }
    }

    fn on_connect_success(self: &Arc<Self>, peer: AddressWithType, connection: Arc<dyn LeConnection>) {
        let mut requests = self.requests.lock();
        let slot = match requests.outcome_slot(&peer) {
            Ok(Some(slot)) => slot,
            Ok(None) => {
                drop(requests);
                info!("Dropping connection to {}: no request is waiting for it", peer);
                connection.disconnect(DisconnectReason::REMOTE_USER_TERMINATED_CONNECTION);
                return;
            }
            Err(e) => {
                requests.skip();
                drop(requests);
                warn!("Cannot track connection to {}: {}", peer, e);
                connection.disconnect(DisconnectReason::REMOTE_DEVICE_TERMINATED_CONNECTION_LOW_RESOURCES);
                return;
            }
        };

        let relay = LinkRelay::new(
            Arc::downgrade(self),
            Arc::downgrade(&connection),
            slot.handle,
            slot.seq,
        );
        if self.registry.insert(slot.handle, Arc::clone(&connection)).is_some() {
            warn!("Handle 0x{:03x} replaced a live entry", slot.handle);
        }
        connection.register_link_handler(Arc::new(relay));

        let params = self.config.reported_parameters;
        let complete = LeConnectionComplete {
            status: ErrorCode::SUCCESS,
            connection_handle: slot.handle,
            role: Role::Central,
            peer_address_type: peer.address_type,
            peer_address: peer.address,
            conn_interval: params.interval,
            conn_latency: params.latency,
            supervision_timeout: params.supervision_timeout,
            clock_accuracy: self.config.clock_accuracy,
        };
        requests.complete_outcome(&slot, LeConnectionEvent::new(complete.to_bytes()), true);

        info!(
            "Connected to {} as handle 0x{:03x} (request {}, {:?})",
            peer, slot.handle, slot.seq, slot.kind
        );
    }

    fn on_connect_fail(&self, peer: AddressWithType, reason: ErrorCode) {
        let mut requests = self.requests.lock();
        if requests.take_abandoned(&peer) {
            return;
        }
        if !requests.has_pending() {
            warn!("Unsolicited connection failure for {}: {}", peer, reason);
            requests.skip();
            return;
        }

        let slot = match requests.outcome_slot(&peer) {
            Ok(Some(slot)) => slot,
            Ok(None) => {
                warn!("Ignoring connection failure for {}: {}", peer, reason);
                return;
            }
            Err(e) => {
                warn!("No slot for failed connection to {}: {}", peer, e);
                requests.skip();
                return;
            }
        };
        let params = ConnectionParameters {
            interval: 0,
            latency: 0,
            supervision_timeout: 0,
        };
        let complete = LeConnectionComplete {
            status: reason,
            connection_handle: FAILED_CONNECTION_HANDLE,
            role: Role::Central,
            peer_address_type: peer.address_type,
            peer_address: peer.address,
            conn_interval: params.interval,
            conn_latency: params.latency,
            supervision_timeout: params.supervision_timeout,
            clock_accuracy: self.config.clock_accuracy,
        };
        requests.complete_outcome(&slot, LeConnectionEvent::new(complete.to_bytes()), false);

        info!("Connection to {} failed: {} (request {})", peer, reason, slot.seq);
    }

    pub(crate) fn on_incoming_acl(&self, connection: &Arc<dyn LeConnection>, handle: u16) {
        let Some(payload) = connection.try_dequeue() else {
            debug!("Handle 0x{:03x}: data ready but queue empty", handle);
            return;
        };
        self.acl_data.push(LeAclData { handle, payload });
    }

    pub(crate) fn on_disconnect(
        &self,
        connection: Arc<dyn LeConnection>,
        handle: u16,
        seq: u32,
        code: ErrorCode,
    ) {
        connection.unregister_dequeue();
        connection.finish();
        self.registry.remove_if_same(handle, &connection);

        let packet = Disconnect::new(to_handle(seq), DisconnectReason::from(code));
        let delivered = self
            .requests
            .lock()
            .deliver_terminal(seq, LeConnectionEvent::new(packet.to_bytes()));
        if !delivered {
            warn!("No request stream left for handle 0x{:03x}", handle);
        }

        info!("Handle 0x{:03x} disconnected: {}", handle, code);
    }

    /// A request stream was dropped
    fn release_request(&self, seq: u32) -> Release {
        self.requests.lock().release(seq)
    }
}

/// Events for one connection request
///
/// Yields the connection outcome and, after a success, the disconnection.
/// Ends after a terminal event. Dropping it before the outcome abandons the
/// request.
pub struct ConnectionEventStream {
    listener: Option<EventListener<LeConnectionEvent>>,
    shared: Weak<Shared>,
    manager: Arc<dyn ConnectionManager>,
    seq: u32,
}

impl ConnectionEventStream {
    /// Next event, or `None` when the stream is over
    pub async fn recv(&mut self) -> Option<LeConnectionEvent> {
        match self.listener.as_mut() {
            Some(listener) => listener.recv().await,
            None => None,
        }
    }

    /// Sequence number of the request behind this stream
    pub fn sequence(&self) -> u32 {
        self.seq
    }

    /// Handle the request will be assigned if it succeeds
    pub fn handle(&self) -> u16 {
        to_handle(self.seq)
    }
}

impl Stream for ConnectionEventStream {
    type Item = LeConnectionEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.get_mut().listener.as_mut() {
            Some(listener) => Pin::new(listener).poll_next(cx),
            None => Poll::Ready(None),
        }
    }
}

impl Drop for ConnectionEventStream {
    fn drop(&mut self) {
        // Detach first so the slot is seen as unattached
        self.listener.take();
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        match shared.release_request(self.seq) {
            Release::Abandoned(RequestKind::Outgoing(peer)) => {
                info!("Request {} cancelled, abandoning attempt to {}", self.seq, peer);
                self.manager.cancel_connection(peer);
            }
            Release::Abandoned(kind) => {
                info!("Request {} cancelled ({:?})", self.seq, kind);
            }
            other => debug!("Request {} stream closed: {:?}", self.seq, other),
        }
    }
}

/// The facade service
pub struct LeAclFacade {
    manager: Arc<dyn ConnectionManager>,
    shared: Arc<Shared>,
    shut_down: AtomicBool,
}

impl LeAclFacade {
    /// Create the facade and register for connection outcomes
    pub fn new(manager: Arc<dyn ConnectionManager>, config: FacadeConfig) -> Self {
        let acl_data = EventChannel::new(config.data_channel_name.clone());
        let shared = Arc::new(Shared {
            config,
            registry: ConnectionRegistry::new(),
            requests: Mutex::new(RequestLog::new()),
            acl_data,
        });
        manager.register_callbacks(Arc::new(OutcomeRelay::new(Arc::downgrade(&shared))));
        info!("LE ACL facade started");
        Self {
            manager,
            shared,
            shut_down: AtomicBool::new(false),
        }
    }

    /// Connect to a peer and stream the attempt's events
    pub fn create_connection(
        &self,
        request: &LeConnectionMsg,
    ) -> Result<ConnectionEventStream, FacadeError> {
        self.ensure_running()?;
        let peer = AddressWithType::parse(&request.address, request.address_type).map_err(|e| {
            error!("Rejecting connection request: {}", e);
            FacadeError::from(e)
        })?;

        let stream = self.admit(RequestKind::Outgoing(peer))?;
        self.manager.initiate_connection(peer);
        debug!("Connection attempt {} to {} initiated", stream.seq, peer);
        Ok(stream)
    }

    /// Wait for the next incoming connection and stream its events
    pub fn fetch_incoming_connection(&self) -> Result<ConnectionEventStream, FacadeError> {
        self.ensure_running()?;
        self.admit(RequestKind::Incoming)
    }

    /// Disconnect an open connection
    pub fn disconnect(&self, request: &LeHandleMsg) -> Result<(), FacadeError> {
        self.ensure_running()?;
        self.shared
            .registry
            .with_connection(request.handle, |connection| {
                connection.disconnect(DisconnectReason::REMOTE_USER_TERMINATED_CONNECTION)
            })
            .ok_or_else(|| {
                warn!("Invalid handle 0x{:03x}", request.handle);
                FacadeError::InvalidHandle(request.handle)
            })
    }

    /// Hand a payload to a connection's outbound queue.
    ///
    /// Resolves once the queue has taken the payload.
    pub async fn send_acl_data(&self, request: LeAclData) -> Result<(), FacadeError> {
        self.ensure_running()?;
        let LeAclData { handle, payload } = request;
        let (accepted_tx, accepted_rx) = oneshot::channel::<()>();

        self.shared
            .registry
            .with_connection(handle, move |connection| {
                connection.register_enqueue(Box::new(move || {
                    let _ = accepted_tx.send(());
                    payload
                }));
            })
            .ok_or_else(|| {
                warn!("Invalid handle 0x{:03x}", handle);
                FacadeError::InvalidHandle(handle)
            })?;

        accepted_rx
            .await
            .map_err(|_| FacadeError::SendAborted(handle))
    }

    /// Stream inbound payloads from all connections
    pub fn fetch_acl_data(&self) -> Result<AclDataStream, FacadeError> {
        self.ensure_running()?;
        Ok(self.shared.acl_data.attach()?)
    }

    pub fn status(&self) -> FacadeStatus {
        let (sequence, request_pending, tracked_requests) = {
            let requests = self.shared.requests.lock();
            (requests.sequence(), requests.has_pending(), requests.occupied())
        };
        FacadeStatus {
            sequence,
            next_handle: to_handle(sequence),
            request_pending,
            open_handles: self.shared.registry.handles(),
            tracked_requests,
        }
    }

    /// Detach from the manager and stop callback delivery on every open
    /// connection. Connections themselves are left up.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.manager.unregister_callbacks();
        self.shared
            .registry
            .for_each(|_, connection| connection.unregister_dequeue());
        self.shared.requests.lock().close_all();
        self.shared.acl_data.close();
        info!("LE ACL facade stopped");
    }

    fn ensure_running(&self) -> Result<(), FacadeError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(FacadeError::ShutDown);
        }
        Ok(())
    }

    fn admit(&self, kind: RequestKind) -> Result<ConnectionEventStream, FacadeError> {
        let (seq, channel) = self.shared.requests.lock().admit(kind)?;
        let listener = channel.attach()?;
        Ok(ConnectionEventStream {
            listener: Some(listener),
            shared: Arc::downgrade(&self.shared),
            manager: Arc::clone(&self.manager),
            seq,
        })
    }
}

impl Drop for LeAclFacade {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hci::{Address, AddressType};
    use crate::manager::{
        ConnectOutcomeHandler, EnqueueFn, LinkEvent, LinkEventHandler, MockConnectionManager,
    };
    use crate::rpc::{DecodedEvent, StatusCode};
    use std::collections::VecDeque;
    use tokio_test::{assert_pending, assert_ready, task};

    type HandlerSlot = Arc<Mutex<Option<Arc<dyn ConnectOutcomeHandler>>>>;

    #[derive(Default)]
    struct FakeLink {
        inbound: Mutex<VecDeque<Vec<u8>>>,
        enqueues: Mutex<Vec<EnqueueFn>>,
        handler: Mutex<Option<Arc<dyn LinkEventHandler>>>,
        disconnects: Mutex<Vec<DisconnectReason>>,
        dequeue_unregistered: AtomicBool,
        finished: AtomicBool,
    }

    impl FakeLink {
        fn fire(&self, event: LinkEvent) {
            let handler = self.handler.lock().clone().expect("link handler registered");
            handler.on_link_event(event);
        }
    }

    struct FakeConnection(Arc<FakeLink>);

    impl LeConnection for FakeConnection {
        fn peer(&self) -> AddressWithType {
            peer()
        }
        fn register_link_handler(&self, handler: Arc<dyn LinkEventHandler>) {
            *self.0.handler.lock() = Some(handler);
        }
        fn unregister_dequeue(&self) {
            self.0.dequeue_unregistered.store(true, Ordering::SeqCst);
        }
        fn try_dequeue(&self) -> Option<Vec<u8>> {
            self.0.inbound.lock().pop_front()
        }
        fn register_enqueue(&self, produce: EnqueueFn) {
            self.0.enqueues.lock().push(produce);
        }
        fn disconnect(&self, reason: DisconnectReason) {
            self.0.disconnects.lock().push(reason);
        }
        fn finish(&self) {
            self.0.finished.store(true, Ordering::SeqCst);
        }
    }

    fn peer() -> AddressWithType {
        AddressWithType::new(
            "AA:BB:CC:DD:EE:FF".parse::<Address>().expect("address"),
            AddressType::PublicDeviceAddress,
        )
    }

    fn connect_msg() -> LeConnectionMsg {
        LeConnectionMsg {
            address: "AA:BB:CC:DD:EE:FF".to_string(),
            address_type: 0,
        }
    }

    /// Mock that captures the outcome handler and tolerates teardown
    fn mock_manager() -> (MockConnectionManager, HandlerSlot) {
        let slot: HandlerSlot = Arc::new(Mutex::new(None));
        let captured = Arc::clone(&slot);
        let mut manager = MockConnectionManager::new();
        manager
            .expect_register_callbacks()
            .times(1)
            .returning(move |handler| *captured.lock() = Some(handler));
        manager.expect_unregister_callbacks().returning(|| ());
        (manager, slot)
    }

    fn start(manager: MockConnectionManager) -> LeAclFacade {
        LeAclFacade::new(Arc::new(manager), FacadeConfig::default())
    }

    fn report(slot: &HandlerSlot, outcome: ConnectOutcome) {
        let handler = slot.lock().clone().expect("callbacks registered");
        handler.on_connect_outcome(outcome);
    }

    fn connect_success(slot: &HandlerSlot) -> Arc<FakeLink> {
        let link = Arc::new(FakeLink::default());
        report(
            slot,
            ConnectOutcome::Success {
                peer: peer(),
                connection: Box::new(FakeConnection(Arc::clone(&link))),
            },
        );
        link
    }

    #[tokio::test]
    async fn test_create_connection_success() {
        let (mut manager, slot) = mock_manager();
        manager
            .expect_initiate_connection()
            .withf(|p| *p == peer())
            .times(1)
            .returning(|_| ());
        let facade = start(manager);

        let mut stream = facade.create_connection(&connect_msg()).expect("admitted");
        assert_eq!(stream.handle(), 0x10);
        connect_success(&slot);

        let event = stream.recv().await.expect("outcome");
        match event.decode().expect("decode") {
            DecodedEvent::ConnectionComplete(complete) => {
                assert!(complete.status.is_success());
                assert_eq!(complete.connection_handle, 0x10);
                assert_eq!(complete.role, Role::Central);
                assert_eq!(complete.peer_address, peer().address);
                assert_eq!(complete.conn_interval, 1);
                assert_eq!(complete.conn_latency, 2);
                assert_eq!(complete.supervision_timeout, 3);
            }
            other => panic!("unexpected event {:?}", other),
        }

        let status = facade.status();
        assert_eq!(status.sequence, 1);
        assert_eq!(status.open_handles, vec![0x10]);
        assert!(!status.request_pending);
    }

    #[tokio::test]
    async fn test_second_request_rejected_without_manager_call() {
        let (mut manager, _slot) = mock_manager();
        manager.expect_initiate_connection().times(1).returning(|_| ());
        manager.expect_cancel_connection().returning(|_| ());
        let facade = start(manager);

        let _first = facade.create_connection(&connect_msg()).expect("admitted");
        let err = facade.create_connection(&connect_msg()).err().expect("rejected");
        assert_eq!(err, FacadeError::Outstanding("request"));
        assert_eq!(err.status(), StatusCode::ResourceExhausted);

        let err = facade.fetch_incoming_connection().err().expect("rejected");
        assert_eq!(err.to_string(), "Only one outstanding connection is supported");
        assert_eq!(facade.status().sequence, 0);
    }

    #[test]
    fn test_malformed_peer_is_internal() {
        let (mut manager, _slot) = mock_manager();
        manager.expect_initiate_connection().times(0);
        let facade = start(manager);

        let bad = LeConnectionMsg {
            address: "not-an-address".to_string(),
            address_type: 0,
        };
        let err = facade.create_connection(&bad).err().expect("rejected");
        assert_eq!(err.status(), StatusCode::Internal);

        let bad_type = LeConnectionMsg {
            address_type: 9,
            ..connect_msg()
        };
        let err = facade.create_connection(&bad_type).err().expect("rejected");
        assert_eq!(err.status(), StatusCode::Internal);
        assert!(!facade.status().request_pending);
    }

    #[tokio::test]
    async fn test_dropping_pending_stream_cancels_attempt() {
        let (mut manager, _slot) = mock_manager();
        manager.expect_initiate_connection().times(2).returning(|_| ());
        // Once for the dropped stream, once for `next` at the end of the test
        manager
            .expect_cancel_connection()
            .withf(|p| *p == peer())
            .times(2)
            .returning(|_| ());
        let facade = start(manager);

        let stream = facade.create_connection(&connect_msg()).expect("admitted");
        drop(stream);

        let status = facade.status();
        assert!(!status.request_pending);
        assert_eq!(status.sequence, 1);

        let next = facade.create_connection(&connect_msg()).expect("admitted");
        assert_eq!(next.handle(), 0x11);
    }

    #[tokio::test]
    async fn test_late_success_after_cancel_not_credited_to_next_request() {
        let (mut manager, slot) = mock_manager();
        manager.expect_initiate_connection().times(2).returning(|_| ());
        manager.expect_cancel_connection().returning(|_| ());
        let facade = start(manager);

        let abandoned = facade.create_connection(&connect_msg()).expect("admitted");
        drop(abandoned);

        let next_msg = LeConnectionMsg {
            address: "11:22:33:44:55:66".to_string(),
            address_type: 1,
        };
        let next_peer = AddressWithType::parse(&next_msg.address, next_msg.address_type)
            .expect("peer");
        let mut stream = facade.create_connection(&next_msg).expect("admitted");

        // The cancelled attempt completes anyway
        let stale = connect_success(&slot);
        assert_eq!(
            *stale.disconnects.lock(),
            vec![DisconnectReason::REMOTE_USER_TERMINATED_CONNECTION]
        );
        let listener = stream.listener.as_mut().expect("listener");
        assert_eq!(listener.try_recv(), None);
        let status = facade.status();
        assert!(status.request_pending);
        assert_eq!(status.sequence, 1);
        assert!(status.open_handles.is_empty());

        let link = Arc::new(FakeLink::default());
        report(
            &slot,
            ConnectOutcome::Success {
                peer: next_peer,
                connection: Box::new(FakeConnection(Arc::clone(&link))),
            },
        );
        let event = stream.recv().await.expect("outcome");
        match event.decode().expect("decode") {
            DecodedEvent::ConnectionComplete(complete) => {
                assert!(complete.status.is_success());
                assert_eq!(complete.connection_handle, 0x11);
                assert_eq!(complete.peer_address, next_peer.address);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(facade.status().open_handles, vec![0x11]);
        assert!(link.disconnects.lock().is_empty());
    }

    #[tokio::test]
    async fn test_late_failure_after_cancel_is_dropped() {
        let (mut manager, slot) = mock_manager();
        manager.expect_initiate_connection().returning(|_| ());
        manager.expect_cancel_connection().returning(|_| ());
        let facade = start(manager);

        drop(facade.create_connection(&connect_msg()).expect("admitted"));
        report(
            &slot,
            ConnectOutcome::Failure {
                peer: peer(),
                reason: ErrorCode::UNKNOWN_CONNECTION,
            },
        );

        let status = facade.status();
        assert_eq!(status.sequence, 1);
        assert_eq!(status.tracked_requests, 0);
    }

    #[tokio::test]
    async fn test_failure_event_ends_stream() {
        let (mut manager, slot) = mock_manager();
        manager.expect_initiate_connection().returning(|_| ());
        let facade = start(manager);

        let mut stream = facade.create_connection(&connect_msg()).expect("admitted");
        report(
            &slot,
            ConnectOutcome::Failure {
                peer: peer(),
                reason: ErrorCode::CONNECTION_FAILED_ESTABLISHMENT,
            },
        );

        let event = stream.recv().await.expect("outcome");
        match event.decode().expect("decode") {
            DecodedEvent::ConnectionComplete(complete) => {
                assert_eq!(complete.status, ErrorCode::CONNECTION_FAILED_ESTABLISHMENT);
                assert_eq!(complete.connection_handle, FAILED_CONNECTION_HANDLE);
                assert_eq!(complete.conn_interval, 0);
                assert_eq!(complete.supervision_timeout, 0);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(stream.recv().await, None);
        assert!(facade.status().open_handles.is_empty());
    }

    #[tokio::test]
    async fn test_disconnection_relayed_and_pruned() {
        let (manager, slot) = mock_manager();
        let facade = start(manager);

        let mut stream = facade.fetch_incoming_connection().expect("admitted");
        let link = connect_success(&slot);
        stream.recv().await.expect("outcome");

        facade.disconnect(&LeHandleMsg { handle: 0x10 }).expect("disconnect");
        assert_eq!(
            *link.disconnects.lock(),
            vec![DisconnectReason::REMOTE_USER_TERMINATED_CONNECTION]
        );

        link.fire(LinkEvent::Disconnected(ErrorCode::CONNECTION_TERMINATED_BY_LOCAL_HOST));
        let event = stream.recv().await.expect("disconnect event");
        assert_eq!(
            event.decode().expect("decode"),
            DecodedEvent::Disconnect(Disconnect::new(
                0x10,
                DisconnectReason::from(ErrorCode::CONNECTION_TERMINATED_BY_LOCAL_HOST)
            ))
        );
        assert_eq!(stream.recv().await, None);

        assert!(link.dequeue_unregistered.load(Ordering::SeqCst));
        assert!(link.finished.load(Ordering::SeqCst));
        assert!(facade.status().open_handles.is_empty());
        assert_eq!(
            facade.disconnect(&LeHandleMsg { handle: 0x10 }).err(),
            Some(FacadeError::InvalidHandle(0x10))
        );
    }

    #[tokio::test]
    async fn test_inbound_data_relayed_until_disconnect() {
        let (manager, slot) = mock_manager();
        let facade = start(manager);
        let mut data = facade.fetch_acl_data().expect("data stream");

        let _stream = facade.fetch_incoming_connection().expect("admitted");
        let link = connect_success(&slot);

        link.inbound.lock().push_back(vec![1, 2, 3]);
        link.fire(LinkEvent::DataReady);
        assert_eq!(
            data.recv().await,
            Some(LeAclData {
                handle: 0x10,
                payload: vec![1, 2, 3]
            })
        );

        // Spurious notification with nothing queued
        link.fire(LinkEvent::DataReady);
        assert_eq!(data.try_recv(), None);

        link.fire(LinkEvent::Disconnected(ErrorCode::CONNECTION_TIMEOUT));
        link.inbound.lock().push_back(vec![4]);
        link.fire(LinkEvent::DataReady);
        assert_eq!(data.try_recv(), None);
    }

    #[test]
    fn test_acl_data_single_listener() {
        let (manager, _slot) = mock_manager();
        let facade = start(manager);

        let first = facade.fetch_acl_data().expect("first listener");
        let err = facade.fetch_acl_data().err().expect("busy");
        assert_eq!(err.status(), StatusCode::ResourceExhausted);

        drop(first);
        assert!(facade.fetch_acl_data().is_ok());
    }

    #[tokio::test]
    async fn test_send_unknown_handle() {
        let (manager, _slot) = mock_manager();
        let facade = start(manager);

        let err = facade
            .send_acl_data(LeAclData {
                handle: 0x42,
                payload: vec![1],
            })
            .await
            .err()
            .expect("rejected");
        assert_eq!(err, FacadeError::InvalidHandle(0x42));
        assert_eq!(err.status(), StatusCode::InvalidArgument);
    }

    #[tokio::test]
    async fn test_send_completes_when_queue_takes_payload() {
        let (manager, slot) = mock_manager();
        let facade = start(manager);
        let _stream = facade.fetch_incoming_connection().expect("admitted");
        let link = connect_success(&slot);

        let mut send = task::spawn(facade.send_acl_data(LeAclData {
            handle: 0x10,
            payload: vec![0xCA, 0xFE],
        }));
        assert_pending!(send.poll());

        let produce = link.enqueues.lock().pop().expect("enqueue registered");
        assert_eq!(produce(), vec![0xCA, 0xFE]);

        assert!(send.is_woken());
        let result = assert_ready!(send.poll());
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_send_aborted_when_queue_drops_closure() {
        let (manager, slot) = mock_manager();
        let facade = start(manager);
        let _stream = facade.fetch_incoming_connection().expect("admitted");
        let link = connect_success(&slot);

        let mut send = task::spawn(facade.send_acl_data(LeAclData {
            handle: 0x10,
            payload: vec![1],
        }));
        assert_pending!(send.poll());

        link.enqueues.lock().clear();
        let result = assert_ready!(send.poll());
        assert_eq!(result, Err(FacadeError::SendAborted(0x10)));
        assert_eq!(FacadeError::SendAborted(0x10).status(), StatusCode::Aborted);
    }

    #[tokio::test]
    async fn test_unsolicited_connection_gets_handle() {
        let (manager, slot) = mock_manager();
        let facade = start(manager);

        let link = connect_success(&slot);
        let status = facade.status();
        assert_eq!(status.open_handles, vec![0x10]);
        assert_eq!(status.sequence, 1);

        link.fire(LinkEvent::Disconnected(ErrorCode::REMOTE_USER_TERMINATED_CONNECTION));
        assert!(facade.status().open_handles.is_empty());
    }

    #[tokio::test]
    async fn test_unsolicited_failure_consumes_sequence() {
        let (manager, slot) = mock_manager();
        let facade = start(manager);

        report(
            &slot,
            ConnectOutcome::Failure {
                peer: peer(),
                reason: ErrorCode::PAGE_TIMEOUT,
            },
        );
        assert_eq!(facade.status().sequence, 1);
        let stream = facade.fetch_incoming_connection().expect("admitted");
        assert_eq!(stream.handle(), 0x11);
    }

    #[tokio::test]
    async fn test_shutdown_closes_streams() {
        let (manager, slot) = mock_manager();
        let facade = start(manager);

        let mut data = facade.fetch_acl_data().expect("data stream");
        let mut stream = facade.fetch_incoming_connection().expect("admitted");
        let link = connect_success(&slot);
        stream.recv().await.expect("outcome");

        facade.shutdown();
        facade.shutdown();

        assert!(link.dequeue_unregistered.load(Ordering::SeqCst));
        assert!(link.disconnects.lock().is_empty());
        assert_eq!(stream.recv().await, None);
        assert_eq!(data.recv().await, None);
        assert_eq!(
            facade.fetch_incoming_connection().err(),
            Some(FacadeError::ShutDown)
        );
    }

    #[test]
    fn test_pending_stream_dropped_after_shutdown_does_not_cancel() {
        let (mut manager, _slot) = mock_manager();
        manager.expect_initiate_connection().times(1).returning(|_| ());
        manager.expect_cancel_connection().times(0);
        let facade = start(manager);

        let stream = facade.create_connection(&connect_msg()).expect("admitted");
        facade.shutdown();
        drop(stream);

        let status = facade.status();
        assert_eq!(status.sequence, 0);
        assert_eq!(status.tracked_requests, 0);
    }
}
