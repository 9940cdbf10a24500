//! Per-request event channels
//!
//! Every admitted connect/accept request gets an [`EventChannel`] living in a
//! fixed arena of `HANDLE_SPACE` slots indexed by the request's handle. A
//! slot is freed when its request is abandoned before resolving, or once it
//! is terminal (failure or disconnection delivered) and nobody is listening.
//!
//! Only one request may await its outcome at a time: outcomes carry no
//! request id, so the pending request is the one at the current sequence
//! number. Outgoing attempts abandoned before resolving are remembered by
//! peer so a late outcome for one is not credited to the next request.

use crate::channel::EventChannel;
use crate::facade::handle::{to_handle, HANDLE_SPACE};
use crate::hci::AddressWithType;
use crate::rpc::LeConnectionEvent;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors for request admission
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestLogError {
    #[error("Only one outstanding {0} is supported")]
    Outstanding(&'static str),
    #[error("Handle 0x{0:03x} is still in use")]
    HandleInUse(u16),
}

/// Origin of a request slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Driver asked to connect to this peer
    Outgoing(AddressWithType),
    /// Driver is waiting for whichever peer connects first
    Incoming,
    /// The manager reported an outcome nobody asked for
    Unsolicited,
}

impl RequestKind {
    fn label(&self) -> &'static str {
        match self {
            RequestKind::Outgoing(_) => "connection attempt",
            RequestKind::Incoming => "incoming connection",
            RequestKind::Unsolicited => "unsolicited connection",
        }
    }

    fn outstanding_label(&self) -> &'static str {
        match self {
            RequestKind::Outgoing(_) => "request",
            RequestKind::Incoming | RequestKind::Unsolicited => "connection",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Awaiting the connection outcome
    Pending,
    /// Connected; the disconnection event is still to come
    Connected,
    /// Closed channel; nothing more will be pushed
    Terminal,
}

struct Slot {
    seq: u32,
    kind: RequestKind,
    state: SlotState,
    channel: Arc<EventChannel<LeConnectionEvent>>,
}

/// Slot chosen to receive a connection outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutcomeSlot {
    pub seq: u32,
    pub handle: u16,
    pub kind: RequestKind,
}

/// What releasing a request's stream did to its slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// The request had not resolved; it is dropped and its sequence consumed
    Abandoned(RequestKind),
    /// The slot was terminal and is now free
    Reclaimed,
    /// The link is still up; the slot waits for its disconnection
    Retained,
    /// No slot for that sequence number
    Unknown,
}

pub struct RequestLog {
    slots: Vec<Option<Slot>>,
    sequence: u32,
    pending: Option<u32>,
    abandoned: HashSet<AddressWithType>,
}

impl RequestLog {
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(HANDLE_SPACE as usize);
        slots.resize_with(HANDLE_SPACE as usize, || None);
        Self {
            slots,
            sequence: 0,
            pending: None,
            abandoned: HashSet::new(),
        }
    }

    /// Sequence number the next outcome will be recorded under
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Number of live slots
    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    #[cfg(test)]
    pub fn state_of(&self, seq: u32) -> Option<SlotState> {
        self.slot(seq).map(|slot| slot.state)
    }

    /// Admit a new request at the current sequence number
    pub fn admit(
        &mut self,
        kind: RequestKind,
    ) -> Result<(u32, Arc<EventChannel<LeConnectionEvent>>), RequestLogError> {
        if self.pending.is_some() {
            return Err(RequestLogError::Outstanding(kind.outstanding_label()));
        }
        let (seq, channel) = self.claim(kind)?;
        if let RequestKind::Outgoing(peer) = kind {
            self.abandoned.remove(&peer);
        }
        self.pending = Some(seq);
        Ok((seq, channel))
    }

    /// Slot for an outcome from `peer` arriving now: the pending request, or
    /// a fresh unsolicited slot when nothing is pending.
    ///
    /// `Ok(None)` means the outcome belongs to no tracked request: it comes
    /// from an abandoned attempt, or from a peer other than the one the
    /// pending attempt is connecting to. The sequence number is untouched.
    pub fn outcome_slot(
        &mut self,
        peer: &AddressWithType,
    ) -> Result<Option<OutcomeSlot>, RequestLogError> {
        let seq = self.sequence;
        let pending_kind = match self.pending {
            Some(pending) if pending == seq => self.slot(seq).map(|slot| slot.kind),
            _ => None,
        };
        let kind = match pending_kind {
            Some(RequestKind::Outgoing(wanted)) if wanted == *peer => RequestKind::Outgoing(wanted),
            Some(RequestKind::Outgoing(wanted)) => {
                self.abandoned.remove(peer);
                debug!("Outcome for {} while request {} waits on {}", peer, seq, wanted);
                return Ok(None);
            }
            _ if self.take_abandoned(peer) => return Ok(None),
            Some(kind) => kind,
            None => {
                self.claim(RequestKind::Unsolicited)?;
                RequestKind::Unsolicited
            }
        };
        Ok(Some(OutcomeSlot {
            seq,
            handle: to_handle(seq),
            kind,
        }))
    }

    /// Forget an abandoned attempt to `peer`, returning whether there was one
    pub fn take_abandoned(&mut self, peer: &AddressWithType) -> bool {
        let found = self.abandoned.remove(peer);
        if found {
            debug!("Late outcome for abandoned attempt to {}", peer);
        }
        found
    }

    /// Push the outcome event, resolve the slot, and advance the sequence.
    /// The push is complete before the new sequence number is observable.
    pub fn complete_outcome(&mut self, slot: &OutcomeSlot, event: LeConnectionEvent, connected: bool) {
        if let Some(entry) = self.slot_mut(slot.seq) {
            entry.channel.push(event);
            if connected {
                entry.state = SlotState::Connected;
            } else {
                entry.state = SlotState::Terminal;
                entry.channel.close();
            }
        }
        if !connected {
            self.reclaim_if_unattached(slot.seq);
        }
        self.pending = None;
        self.sequence = self.sequence.wrapping_add(1);
    }

    /// Consume the current sequence number without recording anything
    pub fn skip(&mut self) {
        self.pending = None;
        self.sequence = self.sequence.wrapping_add(1);
    }

    /// Push the final event for a connected request and close its channel
    pub fn deliver_terminal(&mut self, seq: u32, event: LeConnectionEvent) -> bool {
        let Some(entry) = self.slot_mut(seq) else {
            return false;
        };
        entry.channel.push(event);
        entry.channel.close();
        entry.state = SlotState::Terminal;
        self.reclaim_if_unattached(seq);
        true
    }

    /// The stream for `seq` went away
    pub fn release(&mut self, seq: u32) -> Release {
        let index = to_handle(seq) as usize;
        let state = match self.slot(seq) {
            Some(slot) => slot.state,
            None => return Release::Unknown,
        };
        match state {
            SlotState::Pending => {
                let kind = self.slots[index].take().map(|slot| slot.kind);
                if let Some(RequestKind::Outgoing(peer)) = kind {
                    self.abandoned.insert(peer);
                }
                self.pending = None;
                self.sequence = self.sequence.wrapping_add(1);
                debug!("Request {} abandoned before resolving", seq);
                kind.map(Release::Abandoned).unwrap_or(Release::Unknown)
            }
            SlotState::Terminal => {
                self.slots[index] = None;
                Release::Reclaimed
            }
            SlotState::Connected => Release::Retained,
        }
    }

    /// Close every channel so attached streams end. Every slot becomes
    /// terminal, so releasing one afterwards never abandons a request.
    pub fn close_all(&mut self) {
        for slot in self.slots.iter_mut().flatten() {
            slot.channel.close();
            slot.state = SlotState::Terminal;
        }
        self.pending = None;
        self.abandoned.clear();
    }

    fn claim(
        &mut self,
        kind: RequestKind,
    ) -> Result<(u32, Arc<EventChannel<LeConnectionEvent>>), RequestLogError> {
        let seq = self.sequence;
        let handle = to_handle(seq);
        let index = handle as usize;

        if let Some(existing) = &self.slots[index] {
            if existing.state == SlotState::Terminal && !existing.channel.is_attached() {
                debug!("Reclaiming slot 0x{:03x} from request {}", handle, existing.seq);
            } else {
                return Err(RequestLogError::HandleInUse(handle));
            }
        }

        let channel = EventChannel::new(format!("{} {}", kind.label(), seq));
        self.slots[index] = Some(Slot {
            seq,
            kind,
            state: SlotState::Pending,
            channel: Arc::clone(&channel),
        });
        Ok((seq, channel))
    }

    fn reclaim_if_unattached(&mut self, seq: u32) {
        let index = to_handle(seq) as usize;
        let unattached = self
            .slot(seq)
            .map(|slot| slot.state == SlotState::Terminal && !slot.channel.is_attached())
            .unwrap_or(false);
        if unattached {
            self.slots[index] = None;
        }
    }

    fn slot(&self, seq: u32) -> Option<&Slot> {
        self.slots[to_handle(seq) as usize]
            .as_ref()
            .filter(|slot| slot.seq == seq)
    }

    fn slot_mut(&mut self, seq: u32) -> Option<&mut Slot> {
        self.slots[to_handle(seq) as usize]
            .as_mut()
            .filter(|slot| slot.seq == seq)
    }
}

impl Default for RequestLog {
    fn default() -> Self {
        Self::new()
    }
}
