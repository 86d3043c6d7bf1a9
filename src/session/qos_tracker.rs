//! Tracks broker-initiated QoS 1 and QoS 2 publish flows, and suppresses duplicate
//! application delivery on retransmit.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use thiserror::Error;

use crate::control_packet::Publish;

/// Errors raised by [`InboundQosTracker`] when the broker violates the expected QoS 2 sequence.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InboundQosError {
    /// A PUBREL arrived for an id with no matching pending PUBLISH.
    #[error("PUBREL for unknown packet id {0}")]
    UnknownPubRel(u16),
}

struct ProcessedIds {
    order: VecDeque<u16>,
    set: HashSet<u16>,
    capacity: usize,
}

impl ProcessedIds {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            set: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    fn contains(&self, id: u16) -> bool {
        self.set.contains(&id)
    }

    fn insert(&mut self, id: u16) {
        if self.set.insert(id) {
            self.order.push_back(id);
            while self.order.len() > self.capacity {
                if let Some(oldest) = self.order.pop_front() {
                    self.set.remove(&oldest);
                }
            }
        }
    }
}

/// Tracks inbound QoS 1/2 publishes for the lifetime of one connected session.
///
/// QoS 2 publishes that have been PUBRECed but not yet PUBRELed live in `pending`; once
/// released, their id moves into the bounded `processed` set, which is consulted (for both
/// QoS 1 and QoS 2) to avoid delivering the same application message twice when the broker
/// retransmits with DUP set.
pub struct InboundQosTracker {
    pending: Mutex<HashMap<u16, Publish>>,
    processed: Mutex<ProcessedIds>,
}

impl InboundQosTracker {
    /// Create a tracker that remembers up to `processed_capacity` completed packet ids before
    /// evicting the oldest.
    pub fn new(processed_capacity: usize) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            processed: Mutex::new(ProcessedIds::new(processed_capacity)),
        }
    }

    /// Returns `true` if this packet id has already been delivered to the application.
    pub fn is_processed(&self, packet_id: u16) -> bool {
        self.processed.lock().unwrap().contains(packet_id)
    }

    /// Record that a packet id's application delivery has completed.
    pub fn mark_processed(&self, packet_id: u16) {
        self.processed.lock().unwrap().insert(packet_id);
    }

    /// Begin tracking a QoS 2 PUBLISH, between sending PUBREC and receiving PUBREL.
    ///
    /// Returns `false` if this id was already pending (a PUBLISH retransmit received before
    /// its PUBREL), in which case the caller should still reply PUBREC but must not re-insert.
    pub fn begin_qos2(&self, publish: Publish) -> bool {
        let mut pending = self.pending.lock().unwrap();
        let id = publish.packet_id;
        if pending.contains_key(&id) {
            false
        } else {
            pending.insert(id, publish);
            true
        }
    }

    /// Complete a QoS 2 flow on receiving PUBREL, returning the original PUBLISH to deliver.
    pub fn complete_qos2(&self, packet_id: u16) -> Result<Publish, InboundQosError> {
        self.pending
            .lock()
            .unwrap()
            .remove(&packet_id)
            .ok_or(InboundQosError::UnknownPubRel(packet_id))
    }

}
