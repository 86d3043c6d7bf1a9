//! Correlates inbound response packets with the outbound request that is waiting for them.

use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time;

use crate::control_packet::{Packet, PacketType};
use crate::error::SessionErrorKind;

struct Waiter {
    packet_type: PacketType,
    packet_id: Option<u16>,
    tx: oneshot::Sender<Packet>,
}

impl Waiter {
    fn matches(&self, packet: &Packet) -> bool {
        packet.packet_type() == Some(self.packet_type) && packet.packet_id() == self.packet_id
    }
}

/// A registered wait for a response packet, returned by [`PacketDispatcher::register`].
///
/// Splitting registration from awaiting lets a caller register before it sends the request
/// that will trigger the response, so a response arriving unusually fast can never race ahead
/// of the wait being set up.
pub struct Registration(oneshot::Receiver<Packet>);

/// Routes inbound packets to whichever in-flight operation is waiting for them.
///
/// Waiters are matched by `(packet_type, packet_id)`. When more than one waiter is registered
/// for the same key (which should not normally happen, but is not itself an error), the
/// earliest-registered waiter wins.
pub struct PacketDispatcher {
    waiters: std::sync::Mutex<Vec<Waiter>>,
}

impl PacketDispatcher {
    /// Create a dispatcher with no registered waiters.
    pub fn new() -> Self {
        Self {
            waiters: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Register interest in the next packet matching `(packet_type, packet_id)`.
    ///
    /// Must be called before sending the request packet that will elicit the response, to
    /// avoid missing a response that arrives before the wait begins.
    pub fn register(&self, packet_type: PacketType, packet_id: Option<u16>) -> Registration {
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().unwrap().push(Waiter {
            packet_type,
            packet_id,
            tx,
        });
        Registration(rx)
    }

    /// Await a previously made [`Registration`], failing with
    /// [`SessionErrorKind::Timeout`] if no matching packet arrives in time, or
    /// [`SessionErrorKind::Canceled`] if the dispatcher is reset first.
    pub async fn wait(registration: Registration, timeout: Duration) -> Result<Packet, SessionErrorKind> {
        match time::timeout(timeout, registration.0).await {
            Ok(Ok(packet)) => Ok(packet),
            Ok(Err(_)) => Err(SessionErrorKind::Canceled),
            Err(_) => Err(SessionErrorKind::Timeout),
        }
    }

    /// Deliver an inbound packet to its matching waiter, if any.
    ///
    /// A packet with no registered waiter is logged and dropped; this is expected whenever a
    /// response arrives after its operation has already timed out.
    pub fn dispatch(&self, packet: Packet) {
        let mut waiters = self.waiters.lock().unwrap();
        if let Some(pos) = waiters.iter().position(|w| w.matches(&packet)) {
            let waiter = waiters.remove(pos);
            // The receiver may already be gone if the waiter's own future was dropped
            // (e.g. cancelled). That's fine, there's nothing left to deliver to.
            let _ = waiter.tx.send(packet);
        } else {
            log::debug!("no waiter registered for {:?}; dropping", packet.packet_type());
        }
    }

    /// Cancel every outstanding waiter.
    ///
    /// Called on disconnect so in-flight operations resolve immediately with
    /// [`SessionErrorKind::Canceled`] instead of running out their full timeout.
    pub fn reset(&self) {
        self.waiters.lock().unwrap().clear();
    }
}

impl Default for PacketDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
