//! Sends periodic PINGREQ packets and verifies the broker answers in time.

use std::time::Duration;

use crate::control_packet::{Packet, PacketType};
use crate::session::dispatcher::PacketDispatcher;
use crate::session::engine;
use crate::interface::TransportAdapter;

/// Loop sending PINGREQ every `period` and waiting up to `timeout` for PINGRESP.
///
/// Returns (ending the session's connected lifetime) as soon as a PINGREQ cannot be sent or a
/// PINGRESP does not arrive in time. A `period` of zero disables keep-alive: the loop never
/// returns on its own.
pub async fn run<T: TransportAdapter>(
    transport: T,
    dispatcher: std::sync::Arc<PacketDispatcher>,
    timeout: Duration,
    period: Duration,
) {
    if period.is_zero() {
        std::future::pending::<()>().await;
        return;
    }

    loop {
        tokio::time::sleep(period).await;
        log::debug!("keep-alive: sending PINGREQ");

        let registration = dispatcher.register(PacketType::PingResp, None);
        if let Err(e) = engine::send(&transport, timeout, Packet::PingReq).await {
            log::warn!("keep-alive: failed to send PINGREQ: {e}");
            return;
        }
        if let Err(e) = PacketDispatcher::wait(registration, timeout).await {
            log::warn!("keep-alive: no PINGRESP within timeout: {e}");
            return;
        }
    }
}
