//! Sends outbound packets and, where one is expected, waits for the correlated response.

use std::time::Duration;

use crate::control_packet::{Packet, PacketType};
use crate::error::{SessionError, SessionErrorKind};
use crate::interface::TransportAdapter;
use crate::session::dispatcher::PacketDispatcher;

/// Send a packet that expects no response.
pub async fn send<T: TransportAdapter>(
    transport: &T,
    timeout: Duration,
    packet: Packet,
) -> Result<(), SessionError> {
    transport
        .send_packet(packet, timeout)
        .await
        .map_err(|e| SessionErrorKind::CommunicationFailed(e.to_string()).into())
}

/// Register a waiter for `(expect, expect_id)`, send `request`, and await the response.
///
/// Registration happens before the send so a response that arrives unusually quickly can
/// never be missed.
pub async fn send_and_receive<T: TransportAdapter>(
    transport: &T,
    dispatcher: &PacketDispatcher,
    timeout: Duration,
    request: Packet,
    expect: PacketType,
    expect_id: Option<u16>,
) -> Result<Packet, SessionError> {
    let registration = dispatcher.register(expect, expect_id);
    if let Err(e) = transport.send_packet(request, timeout).await {
        return Err(SessionErrorKind::CommunicationFailed(e.to_string()).into());
    }
    PacketDispatcher::wait(registration, timeout)
        .await
        .map_err(Into::into)
}
