//! Reads inbound packets off the transport and routes each one to its handler.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::control_packet::{Packet, QoS};
use crate::error::SessionErrorKind;
use crate::interface::{ApplicationMessage, Event, TransportAdapter};
use crate::session::dispatcher::PacketDispatcher;
use crate::session::engine;
use crate::session::qos_tracker::InboundQosTracker;

/// Why the receive loop stopped running.
#[derive(Debug)]
pub enum ReceiveLoopExit {
    /// The loop's cancellation token fired.
    Canceled,
    /// `receive_packet` returned an error.
    TransportError,
    /// The broker sent DISCONNECT.
    BrokerDisconnect,
}

/// Run the receive loop until cancellation, a transport error, or a broker DISCONNECT.
///
/// PINGREQ is answered inline. PUBLISH and PUBREL, which may invoke application-visible
/// delivery, are handled on their own spawned task so a slow application handler never
/// blocks subsequent reads. Every other packet is handed straight to the dispatcher.
#[allow(clippy::too_many_arguments)]
pub async fn run<T>(
    transport: T,
    dispatcher: Arc<PacketDispatcher>,
    qos_tracker: Arc<InboundQosTracker>,
    events_tx: mpsc::UnboundedSender<Event>,
    fault_tx: mpsc::UnboundedSender<SessionErrorKind>,
    timeout: Duration,
    cancel: CancellationToken,
) -> ReceiveLoopExit
where
    T: TransportAdapter + Clone + Send + Sync + 'static,
{
    loop {
        let received = tokio::select! {
            biased;
            () = cancel.cancelled() => return ReceiveLoopExit::Canceled,
            result = transport.receive_packet(Duration::ZERO) => result,
        };

        let packet = match received {
            Ok(packet) => packet,
            Err(e) => {
                log::warn!("receive loop: transport error: {e}");
                return ReceiveLoopExit::TransportError;
            }
        };

        match packet {
            Packet::PingReq => {
                log::debug!("received PINGREQ, replying PINGRESP");
                if let Err(e) = engine::send(&transport, timeout, Packet::PingResp).await {
                    log::warn!("failed to send PINGRESP: {e}");
                }
            }
            Packet::Disconnect => {
                log::info!("broker sent DISCONNECT");
                return ReceiveLoopExit::BrokerDisconnect;
            }
            Packet::Publish(publish) => {
                let transport = transport.clone();
                let qos_tracker = qos_tracker.clone();
                let events_tx = events_tx.clone();
                tokio::spawn(async move {
                    handle_publish(&transport, &qos_tracker, &events_tx, publish, timeout).await;
                });
            }
            Packet::PubRel { packet_id } => {
                let transport = transport.clone();
                let qos_tracker = qos_tracker.clone();
                let events_tx = events_tx.clone();
                let fault_tx = fault_tx.clone();
                tokio::spawn(async move {
                    handle_pubrel(&transport, &qos_tracker, &events_tx, &fault_tx, packet_id, timeout)
                        .await;
                });
            }
            other => dispatcher.dispatch(other),
        }
    }
}

async fn handle_publish<T: TransportAdapter>(
    transport: &T,
    qos_tracker: &InboundQosTracker,
    events_tx: &mpsc::UnboundedSender<Event>,
    publish: crate::control_packet::Publish,
    timeout: Duration,
) {
    match publish.qos {
        QoS::AtMostOnce => deliver(events_tx, &publish),
        QoS::AtLeastOnce => {
            if !qos_tracker.is_processed(publish.packet_id) {
                deliver(events_tx, &publish);
                qos_tracker.mark_processed(publish.packet_id);
            }
            if let Err(e) = engine::send(
                transport,
                timeout,
                Packet::PubAck {
                    packet_id: publish.packet_id,
                },
            )
            .await
            {
                log::warn!("failed to send PUBACK for id {}: {e}", publish.packet_id);
            }
        }
        QoS::ExactlyOnce => {
            let packet_id = publish.packet_id;
            if qos_tracker.is_processed(packet_id) {
                log::debug!("ignoring retransmitted QoS 2 PUBLISH for already-completed id {packet_id}");
            } else {
                qos_tracker.begin_qos2(publish);
            }
            if let Err(e) = engine::send(transport, timeout, Packet::PubRec { packet_id }).await {
                log::warn!("failed to send PUBREC for id {packet_id}: {e}");
            }
        }
    }
}

async fn handle_pubrel<T: TransportAdapter>(
    transport: &T,
    qos_tracker: &InboundQosTracker,
    events_tx: &mpsc::UnboundedSender<Event>,
    fault_tx: &mpsc::UnboundedSender<SessionErrorKind>,
    packet_id: u16,
    timeout: Duration,
) {
    let publish = match qos_tracker.complete_qos2(packet_id) {
        Ok(publish) => Some(publish),
        Err(_) if qos_tracker.is_processed(packet_id) => {
            // Already completed in an earlier round trip; broker retransmitted PUBREL after
            // losing our PUBCOMP. Reply again without redelivering.
            None
        }
        Err(e) => {
            let _ = fault_tx.send(SessionErrorKind::ProtocolViolation(e.to_string()));
            return;
        }
    };

    if let Err(e) = engine::send(transport, timeout, Packet::PubComp { packet_id }).await {
        log::warn!("failed to send PUBCOMP for id {packet_id}: {e}");
        return;
    }

    if let Some(publish) = publish {
        if !qos_tracker.is_processed(packet_id) {
            deliver(events_tx, &publish);
            qos_tracker.mark_processed(packet_id);
        }
    }
}

fn deliver(events_tx: &mpsc::UnboundedSender<Event>, publish: &crate::control_packet::Publish) {
    let message = ApplicationMessage {
        topic: publish.topic.clone(),
        payload: publish.payload.clone(),
        qos: publish.qos,
        retain: publish.retain,
    };
    if events_tx
        .send(Event::ApplicationMessageReceived(message))
        .is_err()
    {
        log::debug!("application event receiver dropped; message delivery notification lost");
    }
}
