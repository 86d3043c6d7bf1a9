//! The Session Controller: connect/disconnect lifecycle, keep-alive supervision, and the
//! public publish/subscribe/unsubscribe operations.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::connection_settings::MqttClientOptions;
use crate::control_packet::{
    ConnectReturnCode, LastWill, Packet, PacketType, Publish, QoS, SubscribeReasonCode,
};
use crate::error::{SessionError, SessionErrorKind};
use crate::interface::{Event, TransportAdapter};
use crate::session::dispatcher::PacketDispatcher;
use crate::session::engine;
use crate::session::id_allocator::IdAllocator;
use crate::session::keep_alive;
use crate::session::qos_tracker::InboundQosTracker;
use crate::session::receive_loop;
use crate::session::state::SessionState;

/// Packet ids remembered for inbound QoS duplicate suppression, per connected session.
const PROCESSED_IDS_CAPACITY: usize = 1024;

/// A message to publish.
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    /// Topic to publish to.
    pub topic: String,
    /// Message payload.
    pub payload: bytes::Bytes,
    /// Quality of service to publish at.
    pub qos: QoS,
    /// Whether the broker should retain this message.
    pub retain: bool,
}

/// The broker's response to one requested subscription filter.
#[derive(Debug, Clone)]
pub struct SubscribeOutcome {
    /// The filter that was requested.
    pub filter: String,
    /// The broker's outcome for that filter.
    pub return_code: SubscribeReasonCode,
}

/// State that exists only while the session is connected or connecting.
struct ConnectedState {
    dispatcher: Arc<PacketDispatcher>,
    qos_tracker: Arc<InboundQosTracker>,
    id_alloc: Arc<IdAllocator>,
    cancel: CancellationToken,
    supervisor: JoinHandle<()>,
}

struct Shared<T> {
    transport: T,
    options: MqttClientOptions,
    state: SessionState,
    events_tx: mpsc::UnboundedSender<Event>,
    connected: Mutex<Option<ConnectedState>>,
}

/// The MQTT session engine: owns the connect/disconnect lifecycle and dispatches
/// publish/subscribe/unsubscribe operations over a caller-supplied [`TransportAdapter`].
///
/// Cheaply cloneable; clones share the same underlying session.
#[derive(Clone)]
pub struct Session<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Session<T>
where
    T: TransportAdapter + Clone + Send + Sync + 'static,
{
    /// Build a new, disconnected session over `transport`.
    ///
    /// `events_tx` receives [`Event`]s ([`Event::Connected`], [`Event::Disconnected`],
    /// inbound application messages) for the lifetime of the session.
    pub fn new(
        transport: T,
        options: MqttClientOptions,
        events_tx: mpsc::UnboundedSender<Event>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport,
                options,
                state: SessionState::new(),
                events_tx,
                connected: Mutex::new(None),
            }),
        }
    }

    /// Returns `true` if the session is currently connected.
    pub fn is_connected(&self) -> bool {
        self.shared.state.is_connected()
    }

    /// Connect to the broker, optionally registering `will` for this connection.
    ///
    /// Fails with [`SessionErrorKind::ProtocolViolation`] if already connected or connecting,
    /// [`SessionErrorKind::ConnectingFailed`] if the broker refuses the CONNECT, or
    /// [`SessionErrorKind::Timeout`]/[`SessionErrorKind::CommunicationFailed`] on transport
    /// trouble.
    pub async fn connect(&self, will: Option<LastWill>) -> Result<(), SessionError> {
        if !self.shared.state.try_begin_connecting() {
            return Err(SessionErrorKind::ProtocolViolation(
                "connect() called while already connected or connecting".to_string(),
            )
            .into());
        }

        let timeout = self.shared.options.default_communication_timeout;

        if let Err(e) = self.shared.transport.connect(&self.shared.options, timeout).await {
            self.shared.state.transition_disconnected();
            return Err(SessionErrorKind::CommunicationFailed(e.to_string()).into());
        }

        let dispatcher = Arc::new(PacketDispatcher::new());
        let qos_tracker = Arc::new(InboundQosTracker::new(PROCESSED_IDS_CAPACITY));
        let id_alloc = Arc::new(IdAllocator::new());
        let cancel = CancellationToken::new();
        let (fault_tx, fault_rx) = mpsc::unbounded_channel();

        let ack_registration = dispatcher.register(PacketType::ConnAck, None);

        // The receive loop must already be running so it can observe the CONNACK that comes
        // back in response to CONNECT below.
        let recv_task: JoinHandle<receive_loop::ReceiveLoopExit> = tokio::spawn(receive_loop::run(
            self.shared.transport.clone(),
            dispatcher.clone(),
            qos_tracker.clone(),
            self.shared.events_tx.clone(),
            fault_tx.clone(),
            timeout,
            cancel.clone(),
        ));

        let keep_alive_secs = u16::try_from(self.shared.options.keep_alive_period.as_secs())
            .unwrap_or(u16::MAX);
        let connect_packet = Packet::Connect {
            client_id: self.shared.options.client_id.clone(),
            user_name: self.shared.options.user_name.clone(),
            password: self
                .shared
                .options
                .password
                .as_ref()
                .map(|p| bytes::Bytes::from(p.clone().into_bytes())),
            keep_alive_secs,
            will,
        };

        if let Err(e) = engine::send(&self.shared.transport, timeout, connect_packet).await {
            cancel.cancel();
            recv_task.abort();
            let _ = self.shared.transport.disconnect().await;
            self.shared.state.transition_disconnected();
            return Err(e);
        }

        let ack = match PacketDispatcher::wait(ack_registration, timeout).await {
            Ok(Packet::ConnAck { return_code, .. }) => return_code,
            Ok(_) => {
                unreachable!("dispatcher only resolves ConnAck waiters with a ConnAck packet")
            }
            Err(kind) => {
                cancel.cancel();
                recv_task.abort();
                let _ = self.shared.transport.disconnect().await;
                self.shared.state.transition_disconnected();
                return Err(kind.into());
            }
        };

        if ack != ConnectReturnCode::ConnectionAccepted {
            cancel.cancel();
            recv_task.abort();
            let _ = self.shared.transport.disconnect().await;
            self.shared.state.transition_disconnected();
            return Err(SessionErrorKind::ConnectingFailed(ack).into());
        }

        self.shared.state.transition_connected();

        let supervisor = tokio::spawn(Self::supervise(
            self.clone(),
            recv_task,
            fault_rx,
            dispatcher.clone(),
            self.shared.transport.clone(),
            self.shared.options.keep_alive_period,
            timeout,
        ));

        *self.shared.connected.lock().unwrap() = Some(ConnectedState {
            dispatcher,
            qos_tracker,
            id_alloc,
            cancel,
            supervisor,
        });

        let _ = self.shared.events_tx.send(Event::Connected);
        Ok(())
    }

    async fn supervise(
        session: Session<T>,
        recv_task: JoinHandle<receive_loop::ReceiveLoopExit>,
        mut fault_rx: mpsc::UnboundedReceiver<SessionErrorKind>,
        dispatcher: Arc<PacketDispatcher>,
        transport: T,
        keep_alive_period: Duration,
        timeout: Duration,
    ) {
        tokio::select! {
            result = recv_task => {
                match result {
                    Ok(reason) => log::info!("receive loop exited: {reason:?}"),
                    Err(e) => log::error!("receive loop task failed: {e}"),
                }
            }
            () = keep_alive::run(transport, dispatcher, timeout, keep_alive_period) => {
                log::warn!("keep-alive loop ended; connection is presumed lost");
            }
            Some(fault) = fault_rx.recv() => {
                log::error!("session fault: {fault}");
            }
        }
        session.disconnect_internal().await;
    }

    /// Disconnect from the broker.
    ///
    /// Fails with [`SessionErrorKind::NotConnected`] if not connected.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        if !self.shared.state.is_connected() {
            return Err(SessionErrorKind::NotConnected.into());
        }
        self.disconnect_internal().await;
        Ok(())
    }

    /// Idempotent teardown, reachable both from the public `disconnect()` and from the
    /// supervisor task when the connection is lost.
    async fn disconnect_internal(&self) {
        if !self.shared.state.try_begin_disconnecting() {
            return;
        }

        let connected = self.shared.connected.lock().unwrap().take();
        if let Some(connected) = connected {
            connected.cancel.cancel();
            let timeout = self.shared.options.default_communication_timeout;
            if let Err(e) = engine::send(&self.shared.transport, timeout, Packet::Disconnect).await
            {
                log::debug!("best-effort DISCONNECT send failed: {e}");
            }
            connected.dispatcher.reset();
        }

        if let Err(e) = self.shared.transport.disconnect().await {
            log::debug!("transport disconnect failed: {e}");
        }

        self.shared.state.transition_disconnected();
        let _ = self.shared.events_tx.send(Event::Disconnected);
    }

    /// Publish a message at the requested QoS.
    pub async fn publish(&self, message: OutgoingMessage) -> Result<(), SessionError> {
        let (dispatcher, id_alloc) = self.connected_handles()?;
        let timeout = self.shared.options.default_communication_timeout;

        match message.qos {
            QoS::AtMostOnce => {
                let packet = Packet::Publish(Publish {
                    packet_id: 0,
                    topic: message.topic,
                    payload: message.payload,
                    qos: QoS::AtMostOnce,
                    dup: false,
                    retain: message.retain,
                });
                engine::send(&self.shared.transport, timeout, packet).await
            }
            QoS::AtLeastOnce => {
                let packet_id = id_alloc.next_id();
                let packet = Packet::Publish(Publish {
                    packet_id,
                    topic: message.topic,
                    payload: message.payload,
                    qos: QoS::AtLeastOnce,
                    dup: false,
                    retain: message.retain,
                });
                engine::send_and_receive(
                    &self.shared.transport,
                    &dispatcher,
                    timeout,
                    packet,
                    PacketType::PubAck,
                    Some(packet_id),
                )
                .await
                .map(|_| ())
            }
            QoS::ExactlyOnce => {
                let packet_id = id_alloc.next_id();
                let packet = Packet::Publish(Publish {
                    packet_id,
                    topic: message.topic,
                    payload: message.payload,
                    qos: QoS::ExactlyOnce,
                    dup: false,
                    retain: message.retain,
                });
                engine::send_and_receive(
                    &self.shared.transport,
                    &dispatcher,
                    timeout,
                    packet,
                    PacketType::PubRec,
                    Some(packet_id),
                )
                .await?;
                // The sender-side QoS 2 handshake completes directly on PUBREC, without
                // sending PUBREL: there is only ever one outstanding message per packet id on
                // this path, so there is nothing for a PUBREL round trip to protect against.
                engine::send(&self.shared.transport, timeout, Packet::PubComp { packet_id }).await
            }
        }
    }

    /// Subscribe to one or more topic filters.
    ///
    /// Fails with [`SessionErrorKind::ProtocolViolation`] if `filters` is empty, or if the
    /// broker's SUBACK does not carry one return code per requested filter.
    pub async fn subscribe(
        &self,
        filters: Vec<(String, QoS)>,
    ) -> Result<Vec<SubscribeOutcome>, SessionError> {
        if filters.is_empty() {
            return Err(SessionErrorKind::ProtocolViolation(
                "subscribe() called with no filters".to_string(),
            )
            .into());
        }
        let (dispatcher, id_alloc) = self.connected_handles()?;
        let timeout = self.shared.options.default_communication_timeout;
        let packet_id = id_alloc.next_id();
        let packet = Packet::Subscribe {
            packet_id,
            filters: filters.clone(),
        };

        let response = engine::send_and_receive(
            &self.shared.transport,
            &dispatcher,
            timeout,
            packet,
            PacketType::SubAck,
            Some(packet_id),
        )
        .await?;

        let Packet::SubAck { return_codes, .. } = response else {
            unreachable!("dispatcher only resolves SubAck waiters with a SubAck packet")
        };

        if return_codes.len() != filters.len() {
            return Err(SessionErrorKind::ProtocolViolation(format!(
                "SUBACK carried {} return codes for {} requested filters",
                return_codes.len(),
                filters.len()
            ))
            .into());
        }

        Ok(filters
            .into_iter()
            .zip(return_codes)
            .map(|((filter, _qos), return_code)| SubscribeOutcome { filter, return_code })
            .collect())
    }

    /// Withdraw one or more topic filters.
    pub async fn unsubscribe(&self, filters: Vec<String>) -> Result<(), SessionError> {
        if filters.is_empty() {
            return Err(SessionErrorKind::ProtocolViolation(
                "unsubscribe() called with no filters".to_string(),
            )
            .into());
        }
        let (dispatcher, id_alloc) = self.connected_handles()?;
        let timeout = self.shared.options.default_communication_timeout;
        let packet_id = id_alloc.next_id();
        let packet = Packet::Unsubscribe { packet_id, filters };

        engine::send_and_receive(
            &self.shared.transport,
            &dispatcher,
            timeout,
            packet,
            PacketType::UnsubAck,
            Some(packet_id),
        )
        .await
        .map(|_| ())
    }

    fn connected_handles(&self) -> Result<(Arc<PacketDispatcher>, Arc<IdAllocator>), SessionError> {
        let guard = self.shared.connected.lock().unwrap();
        match guard.as_ref() {
            Some(connected) if self.shared.state.is_connected() => {
                Ok((connected.dispatcher.clone(), connected.id_alloc.clone()))
            }
            _ => Err(SessionErrorKind::NotConnected.into()),
        }
    }
}
