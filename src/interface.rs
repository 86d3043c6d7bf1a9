//! The boundary between the session engine and the outside world: the wire transport below
//! it, and the application above it.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::connection_settings::MqttClientOptions;
use crate::control_packet::{Packet, QoS};

/// An application-visible message delivered from the broker.
#[derive(Debug, Clone)]
pub struct ApplicationMessage {
    /// Topic the message was published to.
    pub topic: String,
    /// Message payload.
    pub payload: Bytes,
    /// Quality of service the message was published at.
    pub qos: QoS,
    /// Whether the broker is delivering this as a retained message.
    pub retain: bool,
}

/// Notifications the Session Controller raises for the hosting application.
#[derive(Debug, Clone)]
pub enum Event {
    /// The session has connected and is ready to send and receive.
    Connected,
    /// The session has disconnected, whether by request or due to a failure.
    Disconnected,
    /// An application message was received and, if required, has already been acknowledged.
    ApplicationMessageReceived(ApplicationMessage),
}

/// The byte-level codec and transport framing a [`crate::session::Session`] drives.
///
/// Everything below this trait (TCP/TLS, MQTT fixed/variable header encoding, read buffering)
/// is out of scope for the session engine: it only ever exchanges already-decoded
/// [`Packet`] values with its adapter.
#[async_trait]
pub trait TransportAdapter {
    /// The error type surfaced by this adapter's network operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Establish the underlying network connection. Does not send CONNECT.
    async fn connect(
        &self,
        options: &MqttClientOptions,
        timeout: Duration,
    ) -> Result<(), Self::Error>;

    /// Tear down the underlying network connection.
    async fn disconnect(&self) -> Result<(), Self::Error>;

    /// Encode and send a single packet, failing if it cannot be sent within `timeout`.
    async fn send_packet(&self, packet: Packet, timeout: Duration) -> Result<(), Self::Error>;

    /// Wait for and decode the next inbound packet.
    ///
    /// A `timeout` of [`Duration::ZERO`] means "block until a packet arrives or the
    /// connection is lost"; the receive loop is the only caller that uses it this way.
    async fn receive_packet(&self, timeout: Duration) -> Result<Packet, Self::Error>;
}
