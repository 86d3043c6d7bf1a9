//! The decoded packet types exchanged between a [`crate::session::Session`] and its
//! [`crate::interface::TransportAdapter`].
//!
//! Encoding these to and from wire bytes is explicitly the adapter's job, not this crate's:
//! everything here is already a parsed, in-memory value.

use bytes::Bytes;

/// Quality of service level for a publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QoS {
    /// Fire-and-forget, no acknowledgement.
    AtMostOnce,
    /// Acknowledged by a single PUBACK.
    AtLeastOnce,
    /// Acknowledged by the PUBREC/PUBREL/PUBCOMP handshake.
    ExactlyOnce,
}

/// Reason a broker accepted or refused a CONNECT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectReturnCode {
    /// Connection was accepted.
    ConnectionAccepted,
    /// Broker does not support the requested protocol version.
    UnacceptableProtocolVersion,
    /// The client identifier was rejected.
    IdentifierRejected,
    /// The broker's backing service is unavailable.
    ServerUnavailable,
    /// Username or password is malformed.
    BadUserNameOrPassword,
    /// Client is not authorized to connect.
    NotAuthorized,
}

/// Per-filter outcome reported in a SUBACK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeReasonCode {
    /// Subscription granted at the given QoS.
    GrantedQoS(QoS),
    /// Broker refused the subscription.
    Failure,
}

/// A message the broker should publish on the client's behalf if it disconnects ungracefully.
#[derive(Debug, Clone, PartialEq)]
pub struct LastWill {
    /// Topic the will message is published to.
    pub topic: String,
    /// Will payload.
    pub payload: Bytes,
    /// QoS the will is published at.
    pub qos: QoS,
    /// Whether the broker should retain the will message.
    pub retain: bool,
}

/// A decoded application message, inbound or outbound.
#[derive(Debug, Clone, PartialEq)]
pub struct Publish {
    /// Packet identifier. Zero (and meaningless) for QoS 0.
    pub packet_id: u16,
    /// Topic the message was published to.
    pub topic: String,
    /// Message payload.
    pub payload: Bytes,
    /// Quality of service the message was published at.
    pub qos: QoS,
    /// Set when the broker is redelivering a message it already sent once.
    pub dup: bool,
    /// Whether the broker should retain this message for future subscribers.
    pub retain: bool,
}

/// One fully decoded MQTT 3.1.1 control packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// CONNECT, sent once at the start of a connect attempt.
    Connect {
        /// Client identifier presented to the broker.
        client_id: String,
        /// Optional username for authentication.
        user_name: Option<String>,
        /// Optional password for authentication.
        password: Option<Bytes>,
        /// Keep-alive interval, in seconds.
        keep_alive_secs: u16,
        /// Optional last will to register for this connection.
        will: Option<LastWill>,
    },
    /// CONNACK, the broker's reply to CONNECT.
    ConnAck {
        /// Whether the broker restored an existing session (always `false` for this client,
        /// which never sets the clean-start-false bit).
        session_present: bool,
        /// Whether the connection was accepted.
        return_code: ConnectReturnCode,
    },
    /// PUBLISH, an application message in either direction.
    Publish(Publish),
    /// PUBACK, acknowledges a QoS 1 PUBLISH.
    PubAck {
        /// Packet identifier of the PUBLISH being acknowledged.
        packet_id: u16,
    },
    /// PUBREC, the first half of the QoS 2 handshake.
    PubRec {
        /// Packet identifier of the PUBLISH being acknowledged.
        packet_id: u16,
    },
    /// PUBREL, the second half of the QoS 2 handshake.
    PubRel {
        /// Packet identifier being released.
        packet_id: u16,
    },
    /// PUBCOMP, completes the QoS 2 handshake.
    PubComp {
        /// Packet identifier being completed.
        packet_id: u16,
    },
    /// SUBSCRIBE, requests one or more topic filters.
    Subscribe {
        /// Packet identifier for this request.
        packet_id: u16,
        /// Requested `(topic filter, QoS)` pairs.
        filters: Vec<(String, QoS)>,
    },
    /// SUBACK, the broker's reply to SUBSCRIBE.
    SubAck {
        /// Packet identifier of the SUBSCRIBE being acknowledged.
        packet_id: u16,
        /// Per-filter outcome, in request order.
        return_codes: Vec<SubscribeReasonCode>,
    },
    /// UNSUBSCRIBE, withdraws one or more topic filters.
    Unsubscribe {
        /// Packet identifier for this request.
        packet_id: u16,
        /// Topic filters to withdraw.
        filters: Vec<String>,
    },
    /// UNSUBACK, the broker's reply to UNSUBSCRIBE.
    UnsubAck {
        /// Packet identifier of the UNSUBSCRIBE being acknowledged.
        packet_id: u16,
    },
    /// PINGREQ, a keep-alive probe.
    PingReq,
    /// PINGRESP, the reply to PINGREQ.
    PingResp,
    /// DISCONNECT, a graceful connection teardown notice.
    Disconnect,
}

/// The packet type tag used to key dispatcher waiters, independent of any packet identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// See [`Packet::ConnAck`].
    ConnAck,
    /// See [`Packet::PubAck`].
    PubAck,
    /// See [`Packet::PubRec`].
    PubRec,
    /// See [`Packet::PubComp`].
    PubComp,
    /// See [`Packet::SubAck`].
    SubAck,
    /// See [`Packet::UnsubAck`].
    UnsubAck,
    /// See [`Packet::PingResp`].
    PingResp,
}

impl Packet {
    /// The packet identifier carried by this packet, if any.
    ///
    /// QoS 0 publishes and the identifier-less packets (CONNECT, CONNACK, PINGREQ, PINGRESP,
    /// DISCONNECT) return `None`.
    pub fn packet_id(&self) -> Option<u16> {
        match self {
            Packet::Publish(publish) if !matches!(publish.qos, QoS::AtMostOnce) => {
                Some(publish.packet_id)
            }
            Packet::PubAck { packet_id }
            | Packet::PubRec { packet_id }
            | Packet::PubRel { packet_id }
            | Packet::PubComp { packet_id }
            | Packet::Subscribe { packet_id, .. }
            | Packet::SubAck { packet_id, .. }
            | Packet::Unsubscribe { packet_id, .. }
            | Packet::UnsubAck { packet_id } => Some(*packet_id),
            _ => None,
        }
    }

    /// The dispatcher key for this packet, for the packet types the dispatcher ever waits on.
    pub fn packet_type(&self) -> Option<PacketType> {
        match self {
            Packet::ConnAck { .. } => Some(PacketType::ConnAck),
            Packet::PubAck { .. } => Some(PacketType::PubAck),
            Packet::PubRec { .. } => Some(PacketType::PubRec),
            Packet::PubComp { .. } => Some(PacketType::PubComp),
            Packet::SubAck { .. } => Some(PacketType::SubAck),
            Packet::UnsubAck { .. } => Some(PacketType::UnsubAck),
            Packet::PingResp => Some(PacketType::PingResp),
            _ => None,
        }
    }
}
