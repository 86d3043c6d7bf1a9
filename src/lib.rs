#![warn(missing_docs)]

//! A packet-dispatch engine for an MQTT 3.1.1 client: connect/keep-alive lifecycle tracking,
//! request/response correlation, and inbound QoS flow tracking, independent of any particular
//! wire codec or transport.
//!
//! The byte-level encoder/decoder and the network transport itself are supplied by the host
//! application through [`interface::TransportAdapter`]; this crate only ever exchanges already
//! decoded [`control_packet::Packet`] values.

pub use crate::connection_settings::{
    MqttClientOptions, MqttClientOptionsBuilder, MqttClientOptionsBuilderError,
};
pub use crate::error::{SessionError, SessionErrorKind};

mod connection_settings;
pub mod control_packet;
pub mod error;
pub mod interface;
pub mod interface_mocks;
pub mod session;

#[macro_use]
extern crate derive_builder;
