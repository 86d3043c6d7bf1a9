//! The MQTT session engine: connect/keep-alive lifecycle, packet dispatch, and QoS tracking.

mod controller;
mod dispatcher;
mod engine;
mod id_allocator;
mod keep_alive;
mod qos_tracker;
mod receive_loop;
mod state;

pub use controller::{OutgoingMessage, Session, SubscribeOutcome};
pub use state::Lifecycle;
