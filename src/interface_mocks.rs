//! A mock [`TransportAdapter`] for exercising the session engine without a real broker.
#![allow(unused)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::connection_settings::MqttClientOptions;
use crate::control_packet::Packet;
use crate::interface::TransportAdapter;

/// Error type for [`MockTransport`], which never actually fails on its own.
#[derive(Debug, Error, Clone)]
pub enum MockTransportError {
    /// The paired end of the mock transport's channel was dropped.
    #[error("mock transport channel closed")]
    ChannelClosed,
}

struct Inner {
    outbound_tx: UnboundedSender<Packet>,
    inbound_rx: Mutex<Option<UnboundedReceiver<Packet>>>,
}

/// A [`TransportAdapter`] backed by a pair of channels, for tests to drive directly.
///
/// Packets sent with [`TransportAdapter::send_packet`] surface on the paired
/// [`MockTransportHandle::outbound_rx`], as if they had gone out on the wire. Packets pushed
/// into [`MockTransportHandle::inbound_tx`] are handed back out of `receive_packet`, as if the
/// broker had sent them.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<Inner>,
}

/// The test-side handle paired with a [`MockTransport`].
pub struct MockTransportHandle {
    /// Packets the Session under test has sent.
    pub outbound_rx: UnboundedReceiver<Packet>,
    /// Feed a packet to the Session under test, as though the broker sent it.
    pub inbound_tx: UnboundedSender<Packet>,
}

impl MockTransport {
    /// Build a connected `(MockTransport, MockTransportHandle)` pair.
    #[must_use]
    pub fn new() -> (Self, MockTransportHandle) {
        let (outbound_tx, outbound_rx) = tokio::sync::mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = tokio::sync::mpsc::unbounded_channel();
        (
            Self {
                inner: Arc::new(Inner {
                    outbound_tx,
                    inbound_rx: Mutex::new(Some(inbound_rx)),
                }),
            },
            MockTransportHandle {
                outbound_rx,
                inbound_tx,
            },
        )
    }
}

#[async_trait]
impl TransportAdapter for MockTransport {
    type Error = MockTransportError;

    async fn connect(
        &self,
        _options: &MqttClientOptions,
        _timeout: Duration,
    ) -> Result<(), Self::Error> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), Self::Error> {
        Ok(())
    }

    async fn send_packet(&self, packet: Packet, _timeout: Duration) -> Result<(), Self::Error> {
        self.inner
            .outbound_tx
            .send(packet)
            .map_err(|_| MockTransportError::ChannelClosed)
    }

    async fn receive_packet(&self, _timeout: Duration) -> Result<Packet, Self::Error> {
        // Only the receive loop ever calls this, so there is never contention for the lock
        // across the await point below.
        let mut rx = {
            let mut guard = self.inner.inbound_rx.lock().unwrap();
            guard.take().ok_or(MockTransportError::ChannelClosed)?
        };
        let result = rx.recv().await.ok_or(MockTransportError::ChannelClosed);
        *self.inner.inbound_rx.lock().unwrap() = Some(rx);
        result
    }
}
