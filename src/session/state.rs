//! Tracks the Session Controller's connect/disconnect lifecycle.

use std::fmt;
use std::sync::RwLock;

use tokio::sync::Notify;

/// The five states a [`crate::session::Session`] moves through, as described in its lifecycle
/// table: Disconnected -> Connecting -> Connected -> Disconnecting -> Disconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// No connection attempt is in progress.
    Disconnected,
    /// CONNECT has been sent; awaiting CONNACK.
    Connecting,
    /// CONNACK was accepted; the session can send and receive.
    Connected,
    /// Teardown is in progress, triggered by the caller, the broker, or an internal failure.
    Disconnecting,
}

struct Inner {
    lifecycle: Lifecycle,
}

/// Shared, lock-protected lifecycle state for a Session, with an async wait primitive for
/// state changes.
pub struct SessionState {
    state: RwLock<Inner>,
    state_change: Notify,
}

impl SessionState {
    /// Create state starting in [`Lifecycle::Disconnected`].
    pub fn new() -> Self {
        Self {
            state: RwLock::new(Inner {
                lifecycle: Lifecycle::Disconnected,
            }),
            state_change: Notify::new(),
        }
    }

    /// The current lifecycle phase.
    pub fn lifecycle(&self) -> Lifecycle {
        self.state.read().unwrap().lifecycle
    }

    /// Returns `true` if the session is connected.
    pub fn is_connected(&self) -> bool {
        self.lifecycle() == Lifecycle::Connected
    }

    /// Attempt `Disconnected -> Connecting`. Returns `false` (no state change) if a connect or
    /// disconnect is already in progress, or the session is already connected.
    pub fn try_begin_connecting(&self) -> bool {
        let mut state = self.state.write().unwrap();
        if state.lifecycle == Lifecycle::Disconnected {
            state.lifecycle = Lifecycle::Connecting;
            log::debug!("{:?}", state.lifecycle);
            self.state_change.notify_waiters();
            true
        } else {
            false
        }
    }

    /// `Connecting -> Connected`, on CONNACK acceptance.
    pub fn transition_connected(&self) {
        let mut state = self.state.write().unwrap();
        state.lifecycle = Lifecycle::Connected;
        log::info!("session connected");
        self.state_change.notify_waiters();
    }

    /// Attempt `Connecting | Connected -> Disconnecting`. Returns `false` if teardown is
    /// already underway or complete, making the caller's teardown logic idempotent.
    pub fn try_begin_disconnecting(&self) -> bool {
        let mut state = self.state.write().unwrap();
        if matches!(state.lifecycle, Lifecycle::Connecting | Lifecycle::Connected) {
            state.lifecycle = Lifecycle::Disconnecting;
            log::debug!("{:?}", state.lifecycle);
            self.state_change.notify_waiters();
            true
        } else {
            false
        }
    }

    /// `Disconnecting -> Disconnected`, once teardown has finished.
    pub fn transition_disconnected(&self) {
        let mut state = self.state.write().unwrap();
        state.lifecycle = Lifecycle::Disconnected;
        log::info!("session disconnected");
        self.state_change.notify_waiters();
    }

    /// Wait until the session is connected. Returns immediately if already connected.
    #[allow(dead_code)]
    pub async fn condition_connected(&self) {
        loop {
            if self.is_connected() {
                return;
            }
            self.state_change.notified().await;
        }
    }

}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionState")
            .field("lifecycle", &self.state.read().unwrap().lifecycle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_connecting_only_succeeds_from_disconnected() {
        let state = SessionState::new();
        assert!(state.try_begin_connecting());
        assert_eq!(state.lifecycle(), Lifecycle::Connecting);
        assert!(!state.try_begin_connecting());
    }

    #[test]
    fn begin_disconnecting_is_idempotent() {
        let state = SessionState::new();
        state.try_begin_connecting();
        state.transition_connected();
        assert!(state.try_begin_disconnecting());
        assert!(!state.try_begin_disconnecting());
    }

    #[tokio::test]
    async fn condition_connected_resolves_after_transition() {
        let state = std::sync::Arc::new(SessionState::new());
        state.try_begin_connecting();
        let waiter_state = state.clone();
        let waiter = tokio::spawn(async move { waiter_state.condition_connected().await });
        tokio::task::yield_now().await;
        state.transition_connected();
        waiter.await.unwrap();
    }
}
