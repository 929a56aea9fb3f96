//! Broadcast-based shutdown signaling.
//!
//! A single shutdown signal cancels an in-flight cycle cooperatively: the
//! coordinator checks for it at stage and table boundaries, so a started merge
//! always runs to completion or failure before the signal is honored.

use tokio::sync::watch;

/// Transmitter side of the shutdown channel.
///
/// Cloneable; every clone signals the same channel.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<bool>);

impl ShutdownTx {
    /// Signals shutdown to all subscribers.
    ///
    /// The signal is latched: receivers subscribed after this call still
    /// observe it, so shutting down before a cycle starts cancels that cycle.
    pub fn shutdown(&self) {
        self.0.send_replace(true);
    }

    /// Creates a new receiver for this channel.
    pub fn subscribe(&self) -> ShutdownRx {
        ShutdownRx(self.0.subscribe())
    }
}

/// Receiver side of the shutdown channel.
#[derive(Debug, Clone)]
pub struct ShutdownRx(watch::Receiver<bool>);

impl ShutdownRx {
    /// Returns `true` once shutdown has been signaled.
    pub fn is_signaled(&self) -> bool {
        *self.0.borrow()
    }
}

/// Creates a new shutdown channel.
///
/// The channel starts unsignaled; receivers subscribed before or after the
/// signal observe the same state.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTx(tx), ShutdownRx(rx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn late_subscribers_observe_the_signal() {
        let (tx, rx) = create_shutdown_channel();
        assert!(!rx.is_signaled());

        tx.shutdown();

        assert!(rx.is_signaled());
        assert!(tx.subscribe().is_signaled());
    }

    #[test]
    fn shutdown_without_subscribers_is_latched() {
        let (tx, _) = create_shutdown_channel();
        tx.shutdown();

        assert!(tx.subscribe().is_signaled());
    }
}
