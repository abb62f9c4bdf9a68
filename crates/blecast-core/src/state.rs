//! Adapter state bridge.
//!
//! Turns the platform's state-changed notifications into a stream of
//! [`AdapterStatus`] values. Each subscriber first receives the status at
//! the moment it subscribed, then one value per notification. Values are
//! not deduplicated: a notification that leaves the state unchanged still
//! produces an event.

use std::fmt;
use std::sync::{Arc, Weak};

use tokio::sync::mpsc;
use tracing::trace;

use blecast_types::AdapterStatus;

use crate::platform::{Central, EventKind};
use crate::stream::EventStream;

/// Bridge from platform state notifications to [`AdapterStatus`] streams.
pub struct StateBridge<C: Central> {
    central: Arc<C>,
}

impl<C: Central> StateBridge<C> {
    pub fn new(central: Arc<C>) -> Self {
        Self { central }
    }

    /// The current status, read from the platform.
    pub fn status(&self) -> AdapterStatus {
        AdapterStatus::from(self.central.state())
    }

    /// Subscribe to status changes, starting with the current status.
    pub fn status_changes(&self) -> EventStream<AdapterStatus> {
        let (sender, receiver) = mpsc::unbounded_channel();
        // The receiver is held right here, so this send cannot fail.
        let _ = sender.send(self.status());

        let central: Weak<C> = Arc::downgrade(&self.central);
        let registration = self
            .central
            .notifications()
            .register(EventKind::StateChanged, move |_| {
                let Some(central) = central.upgrade() else {
                    return;
                };
                let status = AdapterStatus::from(central.state());
                trace!(%status, "Adapter state notification");
                let _ = sender.send(status);
            });

        EventStream::new(receiver, vec![registration])
    }
}

impl<C: Central> fmt::Debug for StateBridge<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateBridge")
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockCentral;
    use blecast_types::PlatformState;

    #[test]
    fn test_status_is_read_through() {
        let central = Arc::new(MockCentral::new().with_state(PlatformState::PoweredOff));
        let bridge = StateBridge::new(Arc::clone(&central));
        assert_eq!(bridge.status(), AdapterStatus::PoweredOff);

        central.set_state(PlatformState::PoweredOn);
        assert_eq!(bridge.status(), AdapterStatus::PoweredOn);
    }

    #[test]
    fn test_status_changes_replays_current() {
        let central = Arc::new(MockCentral::new().with_state(PlatformState::Resetting));
        let bridge = StateBridge::new(Arc::clone(&central));

        let mut changes = bridge.status_changes();
        assert_eq!(changes.drain(), vec![AdapterStatus::Resetting]);
    }

    #[test]
    fn test_unchanged_state_is_reemitted() {
        let central = Arc::new(MockCentral::new());
        let bridge = StateBridge::new(Arc::clone(&central));

        let mut changes = bridge.status_changes();
        central.notify_state_changed();
        central.notify_state_changed();

        assert_eq!(
            changes.drain(),
            vec![
                AdapterStatus::PoweredOn,
                AdapterStatus::PoweredOn,
                AdapterStatus::PoweredOn
            ]
        );
    }

    #[test]
    fn test_unrecognized_state_maps_to_unknown() {
        let central = Arc::new(MockCentral::new());
        let bridge = StateBridge::new(Arc::clone(&central));
        let mut changes = bridge.status_changes();

        central.set_state(PlatformState::from_raw(99));
        assert_eq!(changes.drain().last(), Some(&AdapterStatus::Unknown));
    }

    #[test]
    fn test_drop_releases_handler() {
        let central = Arc::new(MockCentral::new());
        let bridge = StateBridge::new(Arc::clone(&central));

        let changes = bridge.status_changes();
        assert_eq!(central.notifications().handler_count_for(EventKind::StateChanged), 1);

        drop(changes);
        assert_eq!(central.notifications().handler_count(), 0);
    }
}
