//! Platform capability interface.
//!
//! A [`Central`] is the platform BLE stack in the central role: it issues
//! scan commands, answers state queries, and pushes notifications through a
//! [`NotificationHub`]. Everything above this module only talks to the
//! platform through this trait.
//!
//! # Notification channels
//!
//! | Channel | Event |
//! |---------|-------|
//! | adapter-state-changed | [`PlatformEvent::StateChanged`] |
//! | peripheral-discovered | [`PlatformEvent::Discovered`] |
//! | peripheral-connected | [`PlatformEvent::Connected`] |
//! | peripheral-disconnected | [`PlatformEvent::Disconnected`] |
//!
//! Handlers are attached with [`NotificationHub::register`], which returns a
//! [`Registration`]. Dropping (or cancelling) the registration detaches the
//! handler exactly once.

use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tracing::trace;
use uuid::Uuid;

use blecast_types::{AdvertisementData, ConnectionState, PlatformState};

use crate::error::Result;

/// The platform BLE stack, seen from the event layer.
///
/// Implementations must be cheap to query: `state`, `is_scanning`,
/// `peripheral_name` and `connection_state` are called from inside
/// notification handlers.
pub trait Central: Send + Sync + 'static {
    /// Native peripheral handle. Equal handles mean the same physical device.
    type Peripheral: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static;

    /// Start scanning, optionally restricted to peripherals advertising
    /// `filter`. Starting while already scanning replaces the running scan.
    fn start_scan(&self, filter: Option<Uuid>, allow_duplicates: bool) -> Result<()>;

    /// Stop scanning.
    fn stop_scan(&self) -> Result<()>;

    /// Whether the radio is currently scanning.
    fn is_scanning(&self) -> bool;

    /// Current adapter state.
    fn state(&self) -> PlatformState;

    /// Name the platform currently knows for `peripheral`.
    fn peripheral_name(&self, peripheral: &Self::Peripheral) -> Option<String>;

    /// Connection state of `peripheral`, queried live.
    fn connection_state(&self, peripheral: &Self::Peripheral) -> ConnectionState;

    /// The hub this central dispatches its notifications through.
    fn notifications(&self) -> &NotificationHub<Self::Peripheral>;
}

/// A notification pushed by the platform.
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformEvent<P> {
    /// The adapter state may have changed; query [`Central::state`].
    StateChanged,
    /// An advertisement was received.
    Discovered {
        peripheral: P,
        rssi: Option<i16>,
        advertisement: AdvertisementData,
    },
    /// A connection to the peripheral succeeded.
    Connected { peripheral: P },
    /// The peripheral disconnected, cleanly or with an error.
    Disconnected { peripheral: P, error: Option<String> },
}

impl<P> PlatformEvent<P> {
    /// The channel this event is delivered on.
    pub fn kind(&self) -> EventKind {
        match self {
            PlatformEvent::StateChanged => EventKind::StateChanged,
            PlatformEvent::Discovered { .. } => EventKind::Discovered,
            PlatformEvent::Connected { .. } => EventKind::Connected,
            PlatformEvent::Disconnected { .. } => EventKind::Disconnected,
        }
    }
}

/// Notification channel identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    StateChanged,
    Discovered,
    Connected,
    Disconnected,
}

type Handler<P> = Arc<dyn Fn(&PlatformEvent<P>) + Send + Sync>;

struct HubEntry<P> {
    id: u64,
    kind: EventKind,
    handler: Handler<P>,
}

struct HubInner<P> {
    next_id: AtomicU64,
    entries: Mutex<Vec<HubEntry<P>>>,
}

impl<P> HubInner<P> {
    fn remove(&self, id: u64) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|entry| entry.id != id);
    }
}

/// Push-notification dispatcher owned by a [`Central`].
///
/// Dispatch snapshots the matching handlers and releases its lock before
/// calling them, so a handler may register or drop registrations itself.
/// Events are delivered to handlers in registration order.
pub struct NotificationHub<P> {
    inner: Arc<HubInner<P>>,
}

impl<P> fmt::Debug for NotificationHub<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationHub")
            .field("handlers", &self.handler_count())
            .finish()
    }
}

impl<P> Default for NotificationHub<P> {
    fn default() -> Self {
        Self {
            inner: Arc::new(HubInner {
                next_id: AtomicU64::new(1),
                entries: Mutex::new(Vec::new()),
            }),
        }
    }
}

impl<P> NotificationHub<P> {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of attached handlers across all channels.
    pub fn handler_count(&self) -> usize {
        self.entries().len()
    }

    /// Number of attached handlers for one channel.
    pub fn handler_count_for(&self, kind: EventKind) -> usize {
        self.entries().iter().filter(|entry| entry.kind == kind).count()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, Vec<HubEntry<P>>> {
        self.inner
            .entries
            .lock()
            .expect("notification hub lock poisoned - a thread panicked while holding the lock")
    }
}

impl<P: Send + Sync + 'static> NotificationHub<P> {
    /// Attach `handler` to the `kind` channel until the returned
    /// [`Registration`] is dropped.
    #[must_use = "dropping the registration detaches the handler immediately"]
    pub fn register<F>(&self, kind: EventKind, handler: F) -> Registration
    where
        F: Fn(&PlatformEvent<P>) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries().push(HubEntry {
            id,
            kind,
            handler: Arc::new(handler),
        });
        trace!(id, ?kind, "Registered platform handler");

        let hub: Weak<HubInner<P>> = Arc::downgrade(&self.inner);
        Registration::new(move || {
            if let Some(hub) = hub.upgrade() {
                hub.remove(id);
                trace!(id, ?kind, "Released platform handler");
            }
        })
    }

    /// Deliver `event` to every handler attached to its channel.
    ///
    /// Returns the number of handlers invoked.
    pub fn dispatch(&self, event: &PlatformEvent<P>) -> usize {
        let kind = event.kind();
        let handlers: Vec<Handler<P>> = self
            .entries()
            .iter()
            .filter(|entry| entry.kind == kind)
            .map(|entry| Arc::clone(&entry.handler))
            .collect();

        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }
}

/// Scoped release handle.
///
/// Wraps a teardown action that runs exactly once: on the first call to
/// [`cancel`](Self::cancel) or on drop, whichever comes first.
pub struct Registration {
    release: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Registration {
    /// Wrap a teardown action.
    pub fn new<F>(release: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            release: Mutex::new(Some(Box::new(release))),
        }
    }

    /// A registration with nothing to release.
    pub fn empty() -> Self {
        Self {
            release: Mutex::new(None),
        }
    }

    /// Run the teardown now. Later calls, and the eventual drop, do nothing.
    pub fn cancel(&self) {
        let release = self
            .release
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(release) = release {
            release();
        }
    }

    /// Whether the teardown has not run yet.
    pub fn is_active(&self) -> bool {
        self.release
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("active", &self.is_active())
            .finish()
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.cancel();
    }
}
