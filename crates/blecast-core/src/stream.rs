//! Subscriber streams and multicast primitives.
//!
//! Three building blocks back every public stream:
//!
//! - [`EventStream`]: what a subscriber holds. It owns its receiving end and
//!   the [`Registration`]s that keep its upstream alive; dropping it releases
//!   them exactly once.
//! - [`Fanout`]: a hot multicast. Every emitted value is delivered to every
//!   subscriber attached at that moment, in emission order, with no replay.
//! - [`SharedStream`]: a [`Fanout`] with a reference-counted session. The
//!   session is started when the subscriber count goes from 0 to 1 and torn
//!   down when it goes back to 0.
//!
//! Delivery never blocks the emitting thread. Each subscriber has its own
//! unbounded queue, so a slow consumer grows its own backlog instead of
//! stalling the platform callback or losing events.

use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll};

use futures::stream::Stream;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::platform::Registration;

/// A subscription to one of the adapter's streams.
///
/// Implements [`Stream`]; also offers [`recv`](Self::recv) and
/// [`try_recv`](Self::try_recv) for direct use. Dropping the stream is the
/// only way to unsubscribe.
pub struct EventStream<T> {
    receiver: mpsc::UnboundedReceiver<T>,
    _guards: Vec<Registration>,
}

impl<T> EventStream<T> {
    pub(crate) fn new(receiver: mpsc::UnboundedReceiver<T>, guards: Vec<Registration>) -> Self {
        Self {
            receiver,
            _guards: guards,
        }
    }

    /// Wait for the next event.
    ///
    /// Returns `None` once the upstream has gone away and the queue is empty.
    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Take the next queued event without waiting.
    pub fn try_recv(&mut self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    /// Drain every queued event without waiting.
    pub fn drain(&mut self) -> Vec<T> {
        let mut events = Vec::new();
        while let Some(event) = self.try_recv() {
            events.push(event);
        }
        events
    }

    /// Unsubscribe. Equivalent to dropping the stream.
    pub fn close(self) {}
}

impl<T> fmt::Debug for EventStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("queued", &self.receiver.len())
            .finish()
    }
}

impl<T> Stream for EventStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

struct FanoutInner<T> {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<(u64, mpsc::UnboundedSender<T>)>>,
}

/// Hot multicast of `T` values.
pub struct Fanout<T> {
    inner: Arc<FanoutInner<T>>,
}

impl<T> Clone for Fanout<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Fanout<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fanout")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl<T> Default for Fanout<T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(FanoutInner {
                next_id: AtomicU64::new(1),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }
}

impl<T> Fanout<T> {
    /// Create a multicast with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of attached subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers().len()
    }

    fn subscribers(&self) -> std::sync::MutexGuard<'_, Vec<(u64, mpsc::UnboundedSender<T>)>> {
        self.inner
            .subscribers
            .lock()
            .expect("fanout lock poisoned - a thread panicked while holding the lock")
    }
}

impl<T: Clone + Send + 'static> Fanout<T> {
    /// Attach a new subscriber. It receives values emitted from now on.
    pub fn subscribe(&self) -> EventStream<T> {
        let (receiver, registration) = self.attach();
        EventStream::new(receiver, vec![registration])
    }

    /// Deliver `value` to every current subscriber.
    ///
    /// Returns the number of subscribers that received it. Subscribers whose
    /// receiving end is gone are pruned.
    pub fn emit(&self, value: T) -> usize {
        let mut subscribers = self.subscribers();
        subscribers.retain(|(_, sender)| sender.send(value.clone()).is_ok());
        subscribers.len()
    }

    pub(crate) fn attach(&self) -> (mpsc::UnboundedReceiver<T>, Registration) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers().push((id, sender));

        let inner: Weak<FanoutInner<T>> = Arc::downgrade(&self.inner);
        let registration = Registration::new(move || {
            if let Some(inner) = inner.upgrade() {
                let mut subscribers = inner
                    .subscribers
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                subscribers.retain(|(subscriber, _)| *subscriber != id);
            }
        });
        (receiver, registration)
    }
}

type Connect<T> = Box<dyn Fn(&Fanout<T>) -> Registration + Send + Sync>;

#[derive(Default)]
struct SessionState {
    subscribers: usize,
    session: Option<Registration>,
    sessions_started: u64,
}

struct SharedInner<T> {
    name: String,
    fanout: Fanout<T>,
    state: Mutex<SessionState>,
    connect: Connect<T>,
}

impl<T> SharedInner<T> {
    fn state(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state
            .lock()
            .expect("shared stream lock poisoned - a thread panicked while holding the lock")
    }

    fn release(&self) {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        state.subscribers = state.subscribers.saturating_sub(1);
        debug!(stream = %self.name, subscribers = state.subscribers, "Subscriber released");

        if state.subscribers == 0
            && let Some(session) = state.session.take()
        {
            info!(stream = %self.name, "Last subscriber gone, stopping session");
            // Teardown runs under the lock so a concurrent subscribe cannot
            // start the next session before this one is fully stopped.
            session.cancel();
        }
    }
}

/// Lazily started, reference-counted multicast.
///
/// The `connect` function given to [`SharedStream::new`] starts a session:
/// it receives the stream's [`Fanout`] to emit into and returns the
/// [`Registration`] that stops the session. `connect` runs on each 0 → 1
/// subscriber transition, the registration is released on each 1 → 0
/// transition.
pub struct SharedStream<T> {
    inner: Arc<SharedInner<T>>,
}

impl<T> Clone for SharedStream<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for SharedStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state();
        f.debug_struct("SharedStream")
            .field("name", &self.inner.name)
            .field("subscribers", &state.subscribers)
            .field("active", &state.session.is_some())
            .finish()
    }
}

impl<T: Clone + Send + 'static> SharedStream<T> {
    /// Create an idle shared stream.
    pub fn new<F>(name: impl Into<String>, connect: F) -> Self
    where
        F: Fn(&Fanout<T>) -> Registration + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(SharedInner {
                name: name.into(),
                fanout: Fanout::new(),
                state: Mutex::new(SessionState::default()),
                connect: Box::new(connect),
            }),
        }
    }

    /// Subscribe, starting a session if this is the first subscriber.
    pub fn subscribe(&self) -> EventStream<T> {
        // Attach before connecting so values emitted while the session
        // starts reach this subscriber.
        let (receiver, fanout_registration) = self.inner.fanout.attach();

        {
            let mut state = self.inner.state();
            state.subscribers += 1;
            debug!(stream = %self.inner.name, subscribers = state.subscribers, "Subscriber attached");

            if state.subscribers == 1 {
                state.sessions_started += 1;
                info!(
                    stream = %self.inner.name,
                    session = state.sessions_started,
                    "First subscriber, starting session"
                );
                state.session = Some((self.inner.connect)(&self.inner.fanout));
            }
        }

        let inner: Weak<SharedInner<T>> = Arc::downgrade(&self.inner);
        let lease = Registration::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.release();
            }
        });

        EventStream::new(receiver, vec![lease, fanout_registration])
    }
}

impl<T> SharedStream<T> {
    /// Stream name used in logs.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Number of current subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.state().subscribers
    }

    /// Whether a session is running.
    pub fn is_active(&self) -> bool {
        self.inner.state().session.is_some()
    }

    /// How many sessions have been started so far.
    pub fn sessions_started(&self) -> u64 {
        self.inner.state().sessions_started
    }
}
