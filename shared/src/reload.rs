//! Debounced reload broadcaster
//!
//! Fans a single zero-payload "reload" signal out to every subscribed
//! listener. Delivery is best-effort, coalesced and at-most-once: each
//! subscriber owns a single-slot mailbox and a signal arriving while the
//! slot is still full is dropped rather than queued. The browser action a
//! signal triggers (a page reload) is idempotent, so a dropped signal only
//! means the listener reloads once for a burst instead of several times.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};

/// Minimum spacing between two effective broadcasts
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(50);

/// Handle returned by [`Broadcaster::subscribe`]
///
/// Receiving yields `Some(())` per delivered signal and `None` once the
/// subscriber has been unsubscribed.
#[derive(Debug)]
pub struct Subscriber {
    id: u64,
    mailbox: mpsc::Receiver<()>,
}

impl Subscriber {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next reload signal
    pub async fn recv(&mut self) -> Option<()> {
        self.mailbox.recv().await
    }

    /// Take a pending signal without waiting
    pub fn try_recv(&mut self) -> Result<(), TryRecvError> {
        self.mailbox.try_recv()
    }
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    listeners: HashMap<u64, mpsc::Sender<()>>,
    last_broadcast: Option<Instant>,
}

/// Thread-safe pub/sub hub for reload events
#[derive(Debug)]
pub struct Broadcaster {
    inner: Mutex<Inner>,
    debounce: Duration,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::with_debounce(DEFAULT_DEBOUNCE)
    }

    pub fn with_debounce(debounce: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            debounce,
        }
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new listener with a single-slot mailbox
    pub fn subscribe(&self) -> Subscriber {
        let (tx, rx) = mpsc::channel(1);
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.listeners.insert(id, tx);
        Subscriber { id, mailbox: rx }
    }

    /// Deregister a listener and close its mailbox
    ///
    /// Removing an already-removed subscriber is a no-op.
    pub fn unsubscribe(&self, subscriber: &Subscriber) {
        // Dropping the sender closes the mailbox, waking any pending recv.
        let removed = self.lock().listeners.remove(&subscriber.id);
        drop(removed);
    }

    /// Send a reload signal to every listener
    ///
    /// Calls landing within the debounce window of the previous effective
    /// broadcast are absorbed. Returns how many mailboxes accepted the
    /// signal (0 when debounced).
    pub fn broadcast(&self) -> usize {
        let mut inner = self.lock();
        let now = Instant::now();
        if let Some(last) = inner.last_broadcast {
            if now.duration_since(last) < self.debounce {
                return 0;
            }
        }
        inner.last_broadcast = Some(now);

        let mut delivered = 0;
        for tx in inner.listeners.values() {
            match tx.try_send(()) {
                Ok(()) => delivered += 1,
                // Full: an undrained signal is already pending for this listener
                Err(TrySendError::Full(())) | Err(TrySendError::Closed(())) => {}
            }
        }
        delivered
    }

    /// Number of live subscribers
    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }
}
