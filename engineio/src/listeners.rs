use std::{
    fmt::{self, Debug},
    panic::{catch_unwind, AssertUnwindSafe},
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    task::{Context, Poll},
};

use futures_util::Stream;
use parking_lot::RwLock;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio_util::sync::CancellationToken;
use tracing::error;

/// Handle returned by [`Listeners::add`], used to unregister the listener again.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ListenerId(u64);

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// An ordered multicast list of callbacks for one kind of event.
///
/// `emit` works on a snapshot of the list, so a listener may add or remove
/// listeners (itself included) while it is being invoked.
pub struct Listeners<E> {
    next_id: AtomicU64,
    entries: RwLock<Vec<(ListenerId, Listener<E>)>>,
}

impl<E> Default for Listeners<E> {
    fn default() -> Self {
        Listeners {
            next_id: AtomicU64::new(0),
            entries: RwLock::new(Vec::new()),
        }
    }
}

impl<E> Debug for Listeners<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("len", &self.entries.read().len())
            .finish()
    }
}

impl<E> Listeners<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.write().push((id, Arc::new(listener)));
        id
    }

    /// Returns `false` if no listener with this id was registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(entry, _)| *entry != id);
        entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn emit(&self, event: &E) {
        let snapshot: Vec<Listener<E>> = self
            .entries
            .read()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        for listener in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                error!("event listener panicked");
            }
        }
    }
}

impl<E: Clone + Send + 'static> Listeners<E> {
    /// Registers a listener which forwards every event into the returned
    /// [`Subscription`]. The listener is removed when the subscription drops.
    pub fn subscribe(self: &Arc<Self>) -> Subscription<E> {
        let (tx, rx) = unbounded_channel();
        let id = self.add(move |event: &E| {
            let _ = tx.send(event.clone());
        });
        Subscription {
            listeners: self.clone(),
            id,
            rx,
        }
    }
}

/// A stream of the events emitted after [`Listeners::subscribe`] was called.
pub struct Subscription<E> {
    listeners: Arc<Listeners<E>>,
    id: ListenerId,
    rx: UnboundedReceiver<E>,
}

impl<E> Subscription<E> {
    pub async fn recv(&mut self) -> Option<E> {
        self.rx.recv().await
    }

    /// Waits for the first event `f` maps to `Some`, skipping all others.
    pub async fn next_matching<T, F>(&mut self, mut f: F) -> Option<T>
    where
        F: FnMut(E) -> Option<T>,
    {
        while let Some(event) = self.rx.recv().await {
            if let Some(value) = f(event) {
                return Some(value);
            }
        }
        None
    }

    /// Like [`Subscription::next_matching`], but gives up with `None` once
    /// `cancel` fires.
    pub async fn wait_for<T, F>(&mut self, cancel: &CancellationToken, f: F) -> Option<T>
    where
        F: FnMut(E) -> Option<T>,
    {
        tokio::select! {
            _ = cancel.cancelled() => None,
            value = self.next_matching(f) => value,
        }
    }
}

impl<E> Stream for Subscription<E> {
    type Item = E;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl<E> Drop for Subscription<E> {
    fn drop(&mut self) {
        self.listeners.remove(self.id);
    }
}

impl<E> Debug for Subscription<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
