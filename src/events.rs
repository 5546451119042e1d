//! Multicast listener chains for lifecycle and dispatch callbacks.
//!
//! Listeners are invoked in registration order by a dispatcher task, so
//! the emitting loop never waits for callback completion. Each listener
//! runs in its own task; a panicking listener is logged and cannot block
//! or fail the rest of the chain.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use futures_util::future::BoxFuture;

use crate::session::Session;

/// A registered callback in a [`Listeners`] chain.
pub(crate) type Listener<T> = Arc<dyn Fn(T) -> BoxFuture<'static, ()> + Send + Sync>;

/// An inbound dispatch delivered to event listeners.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    /// Session the event arrived on.
    pub session: Arc<Session>,
    /// Application-defined event name. Unrecognized names are passed
    /// through unfiltered.
    pub event: String,
    /// Opaque structured payload.
    pub payload: serde_json::Value,
}

/// An ordered collection of independent listener functions.
pub struct Listeners<T> {
    chain: RwLock<Vec<Listener<T>>>,
}

impl<T> Listeners<T>
where
    T: Clone + Send + 'static,
{
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self {
            chain: RwLock::new(Vec::new()),
        }
    }

    /// Appends a listener to the chain.
    pub fn subscribe<F, Fut>(&self, listener: F)
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let boxed: Listener<T> = Arc::new(move |arg| Box::pin(listener(arg)));
        self.chain
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(boxed);
    }

    /// Invokes every listener with `arg`, in registration order, without
    /// waiting for completion.
    pub fn emit(&self, arg: T) {
        emit_chains(vec![self.snapshot()], arg);
    }

    /// Returns the number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chain
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if no listeners are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshots the chain so iteration never crosses an insert boundary.
    pub(crate) fn snapshot(&self) -> Vec<Listener<T>> {
        self.chain
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Runs one or more snapshotted chains back to back on a dispatcher task.
///
/// Used by the receive loop to guarantee session-level listeners are
/// invoked before server-level ones for the same inbound event.
pub(crate) fn emit_chains<T>(chains: Vec<Vec<Listener<T>>>, arg: T)
where
    T: Clone + Send + 'static,
{
    if chains.iter().all(Vec::is_empty) {
        return;
    }
    tokio::spawn(async move {
        for listener in chains.into_iter().flatten() {
            if tokio::spawn(listener(arg.clone())).await.is_err() {
                tracing::warn!("event listener panicked");
            }
        }
    });
}

impl<T> Default for Listeners<T>
where
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Listeners<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self
            .chain
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("Listeners").field("count", &count).finish()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn listeners_run_in_registration_order() {
        let listeners = Listeners::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in 1..=3_u32 {
            let order = Arc::clone(&order);
            listeners.subscribe(move |_: u32| {
                let order = Arc::clone(&order);
                async move {
                    if let Ok(mut seen) = order.lock() {
                        seen.push(tag);
                    }
                }
            });
        }

        listeners.emit(0);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let Ok(seen) = order.lock() else {
            panic!("order mutex poisoned");
        };
        assert_eq!(*seen, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn panicking_listener_does_not_block_the_chain() {
        let listeners = Listeners::new();
        let hits = Arc::new(AtomicUsize::new(0));

        listeners.subscribe(|_: u32| async { panic!("listener fault") });
        let counter = Arc::clone(&hits);
        listeners.subscribe(move |_: u32| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        listeners.emit(0);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn emit_without_listeners_is_a_no_op() {
        let listeners: Listeners<u32> = Listeners::new();
        assert!(listeners.is_empty());
        listeners.emit(7);
    }

    #[tokio::test]
    async fn chains_run_first_then_second() {
        let first = Listeners::new();
        let second = Listeners::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o = Arc::clone(&order);
        first.subscribe(move |_: u32| {
            let o = Arc::clone(&o);
            async move {
                if let Ok(mut seen) = o.lock() {
                    seen.push("session");
                }
            }
        });
        let o = Arc::clone(&order);
        second.subscribe(move |_: u32| {
            let o = Arc::clone(&o);
            async move {
                if let Ok(mut seen) = o.lock() {
                    seen.push("server");
                }
            }
        });

        emit_chains(vec![first.snapshot(), second.snapshot()], 0);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let Ok(seen) = order.lock() else {
            panic!("order mutex poisoned");
        };
        assert_eq!(*seen, vec!["session", "server"]);
    }
}
