//! Ordered, reentrant-safe event delivery.
//!
//! Events are pushed while the scheduler holds its state lock and delivered
//! after the lock is released. Only one thread drains the outbox at a time, so
//! listeners observe events in exactly the order they were pushed, and a
//! listener that calls back into the scheduler simply queues more events
//! behind the one it is handling.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::warn;

use super::types::JobEvent;

/// Callback invoked for every scheduler event.
pub type EventListener<T> = Arc<dyn Fn(&JobEvent<T>) + Send + Sync>;

struct Outbox<T> {
    queue: VecDeque<JobEvent<T>>,
    draining: bool,
}

pub(crate) struct EventBus<T> {
    listeners: Mutex<Vec<(u64, EventListener<T>)>>,
    next_id: AtomicU64,
    outbox: Mutex<Outbox<T>>,
}

impl<T> EventBus<T> {
    pub(crate) fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            outbox: Mutex::new(Outbox {
                queue: VecDeque::new(),
                draining: false,
            }),
        }
    }

    pub(crate) fn add(&self, listener: EventListener<T>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, listener));
        id
    }

    #[cfg(test)]
    pub(crate) fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    fn remove(&self, id: u64) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    /// Appends an event to the outbox without delivering it.
    pub(crate) fn push(&self, event: JobEvent<T>) {
        self.outbox.lock().queue.push_back(event);
    }

    /// Delivers queued events unless another thread is already doing so.
    ///
    /// Must not be called while holding the scheduler state lock.
    pub(crate) fn deliver(&self) {
        {
            let mut outbox = self.outbox.lock();
            if outbox.draining {
                return;
            }
            outbox.draining = true;
        }

        loop {
            let event = {
                let mut outbox = self.outbox.lock();
                match outbox.queue.pop_front() {
                    Some(event) => event,
                    None => {
                        outbox.draining = false;
                        return;
                    }
                }
            };

            // Snapshot so listeners may subscribe or unsubscribe while handling.
            let listeners: Vec<EventListener<T>> = self
                .listeners
                .lock()
                .iter()
                .map(|(_, listener)| Arc::clone(listener))
                .collect();

            for listener in listeners {
                if catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                    warn!("Event listener panicked while handling {:?}", event.job_id());
                }
            }
        }
    }
}

trait ListenerRegistry: Send + Sync {
    fn unregister(&self, id: u64) -> bool;
}

impl<T: Send + 'static> ListenerRegistry for EventBus<T> {
    fn unregister(&self, id: u64) -> bool {
        self.remove(id)
    }
}

/// Handle returned by [`JobScheduler::subscribe`](super::JobScheduler::subscribe).
///
/// Dropping the handle keeps the listener registered; call
/// [`Subscription::unsubscribe`] to stop receiving events.
pub struct Subscription {
    id: u64,
    registry: Weak<dyn ListenerRegistry>,
}

impl Subscription {
    pub(crate) fn new<T: Send + 'static>(id: u64, bus: &Arc<EventBus<T>>) -> Self {
        let registry: Arc<dyn ListenerRegistry> = bus.clone();
        Self {
            id,
            registry: Arc::downgrade(&registry),
        }
    }

    /// Deregisters the listener.
    ///
    /// Safe to call from inside a listener. Returns `false` if the listener was
    /// already removed or the scheduler is gone.
    pub fn unsubscribe(&self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => registry.unregister(self.id),
            None => false,
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queued(id: &str) -> JobEvent<()> {
        JobEvent::Queued {
            job_id: id.to_string(),
        }
    }

    #[test]
    fn test_delivery_in_push_order() {
        let bus = Arc::new(EventBus::<()>::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.add(Arc::new(move |e: &JobEvent<()>| {
            sink.lock().push(e.job_id().map(str::to_string))
        }));

        bus.push(queued("a"));
        bus.push(queued("b"));
        bus.push(JobEvent::Idle);
        bus.deliver();

        assert_eq!(
            *seen.lock(),
            vec![Some("a".to_string()), Some("b".to_string()), None]
        );
    }

    #[test]
    fn test_reentrant_push_is_delivered_after_current() {
        let bus = Arc::new(EventBus::<()>::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let inner_bus = Arc::clone(&bus);
        let sink = Arc::clone(&seen);
        bus.add(Arc::new(move |e: &JobEvent<()>| {
            let id = e.job_id().unwrap_or("idle").to_string();
            sink.lock().push(id.clone());
            if id == "a" {
                inner_bus.push(queued("nested"));
                // Returns immediately: the outer call is draining.
                inner_bus.deliver();
                sink.lock().push("after-nested".to_string());
            }
        }));

        bus.push(queued("a"));
        bus.push(queued("b"));
        bus.deliver();

        assert_eq!(*seen.lock(), vec!["a", "after-nested", "b", "nested"]);
    }

    #[test]
    fn test_unsubscribe_from_inside_listener() {
        let bus = Arc::new(EventBus::<()>::new());
        let count = Arc::new(AtomicU64::new(0));
        let handle: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let counter = Arc::clone(&count);
        let slot = Arc::clone(&handle);
        let id = bus.add(Arc::new(move |_e: &JobEvent<()>| {
            counter.fetch_add(1, Ordering::SeqCst);
            if let Some(sub) = slot.lock().as_ref() {
                assert!(sub.unsubscribe());
            }
        }));
        *handle.lock() = Some(Subscription::new(id, &bus));

        bus.push(queued("a"));
        bus.push(queued("b"));
        bus.deliver();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!handle.lock().as_ref().unwrap().unsubscribe());
    }

    #[test]
    fn test_panicking_listener_does_not_stall_delivery() {
        let bus = Arc::new(EventBus::<()>::new());
        let count = Arc::new(AtomicU64::new(0));
        bus.add(Arc::new(|_e: &JobEvent<()>| panic!("listener bug")));
        let counter = Arc::clone(&count);
        bus.add(Arc::new(move |_e: &JobEvent<()>| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        bus.push(queued("a"));
        bus.deliver();
        bus.push(queued("b"));
        bus.deliver();

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsubscribe_after_bus_dropped() {
        let bus = Arc::new(EventBus::<()>::new());
        let id = bus.add(Arc::new(|_e: &JobEvent<()>| {}));
        let sub = Subscription::new(id, &bus);
        drop(bus);
        assert!(!sub.unsubscribe());
    }
}
