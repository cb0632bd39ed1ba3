use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Entry<T> {
    id: u64,
    active: Arc<AtomicBool>,
    callback: Callback<T>,
}

type EntryList<T> = Mutex<Vec<Entry<T>>>;

/// A list of listeners that each see every value published after they joined.
pub(crate) struct Subscribers<T> {
    next_id: AtomicU64,
    entries: Arc<EntryList<T>>,
}

impl<T: 'static> Subscribers<T> {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let active = Arc::new(AtomicBool::new(true));

        if let Ok(mut entries) = self.entries.lock() {
            entries.push(Entry {
                id,
                active: Arc::clone(&active),
                callback: Arc::new(callback),
            });
        }

        let list: Weak<EntryList<T>> = Arc::downgrade(&self.entries);
        Subscription {
            active: Arc::clone(&active),
            detach: Mutex::new(Some(Box::new(move || {
                active.store(false, Ordering::SeqCst);
                if let Some(list) = list.upgrade() {
                    if let Ok(mut entries) = list.lock() {
                        entries.retain(|entry| entry.id != id);
                    }
                }
            }))),
        }
    }

    /// Callbacks run outside the lock so they may unsubscribe themselves or others.
    pub(crate) fn notify(&self, value: &T) {
        let snapshot: Vec<(Arc<AtomicBool>, Callback<T>)> = match self.entries.lock() {
            Ok(entries) => entries
                .iter()
                .map(|entry| (Arc::clone(&entry.active), Arc::clone(&entry.callback)))
                .collect(),
            Err(_) => return,
        };

        for (active, callback) in snapshot {
            if active.load(Ordering::SeqCst) {
                callback(value);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }
}

/// Handle returned by `subscribe_*`; dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    active: Arc<AtomicBool>,
    detach: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    /// Idempotent; safe to call from inside the subscribed callback.
    pub fn unsubscribe(&self) {
        let detach = match self.detach.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(detach) = detach {
            detach();
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn late_subscriber_sees_only_later_values() {
        let subs = Subscribers::<u8>::new();
        subs.notify(&1);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = subs.subscribe(move |v| sink.lock().unwrap().push(*v));

        subs.notify(&2);
        subs.notify(&3);
        assert_eq!(*seen.lock().unwrap(), vec![2, 3]);
    }

    #[test]
    fn unsubscribe_is_idempotent_and_drop_detaches() {
        let subs = Subscribers::<u8>::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        let sub = subs.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        subs.notify(&0);
        sub.unsubscribe();
        sub.unsubscribe();
        subs.notify(&0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(subs.len(), 0);

        let counter = Arc::clone(&hits);
        let sub = subs.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        drop(sub);
        subs.notify(&0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callback_may_unsubscribe_itself() {
        let subs = Subscribers::<u8>::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let hits = Arc::new(AtomicUsize::new(0));

        let inner_slot = Arc::clone(&slot);
        let counter = Arc::clone(&hits);
        let sub = subs.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            if let Some(sub) = inner_slot.lock().unwrap().as_ref() {
                sub.unsubscribe();
            }
        });
        *slot.lock().unwrap() = Some(sub);

        subs.notify(&1);
        subs.notify(&2);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
