//! Single-threaded observer lists.
//!
//! Observers are kept behind `Rc` so that a notification can run on a snapshot
//! of the list: observers added or removed while a notification is running
//! take effect for the next one, and an observer removed mid-notification is
//! not invoked afterwards.

use std::{
    cell::{Cell, RefCell},
    fmt::Debug,
    rc::Rc,
};

/// Handle returned by [`Observable::add`], used to remove the observer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

struct Observer<T> {
    id: ObserverId,
    callback: Rc<dyn Fn(&T)>,
    once: bool,
}

/// A list of callbacks notified with a `&T`.
pub struct Observable<T> {
    observers: RefCell<Vec<Observer<T>>>,
    next_id: Cell<u64>,
}

impl<T> Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observable")
            .field("observers", &self.len())
            .finish()
    }
}

impl<T> Default for Observable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Observable<T> {
    /// An observable without observers.
    pub fn new() -> Self {
        Self {
            observers: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        }
    }

    /// Register `callback` for every following notification.
    pub fn add(&self, callback: impl Fn(&T) + 'static) -> ObserverId {
        self.push(Rc::new(callback), false)
    }

    /// Register `callback` for the next notification only.
    pub fn add_once(&self, callback: impl Fn(&T) + 'static) -> ObserverId {
        self.push(Rc::new(callback), true)
    }

    fn push(&self, callback: Rc<dyn Fn(&T)>, once: bool) -> ObserverId {
        let id = ObserverId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.observers.borrow_mut().push(Observer { id, callback, once });
        id
    }

    /// Returns `false` if `id` was not (or no longer) registered.
    pub fn remove(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.borrow_mut();
        let before = observers.len();
        observers.retain(|observer| observer.id != id);
        observers.len() != before
    }

    /// `true` while observer `id` is registered.
    pub fn contains(&self, id: ObserverId) -> bool {
        self.observers.borrow().iter().any(|observer| observer.id == id)
    }

    /// Call every observer with `value`. Once-observers are removed first.
    pub fn notify(&self, value: &T) {
        let snapshot: Vec<(ObserverId, Rc<dyn Fn(&T)>, bool)> = {
            let mut observers = self.observers.borrow_mut();
            let snapshot = observers
                .iter()
                .map(|observer| (observer.id, observer.callback.clone(), observer.once))
                .collect();
            observers.retain(|observer| !observer.once);
            snapshot
        };
        for (id, callback, once) in snapshot {
            if once || self.contains(id) {
                callback(value);
            }
        }
    }

    /// Remove every observer.
    pub fn clear(&self) {
        self.observers.borrow_mut().clear();
    }

    /// Number of registered observers.
    pub fn len(&self) -> usize {
        self.observers.borrow().len()
    }

    /// `true` without observers.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn once_observers_fire_a_single_time() {
        let hits = Rc::new(Cell::new(0));
        let observable = Observable::<u32>::new();
        let counter = hits.clone();
        observable.add_once(move |v| counter.set(counter.get() + v));

        observable.notify(&2);
        observable.notify(&2);

        assert_eq!(hits.get(), 2);
        assert!(observable.is_empty());
    }

    #[test]
    fn removal_during_notification_skips_the_removed_observer() {
        let observable = Rc::new(Observable::<()>::new());
        let hits = Rc::new(Cell::new(0));
        let victim = Rc::new(Cell::new(None));

        let remover = {
            let observable = observable.clone();
            let victim = victim.clone();
            move |_: &()| {
                if let Some(id) = victim.get() {
                    observable.remove(id);
                }
            }
        };
        observable.add(remover);
        let counter = hits.clone();
        victim.set(Some(observable.add(move |_| counter.set(counter.get() + 1))));

        observable.notify(&());

        assert_eq!(hits.get(), 0);
        assert_eq!(observable.len(), 1);
    }

    #[test]
    fn remove_reports_unknown_ids() {
        let observable = Observable::<()>::new();
        let id = observable.add(|_| {});
        assert!(observable.remove(id));
        assert!(!observable.remove(id));
    }
}
