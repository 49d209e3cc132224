//! Status published for the hosting component to display.

use std::{
    cell::RefCell,
    fmt::{Debug, Display},
    rc::Rc,
};

use crate::{
    error::LoadError,
    observable::{Observable, ObserverId},
};

/// Lifecycle state shown to the user.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Initializing,
    SceneReady,
    AssetLoaded,
    AssetLoadFailed,
    Stopped,
}

impl Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Status::Initializing => "Initializing...",
            Status::SceneReady => "Scene is ready",
            Status::AssetLoaded => "Cube model loaded successfully!",
            Status::AssetLoadFailed => "Failed to load model",
            Status::Stopped => "Stopped",
        })
    }
}

struct StatusInner {
    history: RefCell<Vec<Status>>,
    last_error: RefCell<Option<LoadError>>,
    observers: Observable<Status>,
}

/// Shared, append-only status log. Clones publish to the same channel.
#[derive(Clone)]
pub struct StatusChannel {
    inner: Rc<StatusInner>,
}

impl Default for StatusChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for StatusChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusChannel")
            .field("current", &self.current())
            .field("last_error", &self.inner.last_error.borrow())
            .finish()
    }
}

impl StatusChannel {
    /// An empty channel.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(StatusInner {
                history: RefCell::new(Vec::new()),
                last_error: RefCell::new(None),
                observers: Observable::new(),
            }),
        }
    }

    /// Append `status` and notify subscribers.
    pub fn publish(&self, status: Status) {
        log::debug!("Status: {}", status);
        self.inner.history.borrow_mut().push(status);
        self.inner.observers.notify(&status);
    }

    /// Publish [`Status::AssetLoadFailed`] and remember why.
    pub fn publish_load_error(&self, error: &LoadError) {
        *self.inner.last_error.borrow_mut() = Some(error.clone());
        self.publish(Status::AssetLoadFailed);
    }

    /// The latest status, `None` before anything was published.
    pub fn current(&self) -> Option<Status> {
        self.inner.history.borrow().last().copied()
    }

    /// Every status published so far, oldest first.
    pub fn history(&self) -> Vec<Status> {
        self.inner.history.borrow().clone()
    }

    /// The error behind the latest [`Status::AssetLoadFailed`].
    pub fn last_error(&self) -> Option<LoadError> {
        self.inner.last_error.borrow().clone()
    }

    /// Call `callback` for every status published from now on.
    pub fn subscribe(&self, callback: impl Fn(&Status) + 'static) -> ObserverId {
        self.inner.observers.add(callback)
    }

    /// Remove a subscriber. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        self.inner.observers.remove(id)
    }
}
