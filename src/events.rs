//! Host signals (window resize, key presses) and their listeners.
//!
//! Listeners are identified by the `Rc` that was registered, the same way a
//! DOM event target identifies a function reference: removing a listener
//! requires handing back the very `Rc` that was added, a freshly built
//! closure never matches.

use std::{
    cell::{Cell, RefCell},
    fmt::Debug,
    rc::Rc,
};

use winit::keyboard::KeyCode;

/// The signal a listener is registered for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Resize,
    KeyDown,
}

/// A key together with the modifiers held while it was pressed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct KeyCombo {
    pub code: KeyCode,
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
}

impl KeyCombo {
    /// Ctrl+Alt+I, the inspector toggle.
    pub const INSPECTOR: KeyCombo = KeyCombo {
        code: KeyCode::KeyI,
        ctrl: true,
        alt: true,
        shift: false,
    };

    /// `code` without modifiers.
    pub fn plain(code: KeyCode) -> Self {
        Self {
            code,
            ctrl: false,
            alt: false,
            shift: false,
        }
    }
}

/// A signal as delivered by the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostEvent {
    Resize,
    KeyDown(KeyCombo),
}

impl HostEvent {
    /// Which listeners receive this event.
    pub fn kind(&self) -> EventKind {
        match self {
            HostEvent::Resize => EventKind::Resize,
            HostEvent::KeyDown(_) => EventKind::KeyDown,
        }
    }
}

/// A registered callback. Identity is the `Rc` allocation.
pub type Listener = Rc<dyn Fn(&HostEvent)>;

/// Where the host publishes resize and keyboard signals.
#[derive(Default)]
pub struct EventTarget {
    listeners: RefCell<Vec<(EventKind, Listener)>>,
    added: Cell<usize>,
    removed: Cell<usize>,
}

impl Debug for EventTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventTarget")
            .field("listeners", &self.listeners.borrow().len())
            .field("added", &self.added.get())
            .field("removed", &self.removed.get())
            .finish()
    }
}

impl EventTarget {
    /// A target without listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adding the same `Rc` twice for the same kind is a no-op.
    pub fn add_listener(&self, kind: EventKind, listener: &Listener) {
        let mut listeners = self.listeners.borrow_mut();
        if listeners
            .iter()
            .any(|(k, l)| *k == kind && Rc::ptr_eq(l, listener))
        {
            log::debug!("{:?} listener already registered", kind);
            return;
        }
        listeners.push((kind, listener.clone()));
        self.added.set(self.added.get() + 1);
    }

    /// Returns `false` if `listener` is not the `Rc` that was registered.
    pub fn remove_listener(&self, kind: EventKind, listener: &Listener) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let Some(idx) = listeners
            .iter()
            .position(|(k, l)| *k == kind && Rc::ptr_eq(l, listener))
        else {
            log::warn!("tried to remove a {:?} listener that was never added", kind);
            return false;
        };
        listeners.remove(idx);
        self.removed.set(self.removed.get() + 1);
        true
    }

    /// Call every listener of `event`'s kind, in registration order.
    pub fn dispatch(&self, event: &HostEvent) {
        let kind = event.kind();
        let snapshot: Vec<Listener> = self
            .listeners
            .borrow()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, l)| l.clone())
            .collect();
        for listener in snapshot {
            if self.is_registered(kind, &listener) {
                listener(event);
            }
        }
    }

    /// `true` if this exact `listener` is registered for `kind`.
    pub fn is_registered(&self, kind: EventKind, listener: &Listener) -> bool {
        self.listeners
            .borrow()
            .iter()
            .any(|(k, l)| *k == kind && Rc::ptr_eq(l, listener))
    }

    /// Number of listeners registered for `kind`.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners
            .borrow()
            .iter()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    /// Total number of successful `add_listener` calls.
    pub fn added(&self) -> usize {
        self.added.get()
    }

    /// Total number of successful `remove_listener` calls.
    pub fn removed(&self) -> usize {
        self.removed.get()
    }
}
