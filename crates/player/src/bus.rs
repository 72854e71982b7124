//! Synchronous fan-out of [`BusEvent`]s to every subscribed listener.
//!
//! Listeners run in subscription order on the caller's thread. An `emit` from
//! inside a listener is queued and delivered after the current event has
//! reached every listener, so each listener sees events in emission order and
//! is never re-entered.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use std::time::Duration;

use playconfig::CursorMode;

use crate::cursor::Direction;

#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    CursorColor(String),
    BackgroundColor(String),
    Keyboard(Direction),
    ChangeCursor { width: f32, height: f32 },
    /// Canvas pixel space, origin bottom-left.
    Click { x: f32, y: f32 },
    ChangeMode(CursorMode),
    TickInterval(Duration),
}

impl BusEvent {
    pub fn name(&self) -> &'static str {
        match self {
            BusEvent::CursorColor(_) => "cursorColor",
            BusEvent::BackgroundColor(_) => "backgroundColor",
            BusEvent::Keyboard(_) => "keyboard",
            BusEvent::ChangeCursor { .. } => "changeCursor",
            BusEvent::Click { .. } => "click",
            BusEvent::ChangeMode(_) => "changeMode",
            BusEvent::TickInterval(_) => "tickInterval",
        }
    }
}

type Listener<E> = Rc<RefCell<dyn FnMut(&E)>>;

struct Inner<E> {
    listeners: RefCell<Vec<(u64, Listener<E>)>>,
    queue: RefCell<VecDeque<E>>,
    dispatching: Cell<bool>,
    next_id: Cell<u64>,
}

pub struct EventBus<E = BusEvent> {
    inner: Rc<Inner<E>>,
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<E: 'static> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            inner: Rc::new(Inner {
                listeners: RefCell::new(Vec::new()),
                queue: RefCell::new(VecDeque::new()),
                dispatching: Cell::new(false),
                next_id: Cell::new(0),
            }),
        }
    }
}

impl<E: 'static> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: impl FnMut(&E) + 'static) -> Subscription {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        let listener: Listener<E> = Rc::new(RefCell::new(listener));
        self.inner.listeners.borrow_mut().push((id, listener));
        let weak: Weak<Inner<E>> = Rc::downgrade(&self.inner);
        let detach: Box<dyn Fn()> = Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.listeners.borrow_mut().retain(|(entry, _)| *entry != id);
            }
        });
        Subscription {
            id,
            detach: Some(detach),
        }
    }

    /// Delivers `event` to every listener before returning. Called from inside a
    /// listener, the event is queued and delivered once the current one finishes.
    pub fn emit(&self, event: E) {
        self.inner.queue.borrow_mut().push_back(event);
        if self.inner.dispatching.replace(true) {
            return;
        }
        loop {
            let Some(event) = self.inner.queue.borrow_mut().pop_front() else {
                break;
            };
            let snapshot: Vec<(u64, Listener<E>)> = self.inner.listeners.borrow().clone();
            for (id, listener) in snapshot {
                if !self.is_subscribed(id) {
                    continue;
                }
                match listener.try_borrow_mut() {
                    Ok(mut listener) => (&mut *listener)(&event),
                    Err(_) => tracing::warn!(listener = id, "listener busy; event skipped"),
                }
            }
        }
        self.inner.dispatching.set(false);
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    fn is_subscribed(&self, id: u64) -> bool {
        self.inner
            .listeners
            .borrow()
            .iter()
            .any(|(entry, _)| *entry == id)
    }
}

/// Handle returned by [`EventBus::subscribe`].
///
/// Dropping it does not unsubscribe; call [`Subscription::unsubscribe`].
pub struct Subscription {
    id: u64,
    detach: Option<Box<dyn Fn()>>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.detach.is_some()
    }

    /// Removes the listener. Later calls do nothing.
    pub fn unsubscribe(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
