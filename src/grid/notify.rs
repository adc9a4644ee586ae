//! Coalesced change notification.
//!
//! Mutations request a broadcast; debounced requests arm a single deadline that later
//! requests inside the same window leave untouched. The owner polls the notifier and
//! dispatches once the deadline passes, so listeners always read the state as it is at
//! fire time. Instant requests dispatch right away and disarm any pending deadline.

use std::time::{Duration, Instant};

pub trait Clock {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListenerOrder {
    /// Last registered listener runs first.
    #[default]
    NewestFirst,
    RegistrationOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Broadcast {
    Debounced,
    Instant,
}

pub type Listener<S> = Box<dyn FnMut(&S)>;

pub struct Notifier<S> {
    listeners: Vec<(ListenerId, Listener<S>)>,
    next_id: u64,
    deadline: Option<Instant>,
    delay: Duration,
    order: ListenerOrder,
    clock: Box<dyn Clock>,
}

impl<S> Notifier<S> {
    pub fn new(delay: Duration, order: ListenerOrder, clock: Box<dyn Clock>) -> Self {
        Self {
            listeners: Vec::new(),
            next_id: 0,
            deadline: None,
            delay,
            order,
            clock,
        }
    }

    pub fn subscribe(&mut self, listener: Listener<S>) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, listener));
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Arm the debounce deadline unless one is already pending.
    pub fn schedule(&mut self) {
        if self.deadline.is_none() {
            self.deadline = Some(self.clock.now() + self.delay);
        }
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn is_due(&self) -> bool {
        self.deadline.is_some_and(|d| self.clock.now() >= d)
    }

    /// Time left until the pending broadcast fires; `None` when nothing is pending.
    pub fn time_until_due(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(self.clock.now()))
    }

    /// Disarm the deadline and hand the listeners out for dispatch. They must be given
    /// back through [`Notifier::restore`].
    pub(crate) fn take_for_dispatch(&mut self) -> Vec<(ListenerId, Listener<S>)> {
        self.deadline = None;
        std::mem::take(&mut self.listeners)
    }

    pub(crate) fn restore(&mut self, mut taken: Vec<(ListenerId, Listener<S>)>) {
        taken.append(&mut self.listeners);
        self.listeners = taken;
    }

    pub(crate) fn order(&self) -> ListenerOrder {
        self.order
    }
}

pub(crate) fn dispatch<S>(
    listeners: &mut [(ListenerId, Listener<S>)],
    order: ListenerOrder,
    state: &S,
) {
    match order {
        ListenerOrder::NewestFirst => {
            for (_, l) in listeners.iter_mut().rev() {
                l(state);
            }
        }
        ListenerOrder::RegistrationOrder => {
            for (_, l) in listeners.iter_mut() {
                l(state);
            }
        }
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[cfg(test)]
#[derive(Debug, Clone)]
pub(crate) struct ManualClock {
    now: std::rc::Rc<std::cell::Cell<Instant>>,
}

#[cfg(test)]
impl ManualClock {
    pub(crate) fn new() -> Self {
        Self {
            now: std::rc::Rc::new(std::cell::Cell::new(Instant::now())),
        }
    }

    pub(crate) fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn notifier(clock: &ManualClock, order: ListenerOrder) -> Notifier<u32> {
        Notifier::new(Duration::from_millis(16), order, Box::new(clock.clone()))
    }

    #[test]
    fn schedule_does_not_rearm() {
        let clock = ManualClock::new();
        let mut n = notifier(&clock, ListenerOrder::NewestFirst);
        n.schedule();
        clock.advance(Duration::from_millis(10));
        n.schedule();
        assert!(!n.is_due());
        clock.advance(Duration::from_millis(6));
        assert!(n.is_due());
        assert_eq!(n.time_until_due(), Some(Duration::ZERO));
    }

    #[test]
    fn dispatch_disarms_deadline() {
        let clock = ManualClock::new();
        let mut n = notifier(&clock, ListenerOrder::NewestFirst);
        n.schedule();
        let taken = n.take_for_dispatch();
        n.restore(taken);
        clock.advance(Duration::from_secs(1));
        assert!(!n.is_pending());
        assert!(!n.is_due());
        assert_eq!(n.time_until_due(), None);
    }

    #[test]
    fn dispatch_respects_order() {
        let clock = ManualClock::new();
        for (order, expected) in [
            (ListenerOrder::NewestFirst, vec![2, 1]),
            (ListenerOrder::RegistrationOrder, vec![1, 2]),
        ] {
            let seen = Rc::new(RefCell::new(Vec::new()));
            let mut n = notifier(&clock, order);
            for tag in [1, 2] {
                let seen = Rc::clone(&seen);
                n.subscribe(Box::new(move |_| seen.borrow_mut().push(tag)));
            }
            let mut taken = n.take_for_dispatch();
            dispatch(&mut taken, n.order(), &0);
            n.restore(taken);
            assert_eq!(*seen.borrow(), expected);
            assert_eq!(n.listener_count(), 2);
        }
    }

    #[test]
    fn unsubscribe_removes_listener() {
        let clock = ManualClock::new();
        let mut n = notifier(&clock, ListenerOrder::NewestFirst);
        let id = n.subscribe(Box::new(|_| {}));
        assert!(n.unsubscribe(id));
        assert!(!n.unsubscribe(id));
        assert_eq!(n.listener_count(), 0);
    }
}
