//! In-process publish/subscribe table for [`LiveEvent`]s.
//!
//! Handlers run synchronously on the emitting task, in registration order.
//! A handler that returns an error or panics is logged (and reported to the
//! optional error observer); the remaining handlers still run. No lock is
//! held while handlers execute, so a handler may register or remove
//! handlers itself; the change applies from the next emit.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{trace, warn};

use crate::types::{EventKind, LiveEvent};

/// Error type handlers may return.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Return type of a handler.
pub type HandlerResult = Result<(), HandlerError>;

type Handler = Arc<dyn Fn(&LiveEvent) -> HandlerResult + Send + Sync>;

/// Callback receiving every handler failure.
pub type ErrorObserver = Arc<dyn Fn(&DispatchError) + Send + Sync>;

/// Identifies one registration, for [`EventDispatcher::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// A handler failed while an event was dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchError {
    pub kind: EventKind,
    pub handler: HandlerId,
    pub message: String,
}

/// Event table mapping each [`EventKind`] to its ordered handlers.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: RwLock<HashMap<EventKind, Vec<(HandlerId, Handler)>>>,
    next_id: AtomicU64,
    observer: RwLock<Option<ErrorObserver>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler. The same closure may be registered more than
    /// once; each registration is invoked.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> HandlerId
    where
        F: Fn(&LiveEvent) -> HandlerResult + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Removes a registration. Returns `false` if it was not registered
    /// under `kind`.
    pub fn off(&self, kind: EventKind, id: HandlerId) -> bool {
        let mut table = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = table.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(h, _)| *h != id);
        let removed = list.len() != before;
        if list.is_empty() {
            table.remove(&kind);
        }
        removed
    }

    /// Number of handlers registered for `kind`.
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Installs the observer that receives handler failures.
    pub fn set_error_observer<F>(&self, observer: F)
    where
        F: Fn(&DispatchError) + Send + Sync + 'static,
    {
        *self.observer.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(observer));
    }

    /// Invokes every handler for the event's kind. Never fails.
    pub fn emit(&self, event: &LiveEvent) {
        let kind = event.kind();
        let snapshot: Vec<(HandlerId, Handler)> = match self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
        {
            Some(list) => list.clone(),
            None => {
                trace!(event = %kind, "no handlers, dropping event");
                return;
            }
        };

        for (id, handler) in snapshot {
            let outcome = catch_unwind(AssertUnwindSafe(|| handler(event)));
            let message = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(panic) => panic_message(panic.as_ref()),
            };
            warn!(event = %kind, handler = id.0, error = %message, "event handler failed");
            self.report(DispatchError {
                kind,
                handler: id,
                message,
            });
        }
    }

    fn report(&self, err: DispatchError) {
        let observer = self
            .observer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(observer) = observer
            && catch_unwind(AssertUnwindSafe(|| observer(&err))).is_err()
        {
            warn!(event = %err.kind, "error observer panicked");
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("handler panicked: {s}")
    } else {
        "handler panicked".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use xpanel_protocol::{Notification, NotificationLevel};

    type BoxedHandler = Box<dyn Fn(&LiveEvent) -> HandlerResult + Send + Sync>;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> BoxedHandler) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = log.clone();
        let make = move |tag: &str| {
            let log = log_clone.clone();
            let tag = tag.to_string();
            Box::new(move |event: &LiveEvent| -> HandlerResult {
                log.lock().unwrap().push(format!("{tag}:{}", event.kind()));
                Ok(())
            }) as BoxedHandler
        };
        (log, make)
    }

    fn notice() -> LiveEvent {
        LiveEvent::Notification(Notification::new(NotificationLevel::Info, "t", "m"))
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let (log, make) = recorder();
        let dispatcher = EventDispatcher::new();
        dispatcher.on(EventKind::Notification, make("h1"));
        dispatcher.on(EventKind::Notification, make("h2"));

        dispatcher.emit(&notice());

        assert_eq!(
            *log.lock().unwrap(),
            vec!["h1:notification", "h2:notification"]
        );
    }

    #[test]
    fn handlers_receive_the_payload() {
        let seen = Arc::new(Mutex::new(None));
        let seen_clone = seen.clone();
        let dispatcher = EventDispatcher::new();
        dispatcher.on(EventKind::Notification, move |event| {
            *seen_clone.lock().unwrap() = Some(event.clone());
            Ok(())
        });

        dispatcher.emit(&notice());

        assert_eq!(*seen.lock().unwrap(), Some(notice()));
    }

    #[test]
    fn off_removes_only_that_handler() {
        let (log, make) = recorder();
        let dispatcher = EventDispatcher::new();
        let h1 = dispatcher.on(EventKind::Notification, make("h1"));
        dispatcher.on(EventKind::Notification, make("h2"));

        assert!(dispatcher.off(EventKind::Notification, h1));
        dispatcher.emit(&notice());

        assert_eq!(*log.lock().unwrap(), vec!["h2:notification"]);
        assert!(!dispatcher.off(EventKind::Notification, h1));
    }

    #[test]
    fn off_under_wrong_kind_is_noop() {
        let (_, make) = recorder();
        let dispatcher = EventDispatcher::new();
        let id = dispatcher.on(EventKind::Connect, make("h"));
        assert!(!dispatcher.off(EventKind::Disconnect, id));
        assert_eq!(dispatcher.handler_count(EventKind::Connect), 1);
    }

    #[test]
    fn duplicate_registrations_both_fire() {
        let count = Arc::new(Mutex::new(0));
        let dispatcher = EventDispatcher::new();
        let handler = {
            let count = count.clone();
            move |_: &LiveEvent| -> HandlerResult {
                *count.lock().unwrap() += 1;
                Ok(())
            }
        };
        dispatcher.on(EventKind::Connect, handler.clone());
        dispatcher.on(EventKind::Connect, handler);

        dispatcher.emit(&LiveEvent::Connect);
        assert_eq!(*count.lock().unwrap(), 2);
    }

    #[test]
    fn failing_handler_does_not_stop_others() {
        let (log, make) = recorder();
        let dispatcher = EventDispatcher::new();
        dispatcher.on(EventKind::Connect, |_| Err("boom".into()));
        dispatcher.on(EventKind::Connect, |_| panic!("handler bug"));
        dispatcher.on(EventKind::Connect, make("after"));

        dispatcher.emit(&LiveEvent::Connect);

        assert_eq!(*log.lock().unwrap(), vec!["after:connect"]);
    }

    #[test]
    fn observer_sees_each_failure() {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let errors_clone = errors.clone();
        let dispatcher = EventDispatcher::new();
        dispatcher.set_error_observer(move |e| errors_clone.lock().unwrap().push(e.clone()));
        let bad = dispatcher.on(EventKind::Disconnect, |_| Err("nope".into()));
        dispatcher.on(EventKind::Disconnect, |_| panic!("kaput"));

        dispatcher.emit(&LiveEvent::Disconnect);

        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].handler, bad);
        assert_eq!(errors[0].kind, EventKind::Disconnect);
        assert_eq!(errors[0].message, "nope");
        assert!(errors[1].message.contains("kaput"));
    }

    #[test]
    fn emit_without_handlers_is_dropped() {
        let dispatcher = EventDispatcher::new();
        dispatcher.emit(&LiveEvent::Connect);
        assert_eq!(dispatcher.handler_count(EventKind::Connect), 0);
    }

    #[test]
    fn handler_may_register_during_emit() {
        let dispatcher = Arc::new(EventDispatcher::new());
        let inner = Arc::downgrade(&dispatcher);
        dispatcher.on(EventKind::Connect, move |_| {
            if let Some(d) = inner.upgrade() {
                d.on(EventKind::Connect, |_| Ok(()));
            }
            Ok(())
        });

        dispatcher.emit(&LiveEvent::Connect);
        assert_eq!(dispatcher.handler_count(EventKind::Connect), 2);
    }
}
