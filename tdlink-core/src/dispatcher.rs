// ABOUTME: Delivers one decoded event to every matching subscriber in a fixed order.
// ABOUTME: Failing or panicking callbacks are reported and never stop the rest.

use crate::error::SubscriberError;
use crate::event::Event;
use crate::registry::{Subscriber, SubscriptionRegistry};
use crate::report::ErrorReporter;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Counts from a single dispatch
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Callbacks that returned `Ok`
    pub delivered: usize,
    /// Callbacks that returned an error or panicked
    pub failed: usize,
    /// Snapshot entries removed before their turn came
    pub skipped: usize,
}

impl DispatchOutcome {
    pub fn invoked(&self) -> usize {
        self.delivered + self.failed
    }
}

pub struct Dispatcher {
    registry: Arc<SubscriptionRegistry>,
    reporter: Arc<dyn ErrorReporter>,
}

impl Dispatcher {
    pub fn new(registry: Arc<SubscriptionRegistry>, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self { registry, reporter }
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Invoke unconditional subscribers for the event's kind, then keyed
    /// matches (router creation order, then subscription order), then global
    /// subscribers.
    ///
    /// Works on a snapshot taken before the first callback runs, so callbacks
    /// may subscribe or unsubscribe freely. Entries removed mid-dispatch are
    /// skipped if their turn has not come yet; entries added mid-dispatch
    /// first see the next event.
    pub fn dispatch(&self, event: &Event) -> DispatchOutcome {
        let mut targets = self.registry.lookup(event);
        targets.extend(self.registry.global_subscribers());

        let mut outcome = DispatchOutcome::default();
        for subscriber in &targets {
            if subscriber.is_removed() {
                outcome.skipped += 1;
                continue;
            }
            match self.invoke(subscriber, event) {
                Ok(()) => outcome.delivered += 1,
                Err(error) => {
                    outcome.failed += 1;
                    crate::metrics::record_subscriber_failure(event.kind().type_name());
                    self.reporter.report(&error, "dispatch");
                }
            }
        }

        tracing::trace!(
            kind = %event.kind(),
            delivered = outcome.delivered,
            failed = outcome.failed,
            skipped = outcome.skipped,
            "Event dispatched"
        );
        crate::metrics::record_event_dispatched(event.kind().type_name(), outcome.invoked());
        outcome
    }

    fn invoke(&self, subscriber: &Subscriber, event: &Event) -> Result<(), SubscriberError> {
        match catch_unwind(AssertUnwindSafe(|| subscriber.invoke(event))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(SubscriberError::Failed {
                kind: event.kind(),
                route: subscriber.route().clone(),
                message: format!("{:#}", e),
            }),
            Err(panic) => Err(SubscriberError::Panicked {
                kind: event.kind(),
                route: subscriber.route().clone(),
                message: panic_message(panic.as_ref()),
            }),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use crate::report::CollectingReporter;
    use serde_json::json;

    #[test]
    fn test_panic_message_variants() {
        assert_eq!(panic_message(&"boom"), "boom");
        assert_eq!(panic_message(&"boom".to_string()), "boom");
        assert_eq!(panic_message(&42u8), "non-string panic payload");
    }

    #[test]
    fn test_dispatch_with_no_subscribers() {
        let dispatcher = Dispatcher::new(
            Arc::new(SubscriptionRegistry::new()),
            Arc::new(CollectingReporter::new()),
        );
        let event = Event::with_fields(EventKind::UpdateOption, json!({"name": "version"}));
        assert_eq!(dispatcher.dispatch(&event), DispatchOutcome::default());
    }
}
