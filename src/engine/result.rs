//! Component results and the per-pass merge

use std::time::Duration;

use tracing::warn;

use super::modifier::StatusModifier;
use super::RootResource;
use crate::error::Error;

/// Outcome of one component's `reconcile` (or `reconcile_error`) call
#[derive(Debug)]
pub struct ComponentResult<S> {
    /// Ask the dispatcher to run the pass again
    pub requeue: bool,
    /// Ask the dispatcher to run the pass again after a delay; `None` and
    /// zero both mean unset
    pub requeue_after: Option<Duration>,
    /// Status mutation to apply now and replay on commit conflicts
    pub status_modifier: Option<StatusModifier<S>>,
}

impl<S> Default for ComponentResult<S> {
    fn default() -> Self {
        Self {
            requeue: false,
            requeue_after: None,
            status_modifier: None,
        }
    }
}

impl<S> ComponentResult<S> {
    /// Nothing to report
    pub fn done() -> Self {
        Self::default()
    }

    pub fn requeue() -> Self {
        Self {
            requeue: true,
            ..Self::default()
        }
    }

    pub fn requeue_after(delay: Duration) -> Self {
        Self {
            requeue_after: Some(delay),
            ..Self::default()
        }
    }

    pub fn with_status(modifier: StatusModifier<S>) -> Self {
        Self {
            status_modifier: Some(modifier),
            ..Self::default()
        }
    }

    /// Attach a status modifier to an existing result
    pub fn and_status(mut self, modifier: StatusModifier<S>) -> Self {
        self.status_modifier = Some(modifier);
        self
    }

    pub fn and_requeue_after(mut self, delay: Duration) -> Self {
        self.requeue_after = Some(delay);
        self
    }
}

/// Smallest non-zero delay; an unset or zero side adopts the other one
pub fn min_nonzero(current: Option<Duration>, incoming: Option<Duration>) -> Option<Duration> {
    let current = current.filter(|d| !d.is_zero());
    let incoming = incoming.filter(|d| !d.is_zero());
    match (current, incoming) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// Merged requeue request handed back to the dispatcher
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassOutcome {
    pub requeue: bool,
    pub requeue_after: Option<Duration>,
}

/// Scratch state for one pass: merged outcome, collected modifiers and the
/// most recent hard error
pub struct ReconcilerResults<K: RootResource> {
    pub outcome: PassOutcome,
    pub modifiers: Vec<StatusModifier<K::Status>>,
    pub error: Option<Error>,
}

impl<K: RootResource> Default for ReconcilerResults<K> {
    fn default() -> Self {
        Self {
            outcome: PassOutcome::default(),
            modifiers: Vec::new(),
            error: None,
        }
    }
}

impl<K: RootResource> ReconcilerResults<K> {
    /// Fold one component result into the pass
    ///
    /// The modifier is applied to `root` immediately so later components see
    /// its effect. A failing modifier is logged and only becomes the pass
    /// error when no other error is recorded.
    pub fn merge(&mut self, root: &mut K, result: ComponentResult<K::Status>) {
        self.outcome.requeue |= result.requeue;
        self.outcome.requeue_after = min_nonzero(self.outcome.requeue_after, result.requeue_after);

        if let Some(modifier) = result.status_modifier {
            if let Err(e) = modifier.apply(root.status_mut()) {
                warn!("Status modifier {} failed: {}", modifier.name(), e);
                self.record_error(e);
            }
            self.modifiers.push(modifier);
        }
    }

    /// Keep the first error of the pass
    pub fn record_error(&mut self, error: Error) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// Install the pass's primary error, returning any error it replaces
    pub fn set_primary_error(&mut self, error: Error) -> Option<Error> {
        self.error.replace(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{widget, Widget, WidgetStatus};
    use proptest::prelude::*;

    fn after(secs: u64) -> Option<Duration> {
        Some(Duration::from_secs(secs))
    }

    #[test]
    fn test_min_nonzero_cases() {
        assert_eq!(min_nonzero(None, None), None);
        assert_eq!(min_nonzero(None, after(5)), after(5));
        assert_eq!(min_nonzero(after(5), None), after(5));
        assert_eq!(min_nonzero(after(0), after(7)), after(7));
        assert_eq!(min_nonzero(after(7), after(0)), after(7));
        assert_eq!(min_nonzero(after(30), after(10)), after(10));
        assert_eq!(min_nonzero(after(0), after(0)), None);
    }

    #[test]
    fn test_merge_ors_requeue_and_applies_modifier() {
        let mut root: Widget = widget("w", None);
        let mut results = ReconcilerResults::<Widget>::default();

        results.merge(&mut root, ComponentResult::requeue());
        results.merge(
            &mut root,
            ComponentResult::with_status(StatusModifier::infallible(
                "phase",
                |s: &mut WidgetStatus| s.phase = Some("Ready".to_string()),
            )),
        );

        assert!(results.outcome.requeue);
        assert_eq!(results.modifiers.len(), 1);
        assert_eq!(root.status.unwrap().phase.as_deref(), Some("Ready"));
    }

    #[test]
    fn test_failed_modifier_is_kept_and_recorded_once() {
        let mut root: Widget = widget("w", None);
        let mut results = ReconcilerResults::<Widget>::default();

        for name in ["first", "second"] {
            results.merge(
                &mut root,
                ComponentResult::with_status(StatusModifier::new(name, move |_| {
                    Err(Error::status_modifier(name, "boom"))
                })),
            );
        }

        assert_eq!(results.modifiers.len(), 2);
        match results.error {
            Some(Error::StatusModifierError { name, .. }) => assert_eq!(name, "first"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_primary_error_replaces_recorded_error() {
        let mut results = ReconcilerResults::<Widget>::default();
        results.record_error(Error::status_modifier("handler", "boom"));

        let displaced = results.set_primary_error(Error::ValidationError("bad".to_string()));
        assert!(matches!(
            displaced,
            Some(Error::StatusModifierError { ref name, .. }) if name == "handler"
        ));
        assert!(matches!(results.error, Some(Error::ValidationError(_))));
        assert!(results
            .set_primary_error(Error::ValidationError("again".to_string()))
            .is_some());
    }

    proptest! {
        #[test]
        fn prop_requeue_after_is_min_of_nonzero(a in 0u64..10_000, b in 0u64..10_000) {
            let mut root: Widget = widget("w", None);
            let mut results = ReconcilerResults::<Widget>::default();
            results.merge(&mut root, ComponentResult::requeue_after(Duration::from_millis(a)));
            results.merge(&mut root, ComponentResult::requeue_after(Duration::from_millis(b)));

            let expected = match (a, b) {
                (0, 0) => None,
                (0, b) => Some(Duration::from_millis(b)),
                (a, 0) => Some(Duration::from_millis(a)),
                (a, b) => Some(Duration::from_millis(a.min(b))),
            };
            prop_assert_eq!(results.outcome.requeue_after, expected);
            prop_assert!(!results.outcome.requeue);
        }

        #[test]
        fn prop_merge_order_does_not_change_delay(delays in proptest::collection::vec(0u64..600, 1..8)) {
            let mut forward = ReconcilerResults::<Widget>::default();
            let mut backward = ReconcilerResults::<Widget>::default();
            let mut root: Widget = widget("w", None);
            for d in &delays {
                forward.merge(&mut root, ComponentResult::requeue_after(Duration::from_secs(*d)));
            }
            for d in delays.iter().rev() {
                backward.merge(&mut root, ComponentResult::requeue_after(Duration::from_secs(*d)));
            }
            prop_assert_eq!(forward.outcome, backward.outcome);
        }
    }
}
