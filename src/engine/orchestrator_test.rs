//! Tests for the dependency gate and pass orchestration
//!
//! These tests drive full passes against the in-memory store and check:
//! - gate exclusivity and registration order
//! - error broadcast scope
//! - result merging across components
//! - commit triggering and failure reporting

#[cfg(test)]
mod tests {
    use super::super::orchestrator::*;
    use crate::engine::testing::{widget, Journal, Scripted, Widget, WidgetStatus};
    use crate::engine::watch::{ChangeDispatcher, Correlation, Subscription, WatchKind};
    use crate::engine::{ComponentResult, StatusModifier};
    use crate::error::Error;
    use crate::store::{MemoryStore, ObjectKey, ResourceStore, StoreExt, StoreFault};
    use k8s_openapi::api::core::v1::{ConfigMap, Secret};
    use kube::runtime::controller::Action;
    use std::sync::Arc;
    use std::time::Duration;

    fn key() -> ObjectKey {
        ObjectKey::namespaced("default", "w")
    }

    async fn seeded(status: Option<WidgetStatus>) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let created = store.create_as(&widget("w", None)).await.unwrap();
        if let Some(status) = status {
            let mut with_status = created;
            with_status.status = Some(status);
            store.update_status_as(&with_status).await.unwrap();
        }
        store.reset_stats().await;
        store
    }

    fn builder(store: &Arc<MemoryStore>) -> ComponentReconcilerBuilder<Widget> {
        let store: Arc<dyn ResourceStore> = store.clone();
        ComponentReconciler::builder("widget", store)
    }

    fn phase_is(phase: &'static str) -> impl Fn(&Widget) -> bool + Send + Sync {
        move |w: &Widget| {
            w.status
                .as_ref()
                .and_then(|s| s.phase.as_deref())
                == Some(phase)
        }
    }

    #[tokio::test]
    async fn test_gated_out_component_never_runs() {
        let store = seeded(None).await;
        let journal = Journal::default();
        let reconciler = builder(&store)
            .component(Scripted::new("a", &journal))
            .component(Scripted::new("b", &journal).gated(|_| false))
            .component(Scripted::new("c", &journal))
            .build();

        let report = reconciler.reconcile_pass(&key()).await;

        assert!(report.error.is_none());
        assert_eq!(journal.entries(), vec!["reconcile:a", "reconcile:c"]);
        assert_eq!(reconciler.component_names(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_gate_is_decided_before_any_component_runs() {
        let store = seeded(None).await;
        let journal = Journal::default();
        let reconciler = builder(&store)
            .component(Scripted::new("promote", &journal).step(|_| {
                Ok(ComponentResult::with_status(StatusModifier::infallible(
                    "phase",
                    |s: &mut WidgetStatus| s.phase = Some("Ready".to_string()),
                )))
            }))
            .component(Scripted::new("needs-ready", &journal).gated(phase_is("Ready")))
            .build();

        reconciler.reconcile_pass(&key()).await;
        assert_eq!(journal.entries(), vec!["reconcile:promote"]);

        // The next pass sees the committed phase
        reconciler.reconcile_pass(&key()).await;
        assert_eq!(
            journal.entries(),
            vec!["reconcile:promote", "reconcile:promote", "reconcile:needs-ready"]
        );
    }

    #[tokio::test]
    async fn test_error_broadcast_scope() {
        let store = seeded(None).await;
        let journal = Journal::default();
        let reconciler = builder(&store)
            .component(
                Scripted::new("a", &journal).handles_errors(|_| Ok(ComponentResult::done())),
            )
            .component(Scripted::new("b", &journal).failing("b broke"))
            .component(
                Scripted::new("c", &journal)
                    .gated(|_| false)
                    .handles_errors(|_| Ok(ComponentResult::done())),
            )
            .build();

        let report = reconciler.reconcile_pass(&key()).await;

        assert_eq!(journal.entries(), vec!["reconcile:a", "reconcile:b", "error:a"]);
        match report.error {
            Some(Error::ValidationError(message)) => assert_eq!(message, "b broke"),
            other => panic!("unexpected pass error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_ready_handler() {
        let store = seeded(None).await;
        let journal = Journal::default();
        let reconciler = builder(&store)
            .component(
                Scripted::new("a", &journal).handles_errors(|_| Ok(ComponentResult::done())),
            )
            .component(
                Scripted::new("b", &journal)
                    .failing("b broke")
                    .handles_errors(|_| Ok(ComponentResult::done())),
            )
            .component(
                Scripted::new("c", &journal).handles_errors(|_| Ok(ComponentResult::done())),
            )
            .component(Scripted::new("d", &journal))
            .build();

        reconciler.reconcile_pass(&key()).await;

        // c and d are skipped for primary work; c still hears about the failure
        assert_eq!(
            journal.entries(),
            vec!["reconcile:a", "reconcile:b", "error:a", "error:b", "error:c"]
        );
    }

    #[tokio::test]
    async fn test_error_handler_status_is_committed() {
        let store = seeded(None).await;
        let journal = Journal::default();
        let reconciler = builder(&store)
            .component(Scripted::new("status", &journal).handles_errors(|e| {
                let message = e.to_string();
                Ok(ComponentResult::with_status(StatusModifier::infallible(
                    "record-error",
                    move |s: &mut WidgetStatus| {
                        s.phase = Some("Error".to_string());
                        s.history.push(message.clone());
                    },
                )))
            }))
            .component(Scripted::new("broken", &journal).failing("disk full"))
            .build();

        let report = reconciler.reconcile_pass(&key()).await;
        assert!(report.error.is_some());

        let stored: Widget = store.get_as(&key()).await.unwrap();
        let status = stored.status.unwrap();
        assert_eq!(status.phase.as_deref(), Some("Error"));
        assert_eq!(status.history, vec!["Validation error: disk full"]);
    }

    #[tokio::test]
    async fn test_handler_failure_does_not_mask_primary_error() {
        let store = seeded(None).await;
        let journal = Journal::default();
        let reconciler = builder(&store)
            .component(
                Scripted::new("a", &journal)
                    .handles_errors(|_| Err(Error::ConfigError("handler broke".to_string()))),
            )
            .component(Scripted::new("b", &journal).failing("primary"))
            .build();

        let report = reconciler.reconcile_pass(&key()).await;

        match report.error {
            Some(Error::ValidationError(message)) => assert_eq!(message, "primary"),
            other => panic!("unexpected pass error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_concrete_defaults_database_notify() {
        let store = seeded(None).await;
        let journal = Journal::default();
        let reconciler = builder(&store)
            .component(Scripted::new("defaults", &journal).step(|w| {
                w.spec.replicas.get_or_insert(1);
                Ok(ComponentResult::done())
            }))
            .component(
                Scripted::new("database", &journal)
                    .gated(phase_is("Ready"))
                    .step(|_| {
                        Ok(ComponentResult::with_status(StatusModifier::infallible(
                            "db-ready",
                            |s: &mut WidgetStatus| s.db_ready = true,
                        )))
                    }),
            )
            .component(
                Scripted::new("notify", &journal)
                    .gated(phase_is("Ready"))
                    .step(|w| {
                        assert_eq!(w.spec.replicas, Some(1));
                        match w.status.as_ref() {
                            Some(s) if s.db_ready => Ok(ComponentResult::done()),
                            _ => Err(Error::ValidationError("database not ready".to_string())),
                        }
                    }),
            )
            .build();

        let first = reconciler.reconcile_pass(&key()).await;
        assert!(first.error.is_none());
        assert_eq!(first.outcome, Default::default());
        assert_eq!(journal.entries(), vec!["reconcile:defaults"]);
        assert_eq!(store.stats().await.status_updates, 0);

        let mut root: Widget = store.get_as(&key()).await.unwrap();
        root.status = Some(WidgetStatus {
            phase: Some("Ready".to_string()),
            ..Default::default()
        });
        store.update_status_as(&root).await.unwrap();

        let second = reconciler.reconcile_pass(&key()).await;
        assert!(second.error.is_none());
        assert_eq!(
            journal.entries(),
            vec![
                "reconcile:defaults",
                "reconcile:defaults",
                "reconcile:database",
                "reconcile:notify"
            ]
        );

        let stored: Widget = store.get_as(&key()).await.unwrap();
        assert!(stored.status.unwrap().db_ready);
        // Defaults are applied in memory only
        assert_eq!(stored.spec.replicas, None);
    }

    #[tokio::test]
    async fn test_missing_root_yields_default_report() {
        let store = Arc::new(MemoryStore::new());
        let journal = Journal::default();
        let reconciler = builder(&store)
            .component(Scripted::new("a", &journal))
            .build();

        let report = reconciler.reconcile_pass(&key()).await;

        assert!(report.error.is_none());
        assert_eq!(report.outcome, Default::default());
        assert!(journal.entries().is_empty());
        assert_eq!(report.into_action(None).unwrap(), Action::await_change());
    }

    #[tokio::test]
    async fn test_requeue_requests_are_merged() {
        let store = seeded(None).await;
        let journal = Journal::default();
        let reconciler = builder(&store)
            .component(
                Scripted::new("a", &journal)
                    .step(|_| Ok(ComponentResult::requeue_after(Duration::from_secs(30)))),
            )
            .component(
                Scripted::new("b", &journal)
                    .step(|_| Ok(ComponentResult::requeue_after(Duration::from_secs(10)))),
            )
            .component(Scripted::new("c", &journal).step(|_| Ok(ComponentResult::requeue())))
            .build();

        let report = reconciler.reconcile_pass(&key()).await;

        assert!(report.outcome.requeue);
        assert_eq!(report.outcome.requeue_after, Some(Duration::from_secs(10)));
        assert_eq!(
            report.into_action(None).unwrap(),
            Action::requeue(Duration::from_secs(10))
        );
    }

    #[test]
    fn test_into_action_mapping() {
        let immediate = PassReport {
            outcome: crate::engine::PassOutcome {
                requeue: true,
                requeue_after: None,
            },
            error: None,
        };
        assert_eq!(immediate.into_action(None).unwrap(), Action::requeue(Duration::ZERO));

        let idle = PassReport::default();
        assert_eq!(
            idle.into_action(Some(Duration::from_secs(300))).unwrap(),
            Action::requeue(Duration::from_secs(300))
        );

        let failed = PassReport {
            outcome: Default::default(),
            error: Some(Error::ConfigError("bad".to_string())),
        };
        assert!(failed.into_action(None).is_err());
    }

    #[tokio::test]
    async fn test_modifier_effects_are_visible_to_later_components() {
        let store = seeded(None).await;
        let journal = Journal::default();
        let reconciler = builder(&store)
            .component(Scripted::new("count", &journal).step(|_| {
                Ok(ComponentResult::with_status(StatusModifier::infallible(
                    "count",
                    |s: &mut WidgetStatus| s.counter += 1,
                )))
            }))
            .component(Scripted::new("observe", &journal).step(|w| {
                let seen = w.status.as_ref().map(|s| s.counter).unwrap_or_default();
                Ok(ComponentResult::with_status(StatusModifier::infallible(
                    "observe",
                    move |s: &mut WidgetStatus| s.history.push(format!("saw {}", seen)),
                )))
            }))
            .build();

        reconciler.reconcile_pass(&key()).await;

        let stored: Widget = store.get_as(&key()).await.unwrap();
        let status = stored.status.unwrap();
        assert_eq!(status.counter, 1);
        assert_eq!(status.history, vec!["saw 1"]);
    }

    #[tokio::test]
    async fn test_failing_modifier_does_not_halt_the_pass() {
        let store = seeded(None).await;
        let journal = Journal::default();
        let reconciler = builder(&store)
            .component(Scripted::new("bad-modifier", &journal).step(|_| {
                Ok(ComponentResult::with_status(StatusModifier::new(
                    "reject",
                    |_: &mut WidgetStatus| Err(Error::status_modifier("reject", "invalid")),
                )))
            }))
            .component(Scripted::new("after", &journal))
            .build();

        let report = reconciler.reconcile_pass(&key()).await;

        assert_eq!(journal.entries(), vec!["reconcile:bad-modifier", "reconcile:after"]);
        assert!(matches!(
            report.error,
            Some(Error::StatusModifierError { .. })
        ));
    }

    #[tokio::test]
    async fn test_unchanged_status_is_not_written() {
        let store = seeded(Some(WidgetStatus {
            phase: Some("Ready".to_string()),
            ..Default::default()
        }))
        .await;
        let journal = Journal::default();
        let reconciler = builder(&store)
            .component(Scripted::new("same", &journal).step(|_| {
                Ok(ComponentResult::with_status(StatusModifier::infallible(
                    "same-phase",
                    |s: &mut WidgetStatus| s.phase = Some("Ready".to_string()),
                )))
            }))
            .build();

        let report = reconciler.reconcile_pass(&key()).await;

        assert!(report.error.is_none());
        assert_eq!(store.stats().await.status_updates, 0);
    }

    #[tokio::test]
    async fn test_commit_failure_becomes_pass_error() {
        let store = seeded(None).await;
        store.always_fail_status_updates(StoreFault::Unavailable).await;
        let journal = Journal::default();
        let reconciler = builder(&store)
            .component(Scripted::new("count", &journal).step(|_| {
                Ok(ComponentResult::with_status(StatusModifier::infallible(
                    "count",
                    |s: &mut WidgetStatus| s.counter += 1,
                )))
            }))
            .build();

        let report = reconciler.reconcile_pass(&key()).await;

        match report.error {
            Some(Error::StatusCommitError { attempts, .. }) => assert_eq!(attempts, 5),
            other => panic!("unexpected pass error: {:?}", other),
        }
    }

    #[derive(Default)]
    struct Collecting(Vec<Subscription<Widget>>);

    impl ChangeDispatcher<Widget> for Collecting {
        fn subscribe(&mut self, subscription: Subscription<Widget>) {
            self.0.push(subscription);
        }
    }

    #[tokio::test]
    async fn test_register_watches_deduplicates_owner_kinds() {
        let store = Arc::new(MemoryStore::new());
        let journal = Journal::default();
        let reconciler = builder(&store)
            .component(
                Scripted::new("a", &journal)
                    .watching(vec![WatchKind::of::<Secret>(), WatchKind::of::<ConfigMap>()]),
            )
            .component(Scripted::new("b", &journal).watching(vec![WatchKind::of::<Secret>()]))
            .build();

        let mut dispatcher = Collecting::default();
        reconciler.register_watches(&mut dispatcher);

        assert_eq!(dispatcher.0.len(), 2);
        assert!(dispatcher
            .0
            .iter()
            .all(|s| matches!(s.correlation, Correlation::Owner) && s.component == "a"));
    }
}
