//! Periodic lifecycle cycles
//!
//! A cycle takes a fresh listing of the container, evaluates it against the
//! rules and applies the resulting transitions. Cycles never overlap: the
//! next tick is only awaited once the previous cycle has returned.

use chrono::{DateTime, Utc};
use common::config::{LifecycleConfig, MAX_INTERVAL};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

use crate::evaluator::LifecycleEvaluator;
use crate::executor::{ExecutorConfig, LifecycleExecutor, TransitionOutcome, TransitionResult};
use crate::metrics::LifecycleMetrics;
use crate::rule::LifecycleRule;
use crate::store::{FailureKind, StoreError, TierStore};

/// Outcome counts for one cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub planned: usize,
    pub applied: usize,
    pub skipped: usize,
    pub store_unavailable: usize,
    pub object_not_found: usize,
    pub permission_denied: usize,
}

impl CycleSummary {
    pub fn from_results(results: &[TransitionResult]) -> Self {
        let mut summary = Self {
            planned: results.len(),
            ..Default::default()
        };
        for result in results {
            match &result.outcome {
                TransitionOutcome::Applied => summary.applied += 1,
                TransitionOutcome::Skipped => summary.skipped += 1,
                TransitionOutcome::Failed { kind, .. } => match kind {
                    FailureKind::StoreUnavailable => summary.store_unavailable += 1,
                    FailureKind::ObjectNotFound => summary.object_not_found += 1,
                    FailureKind::PermissionDenied => summary.permission_denied += 1,
                },
            }
        }
        summary
    }

    pub fn failed(&self) -> usize {
        self.store_unavailable + self.object_not_found + self.permission_denied
    }
}

/// Everything that happened during one cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub container: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub objects_scanned: usize,
    pub results: Vec<TransitionResult>,
    pub summary: CycleSummary,
}

impl CycleReport {
    /// Log the cycle summary
    pub fn log(&self) {
        let duration_ms = (self.completed_at - self.started_at).num_milliseconds();
        if self.summary.failed() > 0 {
            tracing::warn!(
                cycle_id = %self.cycle_id,
                container = %self.container,
                objects_scanned = self.objects_scanned,
                planned = self.summary.planned,
                applied = self.summary.applied,
                skipped = self.summary.skipped,
                failed = self.summary.failed(),
                store_unavailable = self.summary.store_unavailable,
                object_not_found = self.summary.object_not_found,
                permission_denied = self.summary.permission_denied,
                duration_ms,
                "Lifecycle cycle completed with failures"
            );
        } else {
            tracing::info!(
                cycle_id = %self.cycle_id,
                container = %self.container,
                objects_scanned = self.objects_scanned,
                planned = self.summary.planned,
                applied = self.summary.applied,
                skipped = self.summary.skipped,
                duration_ms,
                "Lifecycle cycle completed"
            );
        }
    }
}

/// Configuration for the cycle loop
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub container: String,
    pub interval: Duration,
    /// Run a cycle immediately instead of waiting one interval
    pub run_on_start: bool,
}

impl From<&LifecycleConfig> for SchedulerConfig {
    fn from(config: &LifecycleConfig) -> Self {
        Self {
            container: config.container.clone(),
            interval: config.interval,
            run_on_start: config.run_on_start,
        }
    }
}

pub struct LifecycleScheduler {
    store: Arc<dyn TierStore>,
    evaluator: LifecycleEvaluator,
    executor: LifecycleExecutor,
    config: SchedulerConfig,
}

impl LifecycleScheduler {
    pub fn new(
        store: Arc<dyn TierStore>,
        evaluator: LifecycleEvaluator,
        executor: LifecycleExecutor,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            evaluator,
            executor,
            config,
        }
    }

    /// Wire an evaluator, executor and scheduler from lifecycle configuration.
    pub fn from_config(
        store: Arc<dyn TierStore>,
        rules: Vec<LifecycleRule>,
        config: &LifecycleConfig,
        metrics: LifecycleMetrics,
    ) -> Self {
        let executor = LifecycleExecutor::new(ExecutorConfig::from(config), metrics);
        Self::new(
            store,
            LifecycleEvaluator::new(rules),
            executor,
            SchedulerConfig::from(config),
        )
    }

    pub fn metrics(&self) -> &LifecycleMetrics {
        self.executor.metrics()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run one list, evaluate, execute cycle with `now` as the age reference.
    ///
    /// A listing failure aborts the cycle before anything is executed.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleReport, StoreError> {
        let cycle_id = Uuid::new_v4();
        let started_at = Utc::now();
        let metrics = self.metrics();
        metrics.record_cycle_start();

        tracing::debug!(cycle_id = %cycle_id, container = %self.config.container, "Starting lifecycle cycle");

        let objects = match self.store.list(&self.config.container).await {
            Ok(objects) => objects,
            Err(e) => {
                tracing::error!(
                    cycle_id = %cycle_id,
                    container = %self.config.container,
                    error = %e,
                    "Listing failed, skipping cycle"
                );
                metrics.record_cycle_failure();
                return Err(e);
            }
        };
        metrics.record_objects_scanned(objects.len());

        let transitions = self.evaluator.evaluate(&objects, now);
        metrics.record_transitions_planned(transitions.len());
        for transition in &transitions {
            transition.log();
        }

        let results = self
            .executor
            .execute(transitions, self.store.as_ref())
            .await;

        let completed_at = Utc::now();
        let elapsed = (completed_at - started_at).to_std().unwrap_or_default();
        metrics.record_cycle_complete(elapsed);

        let report = CycleReport {
            cycle_id,
            container: self.config.container.clone(),
            started_at,
            completed_at,
            objects_scanned: objects.len(),
            summary: CycleSummary::from_results(&results),
            results,
        };
        report.log();
        Ok(report)
    }

    /// Fire cycles on the configured interval until `shutdown` turns true or
    /// its sender is dropped.
    ///
    /// Shutdown is only observed between cycles; a running cycle always
    /// finishes. Ticks missed while a cycle runs are skipped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let period = self.config.interval.min(MAX_INTERVAL);
        let now = Instant::now();
        let start = if self.config.run_on_start {
            now
        } else {
            now.checked_add(period).unwrap_or(now)
        };
        let mut ticker = tokio::time::interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            container = %self.config.container,
            interval = %humantime::format_duration(period),
            run_on_start = self.config.run_on_start,
            "Lifecycle scheduler started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            // Errors are already logged; the next tick retries.
            let _ = self.run_cycle(Utc::now()).await;
        }

        self.metrics().log();
        tracing::info!(container = %self.config.container, "Lifecycle scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ObjectId, StorageClass};
    use crate::rule::SourceClass;
    use crate::store::{InMemoryTierStore, MockTierStore};
    use chrono::TimeDelta;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn config(run_on_start: bool, interval: Duration) -> LifecycleConfig {
        LifecycleConfig {
            container: "uploads".to_string(),
            interval,
            run_on_start,
            ..Default::default()
        }
    }

    fn hot_to_cool() -> Vec<LifecycleRule> {
        vec![LifecycleRule::new(
            SourceClass::Class(StorageClass::Hot),
            30 * DAY,
            StorageClass::Cool,
        )]
    }

    async fn seeded_store(now: DateTime<Utc>) -> Arc<InMemoryTierStore> {
        let store = Arc::new(InMemoryTierStore::new());
        store
            .insert(
                ObjectId::new("uploads", "old"),
                "o",
                StorageClass::Hot,
                now - TimeDelta::days(45),
            )
            .await;
        store
            .insert(
                ObjectId::new("uploads", "new"),
                "n",
                StorageClass::Hot,
                now - TimeDelta::days(5),
            )
            .await;
        store
    }

    async fn wait_for_cycles(metrics: &LifecycleMetrics, count: usize) {
        for _ in 0..200 {
            if metrics.cycles_completed() + metrics.cycles_failed() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("scheduler did not run {count} cycle(s)");
    }

    #[test]
    fn test_summary_counts_by_kind() {
        use crate::evaluator::{Transition, TransitionReason};

        let transition = Transition {
            object: ObjectId::new("c", "o"),
            from: StorageClass::Hot,
            to: StorageClass::Cool,
            reason: TransitionReason {
                rule_name: "r".to_string(),
                rule_index: 0,
            },
        };
        let result = |outcome| TransitionResult {
            transition: transition.clone(),
            outcome,
            completed_at: Utc::now(),
        };
        let results = vec![
            result(TransitionOutcome::Applied),
            result(TransitionOutcome::Applied),
            result(TransitionOutcome::Failed {
                kind: FailureKind::StoreUnavailable,
                message: "timeout".to_string(),
            }),
            result(TransitionOutcome::Failed {
                kind: FailureKind::ObjectNotFound,
                message: "gone".to_string(),
            }),
            result(TransitionOutcome::Skipped),
        ];

        let summary = CycleSummary::from_results(&results);
        assert_eq!(summary.planned, 5);
        assert_eq!(summary.applied, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.store_unavailable, 1);
        assert_eq!(summary.object_not_found, 1);
        assert_eq!(summary.permission_denied, 0);
        assert_eq!(summary.failed(), 2);
    }

    #[tokio::test]
    async fn test_run_cycle_applies_due_transitions() {
        let now = Utc::now();
        let store = seeded_store(now).await;
        let scheduler = LifecycleScheduler::from_config(
            store.clone(),
            hot_to_cool(),
            &config(false, DAY),
            LifecycleMetrics::new(),
        );

        let report = scheduler.run_cycle(now).await.unwrap();

        assert_eq!(report.objects_scanned, 2);
        assert_eq!(report.summary.planned, 1);
        assert_eq!(report.summary.applied, 1);
        assert_eq!(report.results[0].transition.object.name, "old");
        assert_eq!(
            store.class_of(&ObjectId::new("uploads", "old")).await,
            Some(StorageClass::Cool)
        );
        assert_eq!(
            store.class_of(&ObjectId::new("uploads", "new")).await,
            Some(StorageClass::Hot)
        );

        // A second cycle finds nothing left to do
        let report = scheduler.run_cycle(now).await.unwrap();
        assert_eq!(report.summary.planned, 0);
        assert_eq!(scheduler.metrics().cycles_completed(), 2);
        assert_eq!(scheduler.metrics().transitions_applied(), 1);
    }

    #[tokio::test]
    async fn test_listing_failure_aborts_cycle() {
        let mut store = MockTierStore::new();
        store
            .expect_list()
            .returning(|_| Err(StoreError::Unavailable("connection refused".to_string())));
        store.expect_set_tier().never();
        let scheduler = LifecycleScheduler::from_config(
            Arc::new(store),
            hot_to_cool(),
            &config(false, DAY),
            LifecycleMetrics::new(),
        );

        let err = scheduler.run_cycle(Utc::now()).await.unwrap_err();

        assert_eq!(err.kind(), FailureKind::StoreUnavailable);
        assert_eq!(scheduler.metrics().cycles_failed(), 1);
        assert_eq!(scheduler.metrics().cycles_completed(), 0);
    }

    #[tokio::test]
    async fn test_dry_run_cycle_leaves_store_untouched() {
        let now = Utc::now();
        let store = seeded_store(now).await;
        let mut lifecycle = config(false, DAY);
        lifecycle.dry_run = true;
        let scheduler = LifecycleScheduler::from_config(
            store.clone(),
            hot_to_cool(),
            &lifecycle,
            LifecycleMetrics::new(),
        );

        let report = scheduler.run_cycle(now).await.unwrap();

        assert_eq!(report.summary.skipped, 1);
        assert_eq!(report.summary.applied, 0);
        assert_eq!(
            store.class_of(&ObjectId::new("uploads", "old")).await,
            Some(StorageClass::Hot)
        );
    }

    #[tokio::test]
    async fn test_run_on_start_then_shutdown() {
        let store = seeded_store(Utc::now()).await;
        let metrics = LifecycleMetrics::new();
        let scheduler = Arc::new(LifecycleScheduler::from_config(
            store.clone(),
            hot_to_cool(),
            &config(true, DAY),
            metrics.clone(),
        ));
        let (tx, rx) = watch::channel(false);

        let handle = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.run(rx).await })
        };

        wait_for_cycles(&metrics, 1).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(metrics.cycles_completed(), 1);
        assert_eq!(
            store.class_of(&ObjectId::new("uploads", "old")).await,
            Some(StorageClass::Cool)
        );
    }

    #[tokio::test]
    async fn test_interval_fires_repeatedly() {
        let store = seeded_store(Utc::now()).await;
        let metrics = LifecycleMetrics::new();
        let scheduler = Arc::new(LifecycleScheduler::from_config(
            store,
            hot_to_cool(),
            &config(false, Duration::from_millis(20)),
            metrics.clone(),
        ));
        let (tx, rx) = watch::channel(false);

        let handle = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.run(rx).await })
        };

        wait_for_cycles(&metrics, 3).await;
        drop(tx);
        handle.await.unwrap();

        assert!(metrics.cycles_completed() >= 3);
    }

    #[tokio::test]
    async fn test_shutdown_before_first_tick() {
        let mut store = MockTierStore::new();
        store.expect_list().never();
        let scheduler = LifecycleScheduler::from_config(
            Arc::new(store),
            hot_to_cool(),
            &config(false, DAY),
            LifecycleMetrics::new(),
        );
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        scheduler.run(rx).await;

        assert_eq!(scheduler.metrics().cycles_started(), 0);
    }

    #[tokio::test]
    async fn test_oversized_interval_waits_without_overflow() {
        let mut store = MockTierStore::new();
        store.expect_list().never();
        let scheduler = Arc::new(LifecycleScheduler::from_config(
            Arc::new(store),
            hot_to_cool(),
            &config(false, Duration::MAX),
            LifecycleMetrics::new(),
        ));
        let (tx, rx) = watch::channel(false);

        let handle = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.run(rx).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();

        handle.await.unwrap();
        assert_eq!(scheduler.metrics().cycles_started(), 0);
    }
}
