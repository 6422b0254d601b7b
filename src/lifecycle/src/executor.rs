//! Transition execution
//!
//! Applies planned transitions against a [`TierStore`]. Every transition is
//! independent: a failure is recorded in that transition's result and the
//! rest of the batch carries on. Nothing is retried here; an unchanged
//! object is re-planned on the next cycle.

use chrono::{DateTime, Utc};
use common::config::LifecycleConfig;
use futures::StreamExt;

use crate::evaluator::Transition;
use crate::metrics::LifecycleMetrics;
use crate::store::{FailureKind, StoreError, TierStore};

/// What happened to a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    Failed { kind: FailureKind, message: String },
    /// Dry-run mode: the store was not touched.
    Skipped,
}

/// Outcome of one transition
#[derive(Debug, Clone)]
pub struct TransitionResult {
    pub transition: Transition,
    pub outcome: TransitionOutcome,
    pub completed_at: DateTime<Utc>,
}

impl TransitionResult {
    pub fn is_applied(&self) -> bool {
        self.outcome == TransitionOutcome::Applied
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match &self.outcome {
            TransitionOutcome::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Configuration for transition execution
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum transitions in flight at once
    pub max_concurrency: usize,
    pub dry_run: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            dry_run: false,
        }
    }
}

impl From<&LifecycleConfig> for ExecutorConfig {
    fn from(config: &LifecycleConfig) -> Self {
        Self {
            max_concurrency: config.max_concurrency.max(1),
            dry_run: config.dry_run,
        }
    }
}

pub struct LifecycleExecutor {
    config: ExecutorConfig,
    metrics: LifecycleMetrics,
}

impl LifecycleExecutor {
    pub fn new(config: ExecutorConfig, metrics: LifecycleMetrics) -> Self {
        Self { config, metrics }
    }

    /// Apply every transition, returning one result per transition in input order.
    ///
    /// Up to `max_concurrency` tier changes run at once. The call only
    /// returns after every started change has finished.
    pub async fn execute(
        &self,
        transitions: Vec<Transition>,
        store: &dyn TierStore,
    ) -> Vec<TransitionResult> {
        if transitions.is_empty() {
            return Vec::new();
        }

        tracing::debug!(
            transitions = transitions.len(),
            max_concurrency = self.config.max_concurrency,
            dry_run = self.config.dry_run,
            "Executing transitions"
        );

        futures::stream::iter(transitions)
            .map(|transition| self.apply(transition, store))
            .buffered(self.config.max_concurrency.max(1))
            .collect()
            .await
    }

    async fn apply(&self, transition: Transition, store: &dyn TierStore) -> TransitionResult {
        if self.config.dry_run {
            tracing::info!(
                object = %transition.object,
                from = %transition.from,
                to = %transition.to,
                rule = %transition.reason.rule_name,
                "Dry run: would change storage class"
            );
            self.metrics.record_skipped();
            return Self::finish(transition, TransitionOutcome::Skipped);
        }

        match store.set_tier(&transition.object, transition.to).await {
            Ok(()) => {
                tracing::info!(
                    object = %transition.object,
                    from = %transition.from,
                    to = %transition.to,
                    rule = %transition.reason.rule_name,
                    "Changed storage class"
                );
                self.metrics.record_applied();
                Self::finish(transition, TransitionOutcome::Applied)
            }
            Err(e) => {
                let kind = e.kind();
                Self::log_failure(&transition, &e);
                self.metrics.record_failure(kind);
                Self::finish(
                    transition,
                    TransitionOutcome::Failed {
                        kind,
                        message: e.to_string(),
                    },
                )
            }
        }
    }

    fn log_failure(transition: &Transition, error: &StoreError) {
        match error.kind() {
            FailureKind::ObjectNotFound => tracing::info!(
                object = %transition.object,
                "Object disappeared before its storage class could be changed"
            ),
            FailureKind::StoreUnavailable => tracing::warn!(
                object = %transition.object,
                to = %transition.to,
                error = %error,
                "Storage class change failed, will be retried next cycle"
            ),
            FailureKind::PermissionDenied => tracing::error!(
                object = %transition.object,
                to = %transition.to,
                error = %error,
                "Storage class change denied"
            ),
        }
    }

    fn finish(transition: Transition, outcome: TransitionOutcome) -> TransitionResult {
        TransitionResult {
            transition,
            outcome,
            completed_at: Utc::now(),
        }
    }

    /// Get the metrics tracker
    pub fn metrics(&self) -> &LifecycleMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }
}
