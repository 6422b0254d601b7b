//! Storage lifecycle engine
//!
//! Moves objects between storage classes as they age. A cycle takes a
//! listing snapshot from a [`TierStore`], lets the [`LifecycleEvaluator`]
//! match it against declarative [`LifecycleRule`]s, and hands the resulting
//! transitions to the [`LifecycleExecutor`], which applies each one
//! independently. The [`LifecycleScheduler`] drives cycles on an interval.

pub mod evaluator;
pub mod executor;
pub mod metrics;
pub mod model;
pub mod rule;
pub mod scheduler;
pub mod store;

pub use evaluator::{LifecycleEvaluator, Transition, TransitionReason, evaluate};
pub use executor::{ExecutorConfig, LifecycleExecutor, TransitionOutcome, TransitionResult};
pub use metrics::LifecycleMetrics;
pub use model::{ObjectId, StorageClass, StoredObject, UnknownStorageClass};
pub use rule::{LifecycleRule, RuleError, SourceClass, rules_from_config};
pub use scheduler::{CycleReport, CycleSummary, LifecycleScheduler, SchedulerConfig};
pub use store::{
    FailureKind, InMemoryTierStore, ObjectStoreTierStore, ProviderTiers, StoreError, TierStore,
};
