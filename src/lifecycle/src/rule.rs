//! Declarative lifecycle rules: age threshold → target storage class.

use chrono::{DateTime, TimeDelta, Utc};
use common::config::RuleConfig;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::model::{StorageClass, StoredObject, UnknownStorageClass};

/// Which objects a rule applies to, by their current class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceClass {
    Any,
    Class(StorageClass),
}

impl SourceClass {
    pub fn parse(name: &str) -> Result<Self, UnknownStorageClass> {
        if name.trim().eq_ignore_ascii_case("any") {
            return Ok(SourceClass::Any);
        }
        StorageClass::parse(name).map(SourceClass::Class)
    }

    pub fn matches(&self, class: StorageClass) -> bool {
        match self {
            SourceClass::Any => true,
            SourceClass::Class(source) => *source == class,
        }
    }
}

impl fmt::Display for SourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceClass::Any => write!(f, "any"),
            SourceClass::Class(class) => write!(f, "{class}"),
        }
    }
}

/// A lifecycle policy. Rules are immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleRule {
    pub name: String,
    pub source: SourceClass,
    pub min_age: Duration,
    pub target: StorageClass,
    /// Lower numbers win; ties go to the rule declared first.
    pub priority: u32,
}

impl LifecycleRule {
    pub fn new(source: SourceClass, min_age: Duration, target: StorageClass) -> Self {
        let name = format!("{source}-to-{target}");
        Self {
            name,
            source,
            min_age,
            target,
            priority: 0,
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Whether `object` is in a matching class and old enough at `now`.
    pub fn matches(&self, object: &StoredObject, now: DateTime<Utc>) -> bool {
        if !self.source.matches(object.class) {
            return false;
        }

        // Thresholds beyond chrono's range can never be reached.
        match TimeDelta::from_std(self.min_age) {
            Ok(threshold) => object.age(now) >= threshold,
            Err(_) => false,
        }
    }

    /// Build a rule from its configuration entry at position `index`.
    pub fn from_config(index: usize, config: &RuleConfig) -> Result<Self, RuleError> {
        let name = config
            .name
            .clone()
            .unwrap_or_else(|| format!("rule-{index}"));

        let source =
            SourceClass::parse(&config.source).map_err(|source| RuleError::UnknownClass {
                rule: name.clone(),
                source,
            })?;
        let target =
            StorageClass::parse(&config.target).map_err(|source| RuleError::UnknownClass {
                rule: name.clone(),
                source,
            })?;

        if TimeDelta::from_std(config.min_age).is_err() {
            return Err(RuleError::AgeOutOfRange {
                rule: name,
                min_age: config.min_age,
            });
        }

        if source == SourceClass::Class(target) {
            return Err(RuleError::NoOp {
                rule: name,
                class: target,
            });
        }

        Ok(Self {
            name,
            source,
            min_age: config.min_age,
            target,
            priority: config.priority,
        })
    }

    /// Human-readable representation for logging.
    pub fn display(&self) -> String {
        format!(
            "rule={}, source={}, min_age={}, target={}, priority={}",
            self.name,
            self.source,
            humantime::format_duration(self.min_age),
            self.target,
            self.priority
        )
    }
}

/// Parse every configured rule, preserving declaration order.
pub fn rules_from_config(configs: &[RuleConfig]) -> Result<Vec<LifecycleRule>, RuleError> {
    configs
        .iter()
        .enumerate()
        .map(|(index, config)| LifecycleRule::from_config(index, config))
        .collect()
}

/// Errors raised while turning configuration into rules.
#[derive(Error, Debug)]
pub enum RuleError {
    #[error("Invalid lifecycle rule '{rule}': {source}")]
    UnknownClass {
        rule: String,
        source: UnknownStorageClass,
    },

    #[error("Invalid lifecycle rule '{rule}': minimum age {min_age:?} is out of range")]
    AgeOutOfRange { rule: String, min_age: Duration },

    #[error("Invalid lifecycle rule '{rule}': source and target are both {class}")]
    NoOp { rule: String, class: StorageClass },
}
