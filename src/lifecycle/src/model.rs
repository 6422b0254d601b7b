//! Object snapshots and the storage classes they live in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Storage class (access tier) assigned to a stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageClass {
    /// Frequently accessed data.
    Hot,
    /// Infrequently accessed data.
    Cool,
    /// Rarely accessed data.
    Cold,
    /// Offline data that must be rehydrated before reading.
    Archive,
}

impl StorageClass {
    pub const ALL: [StorageClass; 4] = [
        StorageClass::Hot,
        StorageClass::Cool,
        StorageClass::Cold,
        StorageClass::Archive,
    ];

    /// Canonical name of this class.
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageClass::Hot => "hot",
            StorageClass::Cool => "cool",
            StorageClass::Cold => "cold",
            StorageClass::Archive => "archive",
        }
    }

    /// Parse a class name, ignoring case and surrounding whitespace.
    pub fn parse(name: &str) -> Result<Self, UnknownStorageClass> {
        match name.trim().to_ascii_lowercase().as_str() {
            "hot" => Ok(StorageClass::Hot),
            "cool" => Ok(StorageClass::Cool),
            "cold" => Ok(StorageClass::Cold),
            "archive" => Ok(StorageClass::Archive),
            _ => Err(UnknownStorageClass(name.to_string())),
        }
    }
}

impl FromStr for StorageClass {
    type Err = UnknownStorageClass;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for StorageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown storage class: '{0}'")]
pub struct UnknownStorageClass(pub String);

/// Identifies an object: its name is unique within the container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId {
    pub container: String,
    pub name: String,
}

impl ObjectId {
    pub fn new(container: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.name)
    }
}

/// Point-in-time metadata of a stored object. Not a live handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub id: ObjectId,
    pub last_modified: DateTime<Utc>,
    pub class: StorageClass,
    pub size: Option<u64>,
}

impl StoredObject {
    /// Time elapsed since the object was last modified. Negative when
    /// `last_modified` lies in the future.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::TimeDelta {
        now.signed_duration_since(self.last_modified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(StorageClass::parse("Hot").unwrap(), StorageClass::Hot);
        assert_eq!(StorageClass::parse("COOL").unwrap(), StorageClass::Cool);
        assert_eq!(StorageClass::parse(" cold ").unwrap(), StorageClass::Cold);
        assert_eq!(
            "archive".parse::<StorageClass>().unwrap(),
            StorageClass::Archive
        );
    }

    #[test]
    fn test_parse_rejects_substrings() {
        // "Hot" inside another name must not match
        assert!(StorageClass::parse("hottest").is_err());
        assert!(StorageClass::parse("").is_err());
        assert_eq!(
            StorageClass::parse("premium").unwrap_err(),
            UnknownStorageClass("premium".to_string())
        );
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        for class in StorageClass::ALL {
            assert_eq!(StorageClass::parse(&class.to_string()).unwrap(), class);
        }
    }

    #[test]
    fn test_object_age() {
        let now = Utc::now();
        let object = StoredObject {
            id: ObjectId::new("uploads", "a.txt"),
            last_modified: now - chrono::Duration::days(3),
            class: StorageClass::Hot,
            size: Some(12),
        };
        assert_eq!(object.age(now), chrono::Duration::days(3));
        assert_eq!(object.id.to_string(), "uploads/a.txt");
    }
}
