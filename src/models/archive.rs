// Archive records for the local and remote tiers

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Where an archive lives. Each tier is pruned under its own policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Local,
    Remote,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Local => f.write_str("local"),
            Tier::Remote => f.write_str("remote"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveRecord {
    /// `backup_YYYYMMDD_HHMMSS.<ext>`; identity within a tier.
    pub name: String,
    /// Milliseconds since the Unix epoch, derived from the name.
    pub created_at: u64,
    pub size_bytes: u64,
    pub tier: Tier,
}

impl ArchiveRecord {
    /// Newest first: `created_at` descending, equal timestamps by name descending.
    pub fn newest_first(a: &Self, b: &Self) -> Ordering {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.name.cmp(&a.name))
    }
}

/// Upper bound on archives kept in one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionPolicy {
    pub max_count: usize,
}

impl RetentionPolicy {
    pub fn keep_last(max_count: usize) -> Self {
        Self { max_count }
    }
}
