//! Expiration tiers selectable at upload time.

use crate::errors::StoreError;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// How long an upload survives, and whether it is burned after one read.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ExpirationPolicy {
    #[default]
    #[serde(rename = "delete_after_first_download")]
    DeleteAfterFirstDownload,
    #[serde(rename = "store_1_hour")]
    Store1Hour,
    #[serde(rename = "store_1_day")]
    Store1Day,
}

impl ExpirationPolicy {
    pub const ALL: [ExpirationPolicy; 3] = [
        ExpirationPolicy::DeleteAfterFirstDownload,
        ExpirationPolicy::Store1Hour,
        ExpirationPolicy::Store1Day,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExpirationPolicy::DeleteAfterFirstDownload => "delete_after_first_download",
            ExpirationPolicy::Store1Hour => "store_1_hour",
            ExpirationPolicy::Store1Day => "store_1_day",
        }
    }

    pub fn ttl_seconds(&self) -> i64 {
        match self {
            ExpirationPolicy::DeleteAfterFirstDownload => 300,
            ExpirationPolicy::Store1Hour => 3600,
            ExpirationPolicy::Store1Day => 86400,
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::seconds(self.ttl_seconds())
    }

    /// TTL of the shortest tier; objects created with it are deleted after
    /// their first successful read.
    pub fn shortest_ttl() -> Duration {
        Self::ALL
            .iter()
            .map(ExpirationPolicy::ttl)
            .min()
            .unwrap_or_else(Duration::zero)
    }
}

impl fmt::Display for ExpirationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExpirationPolicy {
    type Err = StoreError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|policy| policy.as_str() == token)
            .ok_or_else(|| StoreError::UnknownPolicy(token.to_string()))
    }
}
