//! Token version and expiration policy.
//!
//! Read once at startup, typically from JSON:
//!
//! ```json
//! {
//!   "versionPolicy": { "minimumVersion": 1, "currentVersion": 2 },
//!   "expirationPolicy": { "expirationOffset": 1, "expirationUnit": "YEARS" }
//! }
//! ```

use std::{fmt, str::FromStr};

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Problems found while loading or validating a [TokenPolicy]
#[derive(Error, Debug)]
pub enum PolicyError {
    /// The JSON could not be parsed
    #[error("Unable to parse token policy: {0}")]
    Parse(#[from] serde_json::Error),

    /// The minimum version is zero or above the current version
    #[error("Invalid version range: minimum {minimum}, current {current}")]
    InvalidVersionRange {
        /// Configured minimum version
        minimum: u32,
        /// Configured current version
        current: u32,
    },

    /// The expiration offset is not positive
    #[error("Expiration offset must be positive, got {0}")]
    InvalidOffset(i64),

    /// An unrecognized time unit
    #[error("Unknown time unit: {0:?}")]
    UnknownUnit(String),
}

/// Calendar or clock unit used by an [ExpirationPolicy]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    /// Whole seconds
    Seconds,
    /// Whole minutes
    Minutes,
    /// Whole hours
    Hours,
    /// Whole days
    Days,
    /// Calendar months
    Months,
    /// Calendar years
    Years,
}

impl TimeUnit {
    fn name(&self) -> &'static str {
        match self {
            TimeUnit::Seconds => "SECONDS",
            TimeUnit::Minutes => "MINUTES",
            TimeUnit::Hours => "HOURS",
            TimeUnit::Days => "DAYS",
            TimeUnit::Months => "MONTHS",
            TimeUnit::Years => "YEARS",
        }
    }
}

impl FromStr for TimeUnit {
    type Err = PolicyError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Ok(match name.to_ascii_uppercase().as_str() {
            "SECONDS" => TimeUnit::Seconds,
            "MINUTES" => TimeUnit::Minutes,
            "HOURS" => TimeUnit::Hours,
            "DAYS" => TimeUnit::Days,
            "MONTHS" => TimeUnit::Months,
            "YEARS" => TimeUnit::Years,
            _ => return Err(PolicyError::UnknownUnit(name.to_string())),
        })
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for TimeUnit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for TimeUnit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// Accepted range of the `dpc_macaroon_version` caveat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionPolicy {
    /// Oldest version still accepted
    pub minimum_version: u32,
    /// Version stamped on newly minted macaroons
    pub current_version: u32,
}

impl Default for VersionPolicy {
    fn default() -> Self {
        Self {
            minimum_version: 1,
            current_version: 2,
        }
    }
}

/// How far in the future a default `expires` caveat (or a root key) lies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpirationPolicy {
    /// How many units ahead
    pub expiration_offset: i64,
    /// The unit `expiration_offset` counts
    pub expiration_unit: TimeUnit,
}

impl ExpirationPolicy {
    /// A policy of `offset` `unit`s
    pub fn new(expiration_offset: i64, expiration_unit: TimeUnit) -> Self {
        Self {
            expiration_offset,
            expiration_unit,
        }
    }

    /// The instant `offset` units after `from`, or `None` if it cannot be
    /// represented
    pub fn expiry_from(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let offset = self.expiration_offset;
        match self.expiration_unit {
            TimeUnit::Seconds => from.checked_add_signed(Duration::try_seconds(offset)?),
            TimeUnit::Minutes => from.checked_add_signed(Duration::try_minutes(offset)?),
            TimeUnit::Hours => from.checked_add_signed(Duration::try_hours(offset)?),
            TimeUnit::Days => from.checked_add_signed(Duration::try_days(offset)?),
            TimeUnit::Months => add_months(from, offset),
            TimeUnit::Years => add_months(from, offset.checked_mul(12)?),
        }
    }
}

fn add_months(from: DateTime<Utc>, months: i64) -> Option<DateTime<Utc>> {
    let magnitude = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months < 0 {
        from.checked_sub_months(magnitude)
    } else {
        from.checked_add_months(magnitude)
    }
}

impl Default for ExpirationPolicy {
    fn default() -> Self {
        Self::new(1, TimeUnit::Years)
    }
}

/// Version and expiration rules consumed by the built-in verifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPolicy {
    /// Versions stamped on and accepted from macaroons
    pub version_policy: VersionPolicy,
    /// Lifetime of the default `expires` caveat
    pub expiration_policy: ExpirationPolicy,
}

impl TokenPolicy {
    /// Parse and validate a policy document
    pub fn from_json(json: &str) -> Result<Self, PolicyError> {
        let policy: TokenPolicy = serde_json::from_str(json)?;
        policy.validate()?;
        Ok(policy)
    }

    /// Check that the version range is sane and the offset is positive
    pub fn validate(&self) -> Result<(), PolicyError> {
        let VersionPolicy {
            minimum_version,
            current_version,
        } = self.version_policy;
        if minimum_version == 0 || minimum_version > current_version {
            return Err(PolicyError::InvalidVersionRange {
                minimum: minimum_version,
                current: current_version,
            });
        }
        if self.expiration_policy.expiration_offset <= 0 {
            return Err(PolicyError::InvalidOffset(
                self.expiration_policy.expiration_offset,
            ));
        }
        Ok(())
    }
}
