//! Caveat verifiers and default caveat suppliers.
//!
//! Every registered verifier is shown every first-party condition. A verifier
//! that does not recognize a condition's key must answer
//! [Verdict::NotApplicable] so that verifiers can be combined freely.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::{BakeryError, Condition, Rejection};

mod expiration;
pub use expiration::*;

mod version;
pub use version::*;

mod exact;
pub use exact::*;

mod attribute;
pub use attribute::*;

/// A verifier's judgement of one condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The condition holds
    Satisfied,
    /// The verifier does not handle this condition
    NotApplicable,
    /// The condition is recognized and definitely does not hold
    Rejected(Rejection),
}

/// Request-scoped facts a verifier may consult
#[derive(Debug, Clone)]
pub struct VerificationContext {
    now: DateTime<Utc>,
    attributes: HashMap<String, String>,
}

impl VerificationContext {
    /// A context evaluated at `now` with no attributes
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            attributes: HashMap::new(),
        }
    }

    /// Add a named attribute, such as the organization making the request
    pub fn with_attribute<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// The instant verification is evaluated at
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// A request attribute supplied by the caller
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// Judges first-party conditions
pub trait CaveatVerifier: Send + Sync {
    /// Decide whether `condition` holds in `context`
    fn verify(&self, condition: &Condition, context: &VerificationContext) -> Verdict;
}

impl<F> CaveatVerifier for F
where
    F: Fn(&Condition, &VerificationContext) -> Verdict + Send + Sync,
{
    fn verify(&self, condition: &Condition, context: &VerificationContext) -> Verdict {
        self(condition, context)
    }
}

/// Produces a caveat that every macaroon created by a bakery carries
pub trait CaveatSupplier: Send + Sync {
    /// The condition to append to a macaroon created at `now`
    fn supply(&self, now: DateTime<Utc>) -> Result<Condition, BakeryError>;
}
