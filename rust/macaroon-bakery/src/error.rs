use macaroon_storage::StorageError;
use thiserror::Error;

use crate::ConditionError;

/// Errors produced by a [crate::RootKeyStore] or [crate::ThirdPartyKeyStore].
#[derive(Error, Debug)]
pub enum StoreError {
    /// No live key exists under the requested ID. Expired keys are reported
    /// the same way as missing ones.
    #[error("Root key not found: {0}")]
    KeyNotFound(String),

    /// The underlying storage could not be reached. The caller decides
    /// whether to retry.
    #[error("Key store unavailable: {0}")]
    Unavailable(String),

    /// A stored record could not be decoded
    #[error("Corrupt key record: {0}")]
    Corrupt(String),

    /// The system random source failed while generating key material
    #[error("Random number generation failed: {0}")]
    Rng(getrandom::Error),
}

impl From<StorageError> for StoreError {
    fn from(error: StorageError) -> Self {
        StoreError::Unavailable(format!("{error}"))
    }
}

impl From<getrandom::Error> for StoreError {
    fn from(error: getrandom::Error) -> Self {
        StoreError::Rng(error)
    }
}

/// The reason a verifier refused a caveat outright.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The `expires` caveat lies in the past
    #[error("expired")]
    Expired,

    /// The token version is below the configured minimum
    #[error("version too old")]
    VersionTooOld,

    /// The token version is above the configured current version
    #[error("version from the future")]
    VersionFromFuture,

    /// The caveat is recognized but its value cannot be judged
    #[error("{0}")]
    Invalid(String),
}

/// A specific reason that a well-signed macaroon failed verification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationFailure {
    /// A verifier authoritatively rejected a caveat
    #[error(transparent)]
    Rejected(#[from] Rejection),

    /// No verifier reported the caveat as satisfied
    #[error("caveat not satisfied: {0}")]
    Unsatisfied(String),

    /// A third-party caveat had no matching discharge macaroon
    #[error("no discharge macaroon for third-party caveat at {0}")]
    MissingDischarge(String),

    /// A discharge macaroon was presented to satisfy more than one caveat
    #[error("discharge macaroon used more than once")]
    DischargeReused,

    /// A third-party caveat payload could not be decoded
    #[error("malformed caveat: {0}")]
    MalformedCaveat(String),
}

/// The common error type used by the bakery.
#[derive(Error, Debug)]
pub enum BakeryError {
    /// The root key named by a macaroon is missing or expired
    #[error("Root key not found: {0}")]
    KeyNotFound(String),

    /// No public key is registered for a third-party location
    #[error("Unknown third-party location: {0}")]
    UnknownLocation(String),

    /// The recomputed signature chain disagrees with the presented signature
    #[error("Macaroon signature mismatch")]
    SignatureMismatch,

    /// The signature is intact but a caveat was not satisfied
    #[error("Verification failed: {0}")]
    VerificationFailure(#[from] VerificationFailure),

    /// Input bytes or strings could not be decoded
    #[error("Malformed input: {0}")]
    Malformed(String),

    /// A cryptographic primitive failed
    #[error("Cryptographic failure: {0}")]
    Crypto(String),

    /// A macaroon bundle could not be encoded or decoded
    #[error("Codec error: {0}")]
    Codec(String),

    /// A key store failed in a way the bakery does not interpret
    #[error("Key store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for BakeryError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::KeyNotFound(id) => BakeryError::KeyNotFound(id),
            error => BakeryError::Store(error),
        }
    }
}

impl From<ConditionError> for BakeryError {
    fn from(error: ConditionError) -> Self {
        BakeryError::Malformed(format!("{error}"))
    }
}

impl From<getrandom::Error> for BakeryError {
    fn from(error: getrandom::Error) -> Self {
        BakeryError::Crypto(format!("Random number generation failed: {error}"))
    }
}

impl From<serde_json::Error> for BakeryError {
    fn from(error: serde_json::Error) -> Self {
        BakeryError::Codec(format!("{error}"))
    }
}
