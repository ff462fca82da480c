use chrono::{DateTime, Utc};

use crate::{
    BakeryError, CaveatSupplier, CaveatVerifier, Condition, Operator, Rejection,
    VerificationContext, Verdict, VersionPolicy,
};

/// Caveat key holding the token format version
pub const VERSION_KEY: &str = "dpc_macaroon_version";

/// Accepts `dpc_macaroon_version = N` when `minimum <= N <= current`.
///
/// Versions outside the range are rejected rather than left unsatisfied so
/// callers can tell a stale token from one minted under a newer policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct VersionCaveatVerifier {
    policy: VersionPolicy,
}

impl VersionCaveatVerifier {
    /// Accept versions allowed by `policy`
    pub fn new(policy: VersionPolicy) -> Self {
        Self { policy }
    }
}

impl CaveatVerifier for VersionCaveatVerifier {
    fn verify(&self, condition: &Condition, _context: &VerificationContext) -> Verdict {
        if condition.key() != VERSION_KEY {
            return Verdict::NotApplicable;
        }
        if condition.operator() != Operator::Eq {
            return Verdict::Rejected(Rejection::Invalid(format!(
                "{VERSION_KEY} caveat must use '='"
            )));
        }

        let Ok(version) = condition.value().parse::<u32>() else {
            return Verdict::Rejected(Rejection::Invalid(format!(
                "{VERSION_KEY} caveat is not a version number"
            )));
        };

        if version < self.policy.minimum_version {
            Verdict::Rejected(Rejection::VersionTooOld)
        } else if version > self.policy.current_version {
            Verdict::Rejected(Rejection::VersionFromFuture)
        } else {
            Verdict::Satisfied
        }
    }
}

impl CaveatSupplier for VersionCaveatVerifier {
    fn supply(&self, _now: DateTime<Utc>) -> Result<Condition, BakeryError> {
        Ok(Condition::equals(
            VERSION_KEY,
            self.policy.current_version.to_string(),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testresult::TestResult;

    fn verifier(minimum_version: u32, current_version: u32) -> VersionCaveatVerifier {
        VersionCaveatVerifier::new(VersionPolicy {
            minimum_version,
            current_version,
        })
    }

    #[test]
    fn it_judges_versions_against_the_range() -> TestResult {
        let context = VerificationContext::new(Utc::now());
        let version = |n: &str| Condition::equals(VERSION_KEY, n);

        assert_eq!(verifier(1, 2).verify(&version("1")?, &context), Verdict::Satisfied);
        assert_eq!(verifier(1, 2).verify(&version("2")?, &context), Verdict::Satisfied);
        assert_eq!(
            verifier(2, 3).verify(&version("1")?, &context),
            Verdict::Rejected(Rejection::VersionTooOld)
        );
        assert_eq!(
            verifier(1, 2).verify(&version("3")?, &context),
            Verdict::Rejected(Rejection::VersionFromFuture)
        );
        assert!(matches!(
            verifier(1, 2).verify(&version("two")?, &context),
            Verdict::Rejected(Rejection::Invalid(_))
        ));
        Ok(())
    }

    #[test]
    fn it_supplies_the_current_version() -> TestResult {
        let condition = verifier(1, 4).supply(Utc::now())?;
        assert_eq!(condition.to_string(), "dpc_macaroon_version = 4");
        Ok(())
    }
}
