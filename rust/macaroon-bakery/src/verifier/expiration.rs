use chrono::{DateTime, SecondsFormat, Utc};

use crate::{
    BakeryError, CaveatSupplier, CaveatVerifier, Condition, ExpirationPolicy, Operator,
    Rejection, VerificationContext, Verdict,
};

/// Caveat key holding an RFC 3339 expiry instant
pub const EXPIRES_KEY: &str = "expires";

/// Satisfies `expires = <RFC 3339>` while the instant has not passed.
///
/// The [ExpirationPolicy] only decides the value of the default caveat
/// supplied at creation time; verification is purely "is it still in the
/// future".
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpirationCaveatVerifier {
    policy: ExpirationPolicy,
}

impl ExpirationCaveatVerifier {
    /// Check and supply `expires` caveats per `policy`
    pub fn new(policy: ExpirationPolicy) -> Self {
        Self { policy }
    }

    /// An `expires` condition for the given instant
    pub fn condition_for(expires: DateTime<Utc>) -> Result<Condition, BakeryError> {
        Ok(Condition::equals(
            EXPIRES_KEY,
            expires.to_rfc3339_opts(SecondsFormat::Secs, true),
        )?)
    }
}

impl CaveatVerifier for ExpirationCaveatVerifier {
    fn verify(&self, condition: &Condition, context: &VerificationContext) -> Verdict {
        if condition.key() != EXPIRES_KEY {
            return Verdict::NotApplicable;
        }
        if condition.operator() != Operator::Eq {
            return Verdict::Rejected(Rejection::Invalid(format!(
                "{EXPIRES_KEY} caveat must use '=', found '{}'",
                condition.operator()
            )));
        }

        match DateTime::parse_from_rfc3339(condition.value()) {
            Ok(expires) if context.now() <= expires.with_timezone(&Utc) => Verdict::Satisfied,
            Ok(_) => Verdict::Rejected(Rejection::Expired),
            Err(error) => Verdict::Rejected(Rejection::Invalid(format!(
                "{EXPIRES_KEY} caveat is not an RFC 3339 timestamp: {error}"
            ))),
        }
    }
}

impl CaveatSupplier for ExpirationCaveatVerifier {
    fn supply(&self, now: DateTime<Utc>) -> Result<Condition, BakeryError> {
        let expires = self.policy.expiry_from(now).ok_or_else(|| {
            BakeryError::Malformed(format!(
                "Expiration offset of {} {} is out of range",
                self.policy.expiration_offset, self.policy.expiration_unit
            ))
        })?;
        Self::condition_for(expires)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TimeUnit;
    use chrono::{Duration, TimeZone};
    use testresult::TestResult;

    #[test]
    fn it_accepts_until_the_deadline_and_rejects_after() -> TestResult {
        let verifier = ExpirationCaveatVerifier::default();
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single().ok_or("bad date")?;
        let condition = ExpirationCaveatVerifier::condition_for(now + Duration::minutes(5))?;

        let at = |offset: i64| VerificationContext::new(now + Duration::minutes(offset));
        assert_eq!(verifier.verify(&condition, &at(1)), Verdict::Satisfied);
        assert_eq!(verifier.verify(&condition, &at(5)), Verdict::Satisfied);
        assert_eq!(
            verifier.verify(&condition, &at(6)),
            Verdict::Rejected(Rejection::Expired)
        );
        Ok(())
    }

    #[test]
    fn malformed_expiry_caveats_are_invalid() -> TestResult {
        let verifier = ExpirationCaveatVerifier::default();
        let context = VerificationContext::new(Utc::now());

        let not_a_date = Condition::equals(EXPIRES_KEY, "tomorrow")?;
        assert!(matches!(
            verifier.verify(&not_a_date, &context),
            Verdict::Rejected(Rejection::Invalid(_))
        ));

        let wrong_operator = Condition::new(EXPIRES_KEY, Operator::Lt, "2030-01-01T00:00:00Z")?;
        assert!(matches!(
            verifier.verify(&wrong_operator, &context),
            Verdict::Rejected(Rejection::Invalid(_))
        ));
        Ok(())
    }

    #[test]
    fn other_keys_are_not_applicable() -> TestResult {
        let verifier = ExpirationCaveatVerifier::default();
        let context = VerificationContext::new(Utc::now());
        assert_eq!(
            verifier.verify(&Condition::equals("organization_id", "x")?, &context),
            Verdict::NotApplicable
        );
        Ok(())
    }

    #[test]
    fn it_supplies_an_expiry_from_its_policy() -> TestResult {
        let verifier = ExpirationCaveatVerifier::new(ExpirationPolicy::new(5, TimeUnit::Minutes));
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single().ok_or("bad date")?;

        let condition = verifier.supply(now)?;
        assert_eq!(condition.to_string(), "expires = 2024-05-01T12:05:00Z");
        Ok(())
    }
}
