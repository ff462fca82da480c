use std::cmp::Ordering;

use crate::{CaveatVerifier, Condition, Rejection, VerificationContext, Verdict};

/// Compares a request attribute against caveats on the same key.
///
/// The comparison reads "context value OP caveat value": a caveat
/// `max_records < 100` holds when the request's `max_records` attribute is
/// below 100. Values that both parse as integers compare numerically,
/// anything else compares as strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeCaveatVerifier {
    key: String,
}

impl AttributeCaveatVerifier {
    /// Handle caveats constraining `key`
    pub fn new<S: Into<String>>(key: S) -> Self {
        Self { key: key.into() }
    }
}

fn compare(left: &str, right: &str) -> Ordering {
    match (left.parse::<i64>(), right.parse::<i64>()) {
        (Ok(left), Ok(right)) => left.cmp(&right),
        _ => left.cmp(right),
    }
}

impl CaveatVerifier for AttributeCaveatVerifier {
    fn verify(&self, condition: &Condition, context: &VerificationContext) -> Verdict {
        if condition.key() != self.key {
            return Verdict::NotApplicable;
        }

        let Some(actual) = context.attribute(&self.key) else {
            return Verdict::Rejected(Rejection::Invalid(format!(
                "request carries no {} attribute",
                self.key
            )));
        };

        if condition
            .operator()
            .holds(compare(actual, condition.value()))
        {
            Verdict::Satisfied
        } else {
            Verdict::Rejected(Rejection::Invalid(format!(
                "{} does not satisfy {condition}",
                self.key
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Operator;
    use chrono::Utc;
    use testresult::TestResult;

    #[test]
    fn it_compares_numbers_numerically() -> TestResult {
        let verifier = AttributeCaveatVerifier::new("max_records");
        let context = VerificationContext::new(Utc::now()).with_attribute("max_records", "9");

        let below_hundred = Condition::new("max_records", Operator::Lt, "100")?;
        assert_eq!(verifier.verify(&below_hundred, &context), Verdict::Satisfied);

        let at_least_ten = Condition::new("max_records", Operator::Geq, "10")?;
        assert!(matches!(
            verifier.verify(&at_least_ten, &context),
            Verdict::Rejected(_)
        ));
        Ok(())
    }

    #[test]
    fn it_compares_other_values_as_strings() -> TestResult {
        let verifier = AttributeCaveatVerifier::new("organization_id");
        let context =
            VerificationContext::new(Utc::now()).with_attribute("organization_id", "org-1");

        assert_eq!(
            verifier.verify(&Condition::equals("organization_id", "org-1")?, &context),
            Verdict::Satisfied
        );
        assert_eq!(
            verifier.verify(
                &Condition::new("organization_id", Operator::Neq, "org-2")?,
                &context
            ),
            Verdict::Satisfied
        );
        assert!(matches!(
            verifier.verify(&Condition::equals("organization_id", "org-2")?, &context),
            Verdict::Rejected(_)
        ));
        Ok(())
    }

    #[test]
    fn a_missing_attribute_is_invalid() -> TestResult {
        let verifier = AttributeCaveatVerifier::new("organization_id");
        let context = VerificationContext::new(Utc::now());

        assert!(matches!(
            verifier.verify(&Condition::equals("organization_id", "org-1")?, &context),
            Verdict::Rejected(Rejection::Invalid(_))
        ));
        assert_eq!(
            verifier.verify(&Condition::equals("other", "x")?, &context),
            Verdict::NotApplicable
        );
        Ok(())
    }
}
