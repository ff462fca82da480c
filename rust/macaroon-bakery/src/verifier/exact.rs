use crate::{CaveatVerifier, Condition, VerificationContext, Verdict};

/// Satisfies exactly one condition, compared by its string form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExactCaveatVerifier {
    expected: String,
}

impl ExactCaveatVerifier {
    /// Accept conditions whose string form is `expected`, e.g.
    /// `"organization_id = 46ac7ad6"`
    pub fn new<S: Into<String>>(expected: S) -> Self {
        Self {
            expected: expected.into(),
        }
    }
}

impl From<&Condition> for ExactCaveatVerifier {
    fn from(condition: &Condition) -> Self {
        Self::new(condition.to_string())
    }
}

impl CaveatVerifier for ExactCaveatVerifier {
    fn verify(&self, condition: &Condition, _context: &VerificationContext) -> Verdict {
        if condition.to_string() == self.expected {
            Verdict::Satisfied
        } else {
            Verdict::NotApplicable
        }
    }
}
