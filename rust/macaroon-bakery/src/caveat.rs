use crate::Condition;

/// A restriction attached to a macaroon.
///
/// A caveat without a location is first-party and is judged directly by the
/// verifying bakery. A caveat with a location is third-party: its
/// `verification_id` carries the encrypted discharge secret, and it is only
/// satisfied by a discharge macaroon issued by the authority at `location`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Caveat {
    condition: Condition,
    location: Option<String>,
    verification_id: Option<Vec<u8>>,
}

impl Caveat {
    /// A caveat checked by the verifying party itself
    pub fn first_party(condition: Condition) -> Self {
        Self {
            condition,
            location: None,
            verification_id: None,
        }
    }

    /// A caveat that must be discharged by the authority at `location`.
    ///
    /// Until the bakery seals it, the caveat has no verification ID; passing
    /// such a caveat to [crate::Bakery::add_caveats] encrypts it.
    pub fn third_party<L>(location: L, condition: Condition) -> Self
    where
        L: Into<String>,
    {
        Self {
            condition,
            location: Some(location.into()),
            verification_id: None,
        }
    }

    pub(crate) fn sealed(location: String, condition: Condition, verification_id: Vec<u8>) -> Self {
        Self {
            condition,
            location: Some(location),
            verification_id: Some(verification_id),
        }
    }

    /// The predicate this caveat imposes
    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    /// Location of the discharging authority, if this is a third-party caveat
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    /// Encrypted payload of a third-party caveat
    pub fn verification_id(&self) -> Option<&[u8]> {
        self.verification_id.as_deref()
    }

    /// True when no discharge is needed
    pub fn is_first_party(&self) -> bool {
        self.location.is_none()
    }
}

impl From<Condition> for Caveat {
    fn from(condition: Condition) -> Self {
        Caveat::first_party(condition)
    }
}
