//! The macaroon value type and its signature chain.

use std::sync::Arc;

use crate::{
    BakeryError, Caveat, Condition,
    crypto::{Signature, bind_for_request, hash2, hmac},
    encoding::{read_prefixed, write_prefixed},
};

/// Number of random bytes appended to every identifier
pub const IDENTIFIER_NONCE_LENGTH: usize = 16;

/// A bearer credential: an identifier naming its root key, a chained HMAC
/// signature, and an ordered list of caveats.
///
/// Macaroons are immutable. Attenuation returns a new value with one more
/// caveat and a re-derived signature; the original stays valid on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Macaroon {
    identifier: Vec<u8>,
    location: String,
    signature: Signature,
    caveats: Arc<[Caveat]>,
}

impl Macaroon {
    /// Start a signature chain from `key`
    pub(crate) fn mint(key: &[u8], identifier: Vec<u8>, location: String) -> Self {
        let signature = hmac(key, &identifier);
        Self {
            identifier,
            location,
            signature,
            caveats: Arc::from(Vec::new()),
        }
    }

    /// Reassemble a macaroon from its decoded parts. The signature is taken
    /// as-is; only verification can tell whether it is genuine.
    pub fn from_parts(
        identifier: Vec<u8>,
        location: String,
        signature: Signature,
        caveats: Vec<Caveat>,
    ) -> Self {
        Self {
            identifier,
            location,
            signature,
            caveats: Arc::from(caveats),
        }
    }

    /// Opaque identifier; for macaroons minted by a bakery it names the root key
    pub fn identifier(&self) -> &[u8] {
        &self.identifier
    }

    /// Hint for where this macaroon is meant to be used
    pub fn location(&self) -> &str {
        &self.location
    }

    /// The current end of the signature chain
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// All caveats in append order
    pub fn caveats(&self) -> &[Caveat] {
        &self.caveats
    }

    /// First-party conditions in append order
    pub fn conditions(&self) -> impl Iterator<Item = &Condition> {
        self.caveats
            .iter()
            .filter(|caveat| caveat.is_first_party())
            .map(Caveat::condition)
    }

    /// The first first-party condition constraining `key`
    pub fn find_condition(&self, key: &str) -> Option<&Condition> {
        self.conditions().find(|condition| condition.key() == key)
    }

    /// Decode the root key ID from the identifier
    pub fn key_id(&self) -> Result<String, BakeryError> {
        decode_key_id(&self.identifier)
    }

    /// Attenuate with a first-party caveat. Needs only the current signature.
    pub fn add_first_party_caveat(&self, condition: Condition) -> Macaroon {
        self.append(Caveat::first_party(condition))
    }

    /// Append an already sealed caveat and extend the chain over it
    pub(crate) fn append(&self, caveat: Caveat) -> Macaroon {
        let signature = chain_step(&self.signature, &caveat);
        let caveats = self
            .caveats
            .iter()
            .cloned()
            .chain(std::iter::once(caveat))
            .collect::<Vec<_>>();

        Macaroon {
            identifier: self.identifier.clone(),
            location: self.location.clone(),
            signature,
            caveats: Arc::from(caveats),
        }
    }

    /// Bind this discharge macaroon to the macaroon it will be presented with
    pub fn bind_for_request(&self, root: &Macaroon) -> Macaroon {
        Macaroon {
            identifier: self.identifier.clone(),
            location: self.location.clone(),
            signature: bind_for_request(&root.signature, &self.signature),
            caveats: self.caveats.clone(),
        }
    }
}

/// Fold one caveat into the chain.
///
/// First-party caveats contribute their condition string. Third-party caveats
/// contribute both their encrypted verification ID and their condition.
pub(crate) fn chain_step(signature: &Signature, caveat: &Caveat) -> Signature {
    let condition = caveat.condition().to_string();
    match caveat.verification_id() {
        Some(verification_id) if !caveat.is_first_party() => {
            hash2(signature, verification_id, condition.as_bytes())
        }
        _ => hmac(signature, condition.as_bytes()),
    }
}

/// Replay a whole chain. Returns the signature in effect before each caveat,
/// followed by the final signature.
pub(crate) fn replay_chain(key: &[u8], identifier: &[u8], caveats: &[Caveat]) -> Vec<Signature> {
    let mut signatures = Vec::with_capacity(caveats.len() + 1);
    let mut signature = hmac(key, identifier);
    signatures.push(signature);
    for caveat in caveats {
        signature = chain_step(&signature, caveat);
        signatures.push(signature);
    }
    signatures
}

pub(crate) fn encode_identifier(key_id: &str, nonce: &[u8; IDENTIFIER_NONCE_LENGTH]) -> Vec<u8> {
    let mut identifier = Vec::with_capacity(key_id.len() + IDENTIFIER_NONCE_LENGTH + 2);
    write_prefixed(&mut identifier, key_id.as_bytes());
    identifier.extend_from_slice(nonce);
    identifier
}

fn decode_key_id(identifier: &[u8]) -> Result<String, BakeryError> {
    let (key_id, nonce) = read_prefixed(identifier)?;
    if nonce.len() != IDENTIFIER_NONCE_LENGTH {
        return Err(BakeryError::Malformed(format!(
            "Identifier nonce must be {IDENTIFIER_NONCE_LENGTH} bytes, got {}",
            nonce.len()
        )));
    }
    String::from_utf8(key_id.to_vec())
        .map_err(|error| BakeryError::Malformed(format!("Key ID is not UTF-8: {error}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Operator;
    use testresult::TestResult;

    fn minted() -> Macaroon {
        Macaroon::mint(
            b"a root key of at least 24 bytes",
            encode_identifier("key-1", &[9u8; IDENTIFIER_NONCE_LENGTH]),
            "https://bakery.test".into(),
        )
    }

    #[test]
    fn it_decodes_the_key_id_from_the_identifier() -> TestResult {
        let macaroon = minted();
        assert_eq!(macaroon.key_id()?, "key-1");

        let garbage = Macaroon::from_parts(vec![3, b'a'], "x".into(), [0; 32], vec![]);
        assert!(matches!(garbage.key_id(), Err(BakeryError::Malformed(_))));
        Ok(())
    }

    #[test]
    fn attenuation_leaves_the_original_untouched() -> TestResult {
        let original = minted();
        let attenuated = original.add_first_party_caveat(Condition::equals("user", "alice")?);

        assert!(original.caveats().is_empty());
        assert_eq!(attenuated.caveats().len(), 1);
        assert_ne!(original.signature(), attenuated.signature());
        assert_eq!(
            *attenuated.signature(),
            hmac(original.signature(), b"user = alice")
        );
        Ok(())
    }

    #[test]
    fn caveat_order_changes_the_signature() -> TestResult {
        let first = Condition::equals("a", "1")?;
        let second = Condition::new("b", Operator::Lt, "2")?;

        let forward = minted()
            .add_first_party_caveat(first.clone())
            .add_first_party_caveat(second.clone());
        let backward = minted()
            .add_first_party_caveat(second)
            .add_first_party_caveat(first);

        assert_ne!(forward.signature(), backward.signature());
        Ok(())
    }

    #[test]
    fn replaying_the_chain_reproduces_the_signature() -> TestResult {
        let macaroon = minted()
            .add_first_party_caveat(Condition::equals("a", "1")?)
            .add_first_party_caveat(Condition::equals("b", "2")?);

        let chain = replay_chain(
            b"a root key of at least 24 bytes",
            macaroon.identifier(),
            macaroon.caveats(),
        );
        assert_eq!(chain.len(), 3);
        assert_eq!(chain.last(), Some(macaroon.signature()));
        Ok(())
    }

    #[test]
    fn it_finds_conditions_by_key() -> TestResult {
        let macaroon = minted()
            .add_first_party_caveat(Condition::equals("organization_id", "org-7")?)
            .add_first_party_caveat(Condition::equals("role", "admin")?);

        assert_eq!(
            macaroon.find_condition("organization_id").map(Condition::value),
            Some("org-7")
        );
        assert!(macaroon.find_condition("missing").is_none());
        assert_eq!(macaroon.conditions().count(), 2);
        Ok(())
    }
}
