//! The bakery: mints, attenuates and verifies macaroons.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    BakeryError, Caveat, CaveatSupplier, CaveatVerifier, Clock, Condition, KeyPair, Macaroon,
    PublicKey, RootKeyStore, ThirdPartyKeyStore, VerificationContext,
    crypto::random_bytes,
    macaroon::{IDENTIFIER_NONCE_LENGTH, encode_identifier},
    third_party::seal_verification_id,
};

mod builder;
pub use builder::*;

mod verify;
pub use verify::*;

mod discharge;

/// Length of the secret generated for each third-party caveat added through
/// [Bakery::add_caveats]
pub const THIRD_PARTY_SECRET_LENGTH: usize = 24;

/// Obtains discharge macaroons for third-party caveats
#[async_trait]
pub trait Discharger: Send + Sync {
    /// Produce an (unbound) discharge macaroon for `caveat`
    async fn discharge(&self, caveat: &Caveat) -> Result<Macaroon, BakeryError>;
}

/// Mints, attenuates and verifies macaroons against a root key store.
///
/// A bakery holds no per-request state; every operation works on the
/// macaroon it is given plus read-only store lookups, so one instance can
/// serve concurrent requests.
pub struct Bakery {
    location: String,
    key_pair: KeyPair,
    root_keys: Arc<dyn RootKeyStore>,
    third_party_keys: Arc<dyn ThirdPartyKeyStore>,
    clock: Arc<dyn Clock>,
    verifiers: Vec<Arc<dyn CaveatVerifier>>,
    suppliers: Vec<Arc<dyn CaveatSupplier>>,
}

impl Bakery {
    /// The location stamped on macaroons created by this bakery
    pub fn location(&self) -> &str {
        &self.location
    }

    /// The public key third parties use to address caveats to this bakery
    pub fn public_key(&self) -> PublicKey {
        self.key_pair.public_key()
    }

    /// The root key store backing this bakery
    pub fn root_keys(&self) -> &dyn RootKeyStore {
        self.root_keys.as_ref()
    }

    /// The third-party key store backing this bakery
    pub fn third_party_keys(&self) -> &dyn ThirdPartyKeyStore {
        self.third_party_keys.as_ref()
    }

    /// A verification context stamped with the bakery's clock
    pub fn context(&self) -> VerificationContext {
        VerificationContext::new(self.clock.now())
    }

    /// Mint a caveat-free macaroon from an existing root key
    pub async fn mint(&self, location: &str, root_key_id: &str) -> Result<Macaroon, BakeryError> {
        let root_key = self.root_keys.get(root_key_id).await?;
        let nonce = random_bytes::<IDENTIFIER_NONCE_LENGTH>()?;
        let identifier = encode_identifier(root_key.id(), &nonce);

        let macaroon = Macaroon::mint(root_key.key(), identifier, location.to_string());
        tracing::debug!(key_id = root_key.id(), location, "Minted macaroon");
        Ok(macaroon)
    }

    /// Create a root key, mint a macaroon from it at this bakery's location,
    /// then append every supplier's default caveat followed by `caveats`
    pub async fn create_macaroon<I>(&self, caveats: I) -> Result<Macaroon, BakeryError>
    where
        I: IntoIterator<Item = Caveat>,
    {
        let root_key = self.root_keys.create().await?;
        let mut macaroon = self.mint(&self.location, root_key.id()).await?;

        let now = self.clock.now();
        for supplier in &self.suppliers {
            macaroon = macaroon.add_first_party_caveat(supplier.supply(now)?);
        }

        self.add_caveats(&macaroon, caveats).await
    }

    /// Append a first-party caveat. Needs no root key.
    pub fn add_first_party_caveat(&self, macaroon: &Macaroon, condition: Condition) -> Macaroon {
        let attenuated = macaroon.add_first_party_caveat(condition);
        tracing::debug!(caveats = attenuated.caveats().len(), "Added first-party caveat");
        attenuated
    }

    /// Append a caveat that only a discharge from the authority at `location`
    /// can satisfy. `secret` becomes the root key of that discharge.
    pub async fn add_third_party_caveat(
        &self,
        macaroon: &Macaroon,
        location: &str,
        condition: Condition,
        secret: &[u8],
    ) -> Result<Macaroon, BakeryError> {
        let public_key = self
            .third_party_keys
            .get_public_key(location)
            .await?
            .ok_or_else(|| BakeryError::UnknownLocation(location.to_string()))?;

        let verification_id = seal_verification_id(
            &self.key_pair,
            &public_key,
            macaroon.signature(),
            secret,
            &condition,
        )?;
        let attenuated =
            macaroon.append(Caveat::sealed(location.to_string(), condition, verification_id));

        tracing::debug!(
            location,
            caveats = attenuated.caveats().len(),
            "Added third-party caveat"
        );
        Ok(attenuated)
    }

    /// Append a batch of caveats in order. Third-party caveats are sealed
    /// with a freshly generated secret each.
    pub async fn add_caveats<I>(
        &self,
        macaroon: &Macaroon,
        caveats: I,
    ) -> Result<Macaroon, BakeryError>
    where
        I: IntoIterator<Item = Caveat>,
    {
        let mut macaroon = macaroon.clone();
        for caveat in caveats {
            macaroon = match caveat.location() {
                None => self.add_first_party_caveat(&macaroon, caveat.condition().clone()),
                Some(location) => {
                    let secret = random_bytes::<THIRD_PARTY_SECRET_LENGTH>()?;
                    self.add_third_party_caveat(
                        &macaroon,
                        location,
                        caveat.condition().clone(),
                        &secret,
                    )
                    .await?
                }
            };
        }
        Ok(macaroon)
    }
}
