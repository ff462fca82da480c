use std::sync::Arc;

use crate::{
    Bakery, BakeryError, CaveatSupplier, CaveatVerifier, Clock, ExpirationCaveatVerifier,
    KeyPair, RootKeyStore, SystemClock, ThirdPartyKeyStore, TokenPolicy, VersionCaveatVerifier,
};

/// Location under which every bakery also registers its own public key, so it
/// can seal third-party caveats addressed to itself
pub const LOCAL_LOCATION: &str = "local";

/// Assembles a [Bakery] from its stores, key pair, verifiers and suppliers.
///
/// ```rust
/// # use std::sync::Arc;
/// # use macaroon_bakery::*;
/// # async fn example() -> Result<(), BakeryError> {
/// let bakery = BakeryBuilder::new(
///     "https://api.example.test",
///     MemoryRootKeyStore::new(),
///     MemoryThirdPartyKeyStore::new(),
/// )
/// .with_token_policy(TokenPolicy::default())
/// .build()
/// .await?;
/// # Ok(())
/// # }
/// ```
pub struct BakeryBuilder {
    location: String,
    root_keys: Arc<dyn RootKeyStore>,
    third_party_keys: Arc<dyn ThirdPartyKeyStore>,
    key_pair: Option<KeyPair>,
    clock: Arc<dyn Clock>,
    verifiers: Vec<Arc<dyn CaveatVerifier>>,
    suppliers: Vec<Arc<dyn CaveatSupplier>>,
}

impl BakeryBuilder {
    /// Start building a bakery that mints macaroons for `location`
    pub fn new<L, R, T>(location: L, root_keys: R, third_party_keys: T) -> Self
    where
        L: Into<String>,
        R: RootKeyStore + 'static,
        T: ThirdPartyKeyStore + 'static,
    {
        Self {
            location: location.into(),
            root_keys: Arc::new(root_keys),
            third_party_keys: Arc::new(third_party_keys),
            key_pair: None,
            clock: Arc::new(SystemClock),
            verifiers: Vec::new(),
            suppliers: Vec::new(),
        }
    }

    /// Use a stored key pair instead of generating one
    pub fn with_key_pair(mut self, key_pair: KeyPair) -> Self {
        self.key_pair = Some(key_pair);
        self
    }

    /// Read the current instant from `clock`
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Register a verifier consulted on every verification
    pub fn add_verifier<V>(mut self, verifier: V) -> Self
    where
        V: CaveatVerifier + 'static,
    {
        self.verifiers.push(Arc::new(verifier));
        self
    }

    /// Register a supplier whose caveat is added to every created macaroon
    pub fn add_caveat_supplier<S>(mut self, supplier: S) -> Self
    where
        S: CaveatSupplier + 'static,
    {
        self.suppliers.push(Arc::new(supplier));
        self
    }

    /// Enforce and stamp the version and expiration caveats of `policy`
    pub fn with_token_policy(mut self, policy: TokenPolicy) -> Self {
        let expiration = Arc::new(ExpirationCaveatVerifier::new(policy.expiration_policy));
        let version = Arc::new(VersionCaveatVerifier::new(policy.version_policy));

        self.verifiers.push(expiration.clone());
        self.verifiers.push(version.clone());
        self.suppliers.push(expiration);
        self.suppliers.push(version);
        self
    }

    /// Finish construction, publishing the bakery's public key under its own
    /// location and under [LOCAL_LOCATION]
    pub async fn build(self) -> Result<Bakery, BakeryError> {
        let key_pair = match self.key_pair {
            Some(key_pair) => key_pair,
            None => KeyPair::generate()?,
        };

        let public_key = key_pair.public_key();
        self.third_party_keys
            .set_public_key(&self.location, public_key)
            .await?;
        self.third_party_keys
            .set_public_key(LOCAL_LOCATION, public_key)
            .await?;

        tracing::debug!(location = %self.location, "Bakery ready");

        Ok(Bakery {
            location: self.location,
            key_pair,
            root_keys: self.root_keys,
            third_party_keys: self.third_party_keys,
            clock: self.clock,
            verifiers: self.verifiers,
            suppliers: self.suppliers,
        })
    }
}
