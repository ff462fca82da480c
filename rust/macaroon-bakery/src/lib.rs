#![warn(missing_docs)]

//! A macaroon bakery: mints bearer credentials that holders can attenuate
//! offline by appending caveats, and verifies them by replaying a chained
//! HMAC and checking every caveat against server-side policy.
//!
//! The main entry point is [Bakery], assembled with a [BakeryBuilder] from a
//! [RootKeyStore], a [ThirdPartyKeyStore] and any number of
//! [CaveatVerifier]s and [CaveatSupplier]s.
//!
//! ```rust
//! use macaroon_bakery::*;
//!
//! # async fn example() -> Result<(), BakeryError> {
//! let bakery = BakeryBuilder::new(
//!     "https://api.example.test",
//!     MemoryRootKeyStore::new(),
//!     MemoryThirdPartyKeyStore::new(),
//! )
//! .with_token_policy(TokenPolicy::default())
//! .build()
//! .await?;
//!
//! let macaroon = bakery.create_macaroon(Vec::new()).await?;
//! let attenuated = macaroon.add_first_party_caveat(Condition::equals("organization_id", "org-1")?);
//!
//! let organization = ExactCaveatVerifier::new("organization_id = org-1");
//! let verified = bakery
//!     .verify(&attenuated, &bakery.context(), &[&organization], &[])
//!     .await?;
//! assert_eq!(
//!     verified.find_condition("organization_id").map(Condition::value),
//!     Some("org-1")
//! );
//! # Ok(())
//! # }
//! ```
//!
//! Macaroons travel between processes as JSON bundles, see [encode_bundle]
//! and [decode_bundle].

mod error;
pub use error::*;

mod condition;
pub use condition::*;

mod caveat;
pub use caveat::*;

pub mod crypto;
pub use crypto::{KeyPair, PublicKey, Signature};

mod encoding;

mod macaroon;
pub use macaroon::*;

mod third_party;

mod clock;
pub use clock::*;

mod policy;
pub use policy::*;

mod store;
pub use store::*;

mod verifier;
pub use verifier::*;

mod bakery;
pub use bakery::*;

mod codec;
pub use codec::*;
