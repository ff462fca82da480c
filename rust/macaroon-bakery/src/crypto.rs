//! Signature chaining and the public-key box used for third-party caveats.

use std::fmt;

use base64::Engine;
use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};
use curve25519_dalek::montgomery::MontgomeryPoint;
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::BakeryError;

/// Length of every chain signature
pub const SIGNATURE_LENGTH: usize = 32;

/// Length of an X25519 public key
pub const PUBLIC_KEY_LENGTH: usize = 32;

/// Length of an XChaCha20-Poly1305 nonce
pub const NONCE_LENGTH: usize = 24;

/// A chain signature
pub type Signature = [u8; SIGNATURE_LENGTH];

const BOX_KEY_INFO: &[u8] = b"macaroon-bakery/box";

/// HMAC-SHA256 of `data` under `key`
pub fn hmac(key: &[u8], data: &[u8]) -> Signature {
    let mut mac =
        <Hmac<Sha256> as Mac>::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);

    let mut signature = [0u8; SIGNATURE_LENGTH];
    signature.copy_from_slice(&mac.finalize().into_bytes());
    signature
}

/// `HMAC(key, HMAC(key, left) || HMAC(key, right))`
pub fn hash2(key: &[u8], left: &[u8], right: &[u8]) -> Signature {
    let left = hmac(key, left);
    let right = hmac(key, right);
    hmac(key, &[left, right].concat())
}

/// Re-key a discharge signature with the signature of the macaroon it is
/// presented alongside
pub fn bind_for_request(root: &Signature, discharge: &Signature) -> Signature {
    hash2(&[0u8; SIGNATURE_LENGTH], root, discharge)
}

/// Constant-time signature comparison
pub fn signatures_match(left: &[u8], right: &[u8]) -> bool {
    left.ct_eq(right).into()
}

/// Fill an array from the system CSPRNG
pub fn random_bytes<const N: usize>() -> Result<[u8; N], getrandom::Error> {
    let mut bytes = [0u8; N];
    getrandom::getrandom(&mut bytes)?;
    Ok(bytes)
}

/// Encrypt `plaintext` under a symmetric key, producing `nonce || ciphertext`
pub fn seal(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>, BakeryError> {
    let nonce = random_bytes::<NONCE_LENGTH>()?;
    let cipher = XChaCha20Poly1305::new(key.into());
    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|_| BakeryError::Crypto("Encryption failed".into()))?;

    Ok([nonce.as_slice(), ciphertext.as_slice()].concat())
}

/// Reverse [seal]
pub fn open(key: &[u8; 32], sealed: &[u8]) -> Result<Zeroizing<Vec<u8>>, BakeryError> {
    if sealed.len() < NONCE_LENGTH {
        return Err(BakeryError::Crypto("Sealed payload is truncated".into()));
    }
    let (nonce, ciphertext) = sealed.split_at(NONCE_LENGTH);
    let cipher = XChaCha20Poly1305::new(key.into());
    cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map(Zeroizing::new)
        .map_err(|_| BakeryError::Crypto("Decryption failed".into()))
}

/// A Curve25519 public key identifying a bakery to its peers.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; PUBLIC_KEY_LENGTH]);

impl PublicKey {
    /// Wrap raw key bytes
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    /// The raw key bytes
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        &self.0
    }
}

impl TryFrom<&[u8]> for PublicKey {
    type Error = BakeryError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; PUBLIC_KEY_LENGTH] = bytes.try_into().map_err(|_| {
            BakeryError::Malformed(format!(
                "Public key must be {PUBLIC_KEY_LENGTH} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(bytes))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PublicKey")
            .field(&base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(self.0))
            .finish()
    }
}

/// The X25519 key pair a bakery uses to seal and open third-party caveats.
#[derive(Clone)]
pub struct KeyPair {
    secret: Zeroizing<[u8; 32]>,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a key pair from the system CSPRNG
    pub fn generate() -> Result<Self, BakeryError> {
        Ok(Self::from_secret_bytes(random_bytes::<32>()?))
    }

    /// Rebuild a key pair from a stored secret scalar
    pub fn from_secret_bytes(secret: [u8; 32]) -> Self {
        let public = PublicKey(MontgomeryPoint::mul_base_clamped(secret).to_bytes());
        Self {
            secret: Zeroizing::new(secret),
            public,
        }
    }

    /// The shareable half of this key pair
    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    /// Symmetric key for a box sent from this key pair to `recipient`
    pub(crate) fn box_key_to(
        &self,
        recipient: &PublicKey,
    ) -> Result<Zeroizing<[u8; 32]>, BakeryError> {
        let shared = self.agree(recipient)?;
        derive_box_key(&shared, &self.public, recipient)
    }

    /// Symmetric key for a box sent from `sender` to this key pair
    pub(crate) fn box_key_from(
        &self,
        sender: &PublicKey,
    ) -> Result<Zeroizing<[u8; 32]>, BakeryError> {
        let shared = self.agree(sender)?;
        derive_box_key(&shared, sender, &self.public)
    }

    fn agree(&self, peer: &PublicKey) -> Result<Zeroizing<[u8; 32]>, BakeryError> {
        let shared = Zeroizing::new(
            MontgomeryPoint(peer.0)
                .mul_clamped(*self.secret)
                .to_bytes(),
        );
        // Low-order peer points collapse the shared secret to zero
        if shared.iter().all(|byte| *byte == 0) {
            return Err(BakeryError::Crypto("Degenerate public key".into()));
        }
        Ok(shared)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .field("secret", &"<redacted>")
            .finish()
    }
}

fn derive_box_key(
    shared: &[u8; 32],
    sender: &PublicKey,
    recipient: &PublicKey,
) -> Result<Zeroizing<[u8; 32]>, BakeryError> {
    let info = [
        BOX_KEY_INFO,
        sender.as_bytes().as_slice(),
        recipient.as_bytes().as_slice(),
    ]
    .concat();
    let mut key = Zeroizing::new([0u8; 32]);
    Hkdf::<Sha256>::new(None, shared)
        .expand(&info, &mut key[..])
        .map_err(|error| BakeryError::Crypto(format!("Key derivation failed: {error}")))?;
    Ok(key)
}
