//! Sealing and opening third-party caveat payloads.
//!
//! A third-party caveat's verification ID has two parts:
//!
//! ```text
//! verification_id = leb128(len(ticket)) || ticket || wrapped_secret
//! ticket          = 0x02 || recipient_key[0..4] || sender_key(32) || box
//! box             = nonce(24) || AEAD(box_key, 0x02 || leb128(len(secret)) || secret || condition)
//! wrapped_secret  = nonce(24) || AEAD(previous_signature, secret)
//! ```
//!
//! The ticket is readable only by the third party and becomes the identifier
//! of its discharge macaroon. The wrapped secret is readable by anyone who can
//! replay the signature chain up to the caveat, which is how the verifying
//! bakery recovers the discharge root key.

use zeroize::Zeroizing;

use crate::{
    BakeryError, Condition,
    crypto::{KeyPair, PUBLIC_KEY_LENGTH, PublicKey, Signature, open, seal},
    encoding::{read_prefixed, write_prefixed},
};

/// Version byte leading both the ticket and its sealed contents
pub const CAVEAT_VERSION: u8 = 2;

const KEY_PREFIX_LENGTH: usize = 4;
const TICKET_HEADER_LENGTH: usize = 1 + KEY_PREFIX_LENGTH + PUBLIC_KEY_LENGTH;

/// What the third party learns from a ticket
pub struct OpenedTicket {
    /// Root key of the discharge macaroon
    pub secret: Zeroizing<Vec<u8>>,
    /// The condition the third party is asked to attest
    pub condition: Condition,
}

/// Build the verification ID for a third-party caveat appended after a chain
/// that currently ends in `previous`
pub(crate) fn seal_verification_id(
    sender: &KeyPair,
    recipient: &PublicKey,
    previous: &Signature,
    secret: &[u8],
    condition: &Condition,
) -> Result<Vec<u8>, BakeryError> {
    let mut contents = Zeroizing::new(vec![CAVEAT_VERSION]);
    write_prefixed(&mut contents, secret);
    contents.extend_from_slice(condition.to_string().as_bytes());

    let box_key = sender.box_key_to(recipient)?;
    let boxed = seal(&box_key, &contents)?;

    let mut ticket = Vec::with_capacity(TICKET_HEADER_LENGTH + boxed.len());
    ticket.push(CAVEAT_VERSION);
    ticket.extend_from_slice(&recipient.as_bytes()[..KEY_PREFIX_LENGTH]);
    ticket.extend_from_slice(sender.public_key().as_bytes());
    ticket.extend_from_slice(&boxed);

    let wrapped_secret = seal(previous, secret)?;

    let mut verification_id = Vec::with_capacity(ticket.len() + wrapped_secret.len() + 2);
    write_prefixed(&mut verification_id, &ticket);
    verification_id.extend_from_slice(&wrapped_secret);
    Ok(verification_id)
}

/// Split a verification ID into `(ticket, wrapped_secret)`
pub(crate) fn split_verification_id(verification_id: &[u8]) -> Result<(&[u8], &[u8]), BakeryError> {
    read_prefixed(verification_id)
}

/// Recover the discharge root key using the chain signature that preceded the
/// caveat
pub(crate) fn unwrap_secret(
    previous: &Signature,
    wrapped_secret: &[u8],
) -> Result<Zeroizing<Vec<u8>>, BakeryError> {
    open(previous, wrapped_secret)
}

/// Open a ticket addressed to `recipient`
pub(crate) fn open_ticket(recipient: &KeyPair, ticket: &[u8]) -> Result<OpenedTicket, BakeryError> {
    if ticket.len() < TICKET_HEADER_LENGTH {
        return Err(BakeryError::Malformed("Ticket is truncated".into()));
    }
    if ticket[0] != CAVEAT_VERSION {
        return Err(BakeryError::Malformed(format!(
            "Unsupported caveat version {}",
            ticket[0]
        )));
    }

    let prefix = &ticket[1..1 + KEY_PREFIX_LENGTH];
    if prefix != &recipient.public_key().as_bytes()[..KEY_PREFIX_LENGTH] {
        return Err(BakeryError::Crypto(
            "Caveat was not sealed for this bakery's public key".into(),
        ));
    }

    let sender = PublicKey::try_from(&ticket[1 + KEY_PREFIX_LENGTH..TICKET_HEADER_LENGTH])?;
    let box_key = recipient.box_key_from(&sender)?;
    let contents = open(&box_key, &ticket[TICKET_HEADER_LENGTH..])?;

    let Some((&version, rest)) = contents.split_first() else {
        return Err(BakeryError::Malformed("Ticket contents are empty".into()));
    };
    if version != CAVEAT_VERSION {
        return Err(BakeryError::Malformed(format!(
            "Unsupported ticket contents version {version}"
        )));
    }

    let (secret, condition) = read_prefixed(rest)?;
    let condition = std::str::from_utf8(condition)
        .map_err(|error| BakeryError::Malformed(format!("Condition is not UTF-8: {error}")))?
        .parse::<Condition>()?;

    Ok(OpenedTicket {
        secret: Zeroizing::new(secret.to_vec()),
        condition,
    })
}
