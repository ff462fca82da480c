//! JSON encoding of macaroon bundles.
//!
//! A bundle is a root macaroon followed by its bound discharges, encoded as a
//! JSON array. Binary fields are URL-safe base64. The whole array may itself
//! be wrapped in URL-safe base64 for transports that only carry tokens.

use base64::{
    Engine, alphabet,
    engine::{
        DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig, general_purpose::URL_SAFE_NO_PAD,
    },
};
use serde::{Deserialize, Serialize};

use crate::{BakeryError, Caveat, Condition, Macaroon, crypto::SIGNATURE_LENGTH};

/// Accepts URL-safe base64 with or without padding
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Serialize, Deserialize)]
struct MacaroonRecord {
    identifier: String,
    location: String,
    signature: String,
    #[serde(default)]
    caveats: Vec<CaveatRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CaveatRecord {
    condition: Condition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    verification_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Records {
    Many(Vec<MacaroonRecord>),
    One(MacaroonRecord),
}

impl From<&Macaroon> for MacaroonRecord {
    fn from(macaroon: &Macaroon) -> Self {
        Self {
            identifier: URL_SAFE_NO_PAD.encode(macaroon.identifier()),
            location: macaroon.location().to_string(),
            signature: URL_SAFE_NO_PAD.encode(macaroon.signature()),
            caveats: macaroon
                .caveats()
                .iter()
                .map(|caveat| CaveatRecord {
                    condition: caveat.condition().clone(),
                    location: caveat.location().map(str::to_string),
                    verification_id: caveat
                        .verification_id()
                        .map(|id| URL_SAFE_NO_PAD.encode(id)),
                })
                .collect(),
        }
    }
}

fn decode_field(field: &str, value: &str) -> Result<Vec<u8>, BakeryError> {
    URL_SAFE_LENIENT
        .decode(value)
        .map_err(|error| BakeryError::Codec(format!("Invalid {field}: {error}")))
}

impl TryFrom<MacaroonRecord> for Macaroon {
    type Error = BakeryError;

    fn try_from(record: MacaroonRecord) -> Result<Self, Self::Error> {
        let identifier = decode_field("identifier", &record.identifier)?;
        let signature = decode_field("signature", &record.signature)?;
        let signature: [u8; SIGNATURE_LENGTH] = signature.try_into().map_err(|bytes: Vec<u8>| {
            BakeryError::Codec(format!(
                "Signature must be {SIGNATURE_LENGTH} bytes, got {}",
                bytes.len()
            ))
        })?;

        let caveats = record
            .caveats
            .into_iter()
            .map(|caveat| -> Result<Caveat, BakeryError> {
                match (caveat.location, caveat.verification_id) {
                    (None, None) => Ok(Caveat::first_party(caveat.condition)),
                    (Some(location), Some(verification_id)) => Ok(Caveat::sealed(
                        location,
                        caveat.condition,
                        decode_field("verification ID", &verification_id)?,
                    )),
                    (Some(location), None) => Err(BakeryError::Codec(format!(
                        "Third-party caveat for {location} has no verification ID"
                    ))),
                    (None, Some(_)) => Err(BakeryError::Codec(
                        "First-party caveat carries a verification ID".into(),
                    )),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Macaroon::from_parts(
            identifier,
            record.location,
            signature,
            caveats,
        ))
    }
}

/// Encode macaroons as a JSON array, optionally wrapped in URL-safe base64
pub fn encode_bundle(macaroons: &[Macaroon], base64: bool) -> Result<String, BakeryError> {
    let records = macaroons.iter().map(MacaroonRecord::from).collect::<Vec<_>>();
    let json = serde_json::to_string(&records)?;
    Ok(if base64 {
        URL_SAFE_NO_PAD.encode(json)
    } else {
        json
    })
}

/// Decode a bundle produced by [encode_bundle], or a single JSON macaroon.
/// Raw JSON and base64 input are told apart by their first character.
pub fn decode_bundle(input: &str) -> Result<Vec<Macaroon>, BakeryError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(BakeryError::Codec("Empty macaroon bundle".into()));
    }

    let records = if input.starts_with('[') || input.starts_with('{') {
        serde_json::from_str::<Records>(input)?
    } else {
        let json = decode_field("bundle", input)?;
        serde_json::from_slice::<Records>(&json)?
    };

    match records {
        Records::Many(records) => records.into_iter().map(Macaroon::try_from).collect(),
        Records::One(record) => Ok(vec![Macaroon::try_from(record)?]),
    }
}
