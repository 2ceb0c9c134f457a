use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;
use crate::error::{Error, Result};

const SCHEME: &str = "sha256";

/// A PIN as clients send it: either `"1234"` or `[1, 2, 3, 4]` / `["1","2","3","4"]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PinInput {
    Text(String),
    Digits(Vec<PinDigit>),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PinDigit {
    Number(u64),
    Text(String),
}

impl PinInput {
    /// Joins digit arrays into a single string.
    pub fn joined(&self) -> String {
        match self {
            PinInput::Text(s) => s.trim().to_string(),
            PinInput::Digits(digits) => digits
                .iter()
                .map(|d| match d {
                    PinDigit::Number(n) => n.to_string(),
                    PinDigit::Text(s) => s.trim().to_string(),
                })
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.joined().is_empty()
    }
}

fn digest(salt: &str, pin: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(pin.as_bytes());
    hex::encode(hasher.finalize())
}

/// Produces `sha256$<salt>$<digest>`.
pub fn hash_pin(pin: &str) -> String {
    let salt = Uuid::new_v4().simple().to_string();
    format!("{SCHEME}${salt}${}", digest(&salt, pin))
}

pub struct PinVerifier;

impl PinVerifier {
    /// Fails closed: malformed hashes and mismatches are both `InvalidPin`.
    pub fn verify(stored_hash: &str, submitted: &PinInput) -> Result<()> {
        let pin = submitted.joined();
        if pin.is_empty() || !pin.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::InvalidPin);
        }

        let mut parts = stored_hash.splitn(3, '$');
        let (Some(scheme), Some(salt), Some(expected)) = (parts.next(), parts.next(), parts.next())
        else {
            tracing::warn!("stored PIN hash is malformed");
            return Err(Error::InvalidPin);
        };
        if scheme != SCHEME {
            tracing::warn!(scheme, "unsupported PIN hash scheme");
            return Err(Error::InvalidPin);
        }

        let actual = digest(salt, &pin);
        if actual.as_bytes().ct_eq(expected.as_bytes()).unwrap_u8() != 1 {
            return Err(Error::InvalidPin);
        }
        Ok(())
    }
}
