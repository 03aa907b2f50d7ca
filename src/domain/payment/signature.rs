//! Callback signature verification.
//!
//! The gateway signs every callback with HMAC-SHA256 over `"{t}.{body}"`
//! and sends `X-Gateway-Signature: t=<unix>,v1=<hex>`. Timestamp bounds
//! stop replays of captured callbacks.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Maximum allowed age for a signed callback (5 minutes).
const MAX_EVENT_AGE_SECS: i64 = 300;

/// Maximum allowed clock skew for future timestamps (1 minute).
const MAX_CLOCK_SKEW_SECS: i64 = 60;

/// Reasons a signature is not accepted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("signature header is malformed: {0}")]
    Malformed(String),

    #[error("signature does not match")]
    Mismatch,

    #[error("signature timestamp is older than the replay window")]
    TimestampOutOfRange,

    #[error("signature timestamp is in the future")]
    InvalidTimestamp,
}

/// Parsed components of the signature header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub v1_signature: Vec<u8>,
}

impl SignatureHeader {
    /// Parses `t=<timestamp>,v1=<hex>`. Unknown keys are ignored.
    pub fn parse(header: &str) -> Result<Self, SignatureError> {
        let mut timestamp: Option<i64> = None;
        let mut v1_signature: Option<Vec<u8>> = None;

        for part in header.split(',') {
            let (key, value) = part
                .trim()
                .split_once('=')
                .ok_or_else(|| SignatureError::Malformed("invalid header format".to_string()))?;

            match key {
                "t" => {
                    timestamp = Some(value.parse().map_err(|_| {
                        SignatureError::Malformed("invalid timestamp".to_string())
                    })?);
                }
                "v1" => {
                    v1_signature = Some(hex::decode(value).map_err(|_| {
                        SignatureError::Malformed("invalid v1 signature hex".to_string())
                    })?);
                }
                _ => {}
            }
        }

        Ok(SignatureHeader {
            timestamp: timestamp
                .ok_or_else(|| SignatureError::Malformed("missing timestamp".to_string()))?,
            v1_signature: v1_signature
                .ok_or_else(|| SignatureError::Malformed("missing v1 signature".to_string()))?,
        })
    }
}

/// Verifies callback signatures with the shared webhook secret.
pub struct CallbackSignatureVerifier {
    secret: SecretString,
}

impl CallbackSignatureVerifier {
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    /// Verifies `header` against `payload` using the current time.
    pub fn verify(&self, payload: &[u8], header: &str) -> Result<(), SignatureError> {
        self.verify_at(payload, header, chrono::Utc::now().timestamp())
    }

    /// Verifies `header` against `payload` as of `now` (unix seconds).
    pub fn verify_at(&self, payload: &[u8], header: &str, now: i64) -> Result<(), SignatureError> {
        let header = SignatureHeader::parse(header)?;

        let age = match now.checked_sub(header.timestamp) {
            Some(age) => age,
            None if header.timestamp < now => return Err(SignatureError::TimestampOutOfRange),
            None => return Err(SignatureError::InvalidTimestamp),
        };
        if age > MAX_EVENT_AGE_SECS {
            return Err(SignatureError::TimestampOutOfRange);
        }
        if age < -MAX_CLOCK_SKEW_SECS {
            return Err(SignatureError::InvalidTimestamp);
        }

        let expected = self.compute(header.timestamp, payload)?;
        if !constant_time_compare(&expected, &header.v1_signature) {
            return Err(SignatureError::Mismatch);
        }
        Ok(())
    }

    /// Produces a header value for `payload` signed at `timestamp`.
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> Result<String, SignatureError> {
        let mac = self.compute(timestamp, payload)?;
        Ok(format!("t={},v1={}", timestamp, hex::encode(mac)))
    }

    fn compute(&self, timestamp: i64, payload: &[u8]) -> Result<Vec<u8>, SignatureError> {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|e| SignatureError::Malformed(e.to_string()))?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
