//! Authenticated principals and credential material.
//!
//! A [`Principal`] is the result of successful token authentication and is
//! passed into every core service operation. Access-control decisions are made
//! against the principal, never against raw request data.

use crate::{CoreError, CoreResult};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

/// Number of random bytes backing an issued token.
const TOKEN_BYTES: usize = 32;

/// Role label stored alongside submitter tokens.
pub const ROLE_SUBMITTER: &str = "submitter";
/// Role label stored alongside patient tokens.
pub const ROLE_PATIENT: &str = "patient";

/// The authenticated caller of a core operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    /// A lab system authorised to write exam results.
    Submitter { client_id: String },
    /// A patient authorised to read their own exam results.
    Patient { patient_id: Uuid },
}

impl Principal {
    /// Role label for storage and API responses.
    pub fn role(&self) -> &'static str {
        match self {
            Principal::Submitter { .. } => ROLE_SUBMITTER,
            Principal::Patient { .. } => ROLE_PATIENT,
        }
    }

    /// Requires the caller to be a submitter, returning its client id.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Authorization` for patient callers.
    pub fn require_submitter(&self) -> CoreResult<&str> {
        match self {
            Principal::Submitter { client_id } => Ok(client_id),
            Principal::Patient { .. } => Err(CoreError::Authorization(
                "this operation is restricted to lab submitters".into(),
            )),
        }
    }

    /// Requires the caller to be a patient, returning their id.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Authorization` for submitter callers.
    pub fn require_patient(&self) -> CoreResult<Uuid> {
        match self {
            Principal::Patient { patient_id } => Ok(*patient_id),
            Principal::Submitter { .. } => Err(CoreError::Authorization(
                "this operation is restricted to patients".into(),
            )),
        }
    }
}

/// A freshly issued bearer token with its expiry.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TokenGrant {
    pub token: String,
    pub role: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

/// Generates an opaque bearer token.
///
/// 32 bytes of OS randomness, URL-safe base64 without padding. The token is
/// stored verbatim in `auth_tokens` and never derived from caller data.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Hex-encoded SHA-256 digest of a patient access code.
///
/// Access codes are stored hashed; the plaintext only travels in the enrolment
/// request and in token issuance.
pub fn hash_access_code(access_code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(access_code.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Checks a plaintext access code against a stored digest in constant time,
/// so the comparison leaks nothing about how many leading bytes matched.
pub fn verify_access_code(access_code: &str, stored_digest_hex: &str) -> bool {
    hash_access_code(access_code)
        .as_bytes()
        .ct_eq(stored_digest_hex.as_bytes())
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_are_unique_and_url_safe() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
        // 32 bytes -> 43 base64 chars without padding
        assert_eq!(a.len(), 43);
        assert!(a
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn access_code_hash_is_stable_hex() {
        let digest = hash_access_code("correct horse battery staple");
        assert_eq!(digest, hash_access_code("correct horse battery staple"));
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(digest, hash_access_code("wrong code"));
    }

    #[test]
    fn access_code_verification_matches_stored_digest() {
        let digest = hash_access_code("correct horse battery staple");
        assert!(verify_access_code("correct horse battery staple", &digest));
        assert!(!verify_access_code("wrong code", &digest));
        assert!(!verify_access_code("correct horse battery staple", "deadbeef"));
    }

    #[test]
    fn submitter_cannot_act_as_patient() {
        let principal = Principal::Submitter {
            client_id: "lab".into(),
        };
        assert!(principal.require_submitter().is_ok());
        assert!(matches!(
            principal.require_patient(),
            Err(CoreError::Authorization(_))
        ));
    }

    #[test]
    fn patient_cannot_act_as_submitter() {
        let principal = Principal::Patient {
            patient_id: Uuid::new_v4(),
        };
        assert!(principal.require_patient().is_ok());
        assert!(matches!(
            principal.require_submitter(),
            Err(CoreError::Authorization(_))
        ));
    }
}
