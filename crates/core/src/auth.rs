//! Token issuance and authentication.
//!
//! Tokens are opaque random strings persisted in `auth_tokens` with an
//! expiry. Authentication is a single indexed lookup; there is nothing to
//! decode client-side and revocation is a row delete.

use crate::repositories::{patients, tokens};
use crate::{principal, CoreConfig, CoreError, CoreResult, Principal, TokenGrant};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// Credential and token operations.
#[derive(Clone)]
pub struct AuthService {
    pool: PgPool,
    cfg: Arc<CoreConfig>,
}

impl AuthService {
    pub fn new(pool: PgPool, cfg: Arc<CoreConfig>) -> Self {
        Self { pool, cfg }
    }

    /// Issues a token for the configured lab submitter.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Authentication` when the client id or secret do
    /// not match the configured credentials. The same error is used for both
    /// cases so the response does not reveal which part was wrong.
    pub async fn issue_submitter_token(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> CoreResult<TokenGrant> {
        if client_id != self.cfg.client_id() || client_secret != self.cfg.client_secret() {
            tracing::warn!(client_id, "submitter token refused: bad credentials");
            return Err(CoreError::Authentication(
                "invalid client_id or client_secret".into(),
            ));
        }

        let principal = Principal::Submitter {
            client_id: client_id.to_owned(),
        };
        self.issue(principal).await
    }

    /// Issues a token for an enrolled patient.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Authentication` when the patient is unknown,
    /// deleted, or the access code does not match.
    pub async fn issue_patient_token(
        &self,
        patient_id: Uuid,
        access_code: &str,
    ) -> CoreResult<TokenGrant> {
        let stored = patients::access_code_hash(&self.pool, patient_id).await?;

        // Unknown patient and wrong code produce the same error on purpose.
        let authenticated = stored
            .map(|hash| principal::verify_access_code(access_code, &hash))
            .unwrap_or(false);
        if !authenticated {
            tracing::warn!(patient_id = %patient_id, "patient token refused: bad credentials");
            return Err(CoreError::Authentication(
                "invalid patient_id or access_code".into(),
            ));
        }

        self.issue(Principal::Patient { patient_id }).await
    }

    async fn issue(&self, principal: Principal) -> CoreResult<TokenGrant> {
        let token = principal::generate_token();
        let expires_at = chrono::Utc::now() + self.cfg.token_ttl();

        tokens::insert(&self.pool, &token, &principal, expires_at).await?;
        tracing::info!(role = principal.role(), "token issued");

        Ok(TokenGrant {
            token,
            role: principal.role().to_owned(),
            expires_at,
        })
    }

    /// Resolves a bearer token to its principal.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Authentication` for unknown or expired tokens.
    pub async fn authenticate(&self, token: &str) -> CoreResult<Principal> {
        tokens::lookup_valid(&self.pool, token)
            .await?
            .ok_or_else(|| CoreError::Authentication("invalid or expired token".into()))
    }

    /// Deletes expired tokens. Submitter only.
    pub async fn cleanup_expired(&self, principal: &Principal) -> CoreResult<u64> {
        principal.require_submitter()?;

        let deleted = tokens::delete_expired(&self.pool).await?;
        if deleted > 0 {
            tracing::info!(deleted, "expired tokens removed");
        }
        Ok(deleted)
    }
}
