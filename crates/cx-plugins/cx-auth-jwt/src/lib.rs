//! # cx-auth-jwt
//!
//! JWT-based implementation of `CredentialManager`.
//! Issues HS256 access/refresh tokens signed with distinct secrets, verifies
//! them against the revocation list kept in the shared cache, and handles
//! Argon2 password hashing and `Basic` credential decoding.

use std::sync::Arc;
use std::time::Duration;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::Utc;
use cx_core::error::{AppError, Result};
use cx_core::models::{BasicCredentials, Role, TokenClaims, TokenKind};
use cx_core::traits::{Cache, CredentialManager};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Deserialize;

const REVOKED_PREFIX: &str = "BLOCK_TOKEN_";

/// Secrets and lifetimes for both token kinds.
#[derive(Clone)]
pub struct TokenPolicy {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl: chrono::Duration,
    pub refresh_ttl: chrono::Duration,
}

struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: chrono::Duration,
}

impl SigningKeys {
    fn new(secret: &str, ttl: chrono::Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }
}

/// Only the expiry is needed to size a revocation marker.
#[derive(Deserialize)]
struct Expiry {
    exp: i64,
}

pub struct JwtCredentialManager {
    access: SigningKeys,
    refresh: SigningKeys,
    validation: Validation,
    cache: Arc<dyn Cache>,
}

impl JwtCredentialManager {
    pub fn new(policy: TokenPolicy, cache: Arc<dyn Cache>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Revocation markers expire with the token; any leeway would revive a
        // revoked token for that long.
        validation.leeway = 0;
        // A token dies at the start of its `exp` second, before its marker
        // (whole seconds counted from the revoke instant) can lapse.
        validation.reject_tokens_expiring_in_less_than = 1;

        Self {
            access: SigningKeys::new(&policy.access_secret, policy.access_ttl),
            refresh: SigningKeys::new(&policy.refresh_secret, policy.refresh_ttl),
            validation,
            cache,
        }
    }

    fn keys(&self, kind: TokenKind) -> &SigningKeys {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }
}

fn malformed() -> AppError {
    AppError::BadRequest("token format is invalid".into())
}

/// Splits `"<scheme> <value>"`, matching the scheme case-insensitively.
fn strip_scheme<'a>(raw: &'a str, scheme: &str) -> Result<&'a str> {
    let parts: Vec<&str> = raw.split(' ').collect();
    match parts.as_slice() {
        [found, value] if found.eq_ignore_ascii_case(scheme) && !value.is_empty() => Ok(value),
        _ => Err(malformed()),
    }
}

fn revoked_key(token: &str) -> String {
    format!("{REVOKED_PREFIX}{token}")
}

#[async_trait]
impl CredentialManager for JwtCredentialManager {
    fn issue(&self, subject: i64, role: Role, kind: TokenKind) -> Result<String> {
        let keys = self.keys(kind);
        let now = Utc::now().timestamp();
        let claims = TokenClaims {
            sub: subject,
            role,
            kind,
            iat: now,
            exp: now + keys.ttl.num_seconds(),
            jti: uuid::Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)
            .map_err(|e| AppError::Internal(anyhow::Error::new(e).context("signing token")))
    }

    async fn verify(&self, raw_bearer: &str, kind: TokenKind) -> Result<TokenClaims> {
        let token = strip_scheme(raw_bearer, "bearer")?;
        if token.split('.').count() != 3 {
            return Err(malformed());
        }

        let claims = decode::<TokenClaims>(token, &self.keys(kind).decoding, &self.validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "token rejected");
                AppError::Unauthorized("token is invalid or expired".into())
            })?
            .claims;

        if claims.kind != kind {
            let expected = match kind {
                TokenKind::Access => "an access",
                TokenKind::Refresh => "a refresh",
            };
            return Err(AppError::Unauthorized(format!("expected {expected} token")));
        }

        if self.is_revoked(token).await? {
            return Err(AppError::Unauthorized("token has been revoked".into()));
        }

        Ok(claims)
    }

    async fn revoke(&self, token: &str) -> Result<()> {
        let payload = token.split('.').nth(1).ok_or_else(malformed)?;
        let payload = URL_SAFE_NO_PAD.decode(payload).map_err(|_| malformed())?;
        let Expiry { exp } = serde_json::from_slice(&payload).map_err(|_| malformed())?;

        let remaining = (exp - Utc::now().timestamp()).max(1);
        let ttl = Duration::from_secs(u64::try_from(remaining).unwrap_or(1));
        let marker = String::from_utf8_lossy(&payload).into_owned();

        self.cache.set(&revoked_key(token), marker, ttl).await?;
        tracing::debug!(ttl_secs = ttl.as_secs(), "token revoked");
        Ok(())
    }

    async fn is_revoked(&self, token: &str) -> Result<bool> {
        Ok(self.cache.get(&revoked_key(token)).await?.is_some())
    }

    fn parse_basic(&self, raw_basic: &str) -> Result<BasicCredentials> {
        let encoded = strip_scheme(raw_basic, "basic")?;
        let decoded = STANDARD.decode(encoded).map_err(|_| malformed())?;
        let decoded = String::from_utf8(decoded).map_err(|_| malformed())?;

        // ex) "email:password"
        let parts: Vec<&str> = decoded.split(':').collect();
        match parts.as_slice() {
            [email, password] => Ok(BasicCredentials { email: email.to_string(), password: password.to_string() }),
            _ => Err(malformed()),
        }
    }

    fn hash_password(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AppError::Internal(anyhow::anyhow!("hashing password: {e}")))
    }

    /// Verifies if a provided password matches a stored Argon2 hash.
    fn verify_password(&self, password: &str, hash: &str) -> bool {
        let parsed_hash = match PasswordHash::new(hash) {
            Ok(p) => p,
            Err(_) => return false,
        };
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cx_cache::MemoryCache;
    use cx_core::MockCache;

    fn policy(access_ttl_secs: i64) -> TokenPolicy {
        TokenPolicy {
            access_secret: "access-secret".into(),
            refresh_secret: "refresh-secret".into(),
            access_ttl: chrono::Duration::seconds(access_ttl_secs),
            refresh_ttl: chrono::Duration::hours(24),
        }
    }

    fn manager() -> JwtCredentialManager {
        JwtCredentialManager::new(policy(300), Arc::new(MemoryCache::new()))
    }

    #[tokio::test]
    async fn test_issue_then_verify() {
        let creds = manager();
        let token = creds.issue(7, Role::PaidUser, TokenKind::Access).unwrap();

        let claims = creds.verify(&format!("Bearer {token}"), TokenKind::Access).await.unwrap();
        assert_eq!(claims.sub, 7);
        assert_eq!(claims.role, Role::PaidUser);
        assert_eq!(claims.kind, TokenKind::Access);
        assert_eq!(claims.exp - claims.iat, 300);
    }

    #[tokio::test]
    async fn test_scheme_is_case_insensitive() {
        let creds = manager();
        let token = creds.issue(1, Role::User, TokenKind::Refresh).unwrap();
        assert!(creds.verify(&format!("bEaReR {token}"), TokenKind::Refresh).await.is_ok());
    }

    #[tokio::test]
    async fn test_malformed_bearer_is_bad_request() {
        let creds = manager();
        let token = creds.issue(1, Role::User, TokenKind::Access).unwrap();

        for raw in [token.clone(), format!("Basic {token}"), format!("Bearer {token} extra"), "Bearer a.b".into()] {
            let err = creds.verify(&raw, TokenKind::Access).await.unwrap_err();
            assert_eq!(err.kind(), "bad_request", "{raw}");
        }
    }

    #[tokio::test]
    async fn test_refresh_token_is_not_an_access_token() {
        let creds = manager();
        let refresh = creds.issue(1, Role::User, TokenKind::Refresh).unwrap();
        let err = creds.verify(&format!("Bearer {refresh}"), TokenKind::Access).await.unwrap_err();
        assert_eq!(err.kind(), "unauthorized");
    }

    #[tokio::test]
    async fn test_type_claim_is_checked_even_with_shared_secret() {
        let mut shared = policy(300);
        shared.refresh_secret = shared.access_secret.clone();
        let creds = JwtCredentialManager::new(shared, Arc::new(MemoryCache::new()));

        let refresh = creds.issue(1, Role::User, TokenKind::Refresh).unwrap();
        let err = creds.verify(&format!("Bearer {refresh}"), TokenKind::Access).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(ref reason) if reason.contains("access")));
    }

    #[tokio::test]
    async fn test_expired_token_is_unauthorized() {
        let creds = JwtCredentialManager::new(policy(-30), Arc::new(MemoryCache::new()));
        let token = creds.issue(1, Role::User, TokenKind::Access).unwrap();
        let err = creds.verify(&format!("Bearer {token}"), TokenKind::Access).await.unwrap_err();
        assert_eq!(err.kind(), "unauthorized");
    }

    #[tokio::test]
    async fn test_token_is_dead_within_its_expiry_second() {
        let creds = JwtCredentialManager::new(policy(0), Arc::new(MemoryCache::new()));
        let token = creds.issue(1, Role::User, TokenKind::Access).unwrap();
        let err = creds.verify(&format!("Bearer {token}"), TokenKind::Access).await.unwrap_err();
        assert_eq!(err.kind(), "unauthorized");
    }

    #[tokio::test]
    async fn test_revoked_token_stays_dead_after_its_marker_lapses() {
        // just past a second boundary, so the marker outlives `exp` by the least
        while Utc::now().timestamp_subsec_millis() > 50 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let creds = JwtCredentialManager::new(policy(1), Arc::new(MemoryCache::new()));
        let token = creds.issue(1, Role::User, TokenKind::Access).unwrap();
        creds.revoke(&token).await.unwrap();

        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert!(!creds.is_revoked(&token).await.unwrap());
        let err = creds.verify(&format!("Bearer {token}"), TokenKind::Access).await.unwrap_err();
        assert_eq!(err.kind(), "unauthorized");
    }

    #[tokio::test]
    async fn test_revoked_token_fails_verification() {
        let creds = manager();
        let token = creds.issue(3, Role::Admin, TokenKind::Access).unwrap();
        let other = creds.issue(3, Role::Admin, TokenKind::Access).unwrap();
        assert_ne!(token, other);

        creds.revoke(&token).await.unwrap();

        let err = creds.verify(&format!("Bearer {token}"), TokenKind::Access).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(ref reason) if reason.contains("revoked")));
        assert!(creds.verify(&format!("Bearer {other}"), TokenKind::Access).await.is_ok());
    }

    #[tokio::test]
    async fn test_revocation_ttl_matches_remaining_validity() {
        let mut cache = MockCache::new();
        cache
            .expect_set()
            .withf(|key, _, ttl| {
                key.starts_with(REVOKED_PREFIX) && *ttl <= Duration::from_secs(300) && *ttl >= Duration::from_secs(298)
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        let creds = JwtCredentialManager::new(policy(300), Arc::new(cache));

        let token = creds.issue(1, Role::User, TokenKind::Access).unwrap();
        creds.revoke(&token).await.unwrap();
    }

    #[tokio::test]
    async fn test_revoking_an_expired_token_uses_minimum_ttl() {
        let mut cache = MockCache::new();
        cache
            .expect_set()
            .withf(|_, _, ttl| *ttl == Duration::from_secs(1))
            .times(1)
            .returning(|_, _, _| Ok(()));
        let creds = JwtCredentialManager::new(policy(-30), Arc::new(cache));

        let token = creds.issue(1, Role::User, TokenKind::Access).unwrap();
        creds.revoke(&token).await.unwrap();
    }

    #[tokio::test]
    async fn test_revoking_garbage_is_bad_request() {
        let creds = manager();
        assert_eq!(creds.revoke("not-a-jwt").await.unwrap_err().kind(), "bad_request");
        assert_eq!(creds.revoke("a.%%%.c").await.unwrap_err().kind(), "bad_request");
    }

    #[test]
    fn test_parse_basic() {
        let creds = manager();
        let raw = format!("Basic {}", STANDARD.encode("neo@matrix.io:redpill"));
        assert_eq!(
            creds.parse_basic(&raw).unwrap(),
            BasicCredentials { email: "neo@matrix.io".into(), password: "redpill".into() }
        );

        for bad in [
            STANDARD.encode("neo@matrix.io:redpill"),
            format!("Bearer {}", STANDARD.encode("a:b")),
            format!("Basic {}", STANDARD.encode("no-colon")),
            format!("Basic {}", STANDARD.encode("a:b:c")),
            "Basic !!!".to_string(),
        ] {
            assert_eq!(creds.parse_basic(&bad).unwrap_err().kind(), "bad_request", "{bad}");
        }
    }

    #[test]
    fn test_password_hash_round_trip() {
        let creds = manager();
        let hash = creds.hash_password("hunter2").unwrap();
        assert!(creds.verify_password("hunter2", &hash));
        assert!(!creds.verify_password("hunter3", &hash));
        assert!(!creds.verify_password("hunter2", "not-a-phc-string"));
    }
}
