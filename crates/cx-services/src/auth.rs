//! Account flows on top of the credential manager.

use std::sync::Arc;

use cx_core::access::authorize;
use cx_core::error::{AppError, Result};
use cx_core::models::{Identity, NewUser, Role, TokenKind, TokenPair, User};
use cx_core::traits::{CredentialManager, UserRepo};

pub struct AuthService {
    users: Arc<dyn UserRepo>,
    credentials: Arc<dyn CredentialManager>,
}

fn invalid_credentials() -> AppError {
    AppError::BadRequest("invalid credentials".into())
}

impl AuthService {
    pub fn new(users: Arc<dyn UserRepo>, credentials: Arc<dyn CredentialManager>) -> Self {
        Self { users, credentials }
    }

    /// Creates a `User`-role account from a `Basic` authorization value.
    #[tracing::instrument(skip_all)]
    pub async fn register(&self, raw_basic: &str) -> Result<User> {
        let creds = self.credentials.parse_basic(raw_basic)?;
        let password_hash = self.credentials.hash_password(&creds.password)?;

        let user = self
            .users
            .insert_user(&NewUser { email: creds.email, password_hash, role: Role::User })
            .await?;
        tracing::info!(user_id = user.id, "account registered");
        Ok(user)
    }

    /// Unknown email and wrong password fail the same way.
    #[tracing::instrument(skip_all)]
    pub async fn login(&self, raw_basic: &str) -> Result<TokenPair> {
        let creds = self.credentials.parse_basic(raw_basic)?;
        let user = self
            .users
            .find_user_by_email(&creds.email)
            .await?
            .ok_or_else(invalid_credentials)?;

        if !self.credentials.verify_password(&creds.password, &user.password) {
            return Err(invalid_credentials());
        }

        Ok(TokenPair {
            refresh_token: self.credentials.issue(user.id, user.role, TokenKind::Refresh)?,
            access_token: self.credentials.issue(user.id, user.role, TokenKind::Access)?,
        })
    }

    /// Trades a `Bearer <refresh token>` for a fresh access token.
    #[tracing::instrument(skip_all)]
    pub async fn rotate_access(&self, raw_bearer: &str) -> Result<String> {
        let claims = self.credentials.verify(raw_bearer, TokenKind::Refresh).await?;
        authorize("auth.rotate", Some(&Identity::from(&claims)))?;
        self.credentials.issue(claims.sub, claims.role, TokenKind::Access)
    }

    #[tracing::instrument(skip_all)]
    pub async fn revoke(&self, token: &str) -> Result<()> {
        self.credentials.revoke(token).await
    }

    pub async fn identify(&self, raw_bearer: &str) -> Result<Identity> {
        let claims = self.credentials.verify(raw_bearer, TokenKind::Access).await?;
        Ok(Identity::from(&claims))
    }
}
