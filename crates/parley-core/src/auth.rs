use async_trait::async_trait;
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use parley_db::DbPool;
use parley_models::user::Identity;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::CoreError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token expired")]
    TokenExpired,
    #[error("invalid token")]
    InvalidToken,
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub email: String,
    pub username: String,
    pub exp: usize,
    pub iat: usize,
}

/// Stored credential used for the revocation check.
#[derive(Debug, Clone)]
pub struct CredentialRecord {
    pub user_id: i64,
    pub access_token: String,
}

pub fn create_token(
    user_id: i64,
    email: &str,
    username: &str,
    secret: &str,
    expiry_secs: u64,
) -> Result<String, AuthError> {
    let now = chrono::Utc::now().timestamp() as usize;
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        username: username.to_string(),
        iat: now,
        exp: now + expiry_secs as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AuthError::Internal(e.to_string()))
}

pub fn validate_token(token: &str, secret: &str) -> Result<Claims, AuthError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        _ => AuthError::InvalidToken,
    })
}

/// Identity/credential collaborator consumed by the gateway and the HTTP
/// extractor.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn verify_credential(&self, token: &str) -> Result<Identity, CoreError>;
    async fn find_session_by_user_id(
        &self,
        user_id: i64,
    ) -> Result<Option<CredentialRecord>, CoreError>;
}

/// Verifies the bearer credential and checks it is still the one on record
/// for the user.
pub async fn authenticate(auth: &dyn Authenticator, token: &str) -> Result<Identity, CoreError> {
    let identity = auth.verify_credential(token).await?;
    match auth.find_session_by_user_id(identity.user_id).await? {
        Some(record) if record.access_token == token => Ok(identity),
        Some(_) => {
            tracing::debug!(user_id = identity.user_id, "credential superseded");
            Err(CoreError::Unauthorized)
        }
        None => {
            tracing::debug!(user_id = identity.user_id, "credential revoked");
            Err(CoreError::Unauthorized)
        }
    }
}

pub struct JwtAuthenticator {
    db: DbPool,
    secret: String,
}

impl JwtAuthenticator {
    pub fn new(db: DbPool, secret: impl Into<String>) -> Self {
        Self {
            db,
            secret: secret.into(),
        }
    }
}

#[async_trait]
impl Authenticator for JwtAuthenticator {
    async fn verify_credential(&self, token: &str) -> Result<Identity, CoreError> {
        let claims = validate_token(token, &self.secret).map_err(|err| {
            tracing::debug!("credential rejected: {}", err);
            CoreError::Unauthorized
        })?;
        Ok(Identity {
            user_id: claims.sub,
            email: claims.email,
            username: claims.username,
        })
    }

    async fn find_session_by_user_id(
        &self,
        user_id: i64,
    ) -> Result<Option<CredentialRecord>, CoreError> {
        let row = parley_db::auth_tokens::get_auth_token_by_user_id(&self.db, user_id).await?;
        Ok(row.map(|row| CredentialRecord {
            user_id: row.user_id,
            access_token: row.access_token,
        }))
    }
}

fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Mints an access token for the user and records it, replacing any earlier
/// credential.
pub async fn issue_credential(
    db: &DbPool,
    secret: &str,
    expiry_secs: u64,
    user_id: i64,
    email: &str,
    username: &str,
) -> Result<String, CoreError> {
    let access = create_token(user_id, email, username, secret, expiry_secs)
        .map_err(|e| CoreError::Internal(e.to_string()))?;
    parley_db::auth_tokens::upsert_auth_token(db, user_id, &access, &random_token(48)).await?;
    Ok(access)
}

/// Revokes the user's credential.
pub async fn revoke_credential(db: &DbPool, user_id: i64) -> Result<bool, CoreError> {
    Ok(parley_db::auth_tokens::delete_auth_token(db, user_id).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    async fn test_pool() -> DbPool {
        let pool = parley_db::create_pool("sqlite::memory:", 1).await.unwrap();
        parley_db::run_migrations(&pool).await.unwrap();
        pool
    }

    #[test]
    fn token_round_trip_carries_identity() {
        let token = create_token(7, "a@example.com", "alice", SECRET, 60).unwrap();
        let claims = validate_token(&token, SECRET).unwrap();
        assert_eq!(claims.sub, 7);
        assert_eq!(claims.username, "alice");
        assert!(matches!(
            validate_token(&token, "other"),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn expired_tokens_are_reported_as_expired() {
        let now = chrono::Utc::now().timestamp() as usize;
        let claims = Claims {
            sub: 1,
            email: "a@example.com".into(),
            username: "alice".into(),
            iat: now - 600,
            exp: now - 300,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        assert!(matches!(
            validate_token(&token, SECRET),
            Err(AuthError::TokenExpired)
        ));
    }

    #[tokio::test]
    async fn authenticate_requires_a_live_credential() {
        let pool = test_pool().await;
        parley_db::users::create_user(&pool, 1, "alice", "a@example.com", "hash")
            .await
            .unwrap();
        let auth = JwtAuthenticator::new(pool.clone(), SECRET);

        let token = issue_credential(&pool, SECRET, 60, 1, "a@example.com", "alice")
            .await
            .unwrap();
        let identity = authenticate(&auth, &token).await.unwrap();
        assert_eq!(identity.user_id, 1);

        revoke_credential(&pool, 1).await.unwrap();
        assert!(matches!(
            authenticate(&auth, &token).await,
            Err(CoreError::Unauthorized)
        ));
        assert!(matches!(
            authenticate(&auth, "garbage").await,
            Err(CoreError::Unauthorized)
        ));
    }
}
