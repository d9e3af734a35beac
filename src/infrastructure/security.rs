// Password hashing and bearer token issuance

use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::SecurityConfig;
use crate::entities::User;
use crate::error::{AppError, AppResult};

const AUDIENCE: &str = "connectly-api";
const ISSUER: &str = "connectly-auth";

/// JWT claims carried by every bearer token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub username: String,
    pub role: String,
    pub iat: u64,
    pub exp: u64,
    pub aud: String,
    pub iss: String,
    pub session_id: String,
}

impl Claims {
    pub fn user_id(&self) -> AppResult<i64> {
        self.sub
            .parse()
            .map_err(|_| AppError::Unauthorized("Invalid token.".to_string()))
    }
}

/// Issued token plus its lifetime, as returned by login and registration
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_in: u64,
}

pub struct SecurityService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    token_ttl_secs: u64,
    password_min_length: usize,
}

impl SecurityService {
    pub fn new(config: &SecurityConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[AUDIENCE]);
        validation.set_issuer(&[ISSUER]);

        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
            token_ttl_secs: config.token_ttl_secs,
            password_min_length: config.password_min_length,
        }
    }

    pub fn password_min_length(&self) -> usize {
        self.password_min_length
    }

    pub fn hash_password(&self, password: &str) -> AppResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
        Ok(hash.to_string())
    }

    pub fn verify_password(&self, password: &str, hash: &str) -> AppResult<bool> {
        let parsed = PasswordHash::new(hash)
            .map_err(|e| AppError::Internal(format!("Invalid password hash: {}", e)))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }

    #[instrument(skip(self, user), fields(user_id = user.id))]
    pub fn issue_token(&self, user: &User) -> AppResult<IssuedToken> {
        let now = Utc::now().timestamp().max(0) as u64;
        let claims = Claims {
            sub: user.id.to_string(),
            username: user.username.clone(),
            role: user.role.as_str().to_string(),
            iat: now,
            exp: now + self.token_ttl_secs,
            aud: AUDIENCE.to_string(),
            iss: ISSUER.to_string(),
            session_id: uuid::Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))?;
        debug!("Issued token for {}", user.username);

        Ok(IssuedToken {
            token,
            expires_in: self.token_ttl_secs,
        })
    }

    pub fn validate_token(&self, token: &str) -> AppResult<Claims> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!("Rejected token: {}", e);
                AppError::Unauthorized("Invalid token.".to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::entities::Role;

    fn service() -> SecurityService {
        SecurityService::new(&Config::default().security)
    }

    fn user() -> User {
        User {
            id: 42,
            username: "carol".to_string(),
            email: "carol@example.com".to_string(),
            password_hash: String::new(),
            role: Role::Editor,
            groups: vec!["Editor".to_string()],
            permissions: Vec::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn password_hash_verifies_only_the_original() {
        let security = service();
        let hash = security.hash_password("correct horse").unwrap();
        assert!(security.verify_password("correct horse", &hash).unwrap());
        assert!(!security.verify_password("wrong horse", &hash).unwrap());
    }

    #[test]
    fn issued_token_round_trips_claims() {
        let security = service();
        let issued = security.issue_token(&user()).unwrap();
        let claims = security.validate_token(&issued.token).unwrap();
        assert_eq!(claims.user_id().unwrap(), 42);
        assert_eq!(claims.role, "EDITOR");
        assert_eq!(claims.username, "carol");
    }

    #[test]
    fn token_signed_with_another_secret_is_rejected() {
        let mut other = Config::default().security;
        other.jwt_secret = "another-secret".to_string();
        let foreign = SecurityService::new(&other).issue_token(&user()).unwrap();

        let err = service().validate_token(&foreign.token).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn garbage_token_is_rejected() {
        assert!(service().validate_token("not-a-token").is_err());
    }
}
