use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use infra::models::Player;

use crate::auth::AuthConfig;
use crate::error::AppError;
use crate::gql::types::Role;

/// Identity vouched for by the session collaborator. The engine trusts these as given.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // Subject (user ID)
    pub email: String,
    pub role: Role,
    pub level: Option<f64>,
    pub category: Option<String>,
    pub iat: i64, // Issued at
    pub exp: i64, // Expiration
}

impl Claims {
    pub fn new(user_id: Uuid, email: String, role: Role, expiration_hours: u64) -> Self {
        let now = Utc::now();
        let exp = now + Duration::hours(expiration_hours as i64);

        Self {
            sub: user_id.to_string(),
            email,
            role,
            level: None,
            category: None,
            iat: now.timestamp(),
            exp: exp.timestamp(),
        }
    }

    pub fn with_rating(mut self, level: Option<f64>, category: Option<String>) -> Self {
        self.level = level;
        self.category = category;
        self
    }

    pub fn user_id(&self) -> Result<Uuid, AppError> {
        Uuid::parse_str(&self.sub).map_err(|e| AppError::Unauthorized(format!("invalid subject: {e}")))
    }

    pub fn player(&self) -> Result<Player, AppError> {
        Ok(Player {
            user_id: self.user_id()?,
            level: self.level,
            category: self.category.clone(),
        })
    }
}

#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiration_hours: u64,
}

impl JwtService {
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.jwt_secret.as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            expiration_hours: config.jwt_expiration_hours,
        }
    }

    pub fn issue_claims(&self, user_id: Uuid, email: String, role: Role) -> Claims {
        Claims::new(user_id, email, role, self.expiration_hours)
    }

    pub fn create_token(&self, claims: &Claims) -> Result<String, AppError> {
        encode(&Header::default(), claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(e.to_string()))
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, AppError> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| AppError::Unauthorized(e.to_string()))
    }
}
