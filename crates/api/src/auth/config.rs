use anyhow::Context;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_hours: u64,
}

impl AuthConfig {
    pub fn new(jwt_secret: impl Into<String>, jwt_expiration_hours: u64) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            jwt_expiration_hours,
        }
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let jwt_secret = std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        let jwt_expiration_hours = std::env::var("JWT_EXPIRATION_HOURS")
            .unwrap_or_else(|_| "24".into())
            .parse()
            .context("JWT_EXPIRATION_HOURS must be a positive integer")?;
        Ok(Self::new(jwt_secret, jwt_expiration_hours))
    }
}
