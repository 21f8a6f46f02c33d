use anyhow::{Context, Result};

/// Runtime configuration, read once at startup.
///
/// The presence of `JWT_SECRET` decides the session model for the whole
/// process: signed tokens when set, plain identity cookies otherwise.
#[derive(Debug, Clone)]
pub struct Config {
    pub mongo_uri: String,
    pub db_name: Option<String>,
    pub jwt_secret: Option<String>,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let mongo_uri = std::env::var("MONGO_URI").context("MONGO_URI must be set")?;

        let db_name = std::env::var("DB_NAME").ok().filter(|v| !v.is_empty());
        let jwt_secret = std::env::var("JWT_SECRET").ok().filter(|v| !v.is_empty());

        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(5000);

        Ok(Self {
            mongo_uri,
            db_name,
            jwt_secret,
            port,
        })
    }
}
