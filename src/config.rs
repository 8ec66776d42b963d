use std::env;

use derive_more::{Display, Error};

#[derive(Debug, Display, Error)]
pub enum ConfigError {
    #[display(fmt = "{} must be set", _0)]
    Missing(#[error(not(source))] &'static str),
    #[display(fmt = "{} has an invalid value: {}", _0, _1)]
    Invalid(#[error(not(source))] &'static str, #[error(not(source))] String),
}

impl From<ConfigError> for std::io::Error {
    fn from(err: ConfigError) -> Self {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Mongo,
    Memory,
}

#[derive(Clone)]
pub struct Config {
    pub storage: StorageBackend,
    pub mongo_uri: String,
    pub database_name: String,
    pub jwt_secret: String,
    pub token_ttl_minutes: i64,
    pub bcrypt_cost: u32,
    pub frontend_origin: String,
    pub bind_addr: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let storage = match env::var("ANDON_STORAGE")
            .unwrap_or_else(|_| "mongo".to_string())
            .to_lowercase()
            .as_str()
        {
            "mongo" | "mongodb" => StorageBackend::Mongo,
            "memory" => StorageBackend::Memory,
            other => return Err(ConfigError::Invalid("ANDON_STORAGE", other.to_string())),
        };

        let mongo_uri = match (env::var("MONGO_URI"), storage) {
            (Ok(uri), _) => uri,
            (Err(_), StorageBackend::Memory) => String::new(),
            (Err(_), StorageBackend::Mongo) => return Err(ConfigError::Missing("MONGO_URI")),
        };

        let token_ttl_minutes = parse_or("TOKEN_TTL_MINUTES", 60)?;
        let bcrypt_cost = parse_or("BCRYPT_COST", bcrypt::DEFAULT_COST)?;
        if !(4..=31).contains(&bcrypt_cost) {
            return Err(ConfigError::Invalid("BCRYPT_COST", bcrypt_cost.to_string()));
        }

        Ok(Self {
            storage,
            mongo_uri,
            database_name: env::var("DATABASE_NAME").unwrap_or_else(|_| "andon".to_string()),
            jwt_secret: env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?,
            token_ttl_minutes,
            bcrypt_cost,
            frontend_origin: env::var("FRONTEND_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
        })
    }
}

fn parse_or<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(key, raw)),
        Err(_) => Ok(default),
    }
}
