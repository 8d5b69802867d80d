use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Mongo,
    Memory,
}

#[derive(Debug, Clone)]
pub struct AdminSeed {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub store: StoreKind,
    pub database_url: Option<String>,
    pub database_name: String,
    pub bind_address: String,
    /// Administrator created at startup when no user has this email yet.
    pub admin: Option<AdminSeed>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("STORE must be `mongo` or `memory`, got `{0}`")]
    UnknownStore(String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        // No fallback secret: a forgotten JWT_SECRET must stop the service.
        let jwt_secret = get("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let store = match get("STORE").as_deref() {
            None | Some("mongo") => StoreKind::Mongo,
            Some("memory") => StoreKind::Memory,
            Some(other) => return Err(ConfigError::UnknownStore(other.to_string())),
        };

        let database_url = get("DATABASE_URL");
        if store == StoreKind::Mongo && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let admin = match (get("ADMIN_EMAIL"), get("ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(AdminSeed { email, password }),
            _ => None,
        };

        Ok(Config {
            jwt_secret,
            store,
            database_url,
            database_name: get("DATABASE_NAME").unwrap_or_else(|| "ecommerce".to_string()),
            bind_address: get("BIND_ADDRESS").unwrap_or_else(|| "127.0.0.1:8080".to_string()),
            admin,
        })
    }
}
