use std::sync::Arc;

use log::info;

use crate::auth::password;
use crate::config::{AdminSeed, Config, ConfigError, StoreKind};
use crate::models::{NewUser, Role};
use crate::store::{MemoryStore, MongoStore, Store, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("store unavailable: {0}")]
    Store(#[from] StoreError),
    #[error("failed to hash admin password: {0}")]
    Hash(#[from] argon2::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub async fn open_store(config: &Config) -> Result<Arc<dyn Store>, StartupError> {
    match config.store {
        StoreKind::Memory => {
            info!("Using in-memory store; data is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreKind::Mongo => {
            let url = config
                .database_url
                .as_deref()
                .ok_or(ConfigError::Missing("DATABASE_URL"))?;
            let store = MongoStore::connect(url, &config.database_name).await?;
            Ok(Arc::new(store))
        }
    }
}

/// Creates the configured administrator unless that email is already taken.
/// Returns whether a user was created.
pub async fn ensure_admin(store: &dyn Store, seed: &AdminSeed) -> Result<bool, StartupError> {
    if store.find_user_by_email(&seed.email).await?.is_some() {
        return Ok(false);
    }
    let user = store
        .create_user(NewUser {
            email: seed.email.clone(),
            password_hash: password::hash(&seed.password)?,
            role: Role::Admin,
            first_name: None,
            last_name: None,
        })
        .await?;
    info!("Created administrator {} ({})", user.id, user.email);
    Ok(true)
}
