//! CLI-side config resolution: which file to read, and opening the
//! profile store it points at.
//!
//! The file format and storage backends live in `wayvpn-config`.

use std::path::PathBuf;
use std::sync::Arc;

use wayvpn_config::Config;
use wayvpn_core::{ProfileStore, SecureStore, SessionPersistence, SubscriptionSync};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Everything store-bound commands work against.
pub struct Catalog {
    pub store: ProfileStore,
    pub persistence: SessionPersistence,
}

/// `--config` / `WAYVPN_CONFIG`, else the platform default.
pub fn config_path(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(wayvpn_config::config_path)
}

pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(wayvpn_config::load_config_from(&config_path(global))?)
}

/// Load config, open the storage backend and the catalog on top of it.
/// Opening also migrates a legacy catalog if one is found.
pub async fn open_catalog(global: &GlobalOpts) -> Result<Catalog, CliError> {
    let config = load(global)?;
    let core = config.to_core_config()?;
    let storage: Arc<dyn SecureStore> = wayvpn_config::open_storage(&config);

    let sync = SubscriptionSync::from_settings(&core.subscription, Arc::clone(&storage))?;
    let store = ProfileStore::open(Arc::clone(&storage), sync).await?;
    let persistence = SessionPersistence::new(storage);

    Ok(Catalog {
        store,
        persistence,
    })
}
