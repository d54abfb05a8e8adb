use crate::{
    config::{Config, UPLOAD_URL_PREFIX},
    storage::AssetStore,
};
use axum::extract::FromRef;
use sqlx::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub assets: AssetStore,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        let assets = AssetStore::new(config.upload_dir.clone(), UPLOAD_URL_PREFIX);
        Self {
            pool,
            config,
            assets,
        }
    }
}

impl FromRef<AppState> for PgPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for AssetStore {
    fn from_ref(state: &AppState) -> Self {
        state.assets.clone()
    }
}
