use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::{config::AppConfig, repository::PgCatalogRepository, storage::LocalStorage};

#[derive(Clone)]
pub struct AppState {
    pub orm: DatabaseConnection,
    pub catalog: PgCatalogRepository,
    pub media: LocalStorage,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(orm: DatabaseConnection, config: AppConfig) -> Self {
        Self {
            catalog: PgCatalogRepository::new(orm.clone()),
            media: LocalStorage::new(config.media.root.clone(), config.media.public_url.clone()),
            orm,
            config: Arc::new(config),
        }
    }
}
