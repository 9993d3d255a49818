use crate::config::Config;
use crate::engine::EngineHandle;
use crate::gallery::Gallery;
use crate::rooms::RoomHub;
use rollcall_store::{Store, StoreError};
use std::sync::Arc;

pub struct AppState {
    pub config: Config,
    pub store: Store,
    pub engine: EngineHandle,
    pub gallery: Gallery,
    pub rooms: RoomHub,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Assemble the shared state and load the identification gallery.
    pub async fn new(config: Config, store: Store, engine: EngineHandle) -> Result<SharedState, StoreError> {
        let gallery = Gallery::new(store.load_templates().await?);

        Ok(Arc::new(Self {
            config,
            store,
            engine,
            gallery,
            rooms: RoomHub::new(),
        }))
    }

    /// Reload the gallery from the database, picking up templates changed
    /// outside this process (CLI enroll or remove).
    pub async fn reload_gallery(&self) -> Result<usize, StoreError> {
        let templates = self.store.load_templates().await?;
        let count = templates.len();
        self.gallery.replace(templates).await;
        Ok(count)
    }
}
