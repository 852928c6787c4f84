//! Shared application state handed to the HTTP handlers

use std::sync::Arc;

use crate::config::Config;
use crate::entry::{EntryManager, EntryStore, PollSettings};
use crate::flow::FlowManager;
use crate::hikconnect::{ApiFactory, HikConnectFactory};
use crate::sensor::EntityStates;

#[derive(Clone)]
pub struct AppState {
    pub entries: Arc<EntryManager>,
    pub flows: Arc<FlowManager>,
    pub states: Arc<EntityStates>,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        let store = Arc::new(EntryStore::open(&config.storage.entries_path).await?);
        let factory: Arc<dyn ApiFactory> = Arc::new(HikConnectFactory::new(config.hikconnect.clone()));

        Ok(Self::with_parts(
            store,
            factory,
            PollSettings::from_config(&config.hikconnect),
        ))
    }

    pub fn with_parts(
        store: Arc<EntryStore>,
        factory: Arc<dyn ApiFactory>,
        poll: PollSettings,
    ) -> Self {
        let states = Arc::new(EntityStates::new());
        let entries = Arc::new(EntryManager::new(
            store.clone(),
            factory.clone(),
            states.clone(),
            poll,
        ));
        let flows = Arc::new(FlowManager::new(factory, store));

        Self {
            entries,
            flows,
            states,
            start_time: std::time::Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
