//! EntryManager: configuration entry lifecycle
//!
//! Owns the registry of loaded entries (entry_id → runtime). Setting up an
//! entry builds the vendor handle, the coordinator and the sensor; unloading
//! tears them down again. At most one runtime exists per entry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use super::store::EntryStore;
use crate::config::HikConnectConfig;
use crate::coordinator::AlarmCoordinator;
use crate::error::AppError;
use crate::hikconnect::ApiFactory;
use crate::models::{ConfigEntry, EntryDraft, EntryState, EntrySummary};
use crate::sensor::{AlarmBinarySensor, EntityStates};

#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub scan_interval: Duration,
    pub timeout: Duration,
}

impl PollSettings {
    pub fn from_config(config: &HikConnectConfig) -> Self {
        Self {
            scan_interval: config.scan_interval(),
            timeout: config.request_timeout(),
        }
    }
}

/// Everything that exists for a loaded entry
pub struct EntryRuntime {
    pub entry: ConfigEntry,
    pub coordinator: Arc<AlarmCoordinator>,
    pub sensor: Arc<AlarmBinarySensor>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl EntryRuntime {
    async fn stop(&self) {
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        for task in &tasks {
            task.abort();
        }
        for task in tasks {
            // Cancelled tasks resolve with a JoinError
            let _ = task.await;
        }
    }
}

pub struct EntryManager {
    runtimes: RwLock<HashMap<String, Arc<EntryRuntime>>>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    setup_errors: RwLock<HashMap<String, String>>,
    store: Arc<EntryStore>,
    factory: Arc<dyn ApiFactory>,
    states: Arc<EntityStates>,
    poll: PollSettings,
}

impl EntryManager {
    pub fn new(
        store: Arc<EntryStore>,
        factory: Arc<dyn ApiFactory>,
        states: Arc<EntityStates>,
        poll: PollSettings,
    ) -> Self {
        Self {
            runtimes: RwLock::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
            setup_errors: RwLock::new(HashMap::new()),
            store,
            factory,
            states,
            poll,
        }
    }

    /// Set up every stored entry (startup). Failures are recorded, not fatal.
    pub async fn setup_all(&self) -> usize {
        let entries = self.store.list().await;
        let mut loaded = 0usize;

        for entry in &entries {
            if self.setup_entry(entry).await.is_ok() {
                loaded += 1;
            }
        }

        tracing::info!("[Entry] Loaded {}/{} entries", loaded, entries.len());
        loaded
    }

    /// Lifecycle operations on one entry run one at a time
    async fn entry_lock(&self, entry_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .await
            .entry(entry_id.to_string())
            .or_default()
            .clone()
    }

    /// Build the handle, coordinator and sensor for an entry and register them
    pub async fn setup_entry(&self, entry: &ConfigEntry) -> Result<(), AppError> {
        let lock = self.entry_lock(&entry.entry_id).await;
        let _guard = lock.lock().await;
        self.setup_locked(entry).await
    }

    async fn setup_locked(&self, entry: &ConfigEntry) -> Result<(), AppError> {
        if self.get(&entry.entry_id).await.is_some() {
            self.unload_locked(&entry.entry_id).await;
        }

        // Removed while waiting for the lock
        if self.store.get(&entry.entry_id).await.is_none() {
            return Err(AppError::NotFound(format!("Entry {} not found", entry.entry_id)));
        }

        match self.build_runtime(entry).await {
            Ok(runtime) => {
                self.setup_errors.write().await.remove(&entry.entry_id);
                let replaced = self
                    .runtimes
                    .write()
                    .await
                    .insert(entry.entry_id.clone(), runtime);
                if let Some(old) = replaced {
                    tracing::warn!("[Entry] Replaced a running setup of {}", entry.entry_id);
                    old.stop().await;
                }
                tracing::info!("[Entry] Set up {} ({})", entry.title, entry.entry_id);
                Ok(())
            }
            Err(e) => {
                tracing::error!("[Entry] Setup of {} failed: {}", entry.title, e);
                self.setup_errors
                    .write()
                    .await
                    .insert(entry.entry_id.clone(), e.to_string());
                Err(e)
            }
        }
    }

    async fn build_runtime(&self, entry: &ConfigEntry) -> Result<Arc<EntryRuntime>, AppError> {
        let serial = entry
            .data
            .device_serial
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| entry.unique_id.clone());

        let api = self.factory.create(&entry.data)?;
        tracing::debug!("[Entry] Polling {} through the {} API", serial, api.kind());
        let coordinator = Arc::new(AlarmCoordinator::new(
            api,
            &serial,
            self.poll.scan_interval,
            self.poll.timeout,
        ));
        coordinator.first_refresh().await?;

        let sensor = Arc::new(AlarmBinarySensor::new(coordinator.clone(), entry));
        self.states.write(sensor.state().await).await;

        let poller = tokio::spawn(coordinator.clone().run());
        let listener = {
            let sensor = sensor.clone();
            let states = self.states.clone();
            let mut updates = coordinator.subscribe();
            tokio::spawn(async move {
                while updates.changed().await.is_ok() {
                    states.write(sensor.state().await).await;
                }
            })
        };

        Ok(Arc::new(EntryRuntime {
            entry: entry.clone(),
            coordinator,
            sensor,
            tasks: Mutex::new(vec![poller, listener]),
        }))
    }

    /// Tear down a loaded entry. True only if its sensor was removed.
    pub async fn unload_entry(&self, entry_id: &str) -> bool {
        let lock = self.entry_lock(entry_id).await;
        let _guard = lock.lock().await;
        self.unload_locked(entry_id).await
    }

    async fn unload_locked(&self, entry_id: &str) -> bool {
        let Some(runtime) = self.get(entry_id).await else {
            return false;
        };

        runtime.stop().await;
        let unloaded = self.states.remove(runtime.sensor.unique_id()).await;

        if unloaded {
            self.runtimes.write().await.remove(entry_id);
            tracing::info!("[Entry] Unloaded {} ({})", runtime.entry.title, entry_id);
        } else {
            tracing::warn!("[Entry] Sensor of {} was not registered, keeping runtime", entry_id);
        }
        unloaded
    }

    pub async fn reload_entry(&self, entry_id: &str) -> Result<(), AppError> {
        let lock = self.entry_lock(entry_id).await;
        let _guard = lock.lock().await;

        let entry = self
            .store
            .get(entry_id)
            .await
            .ok_or_else(|| AppError::NotFound(format!("Entry {} not found", entry_id)))?;

        self.unload_locked(entry_id).await;
        self.setup_locked(&entry).await
    }

    /// Store a finished flow's entry and set it up
    pub async fn create_entry(&self, draft: EntryDraft) -> Result<EntrySummary, AppError> {
        let entry = ConfigEntry::from_draft(draft);
        self.store.add(entry.clone()).await?;
        tracing::info!("[Entry] Created {} for device {}", entry.entry_id, entry.unique_id);

        // A failed setup keeps the entry, visible with its error
        let _ = self.setup_entry(&entry).await;
        Ok(self.summarize(&entry).await)
    }

    pub async fn remove_entry(&self, entry_id: &str) -> Result<ConfigEntry, AppError> {
        let lock = self.entry_lock(entry_id).await;
        let guard = lock.lock().await;

        self.unload_locked(entry_id).await;
        self.setup_errors.write().await.remove(entry_id);
        let removed = self.store.remove(entry_id).await?;

        drop(guard);
        self.locks.lock().await.remove(entry_id);
        tracing::info!("[Entry] Removed {} ({})", removed.title, entry_id);
        Ok(removed)
    }

    /// Refresh a loaded entry now, through its entity's update hook
    pub async fn refresh_entry(&self, entry_id: &str) -> Result<(), AppError> {
        let runtime = self
            .get(entry_id)
            .await
            .ok_or_else(|| AppError::NotFound(format!("Entry {} is not loaded", entry_id)))?;

        runtime.sensor.update().await?;
        Ok(())
    }

    pub async fn get(&self, entry_id: &str) -> Option<Arc<EntryRuntime>> {
        self.runtimes.read().await.get(entry_id).cloned()
    }

    pub async fn entry_state(&self, entry_id: &str) -> EntryState {
        if self.runtimes.read().await.contains_key(entry_id) {
            return EntryState::Loaded;
        }
        match self.setup_errors.read().await.get(entry_id) {
            Some(reason) => EntryState::SetupError(reason.clone()),
            None => EntryState::NotLoaded,
        }
    }

    pub async fn list_entries(&self) -> Vec<EntrySummary> {
        let mut summaries = Vec::new();
        for entry in self.store.list().await {
            summaries.push(self.summarize(&entry).await);
        }
        summaries
    }

    pub async fn get_entry(&self, entry_id: &str) -> Option<EntrySummary> {
        let entry = self.store.get(entry_id).await?;
        Some(self.summarize(&entry).await)
    }

    async fn summarize(&self, entry: &ConfigEntry) -> EntrySummary {
        let mut summary = EntrySummary::new(entry, self.entry_state(&entry.entry_id).await);
        if let Some(runtime) = self.get(&entry.entry_id).await {
            summary.last_error = runtime.coordinator.last_error().await;
        }
        summary
    }

    /// Unload everything (shutdown)
    pub async fn unload_all(&self) {
        let ids: Vec<String> = self.runtimes.read().await.keys().cloned().collect();
        futures::future::join_all(ids.iter().map(|id| self.unload_entry(id))).await;
    }
}
