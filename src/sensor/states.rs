//! Entity state table

use std::collections::HashMap;

use tokio::sync::RwLock;

use super::binary_sensor::EntityState;

#[derive(Default)]
struct Table {
    states: HashMap<String, EntityState>,
    /// unique_id -> entity_id, assigned on first write
    entity_ids: HashMap<String, String>,
}

impl Table {
    /// Keep the entity id an entity got first; suffix `_2`, `_3`, ... on clashes
    fn assign_entity_id(&mut self, unique_id: &str, wanted: &str) -> String {
        if let Some(id) = self.entity_ids.get(unique_id) {
            return id.clone();
        }

        let mut candidate = wanted.to_string();
        let mut n = 2;
        while self.entity_ids.values().any(|id| *id == candidate) {
            candidate = format!("{}_{}", wanted, n);
            n += 1;
        }
        self.entity_ids
            .insert(unique_id.to_string(), candidate.clone());
        candidate
    }
}

/// Latest written state per entity unique id
#[derive(Default)]
pub struct EntityStates {
    table: RwLock<Table>,
}

impl EntityStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn write(&self, mut state: EntityState) {
        let mut table = self.table.write().await;
        state.entity_id = table.assign_entity_id(&state.unique_id, &state.entity_id);
        let previous = table.states.get(&state.unique_id).map(|s| s.state.clone());

        match previous.as_deref() {
            Some(prev) if prev == state.state => {}
            Some(prev) => tracing::info!(
                "[Entity] {} changed {} -> {}",
                state.entity_id,
                prev,
                state.state
            ),
            None => tracing::info!("[Entity] {} added ({})", state.entity_id, state.state),
        }

        table.states.insert(state.unique_id.clone(), state);
    }

    /// Returns false when the entity was not registered
    pub async fn remove(&self, unique_id: &str) -> bool {
        let mut table = self.table.write().await;
        table.entity_ids.remove(unique_id);
        let removed = table.states.remove(unique_id).is_some();
        if removed {
            tracing::info!("[Entity] {} removed", unique_id);
        }
        removed
    }

    pub async fn get(&self, unique_id: &str) -> Option<EntityState> {
        self.table.read().await.states.get(unique_id).cloned()
    }

    pub async fn list(&self) -> Vec<EntityState> {
        let mut list: Vec<EntityState> = self.table.read().await.states.values().cloned().collect();
        list.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        list
    }
}
