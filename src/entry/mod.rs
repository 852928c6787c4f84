//! Configuration entries
//!
//! - `store`: persisted entries (JSON file)
//! - `manager`: setup/unload lifecycle and the registry of loaded entries

pub mod manager;
pub mod store;

pub use manager::{EntryManager, PollSettings};
pub use store::EntryStore;
