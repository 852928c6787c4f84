//! Binary sensor platform
//!
//! - `binary_sensor`: the alarm entity backed by a coordinator
//! - `states`: table of the latest written entity states

pub mod binary_sensor;
pub mod states;

pub use binary_sensor::{AlarmBinarySensor, EntityState};
pub use states::EntityStates;
