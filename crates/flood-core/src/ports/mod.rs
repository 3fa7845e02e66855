//! Ports - trait definitions for external dependencies.
//! Counter stores implement `CounterStore`; callers consume `FloodControl`.

mod counter_store;
mod flood_control;

pub use counter_store::CounterStore;
pub use flood_control::FloodControl;
