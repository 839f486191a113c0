//! Model runtime lifecycle.
//!
//! The runtime is built lazily by the first request and shared by all
//! later ones. A failed build is memoized and retried by the next request
//! that finds no build in flight.
//!
//! - `state`: `InitializationState`, the shared `ModelRuntimeHandle`
//! - `loader`: `RuntimeLoader` and the ResNet-18 implementation
//! - `manager`: `LifecycleManager`, the single-flight state machine

mod loader;
mod manager;
mod state;


pub use loader::{ResNetLoader, RuntimeLoader};
pub use manager::LifecycleManager;
pub use state::{InitializationState, LifecycleSnapshot, ModelRuntimeHandle};
