//! ResNet-18 binary classifier.
//!
//! - `params`: binds state-dict tensors to architecture slots
//! - `resnet`: the network definition
//! - `runtime`: device placement and the forward pass

pub mod params;
pub mod resnet;
mod runtime;

pub use params::LoadReport;
pub use resnet::ResNet18;
pub use runtime::{ForwardPass, ModelRuntime};
