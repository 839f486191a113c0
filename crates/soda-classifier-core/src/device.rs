//! Compute device selection.
//!
//! Accelerators are only reachable when the crate is built with the `cuda`
//! or `metal` feature; otherwise `auto` resolves to the CPU.

use candle_core::Device;

use crate::config::DevicePolicy;
use crate::error::{ClassifierError, ClassifierResult};

/// Create the device for `policy`.
///
/// `Auto` tries CUDA ordinal 0, then Metal ordinal 0, then the CPU.
pub fn select_device(policy: DevicePolicy) -> ClassifierResult<Device> {
    let device = match policy {
        DevicePolicy::Cpu => Device::Cpu,
        DevicePolicy::Auto => {
            let cuda = Device::cuda_if_available(0).map_err(device_error)?;
            if cuda.is_cpu() {
                Device::metal_if_available(0).map_err(device_error)?
            } else {
                cuda
            }
        }
    };

    tracing::info!(policy = %policy, device = device_label(&device), "Selected compute device");
    Ok(device)
}

/// Short name of a device: `cpu`, `cuda` or `metal`.
#[must_use]
pub fn device_label(device: &Device) -> &'static str {
    if device.is_cuda() {
        "cuda"
    } else if device.is_metal() {
        "metal"
    } else {
        "cpu"
    }
}

fn device_error(err: candle_core::Error) -> ClassifierError {
    ClassifierError::DeviceInit {
        reason: err.to_string(),
    }
}
