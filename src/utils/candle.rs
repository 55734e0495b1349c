// src/utils/candle.rs
use candle_core::Device;
use once_cell::sync::Lazy;

/// Device shared by every network in the process.
pub static CANDLE_DEVICE: Lazy<Device> = Lazy::new(|| match Device::cuda_if_available(0) {
    Ok(device) => {
        if device.is_cuda() {
            log::info!("Successfully initialized Candle CUDA device (GPU).");
        } else {
            log::info!("Using Candle CPU device.");
        }
        device
    }
    Err(err) => {
        log::warn!(
            "Failed to initialize Candle CUDA device: {:?}. Falling back to CPU device.",
            err
        );
        Device::Cpu
    }
});

pub fn device() -> &'static Device {
    &CANDLE_DEVICE
}
