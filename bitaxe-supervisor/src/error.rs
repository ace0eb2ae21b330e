//! Error types for the supervisor.

use std::fmt;

use crate::hw_trait::HwError;

/// How a boot failure affects the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bring-up failed before networking; nothing else is started.
    FatalBoot,
    /// ASIC bring-up failed after networking and the management API are up,
    /// so the device stays reachable for diagnosis.
    AsicFatal,
    /// A pipeline setting was rejected before the ASIC chain was touched.
    InvalidConfig,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorClass::FatalBoot => write!(f, "fatal boot"),
            ErrorClass::AsicFatal => write!(f, "ASIC fatal"),
            ErrorClass::InvalidConfig => write!(f, "invalid config"),
        }
    }
}

/// A failure that halts the boot sequence. None of these are retried.
#[derive(Debug, thiserror::Error)]
pub enum BootError {
    #[error("I2C bus init failed")]
    BusInitFailed(#[source] HwError),

    #[error("ADC init failed")]
    AnalogInitFailed(#[source] HwError),

    #[error("Failed to init NVS")]
    ConfigStoreUnavailable(#[source] HwError),

    #[error("Failed to init device config")]
    DeviceConfigInvalid(#[source] HwError),

    #[error("Self-test took control of the device")]
    SelfTestFailed,

    #[error("Network infrastructure init failed")]
    NetworkStackFailed(#[source] HwError),

    #[error("ASIC reset failed")]
    AsicResetFailed(#[source] HwError),

    #[error("Chip count 0")]
    ZeroChipsDetected,

    #[error("Queue capacity must be non-zero ({queue})")]
    InvalidQueueCapacity { queue: &'static str },
}

impl BootError {
    pub fn class(&self) -> ErrorClass {
        match self {
            BootError::BusInitFailed(_)
            | BootError::AnalogInitFailed(_)
            | BootError::ConfigStoreUnavailable(_)
            | BootError::DeviceConfigInvalid(_)
            | BootError::SelfTestFailed
            | BootError::NetworkStackFailed(_) => ErrorClass::FatalBoot,
            BootError::AsicResetFailed(_) | BootError::ZeroChipsDetected => ErrorClass::AsicFatal,
            BootError::InvalidQueueCapacity { .. } => ErrorClass::InvalidConfig,
        }
    }
}
