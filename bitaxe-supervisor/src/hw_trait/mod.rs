//! Hardware abstraction seams consumed by the boot sequence.
//!
//! The supervisor never talks to registers or buses directly. Each
//! collaborator it needs during bring-up (I2C bus, ADC, NVS-backed config
//! store, device configuration, self-test) is reached through one of the
//! traits below, so the same boot logic drives real peripherals, the
//! simulated platform, and test fakes.

use async_trait::async_trait;

use crate::status::SystemStatus;

/// Common error type for hardware operations
#[derive(Debug, thiserror::Error)]
pub enum HwError {
    /// I/O error from underlying transport
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Device did not respond or is not fitted
    #[error("Device not present: {0}")]
    NotPresent(String),

    /// Stored or reported data failed validation
    #[error("Invalid data: {0}")]
    Invalid(String),

    /// Timeout waiting for hardware response
    #[error("Hardware timeout")]
    Timeout,

    /// Other hardware-specific error
    #[error("Hardware error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, HwError>;

/// A hardware block or service with a single fallible init call.
#[async_trait]
pub trait Initializer: Send {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Bring the block up. Called exactly once per boot.
    async fn init(&mut self) -> Result<()>;
}

/// Detects external PSRAM.
pub trait MemoryDetect: Send {
    fn psram_available(&self) -> bool;
}

/// Persisted key/value configuration (NVS on the device).
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Open the backing store. Nothing else may be called before this
    /// succeeds.
    async fn open(&mut self) -> Result<()>;

    /// Read a string value, returning `default` when the key is unset.
    fn get_string(&self, key: &str, default: &str) -> String;
}

/// Factory/bench self-test.
#[async_trait]
pub trait SelfTest: Send {
    /// Run the self-test if it is armed.
    ///
    /// Returns `true` when the self-test has taken over the device and the
    /// normal boot sequence must stop.
    async fn run(&mut self, status: &SystemStatus) -> bool;
}
