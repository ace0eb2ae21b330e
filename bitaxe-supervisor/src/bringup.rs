//! Hardware bring-up.
//!
//! Runs the fixed, fail-fast chain of initializers that must succeed before
//! the controller touches the network:
//!
//! 1. PSRAM detection (recorded, never fatal)
//! 2. I2C bus, then a settle delay
//! 3. ADC
//! 4. NVS config store
//! 5. Device configuration
//! 6. Self-test
//! 7. System state and statistics (logged on failure, never fatal)
//! 8. Network infrastructure, once, ahead of any interface
//!
//! The first fatal failure returns immediately; nothing after it runs.

use std::time::Duration;

use crate::error::BootError;
use crate::hw_trait::{ConfigStore, Initializer, MemoryDetect, SelfTest};
use crate::status::{PsramWriter, SystemStatus};
use crate::tracing::prelude::*;

/// The collaborators bring-up drives, in the order it drives them.
pub struct BringupHardware {
    pub memory: Box<dyn MemoryDetect>,
    pub bus: Box<dyn Initializer>,
    pub analog: Box<dyn Initializer>,
    pub config_store: Box<dyn ConfigStore>,
    pub device_config: Box<dyn Initializer>,
    pub self_test: Box<dyn SelfTest>,
    /// Runtime state defaults (hashrate, share counters, display).
    pub system_state: Box<dyn Initializer>,
    pub statistics: Box<dyn Initializer>,
    /// Shared IP stack and event loop both transports attach to.
    pub network_stack: Box<dyn Initializer>,
}

pub struct HardwareBringupSequencer {
    hw: BringupHardware,
    bus_settle: Duration,
}

impl HardwareBringupSequencer {
    pub fn new(hw: BringupHardware, bus_settle: Duration) -> Self {
        Self { hw, bus_settle }
    }

    /// Run every step in order.
    ///
    /// On success the opened config store is handed back for the network
    /// stage to read its preference from.
    pub async fn run(
        self,
        status: &SystemStatus,
        psram: PsramWriter,
    ) -> Result<Box<dyn ConfigStore>, BootError> {
        let HardwareBringupSequencer { mut hw, bus_settle } = self;

        let psram_available = hw.memory.psram_available();
        if !psram_available {
            error!("No PSRAM available on ESP32 device!");
        }
        psram.record(psram_available);

        hw.bus.init().await.map_err(BootError::BusInitFailed)?;
        info!(bus = hw.bus.name(), "I2C initialized successfully");

        // Peripherals on the bus need time after init before first access.
        tokio::time::sleep(bus_settle).await;

        hw.analog.init().await.map_err(BootError::AnalogInitFailed)?;
        debug!(adc = hw.analog.name(), "ADC initialized");

        hw.config_store
            .open()
            .await
            .map_err(BootError::ConfigStoreUnavailable)?;
        debug!("Config store opened");

        hw.device_config
            .init()
            .await
            .map_err(BootError::DeviceConfigInvalid)?;
        debug!("Device config loaded");

        if hw.self_test.run(status).await {
            warn!("Self-test claimed the device, stopping boot");
            return Err(BootError::SelfTestFailed);
        }

        for step in [&mut hw.system_state, &mut hw.statistics] {
            if let Err(e) = step.init().await {
                error!(component = step.name(), error = %e, "Init failed, continuing");
            }
        }

        hw.network_stack
            .init()
            .await
            .map_err(BootError::NetworkStackFailed)?;
        debug!("Network infrastructure initialized");

        info!("Hardware bring-up complete");
        Ok(hw.config_store)
    }
}
