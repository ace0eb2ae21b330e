//! Simulated platform.
//!
//! Provides a virtual Bitaxe whose every collaborator runs in-process, so
//! the supervisor can boot on a development host without hardware.
//!
//! # Configuration
//!
//! Shaped by `BITAXE_SIM_*` environment variables; see
//! [`SimConfig::from_env`].

mod config;
mod hardware;
mod workers;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::task::TaskTracker;

pub use config::SimConfig;
pub use hardware::SIM_MAX_BAUD;
pub use workers::{SimJob, SimStats, SimWork, STATS_INTERVAL};

use crate::boot::Platform;
use crate::bringup::BringupHardware;
use crate::network::NetworkInterfaces;
use crate::peripheral::PeripheralServices;
use crate::pipeline::AsicHardware;
use hardware::*;

/// Assemble a simulated platform. Background activity of the simulated
/// drivers is spawned onto `tracker`.
pub fn platform(
    config: &SimConfig,
    tracker: &TaskTracker,
) -> (Platform<SimWork, SimJob>, Arc<SimStats>) {
    let (workers, stats) = workers::workers(config.work_interval);

    let platform = Platform {
        bringup: BringupHardware {
            memory: Box::new(SimMemory(config.psram)),
            bus: Box::new(SimInit("i2c")),
            analog: Box::new(SimInit("adc")),
            config_store: Box::new(SimStore::new(config)),
            device_config: Box::new(SimInit("device config")),
            self_test: Box::new(SimSelfTest {
                halts: config.self_test_halts,
            }),
            system_state: Box::new(SimInit("system state")),
            statistics: Box::new(SimInit("statistics")),
            network_stack: Box::new(SimInit("network stack")),
        },
        network: NetworkInterfaces {
            wired: Box::new(SimWired::new(config)),
            wireless: Box::new(SimWireless::new(config, tracker.clone())),
        },
        peripherals: PeripheralServices {
            system: Box::new(SimInit("system peripherals")),
            power_management: Box::new(SimPowerManagement {
                interval: Duration::from_secs(2),
            }),
            api_server: Box::new(SimApiServer {
                interval: Duration::from_secs(10),
            }),
            aux_server: None,
        },
        asic: AsicHardware {
            driver: Box::new(SimAsic::new(config)),
            serial: Box::new(SimSerial::default()),
        },
        workers,
    };
    (platform, stats)
}
