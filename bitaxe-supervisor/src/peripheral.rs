//! Always-on services started once the network stage has returned.
//!
//! Power management and the management API run for the life of the process
//! and are started unconditionally. The BAP auxiliary server is optional and
//! its failure never stops the boot.

use async_trait::async_trait;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

use crate::hw_trait::{Initializer, Result};
use crate::status::SystemStatus;
use crate::tracing::prelude::*;

/// A long-running service loop.
#[async_trait]
pub trait BackgroundService: Send {
    fn name(&self) -> &'static str;

    /// Run until the process exits.
    async fn run(self: Box<Self>, status: SystemStatus);
}

/// Auxiliary protocol (BAP) server.
#[async_trait]
pub trait AuxServer: Send {
    async fn start(&mut self, status: &SystemStatus) -> Result<()>;
}

pub struct PeripheralServices {
    /// Fan, regulator and display setup ahead of power management.
    pub system: Box<dyn Initializer>,
    pub power_management: Box<dyn BackgroundService>,
    pub api_server: Box<dyn BackgroundService>,
    /// `None` when the firmware was built without BAP support.
    pub aux_server: Option<Box<dyn AuxServer>>,
}

/// What happened to the optional auxiliary server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuxOutcome {
    Disabled,
    Started,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeripheralReport {
    pub system_peripherals_ok: bool,
    /// Services spawned, in start order.
    pub started: Vec<&'static str>,
    pub aux: AuxOutcome,
}

pub struct PeripheralActivationStage {
    services: PeripheralServices,
    aux_enabled: bool,
}

impl PeripheralActivationStage {
    pub fn new(services: PeripheralServices, aux_enabled: bool) -> Self {
        Self {
            services,
            aux_enabled,
        }
    }

    pub async fn run(self, status: &SystemStatus, tracker: &TaskTracker) -> PeripheralReport {
        let PeripheralServices {
            mut system,
            power_management,
            api_server,
            aux_server,
        } = self.services;

        let system_peripherals_ok = match system.init().await {
            Ok(()) => true,
            Err(e) => {
                error!(component = system.name(), error = %e, "System peripheral init failed");
                false
            }
        };

        let mut started = Vec::new();
        for service in [power_management, api_server] {
            let name = service.name();
            tracker.spawn(
                service
                    .run(status.clone())
                    .instrument(tracing::info_span!("service", name)),
            );
            debug!(service = name, "Service started");
            started.push(name);
        }

        let aux = match (self.aux_enabled, aux_server) {
            (true, Some(mut server)) => match server.start(status).await {
                Ok(()) => {
                    info!("BAP interface initialized successfully");
                    AuxOutcome::Started
                }
                Err(e) => {
                    // Not needed for mining; keep booting.
                    error!(error = %e, "Failed to initialize BAP interface");
                    AuxOutcome::Failed(e.to_string())
                }
            },
            (true, None) => {
                warn!("BAP enabled but not available in this build");
                AuxOutcome::Disabled
            }
            (false, _) => AuxOutcome::Disabled,
        };

        PeripheralReport {
            system_peripherals_ok,
            started,
            aux,
        }
    }
}
