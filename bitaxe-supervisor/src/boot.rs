//! The boot sequence.
//!
//! Runs the five stages strictly in order on the calling task:
//!
//! 1. hardware bring-up ([`crate::bringup`])
//! 2. network failover ([`crate::network`])
//! 3. peripheral services ([`crate::peripheral`])
//! 4. connectivity gate ([`crate::gate`])
//! 5. mining pipeline ([`crate::pipeline`])
//!
//! A fatal error stops the sequence where it happened and is returned in
//! the [`BootReport`]; long-running services already started keep running
//! so the management API stays reachable after an ASIC failure.

use tokio_util::task::TaskTracker;
use tracing::Instrument;

use crate::bringup::{BringupHardware, HardwareBringupSequencer};
use crate::config::{BootConfig, NetworkPreference};
use crate::error::{BootError, ErrorClass};
use crate::gate::ConnectivityGate;
use crate::network::{NetworkFailoverController, NetworkInterfaces};
use crate::peripheral::{PeripheralActivationStage, PeripheralReport, PeripheralServices};
use crate::pipeline::{
    AsicHardware, MiningPipelineSupervisor, Pipeline, PipelineConfig, PipelineWorkers,
};
use crate::status::{Stage, StatusWriters, SystemStatus};
use crate::tracing::prelude::*;

/// Every collaborator the boot sequence drives.
pub struct Platform<W, J>
where
    W: Send + 'static,
    J: Send + 'static,
{
    pub bringup: BringupHardware,
    pub network: NetworkInterfaces,
    pub peripherals: PeripheralServices,
    pub asic: AsicHardware,
    pub workers: PipelineWorkers<W, J>,
}

/// Where and why the boot stopped.
#[derive(Debug)]
pub struct BootHalt {
    pub stage: Stage,
    pub error: BootError,
}

impl BootHalt {
    pub fn class(&self) -> ErrorClass {
        self.error.class()
    }
}

pub struct BootReport<W, J> {
    /// Present once the network stage has run.
    pub network: Option<NetworkFailoverController>,
    pub peripherals: Option<PeripheralReport>,
    pub result: Result<Pipeline<W, J>, BootHalt>,
}

impl<W, J> BootReport<W, J> {
    pub fn is_running(&self) -> bool {
        self.result.is_ok()
    }

    pub fn halt(&self) -> Option<&BootHalt> {
        self.result.as_ref().err()
    }
}

pub struct BootSequence {
    config: BootConfig,
    status: SystemStatus,
    writers: StatusWriters,
}

impl BootSequence {
    pub fn new(config: BootConfig) -> Self {
        let (status, writers) = SystemStatus::new();
        Self {
            config,
            status,
            writers,
        }
    }

    /// Read handle on the status this sequence writes.
    pub fn status(&self) -> SystemStatus {
        self.status.clone()
    }

    /// Run all stages. Services and workers are spawned onto `tracker`.
    pub async fn run<W, J>(self, platform: Platform<W, J>, tracker: &TaskTracker) -> BootReport<W, J>
    where
        W: Send + 'static,
        J: Send + 'static,
    {
        let BootSequence {
            config,
            status,
            writers,
        } = self;
        let StatusWriters {
            psram,
            connectivity,
            asic,
        } = writers;

        info!("Welcome to the bitaxe - FOSS || GTFO!");

        let halted = |stage: Stage, error: BootError| {
            error!(stage = %stage, class = %error.class(), error = %error, "Boot halted");
            BootHalt { stage, error }
        };

        // Stage 1
        let bringup = HardwareBringupSequencer::new(platform.bringup, config.bus_settle);
        let store = match bringup
            .run(&status, psram)
            .instrument(stage_span(Stage::Bringup))
            .await
        {
            Ok(store) => store,
            Err(error) => {
                return BootReport {
                    network: None,
                    peripherals: None,
                    result: Err(halted(Stage::Bringup, error)),
                }
            }
        };

        // Stage 2
        let preference = NetworkPreference::from_store(store.as_ref());
        let mut network = NetworkFailoverController::new(platform.network, config.link_poll);
        let state = network
            .run(preference, connectivity)
            .instrument(stage_span(Stage::Network))
            .await;
        debug!(state = %state, "Network stage done");

        // Stage 3
        let peripherals = PeripheralActivationStage::new(
            platform.peripherals,
            config.aux_protocol_enabled,
        )
        .run(&status, tracker)
        .instrument(stage_span(Stage::Peripherals))
        .await;

        // Stage 4
        ConnectivityGate::new(config.gate_poll_interval)
            .wait(&status)
            .instrument(stage_span(Stage::Gate))
            .await;

        // Stage 5
        let supervisor = MiningPipelineSupervisor::new(
            platform.asic,
            PipelineConfig {
                work_queue_capacity: config.work_queue_capacity,
                job_queue_capacity: config.job_queue_capacity,
            },
        );
        let result = supervisor
            .start(&status, asic, platform.workers, tracker)
            .instrument(stage_span(Stage::Pipeline))
            .await
            .map_err(|error| halted(Stage::Pipeline, error));

        BootReport {
            network: Some(network),
            peripherals: Some(peripherals),
            result,
        }
    }
}

fn stage_span(stage: Stage) -> tracing::Span {
    tracing::info_span!("stage", stage = %stage)
}
