//! Daemon lifecycle management for bitaxe-supervisor.
//!
//! This module wires the platform collaborators together, runs the boot
//! sequence, and waits for a termination signal.

use tokio::signal::unix::{self, SignalKind};
use tokio_util::task::TaskTracker;

use crate::boot::BootSequence;
use crate::config::BootConfig;
use crate::sim::{self, SimConfig};
use crate::tracing::prelude::*;

/// The main daemon.
pub struct Daemon {
    tracker: TaskTracker,
}

impl Daemon {
    /// Create a new daemon instance.
    pub fn new() -> Self {
        Self {
            tracker: TaskTracker::new(),
        }
    }

    /// Run the daemon until a termination signal arrives.
    ///
    /// A halted boot does not stop the daemon: services that were already
    /// started keep serving the halted status.
    pub async fn run(self) -> anyhow::Result<()> {
        let config = BootConfig::from_env();
        debug!(config = ?config, "Boot configuration");

        let sim_config = SimConfig::from_env();
        info!(
            mode = %sim_config.network_mode,
            chips = sim_config.chips,
            "Using simulated platform"
        );
        let (platform, _stats) = sim::platform(&sim_config, &self.tracker);

        let sequence = BootSequence::new(config);
        let status = sequence.status();

        // The boot runs on its own task; the connectivity gate may wait
        // forever and signals must still be honoured.
        self.tracker.spawn({
            let tracker = self.tracker.clone();
            async move {
                let report = sequence.run(platform, &tracker).await;
                match &report.result {
                    Ok(pipeline) => info!(
                        chips = pipeline.chip_count,
                        baud = pipeline.baud,
                        workers = pipeline.workers.len(),
                        "Boot complete."
                    ),
                    Err(halt) => error!(
                        stage = %halt.stage,
                        class = %halt.class(),
                        error = %halt.error,
                        "Boot halted; mining disabled."
                    ),
                }
                debug!(status = ?status.snapshot(), "Status after boot");
            }
        });

        self.tracker.close();

        info!("Started.");
        info!("For debugging, set RUST_LOG=bitaxe_supervisor=debug or trace.");

        let mut sigint = unix::signal(SignalKind::interrupt())?;
        let mut sigterm = unix::signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT.");
            },
            _ = sigterm.recv() => {
                info!("Received SIGTERM.");
            },
        }

        // Workers run for the life of the process and are not drained.
        info!(tasks = self.tracker.len(), "Exiting.");

        Ok(())
    }
}

impl Default for Daemon {
    fn default() -> Self {
        Self::new()
    }
}
