//! Wait for a network link before starting the mining pipeline.

use std::time::Duration;

use crate::status::SystemStatus;
use crate::tracing::prelude::*;

/// Polls between progress messages.
const REPORT_EVERY: u64 = 100;

/// Blocks the boot task until `is_connected` is set.
///
/// There is no timeout: if neither transport ever links, boot waits here
/// forever with the management API still running.
pub struct ConnectivityGate {
    poll_interval: Duration,
}

impl ConnectivityGate {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    /// Returns the number of polls that found no link.
    pub async fn wait(&self, status: &SystemStatus) -> u64 {
        let mut polls = 0u64;

        if !status.is_connected() {
            info!("Waiting for network connection...");
        }

        while !status.is_connected() {
            tokio::time::sleep(self.poll_interval).await;
            polls += 1;
            if polls % REPORT_EVERY == 0 {
                debug!(
                    waited_ms = (self.poll_interval * polls as u32).as_millis() as u64,
                    "Still waiting for network connection"
                );
            }
        }

        if let Some(link) = status.link() {
            info!(transport = %link.transport, address = %link.address, "Network connected");
        }
        polls
    }
}
