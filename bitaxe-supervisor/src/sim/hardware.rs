//! Simulated board collaborators.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::task::TaskTracker;

use crate::asic::{AsicDriver, SerialChannel, DEFAULT_BAUD};
use crate::config::NETWORK_MODE_KEY;
use crate::hw_trait::{ConfigStore, HwError, Initializer, MemoryDetect, Result, SelfTest};
use crate::peripheral::BackgroundService;
use crate::status::{LinkReporter, SystemStatus};
use crate::tracing::prelude::*;
use crate::transport::{LinkStatus, Transport, WiredInit, WiredTransport, WirelessTransport};

use super::SimConfig;

const WIRED_ADDRESS: &str = "192.168.1.50";
const WIRELESS_ADDRESS: &str = "192.168.4.20";

/// Fastest UART rate the simulated chain accepts.
pub const SIM_MAX_BAUD: u32 = 1_000_000;

/// A bring-up step that always succeeds.
pub struct SimInit(pub &'static str);

#[async_trait]
impl Initializer for SimInit {
    fn name(&self) -> &'static str {
        self.0
    }

    async fn init(&mut self) -> Result<()> {
        trace!(step = self.0, "Simulated init");
        Ok(())
    }
}

pub struct SimMemory(pub bool);

impl MemoryDetect for SimMemory {
    fn psram_available(&self) -> bool {
        self.0
    }
}

/// In-memory key/value store.
pub struct SimStore {
    values: HashMap<String, String>,
}

impl SimStore {
    pub fn new(config: &SimConfig) -> Self {
        let mut values = HashMap::new();
        values.insert(NETWORK_MODE_KEY.to_string(), config.network_mode.clone());
        Self { values }
    }
}

#[async_trait]
impl ConfigStore for SimStore {
    async fn open(&mut self) -> Result<()> {
        Ok(())
    }

    fn get_string(&self, key: &str, default: &str) -> String {
        self.values
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }
}

pub struct SimSelfTest {
    pub halts: bool,
}

#[async_trait]
impl SelfTest for SimSelfTest {
    async fn run(&mut self, _status: &SystemStatus) -> bool {
        if self.halts {
            info!("Self-test requested, not booting into mining");
        }
        self.halts
    }
}

pub struct SimWired {
    present: bool,
    link_after: Option<u32>,
    initialized: bool,
    polls: u32,
}

impl SimWired {
    pub fn new(config: &SimConfig) -> Self {
        Self {
            present: config.eth_present,
            link_after: config.eth_link_after,
            initialized: false,
            polls: 0,
        }
    }
}

#[async_trait]
impl WiredTransport for SimWired {
    async fn init(&mut self, mode: WiredInit) {
        debug!(mode = ?mode, present = self.present, "Simulated Ethernet init");
        self.initialized = true;
    }

    fn available(&self) -> bool {
        self.initialized && self.present
    }

    async fn update_status(&mut self) -> LinkStatus {
        self.polls += 1;
        match self.link_after {
            Some(after) if self.present && self.polls >= after => LinkStatus::up(WIRED_ADDRESS),
            _ => LinkStatus::down(),
        }
    }
}

/// Wi-Fi station that joins in the background after a delay.
pub struct SimWireless {
    present: bool,
    join_delay: Duration,
    tracker: TaskTracker,
}

impl SimWireless {
    pub fn new(config: &SimConfig, tracker: TaskTracker) -> Self {
        Self {
            present: config.wifi_present,
            join_delay: config.wifi_join_delay,
            tracker,
        }
    }
}

#[async_trait]
impl WirelessTransport for SimWireless {
    async fn init(&mut self, link: LinkReporter) -> Result<()> {
        if !self.present {
            return Err(HwError::NotPresent("wifi radio".into()));
        }

        let delay = self.join_delay;
        self.tracker.spawn(async move {
            tokio::time::sleep(delay).await;
            if !link.report_link(Transport::Wireless, WIRELESS_ADDRESS) {
                debug!("Wi-Fi joined after another link was reported");
            }
        });
        Ok(())
    }

    fn available(&self) -> bool {
        self.present
    }
}

/// Keeps fan and regulator readings ticking over.
pub struct SimPowerManagement {
    pub interval: Duration,
}

#[async_trait]
impl BackgroundService for SimPowerManagement {
    fn name(&self) -> &'static str {
        "power management"
    }

    async fn run(self: Box<Self>, _status: SystemStatus) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            trace!("Power management tick");
        }
    }
}

/// Stand-in for the HTTP management API: publishes the status snapshot.
pub struct SimApiServer {
    pub interval: Duration,
}

#[async_trait]
impl BackgroundService for SimApiServer {
    fn name(&self) -> &'static str {
        "http server"
    }

    async fn run(self: Box<Self>, status: SystemStatus) {
        let mut link = status.subscribe_link();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                changed = link.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let address = link.borrow_and_update().as_ref().map(|l| l.address.clone());
                    if let Some(address) = address {
                        info!(address = %address, "Management API reachable");
                    }
                }
                _ = ticker.tick() => {
                    debug!(status = ?status.snapshot(), "API status");
                }
            }
        }

        // The status record outlived its writers; keep serving snapshots.
        loop {
            ticker.tick().await;
            debug!(status = ?status.snapshot(), "API status");
        }
    }
}

pub struct SimAsic {
    chips: u32,
    reset_fails: bool,
}

impl SimAsic {
    pub fn new(config: &SimConfig) -> Self {
        Self {
            chips: config.chips,
            reset_fails: config.reset_fails,
        }
    }
}

#[async_trait]
impl AsicDriver for SimAsic {
    async fn reset(&mut self) -> Result<()> {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if self.reset_fails {
            Err(HwError::Timeout)
        } else {
            Ok(())
        }
    }

    async fn enumerate(&mut self, _status: &SystemStatus) -> u32 {
        self.chips
    }

    async fn set_max_baud(&mut self, _status: &SystemStatus) -> u32 {
        SIM_MAX_BAUD
    }
}

pub struct SimSerial {
    baud: u32,
}

impl Default for SimSerial {
    fn default() -> Self {
        Self { baud: DEFAULT_BAUD }
    }
}

#[async_trait]
impl SerialChannel for SimSerial {
    async fn init(&mut self) {
        debug!(baud = self.baud, "Simulated UART open");
    }

    async fn set_baud(&mut self, baud: u32) {
        self.baud = baud;
    }

    async fn clear_buffer(&mut self) {}
}
