//! Boot configuration.
//!
//! Timing and sizing knobs for the boot sequence are parsed from
//! environment variables so bench setups and tests can shrink them. The
//! network preference is not among them: it is persisted on the device and
//! read from the [`ConfigStore`] once bring-up has opened it.
//!
//! # Environment Variables
//!
//! - `BITAXE_BUS_SETTLE_MS`: delay after I2C init (default: 100)
//! - `BITAXE_LINK_POLL_MS`: wired link poll interval (default: 100)
//! - `BITAXE_LINK_POLL_ATTEMPTS`: wired link polls before Wi-Fi fallback (default: 100)
//! - `BITAXE_GATE_POLL_MS`: connectivity gate poll interval (default: 100, at least 1)
//! - `BITAXE_WORK_QUEUE_DEPTH`: upstream work queue capacity (default: 12)
//! - `BITAXE_JOB_QUEUE_DEPTH`: ASIC job queue capacity (default: 12)
//! - `BITAXE_BAP_ENABLE`: start the BAP server (default: off)

use std::str::FromStr;
use std::time::Duration;

use crate::hw_trait::ConfigStore;
use crate::tracing::prelude::*;

/// Config store key holding the network mode.
pub const NETWORK_MODE_KEY: &str = "networkmode";

/// Network mode used when the key is unset.
pub const DEFAULT_NETWORK_MODE: &str = "wifi";

/// Bounded poll loop parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// Upper bound on the time spent polling.
    pub fn budget(&self) -> Duration {
        self.interval * self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        // 100 polls at 100 ms: ten seconds for DHCP on the wired link.
        Self {
            interval: Duration::from_millis(100),
            max_attempts: 100,
        }
    }
}

/// Which transport to try first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkPreference {
    Wired,
    Wireless,
}

impl NetworkPreference {
    /// `"ethernet"` selects wired; any other value selects wireless.
    pub fn from_mode(mode: &str) -> Self {
        if mode == "ethernet" {
            NetworkPreference::Wired
        } else {
            NetworkPreference::Wireless
        }
    }

    pub fn from_store(store: &dyn ConfigStore) -> Self {
        let mode = store.get_string(NETWORK_MODE_KEY, DEFAULT_NETWORK_MODE);
        Self::from_mode(&mode)
    }
}

/// Timing and sizing for the boot sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootConfig {
    /// Wait after I2C init before touching anything on the bus.
    pub bus_settle: Duration,

    /// Wired link wait before falling back to Wi-Fi.
    pub link_poll: RetryPolicy,

    /// Connectivity gate re-check interval.
    pub gate_poll_interval: Duration,

    pub work_queue_capacity: usize,
    pub job_queue_capacity: usize,

    /// Start the BAP auxiliary protocol server.
    pub aux_protocol_enabled: bool,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            bus_settle: Duration::from_millis(100),
            link_poll: RetryPolicy::default(),
            gate_poll_interval: Duration::from_millis(100),
            work_queue_capacity: 12,
            job_queue_capacity: 12,
            aux_protocol_enabled: false,
        }
    }
}

impl BootConfig {
    /// Build a configuration from `BITAXE_*` environment variables, using
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let bus_settle = env_parse::<u64>("BITAXE_BUS_SETTLE_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.bus_settle);

        let interval = env_parse::<u64>("BITAXE_LINK_POLL_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.link_poll.interval);

        let max_attempts = env_parse::<u32>("BITAXE_LINK_POLL_ATTEMPTS")
            .unwrap_or(defaults.link_poll.max_attempts)
            .max(1);

        let gate_poll_interval = env_parse::<u64>("BITAXE_GATE_POLL_MS")
            .map(|ms| Duration::from_millis(ms.max(1)))
            .unwrap_or(defaults.gate_poll_interval);

        let work_queue_capacity = env_parse::<usize>("BITAXE_WORK_QUEUE_DEPTH")
            .unwrap_or(defaults.work_queue_capacity)
            .max(1);

        let job_queue_capacity = env_parse::<usize>("BITAXE_JOB_QUEUE_DEPTH")
            .unwrap_or(defaults.job_queue_capacity)
            .max(1);

        let aux_protocol_enabled = env_flag("BITAXE_BAP_ENABLE");

        Self {
            bus_settle,
            link_poll: RetryPolicy {
                interval,
                max_attempts,
            },
            gate_poll_interval,
            work_queue_capacity,
            job_queue_capacity,
            aux_protocol_enabled,
        }
    }
}

pub(crate) fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(var = name, value = %raw, "Ignoring unparseable value");
            None
        }
    }
}

pub(crate) fn env_flag(name: &str) -> bool {
    matches!(
        std::env::var(name).as_deref().map(str::trim),
        Ok("1") | Ok("true") | Ok("yes") | Ok("on")
    )
}
