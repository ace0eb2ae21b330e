//! Configuration for the simulated platform.
//!
//! Parses environment variables to shape the simulated hardware.

use std::time::Duration;

use crate::config::{env_flag, env_parse, DEFAULT_NETWORK_MODE};

/// Simulated hardware configuration parsed from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimConfig {
    /// Value stored under the `networkmode` key.
    pub network_mode: String,

    /// Whether an Ethernet PHY answers.
    pub eth_present: bool,

    /// Status polls until the wired link comes up, or `None` for never.
    pub eth_link_after: Option<u32>,

    pub wifi_present: bool,

    /// Time the station takes to associate and get a lease.
    pub wifi_join_delay: Duration,

    /// Chips answering enumeration. Zero simulates an empty chain.
    pub chips: u32,

    pub reset_fails: bool,
    pub self_test_halts: bool,
    pub psram: bool,

    /// How often the simulated pool hands out new work.
    pub work_interval: Duration,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            network_mode: DEFAULT_NETWORK_MODE.to_string(),
            eth_present: true,
            eth_link_after: Some(3),
            wifi_present: true,
            wifi_join_delay: Duration::from_millis(1500),
            chips: 1,
            reset_fails: false,
            self_test_halts: false,
            psram: true,
            work_interval: Duration::from_secs(10),
        }
    }
}

impl SimConfig {
    /// Parse configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `BITAXE_SIM_NETWORK_MODE`: `ethernet` or `wifi` (default: wifi)
    /// - `BITAXE_SIM_NO_ETH`: no Ethernet PHY
    /// - `BITAXE_SIM_ETH_LINK_POLLS`: polls until wired link (default: 3,
    ///   `never` for no link)
    /// - `BITAXE_SIM_NO_WIFI`: no Wi-Fi driver
    /// - `BITAXE_SIM_WIFI_JOIN_MS`: Wi-Fi join delay (default: 1500)
    /// - `BITAXE_SIM_CHIPS`: chip count (default: 1)
    /// - `BITAXE_SIM_RESET_FAIL`: ASIC reset fails
    /// - `BITAXE_SIM_SELF_TEST`: self-test runs and halts the boot
    /// - `BITAXE_SIM_NO_PSRAM`: PSRAM missing
    /// - `BITAXE_SIM_WORK_INTERVAL_MS`: pool work interval (default: 10000)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let eth_link_after = match std::env::var("BITAXE_SIM_ETH_LINK_POLLS").as_deref() {
            Ok("never") => None,
            _ => env_parse("BITAXE_SIM_ETH_LINK_POLLS").or(defaults.eth_link_after),
        };

        Self {
            network_mode: std::env::var("BITAXE_SIM_NETWORK_MODE")
                .map(|mode| mode.trim().to_lowercase())
                .unwrap_or(defaults.network_mode),
            eth_present: !env_flag("BITAXE_SIM_NO_ETH"),
            eth_link_after,
            wifi_present: !env_flag("BITAXE_SIM_NO_WIFI"),
            wifi_join_delay: env_parse("BITAXE_SIM_WIFI_JOIN_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.wifi_join_delay),
            chips: env_parse("BITAXE_SIM_CHIPS").unwrap_or(defaults.chips),
            reset_fails: env_flag("BITAXE_SIM_RESET_FAIL"),
            self_test_halts: env_flag("BITAXE_SIM_SELF_TEST"),
            psram: !env_flag("BITAXE_SIM_NO_PSRAM"),
            work_interval: env_parse::<u64>("BITAXE_SIM_WORK_INTERVAL_MS")
                .map(|ms| Duration::from_millis(ms.max(1)))
                .unwrap_or(defaults.work_interval),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "BITAXE_SIM_NETWORK_MODE",
        "BITAXE_SIM_NO_ETH",
        "BITAXE_SIM_ETH_LINK_POLLS",
        "BITAXE_SIM_NO_WIFI",
        "BITAXE_SIM_WIFI_JOIN_MS",
        "BITAXE_SIM_CHIPS",
        "BITAXE_SIM_RESET_FAIL",
        "BITAXE_SIM_SELF_TEST",
        "BITAXE_SIM_NO_PSRAM",
        "BITAXE_SIM_WORK_INTERVAL_MS",
    ];

    fn clear() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear();
        assert_eq!(SimConfig::from_env(), SimConfig::default());
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear();
        std::env::set_var("BITAXE_SIM_NETWORK_MODE", "Ethernet");
        std::env::set_var("BITAXE_SIM_ETH_LINK_POLLS", "never");
        std::env::set_var("BITAXE_SIM_WIFI_JOIN_MS", "250");
        std::env::set_var("BITAXE_SIM_CHIPS", "0");
        std::env::set_var("BITAXE_SIM_RESET_FAIL", "1");
        std::env::set_var("BITAXE_SIM_NO_PSRAM", "yes");

        let config = SimConfig::from_env();
        assert_eq!(config.network_mode, "ethernet");
        assert_eq!(config.eth_link_after, None);
        assert_eq!(config.wifi_join_delay, Duration::from_millis(250));
        assert_eq!(config.chips, 0);
        assert!(config.reset_fails);
        assert!(!config.psram);
        assert!(config.eth_present);
        assert!(config.wifi_present);

        clear();
    }

    #[test]
    #[serial]
    fn test_unparseable_values_keep_defaults() {
        clear();
        std::env::set_var("BITAXE_SIM_ETH_LINK_POLLS", "soon");
        std::env::set_var("BITAXE_SIM_CHIPS", "many");

        let config = SimConfig::from_env();
        assert_eq!(config.eth_link_after, Some(3));
        assert_eq!(config.chips, 1);

        clear();
    }
}
