//! Network transports.
//!
//! The controller has two physical network interfaces: a wired Ethernet
//! PHY (not fitted on every board) and the ESP32 Wi-Fi radio. Driver
//! internals are out of scope here; the failover controller only needs
//! the small contracts below.

use std::fmt;

use async_trait::async_trait;

use crate::hw_trait::Result;
use crate::status::LinkReporter;

/// A physical network interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    Wired,
    Wireless,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Wired => write!(f, "ethernet"),
            Transport::Wireless => write!(f, "wifi"),
        }
    }
}

/// Per-transport diagnostic record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkState {
    /// Hardware is present and its driver came up.
    pub available: bool,
    /// The transport holds a network address.
    pub connected: bool,
    pub address: Option<String>,
}

/// Link state returned by a wired status refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkStatus {
    pub address: Option<String>,
}

impl LinkStatus {
    pub fn down() -> Self {
        Self::default()
    }

    pub fn up(address: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
        }
    }
}

/// How far to bring the wired interface up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WiredInit {
    /// Full activation: PHY, MAC and DHCP client.
    Activate,
    /// Detect the PHY only, so `available` is meaningful for diagnostics.
    DetectOnly,
}

/// Wired Ethernet driver.
#[async_trait]
pub trait WiredTransport: Send {
    /// Start the interface. A missing PHY is not an error; it is reported
    /// through [`available`](Self::available).
    async fn init(&mut self, mode: WiredInit);

    /// Whether the PHY was detected by the last `init`.
    fn available(&self) -> bool;

    /// Refresh and return the current link state.
    async fn update_status(&mut self) -> LinkStatus;
}

/// Wi-Fi driver.
///
/// After `init` the driver keeps trying to join the configured network on
/// its own and announces success through `link`.
#[async_trait]
pub trait WirelessTransport: Send {
    async fn init(&mut self, link: LinkReporter) -> Result<()>;

    fn available(&self) -> bool;
}
