//! Network interface failover.
//!
//! The controller brings up the preferred transport and, for a wired
//! preference, waits a bounded time for a DHCP lease before falling back to
//! Wi-Fi:
//!
//! ```text
//!            Wired pref                                  Wireless pref
//! Idle ──> BringingUpPrimary ──(PHY absent)──┐      Idle ──> BringingUpSecondary
//!               │                            │                 (+ wired detect)
//!               v                            │
//!       AwaitingPrimaryLink ──(address)──> Linked
//!               │
//!         (attempts exhausted)
//!               v
//!     FallingBackToSecondary ──> BringingUpSecondary <┘
//!                                      │
//!                         (wifi driver unavailable)
//!                                      v
//!                                 Unavailable
//! ```
//!
//! Once the secondary transport is up the controller returns without
//! waiting: the Wi-Fi driver keeps trying in the background and reports its
//! address through its [`LinkReporter`]. The connectivity gate then waits
//! for `is_connected`, whichever transport sets it.

use std::fmt;

use crate::config::{NetworkPreference, RetryPolicy};
use crate::status::{LinkReporter, SystemStatus};
use crate::tracing::prelude::*;
use crate::transport::{NetworkState, Transport, WiredInit, WiredTransport, WirelessTransport};

/// Failover controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailoverState {
    Idle,
    BringingUpPrimary,
    AwaitingPrimaryLink,
    FallingBackToSecondary,
    BringingUpSecondary,
    AwaitingSecondaryLink,
    Linked,
    Unavailable,
}

impl fmt::Display for FailoverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailoverState::Idle => "idle",
            FailoverState::BringingUpPrimary => "bringing up primary",
            FailoverState::AwaitingPrimaryLink => "awaiting primary link",
            FailoverState::FallingBackToSecondary => "falling back to secondary",
            FailoverState::BringingUpSecondary => "bringing up secondary",
            FailoverState::AwaitingSecondaryLink => "awaiting secondary link",
            FailoverState::Linked => "linked",
            FailoverState::Unavailable => "unavailable",
        };
        f.write_str(name)
    }
}

/// The two network drivers.
pub struct NetworkInterfaces {
    pub wired: Box<dyn WiredTransport>,
    pub wireless: Box<dyn WirelessTransport>,
}

pub struct NetworkFailoverController {
    interfaces: NetworkInterfaces,
    policy: RetryPolicy,
    state: FailoverState,
    history: Vec<FailoverState>,
    wired: NetworkState,
    wireless_available: bool,
    link_polls: u32,
}

impl NetworkFailoverController {
    pub fn new(interfaces: NetworkInterfaces, policy: RetryPolicy) -> Self {
        Self {
            interfaces,
            policy,
            state: FailoverState::Idle,
            history: vec![FailoverState::Idle],
            wired: NetworkState::default(),
            wireless_available: false,
            link_polls: 0,
        }
    }

    /// State the controller stopped in.
    pub fn state(&self) -> FailoverState {
        self.state
    }

    /// Every state entered, starting with `Idle`.
    pub fn history(&self) -> &[FailoverState] {
        &self.history
    }

    /// Number of wired link polls performed.
    pub fn link_polls(&self) -> u32 {
        self.link_polls
    }

    /// State as seen now, accounting for Wi-Fi connecting in the
    /// background after the controller returned.
    pub fn current_state(&self, status: &SystemStatus) -> FailoverState {
        match self.state {
            FailoverState::BringingUpSecondary | FailoverState::Unavailable
                if status.is_connected() =>
            {
                FailoverState::Linked
            }
            FailoverState::BringingUpSecondary if self.wireless_available => {
                FailoverState::AwaitingSecondaryLink
            }
            state => state,
        }
    }

    /// Diagnostic record for one transport.
    pub fn network_state(&self, transport: Transport, status: &SystemStatus) -> NetworkState {
        let link = status.link().filter(|link| link.transport == transport);
        match transport {
            Transport::Wired => {
                let mut state = self.wired.clone();
                if let Some(link) = link {
                    state.connected = true;
                    state.address = Some(link.address);
                }
                state
            }
            Transport::Wireless => NetworkState {
                available: self.wireless_available,
                connected: link.is_some(),
                address: link.map(|link| link.address),
            },
        }
    }

    /// Bring up networking according to `preference`.
    ///
    /// Never fails: an unusable network leaves the controller in
    /// `Unavailable` or awaiting Wi-Fi, and the connectivity gate blocks.
    pub async fn run(&mut self, preference: NetworkPreference, link: LinkReporter) -> FailoverState {
        match preference {
            NetworkPreference::Wired => {
                info!("Network mode: Ethernet - Initializing...");
                self.run_wired_first(&link).await;
            }
            NetworkPreference::Wireless => {
                info!("Network mode: WiFi");
                self.bring_up_secondary(&link).await;

                self.interfaces.wired.init(WiredInit::DetectOnly).await;
                self.wired.available = self.interfaces.wired.available();
                debug!(eth_available = self.wired.available, "Ethernet detection done");
            }
        }

        self.state
    }

    async fn run_wired_first(&mut self, link: &LinkReporter) {
        self.transition(FailoverState::BringingUpPrimary);
        self.interfaces.wired.init(WiredInit::Activate).await;
        self.wired.available = self.interfaces.wired.available();
        debug!(eth_available = self.wired.available, "Ethernet init done");

        if !self.wired.available {
            warn!("Ethernet unavailable, initializing WiFi fallback");
            self.bring_up_secondary(link).await;
            return;
        }

        self.transition(FailoverState::AwaitingPrimaryLink);
        info!(
            attempts = self.policy.max_attempts,
            interval_ms = self.policy.interval.as_millis() as u64,
            budget_ms = self.policy.budget().as_millis() as u64,
            "Waiting for Ethernet IP address..."
        );

        for attempt in 1..=self.policy.max_attempts {
            self.link_polls = attempt;
            let status = self.interfaces.wired.update_status().await;

            if let Some(address) = status.address {
                info!(address = %address, attempt, "Ethernet connected");
                self.wired.connected = true;
                self.wired.address = Some(address.clone());
                link.report_link(Transport::Wired, address);
                self.transition(FailoverState::Linked);
                return;
            }

            trace!(attempt, "No Ethernet address yet");
            tokio::time::sleep(self.policy.interval).await;
        }

        warn!(
            attempts = self.link_polls,
            "Ethernet timeout, falling back to WiFi"
        );
        self.transition(FailoverState::FallingBackToSecondary);
        self.bring_up_secondary(link).await;
    }

    async fn bring_up_secondary(&mut self, link: &LinkReporter) {
        self.transition(FailoverState::BringingUpSecondary);

        if let Err(e) = self.interfaces.wireless.init(link.clone()).await {
            error!(error = %e, "WiFi init failed");
        }
        self.wireless_available = self.interfaces.wireless.available();

        if !self.wireless_available && !link.is_connected() {
            warn!("No usable network transport; boot will wait for a link indefinitely");
            self.transition(FailoverState::Unavailable);
        }
    }

    fn transition(&mut self, next: FailoverState) {
        debug!(from = %self.state, to = %next, "Failover transition");
        self.state = next;
        self.history.push(next);
    }
}
