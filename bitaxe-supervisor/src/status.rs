//! Process-wide system status.
//!
//! [`SystemStatus`] is the read side: any task may clone it and observe the
//! current values. The write side is split into one capability per field
//! group, handed out exactly once by [`SystemStatus::new`] and moved into the
//! stage that owns that concern:
//!
//! | Field(s)                          | Writer          | Owner stage    |
//! |-----------------------------------|-----------------|----------------|
//! | `psram_available`                 | [`PsramWriter`] | bring-up       |
//! | `is_connected` (+ link address)   | [`LinkReporter`]| network        |
//! | `asic_status`, `asic_initialized` | [`AsicWriter`]  | pipeline       |
//!
//! `PsramWriter` and `AsicWriter` consume themselves on write, so each of
//! those fields transitions at most once. `LinkReporter` is cloneable so
//! both network transports can report, but the link is set-once: the first
//! report wins and nothing can clear it.
//!
//! Every accepted write is appended to a journal, which lets tests and the
//! management API see which stage touched which field.

use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use crate::tracing::prelude::*;
use crate::transport::Transport;

/// The boot stages, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Bringup,
    Network,
    Peripherals,
    Gate,
    Pipeline,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Bringup => "bringup",
            Stage::Network => "network",
            Stage::Peripherals => "peripherals",
            Stage::Gate => "gate",
            Stage::Pipeline => "pipeline",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies a field of [`SystemStatus`] in the write journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusField {
    PsramAvailable,
    IsConnected,
    AsicStatus,
    AsicInitialized,
}

/// One accepted write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusWrite {
    pub field: StatusField,
    pub stage: Stage,
}

/// ASIC bring-up state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AsicStatus {
    #[default]
    Uninitialized,
    Ready,
    ResetFailed,
    ZeroChipsDetected,
}

impl fmt::Display for AsicStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsicStatus::Uninitialized => write!(f, "ASIC not initialized"),
            AsicStatus::Ready => write!(f, "ASIC ready"),
            AsicStatus::ResetFailed => write!(f, "ASIC reset failed"),
            AsicStatus::ZeroChipsDetected => write!(f, "Chip count 0"),
        }
    }
}

/// A transport that has acquired a network address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub transport: Transport,
    pub address: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct AsicState {
    status: AsicStatus,
    initialized: bool,
}

/// Point-in-time copy of every status field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub psram_available: bool,
    pub is_connected: bool,
    pub link: Option<Link>,
    pub asic_status: AsicStatus,
    pub asic_initialized: bool,
}

struct Inner {
    psram: watch::Sender<bool>,
    link: watch::Sender<Option<Link>>,
    asic: watch::Sender<AsicState>,
    journal: Mutex<Vec<StatusWrite>>,
}

/// Read handle over the process-wide status record.
#[derive(Clone)]
pub struct SystemStatus {
    inner: Arc<Inner>,
}

impl SystemStatus {
    /// Create the status record with every field cleared, along with the
    /// only writers that will ever exist for it.
    pub fn new() -> (Self, StatusWriters) {
        let (psram, _) = watch::channel(false);
        let (link, _) = watch::channel(None);
        let (asic, _) = watch::channel(AsicState::default());

        let status = SystemStatus {
            inner: Arc::new(Inner {
                psram,
                link,
                asic,
                journal: Mutex::new(Vec::new()),
            }),
        };

        let writers = StatusWriters {
            psram: PsramWriter {
                status: status.clone(),
            },
            connectivity: LinkReporter {
                status: status.clone(),
            },
            asic: AsicWriter {
                status: status.clone(),
            },
        };

        (status, writers)
    }

    pub fn psram_available(&self) -> bool {
        *self.inner.psram.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.link.borrow().is_some()
    }

    /// The link that owns `is_connected`, if any.
    pub fn link(&self) -> Option<Link> {
        self.inner.link.borrow().clone()
    }

    pub fn asic_status(&self) -> AsicStatus {
        self.inner.asic.borrow().status
    }

    pub fn asic_initialized(&self) -> bool {
        self.inner.asic.borrow().initialized
    }

    /// Watch for the link being established.
    pub fn subscribe_link(&self) -> watch::Receiver<Option<Link>> {
        self.inner.link.subscribe()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let link = self.link();
        let asic = *self.inner.asic.borrow();
        StatusSnapshot {
            psram_available: self.psram_available(),
            is_connected: link.is_some(),
            link,
            asic_status: asic.status,
            asic_initialized: asic.initialized,
        }
    }

    /// Every write accepted so far, oldest first.
    pub fn journal(&self) -> Vec<StatusWrite> {
        self.lock_journal().clone()
    }

    fn record(&self, field: StatusField, stage: Stage) {
        trace!(field = ?field, stage = %stage, "Status write");
        self.lock_journal().push(StatusWrite { field, stage });
    }

    fn lock_journal(&self) -> std::sync::MutexGuard<'_, Vec<StatusWrite>> {
        // A panic while holding the lock cannot leave the Vec half-written.
        self.inner
            .journal
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for SystemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SystemStatus").field(&self.snapshot()).finish()
    }
}

/// The writers returned by [`SystemStatus::new`].
pub struct StatusWriters {
    pub psram: PsramWriter,
    pub connectivity: LinkReporter,
    pub asic: AsicWriter,
}

/// Writes `psram_available`. Owned by the bring-up stage.
pub struct PsramWriter {
    status: SystemStatus,
}

impl PsramWriter {
    pub fn record(self, available: bool) {
        self.status.inner.psram.send_replace(available);
        self.status.record(StatusField::PsramAvailable, Stage::Bringup);
    }
}

/// Writes `is_connected`. Owned by the network stage and shared with the
/// transports it brings up.
#[derive(Clone)]
pub struct LinkReporter {
    status: SystemStatus,
}

impl LinkReporter {
    /// Report that `transport` has acquired `address`.
    ///
    /// Returns `true` if this report took ownership of `is_connected`; a
    /// report after the link is already established is ignored.
    pub fn report_link(&self, transport: Transport, address: impl Into<String>) -> bool {
        let address = address.into();
        let accepted = self.status.inner.link.send_if_modified(|link| {
            if link.is_some() {
                return false;
            }
            *link = Some(Link {
                transport,
                address: address.clone(),
            });
            true
        });

        if accepted {
            self.status.record(StatusField::IsConnected, Stage::Network);
            info!(transport = %transport, address = %address, "Network link established");
        } else {
            debug!(
                transport = %transport,
                address = %address,
                "Ignoring link report, connectivity already owned"
            );
        }

        accepted
    }

    pub fn is_connected(&self) -> bool {
        self.status.is_connected()
    }
}

/// Writes `asic_status` and `asic_initialized`. Owned by the pipeline
/// stage.
///
/// Each method consumes the writer, so ASIC state changes once per boot and
/// `asic_initialized` can only become true together with `Ready`.
pub struct AsicWriter {
    status: SystemStatus,
}

impl AsicWriter {
    pub fn reset_failed(self) {
        self.fail(AsicStatus::ResetFailed);
    }

    pub fn no_chips(self) {
        self.fail(AsicStatus::ZeroChipsDetected);
    }

    pub fn mark_ready(self) {
        self.status.inner.asic.send_replace(AsicState {
            status: AsicStatus::Ready,
            initialized: true,
        });
        self.status.record(StatusField::AsicStatus, Stage::Pipeline);
        self.status.record(StatusField::AsicInitialized, Stage::Pipeline);
    }

    fn fail(self, status: AsicStatus) {
        self.status.inner.asic.send_modify(|asic| asic.status = status);
        self.status.record(StatusField::AsicStatus, Stage::Pipeline);
    }
}
