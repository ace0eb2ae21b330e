//! Fakes shared by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::asic::{AsicDriver, SerialChannel};
use crate::hw_trait::{ConfigStore, HwError, Initializer, MemoryDetect, Result, SelfTest};
use crate::peripheral::{AuxServer, BackgroundService};
use crate::pipeline::{AsicHardware, PipelineWorker, WorkerContext};
use crate::status::{LinkReporter, SystemStatus};
use crate::transport::{LinkStatus, Transport, WiredInit, WiredTransport, WirelessTransport};

/// Ordered record of collaborator calls, shared between fakes.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<(&'static str, Instant)>>>);

impl CallLog {
    pub fn push(&self, name: &'static str) {
        self.0.lock().unwrap().push((name, Instant::now()));
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.0.lock().unwrap().iter().map(|(name, _)| *name).collect()
    }

    pub fn stamps(&self) -> Vec<(&'static str, Instant)> {
        self.0.lock().unwrap().clone()
    }
}

pub struct FakeInit {
    name: &'static str,
    log: CallLog,
    fail: bool,
}

impl FakeInit {
    pub fn new(name: &'static str, log: &CallLog, fail: bool) -> Self {
        Self {
            name,
            log: log.clone(),
            fail,
        }
    }
}

#[async_trait]
impl Initializer for FakeInit {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn init(&mut self) -> Result<()> {
        self.log.push(self.name);
        if self.fail {
            Err(HwError::NotPresent(self.name.into()))
        } else {
            Ok(())
        }
    }
}

pub struct FakeMemory(pub bool);

impl MemoryDetect for FakeMemory {
    fn psram_available(&self) -> bool {
        self.0
    }
}

pub struct FakeStore {
    log: CallLog,
    fail: bool,
    values: HashMap<String, String>,
}

impl FakeStore {
    pub fn new(log: &CallLog, fail: bool) -> Self {
        Self {
            log: log.clone(),
            fail,
            values: HashMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

#[async_trait]
impl ConfigStore for FakeStore {
    async fn open(&mut self) -> Result<()> {
        self.log.push("nvs");
        if self.fail {
            Err(HwError::Invalid("nvs partition".into()))
        } else {
            Ok(())
        }
    }

    fn get_string(&self, key: &str, default: &str) -> String {
        self.values
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }
}

pub struct FakeSelfTest {
    log: CallLog,
    halt: bool,
}

impl FakeSelfTest {
    pub fn new(log: &CallLog, halt: bool) -> Self {
        Self {
            log: log.clone(),
            halt,
        }
    }
}

#[async_trait]
impl SelfTest for FakeSelfTest {
    async fn run(&mut self, _status: &SystemStatus) -> bool {
        self.log.push("self_test");
        self.halt
    }
}

#[derive(Default)]
struct WiredShared {
    polls: AtomicU32,
    modes: Mutex<Vec<WiredInit>>,
}

/// Wired transport that links after a fixed number of polls, or never.
#[derive(Clone)]
pub struct FakeWired {
    present: bool,
    link_after: Option<(u32, &'static str)>,
    initialized: bool,
    log: Option<CallLog>,
    shared: Arc<WiredShared>,
}

impl FakeWired {
    pub fn present() -> Self {
        Self {
            present: true,
            link_after: None,
            initialized: false,
            log: None,
            shared: Arc::default(),
        }
    }

    pub fn absent() -> Self {
        Self {
            present: false,
            ..Self::present()
        }
    }

    pub fn link_after(mut self, polls: u32, address: &'static str) -> Self {
        self.link_after = Some((polls, address));
        self
    }

    /// Also record `init` calls as "eth_init" in `log`.
    pub fn logged(mut self, log: &CallLog) -> Self {
        self.log = Some(log.clone());
        self
    }

    pub fn polls(&self) -> u32 {
        self.shared.polls.load(Ordering::SeqCst)
    }

    pub fn init_modes(&self) -> Vec<WiredInit> {
        self.shared.modes.lock().unwrap().clone()
    }
}

#[async_trait]
impl WiredTransport for FakeWired {
    async fn init(&mut self, mode: WiredInit) {
        self.shared.modes.lock().unwrap().push(mode);
        if let Some(log) = &self.log {
            log.push("eth_init");
        }
        self.initialized = true;
    }

    fn available(&self) -> bool {
        self.initialized && self.present
    }

    async fn update_status(&mut self) -> LinkStatus {
        let poll = self.shared.polls.fetch_add(1, Ordering::SeqCst) + 1;
        match self.link_after {
            Some((after, address)) if poll >= after => LinkStatus::up(address),
            _ => LinkStatus::down(),
        }
    }
}

/// Wireless transport that joins in the background after a delay.
#[derive(Clone)]
pub struct FakeWireless {
    available: bool,
    link: Option<(Duration, &'static str)>,
    init_calls: Arc<AtomicU32>,
}

impl FakeWireless {
    pub fn never_links() -> Self {
        Self {
            available: true,
            link: None,
            init_calls: Arc::default(),
        }
    }

    pub fn links_after(delay: Duration, address: &'static str) -> Self {
        Self {
            link: Some((delay, address)),
            ..Self::never_links()
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::never_links()
        }
    }

    pub fn init_calls(&self) -> u32 {
        self.init_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WirelessTransport for FakeWireless {
    async fn init(&mut self, link: LinkReporter) -> Result<()> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        if !self.available {
            return Err(HwError::NotPresent("wifi".into()));
        }
        if let Some((delay, address)) = self.link {
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                link.report_link(Transport::Wireless, address);
            });
        }
        Ok(())
    }

    fn available(&self) -> bool {
        self.available
    }
}

pub struct FakeService {
    name: &'static str,
    log: CallLog,
}

impl FakeService {
    pub fn new(name: &'static str, log: &CallLog) -> Self {
        Self {
            name,
            log: log.clone(),
        }
    }
}

#[async_trait]
impl BackgroundService for FakeService {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn run(self: Box<Self>, _status: SystemStatus) {
        self.log.push(self.name);
    }
}

pub struct FakeAux {
    fail: bool,
}

impl FakeAux {
    pub fn working() -> Self {
        Self { fail: false }
    }

    pub fn failing() -> Self {
        Self { fail: true }
    }
}

#[async_trait]
impl AuxServer for FakeAux {
    async fn start(&mut self, _status: &SystemStatus) -> Result<()> {
        if self.fail {
            Err(HwError::Other("uart busy".into()))
        } else {
            Ok(())
        }
    }
}

/// ASIC chain and UART sharing one call log.
#[derive(Clone)]
pub struct FakeAsic {
    chips: u32,
    reset_fails: bool,
    log: CallLog,
    baud: Arc<Mutex<Option<u32>>>,
}

impl FakeAsic {
    pub const MAX_BAUD: u32 = 1_000_000;

    pub fn with_chips(chips: u32, log: &CallLog) -> Self {
        Self {
            chips,
            reset_fails: false,
            log: log.clone(),
            baud: Arc::default(),
        }
    }

    pub fn failing_reset(log: &CallLog) -> Self {
        Self {
            reset_fails: true,
            ..Self::with_chips(1, log)
        }
    }

    pub fn hardware(&self) -> AsicHardware {
        AsicHardware {
            driver: Box::new(self.clone()),
            serial: Box::new(FakeSerial(self.clone())),
        }
    }

    /// Rate last applied to the UART.
    pub fn baud(&self) -> Option<u32> {
        *self.baud.lock().unwrap()
    }
}

#[async_trait]
impl AsicDriver for FakeAsic {
    async fn reset(&mut self) -> Result<()> {
        self.log.push("reset");
        if self.reset_fails {
            Err(HwError::Timeout)
        } else {
            Ok(())
        }
    }

    async fn enumerate(&mut self, _status: &SystemStatus) -> u32 {
        self.log.push("enumerate");
        self.chips
    }

    async fn set_max_baud(&mut self, _status: &SystemStatus) -> u32 {
        self.log.push("set_max_baud");
        Self::MAX_BAUD
    }
}

pub struct FakeSerial(FakeAsic);

#[async_trait]
impl SerialChannel for FakeSerial {
    async fn init(&mut self) {
        self.0.log.push("serial_init");
    }

    async fn set_baud(&mut self, baud: u32) {
        self.0.log.push("set_baud");
        *self.0.baud.lock().unwrap() = Some(baud);
    }

    async fn clear_buffer(&mut self) {
        self.0.log.push("clear_buffer");
    }
}

/// Records its name when started, then idles.
pub struct RecordingWorker {
    name: &'static str,
    log: CallLog,
}

impl RecordingWorker {
    pub fn new(name: &'static str, log: &CallLog) -> Self {
        Self {
            name,
            log: log.clone(),
        }
    }
}

#[async_trait]
impl PipelineWorker<u32, u32> for RecordingWorker {
    async fn run(self: Box<Self>, _ctx: WorkerContext<u32, u32>) {
        self.log.push(self.name);
        std::future::pending::<()>().await;
    }
}

pub struct ProducerWorker {
    pub items: Vec<u32>,
}

#[async_trait]
impl PipelineWorker<u32, u32> for ProducerWorker {
    async fn run(self: Box<Self>, ctx: WorkerContext<u32, u32>) {
        let queue = ctx.work_queue().expect("protocol client bound to work queue");
        for item in self.items {
            queue.push(item).await.unwrap();
        }
        std::future::pending::<()>().await;
    }
}

pub struct DispatchWorker;

#[async_trait]
impl PipelineWorker<u32, u32> for DispatchWorker {
    async fn run(self: Box<Self>, ctx: WorkerContext<u32, u32>) {
        assert!(ctx.work_queue().is_some() && ctx.job_queue().is_some());
        let (Some(work), Some(jobs)) = (ctx.work_queue(), ctx.job_queue()) else {
            return;
        };
        while let Ok(item) = work.pop().await {
            jobs.push(item * 10).await.unwrap();
        }
    }
}

#[derive(Clone, Default)]
pub struct PollingWorker {
    received: Arc<Mutex<Vec<u32>>>,
}

impl PollingWorker {
    pub fn received(&self) -> Vec<u32> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl PipelineWorker<u32, u32> for PollingWorker {
    async fn run(self: Box<Self>, ctx: WorkerContext<u32, u32>) {
        assert!(ctx.work_queue().is_none());
        let Some(jobs) = ctx.job_queue() else {
            return;
        };
        while let Ok(job) = jobs.pop().await {
            self.received.lock().unwrap().push(job);
        }
    }
}
