//! Mining pipeline supervision.
//!
//! Once the network is up, the supervisor brings the ASIC chain up and, only
//! if chips answer, builds the two hand-off queues and spawns the five
//! pipeline workers:
//!
//! ```text
//!  protocol client ──> WorkQueue ──> job dispatch ──> JobQueue ──> hardware polling ──> ASICs
//!                                                                                        │
//!  statistics                                       result collection <───── nonces ─────┘
//! ```
//!
//! # Priorities
//!
//! | Worker            | Priority     | Level |
//! |-------------------|--------------|-------|
//! | result collection | `Critical`   | 15    |
//! | job dispatch      | `Production` | 10    |
//! | hardware polling  | `Production` | 10    |
//! | protocol client   | `Network`    | 5     |
//! | statistics        | `Background` | 3     |
//!
//! Result collection must never sit behind statistics: a starved result
//! reader lets the ASIC UART back up and nonces are lost. The levels may be
//! retuned but the order may not.
//!
//! tokio does not schedule by priority, so priority is recorded on each
//! [`PipelineTaskHandle`] and workers are spawned highest first.
//!
//! A worker that returns or panics is not restarted.

pub mod queue;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

pub use queue::{BoundedQueue, JobQueue, QueueError, WorkQueue};

use crate::asic::{AsicDriver, SerialChannel};
use crate::error::BootError;
use crate::status::{AsicWriter, SystemStatus};
use crate::tracing::prelude::*;

/// Relative scheduling priority, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    /// Best effort; may starve under load.
    Background,
    /// Network-bound, latency tolerant.
    Network,
    /// Time-sensitive production and consumption of device work.
    Production,
    /// Must keep up with the hardware.
    Critical,
}

impl Priority {
    /// FreeRTOS-style numeric level.
    pub fn level(&self) -> u8 {
        match self {
            Priority::Background => 3,
            Priority::Network => 5,
            Priority::Production => 10,
            Priority::Critical => 15,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerRole {
    ResultCollection,
    JobDispatch,
    HardwarePolling,
    ProtocolClient,
    Statistics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueId {
    Work,
    Job,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Produce,
    Consume,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueBinding {
    pub queue: QueueId,
    pub direction: Direction,
}

impl WorkerRole {
    pub fn name(&self) -> &'static str {
        match self {
            WorkerRole::ResultCollection => "asic result",
            WorkerRole::JobDispatch => "stratum miner",
            WorkerRole::HardwarePolling => "asic",
            WorkerRole::ProtocolClient => "stratum admin",
            WorkerRole::Statistics => "statistics",
        }
    }

    pub fn priority(&self) -> Priority {
        match self {
            WorkerRole::ResultCollection => Priority::Critical,
            WorkerRole::JobDispatch | WorkerRole::HardwarePolling => Priority::Production,
            WorkerRole::ProtocolClient => Priority::Network,
            WorkerRole::Statistics => Priority::Background,
        }
    }

    pub fn bindings(&self) -> &'static [QueueBinding] {
        const WORK_IN: QueueBinding = QueueBinding {
            queue: QueueId::Work,
            direction: Direction::Consume,
        };
        const WORK_OUT: QueueBinding = QueueBinding {
            queue: QueueId::Work,
            direction: Direction::Produce,
        };
        const JOB_IN: QueueBinding = QueueBinding {
            queue: QueueId::Job,
            direction: Direction::Consume,
        };
        const JOB_OUT: QueueBinding = QueueBinding {
            queue: QueueId::Job,
            direction: Direction::Produce,
        };

        match self {
            WorkerRole::ProtocolClient => &[WORK_OUT],
            WorkerRole::JobDispatch => &[WORK_IN, JOB_OUT],
            WorkerRole::HardwarePolling => &[JOB_IN],
            WorkerRole::ResultCollection | WorkerRole::Statistics => &[],
        }
    }

    fn binds(&self, queue: QueueId) -> bool {
        self.bindings().iter().any(|b| b.queue == queue)
    }
}

/// What a worker is given at spawn time.
///
/// Only the queues in the worker's [`WorkerRole::bindings`] are present.
pub struct WorkerContext<W, J> {
    pub status: SystemStatus,
    work: Option<WorkQueue<W>>,
    jobs: Option<JobQueue<J>>,
}

impl<W, J> WorkerContext<W, J> {
    pub fn work_queue(&self) -> Option<&WorkQueue<W>> {
        self.work.as_ref()
    }

    pub fn job_queue(&self) -> Option<&JobQueue<J>> {
        self.jobs.as_ref()
    }
}

/// A pipeline worker entry point.
#[async_trait]
pub trait PipelineWorker<W, J>: Send
where
    W: Send + 'static,
    J: Send + 'static,
{
    /// Run for the life of the process.
    async fn run(self: Box<Self>, ctx: WorkerContext<W, J>);
}

/// The five workers, one per role.
pub struct PipelineWorkers<W, J>
where
    W: Send + 'static,
    J: Send + 'static,
{
    pub protocol_client: Box<dyn PipelineWorker<W, J>>,
    pub job_dispatch: Box<dyn PipelineWorker<W, J>>,
    pub hardware_polling: Box<dyn PipelineWorker<W, J>>,
    pub result_collection: Box<dyn PipelineWorker<W, J>>,
    pub statistics: Box<dyn PipelineWorker<W, J>>,
}

impl<W, J> PipelineWorkers<W, J>
where
    W: Send + 'static,
    J: Send + 'static,
{
    /// Workers in spawn order: highest priority first, ties in pipeline
    /// order.
    fn into_spawn_order(self) -> Vec<(WorkerRole, Box<dyn PipelineWorker<W, J>>)> {
        let mut workers = vec![
            (WorkerRole::ProtocolClient, self.protocol_client),
            (WorkerRole::JobDispatch, self.job_dispatch),
            (WorkerRole::HardwarePolling, self.hardware_polling),
            (WorkerRole::ResultCollection, self.result_collection),
            (WorkerRole::Statistics, self.statistics),
        ];
        workers.sort_by_key(|(role, _)| std::cmp::Reverse(role.priority()));
        workers
    }
}

/// A spawned worker.
#[derive(Debug)]
pub struct PipelineTaskHandle {
    pub name: &'static str,
    pub role: WorkerRole,
    pub priority: Priority,
    pub bindings: &'static [QueueBinding],
    task: JoinHandle<()>,
}

impl PipelineTaskHandle {
    /// Whether the worker has exited. Workers are not expected to.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// The running pipeline.
pub struct Pipeline<W, J> {
    pub chip_count: u32,
    pub baud: u32,
    pub work_queue: WorkQueue<W>,
    pub job_queue: JobQueue<J>,
    /// In spawn order.
    pub workers: Vec<PipelineTaskHandle>,
}

/// ASIC chain plus its UART.
pub struct AsicHardware {
    pub driver: Box<dyn AsicDriver>,
    pub serial: Box<dyn SerialChannel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    pub work_queue_capacity: usize,
    pub job_queue_capacity: usize,
}

pub struct MiningPipelineSupervisor {
    hw: AsicHardware,
    config: PipelineConfig,
}

impl MiningPipelineSupervisor {
    pub fn new(hw: AsicHardware, config: PipelineConfig) -> Self {
        Self { hw, config }
    }

    /// Bring the ASICs up and spawn the workers onto `tracker`.
    ///
    /// A reset failure or an empty chain is recorded in the ASIC status and
    /// returned; no queue is built and no worker is spawned.
    pub async fn start<W, J>(
        self,
        status: &SystemStatus,
        asic: AsicWriter,
        workers: PipelineWorkers<W, J>,
        tracker: &TaskTracker,
    ) -> Result<Pipeline<W, J>, BootError>
    where
        W: Send + 'static,
        J: Send + 'static,
    {
        let MiningPipelineSupervisor { mut hw, config } = self;

        for (queue, capacity) in [
            ("stratum", config.work_queue_capacity),
            ("asic jobs", config.job_queue_capacity),
        ] {
            if capacity == 0 {
                return Err(BootError::InvalidQueueCapacity { queue });
            }
        }

        if let Err(e) = hw.driver.reset().await {
            error!(error = %e, "ASIC reset failed!");
            asic.reset_failed();
            return Err(BootError::AsicResetFailed(e));
        }

        hw.serial.init().await;

        let chip_count = hw.driver.enumerate(status).await;
        if chip_count == 0 {
            error!("Chip count 0");
            asic.no_chips();
            return Err(BootError::ZeroChipsDetected);
        }
        info!(chips = chip_count, "ASIC chain enumerated");

        let baud = hw.driver.set_max_baud(status).await;
        hw.serial.set_baud(baud).await;
        hw.serial.clear_buffer().await;
        debug!(baud, "ASIC UART speed set");

        asic.mark_ready();

        let work_queue = WorkQueue::new("stratum", config.work_queue_capacity)?;
        let job_queue = JobQueue::new("asic jobs", config.job_queue_capacity)?;

        let mut handles = Vec::with_capacity(5);
        for (role, worker) in workers.into_spawn_order() {
            let ctx = WorkerContext {
                status: status.clone(),
                work: role.binds(QueueId::Work).then(|| work_queue.clone()),
                jobs: role.binds(QueueId::Job).then(|| job_queue.clone()),
            };

            let priority = role.priority();
            let span = tracing::info_span!("worker", name = role.name(), priority = priority.level());
            let task = tracker.spawn(worker.run(ctx).instrument(span));

            debug!(worker = role.name(), priority = ?priority, "Worker spawned");
            handles.push(PipelineTaskHandle {
                name: role.name(),
                role,
                priority,
                bindings: role.bindings(),
                task,
            });
        }

        info!(chips = chip_count, baud, workers = handles.len(), "Mining pipeline started");

        Ok(Pipeline {
            chip_count,
            baud,
            work_queue,
            job_queue,
            workers: handles,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;
    use crate::hw_trait::HwError;
    use crate::status::AsicStatus;
    use crate::testing::{CallLog, FakeAsic, RecordingWorker};
    use std::time::Duration;

    const CONFIG: PipelineConfig = PipelineConfig {
        work_queue_capacity: 12,
        job_queue_capacity: 12,
    };

    fn recording_workers(log: &CallLog) -> PipelineWorkers<u32, u32> {
        PipelineWorkers {
            protocol_client: Box::new(RecordingWorker::new("stratum admin", log)),
            job_dispatch: Box::new(RecordingWorker::new("stratum miner", log)),
            hardware_polling: Box::new(RecordingWorker::new("asic", log)),
            result_collection: Box::new(RecordingWorker::new("asic result", log)),
            statistics: Box::new(RecordingWorker::new("statistics", log)),
        }
    }

    #[test]
    fn test_priority_order() {
        use WorkerRole::*;
        assert!(ResultCollection.priority() > JobDispatch.priority());
        assert_eq!(JobDispatch.priority(), HardwarePolling.priority());
        assert!(HardwarePolling.priority() > ProtocolClient.priority());
        assert!(ProtocolClient.priority() > Statistics.priority());

        // The numeric levels agree with the enum order.
        let mut levels: Vec<_> = [
            Priority::Background,
            Priority::Network,
            Priority::Production,
            Priority::Critical,
        ]
        .iter()
        .map(Priority::level)
        .collect();
        let sorted = {
            let mut l = levels.clone();
            l.sort();
            l
        };
        assert_eq!(levels, sorted);
        levels.dedup();
        assert_eq!(levels.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawns_workers_highest_priority_first() {
        let log = CallLog::default();
        let asic = FakeAsic::with_chips(1, &log);
        let (status, writers) = SystemStatus::new();
        let tracker = TaskTracker::new();

        let pipeline = MiningPipelineSupervisor::new(asic.hardware(), CONFIG)
            .start(&status, writers.asic, recording_workers(&log), &tracker)
            .await
            .unwrap();

        let roles: Vec<_> = pipeline.workers.iter().map(|h| h.role).collect();
        assert_eq!(
            roles,
            vec![
                WorkerRole::ResultCollection,
                WorkerRole::JobDispatch,
                WorkerRole::HardwarePolling,
                WorkerRole::ProtocolClient,
                WorkerRole::Statistics,
            ]
        );
        let priorities: Vec<_> = pipeline.workers.iter().map(|h| h.priority).collect();
        assert!(priorities.windows(2).all(|w| w[0] >= w[1]));

        assert_eq!(status.asic_status(), AsicStatus::Ready);
        assert!(status.asic_initialized());
        assert_eq!(pipeline.chip_count, 1);
        assert_eq!(pipeline.baud, FakeAsic::MAX_BAUD);
        assert_eq!(asic.baud(), Some(FakeAsic::MAX_BAUD));
        assert_eq!(
            &log.calls()[..6],
            &["reset", "serial_init", "enumerate", "set_max_baud", "set_baud", "clear_buffer"]
        );

        tokio::time::sleep(Duration::from_millis(1)).await;
        let ran: Vec<_> = log.calls().into_iter().skip(6).collect();
        assert_eq!(ran.len(), 5);
        assert!(pipeline.workers.iter().all(|h| !h.is_finished()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_wiring() {
        let log = CallLog::default();
        let asic = FakeAsic::with_chips(1, &log);
        let (status, writers) = SystemStatus::new();
        let tracker = TaskTracker::new();

        let pipeline = MiningPipelineSupervisor::new(asic.hardware(), CONFIG)
            .start(&status, writers.asic, recording_workers(&log), &tracker)
            .await
            .unwrap();

        for handle in &pipeline.workers {
            let expected = handle.role.bindings();
            assert_eq!(handle.bindings, expected);
        }
        let dispatch = pipeline
            .workers
            .iter()
            .find(|h| h.role == WorkerRole::JobDispatch)
            .unwrap();
        assert_eq!(dispatch.bindings.len(), 2);
        assert!(WorkerRole::Statistics.bindings().is_empty());
        assert_eq!(pipeline.work_queue.capacity(), 12);
        assert_eq!(pipeline.job_queue.capacity(), 12);
    }

    #[tokio::test(start_paused = true)]
    async fn test_work_flows_through_queues() {
        use crate::testing::{DispatchWorker, PollingWorker, ProducerWorker};

        let log = CallLog::default();
        let asic = FakeAsic::with_chips(3, &log);
        let (status, writers) = SystemStatus::new();
        let tracker = TaskTracker::new();
        let polled = PollingWorker::default();

        let workers = PipelineWorkers {
            protocol_client: Box::new(ProducerWorker { items: vec![1, 2, 3] }),
            job_dispatch: Box::new(DispatchWorker),
            hardware_polling: Box::new(polled.clone()),
            result_collection: Box::new(RecordingWorker::new("asic result", &log)),
            statistics: Box::new(RecordingWorker::new("statistics", &log)),
        };

        MiningPipelineSupervisor::new(asic.hardware(), CONFIG)
            .start(&status, writers.asic, workers, &tracker)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(polled.received(), vec![10, 20, 30]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_failure_spawns_nothing() {
        let log = CallLog::default();
        let asic = FakeAsic::failing_reset(&log);
        let (status, writers) = SystemStatus::new();
        let tracker = TaskTracker::new();

        let result = MiningPipelineSupervisor::new(asic.hardware(), CONFIG)
            .start(&status, writers.asic, recording_workers(&log), &tracker)
            .await;

        assert!(matches!(result, Err(BootError::AsicResetFailed(HwError::Timeout))));
        assert_eq!(status.asic_status(), AsicStatus::ResetFailed);
        assert!(!status.asic_initialized());
        assert!(tracker.is_empty());

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(log.calls(), vec!["reset"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_chips_spawns_nothing() {
        let log = CallLog::default();
        let asic = FakeAsic::with_chips(0, &log);
        let (status, writers) = SystemStatus::new();
        let tracker = TaskTracker::new();

        let result = MiningPipelineSupervisor::new(asic.hardware(), CONFIG)
            .start(&status, writers.asic, recording_workers(&log), &tracker)
            .await;

        assert!(matches!(result, Err(BootError::ZeroChipsDetected)));
        assert_eq!(status.asic_status(), AsicStatus::ZeroChipsDetected);
        assert!(!status.asic_initialized());
        assert!(tracker.is_empty());

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(log.calls(), vec!["reset", "serial_init", "enumerate"]);
    }

    #[tokio::test]
    async fn test_zero_capacity_rejected_before_reset() {
        let log = CallLog::default();
        let asic = FakeAsic::with_chips(1, &log);
        let (status, writers) = SystemStatus::new();
        let tracker = TaskTracker::new();
        let config = PipelineConfig {
            work_queue_capacity: 0,
            job_queue_capacity: 12,
        };

        let result = MiningPipelineSupervisor::new(asic.hardware(), config)
            .start(&status, writers.asic, recording_workers(&log), &tracker)
            .await;

        let Err(err) = result else {
            panic!("zero capacity accepted");
        };
        assert!(matches!(
            err,
            BootError::InvalidQueueCapacity { queue: "stratum" }
        ));
        assert_eq!(err.class(), ErrorClass::InvalidConfig);
        assert!(log.calls().is_empty());
        assert_eq!(status.asic_status(), AsicStatus::Uninitialized);
    }
}
