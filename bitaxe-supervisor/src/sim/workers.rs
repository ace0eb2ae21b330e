//! Simulated pipeline workers.
//!
//! The pool client hands out work on a timer, job dispatch turns each piece
//! of work into one job, hardware polling "hashes" a job and reports a nonce
//! over the simulated UART, and result collection counts what comes back.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::pipeline::{PipelineWorker, PipelineWorkers, WorkerContext};
use crate::tracing::prelude::*;

/// Time a simulated chip spends on one job.
const JOB_TIME: Duration = Duration::from_millis(500);

/// How often the statistics worker logs a summary.
pub const STATS_INTERVAL: Duration = Duration::from_secs(30);

/// Work received from the simulated pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimWork {
    pub job_id: u32,
    pub difficulty: u32,
}

/// A job addressed to the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimJob {
    pub job_id: u32,
    pub version: u32,
}

#[derive(Debug, Clone, Copy)]
struct Nonce {
    job_id: u32,
    nonce: u32,
}

/// Counters shared by the simulated workers.
#[derive(Debug, Default)]
pub struct SimStats {
    work_received: AtomicU64,
    jobs_dispatched: AtomicU64,
    nonces: AtomicU64,
}

impl SimStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn work_received(&self) -> u64 {
        self.work_received.load(Ordering::Relaxed)
    }

    pub fn jobs_dispatched(&self) -> u64 {
        self.jobs_dispatched.load(Ordering::Relaxed)
    }

    pub fn nonces(&self) -> u64 {
        self.nonces.load(Ordering::Relaxed)
    }
}

/// Build the five simulated workers and the counters they update.
pub fn workers(work_interval: Duration) -> (PipelineWorkers<SimWork, SimJob>, Arc<SimStats>) {
    let stats = Arc::new(SimStats::default());
    let (nonce_tx, nonce_rx) = mpsc::channel(16);

    let workers = PipelineWorkers {
        protocol_client: Box::new(PoolClient {
            interval: work_interval,
            stats: stats.clone(),
        }),
        job_dispatch: Box::new(JobDispatcher {
            stats: stats.clone(),
        }),
        hardware_polling: Box::new(HashPoller { nonce_tx }),
        result_collection: Box::new(ResultCollector {
            nonce_rx,
            stats: stats.clone(),
        }),
        statistics: Box::new(Statistics {
            interval: STATS_INTERVAL,
            stats: stats.clone(),
        }),
    };
    (workers, stats)
}

struct PoolClient {
    interval: Duration,
    stats: Arc<SimStats>,
}

#[async_trait]
impl PipelineWorker<SimWork, SimJob> for PoolClient {
    async fn run(self: Box<Self>, ctx: WorkerContext<SimWork, SimJob>) {
        let Some(queue) = ctx.work_queue() else {
            error!("Pool client started without a work queue");
            return;
        };

        let mut ticker = tokio::time::interval(self.interval);
        for job_id in 1u32.. {
            ticker.tick().await;
            let work = SimWork {
                job_id,
                difficulty: 512,
            };
            trace!(job_id, "New work from pool");
            if let Err(e) = queue.push(work).await {
                warn!(error = %e, "Pool client stopping");
                return;
            }
            SimStats::bump(&self.stats.work_received);
        }
    }
}

struct JobDispatcher {
    stats: Arc<SimStats>,
}

#[async_trait]
impl PipelineWorker<SimWork, SimJob> for JobDispatcher {
    async fn run(self: Box<Self>, ctx: WorkerContext<SimWork, SimJob>) {
        let (Some(work), Some(jobs)) = (ctx.work_queue(), ctx.job_queue()) else {
            error!("Job dispatch started without its queues");
            return;
        };

        while let Ok(item) = work.pop().await {
            let job = SimJob {
                job_id: item.job_id,
                version: 0x2000_0000,
            };
            if jobs.push(job).await.is_err() {
                break;
            }
            SimStats::bump(&self.stats.jobs_dispatched);
        }
        warn!("Job dispatch stopping");
    }
}

struct HashPoller {
    nonce_tx: mpsc::Sender<Nonce>,
}

#[async_trait]
impl PipelineWorker<SimWork, SimJob> for HashPoller {
    async fn run(self: Box<Self>, ctx: WorkerContext<SimWork, SimJob>) {
        let Some(jobs) = ctx.job_queue() else {
            error!("Hardware polling started without a job queue");
            return;
        };

        while let Ok(job) = jobs.pop().await {
            tokio::time::sleep(JOB_TIME).await;
            let nonce = Nonce {
                job_id: job.job_id,
                nonce: job.job_id.wrapping_mul(0x9e37_79b9) ^ job.version,
            };
            if self.nonce_tx.send(nonce).await.is_err() {
                break;
            }
        }
        warn!("Hardware polling stopping");
    }
}

struct ResultCollector {
    nonce_rx: mpsc::Receiver<Nonce>,
    stats: Arc<SimStats>,
}

#[async_trait]
impl PipelineWorker<SimWork, SimJob> for ResultCollector {
    async fn run(self: Box<Self>, _ctx: WorkerContext<SimWork, SimJob>) {
        let ResultCollector {
            mut nonce_rx,
            stats,
        } = *self;
        while let Some(result) = nonce_rx.recv().await {
            debug!(job_id = result.job_id, nonce = %format!("{:#010x}", result.nonce), "Nonce");
            SimStats::bump(&stats.nonces);
        }
    }
}

struct Statistics {
    interval: Duration,
    stats: Arc<SimStats>,
}

#[async_trait]
impl PipelineWorker<SimWork, SimJob> for Statistics {
    async fn run(self: Box<Self>, ctx: WorkerContext<SimWork, SimJob>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            info!(
                work = self.stats.work_received(),
                jobs = self.stats.jobs_dispatched(),
                nonces = self.stats.nonces(),
                asic = %ctx.status.asic_status(),
                "Mining status"
            );
        }
    }
}
