use crate::engine::Engine;
use crate::error::{ConvertError, Result};
use crate::job::{Job, JobResult};
use async_trait::async_trait;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Executes one job. Every path through `handle` must call `Job::complete`.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn handle(&self, job: Job);
}

#[async_trait]
impl<F, Fut> JobHandler for F
where
    F: Fn(Job) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle(&self, job: Job) {
        (self)(job).await
    }
}

pub struct WorkerPool {
    engine: Engine,
    workers: usize,
    capacity: usize,
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    receiver: Arc<AsyncMutex<mpsc::Receiver<Job>>>,
    handler: Arc<dyn JobHandler>,
    tasks: Mutex<JoinSet<()>>,
}

impl WorkerPool {
    pub fn new(engine: Engine, workers: usize, handler: impl JobHandler) -> Self {
        Self::with_capacity(engine, workers, DEFAULT_QUEUE_CAPACITY, handler)
    }

    pub fn with_capacity(
        engine: Engine,
        workers: usize,
        capacity: usize,
        handler: impl JobHandler,
    ) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            engine,
            workers: workers.max(1),
            capacity,
            sender: Mutex::new(Some(tx)),
            receiver: Arc::new(AsyncMutex::new(rx)),
            handler: Arc::new(handler),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    pub fn engine(&self) -> Engine {
        self.engine
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn queued(&self) -> usize {
        match self.sender.lock() {
            Ok(guard) => guard
                .as_ref()
                .map(|tx| self.capacity - tx.capacity())
                .unwrap_or(0),
            Err(_) => 0,
        }
    }

    pub fn start(&self, shutdown: &CancellationToken) {
        let Ok(mut tasks) = self.tasks.lock() else {
            warn!(engine = %self.engine, "task set poisoned; pool not started");
            return;
        };

        info!(engine = %self.engine, workers = self.workers, "starting worker pool");
        for worker_id in 0..self.workers {
            let engine = self.engine;
            let receiver = self.receiver.clone();
            let handler = self.handler.clone();
            let shutdown = shutdown.clone();

            tasks.spawn(async move {
                debug!(%engine, worker_id, "executor started");
                loop {
                    let next = tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => None,
                        job = async { receiver.lock().await.recv().await } => job,
                    };
                    let Some(job) = next else {
                        break;
                    };
                    debug!(%engine, worker_id, job_id = %job.id, "executor picked up job");
                    let job_id = job.id;
                    // A panicking handler drops the job (its caller sees a lost result);
                    // the executor itself stays in the pool.
                    if AssertUnwindSafe(handler.handle(job)).catch_unwind().await.is_err() {
                        warn!(%engine, worker_id, %job_id, "handler panicked");
                    }
                }
                debug!(%engine, worker_id, "executor stopped");
            });
        }
    }

    pub async fn enqueue(&self, job: Job) -> Result<()> {
        let sender = match self.sender.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => None,
        };
        let Some(sender) = sender else {
            return Err(ConvertError::PoolClosed(self.engine));
        };
        sender
            .send(job)
            .await
            .map_err(|_| ConvertError::PoolClosed(self.engine))
    }

    pub async fn drain(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
        let mut tasks = match self.tasks.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(_) => return,
        };
        while let Some(res) = tasks.join_next().await {
            if let Err(err) = res {
                warn!(engine = %self.engine, "executor ended abnormally: {err}");
            }
        }

        // Executors stopped by cancellation leave queued jobs behind; their callers
        // are still waiting.
        let mut receiver = self.receiver.lock().await;
        receiver.close();
        while let Ok(job) = receiver.try_recv() {
            warn!(engine = %self.engine, job_id = %job.id, "job still queued at shutdown");
            job.complete(JobResult::Failure {
                error: format!("{} pool shut down before the job ran", self.engine),
            });
        }
        info!(engine = %self.engine, "worker pool drained");
    }
}
