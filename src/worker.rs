//! Background processing: a bounded job queue drained by N concurrent workers.
//!
//! Request handlers enqueue a [`ProcessingJob`] and return immediately with
//! the note in `processing`. Each job is driven to a terminal state here:
//! either [`Materializer::apply`] commits it as `completed`, or
//! [`Materializer::fail`] records the error. A job is never dropped silently;
//! if even the failure write is rejected (the note was deleted mid-run), that
//! is logged. Each job runs on its own task, so a panic fails that note and
//! the dispatcher keeps draining the queue.

use crate::config::StudyConfig;
use crate::error::StudyError;
use crate::materialize::Materializer;
use crate::orchestrator::Orchestrator;
use crate::pipeline::llm::{resolve_factory, ModelFactory};
use crate::progress::{NoopObserver, RunReport, SharedObserver};
use crate::store::SharedStore;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Everything a worker needs to process one note.
#[derive(Clone)]
pub struct ProcessingJob {
    pub note_id: Uuid,
    pub content: String,
    pub course_name: Option<String>,
    /// Per-user model credential, never persisted.
    pub credential: String,
}

impl std::fmt::Debug for ProcessingJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingJob")
            .field("note_id", &self.note_id)
            .field("chars", &self.content.len())
            .field("course_name", &self.course_name)
            .field("credential", &"<redacted>")
            .finish()
    }
}

struct WorkerContext {
    config: Arc<StudyConfig>,
    factory: Arc<dyn ModelFactory>,
    materializer: Materializer,
    observer: SharedObserver,
}

impl WorkerContext {
    async fn run_job(&self, job: ProcessingJob) {
        let note_id = job.note_id;
        self.observer.on_run_start(note_id);

        match self.process(job).await {
            Ok(report) => self.observer.on_run_complete(note_id, &report),
            Err(e) => {
                warn!(%note_id, error = %e, "Processing run failed");
                self.record_failure(note_id, &e).await;
            }
        }
    }

    async fn record_failure(&self, note_id: Uuid, e: &StudyError) {
        match self.materializer.fail(note_id, e).await {
            Ok(message) => self.observer.on_run_failed(note_id, &message),
            Err(store_err) => {
                error!(%note_id, error = %store_err, "Could not record failed run")
            }
        }
    }

    async fn process(&self, job: ProcessingJob) -> Result<RunReport, StudyError> {
        let model = self.factory.connect(&job.credential, &self.config)?;
        let bundle = Orchestrator::new(model, Arc::clone(&self.config))
            .with_observer(Arc::clone(&self.observer))
            .run(job.note_id, &job.content, job.course_name.as_deref())
            .await?;
        self.materializer.apply(job.note_id, bundle).await
    }
}

/// Owns the job channel and the dispatcher task.
pub struct WorkerPool {
    sender: mpsc::Sender<ProcessingJob>,
    dispatcher: JoinHandle<()>,
}

impl WorkerPool {
    /// Start `config.workers` concurrent workers over a queue of
    /// `config.queue_capacity` jobs.
    pub fn spawn(
        config: Arc<StudyConfig>,
        store: SharedStore,
        observer: Option<SharedObserver>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel::<ProcessingJob>(config.queue_capacity);
        let workers = config.workers;
        let ctx = Arc::new(WorkerContext {
            factory: resolve_factory(&config),
            materializer: Materializer::new(store, config.error_message_limit),
            observer: observer.unwrap_or_else(|| Arc::new(NoopObserver)),
            config,
        });

        let dispatcher = tokio::spawn(async move {
            info!(workers, "Worker pool started");
            ReceiverStream::new(receiver)
                .for_each_concurrent(workers, |job| {
                    let ctx = Arc::clone(&ctx);
                    async move {
                        let note_id = job.note_id;
                        let task = tokio::spawn({
                            let ctx = Arc::clone(&ctx);
                            async move { ctx.run_job(job).await }
                        });
                        if let Err(e) = task.await {
                            error!(%note_id, error = %e, "Processing task panicked");
                            let err = StudyError::Internal(format!("processing task panicked: {e}"));
                            ctx.record_failure(note_id, &err).await;
                        }
                    }
                })
                .await;
            info!("Worker pool drained");
        });

        Self { sender, dispatcher }
    }

    /// Queue a job. Waits only if the queue is full.
    pub async fn enqueue(&self, job: ProcessingJob) -> Result<(), StudyError> {
        let note_id = job.note_id;
        self.sender
            .send(job)
            .await
            .map_err(|_| StudyError::QueueClosed)?;
        info!(%note_id, "Processing job queued");
        Ok(())
    }

    /// Stop accepting jobs and wait for queued ones to finish.
    pub async fn shutdown(self) -> Result<(), StudyError> {
        drop(self.sender);
        self.dispatcher
            .await
            .map_err(|e| StudyError::Internal(format!("worker pool panicked: {e}")))
    }
}
