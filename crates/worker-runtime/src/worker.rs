//! The worker runtime
//!
//! One invocation per message: route by attribute, pre-check finished
//! statuses for duplicate deliveries, run the assigner fresh or from a
//! checkpoint, then let `finalize` make the single completion-or-chain
//! decision.

use std::sync::Arc;

use chrono::Duration;
use log::{debug, info, warn};
use serde_json::json;

use assigner::{AssignerOptions, BatchAssigner, QueueJob, QueueOutcome};
use checkpoint_store::{checkpoint_key, CheckpointStore};
use message_bus::attrs::is_generation_message;
use message_bus::{MessageBus, WorkMessage, WorkOrder};
use queue_store::{QueueRepository, QueueStatus};
use rate_model::QueueId;

use crate::config::WorkerConfig;
use crate::context::WorkerContext;
use crate::error::WorkerError;
use crate::loader::WorkloadLoader;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::recorder::ResultRecorder;
use crate::retry::with_retries;

/// How the runtime disposed of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Assigner finished; every queue in the set reached a terminal status
    Completed,
    /// Deadline hit; checkpoint persisted and a continuation enqueued
    Continued,
    /// Duplicate delivery observed a finished or already-claimed queue set
    Duplicate,
    /// Sequence-generation message; consumed by the orchestrator lane
    GenerationRouted,
    /// Queue set rejected before running (configuration error, lost checkpoint)
    Rejected,
}

pub struct WorkerRuntime<R, C, B>
where
    R: QueueRepository,
    C: CheckpointStore,
    B: MessageBus,
{
    repo: Arc<R>,
    checkpoints: Arc<C>,
    bus: Arc<B>,
    loader: Arc<dyn WorkloadLoader>,
    progress: Arc<dyn ProgressSink>,
    recorder: ResultRecorder<R>,
    config: WorkerConfig,
}

impl<R, C, B> WorkerRuntime<R, C, B>
where
    R: QueueRepository,
    C: CheckpointStore,
    B: MessageBus,
{
    pub fn new(
        repo: Arc<R>,
        checkpoints: Arc<C>,
        bus: Arc<B>,
        loader: Arc<dyn WorkloadLoader>,
        progress: Arc<dyn ProgressSink>,
        config: WorkerConfig,
    ) -> Self {
        let recorder = ResultRecorder::new(Arc::clone(&repo));
        Self {
            repo,
            checkpoints,
            bus,
            loader,
            progress,
            recorder,
            config,
        }
    }

    /// Process one work message within the host's remaining time budget.
    pub async fn handle_message(
        &self,
        message: &WorkMessage,
        host_budget: Duration,
    ) -> Result<Disposition, WorkerError> {
        if is_generation_message(message) {
            info!(
                "message {} carries sequence-generation attributes; not worker work",
                message.message_id
            );
            self.progress
                .report(ProgressEvent::GenerationRouted {
                    message_id: message.message_id,
                })
                .await;
            return Ok(Disposition::GenerationRouted);
        }

        let order = WorkOrder::from_message(message)?;
        let ctx = WorkerContext::new(
            order.session_id,
            host_budget,
            self.config.safety_margin_secs,
            order.continuation_attempt,
        );

        // duplicate-delivery idempotence
        let statuses = self.repo.statuses(&order.queue_ids).await?;
        if statuses.iter().any(|(_, status)| status.is_finished()) {
            info!(
                "queue set {:?} already finished; duplicate delivery no-op",
                order.queue_ids
            );
            return Ok(Disposition::Duplicate);
        }

        if order.is_continuation {
            self.handle_continuation(ctx, order).await
        } else {
            self.handle_fresh(ctx, order).await
        }
    }

    async fn handle_continuation(
        &self,
        ctx: WorkerContext,
        order: WorkOrder,
    ) -> Result<Disposition, WorkerError> {
        let key = checkpoint_key(order.session_id, &order.queue_ids);
        let payload =
            with_retries(&self.config.retry, "checkpoint get", || {
                self.checkpoints.get(&key)
            })
            .await;

        let bytes = match payload {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                warn!("no checkpoint under {}; state presumed lost", key);
                return self.reject(&order.queue_ids, "checkpoint lost").await;
            }
            Err(e) => {
                warn!("checkpoint store unavailable for {}: {}", key, e);
                return self.reject(&order.queue_ids, "checkpoint lost").await;
            }
        };

        let mut engine = match BatchAssigner::from_checkpoint(&bytes) {
            Ok(engine) => engine,
            Err(e) => {
                warn!("checkpoint under {} is unusable: {}", key, e);
                return self.reject(&order.queue_ids, "checkpoint lost").await;
            }
        };

        debug!(
            "resuming queues {:?} at {:.1}%, attempt {}",
            order.queue_ids,
            engine.progress_percent(),
            order.continuation_attempt
        );
        engine.resume(&ctx.run_context());
        self.finalize(ctx, order, engine).await
    }

    async fn handle_fresh(
        &self,
        ctx: WorkerContext,
        order: WorkOrder,
    ) -> Result<Disposition, WorkerError> {
        let mut claimed: Vec<QueueId> = Vec::new();
        for id in &order.queue_ids {
            if self.repo.claim(*id).await? {
                claimed.push(*id);
            } else {
                info!("queue {} already claimed elsewhere; skipping", id);
            }
        }
        if claimed.is_empty() {
            info!("nothing left to claim in {:?}", order.queue_ids);
            return Ok(Disposition::Duplicate);
        }
        self.progress
            .report(ProgressEvent::QueuesClaimed {
                queue_ids: claimed.clone(),
            })
            .await;

        let mut jobs = match self.load_with_retry(&claimed).await {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!("workload for {:?} unavailable: {}", claimed, e);
                return self.reject(&claimed, &e.to_string()).await;
            }
        };
        for job in &mut jobs {
            job.charge_type = order.charge_type;
        }

        let mut engine = BatchAssigner::new(
            jobs,
            AssignerOptions {
                skip_lower_cost_check: order.skip_lower_cost_check,
            },
        );
        engine.run(&ctx.run_context());

        let effective = WorkOrder {
            queue_ids: claimed,
            ..order
        };
        self.finalize(ctx, effective, engine).await
    }

    /// The single point deciding between persisting final results and
    /// chaining into another worker execution.
    async fn finalize(
        &self,
        ctx: WorkerContext,
        order: WorkOrder,
        mut engine: BatchAssigner,
    ) -> Result<Disposition, WorkerError> {
        if !engine.is_completed() {
            let next_attempt = order.continuation_attempt + 1;
            if next_attempt > self.config.max_continuations {
                warn!(
                    "queues {:?} exhausted the continuation budget ({})",
                    order.queue_ids, self.config.max_continuations
                );
                engine.force_complete("continuation budget exhausted");
            } else if engine.unfinished_queue_ids().is_empty() {
                engine.force_complete("no remaining work");
            }
        }

        if engine.is_completed() {
            // COMPLETE path
            let key = checkpoint_key(order.session_id, &order.queue_ids);
            if let Err(e) = self.checkpoints.delete(&key).await {
                warn!("checkpoint delete failed for {} (TTL will evict): {}", key, e);
            }
            self.record_outcomes(&engine).await?;
            return Ok(Disposition::Completed);
        }

        // CONTINUATION path
        let remaining = engine.unfinished_queue_ids();
        let payload = engine.to_checkpoint()?;
        let key = checkpoint_key(order.session_id, &remaining);
        let ttl = self.config.checkpoint_ttl_secs;

        let put = with_retries(&self.config.retry, "checkpoint put", || {
            self.checkpoints.put(&key, &payload, ttl)
        })
        .await;
        if put.is_err() {
            warn!(
                "no continuation store; degrading queues {:?} to error",
                remaining
            );
            self.record_outcomes(&engine).await?;
            self.fail_queues(&remaining, "no continuation store").await?;
            return Ok(Disposition::Completed);
        }
        self.progress
            .report(ProgressEvent::CheckpointPersisted {
                key: key.clone(),
                remaining: remaining.clone(),
                progress_percent: engine.progress_percent(),
            })
            .await;

        let continuation = order.continuation(remaining.clone());
        let body = json!({
            "progressPercent": engine.progress_percent(),
            "priorWorkerId": ctx.worker_id,
            "continuationAttempt": continuation.continuation_attempt,
        })
        .to_string();
        let message = WorkMessage::new(body, continuation.to_attributes());

        let sent = with_retries(&self.config.retry, "continuation send", || {
            self.bus.send(&self.config.work_queue, message.clone())
        })
        .await;
        if sent.is_err() {
            warn!(
                "continuation enqueue failed; degrading queues {:?} to error",
                remaining
            );
            self.record_outcomes(&engine).await?;
            self.fail_queues(&remaining, "continuation enqueue failed")
                .await?;
            let _ = self.checkpoints.delete(&key).await;
            return Ok(Disposition::Completed);
        }

        info!(
            "chained {} queue(s) at {:.1}%, continuation attempt {}",
            remaining.len(),
            engine.progress_percent(),
            continuation.continuation_attempt
        );
        Ok(Disposition::Continued)
    }

    /// Persist every finished queue outcome: results through the at-most-once
    /// recorder, failures as error transitions.
    async fn record_outcomes(&self, engine: &BatchAssigner) -> Result<(), WorkerError> {
        for (queue_id, outcome) in engine.outcomes() {
            match outcome {
                QueueOutcome::Success {
                    result,
                    strategy,
                    objective_cost,
                } => {
                    let recorded = with_retries(&self.config.retry, "record result", || {
                        self.recorder.record(*queue_id, result, *objective_cost)
                    })
                    .await?;
                    if recorded {
                        debug!(
                            "queue {} recorded: cost {}, strategy {:?}",
                            queue_id, objective_cost, strategy
                        );
                        self.progress
                            .report(ProgressEvent::QueueFinalized {
                                queue_id: *queue_id,
                                status: QueueStatus::CompletedSuccess,
                            })
                            .await;
                    }
                }
                QueueOutcome::Failed { reason } => {
                    let transitioned = with_retries(&self.config.retry, "complete error", || {
                        self.repo.complete_error(*queue_id, reason)
                    })
                    .await?;
                    if transitioned {
                        self.progress
                            .report(ProgressEvent::QueueFinalized {
                                queue_id: *queue_id,
                                status: QueueStatus::CompletedError,
                            })
                            .await;
                    }
                }
            }
        }
        Ok(())
    }

    async fn fail_queues(
        &self,
        queue_ids: &[QueueId],
        reason: &str,
    ) -> Result<(), WorkerError> {
        for id in queue_ids {
            let transitioned = with_retries(&self.config.retry, "complete error", || {
                self.repo.complete_error(*id, reason)
            })
            .await?;
            if transitioned {
                self.progress
                    .report(ProgressEvent::QueueFinalized {
                        queue_id: *id,
                        status: QueueStatus::CompletedError,
                    })
                    .await;
            }
        }
        Ok(())
    }

    async fn reject(
        &self,
        queue_ids: &[QueueId],
        reason: &str,
    ) -> Result<Disposition, WorkerError> {
        self.fail_queues(queue_ids, reason).await?;
        Ok(Disposition::Rejected)
    }

    /// Load the claimed workload, retrying transient backend errors only;
    /// configuration errors fail the queue set immediately.
    async fn load_with_retry(
        &self,
        queue_ids: &[QueueId],
    ) -> Result<Vec<QueueJob>, crate::loader::LoaderError> {
        let mut attempt = 0;
        loop {
            match self.loader.load(queue_ids).await {
                Ok(jobs) => return Ok(jobs),
                Err(e) if e.is_configuration() => return Err(e),
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.config.retry.max_attempts {
                        return Err(e);
                    }
                    let delay = self.config.retry.base_delay_ms * 2u64.pow(attempt - 1);
                    warn!(
                        "workload load failed (attempt {}/{}), retrying in {} ms: {}",
                        attempt, self.config.retry.max_attempts, delay, e
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
                }
            }
        }
    }
}
