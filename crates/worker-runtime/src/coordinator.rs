//! Session coordinator
//!
//! A short-lived invocation that polls a session's queues with backoff until
//! every one is finished, then selects the winning queue per communication
//! group and emits exactly one terminal event to the cleanup queue.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;
use log::{debug, info, warn};
use serde_json::json;

use message_bus::attrs::keys;
use message_bus::{queues, MessageBus, WorkMessage};
use queue_store::{QueueRepository, WinningQueue};
use rate_model::SessionId;

use crate::config::CoordinatorConfig;
use crate::error::WorkerError;
use crate::progress::{ProgressEvent, ProgressSink};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinationOutcome {
    /// All queues terminal; the session-complete event was emitted
    Completed { winners: Vec<WinningQueue> },
    /// Queues still unfinished after the polling budget
    Stalled,
}

pub struct Coordinator<R, B>
where
    R: QueueRepository,
    B: MessageBus,
{
    repo: Arc<R>,
    bus: Arc<B>,
    progress: Arc<dyn ProgressSink>,
    config: CoordinatorConfig,
}

impl<R, B> Coordinator<R, B>
where
    R: QueueRepository,
    B: MessageBus,
{
    pub fn new(
        repo: Arc<R>,
        bus: Arc<B>,
        progress: Arc<dyn ProgressSink>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            repo,
            bus,
            progress,
            config,
        }
    }

    /// Watch the session until every queue is terminal or the polling budget
    /// runs out.
    pub async fn run_session(
        &self,
        session_id: SessionId,
    ) -> Result<CoordinationOutcome, WorkerError> {
        for attempt in 1..=self.config.max_poll_attempts {
            if let Some(stuck_secs) = self.config.stuck_after_secs {
                let reclaimed = self
                    .repo
                    .abandon_stuck(Duration::seconds(stuck_secs as i64))
                    .await?;
                if reclaimed > 0 {
                    warn!(
                        "session {}: reclaimed {} stuck queue(s)",
                        session_id, reclaimed
                    );
                }
            }

            let session_queues = self.repo.session_queues(session_id).await?;
            if session_queues.is_empty() {
                warn!("session {} has no queues", session_id);
            }
            let unfinished = session_queues
                .iter()
                .filter(|q| !q.status.is_finished())
                .count();

            if unfinished == 0 {
                return self.complete_session(session_id).await;
            }

            debug!(
                "session {}: {}/{} queue(s) unfinished (poll {}/{})",
                session_id,
                unfinished,
                session_queues.len(),
                attempt,
                self.config.max_poll_attempts
            );
            if attempt < self.config.max_poll_attempts {
                let index = (attempt as usize).saturating_sub(1);
                let delay = self
                    .config
                    .poll_backoff_secs
                    .get(index)
                    .or(self.config.poll_backoff_secs.last())
                    .copied()
                    .unwrap_or(0);
                tokio::time::sleep(std::time::Duration::from_secs(delay)).await;
            }
        }

        warn!("session {} stalled: polling budget exhausted", session_id);
        self.progress
            .report(ProgressEvent::SessionStalled { session_id })
            .await;
        Ok(CoordinationOutcome::Stalled)
    }

    async fn complete_session(
        &self,
        session_id: SessionId,
    ) -> Result<CoordinationOutcome, WorkerError> {
        let winners = self.repo.winning_queues(session_id).await?;
        for winner in &winners {
            info!(
                "session {}: comm group {} won by queue {} at cost {}",
                session_id, winner.comm_group_id, winner.queue_id, winner.total_cost
            );
        }
        if self.config.purge_losing_results {
            let purged = self.repo.purge_losing_results(session_id).await?;
            debug!("session {}: purged {} losing result set(s)", session_id, purged);
        }

        let body = json!({ "sessionId": session_id }).to_string();
        let attributes =
            HashMap::from([(keys::SESSION_ID.to_string(), session_id.to_string())]);
        self.bus
            .send(queues::SESSION_COMPLETE, WorkMessage::new(body, attributes))
            .await?;
        self.progress
            .report(ProgressEvent::SessionComplete { session_id })
            .await;

        Ok(CoordinationOutcome::Completed { winners })
    }
}
