//! Postgres-backed queue repository

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use rust_decimal::Decimal;
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};

use rate_model::{DeviceResult, QueueId, RatePlanId, SessionId};

use crate::error::QueueStoreError;
use crate::models::{OptimizationQueueRow, QueueStatus, WinningQueue};
use crate::repository::QueueRepository;
use crate::schema;

/// Queue repository over a Postgres pool
pub struct PgQueueRepository {
    pool: PgPool,
}

impl PgQueueRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with retry and exponential backoff.
    pub async fn connect(database_url: &str) -> Result<Self, QueueStoreError> {
        let mut retries = 5;
        let mut delay = 1;

        loop {
            match PgPoolOptions::new()
                .max_connections(5)
                .acquire_timeout(std::time::Duration::from_secs(10))
                .connect(database_url)
                .await
            {
                Ok(pool) => return Ok(Self::new(pool)),
                Err(e) if retries > 0 => {
                    warn!(
                        "failed to connect to database ({} retries left): {}",
                        retries, e
                    );
                    tokio::time::sleep(std::time::Duration::from_secs(delay)).await;
                    retries -= 1;
                    delay *= 2;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Create the optimization tables if they do not exist.
    pub async fn apply_schema(&self) -> Result<(), QueueStoreError> {
        for statement in schema::all_statements() {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("optimization schema applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(Debug, FromRow)]
struct QueueRow {
    id: QueueId,
    instance_id: i64,
    comm_group_id: i64,
    service_provider_id: i64,
    status: String,
    total_cost: Option<Decimal>,
    error_reason: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl QueueRow {
    fn into_model(self) -> Result<OptimizationQueueRow, QueueStoreError> {
        Ok(OptimizationQueueRow {
            id: self.id,
            instance_id: self.instance_id,
            comm_group_id: self.comm_group_id,
            service_provider_id: self.service_provider_id,
            status: QueueStatus::parse(&self.status)?,
            total_cost: self.total_cost,
            error_reason: self.error_reason,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
        })
    }
}

const QUEUE_COLUMNS: &str = "id, instance_id, comm_group_id, service_provider_id, status, \
     total_cost, error_reason, created_at, started_at, completed_at";

#[async_trait]
impl QueueRepository for PgQueueRepository {
    async fn queue(
        &self,
        queue_id: QueueId,
    ) -> Result<Option<OptimizationQueueRow>, QueueStoreError> {
        let row = sqlx::query_as::<_, QueueRow>(&format!(
            "SELECT {} FROM optimization_queue WHERE id = $1",
            QUEUE_COLUMNS
        ))
        .bind(queue_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(QueueRow::into_model).transpose()
    }

    async fn statuses(
        &self,
        queue_ids: &[QueueId],
    ) -> Result<Vec<(QueueId, QueueStatus)>, QueueStoreError> {
        let rows = sqlx::query_as::<_, (QueueId, String)>(
            "SELECT id, status FROM optimization_queue WHERE id = ANY($1) ORDER BY id",
        )
        .bind(queue_ids)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, status)| Ok((id, QueueStatus::parse(&status)?)))
            .collect()
    }

    async fn claim(&self, queue_id: QueueId) -> Result<bool, QueueStoreError> {
        let result = sqlx::query(
            "UPDATE optimization_queue
             SET status = 'RUNNING', started_at = NOW()
             WHERE id = $1 AND status = 'NOT_STARTED'",
        )
        .bind(queue_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn complete_success(
        &self,
        queue_id: QueueId,
        total_cost: Decimal,
    ) -> Result<bool, QueueStoreError> {
        let result = sqlx::query(
            "UPDATE optimization_queue
             SET status = 'COMPLETED_SUCCESS', total_cost = $2, completed_at = NOW()
             WHERE id = $1 AND status = 'RUNNING'",
        )
        .bind(queue_id)
        .bind(total_cost)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn complete_error(
        &self,
        queue_id: QueueId,
        reason: &str,
    ) -> Result<bool, QueueStoreError> {
        let result = sqlx::query(
            "UPDATE optimization_queue
             SET status = 'COMPLETED_ERROR', error_reason = $2, completed_at = NOW()
             WHERE id = $1 AND status = 'RUNNING'",
        )
        .bind(queue_id)
        .bind(reason)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn record_device_results(
        &self,
        queue_id: QueueId,
        rows: &[DeviceResult],
    ) -> Result<(), QueueStoreError> {
        for row in rows {
            sqlx::query(
                "INSERT INTO optimization_device_result
                 (queue_id, device_id, assigned_rate_plan_id, base_cost, overage_cost, total_cost)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(queue_id)
            .bind(row.device_id)
            .bind(row.assigned_rate_plan_id)
            .bind(row.base_cost)
            .bind(row.overage_cost)
            .bind(row.total_cost)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn device_results(
        &self,
        queue_id: QueueId,
    ) -> Result<Vec<DeviceResult>, QueueStoreError> {
        let rows = sqlx::query_as::<_, (i64, i64, Decimal, Decimal, Decimal)>(
            "SELECT device_id, assigned_rate_plan_id, base_cost, overage_cost, total_cost
             FROM optimization_device_result WHERE queue_id = $1 ORDER BY device_id",
        )
        .bind(queue_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(device_id, assigned_rate_plan_id, base_cost, overage_cost, total_cost)| {
                    DeviceResult {
                        device_id,
                        assigned_rate_plan_id,
                        base_cost,
                        overage_cost,
                        total_cost,
                    }
                },
            )
            .collect())
    }

    async fn sequence_plan_ids(
        &self,
        queue_id: QueueId,
    ) -> Result<Vec<RatePlanId>, QueueStoreError> {
        let rows = sqlx::query_as::<_, (RatePlanId,)>(
            "SELECT rate_plan_id FROM optimization_queue_rate_plan
             WHERE queue_id = $1 ORDER BY sequence_order",
        )
        .bind(queue_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn session_queues(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<OptimizationQueueRow>, QueueStoreError> {
        let rows = sqlx::query_as::<_, QueueRow>(&format!(
            "SELECT q.{} FROM optimization_queue q
             JOIN optimization_instance i ON q.instance_id = i.id
             WHERE i.session_id = $1 ORDER BY q.id",
            QUEUE_COLUMNS.replace(", ", ", q.")
        ))
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(QueueRow::into_model).collect()
    }

    async fn abandon_stuck(&self, stuck_after: Duration) -> Result<u64, QueueStoreError> {
        let result = sqlx::query(
            "UPDATE optimization_queue
             SET status = 'ABANDONED'
             WHERE status = 'RUNNING'
               AND started_at < NOW() - make_interval(secs => $1)",
        )
        .bind(stuck_after.num_seconds() as f64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn winning_queues(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<WinningQueue>, QueueStoreError> {
        let rows = sqlx::query_as::<_, (i64, QueueId, Decimal)>(
            "SELECT DISTINCT ON (q.comm_group_id) q.comm_group_id, q.id, q.total_cost
             FROM optimization_queue q
             JOIN optimization_instance i ON q.instance_id = i.id
             WHERE i.session_id = $1 AND q.status = 'COMPLETED_SUCCESS'
             ORDER BY q.comm_group_id, q.total_cost ASC, q.id ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(comm_group_id, queue_id, total_cost)| WinningQueue {
                comm_group_id,
                queue_id,
                total_cost,
            })
            .collect())
    }

    async fn purge_losing_results(
        &self,
        session_id: SessionId,
    ) -> Result<u64, QueueStoreError> {
        let result = sqlx::query(
            "WITH winners AS (
                 SELECT DISTINCT ON (q.comm_group_id) q.id
                 FROM optimization_queue q
                 JOIN optimization_instance i ON q.instance_id = i.id
                 WHERE i.session_id = $1 AND q.status = 'COMPLETED_SUCCESS'
                 ORDER BY q.comm_group_id, q.total_cost ASC, q.id ASC
             )
             DELETE FROM optimization_device_result r
             USING optimization_queue q, optimization_instance i
             WHERE r.queue_id = q.id
               AND q.instance_id = i.id
               AND i.session_id = $1
               AND r.queue_id NOT IN (SELECT id FROM winners)",
        )
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
