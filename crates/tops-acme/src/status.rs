//! Durable progress of background ACME jobs, polled by clients through
//! `/async_status/{id}`.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::*;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tops_core::{ApiError, ApiResult, StatusCode, UtcDateTime};
use tops_database::DbConnection;
use tops_entities::async_status;
use tops_queue::{FnTask, QueueError, TaskQueue};
use tracing::{error, info, warn};
use utoipa::ToSchema;

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_SUCCEEDED: &str = "succeeded";
pub const STATUS_FAILED: &str = "failed";

pub const JOB_STARTED_MESSAGE: &str = "ACME async job has started.";
pub const JOB_CANCELLED_MESSAGE: &str = "ACME async job was cancelled before it started.";

pub const ASYNC_STATUS_PATH: &str = "/api/5.0/async_status";

/// Polling location of job `id`.
pub fn status_location(id: i32) -> String {
    format!("{ASYNC_STATUS_PATH}/{id}")
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct AsyncJobStatus {
    pub id: i32,
    pub status: String,
    pub message: Option<String>,
    #[schema(value_type = String, format = DateTime)]
    pub start_time: UtcDateTime,
    #[schema(value_type = Option<String>, format = DateTime)]
    pub end_time: Option<UtcDateTime>,
}

impl From<async_status::Model> for AsyncJobStatus {
    fn from(model: async_status::Model) -> Self {
        Self {
            id: model.id,
            status: model.status,
            message: model.message,
            start_time: model.start_time,
            end_time: model.end_time,
        }
    }
}

#[derive(Clone)]
pub struct AsyncStatusStore {
    db: Arc<DbConnection>,
}

impl AsyncStatusStore {
    pub fn new(db: Arc<DbConnection>) -> Self {
        Self { db }
    }

    /// New `pending` job.
    pub async fn create(&self, message: &str) -> Result<i32, DbErr> {
        let model = async_status::ActiveModel {
            status: Set(STATUS_PENDING.to_string()),
            message: Set(Some(message.to_string())),
            start_time: Set(Utc::now()),
            end_time: Set(None),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await?;
        Ok(model.id)
    }

    pub async fn update_message(&self, id: i32, message: &str) -> Result<(), DbErr> {
        async_status::Entity::update_many()
            .col_expr(async_status::Column::Message, Expr::value(message))
            .filter(async_status::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }

    /// Terminal status. Later updates are ignored.
    pub async fn finish(&self, id: i32, status: &str, message: &str) -> Result<(), DbErr> {
        async_status::Entity::update_many()
            .col_expr(async_status::Column::Status, Expr::value(status))
            .col_expr(async_status::Column::Message, Expr::value(message))
            .col_expr(async_status::Column::EndTime, Expr::value(Utc::now()))
            .filter(async_status::Column::Id.eq(id))
            .filter(async_status::Column::Status.eq(STATUS_PENDING))
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }

    pub async fn get(&self, id: i32) -> Result<Option<AsyncJobStatus>, DbErr> {
        Ok(async_status::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .map(AsyncJobStatus::from))
    }
}

/// Handle returned to the caller of a background job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct JobTicket {
    pub id: i32,
    pub location: String,
}

fn queue_error_to_api(error: QueueError) -> ApiError {
    match error {
        QueueError::Full { .. } => ApiError::user(StatusCode::SERVICE_UNAVAILABLE, error.to_string()),
        QueueError::Closed => ApiError::system(error.to_string()),
    }
}

/// Creates a `pending` status row and queues `work` with its id. When the
/// queue refuses the job, or shuts down before the job starts, the row is
/// failed instead.
pub async fn submit_tracked<F, Fut>(
    store: &AsyncStatusStore,
    queue: &dyn TaskQueue,
    name: &str,
    work: F,
) -> ApiResult<JobTicket>
where
    F: FnOnce(i32, CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let id = store
        .create(JOB_STARTED_MESSAGE)
        .await
        .map_err(|e| ApiError::system(e.to_string()))?;

    let job_store = store.clone();
    let task = FnTask::new(format!("{name}-{id}"), move |cancel: CancellationToken| async move {
        if cancel.is_cancelled() {
            warn!("async job {} cancelled before it started", id);
            if let Err(e) = job_store.finish(id, STATUS_FAILED, JOB_CANCELLED_MESSAGE).await {
                error!("could not fail async status {}: {}", id, e);
            }
            return;
        }
        work(id, cancel).await
    });
    match queue.submit(Box::new(task)) {
        Ok(job) => {
            info!("queued {} as job {} (status {})", name, job, id);
            Ok(JobTicket {
                id,
                location: status_location(id),
            })
        }
        Err(e) => {
            error!("could not queue {}: {}", name, e);
            if let Err(db_err) = store
                .finish(id, STATUS_FAILED, &format!("ACME async job could not be queued: {e}"))
                .await
            {
                error!("could not fail async status {}: {}", id, db_err);
            }
            Err(queue_error_to_api(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;
    use tops_database::test_utils::TestDatabase;
    use tops_queue::WorkerPool;

    #[tokio::test]
    async fn job_moves_from_pending_to_a_terminal_state() {
        let test_db = TestDatabase::with_migrations().await.unwrap();
        let store = AsyncStatusStore::new(test_db.db.clone());

        let id = store.create("ACME async job has started.").await.unwrap();
        let pending = store.get(id).await.unwrap().unwrap();
        assert_eq!(pending.status, STATUS_PENDING);
        assert!(pending.end_time.is_none());

        store.update_message(id, "1 of 2 processed").await.unwrap();
        store.finish(id, STATUS_SUCCEEDED, "done").await.unwrap();
        store.finish(id, STATUS_FAILED, "too late").await.unwrap();

        let finished = store.get(id).await.unwrap().unwrap();
        assert_eq!(finished.status, STATUS_SUCCEEDED);
        assert_eq!(finished.message.as_deref(), Some("done"));
        assert!(finished.end_time.is_some());
    }

    #[tokio::test]
    async fn unknown_job_is_none() {
        let test_db = TestDatabase::with_migrations().await.unwrap();
        let store = AsyncStatusStore::new(test_db.db.clone());
        assert!(store.get(42).await.unwrap().is_none());
        assert_eq!(status_location(42), "/api/5.0/async_status/42");
    }

    #[tokio::test]
    async fn tracked_job_runs_with_its_status_id() {
        let test_db = TestDatabase::with_migrations().await.unwrap();
        let store = AsyncStatusStore::new(test_db.db.clone());
        let pool = WorkerPool::new(1, 2);
        let (done_tx, done_rx) = oneshot::channel();

        let job_store = store.clone();
        let ticket = submit_tracked(&store, pool.as_ref(), "test-job", move |id, _| async move {
            job_store.finish(id, STATUS_SUCCEEDED, "finished").await.unwrap();
            let _ = done_tx.send(id);
        })
        .await
        .unwrap();

        let ran_as = tokio::time::timeout(Duration::from_secs(5), done_rx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ran_as, ticket.id);
        assert_eq!(ticket.location, status_location(ticket.id));
        assert_eq!(store.get(ticket.id).await.unwrap().unwrap().status, STATUS_SUCCEEDED);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn refused_job_fails_its_status_row() {
        let test_db = TestDatabase::with_migrations().await.unwrap();
        let store = AsyncStatusStore::new(test_db.db.clone());
        let pool = WorkerPool::new(1, 1);
        pool.shutdown().await;

        let err = submit_tracked(&store, pool.as_ref(), "late-job", |_, _| async {})
            .await
            .unwrap_err();

        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let row = store.get(1).await.unwrap().unwrap();
        assert_eq!(row.status, STATUS_FAILED);
    }

    #[tokio::test]
    async fn job_still_queued_at_shutdown_is_failed() {
        let test_db = TestDatabase::with_migrations().await.unwrap();
        let store = AsyncStatusStore::new(test_db.db.clone());
        let pool = WorkerPool::new(1, 4);
        let (started_tx, started_rx) = oneshot::channel::<()>();

        submit_tracked(&store, pool.as_ref(), "blocker", move |_, cancel| async move {
            let _ = started_tx.send(());
            cancel.cancelled().await;
        })
        .await
        .unwrap();
        started_rx.await.unwrap();

        let queued = submit_tracked(&store, pool.as_ref(), "queued", |_, _| async {})
            .await
            .unwrap();

        pool.shutdown().await;

        let row = store.get(queued.id).await.unwrap().unwrap();
        assert_eq!(row.status, STATUS_FAILED);
        assert_eq!(row.message.as_deref(), Some(JOB_CANCELLED_MESSAGE));
        assert!(row.end_time.is_some());
    }
}
