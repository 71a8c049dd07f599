use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

use crawlbot_core::{CrawlError, CrawlTask, CrawledPage, IndexFailure, NodeHeartbeat, SearchRecord, TaskStatus};

/// Durable task-lifecycle / document-snapshot / dead-letter / heartbeat /
/// search-history store. A concrete handle over a single pooled connection,
/// not a trait — the spec fixes this collaborator's shape directly.
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub async fn connect(url: &str) -> Result<Self, CrawlError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect(url)
            .await
            .map_err(|e| CrawlError::Storage(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Ephemeral, dependency-free store for tests: each call gets its own
    /// private in-memory database.
    pub async fn open_in_memory() -> Result<Self, CrawlError> {
        let storage = Self::connect("sqlite::memory:").await?;
        storage.run_migrations().await?;
        Ok(storage)
    }

    pub async fn run_migrations(&self) -> Result<(), CrawlError> {
        sqlx::raw_sql(include_str!("../migrations/001_init.sql"))
            .execute(&self.pool)
            .await
            .map_err(|e| CrawlError::Storage(e.to_string()))?;
        info!("storage migrations applied");
        Ok(())
    }

    pub async fn check_connectivity(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    // ---- task lifecycle -------------------------------------------------

    pub async fn insert_task(&self, task: &CrawlTask) -> Result<(), CrawlError> {
        sqlx::query(
            "INSERT INTO task_status (task_id, seed_url, depth, politeness_seconds, status, created_at, started_at, finished_at, error, origin_task_id)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(task.task_id.to_string())
        .bind(&task.seed_url)
        .bind(task.depth as i64)
        .bind(task.politeness_seconds)
        .bind(task.status.as_str())
        .bind(task.created_at.to_rfc3339())
        .bind(task.started_at.map(|t| t.to_rfc3339()))
        .bind(task.finished_at.map(|t| t.to_rfc3339()))
        .bind(&task.error)
        .bind(task.origin_task_id.map(|id| id.to_string()))
        .execute(&self.pool)
        .await
        .map_err(|e| CrawlError::Storage(e.to_string()))?;
        Ok(())
    }

    pub async fn get_task(&self, task_id: Uuid) -> Result<Option<CrawlTask>, CrawlError> {
        let row = sqlx::query_as::<_, TaskRow>("SELECT * FROM task_status WHERE task_id = ?")
            .bind(task_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CrawlError::Storage(e.to_string()))?;
        row.map(TaskRow::into_task).transpose()
    }

    /// Transition a task's status, but only if it is still in the status the
    /// caller expects. Guards against the worker-vs-supervisor race on a
    /// timed-out task: the write that loses the race is a no-op (`Ok(false)`).
    pub async fn transition_task(
        &self,
        task_id: Uuid,
        expected_prior: TaskStatus,
        new_status: TaskStatus,
        now: DateTime<Utc>,
        error: Option<&str>,
    ) -> Result<bool, CrawlError> {
        let timestamp_column = match new_status {
            TaskStatus::Started => "started_at",
            _ => "finished_at",
        };
        let query = format!(
            "UPDATE task_status SET status = ?, {timestamp_column} = ?, error = ? WHERE task_id = ? AND status = ?"
        );
        let result = sqlx::query(&query)
            .bind(new_status.as_str())
            .bind(now.to_rfc3339())
            .bind(error)
            .bind(task_id.to_string())
            .bind(expected_prior.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| CrawlError::Storage(e.to_string()))?;
        Ok(result.rows_affected() == 1)
    }

    /// Start a task for execution, accepting either a fresh `queued` task or
    /// a supervisor-requeued one — both are eligible for a worker to pick up.
    pub async fn start_task(&self, task_id: Uuid, now: DateTime<Utc>) -> Result<bool, CrawlError> {
        let result = sqlx::query(
            "UPDATE task_status SET status = 'started', started_at = ? WHERE task_id = ? AND status IN ('queued', 'requeued')",
        )
        .bind(now.to_rfc3339())
        .bind(task_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| CrawlError::Storage(e.to_string()))?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn find_stale_tasks(&self, created_before: DateTime<Utc>) -> Result<Vec<CrawlTask>, CrawlError> {
        let rows = sqlx::query_as::<_, TaskRow>(
            "SELECT * FROM task_status WHERE status IN ('queued', 'started') AND created_at < ?",
        )
        .bind(created_before.to_rfc3339())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CrawlError::Storage(e.to_string()))?;
        rows.into_iter().map(TaskRow::into_task).collect()
    }

    pub async fn count_tasks_by_status(&self) -> Result<HashMap<String, i64>, CrawlError> {
        let rows: Vec<(String, i64)> = sqlx::query_as("SELECT status, COUNT(*) FROM task_status GROUP BY status")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CrawlError::Storage(e.to_string()))?;
        Ok(rows.into_iter().collect())
    }

    pub async fn count_tasks(&self) -> Result<i64, CrawlError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM task_status")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| CrawlError::Storage(e.to_string()))?;
        Ok(count)
    }

    // ---- crawled pages ----------------------------------------------------

    pub async fn upsert_page(&self, page: &CrawledPage) -> Result<(), CrawlError> {
        sqlx::query(
            "INSERT INTO crawled_pages (url, text, depth, timestamp) VALUES (?, ?, ?, ?)
             ON CONFLICT(url) DO UPDATE SET text = excluded.text, depth = excluded.depth, timestamp = excluded.timestamp",
        )
        .bind(&page.url)
        .bind(&page.text)
        .bind(page.depth as i64)
        .bind(page.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| CrawlError::Storage(e.to_string()))?;
        Ok(())
    }

    pub async fn get_page_count(&self) -> Result<i64, CrawlError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM crawled_pages")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| CrawlError::Storage(e.to_string()))?;
        Ok(count)
    }

    pub async fn get_page(&self, url: &str) -> Result<Option<CrawledPage>, CrawlError> {
        let row: Option<(String, String, i64, String)> =
            sqlx::query_as("SELECT url, text, depth, timestamp FROM crawled_pages WHERE url = ?")
                .bind(url)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| CrawlError::Storage(e.to_string()))?;

        row.map(|(url, text, depth, timestamp)| {
            Ok(CrawledPage {
                url,
                text,
                depth: depth as u32,
                timestamp: parse_rfc3339(&timestamp)?,
            })
        })
        .transpose()
    }

    // ---- index failures / dead letters -------------------------------------

    pub async fn insert_index_failure(&self, failure: &IndexFailure) -> Result<(), CrawlError> {
        sqlx::query(
            "INSERT INTO index_failures (doc_id, body, error, retry_count, timestamp) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&failure.doc_id)
        .bind(&failure.body)
        .bind(&failure.error)
        .bind(failure.retry_count as i64)
        .bind(failure.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| CrawlError::Storage(e.to_string()))?;
        warn!(doc_id = %failure.doc_id, "recorded index/blob failure");
        Ok(())
    }

    pub async fn count_index_failures(&self) -> Result<i64, CrawlError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM index_failures")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| CrawlError::Storage(e.to_string()))?;
        Ok(count)
    }

    // ---- node heartbeats --------------------------------------------------

    pub async fn upsert_node_status(&self, hb: &NodeHeartbeat) -> Result<(), CrawlError> {
        sqlx::query(
            "INSERT INTO node_status (node_id, active, last_seen) VALUES (?, ?, ?)
             ON CONFLICT(node_id) DO UPDATE SET active = excluded.active, last_seen = excluded.last_seen",
        )
        .bind(&hb.node_id)
        .bind(hb.active)
        .bind(hb.last_seen.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| CrawlError::Storage(e.to_string()))?;
        Ok(())
    }

    pub async fn active_node_count(&self) -> Result<i64, CrawlError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM node_status WHERE active = 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| CrawlError::Storage(e.to_string()))?;
        Ok(count)
    }

    // ---- search history -----------------------------------------------------

    pub async fn insert_search_record(&self, record: &SearchRecord) -> Result<(), CrawlError> {
        let results_json = serde_json::to_string(&record.results).map_err(|e| CrawlError::Storage(e.to_string()))?;
        sqlx::query("INSERT INTO search_history (keywords, mode, size, results, timestamp) VALUES (?, ?, ?, ?, ?)")
            .bind(&record.keywords)
            .bind(&record.mode)
            .bind(record.size as i64)
            .bind(results_json)
            .bind(record.timestamp.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| CrawlError::Storage(e.to_string()))?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    task_id: String,
    seed_url: String,
    depth: i64,
    politeness_seconds: f64,
    status: String,
    created_at: String,
    started_at: Option<String>,
    finished_at: Option<String>,
    error: Option<String>,
    origin_task_id: Option<String>,
}

impl TaskRow {
    fn into_task(self) -> Result<CrawlTask, CrawlError> {
        Ok(CrawlTask {
            task_id: Uuid::parse_str(&self.task_id).map_err(|e| CrawlError::Storage(e.to_string()))?,
            seed_url: self.seed_url,
            depth: self.depth as u32,
            politeness_seconds: self.politeness_seconds,
            status: TaskStatus::from_str(&self.status)?,
            created_at: parse_rfc3339(&self.created_at)?,
            started_at: self.started_at.as_deref().map(parse_rfc3339).transpose()?,
            finished_at: self.finished_at.as_deref().map(parse_rfc3339).transpose()?,
            error: self.error,
            origin_task_id: self
                .origin_task_id
                .as_deref()
                .map(Uuid::parse_str)
                .transpose()
                .map_err(|e| CrawlError::Storage(e.to_string()))?,
        })
    }
}

fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>, CrawlError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CrawlError::Storage(e.to_string()))
}
