// ABOUTME: Persistence of provisioning records and the durable rule priority sequence
// ABOUTME: SQLite-backed store with embedded migrations, one row per project

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::{debug, info};

use crate::error::{RoutingError, StorageError};
use crate::priority::{wrap_priority, RulePriorityAllocator, MAX_RULE_PRIORITY};
use crate::types::ProvisioningRecord;

pub type Result<T> = std::result::Result<T, StorageError>;

/// Connections kept by a file-backed pool
const MAX_CONNECTIONS: u32 = 5;

const SELECT_RECORD: &str = r#"
    SELECT project_id, service_arn, task_arn, target_group1_arn, target_group2_arn,
           listener_rule_arn1, listener_rule_arn2, created_at, updated_at
    FROM running_task
    WHERE project_id = ?1
"#;

/// Provisioning record persistence
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, project_id: &str) -> Result<Option<ProvisioningRecord>>;

    /// Insert an empty record; fails with `AlreadyExists` if the project has one
    async fn create(&self, project_id: &str) -> Result<ProvisioningRecord>;

    /// Overwrite the identifiers of an existing record and bump `updated_at`
    async fn update(&self, record: &ProvisioningRecord) -> Result<ProvisioningRecord>;

    /// Remove the record, returning whether one existed
    async fn delete(&self, project_id: &str) -> Result<bool>;
}

fn is_memory_url(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

fn parse_timestamp(value: &str, column: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| StorageError::InvalidData(format!("invalid {} timestamp: {}", column, value)))
}

fn row_to_record(row: &SqliteRow) -> Result<ProvisioningRecord> {
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(ProvisioningRecord {
        project_id: row.try_get("project_id")?,
        service_id: row.try_get("service_arn")?,
        task_definition_id: row.try_get("task_arn")?,
        target_group1_id: row.try_get("target_group1_arn")?,
        target_group2_id: row.try_get("target_group2_arn")?,
        listener_rule1_id: row.try_get("listener_rule_arn1")?,
        listener_rule2_id: row.try_get("listener_rule_arn2")?,
        created_at: parse_timestamp(&created_at, "created_at")?,
        updated_at: parse_timestamp(&updated_at, "updated_at")?,
    })
}

/// SQLite implementation of `RecordStore`
#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    /// Open (creating if needed) the database at `database_url` and run migrations
    pub async fn connect(database_url: &str) -> Result<Self> {
        let in_memory = is_memory_url(database_url);

        if !in_memory && !sqlx::Sqlite::database_exists(database_url).await? {
            debug!("Creating database at: {}", database_url);
            sqlx::Sqlite::create_database(database_url).await?;
        }

        let mut options =
            SqlitePoolOptions::new().acquire_timeout(std::time::Duration::from_secs(30));

        // Every connection to an in-memory URL opens its own empty database,
        // so the single connection must never be recycled
        options = if in_memory {
            options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            options.max_connections(MAX_CONNECTIONS)
        };

        let pool = options.connect(database_url).await?;

        if !in_memory {
            sqlx::query("PRAGMA journal_mode = WAL")
                .execute(&pool)
                .await?;
        }

        sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&pool)
            .await?;

        info!("Database connection established");

        Self::from_pool(pool).await
    }

    /// Wrap an existing pool, running migrations against it
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        debug!("Database migrations completed");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Durable priority allocator sharing this store's database
    pub fn priority_allocator(&self) -> SqlitePriorityAllocator {
        SqlitePriorityAllocator::new(self.pool.clone())
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn get(&self, project_id: &str) -> Result<Option<ProvisioningRecord>> {
        let row = sqlx::query(SELECT_RECORD)
            .bind(project_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn create(&self, project_id: &str) -> Result<ProvisioningRecord> {
        let record = ProvisioningRecord::new(project_id);

        let result = sqlx::query(
            r#"
            INSERT INTO running_task (project_id, created_at, updated_at)
            VALUES (?1, ?2, ?3)
            "#,
        )
        .bind(&record.project_id)
        .bind(record.created_at.to_rfc3339())
        .bind(record.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!("Created provisioning record for project {}", project_id);
                Ok(record)
            }
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StorageError::AlreadyExists(project_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update(&self, record: &ProvisioningRecord) -> Result<ProvisioningRecord> {
        let mut updated = record.clone();
        updated.updated_at = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE running_task
            SET service_arn = ?1, task_arn = ?2,
                target_group1_arn = ?3, target_group2_arn = ?4,
                listener_rule_arn1 = ?5, listener_rule_arn2 = ?6,
                updated_at = ?7
            WHERE project_id = ?8
            "#,
        )
        .bind(&updated.service_id)
        .bind(&updated.task_definition_id)
        .bind(&updated.target_group1_id)
        .bind(&updated.target_group2_id)
        .bind(&updated.listener_rule1_id)
        .bind(&updated.listener_rule2_id)
        .bind(updated.updated_at.to_rfc3339())
        .bind(&updated.project_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(updated.project_id));
        }

        Ok(updated)
    }

    async fn delete(&self, project_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM running_task WHERE project_id = ?1")
            .bind(project_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Listener rule priorities drawn from a persisted sequence
///
/// The increment and read happen in one statement, so concurrent callers and
/// separate processes sharing the database never receive the same value until
/// the sequence wraps past `MAX_RULE_PRIORITY`.
#[derive(Clone)]
pub struct SqlitePriorityAllocator {
    pool: SqlitePool,
}

impl SqlitePriorityAllocator {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RulePriorityAllocator for SqlitePriorityAllocator {
    async fn next_priority(&self) -> std::result::Result<i32, RoutingError> {
        let value: i64 = sqlx::query_scalar(
            r#"
            UPDATE rule_priority_sequence
            SET next_value = (next_value % ?1) + 1
            WHERE id = 1
            RETURNING next_value
            "#,
        )
        .bind(MAX_RULE_PRIORITY)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RoutingError::PriorityAllocation(e.to_string()))?;

        Ok(wrap_priority(value))
    }
}
