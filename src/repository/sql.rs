use super::entities::{normalize_command, CommandRecord, SubmitStatus, Submission};
use super::interface::CommandRepository;
use super::migrations::COMMANDS;
use crate::clock::Clock;
use crate::error::{RelayError, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

const FILE_POOL_SIZE: u32 = 8;

#[derive(FromRow, Debug)]
struct CommandRow {
    id: i64,
    command: String,
    created_at: i64,
}

impl CommandRow {
    #[inline]
    fn into_record(self) -> CommandRecord {
        CommandRecord {
            id: self.id,
            command: self.command,
            created_at: DateTime::from_timestamp_nanos(self.created_at),
        }
    }
}

#[inline]
fn to_nanos(t: DateTime<Utc>) -> Result<i64> {
    t.timestamp_nanos_opt().ok_or_else(|| {
        RelayError::StorageUnavailable(format!("timestamp {t} is outside storable range"))
    })
}

#[derive(Debug, Clone)]
pub enum DatabaseStorage {
    Ram,
    Path(String),
}

/// Warehouse is the SQLite backed command store.
///
#[derive(Debug, Clone)]
pub struct Warehouse {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    capacity: usize,
}

impl Warehouse {
    /// Creates a new Warehouse connected to SQLite database.
    ///
    /// The in-memory database lives inside a single pooled connection that is
    /// never recycled, so every caller sees the same data.
    ///
    pub async fn new(dbs: DatabaseStorage, capacity: usize, clock: Arc<dyn Clock>) -> Result<Self> {
        let pool_options = match &dbs {
            DatabaseStorage::Ram => SqlitePoolOptions::new()
                .min_connections(1)
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None),
            DatabaseStorage::Path(_) => SqlitePoolOptions::new().max_connections(FILE_POOL_SIZE),
        };
        let url = match dbs {
            DatabaseStorage::Ram => "sqlite::memory:".to_string(),
            DatabaseStorage::Path(s) => s,
        };
        let options = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);
        let pool = pool_options.connect_with(options).await?;
        Ok(Self {
            pool,
            clock,
            capacity,
        })
    }
}

impl CommandRepository for Warehouse {
    async fn migrate(&mut self) -> Result<()> {
        let Ok(mut conn) = self.pool.acquire().await else {
            return Err(RelayError::StorageUnavailable(
                "cannot acquire connection".to_string(),
            ));
        };
        for migration in COMMANDS {
            sqlx::query(migration).execute(&mut *conn).await?;
        }
        Ok(())
    }

    /// Upserts the command by its text inside one transaction.
    ///
    /// The transaction opens with a write so the write lock is held before
    /// anything is read, the clock included. Timestamps then follow commit
    /// order. Returning early drops the transaction, which rolls it back.
    ///
    async fn submit(&self, text: &str) -> Result<Submission> {
        let command = normalize_command(text)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE sequences SET value = value WHERE name = 'commands'")
            .execute(&mut *tx)
            .await?;

        let stamp = to_nanos(self.clock.now())?;

        let refreshed = sqlx::query_as::<_, CommandRow>(
            "UPDATE commands SET created_at = ?1 WHERE command = ?2 RETURNING id, command, created_at",
        )
        .bind(stamp)
        .bind(command)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(row) = refreshed {
            tx.commit().await?;
            let record = row.into_record();
            debug!(id = record.id, command = %record.command, "command refreshed");
            return Ok(Submission {
                status: SubmitStatus::Updated,
                record,
                evicted: None,
            });
        }

        let (id,): (i64,) = sqlx::query_as(
            "UPDATE sequences SET value = value + 1 WHERE name = 'commands' RETURNING value",
        )
        .fetch_one(&mut *tx)
        .await?;

        let record = sqlx::query_as::<_, CommandRow>(
            "INSERT INTO commands (id, command, created_at) VALUES (?1, ?2, ?3) RETURNING id, command, created_at",
        )
        .bind(id)
        .bind(command)
        .bind(stamp)
        .fetch_one(&mut *tx)
        .await?
        .into_record();

        let (live,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM commands")
            .fetch_one(&mut *tx)
            .await?;

        let mut evicted = None;
        if live as usize > self.capacity {
            evicted = sqlx::query_as::<_, CommandRow>(
                r#"
                DELETE FROM commands
                WHERE id = (SELECT id FROM commands ORDER BY created_at ASC, id ASC LIMIT 1)
                RETURNING id, command, created_at"#,
            )
            .fetch_optional(&mut *tx)
            .await?
            .map(CommandRow::into_record);
        }

        tx.commit().await?;

        debug!(id = record.id, command = %record.command, "command inserted");
        if let Some(old) = &evicted {
            info!(
                id = old.id,
                command = %old.command,
                capacity = self.capacity,
                "evicted oldest command"
            );
        }

        Ok(Submission {
            status: SubmitStatus::Inserted,
            record,
            evicted,
        })
    }

    async fn latest(&self) -> Result<Option<CommandRecord>> {
        let row = sqlx::query_as::<_, CommandRow>(
            "SELECT id, command, created_at FROM commands ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(CommandRow::into_record))
    }

    /// Gets all live commands, most recent first.
    ///
    async fn list(&self) -> Result<Vec<CommandRecord>> {
        let rows = sqlx::query_as::<_, CommandRow>(
            "SELECT id, command, created_at FROM commands ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(CommandRow::into_record).collect())
    }

    async fn delete_by_id(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM commands WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count(&self) -> Result<usize> {
        let (live,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM commands")
            .fetch_one(&self.pool)
            .await?;

        Ok(live as usize)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
