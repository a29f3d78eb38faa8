use std::{str::FromStr, time::Duration};

use sqlx::{
    Error, Pool, Sqlite,
    migrate::Migrator,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
};

pub mod models;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const MIGRATION_ATTEMPTS: u32 = 3;

/// Shared handle to the SQLite database holding tasks and the message queue.
///
/// Both binaries open the same file: the API writes tasks and publishes queue
/// messages, the event processor claims them.
#[derive(Clone)]
pub struct DBService {
    pub pool: Pool<Sqlite>,
}

impl DBService {
    fn pool_options() -> SqlitePoolOptions {
        SqlitePoolOptions::new()
            .max_connections(20)
            .min_connections(1)
            .idle_timeout(Duration::from_secs(300))
            .acquire_timeout(Duration::from_secs(30))
    }

    fn connect_options(database_url: &str) -> Result<SqliteConnectOptions, Error> {
        Ok(SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30))
            .synchronous(SqliteSynchronous::Normal))
    }

    /// Opens the database at `DATABASE_URL` (or the asset dir default) and
    /// applies pending migrations.
    pub async fn new() -> Result<DBService, Error> {
        let database_url = utils::assets::database_url()?;
        Self::connect(&database_url).await
    }

    pub async fn connect(database_url: &str) -> Result<DBService, Error> {
        tracing::debug!("Opening database {}", database_url);
        let pool = Self::pool_options()
            .connect_with(Self::connect_options(database_url)?)
            .await?;
        Self::migrate(&pool).await?;
        sqlx::query("PRAGMA optimize").execute(&pool).await?;
        Ok(DBService { pool })
    }

    /// Single-connection in-memory database with migrations applied. Every
    /// connection to `sqlite::memory:` is a separate database, hence the
    /// pool size of one.
    pub async fn new_in_memory() -> Result<DBService, Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        MIGRATOR.run(&pool).await?;
        Ok(DBService { pool })
    }

    /// Both binaries migrate the same file on start-up and sqlx does not lock
    /// SQLite migrations, so a process that loses the race retries once the
    /// winner has committed.
    async fn migrate(pool: &Pool<Sqlite>) -> Result<(), Error> {
        let mut attempt = 1;
        loop {
            match MIGRATOR.run(pool).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < MIGRATION_ATTEMPTS => {
                    tracing::warn!(attempt, error = %e, "Migration failed, retrying");
                    tokio::time::sleep(Duration::from_millis(250 * u64::from(attempt))).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_concurrent_connects_share_one_schema() {
        let path =
            std::env::temp_dir().join(format!("taskforge-{}.sqlite", uuid::Uuid::new_v4()));
        let url = format!("sqlite://{}", path.to_string_lossy());

        let (api, processor) = tokio::join!(DBService::connect(&url), DBService::connect(&url));
        let api = api.unwrap();
        let processor = processor.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queue_messages")
            .fetch_one(&processor.pool)
            .await
            .unwrap();
        assert_eq!(count, 0);

        api.pool.close().await;
        processor.pool.close().await;
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{suffix}", path.to_string_lossy()));
        }
    }
}
