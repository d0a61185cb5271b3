use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;

pub type DbPool = Pool<Sqlite>;

/// Opens (creating if needed) the database file and brings the schema up to date.
///
/// A single connection serialises writers, which keeps per-row commits from
/// concurrent workers free of SQLITE_BUSY upgrades.
pub async fn create_db(path: &Path) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    configure(&pool).await?;
    run_migrations(&pool).await?;
    tracing::debug!(path = %path.display(), "database opened");

    Ok(pool)
}

/// Private in-memory database; lives as long as the pool's only connection.
pub async fn create_in_memory_db() -> Result<DbPool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    configure(&pool).await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

async fn configure(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(pool)
        .await?;
    Ok(())
}

async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            status TEXT NOT NULL,
            submitted_at TEXT NOT NULL,
            started_at TEXT,
            completed_at TEXT,
            total_count INTEGER NOT NULL,
            processed_count INTEGER NOT NULL DEFAULT 0,
            failed_count INTEGER NOT NULL DEFAULT 0,
            error_summary TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_owner ON jobs(owner_id, submitted_at)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            job_id TEXT,
            source_row INTEGER,
            date TEXT NOT NULL,
            amount TEXT NOT NULL,
            raw_description TEXT NOT NULL,
            sanitized_description TEXT NOT NULL,
            category TEXT,
            category_source TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY (job_id) REFERENCES jobs(id),
            UNIQUE (job_id, source_row)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_transactions_owner ON transactions(owner_id, date)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS category_rules (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id TEXT NOT NULL,
            match_pattern TEXT NOT NULL CHECK (length(match_pattern) > 0),
            target_category TEXT NOT NULL,
            priority INTEGER NOT NULL,
            origin TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE (owner_id, match_pattern)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
