mod models;
pub mod query;
mod seeders;

pub use models::*;
pub use query::{ListQuery, Page, Pagination};
pub use seeders::seed_sample_data;

use anyhow::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

pub type DbPool = SqlitePool;

/// Execute a SQL migration file, properly handling comments
async fn execute_sql(pool: &SqlitePool, sql: &str) -> Result<()> {
    for statement in sql.split(';') {
        let cleaned: String = statement
            .lines()
            .filter(|line| !line.trim().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n");
        let trimmed = cleaned.trim();
        if !trimmed.is_empty() {
            sqlx::query(trimmed).execute(pool).await?;
        }
    }
    Ok(())
}

pub async fn init(data_dir: &Path) -> Result<DbPool> {
    let db_path = data_dir.join("portal.db");
    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    info!("Initializing database at {}", db_path.display());

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;

    run_migrations(&pool).await?;

    info!("Database initialized successfully");
    Ok(pool)
}

/// In-memory database with the full schema. A single connection keeps every
/// query on the same memory instance.
pub async fn init_memory() -> Result<DbPool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;

    run_migrations(&pool).await?;
    Ok(pool)
}

async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    info!("Running database migrations...");

    execute_sql(pool, include_str!("../../migrations/001_initial.sql")).await?;
    execute_sql(pool, include_str!("../../migrations/002_properties_leases.sql")).await?;
    execute_sql(
        pool,
        include_str!("../../migrations/003_finance_documents_audit.sql"),
    )
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_db_has_schema() {
        let pool = init_memory().await.unwrap();
        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        let names: Vec<String> = tables.into_iter().map(|(n,)| n).collect();

        for expected in [
            "audit_logs",
            "documents",
            "leases",
            "organizations",
            "properties",
            "sessions",
            "tenant_applications",
            "transactions",
            "users",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing table {}", expected);
        }
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = init_memory().await.unwrap();
        run_migrations(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn test_file_db_init() {
        let dir = tempfile::tempdir().unwrap();
        let pool = init(dir.path()).await.unwrap();
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
        assert!(dir.path().join("portal.db").exists());
    }
}
