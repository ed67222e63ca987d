use anyhow::{Context, Result};
use sea_orm::{Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;

pub mod call;
pub mod call_log;
pub mod human;
pub mod message;
pub mod migration;

pub fn prepare_sqlite_database(database_url: &str) -> Result<()> {
    let Some(path_part) = database_url.strip_prefix("sqlite://") else {
        return Ok(());
    };

    let (path_str, _) = path_part.split_once('?').unwrap_or((path_part, ""));
    if path_str.is_empty() || path_str.starts_with(':') {
        return Ok(());
    }

    let path = std::path::Path::new(path_str);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create directory for database at {}", parent.display())
            })?;
        }
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .with_context(|| format!("failed to create database file at {}", path.display()))?;
    }

    Ok(())
}

/// Connects to the audit database and brings its schema up to date.
pub async fn create_db(database_url: &str) -> Result<DatabaseConnection> {
    prepare_sqlite_database(database_url)?;
    let db = Database::connect(database_url)
        .await
        .with_context(|| format!("failed to connect database: {}", database_url))?;

    migration::Migrator::up(&db, None)
        .await
        .context("failed to run database migrations")?;
    Ok(db)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_sqlite_database_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("line.sqlite3");
        let url = format!("sqlite://{}?mode=rwc", path.display());
        prepare_sqlite_database(&url).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_prepare_sqlite_database_ignores_memory() {
        prepare_sqlite_database("sqlite::memory:").unwrap();
        prepare_sqlite_database("postgres://localhost/line").unwrap();
    }

    #[tokio::test]
    async fn test_create_db_runs_migrations_twice() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("a.sqlite3").display());
        create_db(&url).await.unwrap();
        create_db(&url).await.unwrap();
    }
}
