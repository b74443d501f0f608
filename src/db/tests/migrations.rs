use crate::db::*;
use tempfile::{NamedTempFile, tempdir};

#[tokio::test]
async fn test_database_creation() {
    let temp_file = NamedTempFile::new().unwrap();
    let file_dir = tempdir().unwrap();

    let db = Database::new(temp_file.path(), file_dir.path())
        .await
        .unwrap();

    // Verify tables exist
    let mut conn = db.pool.acquire().await.unwrap();

    let tables: Vec<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .fetch_all(&mut *conn)
            .await
            .unwrap();

    assert!(tables.contains(&"messages".to_string()));
    assert!(tables.contains(&"files".to_string()));
    assert!(tables.contains(&"schema_version".to_string()));

    drop(conn);
    db.close().await;
}

#[tokio::test]
async fn test_migrations_are_idempotent() {
    let temp_file = NamedTempFile::new().unwrap();
    let file_dir = tempdir().unwrap();

    let db = Database::new(temp_file.path(), file_dir.path())
        .await
        .unwrap();
    assert_eq!(db.schema_version().await.unwrap(), 1);
    db.close().await;

    // Reopening must not re-apply v1
    let db = Database::new(temp_file.path(), file_dir.path())
        .await
        .unwrap();
    assert_eq!(db.schema_version().await.unwrap(), 1);

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_version")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(applied, 1);

    db.close().await;
}

#[tokio::test]
async fn test_creates_missing_parent_directory() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("nested").join("mirror.db");

    let db = Database::new(&db_path, dir.path().join("files"))
        .await
        .unwrap();
    assert!(db_path.exists());

    db.close().await;
}
