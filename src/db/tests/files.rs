use crate::db::*;
use crate::storage::{FileMetadata, Storage};
use crate::types::FileMeta;
use tempfile::{NamedTempFile, tempdir};

fn metadata(id: &str, name: Option<&str>) -> FileMetadata {
    let meta = FileMeta {
        id: Some(id.to_string()),
        name: name.map(str::to_string),
        mimetype: Some("text/plain".to_string()),
        ..Default::default()
    };
    FileMetadata::from_meta(&meta, Some("C1")).unwrap()
}

#[tokio::test]
async fn test_save_file_writes_bytes_and_row() {
    let temp_file = NamedTempFile::new().unwrap();
    let file_dir = tempdir().unwrap();
    let db = Database::new(temp_file.path(), file_dir.path().join("files"))
        .await
        .unwrap();

    assert!(!db.has_file("F1").await.unwrap());

    let path = db
        .store_file(b"hello", &metadata("F1", Some("notes.txt")))
        .await
        .unwrap();

    assert_eq!(path, file_dir.path().join("files").join("F1_notes.txt"));
    assert_eq!(std::fs::read(&path).unwrap(), b"hello");
    assert!(db.has_file("F1").await.unwrap());

    let row = db.get_file("F1").await.unwrap().unwrap();
    assert_eq!(row.name.as_deref(), Some("notes.txt"));
    assert_eq!(row.channel.as_deref(), Some("C1"));
    assert_eq!(row.size_bytes, 5);
    let raw: FileMeta = serde_json::from_str(&row.raw).unwrap();
    assert_eq!(raw.mimetype.as_deref(), Some("text/plain"));

    db.close().await;
}

#[tokio::test]
async fn test_save_file_is_upsert() {
    let temp_file = NamedTempFile::new().unwrap();
    let file_dir = tempdir().unwrap();
    let db = Database::new(temp_file.path(), file_dir.path())
        .await
        .unwrap();

    let meta = metadata("F1", Some("a.bin"));
    db.save_file(b"first", &meta).await.unwrap();
    db.save_file(b"second!", &meta).await.unwrap();

    let rows = db.list_files("C1").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].size_bytes, 7);
    assert_eq!(
        std::fs::read(file_dir.path().join("F1_a.bin")).unwrap(),
        b"second!"
    );

    db.close().await;
}

#[tokio::test]
async fn test_unnamed_file_and_unsafe_names() {
    let temp_file = NamedTempFile::new().unwrap();
    let file_dir = tempdir().unwrap();
    let db = Database::new(temp_file.path(), file_dir.path())
        .await
        .unwrap();

    let unnamed = db.store_file(b"x", &metadata("F2", None)).await.unwrap();
    assert_eq!(unnamed, file_dir.path().join("F2_unknown"));

    let nested = db
        .store_file(b"y", &metadata("F3", Some("../etc/passwd")))
        .await
        .unwrap();
    assert_eq!(nested.parent().unwrap(), file_dir.path());
    assert_eq!(nested.file_name().unwrap(), "F3_.._etc_passwd");

    db.close().await;
}

#[tokio::test]
async fn test_unsafe_file_id_stays_inside_file_dir() {
    let temp_file = NamedTempFile::new().unwrap();
    let root = tempdir().unwrap();
    let file_dir = root.path().join("a").join("files");
    let db = Database::new(temp_file.path(), file_dir.clone())
        .await
        .unwrap();

    let path = db
        .store_file(b"contained", &metadata("../../escaped", Some("x.txt")))
        .await
        .unwrap();

    assert_eq!(path.parent().unwrap(), file_dir);
    assert_eq!(path.file_name().unwrap(), ".._.._escaped_x.txt");
    assert!(!root.path().join("escaped_x.txt").exists());
    assert_eq!(std::fs::read(&path).unwrap(), b"contained");

    let windows_style = db
        .store_file(b"w", &metadata("..\\up", None))
        .await
        .unwrap();
    assert_eq!(windows_style.parent().unwrap(), file_dir);
    assert_eq!(windows_style.file_name().unwrap(), ".._up_unknown");

    // The row keeps the remote id unchanged
    assert!(db.get_file("../../escaped").await.unwrap().is_some());

    db.close().await;
}
