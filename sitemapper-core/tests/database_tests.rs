// Tests for the SQLite cache store

use serde_json::json;
use sitemapper_core::data::Database;
use sitemapper_scanner::{CacheEntry, CacheStore, ResultCache};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn create_test_db() -> (TempDir, Database) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test_cache.db");
    let db = Database::new(&db_path).unwrap();
    (temp_dir, db)
}

// ============================================================================
// Database Creation Tests
// ============================================================================

#[test]
fn test_database_creation() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test_cache.db");

    let db = Database::new(&db_path);
    assert!(db.is_ok());
    assert!(db_path.exists());
}

#[test]
fn test_database_creates_missing_directory() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("nested").join("cache").join("site_cache.db");

    let _db = Database::new(&db_path).unwrap();
    assert!(Database::exists(&db_path));
}

#[test]
fn test_database_drop() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test_cache.db");

    let db = Database::new(&db_path).unwrap();
    db.close().unwrap();
    assert!(Database::exists(&db_path));

    Database::drop(&db_path).unwrap();
    assert!(!Database::exists(&db_path));
}

#[test]
fn test_drop_missing_file_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    assert!(Database::drop(&temp_dir.path().join("missing.db")).is_err());
}

// ============================================================================
// Entry Tests
// ============================================================================

#[test]
fn test_put_and_get_entry() {
    let (_temp_dir, db) = create_test_db();
    let entry = CacheEntry::new(json!([{"layoutId": 1, "friendlyURL": "/home"}]));

    db.put_entry("site:abc", &entry).unwrap();
    let loaded = db.get_entry("site:abc").unwrap().unwrap();

    assert_eq!(loaded, entry);
    assert!(db.get_entry("site:other").unwrap().is_none());
}

#[test]
fn test_put_overwrites_entry() {
    let (_temp_dir, db) = create_test_db();

    db.put_entry("k", &CacheEntry { stored_at: 1, payload: json!([1]) }).unwrap();
    db.put_entry("k", &CacheEntry { stored_at: 2, payload: json!([2]) }).unwrap();

    let loaded = db.get_entry("k").unwrap().unwrap();
    assert_eq!(loaded.stored_at, 2);
    assert_eq!(loaded.payload, json!([2]));
    assert_eq!(db.entry_count().unwrap(), 1);
}

#[test]
fn test_entries_survive_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test_cache.db");

    let db = Database::new(&db_path).unwrap();
    db.put_entry("k", &CacheEntry::new(json!(["persisted"]))).unwrap();
    db.close().unwrap();

    let reopened = Database::new(&db_path).unwrap();
    assert_eq!(reopened.get_entry("k").unwrap().unwrap().payload, json!(["persisted"]));
}

#[test]
fn test_purge_expired() {
    let (_temp_dir, db) = create_test_db();
    let now = chrono::Utc::now().timestamp_millis();

    db.put_entry("old", &CacheEntry { stored_at: now - 3 * 3_600_000, payload: json!([]) }).unwrap();
    db.put_entry("fresh", &CacheEntry { stored_at: now, payload: json!([]) }).unwrap();

    let removed = db.purge_expired(Duration::from_secs(3600)).unwrap();
    assert_eq!(removed, 1);
    assert!(db.get_entry("old").unwrap().is_none());
    assert!(db.get_entry("fresh").unwrap().is_some());
}

// ============================================================================
// Close / CacheStore Tests
// ============================================================================

#[test]
fn test_closed_database_rejects_access() {
    let (_temp_dir, db) = create_test_db();
    db.close().unwrap();

    assert!(db.get_entry("k").is_err());
    assert!(CacheStore::put(&db, "k", &CacheEntry::new(json!([]))).is_err());
    // closing twice is fine
    assert!(db.close().is_ok());
}

#[tokio::test]
async fn test_result_cache_over_sqlite() {
    let (_temp_dir, db) = create_test_db();
    let db = Arc::new(db);
    let cache = ResultCache::new(Box::new(db.clone()), Duration::from_secs(3600), "site");

    let (first, hit) = cache.get_or_fetch("fp", || async { json!([{"layoutId": 7}]) }).await;
    assert!(!hit);
    let (second, hit) = cache.get_or_fetch("fp", || async { json!(["unused"]) }).await;
    assert!(hit);
    assert_eq!(first, second);

    // keys are namespaced by the prefix
    assert!(db.get_entry("site:fp").unwrap().is_some());
}
