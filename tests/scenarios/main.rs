//! End-to-end scenarios over the public database handle.

use chronicledb::{Database, DatabaseConfig, TransactionOptions};
use serde_json::json;
use std::sync::Arc;

fn open_db() -> (tempfile::TempDir, Database) {
    let dir = tempfile::tempdir().unwrap();
    let config = DatabaseConfig::new(dir.path().join("db"), dir.path().join("idx"));
    let db = Database::open(config).unwrap();
    (dir, db)
}

#[test]
fn create_then_read() {
    let (_dir, db) = open_db();
    db.put("user:1", r#"{"name":"Alice"}"#, None, None).unwrap();
    let doc = db.get("user:1", None).unwrap().unwrap();
    assert_eq!(doc.id(), Some("user:1"));
    assert_eq!(doc.get("name"), Some(&json!("Alice")));
    assert_eq!(doc.get("_table"), Some(&json!("user")));
}

#[test]
fn update_then_history() {
    let (_dir, db) = open_db();
    db.put("abc", r#"{"value":123}"#, None, None).unwrap();
    db.put("abc", r#"{"value":1234}"#, None, None).unwrap();

    let history = db.history("abc", None).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(
        history[0].document.as_ref().unwrap().get("value"),
        Some(&json!(1234))
    );
    assert_eq!(
        history[1].document.as_ref().unwrap().get("value"),
        Some(&json!(123))
    );
    assert!(history[0].commit_time >= history[1].commit_time);
}

#[test]
fn restore_rolls_forward_to_old_content() {
    let (_dir, db) = open_db();
    db.put("abc", r#"{"value":123}"#, None, None).unwrap();
    db.put("abc", r#"{"value":1234}"#, None, None).unwrap();

    let history = db.history("abc", None).unwrap();
    let first_commit = history[1].commit_id.clone();

    db.restore("abc", &first_commit, None, None).unwrap();
    assert_eq!(
        db.get("abc", None).unwrap().unwrap().get("value"),
        Some(&json!(123))
    );

    let history = db.history("abc", None).unwrap();
    assert_eq!(history.len(), 3);
    assert!(history[0].commit_message.contains("Restore"));
}

#[test]
fn concurrent_writers_to_same_id() {
    let (_dir, db) = open_db();
    let db = Arc::new(db);

    let handles: Vec<_> = (0..2)
        .map(|n| {
            let db = db.clone();
            std::thread::spawn(move || {
                db.put("k", &format!(r#"{{"n":{n}}}"#), None, None).unwrap()
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // Both committed: exactly two document commits, version counter at 2,
    // final content from whichever writer landed last
    let history = db.history("k", None).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(db.storage().versions().get_version("k", "main"), 2);
    let n = db.get("k", None).unwrap().unwrap().get("n").cloned().unwrap();
    assert!(n == json!(0) || n == json!(1));
}

#[test]
fn many_concurrent_writers_all_commit() {
    let (_dir, db) = open_db();
    let db = Arc::new(db);
    let threads = 6u64;

    let handles: Vec<_> = (0..threads)
        .map(|n| {
            let db = db.clone();
            std::thread::spawn(move || {
                db.put("hot", &format!(r#"{{"n":{n}}}"#), None, None).unwrap()
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(db.storage().versions().get_version("hot", "main"), threads);
    assert_eq!(db.history("hot", None).unwrap().len(), threads as usize);
}

#[test]
fn branch_isolation() {
    let (_dir, db) = open_db();
    db.put("x", r#"{"v":1}"#, None, None).unwrap();
    db.put("x", r#"{"v":2}"#, Some("dev"), None).unwrap();

    assert_eq!(
        db.get("x", Some("main")).unwrap().unwrap().get("v"),
        Some(&json!(1))
    );
    assert_eq!(
        db.get("x", Some("dev")).unwrap().unwrap().get("v"),
        Some(&json!(2))
    );
    assert_eq!(db.history("x", Some("main")).unwrap().len(), 1);
    assert_eq!(db.history("x", Some("dev")).unwrap().len(), 1);
    assert_eq!(
        db.list_branches().unwrap(),
        vec!["dev".to_string(), "main".to_string()]
    );
}

#[test]
fn delete_idempotence() {
    let (_dir, db) = open_db();
    db.put("user:1", r#"{"name":"Alice"}"#, None, None).unwrap();
    assert!(db.delete("user:1", None, None).unwrap());
    assert!(!db.delete("user:1", None, None).unwrap());
    assert!(db.get("user:1", None).unwrap().is_none());
}

#[test]
fn query_surface() {
    let (_dir, db) = open_db();
    db.put("user:1", r#"{"name":"José Silva","age":30}"#, None, None)
        .unwrap();
    db.put("user:2", r#"{"name":"Alice Jones","age":25}"#, None, None)
        .unwrap();

    // Accent-insensitive full-text search
    let docs = db
        .query(&json!({"type": "fts", "field": "name", "query": "jose"}), None)
        .unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].id(), Some("user:1"));

    // Range over a numeric field
    let docs = db
        .query(
            &json!({"type": "range", "field": "age", "lower": 28}),
            None,
        )
        .unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].id(), Some("user:1"));

    // Legacy field search with widening
    let docs = db.search("name", "alic", None).unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].id(), Some("user:2"));

    // Listings
    assert_eq!(db.list_by_table("user", None).unwrap().len(), 2);
    assert_eq!(db.list_by_prefix("user:1", None).unwrap().len(), 1);
}

#[test]
fn transaction_scope_spans_multiple_commits() {
    use chronicledb::{Document, Storage, Transaction};

    let (_dir, db) = open_db();
    Transaction::run(TransactionOptions::with_origin("batch"), |ctx| {
        let first = Document::from_json(r#"{"id":"user:1","name":"Alice"}"#)?;
        let second = Document::from_json(r#"{"id":"user:2","name":"Bob"}"#)?;
        db.storage().save(first, "main", Some(ctx))?;
        db.storage().save(second, "main", Some(ctx))?;
        // Both commits were produced under the same transaction identity
        assert_eq!(ctx.commit_count(), 2);
        Ok(())
    })
    .unwrap();
    assert_eq!(db.list_by_table("user", None).unwrap().len(), 2);
}

#[test]
fn transaction_metadata_reaches_notes() {
    let (_dir, db) = open_db();
    let opts = TransactionOptions::with_origin("psql").meta("statement", "INSERT");
    db.put("user:1", r#"{"name":"Alice"}"#, None, Some(&opts))
        .unwrap();
    // The commit exists and is annotated; detailed note inspection lives in
    // the engine tests. Here we assert the mutation surface accepted and
    // threaded the options.
    assert_eq!(db.history("user:1", None).unwrap().len(), 1);
}

#[test]
fn last_error_slot_clears_on_read() {
    let (_dir, db) = open_db();
    assert!(db.put("user:1", "{broken", None, None).is_err());
    assert!(db.last_error().is_some());
    assert!(db.last_error().is_none());
}
