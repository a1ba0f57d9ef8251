//! End to end through the sqlx backend on a sqlite file.
//!
//! Master and follower are separate pools on the same file, so writes made
//! through the master are visible to reads routed to the follower.

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde::{Deserialize, Serialize};
use sqldb::prelude::*;
use tempfile::TempDir;

#[derive(Debug, Deserialize, PartialEq)]
struct User {
    id: i64,
    email: String,
    score: Option<f64>,
}

#[derive(Serialize)]
struct NewUser<'a> {
    email: &'a str,
    score: f64,
}

async fn open() -> (TempDir, Db) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("app.db").display());
    let config = DbConfig::new("sqlite3", url.clone())
        .with_follower(url)
        .with_max_open_conns(2)
        .with_conn_max_lifetime(Duration::from_secs(60))
        .with_retry(2);
    let db = Db::connect(&Context::background(), &config).await.unwrap();

    db.exec(
        "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT NOT NULL, score REAL)",
        args![],
    )
    .await
    .unwrap();
    (dir, db)
}

#[tokio::test]
async fn test_write_then_read_through_follower() {
    let (_dir, db) = open().await;
    assert!(!db.follower_is_master());
    assert_eq!(db.driver_name(), "sqlite3");

    let res = db
        .exec("INSERT INTO users (email, score) VALUES (?, ?)", args!["a@example.com", 1.5])
        .await
        .unwrap();
    assert_eq!(res.rows_affected, 1);

    db.named_exec(
        "INSERT INTO users (email, score) VALUES (:email, :score)",
        &NewUser {
            email: "b@example.com",
            score: 2.0,
        },
    )
    .await
    .unwrap();

    let user: User = db
        .get("SELECT id, email, score FROM users WHERE email = ?", args!["a@example.com"])
        .await
        .unwrap();
    assert_eq!(
        user,
        User {
            id: 1,
            email: "a@example.com".into(),
            score: Some(1.5)
        }
    );

    let count: i64 = db.get("SELECT COUNT(*) FROM users", args![]).await.unwrap();
    assert_eq!(count, 2);

    let users: Vec<User> = db
        .select("SELECT id, email, score FROM users ORDER BY id", args![])
        .await
        .unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(users[1].email, "b@example.com");

    let missing = db
        .get::<User>("SELECT id, email, score FROM users WHERE id = ?", args![99])
        .await
        .unwrap_err();
    assert!(missing.is_row_not_found());

    db.ping().await.unwrap();
    db.close().await;
}

#[tokio::test]
async fn test_transactions() {
    let (_dir, db) = open().await;

    let mut tx = db.begin().await.unwrap();
    tx.exec("INSERT INTO users (email) VALUES (?)", args!["kept@example.com"])
        .await
        .unwrap();
    let inside: i64 = tx.get("SELECT COUNT(*) FROM users", args![]).await.unwrap();
    assert_eq!(inside, 1);
    tx.commit().await.unwrap();

    let mut tx = db.begin().await.unwrap();
    tx.exec("INSERT INTO users (email) VALUES (?)", args!["dropped@example.com"])
        .await
        .unwrap();
    tx.rollback().await.unwrap();

    let emails: Vec<String> = db.select("SELECT email FROM users", args![]).await.unwrap();
    assert_eq!(emails, vec!["kept@example.com".to_string()]);

    let err = db
        .begin_tx(&Context::background(), TxOptions::default().read_only(true))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, SqlDbError::Query(sqlx::Error::Configuration(_))));
    db.close().await;
}

#[tokio::test]
async fn test_prepared_statements() {
    let (_dir, db) = open().await;
    let ctx = Context::background();

    let insert = db
        .prepare_write(&ctx, "INSERT INTO users (email, score) VALUES (?, ?)")
        .await
        .unwrap();
    for (i, email) in ["x@example.com", "y@example.com"].iter().enumerate() {
        insert
            .exec_context(&ctx, args![*email, i as f64])
            .await
            .unwrap();
    }
    insert.close().await.unwrap();

    let by_email = db
        .prepare_read(&ctx, "SELECT id, email, score FROM users WHERE email = ?")
        .await
        .unwrap();
    let user: User = by_email.get_context(&ctx, args!["y@example.com"]).await.unwrap();
    assert_eq!(user.score, Some(1.0));
    let rows = by_email.query_context(&ctx, args!["nobody"]).await.unwrap();
    assert!(rows.is_empty());
    assert!(by_email
        .query_row_context(&ctx, args!["x@example.com"])
        .await
        .unwrap()
        .is_some());
    by_email.close().await.unwrap();

    let err = db.prepare_read(&ctx, "SELEC nonsense").await.err().unwrap();
    assert!(matches!(err, SqlDbError::Query(_)));
    db.close().await;
}

#[tokio::test]
async fn test_unreachable_database_fails_after_retries() {
    let dir = tempfile::tempdir().unwrap();
    // mode=ro refuses to create the missing file.
    let url = format!("sqlite://{}?mode=ro", dir.path().join("missing.db").display());
    let config = DbConfig::new("sqlite", url);
    let connector = sqldb::Connector::default().backoff(Duration::from_millis(10));

    let err = Db::connect_with(&Context::background(), &config.with_retry(2), &connector)
        .await
        .unwrap_err();
    assert!(matches!(err, SqlDbError::Connection { attempts: 2, .. }));
}
