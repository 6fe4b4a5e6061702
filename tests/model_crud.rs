use awesome_orm::blog::{Blog, User};
use awesome_orm::{model, Database, DatabaseConfig, FindAll, Model, OrmError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

// Keeps SQLite busy for far longer than the statement timeouts below.
const SLOW_INSERT: &str = "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 5000000) \
     INSERT INTO counters (label_text, hits, ratio, counter_id) SELECT 'slow', count(*), 0.0, 99 FROM c";
const SLOW_SELECT: &str = "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 5000000) \
     SELECT count(*) AS n FROM c";

#[model(table = "counters")]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Counter {
    #[field(primary_key, name = "counter_id")]
    id: Option<i64>,
    #[field(name = "label_text", ddl = "varchar(20)")]
    label: Option<String>,
    hits: Option<i64>,
    ratio: Option<f64>,
}

async fn memory_db() -> Database {
    memory_db_with(DatabaseConfig::from_url("sqlite::memory:").max_size(1)).await
}

async fn memory_db_with(config: DatabaseConfig) -> Database {
    let db = Database::create_pool(config)
        .await
        .expect("failed to open in-memory database");
    db.create_tables(&[
        User::try_descriptor().unwrap(),
        Blog::try_descriptor().unwrap(),
        Counter::try_descriptor().unwrap(),
    ])
    .await
    .expect("failed to create tables");
    db
}

fn blog(name: &str, created_at: f64) -> Blog {
    Blog {
        user_id: Some("u1".to_string()),
        name: Some(name.to_string()),
        summary: Some("summary".to_string()),
        content: Some("content".to_string()),
        created_at: Some(created_at),
        ..Default::default()
    }
}

#[tokio::test]
async fn save_then_find_applies_defaults() {
    let db = memory_db().await;

    let mut user = User {
        email: Some("ada@example.com".to_string()),
        ..Default::default()
    };
    let affected = user.save(&db).await.unwrap();
    assert_eq!(affected, 1);

    let id = user.id.clone().expect("save assigns a generated id");
    assert_eq!(id.len(), 50);
    assert_eq!(user.admin, Some(false));
    assert!(user.created_at.is_some());

    let found = User::find(&db, id.as_str()).await.unwrap().expect("user was saved");
    assert_eq!(found.admin, Some(false));
    assert_eq!(found.email.as_deref(), Some("ada@example.com"));
    assert_eq!(found.passwd, None);
    assert_eq!(found, user);
}

#[tokio::test]
async fn new_instances_get_distinct_ids() {
    let db = memory_db().await;
    let mut a = User::default();
    let mut b = User::default();
    a.save(&db).await.unwrap();
    b.save(&db).await.unwrap();
    assert_ne!(a.id, b.id);
    assert_eq!(
        User::find_number(&db, "count(id)", None, Vec::new()).await.unwrap(),
        Some(json!(2))
    );
}

#[tokio::test]
async fn find_missing_row_is_none() {
    let db = memory_db().await;
    assert!(User::find(&db, "nope").await.unwrap().is_none());
}

#[tokio::test]
async fn find_all_honours_where_order_and_limit() {
    let db = memory_db().await;
    for i in 0..20 {
        blog(&format!("blog-{i:02}"), f64::from(i)).save(&db).await.unwrap();
    }

    let five = Blog::find_all(&db, FindAll::new().limit(5)).await.unwrap();
    assert_eq!(five.len(), 5);

    let page = Blog::find_all(&db, FindAll::new().order_by("created_at").limit_range(10, 5))
        .await
        .unwrap();
    let names: Vec<_> = page.iter().filter_map(|b| b.name.clone()).collect();
    assert_eq!(names, vec!["blog-10", "blog-11", "blog-12", "blog-13", "blog-14"]);

    let tail = Blog::find_all(&db, FindAll::new().limit_range(18, 5)).await.unwrap();
    assert_eq!(tail.len(), 2);

    let newest = Blog::find_all(
        &db,
        FindAll::new()
            .filter("created_at>=?", vec![json!(17.0)])
            .order_by("created_at desc"),
    )
    .await
    .unwrap();
    let names: Vec<_> = newest.iter().filter_map(|b| b.name.clone()).collect();
    assert_eq!(names, vec!["blog-19", "blog-18", "blog-17"]);
}

#[tokio::test]
async fn invalid_limit_fails_before_any_query() {
    // Never connected: reaching the pool would report NotConnected instead.
    let db = Database::new(DatabaseConfig::from_url("sqlite::memory:"));
    let err = Blog::find_all(&db, FindAll::new().limit_value(json!([1, 2, 3])))
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::InvalidArgument(_)), "{err:?}");
}

#[tokio::test]
async fn find_number_with_where() {
    let db = memory_db().await;
    for i in 0..4 {
        blog("b", f64::from(i)).save(&db).await.unwrap();
    }
    let n = Blog::find_number(&db, "count(id)", Some("created_at>?"), vec![json!(1.5)])
        .await
        .unwrap();
    assert_eq!(n, Some(json!(2)));
}

#[tokio::test]
async fn update_and_remove_by_primary_key() {
    let db = memory_db().await;
    let mut user = User {
        email: Some("grace@example.com".to_string()),
        name: Some("Grace".to_string()),
        ..Default::default()
    };
    user.save(&db).await.unwrap();
    let id = user.id.clone().unwrap();

    user.admin = Some(true);
    user.name = Some("Grace Hopper".to_string());
    assert_eq!(user.update(&db).await.unwrap(), 1);

    let found = User::find(&db, id.as_str()).await.unwrap().unwrap();
    assert_eq!(found.admin, Some(true));
    assert_eq!(found.name.as_deref(), Some("Grace Hopper"));

    assert_eq!(found.remove(&db).await.unwrap(), 1);
    assert!(User::find(&db, id.as_str()).await.unwrap().is_none());

    // Removing again touches no row: logged, not an error.
    assert_eq!(found.remove(&db).await.unwrap(), 0);
}

#[tokio::test]
async fn update_without_primary_key_is_rejected() {
    let db = memory_db().await;
    let user = User::default();
    let err = user.update(&db).await.unwrap_err();
    assert!(matches!(err, OrmError::MissingValue { ref field } if field == "id"));
    let err = user.remove(&db).await.unwrap_err();
    assert!(matches!(err, OrmError::MissingValue { .. }));
}

#[tokio::test]
async fn column_names_and_numeric_kinds_round_trip() {
    let db = memory_db().await;
    let descriptor = Counter::try_descriptor().unwrap();
    assert_eq!(
        descriptor.select_stmt,
        "SELECT counter_id, label_text, hits, ratio FROM counters"
    );

    let mut counter = Counter {
        id: Some(7),
        label: Some("visits".to_string()),
        ..Default::default()
    };
    counter.save(&db).await.unwrap();
    assert_eq!(counter.hits, Some(0));
    assert_eq!(counter.ratio, Some(0.0));

    let found = Counter::find(&db, 7).await.unwrap().unwrap();
    assert_eq!(found, counter);

    let rows = db
        .select("SELECT label_text FROM counters WHERE counter_id=?", &[json!(7)], None)
        .await
        .unwrap();
    assert_eq!(rows[0].get("label_text"), Some(&json!("visits")));
}

#[tokio::test]
async fn failed_transactional_write_is_rolled_back() {
    let db = memory_db().await;

    let err = db
        .execute("INSERT INTO missing_table (x) VALUES (?)", &[json!(1)], false)
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::Database(_)), "{err:?}");

    // With a single pooled connection a dangling transaction would make the
    // next BEGIN fail.
    let affected = db
        .execute(
            "INSERT INTO counters (label_text, hits, ratio, counter_id) VALUES (?, ?, ?, ?)",
            &[json!("tx"), json!(1), json!(0.5), json!(1)],
            false,
        )
        .await
        .unwrap();
    assert_eq!(affected, 1);
    assert!(Counter::find(&db, 1).await.unwrap().is_some());
}

#[tokio::test]
async fn non_autocommit_pool_wraps_model_writes() {
    let db = Database::create_pool(
        DatabaseConfig::from_url("sqlite::memory:")
            .max_size(1)
            .autocommit(false),
    )
    .await
    .unwrap();
    db.create_tables(&[User::try_descriptor().unwrap()]).await.unwrap();
    assert!(!db.autocommit());

    let mut user = User::default();
    assert_eq!(user.save(&db).await.unwrap(), 1);
    let id = user.id.clone().unwrap();
    assert!(User::find(&db, id.as_str()).await.unwrap().is_some());
}

#[tokio::test]
async fn closed_pool_rejects_queries() {
    let db = memory_db().await;
    let handle = db.clone();
    db.close().await;
    assert!(handle.is_closed());
    let err = User::find(&handle, "any").await.unwrap_err();
    assert!(matches!(err, OrmError::PoolClosed), "{err:?}");
}

#[tokio::test]
async fn select_with_size_stops_early() {
    let db = memory_db().await;
    for i in 0..3 {
        blog("b", f64::from(i)).save(&db).await.unwrap();
    }
    let rows = db.select("SELECT id FROM blogs", &[], Some(2)).await.unwrap();
    assert_eq!(rows.len(), 2);
    let rows = db.select("SELECT id FROM blogs", &[], None).await.unwrap();
    assert_eq!(rows.len(), 3);
}

#[tokio::test]
async fn slow_select_times_out() {
    let db = memory_db_with(
        DatabaseConfig::from_url("sqlite::memory:")
            .max_size(1)
            .statement_timeout(Duration::from_millis(200)),
    )
    .await;
    let err = db.select(SLOW_SELECT, &[], None).await.unwrap_err();
    assert!(matches!(err, OrmError::Timeout(d) if d == Duration::from_millis(200)), "{err:?}");
}

#[tokio::test]
async fn timed_out_transactional_write_leaves_pool_usable() {
    let db = memory_db_with(
        DatabaseConfig::from_url("sqlite::memory:")
            .max_size(1)
            .statement_timeout(Duration::from_millis(200)),
    )
    .await;

    let err = db.execute(SLOW_INSERT, &[], false).await.unwrap_err();
    assert!(matches!(err, OrmError::Timeout(_)), "{err:?}");

    // Same single connection: it must not still be inside the abandoned
    // transaction.
    let affected = db
        .execute(
            "INSERT INTO counters (label_text, hits, ratio, counter_id) VALUES (?, ?, ?, ?)",
            &[json!("after"), json!(1), json!(0.5), json!(1)],
            false,
        )
        .await
        .unwrap();
    assert_eq!(affected, 1);
    assert!(Counter::find(&db, 99).await.unwrap().is_none());

    let mut counter = Counter {
        id: Some(2),
        ..Default::default()
    };
    counter.save(&db).await.unwrap();
    assert_eq!(
        Counter::find_number(&db, "count(counter_id)", None, Vec::new()).await.unwrap(),
        Some(json!(2))
    );
}

#[tokio::test]
async fn exhausted_pool_reports_timeout() {
    let db = memory_db_with(
        DatabaseConfig::from_url("sqlite::memory:")
            .max_size(1)
            .acquire_timeout_secs(1),
    )
    .await;

    let held = db.acquire().await.unwrap();
    let err = db.select("SELECT 1", &[], None).await.unwrap_err();
    assert!(matches!(err, OrmError::Timeout(d) if d == Duration::from_secs(1)), "{err:?}");

    drop(held);
    assert_eq!(db.select("SELECT 1 AS one", &[], None).await.unwrap().len(), 1);
}
