use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model;

/// A 50-character id: 15 digits of Unix milliseconds, a v4 uuid in hex and
/// three zeros. Ids sort by creation time.
pub fn next_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("{:015}{}000", millis, Uuid::new_v4().simple())
}

/// Current Unix time in seconds. Timestamps are stored as floats to keep
/// time zones out of the database.
pub fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

#[model(table = "users")]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[field(primary_key, ddl = "varchar(50)", default = next_id)]
    pub id: Option<String>,
    #[field(ddl = "varchar(50)")]
    pub email: Option<String>,
    #[field(ddl = "varchar(50)")]
    pub passwd: Option<String>,
    pub admin: Option<bool>,
    #[field(ddl = "varchar(50)")]
    pub name: Option<String>,
    #[field(ddl = "varchar(500)")]
    pub image: Option<String>,
    #[field(default = now)]
    pub created_at: Option<f64>,
}

#[model(table = "blogs")]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Blog {
    #[field(primary_key, ddl = "varchar(50)", default = next_id)]
    pub id: Option<String>,
    #[field(ddl = "varchar(50)")]
    pub user_id: Option<String>,
    #[field(ddl = "varchar(50)")]
    pub user_name: Option<String>,
    #[field(ddl = "varchar(500)")]
    pub user_image: Option<String>,
    #[field(ddl = "varchar(50)")]
    pub name: Option<String>,
    #[field(ddl = "varchar(200)")]
    pub summary: Option<String>,
    #[field(text)]
    pub content: Option<String>,
    #[field(default = now)]
    pub created_at: Option<f64>,
}

#[model(table = "comments")]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    #[field(primary_key, ddl = "varchar(50)", default = next_id)]
    pub id: Option<String>,
    #[field(ddl = "varchar(50)")]
    pub blog_id: Option<String>,
    #[field(ddl = "varchar(50)")]
    pub user_id: Option<String>,
    #[field(ddl = "varchar(50)")]
    pub user_name: Option<String>,
    #[field(ddl = "varchar(500)")]
    pub user_image: Option<String>,
    #[field(text)]
    pub content: Option<String>,
    #[field(default = now)]
    pub created_at: Option<f64>,
}
