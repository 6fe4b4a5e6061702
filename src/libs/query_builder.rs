use serde_json::Value;

use crate::libs::error::{OrmError, OrmResult};
use crate::libs::orm::Backend;

/// `LIMIT` shapes `find_all` understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    /// `LIMIT ?`
    Count(u64),
    /// `LIMIT ?, ?`: skip `offset` rows, then return up to `count`.
    Range { offset: u64, count: u64 },
}

impl Limit {
    /// Accepts a number or a two-element `[offset, count]` array.
    pub fn parse(value: &Value) -> OrmResult<Self> {
        let invalid = || OrmError::InvalidArgument(format!("Invalid limit value: {value}"));
        // Bound as BIGINT, so anything past i64::MAX is out of range.
        let bound = |v: &Value| v.as_u64().filter(|n| i64::try_from(*n).is_ok());
        match value {
            Value::Number(_) => bound(value).map(Limit::Count).ok_or_else(invalid),
            Value::Array(items) if items.len() == 2 => {
                let offset = bound(&items[0]).ok_or_else(invalid)?;
                let count = bound(&items[1]).ok_or_else(invalid)?;
                Ok(Limit::Range { offset, count })
            }
            _ => Err(invalid()),
        }
    }

    fn render(self, backend: Backend, sql: &mut Vec<String>, args: &mut Vec<Value>) {
        match (self, backend) {
            (Limit::Count(count), _) => {
                sql.push("LIMIT ?".to_string());
                args.push(Value::from(count));
            }
            (Limit::Range { offset, count }, Backend::Postgres) => {
                sql.push("LIMIT ? OFFSET ?".to_string());
                args.push(Value::from(count));
                args.push(Value::from(offset));
            }
            (Limit::Range { offset, count }, _) => {
                sql.push("LIMIT ?, ?".to_string());
                args.push(Value::from(offset));
                args.push(Value::from(count));
            }
        }
    }
}

/// Optional clauses appended to a model's base select.
///
/// ```ignore
/// let latest = Blog::find_all(
///     &db,
///     FindAll::new()
///         .filter("user_id=?", vec![json!(user_id)])
///         .order_by("created_at desc")
///         .limit(5),
/// )
/// .await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct FindAll {
    where_clause: Option<String>,
    args: Vec<Value>,
    order_by: Option<String>,
    limit: Option<Value>,
}

impl FindAll {
    pub fn new() -> Self {
        Self::default()
    }

    /// `WHERE <clause>` with `?` placeholders bound to `args`.
    pub fn filter(mut self, clause: &str, args: Vec<Value>) -> Self {
        self.where_clause = Some(clause.to_string());
        self.args = args;
        self
    }

    pub fn order_by(mut self, order_by: &str) -> Self {
        self.order_by = Some(order_by.to_string());
        self
    }

    pub fn limit(mut self, count: u64) -> Self {
        self.limit = Some(Value::from(count));
        self
    }

    pub fn limit_range(mut self, offset: u64, count: u64) -> Self {
        self.limit = Some(Value::from(vec![offset, count]));
        self
    }

    /// Limit given as raw JSON, the way a request parameter arrives. Checked
    /// when the statement is built.
    pub fn limit_value(mut self, value: Value) -> Self {
        self.limit = Some(value);
        self
    }

    /// Appends the clauses to `base` and returns the statement with its
    /// arguments. Fails on an unusable limit before anything is executed.
    pub fn build(&self, base: &str, backend: Backend) -> OrmResult<(String, Vec<Value>)> {
        let limit = self.limit.as_ref().map(Limit::parse).transpose()?;

        let mut sql = vec![base.to_string()];
        let mut args = self.args.clone();
        if let Some(clause) = &self.where_clause {
            sql.push("WHERE".to_string());
            sql.push(clause.clone());
        }
        if let Some(order_by) = &self.order_by {
            sql.push("ORDER BY".to_string());
            sql.push(order_by.clone());
        }
        if let Some(limit) = limit {
            limit.render(backend, &mut sql, &mut args);
        }
        Ok((sql.join(" "), args))
    }
}
