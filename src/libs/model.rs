use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::libs::error::{OrmError, OrmResult, RegistrationError};
use crate::libs::executor::RowMap;
use crate::libs::orm::Database;
use crate::libs::query_builder::FindAll;
use crate::libs::schema::ModelDescriptor;

/// A struct mapped to one table.
///
/// Implemented by `#[model]`; the struct's fields are `Option<T>` and `None`
/// means "not set". Values travel through the struct's serde
/// implementation, so serialized keys must equal the field names.
#[async_trait]
pub trait Model: Serialize + DeserializeOwned + Send + Sync + Sized {
    /// The registered descriptor, computed on first use and cached for the
    /// lifetime of the type.
    fn try_descriptor() -> Result<&'static ModelDescriptor, RegistrationError>;

    /// Builds an instance from a result row keyed by column name.
    fn from_row(row: RowMap) -> OrmResult<Self> {
        let descriptor = Self::try_descriptor()?;
        let mut record = Map::new();
        for (column, value) in row {
            if let Some((attr, field)) = descriptor.field_for_column(&column) {
                record.insert(attr.to_string(), field.kind().coerce(value));
            }
        }
        Ok(serde_json::from_value(Value::Object(record))?)
    }

    /// Attribute name to value, `null` for unset fields.
    fn to_record(&self) -> OrmResult<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(OrmError::InvalidArgument(format!(
                "model must serialize to an object, got {other}"
            ))),
        }
    }

    /// The current value of `attr`; `None` when it is not set.
    fn get_value(&self, attr: &str) -> OrmResult<Option<Value>> {
        Ok(self.to_record()?.remove(attr).filter(|v| !v.is_null()))
    }

    /// The current value of `attr`, or its resolved default. A resolved
    /// default is stored on the instance.
    fn get_value_or_default(&mut self, attr: &str) -> OrmResult<Option<Value>> {
        let mut record = self.to_record()?;
        let value = resolve_into(Self::try_descriptor()?, &mut record, attr);
        *self = serde_json::from_value(Value::Object(record))?;
        Ok(value)
    }

    /// Finds one instance by primary key.
    async fn find<K>(db: &Database, pk: K) -> OrmResult<Option<Self>>
    where
        K: Into<Value> + Send,
    {
        let d = Self::try_descriptor()?;
        let sql = format!("{} WHERE {}=?", d.select_stmt, d.column(&d.primary_key));
        let rows = db.select(&sql, &[pk.into()], Some(1)).await?;
        rows.into_iter().next().map(Self::from_row).transpose()
    }

    /// Finds every instance matching `query`.
    async fn find_all(db: &Database, query: FindAll) -> OrmResult<Vec<Self>> {
        let d = Self::try_descriptor()?;
        let (sql, args) = query.build(&d.select_stmt, db.backend())?;
        let rows = db.select(&sql, &args, None).await?;
        rows.into_iter().map(Self::from_row).collect()
    }

    /// Runs `SELECT <select_expr> AS _num_` over the table, e.g.
    /// `count(id)`, and returns the single value.
    async fn find_number(
        db: &Database,
        select_expr: &str,
        where_clause: Option<&str>,
        args: Vec<Value>,
    ) -> OrmResult<Option<Value>> {
        let d = Self::try_descriptor()?;
        let mut sql = vec![format!("SELECT {} AS _num_ FROM {}", select_expr, d.table_name)];
        if let Some(clause) = where_clause {
            sql.push("WHERE".to_string());
            sql.push(clause.to_string());
        }
        let rows = db.select(&sql.join(" "), &args, Some(1)).await?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|mut row| row.remove("_num_")))
    }

    /// Inserts the instance. Unset fields take their defaults, which are
    /// written back to the instance. Returns the affected-row count.
    async fn save(&mut self, db: &Database) -> OrmResult<u64> {
        let d = Self::try_descriptor()?;
        let mut record = self.to_record()?;
        let mut args: Vec<Value> = d
            .fields
            .iter()
            .map(|attr| resolve_into(d, &mut record, attr).unwrap_or(Value::Null))
            .collect();
        args.push(resolve_into(d, &mut record, &d.primary_key).unwrap_or(Value::Null));
        *self = serde_json::from_value(Value::Object(record))?;

        let rows = db.execute(&d.insert_stmt, &args, db.autocommit()).await?;
        if rows != 1 {
            tracing::warn!("failed to insert record: affected rows: {}", rows);
        }
        Ok(rows)
    }

    /// Writes the current values by primary key. Unset fields are written as
    /// NULL; defaults are not applied.
    async fn update(&self, db: &Database) -> OrmResult<u64> {
        let d = Self::try_descriptor()?;
        let mut record = self.to_record()?;
        let mut args: Vec<Value> = d
            .fields
            .iter()
            .map(|attr| record.remove(attr).unwrap_or(Value::Null))
            .collect();
        args.push(primary_key_value(d, &mut record)?);

        let rows = db.execute(&d.update_stmt, &args, db.autocommit()).await?;
        if rows != 1 {
            tracing::warn!("failed to update by primary key: affected rows: {}", rows);
        }
        Ok(rows)
    }

    /// Deletes the row with this instance's primary key.
    async fn remove(&self, db: &Database) -> OrmResult<u64> {
        let d = Self::try_descriptor()?;
        let args = [primary_key_value(d, &mut self.to_record()?)?];

        let rows = db.execute(&d.delete_stmt, &args, db.autocommit()).await?;
        if rows != 1 {
            tracing::warn!("failed to remove by primary key: affected rows: {}", rows);
        }
        Ok(rows)
    }
}

/// Forces registration of `M` at startup. A declaration error comes back
/// here instead of surfacing on the first query.
pub fn register<M: Model>() -> Result<&'static ModelDescriptor, RegistrationError> {
    let descriptor = M::try_descriptor()?;
    tracing::info!(
        "registered model {} (table: {}, primary key: {})",
        descriptor.model_name,
        descriptor.table_name,
        descriptor.primary_key
    );
    Ok(descriptor)
}

/// Value of `attr` in `record`, falling back to the field default. The
/// resolved default is stored in `record`.
fn resolve_into(d: &ModelDescriptor, record: &mut Map<String, Value>, attr: &str) -> Option<Value> {
    if let Some(value) = record.get(attr).filter(|v| !v.is_null()) {
        return Some(value.clone());
    }
    let value = d.field(attr)?.resolve_default()?;
    tracing::debug!("using default value for {}: {}", attr, value);
    record.insert(attr.to_string(), value.clone());
    Some(value)
}

fn primary_key_value(d: &ModelDescriptor, record: &mut Map<String, Value>) -> OrmResult<Value> {
    record
        .remove(&d.primary_key)
        .filter(|v| !v.is_null())
        .ok_or_else(|| OrmError::MissingValue {
            field: d.primary_key.clone(),
        })
}
