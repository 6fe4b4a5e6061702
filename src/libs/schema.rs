use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use crate::libs::error::RegistrationError;

/// Column kinds a model field can map to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Boolean,
    Integer,
    Float,
    Text,
}

impl FieldKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Boolean => "boolean",
            FieldKind::Integer => "integer",
            FieldKind::Float => "float",
            FieldKind::Text => "text",
        }
    }

    fn may_be_primary_key(self) -> bool {
        !matches!(self, FieldKind::Boolean | FieldKind::Text)
    }

    /// Drivers hand booleans back as integers on MySQL and SQLite.
    pub fn coerce(self, value: Value) -> Value {
        match (self, value) {
            (FieldKind::Boolean, Value::Number(n)) => Value::Bool(n.as_f64().is_some_and(|v| v != 0.0)),
            (FieldKind::Float, Value::Number(n)) if !n.is_f64() => {
                n.as_f64().map(Value::from).unwrap_or(Value::Number(n))
            }
            (_, value) => value,
        }
    }
}

/// A field default: either a literal, or a generator called each time a
/// value is needed.
#[derive(Clone)]
pub enum FieldDefault {
    Value(Value),
    Generator(fn() -> Value),
}

impl FieldDefault {
    pub fn resolve(&self) -> Value {
        match self {
            FieldDefault::Value(v) => v.clone(),
            FieldDefault::Generator(generate) => generate(),
        }
    }
}

impl fmt::Debug for FieldDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldDefault::Value(v) => f.debug_tuple("Value").field(v).finish(),
            FieldDefault::Generator(_) => f.write_str("Generator(..)"),
        }
    }
}

/// A declared column. Built once with the consuming builder methods below and
/// never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Field {
    name: Option<String>,
    column_type: String,
    primary_key: bool,
    default: Option<FieldDefault>,
    kind: FieldKind,
}

impl Field {
    fn with_kind(kind: FieldKind, column_type: &str, default: Option<Value>) -> Self {
        Self {
            name: None,
            column_type: column_type.to_string(),
            primary_key: false,
            default: default.map(FieldDefault::Value),
            kind,
        }
    }

    pub fn string() -> Self {
        Self::with_kind(FieldKind::String, "varchar(100)", None)
    }

    pub fn boolean() -> Self {
        Self::with_kind(FieldKind::Boolean, "boolean", Some(Value::Bool(false)))
    }

    pub fn integer() -> Self {
        Self::with_kind(FieldKind::Integer, "bigint", Some(Value::from(0)))
    }

    pub fn float() -> Self {
        Self::with_kind(FieldKind::Float, "real", Some(Value::from(0.0)))
    }

    pub fn text() -> Self {
        Self::with_kind(FieldKind::Text, "text", None)
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Use `name` as the column name instead of the attribute name.
    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Override the advisory SQL column type, e.g. `varchar(50)`.
    pub fn ddl(mut self, column_type: &str) -> Self {
        self.column_type = column_type.to_string();
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(FieldDefault::Value(value));
        self
    }

    pub fn default_with(mut self, generator: fn() -> Value) -> Self {
        self.default = Some(FieldDefault::Generator(generator));
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn column_type(&self) -> &str {
        &self.column_type
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn default(&self) -> Option<&FieldDefault> {
        self.default.as_ref()
    }

    /// Resolves the default lazily; generators run on every call.
    pub fn resolve_default(&self) -> Option<Value> {
        self.default.as_ref().map(FieldDefault::resolve)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}, {}>", self.kind.as_str(), self.column_type)
    }
}

/// Everything the ORM needs to know about a model type, computed once at
/// registration.
#[derive(Debug, Clone)]
pub struct ModelDescriptor {
    pub model_name: String,
    pub table_name: String,
    pub primary_key: String,
    pub fields: Vec<String>,
    field_map: HashMap<String, Field>,
    columns: HashMap<String, String>,
    pub select_stmt: String,
    pub insert_stmt: String,
    pub update_stmt: String,
    pub delete_stmt: String,
}

impl ModelDescriptor {
    /// Validates the declared fields and precomputes the statement templates.
    ///
    /// Exactly one field must be the primary key. `table` overrides the table
    /// name, which otherwise is the model name.
    pub fn register(
        model: &str,
        table: Option<&str>,
        declared: Vec<(&str, Field)>,
    ) -> Result<Self, RegistrationError> {
        let table_name = table.unwrap_or(model).to_string();
        tracing::info!("found model: {} (table: {})", model, table_name);

        let mut field_map = HashMap::new();
        let mut columns = HashMap::new();
        let mut fields = Vec::new();
        let mut primary_key: Option<String> = None;

        for (attr, field) in declared {
            tracing::debug!("  found mapping: {} ==> {}", attr, field);
            if field.primary_key {
                if !field.kind.may_be_primary_key() {
                    return Err(RegistrationError::PrimaryKeyNotAllowed {
                        model: model.to_string(),
                        field: attr.to_string(),
                        kind: field.kind.as_str(),
                    });
                }
                if primary_key.is_some() {
                    return Err(RegistrationError::DuplicatePrimaryKey {
                        model: model.to_string(),
                        field: attr.to_string(),
                    });
                }
                primary_key = Some(attr.to_string());
            } else {
                fields.push(attr.to_string());
            }

            let column = field.name.clone().unwrap_or_else(|| attr.to_string());
            if columns.insert(column.clone(), attr.to_string()).is_some() {
                return Err(RegistrationError::DuplicateColumn {
                    model: model.to_string(),
                    column,
                });
            }
            field_map.insert(attr.to_string(), field);
        }

        let primary_key = primary_key.ok_or_else(|| RegistrationError::MissingPrimaryKey {
            model: model.to_string(),
        })?;

        let mut descriptor = Self {
            model_name: model.to_string(),
            table_name,
            primary_key,
            fields,
            field_map,
            columns,
            select_stmt: String::new(),
            insert_stmt: String::new(),
            update_stmt: String::new(),
            delete_stmt: String::new(),
        };
        descriptor.build_statements();
        Ok(descriptor)
    }

    fn build_statements(&mut self) {
        let pk = self.column(&self.primary_key).to_string();
        let cols: Vec<String> = self.fields.iter().map(|f| self.column(f).to_string()).collect();

        let mut select_cols = vec![pk.clone()];
        select_cols.extend(cols.iter().cloned());
        self.select_stmt = format!("SELECT {} FROM {}", select_cols.join(", "), self.table_name);

        let mut insert_cols = cols.clone();
        insert_cols.push(pk.clone());
        self.insert_stmt = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table_name,
            insert_cols.join(", "),
            placeholders(insert_cols.len())
        );

        let sets: Vec<String> = cols.iter().map(|c| format!("{}=?", c)).collect();
        self.update_stmt = format!(
            "UPDATE {} SET {} WHERE {}=?",
            self.table_name,
            sets.join(", "),
            pk
        );

        self.delete_stmt = format!("DELETE FROM {} WHERE {}=?", self.table_name, pk);
    }

    /// Column name for an attribute; falls back to the attribute itself.
    pub fn column<'a>(&'a self, attr: &'a str) -> &'a str {
        self.field_map
            .get(attr)
            .and_then(Field::name)
            .unwrap_or(attr)
    }

    pub fn field(&self, attr: &str) -> Option<&Field> {
        self.field_map.get(attr)
    }

    /// The attribute and field a result column belongs to.
    pub fn field_for_column(&self, column: &str) -> Option<(&str, &Field)> {
        let attr = self.columns.get(column)?;
        self.field_map.get(attr).map(|f| (attr.as_str(), f))
    }

    /// Primary key first, then the other fields in declaration order.
    pub fn attributes(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.primary_key.as_str()).chain(self.fields.iter().map(String::as_str))
    }

    /// `CREATE TABLE IF NOT EXISTS` from the advisory column types.
    pub fn create_table_sql(&self) -> String {
        let cols: Vec<String> = self
            .attributes()
            .filter_map(|attr| {
                let field = self.field_map.get(attr)?;
                let mut col_def = format!("{} {}", self.column(attr), field.column_type);
                if field.primary_key {
                    col_def.push_str(" PRIMARY KEY");
                }
                Some(col_def)
            })
            .collect();
        format!("CREATE TABLE IF NOT EXISTS {} ({})", self.table_name, cols.join(", "))
    }
}

/// `?, ?, ?` for `count` parameters.
pub fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}
