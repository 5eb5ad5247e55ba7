//! Dialect adapters: identifier quoting, operator mapping, placeholder style
//! and column types for one SQL driver.

mod postgres;
mod sqlite;

pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

use crate::{config::Driver, db::query::Operator, model::FieldKind, value::Value};

///
/// Dialect
///
/// The query builder is driver-agnostic apart from these calls.
///

pub trait Dialect: Send + Sync {
    fn driver_name(&self) -> &'static str;

    /// Quote an identifier (table, column or alias).
    fn quote(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// SQL for `op` applied to a column, with `?` placeholders, and the
    /// values to bind. List operators get one placeholder per element and are
    /// never called with an empty list.
    fn operator_sql(&self, op: Operator, arg: Value) -> (String, Vec<Value>) {
        default_operator_sql(op, arg)
    }

    /// Rewrite `?` placeholders to the driver's native style.
    fn rebind(&self, sql: &str) -> String {
        sql.to_string()
    }

    /// LIMIT / OFFSET tail of a select, empty when neither is set.
    fn limit_clause(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        let mut parts = Vec::new();
        if let Some(limit) = limit {
            parts.push(format!("LIMIT {limit}"));
        }
        if let Some(offset) = offset {
            parts.push(format!("OFFSET {offset}"));
        }
        parts.join(" ")
    }

    /// Column type used when creating tables.
    fn column_type(&self, kind: FieldKind) -> &'static str;

    /// Full primary key column declaration (type and constraints).
    fn primary_key(&self) -> &'static str;
}

/// Dialect of a configured driver.
#[must_use]
pub fn dialect_for(driver: Driver) -> &'static dyn Dialect {
    match driver {
        Driver::Postgres => &PostgresDialect,
        Driver::Sqlite => &SqliteDialect,
    }
}

pub(crate) fn default_operator_sql(op: Operator, arg: Value) -> (String, Vec<Value>) {
    let like = |pattern: &str, arg: Value| {
        let text = match arg {
            Value::Text(s) => s,
            other => value_text(&other),
        };
        (pattern.to_string(), vec![Value::Text(format!("%{text}%"))])
    };

    match op {
        Operator::Contains => like("LIKE ?", arg),
        Operator::NotContains => like("NOT LIKE ?", arg),
        Operator::IContains => like("ILIKE ?", arg),
        Operator::NotIContains => like("NOT ILIKE ?", arg),
        Operator::In | Operator::NotIn => {
            let elements = arg.into_elements();
            let marks = vec!["?"; elements.len()].join(", ");
            let keyword = if op == Operator::In { "IN" } else { "NOT IN" };
            (format!("{keyword} ({marks})"), elements)
        }
        other => (format!("{} ?", other.sql_symbol()), vec![arg]),
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Bool(b) => b.to_string(),
        Value::Int(n) => n.to_string(),
        Value::Float(x) => x.to_string(),
        Value::Text(s) => s.clone(),
        _ => String::new(),
    }
}
