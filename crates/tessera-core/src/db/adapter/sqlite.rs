use crate::{
    db::{
        adapter::{Dialect, default_operator_sql},
        query::Operator,
    },
    model::FieldKind,
    value::Value,
};

///
/// SqliteDialect
///
/// SQLite has no ILIKE; its LIKE is already case-insensitive for ASCII, so
/// the case-insensitive operators map onto LIKE.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn driver_name(&self) -> &'static str {
        "sqlite3"
    }

    fn operator_sql(&self, op: Operator, arg: Value) -> (String, Vec<Value>) {
        let op = match op {
            Operator::ILike => Operator::Like,
            Operator::IContains => Operator::Contains,
            Operator::NotIContains => Operator::NotContains,
            other => other,
        };

        default_operator_sql(op, arg)
    }

    /// SQLite only accepts OFFSET after a LIMIT; `-1` means unbounded.
    fn limit_clause(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        match (limit, offset) {
            (None, None) => String::new(),
            (Some(limit), None) => format!("LIMIT {limit}"),
            (limit, Some(offset)) => {
                let limit = limit.map_or_else(|| "-1".to_string(), |l| l.to_string());
                format!("LIMIT {limit} OFFSET {offset}")
            }
        }
    }

    fn column_type(&self, kind: FieldKind) -> &'static str {
        match kind {
            FieldKind::Binary => "BLOB",
            FieldKind::Boolean
            | FieldKind::Integer
            | FieldKind::Many2One
            | FieldKind::One2One
            | FieldKind::One2Many
            | FieldKind::Many2Many
            | FieldKind::Rev2One => "INTEGER",
            FieldKind::Float => "REAL",
            FieldKind::Char
            | FieldKind::Date
            | FieldKind::DateTime
            | FieldKind::Selection
            | FieldKind::Text => "TEXT",
        }
    }

    fn primary_key(&self) -> &'static str {
        "INTEGER PRIMARY KEY AUTOINCREMENT"
    }
}
