//! SQLite storage through rusqlite.
//!
//! All connections of one `SqliteDatabase` share a single rusqlite handle.
//! Each connection's transaction is a named savepoint, so an environment
//! opened while another is running nests inside it.

use crate::{
    db::{
        adapter::{Dialect, SqliteDialect},
        connection::{Connection, Database, Rows},
    },
    error::InternalError,
    value::Value,
};
use rusqlite::types::{Value as SqlValue, ValueRef};
use std::{
    path::Path,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
};

impl From<rusqlite::Error> for InternalError {
    fn from(err: rusqlite::Error) -> Self {
        Self::storage(err.to_string())
    }
}

type Shared = Arc<Mutex<rusqlite::Connection>>;

fn lock(shared: &Shared) -> Result<MutexGuard<'_, rusqlite::Connection>, InternalError> {
    shared
        .lock()
        .map_err(|_| InternalError::storage("sqlite handle lock poisoned"))
}

///
/// SqliteDatabase
///

#[derive(Debug)]
pub struct SqliteDatabase {
    shared: Shared,
    savepoints: AtomicU64,
}

impl SqliteDatabase {
    pub fn open(path: &Path) -> Result<Self, InternalError> {
        Ok(Self::wrap(rusqlite::Connection::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self, InternalError> {
        Ok(Self::wrap(rusqlite::Connection::open_in_memory()?))
    }

    fn wrap(conn: rusqlite::Connection) -> Self {
        Self {
            shared: Arc::new(Mutex::new(conn)),
            savepoints: AtomicU64::new(0),
        }
    }
}

impl Database for SqliteDatabase {
    fn dialect(&self) -> &'static dyn Dialect {
        &SqliteDialect
    }

    fn connect(&self) -> Result<Box<dyn Connection>, InternalError> {
        let n = self.savepoints.fetch_add(1, Ordering::Relaxed);

        Ok(Box::new(SqliteConnection {
            shared: Arc::clone(&self.shared),
            savepoint: format!("tessera_sp_{n}"),
        }))
    }
}

///
/// SqliteConnection
///

#[derive(Debug)]
pub struct SqliteConnection {
    shared: Shared,
    savepoint: String,
}

impl Connection for SqliteConnection {
    fn dialect(&self) -> &'static dyn Dialect {
        &SqliteDialect
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<Rows, InternalError> {
        let params = to_sql_params(params)?;
        let conn = lock(&self.shared)?;
        let mut stmt = conn.prepare(sql)?;
        let width = stmt.column_count();
        let mut rows = stmt.query(rusqlite::params_from_iter(params))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(from_sql(row.get_ref(i)?));
            }
            out.push(values);
        }

        Ok(out)
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, InternalError> {
        let params = to_sql_params(params)?;
        let changed = lock(&self.shared)?.execute(sql, rusqlite::params_from_iter(params))?;

        Ok(u64::try_from(changed).unwrap_or(u64::MAX))
    }

    fn begin(&self) -> Result<(), InternalError> {
        lock(&self.shared)?.execute_batch(&format!("SAVEPOINT {}", self.savepoint))?;

        Ok(())
    }

    fn commit(&self) -> Result<(), InternalError> {
        lock(&self.shared)?.execute_batch(&format!("RELEASE {}", self.savepoint))?;

        Ok(())
    }

    fn rollback(&self) -> Result<(), InternalError> {
        let sp = &self.savepoint;
        lock(&self.shared)?.execute_batch(&format!("ROLLBACK TO {sp}; RELEASE {sp}"))?;

        Ok(())
    }
}

fn to_sql_params(params: &[Value]) -> Result<Vec<SqlValue>, InternalError> {
    params.iter().map(to_sql).collect()
}

fn to_sql(value: &Value) -> Result<SqlValue, InternalError> {
    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Int(n) => SqlValue::Integer(*n),
        Value::Float(x) => SqlValue::Real(*x),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Blob(b) => SqlValue::Blob(b.clone()),
        Value::Ids(_) | Value::List(_) => {
            return Err(InternalError::query(
                "list values cannot be bound to a single placeholder",
            ));
        }
    })
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(n) => Value::Int(n),
        ValueRef::Real(x) => Value::Float(x),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> SqliteDatabase {
        let db = SqliteDatabase::open_in_memory().expect("in-memory sqlite");
        let conn = db.connect().expect("connect");
        conn.execute(
            r#"CREATE TABLE "t" ("id" INTEGER PRIMARY KEY AUTOINCREMENT, "name" TEXT)"#,
            &[],
        )
        .expect("create table");

        db
    }

    #[test]
    fn insert_returning_and_select_round_trip() {
        let db = db();
        let conn = db.connect().expect("connect");

        let rows = conn
            .query(
                r#"INSERT INTO "t" ("name") VALUES (?) RETURNING "id""#,
                &[Value::from("a")],
            )
            .expect("insert");
        assert_eq!(rows, vec![vec![Value::Int(1)]]);

        let rows = conn
            .query(r#"SELECT "id", "name" FROM "t""#, &[])
            .expect("select");
        assert_eq!(rows, vec![vec![Value::Int(1), Value::from("a")]]);
    }

    #[test]
    fn rollback_discards_only_the_inner_savepoint() {
        let db = db();
        let outer = db.connect().expect("connect");
        let inner = db.connect().expect("connect");

        outer.begin().expect("begin");
        outer
            .execute(r#"INSERT INTO "t" ("name") VALUES ('kept')"#, &[])
            .expect("insert");
        inner.begin().expect("begin");
        inner
            .execute(r#"INSERT INTO "t" ("name") VALUES ('dropped')"#, &[])
            .expect("insert");
        inner.rollback().expect("rollback");
        outer.commit().expect("commit");

        let rows = outer.query(r#"SELECT "name" FROM "t""#, &[]).expect("select");
        assert_eq!(rows, vec![vec![Value::from("kept")]]);
    }

    #[test]
    fn list_parameters_are_rejected() {
        let db = db();
        let conn = db.connect().expect("connect");

        let err = conn
            .query(r#"SELECT "id" FROM "t" WHERE "id" = ?"#, &[Value::Ids(vec![1])])
            .expect_err("list binding must fail");
        assert!(err.is_schema());
    }
}
