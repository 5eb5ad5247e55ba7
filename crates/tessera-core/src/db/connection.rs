use crate::{db::adapter::Dialect, error::InternalError, value::Value};

/// Result rows of one statement, columns in select order.
pub type Rows = Vec<Vec<Value>>;

///
/// Connection
///
/// Blocking handle on one database session. Statements use `?` placeholders
/// already rebound by the dialect; values arrive in storage shape.
///

pub trait Connection {
    fn dialect(&self) -> &'static dyn Dialect;

    fn query(&self, sql: &str, params: &[Value]) -> Result<Rows, InternalError>;

    /// Run a statement, returning the number of affected rows.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, InternalError>;

    fn begin(&self) -> Result<(), InternalError>;

    fn commit(&self) -> Result<(), InternalError>;

    fn rollback(&self) -> Result<(), InternalError>;
}

///
/// Database
///
/// Shared source of connections. Every environment opens its own.
///

pub trait Database: Send + Sync {
    fn dialect(&self) -> &'static dyn Dialect;

    fn connect(&self) -> Result<Box<dyn Connection>, InternalError>;
}
