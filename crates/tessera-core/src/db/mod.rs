//! Storage-facing runtime: environments, record collections, the cache, SQL
//! generation and driver adapters.

pub mod adapter;
pub mod cache;
pub mod connection;
pub mod env;
pub mod query;
pub mod record;
pub mod schema;
pub mod security;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use connection::{Connection, Database, Rows};
pub use env::{Engine, Environment};
pub use record::{Context, RecordCollection};
pub use security::{AccessOracle, AllowAll, Permission, SUPERUSER_ID};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
