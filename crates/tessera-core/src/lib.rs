//! Core runtime for Tessera: schema registry, condition trees, SQL
//! generation, the record cache and dependency-driven recomputation.

pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod obs;
pub mod value;

// test
#[cfg(test)]
pub(crate) mod test_support;

///
/// Prelude
///
/// Vocabulary needed to declare a schema, open an engine and work with
/// records.
///

pub mod prelude {
    pub use crate::{
        config::EngineConfig,
        db::{
            Engine, Environment, RecordCollection,
            query::{Condition, Operator, Query},
        },
        error::InternalError,
        model::{Field, Method, Model, Registry},
        value::{FieldMap, Value},
    };

    #[cfg(feature = "sqlite")]
    pub use crate::db::SqliteDatabase;
}
