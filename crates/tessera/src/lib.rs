//! ## Crate layout
//! - `core`: schema registry, condition trees, SQL generation, record cache,
//!   environments and dependency-driven recomputation.
//!
//! The `prelude` module carries what application code needs to declare a
//! schema, open an engine and work with records.

pub use tessera_core as core;

pub use tessera_core::{config, db, error, model, obs, value};

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

///
/// Prelude
///

pub mod prelude {
    pub use tessera_core::prelude::*;

    pub use tessera_core::{
        db::{AccessOracle, Context, Permission, SUPERUSER_ID},
        error::ErrorClass,
    };
}
