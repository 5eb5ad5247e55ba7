//! Shared fixtures for core unit tests.

use crate::{
    model::{Field, Method, Model, Registry},
    value::{FieldMap, Value},
};
use std::sync::{Arc, Once};

static INIT: Once = Once::new();

/// Install a fmt subscriber once per test binary; `RUST_LOG` overrides the
/// default `warn` filter.
pub fn init_tracing() {
    INIT.call_once(|| {
        use tracing_subscriber::{EnvFilter, fmt};

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Declared (not yet bootstrapped) fixture schema:
///
/// - `User` ↔ `Profile` (one-to-one / reverse), `User` → `Post` (one-to-many)
/// - `Post` ↔ `Tag` (many-to-many), `Tag.Parent` hierarchy
/// - `Invoice` → `InvoiceLine` with a stored `Total` and a transient `LineCount`
pub fn declare_fixture_registry() -> Registry {
    let mut registry = Registry::new();
    let models = [
        Model::new("User")
            .field(Field::char("Name").required())
            .field(Field::char("Email").unique())
            .field(Field::one2one("Profile", "Profile"))
            .field(Field::many2one("Manager", "User"))
            .field(Field::one2many("Posts", "Post", "User"))
            .field(Field::integer("Age").related("Profile.Age")),
        Model::new("Profile")
            .field(Field::integer("Age"))
            .field(Field::char("City"))
            .field(Field::rev2one("User", "User", "Profile")),
        Model::new("Post")
            .field(Field::char("Title").required())
            .field(Field::text("Content"))
            .field(Field::many2one("User", "User"))
            .field(Field::many2many("Tags", "Tag")),
        Model::new("Tag")
            .field(Field::char("Name"))
            .field(Field::many2one("Parent", "Tag"))
            .field(Field::many2many("Posts", "Post")),
        Model::new("Invoice")
            .field(Field::char("Name"))
            .field(Field::one2many("Lines", "InvoiceLine", "Invoice"))
            .field(
                Field::float("Total")
                    .compute("ComputeTotal")
                    .stored()
                    .depends(["Lines.Amount"]),
            )
            .field(
                Field::integer("LineCount")
                    .compute("ComputeLineCount")
                    .depends(["Lines"]),
            )
            .method("ComputeTotal", Method::compute(compute_total))
            .method("ComputeLineCount", Method::compute(compute_line_count)),
        Model::new("InvoiceLine")
            .field(Field::many2one("Invoice", "Invoice").required())
            .field(Field::float("Amount")),
    ];

    for model in models {
        registry.add_model(model).expect("fixture model should register");
    }

    registry
}

/// Bootstrapped fixture schema.
pub fn fixture_registry() -> Arc<Registry> {
    let mut registry = declare_fixture_registry();
    registry.bootstrap().expect("fixture schema should bootstrap");

    Arc::new(registry)
}

fn compute_total(
    rs: &crate::db::record::RecordCollection<'_>,
) -> Result<FieldMap, crate::error::InternalError> {
    let total: f64 = rs
        .related("Lines")?
        .values("Amount")?
        .iter()
        .filter_map(Value::as_f64)
        .sum();

    Ok(FieldMap::new().with("Total", total))
}

fn compute_line_count(
    rs: &crate::db::record::RecordCollection<'_>,
) -> Result<FieldMap, crate::error::InternalError> {
    let count = rs.related("Lines")?.len();

    Ok(FieldMap::new().with("LineCount", i64::try_from(count).unwrap_or(i64::MAX)))
}
