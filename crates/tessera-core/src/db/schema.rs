//! Table creation for `Engine::sync_database`.
//!
//! Only missing tables are created; columns of existing tables are never
//! compared or altered.

use crate::{
    db::adapter::Dialect,
    model::{ID_FIELD, Model, ModelKind, Registry},
};

/// `CREATE TABLE IF NOT EXISTS` statements for every managed model, in
/// registration order (declared models first, link models after).
#[must_use]
pub fn create_table_statements(registry: &Registry, dialect: &dyn Dialect) -> Vec<String> {
    registry
        .models()
        .filter(|model| model.has_table())
        .map(|model| create_table(model, dialect))
        .collect()
}

fn create_table(model: &Model, dialect: &dyn Dialect) -> String {
    let mut columns: Vec<String> = model
        .column_fields()
        .map(|field| {
            let name = dialect.quote(field.json_name());
            if field.name() == ID_FIELD {
                return format!("{name} {}", dialect.primary_key());
            }

            let mut column = format!("{name} {}", dialect.column_type(field.kind()));
            if field.is_required() {
                column.push_str(" NOT NULL");
            }
            if field.is_unique() {
                column.push_str(" UNIQUE");
            }
            column
        })
        .collect();

    if model.kind() == ModelKind::Link {
        let endpoints: Vec<String> = model
            .column_fields()
            .filter(|field| field.kind().is_fk())
            .map(|field| dialect.quote(field.json_name()))
            .collect();
        columns.push(format!("UNIQUE ({})", endpoints.join(", ")));
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        dialect.quote(model.table()),
        columns.join(", ")
    )
}
