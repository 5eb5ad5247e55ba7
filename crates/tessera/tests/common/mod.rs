//! Shop schema shared by the integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Once};
use tessera::prelude::*;

static INIT: Once = Once::new();

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

/// Customers place orders made of lines; each line has a stored subtotal and
/// each order a stored total over its line subtotals. Products sit in a
/// category tree and belong to many categories.
pub fn shop_registry() -> Arc<Registry> {
    let mut registry = Registry::new();
    let models = [
        Model::new("Customer")
            .field(Field::char("Name").required())
            .field(Field::char("Country").default_value("FR"))
            .field(Field::one2many("Orders", "Order", "Customer")),
        Model::new("Order")
            .field(Field::char("Reference").required().unique())
            .field(Field::many2one("Customer", "Customer"))
            .field(Field::char("CustomerName").related("Customer.Name"))
            .field(Field::one2many("Lines", "OrderLine", "Order"))
            .field(
                Field::float("Total")
                    .compute("ComputeTotal")
                    .stored()
                    .depends(["Lines.Subtotal"]),
            )
            .method("ComputeTotal", Method::compute(compute_total)),
        Model::new("OrderLine")
            .field(Field::many2one("Order", "Order").required())
            .field(Field::many2one("Product", "Product"))
            .field(Field::integer("Qty").default_value(1).on_change("OnQty"))
            .field(Field::float("UnitPrice"))
            .field(
                Field::float("Subtotal")
                    .compute("ComputeSubtotal")
                    .stored()
                    .depends(["Qty", "UnitPrice"]),
            )
            .method("ComputeSubtotal", Method::compute(compute_subtotal))
            .method("OnQty", Method::on_change(compute_subtotal)),
        Model::new("Product")
            .field(Field::char("Name").required())
            .field(Field::float("Price"))
            .field(Field::many2many("Categories", "Category")),
        Model::new("Category")
            .field(Field::char("Name").required())
            .field(Field::many2one("Parent", "Category"))
            .field(Field::many2many("Products", "Product")),
    ];

    for model in models {
        registry.add_model(model).expect("shop model should register");
    }
    registry.bootstrap().expect("shop schema should bootstrap");

    Arc::new(registry)
}

fn compute_subtotal(rs: &RecordCollection<'_>) -> Result<FieldMap, InternalError> {
    let qty = rs.get("Qty")?.as_f64().unwrap_or_default();
    let price = rs.get("UnitPrice")?.as_f64().unwrap_or_default();

    Ok(FieldMap::new().with("Subtotal", qty * price))
}

fn compute_total(rs: &RecordCollection<'_>) -> Result<FieldMap, InternalError> {
    let total: f64 = rs
        .related("Lines")?
        .values("Subtotal")?
        .iter()
        .filter_map(Value::as_f64)
        .sum();

    Ok(FieldMap::new().with("Total", total))
}

pub fn engine_with(config: EngineConfig) -> Engine {
    init_tracing();
    let database = SqliteDatabase::open_in_memory().expect("in-memory sqlite should open");
    let engine =
        Engine::new(shop_registry(), Arc::new(database), config).expect("engine should open");
    engine.sync_database().expect("tables should be created");

    engine
}

pub fn engine() -> Engine {
    engine_with(EngineConfig::default())
}

pub fn create<'env>(
    env: &'env Environment,
    model: &str,
    values: FieldMap,
) -> RecordCollection<'env> {
    env.pool(model)
        .expect("shop model")
        .create(values)
        .expect("create should succeed")
}

pub fn id_of(rc: &RecordCollection<'_>) -> i64 {
    rc.ensure_one().expect("singleton")
}

/// An order with one line per `(qty, unit price)` pair.
pub fn order_with_lines<'env>(
    env: &'env Environment,
    reference: &str,
    lines: &[(i64, f64)],
) -> (RecordCollection<'env>, Vec<RecordCollection<'env>>) {
    let order = create(env, "Order", FieldMap::new().with("Reference", reference));
    let lines = lines
        .iter()
        .map(|&(qty, price)| {
            create(
                env,
                "OrderLine",
                FieldMap::new()
                    .with("Order", id_of(&order))
                    .with("Qty", qty)
                    .with("UnitPrice", price),
            )
        })
        .collect();

    (order, lines)
}
