#![cfg(feature = "sqlite")]

mod common;

use common::{create, engine, engine_with, id_of, shop_registry};
use std::sync::Arc;
use tessera::{config::Driver, prelude::*};

#[test]
fn config_is_read_from_toml() {
    let config = EngineConfig::from_toml_str(
        r#"
        [engine]
        driver = "sqlite"
        max_trigger_depth = 8
        log_sql = false
        "#,
    )
    .expect("config should parse");

    assert_eq!(config.driver, Driver::Sqlite);
    assert_eq!(config.max_trigger_depth, 8);
    assert!(config.recompute_stored_fields);

    let engine = engine_with(config);
    assert_eq!(engine.config().max_trigger_depth, 8);
}

#[test]
fn mismatched_driver_is_refused() {
    let database = SqliteDatabase::open_in_memory().expect("sqlite");
    let config = EngineConfig {
        driver: Driver::Postgres,
        ..EngineConfig::default()
    };

    let err = Engine::new(shop_registry(), Arc::new(database), config)
        .err()
        .expect("driver mismatch");
    assert_eq!(err.class, ErrorClass::Config);
}

#[test]
fn unbootstrapped_registry_is_refused() {
    let database = SqliteDatabase::open_in_memory().expect("sqlite");
    let registry = Arc::new(Registry::new());

    assert!(Engine::new(registry, Arc::new(database), EngineConfig::default()).is_err());
}

#[test]
fn sync_database_is_repeatable() {
    let engine = engine();
    engine.sync_database().expect("second sync");

    let env = engine.new_environment(SUPERUSER_ID).expect("environment");
    create(&env, "Customer", FieldMap::new().with("Name", "Ann"));
    env.commit().expect("commit");

    engine.sync_database().expect("third sync");
    let count = engine
        .execute_in_new_environment(SUPERUSER_ID, |env| {
            env.pool("Customer")?.search_count(Condition::default())
        })
        .expect("count");
    assert_eq!(count, 1);
}

#[test]
fn failing_closure_rolls_back_everything() {
    let engine = engine();

    let result: Result<(), InternalError> = engine.execute_in_new_environment(SUPERUSER_ID, |env| {
        env.pool("Customer")?
            .create(FieldMap::new().with("Name", "Ghost"))?;
        env.pool("Order")?
            .create(FieldMap::new().with("Customer", 1))?;
        Ok(())
    });
    let err = result.expect_err("Reference is required");
    assert_eq!(err.class, ErrorClass::Storage);

    let count = engine
        .execute_in_new_environment(SUPERUSER_ID, |env| {
            env.pool("Customer")?.search_count(Condition::default())
        })
        .expect("count");
    assert_eq!(count, 0);
}

#[test]
fn dropped_environment_rolls_back() {
    let engine = engine();
    {
        let env = engine.new_environment(SUPERUSER_ID).expect("environment");
        create(&env, "Customer", FieldMap::new().with("Name", "Ann"));
    }

    let env = engine.new_environment(SUPERUSER_ID).expect("environment");
    let customers = env.pool("Customer").expect("pool");
    assert_eq!(customers.search_count(Condition::default()).expect("count"), 0);
}

#[test]
fn unique_reference_is_enforced_by_storage() {
    let engine = engine();
    let env = engine.new_environment(SUPERUSER_ID).expect("environment");
    create(&env, "Order", FieldMap::new().with("Reference", "SO-1"));

    let err = env
        .pool("Order")
        .expect("pool")
        .create(FieldMap::new().with("Reference", "SO-1"))
        .expect_err("duplicate reference");
    assert_eq!(err.class, ErrorClass::Storage);
}

///
/// ShopOracle
///
/// Clerks may not see or touch prices and may not delete orders.
///

struct ShopOracle;

impl AccessOracle for ShopOracle {
    fn check_field_permission(&self, model: &str, field: &str, _: i64, _: Permission) -> bool {
        !(model == "Product" && field == "Price")
    }

    fn check_model_permission(&self, model: &str, _: i64, permission: Permission) -> bool {
        !(model == "Order" && permission == Permission::Unlink)
    }
}

const CLERK: i64 = 42;

#[test]
fn clerks_are_limited_by_the_oracle() {
    let engine = engine().with_oracle(Arc::new(ShopOracle));
    let (product, order) = engine
        .execute_in_new_environment(SUPERUSER_ID, |env| {
            let product = env
                .pool("Product")?
                .create(FieldMap::new().with("Name", "Rake").with("Price", 12.0))?;
            let order = env
                .pool("Order")?
                .create(FieldMap::new().with("Reference", "SO-1"))?;
            Ok((product.ensure_one()?, order.ensure_one()?))
        })
        .expect("seed");

    let env = engine.new_environment(CLERK).expect("environment");
    assert!(!env.is_superuser());

    let rake = env.pool("Product").expect("pool").browse(&[product]);
    assert_eq!(rake.get("Name").expect("name"), Value::from("Rake"));
    assert_eq!(rake.get("Price").expect("hidden"), Value::Float(0.0));
    assert_eq!(
        rake.read(&[]).expect("read")[0].get("Price"),
        None,
        "hidden fields are left out of reads"
    );

    let err = rake
        .write(FieldMap::new().with("Price", 1.0))
        .expect_err("price is not writable");
    assert_eq!(err.class, ErrorClass::PermissionDenied);
    rake.write(FieldMap::new().with("Name", "Big rake"))
        .expect("name is writable");

    let err = env
        .pool("Order")
        .expect("pool")
        .browse(&[order])
        .unlink()
        .expect_err("orders cannot be deleted");
    assert_eq!(err.class, ErrorClass::PermissionDenied);
}

#[test]
fn invalidated_cache_rereads_storage() {
    let engine = engine();
    let env = engine.new_environment(SUPERUSER_ID).expect("environment");
    let ann = create(&env, "Customer", FieldMap::new().with("Name", "Ann"));

    let other = engine.new_environment(SUPERUSER_ID).expect("nested environment");
    other
        .pool("Customer")
        .expect("pool")
        .browse(&[id_of(&ann)])
        .write(FieldMap::new().with("Name", "Anna"))
        .expect("write elsewhere");
    other.commit().expect("release nested");

    assert_eq!(ann.get("Name").expect("cached"), Value::from("Ann"));
    env.invalidate_cache();
    assert_eq!(ann.get("Name").expect("reloaded"), Value::from("Anna"));
}
