#![cfg(feature = "sqlite")]

mod common;

use common::{create, engine, id_of, order_with_lines};
use tessera::{
    obs::{metrics_report, metrics_reset_all},
    prelude::*,
};

#[test]
fn totals_follow_line_changes_through_two_hops() {
    let engine = engine();
    let env = engine.new_environment(SUPERUSER_ID).expect("environment");
    let (order, lines) = order_with_lines(&env, "SO-1", &[(2, 5.0), (1, 15.0)]);
    assert_eq!(lines[0].get("Subtotal").expect("subtotal"), Value::Float(10.0));
    assert_eq!(order.get("Total").expect("total"), Value::Float(25.0));

    metrics_reset_all();
    lines[0]
        .write(FieldMap::new().with("Qty", 3))
        .expect("write qty");

    assert_eq!(lines[0].get("Subtotal").expect("subtotal"), Value::Float(15.0));
    assert_eq!(order.get("Total").expect("total"), Value::Float(30.0));

    let report = metrics_report();
    assert_eq!(report.model("Order").updates, 1);
    assert_eq!(report.model("OrderLine").updates, 2);
}

#[test]
fn rewriting_the_same_value_triggers_no_order_update() {
    let engine = engine();
    let env = engine.new_environment(SUPERUSER_ID).expect("environment");
    let (_, lines) = order_with_lines(&env, "SO-1", &[(2, 5.0)]);

    metrics_reset_all();
    lines[0]
        .write(FieldMap::new().with("Qty", 2))
        .expect("write qty");

    let report = metrics_report();
    assert_eq!(report.model("OrderLine").updates, 1);
    assert_eq!(report.model("Order").updates, 0);
}

#[test]
fn stored_totals_are_persisted() {
    let engine = engine();

    let order_id = engine
        .execute_in_new_environment(SUPERUSER_ID, |env| {
            let (order, _) = order_with_lines(env, "SO-1", &[(4, 2.5)]);
            order.ensure_one()
        })
        .expect("create");

    engine
        .execute_in_new_environment(SUPERUSER_ID, |env| {
            let rows = env
                .pool("Order")?
                .browse(&[order_id])
                .read(&["Reference", "Total"])?;
            assert_eq!(
                rows,
                vec![FieldMap::new().with("Reference", "SO-1").with("Total", 10.0)]
            );
            Ok(())
        })
        .expect("read");
}

#[test]
fn moving_a_line_updates_both_orders() {
    let engine = engine();
    let env = engine.new_environment(SUPERUSER_ID).expect("environment");
    let (first, lines) = order_with_lines(&env, "SO-1", &[(1, 4.0), (1, 6.0)]);
    let (second, _) = order_with_lines(&env, "SO-2", &[]);

    lines[1]
        .write(FieldMap::new().with("Order", id_of(&second)))
        .expect("move line");

    assert_eq!(first.get("Total").expect("total"), Value::Float(4.0));
    assert_eq!(second.get("Total").expect("total"), Value::Float(6.0));
    assert_eq!(
        second.get("Lines").expect("lines"),
        Value::Ids(vec![id_of(&lines[1])])
    );
}

#[test]
fn replacing_lines_through_the_order_drops_the_old_ones() {
    let engine = engine();
    let env = engine.new_environment(SUPERUSER_ID).expect("environment");
    let (order, lines) = order_with_lines(&env, "SO-1", &[(1, 4.0), (1, 6.0)]);

    order
        .write(FieldMap::new().with("Lines", vec![id_of(&lines[0])]))
        .expect("replace lines");

    let remaining = env
        .pool("OrderLine")
        .expect("pool")
        .search(Condition::default())
        .expect("search");
    assert_eq!(remaining.ids(), &[id_of(&lines[0])]);
    assert_eq!(order.get("Total").expect("total"), Value::Float(4.0));
}

#[test]
fn unlinking_an_order_deletes_its_lines() {
    let engine = engine();
    let env = engine.new_environment(SUPERUSER_ID).expect("environment");
    let (order, _) = order_with_lines(&env, "SO-1", &[(1, 1.0), (2, 2.0)]);
    let (other, _) = order_with_lines(&env, "SO-2", &[(1, 9.0)]);

    assert_eq!(order.unlink().expect("unlink"), 1);

    let lines = env.pool("OrderLine").expect("pool");
    assert_eq!(lines.search_count(Condition::default()).expect("count"), 1);
    assert_eq!(other.get("Total").expect("total"), Value::Float(9.0));
}

#[test]
fn related_customer_name_tracks_the_customer() {
    let engine = engine();
    let env = engine.new_environment(SUPERUSER_ID).expect("environment");
    let ann = create(&env, "Customer", FieldMap::new().with("Name", "Ann"));
    let order = create(
        &env,
        "Order",
        FieldMap::new()
            .with("Reference", "SO-1")
            .with("Customer", id_of(&ann)),
    );

    assert_eq!(ann.get("Country").expect("default"), Value::from("FR"));
    assert_eq!(order.get("CustomerName").expect("related"), Value::from("Ann"));

    ann.write(FieldMap::new().with("Name", "Anna")).expect("rename");
    assert_eq!(order.get("CustomerName").expect("related"), Value::from("Anna"));
}

#[test]
fn on_change_previews_without_persisting() {
    let engine = engine();
    let env = engine.new_environment(SUPERUSER_ID).expect("environment");
    let (_, lines) = order_with_lines(&env, "SO-1", &[(2, 5.0)]);

    let preview = lines[0]
        .on_change(&FieldMap::new().with("Qty", 7))
        .expect("on_change");
    assert_eq!(preview, FieldMap::new().with("Subtotal", 35.0));

    assert_eq!(lines[0].get("Qty").expect("qty"), Value::Int(2));
    assert_eq!(lines[0].get("Subtotal").expect("subtotal"), Value::Float(10.0));
}
