use crate::value::{FieldMap, Value};
use proptest::prelude::*;

#[test]
fn relation_sets_compare_without_order() {
    let a = Value::Ids(vec![3, 1, 2]);
    let b = Value::Ids(vec![1, 2, 3]);

    assert!(a.same_as(&b));
    assert_ne!(a, b, "structural equality still sees order");
    assert!(!a.same_as(&Value::Ids(vec![1, 2])));
}

#[test]
fn field_maps_round_trip_through_json() {
    let map = FieldMap::new()
        .with("Name", "Ann")
        .with("Tags", Value::Ids(vec![1, 2]))
        .with("Total", 2.5)
        .with("Parent", Value::Null);

    let json = serde_json::to_value(&map).expect("serialize");
    assert_eq!(json["Tags"], serde_json::json!({ "Ids": [1, 2] }));
    assert_eq!(json["Parent"], serde_json::json!("Null"));

    let back: FieldMap = serde_json::from_value(json).expect("deserialize");
    assert_eq!(back, map);
}

#[test]
fn null_sentinel_matches_null_and_empty_sets() {
    assert!(Value::Int(0).is_null_fk());
    assert!(Value::Null.is_null_fk());
    assert!(!Value::Int(4).is_null_fk());

    assert!(Value::Null.same_as(&Value::Int(0)));
    assert!(Value::Ids(vec![]).same_as(&Value::Null));
    assert!(!Value::Ids(vec![7]).same_as(&Value::Int(0)));
}

#[test]
fn numbers_compare_across_representations() {
    assert!(Value::Int(25).same_as(&Value::Float(25.0)));
    assert!(!Value::Float(25.5).same_as(&Value::Int(25)));
    assert!(Value::Null.same_as(&Value::Float(0.0)));
}

#[test]
fn ids_of_many_to_one_value() {
    assert_eq!(Value::Int(5).ids(), vec![5]);
    assert!(Value::Int(0).ids().is_empty());
    assert_eq!(
        Value::List(vec![Value::Int(1), Value::Int(0), Value::Int(3)]).ids(),
        vec![1, 3]
    );
}

#[test]
fn field_map_builder_is_ordered() {
    let map = FieldMap::new()
        .with("Name", "John")
        .with("Age", 30)
        .with("Active", true);

    assert_eq!(map.key_list(), vec!["Active", "Age", "Name"]);
    assert_eq!(map.get("Age"), Some(&Value::Int(30)));
}

proptest! {
    #[test]
    fn id_sets_same_as_is_permutation_invariant(mut ids in prop::collection::vec(1i64..50, 0..8)) {
        let original = Value::Ids(ids.clone());
        ids.reverse();
        prop_assert!(original.same_as(&Value::Ids(ids)));
    }

    #[test]
    fn zero_values_match_null(n in -5i64..5) {
        prop_assert_eq!(Value::Null.same_as(&Value::Int(n)), n == 0);
    }
}
