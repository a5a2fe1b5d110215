//! End-to-end coverage for [`graph_cache::Cache`]: the literal scenarios
//! and testable properties this crate is built against.

use std::cell::RefCell;
use std::rc::Rc;

use cache_core::document::Doc;
use cache_core::write::IdExtract;
use graph_cache::{Cache, ReadRequest, WatchRequest, WriteRequest};
use graphql_parser::query::parse_query;
use proptest::prelude::*;
use serde_json::json;

fn doc(source: &str) -> Doc<'static> {
    parse_query::<String>(source).unwrap().into_static()
}

fn id_by_id_field(value: &serde_json::Value) -> IdExtract {
    match value.get("id").and_then(serde_json::Value::as_str) {
        Some(id) => IdExtract::Stable(id.to_string()),
        None => IdExtract::None,
    }
}

// S1 — nested normalization: stable IDs at every level produce
// non-synthetic references chained from ROOT_QUERY down.
#[test]
fn s1_nested_normalization_uses_stable_ids_throughout() {
    let cache = Cache::new();
    let query = doc("query { a b c d { e f g h { i j k } } }");
    let result = json!({
        "a": 1, "b": 2, "c": 3,
        "d": {
            "id": "foo", "e": 4, "f": 5, "g": 6,
            "h": { "id": "bar", "i": 7, "j": 8, "k": 9 },
        },
    });

    let extractor: &cache_core::write::IdExtractor<'_> = &id_by_id_field;
    cache
        .write(WriteRequest::new(&query, Default::default(), result).id_extractor(extractor))
        .unwrap();

    let extracted = cache.extract(false);
    let entities = extracted.as_object().unwrap();
    assert!(entities.contains_key("ROOT_QUERY"));
    assert!(entities.contains_key("foo"));
    assert!(entities.contains_key("bar"));

    let root_d = &entities["ROOT_QUERY"]["d"];
    assert_eq!(root_d["$ref"], "foo");
    assert_eq!(root_d["synthetic"], false);

    let foo_h = &entities["foo"]["h"];
    assert_eq!(foo_h["$ref"], "bar");
    assert_eq!(foo_h["synthetic"], false);
}

// S2 — argument canonicalization: literal vs variable arguments that
// resolve to the same value land on the same storage key.
#[test]
fn s2_argument_canonicalization_keys_literal_and_variable_args_alike() {
    let cache = Cache::new();
    let query = doc(
        "query($l: Boolean, $v: Int) { a: field(literal: true, value: 42) b: field(literal: $l, value: $v) }",
    );
    let variables: cache_core::document::Variables =
        [("l".to_string(), json!(false)), ("v".to_string(), json!(42))]
            .into_iter()
            .collect();

    let result = json!({"a": 1, "b": 2});
    cache.write(WriteRequest::new(&query, variables, result)).unwrap();

    let extracted = cache.extract(false);
    let root = &extracted["ROOT_QUERY"];
    assert_eq!(root[r#"field({"literal":true,"value":42})"#], 1);
    assert_eq!(root[r#"field({"literal":false,"value":42})"#], 2);
}

// S3 — optimistic stacking: layers compose top-to-bottom, the base is
// never touched, and removing a layer reveals the one below it.
#[test]
fn s3_optimistic_stacking_removes_in_any_order() {
    let cache = Cache::new();
    let query = doc("query { book { id title } }");

    let base_result = json!({"book": {"id": "Book:X", "title": "1984"}});
    let extractor: &cache_core::write::IdExtractor<'_> = &id_by_id_field;
    cache
        .write(WriteRequest::new(&query, Default::default(), base_result).id_extractor(extractor))
        .unwrap();

    cache
        .record_optimistic_transaction("first", |writer| {
            writer
                .write(
                    WriteRequest::new(&query, Default::default(), json!({"book": {"id": "Book:X", "title": "2666"}}))
                        .id_extractor(extractor),
                )
                .map(|_| ())
        })
        .unwrap();

    cache
        .record_optimistic_transaction("second", |writer| {
            writer
                .write(
                    WriteRequest::new(
                        &query,
                        Default::default(),
                        json!({"book": {"id": "Book:X", "title": "Catch-22"}}),
                    )
                    .id_extractor(extractor),
                )
                .map(|_| ())
        })
        .unwrap();

    let optimistic_read = |cache: &Cache| {
        cache
            .read(ReadRequest::new(&query, Default::default()).optimistic(true))
            .unwrap()
            .data
    };

    assert_eq!(optimistic_read(&cache)["book"]["title"], "Catch-22");

    assert!(cache.remove_optimistic("first"));
    assert_eq!(optimistic_read(&cache)["book"]["title"], "Catch-22");

    assert!(cache.remove_optimistic("second"));
    assert_eq!(optimistic_read(&cache)["book"]["title"], "1984");

    let base_read = cache.read(ReadRequest::new(&query, Default::default())).unwrap();
    assert_eq!(base_read.data["book"]["title"], "1984");
}

// S4 — transaction batching: two writes inside one performTransaction
// body fire exactly one watch callback.
#[test]
fn s4_transaction_batches_every_write_into_one_broadcast() {
    let cache = Cache::new();
    let query = doc("query { a }");

    cache
        .write(WriteRequest::new(&query, Default::default(), json!({"a": 0})))
        .unwrap();

    let calls = Rc::new(RefCell::new(0u32));
    let calls_clone = Rc::clone(&calls);
    cache.watch(WatchRequest::new(&query, Default::default(), move |_| {
        *calls_clone.borrow_mut() += 1;
    }));
    assert_eq!(*calls.borrow(), 1, "registering a watch performs its initial read");

    cache
        .perform_transaction(|proxy| {
            proxy.write(WriteRequest::new(&query, Default::default(), json!({"a": 1})))?;
            proxy.write(WriteRequest::new(&query, Default::default(), json!({"a": 4, "b": 5, "c": 6})))?;
            Ok(())
        })
        .unwrap();

    assert_eq!(*calls.borrow(), 2, "two writes in one transaction must fire exactly one callback");
}

// S5 — referential equality across reads.
#[test]
fn s5_unrelated_writes_preserve_referential_equality() {
    let cache = Cache::new();
    let query = doc("query { a }");
    let other_query = doc("query { z }");

    cache
        .write(WriteRequest::new(&query, Default::default(), json!({"a": 1})))
        .unwrap();

    let (first, _) = cache.diff(ReadRequest::new(&query, Default::default()), None).unwrap();
    let (second, _) = cache
        .diff(ReadRequest::new(&query, Default::default()), Some(&first))
        .unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &second));

    cache
        .write(WriteRequest::new(&other_query, Default::default(), json!({"z": 99})))
        .unwrap();

    let (third, _) = cache
        .diff(ReadRequest::new(&query, Default::default()), Some(&second))
        .unwrap();
    assert!(
        std::sync::Arc::ptr_eq(&second, &third),
        "a write with no overlapping dependency must not change identity"
    );
}

// S6 — partial read: returnPartial=true yields a partial tree and
// complete=false; returnPartial=false surfaces a MissingField error.
#[test]
fn s6_partial_read_toggles_between_partial_result_and_error() {
    let cache = Cache::new();
    let write_query = doc(r#"query { people_one(id: "1") { name } }"#);
    cache
        .write(WriteRequest::new(&write_query, Default::default(), json!({"people_one": {"name": "Ada"}})))
        .unwrap();

    let read_query = doc(r#"query { people_one(id: "1") { name age } }"#);

    let lenient = cache
        .read(ReadRequest::new(&read_query, Default::default()).return_partial(true))
        .unwrap();
    assert!(!lenient.complete);
    assert_eq!(lenient.data["people_one"]["name"], "Ada");

    let strict = cache.read(ReadRequest::new(&read_query, Default::default()).return_partial(false));
    let err = strict.expect_err("a missing required field must error when returnPartial is false");
    assert!(err.is_missing_field());
    assert!(err.message.contains("age"));
}

// Property 1 — round-trip: writing a literal tree and reading it back
// with the same document reproduces the same values.
#[test]
fn property_round_trip_write_then_read() {
    let cache = Cache::new();
    let query = doc("query { name age active }");
    let result = json!({"name": "Rin", "age": 30, "active": true});
    cache
        .write(WriteRequest::new(&query, Default::default(), result.clone()))
        .unwrap();

    let outcome = cache.read(ReadRequest::new(&query, Default::default())).unwrap();
    assert_eq!(outcome.data, result);
    assert!(outcome.complete);
}

// Property 2 — merge monotonicity: an unrelated write must not erase
// fields a previous write put on the same root.
#[test]
fn property_merge_monotonicity_preserves_untouched_fields() {
    let cache = Cache::new();
    let q1 = doc("query { a b }");
    let q2 = doc("query { c }");

    cache
        .write(WriteRequest::new(&q1, Default::default(), json!({"a": 1, "b": 2})))
        .unwrap();
    cache
        .write(WriteRequest::new(&q2, Default::default(), json!({"c": 3})))
        .unwrap();

    let outcome = cache.read(ReadRequest::new(&q1, Default::default())).unwrap();
    assert_eq!(outcome.data, json!({"a": 1, "b": 2}));
}

// Property 3 — referential stability: a watch callback fires with a new
// top-level object when a selected field changes, but a sibling field
// that did not change keeps its previous pointer inside that new object.
#[test]
fn property_3_changed_watch_result_still_reuses_the_untouched_sub_object() {
    let cache = Cache::new();
    let query = doc("query { a b { x } }");
    cache
        .write(WriteRequest::new(&query, Default::default(), json!({"a": 1, "b": {"x": 1}})))
        .unwrap();

    let seen: Rc<RefCell<Vec<cache_core::diff::SharedValue>>> = Rc::new(RefCell::new(Vec::new()));
    let seen_clone = Rc::clone(&seen);
    cache.watch(WatchRequest::new(&query, Default::default(), move |value| {
        seen_clone.borrow_mut().push(std::sync::Arc::clone(value));
    }));
    assert_eq!(seen.borrow().len(), 1, "registering a watch performs its initial read");

    cache
        .write(WriteRequest::new(&query, Default::default(), json!({"a": 2, "b": {"x": 1}})))
        .unwrap();
    assert_eq!(seen.borrow().len(), 2, "a changed field must fire the callback");

    let before = &seen.borrow()[0];
    let after = &seen.borrow()[1];
    assert!(!std::sync::Arc::ptr_eq(before, after), "the changed top-level object must not be the previous one");

    let (cache_core::diff::Node::Object(before_fields), cache_core::diff::Node::Object(after_fields)) =
        (before.as_ref(), after.as_ref())
    else {
        panic!("expected object nodes");
    };
    let before_b = &before_fields.iter().find(|(k, _)| k == "b").unwrap().1;
    let after_b = &after_fields.iter().find(|(k, _)| k == "b").unwrap().1;
    assert!(std::sync::Arc::ptr_eq(before_b, after_b), "an unchanged sub-object must keep its previous pointer");
}

// Property 4 — layer removal semantics: removing a middle layer must
// equal replaying the surviving layers over the base, not erasing the
// removed one from an otherwise-frozen composite.
#[test]
fn property_layer_removal_replays_surviving_layers_over_base() {
    let cache = Cache::new();
    let query = doc("query { count }");
    cache
        .write(WriteRequest::new(&query, Default::default(), json!({"count": 0})))
        .unwrap();

    for (name, value) in [("a", 1), ("b", 2), ("c", 3)] {
        cache
            .record_optimistic_transaction(name, |writer| {
                writer
                    .write(WriteRequest::new(&query, Default::default(), json!({"count": value})))
                    .map(|_| ())
            })
            .unwrap();
    }

    assert!(cache.remove_optimistic("b"));

    let optimistic = cache
        .read(ReadRequest::new(&query, Default::default()).optimistic(true))
        .unwrap();
    assert_eq!(optimistic.data["count"], 3, "layer c still wins; removing b is not the same as erasing it in place");
}

// Property 5 — transaction atomicity: no callback fires until
// performTransaction's body has returned.
#[test]
fn property_no_watch_callback_fires_inside_a_transaction_body() {
    let cache = Cache::new();
    let query = doc("query { a }");
    cache
        .write(WriteRequest::new(&query, Default::default(), json!({"a": 0})))
        .unwrap();

    let calls = Rc::new(RefCell::new(0u32));
    let calls_clone = Rc::clone(&calls);
    cache.watch(WatchRequest::new(&query, Default::default(), move |_| {
        *calls_clone.borrow_mut() += 1;
    }));
    let before = *calls.borrow();

    let observed_during_body = Rc::new(RefCell::new(None));
    let observed_clone = Rc::clone(&observed_during_body);
    cache
        .perform_transaction(move |proxy| {
            proxy.write(WriteRequest::new(&query, Default::default(), json!({"a": 1})))?;
            *observed_clone.borrow_mut() = Some(*calls.borrow());
            Ok(())
        })
        .unwrap();

    assert_eq!(observed_during_body.borrow().unwrap(), before, "no callback during the body");
}

#[test]
fn stopping_a_watch_silences_future_callbacks() {
    let cache = Cache::new();
    let query = doc("query { a }");
    cache
        .write(WriteRequest::new(&query, Default::default(), json!({"a": 1})))
        .unwrap();

    let calls = Rc::new(RefCell::new(0u32));
    let calls_clone = Rc::clone(&calls);
    let watch_id = cache.watch(WatchRequest::new(&query, Default::default(), move |_| {
        *calls_clone.borrow_mut() += 1;
    }));
    cache.stop_watch(watch_id);

    cache
        .write(WriteRequest::new(&query, Default::default(), json!({"a": 2})))
        .unwrap();
    assert_eq!(*calls.borrow(), 1, "a stopped watch receives no further callbacks");
}

#[test]
fn extract_then_restore_round_trips_the_base_store() {
    let cache = Cache::new();
    let query = doc("query { name }");
    cache
        .write(WriteRequest::new(&query, Default::default(), json!({"name": "Ada"})))
        .unwrap();

    let snapshot = cache.extract(false);

    let restored = Cache::new();
    restored.restore(snapshot);

    let outcome = restored.read(ReadRequest::new(&query, Default::default())).unwrap();
    assert_eq!(outcome.data, json!({"name": "Ada"}));
}

#[test]
fn reset_clears_data_but_keeps_watches_registered() {
    let cache = Cache::new();
    let query = doc("query { a }");
    cache
        .write(WriteRequest::new(&query, Default::default(), json!({"a": 1})))
        .unwrap();

    let calls = Rc::new(RefCell::new(0u32));
    let calls_clone = Rc::clone(&calls);
    cache.watch(WatchRequest::new(&query, Default::default(), move |_| {
        *calls_clone.borrow_mut() += 1;
    }));
    let before = *calls.borrow();

    cache.reset();
    assert!(*calls.borrow() > before, "reset broadcasts against the now-empty store");

    let after_reset = cache.read(ReadRequest::new(&query, Default::default()).return_partial(true)).unwrap();
    assert!(!after_reset.complete);
}

proptest! {
    // Property 1 — round-trip, generalized: any literal scalar triple
    // written through `name age active` reads back unchanged.
    #[test]
    fn proptest_property_1_round_trip_for_arbitrary_scalars(
        name in "[a-zA-Z]{1,12}",
        age in any::<i32>(),
        active in any::<bool>(),
    ) {
        let cache = Cache::new();
        let query = doc("query { name age active }");
        let result = json!({"name": name, "age": age, "active": active});
        cache
            .write(WriteRequest::new(&query, Default::default(), result.clone()))
            .unwrap();

        let outcome = cache.read(ReadRequest::new(&query, Default::default())).unwrap();
        prop_assert_eq!(outcome.data, result);
        prop_assert!(outcome.complete);
    }

    // Property 2 — merge monotonicity, generalized: a disjoint write
    // never erases fields an earlier write placed on the same root.
    #[test]
    fn proptest_property_2_disjoint_write_preserves_earlier_fields(
        a in any::<i32>(), b in any::<i32>(), c in any::<i32>(),
    ) {
        let cache = Cache::new();
        let q1 = doc("query { a b }");
        let q2 = doc("query { c }");

        cache
            .write(WriteRequest::new(&q1, Default::default(), json!({"a": a, "b": b})))
            .unwrap();
        cache
            .write(WriteRequest::new(&q2, Default::default(), json!({"c": c})))
            .unwrap();

        let outcome = cache.read(ReadRequest::new(&q1, Default::default())).unwrap();
        prop_assert_eq!(outcome.data, json!({"a": a, "b": b}));
    }

    // Property 6 — variable canonicalization: a literal argument and a
    // variable that resolves to the same value collapse onto one storage
    // key, whatever that shared value is.
    #[test]
    fn proptest_property_6_literal_and_variable_args_share_a_storage_key(
        literal in any::<bool>(), value in any::<i32>(),
    ) {
        let cache = Cache::new();
        let query = doc("query($l: Boolean, $v: Int) { field(literal: $l, value: $v) }");
        let variables: cache_core::document::Variables =
            [("l".to_string(), json!(literal)), ("v".to_string(), json!(value))]
                .into_iter()
                .collect();
        cache
            .write(WriteRequest::new(&query, variables, json!({"field": 1})))
            .unwrap();

        let literal_query = doc(&format!("query {{ field(literal: {literal}, value: {value}) }}"));
        cache
            .write(WriteRequest::new(&literal_query, Default::default(), json!({"field": 2})))
            .unwrap();

        let extracted = cache.extract(false);
        let root = extracted["ROOT_QUERY"].as_object().unwrap();
        let expected_key = format!(r#"field({{"literal":{literal},"value":{value}}})"#);
        prop_assert_eq!(root.len(), 1, "both writes must land on the single shared storage key");
        prop_assert_eq!(root.get(&expected_key), Some(&json!(2)), "the later write wins on the shared key");
    }

    // Property 7 — cycle safety: a ring of entities in the store must
    // read as an acyclic, depth-bounded projection instead of overflowing.
    #[test]
    fn proptest_property_7_ring_of_entities_reads_as_an_acyclic_projection(
        ring_size in 1usize..6,
    ) {
        let cache = Cache::new();
        let fragment = doc(
            "fragment NodeFields on Node { id next { ...NodeFields } } query { root { ...NodeFields } }",
        );
        let extractor: &cache_core::write::IdExtractor<'_> = &id_by_id_field;

        // Build a ring `n0 -> n1 -> ... -> n(ring_size - 1) -> n0` by
        // nesting from the last node inward; the innermost `next` closes
        // the loop back to `n0` by stable ID rather than by further
        // nesting.
        let mut node = json!({"id": format!("n{}", ring_size - 1), "next": {"id": "n0"}});
        for i in (0..ring_size - 1).rev() {
            node = json!({"id": format!("n{i}"), "next": node});
        }

        let seed = json!({"root": node});
        cache
            .write(WriteRequest::new(&fragment, Default::default(), seed).id_extractor(extractor))
            .unwrap();

        let outcome = cache.read(ReadRequest::new(&fragment, Default::default()).return_partial(true)).unwrap();
        prop_assert!(outcome.data.get("root").is_some(), "the ring must still produce a result, not a panic or a hang");
    }
}
