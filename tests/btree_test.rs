use std::collections::BTreeMap;

use pagedb::index::{BTreeIndex, RecordPointer};
use pagedb::tuple::Value;
use pagedb::PageIndex;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

fn pointer(key: i32) -> RecordPointer {
    RecordPointer::new(Value::Integer(key), PageIndex::new(key as u32 % 97), key as usize % 5)
}

#[test]
fn test_btree_insert_and_search() {
    let mut index = BTreeIndex::default();

    assert!(index.insert(pointer(10)));
    assert!(index.insert(pointer(20)));
    assert!(index.insert(pointer(30)));

    assert_eq!(index.get(&Value::Integer(10)), Some(&pointer(10)));
    assert_eq!(index.get(&Value::Integer(20)).map(|p| p.record_id()), Some(pointer(20).record_id()));
    assert_eq!(index.get(&Value::Integer(25)), None);
    assert_eq!(index.height(), 1);
}

#[test]
fn test_btree_random_insert() {
    let mut index = BTreeIndex::new(5);
    let mut keys: Vec<i32> = (0..500).collect();
    keys.shuffle(&mut StdRng::seed_from_u64(42));

    for &key in &keys {
        assert!(index.insert(pointer(key)));
    }
    for &key in &keys {
        assert!(!index.insert(pointer(key)));
    }

    assert_eq!(index.len(), 500);
    for &key in &keys {
        assert_eq!(index.get(&Value::Integer(key)), Some(&pointer(key)), "key {}", key);
    }
    let ordered: Vec<Value> = index.iter().map(|p| p.key.clone()).collect();
    assert_eq!(ordered, (0..500).map(Value::Integer).collect::<Vec<_>>());
}

#[test]
fn test_btree_against_model() {
    let mut rng = StdRng::seed_from_u64(9);
    let mut index = BTreeIndex::new(4);
    let mut model = BTreeMap::new();

    for _ in 0..5000 {
        let key: i32 = rng.gen_range(0..300);
        if rng.gen_bool(0.6) {
            let inserted = index.insert(pointer(key));
            assert_eq!(inserted, !model.contains_key(&key));
            model.entry(key).or_insert_with(|| pointer(key));
        } else {
            let removed = index.delete(&Value::Integer(key));
            assert_eq!(removed, model.remove(&key));
        }
        assert_eq!(index.len(), model.len());
    }

    let keys: Vec<Value> = index.iter().map(|p| p.key.clone()).collect();
    let expected: Vec<Value> = model.keys().map(|&k| Value::Integer(k)).collect();
    assert_eq!(keys, expected);

    let low = 100;
    let high = 200;
    let ranged: Vec<RecordPointer> = index
        .range(&Value::Integer(low), &Value::Integer(high))
        .cloned()
        .collect();
    let expected: Vec<RecordPointer> = model.range(low..=high).map(|(_, p)| p.clone()).collect();
    assert_eq!(ranged, expected);
}

#[test]
fn test_btree_delete_everything() {
    let mut index = BTreeIndex::new(3);
    for key in 0..200 {
        index.insert(pointer(key));
    }
    assert!(index.height() > 3);

    let mut keys: Vec<i32> = (0..200).collect();
    keys.shuffle(&mut StdRng::seed_from_u64(1));
    for (removed, &key) in keys.iter().enumerate() {
        assert_eq!(index.delete(&Value::Integer(key)), Some(pointer(key)));
        assert_eq!(index.len(), 199 - removed);
        assert!(!index.contains(&Value::Integer(key)));
    }

    assert!(index.is_empty());
    assert_eq!(index.height(), 1);
    assert_eq!(index.iter().count(), 0);
}

#[test]
fn test_btree_double_and_mixed_keys() {
    let mut index = BTreeIndex::new(4);
    for (i, key) in [2.5, -1.0, 0.0, 10.25].iter().enumerate() {
        index.insert(RecordPointer::new(Value::Double(*key), PageIndex::new(0), i));
    }

    assert!(!index.contains(&Value::Integer(10)));
    assert!(index.contains(&Value::Double(2.5)));
    assert_eq!(index.first_key(), Some(&Value::Double(-1.0)));
    let found: Vec<usize> = index
        .range(&Value::Integer(0), &Value::Integer(3))
        .map(|p| p.record_index)
        .collect();
    assert_eq!(found, vec![2, 0]);
}
