// Property-based tests for StrataDb
// A random sequence of operations must behave like an ordered map

use proptest::prelude::*;
use std::collections::BTreeMap;
use stratadb::{Options, DB};
use tempfile::TempDir;

#[derive(Debug, Clone)]
enum Op {
    Upsert(Vec<u8>, Vec<u8>),
    Remove(Vec<u8>),
    Flush,
    Compact,
}

fn key_strategy() -> impl Strategy<Value = Vec<u8>> {
    // Small alphabet so keys collide often
    prop::collection::vec(prop::sample::select(vec![b'a', b'b', b'c', b'd']), 1..4)
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => (key_strategy(), prop::collection::vec(any::<u8>(), 0..32))
            .prop_map(|(k, v)| Op::Upsert(k, v)),
        3 => key_strategy().prop_map(Op::Remove),
        1 => Just(Op::Flush),
        1 => Just(Op::Compact),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_db_matches_btreemap(ops in prop::collection::vec(op_strategy(), 1..120)) {
        let dir = TempDir::new().unwrap();
        let options = Options::default()
            .heap_budget(16 * 256)
            .compaction_threshold(3)
            .sync_on_publish(false);
        let db = DB::open(dir.path(), options).unwrap();
        let mut model = BTreeMap::new();

        for op in &ops {
            match op {
                Op::Upsert(k, v) => {
                    db.upsert(k, v).unwrap();
                    model.insert(k.clone(), v.clone());
                }
                Op::Remove(k) => {
                    db.remove(k).unwrap();
                    model.remove(k);
                }
                Op::Flush => db.flush().unwrap(),
                Op::Compact => db.compact().unwrap(),
            }
        }

        for (k, v) in &model {
            let actual = db.get(k).unwrap();
            prop_assert_eq!(actual.as_deref(), Some(v.as_slice()));
        }

        let scanned: Vec<(Vec<u8>, Vec<u8>)> = db
            .iter()
            .unwrap()
            .map(|r| r.map(|(k, v)| (k.to_vec(), v.to_vec())).unwrap())
            .collect();
        let expected: Vec<(Vec<u8>, Vec<u8>)> = model.into_iter().collect();
        prop_assert_eq!(scanned, expected);
    }

    #[test]
    fn prop_reopen_preserves_contents(
        entries in prop::collection::btree_map(
            key_strategy(),
            prop::collection::vec(any::<u8>(), 0..16),
            1..20,
        ),
        from in key_strategy(),
    ) {
        let dir = TempDir::new().unwrap();
        {
            let db = DB::open(dir.path(), Options::default().sync_on_publish(false)).unwrap();
            for (k, v) in &entries {
                db.upsert(k, v).unwrap();
            }
        }

        let db = DB::open(dir.path(), Options::default().sync_on_publish(false)).unwrap();
        let scanned: Vec<Vec<u8>> =
            db.scan(&from).unwrap().map(|r| r.unwrap().0.to_vec()).collect();
        let expected: Vec<Vec<u8>> =
            entries.range(from.clone()..).map(|(k, _)| k.clone()).collect();
        prop_assert_eq!(scanned, expected);
    }
}
