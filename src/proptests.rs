use super::*;

use proptest::prelude::*;
use std::collections::BTreeMap;

/// Squeezes keys into 16 hashes so most nodes carry conflicts.
#[derive(Clone, Copy, Default)]
struct Crowded;

impl KeyHasher<u16> for Crowded {
    fn hash_of(&self, key: &u16) -> i32 {
        i32::from(key % 16) - 8
    }

    fn equal(&self, a: &u16, b: &u16) -> bool {
        a == b
    }
}

fn validate_tree<K, V, H: KeyHasher<K>>(t: &HashTree<K, V, H>) {
    let issues = t.verify_integrity();
    assert!(issues.is_empty(), "integrity issues: {issues:?}");
}

#[derive(Clone, Debug)]
enum Op<K> {
    Insert(K, u64),
    Merge(K, u64),
    Keep(K, u64),
    Remove(K),
    Get(K),
}

fn ops_strategy<K: Clone + std::fmt::Debug>(
    key: impl Strategy<Value = K> + Clone,
) -> impl Strategy<Value = Vec<Op<K>>> {
    let op = prop_oneof![
        40 => (key.clone(), any::<u64>()).prop_map(|(k, v)| Op::Insert(k, v)),
        10 => (key.clone(), 0u64..1000).prop_map(|(k, v)| Op::Merge(k, v)),
        10 => (key.clone(), any::<u64>()).prop_map(|(k, v)| Op::Keep(k, v)),
        25 => key.clone().prop_map(Op::Remove),
        15 => key.prop_map(Op::Get),
    ];
    prop::collection::vec(op, 0..=500)
}

/// Apply `ops` to a tree and to a `BTreeMap`, checking they agree throughout.
fn check_equivalence<K, H>(ops: Vec<Op<K>>) -> std::result::Result<(), TestCaseError>
where
    K: Clone + Ord + std::fmt::Debug,
    H: KeyHasher<K> + Clone + Default,
{
    let mut t: HashTree<K, u64, H> = HashTree::new();
    let mut m: BTreeMap<K, u64> = BTreeMap::new();

    for op in ops {
        let before = t.clone();
        match op {
            Op::Insert(key, value) => {
                t = t.add_or_update(key.clone(), value);
                m.insert(key, value);
            }
            Op::Merge(key, value) => {
                t = t.add_or_update_with(key.clone(), value, |_, old, new| old.wrapping_add(new));
                m.entry(key)
                    .and_modify(|old| *old = old.wrapping_add(value))
                    .or_insert(value);
            }
            Op::Keep(key, value) => {
                t = t.add_or_keep(key.clone(), value);
                m.entry(key).or_insert(value);
            }
            Op::Remove(key) => {
                let had = m.remove(&key).is_some();
                t = t.remove(&key);
                prop_assert_eq!(before.contains_key(&key), had);
                if !had {
                    prop_assert!(t.ptr_eq(&before));
                }
            }
            Op::Get(key) => {
                prop_assert_eq!(t.get(&key), m.get(&key));
            }
        }

        prop_assert_eq!(t.len(), m.len());
        // Earlier snapshots are never disturbed.
        prop_assert_eq!(before.iter().count(), before.len());
    }

    validate_tree(&t);
    let mut got: Vec<(K, u64)> = t.iter().map(|(k, v)| (k.clone(), *v)).collect();
    got.sort();
    let expected: Vec<(K, u64)> = m.into_iter().collect();
    prop_assert_eq!(got, expected);

    let hashes: Vec<i32> = t.keys().map(|k| t.hasher().hash_of(k)).collect();
    prop_assert!(hashes.windows(2).all(|w| w[0] <= w[1]));
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        max_shrink_iters: 50_000,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_equivalence_int_keys(ops in ops_strategy(-200i32..200)) {
        check_equivalence::<i32, IdentityKeys>(ops)?;
    }

    #[test]
    fn prop_equivalence_colliding_keys(ops in ops_strategy(0u16..300)) {
        check_equivalence::<u16, Crowded>(ops)?;
    }

    #[test]
    fn prop_equivalence_string_keys(ops in ops_strategy("[a-d]{0,3}")) {
        check_equivalence::<String, FxKeys>(ops)?;
    }

    #[test]
    fn prop_round_trip_and_idempotent_readd(
        keys in prop::collection::vec(any::<i32>(), 0..200),
        key in any::<i32>(),
        value in any::<u64>(),
    ) {
        let t: IntTree<u64> = keys.iter().map(|&k| (k, 0)).collect();
        let once = t.add_or_update(key, value);
        let twice = once.add_or_update(key, value);
        prop_assert_eq!(once.get(&key), Some(&value));
        prop_assert_eq!(once.height(), twice.height());
        prop_assert_eq!(once.len(), twice.len());
        validate_tree(&twice);
    }
}

/// Call `f` with every ordering of `items`, using Heap's algorithm.
fn each_ordering<T: Clone>(items: &[T], mut f: impl FnMut(&[T])) {
    let mut order = items.to_vec();
    let mut counters = vec![0usize; order.len()];
    f(order.as_slice());
    let mut i = 1;
    while i < order.len() {
        if counters[i] < i {
            let j = if i % 2 == 0 { 0 } else { counters[i] };
            order.swap(j, i);
            f(order.as_slice());
            counters[i] += 1;
            i = 1;
        } else {
            counters[i] = 0;
            i += 1;
        }
    }
}

#[test]
fn exhaustive_insert_order_small_set() {
    let keys: Vec<u16> = vec![0, 16, 32, 1, 17, 2, 40];

    let mut orderings = 0;
    each_ordering(&keys, |perm| {
        orderings += 1;
        let mut t: HashTree<u16, u64, Crowded> = HashTree::new();
        let mut m: BTreeMap<u16, u64> = BTreeMap::new();

        for (i, &k) in perm.iter().enumerate() {
            let v = i as u64;
            t = t.add_or_update(k, v);
            m.insert(k, v);
        }

        validate_tree(&t);
        for (k, v) in &m {
            assert_eq!(t.get(k), Some(v));
        }
        assert_eq!(t.len(), m.len());
    });
    assert_eq!(orderings, 5040);
}

#[test]
fn exhaustive_remove_order_small_set() {
    let keys: Vec<i32> = vec![5, -3, 9, 0, 12, 7, -8];

    // Insert in a fixed order, then remove in all permutations.
    let base_tree: IntTree<u64> = keys.iter().map(|&k| (k, k.unsigned_abs() as u64)).collect();

    each_ordering(&keys, |perm| {
        let mut t = base_tree.clone();
        let mut remaining: BTreeMap<i32, u64> =
            keys.iter().map(|&k| (k, k.unsigned_abs() as u64)).collect();

        for k in perm {
            t = t.remove(k);
            remaining.remove(k);
            assert_eq!(t.len(), remaining.len());
            validate_tree(&t);
            let got: Vec<(i32, u64)> = t.iter().map(|(k, v)| (*k, *v)).collect();
            let expected: Vec<(i32, u64)> = remaining.iter().map(|(k, v)| (*k, *v)).collect();
            assert_eq!(got, expected);
        }
        assert!(t.is_empty());
        assert_eq!(base_tree.len(), keys.len());
    });
}
