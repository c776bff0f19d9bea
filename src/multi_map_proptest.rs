#![cfg(test)]

// State-machine tests for MultiMap kept inside the crate so they can check
// the engine's chain and free-list invariants after every step.

use alloc::collections::BTreeMap;
use alloc::collections::BTreeSet;
use alloc::vec::Vec;

use proptest::prelude::*;

use crate::comparer::Comparer;
use crate::comparer::DefaultComparer;
use crate::hash_table::tests::assert_invariants;
use crate::multi_map::MultiMap;

/// Folds every key onto three hashes so chains are long and shared.
#[derive(Clone, Debug, Default, PartialEq)]
struct ThreeBuckets;

impl Comparer<u8> for ThreeBuckets {
    fn equals(&self, a: &u8, b: &u8) -> bool {
        a == b
    }

    fn hash(&self, value: &u8) -> u64 {
        u64::from(value % 3)
    }
}

#[derive(Clone, Debug)]
enum Op {
    Add(u8, i16),
    AddAll(u8, Vec<i16>),
    Set(u8, i16),
    SetAll(u8, Vec<i16>),
    Remove(u8),
    RemoveValue(u8, i16),
    Clear,
    Reserve(u8),
}

// Small key and value ranges so removals and duplicate pairs actually hit.
fn arb_ops() -> impl Strategy<Value = Vec<Op>> {
    let key = 0u8..8;
    let value = -4i16..4;
    let values = proptest::collection::vec(-4i16..4, 0..6);
    let op = prop_oneof![
        4 => (key.clone(), value.clone()).prop_map(|(k, v)| Op::Add(k, v)),
        2 => (key.clone(), values.clone()).prop_map(|(k, vs)| Op::AddAll(k, vs)),
        1 => (key.clone(), value.clone()).prop_map(|(k, v)| Op::Set(k, v)),
        1 => (key.clone(), values).prop_map(|(k, vs)| Op::SetAll(k, vs)),
        2 => key.clone().prop_map(Op::Remove),
        3 => (key.clone(), value).prop_map(|(k, v)| Op::RemoveValue(k, v)),
        1 => Just(Op::Clear),
        1 => (0u8..40).prop_map(Op::Reserve),
    ];
    proptest::collection::vec(op, 1..80)
}

fn sorted(mut values: Vec<i16>) -> Vec<i16> {
    values.sort();
    values
}

fn check<KC>(sut: &MultiMap<u8, i16, KC>, model: &BTreeMap<u8, Vec<i16>>) -> Result<(), TestCaseError>
where
    KC: Comparer<u8>,
{
    assert_invariants(sut.table());
    prop_assert_eq!(sut.len(), model.values().map(Vec::len).sum::<usize>());
    prop_assert_eq!(sut.is_empty(), sut.len() == 0);

    for key in 0u8..8 {
        let expected = model.get(&key).cloned().unwrap_or_default();
        let actual: Vec<i16> = sut.get_all(&key).copied().collect();
        prop_assert_eq!(sut.contains_key(&key), !expected.is_empty());
        prop_assert_eq!(sut.count_values(&key), expected.len());
        match sut.get(&key) {
            Some(first) => {
                prop_assert_eq!(Some(first), actual.first());
            }
            None => {
                prop_assert!(expected.is_empty());
            }
        }
        prop_assert_eq!(sorted(actual), sorted(expected));
    }

    let keys: Vec<u8> = sut.keys().copied().collect();
    let distinct: BTreeSet<u8> = keys.iter().copied().collect();
    prop_assert_eq!(keys.len(), distinct.len(), "keys yielded a duplicate");
    let live: BTreeSet<u8> = model
        .iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(&key, _)| key)
        .collect();
    prop_assert_eq!(distinct, live);
    Ok(())
}

fn run<KC>(comparer: KC, ops: Vec<Op>) -> Result<(), TestCaseError>
where
    KC: Comparer<u8> + Clone + PartialEq,
{
    let mut sut: MultiMap<u8, i16, KC> = MultiMap::with_comparers(comparer, DefaultComparer::new());
    let mut model: BTreeMap<u8, Vec<i16>> = BTreeMap::new();

    for op in ops {
        let version = sut.version();
        let len = sut.len();
        let mut cursor = sut.cursor();

        match op {
            Op::Add(k, v) => {
                sut.add(k, v);
                model.entry(k).or_default().push(v);
            }
            Op::AddAll(k, vs) => {
                sut.add_all(k, vs.iter().copied());
                model.entry(k).or_default().extend(vs);
            }
            Op::Set(k, v) => {
                let old = model.insert(k, alloc::vec![v]).unwrap_or_default();
                prop_assert_eq!(sut.set(k, v), old.len());
            }
            Op::SetAll(k, vs) => {
                let old = model.insert(k, vs.clone()).unwrap_or_default();
                prop_assert_eq!(sut.set_all(k, vs), old.len());
            }
            Op::Remove(k) => {
                let old = model.remove(&k).unwrap_or_default();
                prop_assert_eq!(sut.remove(&k), old.len());
            }
            Op::RemoveValue(k, v) => {
                let values = model.entry(k).or_default();
                let before = values.len();
                values.retain(|&x| x != v);
                prop_assert_eq!(sut.remove_value(&k, &v), before - values.len());
                prop_assert!(!sut.contains(&k, &v));
            }
            Op::Clear => {
                model.clear();
                sut.clear();
            }
            Op::Reserve(n) => {
                let capacity = sut.capacity();
                sut.reserve(usize::from(n));
                prop_assert!(sut.capacity() >= capacity);
                prop_assert!(sut.capacity() >= len + usize::from(n));
            }
        }

        // A cursor taken before the step fails iff the step bumped the version.
        let changed = sut.version() != version;
        prop_assert_eq!(cursor.advance(&sut).is_err(), changed);
        if sut.len() != len {
            prop_assert!(changed);
        }

        check(&sut, &model)?;
    }

    let copy = sut.clone();
    prop_assert!(copy == sut);
    let restored = sut.snapshot().restore().map_err(|e| TestCaseError::fail(alloc::format!("{e}")))?;
    prop_assert!(restored.content_eq(&sut));
    prop_assert_eq!(restored.version(), sut.version());
    check(&restored, &model)?;
    Ok(())
}

// Property: state-machine equivalence against a BTreeMap<key, Vec<value>>.
// - value multisets per key, len, contains, and distinct keys match the model
// - get returns the head of get_all
// - remove and remove_value report the exact number of pairs removed
// - cursors fail exactly after content-changing operations
// - chain and free-list invariants hold after every step
// - clone is structurally equal and restore is content equal
proptest! {
    #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]

    #[test]
    fn prop_state_machine_default_comparer(ops in arb_ops()) {
        run(DefaultComparer::with_seed(0x5eed), ops)?;
    }

    #[test]
    fn prop_state_machine_colliding_comparer(ops in arb_ops()) {
        run(ThreeBuckets, ops)?;
    }
}
