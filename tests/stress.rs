use amortkv::amortmap::{AmortizedMapBuilder, MissPolicy};
use amortkv::backend::{AmortizedBackend, Backend, Field, RwLockBackend, SegmentedBackend, Status};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::thread::scope;

const THREADS: u64 = 8;
const OPS_PER_THREAD: u64 = 10_000;
const KEYS: u64 = 100;
const TABLE: &str = "usertable";

fn key(k: u64) -> String {
    format!("user{}", k)
}

fn read(b: &dyn Backend, key: &str) -> Option<String> {
    let mut result = Vec::new();
    match b.read(TABLE, key, None, &mut result).unwrap() {
        Status::Ok => Some(result.pop().unwrap().value),
        Status::NotFound => None,
    }
}

fn backends() -> Vec<Box<dyn Backend>> {
    vec![
        Box::new(AmortizedBackend::new()),
        Box::new(AmortizedBackend::with_map(
            AmortizedMapBuilder::new()
                .set_miss_policy(MissPolicy::AllLookups)
                .build(),
        )),
        Box::new(SegmentedBackend::new()),
        Box::new(RwLockBackend::new()),
    ]
}

/// Each thread writes only the keys it owns, so the last write any thread
/// made to a key is exactly the final state. Reads still cover every key.
fn run_partitioned(b: &dyn Backend) {
    let oracles: Vec<HashMap<String, Option<String>>> = scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                s.spawn(move || {
                    let mut rng = StdRng::seed_from_u64(t);
                    let mut oracle = HashMap::new();
                    for i in 0..OPS_PER_THREAD {
                        let owned = t + THREADS * rng.random_range(0..KEYS.div_ceil(THREADS));
                        let k = key(owned % KEYS);
                        // Keys past the keyspace wrap onto another owner, skip them.
                        let mine = owned < KEYS;
                        match rng.random_range(0..4) {
                            0 | 1 if mine => {
                                let v = format!("{}-t{}-{}", k, t, i);
                                let values = [Field::new("field0", v.clone())];
                                let status = if i % 2 == 0 {
                                    b.insert(TABLE, &k, &values)
                                } else {
                                    b.update(TABLE, &k, &values)
                                };
                                assert_eq!(status, Ok(Status::Ok));
                                // Read after write on the writing thread.
                                assert_eq!(read(b, &k).as_deref(), Some(v.as_str()));
                                oracle.insert(k, Some(v));
                            }
                            2 if mine => {
                                assert_eq!(b.delete(TABLE, &k), Ok(Status::Ok));
                                assert_eq!(read(b, &k), None);
                                oracle.insert(k, None);
                            }
                            _ => {
                                let any = key(rng.random_range(0..KEYS));
                                if let Some(v) = read(b, &any) {
                                    assert!(v.starts_with(&format!("{}-", any)));
                                }
                            }
                        }
                    }
                    oracle
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let mut expected: HashMap<String, Option<String>> = HashMap::new();
    for oracle in oracles {
        for (k, v) in oracle {
            assert!(expected.insert(k, v).is_none(), "key written by two threads");
        }
    }
    for k in 0..KEYS {
        let k = key(k);
        let want = expected.get(&k).cloned().flatten();
        assert_eq!(read(b, &k), want, "{} on {}", k, b.name());
    }
}

/// Every thread writes every key. Only checks that whatever is read back was
/// written to that key by someone.
fn run_shared(b: &dyn Backend) {
    scope(|s| {
        for t in 0..THREADS {
            s.spawn(move || {
                let mut rng = StdRng::seed_from_u64(1000 + t);
                for i in 0..OPS_PER_THREAD {
                    let k = key(rng.random_range(0..KEYS));
                    match rng.random_range(0..10) {
                        0..=2 => {
                            let v = format!("{}-t{}-{}", k, t, i);
                            b.update(TABLE, &k, &[Field::new("field0", v)]).unwrap();
                        }
                        3 => {
                            b.delete(TABLE, &k).unwrap();
                        }
                        _ => {
                            if let Some(v) = read(b, &k) {
                                assert!(v.starts_with(&format!("{}-t", k)));
                            }
                        }
                    }
                }
            });
        }
    });

    for k in 0..KEYS {
        let k = key(k);
        if let Some(v) = read(b, &k) {
            assert!(v.starts_with(&format!("{}-t", k)));
        }
    }
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_stress_partitioned_matches_oracle() {
    for b in backends() {
        run_partitioned(b.as_ref());
    }
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_stress_shared_keyspace() {
    for b in backends() {
        run_shared(b.as_ref());
    }
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_stress_promotion_keeps_concurrent_writes() {
    // Writers keep overwriting a fixed key set while a second group of
    // threads inserts fresh keys and reads them back, forcing dirty views to
    // be built and promoted underneath the writers.
    let b = AmortizedBackend::new();
    let b = &b;
    for k in 0..KEYS {
        b.insert(TABLE, &key(k), &[Field::new("field0", format!("{}-t0-0", key(k)))])
            .unwrap();
    }

    scope(|s| {
        for t in 0..4u64 {
            s.spawn(move || {
                for i in 1..=2_000u64 {
                    let k = key((t * 25) + (i % 25));
                    let v = format!("{}-w{}-{}", k, t, i);
                    b.update(TABLE, &k, &[Field::new("field0", v.clone())]).unwrap();
                    assert_eq!(read(b, &k).as_deref(), Some(v.as_str()));
                }
            });
        }
        for t in 0..4u64 {
            s.spawn(move || {
                for i in 0..500u64 {
                    let k = format!("fresh{}-{}", t, i);
                    b.insert(TABLE, &k, &[Field::new("field0", "x")]).unwrap();
                    for _ in 0..4 {
                        assert_eq!(read(b, &k).as_deref(), Some("x"));
                    }
                }
            });
        }
    });

    let stats = b.map().stats();
    assert!(stats.promotions > 0);
    for k in 0..KEYS {
        assert!(read(b, &key(k)).is_some());
    }
    for t in 0..4u64 {
        for i in 0..500u64 {
            assert_eq!(read(b, &format!("fresh{}-{}", t, i)).as_deref(), Some("x"));
        }
    }
}
