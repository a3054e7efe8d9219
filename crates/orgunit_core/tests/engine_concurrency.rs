use orgunit_core::{EngineConfig, ForestError, HierarchyEngine, NewUnit, UnitId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

#[test]
fn readers_never_observe_partial_moves() {
    let engine = Arc::new(HierarchyEngine::new(EngineConfig::default()));
    let root = engine.create(NewUnit::new("Root", "ROOT")).unwrap();
    let left = engine
        .create(NewUnit::new("Left", "L").under(root.id))
        .unwrap();
    let right = engine
        .create(NewUnit::new("Right", "R").under(root.id))
        .unwrap();
    let leaf = engine
        .create(NewUnit::new("Leaf", "LEAF").under(left.id))
        .unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let writer = {
        let engine = Arc::clone(&engine);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            for round in 0..500 {
                let target = if round % 2 == 0 { right.id } else { left.id };
                engine.set_parent(leaf.id, Some(target)).unwrap();
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                while !done.load(Ordering::SeqCst) {
                    let chain: Vec<UnitId> = engine
                        .ancestors_of(leaf.id)
                        .unwrap()
                        .iter()
                        .map(|unit| unit.id)
                        .collect();
                    assert!(
                        chain == vec![left.id, root.id] || chain == vec![right.id, root.id],
                        "unexpected ancestor chain: {chain:?}"
                    );
                    assert_eq!(engine.descendants_of(root.id).unwrap().len(), 3);
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
}

#[test]
fn concurrent_creates_keep_codes_unique() {
    let engine = Arc::new(HierarchyEngine::new(EngineConfig::default()));

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                engine
                    .create(NewUnit::new(format!("Worker {worker}"), "SHARED"))
                    .is_ok()
            })
        })
        .collect();

    let successes = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .filter(|created| *created)
        .count();
    assert_eq!(successes, 1);
    assert_eq!(engine.len().unwrap(), 1);
}

#[test]
fn duplicate_code_error_names_the_code() {
    let engine = HierarchyEngine::new(EngineConfig::default());
    engine.create(NewUnit::new("One", "X")).unwrap();
    let err = engine.create(NewUnit::new("Two", "X")).unwrap_err();
    assert_eq!(err, ForestError::DuplicateCode("X".to_string()));
    assert_eq!(err.to_string(), "unit code already in use: `X`");
}
