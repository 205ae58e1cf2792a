//! Assertions over stage lists.

use crate::model::Stage;

/// Asserts the ids of `stages`, in order.
pub fn assert_stage_ids(stages: &[&Stage], expected: &[&str]) {
    let actual: Vec<&str> = stages.iter().map(|s| s.id()).collect();
    assert_eq!(actual, expected, "Unexpected stage ids");
}

/// Asserts that a stage with `id` is present.
pub fn assert_contains_stage(stages: &[&Stage], id: &str) {
    assert!(
        stages.iter().any(|s| s.id() == id),
        "Expected stage '{}' in {:?}",
        id,
        stages.iter().map(|s| s.id()).collect::<Vec<_>>()
    );
}

/// Asserts that no stage with `id` is present.
pub fn assert_lacks_stage(stages: &[&Stage], id: &str) {
    assert!(
        !stages.iter().any(|s| s.id() == id),
        "Did not expect stage '{}' in {:?}",
        id,
        stages.iter().map(|s| s.id()).collect::<Vec<_>>()
    );
}

/// Asserts that `before` appears earlier than `after`.
pub fn assert_ordered_before(stages: &[&Stage], before: &str, after: &str) {
    let position = |id: &str| stages.iter().position(|s| s.id() == id);
    match (position(before), position(after)) {
        (Some(b), Some(a)) => assert!(b < a, "Expected '{before}' before '{after}'"),
        (b, a) => panic!("Missing stage: '{before}' at {b:?}, '{after}' at {a:?}"),
    }
}

/// Asserts that every stage follows all stages carrying its requisite ref ids.
pub fn assert_topologically_sound(sorted: &[&Stage]) {
    for (index, stage) in sorted.iter().enumerate() {
        for requisite in &stage.requisite_stage_ref_ids {
            let satisfied = sorted[..index]
                .iter()
                .any(|s| s.ref_id.as_deref() == Some(requisite.as_str()));
            assert!(
                satisfied,
                "Stage '{}' precedes its requisite '{}'",
                stage.id(),
                requisite
            );
        }
    }
}
