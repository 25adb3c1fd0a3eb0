//! Change detection and rule planning.
//!
//! The planner is a pure function of the desired ranges and the managed
//! rules currently in the policy. It never looks at unmanaged rules and
//! never talks to the network, so a partially applied plan can always be
//! recovered by planning again from freshly read state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::{PlannedOperation, RuleBatch, BATCH_SIZE};

/// How an existing batch is compared with its desired slice.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    /// Same length and same order
    #[default]
    Ordered,
    /// Same ranges in any order
    Unordered,
}

impl Comparison {
    fn batches_equal(self, current: &[String], desired: &[String]) -> bool {
        if current.len() != desired.len() {
            return false;
        }
        match self {
            Comparison::Ordered => current == desired,
            Comparison::Unordered => {
                let mut a: Vec<&String> = current.iter().collect();
                let mut b: Vec<&String> = desired.iter().collect();
                a.sort_unstable();
                b.sort_unstable();
                a == b
            }
        }
    }
}

/// Returns false iff the published version is already stamped on the policy.
pub fn should_reconcile(version_tag: &str, version_marker: &str) -> bool {
    version_tag != version_marker
}

/// Number of rules needed to hold `entry_count` ranges.
pub fn batches_needed(entry_count: usize) -> usize {
    entry_count.div_ceil(BATCH_SIZE)
}

/// Slice of `entries` that belongs at priority `index`.
pub fn batch_slice(entries: &[String], index: usize) -> &[String] {
    let start = (index * BATCH_SIZE).min(entries.len());
    let end = ((index + 1) * BATCH_SIZE).min(entries.len());
    &entries[start..end]
}

/// Compute the operations that turn `managed` into the batched `entries`.
///
/// `managed` must only contain rules owned by flaresync. Slot operations are
/// emitted in ascending priority, followed by removals of every managed rule
/// at or above the number of needed batches.
pub fn plan(
    entries: &[String],
    managed: &[RuleBatch],
    comparison: Comparison,
) -> Vec<PlannedOperation> {
    let needed = batches_needed(entries.len());
    let by_priority: BTreeMap<u32, &RuleBatch> = managed.iter().map(|r| (r.priority, r)).collect();

    let mut ops = Vec::new();

    for index in 0..needed {
        let priority = index as u32;
        let slice = batch_slice(entries, index);

        match by_priority.get(&priority) {
            Some(current) if comparison.batches_equal(&current.cidrs, slice) => {}
            Some(_) => ops.push(PlannedOperation::Patch {
                priority,
                cidrs: slice.to_vec(),
            }),
            None => ops.push(PlannedOperation::Add {
                priority,
                cidrs: slice.to_vec(),
            }),
        }
    }

    ops.extend(
        by_priority
            .range(needed as u32..)
            .map(|(&priority, _)| PlannedOperation::Remove { priority }),
    );

    ops
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DEFAULT_RULE_DESCRIPTION;

    pub(super) fn cidrs(count: usize) -> Vec<String> {
        (0..count)
            .map(|i| format!("10.{}.{}.0/24", i / 256, i % 256))
            .collect()
    }

    pub(super) fn batch(priority: u32, cidrs: &[String]) -> RuleBatch {
        RuleBatch {
            priority,
            cidrs: cidrs.to_vec(),
            description: DEFAULT_RULE_DESCRIPTION.to_string(),
        }
    }

    /// Managed rules as they would look after applying `ops`.
    pub(super) fn apply(managed: &[RuleBatch], ops: &[PlannedOperation]) -> Vec<RuleBatch> {
        let mut rules: BTreeMap<u32, RuleBatch> =
            managed.iter().map(|r| (r.priority, r.clone())).collect();
        for op in ops {
            match op {
                PlannedOperation::Add { priority, cidrs } => {
                    assert!(!rules.contains_key(priority), "add collides at {}", priority);
                    rules.insert(*priority, batch(*priority, cidrs));
                }
                PlannedOperation::Patch { priority, cidrs } => {
                    assert!(rules.contains_key(priority), "patch of missing {}", priority);
                    rules.insert(*priority, batch(*priority, cidrs));
                }
                PlannedOperation::Remove { priority } => {
                    assert!(rules.remove(priority).is_some(), "remove of missing {}", priority);
                }
            }
        }
        rules.into_values().collect()
    }

    #[test]
    fn test_should_reconcile() {
        assert!(!should_reconcile("abc", "abc"));
        assert!(should_reconcile("abc", "abd"));
        assert!(should_reconcile("abc", ""));
        assert!(should_reconcile("abc", "abc "));
        assert!(should_reconcile("ABC", "abc"));
    }

    #[test]
    fn test_batches_needed() {
        assert_eq!(batches_needed(0), 0);
        assert_eq!(batches_needed(1), 1);
        assert_eq!(batches_needed(10), 1);
        assert_eq!(batches_needed(11), 2);
        assert_eq!(batches_needed(23), 3);
    }

    #[test]
    fn test_batch_slice_windows_advance() {
        let entries = cidrs(23);
        assert_eq!(batch_slice(&entries, 0), &entries[0..10]);
        assert_eq!(batch_slice(&entries, 1), &entries[10..20]);
        assert_eq!(batch_slice(&entries, 2), &entries[20..23]);
        assert!(batch_slice(&entries, 3).is_empty());
    }

    #[test]
    fn test_plan_from_empty_policy() {
        let entries = cidrs(23);
        let ops = plan(&entries, &[], Comparison::Ordered);

        assert_eq!(
            ops,
            vec![
                PlannedOperation::Add {
                    priority: 0,
                    cidrs: entries[0..10].to_vec()
                },
                PlannedOperation::Add {
                    priority: 1,
                    cidrs: entries[10..20].to_vec()
                },
                PlannedOperation::Add {
                    priority: 2,
                    cidrs: entries[20..23].to_vec()
                },
            ]
        );
    }

    #[test]
    fn test_plan_shrink_patches_and_removes() {
        let old = cidrs(23);
        let existing = vec![
            batch(0, &old[0..10]),
            batch(1, &old[10..20]),
            batch(2, &old[20..23]),
        ];
        // First ten unchanged, five new ones after that
        let mut entries = old[0..10].to_vec();
        entries.extend((0..5).map(|i| format!("172.16.{}.0/24", i)));

        let ops = plan(&entries, &existing, Comparison::Ordered);
        assert_eq!(
            ops,
            vec![
                PlannedOperation::Patch {
                    priority: 1,
                    cidrs: entries[10..15].to_vec()
                },
                PlannedOperation::Remove { priority: 2 },
            ]
        );
    }

    #[test]
    fn test_plan_shrink_with_changed_first_batch() {
        let old = cidrs(23);
        let existing = vec![
            batch(0, &old[0..10]),
            batch(1, &old[10..20]),
            batch(2, &old[20..23]),
        ];
        let entries: Vec<String> = (0..15).map(|i| format!("192.0.{}.0/24", i)).collect();

        let ops = plan(&entries, &existing, Comparison::Ordered);
        assert_eq!(ops.len(), 3);
        assert_eq!(
            ops[0],
            PlannedOperation::Patch {
                priority: 0,
                cidrs: entries[0..10].to_vec()
            }
        );
        assert_eq!(
            ops[1],
            PlannedOperation::Patch {
                priority: 1,
                cidrs: entries[10..15].to_vec()
            }
        );
        assert_eq!(ops[2], PlannedOperation::Remove { priority: 2 });
    }

    #[test]
    fn test_plan_no_op_when_matching() {
        let entries = cidrs(23);
        let existing = vec![
            batch(0, &entries[0..10]),
            batch(1, &entries[10..20]),
            batch(2, &entries[20..23]),
        ];
        assert!(plan(&entries, &existing, Comparison::Ordered).is_empty());
    }

    #[test]
    fn test_plan_grow_adds_tail() {
        let entries = cidrs(25);
        let existing = vec![batch(0, &entries[0..10]), batch(1, &entries[10..20])];
        let ops = plan(&entries, &existing, Comparison::Ordered);
        assert_eq!(
            ops,
            vec![PlannedOperation::Add {
                priority: 2,
                cidrs: entries[20..25].to_vec()
            }]
        );
    }

    #[test]
    fn test_reordered_batch_is_patched_when_ordered() {
        let entries = cidrs(3);
        let mut reversed = entries.clone();
        reversed.reverse();
        let existing = vec![batch(0, &reversed)];

        let ops = plan(&entries, &existing, Comparison::Ordered);
        assert_eq!(
            ops,
            vec![PlannedOperation::Patch {
                priority: 0,
                cidrs: entries.clone()
            }]
        );
    }

    #[test]
    fn test_reordered_batch_is_kept_when_unordered() {
        let entries = cidrs(3);
        let mut reversed = entries.clone();
        reversed.reverse();
        let existing = vec![batch(0, &reversed)];

        assert!(plan(&entries, &existing, Comparison::Unordered).is_empty());
    }

    #[test]
    fn test_unordered_still_detects_length_change() {
        let entries = cidrs(3);
        let existing = vec![batch(0, &entries[0..2])];
        let ops = plan(&entries, &existing, Comparison::Unordered);
        assert_eq!(ops.len(), 1);
        assert!(matches!(ops[0], PlannedOperation::Patch { priority: 0, .. }));
    }

    #[test]
    fn test_unordered_respects_duplicates() {
        let current = vec!["1.1.1.0/24".to_string(), "1.1.1.0/24".to_string()];
        let desired = vec!["1.1.1.0/24".to_string(), "1.0.0.0/24".to_string()];
        assert!(!Comparison::Unordered.batches_equal(&current, &desired));
    }

    #[test]
    fn test_gapped_priorities_are_compacted() {
        let entries = cidrs(15);
        let existing = vec![batch(0, &entries[0..10]), batch(5, &entries[10..15])];

        let ops = plan(&entries, &existing, Comparison::Ordered);
        assert_eq!(
            ops,
            vec![
                PlannedOperation::Add {
                    priority: 1,
                    cidrs: entries[10..15].to_vec()
                },
                PlannedOperation::Remove { priority: 5 },
            ]
        );

        let after = apply(&existing, &ops);
        let priorities: Vec<u32> = after.iter().map(|r| r.priority).collect();
        assert_eq!(priorities, vec![0, 1]);
    }

    #[test]
    fn test_empty_entries_remove_everything() {
        let old = cidrs(12);
        let existing = vec![batch(0, &old[0..10]), batch(1, &old[10..12])];
        let ops = plan(&[], &existing, Comparison::Ordered);
        assert_eq!(
            ops,
            vec![
                PlannedOperation::Remove { priority: 0 },
                PlannedOperation::Remove { priority: 1 },
            ]
        );
    }

    #[test]
    fn test_replan_after_apply_is_empty() {
        let old = cidrs(37);
        let existing = vec![
            batch(0, &old[0..10]),
            batch(1, &old[10..20]),
            batch(2, &old[20..30]),
            batch(3, &old[30..37]),
        ];
        let entries: Vec<String> = old[5..26].to_vec();

        let ops = plan(&entries, &existing, Comparison::Ordered);
        let after = apply(&existing, &ops);
        assert!(plan(&entries, &after, Comparison::Ordered).is_empty());
    }

    #[test]
    fn test_partial_apply_yields_remaining_work() {
        let entries = cidrs(30);
        let ops = plan(&entries, &[], Comparison::Ordered);
        assert_eq!(ops.len(), 3);

        // First operation succeeded, second failed
        let partial = apply(&[], &ops[..1]);
        let remaining = plan(&entries, &partial, Comparison::Ordered);
        assert_eq!(remaining, ops[1..].to_vec());
    }
}
