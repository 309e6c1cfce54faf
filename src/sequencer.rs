//! Dependency-aware ordering of planned work items.
//!
//! Items are grouped by ascending phase. Within a phase, repeated passes
//! place every item whose dependencies are already placed. Items that never
//! become placeable (cycles, unknown titles) are appended afterwards in their
//! input order and reported as unresolved.

use std::collections::{BTreeMap, HashSet};

use conveyor_common::WorkItem;
use tracing::warn;

/// Result of sequencing a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencedPlan {
    pub items: Vec<WorkItem>,
    /// Titles appended without their dependencies satisfied
    pub unresolved: Vec<String>,
}

pub fn sequence(items: Vec<WorkItem>) -> SequencedPlan {
    let mut by_phase: BTreeMap<u32, Vec<WorkItem>> = BTreeMap::new();
    for item in items {
        by_phase.entry(item.phase).or_default().push(item);
    }

    let mut ordered = Vec::new();
    let mut unresolved = Vec::new();
    for (phase, phase_items) in by_phase {
        let (placed, stuck) = order_phase(phase_items);
        if !stuck.is_empty() {
            let titles: Vec<&str> = stuck.iter().map(|i| i.title.as_str()).collect();
            warn!(phase, unresolved = ?titles, "dependencies could not be resolved; appending in input order");
            unresolved.extend(stuck.iter().map(|i| i.title.clone()));
        }
        ordered.extend(placed);
        ordered.extend(stuck);
    }

    SequencedPlan {
        items: ordered,
        unresolved,
    }
}

/// Order one phase. Returns `(resolved, unresolved)`.
fn order_phase(items: Vec<WorkItem>) -> (Vec<WorkItem>, Vec<WorkItem>) {
    let n = items.len();
    let max_passes = n * n + 1;
    let mut pending: Vec<Option<WorkItem>> = items.into_iter().map(Some).collect();
    let mut placed_titles: HashSet<String> = HashSet::new();
    let mut placed = Vec::with_capacity(n);

    for _ in 0..max_passes {
        let mut progressed = false;
        for slot in pending.iter_mut() {
            let ready = slot.as_ref().is_some_and(|item| {
                item.dependencies
                    .iter()
                    .all(|dep| placed_titles.contains(dep))
            });
            if ready && let Some(item) = slot.take() {
                placed_titles.insert(item.title.clone());
                placed.push(item);
                progressed = true;
            }
        }
        if !progressed || placed.len() == n {
            break;
        }
    }

    let stuck = pending.into_iter().flatten().collect();
    (placed, stuck)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn titles(plan: &SequencedPlan) -> Vec<&str> {
        plan.items.iter().map(|i| i.title.as_str()).collect()
    }

    #[test]
    fn test_chain_ordered_regardless_of_input_order() {
        let inputs = [
            vec![
                WorkItem::new("C", 1, &["B"]),
                WorkItem::new("B", 1, &["A"]),
                WorkItem::new("A", 1, &[]),
            ],
            vec![
                WorkItem::new("B", 1, &["A"]),
                WorkItem::new("A", 1, &[]),
                WorkItem::new("C", 1, &["B"]),
            ],
            vec![
                WorkItem::new("A", 1, &[]),
                WorkItem::new("B", 1, &["A"]),
                WorkItem::new("C", 1, &["B"]),
            ],
        ];
        for items in inputs {
            let plan = sequence(items);
            assert_eq!(titles(&plan), vec!["A", "B", "C"]);
            assert!(plan.unresolved.is_empty());
        }
    }

    #[test]
    fn test_cycle_items_each_present_once() {
        let plan = sequence(vec![
            WorkItem::new("X", 1, &["Y"]),
            WorkItem::new("Y", 1, &["X"]),
        ]);
        assert_eq!(titles(&plan), vec!["X", "Y"]);
        assert_eq!(plan.unresolved, vec!["X".to_string(), "Y".to_string()]);
    }

    #[test]
    fn test_unresolved_appended_after_resolvable() {
        let plan = sequence(vec![
            WorkItem::new("Broken", 1, &["Missing"]),
            WorkItem::new("Base", 1, &[]),
            WorkItem::new("Child", 1, &["Base"]),
        ]);
        assert_eq!(titles(&plan), vec!["Base", "Child", "Broken"]);
        assert_eq!(plan.unresolved, vec!["Broken".to_string()]);
    }

    #[test]
    fn test_phases_in_ascending_order() {
        let plan = sequence(vec![
            WorkItem::new("Deploy", 3, &[]),
            WorkItem::new("Api", 2, &[]),
            WorkItem::new("Setup", 1, &[]),
            WorkItem::new("Ui", 2, &["Api"]),
        ]);
        assert_eq!(titles(&plan), vec!["Setup", "Api", "Ui", "Deploy"]);
    }

    #[test]
    fn test_cross_phase_dependency_is_unresolved() {
        let plan = sequence(vec![
            WorkItem::new("Setup", 1, &[]),
            WorkItem::new("Feature", 2, &["Setup"]),
        ]);
        assert_eq!(titles(&plan), vec!["Setup", "Feature"]);
        assert_eq!(plan.unresolved, vec!["Feature".to_string()]);
    }

    #[test]
    fn test_independent_items_keep_input_order() {
        let plan = sequence(vec![
            WorkItem::new("One", 1, &[]),
            WorkItem::new("Two", 1, &[]),
            WorkItem::new("Three", 1, &[]),
        ]);
        assert_eq!(titles(&plan), vec!["One", "Two", "Three"]);
    }

    #[test]
    fn test_empty_input() {
        let plan = sequence(Vec::new());
        assert!(plan.items.is_empty());
        assert!(plan.unresolved.is_empty());
    }

    #[test]
    fn test_every_item_appears_exactly_once() {
        let plan = sequence(vec![
            WorkItem::new("A", 1, &["D"]),
            WorkItem::new("B", 1, &["A"]),
            WorkItem::new("C", 1, &[]),
            WorkItem::new("D", 1, &["B"]),
            WorkItem::new("E", 1, &["C"]),
        ]);
        let mut seen = titles(&plan);
        seen.sort();
        assert_eq!(seen, vec!["A", "B", "C", "D", "E"]);
        assert_eq!(titles(&plan)[..2], ["C", "E"]);
    }
}
