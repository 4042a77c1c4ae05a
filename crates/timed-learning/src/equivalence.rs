use std::collections::VecDeque;

use tracing::trace;

use timed_core::{
    BackwardRegionalElementaryLanguage, ElementaryLanguage, JuxtaposedZone, JuxtaposedZoneSet,
    RenamingRelation, TimedCondition, TimedConditionSet,
};

/// Whether `left` and `right` have equivalent rows under the given renaming:
/// the prefixes must be compatible and, per suffix, the symbolic membership
/// of either side juxtaposed against the other's extension must agree.
pub fn row_equivalence(
    left: &ElementaryLanguage,
    left_row: &[TimedConditionSet],
    right: &ElementaryLanguage,
    right_row: &[TimedConditionSet],
    suffixes: &[BackwardRegionalElementaryLanguage],
    renaming: &RenamingRelation,
) -> bool {
    debug_assert_eq!(left_row.len(), right_row.len());
    debug_assert_eq!(right_row.len(), suffixes.len());
    let mut juxtaposition = left.condition().juxtapose(right.condition());
    juxtaposition.add_renaming(renaming);
    if !juxtaposition.is_satisfiable() {
        return false;
    }
    for (index, suffix) in suffixes.iter().enumerate() {
        let left_concatenation = left.concat(suffix.elementary());
        let right_concatenation = right.concat(suffix.elementary());
        let mut left_juxtaposition = JuxtaposedZoneSet::from_left_set(
            &left_row[index],
            right_concatenation.condition(),
            suffix.word_size(),
        );
        left_juxtaposition.add_renaming(renaming);
        let mut right_juxtaposition = JuxtaposedZoneSet::from_right_set(
            left_concatenation.condition(),
            &right_row[index],
            suffix.word_size(),
        );
        right_juxtaposition.add_renaming(renaming);
        if left_juxtaposition != right_juxtaposition {
            return false;
        }
    }
    true
}

fn equivalence_on_juxtapositions(
    left_right: &JuxtaposedZone,
    left_juxtapositions: &[JuxtaposedZoneSet],
    right_juxtapositions: &[JuxtaposedZoneSet],
    renaming: &RenamingRelation,
) -> bool {
    debug_assert_eq!(left_juxtapositions.len(), right_juxtapositions.len());
    let mut prefixes = left_right.clone();
    prefixes.add_renaming(renaming);
    if !prefixes.is_satisfiable() {
        return false;
    }
    for (left, right) in left_juxtapositions.iter().zip(right_juxtapositions) {
        let mut left = left.clone();
        left.add_renaming(renaming);
        let mut right = right.clone();
        right.add_renaming(renaming);
        if left != right {
            return false;
        }
    }
    true
}

/// Searches for a renaming relation witnessing the equivalence of two rows.
///
/// The search proceeds in three stages: a bipartite compatibility graph over
/// the clocks of both sides (edges between clocks with equal tail upper
/// bounds; every component is complete), the collection of the clocks
/// strictly constrained by the symbolic membership (only those need to be
/// pinned), and candidate enumeration over the components followed by
/// verification. When no base candidate verifies, candidates are augmented by
/// one more edge in breadth-first order.
pub fn find_equivalent_renaming(
    left: &ElementaryLanguage,
    left_row: &[TimedConditionSet],
    right: &ElementaryLanguage,
    right_row: &[TimedConditionSet],
    suffixes: &[BackwardRegionalElementaryLanguage],
) -> Option<RenamingRelation> {
    debug_assert_eq!(left_row.len(), right_row.len());
    debug_assert_eq!(right_row.len(), suffixes.len());
    debug_assert!(left.is_simple());
    debug_assert!(right.is_simple());

    // 1. The bipartite compatibility graph. Both sides are scanned in
    // parallel in decreasing order of the tail sums; runs of equal upper
    // bounds form complete components.
    let n = left.word_size() + 1;
    let m = right.word_size() + 1;
    let mut v1_edges: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut v2_edges: Vec<Vec<usize>> = vec![Vec::new(); m];
    {
        let mut v1 = 0;
        let mut v2 = 0;
        let mut current_same_v1: Vec<usize> = Vec::new();
        let mut current_same_v2: Vec<usize> = Vec::new();
        while v1 < n && v2 < m {
            let left_bound = left.condition().upper_bound(v1, n - 1);
            let right_bound = right.condition().upper_bound(v2, m - 1);
            if left_bound == right_bound {
                for &old_v2 in &current_same_v2 {
                    v1_edges[v1].push(old_v2);
                    v2_edges[old_v2].push(v1);
                }
                for &old_v1 in &current_same_v1 {
                    v2_edges[v2].push(old_v1);
                    v1_edges[old_v1].push(v2);
                }
                v1_edges[v1].push(v2);
                v2_edges[v2].push(v1);
                current_same_v1.push(v1);
                current_same_v2.push(v2);
                v1 += 1;
                v2 += 1;
            } else {
                current_same_v1.clear();
                current_same_v2.clear();
                if left_bound < right_bound {
                    v2 += 1;
                } else {
                    v1 += 1;
                }
            }
        }
    }

    // 2. The strictly constrained clocks per suffix.
    let mut left_concatenations: Vec<TimedCondition> = Vec::with_capacity(left_row.len());
    let mut right_concatenations: Vec<TimedCondition> = Vec::with_capacity(left_row.len());
    let mut constrained_v1: Vec<usize> = Vec::new();
    let mut constrained_v2: Vec<usize> = Vec::new();
    for (index, suffix) in suffixes.iter().enumerate() {
        left_concatenations.push(left.concat(suffix.elementary()).condition().clone());
        right_concatenations.push(right.concat(suffix.elementary()).condition().clone());
        if left_row[index].is_empty() != right_row[index].is_empty() {
            // One side is bottom and the other is not.
            return None;
        }
        let current_v1 =
            left_row[index].strictly_constrained_variables(&left_concatenations[index], n);
        let current_v2 =
            right_row[index].strictly_constrained_variables(&right_concatenations[index], m);
        if current_v1.is_empty() != current_v2.is_empty() {
            // One side is trivially satisfied and the other is not.
            return None;
        }
        constrained_v1.extend(current_v1);
        constrained_v2.extend(current_v2);
    }
    constrained_v1.sort_unstable();
    constrained_v1.dedup();
    constrained_v1.retain(|&v1| !v1_edges[v1].is_empty());
    constrained_v2.sort_unstable();
    constrained_v2.dedup();
    constrained_v2.retain(|&v2| !v2_edges[v2].is_empty());

    // 3. Candidate enumeration: per component of the constrained subgraph,
    // every choice of one edge multiplies into the candidate set.
    let mut candidates: VecDeque<RenamingRelation> = VecDeque::new();
    candidates.push_back(RenamingRelation::empty());
    {
        let mut v1_index = 0;
        let mut v2_index = 0;
        while v1_index < constrained_v1.len() && v2_index < constrained_v2.len() {
            let v1 = constrained_v1[v1_index];
            let v2 = constrained_v2[v2_index];
            if v1_edges[v1].is_empty() {
                v1_index += 1;
                continue;
            }
            if v2_edges[v2].is_empty() {
                v2_index += 1;
                continue;
            }
            if v1_edges[v1].binary_search(&v2).is_err() {
                if *v1_edges[v1].last().expect("non-empty") >= v2 {
                    v2_index += 1;
                } else {
                    v1_index += 1;
                }
                continue;
            }
            if v2_edges[v2].binary_search(&v1).is_err() {
                if *v2_edges[v2].last().expect("non-empty") >= v1 {
                    v1_index += 1;
                } else {
                    v2_index += 1;
                }
                continue;
            }
            let mut extended: VecDeque<RenamingRelation> =
                VecDeque::with_capacity(candidates.len() * v2_edges[v2].len() * v1_edges[v1].len());
            for &current_v1 in &v2_edges[v2] {
                for &current_v2 in &v1_edges[v1] {
                    for candidate in &candidates {
                        let mut next = candidate.clone();
                        next.push((current_v1, current_v2));
                        extended.push_back(next);
                    }
                }
            }
            candidates = extended;
            // Skip to the next component.
            let v1_component_end = *v2_edges[v2].last().expect("non-empty");
            let v2_component_end = *v1_edges[v1].last().expect("non-empty");
            while v1_index < constrained_v1.len() && constrained_v1[v1_index] <= v1_component_end {
                v1_index += 1;
            }
            while v2_index < constrained_v2.len() && constrained_v2[v2_index] <= v2_component_end {
                v2_index += 1;
            }
        }
    }

    // 4. Verification, then breadth-first augmentation by single edges.
    let left_right = left.condition().juxtapose(right.condition());
    let mut left_juxtapositions: Vec<JuxtaposedZoneSet> = Vec::with_capacity(left_row.len());
    let mut right_juxtapositions: Vec<JuxtaposedZoneSet> = Vec::with_capacity(left_row.len());
    for (index, suffix) in suffixes.iter().enumerate() {
        left_juxtapositions.push(JuxtaposedZoneSet::from_left_set(
            &left_row[index],
            &right_concatenations[index],
            suffix.word_size(),
        ));
        right_juxtapositions.push(JuxtaposedZoneSet::from_right_set(
            &left_concatenations[index],
            &right_row[index],
            suffix.word_size(),
        ));
    }
    if let Some(found) = candidates.iter().find(|candidate| {
        equivalence_on_juxtapositions(
            &left_right,
            &left_juxtapositions,
            &right_juxtapositions,
            candidate,
        )
    }) {
        return Some(found.clone());
    }

    while let Some(candidate) = candidates.pop_front() {
        for &current_v1 in &constrained_v1 {
            for &current_v2 in &v1_edges[current_v1] {
                let mut augmented = candidate.clone();
                if !augmented.insert_sorted((current_v1, current_v2)) {
                    continue;
                }
                if row_equivalence(left, left_row, right, right_row, suffixes, &augmented) {
                    trace!("augmented renaming found: {augmented}");
                    return Some(augmented);
                }
                candidates.push_back(augmented);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use timed_core::ForwardRegionalElementaryLanguage;
    use timed_core::TimedWord;

    fn empty_suffix() -> BackwardRegionalElementaryLanguage {
        BackwardRegionalElementaryLanguage::default()
    }

    #[test]
    fn identical_rows_get_the_empty_renaming() {
        let left = ElementaryLanguage::empty();
        let right = ElementaryLanguage::empty();
        let row = vec![TimedConditionSet::new(left.condition().clone())];
        let renaming = find_equivalent_renaming(
            &left,
            &row,
            &right,
            &row,
            &[empty_suffix()],
        );
        assert_eq!(renaming, Some(RenamingRelation::empty()));
    }

    #[test]
    fn accepting_versus_rejecting_rows_differ() {
        let left = ElementaryLanguage::empty();
        let right = ElementaryLanguage::empty();
        let accepting = vec![TimedConditionSet::new(left.condition().clone())];
        let rejecting = vec![TimedConditionSet::bottom()];
        assert!(
            find_equivalent_renaming(&left, &accepting, &right, &rejecting, &[empty_suffix()])
                .is_none()
        );
    }

    #[test]
    fn rows_of_an_elapsed_prefix_match_with_empty_renaming() {
        // p1 is the empty region, p2 its continuous successor; with both rows
        // fully accepting on the empty suffix and on 'a', the equivalence is
        // witnessed without pinning any clock.
        let p1 = ForwardRegionalElementaryLanguage::default();
        let p2 = p1.continuous_successor();
        let suffix_empty = empty_suffix();
        let suffix_a = BackwardRegionalElementaryLanguage::from_timed_word(&TimedWord::new(
            vec!['a'],
            vec![0.0, 0.0],
        ));
        let suffixes = vec![suffix_empty, suffix_a];
        let row = |language: &ForwardRegionalElementaryLanguage| -> Vec<TimedConditionSet> {
            suffixes
                .iter()
                .map(|suffix| {
                    TimedConditionSet::new(
                        language
                            .elementary()
                            .concat(suffix.elementary())
                            .condition()
                            .clone(),
                    )
                })
                .collect()
        };
        let renaming = find_equivalent_renaming(
            p1.elementary(),
            &row(&p1),
            p2.elementary(),
            &row(&p2),
            &suffixes,
        );
        assert_eq!(renaming, Some(RenamingRelation::empty()));
    }
}
