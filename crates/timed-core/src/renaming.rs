use std::fmt;
use std::ops::Deref;

use itertools::Itertools;

use crate::condition::TimedCondition;
use crate::constraint::{ResetValue, Resets};

/// An ordered list of clock equalities `(left, right)` witnessing that the
/// left variable of a morphism equals the right one. The ordering keeps
/// hashing and candidate enumeration deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenamingRelation {
    pairs: Vec<(usize, usize)>,
}

impl RenamingRelation {
    pub fn new(pairs: Vec<(usize, usize)>) -> Self {
        Self { pairs }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn pairs(&self) -> &[(usize, usize)] {
        &self.pairs
    }

    pub fn push(&mut self, pair: (usize, usize)) {
        self.pairs.push(pair);
    }

    /// Inserts keeping the lexicographic order; returns false when the pair
    /// is already present.
    pub fn insert_sorted(&mut self, pair: (usize, usize)) -> bool {
        match self.pairs.binary_search(&pair) {
            Ok(_) => false,
            Err(position) => {
                self.pairs.insert(position, pair);
                true
            }
        }
    }

    /// The right-hand variables pinned by this renaming.
    pub fn right_variables(&self) -> Vec<usize> {
        self.pairs.iter().map(|(_, right)| *right).collect()
    }

    /// The plain reset view: each pair `(l, r)` resets clock `r` to clock
    /// `l`, dropping identities.
    pub fn to_plain_resets(&self) -> Resets {
        self.pairs
            .iter()
            .filter(|(left, right)| left != right)
            .map(|&(left, right)| (right, ResetValue::Clock(left)))
            .collect()
    }

    /// The reset view against a concrete source region: a pair whose source
    /// variable is pinned to a point becomes a constant assignment, the rest
    /// stay clock copies. Identity copies are kept; callers clean them once
    /// all resets of a transition are assembled.
    pub fn to_resets(&self, source: &TimedCondition) -> Resets {
        let last = source.size() - 1;
        self.pairs
            .iter()
            .map(|&(left, right)| {
                if left < source.size() && source.is_point_at(left) {
                    let value = source.upper_bound(left, last).constant();
                    (right, ResetValue::Constant(value))
                } else {
                    (right, ResetValue::Clock(left))
                }
            })
            .collect()
    }

    /// Keeps one pair per right-hand variable, preferring the smaller left
    /// variable, and sorts by the right-hand side.
    pub fn dedup_by_right(&mut self) {
        self.pairs
            .sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)));
        self.pairs.dedup_by_key(|pair| pair.1);
    }

    /// Whether the renaming leaves an imprecise clock in the target region: a
    /// variable not pinned by the renaming whose bound is not a point.
    pub fn has_imprecise_clocks(&self, target: &TimedCondition) -> bool {
        let pinned = self.right_variables();
        (0..target.size()).any(|variable| {
            !pinned.contains(&variable) && !target.is_point_at(variable)
        })
    }
}

impl Deref for RenamingRelation {
    type Target = [(usize, usize)];

    fn deref(&self) -> &Self::Target {
        &self.pairs
    }
}

impl FromIterator<(usize, usize)> for RenamingRelation {
    fn from_iter<T: IntoIterator<Item = (usize, usize)>>(iter: T) -> Self {
        Self {
            pairs: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for RenamingRelation {
    type Item = (usize, usize);
    type IntoIter = std::vec::IntoIter<(usize, usize)>;

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.into_iter()
    }
}

impl fmt::Display for RenamingRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{{}}}",
            self.pairs
                .iter()
                .map(|(left, right)| format!("t{left} == t'{right}"))
                .join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::Bound;

    #[test]
    fn plain_resets_swap_sides_and_drop_identities() {
        let renaming = RenamingRelation::new(vec![(0, 0), (2, 1)]);
        assert_eq!(renaming.to_plain_resets(), vec![(1, ResetValue::Clock(2))]);
    }

    #[test]
    fn pinned_sources_become_constants() {
        // Source region: T_{0,1} = 2, T_{1,1} in (0,1)
        let mut source = TimedCondition::top(2);
        source.restrict_lower_bound(0, 1, Bound::new(-2.0, true), true);
        source.restrict_upper_bound(0, 1, Bound::new(2.0, true), true);
        source.restrict_lower_bound(1, 1, Bound::new(0.0, false), true);
        source.restrict_upper_bound(1, 1, Bound::new(1.0, false), true);
        let renaming = RenamingRelation::new(vec![(0, 1), (1, 0)]);
        let resets = renaming.to_resets(&source);
        assert_eq!(
            resets,
            vec![(1, ResetValue::Constant(2.0)), (0, ResetValue::Clock(1))]
        );
    }

    #[test]
    fn imprecise_clocks_are_the_unpinned_non_points() {
        let mut target = TimedCondition::top(2);
        target.restrict_lower_bound(0, 1, Bound::new(-1.0, true), true);
        target.restrict_upper_bound(0, 1, Bound::new(1.0, true), true);
        target.restrict_lower_bound(1, 1, Bound::new(0.0, false), true);
        target.restrict_upper_bound(1, 1, Bound::new(1.0, false), true);
        // Variable 1 is neither renamed nor a point
        assert!(RenamingRelation::new(vec![(0, 0)]).has_imprecise_clocks(&target));
        // Pinning variable 1 removes the imprecision
        assert!(!RenamingRelation::new(vec![(0, 0), (1, 1)]).has_imprecise_clocks(&target));
    }
}
