use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

use itertools::Itertools;
use tracing::debug;

use timed_automata::{Transition, precise_clocks_after_reset};
use timed_core::constraint::{Constraint, guard_is_weaker, union_hull};
use timed_core::word::Action;
use timed_core::{
    ClockVariable, ElementaryLanguage, ForwardRegionalElementaryLanguage, ResetValue,
    TimedCondition,
};

use crate::transition_maker::ExternalTransitionMaker;

/// An elementary language together with the set of clocks whose value can be
/// trusted and the neighbouring regions an imprecise embedding may actually
/// have landed in. Guards synthesised from the original region are relaxed to
/// the union hull over the neighbourhood.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborConditions {
    original: ForwardRegionalElementaryLanguage,
    precise_clocks: BTreeSet<ClockVariable>,
    neighbors: Vec<ForwardRegionalElementaryLanguage>,
    clock_size: usize,
}

impl Hash for NeighborConditions {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.original.hash(state);
        self.precise_clocks.hash(state);
        self.neighbors.hash(state);
        self.clock_size.hash(state);
    }
}

impl NeighborConditions {
    pub fn new(
        original: ForwardRegionalElementaryLanguage,
        precise_clocks: impl IntoIterator<Item = ClockVariable>,
    ) -> Self {
        let clock_size = original.condition().size();
        let mut result = Self {
            neighbors: Vec::new(),
            precise_clocks: precise_clocks.into_iter().collect(),
            original,
            clock_size,
        };
        result.add_implicit_precise_clocks();
        result.neighbors = Self::make_neighbors(&result.original, &result.precise_clocks);
        if !result.precise_clocks.is_empty() {
            result.neighbors = result.update_neighbors_with_continuous_successors(&result.original);
        }
        result.assert_invariants();
        result
    }

    fn assert_invariants(&self) {
        debug_assert_eq!(self.clock_size, self.original.condition().size());
        debug_assert!(
            self.neighbors
                .iter()
                .all(|neighbor| neighbor.word() == self.original.word())
        );
        debug_assert!(
            self.neighbors
                .iter()
                .all(|neighbor| neighbor.condition().size() == self.clock_size)
        );
    }

    /// A clock pinned to a point in the original region is precise even when
    /// no renaming mentions it.
    fn add_implicit_precise_clocks(&mut self) {
        for clock in 0..self.clock_size {
            if !self.precise_clocks.contains(&clock)
                && self.original.condition().is_point_at(clock)
            {
                self.precise_clocks.insert(clock);
            }
        }
    }

    /// The regions agreeing with the original on the precise clocks (and on
    /// differences between clocks of equal trust) but free on the rest.
    fn make_neighbors(
        original: &ForwardRegionalElementaryLanguage,
        precise_clocks: &BTreeSet<ClockVariable>,
    ) -> Vec<ForwardRegionalElementaryLanguage> {
        let clock_size = original.condition().size();
        let last = clock_size - 1;
        let mut relaxed = TimedCondition::top(clock_size);
        for i in 0..clock_size {
            relaxed.restrict_lower_bound(i, last, original.condition().lower_bound(i, last), false);
            relaxed.restrict_upper_bound(i, last, original.condition().upper_bound(i, last), false);
            for j in (i + 1)..clock_size {
                if precise_clocks.contains(&i) == precise_clocks.contains(&j) {
                    relaxed.restrict_lower_bound(
                        i,
                        j - 1,
                        original.condition().lower_bound(i, j - 1),
                        false,
                    );
                    relaxed.restrict_upper_bound(
                        i,
                        j - 1,
                        original.condition().upper_bound(i, j - 1),
                        false,
                    );
                }
            }
        }
        relaxed
            .enumerate()
            .into_iter()
            .map(|condition| {
                ForwardRegionalElementaryLanguage::from_timed_word(
                    &ElementaryLanguage::new(original.word().to_vec(), condition).sample(),
                )
            })
            .collect()
    }

    /// Slides every neighbour forward in time for as long as its precise
    /// clocks stay within the successor's bounds, keeping the positions where
    /// they agree exactly.
    fn update_neighbors_with_continuous_successors(
        &self,
        successor: &ForwardRegionalElementaryLanguage,
    ) -> Vec<ForwardRegionalElementaryLanguage> {
        if self.precise_clocks.is_empty() {
            // Without a precise clock there is no bound to slide against.
            return self.neighbors.clone();
        }
        let last = self.clock_size - 1;
        let successor_last = successor.condition().size() - 1;
        let mut updated = Vec::with_capacity(self.neighbors.len());
        for neighbor in &self.neighbors {
            let mut current = neighbor.clone();
            loop {
                let within = self.precise_clocks.iter().all(|&clock| {
                    current.condition().upper_bound(clock, last)
                        <= successor.condition().upper_bound(clock, successor_last)
                });
                if !within {
                    break;
                }
                let agrees = self.precise_clocks.iter().all(|&clock| {
                    current.condition().lower_bound(clock, last)
                        == successor.condition().lower_bound(clock, successor_last)
                        && current.condition().upper_bound(clock, last)
                            == successor.condition().upper_bound(clock, successor_last)
                });
                if agrees {
                    updated.push(current.clone());
                }
                current = current.continuous_successor();
            }
        }
        updated.into_iter().unique().collect()
    }

    pub fn clock_size(&self) -> usize {
        self.clock_size
    }

    pub fn original(&self) -> &ForwardRegionalElementaryLanguage {
        &self.original
    }

    /// Whether the relaxation has collapsed to a single region.
    pub fn precise(&self) -> bool {
        self.neighbors.len() == 1
    }

    /// The guard of the original region, used for matching transitions.
    pub fn to_original_guard(&self) -> Vec<Constraint> {
        self.original.condition().to_guard()
    }

    /// Whether the transition guard covers the original region.
    pub fn matches(&self, guard: &[Constraint]) -> bool {
        guard_is_weaker(guard, &self.to_original_guard())
    }

    /// The union hull over the guards of all neighbouring regions.
    pub fn to_relaxed_guard(&self) -> Vec<Constraint> {
        let guards: Vec<Vec<Constraint>> = self
            .neighbors
            .iter()
            .map(|neighbor| neighbor.condition().to_guard())
            .collect();
        union_hull(&guards)
    }

    /// The clocks still precise after taking `transition` into a location
    /// with `target_clock_size` clocks.
    pub fn precise_clocks_after_reset(
        &self,
        transition: &Transition,
        target_clock_size: usize,
    ) -> BTreeSet<ClockVariable> {
        let precise = self.precise_clocks.iter().copied().collect();
        precise_clocks_after_reset(&precise, transition, target_clock_size)
            .into_iter()
            .collect()
    }

    /// The clocks that cannot be trusted, ascending.
    pub fn imprecise_clocks(&self) -> Vec<ClockVariable> {
        (0..self.clock_size)
            .filter(|clock| !self.precise_clocks.contains(clock))
            .collect()
    }

    /// A representative valuation of the original region, used to embed the
    /// imprecise clocks.
    pub fn to_original_valuation(&self) -> Vec<f64> {
        ExternalTransitionMaker::to_valuation(self.original.condition())
    }

    /// Whether the transition is internal: it only refreshes the fresh clock.
    pub fn is_internal(&self, transition: &Transition) -> bool {
        matches!(
            transition.resets.as_slice(),
            [(clock, ResetValue::Constant(value))]
                if *clock == self.clock_size && *value == 0.0
        )
    }

    fn construct_original_after_transition(
        &self,
        action: Action,
        transition: &Transition,
        target_clock_size: usize,
    ) -> ForwardRegionalElementaryLanguage {
        if self.is_internal(transition) {
            return self.original.discrete_successor(action);
        }
        debug_assert!(target_clock_size > 0);
        let mut new_word = self.original.word().to_vec();
        let pad = new_word.last().copied().unwrap_or(action);
        new_word.resize(target_clock_size - 1, pad);
        self.original
            .apply_resets(new_word, &transition.resets, target_clock_size)
    }

    /// The neighbourhood after firing `action` through `transition`.
    pub fn make_after_transition(
        &self,
        action: Action,
        transition: &Transition,
        target_clock_size: usize,
    ) -> NeighborConditions {
        NeighborConditions::new(
            self.construct_original_after_transition(action, transition, target_clock_size),
            self.precise_clocks_after_reset(transition, target_clock_size),
        )
    }

    /// The neighbourhood after a discrete step on `action`; the fresh clock
    /// is precise.
    pub fn discrete_successor(&self, action: Action) -> NeighborConditions {
        let neighbors = self
            .neighbors
            .iter()
            .map(|neighbor| neighbor.discrete_successor(action))
            .collect();
        let mut precise_clocks = self.precise_clocks.clone();
        precise_clocks.insert(self.clock_size);
        let result = NeighborConditions {
            original: self.original.discrete_successor(action),
            precise_clocks,
            neighbors,
            clock_size: self.clock_size + 1,
        };
        result.assert_invariants();
        result
    }

    /// The neighbourhood after elapsing one region.
    pub fn continuous_successor_assign(&mut self) {
        self.original.continuous_successor_assign();
        self.neighbors = self.update_neighbors_with_continuous_successors(&self.original.clone());
        debug!("neighbourhood advanced to {}", self.original);
    }
}

impl std::fmt::Display for NeighborConditions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {{{}}} with {} neighbors",
            self.original,
            self.precise_clocks.iter().map(|c| format!("x{c}")).join(", "),
            self.neighbors.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use timed_core::TimedWord;

    #[test]
    fn fully_precise_region_has_one_neighbor() {
        let original = ForwardRegionalElementaryLanguage::from_timed_word(&TimedWord::new(
            vec!['a'],
            vec![1.0, 0.5],
        ));
        let neighborhood = NeighborConditions::new(original, vec![0, 1]);
        assert!(neighborhood.precise());
        assert_eq!(neighborhood.imprecise_clocks(), Vec::<usize>::new());
    }

    #[test]
    fn imprecise_clock_widens_the_relaxed_guard() {
        // Region of (a, τ = (2.2, 2.5)): 4 < x0 < 5, 2 < x1 < 3. With only
        // clock 1 precise, the neighbourhood slides clock 0 across the
        // successor regions keeping clock 1 inside (2, 3), loosening its
        // upper bound to 6.
        let original = ForwardRegionalElementaryLanguage::from_timed_word(&TimedWord::new(
            vec!['a'],
            vec![2.2, 2.5],
        ));
        let neighborhood = NeighborConditions::new(original.clone(), vec![1]);
        assert!(!neighborhood.precise());
        let relaxed = neighborhood.to_relaxed_guard();
        assert_eq!(
            relaxed,
            vec![
                Constraint::gt(0, 4),
                Constraint::lt(0, 6),
                Constraint::gt(1, 2),
                Constraint::lt(1, 3),
            ]
        );
        let original_guard = original.condition().to_guard();
        assert!(guard_is_weaker(&relaxed, &original_guard));
        assert!(!guard_is_weaker(&original_guard, &relaxed));
    }

    #[test]
    fn matching_requires_the_guard_to_cover_the_region() {
        let original = ForwardRegionalElementaryLanguage::from_timed_word(&TimedWord::new(
            vec![],
            vec![1.5],
        ));
        let neighborhood = NeighborConditions::new(original, vec![0]);
        assert!(neighborhood.matches(&[Constraint::gt(0, 1)]));
        assert!(neighborhood.matches(&[Constraint::gt(0, 1), Constraint::lt(0, 2)]));
        assert!(!neighborhood.matches(&[Constraint::gt(0, 2)]));
    }
}
