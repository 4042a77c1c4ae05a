use indexmap::IndexMap;
use tracing::{debug, trace};

use timed_automata::{StateIndex, Transition};
use timed_core::constraint::clean_resets;
use timed_core::{Bound, RenamingRelation, ResetValue, Resets, TimedCondition, TimedConditionSet};

/// Builds the transitions that stay inside the active prefix set: one
/// transition per target location, whose guard unions the source regions.
///
/// A source sitting on the boundary of P may be registered together with its
/// widened exterior condition; its transition then carries the exterior guard
/// and a reset projecting the valuation back into the source region.
#[derive(Debug, Default)]
pub struct InternalTransitionMaker {
    source_map: IndexMap<StateIndex, TimedConditionSet>,
    boundary_exteriors: Vec<(TimedCondition, TimedCondition)>,
}

impl InternalTransitionMaker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a transition from `source_condition` into `target`. When
    /// `source_exterior` is given, the source also covers its continuous
    /// exterior and the guard is promoted accordingly.
    pub fn add(
        &mut self,
        target: StateIndex,
        source_condition: TimedCondition,
        source_exterior: Option<TimedCondition>,
    ) {
        trace!("internal transition source: {source_condition}");
        if let Some(exterior) = source_exterior {
            trace!("with exterior: {exterior}");
            self.boundary_exteriors
                .push((source_condition.clone(), exterior));
        }
        match self.source_map.get_mut(&target) {
            Some(conditions) => conditions.push(source_condition),
            None => {
                self.source_map
                    .insert(target, TimedConditionSet::new(source_condition));
            }
        }
    }

    /// A reset pinning every variable to a representative value inside the
    /// condition: points keep their value, intervals use their midpoint.
    fn to_reset(condition: &TimedCondition) -> Resets {
        debug_assert!(condition.is_simple());
        let mut condition = condition.clone();
        let last = condition.size() - 1;
        let mut result = Vec::with_capacity(condition.size());
        for i in 0..condition.size() {
            let lower = condition.lower_bound(i, last);
            let upper = condition.upper_bound(i, last);
            if lower.constant() == -upper.constant() && lower.is_closed() && upper.is_closed() {
                result.push((i, ResetValue::Constant(upper.constant())));
            } else {
                let middle = (upper.constant() - lower.constant()) / 2.0;
                result.push((i, ResetValue::Constant(middle)));
                condition.restrict_lower_bound(i, last, Bound::new(-middle, true), false);
                condition.restrict_upper_bound(i, last, Bound::new(middle, true), false);
            }
        }
        result
    }

    /// Emits one transition per registered source region. Every transition
    /// resets the freshly created clock to zero; boundary sources also reset
    /// the remaining clocks to a representative of the source region.
    pub fn make(&self) -> Vec<Transition> {
        let mut result = Vec::with_capacity(self.source_map.len());
        for (&target, source_conditions) in &self.source_map {
            for source_condition in source_conditions.iter() {
                let exterior = self
                    .boundary_exteriors
                    .iter()
                    .find(|(boundary, _)| source_condition.includes(boundary));
                match exterior {
                    None => {
                        let resets = vec![(source_condition.size(), ResetValue::Constant(0.0))];
                        result.push(Transition::new(target, resets, source_condition.to_guard()));
                    }
                    Some((boundary, exterior_condition)) => {
                        debug_assert_eq!(source_condition, boundary);
                        let mut resets = Self::to_reset(source_condition);
                        resets.push((source_condition.size(), ResetValue::Constant(0.0)));
                        result.push(Transition::new(
                            target,
                            resets,
                            exterior_condition.to_guard(),
                        ));
                    }
                }
            }
        }
        result
    }

    pub fn is_empty(&self) -> bool {
        self.source_map.is_empty()
    }
}

/// Builds the transitions leaving the active prefix set: sources are grouped
/// by target location and renaming relation, the renaming is completed with
/// the equalities forced by juxtaposing source and target regions, and the
/// reset embeds any remaining target clock at a representative valuation.
#[derive(Debug, Default)]
pub struct ExternalTransitionMaker {
    source_map: IndexMap<(StateIndex, RenamingRelation), TimedConditionSet>,
    target_map: IndexMap<(StateIndex, RenamingRelation), TimedConditionSet>,
    boundary_exteriors: Vec<(TimedCondition, TimedCondition)>,
}

impl ExternalTransitionMaker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A representative valuation of the condition: points keep their value,
    /// intervals their midpoint.
    pub fn to_valuation(condition: &TimedCondition) -> Vec<f64> {
        let mut condition = condition.clone();
        let last = condition.size() - 1;
        let mut result = vec![0.0; condition.size()];
        for i in 0..condition.size() {
            let lower = condition.lower_bound(i, last);
            let upper = condition.upper_bound(i, last);
            if lower.constant() == -upper.constant() && lower.is_closed() && upper.is_closed() {
                result[i] = upper.constant();
            } else {
                let middle = (upper.constant() - lower.constant()) / 2.0;
                result[i] = middle;
                condition.restrict_lower_bound(i, last, Bound::new(-middle, true), false);
                condition.restrict_upper_bound(i, last, Bound::new(middle, true), false);
            }
        }
        result
    }

    /// Registers the morphism `(source_condition, target_condition, renaming)`
    /// into `target`.
    pub fn add(
        &mut self,
        target: StateIndex,
        renaming: RenamingRelation,
        source_condition: TimedCondition,
        target_condition: TimedCondition,
    ) {
        let key = (target, renaming);
        match self.source_map.get_mut(&key) {
            Some(sources) => {
                sources.push(source_condition);
                self.target_map
                    .get_mut(&key)
                    .expect("source and target maps share keys")
                    .push(target_condition);
            }
            None => {
                self.source_map
                    .insert(key.clone(), TimedConditionSet::new(source_condition));
                self.target_map
                    .insert(key, TimedConditionSet::new(target_condition));
            }
        }
    }

    /// Widens the guard of the transition from `source_condition` to the
    /// given exterior, covering the continuous boundary of the source row.
    pub fn add_exterior(&mut self, source_condition: TimedCondition, exterior: TimedCondition) {
        self.boundary_exteriors.push((source_condition, exterior));
    }

    /// Emits one transition per registered source region.
    pub fn make(&self) -> Vec<Transition> {
        self.make_inner(false)
    }

    /// Like [`ExternalTransitionMaker::make`], for discrete events: the
    /// source region mentions the clock created by the event itself (pinned
    /// to zero), which does not exist in the source location, so its guard
    /// atoms are dropped.
    pub fn make_for_event(&self) -> Vec<Transition> {
        self.make_inner(true)
    }

    fn make_inner(&self, drop_fresh_clock: bool) -> Vec<Transition> {
        let mut result = Vec::with_capacity(self.source_map.len());
        for (key, source_conditions) in &self.source_map {
            let (target, renaming) = key;
            debug!("renaming for target {target}: {renaming}");
            let target_conditions = &self.target_map[key];
            debug_assert_eq!(source_conditions.len(), target_conditions.len());
            for (source_condition, target_condition) in
                source_conditions.iter().zip(target_conditions.iter())
            {
                // Equalities forced by the juxtaposition extend the renaming.
                let mut juxtaposed = source_condition.juxtapose(target_condition);
                juxtaposed.add_renaming(renaming);
                let mut full_renaming = RenamingRelation::new(juxtaposed.forced_renaming());
                full_renaming.dedup_by_right();
                debug!(
                    "transition from {source_condition} with renaming {full_renaming} into {target_condition}"
                );
                let mut resets = full_renaming.to_resets(source_condition);
                let valuation = Self::to_valuation(target_condition);
                for variable in 0..target_condition.size() {
                    match resets.iter_mut().find(|(reset, _)| *reset == variable) {
                        None => {
                            resets.push((variable, ResetValue::Constant(valuation[variable])));
                        }
                        Some((_, value)) => {
                            if valuation[variable] == valuation[variable].floor() {
                                // A constant embedding is precise; prefer it.
                                *value = ResetValue::Constant(valuation[variable]);
                            }
                        }
                    }
                }
                let exterior = self
                    .boundary_exteriors
                    .iter()
                    .find(|(boundary, _)| boundary == source_condition);
                let guard = match exterior {
                    Some((_, widened)) => widened.to_guard(),
                    None => {
                        let mut guard = source_condition.to_guard();
                        if drop_fresh_clock {
                            let fresh = source_condition.size() - 1;
                            if source_condition.is_point_at(fresh)
                                && source_condition.upper_bound(fresh, fresh).constant() == 0.0
                            {
                                guard.retain(|constraint| constraint.clock != fresh);
                            }
                        }
                        guard
                    }
                };
                result.push(Transition::new(*target, clean_resets(resets), guard));
            }
        }
        result
    }

    pub fn is_empty(&self) -> bool {
        self.source_map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use timed_core::{Constraint, ForwardRegionalElementaryLanguage, TimedWord};

    #[test]
    fn internal_transition_resets_only_the_fresh_clock() {
        let source = ForwardRegionalElementaryLanguage::from_timed_word(&TimedWord::new(
            vec![],
            vec![0.5],
        ));
        let mut maker = InternalTransitionMaker::new();
        maker.add(1, source.condition().clone(), None);
        let transitions = maker.make();
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].target, 1);
        assert_eq!(
            transitions[0].resets,
            vec![(1, ResetValue::Constant(0.0))]
        );
        assert_eq!(
            transitions[0].guard,
            vec![Constraint::gt(0, 0), Constraint::lt(0, 1)]
        );
    }

    #[test]
    fn boundary_source_projects_back_into_the_region() {
        // Source region τ0 = 1, exterior widened to 1 <= τ0 < 2
        let source = ForwardRegionalElementaryLanguage::from_timed_word(&TimedWord::new(
            vec![],
            vec![1.0],
        ));
        let exterior = source
            .condition()
            .convex_hull(source.continuous_successor().condition());
        let mut maker = InternalTransitionMaker::new();
        maker.add(0, source.condition().clone(), Some(exterior));
        let transitions = maker.make();
        assert_eq!(transitions.len(), 1);
        // The guard covers the exterior
        assert!(transitions[0].guard.contains(&Constraint::ge(0, 1)));
        assert!(transitions[0].guard.contains(&Constraint::lt(0, 2)));
        // The reset pins clock 0 back to its representative and refreshes
        // the fresh clock
        assert_eq!(
            transitions[0].resets,
            vec![
                (0, ResetValue::Constant(1.0)),
                (1, ResetValue::Constant(0.0))
            ]
        );
    }

    #[test]
    fn external_transition_discovers_implicit_equalities() {
        // Source region of the word aa with τ = (1.5, 0.5, 0.3):
        //   1 < T00 < 2, T01 = 2, 2 < T02 < 3, 0 < T11 < 1, 0 < T12 < 1,
        //   0 < T22 < 1
        let source = ForwardRegionalElementaryLanguage::from_timed_word(&TimedWord::new(
            vec!['a', 'a'],
            vec![1.5, 0.5, 0.3],
        ));
        // Target region of the word a with τ = (2, 0.3): T'00 = 2,
        // 2 < T'01 < 3, 0 < T'11 < 1
        let target = ForwardRegionalElementaryLanguage::from_timed_word(&TimedWord::new(
            vec!['a'],
            vec![2.0, 0.3],
        ));
        let mut maker = ExternalTransitionMaker::new();
        maker.add(
            0,
            RenamingRelation::new(vec![(0, 0)]),
            source.condition().clone(),
            target.condition().clone(),
        );
        let transitions = maker.make();
        assert_eq!(transitions.len(), 1);
        // Guard over the source clocks
        assert_eq!(
            transitions[0].guard,
            vec![
                Constraint::gt(0, 2),
                Constraint::lt(0, 3),
                Constraint::gt(1, 0),
                Constraint::lt(1, 1),
                Constraint::gt(2, 0),
                Constraint::lt(2, 1),
            ]
        );
        // T01 = 2 and T'00 = 2 force x'1 = x2; x'0 = x0 is an identity
        assert_eq!(transitions[0].resets, vec![(1, ResetValue::Clock(2))]);
    }

    #[test]
    fn unpinned_target_clocks_are_embedded_at_the_midpoint() {
        let source = ForwardRegionalElementaryLanguage::from_timed_word(&TimedWord::new(
            vec![],
            vec![0.5],
        ));
        // Target with a single free clock in (0, 1); nothing is renamed
        let target = ForwardRegionalElementaryLanguage::from_timed_word(&TimedWord::new(
            vec![],
            vec![0.25],
        ));
        let mut maker = ExternalTransitionMaker::new();
        maker.add(
            2,
            RenamingRelation::empty(),
            source.condition().clone(),
            target.condition().clone(),
        );
        let transitions = maker.make();
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].target, 2);
        assert_eq!(transitions[0].resets, vec![(0, ResetValue::Constant(0.5))]);
    }
}
