use std::collections::HashSet;

use tracing::{debug, error};

use timed_automata::{StateIndex, TimedAutomaton, Transition};
use timed_core::constraint::guard_is_weaker;
use timed_core::word::Action;
use timed_core::{
    ClockVariable, ForwardRegionalElementaryLanguage, RenamingRelation, ResetValue, Resets,
};

use crate::neighbor::NeighborConditions;

/// Relaxes guards around transitions whose reset embedded an imprecise clock
/// value: the embedded valuation may actually lie in any neighbouring region,
/// so matching guards are widened to the union hull of the neighbourhood and
/// the imprecision is propagated along the reached transitions.
#[derive(Default)]
pub struct ImpreciseClockHandler {
    imprecise_neighbors: Vec<(StateIndex, NeighborConditions)>,
}

impl ImpreciseClockHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the target of a morphism-based transition whose renaming
    /// leaves imprecise clocks in the target region.
    pub fn push(
        &mut self,
        jumped_state: StateIndex,
        renaming: &RenamingRelation,
        target_elementary: &ForwardRegionalElementaryLanguage,
    ) {
        if renaming.has_imprecise_clocks(target_elementary.condition()) {
            debug!(
                "imprecise neighbourhood at state {jumped_state}: {target_elementary} under {renaming}"
            );
            let neighborhood =
                NeighborConditions::new(target_elementary.clone(), renaming.right_variables());
            if !self
                .imprecise_neighbors
                .iter()
                .any(|(state, existing)| *state == jumped_state && *existing == neighborhood)
            {
                self.imprecise_neighbors.push((jumped_state, neighborhood));
            }
        }
    }

    /// Replaces the resets of imprecise clocks by an embedding of the
    /// original region's representative valuation.
    fn embed_if_imprecise(
        mut resets: Resets,
        precise_clocks: &std::collections::BTreeSet<ClockVariable>,
        embedded_valuation: &[f64],
    ) -> Resets {
        resets.retain(|(clock, _)| precise_clocks.contains(clock));
        for (clock, value) in embedded_valuation.iter().enumerate() {
            if !precise_clocks.contains(&clock) {
                resets.push((clock, ResetValue::Constant(*value)));
            }
        }
        resets
    }

    fn handle_one(
        automaton: &TimedAutomaton,
        neighbor: &NeighborConditions,
        action: Action,
        transition: &Transition,
        new_transitions: &mut Vec<Transition>,
        match_bounded: &mut bool,
        no_match: &mut bool,
    ) -> Option<(StateIndex, NeighborConditions)> {
        if !neighbor.matches(&transition.guard) {
            return None;
        }
        *no_match = false;
        let upper_bounded = transition.guard.iter().any(|c| c.is_upper_bound());
        *match_bounded = *match_bounded || upper_bounded;
        let mut relaxed_guard = neighbor.to_relaxed_guard();
        if relaxed_guard.is_empty() {
            // The neighbourhood slid out of every bounded region; an empty
            // relaxation would make the transition unconditional.
            return None;
        }
        if !upper_bounded {
            // The matched guard accepts arbitrarily late events.
            relaxed_guard.retain(|constraint| !constraint.is_upper_bound());
        }
        debug!("relaxed guard: {:?}", relaxed_guard);
        if !(guard_is_weaker(&relaxed_guard, &transition.guard)
            && !guard_is_weaker(&transition.guard, &relaxed_guard))
        {
            return None;
        }
        let target_clock_size = automaton.target_clock_size(transition);
        let precise_after = neighbor.precise_clocks_after_reset(transition, target_clock_size);
        let neighbor_after =
            neighbor.make_after_transition(action, transition, target_clock_size.max(1));
        let original_valuation = neighbor_after.to_original_valuation();
        new_transitions.push(Transition::new(
            transition.target,
            Self::embed_if_imprecise(
                transition.resets.clone(),
                &precise_after,
                &original_valuation,
            ),
            relaxed_guard,
        ));
        if precise_after.is_empty() || neighbor_after.precise() {
            None
        } else {
            Some((transition.target, neighbor_after))
        }
    }

    /// Runs the relaxation worklist to a fixpoint.
    pub fn run(&mut self, automaton: &mut TimedAutomaton) {
        let mut visited: HashSet<(StateIndex, NeighborConditions)> = HashSet::new();
        // A neighbourhood past every guard constant can only match unbounded
        // guards; the elapse loop is cut off there.
        let max_constant = automaton
            .states
            .iter()
            .flat_map(|state| state.next.values().flatten())
            .flat_map(|transition| transition.guard.iter())
            .map(|constraint| constraint.constant)
            .max()
            .unwrap_or(0);
        let elapse_limit = (2 * (max_constant as usize + 2)) * (automaton.clock_size() + 1) + 4;

        while let Some((state, mut neighbor)) = self.imprecise_neighbors.pop() {
            if !visited.insert((state, neighbor.clone())) {
                continue;
            }
            if neighbor.clock_size() > automaton.clock_size() + 1 {
                // Propagation past the clock space of the automaton cannot
                // influence any guard.
                debug!("dropping a neighbourhood beyond the clock space");
                continue;
            }
            let mut no_match = true;
            let mut elapses = 0;
            loop {
                let mut match_bounded = false;
                let actions: Vec<Action> =
                    automaton.states[state].next.keys().copied().collect();
                for action in actions {
                    let snapshot = automaton.states[state].transitions(action).to_vec();
                    let mut new_transitions = Vec::new();
                    for transition in &snapshot {
                        if let Some(pending) = Self::handle_one(
                            automaton,
                            &neighbor,
                            action,
                            transition,
                            &mut new_transitions,
                            &mut match_bounded,
                            &mut no_match,
                        ) {
                            self.imprecise_neighbors.push(pending);
                        }
                    }
                    if !new_transitions.is_empty() {
                        automaton.states[state]
                            .next
                            .entry(action)
                            .or_default()
                            .extend(new_transitions);
                    }
                }
                neighbor.continuous_successor_assign();
                elapses += 1;
                if !(match_bounded || no_match) {
                    break;
                }
                if elapses > elapse_limit {
                    error!(
                        "imprecise-clock relaxation did not stabilise at state {state}; giving up on this neighbourhood"
                    );
                    break;
                }
            }
        }
        debug!("imprecise-clock relaxation finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use timed_automata::State;
    use timed_core::{Constraint, TimedWord};

    #[test]
    fn matching_guard_gets_a_relaxed_sibling() {
        // One state with a self-loop guarded exactly by the original region
        // of (a, τ = (2.2, 2.5)); clock 1 precise, clock 0 imprecise.
        let original = ForwardRegionalElementaryLanguage::from_timed_word(&TimedWord::new(
            vec!['a'],
            vec![2.2, 2.5],
        ));
        let guard = original.condition().to_guard();
        let mut state = State::new(true);
        state.add_transition(
            'a',
            Transition::new(0, vec![(2, ResetValue::Constant(0.0))], guard.clone()),
        );
        let mut automaton = TimedAutomaton {
            states: vec![state],
            initial: vec![0],
            max_constraints: vec![5, 3, 5],
        };
        let mut handler = ImpreciseClockHandler::new();
        let renaming = RenamingRelation::new(vec![(1, 1)]);
        assert!(renaming.has_imprecise_clocks(original.condition()));
        handler.push(0, &renaming, &original);
        handler.run(&mut automaton);

        // A transition with the widened guard x0 < 6 was added next to the
        // original one.
        let transitions = automaton.states[0].transitions('a');
        assert!(transitions.len() > 1);
        assert!(transitions.iter().any(|transition| {
            transition.guard.contains(&Constraint::lt(0, 6))
                && transition.guard.contains(&Constraint::gt(1, 2))
        }));
    }

    #[test]
    fn precise_renaming_registers_nothing() {
        let original = ForwardRegionalElementaryLanguage::from_timed_word(&TimedWord::new(
            vec!['a'],
            vec![2.2, 2.5],
        ));
        let mut handler = ImpreciseClockHandler::new();
        let renaming = RenamingRelation::new(vec![(0, 0), (1, 1)]);
        handler.push(0, &renaming, &original);
        assert!(handler.imprecise_neighbors.is_empty());
    }
}
