use std::collections::VecDeque;

use indexmap::IndexMap;
use itertools::Itertools;
use tracing::{debug, trace};

use timed_core::constraint::apply_resets_to_valuation;
use timed_core::word::{Action, TimedWord};
use timed_core::{Bound, Zone};

use crate::automaton::{StateIndex, TimedAutomaton, Transition};

/// A state of a zone automaton: a location of the underlying timed automaton
/// paired with a reachable zone.
#[derive(Debug, Clone)]
pub struct ZoneState {
    pub ta_state: StateIndex,
    pub is_match: bool,
    pub zone: Zone,
    pub next: IndexMap<Action, Vec<(Transition, StateIndex)>>,
}

impl ZoneState {
    fn new(ta_state: StateIndex, is_match: bool, zone: Zone) -> Self {
        Self {
            ta_state,
            is_match,
            zone,
            next: IndexMap::new(),
        }
    }
}

/// The zone graph of a timed automaton, built breadth-first from the initial
/// locations. A freshly reached zone is merged into an existing state of the
/// same location whose zone includes it.
#[derive(Debug, Clone, Default)]
pub struct ZoneAutomaton {
    pub states: Vec<ZoneState>,
    pub initial: Vec<StateIndex>,
}

impl ZoneAutomaton {
    /// Builds the zone graph of `automaton` with diagonal extrapolation
    /// against its per-clock maximum constants.
    pub fn from_automaton(automaton: &TimedAutomaton) -> Self {
        let clock_size = automaton.clock_size();
        let mut initial_zone = Zone::zero(clock_size + 1);
        if clock_size > 0 {
            let m = automaton
                .max_constraints
                .iter()
                .copied()
                .max()
                .unwrap_or(0);
            initial_zone.m = Bound::new(m as f64, true);
            initial_zone.max_constants = automaton
                .max_constraints
                .iter()
                .map(|&c| c as f64)
                .collect();
        } else {
            initial_zone.m = Bound::zero();
        }

        let mut result = ZoneAutomaton::default();
        let mut queue: VecDeque<StateIndex> = VecDeque::new();
        for &ta_initial in &automaton.initial {
            let index = result.states.len();
            result.states.push(ZoneState::new(
                ta_initial,
                automaton.states[ta_initial].is_match,
                initial_zone.clone(),
            ));
            result.initial.push(index);
            queue.push_back(index);
        }

        while let Some(za_index) = queue.pop_front() {
            let ta_state = result.states[za_index].ta_state;
            let mut elapsed = result.states[za_index].zone.clone();
            elapsed.elapse();
            let actions: Vec<Action> =
                automaton.states[ta_state].next.keys().copied().collect();
            for action in actions {
                for edge in automaton.states[ta_state].transitions(action) {
                    let mut next_zone = elapsed.clone();
                    next_zone.tighten_guard(&edge.guard);
                    if !next_zone.is_satisfiable() {
                        continue;
                    }
                    next_zone.apply_resets(&edge.resets);
                    next_zone.canonize();
                    if !next_zone.is_satisfiable_no_canonize() {
                        continue;
                    }
                    next_zone.normalize_diagonal();
                    next_zone.extrapolate();
                    next_zone.canonize();
                    next_zone.normalize_diagonal();

                    let existing = result.states.iter().position(|state| {
                        state.ta_state == edge.target && state.zone.includes(&next_zone)
                    });
                    let target = match existing {
                        Some(index) => index,
                        None => {
                            let index = result.states.len();
                            result.states.push(ZoneState::new(
                                edge.target,
                                automaton.states[edge.target].is_match,
                                next_zone,
                            ));
                            queue.push_back(index);
                            index
                        }
                    };
                    result.states[za_index]
                        .next
                        .entry(action)
                        .or_default()
                        .push((edge.clone(), target));
                }
            }
        }
        debug!("zone automaton has {} states", result.state_size());
        result
    }

    pub fn state_size(&self) -> usize {
        self.states.len()
    }

    /// Removes states from which no accepting state is reachable.
    pub fn remove_dead_states(&mut self) {
        let mut alive = vec![false; self.states.len()];
        let mut queue: VecDeque<StateIndex> = VecDeque::new();
        for (index, state) in self.states.iter().enumerate() {
            if state.is_match {
                alive[index] = true;
                queue.push_back(index);
            }
        }
        let mut predecessors: Vec<Vec<StateIndex>> = vec![Vec::new(); self.states.len()];
        for (index, state) in self.states.iter().enumerate() {
            for (_, target) in state.next.values().flatten() {
                predecessors[*target].push(index);
            }
        }
        while let Some(index) = queue.pop_front() {
            for &predecessor in &predecessors[index] {
                if !alive[predecessor] {
                    alive[predecessor] = true;
                    queue.push_back(predecessor);
                }
            }
        }

        let mut remap: Vec<Option<StateIndex>> = Vec::with_capacity(self.states.len());
        let mut next_index = 0;
        for live in &alive {
            if *live {
                remap.push(Some(next_index));
                next_index += 1;
            } else {
                remap.push(None);
            }
        }
        let old_states = std::mem::take(&mut self.states);
        for (index, mut state) in old_states.into_iter().enumerate() {
            if remap[index].is_none() {
                continue;
            }
            for transitions in state.next.values_mut() {
                transitions.retain(|(_, target)| remap[*target].is_some());
                for (_, target) in transitions.iter_mut() {
                    *target = remap[*target].expect("retained above");
                }
            }
            state.next.retain(|_, transitions| !transitions.is_empty());
            self.states.push(state);
        }
        self.initial = self
            .initial
            .iter()
            .filter_map(|&index| remap[index])
            .collect();
    }

    /// Searches for an accepting zone state and reconstructs a concrete
    /// witness word for it. Reconstruction can fail for a particular run when
    /// inclusion merging collapsed states; such runs are skipped.
    pub fn sample(&self) -> Option<TimedWord> {
        let mut visited = vec![false; self.states.len()];
        let mut current: Vec<SymbolicRun> = Vec::new();
        for &initial in &self.initial {
            visited[initial] = true;
            current.push(SymbolicRun::new(initial, self.states[initial].zone.clone()));
        }
        while !current.is_empty() {
            let mut next_runs = Vec::new();
            for run in &current {
                if self.states[run.last_state()].is_match {
                    if let Some(word) = run.reconstruct_word() {
                        return Some(word);
                    }
                    debug!("witness reconstruction failed, continuing the search");
                }
                for (&action, edges) in &self.states[run.last_state()].next {
                    for (transition, target) in edges {
                        if !visited[*target] {
                            visited[*target] = true;
                            let mut extended = run.clone();
                            extended.push(transition.clone(), action, *target);
                            next_runs.push(extended);
                        }
                    }
                }
            }
            current = next_runs;
        }
        None
    }
}

/// A run of a zone automaton, tracking the unabstracted zones along the way
/// so a concrete word can be reconstructed backwards.
#[derive(Debug, Clone)]
pub struct SymbolicRun {
    states: Vec<StateIndex>,
    tight_zones: Vec<Zone>,
    edges: Vec<Transition>,
    word: Vec<Action>,
}

impl SymbolicRun {
    pub fn new(initial: StateIndex, initial_zone: Zone) -> Self {
        Self {
            states: vec![initial],
            tight_zones: vec![initial_zone],
            edges: Vec::new(),
            word: Vec::new(),
        }
    }

    pub fn last_state(&self) -> StateIndex {
        *self.states.last().expect("runs are never empty")
    }

    /// Extends the run by one transition, propagating the tight zone.
    pub fn push(&mut self, transition: Transition, action: Action, target: StateIndex) {
        let mut zone = self.tight_zones.last().expect("runs are never empty").clone();
        zone.elapse();
        zone.tighten_guard(&transition.guard);
        zone.apply_resets(&transition.resets);
        zone.canonize();
        self.states.push(target);
        self.tight_zones.push(zone);
        self.edges.push(transition);
        self.word.push(action);
    }

    /// Reconstructs a concrete timed word along the run by backward sampling,
    /// following Andre et al. Returns `None` when a zone on the way back is
    /// infeasible, which can happen after state merging.
    pub fn reconstruct_word(&self) -> Option<TimedWord> {
        trace!("started word reconstruction");
        let mut post_zone = self.tight_zones.last().expect("runs are never empty").clone();
        if !post_zone.is_satisfiable() {
            return None;
        }
        let m = post_zone.m;
        let mut post_valuation = post_zone.sample();
        let mut durations: VecDeque<f64> = VecDeque::new();

        for i in (0..self.edges.len()).rev() {
            trace!("post valuation: {:?}", post_valuation);
            let mut pre_zone = self.tight_zones[i].clone();
            pre_zone.canonize();

            let mut zone_before_jump = Zone::from_valuation(&post_valuation, m);
            if !zone_before_jump.is_satisfiable_no_canonize() {
                debug!("failed to reconstruct a word from the symbolic run");
                return None;
            }
            let transition = &self.edges[i];
            zone_before_jump.revert_resets(&transition.resets);
            debug_assert!(zone_before_jump.is_satisfiable_no_canonize());
            for constraint in &transition.guard {
                zone_before_jump.tighten_constraint(constraint);
                if !zone_before_jump.is_satisfiable_no_canonize() {
                    debug!("guard became infeasible during reconstruction");
                    return None;
                }
            }
            {
                let mut rewound = zone_before_jump.clone();
                rewound.reverse_elapse();
                rewound.intersect_assign(&pre_zone);
                if !rewound.is_satisfiable() {
                    debug!("state merging made the reconstruction infeasible");
                    return None;
                }
                rewound.elapse();
                zone_before_jump.intersect_assign(&rewound);
            }

            debug_assert!(zone_before_jump.is_satisfiable_no_canonize());
            let valuation_before_jump = zone_before_jump.sample();
            debug_assert!(
                transition
                    .guard
                    .iter()
                    .all(|constraint| constraint.satisfies_valuation(&valuation_before_jump))
            );
            let mut backward_pre = Zone::from_valuation(&valuation_before_jump, m);
            backward_pre.reverse_elapse();
            let mut constrained_pre = pre_zone.clone();
            constrained_pre.intersect_assign(&backward_pre);
            let pre_valuation = constrained_pre.sample();
            if pre_valuation.is_empty() {
                durations.push_front(0.0);
            } else {
                durations.push_front(valuation_before_jump[0] - pre_valuation[0]);
            }

            post_valuation = pre_valuation;
        }

        let mut durations: Vec<f64> = durations.into();
        durations.push(0.0);
        let word = TimedWord::new(self.word.clone(), durations);
        debug_assert!(self.validate(&word));
        Some(word)
    }

    /// Checks a concrete duration vector against the guards of the run.
    fn validate(&self, word: &TimedWord) -> bool {
        let Some(first_zone) = self.tight_zones.first() else {
            return true;
        };
        let mut valuation = vec![0.0; first_zone.num_vars()];
        for (i, transition) in self.edges.iter().enumerate() {
            for value in &mut valuation {
                *value += word.durations()[i];
            }
            if !transition
                .guard
                .iter()
                .all(|constraint| constraint.satisfies_valuation(&valuation))
            {
                return false;
            }
            apply_resets_to_valuation(&mut valuation, &transition.resets);
        }
        true
    }
}

impl std::fmt::Display for SymbolicRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.word.iter().join(""))
    }
}

impl TimedAutomaton {
    /// Drops locations and transitions that never appear in the live part of
    /// the zone graph, i.e. cannot partake in accepting a word.
    pub fn simplify_with_zones(&mut self) {
        let mut zone_automaton = ZoneAutomaton::from_automaton(self);
        zone_automaton.remove_dead_states();

        let mut live_states = vec![false; self.states.len()];
        let mut live_transitions: Vec<Vec<(Action, Transition)>> =
            vec![Vec::new(); self.states.len()];
        for state in &zone_automaton.states {
            live_states[state.ta_state] = true;
            for (&action, edges) in &state.next {
                for (transition, _) in edges {
                    live_transitions[state.ta_state].push((action, transition.clone()));
                }
            }
        }

        for (index, state) in self.states.iter_mut().enumerate() {
            for (action, transitions) in state.next.iter_mut() {
                transitions.retain(|transition| {
                    live_transitions[index]
                        .iter()
                        .any(|(live_action, live)| live_action == action && live == transition)
                });
            }
            state.next.retain(|_, transitions| !transitions.is_empty());
        }
        self.retain_states(|index| live_states[index]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automaton::State;
    use crate::runner::TimedAutomatonRunner;
    use timed_core::{Constraint, ResetValue};

    fn gated_automaton() -> TimedAutomaton {
        // Accepts exactly one 'a' fired at clock value in [1, 2]
        let mut start = State::new(false);
        start.add_transition(
            'a',
            Transition::new(
                1,
                vec![(0, ResetValue::Constant(0.0))],
                vec![Constraint::ge(0, 1), Constraint::le(0, 2)],
            ),
        );
        let done = State::new(true);
        TimedAutomaton {
            states: vec![start, done],
            initial: vec![0],
            max_constraints: vec![2],
        }
    }

    #[test]
    fn zone_graph_reaches_the_accepting_location() {
        let zone_automaton = ZoneAutomaton::from_automaton(&gated_automaton());
        assert!(zone_automaton.states.iter().any(|state| state.is_match));
    }

    #[test]
    fn sampled_witness_is_accepted_by_the_runner() {
        let automaton = gated_automaton();
        let zone_automaton = ZoneAutomaton::from_automaton(&automaton);
        let witness = zone_automaton.sample().expect("the language is non-empty");
        let mut runner = TimedAutomatonRunner::new(automaton);
        assert!(runner.accepts(&witness));
    }

    #[test]
    fn unreachable_guard_yields_no_witness() {
        let mut automaton = gated_automaton();
        // Make the guard unsatisfiable
        automaton.states[0].next.get_mut(&'a').expect("transition exists")[0]
            .guard = vec![Constraint::ge(0, 2), Constraint::lt(0, 1)];
        let zone_automaton = ZoneAutomaton::from_automaton(&automaton);
        assert!(zone_automaton.sample().is_none());
    }

    #[test]
    fn zone_simplification_prunes_dead_locations() {
        let mut automaton = gated_automaton();
        // A disconnected non-accepting location with a self-loop
        let mut stray = State::new(false);
        stray.add_transition('a', Transition::new(2, vec![], vec![]));
        automaton.states.push(stray);
        automaton.simplify_with_zones();
        assert_eq!(automaton.state_size(), 2);
        let mut runner = TimedAutomatonRunner::new(automaton);
        assert!(runner.accepts(&TimedWord::new(vec!['a'], vec![1.5, 0.0])));
    }
}
