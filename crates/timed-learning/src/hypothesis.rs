use std::collections::{HashMap, HashSet, VecDeque};

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use timed_automata::{State, StateIndex, TimedAutomaton, precise_clocks_after_reset};
use timed_core::word::{Action, UNOBSERVABLE};
use timed_core::{ClockVariable, RenamingRelation, ResetValue, TimedCondition};

use crate::imprecise::ImpreciseClockHandler;
use crate::table::ObservationTable;
use crate::transition_maker::{ExternalTransitionMaker, InternalTransitionMaker};

impl ObservationTable {
    /// Synthesises a deterministic timed automaton from the table.
    ///
    /// One location is created per equivalence class of P rows, scanning in
    /// ascending index order. Discrete successors inside P become internal
    /// transitions (grouped per target, guards unioned, the fresh clock
    /// reset); successors outside P follow their witness morphism as external
    /// transitions with renaming-derived resets. Time elapse leaving a class
    /// synthesises an unobservable transition. Imprecise embeddings are
    /// relaxed, locations with conflicting precise contexts are split,
    /// untrusted clocks are pruned, and overlapping branches are merged.
    pub fn generate_hypothesis(&mut self) -> TimedAutomaton {
        // Location formation over P.
        let p_rows: Vec<usize> = self.p_indices().collect();
        let mut representatives: Vec<usize> = Vec::new();
        let mut class_of: HashMap<usize, usize> = HashMap::new();
        let mut members: Vec<Vec<usize>> = Vec::new();
        for &row in &p_rows {
            let mut found = None;
            let candidates: Vec<(usize, usize)> = representatives
                .iter()
                .copied()
                .enumerate()
                .collect();
            for (location, representative) in candidates {
                if row == representative || self.equivalent_with_memo(row, representative) {
                    found = Some(location);
                    break;
                }
            }
            match found {
                Some(location) => {
                    class_of.insert(row, location);
                    members[location].push(row);
                }
                None => {
                    class_of.insert(row, representatives.len());
                    members.push(vec![row]);
                    representatives.push(row);
                }
            }
        }
        debug!(
            "{} locations over {} active rows",
            representatives.len(),
            p_rows.len()
        );

        let mut states: Vec<State> = representatives
            .iter()
            .map(|&representative| State::new(!self.row(representative)[0].is_empty()))
            .collect();
        let mut imprecise = ImpreciseClockHandler::new();

        for location in 0..representatives.len() {
            let mut internal: IndexMap<Action, InternalTransitionMaker> = IndexMap::new();
            let mut external: IndexMap<Action, ExternalTransitionMaker> = IndexMap::new();
            let mut epsilon = ExternalTransitionMaker::new();
            for member_index in 0..members[location].len() {
                let row = members[location][member_index];
                let successor = self.continuous_successor(row);
                let mut exterior: Option<TimedCondition> = None;
                if self.in_p(successor) {
                    let successor_class = class_of[&successor];
                    if successor_class != location {
                        // Time elapse crosses into another location; the
                        // clock identities carry over unchanged.
                        let size = self.prefixes()[successor].condition().size();
                        let identity: RenamingRelation = (0..size).map(|i| (i, i)).collect();
                        epsilon.add(
                            successor_class,
                            identity,
                            self.prefixes()[successor].condition().clone(),
                            self.prefixes()[successor].condition().clone(),
                        );
                    }
                } else {
                    match self.witness(successor) {
                        Some((target, renaming))
                            if class_of[&target] == location && renaming.is_empty() =>
                        {
                            // The exterior behaves like the row itself until
                            // a counterexample says otherwise; the discrete
                            // guards of this member widen over the whole
                            // unbounded elapse.
                            let mut elapse = self.prefixes()[successor].condition().clone();
                            elapse.remove_upper_bound_assign();
                            exterior = Some(
                                self.prefixes()[row].condition().convex_hull(&elapse),
                            );
                        }
                        Some((target, renaming)) => {
                            let target_class = class_of[&target];
                            imprecise.push(target_class, &renaming, &self.prefixes()[target]);
                            epsilon.add(
                                target_class,
                                renaming,
                                self.prefixes()[successor].condition().clone(),
                                self.prefixes()[target].condition().clone(),
                            );
                        }
                        None => {
                            warn!("boundary row {successor} has no witness; table not closed");
                        }
                    }
                }
                for action in self.alphabet().to_vec() {
                    let discrete = self.discrete_successor(row, action);
                    if self.in_p(discrete) {
                        internal.entry(action).or_default().add(
                            class_of[&discrete],
                            self.prefixes()[row].condition().clone(),
                            exterior.clone(),
                        );
                    } else {
                        match self.witness(discrete) {
                            Some((target, renaming)) => {
                                let target_class = class_of[&target];
                                imprecise.push(target_class, &renaming, &self.prefixes()[target]);
                                let maker = external.entry(action).or_default();
                                maker.add(
                                    target_class,
                                    renaming,
                                    self.prefixes()[discrete].condition().clone(),
                                    self.prefixes()[target].condition().clone(),
                                );
                                if let Some(widened) = &exterior {
                                    // The member sits on the boundary of P;
                                    // its event also fires from the elapsed
                                    // exterior.
                                    maker.add_exterior(
                                        self.prefixes()[discrete].condition().clone(),
                                        widened.clone(),
                                    );
                                }
                            }
                            None => {
                                warn!("boundary row {discrete} has no witness; table not closed");
                            }
                        }
                    }
                }
            }
            for (action, maker) in &internal {
                for transition in maker.make() {
                    states[location].add_transition(*action, transition);
                }
            }
            for (action, maker) in &external {
                for transition in maker.make_for_event() {
                    states[location].add_transition(*action, transition);
                }
            }
            for mut transition in epsilon.make() {
                // The jump fires when time first enters the successor
                // region; the firing window is re-pinned below.
                transition.guard.retain(|constraint| !constraint.is_upper_bound());
                states[location].add_transition(UNOBSERVABLE, transition);
            }
        }

        let mut automaton = TimedAutomaton {
            states,
            initial: vec![class_of[&0]],
            max_constraints: Vec::new(),
        };
        recompute_max_constraints(&mut automaton);
        info!("raw hypothesis:\n{automaton}");

        imprecise.run(&mut automaton);
        let need_split: Vec<StateIndex> = (0..automaton.state_size())
            .filter(|&state| automaton.states[state].needs_splitting())
            .collect();
        split_states(&mut automaton, &need_split);
        handle_inactive_clocks(&mut automaton);
        for state in 0..automaton.state_size() {
            automaton.merge_nondeterministic_branching(state);
        }
        for state in &mut automaton.states {
            state.add_upper_bound_for_unobservable_transitions();
        }
        recompute_max_constraints(&mut automaton);
        automaton
    }

}

/// Derives the clock count and per-clock maximum constants from the guards
/// and resets of the automaton.
pub(crate) fn recompute_max_constraints(automaton: &mut TimedAutomaton) {
    let mut clock_count = 0;
    for state in &automaton.states {
        for transition in state.next.values().flatten() {
            for constraint in &transition.guard {
                clock_count = clock_count.max(constraint.clock + 1);
            }
            for (clock, value) in &transition.resets {
                clock_count = clock_count.max(clock + 1);
                if let ResetValue::Clock(source) = value {
                    clock_count = clock_count.max(source + 1);
                }
            }
        }
    }
    let mut max_constraints = vec![0i64; clock_count];
    for state in &automaton.states {
        for transition in state.next.values().flatten() {
            for constraint in &transition.guard {
                max_constraints[constraint.clock] =
                    max_constraints[constraint.clock].max(constraint.constant);
            }
        }
    }
    automaton.max_constraints = max_constraints;
}

/// Forks locations with overlapping guards of different precise-clock sets:
/// a breadth-first pass over the automaton annotates every reached location
/// with its precise-clock context and gives each context of a conflicted
/// location its own copy, merging overlapping branches under that context.
pub(crate) fn split_states(automaton: &mut TimedAutomaton, need_split: &[StateIndex]) {
    if need_split.is_empty() {
        return;
    }
    let Some(&initial) = automaton.initial.first() else {
        return;
    };
    let mut forward: HashMap<(StateIndex, Vec<ClockVariable>), StateIndex> = HashMap::new();
    for state in 0..automaton.state_size() {
        let clock_size = automaton.guard_clock_size(state);
        forward.insert((state, (0..clock_size).collect()), state);
    }
    let mut visited: HashSet<(StateIndex, Vec<ClockVariable>)> = HashSet::new();
    let mut queue: VecDeque<(StateIndex, Vec<ClockVariable>)> = VecDeque::new();
    queue.push_back((initial, vec![0]));

    while let Some(enhanced) = queue.pop_front() {
        if !visited.insert(enhanced.clone()) {
            continue;
        }
        let (original_state, precise) = enhanced;
        let state = forward
            .get(&(original_state, precise.clone()))
            .copied()
            .unwrap_or(original_state);
        let precise_set: HashSet<ClockVariable> = precise.iter().copied().collect();
        let actions: Vec<Action> = automaton.states[state].next.keys().copied().collect();
        for action in actions {
            for index in 0..automaton.states[state].transitions(action).len() {
                let transition = automaton.states[state].transitions(action)[index].clone();
                let target_clock_size = automaton.target_clock_size(&transition);
                let mut next_precise: Vec<ClockVariable> =
                    precise_clocks_after_reset(&precise_set, &transition, target_clock_size)
                        .into_iter()
                        .collect();
                next_precise.sort_unstable();
                let next_enhanced = (transition.target, next_precise.clone());
                if !visited.contains(&next_enhanced) {
                    if need_split.contains(&transition.target) {
                        let mapped = match forward.get(&next_enhanced) {
                            Some(&existing) => existing,
                            None => {
                                info!("splitting location {}", transition.target);
                                let fresh = automaton.state_size();
                                let template = automaton.states[transition.target].clone();
                                automaton.states.push(template);
                                forward.insert(next_enhanced.clone(), fresh);
                                let context: HashSet<ClockVariable> =
                                    next_precise.iter().copied().collect();
                                automaton
                                    .merge_nondeterministic_branching_with_precise(fresh, &context);
                                fresh
                            }
                        };
                        queue.push_back(next_enhanced);
                        automaton.states[state]
                            .next
                            .get_mut(&action)
                            .expect("action present")[index]
                            .target = mapped;
                    } else {
                        queue.push_back(next_enhanced);
                    }
                } else if need_split.contains(&transition.target) {
                    if let Some(&mapped) = forward.get(&next_enhanced) {
                        automaton.states[state]
                            .next
                            .get_mut(&action)
                            .expect("action present")[index]
                            .target = mapped;
                    }
                }
            }
        }
    }
}

/// Propagates inactive clocks: a clock assigned a non-integer constant (or
/// copied from an already inactive clock) cannot be tested exactly, so its
/// guards downstream are removed. Locations are forked per inactive-clock
/// set until a fixpoint.
pub(crate) fn handle_inactive_clocks(automaton: &mut TimedAutomaton) {
    let original_count = automaton.state_size();
    let mut map: HashMap<(StateIndex, Vec<ClockVariable>), StateIndex> = HashMap::new();
    for state in 0..original_count {
        map.insert((state, Vec::new()), state);
    }
    let mut queue: VecDeque<(StateIndex, Vec<ClockVariable>)> = VecDeque::new();

    // Seed: retarget every transition that deactivates clocks into a copy of
    // its target annotated with the inactive set.
    for state in 0..original_count {
        let actions: Vec<Action> = automaton.states[state].next.keys().copied().collect();
        for action in actions {
            for index in 0..automaton.states[state].transitions(action).len() {
                let transition = automaton.states[state].transitions(action)[index].clone();
                let mut inactive: Vec<ClockVariable> = transition
                    .resets
                    .iter()
                    .filter(|(_, value)| {
                        matches!(value, ResetValue::Constant(c) if *c != c.floor())
                    })
                    .map(|(clock, _)| *clock)
                    .collect();
                inactive.sort_unstable();
                inactive.dedup();
                if inactive.is_empty() {
                    continue;
                }
                let key = (transition.target, inactive.clone());
                let mapped = match map.get(&key) {
                    Some(&existing) => existing,
                    None => {
                        let fresh = automaton.state_size();
                        let template = automaton.states[transition.target].clone();
                        automaton.states.push(template);
                        map.insert(key.clone(), fresh);
                        queue.push_back(key);
                        fresh
                    }
                };
                automaton.states[state]
                    .next
                    .get_mut(&action)
                    .expect("action present")[index]
                    .target = mapped;
            }
        }
    }

    // Fixpoint: rewrite the guards of annotated copies and push the
    // annotation through their transitions.
    while let Some((original, inactive)) = queue.pop_front() {
        let state = map[&(original, inactive.clone())];
        let actions: Vec<Action> = automaton.states[state].next.keys().copied().collect();
        for action in actions {
            for index in 0..automaton.states[state].transitions(action).len() {
                let mut transition = automaton.states[state].transitions(action)[index].clone();
                transition
                    .guard
                    .retain(|constraint| !inactive.contains(&constraint.clock));
                let mut next_inactive: Vec<ClockVariable> = if transition.guard.is_empty() {
                    inactive.clone()
                } else {
                    Vec::new()
                };
                for (clock, value) in &transition.resets {
                    if matches!(value, ResetValue::Constant(c) if *c != c.floor()) {
                        next_inactive.push(*clock);
                    }
                }
                for &inactive_clock in &inactive {
                    if !transition
                        .resets
                        .iter()
                        .any(|(clock, _)| *clock == inactive_clock)
                    {
                        next_inactive.push(inactive_clock);
                    }
                    for (clock, value) in &transition.resets {
                        if matches!(value, ResetValue::Clock(source) if *source == inactive_clock)
                        {
                            next_inactive.push(*clock);
                        }
                    }
                }
                next_inactive.sort_unstable();
                next_inactive.dedup();
                let key = (transition.target, next_inactive);
                let mapped = match map.get(&key) {
                    Some(&existing) => existing,
                    None => {
                        let fresh = automaton.state_size();
                        let template = automaton.states[transition.target].clone();
                        automaton.states.push(template);
                        map.insert(key.clone(), fresh);
                        queue.push_back(key);
                        fresh
                    }
                };
                transition.target = mapped;
                automaton.states[state]
                    .next
                    .get_mut(&action)
                    .expect("action present")[index] = transition;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use timed_automata::Transition;
    use timed_core::Constraint;

    #[test]
    fn inactive_clock_guards_are_pruned() {
        // loc0 --a, x0 := 0.5--> loc1 --a, x0 < 1--> loc0; the guard on the
        // untrusted clock disappears in the annotated copy of loc1.
        let mut start = State::new(false);
        start.add_transition(
            'a',
            Transition::new(1, vec![(0, ResetValue::Constant(0.5))], vec![]),
        );
        let mut middle = State::new(true);
        middle.add_transition('a', Transition::new(0, vec![], vec![Constraint::lt(0, 1)]));
        let mut automaton = TimedAutomaton {
            states: vec![start, middle],
            initial: vec![0],
            max_constraints: vec![1],
        };
        handle_inactive_clocks(&mut automaton);
        assert_eq!(automaton.state_size(), 3);
        let annotated = automaton.states[0].transitions('a')[0].target;
        assert_eq!(annotated, 2);
        assert!(automaton.states[annotated].transitions('a')[0].guard.is_empty());
    }

    #[test]
    fn integer_resets_leave_clocks_active() {
        let mut start = State::new(false);
        start.add_transition(
            'a',
            Transition::new(1, vec![(0, ResetValue::Constant(1.0))], vec![]),
        );
        let middle = State::new(true);
        let mut automaton = TimedAutomaton {
            states: vec![start, middle],
            initial: vec![0],
            max_constraints: vec![1],
        };
        handle_inactive_clocks(&mut automaton);
        assert_eq!(automaton.state_size(), 2);
        assert_eq!(automaton.states[0].transitions('a')[0].target, 1);
    }

    #[test]
    fn max_constraints_follow_the_guards() {
        let mut state = State::new(false);
        state.add_transition(
            'a',
            Transition::new(
                0,
                vec![(2, ResetValue::Clock(1))],
                vec![Constraint::lt(0, 3), Constraint::ge(1, 5)],
            ),
        );
        let mut automaton = TimedAutomaton {
            states: vec![state],
            initial: vec![0],
            max_constraints: vec![],
        };
        recompute_max_constraints(&mut automaton);
        assert_eq!(automaton.max_constraints, vec![3, 5, 0]);
    }
}
