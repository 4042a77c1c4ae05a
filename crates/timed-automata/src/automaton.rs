use std::collections::HashSet;
use std::fmt;

use indexmap::IndexMap;
use itertools::Itertools;

use timed_core::constraint::{
    Constraint, conjunction, display_guard, display_resets, guard_is_weaker, satisfiable,
    simple_variables, union_hull2,
};
use timed_core::word::{Action, UNOBSERVABLE};
use timed_core::{ClockVariable, Resets};

/// Index of a location inside its automaton.
pub type StateIndex = usize;

/// A transition of a timed automaton: target location, ordered resets and a
/// conjunctive guard.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Transition {
    pub target: StateIndex,
    pub resets: Resets,
    pub guard: Vec<Constraint>,
}

impl Transition {
    pub fn new(target: StateIndex, resets: Resets, guard: Vec<Constraint>) -> Self {
        Self {
            target,
            resets,
            guard,
        }
    }

    /// The number of constant assignments to non-integer values.
    pub fn imprecise_constant_assignments(&self) -> usize {
        self.resets
            .iter()
            .filter(|(_, value)| {
                matches!(value, timed_core::ResetValue::Constant(c) if *c != c.floor())
            })
            .count()
    }

    /// Copies the precise (integer) constant assignments of `other` for
    /// clocks this transition does not reset.
    pub fn add_precise_constant_assignments(&mut self, other: &Resets) {
        for (clock, value) in other {
            if value.is_integer_constant()
                && !self.resets.iter().any(|(mine, _)| mine == clock)
            {
                self.resets.push((*clock, *value));
            }
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "-> {} [{}] {{{}}}",
            self.target,
            display_guard(&self.guard),
            display_resets(&self.resets)
        )
    }
}

/// A location of a timed automaton.
#[derive(Debug, Clone, Default)]
pub struct State {
    pub is_match: bool,
    pub next: IndexMap<Action, Vec<Transition>>,
}

impl State {
    pub fn new(is_match: bool) -> Self {
        Self {
            is_match,
            next: IndexMap::new(),
        }
    }

    pub fn add_transition(&mut self, action: Action, transition: Transition) {
        self.next.entry(action).or_default().push(transition);
    }

    pub fn transitions(&self, action: Action) -> &[Transition] {
        self.next.get(&action).map_or(&[], Vec::as_slice)
    }

    /// Outgoing transitions are deterministic when no two guards on the same
    /// action are simultaneously satisfiable.
    pub fn deterministic(&self) -> bool {
        self.next.values().all(|transitions| {
            transitions.iter().enumerate().all(|(index, transition)| {
                transitions[..index]
                    .iter()
                    .all(|earlier| !satisfiable(&conjunction(&earlier.guard, &transition.guard)))
            })
        })
    }

    /// Drops transitions whose guard is weaker than another transition to the
    /// same target.
    pub fn remove_transitions_with_weaker_guards(&mut self) {
        for transitions in self.next.values_mut() {
            let snapshot = transitions.clone();
            transitions.retain(|transition| {
                !snapshot.iter().any(|other| {
                    other != transition
                        && other.target == transition.target
                        && guard_is_weaker(&other.guard, &transition.guard)
                })
            });
        }
    }

    /// Merges overlapping transitions to the same target, keeping the reset
    /// with fewer imprecise constant assignments and the union hull of both
    /// guards.
    pub fn merge_nondeterministic_branching_with_same_target(&mut self) {
        for transitions in self.next.values_mut() {
            let mut index = 0;
            while index < transitions.len() {
                let mut other = index + 1;
                while other < transitions.len() {
                    let overlapping = transitions[index].target == transitions[other].target
                        && satisfiable(&conjunction(
                            &transitions[index].guard,
                            &transitions[other].guard,
                        ));
                    if overlapping {
                        let removed = transitions.remove(other);
                        let current = &mut transitions[index];
                        if current.imprecise_constant_assignments()
                            < removed.imprecise_constant_assignments()
                        {
                            let mut replacement = removed.clone();
                            replacement.add_precise_constant_assignments(&current.resets);
                            current.resets = replacement.resets;
                        } else {
                            current.add_precise_constant_assignments(&removed.resets);
                        }
                        current.guard = union_hull2(&current.guard, &removed.guard);
                    } else {
                        other += 1;
                    }
                }
                index += 1;
            }
        }
    }

    /// Whether two overlapping transitions with different targets disagree on
    /// which clocks they pin, which forces a location split.
    pub fn needs_splitting(&self) -> bool {
        self.next.values().any(|transitions| {
            transitions.iter().enumerate().any(|(index, transition)| {
                transitions[(index + 1)..].iter().any(|other| {
                    transition.target != other.target
                        && satisfiable(&conjunction(&transition.guard, &other.guard))
                        && simple_variables(&transition.guard) != simple_variables(&other.guard)
                })
            })
        })
    }

    /// Completes the guards of unobservable transitions with upper bounds so
    /// the runner can compute a finite firing delay.
    pub fn add_upper_bound_for_unobservable_transitions(&mut self) {
        if let Some(transitions) = self.next.get_mut(&UNOBSERVABLE) {
            for transition in transitions {
                timed_core::constraint::add_upper_bound(&mut transition.guard);
            }
        }
    }
}

/// A timed automaton over an arena of locations addressed by index.
#[derive(Debug, Clone, Default)]
pub struct TimedAutomaton {
    pub states: Vec<State>,
    pub initial: Vec<StateIndex>,
    /// Maximum constant each clock is compared against; the length is the
    /// number of clocks.
    pub max_constraints: Vec<i64>,
}

impl TimedAutomaton {
    pub fn state_size(&self) -> usize {
        self.states.len()
    }

    pub fn clock_size(&self) -> usize {
        self.max_constraints.len()
    }

    /// The actions (excluding ε) appearing on any transition.
    pub fn alphabet(&self) -> Vec<Action> {
        let mut result: Vec<Action> = self
            .states
            .iter()
            .flat_map(|state| state.next.keys().copied())
            .filter(|action| *action != UNOBSERVABLE)
            .collect();
        result.sort_unstable();
        result.dedup();
        result
    }

    /// The largest clock index mentioned by the outgoing guards of `state`,
    /// plus one.
    pub fn guard_clock_size(&self, state: StateIndex) -> usize {
        self.states[state]
            .next
            .values()
            .flatten()
            .flat_map(|transition| transition.guard.iter())
            .map(|constraint| constraint.clock + 1)
            .max()
            .unwrap_or(0)
    }

    /// The clock space of the target location of `transition`.
    pub fn target_clock_size(&self, transition: &Transition) -> usize {
        self.guard_clock_size(transition.target)
    }

    /// Adds an absorbing sink and routes every action without a transition
    /// into it.
    pub fn make_complete(&mut self, alphabet: &[Action]) {
        let sink = self.states.len();
        self.states.push(State::new(false));
        for state in &mut self.states {
            for &action in alphabet {
                if !state.next.contains_key(&action) {
                    state
                        .next
                        .insert(action, vec![Transition::new(sink, Vec::new(), Vec::new())]);
                }
            }
        }
    }

    /// The complement automaton: completes the transitions and flips
    /// acceptance. Requires `self` to be deterministic.
    pub fn complement(&self, alphabet: &[Action]) -> TimedAutomaton {
        if self.initial.is_empty() {
            // An automaton without initial states rejects everything; its
            // complement is universal.
            let mut state = State::new(true);
            for &action in alphabet {
                state.add_transition(action, Transition::new(0, Vec::new(), Vec::new()));
            }
            return TimedAutomaton {
                states: vec![state],
                initial: vec![0],
                max_constraints: self.max_constraints.clone(),
            };
        }
        let mut result = self.clone();
        result.make_complete(alphabet);
        for state in &mut result.states {
            state.is_match = !state.is_match;
        }
        result
    }

    pub fn deterministic(&self) -> bool {
        self.states.iter().all(State::deterministic)
    }

    /// Drops duplicated transitions subsumed by an equal-shape transition
    /// with a weaker guard.
    pub fn simplify_transitions(&mut self) {
        for state in &mut self.states {
            for transitions in state.next.values_mut() {
                let mut reduced: Vec<Transition> = Vec::with_capacity(transitions.len());
                for transition in transitions.drain(..) {
                    let subsumed = reduced.iter().any(|kept| {
                        kept.target == transition.target
                            && kept.resets == transition.resets
                            && guard_is_weaker(&kept.guard, &transition.guard)
                    });
                    if !subsumed {
                        reduced.push(transition);
                    }
                }
                *transitions = reduced;
            }
        }
    }

    /// Removes non-accepting, non-initial locations whose every outgoing
    /// transition self-loops, together with the transitions into them.
    pub fn remove_dead_loop(&mut self) {
        let mut removed: HashSet<StateIndex> = HashSet::new();
        loop {
            let mut changed = false;
            for index in 0..self.states.len() {
                if removed.contains(&index)
                    || self.states[index].is_match
                    || self.initial.contains(&index)
                {
                    continue;
                }
                let all_self_loops = self.states[index]
                    .next
                    .values()
                    .flatten()
                    .all(|transition| transition.target == index);
                if all_self_loops {
                    removed.insert(index);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
            for state in &mut self.states {
                for transitions in state.next.values_mut() {
                    transitions.retain(|transition| !removed.contains(&transition.target));
                }
                state.next.retain(|_, transitions| !transitions.is_empty());
            }
        }
        if !removed.is_empty() {
            self.retain_states(|index| !removed.contains(&index));
        }
    }

    /// Keeps only the states accepted by the predicate, remapping transition
    /// targets and initial states.
    pub fn retain_states<F: Fn(StateIndex) -> bool>(&mut self, keep: F) {
        let mut remap: Vec<Option<StateIndex>> = Vec::with_capacity(self.states.len());
        let mut next_index = 0;
        for index in 0..self.states.len() {
            if keep(index) {
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
                transitions.retain(|transition| remap[transition.target].is_some());
                for transition in transitions.iter_mut() {
                    transition.target =
                        remap[transition.target].expect("retained above");
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

    /// Duplicate-transition and dead-loop removal.
    pub fn simplify(&mut self) {
        self.simplify_transitions();
        self.remove_dead_loop();
    }

    /// Stronger cleanup run before equivalence queries: weaker-guard removal
    /// on top of [`TimedAutomaton::simplify`].
    pub fn simplify_strong(&mut self) {
        for state in &mut self.states {
            state.remove_transitions_with_weaker_guards();
        }
        self.simplify();
    }

    /// The clocks whose value is not pinned by a simple guard constraint
    /// after taking `transition`.
    pub fn imprecise_clocks_after(&self, transition: &Transition) -> Vec<ClockVariable> {
        let target_clock_size = self.target_clock_size(transition);
        let precise: HashSet<ClockVariable> =
            simple_variables(&transition.guard).into_iter().collect();
        let precise_after = precise_clocks_after_reset(&precise, transition, target_clock_size);
        (0..target_clock_size)
            .filter(|clock| !precise_after.contains(clock))
            .collect()
    }

    /// Merges two overlapping transitions, preferring the branch that leaves
    /// fewer imprecise clocks; the guard becomes the union hull.
    pub fn merge_transitions(&self, left: &Transition, right: &Transition) -> Transition {
        let guard = union_hull2(&left.guard, &right.guard);
        if self.imprecise_clocks_after(left) <= self.imprecise_clocks_after(right) {
            Transition::new(left.target, left.resets.clone(), guard)
        } else {
            Transition::new(right.target, right.resets.clone(), guard)
        }
    }

    /// Merges overlapping same-action transitions of one location, also
    /// across different targets when acceptance agrees.
    pub fn merge_nondeterministic_branching(&mut self, state: StateIndex) {
        let actions: Vec<Action> = self.states[state].next.keys().copied().collect();
        for action in actions {
            let mut transitions = self.states[state].transitions(action).to_vec();
            let mut index = 0;
            while index < transitions.len() {
                let mut other = index + 1;
                while other < transitions.len() {
                    if satisfiable(&conjunction(
                        &transitions[index].guard,
                        &transitions[other].guard,
                    )) {
                        debug_assert_eq!(
                            self.states[transitions[index].target].is_match,
                            self.states[transitions[other].target].is_match
                        );
                        if transitions[index].target != transitions[other].target {
                            tracing::debug!(
                                "merging transitions with different targets: {} and {}",
                                transitions[index],
                                transitions[other]
                            );
                        }
                        let removed = transitions.remove(other);
                        transitions[index] = self.merge_transitions(&transitions[index], &removed);
                    } else {
                        other += 1;
                    }
                }
                index += 1;
            }
            self.states[state].next.insert(action, transitions);
        }
    }

    /// The merge variant used while splitting locations: a precise-clock
    /// context picks the branch whose guard pins all context clocks.
    pub fn merge_nondeterministic_branching_with_precise(
        &mut self,
        state: StateIndex,
        precise_clocks: &HashSet<ClockVariable>,
    ) {
        let actions: Vec<Action> = self.states[state].next.keys().copied().collect();
        for action in actions {
            let mut transitions = self.states[state].transitions(action).to_vec();
            let mut index = 0;
            while index < transitions.len() {
                let mut other = index + 1;
                while other < transitions.len() {
                    if !satisfiable(&conjunction(
                        &transitions[index].guard,
                        &transitions[other].guard,
                    )) {
                        other += 1;
                        continue;
                    }
                    let pinned = |t: &Transition| {
                        let simple = simple_variables(&t.guard);
                        precise_clocks
                            .iter()
                            .all(|clock| simple.binary_search(clock).is_ok())
                    };
                    let removed = transitions.remove(other);
                    let current = transitions[index].clone();
                    let merged = match (pinned(&current), pinned(&removed)) {
                        (true, false) => current,
                        (false, true) => removed,
                        (true, true) => self.merge_transitions(&current, &removed),
                        (false, false) => {
                            if guard_is_weaker(&removed.guard, &current.guard) {
                                removed
                            } else if guard_is_weaker(&current.guard, &removed.guard) {
                                current
                            } else {
                                self.merge_transitions(&current, &removed)
                            }
                        }
                    };
                    tracing::debug!("merged into {}", merged);
                    transitions[index] = merged;
                }
                index += 1;
            }
            self.states[state].next.insert(action, transitions);
        }
    }
}

/// The clocks still precise after taking `transition`: copies of precise
/// clocks, integer-constant assignments, and untouched precise clocks inside
/// the target clock space.
pub fn precise_clocks_after_reset(
    precise: &HashSet<ClockVariable>,
    transition: &Transition,
    target_clock_size: usize,
) -> HashSet<ClockVariable> {
    let mut result: HashSet<ClockVariable> = HashSet::new();
    for (clock, value) in &transition.resets {
        if *clock >= target_clock_size {
            continue;
        }
        match value {
            timed_core::ResetValue::Clock(source) if precise.contains(source) => {
                result.insert(*clock);
            }
            timed_core::ResetValue::Constant(c) if *c == c.floor() => {
                result.insert(*clock);
            }
            _ => {}
        }
    }
    for &clock in precise {
        if clock >= target_clock_size || result.contains(&clock) {
            continue;
        }
        if !transition.resets.iter().any(|(reset, _)| *reset == clock) {
            result.insert(clock);
        }
    }
    result
}

impl fmt::Display for TimedAutomaton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "digraph G {{")?;
        for (index, state) in self.states.iter().enumerate() {
            writeln!(
                f,
                "        loc{} [init={}, match={}]",
                index + 1,
                u8::from(self.initial.contains(&index)),
                u8::from(state.is_match)
            )?;
        }
        for (index, state) in self.states.iter().enumerate() {
            for (action, transitions) in &state.next {
                for transition in transitions {
                    write!(
                        f,
                        "        loc{}->loc{} [label=\"{}\"",
                        index + 1,
                        transition.target + 1,
                        action
                    )?;
                    if !transition.guard.is_empty() {
                        write!(
                            f,
                            ", guard=\"{{{}}}\"",
                            transition.guard.iter().map(|c| c.to_string()).join(", ")
                        )?;
                    }
                    if !transition.resets.is_empty() {
                        write!(
                            f,
                            ", reset=\"{{{}}}\"",
                            transition
                                .resets
                                .iter()
                                .map(|(clock, value)| format!("x{clock} := {value}"))
                                .join(", ")
                        )?;
                    }
                    writeln!(f, "]")?;
                }
            }
        }
        writeln!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use timed_core::ResetValue;

    /// The two-location automaton accepting words with an even number of
    /// events fired at clock value one.
    fn toggle_automaton() -> TimedAutomaton {
        let mut even = State::new(true);
        even.add_transition('a', Transition::new(0, vec![], vec![Constraint::lt(0, 1)]));
        even.add_transition(
            'a',
            Transition::new(1, vec![(0, ResetValue::Constant(0.0))], vec![Constraint::ge(0, 1)]),
        );
        let mut odd = State::new(false);
        odd.add_transition('a', Transition::new(0, vec![], vec![Constraint::le(0, 1)]));
        odd.add_transition('a', Transition::new(1, vec![], vec![Constraint::gt(0, 1)]));
        TimedAutomaton {
            states: vec![even, odd],
            initial: vec![0],
            max_constraints: vec![1],
        }
    }

    #[test]
    fn determinism_of_the_toggle_automaton() {
        assert!(toggle_automaton().deterministic());
        let mut nondeterministic = toggle_automaton();
        nondeterministic.states[0]
            .add_transition('a', Transition::new(0, vec![], vec![Constraint::le(0, 2)]));
        assert!(!nondeterministic.deterministic());
    }

    #[test]
    fn complement_flips_acceptance_and_completes() {
        let automaton = toggle_automaton();
        let complement = automaton.complement(&['a']);
        assert_eq!(complement.state_size(), automaton.state_size() + 1);
        assert!(!complement.states[0].is_match);
        assert!(complement.states[1].is_match);
        // The added sink accepts in the complement
        assert!(complement.states[2].is_match);
    }

    #[test]
    fn dead_loop_removal_drops_the_sink() {
        let mut automaton = toggle_automaton();
        automaton.make_complete(&['a', 'b']);
        // The sink only self-loops and is not accepting
        automaton.remove_dead_loop();
        assert_eq!(automaton.state_size(), 2);
        assert!(
            automaton
                .states
                .iter()
                .flat_map(|state| state.next.values().flatten())
                .all(|transition| transition.target < 2)
        );
    }

    #[test]
    fn weaker_guard_transitions_are_removed() {
        let mut state = State::new(false);
        state.add_transition('a', Transition::new(0, vec![], vec![Constraint::gt(0, 1)]));
        state.add_transition(
            'a',
            Transition::new(0, vec![], vec![Constraint::gt(0, 1), Constraint::lt(0, 3)]),
        );
        state.remove_transitions_with_weaker_guards();
        // The narrower transition is subsumed by the weaker one
        assert_eq!(state.transitions('a').len(), 1);
        assert_eq!(state.transitions('a')[0].guard, vec![Constraint::gt(0, 1)]);
    }

    #[test]
    fn dot_output_lists_locations_and_edges() {
        let rendered = toggle_automaton().to_string();
        assert!(rendered.contains("loc1 [init=1, match=1]"));
        assert!(rendered.contains("loc2 [init=0, match=0]"));
        assert!(rendered.contains("loc1->loc2 [label=\"a\", guard=\"{x0 >= 1}\", reset=\"{x0 := 0}\"]"));
    }
}
