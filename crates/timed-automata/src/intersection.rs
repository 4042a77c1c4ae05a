use std::collections::VecDeque;

use indexmap::IndexMap;
use tracing::debug;

use timed_core::constraint::Constraint;
use timed_core::word::UNOBSERVABLE;
use timed_core::{ResetValue, Resets};

use crate::automaton::{State, StateIndex, TimedAutomaton, Transition};

/// The synchronous product of two timed automata, accepting the intersection
/// of their languages.
///
/// The clock spaces are concatenated: clocks of `right` are shifted up by
/// `left.clock_size()`. Observable actions synchronise; an unobservable
/// transition of either side moves alone. Only pairs reachable from the
/// initial pair are constructed.
pub fn intersection(left: &TimedAutomaton, right: &TimedAutomaton) -> TimedAutomaton {
    let shift = left.clock_size();
    let shift_guard = |guard: &[Constraint]| -> Vec<Constraint> {
        guard
            .iter()
            .map(|constraint| Constraint {
                clock: constraint.clock + shift,
                ..*constraint
            })
            .collect()
    };
    let shift_resets = |resets: &Resets| -> Resets {
        resets
            .iter()
            .map(|(clock, value)| {
                let value = match value {
                    ResetValue::Clock(source) => ResetValue::Clock(source + shift),
                    constant => *constant,
                };
                (clock + shift, value)
            })
            .collect()
    };

    let mut result = TimedAutomaton {
        states: Vec::new(),
        initial: Vec::new(),
        max_constraints: left
            .max_constraints
            .iter()
            .chain(right.max_constraints.iter())
            .copied()
            .collect(),
    };
    let mut pair_index: IndexMap<(StateIndex, StateIndex), StateIndex> = IndexMap::new();
    let mut queue: VecDeque<(StateIndex, StateIndex)> = VecDeque::new();
    fn intern(
        pair: (StateIndex, StateIndex),
        is_match: bool,
        states: &mut Vec<State>,
        queue: &mut VecDeque<(StateIndex, StateIndex)>,
        pair_index: &mut IndexMap<(StateIndex, StateIndex), StateIndex>,
    ) -> StateIndex {
        *pair_index.entry(pair).or_insert_with(|| {
            let index = states.len();
            states.push(State::new(is_match));
            queue.push_back(pair);
            index
        })
    }
    let matches = |pair: (StateIndex, StateIndex)| {
        left.states[pair.0].is_match && right.states[pair.1].is_match
    };

    for &left_initial in &left.initial {
        for &right_initial in &right.initial {
            let pair = (left_initial, right_initial);
            let index = intern(
                pair,
                matches(pair),
                &mut result.states,
                &mut queue,
                &mut pair_index,
            );
            result.initial.push(index);
        }
    }

    while let Some((left_state, right_state)) = queue.pop_front() {
        let source = pair_index[&(left_state, right_state)];
        for (&action, left_transitions) in &left.states[left_state].next {
            if action == UNOBSERVABLE {
                // The left side moves alone on ε.
                for left_transition in left_transitions {
                    let pair = (left_transition.target, right_state);
                    let target = intern(
                        pair,
                        matches(pair),
                        &mut result.states,
                        &mut queue,
                        &mut pair_index,
                    );
                    result.states[source].add_transition(
                        UNOBSERVABLE,
                        Transition::new(
                            target,
                            left_transition.resets.clone(),
                            left_transition.guard.clone(),
                        ),
                    );
                }
                continue;
            }
            let Some(right_transitions) = right.states[right_state].next.get(&action) else {
                continue;
            };
            for left_transition in left_transitions {
                for right_transition in right_transitions {
                    let mut guard = left_transition.guard.clone();
                    guard.extend(shift_guard(&right_transition.guard));
                    let mut resets = left_transition.resets.clone();
                    resets.extend(shift_resets(&right_transition.resets));
                    let pair = (left_transition.target, right_transition.target);
                    let target = intern(
                        pair,
                        matches(pair),
                        &mut result.states,
                        &mut queue,
                        &mut pair_index,
                    );
                    result.states[source].add_transition(
                        action,
                        Transition::new(target, resets, guard),
                    );
                }
            }
        }
        // The right side moves alone on ε.
        for right_transition in right.states[right_state].transitions(UNOBSERVABLE) {
            let pair = (left_state, right_transition.target);
            let target = intern(
                pair,
                matches(pair),
                &mut result.states,
                &mut queue,
                &mut pair_index,
            );
            result.states[source].add_transition(
                UNOBSERVABLE,
                Transition::new(
                    target,
                    shift_resets(&right_transition.resets),
                    shift_guard(&right_transition.guard),
                ),
            );
        }
    }
    debug!(
        "product has {} states over {} clocks",
        result.state_size(),
        result.clock_size()
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::TimedAutomatonRunner;
    use timed_core::TimedWord;

    fn late_accepting() -> TimedAutomaton {
        // Accepts after one 'a' at clock >= 1
        let mut start = State::new(false);
        start.add_transition('a', Transition::new(1, vec![], vec![Constraint::ge(0, 1)]));
        let done = State::new(true);
        TimedAutomaton {
            states: vec![start, done],
            initial: vec![0],
            max_constraints: vec![1],
        }
    }

    fn early_accepting() -> TimedAutomaton {
        // Accepts after one 'a' at clock <= 2
        let mut start = State::new(false);
        start.add_transition('a', Transition::new(1, vec![], vec![Constraint::le(0, 2)]));
        let done = State::new(true);
        TimedAutomaton {
            states: vec![start, done],
            initial: vec![0],
            max_constraints: vec![2],
        }
    }

    #[test]
    fn product_accepts_the_intersection() {
        let product = intersection(&late_accepting(), &early_accepting());
        let mut runner = TimedAutomatonRunner::new(product);
        assert!(runner.accepts(&TimedWord::new(vec!['a'], vec![1.5, 0.0])));
        assert!(!runner.accepts(&TimedWord::new(vec!['a'], vec![0.5, 0.0])));
        assert!(!runner.accepts(&TimedWord::new(vec!['a'], vec![2.5, 0.0])));
    }

    #[test]
    fn product_shifts_the_right_clock_space() {
        let product = intersection(&late_accepting(), &early_accepting());
        assert_eq!(product.clock_size(), 2);
        let guards: Vec<_> = product.states[product.initial[0]]
            .transitions('a')
            .iter()
            .flat_map(|transition| transition.guard.iter())
            .collect();
        assert!(guards.iter().any(|constraint| constraint.clock == 1));
    }
}
