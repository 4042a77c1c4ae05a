use timed_core::constraint::{apply_resets_to_valuation, delay_to_satisfy};
use timed_core::word::{Action, TimedWord, UNOBSERVABLE};

use crate::automaton::{StateIndex, TimedAutomaton};

/// Deterministic execution of a timed automaton over a timed word, one step
/// at a time.
///
/// Unobservable transitions are taken eagerly with the minimal delay that
/// satisfies their guard; the automaton must not contain an ε-loop. Leaving
/// the automaton (no transition matches) moves into an implicit rejecting
/// sink.
#[derive(Debug, Clone)]
pub struct TimedAutomatonRunner {
    automaton: TimedAutomaton,
    state: Option<StateIndex>,
    valuation: Vec<f64>,
    num_queries: usize,
}

impl TimedAutomatonRunner {
    pub fn new(automaton: TimedAutomaton) -> Self {
        let state = automaton.initial.first().copied();
        let clocks = automaton.clock_size();
        if !automaton.states.is_empty() {
            debug_assert_eq!(automaton.initial.len(), 1);
        }
        Self {
            automaton,
            state,
            valuation: vec![0.0; clocks],
            num_queries: 0,
        }
    }

    pub fn automaton(&self) -> &TimedAutomaton {
        &self.automaton
    }

    /// Resets the configuration before a query.
    pub fn pre(&mut self) {
        self.state = self.automaton.initial.first().copied();
        self.valuation.fill(0.0);
        self.num_queries += 1;
    }

    /// Closes a query; the configuration stays valid until the next `pre`.
    pub fn post(&mut self) {}

    fn is_match(&self) -> bool {
        self.state
            .is_some_and(|state| self.automaton.states[state].is_match)
    }

    /// Fires an observable event, returning the acceptance bit afterwards.
    pub fn step_action(&mut self, action: Action) -> bool {
        let Some(current) = self.state else {
            return false;
        };
        let matching = self.automaton.states[current]
            .transitions(action)
            .iter()
            .find(|transition| {
                transition
                    .guard
                    .iter()
                    .all(|constraint| constraint.satisfies_valuation(&self.valuation))
            })
            .cloned();
        match matching {
            Some(transition) => {
                apply_resets_to_valuation(&mut self.valuation, &transition.resets);
                self.state = Some(transition.target);
                self.is_match()
            }
            None => {
                self.state = None;
                false
            }
        }
    }

    /// Elapses time, firing any unobservable transition that becomes enabled
    /// within the delay, and returns the acceptance bit afterwards.
    pub fn step_duration(&mut self, duration: f64) -> bool {
        let Some(current) = self.state else {
            return false;
        };
        let epsilon_transitions = self.automaton.states[current].transitions(UNOBSERVABLE);
        let candidate = epsilon_transitions
            .iter()
            .filter_map(|transition| {
                delay_to_satisfy(&transition.guard, &self.valuation)
                    .map(|delay| (delay, transition.clone()))
            })
            .min_by(|a, b| a.0.partial_cmp(&b.0).expect("delays are finite"));
        if let Some((base_delay, transition)) = candidate {
            if base_delay <= duration {
                let satisfied_at = |valuation: &[f64], delay: f64| {
                    transition
                        .guard
                        .iter()
                        .all(|constraint| constraint.satisfies(valuation[constraint.clock] + delay))
                };
                let fire_at = if satisfied_at(&self.valuation, base_delay) {
                    Some(base_delay)
                } else {
                    // A strict lower bound sits exactly on the boundary;
                    // fire halfway into the remaining feasible window.
                    let mut window = duration;
                    for constraint in &transition.guard {
                        if constraint.is_upper_bound() {
                            window = window.min(
                                constraint.constant as f64 - self.valuation[constraint.clock],
                            );
                        }
                    }
                    let midpoint = (base_delay + window) / 2.0;
                    (midpoint > base_delay
                        && midpoint <= duration
                        && satisfied_at(&self.valuation, midpoint))
                    .then_some(midpoint)
                };
                if let Some(delay) = fire_at {
                    for value in &mut self.valuation {
                        *value += delay;
                    }
                    apply_resets_to_valuation(&mut self.valuation, &transition.resets);
                    self.state = Some(transition.target);
                    return self.step_duration(duration - delay);
                }
                tracing::debug!("unobservable transition skipped at its boundary");
            } else {
                tracing::debug!("unobservable transition not reached within {duration}");
            }
        }
        for value in &mut self.valuation {
            *value += duration;
        }
        self.is_match()
    }

    /// Runs a whole timed word from the initial configuration.
    pub fn accepts(&mut self, word: &TimedWord) -> bool {
        self.pre();
        let mut result = self.step_duration(word.durations()[0]);
        for (index, &action) in word.word().iter().enumerate() {
            self.step_action(action);
            result = self.step_duration(word.durations()[index + 1]);
        }
        self.post();
        result
    }

    /// The number of queries started so far.
    pub fn count(&self) -> usize {
        self.num_queries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automaton::{State, Transition};
    use timed_core::{Constraint, ResetValue};

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
    fn toggles_on_late_events() {
        let mut runner = TimedAutomatonRunner::new(toggle_automaton());
        assert!(runner.accepts(&TimedWord::new(vec!['a', 'a'], vec![1.0, 1.0, 0.0])));
        assert!(!runner.accepts(&TimedWord::new(vec!['a', 'a'], vec![0.5, 0.5, 0.0])));
        assert!(runner.accepts(&TimedWord::new(vec!['a'], vec![0.5, 0.0])));
        assert!(!runner.accepts(&TimedWord::new(vec!['a'], vec![1.5, 0.5])));
    }

    #[test]
    fn missing_transition_moves_to_the_sink() {
        let mut runner = TimedAutomatonRunner::new(toggle_automaton());
        assert!(!runner.accepts(&TimedWord::new(vec!['b', 'a'], vec![0.0, 0.1, 0.0])));
    }

    #[test]
    fn unobservable_transition_fires_at_minimal_delay() {
        // loc0 --ε, x0 >= 1, reset--> loc1 (accepting only after the jump)
        let mut start = State::new(false);
        start.add_transition(
            UNOBSERVABLE,
            Transition::new(1, vec![(0, ResetValue::Constant(0.0))], vec![Constraint::ge(0, 1)]),
        );
        let target = State::new(true);
        let automaton = TimedAutomaton {
            states: vec![start, target],
            initial: vec![0],
            max_constraints: vec![1],
        };
        let mut runner = TimedAutomatonRunner::new(automaton);
        runner.pre();
        assert!(!runner.step_duration(0.5));
        // Crossing 1.0 takes the ε-transition and resets the clock
        assert!(runner.step_duration(1.0));
        assert_eq!(runner.valuation[0], 0.5);
    }

    #[test]
    fn query_counter_increments_per_pre() {
        let mut runner = TimedAutomatonRunner::new(toggle_automaton());
        runner.accepts(&TimedWord::empty());
        runner.accepts(&TimedWord::empty());
        assert_eq!(runner.count(), 2);
    }
}
