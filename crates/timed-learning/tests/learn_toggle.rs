//! End-to-end learning of the two-location toggle automaton: acceptance
//! toggles on every event fired at clock value at least one, and the clock
//! resets on the toggle into the rejecting location.

use timed_automata::{State, TimedAutomaton, TimedAutomatonRunner, Transition};
use timed_core::{Constraint, ResetValue, TimedWord};
use timed_learning::{
    AutomatonSul, ComplementEquivalenceOracle, EquivalenceOracle, Learner,
    MemoEquivalenceOracle, SymbolicMembershipOracle,
};

fn toggle_automaton() -> TimedAutomaton {
    let mut even = State::new(true);
    even.add_transition('a', Transition::new(0, vec![], vec![Constraint::lt(0, 1)]));
    even.add_transition(
        'a',
        Transition::new(
            1,
            vec![(0, ResetValue::Constant(0.0))],
            vec![Constraint::ge(0, 1)],
        ),
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

fn universal_automaton() -> TimedAutomaton {
    let mut state = State::new(true);
    state.add_transition('a', Transition::new(0, vec![], vec![]));
    TimedAutomaton {
        states: vec![state],
        initial: vec![0],
        max_constraints: vec![],
    }
}

/// Timed words over `a` with delays drawn from a small grid, up to three
/// events.
fn word_battery() -> Vec<TimedWord> {
    let delays = [0.0, 0.5, 1.0, 1.5, 2.0];
    let mut words = Vec::new();
    for &first in &delays {
        words.push(TimedWord::new(vec![], vec![first]));
        for &second in &delays {
            words.push(TimedWord::new(vec!['a'], vec![first, second]));
            for &third in &delays {
                words.push(TimedWord::new(vec!['a', 'a'], vec![first, second, third]));
            }
        }
    }
    words
}

#[test_log::test]
fn learns_the_toggle_automaton() {
    let target = toggle_automaton();
    let sul = AutomatonSul::new(target.clone());
    let membership = SymbolicMembershipOracle::new(Box::new(sul));
    let eq_oracle = MemoEquivalenceOracle::new(
        Box::new(ComplementEquivalenceOracle::new(target.clone(), vec!['a'])),
        target.clone(),
    );
    let mut learner = Learner::new(vec!['a'], membership, Box::new(eq_oracle));
    let hypothesis = learner.run().expect("learning terminates");

    assert!(hypothesis.deterministic());
    assert!(hypothesis.state_size() >= 2);

    // An independent zone-based oracle confirms the equivalence.
    let mut fresh_oracle = ComplementEquivalenceOracle::new(target.clone(), vec!['a']);
    assert!(fresh_oracle.find_counter_example(&hypothesis).is_none());

    let mut target_runner = TimedAutomatonRunner::new(target);
    let mut hypothesis_runner = TimedAutomatonRunner::new(hypothesis);
    for word in word_battery() {
        assert_eq!(
            target_runner.accepts(&word),
            hypothesis_runner.accepts(&word),
            "disagreement on {word}"
        );
    }
    // On a, a both at delay one the toggle returns to acceptance
    assert!(hypothesis_runner.accepts(&TimedWord::new(vec!['a', 'a'], vec![1.0, 1.0, 0.0])));
    // Firing both events early leaves the run in the rejecting location
    assert!(!hypothesis_runner.accepts(&TimedWord::new(vec!['a', 'a'], vec![0.5, 0.5, 0.0])));
    assert!(learner.num_eq_queries() > 0);
}

#[test_log::test]
fn complement_oracle_rejects_the_universal_hypothesis() {
    let target = toggle_automaton();
    let mut oracle = ComplementEquivalenceOracle::new(target.clone(), vec!['a']);
    let counter_example = oracle
        .find_counter_example(&universal_automaton())
        .expect("the universal hypothesis is wrong");
    // The shortest disagreement is a single event on the acceptance boundary
    assert_eq!(counter_example.word_size(), 1);
    let mut target_runner = TimedAutomatonRunner::new(target);
    let mut universal_runner = TimedAutomatonRunner::new(universal_automaton());
    assert!(!target_runner.accepts(&counter_example));
    assert!(universal_runner.accepts(&counter_example));
}
