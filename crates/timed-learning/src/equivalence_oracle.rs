use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use timed_automata::{TimedAutomaton, TimedAutomatonRunner, ZoneAutomaton, intersection};
use timed_core::word::Action;
use timed_core::TimedWord;

/// Decides whether a hypothesis automaton recognises the target language,
/// producing a counterexample timed word otherwise.
pub trait EquivalenceOracle {
    fn find_counter_example(&mut self, hypothesis: &TimedAutomaton) -> Option<TimedWord>;
    /// The number of equivalence queries made so far.
    fn num_eq_queries(&self) -> usize;
}

/// The zone-based equivalence oracle: checks both inclusions by intersecting
/// one side with the complement of the other and searching the zone graph of
/// the product for an accepting witness.
///
/// Not complete when the hypothesis is not total; the learner's hypotheses
/// are completed before querying.
pub struct ComplementEquivalenceOracle {
    target: TimedAutomaton,
    complement: TimedAutomaton,
    alphabet: Vec<Action>,
    queries: usize,
}

impl ComplementEquivalenceOracle {
    /// Builds the oracle from the target; the complement is constructed once
    /// up front.
    pub fn new(target: TimedAutomaton, alphabet: Vec<Action>) -> Self {
        let complement = target.complement(&alphabet);
        debug!("complemented target:\n{complement}");
        Self {
            target,
            complement,
            alphabet,
            queries: 0,
        }
    }

    /// A word accepted by the hypothesis but not the target, if any.
    fn subset_counter_example(&self, hypothesis: &TimedAutomaton) -> Option<TimedWord> {
        let mut product = intersection(&self.complement, hypothesis);
        product.simplify_strong();
        debug!(
            "subset check: product with {} states over {} clocks",
            product.state_size(),
            product.clock_size()
        );
        ZoneAutomaton::from_automaton(&product).sample()
    }

    /// A word accepted by the target but not the hypothesis, if any.
    fn superset_counter_example(&self, hypothesis: &TimedAutomaton) -> Option<TimedWord> {
        let complemented_hypothesis = hypothesis.complement(&self.alphabet);
        let mut product = intersection(&self.target, &complemented_hypothesis);
        product.simplify_strong();
        debug!(
            "superset check: product with {} states over {} clocks",
            product.state_size(),
            product.clock_size()
        );
        ZoneAutomaton::from_automaton(&product).sample()
    }

    fn disagree(&self, hypothesis: &TimedAutomaton, word: &TimedWord) -> bool {
        let mut target_runner = TimedAutomatonRunner::new(self.target.clone());
        let mut hypothesis_runner = TimedAutomatonRunner::new(hypothesis.clone());
        target_runner.accepts(word) != hypothesis_runner.accepts(word)
    }
}

impl EquivalenceOracle for ComplementEquivalenceOracle {
    fn find_counter_example(&mut self, hypothesis: &TimedAutomaton) -> Option<TimedWord> {
        self.queries += 1;
        if let Some(word) = self.subset_counter_example(hypothesis) {
            debug_assert!(self.disagree(hypothesis, &word));
            return Some(word);
        }
        let word = self.superset_counter_example(hypothesis)?;
        debug_assert!(self.disagree(hypothesis, &word));
        Some(word)
    }

    fn num_eq_queries(&self) -> usize {
        self.queries
    }
}

/// An equivalence oracle testing a fixed list of timed words by running both
/// automata step by step.
pub struct TestEquivalenceOracle {
    automaton: TimedAutomaton,
    words: Vec<TimedWord>,
    queries: usize,
}

impl TestEquivalenceOracle {
    pub fn new(automaton: TimedAutomaton) -> Self {
        Self {
            automaton,
            words: Vec::new(),
            queries: 0,
        }
    }

    pub fn push(&mut self, word: TimedWord) {
        self.words.push(word);
    }

    fn word_distinguishes(
        target: &mut TimedAutomatonRunner,
        hypothesis: &mut TimedAutomatonRunner,
        word: &TimedWord,
    ) -> bool {
        target.pre();
        hypothesis.pre();
        for (index, &action) in word.word().iter().enumerate() {
            if target.step_duration(word.durations()[index])
                != hypothesis.step_duration(word.durations()[index])
            {
                return true;
            }
            if target.step_action(action) != hypothesis.step_action(action) {
                return true;
            }
        }
        target.step_duration(*word.durations().last().expect("durations are never empty"))
            != hypothesis
                .step_duration(*word.durations().last().expect("durations are never empty"))
    }
}

impl EquivalenceOracle for TestEquivalenceOracle {
    fn find_counter_example(&mut self, hypothesis: &TimedAutomaton) -> Option<TimedWord> {
        self.queries += 1;
        let mut target_runner = TimedAutomatonRunner::new(self.automaton.clone());
        let mut hypothesis_runner = TimedAutomatonRunner::new(hypothesis.clone());
        self.words
            .iter()
            .find(|word| {
                Self::word_distinguishes(&mut target_runner, &mut hypothesis_runner, word)
            })
            .cloned()
    }

    fn num_eq_queries(&self) -> usize {
        self.queries
    }
}

/// An equivalence oracle sampling random timed words up to a bounded length
/// and duration.
pub struct RandomTestEquivalenceOracle {
    alphabet: Vec<Action>,
    automaton: TimedAutomaton,
    max_tests: usize,
    max_length: usize,
    max_duration: f64,
    rng: StdRng,
    queries: usize,
}

impl RandomTestEquivalenceOracle {
    pub fn new(
        alphabet: Vec<Action>,
        automaton: TimedAutomaton,
        max_tests: usize,
        max_length: usize,
        max_duration: f64,
        seed: u64,
    ) -> Self {
        Self {
            alphabet,
            automaton,
            max_tests,
            max_length,
            max_duration,
            rng: StdRng::seed_from_u64(seed),
            queries: 0,
        }
    }
}

impl EquivalenceOracle for RandomTestEquivalenceOracle {
    fn find_counter_example(&mut self, hypothesis: &TimedAutomaton) -> Option<TimedWord> {
        self.queries += 1;
        let mut target_runner = TimedAutomatonRunner::new(self.automaton.clone());
        let mut hypothesis_runner = TimedAutomatonRunner::new(hypothesis.clone());
        for _ in 0..self.max_tests {
            target_runner.pre();
            hypothesis_runner.pre();
            let mut word = Vec::new();
            let mut durations = Vec::new();
            for _ in 0..self.max_length {
                let duration = self.rng.r#gen::<f64>() * self.max_duration;
                durations.push(duration);
                if target_runner.step_duration(duration)
                    != hypothesis_runner.step_duration(duration)
                {
                    return Some(TimedWord::new(word, durations));
                }
                let action = self.alphabet[self.rng.gen_range(0..self.alphabet.len())];
                word.push(action);
                if target_runner.step_action(action) != hypothesis_runner.step_action(action) {
                    durations.push(0.0);
                    return Some(TimedWord::new(word, durations));
                }
            }
            let duration = self.rng.r#gen::<f64>() * self.max_duration;
            durations.push(duration);
            if target_runner.step_duration(duration) != hypothesis_runner.step_duration(duration) {
                return Some(TimedWord::new(word, durations));
            }
            target_runner.post();
            hypothesis_runner.post();
        }
        None
    }

    fn num_eq_queries(&self) -> usize {
        self.queries
    }
}

/// A memoising wrapper: every counterexample ever returned by the inner
/// oracle is replayed by testing before the inner oracle is consulted again.
pub struct MemoEquivalenceOracle {
    inner: Box<dyn EquivalenceOracle>,
    by_test: TestEquivalenceOracle,
    queries: usize,
}

impl MemoEquivalenceOracle {
    pub fn new(inner: Box<dyn EquivalenceOracle>, target: TimedAutomaton) -> Self {
        Self {
            inner,
            by_test: TestEquivalenceOracle::new(target),
            queries: 0,
        }
    }

    /// Queries answered without consulting the wrapped oracle.
    pub fn num_inner_queries(&self) -> usize {
        self.inner.num_eq_queries()
    }
}

impl EquivalenceOracle for MemoEquivalenceOracle {
    fn find_counter_example(&mut self, hypothesis: &TimedAutomaton) -> Option<TimedWord> {
        self.queries += 1;
        if let Some(word) = self.by_test.find_counter_example(hypothesis) {
            info!("counterexample replayed from the memo: {word}");
            return Some(word);
        }
        let result = self.inner.find_counter_example(hypothesis);
        if let Some(word) = &result {
            self.by_test.push(word.clone());
        }
        result
    }

    fn num_eq_queries(&self) -> usize {
        self.queries
    }
}

/// Tries several oracles in order, returning the first counterexample.
#[derive(Default)]
pub struct EquivalenceOracleChain {
    oracles: Vec<Box<dyn EquivalenceOracle>>,
}

impl EquivalenceOracleChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, oracle: Box<dyn EquivalenceOracle>) {
        self.oracles.push(oracle);
    }
}

impl EquivalenceOracle for EquivalenceOracleChain {
    fn find_counter_example(&mut self, hypothesis: &TimedAutomaton) -> Option<TimedWord> {
        self.oracles
            .iter_mut()
            .find_map(|oracle| oracle.find_counter_example(hypothesis))
    }

    fn num_eq_queries(&self) -> usize {
        self.oracles.iter().map(|oracle| oracle.num_eq_queries()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use timed_automata::{State, Transition};
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

    fn universal_automaton() -> TimedAutomaton {
        let mut state = State::new(true);
        state.add_transition('a', Transition::new(0, vec![], vec![]));
        TimedAutomaton {
            states: vec![state],
            initial: vec![0],
            max_constraints: vec![],
        }
    }

    #[test]
    fn universal_hypothesis_yields_a_short_counterexample() {
        let target = gated_automaton();
        let mut oracle = ComplementEquivalenceOracle::new(target.clone(), vec!['a']);
        let counter_example = oracle
            .find_counter_example(&universal_automaton())
            .expect("the universal hypothesis is wrong");
        let mut target_runner = TimedAutomatonRunner::new(target);
        let mut universal_runner = TimedAutomatonRunner::new(universal_automaton());
        assert!(
            target_runner.accepts(&counter_example)
                != universal_runner.accepts(&counter_example)
        );
        assert_eq!(oracle.num_eq_queries(), 1);
    }

    #[test]
    fn equivalent_automata_produce_no_counterexample() {
        let target = gated_automaton();
        let mut oracle = ComplementEquivalenceOracle::new(target.clone(), vec!['a']);
        assert!(oracle.find_counter_example(&target).is_none());
    }

    #[test]
    fn memo_replays_previous_counterexamples() {
        let target = gated_automaton();
        let inner = ComplementEquivalenceOracle::new(target.clone(), vec!['a']);
        let mut memo = MemoEquivalenceOracle::new(Box::new(inner), target);
        let first = memo.find_counter_example(&universal_automaton());
        assert!(first.is_some());
        let inner_queries = memo.num_inner_queries();
        let second = memo.find_counter_example(&universal_automaton());
        assert_eq!(first, second);
        assert_eq!(memo.num_inner_queries(), inner_queries);
    }

    #[test]
    fn random_testing_finds_gross_differences() {
        let target = gated_automaton();
        let mut oracle = RandomTestEquivalenceOracle::new(
            vec!['a'],
            target.clone(),
            100,
            3,
            3.0,
            0xda7a,
        );
        let counter_example = oracle
            .find_counter_example(&universal_automaton())
            .expect("random testing finds the difference");
        let mut target_runner = TimedAutomatonRunner::new(target);
        let mut universal_runner = TimedAutomatonRunner::new(universal_automaton());
        assert_ne!(
            target_runner.accepts(&counter_example),
            universal_runner.accepts(&counter_example)
        );
    }
}
