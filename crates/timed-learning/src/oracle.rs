use std::collections::HashMap;

use tracing::trace;

use timed_automata::TimedAutomatonRunner;
use timed_core::word::Action;
use timed_core::{ElementaryLanguage, TimedConditionSet, TimedWord};

/// The system under learning: a black box fed one timed word per
/// `pre`/`post` bracket, one delay or event at a time, answering with its
/// acceptance bit after every step.
pub trait Sul {
    /// Called before feeding a timed word.
    fn pre(&mut self);
    /// Called after feeding a timed word.
    fn post(&mut self);
    /// Fires an observable event.
    fn step_action(&mut self, action: Action) -> bool;
    /// Elapses time.
    fn step_duration(&mut self, duration: f64) -> bool;
    /// The cumulative number of queries.
    fn count(&self) -> usize;
}

/// A [`Sul`] backed by executing a timed automaton.
#[derive(Debug, Clone)]
pub struct AutomatonSul {
    runner: TimedAutomatonRunner,
}

impl AutomatonSul {
    pub fn new(automaton: timed_automata::TimedAutomaton) -> Self {
        Self {
            runner: TimedAutomatonRunner::new(automaton),
        }
    }
}

impl Sul for AutomatonSul {
    fn pre(&mut self) {
        self.runner.pre();
    }

    fn post(&mut self) {
        self.runner.post();
    }

    fn step_action(&mut self, action: Action) -> bool {
        self.runner.step_action(action)
    }

    fn step_duration(&mut self, duration: f64) -> bool {
        self.runner.step_duration(duration)
    }

    fn count(&self) -> usize {
        self.runner.count()
    }
}

/// Answers point membership queries.
pub trait MembershipOracle {
    fn answer_query(&mut self, word: &TimedWord) -> bool;
    /// The number of queries issued to the underlying system.
    fn count(&self) -> usize;
}

/// Runs one timed word through a [`Sul`] per query.
pub struct SulMembershipOracle {
    sul: Box<dyn Sul>,
}

impl SulMembershipOracle {
    pub fn new(sul: Box<dyn Sul>) -> Self {
        Self { sul }
    }
}

fn run_word(sul: &mut dyn Sul, word: &TimedWord) -> bool {
    sul.pre();
    let mut result = sul.step_duration(word.durations()[0]);
    for (index, &action) in word.word().iter().enumerate() {
        sul.step_action(action);
        result = sul.step_duration(word.durations()[index + 1]);
    }
    sul.post();
    result
}

impl MembershipOracle for SulMembershipOracle {
    fn answer_query(&mut self, word: &TimedWord) -> bool {
        run_word(self.sul.as_mut(), word)
    }

    fn count(&self) -> usize {
        self.sul.count()
    }
}

/// A caching decorator over a membership oracle, reporting both cached and
/// uncached query counts.
pub struct CachedMembershipOracle<O> {
    oracle: O,
    cache: HashMap<TimedWord, bool>,
    queries_with_cache: usize,
}

impl<O: MembershipOracle> CachedMembershipOracle<O> {
    pub fn new(oracle: O) -> Self {
        Self {
            oracle,
            cache: HashMap::new(),
            queries_with_cache: 0,
        }
    }

    /// Queries including the ones served from the cache.
    pub fn count_with_cache(&self) -> usize {
        self.queries_with_cache
    }
}

impl<O: MembershipOracle> MembershipOracle for CachedMembershipOracle<O> {
    fn answer_query(&mut self, word: &TimedWord) -> bool {
        self.queries_with_cache += 1;
        if let Some(&answer) = self.cache.get(word) {
            return answer;
        }
        let answer = self.oracle.answer_query(word);
        self.cache.insert(word.clone(), answer);
        answer
    }

    fn count(&self) -> usize {
        self.oracle.count()
    }
}

/// The symbolic membership oracle: lifts a point [`Sul`] to whole region
/// families by enumerating an elementary language into its simple regions,
/// sampling one representative each and reducing the accepted regions into a
/// minimal non-convex union. Results are memoised per elementary language.
pub struct SymbolicMembershipOracle {
    sul: Box<dyn Sul>,
    membership_cache: HashMap<TimedWord, bool>,
    cache: HashMap<ElementaryLanguage, TimedConditionSet>,
}

impl SymbolicMembershipOracle {
    pub fn new(sul: Box<dyn Sul>) -> Self {
        Self {
            sul,
            membership_cache: HashMap::new(),
            cache: HashMap::new(),
        }
    }

    fn membership(&mut self, word: &TimedWord) -> bool {
        if let Some(&answer) = self.membership_cache.get(word) {
            return answer;
        }
        let answer = run_word(self.sul.as_mut(), word);
        self.membership_cache.insert(word.clone(), answer);
        answer
    }

    /// The symbolic membership of `language`: the subset of its regions the
    /// system accepts, as a non-convex union of timed conditions.
    pub fn query(&mut self, language: &ElementaryLanguage) -> TimedConditionSet {
        if let Some(cached) = self.cache.get(language) {
            return cached.clone();
        }
        let mut included = Vec::new();
        let mut all_included = true;
        for simple in language.enumerate() {
            if self.membership(&simple.sample()) {
                included.push(simple);
            } else {
                all_included = false;
            }
        }
        let result = if included.is_empty() {
            TimedConditionSet::bottom()
        } else if all_included {
            TimedConditionSet::new(language.condition().clone())
        } else {
            let hull = ElementaryLanguage::convex_hull(&included);
            if hull.enumerate().len() == included.len() {
                // The convex hull is the exact union.
                TimedConditionSet::new(hull.condition().clone())
            } else {
                TimedConditionSet::reduce(
                    included
                        .into_iter()
                        .map(|language| language.condition().clone())
                        .collect(),
                )
            }
        };
        trace!("symbolic membership of {language}: {} regions", result.len());
        self.cache.insert(language.clone(), result.clone());
        result
    }

    pub fn count(&self) -> usize {
        self.sul.count()
    }
}

impl MembershipOracle for SymbolicMembershipOracle {
    fn answer_query(&mut self, word: &TimedWord) -> bool {
        self.membership(word)
    }

    fn count(&self) -> usize {
        self.sul.count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use timed_core::Bound;
    use timed_core::TimedCondition;

    /// Accepts exactly the words whose total duration is at least one.
    struct ThresholdSul {
        total: f64,
        queries: usize,
    }

    impl ThresholdSul {
        fn new() -> Self {
            Self {
                total: 0.0,
                queries: 0,
            }
        }
    }

    impl Sul for ThresholdSul {
        fn pre(&mut self) {
            self.total = 0.0;
            self.queries += 1;
        }

        fn post(&mut self) {}

        fn step_action(&mut self, _action: Action) -> bool {
            self.total >= 1.0
        }

        fn step_duration(&mut self, duration: f64) -> bool {
            self.total += duration;
            self.total >= 1.0
        }

        fn count(&self) -> usize {
            self.queries
        }
    }

    #[test]
    fn symbolic_query_keeps_accepting_regions_only() {
        let mut oracle = SymbolicMembershipOracle::new(Box::new(ThresholdSul::new()));
        // 0 <= τ0 <= 2 covers rejecting and accepting regions
        let mut condition = TimedCondition::top(1);
        condition.restrict_lower_bound(0, 0, Bound::new(0.0, true), true);
        condition.restrict_upper_bound(0, 0, Bound::new(2.0, true), true);
        let language = ElementaryLanguage::new(vec![], condition);
        let result = oracle.query(&language);
        assert_eq!(result.len(), 1);
        // Accepted part is exactly 1 <= τ0 <= 2
        let accepted = &result.conditions()[0];
        assert_eq!(accepted.lower_bound(0, 0), Bound::new(-1.0, true));
        assert_eq!(accepted.upper_bound(0, 0), Bound::new(2.0, true));
    }

    #[test]
    fn queries_are_memoised_per_language() {
        let mut oracle = SymbolicMembershipOracle::new(Box::new(ThresholdSul::new()));
        let language = ElementaryLanguage::empty();
        oracle.query(&language);
        let after_first = oracle.count();
        oracle.query(&language);
        assert_eq!(oracle.count(), after_first);
    }

    #[test]
    fn cached_oracle_reports_both_counts() {
        let mut oracle =
            CachedMembershipOracle::new(SulMembershipOracle::new(Box::new(ThresholdSul::new())));
        let word = TimedWord::new(vec![], vec![1.5]);
        assert!(oracle.answer_query(&word));
        assert!(oracle.answer_query(&word));
        assert_eq!(oracle.count_with_cache(), 2);
        assert_eq!(oracle.count(), 1);
    }
}
