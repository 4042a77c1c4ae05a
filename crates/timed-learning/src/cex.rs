use tracing::{debug, error};

use timed_core::{BackwardRegionalElementaryLanguage, TimedWord};

use crate::oracle::MembershipOracle;
use crate::recognizable::{RecognizableLanguage, SingleMorphism};

/// Rivest–Schapire-style counterexample analysis against a recognizable
/// hypothesis.
///
/// The counterexample is repeatedly split and mapped until it falls into the
/// hypothesis prefixes; a linear scan over the mapped words finds the first
/// index where membership flips relative to the hypothesis bit, and the
/// suffix recorded there is the fresh distinguishing extension. Returns
/// `None` when the hypothesis is not row-faithful (the first mapped word
/// already agrees) or when no recorded suffix is fresh; both cases are
/// logged and the caller raises a new equivalence query.
pub fn analyze_counterexample(
    word: &TimedWord,
    oracle: &mut dyn MembershipOracle,
    hypothesis: &RecognizableLanguage,
    current_suffixes: &[BackwardRegionalElementaryLanguage],
) -> Option<TimedWord> {
    debug!("analyzing counterexample {word}");
    let mut mapped_words = vec![word.clone()];
    let mut suffixes = vec![TimedWord::empty()];
    let mut morphisms: Vec<SingleMorphism> = Vec::new();
    while !hypothesis.in_prefixes(mapped_words.last().expect("non-empty")) {
        let triple = hypothesis
            .split(mapped_words.last().expect("non-empty"))
            .expect("a closed hypothesis has a morphism for every boundary region");
        suffixes.push(triple.suffix.clone());
        morphisms.push(triple.morphism.clone());
        mapped_words.push(triple.apply());
    }

    let hypothesis_result = hypothesis.contains(mapped_words.last().expect("non-empty"));
    let mut agreements = Vec::with_capacity(mapped_words.len());
    for mapped in &mapped_words {
        agreements.push(oracle.answer_query(mapped) == hypothesis_result);
    }
    debug_assert!(*agreements.last().expect("non-empty"));
    if agreements[0] {
        // The counterexample was supposed to disagree with the hypothesis
        // bit; reaching this point means the constructed DTA is not faithful
        // to the rows of the table.
        error!("hypothesis is not row-faithful; counterexample analysis failed");
        for morphism in &morphisms {
            error!("  morphism: {morphism}");
        }
        for mapped in &mapped_words {
            error!("  mapped word: {mapped}");
        }
        return None;
    }

    for index in 0..mapped_words.len() - 1 {
        if agreements[index] != agreements[index + 1] {
            let fresh = &suffixes[index + 1];
            if current_suffixes
                .iter()
                .all(|suffix| !suffix.contains(fresh))
            {
                debug!("fresh distinguishing suffix: {fresh}");
                return Some(fresh.clone());
            }
            debug!("{fresh} distinguishes but is already covered");
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::Sul;
    use crate::oracle::SymbolicMembershipOracle;
    use timed_core::word::Action;
    use timed_core::{ElementaryLanguage, ForwardRegionalElementaryLanguage, RenamingRelation};

    /// Accepts exactly the words whose single event fires at total time one.
    struct EventAtOneSul {
        total: f64,
        events: usize,
        fired_at_one: bool,
        queries: usize,
    }

    impl EventAtOneSul {
        fn new() -> Self {
            Self {
                total: 0.0,
                events: 0,
                fired_at_one: false,
                queries: 0,
            }
        }

        fn accepting(&self) -> bool {
            self.events == 1 && self.fired_at_one
        }
    }

    impl Sul for EventAtOneSul {
        fn pre(&mut self) {
            self.total = 0.0;
            self.events = 0;
            self.fired_at_one = false;
            self.queries += 1;
        }

        fn post(&mut self) {}

        fn step_action(&mut self, _action: Action) -> bool {
            self.events += 1;
            if self.events == 1 && self.total == 1.0 {
                self.fired_at_one = true;
            }
            self.accepting()
        }

        fn step_duration(&mut self, duration: f64) -> bool {
            self.total += duration;
            self.accepting()
        }

        fn count(&self) -> usize {
            self.queries
        }
    }

    /// The empty hypothesis: only the zero word region is a prefix, nothing
    /// is final, and morphisms fold the first elapse and the first event
    /// back onto it.
    fn empty_hypothesis() -> RecognizableLanguage {
        let zero = ElementaryLanguage::empty();
        let elapsed = ForwardRegionalElementaryLanguage::default()
            .continuous_successor()
            .elementary()
            .clone();
        let after_a = ForwardRegionalElementaryLanguage::default()
            .discrete_successor('a')
            .elementary()
            .clone();
        RecognizableLanguage::new(
            vec![zero.clone()],
            vec![],
            vec![
                SingleMorphism::new(elapsed, zero.clone(), RenamingRelation::empty()),
                SingleMorphism::new(after_a, zero.clone(), RenamingRelation::empty()),
            ],
        )
    }

    #[test]
    fn minimal_counterexample_yields_the_half_time_suffix() {
        let mut oracle = SymbolicMembershipOracle::new(Box::new(EventAtOneSul::new()));
        let counterexample = TimedWord::new(vec!['a'], vec![1.0, 0.0]);
        let fresh = analyze_counterexample(&counterexample, &mut oracle, &empty_hypothesis(), &[])
            .expect("the counterexample produces a fresh suffix");
        assert_eq!(fresh, TimedWord::new(vec!['a'], vec![0.5, 0.0]));
    }

    #[test]
    fn covered_suffixes_are_not_returned_again(){
        let mut oracle = SymbolicMembershipOracle::new(Box::new(EventAtOneSul::new()));
        let counterexample = TimedWord::new(vec!['a'], vec![1.0, 0.0]);
        let covering = BackwardRegionalElementaryLanguage::from_timed_word(&TimedWord::new(
            vec!['a'],
            vec![0.5, 0.0],
        ));
        let result = analyze_counterexample(
            &counterexample,
            &mut oracle,
            &empty_hypothesis(),
            &[covering],
        );
        assert!(result.is_none());
    }
}
