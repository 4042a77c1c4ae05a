use std::fmt;

use tracing::trace;

use timed_core::{
    Bound, ElementaryLanguage, ForwardRegionalElementaryLanguage, RenamingRelation,
    TimedCondition, TimedWord,
};

/// A morphism from an elementary language outside the prefix set into one
/// inside it, defined by a clock renaming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleMorphism {
    domain: ElementaryLanguage,
    codomain: ElementaryLanguage,
    renaming: RenamingRelation,
}

impl SingleMorphism {
    pub fn new(
        domain: ElementaryLanguage,
        codomain: ElementaryLanguage,
        renaming: RenamingRelation,
    ) -> Self {
        Self {
            domain,
            codomain,
            renaming,
        }
    }

    pub fn domain(&self) -> &ElementaryLanguage {
        &self.domain
    }

    pub fn codomain(&self) -> &ElementaryLanguage {
        &self.codomain
    }

    /// Whether the timed word lies in the domain.
    pub fn in_domain(&self, word: &TimedWord) -> bool {
        self.domain.contains(word)
    }

    /// Whether the given elementary language is exactly the domain.
    pub fn is_domain(&self, language: &ElementaryLanguage) -> bool {
        self.domain == *language
    }

    /// Applies the morphism to a timed word of the domain: the word's exact
    /// duration condition is juxtaposed against the codomain, the renaming
    /// equalities are added, and a codomain word is sampled from the result.
    pub fn apply(&self, word: &TimedWord) -> TimedWord {
        debug_assert!(self.in_domain(word));
        let mut accumulated = vec![0.0; word.durations().len()];
        let positions = accumulated.len();
        accumulated[positions - 1] = word.durations()[positions - 1];
        for i in (0..positions - 1).rev() {
            accumulated[i] = accumulated[i + 1] + word.durations()[i];
        }
        let word_condition = TimedCondition::make_exact(&accumulated);
        let mut juxtaposed = word_condition.juxtapose(self.codomain.condition());
        juxtaposed.add_renaming(&self.renaming);
        juxtaposed.canonize();
        debug_assert!(juxtaposed.is_satisfiable_no_canonize());
        let values = juxtaposed.sample();

        let left_size = word.word_size() + 1;
        let codomain_positions = self.codomain.word_size() + 1;
        let mut durations = vec![0.0; codomain_positions];
        for i in (0..codomain_positions).rev() {
            if i == codomain_positions - 1 {
                durations[i] = *values.last().expect("the codomain is non-empty");
            } else {
                durations[i] = values[left_size + i] - values[left_size + i + 1];
            }
        }
        TimedWord::new(self.codomain.word().to_vec(), durations)
    }
}

impl fmt::Display for SingleMorphism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "domain: {} codomain: {} renaming: {}",
            self.domain, self.codomain, self.renaming
        )
    }
}

/// The split of a timed word along a morphism domain: `prefix · suffix` with
/// the prefix in the domain.
#[derive(Debug, Clone)]
pub struct SplitTriple {
    pub prefix: TimedWord,
    pub suffix: TimedWord,
    pub morphism: SingleMorphism,
}

impl SplitTriple {
    /// Maps the prefix through the morphism and re-attaches the suffix.
    pub fn apply(&self) -> TimedWord {
        self.morphism.apply(&self.prefix).concat(&self.suffix)
    }
}

/// A recognizable timed language in the Maler–Pnueli presentation: a finite
/// prefix set, the accepting prefixes, and morphisms mapping the boundary
/// back into the prefixes.
#[derive(Debug, Clone)]
pub struct RecognizableLanguage {
    prefixes: Vec<ElementaryLanguage>,
    finals: Vec<ElementaryLanguage>,
    morphisms: Vec<SingleMorphism>,
}

impl RecognizableLanguage {
    pub fn new(
        prefixes: Vec<ElementaryLanguage>,
        finals: Vec<ElementaryLanguage>,
        morphisms: Vec<SingleMorphism>,
    ) -> Self {
        debug_assert!(
            finals
                .iter()
                .all(|language| prefixes.contains(language))
        );
        Self {
            prefixes,
            finals,
            morphisms,
        }
    }

    /// Whether the word lies in some prefix language.
    pub fn in_prefixes(&self, word: &TimedWord) -> bool {
        self.prefixes.iter().any(|language| language.contains(word))
    }

    /// Whether the word lies in some accepting prefix language.
    pub fn is_final(&self, word: &TimedWord) -> bool {
        self.finals.iter().any(|language| language.contains(word))
    }

    /// Splits the word at the first morphism whose domain covers one of the
    /// regional prefixes of the word, sampling a concrete prefix consistent
    /// with both the word and the domain.
    pub fn split(&self, word: &TimedWord) -> Option<SplitTriple> {
        let regional = ForwardRegionalElementaryLanguage::from_timed_word(word);
        let regional_prefixes = regional.prefixes();
        let morphism = self.morphisms.iter().find(|morphism| {
            regional_prefixes
                .iter()
                .any(|prefix| morphism.is_domain(prefix.elementary()))
        })?;
        if morphism.domain().contains(word) {
            return Some(SplitTriple {
                prefix: word.clone(),
                suffix: TimedWord::empty(),
                morphism: morphism.clone(),
            });
        }
        // Pin the domain condition to the word's delays up to the split
        // point, then choose the delay at the split.
        let domain_size = morphism.domain().word_size();
        let mut domain_condition = morphism.domain().condition().clone();
        let mut prefix_durations = Vec::with_capacity(domain_size + 1);
        for i in 0..domain_size {
            let duration = word.durations()[i];
            domain_condition.restrict_upper_bound(i, i, Bound::new(duration, true), false);
            domain_condition.restrict_lower_bound(i, i, Bound::new(-duration, true), false);
            prefix_durations.push(duration);
        }
        let upper = domain_condition.upper_bound(domain_size, domain_size);
        if Bound::new(word.durations()[domain_size], true) <= upper {
            // The word's own delay at the split point fits the domain.
            prefix_durations.push(word.durations()[domain_size]);
        } else if upper.is_closed() {
            prefix_durations.push(upper.constant());
        } else {
            // No longest delay exists; sample one.
            let sampled =
                ElementaryLanguage::new(morphism.domain().word().to_vec(), domain_condition)
                    .sample();
            prefix_durations.push(*sampled.durations().last().expect("durations are never empty"));
        }
        let prefix = TimedWord::new(morphism.domain().word().to_vec(), prefix_durations);
        trace!("split {word} into prefix {prefix}");
        Some(SplitTriple {
            suffix: word.suffix_after(&prefix),
            prefix,
            morphism: morphism.clone(),
        })
    }

    fn map(&self, word: &TimedWord) -> Option<TimedWord> {
        if self.in_prefixes(word) {
            Some(word.clone())
        } else {
            Some(self.split(word)?.apply())
        }
    }

    /// Whether this recognizable language contains the timed word:
    /// repeatedly maps the word until it falls into the prefixes, then checks
    /// finality.
    pub fn contains(&self, word: &TimedWord) -> bool {
        let mut current = word.clone();
        while !self.in_prefixes(&current) {
            match self.map(&current) {
                Some(mapped) => current = mapped,
                None => return false,
            }
        }
        self.is_final(&current)
    }
}

impl fmt::Display for RecognizableLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "prefixes:")?;
        for prefix in &self.prefixes {
            writeln!(f, "  {prefix}")?;
        }
        writeln!(f, "finals:")?;
        for language in &self.finals {
            writeln!(f, "  {language}")?;
        }
        writeln!(f, "morphisms:")?;
        for morphism in &self.morphisms {
            writeln!(f, "  {morphism}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use timed_core::ForwardRegionalElementaryLanguage;

    /// The one-region language of the zero word, with morphisms folding the
    /// first elapse and the first event back onto it.
    fn folding_language() -> RecognizableLanguage {
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
    fn morphism_maps_into_the_codomain() {
        let language = folding_language();
        let word = TimedWord::new(vec![], vec![0.5]);
        let triple = language.split(&word).expect("the elapse morphism applies");
        assert!(triple.morphism.in_domain(&word));
        let mapped = triple.apply();
        assert_eq!(mapped.word_size(), 0);
        assert_eq!(mapped.durations(), &[0.0]);
    }

    #[test]
    fn containment_folds_until_a_prefix_is_reached() {
        let language = folding_language();
        // No prefix is final, so nothing is contained, but folding must
        // terminate.
        assert!(!language.contains(&TimedWord::new(vec![], vec![0.5])));
        assert!(!language.contains(&TimedWord::new(vec!['a'], vec![0.0, 0.0])));
    }

    #[test]
    fn split_pins_the_prefix_to_the_word_delays() {
        let language = folding_language();
        let word = TimedWord::new(vec!['a'], vec![0.5, 0.0]);
        let triple = language.split(&word).expect("the elapse morphism applies");
        // The elapse morphism splits off the delay prefix
        assert_eq!(triple.prefix.word_size(), 0);
        assert_eq!(triple.suffix.word(), &['a']);
    }
}
