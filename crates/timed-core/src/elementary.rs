use std::fmt;
use std::hash::{Hash, Hasher};

use itertools::Itertools;

use crate::bounds::{Bound, is_point};
use crate::condition::TimedCondition;
use crate::word::{Action, TimedWord};

/// An elementary language: a word together with a timed condition on its
/// durations. It denotes the timed words
/// `τ_0 a_1 τ_1 … a_n τ_n` whose durations satisfy the condition.
#[derive(Debug, Clone)]
pub struct ElementaryLanguage {
    word: Vec<Action>,
    condition: TimedCondition,
}

impl Default for ElementaryLanguage {
    fn default() -> Self {
        Self::empty()
    }
}

impl ElementaryLanguage {
    pub fn new(word: Vec<Action>, condition: TimedCondition) -> Self {
        assert_eq!(word.len() + 1, condition.size());
        Self { word, condition }
    }

    /// The language containing only the timed word of duration zero.
    pub fn empty() -> Self {
        Self {
            word: Vec::new(),
            condition: TimedCondition::empty(),
        }
    }

    /// The convex hull of languages sharing a word.
    pub fn convex_hull(languages: &[ElementaryLanguage]) -> ElementaryLanguage {
        let Some(first) = languages.first() else {
            return Self::empty();
        };
        let mut result = first.clone();
        for language in &languages[1..] {
            debug_assert_eq!(language.word, result.word);
            result.condition.convex_hull_assign(&language.condition);
        }
        result
    }

    pub fn word(&self) -> &[Action] {
        &self.word
    }

    pub fn condition(&self) -> &TimedCondition {
        &self.condition
    }

    pub fn word_size(&self) -> usize {
        self.word.len()
    }

    pub fn is_simple(&self) -> bool {
        self.condition.is_simple()
    }

    /// Concatenation of two elementary languages.
    pub fn concat(&self, other: &ElementaryLanguage) -> ElementaryLanguage {
        let mut word = self.word.clone();
        word.extend_from_slice(&other.word);
        ElementaryLanguage {
            word,
            condition: self.condition.concat(&other.condition),
        }
    }

    /// The simple elementary languages covered by this one.
    pub fn enumerate(&self) -> Vec<ElementaryLanguage> {
        if self.is_simple() {
            return vec![self.clone()];
        }
        self.condition
            .enumerate()
            .into_iter()
            .map(|condition| ElementaryLanguage {
                word: self.word.clone(),
                condition,
            })
            .collect()
    }

    /// A concrete member of this language: per position the midpoint of the
    /// interval feasible given the durations already chosen.
    pub fn sample(&self) -> TimedWord {
        let positions = self.word_size() + 1;
        let mut durations = vec![0.0; positions];
        for i in 0..positions {
            let lower_bound = self.condition.lower_bound(i, i);
            let upper_bound = self.condition.upper_bound(i, i);
            if is_point(upper_bound, lower_bound) {
                durations[i] = upper_bound.constant();
                continue;
            }
            let mut lower = -lower_bound.constant();
            let mut upper = upper_bound.constant();
            let mut sum = 0.0;
            for j in (0..i).rev() {
                sum += durations[j];
                lower = lower.max(-self.condition.lower_bound(j, i).constant() - sum);
                upper = upper.min(self.condition.upper_bound(j, i).constant() - sum);
            }
            debug_assert!(lower <= upper);
            durations[i] = (lower + upper) * 0.5;
        }
        TimedWord::new(self.word.clone(), durations)
    }

    /// Whether the timed word belongs to this language.
    pub fn contains(&self, word: &TimedWord) -> bool {
        if self.word != word.word() {
            return false;
        }
        let durations = word.durations();
        for i in 0..durations.len() {
            for j in i..durations.len() {
                let sum: f64 = durations[i..=j].iter().sum();
                let upper = self.condition.upper_bound(i, j);
                let lower = self.condition.lower_bound(i, j);
                let below = sum < upper.constant() || (upper.is_closed() && sum == upper.constant());
                let above = sum > -lower.constant()
                    || (lower.is_closed() && sum == -lower.constant());
                if !below || !above {
                    return false;
                }
            }
        }
        true
    }

    /// Restricts the condition to the concrete delays of a word prefix.
    pub fn constrain(&self, prefix: &TimedWord) -> ElementaryLanguage {
        debug_assert!(prefix.word_size() <= self.word_size());
        debug_assert_eq!(&self.word[..prefix.word_size()], prefix.word());
        let mut condition = self.condition.clone();
        for (i, &duration) in prefix.durations()[..prefix.word_size()].iter().enumerate() {
            condition.restrict_lower_bound(i, i, Bound::new(-duration, true), false);
            condition.restrict_upper_bound(i, i, Bound::new(duration, true), false);
        }
        ElementaryLanguage {
            word: self.word.clone(),
            condition,
        }
    }

    pub fn remove_equality_upper_bound_assign(&mut self) {
        self.condition.remove_equality_upper_bound_assign();
    }

    pub fn remove_upper_bound(&self) -> ElementaryLanguage {
        let mut result = self.clone();
        result.condition.remove_upper_bound_assign();
        result
    }
}

impl PartialEq for ElementaryLanguage {
    fn eq(&self, other: &Self) -> bool {
        self.word == other.word && self.condition == other.condition
    }
}

impl Eq for ElementaryLanguage {}

impl Hash for ElementaryLanguage {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.word.hash(state);
        self.condition.hash(state);
    }
}

impl fmt::Display for ElementaryLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {})",
            self.word.iter().join(""),
            self.condition
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_is_contained() {
        let mut condition = TimedCondition::top(2);
        condition.restrict_lower_bound(0, 0, Bound::new(0.0, false), true);
        condition.restrict_upper_bound(0, 0, Bound::new(1.0, false), true);
        condition.restrict_lower_bound(1, 1, Bound::new(0.0, true), true);
        condition.restrict_upper_bound(1, 1, Bound::new(0.0, true), true);
        let language = ElementaryLanguage::new(vec!['a'], condition);
        let sampled = language.sample();
        assert!(language.contains(&sampled));
        assert_eq!(sampled.durations()[1], 0.0);
    }

    #[test]
    fn containment_checks_pair_sums() {
        // τ0 + τ1 = 1 exactly
        let condition = TimedCondition::make_exact(&[1.0, 0.5]);
        let language = ElementaryLanguage::new(vec!['a'], condition);
        assert!(language.contains(&TimedWord::new(vec!['a'], vec![0.5, 0.5])));
        assert!(!language.contains(&TimedWord::new(vec!['a'], vec![0.5, 0.6])));
        assert!(!language.contains(&TimedWord::new(vec!['b'], vec![0.5, 0.5])));
    }

    #[test]
    fn constrain_pins_prefix_durations() {
        let mut condition = TimedCondition::top(1);
        condition.restrict_lower_bound(0, 0, Bound::new(0.0, false), true);
        condition.restrict_upper_bound(0, 0, Bound::new(2.0, false), true);
        let language = ElementaryLanguage::new(vec![], condition);
        // An empty-word prefix only pins the durations before its events,
        // so constraining by it is the identity here.
        let constrained = language.constrain(&TimedWord::empty());
        assert_eq!(constrained, language);
    }
}
