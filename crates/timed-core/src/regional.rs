use std::fmt;
use std::hash::{Hash, Hasher};

use crate::condition::TimedCondition;
use crate::constraint::Resets;
use crate::elementary::ElementaryLanguage;
use crate::fractional::FractionalOrder;
use crate::word::{Action, TimedWord};

/// A forward regional elementary language: an elementary language refined by
/// the order on the fractional parts of the suffix sums `T_{i,N}`. Simple
/// forward regional languages are exactly the regions reached by running a
/// timed word, and they support discrete and continuous successor steps.
#[derive(Debug, Clone, Default)]
pub struct ForwardRegionalElementaryLanguage {
    elementary: ElementaryLanguage,
    order: FractionalOrder,
}

impl ForwardRegionalElementaryLanguage {
    pub fn new(elementary: ElementaryLanguage, order: FractionalOrder) -> Self {
        assert_eq!(order.size(), elementary.word_size() + 1);
        Self { elementary, order }
    }

    /// The regional language containing the given timed word.
    pub fn from_timed_word(word: &TimedWord) -> Self {
        let positions = word.word_size() + 1;
        let mut accumulated = vec![0.0; positions];
        let mut fractional = vec![0.0; positions];
        accumulated[positions - 1] = word.durations()[positions - 1];
        fractional[positions - 1] =
            accumulated[positions - 1] - accumulated[positions - 1].floor();
        for i in (0..positions - 1).rev() {
            accumulated[i] = accumulated[i + 1] + word.durations()[i];
            fractional[i] = accumulated[i] - accumulated[i].floor();
        }
        Self {
            elementary: ElementaryLanguage::new(
                word.word().to_vec(),
                TimedCondition::from_accumulated(&accumulated),
            ),
            order: FractionalOrder::from_fractional_parts(&fractional),
        }
    }

    pub fn elementary(&self) -> &ElementaryLanguage {
        &self.elementary
    }

    pub fn word(&self) -> &[Action] {
        self.elementary.word()
    }

    pub fn condition(&self) -> &TimedCondition {
        self.elementary.condition()
    }

    pub fn fractional_order(&self) -> &FractionalOrder {
        &self.order
    }

    pub fn word_size(&self) -> usize {
        self.elementary.word_size()
    }

    pub fn is_simple(&self) -> bool {
        self.elementary.is_simple()
    }

    pub fn sample(&self) -> TimedWord {
        self.elementary.sample()
    }

    pub fn contains(&self, word: &TimedWord) -> bool {
        self.elementary.contains(word)
    }

    pub fn has_equality_n(&self) -> bool {
        self.condition().has_equality_n()
    }

    /// The discrete successor on `action`: the word grows by one event and a
    /// fresh variable pinned to zero appears.
    pub fn discrete_successor(&self, action: Action) -> Self {
        let mut word = self.word().to_vec();
        word.push(action);
        Self {
            elementary: ElementaryLanguage::new(word, self.condition().extend_n()),
            order: self.order.extend_n(),
        }
    }

    /// The continuous successor: the region reached by letting time elapse
    /// across the next fractional boundary.
    pub fn continuous_successor(&self) -> Self {
        Self {
            elementary: ElementaryLanguage::new(
                self.word().to_vec(),
                self.condition().successor(&self.order.successor_variables()),
            ),
            order: self.order.successor(),
        }
    }

    pub fn continuous_successor_assign(&mut self) {
        let variables = self.order.successor_variables();
        let condition = self.condition().successor(&variables);
        self.elementary = ElementaryLanguage::new(self.word().to_vec(), condition);
        self.order.successor_assign();
    }

    /// The immediate prefix region, continuous if time can rewind and
    /// discrete otherwise; `None` for the empty region.
    pub fn immediate_prefix(&self) -> Option<Self> {
        if self.word().is_empty() && !self.condition().has_prefix() {
            None
        } else if self.condition().has_prefix() {
            Some(Self {
                elementary: ElementaryLanguage::new(
                    self.word().to_vec(),
                    self.condition().prefix(&self.order.predecessor_variables()),
                ),
                order: self.order.predecessor(),
            })
        } else {
            let mut word = self.word().to_vec();
            word.pop();
            Some(Self {
                elementary: ElementaryLanguage::new(word, self.condition().remove_n()),
                order: self.order.remove_n(),
            })
        }
    }

    /// All prefixes of this region, shortest first and ending with the region
    /// itself.
    pub fn prefixes(&self) -> Vec<Self> {
        let mut result = vec![self.clone()];
        let mut current = self.clone();
        while let Some(prefix) = current.immediate_prefix() {
            result.push(prefix.clone());
            current = prefix;
        }
        result.reverse();
        result
    }

    /// The backward regional language `s` with `self ⊆ prefix · s`.
    ///
    /// Both languages must be simple and `prefix` must be a prefix of `self`.
    pub fn suffix(&self, prefix: &Self) -> BackwardRegionalElementaryLanguage {
        debug_assert!(prefix.is_simple());
        debug_assert!(self.is_simple());
        debug_assert_eq!(
            &self.word()[..prefix.word_size()],
            prefix.word()
        );
        let prefix_word = prefix.sample();
        let constrained = self.elementary.constrain(&prefix_word);
        let full_word = constrained.sample();

        let suffix_word = self.word()[prefix.word_size()..].to_vec();
        let mut suffix_durations = full_word.durations()[prefix.word_size()..].to_vec();
        suffix_durations[0] -= prefix_word
            .durations()
            .last()
            .expect("durations are never empty");
        let suffix_timed_word = TimedWord::new(suffix_word, suffix_durations.clone());
        let forward = Self::from_timed_word(&suffix_timed_word);

        let mut fractional = vec![0.0; suffix_durations.len()];
        fractional[0] = suffix_durations[0] - suffix_durations[0].floor();
        for i in 1..fractional.len() {
            let accumulated = fractional[i - 1] + suffix_durations[i];
            fractional[i] = accumulated - accumulated.floor();
        }
        debug_assert!(fractional.iter().all(|f| (0.0..1.0).contains(f)));

        BackwardRegionalElementaryLanguage::new(
            ElementaryLanguage::new(forward.word().to_vec(), forward.condition().clone()),
            FractionalOrder::from_fractional_parts(&fractional),
        )
    }

    /// The region reached by applying constant resets within the same clock
    /// space.
    pub fn apply_constant_resets(&self, resets: &Resets) -> Self {
        let language = ElementaryLanguage::new(
            self.word().to_vec(),
            self.condition().apply_constant_resets(resets),
        );
        Self::from_timed_word(&language.sample())
    }

    /// The region over `target_clock_size` clocks reached by applying the
    /// resets, rewriting the word to `new_word`.
    pub fn apply_resets(
        &self,
        new_word: Vec<Action>,
        resets: &Resets,
        target_clock_size: usize,
    ) -> Self {
        assert_eq!(new_word.len() + 1, target_clock_size);
        let language = ElementaryLanguage::new(
            new_word,
            self.condition().apply_resets(resets, target_clock_size),
        );
        Self::from_timed_word(&language.sample())
    }
}

impl PartialEq for ForwardRegionalElementaryLanguage {
    fn eq(&self, other: &Self) -> bool {
        self.elementary == other.elementary && self.order == other.order
    }
}

impl Eq for ForwardRegionalElementaryLanguage {}

impl Hash for ForwardRegionalElementaryLanguage {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.elementary.hash(state);
        self.order.hash(state);
    }
}

impl fmt::Display for ForwardRegionalElementaryLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.elementary)
    }
}

/// A backward regional elementary language: an elementary language refined by
/// the order on the fractional parts of the prefix sums `T_{0,i}`. These
/// index the suffix columns of the observation table and support discrete and
/// continuous predecessor steps.
#[derive(Debug, Clone, Default)]
pub struct BackwardRegionalElementaryLanguage {
    elementary: ElementaryLanguage,
    order: FractionalOrder,
}

impl BackwardRegionalElementaryLanguage {
    pub fn new(elementary: ElementaryLanguage, order: FractionalOrder) -> Self {
        Self { elementary, order }
    }

    /// The backward regional language containing the given timed word.
    pub fn from_timed_word(word: &TimedWord) -> Self {
        let positions = word.word_size() + 1;
        let mut from_front = vec![0.0; positions];
        let mut fractional = vec![0.0; positions];
        from_front[0] = word.durations()[0];
        fractional[0] = from_front[0] - from_front[0].floor();
        for i in 1..positions {
            from_front[i] = from_front[i - 1] + word.durations()[i];
            fractional[i] = from_front[i] - from_front[i].floor();
        }
        let mut from_back = vec![0.0; positions];
        from_back[positions - 1] = word.durations()[positions - 1];
        for i in (0..positions - 1).rev() {
            from_back[i] = from_back[i + 1] + word.durations()[i];
        }
        Self {
            elementary: ElementaryLanguage::new(
                word.word().to_vec(),
                TimedCondition::from_accumulated(&from_back),
            ),
            order: FractionalOrder::from_fractional_parts(&fractional),
        }
    }

    pub fn elementary(&self) -> &ElementaryLanguage {
        &self.elementary
    }

    pub fn word(&self) -> &[Action] {
        self.elementary.word()
    }

    pub fn condition(&self) -> &TimedCondition {
        self.elementary.condition()
    }

    pub fn fractional_order(&self) -> &FractionalOrder {
        &self.order
    }

    pub fn word_size(&self) -> usize {
        self.elementary.word_size()
    }

    pub fn contains(&self, word: &TimedWord) -> bool {
        self.elementary.contains(word)
    }

    /// The discrete predecessor: prepends `action` with a zero delay.
    pub fn discrete_predecessor(&self, action: Action) -> Self {
        let mut word = vec![action];
        word.extend_from_slice(self.word());
        Self {
            elementary: ElementaryLanguage::new(word, self.condition().extend_zero()),
            order: self.order.extend_zero(),
        }
    }

    /// The continuous predecessor: rewinds time across the previous
    /// fractional boundary.
    pub fn continuous_predecessor(&self) -> Self {
        Self {
            elementary: ElementaryLanguage::new(
                self.word().to_vec(),
                self.condition()
                    .predecessor(&self.order.predecessor_variables()),
            ),
            order: self.order.predecessor(),
        }
    }

    /// The immediate suffix region, continuous if the leading delay can
    /// shrink and discrete otherwise; `None` for the empty region.
    pub fn immediate_suffix(&self) -> Option<Self> {
        if self.word().is_empty() && !self.condition().has_suffix() {
            None
        } else if self.condition().has_suffix() {
            Some(Self {
                elementary: ElementaryLanguage::new(
                    self.word().to_vec(),
                    self.condition().suffix(&self.order.predecessor_variables()),
                ),
                order: self.order.predecessor(),
            })
        } else {
            let word = self.word()[1..].to_vec();
            Some(Self {
                elementary: ElementaryLanguage::new(word, self.condition().remove_n()),
                order: self.order.remove_n(),
            })
        }
    }

    /// All suffixes of this region, shortest first and ending with the
    /// region itself.
    pub fn suffixes(&self) -> Vec<Self> {
        let mut result = vec![self.clone()];
        let mut current = self.clone();
        while let Some(suffix) = current.immediate_suffix() {
            result.push(suffix.clone());
            current = suffix;
        }
        result.reverse();
        result
    }
}

impl PartialEq for BackwardRegionalElementaryLanguage {
    fn eq(&self, other: &Self) -> bool {
        self.elementary == other.elementary && self.order == other.order
    }
}

impl Eq for BackwardRegionalElementaryLanguage {}

impl Hash for BackwardRegionalElementaryLanguage {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.elementary.hash(state);
        self.order.hash(state);
    }
}

impl fmt::Display for BackwardRegionalElementaryLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.elementary)
    }
}
