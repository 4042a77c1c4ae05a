use std::fmt;
use std::hash::{Hash, Hasher};

/// An observable event of the system under learning.
pub type Action = char;

/// The reserved tag for unobservable transitions.
pub const UNOBSERVABLE: Action = 'ε';

/// A timed word: a sequence of events together with the delay *before* each
/// event and one trailing delay, so `durations.len() == word.len() + 1`.
#[derive(Debug, Clone, Default)]
pub struct TimedWord {
    word: Vec<Action>,
    durations: Vec<f64>,
}

impl TimedWord {
    pub fn new(word: Vec<Action>, durations: Vec<f64>) -> Self {
        assert_eq!(word.len() + 1, durations.len());
        Self { word, durations }
    }

    /// The empty timed word with a zero trailing delay.
    pub fn empty() -> Self {
        Self {
            word: Vec::new(),
            durations: vec![0.0],
        }
    }

    pub fn word(&self) -> &[Action] {
        &self.word
    }

    pub fn durations(&self) -> &[f64] {
        &self.durations
    }

    pub fn word_size(&self) -> usize {
        self.word.len()
    }

    /// Appends an event with a zero delay in front of it.
    pub fn push_event(&self, action: Action) -> TimedWord {
        let mut result = self.clone();
        result.word.push(action);
        result.durations.push(0.0);
        result
    }

    /// Extends the trailing delay.
    pub fn push_duration(&self, duration: f64) -> TimedWord {
        let mut result = self.clone();
        *result.durations.last_mut().expect("durations are never empty") += duration;
        result
    }

    /// Concatenation, fusing the boundary delays.
    pub fn concat(&self, other: &TimedWord) -> TimedWord {
        let mut result = self.clone();
        result.word.extend_from_slice(&other.word);
        let mut it = other.durations.iter();
        *result.durations.last_mut().expect("durations are never empty") +=
            it.next().copied().unwrap_or(0.0);
        result.durations.extend(it.copied());
        result
    }

    /// The suffix `s` with `self == prefix · s`.
    ///
    /// The prefix must be a word prefix of `self` with compatible delays.
    pub fn suffix_after(&self, prefix: &TimedWord) -> TimedWord {
        assert!(prefix.word_size() <= self.word_size());
        assert_eq!(&self.word[..prefix.word_size()], prefix.word());
        let word = self.word[prefix.word_size()..].to_vec();
        let mut durations = self.durations[prefix.word_size()..].to_vec();
        durations[0] -= prefix.durations.last().expect("durations are never empty");
        TimedWord::new(word, durations)
    }
}

impl PartialEq for TimedWord {
    fn eq(&self, other: &Self) -> bool {
        self.word == other.word && self.durations == other.durations
    }
}

impl Eq for TimedWord {}

impl Hash for TimedWord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.word.hash(state);
        for duration in &self.durations {
            (duration + 0.0).to_bits().hash(state);
        }
    }
}

impl fmt::Display for TimedWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.durations[0])?;
        for (action, duration) in self.word.iter().zip(self.durations.iter().skip(1)) {
            write!(f, " {action} {duration}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concatenation_fuses_boundary_delays() {
        let left = TimedWord::new(vec!['a'], vec![0.5, 0.25]);
        let right = TimedWord::new(vec!['b'], vec![0.25, 1.0]);
        let both = left.concat(&right);
        assert_eq!(both.word(), &['a', 'b']);
        assert_eq!(both.durations(), &[0.5, 0.5, 1.0]);
    }

    #[test]
    fn suffix_after_inverts_concatenation() {
        let prefix = TimedWord::new(vec!['a'], vec![0.5, 0.25]);
        let suffix = TimedWord::new(vec!['b'], vec![0.75, 0.0]);
        let whole = prefix.concat(&suffix);
        assert_eq!(whole.suffix_after(&prefix), suffix);
    }

    #[test]
    fn pushing_duration_extends_the_trailing_delay() {
        let word = TimedWord::empty().push_duration(0.5).push_event('a').push_duration(1.0);
        assert_eq!(word.word(), &['a']);
        assert_eq!(word.durations(), &[0.5, 1.0]);
    }
}
