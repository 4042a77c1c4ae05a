use std::path::Path;

use indexmap::IndexMap;
use serde_json::Value;
use thiserror::Error;

use timed_core::word::Action;
use timed_core::{Constraint, ResetValue};

use crate::automaton::{State, TimedAutomaton, Transition};

/// Errors raised while reading a one-clock timed automaton in the OTA JSON
/// format.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to read the input file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("missing key `{0}`")]
    MissingKey(&'static str),
    #[error("alphabet labels must be single characters, got `{0}`")]
    InvalidLabel(String),
    #[error("malformed guard range `{0}`")]
    InvalidRange(String),
    #[error("transition refers to unknown location `{0}`")]
    UnknownLocation(String),
    #[error("malformed transition entry: {0}")]
    InvalidTransition(String),
}

fn as_str(value: &Value) -> Option<&str> {
    value.as_str()
}

fn single_char(label: &str) -> Result<Action, ParseError> {
    let mut chars = label.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(ParseError::InvalidLabel(label.to_string())),
    }
}

fn parse_range(range: &str, max_constant: &mut i64) -> Result<Vec<Constraint>, ParseError> {
    let invalid = || ParseError::InvalidRange(range.to_string());
    let comma = range.find(',').ok_or_else(invalid)?;
    let (lower, upper) = (&range[..comma], &range[comma + 1..]);
    let mut guard = Vec::new();

    if lower != "[0" {
        let bracket = lower.chars().next().ok_or_else(invalid)?;
        let constant: i64 = lower[1..].trim().parse().map_err(|_| invalid())?;
        *max_constant = (*max_constant).max(constant);
        guard.push(match bracket {
            '[' => Constraint::ge(0, constant),
            '(' => Constraint::gt(0, constant),
            _ => return Err(invalid()),
        });
    }
    if upper != "+)" {
        let bracket = upper.chars().last().ok_or_else(invalid)?;
        let constant: i64 = upper[..upper.len() - 1].trim().parse().map_err(|_| invalid())?;
        *max_constant = (*max_constant).max(constant);
        guard.push(match bracket {
            ']' => Constraint::le(0, constant),
            ')' => Constraint::lt(0, constant),
            _ => return Err(invalid()),
        });
    }
    Ok(guard)
}

/// Parses a one-clock timed automaton from the OTA JSON object: keys `sigma`
/// (alphabet), `l` (locations), `init`, `accept`, and `tran` (entries
/// `[source, label, range, "r"|"n", target]`). Returns the automaton together
/// with its alphabet.
pub fn parse_ota(input: &str) -> Result<(TimedAutomaton, Vec<Action>), ParseError> {
    let root: Value = serde_json::from_str(input)?;
    let sigma = root.get("sigma").ok_or(ParseError::MissingKey("sigma"))?;
    let mut alphabet = Vec::new();
    for label in sigma.as_array().ok_or(ParseError::MissingKey("sigma"))? {
        alphabet.push(single_char(
            as_str(label).ok_or(ParseError::MissingKey("sigma"))?,
        )?);
    }

    let accept: Vec<&str> = root
        .get("accept")
        .and_then(Value::as_array)
        .ok_or(ParseError::MissingKey("accept"))?
        .iter()
        .filter_map(as_str)
        .collect();

    let mut automaton = TimedAutomaton {
        states: Vec::new(),
        initial: Vec::new(),
        max_constraints: vec![0],
    };
    let mut locations: IndexMap<String, usize> = IndexMap::new();
    for name in root
        .get("l")
        .and_then(Value::as_array)
        .ok_or(ParseError::MissingKey("l"))?
    {
        let name = as_str(name).ok_or(ParseError::MissingKey("l"))?;
        let index = automaton.states.len();
        automaton.states.push(State::new(accept.contains(&name)));
        locations.insert(name.to_string(), index);
    }

    let init = root
        .get("init")
        .and_then(Value::as_str)
        .ok_or(ParseError::MissingKey("init"))?;
    let init_index = *locations
        .get(init)
        .ok_or_else(|| ParseError::UnknownLocation(init.to_string()))?;
    automaton.initial.push(init_index);

    let tran = root.get("tran").ok_or(ParseError::MissingKey("tran"))?;
    let entries: Vec<&Value> = match tran {
        Value::Array(list) => list.iter().collect(),
        Value::Object(map) => map.values().collect(),
        _ => return Err(ParseError::MissingKey("tran")),
    };
    let mut max_constant = 0;
    for entry in entries {
        let fields = entry
            .as_array()
            .ok_or_else(|| ParseError::InvalidTransition(entry.to_string()))?;
        let [source, label, range, reset, target] = fields.as_slice() else {
            return Err(ParseError::InvalidTransition(entry.to_string()));
        };
        let source = as_str(source)
            .ok_or_else(|| ParseError::InvalidTransition(entry.to_string()))?;
        let target = as_str(target)
            .ok_or_else(|| ParseError::InvalidTransition(entry.to_string()))?;
        let label = single_char(
            as_str(label).ok_or_else(|| ParseError::InvalidTransition(entry.to_string()))?,
        )?;
        let range =
            as_str(range).ok_or_else(|| ParseError::InvalidTransition(entry.to_string()))?;
        let reset = as_str(reset)
            .ok_or_else(|| ParseError::InvalidTransition(entry.to_string()))?
            == "r";

        let source_index = *locations
            .get(source)
            .ok_or_else(|| ParseError::UnknownLocation(source.to_string()))?;
        let target_index = *locations
            .get(target)
            .ok_or_else(|| ParseError::UnknownLocation(target.to_string()))?;
        let guard = parse_range(range, &mut max_constant)?;
        let resets = if reset {
            vec![(0, ResetValue::Constant(0.0))]
        } else {
            Vec::new()
        };
        automaton.states[source_index]
            .add_transition(label, Transition::new(target_index, resets, guard));
    }
    automaton.max_constraints[0] = max_constant;
    Ok((automaton, alphabet))
}

/// Reads and parses an OTA JSON file.
pub fn parse_ota_file<P: AsRef<Path>>(path: P) -> Result<(TimedAutomaton, Vec<Action>), ParseError> {
    let input = std::fs::read_to_string(path)?;
    parse_ota(&input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::TimedAutomatonRunner;
    use timed_core::TimedWord;

    const EXAMPLE: &str = r#"{
        "sigma": ["a"],
        "l": ["1", "2"],
        "init": "1",
        "accept": ["2"],
        "tran": {
            "0": ["1", "a", "[1,2)", "r", "2"],
            "1": ["2", "a", "[0,+)", "n", "2"]
        }
    }"#;

    #[test]
    fn parses_locations_guards_and_resets() {
        let (automaton, alphabet) = parse_ota(EXAMPLE).expect("the example is well-formed");
        assert_eq!(alphabet, vec!['a']);
        assert_eq!(automaton.state_size(), 2);
        assert_eq!(automaton.initial, vec![0]);
        assert!(automaton.states[1].is_match);
        assert_eq!(automaton.max_constraints, vec![2]);
        let transition = &automaton.states[0].transitions('a')[0];
        assert_eq!(
            transition.guard,
            vec![Constraint::ge(0, 1), Constraint::lt(0, 2)]
        );
        assert_eq!(transition.resets, vec![(0, ResetValue::Constant(0.0))]);
    }

    #[test]
    fn parsed_automaton_runs() {
        let (automaton, _) = parse_ota(EXAMPLE).expect("the example is well-formed");
        let mut runner = TimedAutomatonRunner::new(automaton);
        assert!(runner.accepts(&TimedWord::new(vec!['a'], vec![1.5, 0.0])));
        assert!(!runner.accepts(&TimedWord::new(vec!['a'], vec![0.5, 0.0])));
    }

    #[test]
    fn rejects_multi_character_labels() {
        let broken = EXAMPLE.replace("\"sigma\": [\"a\"]", "\"sigma\": [\"ab\"]");
        assert!(matches!(
            parse_ota(&broken),
            Err(ParseError::InvalidLabel(_))
        ));
    }

    #[test]
    fn rejects_malformed_ranges() {
        let broken = EXAMPLE.replace("[1,2)", "[1;2)");
        assert!(matches!(
            parse_ota(&broken),
            Err(ParseError::InvalidRange(_))
        ));
    }
}
