use std::collections::{HashMap, HashSet};

use bit_set::BitSet;
use indexmap::IndexMap;
use tabled::builder::Builder;
use tracing::{debug, info, warn};

use timed_core::word::Action;
use timed_core::{
    BackwardRegionalElementaryLanguage, ForwardRegionalElementaryLanguage, RenamingRelation,
    TimedConditionSet, TimedWord,
};

use crate::cex::analyze_counterexample;
use crate::equivalence::{find_equivalent_renaming, row_equivalence};
use crate::oracle::SymbolicMembershipOracle;
use crate::recognizable::{RecognizableLanguage, SingleMorphism};

/// The symbolic observation table: forward regional languages as rows,
/// backward regional languages as columns, and the symbolic membership of
/// their concatenation as cells.
///
/// The active prefix set P is closed under one-step successors: moving a row
/// into P appends its `|Σ|` discrete successors and its continuous
/// successor to the row set. Rows are never removed.
pub struct ObservationTable {
    oracle: SymbolicMembershipOracle,
    alphabet: Vec<Action>,
    prefixes: Vec<ForwardRegionalElementaryLanguage>,
    suffixes: Vec<BackwardRegionalElementaryLanguage>,
    p_indices: BitSet,
    /// Memoised renaming witnesses: row `i` is equivalent to row `j` under
    /// the stored renaming, until a new suffix invalidates it.
    closed_relation: HashMap<usize, IndexMap<usize, RenamingRelation>>,
    table: Vec<Vec<TimedConditionSet>>,
    continuous_successors: HashMap<usize, usize>,
    discrete_successors: HashMap<(usize, Action), usize>,
    /// Pairs known to be distinguished; never revisited.
    distinguished: HashSet<(usize, usize)>,
}

impl ObservationTable {
    /// Builds the table over the alphabet with the empty prefix and the
    /// empty suffix, and moves the empty prefix into P.
    pub fn initialize(alphabet: Vec<Action>, oracle: SymbolicMembershipOracle) -> Self {
        let mut table = Self {
            oracle,
            alphabet,
            prefixes: vec![ForwardRegionalElementaryLanguage::default()],
            suffixes: vec![BackwardRegionalElementaryLanguage::default()],
            p_indices: BitSet::new(),
            closed_relation: HashMap::new(),
            table: Vec::new(),
            continuous_successors: HashMap::new(),
            discrete_successors: HashMap::new(),
            distinguished: HashSet::new(),
        };
        table.move_to_p(0);
        table.refresh();
        table
    }

    pub fn alphabet(&self) -> &[Action] {
        &self.alphabet
    }

    pub fn prefixes(&self) -> &[ForwardRegionalElementaryLanguage] {
        &self.prefixes
    }

    pub fn suffixes(&self) -> &[BackwardRegionalElementaryLanguage] {
        &self.suffixes
    }

    pub fn p_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.p_indices.iter()
    }

    pub fn in_p(&self, index: usize) -> bool {
        self.p_indices.contains(index)
    }

    pub fn row(&self, index: usize) -> &[TimedConditionSet] {
        &self.table[index]
    }

    pub fn continuous_successor(&self, index: usize) -> usize {
        self.continuous_successors[&index]
    }

    pub fn discrete_successor(&self, index: usize, action: Action) -> usize {
        self.discrete_successors[&(index, action)]
    }

    pub fn oracle(&mut self) -> &mut SymbolicMembershipOracle {
        &mut self.oracle
    }

    /// Fills every missing cell by a symbolic membership query.
    fn refresh(&mut self) {
        while self.table.len() < self.prefixes.len() {
            self.table.push(Vec::new());
        }
        for (prefix_index, row) in self.table.iter_mut().enumerate() {
            for suffix_index in row.len()..self.suffixes.len() {
                let concatenation = self.prefixes[prefix_index]
                    .elementary()
                    .concat(self.suffixes[suffix_index].elementary());
                row.push(self.oracle.query(&concatenation));
            }
        }
    }

    /// Moves a row into P, appending its discrete and continuous successors.
    fn move_to_p(&mut self, index: usize) {
        debug_assert!(!self.p_indices.contains(index));
        debug!("moving row {index} into P: {}", self.prefixes[index]);
        self.p_indices.insert(index);
        for action in self.alphabet.clone() {
            let successor = self.prefixes[index].discrete_successor(action);
            self.prefixes.push(successor);
            self.discrete_successors
                .insert((index, action), self.prefixes.len() - 1);
        }
        let successor = self.prefixes[index].continuous_successor();
        self.prefixes.push(successor);
        self.continuous_successors
            .insert(index, self.prefixes.len() - 1);
        self.refresh();
    }

    /// Searches for a fresh renaming witnessing the equivalence of two rows,
    /// memoising the outcome.
    fn equivalent(&mut self, i: usize, j: usize) -> bool {
        let renaming = find_equivalent_renaming(
            self.prefixes[i].elementary(),
            &self.table[i],
            self.prefixes[j].elementary(),
            &self.table[j],
            &self.suffixes,
        );
        match renaming {
            Some(renaming) => {
                self.closed_relation.entry(i).or_default().insert(j, renaming);
                true
            }
            None => {
                self.distinguished.insert((i, j));
                false
            }
        }
    }

    /// Row equivalence, trying the memoised witness first.
    pub(crate) fn equivalent_with_memo(&mut self, i: usize, j: usize) -> bool {
        if self.distinguished.contains(&(i, j)) || self.distinguished.contains(&(j, i)) {
            return false;
        }
        if let Some(renaming) = self
            .closed_relation
            .get(&i)
            .and_then(|targets| targets.get(&j))
            .cloned()
        {
            if row_equivalence(
                self.prefixes[i].elementary(),
                &self.table[i],
                self.prefixes[j].elementary(),
                &self.table[j],
                &self.suffixes,
                &renaming,
            ) {
                return true;
            }
        }
        self.equivalent(i, j)
    }

    /// Row equivalence after extending both rows with a candidate suffix.
    fn equivalent_with_new_suffix(
        &mut self,
        i: usize,
        j: usize,
        new_suffix: &BackwardRegionalElementaryLanguage,
    ) -> bool {
        let mut left_row = self.table[i].clone();
        left_row.push(
            self.oracle
                .query(&self.prefixes[i].elementary().concat(new_suffix.elementary())),
        );
        let mut right_row = self.table[j].clone();
        right_row.push(
            self.oracle
                .query(&self.prefixes[j].elementary().concat(new_suffix.elementary())),
        );
        let mut suffixes = self.suffixes.clone();
        suffixes.push(new_suffix.clone());
        find_equivalent_renaming(
            self.prefixes[i].elementary(),
            &left_row,
            self.prefixes[j].elementary(),
            &right_row,
            &suffixes,
        )
        .is_some()
    }

    /// The first valid witness mapping row `index` onto a P row.
    pub(crate) fn witness(&mut self, index: usize) -> Option<(usize, RenamingRelation)> {
        if let Some(targets) = self.closed_relation.get(&index).cloned() {
            for (target, renaming) in targets {
                if self.p_indices.contains(target)
                    && row_equivalence(
                        self.prefixes[index].elementary(),
                        &self.table[index],
                        self.prefixes[target].elementary(),
                        &self.table[target],
                        &self.suffixes,
                        &renaming,
                    )
                {
                    return Some((target, renaming));
                }
            }
        }
        let candidates: Vec<usize> = self.p_indices.iter().collect();
        for target in candidates {
            if self.equivalent(index, target) {
                let renaming = self.closed_relation[&index][&target].clone();
                return Some((target, renaming));
            }
        }
        None
    }

    /// One closing pass: every boundary row must be equivalent to a P row;
    /// the first one that is not moves into P. Returns `true` when the table
    /// is already closed.
    pub fn close(&mut self) -> bool {
        for index in 0..self.prefixes.len() {
            if self.p_indices.contains(index) {
                continue;
            }
            let mut found = false;
            if let Some(targets) = self.closed_relation.get(&index).cloned() {
                // Revalidate the memoised witnesses, dropping stale ones.
                for (target, renaming) in targets {
                    if row_equivalence(
                        self.prefixes[index].elementary(),
                        &self.table[index],
                        self.prefixes[target].elementary(),
                        &self.table[target],
                        &self.suffixes,
                        &renaming,
                    ) {
                        found = true;
                        break;
                    }
                    self.closed_relation
                        .get_mut(&index)
                        .expect("present above")
                        .shift_remove(&target);
                }
            }
            if !found {
                let candidates: Vec<usize> = self.p_indices.iter().collect();
                found = candidates
                    .into_iter()
                    .any(|target| self.equivalent(index, target));
            }
            if !found {
                info!("table is not closed at row {index}");
                self.move_to_p(index);
                return false;
            }
        }
        true
    }

    /// One consistency pass: equivalent P rows must have equivalent
    /// successors; a violation extends the suffixes with the distinguishing
    /// predecessor. Returns `true` when the table is already consistent.
    pub fn consistent(&mut self) -> bool {
        let p_rows: Vec<usize> = self.p_indices.iter().collect();
        for &i in &p_rows {
            for &j in &p_rows {
                if i <= j || !self.equivalent_with_memo(i, j) {
                    continue;
                }
                for action in self.alphabet.clone() {
                    let left = self.discrete_successors[&(i, action)];
                    let right = self.discrete_successors[&(j, action)];
                    if !self.equivalent_with_memo(left, right) {
                        let suffix = self
                            .suffixes
                            .clone()
                            .into_iter()
                            .map(|suffix| suffix.discrete_predecessor(action))
                            .find(|extended| !self.equivalent_with_new_suffix(i, j, extended))
                            .expect(
                                "a distinguishing suffix must exist when successors differ",
                            );
                        info!("inconsistency on action {action}; adding suffix {suffix}");
                        self.suffixes.push(suffix);
                        self.refresh();
                        return false;
                    }
                }
                let left = self.continuous_successors[&i];
                let right = self.continuous_successors[&j];
                if !self.equivalent_with_memo(left, right) {
                    let suffix = self
                        .suffixes
                        .clone()
                        .into_iter()
                        .map(|suffix| suffix.continuous_predecessor())
                        .find(|extended| !self.equivalent_with_new_suffix(i, j, extended))
                        .expect("a distinguishing suffix must exist when successors differ");
                    info!("inconsistency on time elapse; adding suffix {suffix}");
                    self.suffixes.push(suffix);
                    self.refresh();
                    return false;
                }
            }
        }
        true
    }

    /// One exterior-consistency pass: a P row without an equality constraint
    /// must have its continuous successor in P. Returns `true` when nothing
    /// was moved.
    pub fn exterior_consistent(&mut self) -> bool {
        let mut new_p: Vec<usize> = Vec::new();
        for index in self.p_indices.iter() {
            let successor = self.continuous_successors[&index];
            if self.p_indices.contains(successor) {
                continue;
            }
            if self.prefixes[index].has_equality_n() {
                continue;
            }
            new_p.push(successor);
        }
        if new_p.is_empty() {
            return true;
        }
        for index in new_p {
            if !self.p_indices.contains(index) {
                info!("exterior consistency moves row {index} into P");
                self.move_to_p(index);
            }
        }
        self.refresh();
        false
    }

    /// One time-saturation pass: the witness of every boundary row must stay
    /// valid when the suffixes are shifted by one region of elapse. A
    /// distinguishing shifted suffix joins S, recording the effect of
    /// time-elapse transitions on the representative rows. Returns `true`
    /// when nothing was added.
    pub fn time_saturate(&mut self) -> bool {
        let boundary: Vec<usize> = (0..self.prefixes.len())
            .filter(|index| !self.p_indices.contains(*index))
            .collect();
        for index in boundary {
            let Some((target, _)) = self.witness(index) else {
                continue;
            };
            for suffix in self.suffixes.clone() {
                let shifted = suffix.continuous_predecessor();
                if self.equivalent_with_new_suffix(index, target, &shifted) {
                    continue;
                }
                let p_rows: Vec<usize> = self.p_indices.iter().collect();
                let still_covered = p_rows
                    .into_iter()
                    .any(|row| self.equivalent_with_new_suffix(index, row, &shifted));
                if !still_covered {
                    info!("time saturation adds suffix {shifted}");
                    self.suffixes.push(shifted);
                    self.refresh();
                    return false;
                }
            }
        }
        true
    }

    /// The recognizable language presented by the table: the P rows as
    /// prefixes, the accepting ones as finals, and the boundary witnesses as
    /// morphisms.
    pub fn to_recognizable(&mut self) -> RecognizableLanguage {
        let prefixes: Vec<_> = self
            .p_indices
            .iter()
            .map(|index| self.prefixes[index].elementary().clone())
            .collect();
        let finals: Vec<_> = self
            .p_indices
            .iter()
            .filter(|&index| !self.table[index][0].is_empty())
            .map(|index| self.prefixes[index].elementary().clone())
            .collect();
        let boundary: Vec<usize> = (0..self.prefixes.len())
            .filter(|index| !self.p_indices.contains(*index))
            .collect();
        let mut morphisms = Vec::with_capacity(boundary.len());
        for index in boundary {
            let Some((target, renaming)) = self.witness(index) else {
                warn!("boundary row {index} has no witness; the table is not closed");
                continue;
            };
            morphisms.push(SingleMorphism::new(
                self.prefixes[index].elementary().clone(),
                self.prefixes[target].elementary().clone(),
                renaming,
            ));
        }
        RecognizableLanguage::new(prefixes, finals, morphisms)
    }

    /// Processes a counterexample: the Rivest–Schapire analysis extracts a
    /// fresh suffix, which is added to S. Returns `false` when no fresh
    /// suffix could be extracted.
    pub fn handle_counter_example(&mut self, counter_example: &TimedWord) -> bool {
        let recognizable = self.to_recognizable();
        let suffixes = self.suffixes.clone();
        let fresh = analyze_counterexample(
            counter_example,
            &mut self.oracle,
            &recognizable,
            &suffixes,
        );
        match fresh {
            Some(word) => {
                let suffix = BackwardRegionalElementaryLanguage::from_timed_word(&word);
                info!("counterexample adds suffix {suffix}");
                self.suffixes.push(suffix);
                self.refresh();
                true
            }
            None => false,
        }
    }

    /// A tabular summary of the table shape for diagnostics.
    pub fn summary(&self) -> String {
        let mut builder = Builder::default();
        builder.push_record(["row", "language", "in P", "cells"]);
        for (index, prefix) in self.prefixes.iter().enumerate() {
            builder.push_record([
                index.to_string(),
                prefix.to_string(),
                self.p_indices.contains(index).to_string(),
                self.table[index]
                    .iter()
                    .map(|cell| cell.len().to_string())
                    .collect::<Vec<_>>()
                    .join(","),
            ]);
        }
        builder.build().to_string()
    }

    /// Statistics of the underlying oracle usage.
    pub fn num_membership_queries(&self) -> usize {
        self.oracle.count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{AutomatonSul, Sul};
    use timed_automata::{State, TimedAutomaton, Transition};
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

    fn toggle_table() -> ObservationTable {
        let sul = AutomatonSul::new(toggle_automaton());
        ObservationTable::initialize(vec!['a'], SymbolicMembershipOracle::new(Box::new(sul)))
    }

    #[test]
    fn initialization_populates_successor_rows() {
        let table = toggle_table();
        // The empty prefix plus one discrete and one continuous successor
        assert_eq!(table.prefixes().len(), 3);
        assert!(table.in_p(0));
        assert!(!table.in_p(table.continuous_successor(0)));
        assert!(!table.in_p(table.discrete_successor(0, 'a')));
        // The empty word is accepted
        assert!(!table.row(0)[0].is_empty());
    }

    #[test]
    fn closing_reaches_a_fixpoint() {
        let mut table = toggle_table();
        let mut rounds = 0;
        while !table.close() {
            rounds += 1;
            assert!(rounds < 64, "closing must terminate");
        }
        // Every boundary row now has a witness in P
        let boundary: Vec<usize> = (0..table.prefixes().len())
            .filter(|&index| !table.in_p(index))
            .collect();
        for index in boundary {
            assert!(table.witness(index).is_some());
        }
    }

    #[test]
    fn recognizable_language_accepts_like_the_table() {
        let mut table = toggle_table();
        while !table.close() {}
        let recognizable = table.to_recognizable();
        // The empty word is accepted by the toggle automaton
        assert!(recognizable.contains(&TimedWord::empty()));
    }

    #[test]
    fn summary_lists_every_row() {
        let table = toggle_table();
        let summary = table.summary();
        for index in 0..table.prefixes().len() {
            assert!(summary.contains(&index.to_string()));
        }
    }

    #[test]
    fn sul_queries_accumulate() {
        let mut sul = AutomatonSul::new(toggle_automaton());
        sul.pre();
        sul.step_duration(1.0);
        assert_eq!(sul.count(), 1);
        let table = toggle_table();
        assert!(table.num_membership_queries() > 0);
    }
}
