use thiserror::Error;
use tracing::{debug, info};

use timed_automata::TimedAutomaton;
use timed_core::word::Action;
use timed_core::TimedWord;

use crate::equivalence_oracle::EquivalenceOracle;
use crate::oracle::SymbolicMembershipOracle;
use crate::table::ObservationTable;

/// Errors surfacing from the learning loop.
#[derive(Debug, Error)]
pub enum LearnError {
    /// A counterexample produced no fresh suffix, so the table cannot make
    /// progress; this indicates a hypothesis that is not faithful to its
    /// rows.
    #[error("counterexample `{0}` produced no fresh suffix")]
    StaleCounterexample(TimedWord),
}

/// The active learner: drives the observation table through its closure
/// passes, synthesises a hypothesis, asks the equivalence oracle and feeds
/// counterexamples back into the table until the oracle agrees.
pub struct Learner {
    table: ObservationTable,
    eq_oracle: Box<dyn EquivalenceOracle>,
}

impl Learner {
    pub fn new(
        alphabet: Vec<Action>,
        membership_oracle: SymbolicMembershipOracle,
        eq_oracle: Box<dyn EquivalenceOracle>,
    ) -> Self {
        Self {
            table: ObservationTable::initialize(alphabet, membership_oracle),
            eq_oracle,
        }
    }

    /// Runs the learning loop to completion.
    pub fn run(&mut self) -> Result<TimedAutomaton, LearnError> {
        loop {
            loop {
                let mut unchanged = self.table.close();
                unchanged = unchanged && self.table.consistent();
                unchanged = unchanged && self.table.exterior_consistent();
                unchanged = unchanged && self.table.time_saturate();
                if unchanged {
                    break;
                }
            }
            debug!("table stabilised:\n{}", self.table.summary());
            let mut hypothesis = self.table.generate_hypothesis();
            hypothesis.simplify_strong();
            hypothesis.simplify_with_zones();
            info!("hypothesis:\n{hypothesis}");
            debug_assert!(hypothesis.deterministic());
            match self.eq_oracle.find_counter_example(&hypothesis) {
                None => return Ok(hypothesis),
                Some(counter_example) => {
                    info!("counterexample: {counter_example}");
                    if !self.table.handle_counter_example(&counter_example) {
                        return Err(LearnError::StaleCounterexample(counter_example));
                    }
                }
            }
        }
    }

    /// The number of equivalence queries issued so far.
    pub fn num_eq_queries(&self) -> usize {
        self.eq_oracle.num_eq_queries()
    }

    /// A human-readable statistics block.
    pub fn statistics(&self) -> String {
        format!(
            "Number of membership queries: {}\nNumber of equivalence queries: {}\n",
            self.table.num_membership_queries(),
            self.eq_oracle.num_eq_queries()
        )
    }
}
