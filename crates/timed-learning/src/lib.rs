//! Active learning of deterministic timed automata.
//!
//! The learner infers a DTA for an unknown timed language from membership and
//! equivalence queries: a [`table::ObservationTable`] indexed by forward and
//! backward regional elementary languages records symbolic membership, rows
//! are compared up to clock renamings ([`equivalence`]), hypotheses are
//! synthesised via internal/external transition makers and relaxed around
//! imprecise clock embeddings, and counterexamples are decomposed
//! Rivest–Schapire style against the recognizable presentation of the table.

pub mod cex;
pub mod equivalence;
pub mod equivalence_oracle;
pub mod hypothesis;
pub mod imprecise;
pub mod learner;
pub mod neighbor;
pub mod oracle;
pub mod recognizable;
pub mod table;
pub mod transition_maker;

pub use cex::analyze_counterexample;
pub use equivalence::{find_equivalent_renaming, row_equivalence};
pub use equivalence_oracle::{
    ComplementEquivalenceOracle, EquivalenceOracle, EquivalenceOracleChain,
    MemoEquivalenceOracle, RandomTestEquivalenceOracle, TestEquivalenceOracle,
};
pub use learner::{LearnError, Learner};
pub use oracle::{
    AutomatonSul, CachedMembershipOracle, MembershipOracle, Sul, SulMembershipOracle,
    SymbolicMembershipOracle,
};
pub use recognizable::{RecognizableLanguage, SingleMorphism, SplitTriple};
pub use table::ObservationTable;
