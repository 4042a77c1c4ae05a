//! Value types for symbolic reasoning about timed languages.
//!
//! This crate provides the algebra an active timed-automata learner is built
//! on: extended [`bounds::Bound`]s and canonical difference-bound matrices
//! ([`zone::Zone`]), [`condition::TimedCondition`]s over the tail sums of a
//! timed word, orders on fractional parts ([`fractional::FractionalOrder`]),
//! elementary languages and their forward/backward regional refinements, and
//! clock [`renaming::RenamingRelation`]s between regions.

pub mod bounds;
pub mod condition;
pub mod constraint;
pub mod elementary;
pub mod fractional;
pub mod juxtaposed;
pub mod regional;
pub mod renaming;
pub mod word;
pub mod zone;

pub use bounds::Bound;
pub use condition::{TimedCondition, TimedConditionSet};
pub use constraint::{ClockVariable, Constraint, ConstraintOrder, ResetValue, Resets};
pub use elementary::ElementaryLanguage;
pub use fractional::FractionalOrder;
pub use juxtaposed::{JuxtaposedZone, JuxtaposedZoneSet};
pub use regional::{BackwardRegionalElementaryLanguage, ForwardRegionalElementaryLanguage};
pub use renaming::RenamingRelation;
pub use word::{Action, TimedWord, UNOBSERVABLE};
pub use zone::Zone;
