use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use indexmap::IndexMap;
use itertools::Itertools;
use tracing::trace;

use crate::bounds::{Bound, IntBound, is_int_simple};

/// Index of a clock variable. Clock `i` of a location tracks the time elapsed
/// since the `i`-th event of the word reaching it.
pub type ClockVariable = usize;

/// Comparison operator of an atomic clock constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConstraintOrder {
    Lt,
    Le,
    Ge,
    Gt,
}

/// An atomic constraint `x ⋈ c` appearing in a transition guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Constraint {
    pub clock: ClockVariable,
    pub order: ConstraintOrder,
    pub constant: i64,
}

impl Constraint {
    pub fn lt(clock: ClockVariable, constant: i64) -> Self {
        Self {
            clock,
            order: ConstraintOrder::Lt,
            constant,
        }
    }

    pub fn le(clock: ClockVariable, constant: i64) -> Self {
        Self {
            clock,
            order: ConstraintOrder::Le,
            constant,
        }
    }

    pub fn ge(clock: ClockVariable, constant: i64) -> Self {
        Self {
            clock,
            order: ConstraintOrder::Ge,
            constant,
        }
    }

    pub fn gt(clock: ClockVariable, constant: i64) -> Self {
        Self {
            clock,
            order: ConstraintOrder::Gt,
            constant,
        }
    }

    pub fn satisfies(&self, value: f64) -> bool {
        let c = self.constant as f64;
        match self.order {
            ConstraintOrder::Lt => value < c,
            ConstraintOrder::Le => value <= c,
            ConstraintOrder::Ge => value >= c,
            ConstraintOrder::Gt => value > c,
        }
    }

    pub fn satisfies_valuation(&self, valuation: &[f64]) -> bool {
        self.satisfies(valuation[self.clock])
    }

    pub fn is_upper_bound(&self) -> bool {
        matches!(self.order, ConstraintOrder::Lt | ConstraintOrder::Le)
    }

    pub fn negate(&self) -> Constraint {
        let order = match self.order {
            ConstraintOrder::Lt => ConstraintOrder::Ge,
            ConstraintOrder::Le => ConstraintOrder::Gt,
            ConstraintOrder::Ge => ConstraintOrder::Lt,
            ConstraintOrder::Gt => ConstraintOrder::Le,
        };
        Constraint {
            clock: self.clock,
            order,
            constant: self.constant,
        }
    }

    /// `self` is weaker than `other` when every valuation satisfying `other`
    /// satisfies `self`. Bounds of different clocks or different directions
    /// are incomparable.
    pub fn is_weaker(&self, other: &Constraint) -> bool {
        if self.clock != other.clock {
            return false;
        }
        self.is_upper_bound() == other.is_upper_bound()
            && other.to_dbm_bound() <= self.to_dbm_bound()
    }

    /// The constraint as a DBM entry: upper bounds become `x - 0 ≤ c`, lower
    /// bounds become `0 - x ≤ -c`.
    pub fn to_dbm_bound(&self) -> Bound {
        match self.order {
            ConstraintOrder::Le => Bound::new(self.constant as f64, true),
            ConstraintOrder::Lt => Bound::new(self.constant as f64, false),
            ConstraintOrder::Ge => Bound::new(-(self.constant as f64), true),
            ConstraintOrder::Gt => Bound::new(-(self.constant as f64), false),
        }
    }

    pub fn to_int_bound(&self) -> IntBound {
        match self.order {
            ConstraintOrder::Le | ConstraintOrder::Ge => (self.constant, true),
            ConstraintOrder::Lt | ConstraintOrder::Gt => (self.constant, false),
        }
    }

    /// The least delay after which this constraint holds from `valuation`,
    /// or `None` when no delay can ever satisfy it. Strict lower bounds
    /// report the boundary delay; callers re-check the guard after elapsing.
    pub fn delay_to_satisfy(&self, valuation: &[f64]) -> Option<f64> {
        let value = valuation[self.clock];
        match self.order {
            ConstraintOrder::Lt | ConstraintOrder::Le => {
                if self.satisfies(value) { Some(0.0) } else { None }
            }
            ConstraintOrder::Ge | ConstraintOrder::Gt => {
                Some((self.constant as f64 - value).max(0.0))
            }
        }
    }

    fn from_bound(clock: ClockVariable, bound: IntBound, upper: bool) -> Constraint {
        match (upper, bound.1) {
            (true, true) => Constraint::le(clock, bound.0),
            (true, false) => Constraint::lt(clock, bound.0),
            (false, true) => Constraint::ge(clock, bound.0),
            (false, false) => Constraint::gt(clock, bound.0),
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let order = match self.order {
            ConstraintOrder::Lt => "<",
            ConstraintOrder::Le => "<=",
            ConstraintOrder::Ge => ">=",
            ConstraintOrder::Gt => ">",
        };
        write!(f, "x{} {} {}", self.clock, order, self.constant)
    }
}

/// Renders a conjunctive guard as `x0 > 1, x1 <= 2`.
pub fn display_guard(guard: &[Constraint]) -> String {
    guard.iter().map(|c| c.to_string()).join(", ")
}

/// `left` is weaker than `right` when every atom of `left` is implied by some
/// atom of `right`.
pub fn guard_is_weaker(left: &[Constraint], right: &[Constraint]) -> bool {
    left.iter()
        .all(|l| right.iter().any(|r| l.is_weaker(r)))
}

pub fn negate_all(constraints: &[Constraint]) -> Vec<Constraint> {
    constraints.iter().map(Constraint::negate).collect()
}

pub fn conjunction(left: &[Constraint], right: &[Constraint]) -> Vec<Constraint> {
    let mut result = left.to_vec();
    result.extend_from_slice(right);
    result
}

/// The tightest upper and (negated as-given) lower integer bound per clock.
/// Unmentioned clocks get `< ∞` and `≥ 0`.
pub fn to_bounds(constraints: &[Constraint]) -> (Vec<IntBound>, Vec<IntBound>) {
    let mut uppers: Vec<IntBound> = Vec::new();
    let mut lowers: Vec<IntBound> = Vec::new();
    let resize = |uppers: &mut Vec<IntBound>, lowers: &mut Vec<IntBound>, clock: usize| {
        while uppers.len() <= clock {
            uppers.push((i64::MAX, false));
            lowers.push((0, true));
        }
    };
    for constraint in constraints {
        resize(&mut uppers, &mut lowers, constraint.clock);
        let bound = constraint.to_int_bound();
        if constraint.is_upper_bound() {
            if uppers[constraint.clock] > bound {
                uppers[constraint.clock] = bound;
            }
        } else if (-lowers[constraint.clock].0, lowers[constraint.clock].1)
            > (-bound.0, bound.1)
        {
            lowers[constraint.clock] = bound;
        }
    }
    (uppers, lowers)
}

/// Clocks pinned by the guard to a point or a unit open interval, ascending.
pub fn simple_variables(constraints: &[Constraint]) -> Vec<ClockVariable> {
    let (uppers, lowers) = to_bounds(constraints);
    uppers
        .iter()
        .zip(lowers.iter())
        .enumerate()
        .filter(|(_, (upper, lower))| is_int_simple(**upper, **lower))
        .map(|(clock, _)| clock)
        .collect()
}

pub fn satisfiable(constraints: &[Constraint]) -> bool {
    let (uppers, lowers) = to_bounds(constraints);
    uppers.iter().zip(lowers.iter()).all(|(upper, lower)| {
        lower.0 < upper.0 || (lower.0 == upper.0 && lower.1 && upper.1)
    })
}

/// Collapses a guard to the tightest lower and upper bound per clock.
pub fn simplify(constraints: &[Constraint]) -> Vec<Constraint> {
    let (uppers, lowers) = to_bounds(constraints);
    let mut result = Vec::with_capacity(uppers.len() + lowers.len());
    for (clock, lower) in lowers.iter().enumerate() {
        if *lower != (0, true) {
            result.push(Constraint::from_bound(clock, *lower, false));
        }
    }
    for (clock, upper) in uppers.iter().enumerate() {
        if *upper != (i64::MAX, false) {
            result.push(Constraint::from_bound(clock, *upper, true));
        }
    }
    result
}

/// Negates a DNF of guards into DNF, distributing the intermediate CNF and
/// pruning clauses subsumed by a weaker one.
pub fn negate_dnf(dnf: &[Vec<Constraint>]) -> Vec<Vec<Constraint>> {
    let cnf: Vec<Vec<Constraint>> = dnf.iter().map(|g| negate_all(g)).collect();
    let mut result: Vec<Vec<Constraint>> = Vec::new();
    let mut initial = true;
    for disjunct in &cnf {
        if disjunct.is_empty() {
            continue;
        }
        if initial {
            result = disjunct.iter().map(|c| vec![*c]).collect();
            initial = false;
            continue;
        }
        let mut next: Vec<Vec<Constraint>> = Vec::new();
        for constraint in disjunct {
            for conjunct in &result {
                let mut extended = conjunct.clone();
                extended.push(*constraint);
                if satisfiable(&extended) {
                    next.push(simplify(&extended));
                }
            }
        }
        let mut pruned: Vec<Vec<Constraint>> = Vec::new();
        for (index, clause) in next.iter().enumerate() {
            let subsumed = next.iter().enumerate().any(|(other_index, other)| {
                if other_index == index {
                    return false;
                }
                if guard_is_weaker(other, clause) {
                    trace!(
                        "{} is weaker than {}",
                        display_guard(other),
                        display_guard(clause)
                    );
                    true
                } else {
                    false
                }
            });
            if !subsumed {
                pruned.push(clause.clone());
            }
        }
        result = pruned;
    }
    result
}

/// The strongest guard weaker than every input guard: per `(clock, side)` the
/// loosest bound, dropping clocks not bounded on that side in every input.
pub fn union_hull(guards: &[Vec<Constraint>]) -> Vec<Constraint> {
    let mut as_bounds: IndexMap<(ClockVariable, bool), Bound> = IndexMap::new();
    for (index, guard) in guards.iter().enumerate() {
        let bounded: HashSet<(ClockVariable, bool)> = guard
            .iter()
            .map(|c| (c.clock, c.is_upper_bound()))
            .collect();
        for constraint in guard {
            let key = (constraint.clock, constraint.is_upper_bound());
            match as_bounds.get_mut(&key) {
                Some(bound) => *bound = (*bound).max(constraint.to_dbm_bound()),
                None if index == 0 => {
                    as_bounds.insert(key, constraint.to_dbm_bound());
                }
                None => {}
            }
        }
        as_bounds.retain(|key, _| bounded.contains(key));
    }

    let result: Vec<Constraint> = as_bounds
        .iter()
        .map(|(&(clock, upper), bound)| {
            let constant = if upper {
                bound.constant()
            } else {
                -bound.constant()
            };
            Constraint::from_bound(clock, (constant as i64, bound.is_closed()), upper)
        })
        .collect();
    debug_assert!(guards.iter().all(|guard| guard_is_weaker(&result, guard)));
    result
}

pub fn union_hull2(left: &[Constraint], right: &[Constraint]) -> Vec<Constraint> {
    union_hull(&[left.to_vec(), right.to_vec()])
}

/// Completes a guard whose clock only has a lower bound with the matching
/// upper bound, turning `x >= c` into `x >= c, x <= c` and `x > c` into
/// `x > c, x < c + 1`.
pub fn add_upper_bound(guard: &mut Vec<Constraint>) {
    let mut per_clock: IndexMap<ClockVariable, Vec<Constraint>> = IndexMap::new();
    for constraint in guard.iter() {
        per_clock.entry(constraint.clock).or_default().push(*constraint);
    }
    for (clock, constraints) in per_clock {
        if constraints.len() == 1 && !constraints[0].is_upper_bound() {
            if constraints[0].order == ConstraintOrder::Ge {
                guard.push(Constraint::le(clock, constraints[0].constant));
            } else {
                guard.push(Constraint::lt(clock, constraints[0].constant + 1));
            }
        }
    }
}

/// The least delay after which the whole guard can hold from `valuation`, or
/// `None` when waiting can never make it true.
pub fn delay_to_satisfy(guard: &[Constraint], valuation: &[f64]) -> Option<f64> {
    let mut delay: f64 = 0.0;
    for constraint in guard {
        // An upper bound already violated at the required delay rules the
        // guard out; clocks only grow with time.
        let needed = constraint.delay_to_satisfy(valuation)?;
        delay = delay.max(needed);
    }
    for constraint in guard {
        if constraint.is_upper_bound()
            && !constraint.satisfies(valuation[constraint.clock] + delay)
        {
            return None;
        }
    }
    Some(delay)
}

/// The value a clock is set to by a reset: a rational constant or a copy of
/// another clock.
#[derive(Debug, Clone, Copy)]
pub enum ResetValue {
    Constant(f64),
    Clock(ClockVariable),
}

impl PartialEq for ResetValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ResetValue::Constant(a), ResetValue::Constant(b)) => a == b,
            (ResetValue::Clock(a), ResetValue::Clock(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ResetValue {}

impl Hash for ResetValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            ResetValue::Constant(c) => {
                0u8.hash(state);
                (c + 0.0).to_bits().hash(state);
            }
            ResetValue::Clock(x) => {
                1u8.hash(state);
                x.hash(state);
            }
        }
    }
}

impl ResetValue {
    /// A constant reset to a non-integer value makes the clock imprecise.
    pub fn is_integer_constant(&self) -> bool {
        matches!(self, ResetValue::Constant(c) if *c == c.floor())
    }
}

impl fmt::Display for ResetValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResetValue::Constant(c) => write!(f, "{c}"),
            ResetValue::Clock(x) => write!(f, "x{x}"),
        }
    }
}

/// The ordered reset list of a transition.
pub type Resets = Vec<(ClockVariable, ResetValue)>;

/// Drops identity copies and keeps the first assignment per clock.
pub fn clean_resets(resets: Resets) -> Resets {
    let mut seen: HashSet<ClockVariable> = HashSet::new();
    resets
        .into_iter()
        .filter(|(clock, value)| {
            if matches!(value, ResetValue::Clock(source) if source == clock) {
                return false;
            }
            seen.insert(*clock)
        })
        .collect()
}

/// Renders a reset list as `x0 := 0, x1 := x2`.
pub fn display_resets(resets: &[(ClockVariable, ResetValue)]) -> String {
    resets
        .iter()
        .map(|(clock, value)| format!("x{clock} := {value}"))
        .join(", ")
}

/// Applies a reset list to a concrete valuation, reading sources from the
/// pre-reset valuation.
pub fn apply_resets_to_valuation(valuation: &mut [f64], resets: &[(ClockVariable, ResetValue)]) {
    let old = valuation.to_vec();
    for (clock, value) in resets {
        if *clock >= valuation.len() {
            continue;
        }
        valuation[*clock] = match value {
            ResetValue::Constant(c) => *c,
            ResetValue::Clock(source) => old[*source],
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weakness_is_reflexive_and_transitive() {
        let g1 = vec![Constraint::gt(0, 1)];
        let g2 = vec![Constraint::gt(0, 2)];
        let g3 = vec![Constraint::gt(0, 2), Constraint::lt(0, 3)];
        assert!(guard_is_weaker(&g1, &g1));
        assert!(guard_is_weaker(&g1, &g2));
        assert!(guard_is_weaker(&g2, &g3));
        assert!(guard_is_weaker(&g1, &g3));
        assert!(!guard_is_weaker(&g2, &g1));
    }

    #[test]
    fn union_hull_dominates_inputs() {
        let guards = vec![
            vec![Constraint::gt(0, 4), Constraint::lt(0, 5), Constraint::gt(1, 2), Constraint::lt(1, 3)],
            vec![Constraint::gt(0, 5), Constraint::lt(0, 6), Constraint::gt(1, 2), Constraint::lt(1, 3)],
        ];
        let hull = union_hull(&guards);
        for guard in &guards {
            assert!(guard_is_weaker(&hull, guard));
        }
        assert!(hull.contains(&Constraint::gt(0, 4)));
        assert!(hull.contains(&Constraint::lt(0, 6)));
        assert!(hull.contains(&Constraint::gt(1, 2)));
        assert!(hull.contains(&Constraint::lt(1, 3)));
        assert_eq!(hull.len(), 4);
    }

    #[test]
    fn union_hull_drops_one_sided_clocks() {
        let guards = vec![
            vec![Constraint::gt(0, 1), Constraint::lt(1, 2)],
            vec![Constraint::gt(0, 3)],
        ];
        let hull = union_hull(&guards);
        assert_eq!(hull, vec![Constraint::gt(0, 1)]);
    }

    #[test]
    fn negation_of_dnf_is_dnf() {
        // ¬(x0 ≥ 1 ∧ x0 ≤ 2) = x0 < 1 ∨ x0 > 2
        let negated = negate_dnf(&[vec![Constraint::ge(0, 1), Constraint::le(0, 2)]]);
        assert_eq!(
            negated,
            vec![vec![Constraint::lt(0, 1)], vec![Constraint::gt(0, 2)]]
        );
    }

    #[test]
    fn satisfiability_detects_empty_interval() {
        assert!(satisfiable(&[Constraint::ge(0, 2), Constraint::le(0, 2)]));
        assert!(!satisfiable(&[Constraint::gt(0, 2), Constraint::le(0, 2)]));
        assert!(!satisfiable(&[Constraint::ge(0, 3), Constraint::lt(0, 3)]));
    }

    #[test]
    fn simple_variables_reports_pinned_clocks() {
        let guard = vec![
            Constraint::ge(0, 2),
            Constraint::le(0, 2),
            Constraint::gt(1, 0),
            Constraint::lt(1, 1),
            Constraint::gt(2, 0),
            Constraint::lt(2, 2),
        ];
        assert_eq!(simple_variables(&guard), vec![0, 1]);
    }

    #[test]
    fn clean_resets_drops_identities_and_duplicates() {
        let resets = vec![
            (1, ResetValue::Clock(1)),
            (0, ResetValue::Constant(0.0)),
            (0, ResetValue::Constant(1.0)),
            (2, ResetValue::Clock(0)),
        ];
        let cleaned = clean_resets(resets);
        assert_eq!(
            cleaned,
            vec![(0, ResetValue::Constant(0.0)), (2, ResetValue::Clock(0))]
        );
    }
}
