use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::bounds::{Bound, is_point};
use crate::constraint::{Constraint, ConstraintOrder, ResetValue, Resets};

/// A zone of clock valuations as a canonical difference-bound matrix.
///
/// Row and column 0 are the constant-zero anchor; clock `x` of the caller is
/// node `x + 1`. Entry `(i, j)` is the tightest bound on `node_i - node_j`, so
/// `(x + 1, 0)` carries the upper bound of clock `x` and `(0, x + 1)` its
/// negated lower bound.
#[derive(Debug, Clone)]
pub struct Zone {
    dim: usize,
    value: Vec<Bound>,
    /// Per-clock maximum constants used by extrapolation.
    pub max_constants: Vec<f64>,
    /// The global normalisation threshold.
    pub m: Bound,
}

impl Zone {
    /// The zone of `size - 1` clocks where every node equals zero.
    pub fn zero(size: usize) -> Self {
        Self {
            dim: size,
            value: vec![Bound::zero(); size * size],
            max_constants: Vec::new(),
            m: Bound::unbounded(),
        }
    }

    /// The unconstrained zone over `size - 1` clocks.
    pub fn top(size: usize) -> Self {
        Self {
            dim: size,
            value: vec![Bound::unbounded(); size * size],
            max_constants: Vec::new(),
            m: Bound::unbounded(),
        }
    }

    /// The zone containing exactly the given valuation.
    pub fn from_valuation(valuation: &[f64], m: Bound) -> Self {
        let mut zone = Zone::top(valuation.len() + 1);
        zone.m = m;
        zone.max_constants = vec![m.constant(); valuation.len()];
        for (clock, &value) in valuation.iter().enumerate() {
            zone.tighten(Some(clock), None, Bound::new(value, true));
            zone.tighten(None, Some(clock), Bound::new(-value, true));
        }
        zone
    }

    /// The number of clock variables (excluding the anchor node).
    pub fn num_vars(&self) -> usize {
        self.dim - 1
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    #[inline]
    pub(crate) fn at(&self, i: usize, j: usize) -> Bound {
        self.value[i * self.dim + j]
    }

    #[inline]
    pub(crate) fn set(&mut self, i: usize, j: usize, bound: Bound) {
        self.value[i * self.dim + j] = bound;
    }

    /// Reads the matrix entry with anchor-aware indexing.
    pub fn bound(&self, i: usize, j: usize) -> Bound {
        self.at(i, j)
    }

    /// One Floyd–Warshall pivot step through node `x`.
    pub fn close1(&mut self, x: usize) {
        for i in 0..self.dim {
            let via = self.at(i, x);
            for j in 0..self.dim {
                let candidate = via + self.at(x, j);
                if candidate < self.at(i, j) {
                    self.set(i, j, candidate);
                }
            }
        }
    }

    /// Restores canonical form by pivoting through every node.
    pub fn canonize(&mut self) {
        for k in 0..self.dim {
            self.close1(k);
        }
    }

    /// Adds the constraint `x - y ⋈ c`, where `None` denotes the anchor, and
    /// re-closes the two touched nodes.
    pub fn tighten(&mut self, x: Option<usize>, y: Option<usize>, bound: Bound) {
        let i = x.map_or(0, |x| x + 1);
        let j = y.map_or(0, |y| y + 1);
        if bound < self.at(i, j) {
            self.set(i, j, bound);
        }
        self.close1(i);
        self.close1(j);
    }

    /// Adds one guard atom of a timed automaton.
    pub fn tighten_constraint(&mut self, constraint: &Constraint) {
        let c = constraint.constant as f64;
        match constraint.order {
            ConstraintOrder::Ge => self.tighten(None, Some(constraint.clock), Bound::new(-c, true)),
            ConstraintOrder::Gt => self.tighten(None, Some(constraint.clock), Bound::new(-c, false)),
            ConstraintOrder::Le => self.tighten(Some(constraint.clock), None, Bound::new(c, true)),
            ConstraintOrder::Lt => self.tighten(Some(constraint.clock), None, Bound::new(c, false)),
        }
    }

    /// Adds a whole guard.
    pub fn tighten_guard(&mut self, guard: &[Constraint]) {
        for constraint in guard {
            self.tighten_constraint(constraint);
        }
    }

    /// Removes every constraint involving clock `x`.
    pub fn unconstrain(&mut self, x: usize) {
        let node = x + 1;
        for i in 0..self.dim {
            self.set(i, node, Bound::unbounded());
            self.set(node, i, Bound::unbounded());
        }
    }

    /// Applies the reset sequence in order, re-canonising after each step.
    pub fn apply_resets(&mut self, resets: &Resets) {
        for (clock, value) in resets {
            self.unconstrain(*clock);
            match value {
                ResetValue::Clock(source) => {
                    if source != clock {
                        self.set(*clock + 1, *source + 1, Bound::zero());
                        self.set(*source + 1, *clock + 1, Bound::zero());
                    }
                }
                ResetValue::Constant(c) => {
                    self.set(0, *clock + 1, Bound::new(-c, true));
                    self.set(*clock + 1, 0, Bound::new(*c, true));
                }
            }
            self.canonize();
        }
    }

    /// Weakest precondition of the reset sequence: unconstrains the updated
    /// clocks in reverse order, reinstating copy equalities so the source of
    /// a copy keeps its pre-reset value.
    pub fn revert_resets(&mut self, resets: &Resets) {
        let mut reset_clocks = Vec::with_capacity(resets.len());
        let mut reverse_assignments: HashMap<usize, usize> = HashMap::new();
        for (clock, value) in resets {
            reset_clocks.push(*clock);
            if let ResetValue::Clock(source) = value {
                if source != clock {
                    reverse_assignments.insert(*source, *clock);
                }
            }
        }
        for clock in reset_clocks.into_iter().rev() {
            self.unconstrain(clock);
            if let Some(&target) = reverse_assignments.get(&clock) {
                self.set(clock + 1, target + 1, Bound::zero());
                self.set(target + 1, clock + 1, Bound::zero());
            }
            self.canonize();
        }
    }

    /// Strongest postcondition of an arbitrary (possibly zero) delay.
    pub fn elapse(&mut self) {
        for i in 1..self.dim {
            self.set(i, 0, Bound::unbounded());
        }
    }

    /// Weakest precondition of an arbitrary (possibly zero) delay.
    pub fn reverse_elapse(&mut self) {
        for j in 1..self.dim {
            self.set(0, j, Bound::zero());
        }
    }

    /// Intersection of two zones of equal dimension.
    pub fn intersection(&self, other: &Zone) -> Zone {
        assert_eq!(self.dim, other.dim);
        let mut result = self.clone();
        result.intersect_assign(other);
        result
    }

    pub fn intersect_assign(&mut self, other: &Zone) {
        assert_eq!(self.dim, other.dim);
        for (entry, bound) in self.value.iter_mut().zip(other.value.iter()) {
            if *bound < *entry {
                *entry = *bound;
            }
        }
        self.canonize();
    }

    pub fn is_satisfiable(&mut self) -> bool {
        self.canonize();
        self.is_satisfiable_no_canonize()
    }

    /// Satisfiability of a canonical zone: every cycle of length two must be
    /// non-negative.
    pub fn is_satisfiable_no_canonize(&self) -> bool {
        for i in 0..self.dim {
            for j in 0..self.dim {
                if self.at(i, j) + self.at(j, i) < Bound::zero() {
                    return false;
                }
            }
        }
        true
    }

    pub fn make_unsat(&mut self) {
        self.set(0, 0, Bound::contradiction());
    }

    /// Diagonal extrapolation against the per-clock maximum constants, after
    /// Behrmann et al.
    pub fn extrapolate(&mut self) {
        for i in 0..self.max_constants.len() {
            let max_i = self.max_constants[i];
            if self.at(i + 1, 0).constant() > max_i {
                self.set(i + 1, 0, Bound::unbounded());
            }
            if -self.at(0, i + 1).constant() > max_i {
                self.set(0, i + 1, Bound::new(-max_i, false));
            }
            for j in 0..self.max_constants.len() {
                let max_j = self.max_constants[j];
                if self.at(i + 1, j + 1).constant() > max_i
                    || -self.at(0, i + 1).constant() > max_i
                    || -self.at(0, j + 1).constant() > max_j
                {
                    self.set(i + 1, j + 1, Bound::unbounded());
                }
            }
        }
    }

    /// Resets the diagonal to the trivial bound; construction passes disturb
    /// it through elapse and unconstrain.
    pub fn normalize_diagonal(&mut self) {
        for i in 0..self.dim {
            self.set(i, i, Bound::zero());
        }
    }

    /// Whether this zone contains every valuation of `other`. Both zones must
    /// be canonical.
    pub fn includes(&self, other: &Zone) -> bool {
        assert_eq!(self.dim, other.dim);
        self.value
            .iter()
            .zip(other.value.iter())
            .all(|(mine, theirs)| theirs <= mine)
    }

    /// A concrete valuation inside the zone, choosing the midpoint of each
    /// feasible interval given the components chosen so far.
    pub fn sample(&mut self) -> Vec<f64> {
        self.canonize();
        debug_assert!(self.is_satisfiable_no_canonize());
        let n = self.num_vars();
        let mut valuation = vec![0.0; n];
        for i in 0..n {
            let lower_bound = self.at(0, i + 1);
            let upper_bound = self.at(i + 1, 0);
            if is_point(upper_bound, lower_bound) {
                valuation[i] = upper_bound.constant();
                continue;
            }
            let mut lower = (-lower_bound.constant()).max(0.0);
            let mut upper = upper_bound.constant();
            for j in 0..i {
                let pair_lower = self.at(j + 1, i + 1);
                let pair_upper = self.at(i + 1, j + 1);
                lower = lower.max(-pair_lower.constant() + valuation[j]);
                upper = upper.min(pair_upper.constant() + valuation[j]);
            }
            debug_assert!(lower <= upper);
            valuation[i] = if lower_bound.is_closed() {
                lower
            } else if upper - lower > 0.5 {
                lower + 0.5
            } else {
                (lower + upper) * 0.5
            };
        }
        valuation
    }

    /// Equality ignoring the diagonal entries.
    pub fn strict_equal(&self, other: &Zone) -> bool {
        if self.dim != other.dim {
            return false;
        }
        for i in 0..self.dim {
            for j in 0..self.dim {
                if i != j && self.at(i, j) != other.at(i, j) {
                    return false;
                }
            }
        }
        true
    }

    pub(crate) fn hash_entries<H: Hasher>(&self, state: &mut H) {
        self.dim.hash(state);
        for i in 0..self.dim {
            for j in 0..self.dim {
                if i != j {
                    self.at(i, j).hash(state);
                }
            }
        }
    }
}

/// Matrix equality, as used for zone-graph state identification. The diagonal
/// participates, so construction code normalises it first.
impl PartialEq for Zone {
    fn eq(&self, other: &Self) -> bool {
        self.dim == other.dim && self.value == other.value
    }
}

impl Eq for Zone {}

impl Hash for Zone {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash_entries(state);
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in 0..self.dim {
            for j in 0..self.dim {
                write!(f, "{} ", self.at(i, j))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonical_invariant(zone: &Zone) -> bool {
        for i in 0..zone.dim() {
            for j in 0..zone.dim() {
                for k in 0..zone.dim() {
                    if zone.at(i, k) + zone.at(k, j) < zone.at(i, j) {
                        return false;
                    }
                }
            }
        }
        true
    }

    #[test]
    fn tighten_keeps_canonical_form() {
        let mut zone = Zone::top(3);
        zone.tighten(Some(0), None, Bound::new(2.0, true));
        zone.tighten(None, Some(0), Bound::new(-1.0, false));
        zone.tighten(Some(1), Some(0), Bound::new(1.0, true));
        assert!(canonical_invariant(&zone));
        // x1 - x0 <= 1 and x0 <= 2 imply x1 <= 3
        assert_eq!(zone.at(2, 0), Bound::new(3.0, true));
    }

    #[test]
    fn unsatisfiable_after_contradictory_bounds() {
        let mut zone = Zone::top(2);
        zone.tighten(Some(0), None, Bound::new(1.0, true));
        zone.tighten(None, Some(0), Bound::new(-2.0, true));
        assert!(!zone.is_satisfiable());
    }

    #[test]
    fn constant_reset_pins_the_clock() {
        let mut zone = Zone::from_valuation(&[1.5, 3.0], Bound::unbounded());
        zone.apply_resets(&vec![(0, ResetValue::Constant(0.0))]);
        assert_eq!(zone.at(1, 0), Bound::zero());
        assert_eq!(zone.at(0, 1), Bound::zero());
        // x1 keeps its value
        assert_eq!(zone.at(2, 0), Bound::new(3.0, true));
        assert!(canonical_invariant(&zone));
    }

    #[test]
    fn copy_reset_equates_clocks() {
        let mut zone = Zone::from_valuation(&[1.0, 3.0], Bound::unbounded());
        zone.apply_resets(&vec![(0, ResetValue::Clock(1))]);
        assert_eq!(zone.at(1, 2), Bound::zero());
        assert_eq!(zone.at(2, 1), Bound::zero());
        assert_eq!(zone.at(1, 0), Bound::new(3.0, true));
    }

    #[test]
    fn elapse_unbinds_upper_bounds_only() {
        let mut zone = Zone::from_valuation(&[1.0, 2.0], Bound::unbounded());
        zone.elapse();
        zone.canonize();
        assert!(zone.at(1, 0).is_unbounded());
        // Differences survive the delay
        assert_eq!(zone.at(2, 1), Bound::new(1.0, true));
        assert_eq!(zone.at(1, 2), Bound::new(-1.0, true));
    }

    #[test]
    fn reverted_reset_recovers_the_precondition() {
        let resets: Resets = vec![(0, ResetValue::Constant(0.0))];
        let mut zone = Zone::from_valuation(&[2.0, 3.0], Bound::unbounded());
        zone.apply_resets(&resets);
        zone.revert_resets(&resets);
        // x0 is free again, x1 still pinned
        assert!(zone.at(1, 0).is_unbounded());
        assert_eq!(zone.at(2, 0), Bound::new(3.0, true));
        assert!(zone.is_satisfiable());
    }

    #[test]
    fn inclusion_is_a_partial_order() {
        let mut small = Zone::from_valuation(&[1.0], Bound::unbounded());
        let mut large = Zone::top(2);
        large.tighten(Some(0), None, Bound::new(5.0, true));
        large.canonize();
        small.canonize();
        assert!(large.includes(&small));
        assert!(!small.includes(&large));
        assert!(large.includes(&large));
    }

    #[test]
    fn sample_lies_in_the_zone() {
        let mut zone = Zone::top(3);
        zone.tighten(None, Some(0), Bound::new(-1.0, false));
        zone.tighten(Some(0), None, Bound::new(2.0, false));
        zone.tighten(Some(1), Some(0), Bound::new(0.0, true));
        zone.tighten(Some(0), Some(1), Bound::new(1.0, true));
        let valuation = zone.sample();
        assert!(valuation[0] > 1.0 && valuation[0] < 2.0);
        assert!(valuation[1] <= valuation[0] && valuation[0] - valuation[1] <= 1.0);
    }

    #[test]
    fn extrapolation_drops_large_bounds() {
        let mut zone = Zone::from_valuation(&[7.0], Bound::new(2.0, true));
        zone.max_constants = vec![2.0];
        zone.extrapolate();
        assert!(zone.at(1, 0).is_unbounded());
        assert_eq!(zone.at(0, 1), Bound::new(-2.0, false));
    }
}
