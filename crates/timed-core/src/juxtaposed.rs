use std::fmt;

use crate::bounds::Bound;
use crate::condition::{TimedCondition, TimedConditionSet};
use crate::zone::Zone;

/// Two zones laid out side by side in one variable space, optionally sharing
/// a common tail of variables. Renaming constraints equate variables across
/// the two halves; the juxtaposition is satisfiable exactly when the two
/// conditions are compatible under those equalities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JuxtaposedZone {
    zone: Zone,
    left_size: usize,
    right_size: usize,
}

impl JuxtaposedZone {
    /// Juxtaposes `left` and `right` over disjoint variables: variable `i` of
    /// `left` becomes `z_i`, variable `j` of `right` becomes `z_{N+j}`.
    pub fn new(left: &Zone, right: &Zone) -> Self {
        let left_size = left.num_vars();
        let right_size = right.num_vars();
        let mut zone = Zone::top(left_size + right_size + 1);
        for i in 0..left.dim() {
            for j in 0..left.dim() {
                zone.set(i, j, left.bound(i, j));
            }
        }
        for i in 0..right_size {
            for j in 0..right_size {
                zone.set(left.dim() + i, left.dim() + j, right.bound(1 + i, 1 + j));
            }
            zone.set(0, left.dim() + i, right.bound(0, 1 + i));
            zone.set(left.dim() + i, 0, right.bound(1 + i, 0));
        }
        zone.canonize();
        Self {
            zone,
            left_size,
            right_size,
        }
    }

    /// Juxtaposes two zones whose last `common` variables coincide: the
    /// shared block carries the intersection of both constraints and only the
    /// unique prefix of `right` gets fresh variables.
    pub fn with_shared(left: &Zone, right: &Zone, common: usize) -> Self {
        let m = left.num_vars();
        let n = right.num_vars();
        let l = common;
        debug_assert!(l <= m && l <= n);
        let result_vars = m + n - l;
        let common_begin = m - l + 1;
        let common_begin_right = n - l + 1;
        let right_begin = m + 1;
        let mut zone = Zone::top(result_vars + 1);

        for i in 0..left.dim() {
            for j in 0..left.dim() {
                zone.set(i, j, left.bound(i, j));
            }
        }
        let tighten = |zone: &mut Zone, i: usize, j: usize, bound: Bound| {
            if bound < zone.bound(i, j) {
                zone.set(i, j, bound);
            }
        };
        for i in 0..l {
            for j in 0..l {
                tighten(
                    &mut zone,
                    common_begin + i,
                    common_begin + j,
                    right.bound(common_begin_right + i, common_begin_right + j),
                );
            }
            tighten(&mut zone, 0, common_begin + i, right.bound(0, common_begin_right + i));
            tighten(&mut zone, common_begin + i, 0, right.bound(common_begin_right + i, 0));
        }
        for i in 0..(n - l) {
            for j in 0..(n - l) {
                zone.set(right_begin + i, right_begin + j, right.bound(1 + i, 1 + j));
            }
            zone.set(0, right_begin + i, right.bound(0, 1 + i));
            zone.set(right_begin + i, 0, right.bound(1 + i, 0));
        }
        for i in 0..(n - l) {
            for j in 0..l {
                tighten(
                    &mut zone,
                    right_begin + i,
                    common_begin + j,
                    right.bound(1 + i, common_begin_right + j),
                );
                tighten(
                    &mut zone,
                    common_begin + j,
                    right_begin + i,
                    right.bound(common_begin_right + j, 1 + i),
                );
            }
        }
        zone.canonize();
        Self {
            zone,
            left_size: m,
            right_size: n,
        }
    }

    pub fn left_size(&self) -> usize {
        self.left_size
    }

    pub fn right_size(&self) -> usize {
        self.right_size
    }

    /// Adds the equalities `left_i = right_j` for every pair of the renaming
    /// and re-canonises.
    pub fn add_renaming(&mut self, renaming: &[(usize, usize)]) {
        for &(left, right) in renaming {
            let left_index = left + 1;
            let right_index = right + self.left_size + 1;
            if Bound::zero() < self.zone.bound(left_index, right_index) {
                self.zone.set(left_index, right_index, Bound::zero());
            }
            if Bound::zero() < self.zone.bound(right_index, left_index) {
                self.zone.set(right_index, left_index, Bound::zero());
            }
        }
        self.zone.canonize();
    }

    /// The pairs `(left_i, right_j)` the canonical zone forces to be equal.
    pub fn forced_renaming(&self) -> Vec<(usize, usize)> {
        let mut result = Vec::new();
        for left in 0..self.left_size {
            for right in 0..self.right_size {
                let left_index = left + 1;
                let right_index = right + self.left_size + 1;
                if self.zone.bound(left_index, right_index) == Bound::zero()
                    && self.zone.bound(right_index, left_index) == Bound::zero()
                {
                    result.push((left, right));
                }
            }
        }
        result
    }

    /// Projects the juxtaposition onto the right-hand variables.
    pub fn right_zone(&self) -> Zone {
        let mut result = Zone::top(self.right_size + 1);
        let offset = self.left_size + 1;
        result.set(0, 0, self.zone.bound(0, 0));
        for i in 0..self.right_size {
            result.set(0, i + 1, self.zone.bound(0, offset + i));
            result.set(i + 1, 0, self.zone.bound(offset + i, 0));
            for j in 0..self.right_size {
                result.set(i + 1, j + 1, self.zone.bound(offset + i, offset + j));
            }
        }
        result
    }

    pub fn is_satisfiable(&mut self) -> bool {
        self.zone.is_satisfiable()
    }

    pub fn is_satisfiable_no_canonize(&self) -> bool {
        self.zone.is_satisfiable_no_canonize()
    }

    pub fn canonize(&mut self) {
        self.zone.canonize();
    }

    /// A concrete valuation of the combined variable space.
    pub fn sample(&mut self) -> Vec<f64> {
        self.zone.sample()
    }

    pub fn strict_equal(&self, other: &JuxtaposedZone) -> bool {
        self.zone.strict_equal(&other.zone)
    }
}

impl fmt::Display for JuxtaposedZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.zone.fmt(f)
    }
}

/// The juxtaposition of a non-convex condition set against a single
/// condition, one juxtaposed zone per member.
#[derive(Debug, Clone)]
pub struct JuxtaposedZoneSet {
    zones: Vec<JuxtaposedZone>,
}

impl JuxtaposedZoneSet {
    /// Juxtaposes every member of `left` against `right`, identifying the
    /// last `common` variables.
    pub fn from_left_set(
        left: &TimedConditionSet,
        right: &TimedCondition,
        common: usize,
    ) -> Self {
        Self {
            zones: left
                .iter()
                .map(|condition| condition.juxtapose_right(right, common))
                .collect(),
        }
    }

    /// Juxtaposes `left` against every member of `right`, identifying the
    /// last `common` variables.
    pub fn from_right_set(
        left: &TimedCondition,
        right: &TimedConditionSet,
        common: usize,
    ) -> Self {
        Self {
            zones: right
                .iter()
                .map(|condition| condition.juxtapose_left(left, common))
                .collect(),
        }
    }

    /// Adds renaming constraints to every member, dropping the ones that
    /// become unsatisfiable.
    pub fn add_renaming(&mut self, renaming: &[(usize, usize)]) {
        self.zones.retain_mut(|zone| {
            zone.add_renaming(renaming);
            zone.is_satisfiable_no_canonize()
        });
    }
}

impl PartialEq for JuxtaposedZoneSet {
    fn eq(&self, other: &Self) -> bool {
        self.zones.len() == other.zones.len()
            && self.zones.iter().all(|zone| {
                other.zones.iter().any(|other_zone| zone.strict_equal(other_zone))
            })
    }
}

impl Eq for JuxtaposedZoneSet {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::Bound;

    #[test]
    fn renaming_forces_equal_values() {
        let left = TimedCondition::make_exact(&[1.0]);
        let right = TimedCondition::top(1);
        let mut juxtaposed = left.juxtapose(&right);
        juxtaposed.add_renaming(&[(0, 0)]);
        let projected = juxtaposed.right_zone();
        assert_eq!(projected.bound(1, 0), Bound::new(1.0, true));
        assert_eq!(projected.bound(0, 1), Bound::new(-1.0, true));
    }

    #[test]
    fn contradictory_renaming_is_unsatisfiable() {
        let left = TimedCondition::make_exact(&[1.0]);
        let right = TimedCondition::make_exact(&[3.0]);
        let mut juxtaposed = left.juxtapose(&right);
        juxtaposed.add_renaming(&[(0, 0)]);
        assert!(!juxtaposed.is_satisfiable());
    }

    #[test]
    fn forced_renaming_detects_implicit_equalities() {
        // Left: T_{0,1} = 2 with τ1 free; right: τ'0 = 2. Equating the two
        // word-initial variables pins right τ'0 to left T_{0,1}.
        let left = TimedCondition::make_exact(&[2.5, 0.5]);
        let right = TimedCondition::make_exact(&[2.5]);
        let mut juxtaposed = left.juxtapose(&right);
        juxtaposed.add_renaming(&[(0, 0)]);
        assert!(juxtaposed.forced_renaming().contains(&(0, 0)));
    }

    #[test]
    fn shared_tail_intersects_both_conditions() {
        // Both halves constrain the same single shared variable.
        let mut left = TimedCondition::top(1);
        left.restrict_lower_bound(0, 0, Bound::new(-1.0, true), true);
        let mut right = TimedCondition::top(1);
        right.restrict_upper_bound(0, 0, Bound::new(2.0, true), true);
        let mut juxtaposed = left.juxtapose_right(&right, 1);
        assert!(juxtaposed.is_satisfiable());

        // Incompatible bounds on the shared variable are detected.
        let mut tight = TimedCondition::top(1);
        tight.restrict_upper_bound(0, 0, Bound::new(0.5, false), true);
        let mut contradictory = left.juxtapose_right(&tight, 1);
        assert!(!contradictory.is_satisfiable());
    }
}
