use std::fmt;
use std::hash::{Hash, Hasher};

use crate::bounds::{Bound, is_point, is_unit_open};
use crate::constraint::{Constraint, ResetValue, Resets};
use crate::juxtaposed::JuxtaposedZone;
use crate::zone::Zone;

/// A timed condition: a conjunction of bounds on the tail sums
/// `T_{i,j} = τ_i + τ_{i+1} + … + τ_j` of the durations of a timed word.
///
/// The backing DBM uses one variable `x_i` per position, standing for the
/// suffix sum `T_{i,N}`, so `T_{i,j} = x_i - x_{j+1}`. All low-level DBM
/// access is wrapped here.
#[derive(Debug, Clone)]
pub struct TimedCondition {
    zone: Zone,
}

impl Default for TimedCondition {
    fn default() -> Self {
        Self::empty()
    }
}

impl TimedCondition {
    /// The condition of the empty word: `τ_0 = 0`.
    pub fn empty() -> Self {
        Self {
            zone: Zone::zero(2),
        }
    }

    /// The unconstrained condition over `variables` positions.
    pub fn top(variables: usize) -> Self {
        Self {
            zone: Zone::top(variables + 1),
        }
    }

    /// The simple condition (region) containing the valuation given by the
    /// accumulated suffix sums `T_{i,N}`.
    pub fn from_accumulated(accumulated: &[f64]) -> Self {
        let mut condition = TimedCondition::top(accumulated.len());
        for i in 0..accumulated.len() {
            for j in i..accumulated.len() {
                let difference = accumulated[i]
                    - if j + 1 < accumulated.len() {
                        accumulated[j + 1]
                    } else {
                        0.0
                    };
                if difference.floor() == difference {
                    condition.restrict_upper_bound(i, j, Bound::new(difference, true), true);
                    condition.restrict_lower_bound(i, j, Bound::new(-difference, true), true);
                } else {
                    condition.restrict_upper_bound(
                        i,
                        j,
                        Bound::new(difference.floor() + 1.0, false),
                        true,
                    );
                    condition.restrict_lower_bound(
                        i,
                        j,
                        Bound::new(-difference.floor(), false),
                        true,
                    );
                }
            }
        }
        condition
    }

    /// The condition containing exactly the given accumulated valuation.
    pub fn make_exact(accumulated: &[f64]) -> Self {
        let mut condition = TimedCondition::top(accumulated.len());
        for i in 0..accumulated.len() {
            for j in i..accumulated.len() {
                let difference = accumulated[i]
                    - if j + 1 < accumulated.len() {
                        accumulated[j + 1]
                    } else {
                        0.0
                    };
                condition.restrict_upper_bound(i, j, Bound::new(difference, true), true);
                condition.restrict_lower_bound(i, j, Bound::new(-difference, true), true);
            }
        }
        condition
    }

    /// The number of variables, i.e. the word length plus one.
    pub fn size(&self) -> usize {
        self.zone.num_vars()
    }

    /// The lower bound of `T_{i,j}`, stored negated as in the DBM.
    pub fn lower_bound(&self, i: usize, j: usize) -> Bound {
        debug_assert!(i < self.size() && j < self.size());
        if j == self.size() - 1 {
            self.zone.bound(0, i + 1)
        } else {
            self.zone.bound(j + 2, i + 1)
        }
    }

    /// The upper bound of `T_{i,j}`.
    pub fn upper_bound(&self, i: usize, j: usize) -> Bound {
        debug_assert!(i < self.size() && j < self.size());
        if j == self.size() - 1 {
            self.zone.bound(i + 1, 0)
        } else {
            self.zone.bound(i + 1, j + 2)
        }
    }

    /// Tightens (or with `force` overwrites) the lower bound of `T_{i,j}`.
    pub fn restrict_lower_bound(&mut self, i: usize, j: usize, bound: Bound, force: bool) {
        let (row, column) = if j == self.size() - 1 {
            (0, i + 1)
        } else {
            (j + 2, i + 1)
        };
        let current = self.zone.bound(row, column);
        if force || bound < current {
            self.zone.set(row, column, bound);
        }
        self.zone.canonize();
    }

    /// Tightens (or with `force` overwrites) the upper bound of `T_{i,j}`.
    pub fn restrict_upper_bound(&mut self, i: usize, j: usize, bound: Bound, force: bool) {
        let (row, column) = if j == self.size() - 1 {
            (i + 1, 0)
        } else {
            (i + 1, j + 2)
        };
        let current = self.zone.bound(row, column);
        if force || bound < current {
            self.zone.set(row, column, bound);
        }
        self.zone.canonize();
    }

    /// A condition is simple when every `T_{i,j}` is a point or a unit open
    /// interval; simple conditions are regions in the Alur–Dill sense.
    pub fn is_simple(&self) -> bool {
        for i in 0..self.zone.dim() {
            for j in (i + 1)..self.zone.dim() {
                let upper = self.zone.bound(i, j);
                let lower = self.zone.bound(j, i);
                if !is_point(upper, lower) && !is_unit_open(upper, lower) {
                    return false;
                }
            }
        }
        true
    }

    /// Concatenation `Λ + Λ'`, fusing the two conditions along the shared
    /// tail variable. The result has `|Λ| + |Λ'| - 1` variables: positions of
    /// `Λ'` are shifted behind those of `Λ` and every bound crossing the seam
    /// is the sum of the two contributing tail bounds.
    pub fn concat(&self, other: &TimedCondition) -> TimedCondition {
        let n = self.size();
        let m = other.size();
        let mut result = Zone::top(n + m);
        // The block of the left condition survives unchanged.
        for i in 0..=n {
            for j in 0..=n {
                result.set(i, j, self.zone.bound(i, j));
            }
        }
        for i in (n + 1)..(n + m) {
            for row in 1..=n {
                result.set(row, i, self.zone.bound(row, 0));
            }
            for column in 1..=n {
                result.set(i, column, self.zone.bound(0, column));
            }
        }
        if m >= 2 {
            for i in 0..(m - 1) {
                for j in 0..(m - 1) {
                    result.set(n + 1 + i, n + 1 + j, other.zone.bound(2 + i, 2 + j));
                }
                result.set(n + 1 + i, 0, other.zone.bound(2 + i, 0));
                result.set(0, n + 1 + i, other.zone.bound(0, 2 + i));
            }
        }
        for column in 1..=n {
            for i in 0..(m - 1) {
                let updated = result.bound(n + 1 + i, column) + other.zone.bound(2 + i, 1);
                result.set(n + 1 + i, column, updated);
            }
        }
        for row in 1..=n {
            for i in 0..(m - 1) {
                let updated = result.bound(row, n + 1 + i) + other.zone.bound(1, 2 + i);
                result.set(row, n + 1 + i, updated);
            }
        }
        for row in 1..=n {
            let updated = result.bound(row, 0) + other.zone.bound(1, 0);
            result.set(row, 0, updated);
        }
        for column in 1..=n {
            let updated = result.bound(0, column) + other.zone.bound(0, 1);
            result.set(0, column, updated);
        }
        result.canonize();
        TimedCondition { zone: result }
    }

    /// Juxtaposes two conditions over disjoint variables.
    pub fn juxtapose(&self, other: &TimedCondition) -> JuxtaposedZone {
        JuxtaposedZone::new(&self.zone, &other.zone)
    }

    /// Juxtaposes with `right`, identifying the last `common` variables.
    pub fn juxtapose_right(&self, right: &TimedCondition, common: usize) -> JuxtaposedZone {
        JuxtaposedZone::with_shared(&self.zone, &right.zone, common)
    }

    /// Juxtaposes with `left` on the left, identifying the last `common`
    /// variables.
    pub fn juxtapose_left(&self, left: &TimedCondition, common: usize) -> JuxtaposedZone {
        JuxtaposedZone::with_shared(&left.zone, &self.zone, common)
    }

    /// Entrywise convex hull.
    pub fn convex_hull_assign(&mut self, other: &TimedCondition) {
        debug_assert_eq!(self.size(), other.size());
        for i in 0..self.zone.dim() {
            for j in 0..self.zone.dim() {
                let loosened = self.zone.bound(i, j).max(other.zone.bound(i, j));
                self.zone.set(i, j, loosened);
            }
        }
    }

    pub fn convex_hull(&self, other: &TimedCondition) -> TimedCondition {
        let mut result = self.clone();
        result.convex_hull_assign(other);
        result
    }

    /// Splits this condition into the simple conditions it covers, walking
    /// the integer staircase of every `T_{i,j}` interval.
    pub fn enumerate(&self) -> Vec<TimedCondition> {
        if self.is_simple() {
            return vec![self.clone()];
        }
        let mut simple = Vec::new();
        let mut current = vec![self.clone()];
        for i in 0..self.size() {
            for j in i..self.size() {
                let mut next = Vec::new();
                for condition in current {
                    if condition.is_simple() {
                        simple.push(condition);
                        continue;
                    }
                    let mut lower = condition.lower_bound(i, j);
                    let upper = condition.upper_bound(i, j);
                    if is_point(upper, lower) || is_unit_open(upper, lower) {
                        next.push(condition);
                        continue;
                    }
                    let mut current_upper = if lower.is_closed() {
                        -lower
                    } else {
                        Bound::new(-lower.constant() + 1.0, false)
                    };
                    while current_upper <= upper {
                        let mut restricted = condition.clone();
                        restricted.restrict_lower_bound(i, j, lower, false);
                        restricted.restrict_upper_bound(i, j, current_upper, false);
                        if lower.is_closed() {
                            current_upper = Bound::new(-lower.constant() + 1.0, false);
                            lower = Bound::new(lower.constant(), false);
                        } else {
                            current_upper = Bound::new(-lower.constant() + 1.0, true);
                            lower = Bound::new(lower.constant() - 1.0, true);
                        }
                        if restricted.is_simple() {
                            simple.push(restricted);
                        } else {
                            next.push(restricted);
                        }
                    }
                }
                current = next;
                if current.is_empty() {
                    return simple;
                }
            }
        }
        simple.extend(current.into_iter().filter(TimedCondition::is_simple));
        simple
    }

    /// The continuous successor obtained by elapsing the given variables
    /// across their next region boundary.
    pub fn successor(&self, variables: &[usize]) -> TimedCondition {
        let mut result = self.clone();
        result.successor_assign(variables);
        result
    }

    pub fn successor_assign(&mut self, variables: &[usize]) {
        for &i in variables {
            let upper = self.zone.bound(i + 1, 0);
            let lower = self.zone.bound(0, i + 1);
            if lower.is_closed() {
                self.zone
                    .set(i + 1, 0, Bound::new(upper.constant() + 1.0, false));
                self.zone.set(0, i + 1, Bound::new(lower.constant(), false));
            } else {
                self.zone.set(0, i + 1, Bound::new(lower.constant() - 1.0, true));
                self.zone.set(i + 1, 0, Bound::new(upper.constant(), true));
            }
        }
    }

    /// The continuous predecessor, rewinding the bounds of the prefix sums
    /// `T_{0,i}` of the given variables.
    pub fn predecessor(&self, variables: &[usize]) -> TimedCondition {
        let mut result = self.clone();
        let dim = result.zone.dim();
        for &i in variables {
            let row = 1;
            let column = (i + 2) % dim;
            let upper = result.zone.bound(row, column);
            let lower = result.zone.bound(column, row);
            if is_point(upper, lower) {
                result
                    .zone
                    .set(row, column, Bound::new(upper.constant() + 1.0, false));
                result
                    .zone
                    .set(column, row, Bound::new(lower.constant(), false));
            } else {
                result
                    .zone
                    .set(column, row, Bound::new(lower.constant() - 1.0, true));
                result
                    .zone
                    .set(row, column, Bound::new(upper.constant(), true));
            }
        }
        result
    }

    /// The continuous prefix: rewinds the tail sums of the given variables.
    pub fn prefix(&self, variables: &[usize]) -> TimedCondition {
        let mut result = self.clone();
        for &i in variables {
            let upper = result.zone.bound(i + 1, 0);
            let lower = result.zone.bound(0, i + 1);
            if is_point(upper, lower) {
                result.zone.set(i + 1, 0, Bound::new(upper.constant(), false));
                result
                    .zone
                    .set(0, i + 1, Bound::new(lower.constant() + 1.0, false));
            } else {
                result.zone.set(0, i + 1, Bound::new(lower.constant(), true));
                result
                    .zone
                    .set(i + 1, 0, Bound::new(upper.constant() - 1.0, true));
            }
        }
        result
    }

    /// The continuous suffix: rewinds the prefix sums of the given variables.
    pub fn suffix(&self, variables: &[usize]) -> TimedCondition {
        let mut result = self.clone();
        let last = self.size() - 1;
        for &i in variables {
            let (row, column) = if i == last { (1, 0) } else { (1, i + 2) };
            let upper = result.zone.bound(row, column);
            let lower = result.zone.bound(column, row);
            if is_point(upper, lower) {
                result.zone.set(row, column, Bound::new(upper.constant(), false));
                result
                    .zone
                    .set(column, row, Bound::new(lower.constant() + 1.0, false));
            } else {
                result.zone.set(column, row, Bound::new(lower.constant(), true));
                result
                    .zone
                    .set(row, column, Bound::new(upper.constant() - 1.0, true));
            }
        }
        result
    }

    /// Appends a fresh variable pinned to zero, as a discrete successor does.
    pub fn extend_n(&self) -> TimedCondition {
        let old_dim = self.zone.dim();
        let mut result = Zone::top(old_dim + 1);
        for i in 0..old_dim {
            for j in 0..old_dim {
                result.set(i, j, self.zone.bound(i, j));
            }
        }
        for i in 0..old_dim {
            result.set(i, old_dim, self.zone.bound(i, 0));
            result.set(old_dim, i, self.zone.bound(0, i));
        }
        result.set(old_dim, old_dim, Bound::zero());
        result.set(old_dim, 0, Bound::zero());
        result.set(0, old_dim, Bound::zero());
        TimedCondition { zone: result }
    }

    /// Drops the variable with the largest index.
    pub fn remove_n(&self) -> TimedCondition {
        let old_dim = self.zone.dim();
        let mut result = Zone::top(old_dim - 1);
        for i in 0..(old_dim - 1) {
            for j in 0..(old_dim - 1) {
                result.set(i, j, self.zone.bound(i, j));
            }
        }
        TimedCondition { zone: result }
    }

    /// Renames every `x_i` to `x_{i+1}` and prepends `x_0` equal to the old
    /// first variable, as a discrete predecessor does.
    pub fn extend_zero(&self) -> TimedCondition {
        let old_dim = self.zone.dim();
        let mut result = Zone::top(old_dim + 1);
        result.set(0, 0, Bound::zero());
        for i in 1..old_dim {
            for j in 1..old_dim {
                result.set(i + 1, j + 1, self.zone.bound(i, j));
            }
            result.set(0, i + 1, self.zone.bound(0, i));
            result.set(i + 1, 0, self.zone.bound(i, 0));
        }
        for i in 0..=old_dim {
            let from_column = result.bound(i, 2);
            result.set(i, 1, from_column);
        }
        for i in 0..=old_dim {
            let from_row = result.bound(2, i);
            result.set(1, i, from_row);
        }
        result.set(1, 2, Bound::zero());
        result.set(2, 1, Bound::zero());
        TimedCondition { zone: result }
    }

    /// Whether some tail sum `T_{i,N}` carries an equality constraint.
    pub fn has_equality_n(&self) -> bool {
        (0..self.size()).any(|i| self.zone.bound(i + 1, 0).is_closed())
    }

    /// Loosens every closed tail upper bound to infinity.
    pub fn remove_equality_upper_bound_assign(&mut self) {
        for i in 0..self.size() {
            if self.zone.bound(i + 1, 0).is_closed() {
                self.zone.set(i + 1, 0, Bound::unbounded());
            }
        }
    }

    /// Drops every tail upper bound.
    pub fn remove_upper_bound_assign(&mut self) {
        for i in 0..self.size() {
            self.zone.set(i + 1, 0, Bound::unbounded());
        }
    }

    /// Whether a continuous prefix exists, i.e. the last duration is not
    /// pinned to zero.
    pub fn has_prefix(&self) -> bool {
        let n = self.size() - 1;
        !(self.upper_bound(n, n) == Bound::zero() && self.lower_bound(n, n) == Bound::zero())
    }

    /// Whether a continuous suffix exists, i.e. the first duration is not
    /// pinned to zero.
    pub fn has_suffix(&self) -> bool {
        !(self.upper_bound(0, 0) == Bound::zero() && self.lower_bound(0, 0) == Bound::zero())
    }

    /// The variables whose bounds are strictly tighter than in
    /// `original`, among the first `examined` variables.
    pub fn strictly_constrained_variables(
        &self,
        original: &TimedCondition,
        examined: usize,
    ) -> Vec<usize> {
        let mut result = Vec::new();
        for variable in 1..=examined {
            let differs = (0..self.zone.dim()).any(|k| {
                self.zone.bound(k, variable) != original.zone.bound(k, variable)
                    || self.zone.bound(variable, k) != original.zone.bound(variable, k)
            });
            if differs {
                result.push(variable - 1);
            }
        }
        result
    }

    /// The guard over clocks `x_i = T_{i,N}` describing this condition.
    pub fn to_guard(&self) -> Vec<Constraint> {
        let n = self.size();
        let mut result = Vec::with_capacity(n * 2);
        for i in 0..n {
            let lower = self.lower_bound(i, n - 1);
            let upper = self.upper_bound(i, n - 1);
            if !lower.is_unbounded() && lower != Bound::zero() {
                let constant = -lower.constant() as i64;
                result.push(if lower.is_closed() {
                    Constraint::ge(i, constant)
                } else {
                    Constraint::gt(i, constant)
                });
            }
            if !upper.is_unbounded() {
                let constant = upper.constant() as i64;
                result.push(if upper.is_closed() {
                    Constraint::le(i, constant)
                } else {
                    Constraint::lt(i, constant)
                });
            }
        }
        result
    }

    /// Whether `T_{i,N}` is pinned to a point.
    pub fn is_point_at(&self, i: usize) -> bool {
        is_point(
            self.upper_bound(i, self.size() - 1),
            self.lower_bound(i, self.size() - 1),
        )
    }

    pub fn includes(&self, other: &TimedCondition) -> bool {
        self.zone.includes(&other.zone)
    }

    pub fn intersection(&self, other: &TimedCondition) -> TimedCondition {
        TimedCondition {
            zone: self.zone.intersection(&other.zone),
        }
    }

    pub fn is_satisfiable(&self) -> bool {
        self.zone.clone().is_satisfiable()
    }

    pub fn is_satisfiable_no_canonize(&self) -> bool {
        self.zone.is_satisfiable_no_canonize()
    }

    /// Applies constant resets in place; copy resets are not meaningful on a
    /// same-length condition.
    pub fn apply_constant_resets(&self, resets: &Resets) -> TimedCondition {
        let mut result = self.clone();
        let last = result.size() - 1;
        for (variable, value) in resets {
            let ResetValue::Constant(constant) = value else {
                panic!("copy resets require a target dimension");
            };
            result.zone.unconstrain(*variable);
            if *constant == constant.floor() {
                result.restrict_lower_bound(*variable, last, Bound::new(-constant, true), true);
                result.restrict_upper_bound(*variable, last, Bound::new(*constant, true), true);
            } else {
                result.restrict_lower_bound(
                    *variable,
                    last,
                    Bound::new(-constant.floor(), false),
                    true,
                );
                result.restrict_upper_bound(
                    *variable,
                    last,
                    Bound::new(constant.ceil(), false),
                    true,
                );
            }
        }
        result
    }

    /// The condition over `target_size` variables reachable from this one by
    /// the given resets: constant resets pin the fresh variables, copy resets
    /// become renaming constraints, untouched variables are carried over, and
    /// the result is the projection of the juxtaposition onto the target.
    pub fn apply_resets(&self, resets: &Resets, target_size: usize) -> TimedCondition {
        let mut target = TimedCondition::top(target_size);
        let last = target_size - 1;
        let mut renaming: Vec<(usize, usize)> = Vec::new();
        for (variable, value) in resets {
            if *variable >= target_size {
                continue;
            }
            match value {
                ResetValue::Constant(constant) => {
                    if *constant == constant.floor() {
                        target.restrict_lower_bound(*variable, last, Bound::new(-constant, true), true);
                        target.restrict_upper_bound(*variable, last, Bound::new(*constant, true), true);
                    } else {
                        target.restrict_lower_bound(
                            *variable,
                            last,
                            Bound::new(-constant.floor(), false),
                            true,
                        );
                        target.restrict_upper_bound(
                            *variable,
                            last,
                            Bound::new(constant.ceil(), false),
                            true,
                        );
                    }
                    for (other, other_value) in resets {
                        if other < variable {
                            if let ResetValue::Constant(other_constant) = other_value {
                                let difference = other_constant - constant;
                                if difference == difference.floor() {
                                    target.restrict_lower_bound(
                                        *other,
                                        variable - 1,
                                        Bound::new(-difference, true),
                                        true,
                                    );
                                    target.restrict_upper_bound(
                                        *other,
                                        variable - 1,
                                        Bound::new(difference, true),
                                        true,
                                    );
                                } else {
                                    target.restrict_lower_bound(
                                        *other,
                                        variable - 1,
                                        Bound::new(-difference.floor(), false),
                                        true,
                                    );
                                    target.restrict_upper_bound(
                                        *other,
                                        variable - 1,
                                        Bound::new(difference.ceil(), false),
                                        true,
                                    );
                                }
                            }
                        }
                    }
                }
                ResetValue::Clock(source) => renaming.push((*source, *variable)),
            }
        }
        for clock in 0..target_size {
            if !resets.iter().any(|(variable, _)| *variable == clock) {
                renaming.push((clock, clock));
            }
        }
        let mut juxtaposed = self.juxtapose(&target);
        juxtaposed.add_renaming(&renaming);
        TimedCondition {
            zone: juxtaposed.right_zone(),
        }
    }
}

impl PartialEq for TimedCondition {
    fn eq(&self, other: &Self) -> bool {
        self.size() == other.size() && self.zone.strict_equal(&other.zone)
    }
}

impl Eq for TimedCondition {}

impl Hash for TimedCondition {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.zone.hash_entries(state);
    }
}

impl fmt::Display for TimedCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in 0..self.size() {
            for j in i..self.size() {
                let upper = self.upper_bound(i, j);
                let lower = self.lower_bound(i, j);
                write!(
                    f,
                    "{} {} T_{{{i}, {j}}} {} {}",
                    -lower.constant(),
                    if lower.is_closed() { "<=" } else { "<" },
                    if upper.is_closed() { "<=" } else { "<" },
                    upper.constant()
                )?;
                if i != self.size() - 1 || j != self.size() - 1 {
                    write!(f, " && ")?;
                }
            }
        }
        Ok(())
    }
}

/// A non-convex set of timed conditions over a common variable space.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimedConditionSet {
    conditions: Vec<TimedCondition>,
}

impl TimedConditionSet {
    pub fn new(condition: TimedCondition) -> Self {
        Self {
            conditions: vec![condition],
        }
    }

    /// The empty set.
    pub fn bottom() -> Self {
        Self {
            conditions: Vec::new(),
        }
    }

    /// Reduces a list of simple conditions by repeatedly merging pairs whose
    /// convex hull is exactly their union, i.e. whose hull enumerates into as
    /// many simple conditions as the pair covers.
    pub fn reduce(simple_conditions: Vec<TimedCondition>) -> Self {
        debug_assert!(simple_conditions.iter().all(TimedCondition::is_simple));
        if simple_conditions.is_empty() {
            return Self::bottom();
        }
        let mut with_size: Vec<(TimedCondition, usize)> =
            simple_conditions.into_iter().map(|c| (c, 1)).collect();
        let mut index = 0;
        while index < with_size.len() {
            let mut merged = false;
            for other in (index + 1)..with_size.len() {
                let hull = with_size[index].0.convex_hull(&with_size[other].0);
                if hull.enumerate().len() == with_size[index].1 + with_size[other].1 {
                    with_size[index].1 += with_size[other].1;
                    with_size[index].0 = hull;
                    with_size.remove(other);
                    index = 0;
                    merged = true;
                    break;
                }
            }
            if !merged {
                index += 1;
            }
        }
        Self {
            conditions: with_size.into_iter().map(|(c, _)| c).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn conditions(&self) -> &[TimedCondition] {
        &self.conditions
    }

    pub fn push(&mut self, condition: TimedCondition) {
        self.conditions.push(condition);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TimedCondition> {
        self.conditions.iter()
    }

    /// Union of the strictly-constrained variables of the members.
    pub fn strictly_constrained_variables(
        &self,
        original: &TimedCondition,
        examined: usize,
    ) -> Vec<usize> {
        let mut result = Vec::new();
        for condition in &self.conditions {
            result.extend(condition.strictly_constrained_variables(original, examined));
        }
        result
    }

    pub fn remove_equality_upper_bound_assign(&mut self) {
        for condition in &mut self.conditions {
            condition.remove_equality_upper_bound_assign();
        }
    }
}

impl IntoIterator for TimedConditionSet {
    type Item = TimedCondition;
    type IntoIter = std::vec::IntoIter<TimedCondition>;

    fn into_iter(self) -> Self::IntoIter {
        self.conditions.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_condition_is_simple_and_zero() {
        let condition = TimedCondition::empty();
        assert_eq!(condition.size(), 1);
        assert!(condition.is_simple());
        assert_eq!(condition.upper_bound(0, 0), Bound::zero());
    }

    #[test]
    fn concatenation_sums_sizes_minus_one() {
        let left = TimedCondition::from_accumulated(&[1.5, 0.5]);
        let right = TimedCondition::from_accumulated(&[0.5]);
        let result = left.concat(&right);
        assert_eq!(result.size(), left.size() + right.size() - 1);
    }

    #[test]
    fn concatenation_adds_crossing_bounds() {
        // Λ: τ0 = 1 exactly; Λ': τ0' = 1 exactly. The fused duration is 2.
        let left = TimedCondition::make_exact(&[1.0]);
        let right = TimedCondition::make_exact(&[1.0]);
        let result = left.concat(&right);
        assert_eq!(result.size(), 1);
        assert_eq!(result.upper_bound(0, 0), Bound::new(2.0, true));
        assert_eq!(result.lower_bound(0, 0), Bound::new(-2.0, true));
    }

    #[test]
    fn enumerate_splits_into_simple_regions() {
        // 0 < τ0 < 2 splits into (0,1), [1,1] and (1,2)
        let mut condition = TimedCondition::top(1);
        condition.restrict_lower_bound(0, 0, Bound::new(0.0, false), true);
        condition.restrict_upper_bound(0, 0, Bound::new(2.0, false), true);
        let simple = condition.enumerate();
        assert_eq!(simple.len(), 3);
        assert!(simple.iter().all(TimedCondition::is_simple));
        assert!(simple.iter().all(|region| condition.includes(region)));
    }

    #[test]
    fn successor_crosses_one_boundary() {
        // τ0 = 1 elapses into 1 < τ0 < 2
        let condition = TimedCondition::make_exact(&[1.0]);
        let successor = condition.successor(&[0]);
        assert_eq!(successor.upper_bound(0, 0), Bound::new(2.0, false));
        assert_eq!(successor.lower_bound(0, 0), Bound::new(-1.0, false));
        assert!(successor.is_simple());
    }

    #[test]
    fn extend_n_pins_the_new_variable() {
        let condition = TimedCondition::from_accumulated(&[0.5]).extend_n();
        assert_eq!(condition.size(), 2);
        assert_eq!(condition.upper_bound(1, 1), Bound::zero());
        assert_eq!(condition.lower_bound(1, 1), Bound::zero());
        assert_eq!(condition.remove_n().size(), 1);
    }

    #[test]
    fn extend_zero_prepends_a_zero_duration() {
        let condition = TimedCondition::from_accumulated(&[0.5]).extend_zero();
        assert_eq!(condition.size(), 2);
        // τ0 is pinned to zero, so T_{0,1} equals T_{1,1}
        assert_eq!(condition.upper_bound(0, 0), Bound::zero());
        assert_eq!(
            condition.upper_bound(0, 1),
            condition.upper_bound(1, 1)
        );
    }

    #[test]
    fn to_guard_reads_tail_bounds() {
        let mut condition = TimedCondition::top(2);
        condition.restrict_lower_bound(0, 1, Bound::new(-2.0, false), true);
        condition.restrict_upper_bound(0, 1, Bound::new(3.0, false), true);
        condition.restrict_lower_bound(1, 1, Bound::new(0.0, true), true);
        condition.restrict_upper_bound(1, 1, Bound::new(1.0, false), true);
        let guard = condition.to_guard();
        assert!(guard.contains(&Constraint::gt(0, 2)));
        assert!(guard.contains(&Constraint::lt(0, 3)));
        assert!(guard.contains(&Constraint::lt(1, 1)));
        assert!(!guard.iter().any(|c| c.clock == 1 && !c.is_upper_bound()));
    }

    #[test]
    fn reduce_merges_adjacent_regions() {
        // (0,1) and [1,1] merge into (0,1]
        let mut open = TimedCondition::top(1);
        open.restrict_lower_bound(0, 0, Bound::new(0.0, false), true);
        open.restrict_upper_bound(0, 0, Bound::new(1.0, false), true);
        let point = TimedCondition::make_exact(&[1.0]);
        let reduced = TimedConditionSet::reduce(vec![open, point]);
        assert_eq!(reduced.len(), 1);
        assert_eq!(reduced.conditions()[0].upper_bound(0, 0), Bound::new(1.0, true));
        assert_eq!(reduced.conditions()[0].lower_bound(0, 0), Bound::new(0.0, false));
    }

    #[test]
    fn apply_resets_projects_onto_the_target() {
        // From τ0 = 1, reset x1 := x0 into a two-variable condition
        let condition = TimedCondition::make_exact(&[1.0]);
        let resets: Resets = vec![(1, ResetValue::Clock(0))];
        let result = condition.apply_resets(&resets, 2);
        assert_eq!(result.size(), 2);
        // x1 inherits the value 1 of x0
        assert_eq!(result.upper_bound(1, 1), Bound::new(1.0, true));
        assert_eq!(result.lower_bound(1, 1), Bound::new(-1.0, true));
    }
}
