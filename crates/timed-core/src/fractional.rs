use std::collections::VecDeque;

/// An ordered partition of clock variables by the fractional parts of their
/// values. `[{x1, x2}, {x3}]` reads `0 = frac(x1) = frac(x2) < frac(x3)`; the
/// front bucket always holds the variables with fractional part zero and may
/// be empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FractionalOrder {
    order: VecDeque<Vec<usize>>,
    size: usize,
}

impl Default for FractionalOrder {
    fn default() -> Self {
        let mut order = VecDeque::new();
        order.push_front(vec![0]);
        Self { order, size: 1 }
    }
}

impl FractionalOrder {
    /// Groups variables by the fractional parts of their concrete values.
    pub fn from_fractional_parts(parts: &[f64]) -> Self {
        debug_assert!(parts.iter().all(|f| (0.0..1.0).contains(f)));
        let mut indexed: Vec<(f64, usize)> =
            parts.iter().copied().enumerate().map(|(i, f)| (f, i)).collect();
        indexed.sort_by(|a, b| a.0.partial_cmp(&b.0).expect("fractional parts are finite"));
        let mut order: VecDeque<Vec<usize>> = VecDeque::new();
        let mut bucket_values: Vec<f64> = Vec::new();
        for (value, index) in indexed {
            if bucket_values.last() == Some(&value) {
                order.back_mut().expect("a bucket exists").push(index);
            } else {
                order.push_back(vec![index]);
                bucket_values.push(value);
            }
        }
        if bucket_values.first() != Some(&0.0) {
            order.push_front(Vec::new());
        }
        Self {
            order,
            size: parts.len(),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    fn front_is_empty(&self) -> bool {
        self.order.front().map_or(true, Vec::is_empty)
    }

    /// The variables whose bounds elapse when moving to the successor region:
    /// the zero-fraction bucket if inhabited, otherwise the largest one.
    pub fn successor_variables(&self) -> Vec<usize> {
        if self.front_is_empty() {
            self.order.back().cloned().unwrap_or_default()
        } else {
            self.order.front().cloned().unwrap_or_default()
        }
    }

    /// Advances time across the next fractional boundary.
    pub fn successor(&self) -> FractionalOrder {
        let mut result = self.clone();
        result.successor_assign();
        result
    }

    pub fn successor_assign(&mut self) {
        if self.front_is_empty() {
            // No variable sits on an integer: the largest fractions reach one.
            if let Some(back) = self.order.pop_back() {
                self.order.pop_front();
                self.order.push_front(back);
            }
        } else {
            // The integer-valued variables move into the open interval.
            self.order.push_front(Vec::new());
        }
    }

    /// The variables whose bounds rewind when moving to the predecessor
    /// region.
    pub fn predecessor_variables(&self) -> Vec<usize> {
        if self.front_is_empty() {
            self.order.get(1).cloned().unwrap_or_default()
        } else {
            self.order.front().cloned().unwrap_or_default()
        }
    }

    /// Rewinds time across the previous fractional boundary.
    pub fn predecessor(&self) -> FractionalOrder {
        let mut result = self.clone();
        if result.front_is_empty() {
            result.order.pop_front();
        } else {
            let front = result.order.pop_front().expect("front bucket exists");
            result.order.push_front(Vec::new());
            result.order.push_back(front);
        }
        result
    }

    /// Appends a fresh variable `x_n` with fractional part zero.
    pub fn extend_n(&self) -> FractionalOrder {
        let mut result = self.clone();
        if result.order.is_empty() {
            result.order.push_front(Vec::new());
        }
        result
            .order
            .front_mut()
            .expect("front bucket exists")
            .push(result.size);
        result.size += 1;
        result
    }

    /// Shifts every variable up by one and prepends `x_0` with fractional
    /// part zero.
    pub fn extend_zero(&self) -> FractionalOrder {
        let mut result = self.clone();
        for bucket in result.order.iter_mut() {
            for variable in bucket.iter_mut() {
                *variable += 1;
            }
        }
        if result.order.is_empty() {
            result.order.push_front(Vec::new());
        }
        result
            .order
            .front_mut()
            .expect("front bucket exists")
            .insert(0, 0);
        result.size += 1;
        result
    }

    /// Removes the variable with the largest index.
    pub fn remove_n(&self) -> FractionalOrder {
        let mut result = self.clone();
        let target = result.size - 1;
        for (position, bucket) in result.order.iter_mut().enumerate() {
            if let Some(found) = bucket.iter().position(|&v| v == target) {
                bucket.remove(found);
                if bucket.is_empty() && position != 0 {
                    result.order.remove(position);
                }
                break;
            }
        }
        result.size -= 1;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successor_then_predecessor_is_identity() {
        let order = FractionalOrder::from_fractional_parts(&[0.0, 0.5]);
        assert_eq!(order.successor().predecessor(), order);
        let shifted = order.successor();
        assert_eq!(shifted.successor().predecessor(), shifted);
    }

    #[test]
    fn successor_rotates_the_largest_bucket_to_zero() {
        // frac(x0) = 0.5, frac(x1) = 0.8, nothing at zero
        let order = FractionalOrder::from_fractional_parts(&[0.5, 0.8]);
        assert_eq!(order.successor_variables(), vec![1]);
        let next = order.successor();
        // x1 reached an integer value
        assert_eq!(next.successor_variables(), vec![1]);
    }

    #[test]
    fn extend_n_joins_the_zero_bucket() {
        let order = FractionalOrder::from_fractional_parts(&[0.3]).extend_n();
        assert_eq!(order.size(), 2);
        assert_eq!(order.successor_variables(), vec![1]);
    }

    #[test]
    fn extend_zero_shifts_indices() {
        let order = FractionalOrder::from_fractional_parts(&[0.3]).extend_zero();
        assert_eq!(order.size(), 2);
        // x0 is the fresh variable at fraction zero, the old one is now x1
        assert_eq!(order.successor_variables(), vec![0]);
        assert_eq!(order.remove_n().size(), 1);
    }

    #[test]
    fn grouping_by_equal_fractions() {
        let order = FractionalOrder::from_fractional_parts(&[0.5, 0.0, 0.5]);
        assert_eq!(order.successor_variables(), vec![1]);
        let next = order.successor();
        assert_eq!(next.successor_variables(), vec![0, 2]);
    }
}
