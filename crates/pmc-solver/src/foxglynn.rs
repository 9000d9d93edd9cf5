//! Poisson probabilities for uniformization
//!
//! Computes the (unnormalized) Poisson weights `w(k) ∝ e^{-λ} λ^k / k!` on a
//! window `[left, right]` that carries all but `accuracy` of the probability
//! mass. Weights are computed relative to the mode of the distribution, which
//! avoids underflow of `e^{-λ}` for large `λ`.

use log::trace;

use crate::SolverError;

/// Truncated Poisson distribution
#[derive(Debug, Clone, PartialEq)]
pub struct FoxGlynn {
    left: usize,
    weights: Vec<f64>,
    total_weight: f64,
}

impl FoxGlynn {
    /// Compute the Poisson weights for rate `lambda` such that the truncated
    /// mass is at most `accuracy` relative to the total weight
    ///
    /// # Example
    ///
    /// ```
    /// use pmc_solver::foxglynn::FoxGlynn;
    ///
    /// let fg = FoxGlynn::new(2.0, 1e-12).unwrap();
    /// let p1 = fg.probability(1);
    /// assert!((p1 - 2.0 * (-2.0f64).exp()).abs() < 1e-12);
    /// ```
    pub fn new(lambda: f64, accuracy: f64) -> Result<Self, SolverError> {
        if !lambda.is_finite() || lambda < 0.0 {
            return Err(SolverError::InvalidInput(format!(
                "Poisson rate must be finite and non-negative, got {lambda}"
            )));
        }
        if !(accuracy > 0.0 && accuracy < 1.0) {
            return Err(SolverError::InvalidInput(format!(
                "Poisson accuracy must lie in (0, 1), got {accuracy}"
            )));
        }

        if lambda == 0.0 {
            return Ok(Self {
                left: 0,
                weights: vec![1.0],
                total_weight: 1.0,
            });
        }

        let mode = lambda.floor() as usize;
        let bound = accuracy / 2.0;
        let mut total = 1.0;

        // right tail: w(k + 1) = w(k) λ / (k + 1)
        let mut right = vec![1.0];
        let mut k = mode;
        let mut w = 1.0;
        loop {
            w *= lambda / (k + 1) as f64;
            k += 1;
            right.push(w);
            total += w;

            let ratio = lambda / (k + 1) as f64;
            if ratio < 1.0 && w * ratio / (1.0 - ratio) <= bound * total {
                break;
            }
        }

        // left tail: w(k - 1) = w(k) k / λ
        let mut left = Vec::new();
        let mut k = mode;
        let mut w = 1.0;
        while k > 0 {
            w *= k as f64 / lambda;
            k -= 1;
            left.push(w);
            total += w;

            if k == 0 {
                break;
            }
            let ratio = k as f64 / lambda;
            if w * ratio / (1.0 - ratio) <= bound * total {
                break;
            }
        }

        let left_index = mode - left.len();
        left.reverse();
        left.extend(right);

        trace!(
            "Fox-Glynn for λ = {lambda}: window [{left_index}, {}]",
            left_index + left.len() - 1
        );

        Ok(Self {
            left: left_index,
            weights: left,
            total_weight: total,
        })
    }

    /// First index with non-zero weight
    pub fn left(&self) -> usize {
        self.left
    }

    /// Last index with non-zero weight
    pub fn right(&self) -> usize {
        self.left + self.weights.len() - 1
    }

    /// Unnormalized weight of `k`, 0 outside of the window
    pub fn weight(&self, k: usize) -> f64 {
        if k < self.left {
            return 0.0;
        }
        self.weights.get(k - self.left).copied().unwrap_or(0.0)
    }

    /// Sum of all weights in the window
    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    /// Approximate Poisson probability of `k`
    pub fn probability(&self, k: usize) -> f64 {
        self.weight(k) / self.total_weight
    }
}
