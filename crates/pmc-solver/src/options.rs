//! Options of the numeric solvers

#[cfg(feature = "config_deserialize")]
use serde::Deserialize;

/// How the difference between two successive iterates is measured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "config_deserialize", derive(Deserialize))]
pub enum StopCriterion {
    /// Maximal absolute difference `|x' - x|`
    #[default]
    Absolute,
    /// Maximal relative difference `|x' - x| / |x'|`
    Relative,
}

impl StopCriterion {
    /// Difference between the old value `old` and the new value `new`
    ///
    /// Equal values (including equal infinities) have difference 0.
    pub fn difference(&self, old: f64, new: f64) -> f64 {
        if old == new {
            return 0.0;
        }
        let diff = (new - old).abs();
        match self {
            StopCriterion::Absolute => diff,
            StopCriterion::Relative => {
                if new == 0.0 {
                    diff
                } else {
                    diff / new.abs()
                }
            }
        }
    }
}

/// Update scheme of value iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "config_deserialize", derive(Deserialize))]
pub enum IterationMethod {
    /// All states are updated from the previous iterate
    #[default]
    Jacobi,
    /// States are updated in place in index order
    GaussSeidel,
}

/// Options of the numeric solvers
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "config_deserialize", derive(Deserialize), serde(default))]
pub struct SolverOptions {
    /// Convergence tolerance, also used as accuracy of the Fox-Glynn bounds
    pub tolerance: f64,
    /// How convergence is measured
    pub stop_criterion: StopCriterion,
    /// Update scheme of unbounded value iteration
    pub method: IterationMethod,
    /// Maximal number of iterations before giving up
    pub max_iterations: usize,
    /// Whether Jacobi sweeps are distributed over the rayon thread pool
    pub parallel: bool,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            tolerance: 1e-10,
            stop_criterion: StopCriterion::default(),
            method: IterationMethod::default(),
            max_iterations: 100_000,
            parallel: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_difference() {
        assert_eq!(StopCriterion::Absolute.difference(1.0, 1.5), 0.5);
        assert_eq!(StopCriterion::Relative.difference(1.0, 2.0), 0.5);
        assert_eq!(StopCriterion::Relative.difference(0.5, 0.0), 0.5);
        assert_eq!(
            StopCriterion::Absolute.difference(f64::INFINITY, f64::INFINITY),
            0.0
        );
    }

    #[test]
    fn test_default() {
        let opts = SolverOptions::default();
        assert_eq!(opts.tolerance, 1e-10);
        assert_eq!(opts.stop_criterion, StopCriterion::Absolute);
        assert_eq!(opts.method, IterationMethod::Jacobi);
    }
}
