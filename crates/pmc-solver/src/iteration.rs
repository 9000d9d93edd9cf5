//! Value iteration engine shared by the probability and reward solvers

use log::{debug, trace};
use rayon::prelude::*;

use crate::{
    Deadline, Direction, IterationMethod, SolverError, SolverOptions, sparse::SparseMatrix,
};

/// One Bellman operator `x(s) = opt_c (offset(c) + Σ P(c, t) x(t))`
pub(crate) struct Bellman<'a> {
    pub matrix: &'a SparseMatrix,
    /// Per-choice constant added to the weighted sum (e.g. rewards)
    pub offsets: Option<&'a [f64]>,
    pub direction: Direction,
}

impl Bellman<'_> {
    /// Value of `state` given the current vector `x`
    pub fn apply(&self, state: usize, x: &[f64]) -> f64 {
        let mut best = self.direction.neutral();
        for choice in self.matrix.choices(state) {
            let mut value = self.matrix.multiply_row(choice, x);
            if let Some(offsets) = self.offsets {
                value += offsets[choice];
            }
            best = self.direction.optimize(best, value);
        }
        best
    }

    /// Update all `states` from `x` at once, returns the new values in the
    /// order of `states`
    pub fn sweep(&self, states: &[usize], x: &[f64], parallel: bool) -> Vec<f64> {
        if parallel {
            states.par_iter().map(|&s| self.apply(s, x)).collect()
        } else {
            states.iter().map(|&s| self.apply(s, x)).collect()
        }
    }
}

/// Iterate the Bellman operator on `states` until convergence
///
/// Values of states not contained in `states` stay fixed. Returns the number
/// of iterations performed.
pub(crate) fn iterate_until_convergence(
    bellman: &Bellman<'_>,
    states: &[usize],
    x: &mut [f64],
    options: &SolverOptions,
    deadline: &Deadline,
) -> Result<usize, SolverError> {
    let threshold = options.tolerance / 2.0;
    let criterion = options.stop_criterion;
    let mut iterations = 0;

    loop {
        deadline.check()?;
        if iterations >= options.max_iterations {
            return Err(SolverError::NotConverged {
                iterations,
                difference: f64::INFINITY,
            });
        }
        iterations += 1;

        let difference = match options.method {
            IterationMethod::Jacobi => {
                let updated = bellman.sweep(states, x, options.parallel);
                let mut difference = 0.0f64;
                for (&s, new) in states.iter().zip(updated) {
                    difference = difference.max(criterion.difference(x[s], new));
                    x[s] = new;
                }
                difference
            }
            IterationMethod::GaussSeidel => {
                let mut difference = 0.0f64;
                for &s in states {
                    let new = bellman.apply(s, x);
                    difference = difference.max(criterion.difference(x[s], new));
                    x[s] = new;
                }
                difference
            }
        };

        trace!("Iteration {iterations}: difference {difference:e}");
        if let Some(&state) = states.iter().find(|&&s| x[s].is_nan()) {
            return Err(SolverError::Diverged {
                state,
                value: f64::NAN,
            });
        }
        if difference <= threshold {
            debug!("Value iteration converged after {iterations} iterations");
            return Ok(iterations);
        }
        if iterations == options.max_iterations {
            return Err(SolverError::NotConverged {
                iterations,
                difference,
            });
        }
    }
}

/// Apply the Bellman operator exactly `steps` times to the `states`, always
/// using the previous iterate
pub(crate) fn iterate_steps(
    bellman: &Bellman<'_>,
    states: &[usize],
    x: &mut [f64],
    steps: usize,
    parallel: bool,
    deadline: &Deadline,
) -> Result<(), SolverError> {
    for _ in 0..steps {
        deadline.check()?;
        let updated = bellman.sweep(states, x, parallel);
        for (&s, new) in states.iter().zip(updated) {
            x[s] = new;
        }
    }
    Ok(())
}
