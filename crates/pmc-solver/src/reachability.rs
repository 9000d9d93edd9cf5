//! Probabilities of next, until and step-bounded until formulas

use bitvec::prelude::*;
use log::debug;

use crate::{
    Deadline, Direction, SolverError, SolverOptions,
    iteration::{Bellman, iterate_steps, iterate_until_convergence},
    precompute::{and_not, prob0, prob1},
    sparse::{Predecessors, SparseMatrix},
};

/// Clamp probabilities to `[0, 1]`
///
/// Returns [`SolverError::Diverged`] if a value is NaN or outside of
/// `[-tolerance, 1 + tolerance]`.
pub fn check_probabilities(values: &mut [f64], tolerance: f64) -> Result<(), SolverError> {
    for (state, v) in values.iter_mut().enumerate() {
        if v.is_nan() || *v < -tolerance || *v > 1.0 + tolerance {
            return Err(SolverError::Diverged { state, value: *v });
        }
        *v = v.clamp(0.0, 1.0);
    }
    Ok(())
}

/// Optimal probability to move to a `target` state in one step
pub fn next_probabilities(
    matrix: &SparseMatrix,
    target: &BitSlice,
    direction: Direction,
) -> Vec<f64> {
    let indicator = target
        .iter()
        .by_vals()
        .map(|t| if t { 1.0 } else { 0.0 })
        .collect::<Vec<_>>();
    let bellman = Bellman {
        matrix,
        offsets: None,
        direction,
    };

    (0..matrix.num_states())
        .map(|s| bellman.apply(s, &indicator))
        .collect()
}

/// Optimal probability of `phi U psi`
///
/// States with probability 0 and 1 are determined by graph analysis, the
/// remaining states are solved by value iteration starting from 0.
pub fn until_probabilities(
    matrix: &SparseMatrix,
    predecessors: &Predecessors,
    phi: &BitSlice,
    psi: &BitSlice,
    direction: Direction,
    options: &SolverOptions,
    deadline: &Deadline,
) -> Result<Vec<f64>, SolverError> {
    let no = prob0(matrix, predecessors, phi, psi, direction);
    let yes = prob1(matrix, predecessors, phi, psi, direction);

    let mut x = yes
        .iter()
        .by_vals()
        .map(|y| if y { 1.0 } else { 0.0 })
        .collect::<Vec<_>>();
    let maybe = (0..matrix.num_states())
        .filter(|&s| !yes[s] && !no[s])
        .collect::<Vec<_>>();

    debug!(
        "Until ({direction}): {} states with probability 1, {} with probability 0, {} to solve",
        yes.count_ones(),
        no.count_ones(),
        maybe.len()
    );

    if !maybe.is_empty() {
        let bellman = Bellman {
            matrix,
            offsets: None,
            direction,
        };
        iterate_until_convergence(&bellman, &maybe, &mut x, options, deadline)?;
    }

    check_probabilities(&mut x, options.tolerance)?;
    Ok(x)
}

/// Optimal probability of reaching `psi` within `steps` steps while
/// staying in `phi`
pub fn bounded_until_probabilities(
    matrix: &SparseMatrix,
    predecessors: &Predecessors,
    phi: &BitSlice,
    psi: &BitSlice,
    steps: usize,
    direction: Direction,
    options: &SolverOptions,
    deadline: &Deadline,
) -> Result<Vec<f64>, SolverError> {
    let no = prob0(matrix, predecessors, phi, psi, direction);
    let mut x = psi
        .iter()
        .by_vals()
        .map(|p| if p { 1.0 } else { 0.0 })
        .collect::<Vec<_>>();
    let maybe = and_not(&and_not(phi, psi), &no).iter_ones().collect::<Vec<_>>();

    let bellman = Bellman {
        matrix,
        offsets: None,
        direction,
    };
    iterate_steps(&bellman, &maybe, &mut x, steps, options.parallel, deadline)?;

    check_probabilities(&mut x, options.tolerance)?;
    Ok(x)
}

/// Propagate the values `init` backwards for `steps` steps through `phi`
/// states
///
/// The first `steps` states of a path need to satisfy `phi`, the state
/// reached after exactly `steps` steps contributes its value in `init`. Used
/// for lower time bounds: `phi U[lo, hi] psi` equals `steps = lo` applied to
/// the values of `phi U<=(hi - lo) psi`.
pub fn restricted_steps(
    matrix: &SparseMatrix,
    phi: &BitSlice,
    mut init: Vec<f64>,
    steps: usize,
    direction: Direction,
    options: &SolverOptions,
    deadline: &Deadline,
) -> Result<Vec<f64>, SolverError> {
    let active = phi.iter_ones().collect::<Vec<_>>();
    let bellman = Bellman {
        matrix,
        offsets: None,
        direction,
    };

    if steps > 0 {
        iterate_steps(&bellman, &active, &mut init, 1, options.parallel, deadline)?;
        for s in phi.iter_zeros() {
            init[s] = 0.0;
        }
        iterate_steps(&bellman, &active, &mut init, steps - 1, options.parallel, deadline)?;
    }

    check_probabilities(&mut init, options.tolerance)?;
    Ok(init)
}
