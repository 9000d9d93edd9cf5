//! Long-run behaviour of Markov chains
//!
//! Long-run averages are assembled from the stationary distributions of the
//! bottom strongly connected components (BSCCs), weighted by the probability
//! to eventually reach each BSCC.

use bitvec::prelude::*;
use log::{debug, trace};

use crate::{
    Deadline, Direction, SolverError, SolverOptions,
    components::bottom_sccs,
    ctmc::uniformize,
    reachability::until_probabilities,
    sparse::{Predecessors, SparseMatrix},
};

/// Stationary distribution of a single BSCC by power iteration on the
/// aperiodic chain `(P + I) / 2`
fn stationary_distribution(
    matrix: &SparseMatrix,
    bscc: &[usize],
    local_index: &mut [usize],
    options: &SolverOptions,
    deadline: &Deadline,
) -> Result<Vec<f64>, SolverError> {
    if bscc.len() == 1 {
        return Ok(vec![1.0]);
    }

    for (i, &s) in bscc.iter().enumerate() {
        local_index[s] = i;
    }

    let size = bscc.len();
    let mut pi = vec![1.0 / size as f64; size];
    let mut iterations = 0;

    loop {
        deadline.check()?;
        iterations += 1;

        let mut next = vec![0.0; size];
        for (i, &s) in bscc.iter().enumerate() {
            let mass = 0.5 * pi[i];
            next[i] += mass;
            for choice in matrix.choices(s) {
                for (t, p) in matrix.row(choice) {
                    next[local_index[t]] += mass * p;
                }
            }
        }

        let total = next.iter().sum::<f64>();
        for v in next.iter_mut() {
            *v /= total;
        }

        let difference = pi
            .iter()
            .zip(&next)
            .map(|(old, new)| options.stop_criterion.difference(*old, *new))
            .fold(0.0, f64::max);
        pi = next;

        if difference <= options.tolerance / 2.0 {
            trace!("Stationary distribution converged after {iterations} iterations");
            return Ok(pi);
        }
        if iterations >= options.max_iterations {
            return Err(SolverError::NotConverged {
                iterations,
                difference,
            });
        }
    }
}

/// Long-run average of the per-state `values` from every state of a Markov
/// chain
///
/// Every bottom SCC contributes the average of `values` under its stationary
/// distribution, weighted by the probability of reaching it.
pub fn long_run_values(
    matrix: &SparseMatrix,
    predecessors: &Predecessors,
    values: &[f64],
    options: &SolverOptions,
    deadline: &Deadline,
) -> Result<Vec<f64>, SolverError> {
    let n = matrix.num_states();
    let all = bitvec![1; n];
    let bsccs = bottom_sccs(matrix, &all);
    debug!("Computing long-run values over {} BSCCs", bsccs.len());
    let mut local_index = vec![usize::MAX; n];
    let mut result = vec![0.0; n];

    for bscc in &bsccs {
        let stationary = stationary_distribution(matrix, bscc, &mut local_index, options, deadline)?;
        let average = bscc
            .iter()
            .zip(&stationary)
            .map(|(&s, p)| p * values[s])
            .sum::<f64>();
        if average == 0.0 {
            continue;
        }
        if bsccs.len() == 1 {
            result.fill(average);
            break;
        }

        let mut target = bitvec![0; n];
        for &s in bscc {
            target.set(s, true);
        }
        let reach = until_probabilities(
            matrix,
            predecessors,
            &all,
            &target,
            Direction::Maximize,
            options,
            deadline,
        )?;
        for (r, p) in result.iter_mut().zip(reach) {
            *r += average * p;
        }
    }

    Ok(result)
}

/// [`long_run_values`] of a CTMC given by its rate matrix
pub fn long_run_values_ctmc(
    rates: &SparseMatrix,
    predecessors: &Predecessors,
    values: &[f64],
    options: &SolverOptions,
    deadline: &Deadline,
) -> Result<Vec<f64>, SolverError> {
    let (uniformized, _) = uniformize(rates);
    long_run_values(&uniformized, predecessors, values, options, deadline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse::SparseMatrixBuilder;

    /// 0 -> {0: 0.5, 1: 0.5}, 1 -> {0: 0.25, 1: 0.75}: π = (1/3, 2/3)
    fn two_states() -> SparseMatrix {
        let mut b = SparseMatrixBuilder::new();
        b.new_state();
        b.add_choice([(0, 0.5), (1, 0.5)]);
        b.new_state();
        b.add_choice([(0, 0.25), (1, 0.75)]);
        b.build()
    }

    #[test]
    fn test_long_run_values_single_bscc() {
        let m = two_states();
        let preds = m.predecessors();

        let x = long_run_values(&m, &preds, &[1.0, 0.0], &SolverOptions::default(), &Deadline::none()).unwrap();
        for v in x {
            assert!((v - 1.0 / 3.0).abs() < 1e-8);
        }
        let x = long_run_values(&m, &preds, &[0.0, 3.0], &SolverOptions::default(), &Deadline::none()).unwrap();
        assert!((x[0] - 2.0).abs() < 1e-8);
    }

    #[test]
    fn test_periodic_chain() {
        // 0 <-> 1 deterministic alternation
        let mut b = SparseMatrixBuilder::new();
        b.new_state();
        b.add_choice([(1, 1.0)]);
        b.new_state();
        b.add_choice([(0, 1.0)]);
        let m = b.build();
        let preds = m.predecessors();

        let x = long_run_values(&m, &preds, &[1.0, 0.0], &SolverOptions::default(), &Deadline::none()).unwrap();
        assert!((x[0] - 0.5).abs() < 1e-8);
        assert!((x[1] - 0.5).abs() < 1e-8);
    }

    #[test]
    fn test_long_run_values() {
        // 0 -> {1: 0.25, 2: 0.75}, 1 and 2 absorbing
        let mut b = SparseMatrixBuilder::new();
        b.new_state();
        b.add_choice([(1, 0.25), (2, 0.75)]);
        b.new_state();
        b.add_choice([(1, 1.0)]);
        b.new_state();
        b.add_choice([(2, 1.0)]);
        let m = b.build();
        let preds = m.predecessors();

        let x = long_run_values(&m, &preds, &[0.0, 4.0, 0.0], &SolverOptions::default(), &Deadline::none()).unwrap();
        assert!((x[0] - 1.0).abs() < 1e-9);
        assert_eq!(x[1], 4.0);
        assert_eq!(x[2], 0.0);
    }

    #[test]
    fn test_ctmc_birth_death() {
        // 0 --1--> 1 --1--> 2, 1 --2--> 0, 2 --2--> 1: π ∝ (1, 1/2, 1/4)
        let mut b = SparseMatrixBuilder::new();
        b.new_state();
        b.add_choice([(1, 1.0)]);
        b.new_state();
        b.add_choice([(0, 2.0), (2, 1.0)]);
        b.new_state();
        b.add_choice([(1, 2.0)]);
        let m = b.build();
        let preds = m.predecessors();
        let norm = 1.0 + 0.5 + 0.25;

        for (state, weight) in [(0, 1.0), (1, 0.5), (2, 0.25)] {
            let mut indicator = vec![0.0; 3];
            indicator[state] = 1.0;
            let x = long_run_values_ctmc(&m, &preds, &indicator, &SolverOptions::default(), &Deadline::none()).unwrap();
            assert!((x[0] - weight / norm).abs() < 1e-8, "{state}: {x:?}");
        }
    }
}
