//! Expected rewards of discrete-time models
//!
//! Rewards are given per choice: the reward collected when leaving a state
//! through a choice, which includes the state reward of its source. Only
//! instantaneous rewards are given per state.

use bitvec::prelude::*;
use log::debug;

use crate::{
    Deadline, Direction, SolverError, SolverOptions,
    iteration::{Bellman, iterate_steps, iterate_until_convergence},
    precompute::{prob1, prob1e_scheduler},
    sparse::{Predecessors, SparseMatrix, SparseMatrixBuilder},
};

/// Optimal expected reward accumulated until a `target` state is reached
///
/// The value is infinite in states where the target is not reached with
/// probability 1 under the optimizing scheduler. Minimization ranges over
/// the schedulers reaching the target with probability 1, so cycling in an
/// end component without reward does not count as a cheap way out.
pub fn reachability_rewards(
    matrix: &SparseMatrix,
    predecessors: &Predecessors,
    choice_rewards: &[f64],
    target: &BitSlice,
    direction: Direction,
    options: &SolverOptions,
    deadline: &Deadline,
) -> Result<Vec<f64>, SolverError> {
    let all = bitvec![1; matrix.num_states()];
    // maximizing schedulers diverge as soon as some scheduler misses the
    // target, minimizing ones only if all of them do
    let finite = prob1(matrix, predecessors, &all, target, direction.opposite());

    let mut x = vec![0.0; matrix.num_states()];
    let mut maybe = Vec::new();
    for s in 0..matrix.num_states() {
        if target[s] {
            continue;
        }
        if !finite[s] {
            x[s] = f64::INFINITY;
            continue;
        }
        maybe.push(s);
    }

    debug!(
        "Reachability reward ({direction}): {} target states, {} infinite, {} to solve",
        target.count_ones(),
        finite.count_zeros(),
        maybe.len()
    );

    if maybe.is_empty() {
        return Ok(x);
    }

    if direction == Direction::Minimize && !matrix.is_deterministic() {
        // iterating down from the value of a proper scheduler avoids the
        // least fixpoint of end components without reward
        let scheduler = prob1e_scheduler(matrix, predecessors, &all, target);
        let (policy, policy_rewards) = restrict(matrix, choice_rewards, &scheduler);
        let bellman = Bellman {
            matrix: &policy,
            offsets: Some(&policy_rewards),
            direction,
        };
        let steps = iterate_until_convergence(&bellman, &maybe, &mut x, options, deadline)?;
        debug!("Upper bound of a proper scheduler after {steps} iterations");
    }

    let bellman = Bellman {
        matrix,
        offsets: Some(choice_rewards),
        direction,
    };
    iterate_until_convergence(&bellman, &maybe, &mut x, options, deadline)?;

    Ok(x)
}

/// Induced chain of a memoryless scheduler, with the rewards of the chosen
/// choices
///
/// States without a choice become absorbing and collect no reward.
fn restrict(
    matrix: &SparseMatrix,
    choice_rewards: &[f64],
    scheduler: &[Option<usize>],
) -> (SparseMatrix, Vec<f64>) {
    let mut builder = SparseMatrixBuilder::new();
    let mut rewards = Vec::with_capacity(scheduler.len());

    for (state, choice) in scheduler.iter().enumerate() {
        builder.new_state();
        match *choice {
            Some(c) => {
                builder.add_choice(matrix.row(c));
                rewards.push(choice_rewards[c]);
            }
            None => {
                builder.add_choice([(state, 1.0)]);
                rewards.push(0.0);
            }
        }
    }

    (builder.build(), rewards)
}

/// Optimal expected reward accumulated within the first `steps` steps
pub fn cumulative_rewards(
    matrix: &SparseMatrix,
    choice_rewards: &[f64],
    steps: usize,
    direction: Direction,
    options: &SolverOptions,
    deadline: &Deadline,
) -> Result<Vec<f64>, SolverError> {
    let mut x = vec![0.0; matrix.num_states()];
    let states = (0..matrix.num_states()).collect::<Vec<_>>();
    let bellman = Bellman {
        matrix,
        offsets: Some(choice_rewards),
        direction,
    };
    iterate_steps(&bellman, &states, &mut x, steps, options.parallel, deadline)?;
    Ok(x)
}

/// Optimal expected state reward in the state occupied after exactly
/// `steps` steps
pub fn instantaneous_rewards(
    matrix: &SparseMatrix,
    state_rewards: &[f64],
    steps: usize,
    direction: Direction,
    options: &SolverOptions,
    deadline: &Deadline,
) -> Result<Vec<f64>, SolverError> {
    let mut x = state_rewards.to_vec();
    let states = (0..matrix.num_states()).collect::<Vec<_>>();
    let bellman = Bellman {
        matrix,
        offsets: None,
        direction,
    };
    iterate_steps(&bellman, &states, &mut x, steps, options.parallel, deadline)?;
    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse::SparseMatrixBuilder;

    /// Geometric trials: 0 -> {0: 1 - p, 1: p}, 1 absorbing
    fn trials(p: f64) -> SparseMatrix {
        let mut b = SparseMatrixBuilder::new();
        b.new_state();
        b.add_choice([(0, 1.0 - p), (1, p)]);
        b.new_state();
        b.add_choice([(1, 1.0)]);
        b.build()
    }

    /// state 0: a -> 1 (reward 5), b -> {0: 0.5, 1: 0.5} (reward 1),
    ///          c -> 2 (reward 0); 1 target, 2 sink
    fn mdp() -> SparseMatrix {
        let mut b = SparseMatrixBuilder::new();
        b.new_state();
        b.add_choice([(1, 1.0)]);
        b.add_choice([(0, 0.5), (1, 0.5)]);
        b.add_choice([(2, 1.0)]);
        b.new_state();
        b.add_choice([(1, 1.0)]);
        b.new_state();
        b.add_choice([(2, 1.0)]);
        b.build()
    }

    #[test]
    fn test_expected_number_of_trials() {
        let m = trials(0.25);
        let preds = m.predecessors();
        let x = reachability_rewards(
            &m,
            &preds,
            &[1.0, 0.0],
            &bitvec![0, 1],
            Direction::Minimize,
            &SolverOptions::default(),
            &Deadline::none(),
        )
        .unwrap();
        assert!((x[0] - 4.0).abs() < 1e-8);
        assert_eq!(x[1], 0.0);
    }

    #[test]
    fn test_mdp_reward_bounds() {
        let m = mdp();
        let preds = m.predecessors();
        let rewards = [5.0, 1.0, 0.0, 0.0, 0.0];
        let target = bitvec![0, 1, 0];
        let opts = SolverOptions::default();

        let min = reachability_rewards(&m, &preds, &rewards, &target, Direction::Minimize, &opts, &Deadline::none()).unwrap();
        // b repeated: expected reward 2
        assert!((min[0] - 2.0).abs() < 1e-8);
        assert_eq!(min[2], f64::INFINITY);

        // the maximizing scheduler can avoid the target
        let max = reachability_rewards(&m, &preds, &rewards, &target, Direction::Maximize, &opts, &Deadline::none()).unwrap();
        assert_eq!(max[0], f64::INFINITY);
    }

    #[test]
    fn test_free_self_loop_is_not_a_way_out() {
        // state 0: a -> 0 (reward 0), b -> 1 (reward 1); 1 target
        let mut b = SparseMatrixBuilder::new();
        b.new_state();
        b.add_choice([(0, 1.0)]);
        b.add_choice([(1, 1.0)]);
        b.new_state();
        b.add_choice([(1, 1.0)]);
        let m = b.build();
        let preds = m.predecessors();

        let min = reachability_rewards(
            &m,
            &preds,
            &[0.0, 1.0, 0.0],
            &bitvec![0, 1],
            Direction::Minimize,
            &SolverOptions::default(),
            &Deadline::none(),
        )
        .unwrap();
        assert!((min[0] - 1.0).abs() < 1e-8, "{min:?}");
    }

    #[test]
    fn test_free_cycle_between_states() {
        // 0: a -> 1 (reward 0), b -> 2 (reward 3)
        // 1: a -> 0 (reward 0), b -> {2: 0.5, 0: 0.5} (reward 1)
        // 2 target
        let mut b = SparseMatrixBuilder::new();
        b.new_state();
        b.add_choice([(1, 1.0)]);
        b.add_choice([(2, 1.0)]);
        b.new_state();
        b.add_choice([(0, 1.0)]);
        b.add_choice([(2, 0.5), (0, 0.5)]);
        b.new_state();
        b.add_choice([(2, 1.0)]);
        let m = b.build();
        let preds = m.predecessors();

        let min = reachability_rewards(
            &m,
            &preds,
            &[0.0, 3.0, 0.0, 1.0, 0.0],
            &bitvec![0, 0, 1],
            Direction::Minimize,
            &SolverOptions::default(),
            &Deadline::none(),
        )
        .unwrap();
        // from 1 the retry costs 1 and returns to 0 half of the time:
        // x1 = 1 + x0 / 2 and x0 = min(x1, 3) give x0 = x1 = 2
        assert!((min[0] - 2.0).abs() < 1e-5, "{min:?}");
        assert!((min[1] - 2.0).abs() < 1e-5, "{min:?}");
    }

    #[test]
    fn test_cumulative_and_instantaneous() {
        let m = trials(0.5);
        let opts = SolverOptions::default();

        let c = cumulative_rewards(&m, &[1.0, 0.0], 2, Direction::Maximize, &opts, &Deadline::none()).unwrap();
        assert_eq!(c, vec![1.5, 0.0]);

        let i = instantaneous_rewards(&m, &[0.0, 4.0], 2, Direction::Maximize, &opts, &Deadline::none()).unwrap();
        assert_eq!(i, vec![3.0, 4.0]);

        let zero = cumulative_rewards(&m, &[1.0, 0.0], 0, Direction::Maximize, &opts, &Deadline::none()).unwrap();
        assert_eq!(zero, vec![0.0, 0.0]);
    }
}
