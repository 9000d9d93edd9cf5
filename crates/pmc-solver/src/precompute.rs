//! Qualitative precomputation
//!
//! Graph-based algorithms determining the states where the probability of
//! `phi U psi` is exactly 0 or exactly 1. Suffixes follow the usual naming:
//! `A` quantifies over all schedulers, `E` asks for the existence of one.
//!
//! | algorithm | result                                  |
//! |-----------|-----------------------------------------|
//! | `prob0a`  | all schedulers reach with probability 0 |
//! | `prob0e`  | some scheduler reaches with probability 0 |
//! | `prob1a`  | all schedulers reach with probability 1 |
//! | `prob1e`  | some scheduler reaches with probability 1 |
//!
//! On deterministic matrices the `A` and `E` variants coincide.

use std::collections::VecDeque;

use bitvec::prelude::*;
use log::trace;

use crate::{
    Direction,
    sparse::{Predecessors, SparseMatrix},
};

/// Pointwise `a & !b`
pub fn and_not(a: &BitSlice, b: &BitSlice) -> BitVec {
    a.iter()
        .by_vals()
        .zip(b.iter().by_vals())
        .map(|(x, y)| x && !y)
        .collect()
}

/// States from which some path reaches `psi` while staying in `phi`
///
/// The result contains `psi`.
pub fn reach_exists(predecessors: &Predecessors, phi: &BitSlice, psi: &BitSlice) -> BitVec {
    let mut result = psi.to_bitvec();
    let mut stack = psi.iter_ones().collect::<Vec<_>>();

    while let Some(target) = stack.pop() {
        for &source in predecessors.of(target) {
            if !result[source] && phi[source] {
                result.set(source, true);
                stack.push(source);
            }
        }
    }

    result
}

/// States where the maximal probability of `phi U psi` is 0
pub fn prob0a(predecessors: &Predecessors, phi: &BitSlice, psi: &BitSlice) -> BitVec {
    !reach_exists(predecessors, phi, psi)
}

/// States where the minimal probability of `phi U psi` is 0
///
/// Computed as the complement of the least set `R` containing `psi` and
/// every `phi` state all of whose choices can move into `R`.
pub fn prob0e(
    matrix: &SparseMatrix,
    predecessors: &Predecessors,
    phi: &BitSlice,
    psi: &BitSlice,
) -> BitVec {
    let mut forced = psi.to_bitvec();
    let mut stack = psi.iter_ones().collect::<Vec<_>>();

    while let Some(target) = stack.pop() {
        for &source in predecessors.of(target) {
            if forced[source] || !phi[source] {
                continue;
            }
            let all_choices_reach = matrix
                .choices(source)
                .all(|c| matrix.row_columns(c).iter().any(|&succ| forced[succ]));
            if all_choices_reach {
                forced.set(source, true);
                stack.push(source);
            }
        }
    }

    !forced
}

/// States where the minimal probability of `phi U psi` is 1
///
/// These are the states from which no state of [`prob0e`] can be reached
/// through `phi` states that are not `psi` states.
pub fn prob1a(
    matrix: &SparseMatrix,
    predecessors: &Predecessors,
    phi: &BitSlice,
    psi: &BitSlice,
) -> BitVec {
    let zero = prob0e(matrix, predecessors, phi, psi);
    !reach_exists(predecessors, &and_not(phi, psi), &zero)
}

/// States where the maximal probability of `phi U psi` is 1
///
/// Greatest fixpoint over the candidate set `u`, where in every round the
/// states are kept that can reach `psi` with positive probability by only
/// using choices that stay inside `u`.
pub fn prob1e(
    matrix: &SparseMatrix,
    predecessors: &Predecessors,
    phi: &BitSlice,
    psi: &BitSlice,
) -> BitVec {
    let mut candidates = bitvec![1; matrix.num_states()];
    let mut rounds = 0;

    loop {
        rounds += 1;
        let mut reached = psi.to_bitvec();
        let mut stack = psi.iter_ones().collect::<Vec<_>>();

        while let Some(target) = stack.pop() {
            for &source in predecessors.of(target) {
                if reached[source] || !candidates[source] || !phi[source] {
                    continue;
                }
                let has_choice = matrix.choices(source).any(|c| {
                    let succs = matrix.row_columns(c);
                    succs.iter().all(|&s| candidates[s]) && succs.iter().any(|&s| reached[s])
                });
                if has_choice {
                    reached.set(source, true);
                    stack.push(source);
                }
            }
        }

        if reached == candidates {
            trace!("prob1e reached its fixpoint after {rounds} rounds");
            return reached;
        }
        candidates = reached;
    }
}

/// Scheduler reaching `psi` with probability 1 from every state of
/// [`prob1e`]
///
/// The choice of a state stays inside of the [`prob1e`] states and moves
/// closer to `psi` with positive probability. States outside of
/// [`prob1e`] and `psi` states get `None`.
pub fn prob1e_scheduler(
    matrix: &SparseMatrix,
    predecessors: &Predecessors,
    phi: &BitSlice,
    psi: &BitSlice,
) -> Vec<Option<usize>> {
    let sure = prob1e(matrix, predecessors, phi, psi);
    let mut scheduler = vec![None; matrix.num_states()];
    let mut reached = psi.to_bitvec();
    let mut queue = psi.iter_ones().collect::<VecDeque<_>>();

    while let Some(target) = queue.pop_front() {
        for &source in predecessors.of(target) {
            if reached[source] || !sure[source] || !phi[source] {
                continue;
            }
            let choice = matrix.choices(source).find(|&c| {
                let succs = matrix.row_columns(c);
                succs.iter().all(|&s| sure[s]) && succs.iter().any(|&s| reached[s])
            });
            if let Some(choice) = choice {
                scheduler[source] = Some(choice);
                reached.set(source, true);
                queue.push_back(source);
            }
        }
    }

    scheduler
}

/// States where the optimal probability of `phi U psi` is 0
pub fn prob0(
    matrix: &SparseMatrix,
    predecessors: &Predecessors,
    phi: &BitSlice,
    psi: &BitSlice,
    direction: Direction,
) -> BitVec {
    match direction {
        Direction::Maximize => prob0a(predecessors, phi, psi),
        Direction::Minimize => prob0e(matrix, predecessors, phi, psi),
    }
}

/// States where the optimal probability of `phi U psi` is 1
pub fn prob1(
    matrix: &SparseMatrix,
    predecessors: &Predecessors,
    phi: &BitSlice,
    psi: &BitSlice,
    direction: Direction,
) -> BitVec {
    if matrix.is_deterministic() {
        return prob1a(matrix, predecessors, phi, psi);
    }
    match direction {
        Direction::Maximize => prob1e(matrix, predecessors, phi, psi),
        Direction::Minimize => prob1a(matrix, predecessors, phi, psi),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse::SparseMatrixBuilder;

    /// 0 -> {1: 0.5, 2: 0.5}, 1 -> 1 (goal), 2 -> 2 (sink), 3 -> 3 (unreachable)
    fn chain() -> SparseMatrix {
        let mut b = SparseMatrixBuilder::new();
        b.new_state();
        b.add_choice([(1, 0.5), (2, 0.5)]);
        b.new_state();
        b.add_choice([(1, 1.0)]);
        b.new_state();
        b.add_choice([(2, 1.0)]);
        b.new_state();
        b.add_choice([(3, 1.0)]);
        b.build()
    }

    /// state 0: a -> goal(1), b -> sink(2); state 3: a -> {0: 0.5, 3: 0.5}, b -> 1
    fn mdp() -> SparseMatrix {
        let mut b = SparseMatrixBuilder::new();
        b.new_state();
        b.add_choice([(1, 1.0)]);
        b.add_choice([(2, 1.0)]);
        b.new_state();
        b.add_choice([(1, 1.0)]);
        b.new_state();
        b.add_choice([(2, 1.0)]);
        b.new_state();
        b.add_choice([(0, 0.5), (3, 0.5)]);
        b.add_choice([(1, 1.0)]);
        b.build()
    }

    #[test]
    fn test_chain_precomputation() {
        let m = chain();
        let preds = m.predecessors();
        let phi = bitvec![1; 4];
        let psi = bitvec![0, 1, 0, 0];

        assert_eq!(prob0a(&preds, &phi, &psi), bitvec![0, 0, 1, 1]);
        assert_eq!(prob0e(&m, &preds, &phi, &psi), bitvec![0, 0, 1, 1]);
        assert_eq!(prob1a(&m, &preds, &phi, &psi), bitvec![0, 1, 0, 0]);
        assert_eq!(prob1e(&m, &preds, &phi, &psi), bitvec![0, 1, 0, 0]);
    }

    #[test]
    fn test_mdp_precomputation() {
        let m = mdp();
        let preds = m.predecessors();
        let phi = bitvec![1; 4];
        let psi = bitvec![0, 1, 0, 0];

        // the maximizing scheduler reaches the goal surely from 0 and 3
        assert_eq!(
            prob1(&m, &preds, &phi, &psi, Direction::Maximize),
            bitvec![1, 1, 0, 1]
        );
        // the minimizing scheduler avoids it from 0 and 3
        assert_eq!(
            prob1(&m, &preds, &phi, &psi, Direction::Minimize),
            bitvec![0, 1, 0, 0]
        );
        assert_eq!(
            prob0(&m, &preds, &phi, &psi, Direction::Minimize),
            bitvec![1, 0, 1, 1]
        );
        assert_eq!(
            prob0(&m, &preds, &phi, &psi, Direction::Maximize),
            bitvec![0, 0, 1, 0]
        );
    }

    #[test]
    fn test_phi_restricts_paths() {
        let m = mdp();
        let preds = m.predecessors();
        // state 0 may not be passed
        let phi = bitvec![0, 1, 1, 1];
        let psi = bitvec![0, 1, 0, 0];

        assert_eq!(prob0a(&preds, &phi, &psi), bitvec![1, 0, 1, 0]);
        assert_eq!(
            prob1(&m, &preds, &phi, &psi, Direction::Maximize),
            bitvec![0, 1, 0, 1]
        );
        assert_eq!(
            prob1(&m, &preds, &phi, &psi, Direction::Minimize),
            bitvec![0, 1, 0, 0]
        );
    }

    #[test]
    fn test_prob1e_scheduler_avoids_sink() {
        let m = mdp();
        let preds = m.predecessors();
        let scheduler = prob1e_scheduler(&m, &preds, &bitvec![1; 4], &bitvec![0, 1, 0, 0]);

        // state 0 has to move to the goal, state 3 may move to 0 or the goal
        assert_eq!(scheduler[0], Some(0));
        assert!(matches!(scheduler[3], Some(c) if m.choices(3).contains(&c)));
        assert_eq!(scheduler[1], None);
        assert_eq!(scheduler[2], None);
    }

    #[test]
    fn test_and_not() {
        assert_eq!(
            and_not(bits![1, 1, 0, 0], bits![1, 0, 1, 0]),
            bitvec![0, 1, 0, 0]
        );
    }
}
