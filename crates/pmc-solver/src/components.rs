//! Graph decompositions: SCCs, bottom SCCs and maximal end components

use bitvec::prelude::*;
use log::debug;

use crate::sparse::SparseMatrix;

const UNVISITED: usize = usize::MAX;

/// Strongly connected components of the subgraph induced by `states`
///
/// If `enabled` is given, only the choices set in it contribute edges.
/// Components are returned in reverse topological order (every component is
/// listed before the components that can reach it), states within a
/// component are sorted.
pub fn strongly_connected_components(
    matrix: &SparseMatrix,
    states: &BitSlice,
    enabled: Option<&BitSlice>,
) -> Vec<Vec<usize>> {
    let n = matrix.num_states();
    let successors = |state: usize| -> Vec<usize> {
        matrix
            .choices(state)
            .filter(|&c| enabled.is_none_or(|e| e[c]))
            .flat_map(|c| matrix.row_columns(c).iter().copied())
            .filter(|&succ| states[succ])
            .collect()
    };

    let mut index = vec![UNVISITED; n];
    let mut lowlink = vec![0; n];
    let mut on_stack = bitvec![0; n];
    let mut stack = Vec::new();
    let mut next_index = 0;
    let mut components = Vec::new();

    for root in states.iter_ones() {
        if index[root] != UNVISITED {
            continue;
        }

        index[root] = next_index;
        lowlink[root] = next_index;
        next_index += 1;
        stack.push(root);
        on_stack.set(root, true);
        let mut call_stack = vec![(root, successors(root), 0usize)];

        while let Some(frame) = call_stack.last_mut() {
            let node = frame.0;

            if frame.2 < frame.1.len() {
                let succ = frame.1[frame.2];
                frame.2 += 1;

                if index[succ] == UNVISITED {
                    index[succ] = next_index;
                    lowlink[succ] = next_index;
                    next_index += 1;
                    stack.push(succ);
                    on_stack.set(succ, true);
                    call_stack.push((succ, successors(succ), 0));
                } else if on_stack[succ] {
                    lowlink[node] = lowlink[node].min(index[succ]);
                }
                continue;
            }

            call_stack.pop();
            if let Some(parent) = call_stack.last() {
                lowlink[parent.0] = lowlink[parent.0].min(lowlink[node]);
            }

            if lowlink[node] == index[node] {
                let mut component = Vec::new();
                while let Some(member) = stack.pop() {
                    on_stack.set(member, false);
                    component.push(member);
                    if member == node {
                        break;
                    }
                }
                component.sort_unstable();
                components.push(component);
            }
        }
    }

    components
}

/// Bottom strongly connected components of the subgraph induced by `states`
///
/// A component is bottom if no choice of its states leads outside of it.
pub fn bottom_sccs(matrix: &SparseMatrix, states: &BitSlice) -> Vec<Vec<usize>> {
    let sccs = strongly_connected_components(matrix, states, None);
    let mut component_of = vec![UNVISITED; matrix.num_states()];
    for (i, scc) in sccs.iter().enumerate() {
        for &s in scc {
            component_of[s] = i;
        }
    }

    let bsccs = sccs
        .into_iter()
        .enumerate()
        .filter(|(i, scc)| {
            scc.iter()
                .all(|&s| matrix.successors(s).all(|succ| component_of[succ] == *i))
        })
        .map(|(_, scc)| scc)
        .collect::<Vec<_>>();

    debug!("Found {} bottom strongly connected components", bsccs.len());
    bsccs
}

/// A maximal end component together with the choices that stay inside it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndComponent {
    /// States of the end component, sorted
    pub states: Vec<usize>,
    /// Choices of the states that never leave the end component
    pub choices: Vec<usize>,
}

/// Maximal end components of the sub-MDP induced by `states`
///
/// Repeatedly computes the SCCs of the sub-MDP and removes all choices
/// leaving their SCC, as well as states without any remaining choice, until
/// nothing changes.
pub fn maximal_end_components(matrix: &SparseMatrix, states: &BitSlice) -> Vec<EndComponent> {
    let n = matrix.num_states();
    let mut candidates = states.to_bitvec();
    let mut enabled = bitvec![0; matrix.num_choices()];
    for s in candidates.iter_ones() {
        for c in matrix.choices(s) {
            enabled.set(c, true);
        }
    }

    let mut component_of = vec![UNVISITED; n];
    loop {
        let sccs = strongly_connected_components(matrix, &candidates, Some(&enabled));
        component_of.fill(UNVISITED);
        for (i, scc) in sccs.iter().enumerate() {
            for &s in scc {
                component_of[s] = i;
            }
        }

        let mut changed = false;
        for (i, scc) in sccs.iter().enumerate() {
            for &s in scc {
                let mut any_enabled = false;
                for c in matrix.choices(s) {
                    if !enabled[c] {
                        continue;
                    }
                    if matrix.row_columns(c).iter().any(|&t| component_of[t] != i) {
                        enabled.set(c, false);
                        changed = true;
                    } else {
                        any_enabled = true;
                    }
                }
                if !any_enabled {
                    candidates.set(s, false);
                    changed = true;
                }
            }
        }

        if !changed {
            let mecs = sccs
                .into_iter()
                .map(|scc| {
                    let choices = scc
                        .iter()
                        .flat_map(|&s| matrix.choices(s).filter(|&c| enabled[c]))
                        .collect();
                    EndComponent {
                        states: scc,
                        choices,
                    }
                })
                .collect::<Vec<_>>();
            debug!("Found {} maximal end components", mecs.len());
            return mecs;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse::SparseMatrixBuilder;

    fn build(choices: &[&[&[(usize, f64)]]]) -> SparseMatrix {
        let mut b = SparseMatrixBuilder::new();
        for state in choices {
            b.new_state();
            for choice in *state {
                b.add_choice(choice.iter().copied());
            }
        }
        b.build()
    }

    fn sorted(mut components: Vec<Vec<usize>>) -> Vec<Vec<usize>> {
        components.sort();
        components
    }

    #[test]
    fn test_scc() {
        // 0 <-> 1 -> 2 -> 3 -> 2, 4 alone
        let m = build(&[
            &[&[(1, 1.0)]],
            &[&[(0, 0.5), (2, 0.5)]],
            &[&[(3, 1.0)]],
            &[&[(2, 1.0)]],
            &[&[(4, 1.0)]],
        ]);
        let all = bitvec![1; 5];

        let sccs = strongly_connected_components(&m, &all, None);
        assert_eq!(sorted(sccs), vec![vec![0, 1], vec![2, 3], vec![4]]);

        let bsccs = bottom_sccs(&m, &all);
        assert_eq!(sorted(bsccs), vec![vec![2, 3], vec![4]]);
    }

    #[test]
    fn test_scc_reverse_topological_order() {
        let m = build(&[&[&[(1, 1.0)]], &[&[(2, 1.0)]], &[&[(2, 1.0)]]]);
        let sccs = strongly_connected_components(&m, &bitvec![1; 3], None);
        assert_eq!(sccs, vec![vec![2], vec![1], vec![0]]);
    }

    #[test]
    fn test_scc_restricted_to_states() {
        let m = build(&[
            &[&[(1, 1.0)]],
            &[&[(2, 1.0)]],
            &[&[(0, 1.0)]],
        ]);
        assert_eq!(
            strongly_connected_components(&m, &bitvec![1; 3], None),
            vec![vec![0, 1, 2]]
        );
        assert_eq!(
            sorted(strongly_connected_components(&m, &bitvec![1, 1, 0], None)),
            vec![vec![0], vec![1]]
        );
    }

    #[test]
    fn test_deep_chain_does_not_overflow() {
        let n = 200_000;
        let mut b = SparseMatrixBuilder::new();
        for s in 0..n {
            b.new_state();
            b.add_choice([((s + 1) % n, 1.0)]);
        }
        let m = b.build();
        let sccs = strongly_connected_components(&m, &bitvec![1; n], None);
        assert_eq!(sccs.len(), 1);
        assert_eq!(sccs[0].len(), n);
    }

    #[test]
    fn test_mec() {
        // state 0: a -> 0 (self-loop), b -> 1
        // state 1: a -> {0, 2}
        // state 2: a -> 2
        let m = build(&[
            &[&[(0, 1.0)], &[(1, 1.0)]],
            &[&[(0, 0.5), (2, 0.5)]],
            &[&[(2, 1.0)]],
        ]);
        let mut mecs = maximal_end_components(&m, &bitvec![1; 3]);
        mecs.sort_by(|a, b| a.states.cmp(&b.states));

        assert_eq!(
            mecs,
            vec![
                EndComponent {
                    states: vec![0],
                    choices: vec![0]
                },
                EndComponent {
                    states: vec![2],
                    choices: vec![3]
                },
            ]
        );
    }

    #[test]
    fn test_mec_restricted() {
        // 0 -a-> 1, 1 -a-> 0, 1 -b-> 2; without state 2 {0, 1} is an end component
        let m = build(&[
            &[&[(1, 1.0)]],
            &[&[(0, 1.0)], &[(0, 0.5), (2, 0.5)]],
            &[&[(2, 1.0)]],
        ]);
        let mecs = maximal_end_components(&m, &bitvec![1, 1, 0]);
        assert_eq!(
            mecs,
            vec![EndComponent {
                states: vec![0, 1],
                choices: vec![0, 1]
            }]
        );
    }
}
