//! LTL path formulas on the product of the state space with a deterministic
//! Rabin automaton
//!
//! The maximal state sub-formulas of the path formula become the atomic
//! propositions of the automaton. Product states `(s, q)` are created on
//! demand, starting from `(s, δ(q₀, L(s)))` for every relevant model state
//! `s`, where `L(s)` is the set of propositions holding in `s`. A model
//! transition `s → s'` yields the product transition
//! `(s, q) → (s', δ(q, L(s')))`.

use std::collections::{HashMap, hash_map::Entry};

use bitvec::prelude::*;
use log::{debug, info};
use pmc_automata::{MAX_PROPOSITIONS, ltl::Ltl, rabin::DeterministicAutomaton};
use pmc_solver::{
    Direction, SparseMatrix, SparseMatrixBuilder,
    components::{bottom_sccs, maximal_end_components},
    reachability::until_probabilities,
};

use crate::{
    FailureKind, PropertyFailure,
    pctl::Evaluator,
    property::{PathFormula, StateFormula},
};

/// Number of product states between two deadline checks
const DEADLINE_CHECK_INTERVAL: usize = 1 << 12;

/// Probability of the paths satisfying the LTL formula `path` from every
/// `relevant` state
///
/// Entries of other states are 0.
pub(crate) fn ltl_probabilities(
    evaluator: &Evaluator<'_>,
    path: &PathFormula,
    direction: Direction,
    relevant: &BitSlice,
) -> Result<Vec<f64>, PropertyFailure> {
    let nondeterministic = evaluator.space().model_type().is_nondeterministic();
    if nondeterministic && direction == Direction::Minimize {
        // Pmin(φ) = 1 - Pmax(¬φ)
        let negated = path.clone().not();
        let max = ltl_probabilities(evaluator, &negated, Direction::Maximize, relevant)?;
        return Ok(max
            .into_iter()
            .enumerate()
            .map(|(s, v)| if relevant[s] { 1.0 - v } else { 0.0 })
            .collect());
    }

    let mut propositions = Vec::new();
    let ltl = to_ltl(path, &mut propositions)?;
    if propositions.len() > MAX_PROPOSITIONS {
        return Err(PropertyFailure::unsupported(format!(
            "{path} has {} atomic propositions, at most {MAX_PROPOSITIONS} are supported",
            propositions.len()
        )));
    }

    let all = bitvec![1; evaluator.space().num_states()];
    let sets = propositions
        .iter()
        .map(|p| evaluator.states(p, &all))
        .collect::<Result<Vec<_>, _>>()?;
    let letters = (0..evaluator.space().num_states())
        .map(|s| {
            sets.iter()
                .enumerate()
                .filter(|(_, set)| set[s])
                .fold(0u64, |letter, (i, _)| letter | (1 << i))
        })
        .collect::<Vec<_>>();

    let mut automaton = evaluator.compiler.compile(&ltl)?;
    let (matrix, _) = evaluator.discrete();
    let product = Product::build(evaluator, matrix, automaton.as_mut(), &letters, relevant)?;
    info!(
        "Product of {} states for {path} ({} automaton states)",
        product.num_states(),
        automaton.num_states()
    );

    let accepting = product.accepting_states(automaton.as_ref(), nondeterministic);
    debug!("{} accepting product states", accepting.count_ones());

    let predecessors = product.matrix.predecessors();
    let all = bitvec![1; product.num_states()];
    let values = until_probabilities(
        &product.matrix,
        &predecessors,
        &all,
        &accepting,
        Direction::Maximize,
        &evaluator.options.solver,
        &evaluator.deadline,
    )?;

    let mut result = vec![0.0; evaluator.space().num_states()];
    for (s, p) in product.seeds {
        result[s] = values[p];
    }
    Ok(result)
}

/// Translate a path formula into LTL over its maximal state sub-formulas
fn to_ltl<'a>(
    path: &'a PathFormula,
    propositions: &mut Vec<&'a StateFormula>,
) -> Result<Ltl, PropertyFailure> {
    let ltl = match path {
        PathFormula::State(s) => match s.as_ref() {
            StateFormula::True => Ltl::True,
            StateFormula::False => Ltl::False,
            s => match propositions.iter().position(|p| *p == s) {
                Some(i) => Ltl::ap(i),
                None => {
                    propositions.push(s);
                    Ltl::ap(propositions.len() - 1)
                }
            },
        },
        PathFormula::Not(a) => to_ltl(a, propositions)?.not(),
        PathFormula::And(a, b) => to_ltl(a, propositions)?.and(to_ltl(b, propositions)?),
        PathFormula::Or(a, b) => to_ltl(a, propositions)?.or(to_ltl(b, propositions)?),
        PathFormula::Implies(a, b) => {
            to_ltl(a, propositions)?.implies(to_ltl(b, propositions)?)
        }
        PathFormula::Next(a) => to_ltl(a, propositions)?.next(),
        PathFormula::Until(a, b, None) => {
            to_ltl(a, propositions)?.until(to_ltl(b, propositions)?)
        }
        PathFormula::Release(a, b) => {
            to_ltl(a, propositions)?.release(to_ltl(b, propositions)?)
        }
        PathFormula::Finally(a, None) => to_ltl(a, propositions)?.finally(),
        PathFormula::Globally(a, None) => to_ltl(a, propositions)?.globally(),
        PathFormula::Until(_, _, Some(_))
        | PathFormula::Finally(_, Some(_))
        | PathFormula::Globally(_, Some(_)) => {
            return Err(PropertyFailure::unsupported(format!(
                "time-bounded operator {path} inside of an LTL formula"
            )));
        }
    };
    Ok(ltl)
}

/// Reachable part of the product of a state space with an automaton
struct Product {
    matrix: SparseMatrix,
    /// Model and automaton state of every product state
    states: Vec<(usize, usize)>,
    /// Product state of every relevant model state
    seeds: Vec<(usize, usize)>,
}

impl Product {
    fn build(
        evaluator: &Evaluator<'_>,
        matrix: &SparseMatrix,
        automaton: &mut dyn DeterministicAutomaton,
        letters: &[u64],
        relevant: &BitSlice,
    ) -> Result<Self, PropertyFailure> {
        let max_states = evaluator.options.build.max_states;
        let mut index: HashMap<(usize, usize), usize> = HashMap::new();
        let mut states = Vec::new();

        let mut lookup = |s: usize, q: usize, states: &mut Vec<(usize, usize)>| match index.entry((s, q)) {
            Entry::Occupied(e) => Ok(*e.get()),
            Entry::Vacant(e) => {
                if max_states.is_some_and(|max| states.len() >= max) {
                    return Err(PropertyFailure::new(
                        FailureKind::ResourceExhausted,
                        format!(
                            "Product exceeds the limit of {} states",
                            states.len()
                        ),
                    ));
                }
                states.push((s, q));
                Ok(*e.insert(states.len() - 1))
            }
        };

        let q0 = automaton.initial_state();
        let mut seeds = Vec::new();
        for s in relevant.iter_ones() {
            let q = automaton.successor(q0, letters[s]);
            seeds.push((s, lookup(s, q, &mut states)?));
        }

        let mut builder = SparseMatrixBuilder::new();
        let mut next = 0;
        while next < states.len() {
            if next % DEADLINE_CHECK_INTERVAL == 0 {
                evaluator.deadline.check()?;
            }
            let (s, q) = states[next];
            builder.new_state();
            for choice in matrix.choices(s) {
                let mut entries = Vec::new();
                for (t, p) in matrix.row(choice) {
                    let q_next = automaton.successor(q, letters[t]);
                    entries.push((lookup(t, q_next, &mut states)?, p));
                }
                builder.add_choice(entries);
            }
            next += 1;
        }

        Ok(Self {
            matrix: builder.build(),
            states,
            seeds,
        })
    }

    fn num_states(&self) -> usize {
        self.states.len()
    }

    /// States from which the acceptance condition can be fulfilled almost
    /// surely by staying inside of an accepting component
    ///
    /// For Markov chains these are the bottom SCCs that, for some Rabin pair,
    /// contain an `Inf` state but no `Fin` state. For MDPs these are the
    /// maximal end components without `Fin` states of a pair that contain an
    /// `Inf` state of that pair.
    fn accepting_states(&self, automaton: &dyn DeterministicAutomaton, nondeterministic: bool) -> BitVec {
        let n = self.num_states();
        let mut accepting = bitvec![0; n];
        let pairs = 0..automaton.num_pairs();

        if !nondeterministic {
            for bscc in bottom_sccs(&self.matrix, &bitvec![1; n]) {
                let accepted = pairs.clone().any(|i| {
                    bscc.iter().any(|&p| automaton.is_inf(self.states[p].1, i))
                        && !bscc.iter().any(|&p| automaton.is_fin(self.states[p].1, i))
                });
                if accepted {
                    for p in bscc {
                        accepting.set(p, true);
                    }
                }
            }
            return accepting;
        }

        for i in pairs {
            let allowed = self
                .states
                .iter()
                .map(|&(_, q)| !automaton.is_fin(q, i))
                .collect::<BitVec>();
            for mec in maximal_end_components(&self.matrix, &allowed) {
                if mec.states.iter().any(|&p| automaton.is_inf(self.states[p].1, i)) {
                    for p in mec.states {
                        accepting.set(p, true);
                    }
                }
            }
        }
        accepting
    }
}
