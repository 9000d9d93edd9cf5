//! Bottom-up evaluation of state formulas on an explored state space

use bitvec::prelude::*;
use log::{debug, trace};
use pmc_automata::cache::AutomatonCompiler;
use pmc_graph::StateSpace;
use pmc_model::ModelType;
use pmc_solver::{
    Deadline, Direction, SolverOptions, SparseMatrix, ctmc,
    reachability::{
        bounded_until_probabilities, next_probabilities, restricted_steps, until_probabilities,
    },
    rewards::{cumulative_rewards, instantaneous_rewards, reachability_rewards},
    sparse::Predecessors,
    steady::{long_run_values, long_run_values_ctmc},
};

use crate::{
    FailureKind, PropertyFailure, ResultValue,
    options::ModelCheckerOptions,
    product,
    property::{PathFormula, Query, RewardObjective, StateFormula, TimeBound},
};

/// Read-only data shared by all properties checked on one state space
pub(crate) struct SharedSpace {
    pub space: StateSpace,
    pub predecessors: Predecessors,
    /// Embedded DTMC of a CTMC with its predecessors
    pub embedded: Option<(SparseMatrix, Predecessors)>,
}

impl SharedSpace {
    pub fn new(space: StateSpace) -> Self {
        let predecessors = space.matrix().predecessors();
        let embedded = space.model_type().is_continuous_time().then(|| {
            let embedded = space.matrix().normalized();
            let predecessors = embedded.predecessors();
            (embedded, predecessors)
        });
        Self {
            space,
            predecessors,
            embedded,
        }
    }
}

/// Evaluator of the formulas of a single property
pub(crate) struct Evaluator<'a> {
    pub shared: &'a SharedSpace,
    pub options: &'a ModelCheckerOptions,
    pub compiler: &'a AutomatonCompiler,
    pub deadline: Deadline,
}

impl Evaluator<'_> {
    /// Check a property and report its value in the initial states
    pub fn check(&self, formula: &StateFormula) -> Result<ResultValue, PropertyFailure> {
        let space = &self.shared.space;
        let initial = space.initial_states();

        if let StateFormula::Filter {
            kind,
            property,
            states,
        } = formula
            && !kind.is_per_state()
        {
            return self.filter_value(*kind, property, states);
        }

        if formula.is_query() {
            let first = initial.first_one().ok_or_else(|| {
                PropertyFailure::new(FailureKind::ModelError, "the model has no initial state")
            })?;
            let values = self.values(formula, initial)?;
            debug!(
                "Value of {formula} in initial state {}: {}",
                space.display_state(first),
                values[first]
            );
            return Ok(ResultValue::Number(values[first]));
        }

        let sat = self.states(formula, initial)?;
        let holds = initial.iter_ones().all(|s| sat[s]);
        debug!(
            "{formula} holds in {} of {} initial states",
            initial.iter_ones().filter(|&s| sat[s]).count(),
            initial.count_ones()
        );
        Ok(ResultValue::Bool(holds))
    }

    fn num_states(&self) -> usize {
        self.shared.space.num_states()
    }

    fn model_type(&self) -> ModelType {
        self.shared.space.model_type()
    }

    fn solver(&self) -> &SolverOptions {
        &self.options.solver
    }

    /// Matrix and predecessors of the discrete-time view of the state space,
    /// i.e., the embedded DTMC for CTMCs
    pub fn discrete(&self) -> (&SparseMatrix, &Predecessors) {
        match &self.shared.embedded {
            Some((matrix, predecessors)) => (matrix, predecessors),
            None => (self.shared.space.matrix(), &self.shared.predecessors),
        }
    }

    pub fn space(&self) -> &StateSpace {
        &self.shared.space
    }

    /// States satisfying `formula`
    ///
    /// Only the entries of the `relevant` states need to be exact.
    pub fn states(&self, formula: &StateFormula, relevant: &BitSlice) -> Result<BitVec, PropertyFailure> {
        let n = self.num_states();
        let all = bitvec![1; n];

        match formula {
            StateFormula::True => Ok(all),
            StateFormula::False => Ok(bitvec![0; n]),
            StateFormula::Expression(expr) => Ok(self.shared.space.evaluate(expr)?),
            StateFormula::Label(label) => self
                .shared
                .space
                .label(label)
                .map(BitSlice::to_bitvec)
                .ok_or_else(|| {
                    PropertyFailure::new(FailureKind::ModelError, format!("unknown label {label}"))
                }),
            StateFormula::Not(a) => Ok(!self.states(a, relevant)?),
            StateFormula::And(a, b) => {
                Ok(self.states(a, relevant)? & self.states(b, relevant)?.as_bitslice())
            }
            StateFormula::Or(a, b) => {
                Ok(self.states(a, relevant)? | self.states(b, relevant)?.as_bitslice())
            }
            StateFormula::Probability { query, .. }
            | StateFormula::Reward { query, .. }
            | StateFormula::SteadyState { query, .. } => {
                let Query::Bound(cmp, bound) = query else {
                    return Err(PropertyFailure::unsupported(format!(
                        "numeric query {formula} used as a state formula"
                    )));
                };
                let values = self.values(formula, relevant)?;
                let sat = values
                    .iter()
                    .map(|v| cmp.holds(*v, *bound))
                    .collect::<BitVec>();
                trace!("{formula} holds in {} states", sat.count_ones());
                Ok(sat)
            }
            StateFormula::Filter {
                kind,
                property,
                states,
            } => {
                if kind.is_per_state() {
                    return self.filter_extremum_states(*kind, property, states);
                }
                match self.filter_value(*kind, property, states)? {
                    ResultValue::Bool(holds) => Ok(BitVec::repeat(holds, n)),
                    _ => Err(PropertyFailure::unsupported(format!(
                        "numeric filter {formula} used as a state formula"
                    ))),
                }
            }
        }
    }

    /// Value of the operator `formula` in every state
    pub fn values(&self, formula: &StateFormula, relevant: &BitSlice) -> Result<Vec<f64>, PropertyFailure> {
        self.deadline.check()?;
        match formula {
            StateFormula::Probability {
                direction,
                query,
                path,
            } => {
                let direction = self.resolve_direction(*direction, query, "P")?;
                self.path_probabilities(path, direction, relevant)
            }
            StateFormula::Reward {
                structure,
                direction,
                query,
                objective,
            } => {
                let direction = self.resolve_direction(*direction, query, "R")?;
                self.reward_values(structure.as_deref(), direction, objective)
            }
            StateFormula::SteadyState { formula: target, .. } => self.steady_state_values(target),
            StateFormula::Filter {
                kind,
                property,
                states,
            } if !kind.is_per_state() => match self.filter_value(*kind, property, states)? {
                ResultValue::Number(v) => Ok(vec![v; self.num_states()]),
                _ => Err(PropertyFailure::unsupported(format!(
                    "{formula} has no numeric value"
                ))),
            },
            _ => Err(PropertyFailure::unsupported(format!(
                "{formula} has no numeric value"
            ))),
        }
    }

    /// Direction of an operator
    ///
    /// On Markov chains the direction is irrelevant. On MDPs, a bound
    /// determines the direction if none is given: lower bounds need to hold
    /// for the minimizing scheduler, upper bounds for the maximizing one.
    fn resolve_direction(
        &self,
        direction: Option<Direction>,
        query: &Query,
        operator: &str,
    ) -> Result<Direction, PropertyFailure> {
        if !self.model_type().is_nondeterministic() {
            return Ok(direction.unwrap_or(Direction::Maximize));
        }
        match (direction, query) {
            (Some(d), _) => Ok(d),
            (None, Query::Bound(cmp, _)) if cmp.is_lower_bound() => Ok(Direction::Minimize),
            (None, Query::Bound(_, _)) => Ok(Direction::Maximize),
            (None, Query::Value) => Err(PropertyFailure::unsupported(format!(
                "{operator}=? on an MDP needs {operator}min or {operator}max"
            ))),
        }
    }

    /// Probability of the paths satisfying `path`
    pub fn path_probabilities(
        &self,
        path: &PathFormula,
        direction: Direction,
        relevant: &BitSlice,
    ) -> Result<Vec<f64>, PropertyFailure> {
        let n = self.num_states();
        let all = bitvec![1; n];

        match path {
            PathFormula::State(s) => {
                let sat = self.states(s, relevant)?;
                Ok(indicator(&sat))
            }
            PathFormula::Next(a) if a.as_state().is_some() => {
                let target = self.operand(a)?;
                let (matrix, _) = self.discrete();
                Ok(next_probabilities(matrix, &target, direction))
            }
            PathFormula::Until(a, b, bound) if a.as_state().is_some() && b.as_state().is_some() => {
                let phi = self.operand(a)?;
                let psi = self.operand(b)?;
                self.until_values(&phi, &psi, *bound, direction)
            }
            PathFormula::Finally(a, bound) if a.as_state().is_some() => {
                let psi = self.operand(a)?;
                self.until_values(&all, &psi, *bound, direction)
            }
            PathFormula::Globally(a, bound) if a.as_state().is_some() => {
                // G a = !(F !a)
                let bad = !self.operand(a)?;
                let values = self.until_values(&all, &bad, *bound, direction.opposite())?;
                Ok(complement(values))
            }
            PathFormula::Not(a) if is_simple(a) => {
                let values = self.path_probabilities(a, direction.opposite(), relevant)?;
                Ok(complement(values))
            }
            _ => {
                if let Some(bound) = path.time_bounds().first() {
                    return Err(PropertyFailure::unsupported(format!(
                        "time bound {bound} inside of the LTL formula {path}"
                    )));
                }
                product::ltl_probabilities(self, path, direction, relevant)
            }
        }
    }

    /// States satisfying the state formula wrapped by a simple path formula
    fn operand(&self, path: &PathFormula) -> Result<BitVec, PropertyFailure> {
        match path.as_state() {
            Some(s) => self.states(s, &bitvec![1; self.num_states()]),
            None => Err(PropertyFailure::unsupported(format!(
                "{path} is not a state formula"
            ))),
        }
    }

    /// Probability of `phi U psi` with an optional time bound
    fn until_values(
        &self,
        phi: &BitSlice,
        psi: &BitSlice,
        bound: Option<TimeBound>,
        direction: Direction,
    ) -> Result<Vec<f64>, PropertyFailure> {
        let solver = self.solver();
        let deadline = &self.deadline;
        let (matrix, predecessors) = self.discrete();

        let Some(bound) = bound else {
            return Ok(until_probabilities(
                matrix,
                predecessors,
                phi,
                psi,
                direction,
                solver,
                deadline,
            )?);
        };

        if self.model_type().is_continuous_time() {
            let rates = self.shared.space.matrix();
            let base = match bound.upper() {
                Some(upper) => ctmc::bounded_until(
                    rates,
                    &self.shared.predecessors,
                    phi,
                    psi,
                    upper - bound.lower(),
                    solver,
                    deadline,
                )?,
                None => {
                    until_probabilities(matrix, predecessors, phi, psi, direction, solver, deadline)?
                }
            };
            if bound.lower() > 0.0 {
                return Ok(ctmc::restricted_transient(
                    rates,
                    phi,
                    base,
                    bound.lower(),
                    solver,
                    deadline,
                )?);
            }
            return Ok(base);
        }

        let lower = steps(bound.lower())?;
        let base = match bound.upper() {
            Some(upper) => bounded_until_probabilities(
                matrix,
                predecessors,
                phi,
                psi,
                steps(upper)? - lower,
                direction,
                solver,
                deadline,
            )?,
            None => until_probabilities(matrix, predecessors, phi, psi, direction, solver, deadline)?,
        };
        if lower > 0 {
            return Ok(restricted_steps(
                matrix, phi, base, lower, direction, solver, deadline,
            )?);
        }
        Ok(base)
    }

    /// Expected rewards of the reward structure `structure`
    fn reward_values(
        &self,
        structure: Option<&str>,
        direction: Direction,
        objective: &RewardObjective,
    ) -> Result<Vec<f64>, PropertyFailure> {
        let space = &self.shared.space;
        let rewards = space.rewards(structure).ok_or_else(|| {
            PropertyFailure::new(
                FailureKind::ModelError,
                match structure {
                    Some(name) => format!("unknown reward structure \"{name}\""),
                    None => "the model has no reward structure".to_string(),
                },
            )
        })?;
        let solver = self.solver();
        let deadline = &self.deadline;
        let continuous = self.model_type().is_continuous_time();
        let matrix = space.matrix();

        match objective {
            RewardObjective::Reachability(target) => {
                let target = self.states(target, &bitvec![1; self.num_states()])?;
                let (discrete, predecessors) = self.discrete();
                let values = if continuous {
                    // the embedded chain collects the reward rate times the
                    // expected sojourn time per visit
                    let embedded_rewards = ctmc::exit_rates(matrix)
                        .into_iter()
                        .zip(rewards.choice_rewards())
                        .map(|(exit, r)| if exit > 0.0 { r / exit } else { 0.0 })
                        .collect::<Vec<_>>();
                    reachability_rewards(
                        discrete,
                        predecessors,
                        &embedded_rewards,
                        &target,
                        direction,
                        solver,
                        deadline,
                    )?
                } else {
                    reachability_rewards(
                        discrete,
                        predecessors,
                        rewards.choice_rewards(),
                        &target,
                        direction,
                        solver,
                        deadline,
                    )?
                };
                Ok(values)
            }
            RewardObjective::Cumulative(t) if continuous => Ok(ctmc::cumulative_rewards(
                matrix,
                rewards.choice_rewards(),
                *t,
                solver,
                deadline,
            )?),
            RewardObjective::Cumulative(t) => Ok(cumulative_rewards(
                matrix,
                rewards.choice_rewards(),
                steps(*t)?,
                direction,
                solver,
                deadline,
            )?),
            RewardObjective::Instantaneous(t) if continuous => Ok(ctmc::instantaneous_rewards(
                matrix,
                rewards.state_rewards(),
                *t,
                solver,
                deadline,
            )?),
            RewardObjective::Instantaneous(t) => Ok(instantaneous_rewards(
                matrix,
                rewards.state_rewards(),
                steps(*t)?,
                direction,
                solver,
                deadline,
            )?),
            RewardObjective::LongRunAverage => match self.model_type() {
                ModelType::Mdp => Err(PropertyFailure::unsupported(
                    "long-run average rewards of MDPs",
                )),
                ModelType::Ctmc => Ok(long_run_values_ctmc(
                    matrix,
                    &self.shared.predecessors,
                    rewards.choice_rewards(),
                    solver,
                    deadline,
                )?),
                ModelType::Dtmc => Ok(long_run_values(
                    matrix,
                    &self.shared.predecessors,
                    rewards.choice_rewards(),
                    solver,
                    deadline,
                )?),
            },
        }
    }

    /// Long-run probability of being in a state satisfying `target`
    fn steady_state_values(&self, target: &StateFormula) -> Result<Vec<f64>, PropertyFailure> {
        let sat = self.states(target, &bitvec![1; self.num_states()])?;
        let values = indicator(&sat);
        let matrix = self.shared.space.matrix();
        let predecessors = &self.shared.predecessors;

        match self.model_type() {
            ModelType::Mdp => Err(PropertyFailure::unsupported(
                "steady-state probabilities of MDPs",
            )),
            ModelType::Ctmc => Ok(long_run_values_ctmc(
                matrix,
                predecessors,
                &values,
                self.solver(),
                &self.deadline,
            )?),
            ModelType::Dtmc => Ok(long_run_values(
                matrix,
                predecessors,
                &values,
                self.solver(),
                &self.deadline,
            )?),
        }
    }
}

/// Whether a path formula is checked without an automaton
fn is_simple(path: &PathFormula) -> bool {
    match path {
        PathFormula::State(_) => true,
        PathFormula::Next(a) | PathFormula::Finally(a, _) | PathFormula::Globally(a, _) => {
            a.as_state().is_some()
        }
        PathFormula::Until(a, b, _) => a.as_state().is_some() && b.as_state().is_some(),
        PathFormula::Not(a) => is_simple(a),
        _ => false,
    }
}

/// Number of steps of a discrete time bound
fn steps(t: f64) -> Result<usize, PropertyFailure> {
    if t.fract() != 0.0 || t < 0.0 || !t.is_finite() {
        return Err(PropertyFailure::unsupported(format!(
            "{t} is not a valid number of steps"
        )));
    }
    Ok(t as usize)
}

pub(crate) fn indicator(set: &BitSlice) -> Vec<f64> {
    set.iter()
        .by_vals()
        .map(|b| if b { 1.0 } else { 0.0 })
        .collect()
}

fn complement(values: Vec<f64>) -> Vec<f64> {
    values.into_iter().map(|v| 1.0 - v).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s() -> StateFormula {
        StateFormula::True
    }

    #[test]
    fn test_is_simple() {
        assert!(is_simple(&PathFormula::eventually(s())));
        assert!(is_simple(&PathFormula::until(s(), s()).not()));
        assert!(is_simple(&PathFormula::bounded_always(s(), TimeBound::at_most(3.0))));
        assert!(!is_simple(&PathFormula::eventually(PathFormula::always(s()))));
        assert!(!is_simple(&PathFormula::state(s()).and(s())));
        assert!(!is_simple(&PathFormula::release(s(), s())));
    }

    #[test]
    fn test_steps() {
        assert_eq!(steps(4.0), Ok(4));
        assert!(steps(2.5).is_err());
        assert!(steps(-1.0).is_err());
        assert!(steps(f64::INFINITY).is_err());
    }

    #[test]
    fn test_helpers() {
        assert_eq!(indicator(bits![0, 1, 1]), vec![0.0, 1.0, 1.0]);
        assert_eq!(complement(vec![0.25, 1.0]), vec![0.75, 0.0]);
    }
}
