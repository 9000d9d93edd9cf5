//! Breadth-first exploration of the reachable state space

use std::collections::{HashMap, VecDeque};

use bitvec::prelude::*;
use log::{debug, info, trace, warn};
use pmc_model::{
    Assignment, Command, Model, ModelType,
    expressions::{Action, EvaluationError, Expression, Value, Variable},
};
use pmc_solver::{Deadline, SparseMatrixBuilder};

use crate::{
    BuildError, BuildOptions, DeadlockPolicy, StateSpace,
    rewards::{RewardEvaluator, RewardVectors},
    state::{State, StateValuation, VariableLayout},
};

/// Number of explored states between two deadline checks
const DEADLINE_CHECK_INTERVAL: usize = 1024;

/// A (possibly synchronized) command enabled in a state, resolved into its
/// successor distribution
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Transition {
    /// Action of the command, `None` for unlabelled commands
    pub action: Option<Action>,
    /// Successor states with their probability or rate
    pub branches: Vec<(State, f64)>,
}

impl Transition {
    /// Sum of the weights of all branches
    pub fn total_weight(&self) -> f64 {
        self.branches.iter().map(|(_, w)| w).sum()
    }
}

/// Generates the enabled transitions of a state
pub(crate) struct Explorer<'a> {
    model: &'a Model,
    layout: &'a VariableLayout,
    options: &'a BuildOptions,
    /// Every action together with the indices of the modules that have it in
    /// their alphabet
    synchronization: Vec<(&'a Action, Vec<usize>)>,
}

impl<'a> Explorer<'a> {
    pub fn new(model: &'a Model, layout: &'a VariableLayout, options: &'a BuildOptions) -> Self {
        let mut synchronization: Vec<(&Action, Vec<usize>)> = Vec::new();
        for (i, module) in model.modules().iter().enumerate() {
            for action in module.alphabet() {
                match synchronization.iter_mut().find(|(a, _)| *a == action) {
                    Some((_, modules)) => modules.push(i),
                    None => synchronization.push((action, vec![i])),
                }
            }
        }
        synchronization.sort_by(|(a, _), (b, _)| a.cmp(b));

        Self {
            model,
            layout,
            options,
            synchronization,
        }
    }

    fn evaluation_error(&self, state: &State, error: EvaluationError) -> BuildError {
        BuildError::Evaluation {
            context: format!("state {}", self.layout.display_state(state)),
            error,
        }
    }

    /// All transitions enabled in `state`
    ///
    /// Unlabelled commands yield one transition each, labelled commands are
    /// combined with one enabled command of every other module sharing the
    /// action.
    pub fn transitions(&self, state: &State) -> Result<Vec<Transition>, BuildError> {
        let valuation = StateValuation::new(self.layout, state);
        let mut transitions = Vec::new();
        let mut labelled: Vec<Vec<&Command>> = vec![Vec::new(); self.model.modules().len()];

        for (i, module) in self.model.modules().iter().enumerate() {
            for cmd in module.commands() {
                let enabled = cmd
                    .guard()
                    .evaluate_bool(&valuation)
                    .map_err(|e| self.evaluation_error(state, e))?;
                if !enabled {
                    continue;
                }
                match cmd.action() {
                    None => transitions.push(self.combine(state, &valuation, None, &[cmd])?),
                    Some(_) => labelled[i].push(cmd),
                }
            }
        }

        for (action, modules) in &self.synchronization {
            let mut combinations: Vec<Vec<&Command>> = vec![Vec::new()];
            for &m in modules {
                let enabled = labelled[m]
                    .iter()
                    .filter(|c| c.action() == Some(*action))
                    .collect::<Vec<_>>();
                combinations = combinations
                    .into_iter()
                    .flat_map(|combination| {
                        enabled.iter().map(move |&&cmd| {
                            let mut extended = combination.clone();
                            extended.push(cmd);
                            extended
                        })
                    })
                    .collect();
                if combinations.is_empty() {
                    break;
                }
            }

            for combination in combinations {
                transitions.push(self.combine(
                    state,
                    &valuation,
                    Some(*action),
                    &combination,
                )?);
            }
        }

        Ok(transitions)
    }

    /// Resolve the product of the updates of `commands` into a transition
    fn combine(
        &self,
        state: &State,
        valuation: &StateValuation<'_>,
        action: Option<&Action>,
        commands: &[&Command],
    ) -> Result<Transition, BuildError> {
        let mut branches: Vec<(f64, Vec<&Assignment>)> = vec![(1.0, Vec::new())];

        for cmd in commands {
            let mut weights = Vec::with_capacity(cmd.updates().len());
            for update in cmd.updates() {
                let w = update
                    .weight()
                    .evaluate_real(valuation)
                    .map_err(|e| self.evaluation_error(state, e))?;
                if !w.is_finite() || w < 0.0 {
                    return Err(BuildError::InvalidWeight {
                        state: self.layout.display_state(state),
                        command: cmd.to_string(),
                        weight: w,
                    });
                }
                weights.push(w);
            }
            self.check_distribution(state, cmd, &weights)?;

            let mut next = Vec::with_capacity(branches.len() * weights.len());
            for (w_prefix, assignments) in &branches {
                for (update, w) in cmd.updates().iter().zip(&weights) {
                    if *w == 0.0 {
                        continue;
                    }
                    let mut combined = assignments.clone();
                    combined.extend(update.assignments());
                    next.push((w_prefix * w, combined));
                }
            }
            branches = next;
        }

        let branches = branches
            .into_iter()
            .map(|(w, assignments)| Ok((self.apply(state, valuation, action, &assignments)?, w)))
            .collect::<Result<Vec<_>, BuildError>>()?;

        Ok(Transition {
            action: action.cloned(),
            branches,
        })
    }

    /// DTMC and MDP commands need to describe probability distributions
    fn check_distribution(
        &self,
        state: &State,
        cmd: &Command,
        weights: &[f64],
    ) -> Result<(), BuildError> {
        if self.model.model_type() == ModelType::Ctmc {
            return Ok(());
        }

        let sum = weights.iter().sum::<f64>();
        if (sum - 1.0).abs() > self.options.probability_tolerance {
            return Err(BuildError::InvalidDistribution {
                state: self.layout.display_state(state),
                command: cmd.to_string(),
                sum,
            });
        }
        Ok(())
    }

    /// Apply the assignments simultaneously, evaluating all right-hand sides
    /// in `state`
    fn apply(
        &self,
        state: &State,
        valuation: &StateValuation<'_>,
        action: Option<&Action>,
        assignments: &[&Assignment],
    ) -> Result<State, BuildError> {
        let mut values = state.values().to_vec();
        let mut written: Vec<&Variable> = Vec::with_capacity(assignments.len());

        for a in assignments {
            if written.contains(&a.variable()) {
                return Err(BuildError::ConflictingAssignment {
                    state: self.layout.display_state(state),
                    action: action.cloned(),
                    variable: a.variable().clone(),
                });
            }
            written.push(a.variable());

            let i = self.layout.index_of(a.variable()).ok_or_else(|| {
                self.evaluation_error(
                    state,
                    EvaluationError::UnknownVariable(a.variable().clone()),
                )
            })?;
            let value = a
                .value()
                .evaluate(valuation)
                .map_err(|e| self.evaluation_error(state, e))?;
            values[i] = self.layout.encode(i, value).map_err(|e| match e {
                BuildError::VariableOutOfBounds {
                    variable, value, ..
                } => BuildError::VariableOutOfBounds {
                    variable,
                    value,
                    state: self.layout.display_state(state),
                },
                e => e,
            })?;
        }

        Ok(State::new(values))
    }
}

/// Compute the initial states of a model
///
/// Initial states count against [`BuildOptions::max_states`].
fn initial_states(
    model: &Model,
    layout: &VariableLayout,
    options: &BuildOptions,
    deadline: &Deadline,
) -> Result<Vec<State>, BuildError> {
    match model.init() {
        None => {
            let empty = HashMap::<Variable, Value>::new();
            let values = model
                .variables()
                .enumerate()
                .map(|(i, decl)| {
                    let value = decl.init_or_default().evaluate(&empty).map_err(|error| {
                        BuildError::Evaluation {
                            context: format!("initial value of {}", decl.variable()),
                            error,
                        }
                    })?;
                    layout.encode(i, value)
                })
                .collect::<Result<Vec<_>, _>>()?;
            if options.max_states == Some(0) {
                return Err(BuildError::StateLimitExceeded(0));
            }
            Ok(vec![State::new(values)])
        }
        Some(init) => {
            debug!(
                "Enumerating {} valuations to find the initial states",
                layout.num_valuations()
            );
            let mut states = Vec::new();
            for (i, state) in layout.valuations().enumerate() {
                if i % DEADLINE_CHECK_INTERVAL == 0 && deadline.is_expired() {
                    return Err(BuildError::Timeout);
                }
                if satisfies(init, layout, &state)? {
                    if options.max_states.is_some_and(|max| states.len() >= max) {
                        return Err(BuildError::StateLimitExceeded(states.len()));
                    }
                    states.push(state);
                }
            }
            if states.is_empty() {
                return Err(BuildError::NoInitialState);
            }
            Ok(states)
        }
    }
}

fn satisfies(expr: &Expression, layout: &VariableLayout, state: &State) -> Result<bool, BuildError> {
    expr.evaluate_bool(&StateValuation::new(layout, state))
        .map_err(|error| BuildError::Evaluation {
            context: format!("state {}", layout.display_state(state)),
            error,
        })
}

/// Explore the reachable state space of a closed model
pub(crate) fn explore(
    model: &Model,
    options: &BuildOptions,
    deadline: &Deadline,
) -> Result<StateSpace, BuildError> {
    if !model.is_closed() {
        return Err(BuildError::OpenModel);
    }

    let layout = VariableLayout::new(model)?;
    let explorer = Explorer::new(model, &layout, options);
    let mut rewards = model
        .reward_structures()
        .iter()
        .map(|r| RewardEvaluator::new(r, model.model_type()))
        .collect::<Vec<_>>();

    let mut states = Vec::new();
    let mut index: HashMap<State, usize> = HashMap::new();
    let mut queue = VecDeque::new();

    let initial = initial_states(model, &layout, options, deadline)?;
    if initial.len() > 1 {
        info!("Model has {} initial states", initial.len());
    }
    for state in &initial {
        index.insert(state.clone(), states.len());
        queue.push_back(states.len());
        states.push(state.clone());
    }

    let mut builder = SparseMatrixBuilder::new();
    let mut deadlocks = BitVec::new();
    let mut fixed_deadlocks = 0usize;

    while let Some(current) = queue.pop_front() {
        if current % DEADLINE_CHECK_INTERVAL == 0 && deadline.is_expired() {
            return Err(BuildError::Timeout);
        }

        let state = states[current].clone();
        let transitions = explorer.transitions(&state)?;
        trace!(
            "State {current} {}: {} transitions",
            layout.display_state(&state),
            transitions.len()
        );

        let mut resolve = |succ: State| -> Result<usize, BuildError> {
            if let Some(&i) = index.get(&succ) {
                return Ok(i);
            }
            let i = states.len();
            if options.max_states.is_some_and(|max| i >= max) {
                return Err(BuildError::StateLimitExceeded(i));
            }
            index.insert(succ.clone(), i);
            states.push(succ);
            queue.push_back(i);
            Ok(i)
        };

        let valuation = StateValuation::new(&layout, &state);
        builder.new_state();
        deadlocks.push(transitions.is_empty());

        if transitions.is_empty() {
            if options.deadlock_policy == DeadlockPolicy::Fatal {
                return Err(BuildError::Deadlock {
                    state: layout.display_state(&state),
                });
            }
            fixed_deadlocks += 1;
            builder.add_choice([(current, 1.0)]);
            for r in rewards.iter_mut() {
                r.add_deadlock(&valuation)?;
            }
            continue;
        }

        match model.model_type() {
            ModelType::Dtmc => {
                let k = transitions.len() as f64;
                let mut entries = Vec::new();
                for t in &transitions {
                    for (succ, p) in &t.branches {
                        entries.push((resolve(succ.clone())?, p / k));
                    }
                }
                builder.add_choice(entries);
            }
            ModelType::Ctmc => {
                let mut entries = Vec::new();
                for t in &transitions {
                    for (succ, rate) in &t.branches {
                        entries.push((resolve(succ.clone())?, *rate));
                    }
                }
                builder.add_choice(entries);
            }
            ModelType::Mdp => {
                for t in &transitions {
                    let entries = t
                        .branches
                        .iter()
                        .map(|(succ, p)| Ok((resolve(succ.clone())?, *p)))
                        .collect::<Result<Vec<_>, BuildError>>()?;
                    builder.add_choice(entries);
                }
            }
        }

        for r in rewards.iter_mut() {
            r.add_state(&valuation, &transitions)?;
        }
    }

    if fixed_deadlocks > 0 {
        warn!("Added self-loops to {fixed_deadlocks} deadlock states");
    }

    let matrix = builder.build();
    info!(
        "Explored {} states with {} choices and {} transitions",
        matrix.num_states(),
        matrix.num_choices(),
        matrix.num_transitions()
    );

    let mut initial_set = bitvec![0; states.len()];
    for s in &initial {
        if let Some(&i) = index.get(s) {
            initial_set.set(i, true);
        }
    }

    let reward_vectors = rewards
        .into_iter()
        .map(RewardEvaluator::finish)
        .collect::<Vec<RewardVectors>>();

    StateSpace::new(
        model,
        layout,
        states,
        matrix,
        initial_set,
        deadlocks,
        reward_vectors,
    )
}
