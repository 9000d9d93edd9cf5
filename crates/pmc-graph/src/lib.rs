//! Explicit state spaces of guarded-command models
//!
//! This crate explores the reachable states of a [`Model`] and stores them as
//! a [`StateSpace`]: a [`SparseMatrix`] with one row group per state, the
//! valuation of every state, the sets of states satisfying the labels of the
//! model and the reward vectors of all reward structures.
//!
//! # Example
//!
//! ```
//! use pmc_graph::{BuildOptions, StateSpace};
//! use pmc_model::{ModelType, VariableDeclaration, builder::*, expressions::*};
//! use pmc_solver::Deadline;
//!
//! // a coin that is flipped until it shows heads
//! let s = || Expression::var("s");
//! let module = ModuleBuilder::new("coin")
//!     .with_variable(
//!         VariableDeclaration::bounded_int("s", Expression::int(0), Expression::int(1))
//!             .with_init(Expression::int(0)),
//!     )
//!     .unwrap()
//!     .with_command(
//!         CommandBuilder::new(s().equals(Expression::int(0)))
//!             .with_update(Expression::real(0.5), [("s", Expression::int(0))])
//!             .with_update(Expression::real(0.5), [("s", Expression::int(1))])
//!             .build(),
//!     )
//!     .unwrap()
//!     .with_command(
//!         CommandBuilder::new(s().equals(Expression::int(1)))
//!             .with_deterministic_update([("s", Expression::int(1))])
//!             .build(),
//!     )
//!     .unwrap()
//!     .build();
//!
//! let model = ModelBuilder::new("coin", ModelType::Dtmc)
//!     .with_module(module)
//!     .unwrap()
//!     .build()
//!     .unwrap();
//!
//! let space = StateSpace::build(&model, &BuildOptions::default(), &Deadline::none()).unwrap();
//! assert_eq!(space.num_states(), 2);
//! assert_eq!(space.matrix().num_transitions(), 3);
//! ```

use std::{collections::HashMap, error, fmt};

use bitvec::prelude::*;
use log::{debug, info};
use pmc_model::{
    Model, ModelType,
    expressions::{Action, EvaluationError, Expression, Label, Value, Variable},
};
use pmc_solver::{Deadline, SparseMatrix};

#[cfg(feature = "config_deserialize")]
use serde::Deserialize;

mod explorer;
pub mod rewards;
pub mod state;

use rewards::RewardVectors;
use state::{State, StateValuation, VariableLayout};

/// Name of the built-in label of the initial states
pub const INIT_LABEL: &str = "init";
/// Name of the built-in label of the deadlock states
pub const DEADLOCK_LABEL: &str = "deadlock";

/// What to do with reachable states without enabled commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "config_deserialize", derive(Deserialize))]
pub enum DeadlockPolicy {
    /// Abort the construction with [`BuildError::Deadlock`]
    #[default]
    Fatal,
    /// Add a self-loop with probability (or rate) 1 to every deadlock state
    SelfLoop,
}

/// Options of the state-space construction
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "config_deserialize", derive(Deserialize), serde(default))]
pub struct BuildOptions {
    /// Treatment of deadlock states
    pub deadlock_policy: DeadlockPolicy,
    /// Maximal number of states, `None` for no limit
    pub max_states: Option<usize>,
    /// Admissible deviation of the sum of a probability distribution from 1
    pub probability_tolerance: f64,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            deadlock_policy: DeadlockPolicy::Fatal,
            max_states: None,
            probability_tolerance: 1e-6,
        }
    }
}

/// Errors that can occur while building a state space
#[derive(Debug, Clone, PartialEq)]
pub enum BuildError {
    /// The model still has constants without value
    OpenModel,
    /// An expression could not be evaluated
    Evaluation {
        /// Where the expression was evaluated
        context: String,
        /// Cause of the failure
        error: EvaluationError,
    },
    /// The lower bound of a variable exceeds its upper bound
    InvalidBounds {
        /// Variable
        variable: Variable,
        /// Evaluated lower bound
        lower: i64,
        /// Evaluated upper bound
        upper: i64,
    },
    /// A value of the wrong type is assigned to a variable
    IllTypedValue {
        /// Variable
        variable: Variable,
        /// Assigned value
        value: Value,
    },
    /// An update leaves the domain of a variable
    VariableOutOfBounds {
        /// Variable
        variable: Variable,
        /// Assigned value
        value: i64,
        /// State in which the update was applied
        state: String,
    },
    /// The weight of an update is negative, infinite or NaN
    InvalidWeight {
        /// State in which the weight was evaluated
        state: String,
        /// Command
        command: String,
        /// Weight
        weight: f64,
    },
    /// The probabilities of a command do not sum to one
    InvalidDistribution {
        /// State in which the command is enabled
        state: String,
        /// Command
        command: String,
        /// Sum of the probabilities
        sum: f64,
    },
    /// Two synchronizing commands assign the same variable
    ConflictingAssignment {
        /// State in which the commands are enabled
        state: String,
        /// Shared action of the commands
        action: Option<Action>,
        /// Variable assigned twice
        variable: Variable,
    },
    /// A reward is negative, infinite or NaN
    InvalidReward {
        /// Reward structure
        structure: String,
        /// State in which the reward was evaluated
        state: String,
        /// Reward
        value: f64,
    },
    /// A reachable state has no enabled command and the deadlock policy is
    /// [`DeadlockPolicy::Fatal`]
    Deadlock {
        /// Deadlock state
        state: String,
    },
    /// No valuation satisfies the initial-state predicate
    NoInitialState,
    /// More states are reachable than allowed by [`BuildOptions::max_states`]
    StateLimitExceeded(usize),
    /// The construction did not finish before its deadline
    Timeout,
}

impl BuildError {
    /// Whether the error was caused by a resource limit rather than by the
    /// model
    pub fn is_resource_exhausted(&self) -> bool {
        matches!(
            self,
            BuildError::StateLimitExceeded(_) | BuildError::Timeout
        )
    }
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::OpenModel => {
                write!(f, "All constants need to be bound before building the state space")
            }
            BuildError::Evaluation { context, error } => {
                write!(f, "Failed to evaluate expression in {context}: {error}")
            }
            BuildError::InvalidBounds {
                variable,
                lower,
                upper,
            } => write!(
                f,
                "Variable {variable} has an empty domain: lower bound {lower} exceeds upper bound {upper}"
            ),
            BuildError::IllTypedValue { variable, value } => {
                write!(f, "Value {value} has the wrong type for variable {variable}")
            }
            BuildError::VariableOutOfBounds {
                variable,
                value,
                state,
            } => write!(
                f,
                "Update in state {state} assigns value {value} outside of the domain of variable {variable}"
            ),
            BuildError::InvalidWeight {
                state,
                command,
                weight,
            } => write!(
                f,
                "Command '{command}' has invalid weight {weight} in state {state}"
            ),
            BuildError::InvalidDistribution {
                state,
                command,
                sum,
            } => write!(
                f,
                "Probabilities of command '{command}' sum up to {sum} instead of 1 in state {state}"
            ),
            BuildError::ConflictingAssignment {
                state,
                action,
                variable,
            } => {
                write!(f, "Variable {variable} is assigned more than once")?;
                if let Some(action) = action {
                    write!(f, " by commands synchronizing on action {action}")?;
                }
                write!(f, " in state {state}")
            }
            BuildError::InvalidReward {
                structure,
                state,
                value,
            } => write!(
                f,
                "Reward structure \"{structure}\" yields invalid reward {value} in state {state}"
            ),
            BuildError::Deadlock { state } => write!(
                f,
                "State {state} has no enabled command (use the self-loop deadlock policy to add self-loops)"
            ),
            BuildError::NoInitialState => {
                write!(f, "No valuation satisfies the initial-state predicate")
            }
            BuildError::StateLimitExceeded(n) => {
                write!(f, "State space exceeds the limit of {n} states")
            }
            BuildError::Timeout => write!(f, "State-space construction exceeded its deadline"),
        }
    }
}

impl error::Error for BuildError {}

/// The explored state space of a model
#[derive(Debug, Clone)]
pub struct StateSpace {
    model_type: ModelType,
    layout: VariableLayout,
    states: Vec<State>,
    matrix: SparseMatrix,
    initial: BitVec,
    deadlocks: BitVec,
    labels: HashMap<Label, BitVec>,
    rewards: Vec<RewardVectors>,
}

impl StateSpace {
    /// Explore the reachable states of `model`
    ///
    /// All constants of the model need to be bound (see
    /// [`Model::bind_constants`]).
    pub fn build(
        model: &Model,
        options: &BuildOptions,
        deadline: &Deadline,
    ) -> Result<Self, BuildError> {
        info!(
            "Building state space of {} '{}'",
            model.model_type(),
            model.name()
        );
        explorer::explore(model, options, deadline)
    }

    pub(crate) fn new(
        model: &Model,
        layout: VariableLayout,
        states: Vec<State>,
        matrix: SparseMatrix,
        initial: BitVec,
        deadlocks: BitVec,
        rewards: Vec<RewardVectors>,
    ) -> Result<Self, BuildError> {
        let mut space = Self {
            model_type: model.model_type(),
            layout,
            states,
            matrix,
            initial,
            deadlocks,
            labels: HashMap::new(),
            rewards,
        };

        let mut labels = HashMap::new();
        for (label, expr) in model.labels() {
            let set = space.evaluate(expr).map_err(|e| match e {
                BuildError::Evaluation { error, .. } => BuildError::Evaluation {
                    context: format!("label {label}"),
                    error,
                },
                e => e,
            })?;
            debug!("Label {label} holds in {} states", set.count_ones());
            labels.insert(label.clone(), set);
        }
        labels.insert(Label::new(INIT_LABEL), space.initial.clone());
        labels.insert(Label::new(DEADLOCK_LABEL), space.deadlocks.clone());
        space.labels = labels;

        Ok(space)
    }

    /// Type of the underlying model
    pub fn model_type(&self) -> ModelType {
        self.model_type
    }

    /// Number of states
    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    /// Transition matrix
    ///
    /// For DTMCs and MDPs the entries are probabilities, for CTMCs they are
    /// rates. Markov chains have exactly one choice per state.
    pub fn matrix(&self) -> &SparseMatrix {
        &self.matrix
    }

    /// Variable layout of the states
    pub fn layout(&self) -> &VariableLayout {
        &self.layout
    }

    /// Raw valuation of state `i`
    pub fn state(&self, i: usize) -> &State {
        &self.states[i]
    }

    /// Initial states
    pub fn initial_states(&self) -> &BitSlice {
        &self.initial
    }

    /// States without enabled commands (before applying the deadlock policy)
    pub fn deadlocks(&self) -> &BitSlice {
        &self.deadlocks
    }

    /// States satisfying a label, including the built-in labels
    /// [`INIT_LABEL`] and [`DEADLOCK_LABEL`]
    pub fn label(&self, label: &Label) -> Option<&BitSlice> {
        self.labels.get(label).map(|b| b.as_bitslice())
    }

    /// Reward vectors of the structure with the given name, or of the first
    /// structure if no name is given
    pub fn rewards(&self, name: Option<&str>) -> Option<&RewardVectors> {
        match name {
            None => self.rewards.first(),
            Some(name) => self.rewards.iter().find(|r| r.name() == name),
        }
    }

    /// Evaluation context of state `i`
    pub fn valuation(&self, i: usize) -> StateValuation<'_> {
        StateValuation::new(&self.layout, &self.states[i])
    }

    /// Human readable rendering of state `i`
    pub fn display_state(&self, i: usize) -> String {
        self.layout.display_state(&self.states[i])
    }

    /// States in which a boolean expression holds
    pub fn evaluate(&self, expr: &Expression) -> Result<BitVec, BuildError> {
        let mut set = bitvec![0; self.num_states()];
        for i in 0..self.num_states() {
            let holds = expr
                .evaluate_bool(&self.valuation(i))
                .map_err(|error| BuildError::Evaluation {
                    context: format!("state {}", self.display_state(i)),
                    error,
                })?;
            set.set(i, holds);
        }
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use pmc_model::{
        RewardStructure, VariableDeclaration,
        builder::{CommandBuilder, ModelBuilder, ModuleBuilder},
    };

    use super::*;

    /// Counter that moves from 0 to 2 and stays there if `looping`
    fn counter(model_type: ModelType, looping: bool) -> Model {
        let s = || Expression::var("s");
        let mut module = ModuleBuilder::new("counter")
            .with_variable(
                VariableDeclaration::bounded_int("s", Expression::int(0), Expression::int(2))
                    .with_init(Expression::int(0)),
            )
            .unwrap()
            .with_command(
                CommandBuilder::new(s().less_than(Expression::int(2)))
                    .with_deterministic_update([("s", s() + Expression::int(1))])
                    .build(),
            )
            .unwrap();
        if looping {
            module = module
                .with_command(
                    CommandBuilder::new(s().equals(Expression::int(2)))
                        .with_deterministic_update([("s", s())])
                        .build(),
                )
                .unwrap();
        }

        ModelBuilder::new("counter", model_type)
            .with_module(module.build())
            .unwrap()
            .with_label("done", s().equals(Expression::int(2)))
            .unwrap()
            .with_reward_structure(
                RewardStructure::new("steps").with_state_reward(Expression::bool(true), Expression::real(1.0)),
            )
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn test_build_chain() {
        let model = counter(ModelType::Dtmc, true);
        let space = StateSpace::build(&model, &BuildOptions::default(), &Deadline::none()).unwrap();

        assert_eq!(space.num_states(), 3);
        assert_eq!(space.model_type(), ModelType::Dtmc);
        assert_eq!(space.initial_states(), bits![1, 0, 0]);
        assert_eq!(space.label(&Label::new("done")).unwrap(), bits![0, 0, 1]);
        assert_eq!(space.label(&Label::new(INIT_LABEL)).unwrap(), bits![1, 0, 0]);
        assert_eq!(space.label(&Label::new(DEADLOCK_LABEL)).unwrap(), bits![0, 0, 0]);
        assert_eq!(space.display_state(1), "(s=1)");
        assert_eq!(space.rewards(None).unwrap().state_rewards(), &[1.0, 1.0, 1.0]);
        assert!(space.rewards(Some("unknown")).is_none());
    }

    #[test]
    fn test_deadlock_policies() {
        let model = counter(ModelType::Dtmc, false);

        let err = StateSpace::build(&model, &BuildOptions::default(), &Deadline::none()).unwrap_err();
        assert_eq!(
            err,
            BuildError::Deadlock {
                state: "(s=2)".into()
            }
        );

        let options = BuildOptions {
            deadlock_policy: DeadlockPolicy::SelfLoop,
            ..Default::default()
        };
        let space = StateSpace::build(&model, &options, &Deadline::none()).unwrap();
        assert_eq!(space.deadlocks(), bits![0, 0, 1]);
        assert_eq!(space.matrix().row(2).collect::<Vec<_>>(), vec![(2, 1.0)]);
        assert_eq!(space.rewards(Some("steps")).unwrap().choice_rewards(), &[1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_state_limit() {
        let model = counter(ModelType::Mdp, true);
        let options = BuildOptions {
            max_states: Some(2),
            ..Default::default()
        };
        let err = StateSpace::build(&model, &options, &Deadline::none()).unwrap_err();
        assert_eq!(err, BuildError::StateLimitExceeded(2));
        assert!(err.is_resource_exhausted());
    }

    #[test]
    fn test_expired_deadline() {
        let model = counter(ModelType::Dtmc, true);
        let deadline = Deadline::after(std::time::Duration::ZERO);
        let err = StateSpace::build(&model, &BuildOptions::default(), &deadline).unwrap_err();
        assert_eq!(err, BuildError::Timeout);
    }

    #[test]
    fn test_evaluate_expression() {
        let model = counter(ModelType::Dtmc, true);
        let space = StateSpace::build(&model, &BuildOptions::default(), &Deadline::none()).unwrap();
        let set = space
            .evaluate(&Expression::var("s").greater_eq(Expression::int(1)))
            .unwrap();
        assert_eq!(set, bitvec![0, 1, 1]);
        assert!(matches!(
            space.evaluate(&Expression::var("t")),
            Err(BuildError::Evaluation { .. })
        ));
    }

    #[test]
    fn test_error_display() {
        let err = BuildError::ConflictingAssignment {
            state: "(x=0)".into(),
            action: Some(Action::new("a")),
            variable: Variable::new("x"),
        };
        assert_eq!(
            err.to_string(),
            "Variable x is assigned more than once by commands synchronizing on action a in state (x=0)"
        );
    }
}
