//! Model checking of probabilistic properties on explicit state spaces
//!
//! This crate ties the workspace together: it builds the state space of a
//! [`pmc_model::Model`] with `pmc-graph`, evaluates the properties of a
//! [`specification::PropertySpecification`] bottom-up using the solvers of
//! `pmc-solver`, and checks LTL path formulas on the product of the state
//! space with deterministic automata from `pmc-automata`.
//!
//! Every model checker implements the [`ModelChecker`] trait. The only
//! implementation is the [`checker::ExplicitModelChecker`].

use std::{collections::HashMap, error, fmt};

use pmc_automata::AutomatonError;
use pmc_display_utils::display_aligned_pairs;
use pmc_graph::BuildError;
use pmc_model::{
    ConstantError, Model,
    expressions::{Value, fraction::Fraction},
};
use pmc_solver::SolverError;

use crate::{options::OutputMode, specification::PropertySpecification};

pub mod checker;
mod filter;
pub mod options;
mod pctl;
mod product;
pub mod property;
pub mod specification;

/// Largest denominator of fractions in [`OutputMode::Rational`]
pub const MAX_DENOMINATOR: u64 = 1_000_000;

/// The [`ModelChecker`] trait defines the interface of all model checkers
pub trait ModelChecker: Sized {
    /// Options for the model checker
    type ModelCheckerOptions;

    /// Error type for errors that can occur during initialization of the model
    /// checker
    type InitializationError: error::Error;

    /// Initialize the model checker with a closed model, i.e., a model whose
    /// constants are all bound, and a specification whose constants have been
    /// replaced by their values
    fn initialize(
        opts: Self::ModelCheckerOptions,
        model: Model,
        spec: PropertySpecification,
    ) -> Result<Self, Self::InitializationError>;

    /// Construct a new instance of the model checker
    ///
    /// This function first binds the undefined constants of the model to the
    /// given values, then substitutes the values of all constants in the
    /// properties and finally initializes the model checker.
    ///
    /// If any of these steps fail a [`ModelCheckerSetupError`] is returned
    /// that contains the error of the stage it occurred in.
    fn new(
        opts: Self::ModelCheckerOptions,
        model: &Model,
        constants: &HashMap<String, Value>,
        spec: PropertySpecification,
    ) -> Result<Self, ModelCheckerSetupError<Self::InitializationError>> {
        let model = model
            .bind_constants(constants)
            .map_err(ModelCheckerSetupError::ErrorBindingConstants)?;

        let spec = spec.substitute_constants(&model.constant_values());

        Self::initialize(opts, model, spec)
            .map_err(ModelCheckerSetupError::ErrorInitializingModelChecker)
    }

    /// Check all properties
    ///
    /// Failures are reported per property, a failure of the state-space
    /// construction fails every property.
    fn check(&self) -> ModelCheckerResult;
}

/// Errors that can occur while setting up a model checker
#[derive(Debug, Clone, PartialEq)]
pub enum ModelCheckerSetupError<IE: error::Error> {
    /// The constants of the model could not be bound
    ErrorBindingConstants(ConstantError),
    /// Error that can occur during initialization
    ErrorInitializingModelChecker(IE),
}

impl<IE: error::Error> fmt::Display for ModelCheckerSetupError<IE> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelCheckerSetupError::ErrorBindingConstants(e) => {
                write!(f, "Failed to bind the constants of the model. Error: {e}")
            }
            ModelCheckerSetupError::ErrorInitializingModelChecker(e) => {
                write!(f, "Failed to initialize the model checker. Error: {e}")
            }
        }
    }
}

impl<IE: error::Error> error::Error for ModelCheckerSetupError<IE> {}

/// Value of a successfully checked property
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResultValue {
    /// Truth value of a boolean property in the initial states
    Bool(bool),
    /// Value of a numeric query in the initial state
    Number(f64),
    /// Smallest and largest value of a `range` filter
    Interval(f64, f64),
}

impl ResultValue {
    /// The truth value, if the result is boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ResultValue::Bool(b) => Some(*b),
            ResultValue::Number(_) | ResultValue::Interval(..) => None,
        }
    }

    /// The numeric value, if the result is a number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ResultValue::Number(n) => Some(*n),
            ResultValue::Bool(_) | ResultValue::Interval(..) => None,
        }
    }

    /// Render the value in the given output mode
    ///
    /// # Example
    ///
    /// ```
    /// use pmc_model_checker::{ResultValue, options::OutputMode};
    ///
    /// let v = ResultValue::Number(1.0 / 6.0);
    /// assert_eq!(v.display(OutputMode::Rational), "1/6");
    /// assert_eq!(ResultValue::Number(f64::INFINITY).display(OutputMode::Rational), "Infinity");
    /// ```
    pub fn display(&self, mode: OutputMode) -> String {
        match (self, mode) {
            (ResultValue::Bool(b), _) => b.to_string(),
            (ResultValue::Interval(lo, hi), _) => format!(
                "[{}, {}]",
                ResultValue::Number(*lo).display(mode),
                ResultValue::Number(*hi).display(mode)
            ),
            (ResultValue::Number(n), _) if n.is_infinite() && *n > 0.0 => "Infinity".to_string(),
            (ResultValue::Number(n), OutputMode::Float) => n.to_string(),
            (ResultValue::Number(n), OutputMode::Rational) => Fraction::approximate(*n, MAX_DENOMINATOR)
                .map(|f| f.to_string())
                .unwrap_or_else(|| n.to_string()),
        }
    }
}

impl fmt::Display for ResultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display(OutputMode::Float))
    }
}

/// Category of a failed property
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The model is erroneous, e.g., it has a deadlock or an invalid
    /// distribution
    ModelError,
    /// A limit on states, iterations or time was reached
    ResourceExhausted,
    /// The combination of operator and model type is not supported
    Unsupported,
    /// A numeric computation diverged
    Numerical,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::ModelError => write!(f, "model error"),
            FailureKind::ResourceExhausted => write!(f, "resource exhausted"),
            FailureKind::Unsupported => write!(f, "unsupported"),
            FailureKind::Numerical => write!(f, "numerical error"),
        }
    }
}

/// Reason why a property could not be checked
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyFailure {
    kind: FailureKind,
    reason: String,
}

impl PropertyFailure {
    /// Create a new failure
    pub fn new(kind: FailureKind, reason: impl ToString) -> Self {
        Self {
            kind,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn unsupported(reason: impl ToString) -> Self {
        Self::new(FailureKind::Unsupported, reason)
    }

    /// Category of the failure
    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    /// Human readable diagnostic
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl From<BuildError> for PropertyFailure {
    fn from(err: BuildError) -> Self {
        let kind = if err.is_resource_exhausted() {
            FailureKind::ResourceExhausted
        } else {
            FailureKind::ModelError
        };
        Self::new(kind, err)
    }
}

impl From<SolverError> for PropertyFailure {
    fn from(err: SolverError) -> Self {
        let kind = match err {
            SolverError::NotConverged { .. } | SolverError::Timeout => {
                FailureKind::ResourceExhausted
            }
            SolverError::Diverged { .. } => FailureKind::Numerical,
            SolverError::InvalidInput(_) => FailureKind::Unsupported,
        };
        Self::new(kind, err)
    }
}

impl From<AutomatonError> for PropertyFailure {
    fn from(err: AutomatonError) -> Self {
        Self::new(FailureKind::Unsupported, err)
    }
}

impl fmt::Display for PropertyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.reason)
    }
}

impl error::Error for PropertyFailure {}

/// Outcome of checking a single property
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyResult {
    /// The property was checked successfully
    Solved(ResultValue),
    /// The property could not be checked
    Failed(PropertyFailure),
}

impl PropertyResult {
    /// The value, if the property was solved
    pub fn value(&self) -> Option<&ResultValue> {
        match self {
            PropertyResult::Solved(v) => Some(v),
            PropertyResult::Failed(_) => None,
        }
    }

    /// The failure, if the property could not be checked
    pub fn failure(&self) -> Option<&PropertyFailure> {
        match self {
            PropertyResult::Solved(_) => None,
            PropertyResult::Failed(f) => Some(f),
        }
    }

    fn display(&self, mode: OutputMode) -> String {
        match self {
            PropertyResult::Solved(v) => v.display(mode),
            PropertyResult::Failed(f) => format!("failed ({f})"),
        }
    }
}

impl From<Result<ResultValue, PropertyFailure>> for PropertyResult {
    fn from(res: Result<ResultValue, PropertyFailure>) -> Self {
        match res {
            Ok(v) => PropertyResult::Solved(v),
            Err(f) => PropertyResult::Failed(f),
        }
    }
}

impl fmt::Display for PropertyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display(OutputMode::Float))
    }
}

/// Results of a model checking run, in the order of the specification
#[derive(Debug, Clone, PartialEq)]
pub struct ModelCheckerResult {
    output: OutputMode,
    results: Vec<(String, PropertyResult)>,
}

impl ModelCheckerResult {
    pub(crate) fn new(output: OutputMode, results: Vec<(String, PropertyResult)>) -> Self {
        Self { output, results }
    }

    /// Result of the property with the given name
    pub fn get(&self, name: &str) -> Option<&PropertyResult> {
        self.results
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, r)| r)
    }

    /// Iterate over the results in the order of the specification
    pub fn iter(&self) -> impl Iterator<Item = &(String, PropertyResult)> {
        self.results.iter()
    }

    /// Number of results
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether there are no results
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Whether every property was checked successfully
    pub fn all_solved(&self) -> bool {
        self.results
            .iter()
            .all(|(_, r)| matches!(r, PropertyResult::Solved(_)))
    }
}

impl fmt::Display for ModelCheckerResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .results
            .iter()
            .map(|(name, r)| (name.clone(), r.display(self.output)))
            .collect::<Vec<_>>();
        write!(f, "{}", display_aligned_pairs(rendered.iter()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_values() {
        assert_eq!(ResultValue::Bool(true).to_string(), "true");
        assert_eq!(ResultValue::Number(0.25).to_string(), "0.25");
        assert_eq!(ResultValue::Number(11.0 / 3.0).display(OutputMode::Rational), "11/3");
        assert_eq!(ResultValue::Number(1.0).display(OutputMode::Rational), "1");
        assert_eq!(ResultValue::Number(f64::INFINITY).to_string(), "Infinity");
        assert_eq!(
            ResultValue::Interval(1.0 / 3.0, 0.5).display(OutputMode::Rational),
            "[1/3, 1/2]"
        );
        assert_eq!(ResultValue::Interval(0.5, 1.0).as_number(), None);
    }

    #[test]
    fn test_failure_kinds() {
        let f = PropertyFailure::from(SolverError::Timeout);
        assert_eq!(f.kind(), FailureKind::ResourceExhausted);

        let f = PropertyFailure::from(SolverError::Diverged {
            state: 3,
            value: f64::NAN,
        });
        assert_eq!(f.kind(), FailureKind::Numerical);

        let f = PropertyFailure::from(BuildError::StateLimitExceeded(10));
        assert_eq!(f.kind(), FailureKind::ResourceExhausted);
        assert_eq!(f.to_string(), "resource exhausted: State space exceeds the limit of 10 states");

        let f = PropertyFailure::from(BuildError::NoInitialState);
        assert_eq!(f.kind(), FailureKind::ModelError);

        let f = PropertyFailure::from(AutomatonError::TooManyPropositions { count: 70, max: 64 });
        assert_eq!(f.kind(), FailureKind::Unsupported);
    }

    #[test]
    fn test_result_lookup_and_display() {
        let result = ModelCheckerResult::new(
            OutputMode::Rational,
            vec![
                ("dice".to_string(), PropertyResult::Solved(ResultValue::Number(1.0 / 6.0))),
                ("safe".to_string(), PropertyResult::Solved(ResultValue::Bool(false))),
                (
                    "timeout".to_string(),
                    PropertyResult::Failed(PropertyFailure::from(SolverError::Timeout)),
                ),
            ],
        );

        assert_eq!(result.len(), 3);
        assert!(!result.all_solved());
        assert_eq!(
            result.get("safe").and_then(|r| r.value()),
            Some(&ResultValue::Bool(false))
        );
        assert!(result.get("missing").is_none());
        assert_eq!(
            result.to_string(),
            "dice    : 1/6\nsafe    : false\ntimeout : failed (resource exhausted: Computation exceeded its deadline)"
        );
    }
}
