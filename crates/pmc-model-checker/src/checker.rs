//! Explicit-state model checker
//!
//! The [`ExplicitModelChecker`] explores the full reachable state space of the
//! model once and checks every property of the specification on it. The
//! state space, its predecessor relation and the automaton cache are shared
//! read-only between properties, which are checked in parallel if
//! [`ModelCheckerOptions::parallel_properties`] is set.

use std::{error, fmt};

use log::{info, warn};
use pmc_automata::cache::AutomatonCompiler;
use pmc_graph::StateSpace;
use pmc_model::Model;
use pmc_solver::Deadline;
use rayon::prelude::*;

use crate::{
    ModelChecker, ModelCheckerResult, PropertyFailure, PropertyResult,
    options::ModelCheckerOptions,
    pctl::{Evaluator, SharedSpace},
    property::StateFormula,
    specification::PropertySpecification,
};

/// Model checker working on the explicitly explored state space
///
/// # Example
///
/// ```
/// use std::collections::HashMap;
///
/// use pmc_model::{ModelType, VariableDeclaration, builder::*, expressions::*};
/// use pmc_model_checker::{
///     ModelChecker, ResultValue,
///     checker::ExplicitModelChecker,
///     options::ModelCheckerOptions,
///     property::{PathFormula, Query, StateFormula},
///     specification::PropertySpecificationBuilder,
/// };
///
/// // a coin that is flipped until it shows heads
/// let s = || Expression::var("s");
/// let module = ModuleBuilder::new("coin")
///     .with_variable(
///         VariableDeclaration::bounded_int("s", Expression::int(0), Expression::int(1))
///             .with_init(Expression::int(0)),
///     )
///     .unwrap()
///     .with_command(
///         CommandBuilder::new(s().equals(Expression::int(0)))
///             .with_update(Expression::real(0.5), [("s", Expression::int(0))])
///             .with_update(Expression::real(0.5), [("s", Expression::int(1))])
///             .build(),
///     )
///     .unwrap()
///     .with_command(
///         CommandBuilder::new(s().equals(Expression::int(1)))
///             .with_deterministic_update([("s", Expression::int(1))])
///             .build(),
///     )
///     .unwrap()
///     .build();
/// let model = ModelBuilder::new("coin", ModelType::Dtmc)
///     .with_module(module)
///     .unwrap()
///     .build()
///     .unwrap();
///
/// let mut spec = PropertySpecificationBuilder::new(&model);
/// spec.add_property(
///     "heads",
///     StateFormula::probability(
///         None,
///         Query::Value,
///         PathFormula::eventually(StateFormula::expression(s().equals(Expression::int(1)))),
///     ),
/// )
/// .unwrap();
///
/// let checker = ExplicitModelChecker::new(
///     ModelCheckerOptions::default(),
///     &model,
///     &HashMap::new(),
///     spec.build(),
/// )
/// .unwrap();
/// let result = checker.check();
///
/// assert_eq!(result.get("heads").unwrap().value(), Some(&ResultValue::Number(1.0)));
/// ```
#[derive(Debug)]
pub struct ExplicitModelChecker {
    model: Model,
    spec: PropertySpecification,
    options: ModelCheckerOptions,
    compiler: AutomatonCompiler,
}

impl ExplicitModelChecker {
    /// Options the model checker was initialized with
    pub fn options(&self) -> &ModelCheckerOptions {
        &self.options
    }

    /// Statistics of the automaton cache
    pub fn automaton_cache(&self) -> &AutomatonCompiler {
        &self.compiler
    }

    fn check_property(&self, shared: &SharedSpace, name: &str, formula: &StateFormula) -> PropertyResult {
        info!("Checking property '{name}': {formula}");
        let evaluator = Evaluator {
            shared,
            options: &self.options,
            compiler: &self.compiler,
            deadline: Deadline::from_timeout(self.options.timeout()),
        };

        let result = PropertyResult::from(evaluator.check(formula));
        match &result {
            PropertyResult::Solved(v) => info!("Property '{name}': {}", v.display(self.options.output)),
            PropertyResult::Failed(f) => warn!("Property '{name}' failed: {f}"),
        }
        result
    }
}

impl ModelChecker for ExplicitModelChecker {
    type ModelCheckerOptions = ModelCheckerOptions;

    type InitializationError = InitializationError;

    fn initialize(
        opts: Self::ModelCheckerOptions,
        model: Model,
        spec: PropertySpecification,
    ) -> Result<Self, Self::InitializationError> {
        if !model.is_closed() {
            return Err(InitializationError::OpenModel);
        }
        if let Some((name, _)) = spec
            .properties()
            .iter()
            .find(|(_, f)| references_constants(f))
        {
            return Err(InitializationError::OpenProperty(name.clone()));
        }

        Ok(Self {
            compiler: AutomatonCompiler::new(opts.automaton),
            model,
            spec,
            options: opts,
        })
    }

    fn check(&self) -> ModelCheckerResult {
        let build_deadline = Deadline::from_timeout(self.options.timeout());
        let space = match StateSpace::build(&self.model, &self.options.build, &build_deadline) {
            Ok(space) => space,
            Err(err) => {
                warn!("State-space construction failed: {err}");
                let failure = PropertyFailure::from(err);
                return ModelCheckerResult::new(
                    self.options.output,
                    self.spec
                        .properties()
                        .iter()
                        .map(|(name, _)| (name.clone(), PropertyResult::Failed(failure.clone())))
                        .collect(),
                );
            }
        };
        info!(
            "State space of '{}': {} states, {} choices, {} transitions",
            self.model.name(),
            space.num_states(),
            space.matrix().num_choices(),
            space.matrix().num_transitions()
        );

        let shared = SharedSpace::new(space);
        let properties = self.spec.properties();

        let results = if self.options.parallel_properties {
            properties
                .par_iter()
                .map(|(name, f)| (name.clone(), self.check_property(&shared, name, f)))
                .collect()
        } else {
            properties
                .iter()
                .map(|(name, f)| (name.clone(), self.check_property(&shared, name, f)))
                .collect()
        };

        ModelCheckerResult::new(self.options.output, results)
    }
}

/// Whether an atomic expression of the formula still references a constant
fn references_constants(formula: &StateFormula) -> bool {
    match formula {
        StateFormula::Expression(expr) => !expr.constants().is_empty(),
        f => f.children().into_iter().any(references_constants),
    }
}

/// Errors that can occur when initializing the [`ExplicitModelChecker`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitializationError {
    /// The model has constants without value
    OpenModel,
    /// The property with the given name references a constant without value
    OpenProperty(String),
}

impl fmt::Display for InitializationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitializationError::OpenModel => {
                write!(f, "All constants of the model need to be bound")
            }
            InitializationError::OpenProperty(name) => write!(
                f,
                "Property '{name}' references a constant without value"
            ),
        }
    }
}

impl error::Error for InitializationError {}
