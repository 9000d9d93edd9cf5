#![allow(dead_code)]

use std::collections::HashMap;

use pmc_model::{
    ConstantDeclaration, Model, ModelType, RewardStructure, VariableDeclaration,
    builder::{CommandBuilder, ModelBuilder, ModuleBuilder},
    expressions::{Expression, Value},
};
use pmc_model_checker::{
    ModelChecker, ModelCheckerResult,
    checker::ExplicitModelChecker,
    options::ModelCheckerOptions,
    property::{PathFormula, Query, StateFormula},
    specification::PropertySpecificationBuilder,
};

pub const TOLERANCE: f64 = 1e-7;

pub fn is(var: &str, v: i64) -> Expression {
    Expression::var(var).equals(Expression::int(v))
}

pub fn atom(var: &str, v: i64) -> StateFormula {
    StateFormula::expression(is(var, v))
}

/// Knuth and Yao's simulation of a fair die by a fair coin
pub fn die(model_type: ModelType) -> Model {
    die_with_constants(model_type, [])
}

/// [`die`] declaring the given additional constants
pub fn die_with_constants(
    model_type: ModelType,
    constants: impl IntoIterator<Item = ConstantDeclaration>,
) -> Model {
    let half = || Expression::real(0.5);
    let flip = |from: i64, a: Vec<(&'static str, i64)>, b: Vec<(&'static str, i64)>| {
        CommandBuilder::new(is("s", from))
            .with_update(half(), a.into_iter().map(|(v, x)| (v, Expression::int(x))))
            .with_update(half(), b.into_iter().map(|(v, x)| (v, Expression::int(x))))
            .build()
    };

    let module = ModuleBuilder::new("die")
        .with_variable(
            VariableDeclaration::bounded_int("s", Expression::int(0), Expression::int(7))
                .with_init(Expression::int(0)),
        )
        .unwrap()
        .with_variable(
            VariableDeclaration::bounded_int("d", Expression::int(0), Expression::int(6))
                .with_init(Expression::int(0)),
        )
        .unwrap()
        .with_commands([
            flip(0, vec![("s", 1)], vec![("s", 2)]),
            flip(1, vec![("s", 3)], vec![("s", 4)]),
            flip(2, vec![("s", 5)], vec![("s", 6)]),
            flip(3, vec![("s", 1)], vec![("s", 7), ("d", 1)]),
            flip(4, vec![("s", 7), ("d", 2)], vec![("s", 7), ("d", 3)]),
            flip(5, vec![("s", 7), ("d", 4)], vec![("s", 7), ("d", 5)]),
            flip(6, vec![("s", 2)], vec![("s", 7), ("d", 6)]),
            CommandBuilder::new(is("s", 7))
                .with_deterministic_update([("s", Expression::int(7))])
                .build(),
        ])
        .unwrap()
        .build();

    let mut builder = ModelBuilder::new("die", model_type);
    for constant in constants {
        builder = builder.with_constant(constant).unwrap();
    }
    builder
        .with_module(module)
        .unwrap()
        .with_label("done", is("s", 7))
        .unwrap()
        .with_reward_structure(
            RewardStructure::new("coin_flips").with_state_reward(
                Expression::var("s").less_than(Expression::int(7)),
                Expression::real(1.0),
            ),
        )
        .unwrap()
        .build()
        .unwrap()
}

pub fn check(model: &Model, options: ModelCheckerOptions, properties: Vec<(&str, StateFormula)>) -> ModelCheckerResult {
    check_with_constants(model, options, &[], properties)
}

/// Check the properties after binding the undefined constants of the model
pub fn check_with_constants(
    model: &Model,
    options: ModelCheckerOptions,
    constants: &[(&str, Value)],
    properties: Vec<(&str, StateFormula)>,
) -> ModelCheckerResult {
    let _ = env_logger::builder().is_test(true).try_init();

    let constants = constants
        .iter()
        .map(|(name, value)| (name.to_string(), *value))
        .collect::<HashMap<_, _>>();
    let mut spec = PropertySpecificationBuilder::new(model);
    spec.add_properties(properties.into_iter().map(|(name, f)| (name.to_string(), f)))
        .unwrap();
    ExplicitModelChecker::new(options, model, &constants, spec.build())
        .unwrap()
        .check()
}

pub fn number(result: &ModelCheckerResult, name: &str) -> f64 {
    result
        .get(name)
        .and_then(|r| r.value())
        .and_then(|v| v.as_number())
        .unwrap_or_else(|| panic!("no numeric result for {name}: {result}"))
}

pub fn assert_close(result: &ModelCheckerResult, name: &str, expected: f64) {
    let value = number(result, name);
    assert!(
        (value - expected).abs() < TOLERANCE,
        "{name}: got {value}, expected {expected}"
    );
}

pub fn probability(path: PathFormula) -> StateFormula {
    StateFormula::probability(None, Query::Value, path)
}

pub fn face(d: i64) -> StateFormula {
    atom("s", 7).and(atom("d", d))
}

pub fn boolean(result: &ModelCheckerResult, name: &str) -> Option<bool> {
    result.get(name).and_then(|r| r.value()).and_then(|v| v.as_bool())
}
