mod common;

use common::*;
use pmc_graph::DeadlockPolicy;
use pmc_model::{
    Model, ModelType, RewardStructure, VariableDeclaration,
    builder::{CommandBuilder, ModelBuilder, ModuleBuilder},
    expressions::Expression,
};
use pmc_model_checker::{
    FailureKind,
    options::ModelCheckerOptions,
    property::{Comparison, PathFormula, Query, RewardObjective, StateFormula, TimeBound},
};

/// Queue with capacity 2, arrival rate 1 and service rate 2
fn queue() -> Model {
    let q = || Expression::var("q");
    let module = ModuleBuilder::new("queue")
        .with_variable(
            VariableDeclaration::bounded_int("q", Expression::int(0), Expression::int(2))
                .with_init(Expression::int(0)),
        )
        .unwrap()
        .with_commands([
            CommandBuilder::new(q().less_than(Expression::int(2)))
                .with_action("arrive")
                .with_update(Expression::real(1.0), [("q", q() + Expression::int(1))])
                .build(),
            CommandBuilder::new(q().greater_than(Expression::int(0)))
                .with_action("serve")
                .with_update(Expression::real(2.0), [("q", q() - Expression::int(1))])
                .build(),
        ])
        .unwrap()
        .build();

    ModelBuilder::new("queue", ModelType::Ctmc)
        .with_module(module)
        .unwrap()
        .with_label("full", is("q", 2))
        .unwrap()
        .with_reward_structure(
            RewardStructure::new("customers").with_state_reward(Expression::bool(true), q()),
        )
        .unwrap()
        .build()
        .unwrap()
}

/// Decay with rate 3 into the absorbing state `s=1`, which has no commands
fn decay() -> Model {
    let module = ModuleBuilder::new("decay")
        .with_variable(
            VariableDeclaration::bounded_int("s", Expression::int(0), Expression::int(1))
                .with_init(Expression::int(0)),
        )
        .unwrap()
        .with_command(
            CommandBuilder::new(is("s", 0))
                .with_update(Expression::real(3.0), [("s", Expression::int(1))])
                .build(),
        )
        .unwrap()
        .build();

    ModelBuilder::new("decay", ModelType::Ctmc)
        .with_module(module)
        .unwrap()
        .with_reward_structure(
            RewardStructure::new("alive").with_state_reward(is("s", 0), Expression::real(1.0)),
        )
        .unwrap()
        .build()
        .unwrap()
}

fn self_loops() -> ModelCheckerOptions {
    let mut options = ModelCheckerOptions::default();
    options.build.deadlock_policy = DeadlockPolicy::SelfLoop;
    options
}

#[test]
fn test_queue_steady_state() {
    let model = queue();
    let result = check(
        &model,
        ModelCheckerOptions::default(),
        vec![
            ("empty", StateFormula::steady_state(Query::Value, atom("q", 0))),
            ("full", StateFormula::steady_state(Query::Value, StateFormula::label("full"))),
            (
                "mostly_empty",
                StateFormula::steady_state(Query::Bound(Comparison::Greater, 0.5), atom("q", 0)),
            ),
            (
                "customers",
                StateFormula::reward(
                    Some("customers"),
                    None,
                    Query::Value,
                    RewardObjective::LongRunAverage,
                ),
            ),
        ],
    );

    assert!(result.all_solved(), "{result}");
    // π(k) is proportional to (1/2)^k
    assert_close(&result, "empty", 4.0 / 7.0);
    assert_close(&result, "full", 1.0 / 7.0);
    assert_eq!(boolean(&result, "mostly_empty"), Some(true));
    assert_close(&result, "customers", 4.0 / 7.0);
}

#[test]
fn test_queue_unbounded_reachability() {
    let model = queue();
    let result = check(
        &model,
        ModelCheckerOptions::default(),
        vec![
            ("full", probability(PathFormula::eventually(StateFormula::label("full")))),
            // from q=1 the next event is an arrival with probability 1/3
            (
                "full_before_empty",
                probability(PathFormula::next(PathFormula::until(atom("q", 1), atom("q", 2)))),
            ),
        ],
    );

    assert_close(&result, "full", 1.0);
    assert_close(&result, "full_before_empty", 1.0 / 3.0);
}

#[test]
fn test_decay_transient_properties() {
    let model = decay();
    let t = 0.5f64;
    let result = check(
        &model,
        self_loops(),
        vec![
            (
                "decayed",
                probability(PathFormula::bounded_eventually(atom("s", 1), TimeBound::at_most(t))),
            ),
            (
                "decayed_between",
                probability(PathFormula::bounded_eventually(
                    atom("s", 1),
                    TimeBound::between(t, 2.0 * t),
                )),
            ),
            ("eventually", probability(PathFormula::eventually(atom("s", 1)))),
            (
                "still_alive",
                probability(PathFormula::bounded_always(atom("s", 0), TimeBound::at_most(t))),
            ),
            (
                "expected_lifetime",
                StateFormula::reward(
                    None,
                    None,
                    Query::Value,
                    RewardObjective::Reachability(Box::new(atom("s", 1))),
                ),
            ),
            (
                "cumulative",
                StateFormula::reward(None, None, Query::Value, RewardObjective::Cumulative(t)),
            ),
            (
                "instantaneous",
                StateFormula::reward(None, None, Query::Value, RewardObjective::Instantaneous(t)),
            ),
        ],
    );

    assert!(result.all_solved(), "{result}");
    let survival = (-3.0 * t).exp();
    assert_close(&result, "decayed", 1.0 - survival);
    // the target is absorbing, so reaching it in [t, 2t] means reaching it by 2t
    assert_close(&result, "decayed_between", 1.0 - (-6.0 * t).exp());
    assert_close(&result, "eventually", 1.0);
    assert_close(&result, "still_alive", survival);
    assert_close(&result, "expected_lifetime", 1.0 / 3.0);
    assert_close(&result, "cumulative", (1.0 - survival) / 3.0);
    assert_close(&result, "instantaneous", survival);
}

#[test]
fn test_decay_deadlock_is_fatal_by_default() {
    let model = decay();
    let result = check(
        &model,
        ModelCheckerOptions::default(),
        vec![
            ("eventually", probability(PathFormula::eventually(atom("s", 1)))),
            ("stuck", probability(PathFormula::eventually(StateFormula::label("deadlock")))),
        ],
    );

    assert_eq!(result.len(), 2);
    for (name, r) in result.iter() {
        assert_eq!(
            r.failure().map(|f| f.kind()),
            Some(FailureKind::ModelError),
            "{name}"
        );
    }
}

#[test]
fn test_deadlock_label_with_self_loops() {
    let model = decay();
    let result = check(
        &model,
        self_loops(),
        vec![
            ("stuck", probability(PathFormula::eventually(StateFormula::label("deadlock")))),
            (
                "initially_stuck",
                StateFormula::label("init").and(StateFormula::label("deadlock")),
            ),
        ],
    );

    assert_close(&result, "stuck", 1.0);
    assert_eq!(boolean(&result, "initially_stuck"), Some(false));
}
