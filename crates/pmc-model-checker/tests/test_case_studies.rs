//! Case studies whose parameters are left open in the model and bound when
//! checking

mod common;

use common::*;
use pmc_graph::DeadlockPolicy;
use pmc_model::{
    ConstantDeclaration, ConstantType, Model, ModelType, Module, RewardStructure,
    VariableDeclaration,
    builder::{CommandBuilder, ModelBuilder, ModuleBuilder},
    expressions::{Expression, Value},
};
use pmc_model_checker::{
    ModelCheckerResult,
    options::ModelCheckerOptions,
    property::{
        Comparison, FilterKind, PathFormula, Query, RewardObjective, StateFormula, TimeBound,
    },
};
use pmc_solver::Direction;

const REFERENCE_TOLERANCE: f64 = 2e-7;

fn v(name: &str) -> Expression {
    Expression::var(name)
}

fn int(i: i64) -> Expression {
    Expression::int(i)
}

fn assert_reference(result: &ModelCheckerResult, name: &str, expected: f64) {
    let value = number(result, name);
    assert!(
        (value - expected).abs() < REFERENCE_TOLERANCE,
        "{name}: got {value:e}, expected {expected:e}"
    );
}

/// Process `i` (1-based) of an Itai-Rodeh style election on a unidirectional
/// ring of three processes
///
/// `s`: 0 choosing, 1 chosen, 2 inactive, 3 leader. In every round the
/// active processes draw a bit. An active process drawing 0 whose nearest
/// active predecessor drew 1 becomes inactive. A process that is the only
/// active one left declares itself leader.
fn process(i: usize) -> Module {
    let name = |var: &str, j: usize| format!("{var}{j}");
    let pred = (i + 1) % 3 + 1;
    let pred2 = i % 3 + 1;
    let other = [pred, pred2];

    let s = name("s", i);
    let p = name("p", i);
    let alone = other
        .iter()
        .map(|&j| is(&name("s", j), 2))
        .reduce(|a, b| a & b)
        .unwrap();
    let pred_bit = Expression::ite(
        is(&name("s", pred), 1),
        v(&name("p", pred)),
        v(&name("p", pred2)),
    );
    let eliminated = is(&p, 0) & pred_bit.equals(int(1));

    ModuleBuilder::new(format!("process{i}"))
        .with_variable(
            VariableDeclaration::bounded_int(&s, int(0), int(3)).with_init(int(0)),
        )
        .unwrap()
        .with_variable(VariableDeclaration::bounded_int(&p, int(0), int(1)).with_init(int(0)))
        .unwrap()
        .with_commands([
            CommandBuilder::new(is(&s, 0) & !alone.clone())
                .with_update(Expression::real(0.5), [(s.as_str(), int(1)), (p.as_str(), int(0))])
                .with_update(Expression::real(0.5), [(s.as_str(), int(1)), (p.as_str(), int(1))])
                .build(),
            CommandBuilder::new(is(&s, 0) & alone)
                .with_deterministic_update([(s.as_str(), int(3))])
                .build(),
            CommandBuilder::new(is(&s, 1))
                .with_action("compare")
                .with_deterministic_update([
                    (s.as_str(), Expression::ite(eliminated, int(2), int(0))),
                    (p.as_str(), int(0)),
                ])
                .build(),
            CommandBuilder::new(is(&s, 2))
                .with_action("compare")
                .with_deterministic_update([(s.as_str(), int(2))])
                .build(),
            CommandBuilder::new(is(&s, 3))
                .with_deterministic_update([(s.as_str(), int(3))])
                .build(),
        ])
        .unwrap()
        .build()
}

/// Leader election among three processes, every round costing `K`
fn leader_election() -> Model {
    let leader = |i: usize| Expression::ite(is(&format!("s{i}"), 3), int(1), int(0));

    ModelBuilder::new("leader", ModelType::Mdp)
        .with_constant(ConstantDeclaration::undefined("K", ConstantType::Int))
        .unwrap()
        .with_modules((1..=3).map(process))
        .unwrap()
        .with_label("elected", is("s1", 3) | is("s2", 3) | is("s3", 3))
        .unwrap()
        .with_label("leaders_at_most_one", (leader(1) + leader(2) + leader(3)).less_eq(int(1)))
        .unwrap()
        .with_reward_structure(RewardStructure::new("rounds").with_transition_reward(
            Some("compare"),
            Expression::bool(true),
            Expression::constant("K"),
        ))
        .unwrap()
        .build()
        .unwrap()
}

#[test]
fn test_leader_election() {
    let model = leader_election();
    let elected = || StateFormula::label("elected");
    let rounds = |direction| {
        StateFormula::reward(
            Some("rounds"),
            Some(direction),
            Query::Value,
            RewardObjective::Reachability(Box::new(elected())),
        )
    };
    let within = |direction, steps: f64| {
        StateFormula::probability(
            Some(direction),
            Query::Value,
            PathFormula::bounded_eventually(elected(), TimeBound::at_most(steps)),
        )
    };

    let result = check_with_constants(
        &model,
        ModelCheckerOptions::default(),
        &[("K", Value::Int(1))],
        vec![
            (
                "elects",
                StateFormula::probability(
                    None,
                    Query::Bound(Comparison::GreaterEq, 1.0),
                    PathFormula::eventually(elected()),
                ),
            ),
            (
                "unique",
                StateFormula::filter(
                    FilterKind::Forall,
                    StateFormula::label("leaders_at_most_one"),
                    StateFormula::True,
                ),
            ),
            ("min_rounds", rounds(Direction::Minimize)),
            ("max_rounds", rounds(Direction::Maximize)),
            ("max_within_one", within(Direction::Maximize, 1.0)),
            ("max_within_seven", within(Direction::Maximize, 7.0)),
            ("min_within_eight", within(Direction::Minimize, 8.0)),
            ("max_within_eight", within(Direction::Maximize, 8.0)),
        ],
    );

    assert_eq!(boolean(&result, "elects"), Some(true), "{result}");
    assert_eq!(boolean(&result, "unique"), Some(true), "{result}");
    // three active processes lose one with probability 3/4, two with 1/2
    assert_reference(&result, "min_rounds", 10.0 / 3.0);
    assert_reference(&result, "max_rounds", 10.0 / 3.0);
    // the fastest election takes five draws, two comparisons and the claim
    assert_close(&result, "max_within_one", 0.0);
    assert_close(&result, "max_within_seven", 0.0);
    assert_close(&result, "min_within_eight", 3.0 / 8.0);
    assert_close(&result, "max_within_eight", 3.0 / 8.0);
}

#[test]
fn test_leader_election_round_cost() {
    let model = leader_election();
    let result = check_with_constants(
        &model,
        ModelCheckerOptions::default(),
        &[("K", Value::Int(3))],
        vec![(
            "cost",
            StateFormula::reward(
                Some("rounds"),
                Some(Direction::Minimize),
                Query::Value,
                RewardObjective::Reachability(Box::new(StateFormula::label("elected"))),
            ),
        )],
    );

    assert_reference(&result, "cost", 10.0);
}

/// Bounded retransmission protocol: a file of `N` chunks is sent over lossy
/// channels, every chunk being retransmitted at most `MAX` times
fn brp() -> Model {
    let b = |name: &str| VariableDeclaration::boolean(name);
    let range = |name: &str, upper: Expression| VariableDeclaration::bounded_int(name, int(0), upper);
    let send = |guard: Expression, retries: Expression| {
        CommandBuilder::new(guard)
            .with_action("aF")
            .with_deterministic_update([
                ("s", int(2)),
                ("fs", is("i", 1)),
                ("ls", v("i").equals(Expression::constant("N"))),
                ("bs", v("s_ab")),
                ("nrtr", retries),
            ])
            .build()
    };
    let last = || v("i").equals(Expression::constant("N"));

    let sender = ModuleBuilder::new("sender")
        .with_variables([
            range("s", int(6)),
            range("srep", int(3)),
            range("nrtr", Expression::constant("MAX")),
            range("i", Expression::constant("N")),
            b("bs"),
            b("s_ab"),
            b("fs"),
            b("ls"),
        ])
        .unwrap()
        .with_commands([
            CommandBuilder::new(is("s", 0))
                .with_action("NewFile")
                .with_deterministic_update([("s", int(1)), ("i", int(1)), ("srep", int(0))])
                .build(),
            send(is("s", 1), int(0)),
            CommandBuilder::new(is("s", 2))
                .with_action("aB")
                .with_deterministic_update([("s", int(4)), ("s_ab", !v("s_ab"))])
                .build(),
            CommandBuilder::new(is("s", 2))
                .with_action("TO_Msg")
                .with_deterministic_update([("s", int(3))])
                .build(),
            CommandBuilder::new(is("s", 2))
                .with_action("TO_Ack")
                .with_deterministic_update([("s", int(3))])
                .build(),
            send(
                is("s", 3) & v("nrtr").less_than(Expression::constant("MAX")),
                v("nrtr") + int(1),
            ),
            CommandBuilder::new(
                is("s", 3) & v("nrtr").equals(Expression::constant("MAX")) & !last(),
            )
            .with_deterministic_update([("s", int(5)), ("srep", int(1))])
            .build(),
            CommandBuilder::new(is("s", 3) & v("nrtr").equals(Expression::constant("MAX")) & last())
                .with_deterministic_update([("s", int(5)), ("srep", int(2))])
                .build(),
            CommandBuilder::new(is("s", 4) & !last())
                .with_deterministic_update([("s", int(1)), ("i", v("i") + int(1))])
                .build(),
            CommandBuilder::new(is("s", 4) & last())
                .with_deterministic_update([("s", int(0)), ("srep", int(3))])
                .build(),
            CommandBuilder::new(is("s", 5))
                .with_action("SyncWait")
                .with_deterministic_update([("s", int(6))])
                .build(),
            CommandBuilder::new(is("s", 6))
                .with_action("SyncWait")
                .with_deterministic_update([("s", int(0)), ("s_ab", Expression::bool(false))])
                .build(),
        ])
        .unwrap()
        .build();

    let receive = |from: i64, to: i64| {
        CommandBuilder::new(is("r", from))
            .with_action("aG")
            .with_deterministic_update([
                ("r", int(to)),
                ("fr", v("fs")),
                ("lr", v("ls")),
                ("br", v("bs")),
                ("recv", v("T")),
            ])
            .build()
    };
    let report = |guard: Expression, rrep: i64| {
        CommandBuilder::new(is("r", 2) & v("r_ab").iff(v("br")) & guard)
            .with_deterministic_update([("r", int(3)), ("rrep", int(rrep))])
            .build()
    };

    let receiver = ModuleBuilder::new("receiver")
        .with_variables([
            range("r", int(5)),
            range("rrep", int(4)),
            b("fr"),
            b("lr"),
            b("br"),
            b("r_ab"),
            b("recv"),
        ])
        .unwrap()
        .with_commands([
            CommandBuilder::new(is("r", 0))
                .with_action("SyncWait")
                .with_deterministic_update([("r", int(0))])
                .build(),
            receive(0, 1),
            CommandBuilder::new(is("r", 1))
                .with_deterministic_update([("r", int(2)), ("r_ab", v("br"))])
                .build(),
            report(v("fr") & !v("lr"), 1),
            report(!v("fr") & !v("lr"), 2),
            report(v("lr"), 3),
            CommandBuilder::new(is("r", 2) & !v("r_ab").iff(v("br")))
                .with_action("aA")
                .with_deterministic_update([("r", int(4))])
                .build(),
            CommandBuilder::new(is("r", 3))
                .with_action("aA")
                .with_deterministic_update([("r", int(4)), ("r_ab", !v("r_ab"))])
                .build(),
            receive(4, 2),
            CommandBuilder::new(is("r", 4) & v("ls"))
                .with_action("SyncWait")
                .with_deterministic_update([("r", int(5))])
                .build(),
            CommandBuilder::new(is("r", 4) & !v("ls"))
                .with_action("SyncWait")
                .with_deterministic_update([("r", int(5)), ("rrep", int(4))])
                .build(),
            CommandBuilder::new(is("r", 5))
                .with_action("SyncWait")
                .with_deterministic_update([("r", int(0)), ("rrep", int(0))])
                .build(),
        ])
        .unwrap()
        .build();

    // at most one file is sent
    let tester = ModuleBuilder::new("tester")
        .with_variable(b("T"))
        .unwrap()
        .with_command(
            CommandBuilder::new(!v("T"))
                .with_action("NewFile")
                .with_deterministic_update([("T", Expression::bool(true))])
                .build(),
        )
        .unwrap()
        .build();

    let channel = |name: &str, var: &str, actions: [&str; 3], delivered: f64| {
        ModuleBuilder::new(name)
            .with_variable(range(var, int(2)))
            .unwrap()
            .with_commands([
                CommandBuilder::new(is(var, 0))
                    .with_action(actions[0])
                    .with_update(Expression::real(delivered), [(var, int(1))])
                    .with_update(Expression::real(1.0 - delivered), [(var, int(2))])
                    .build(),
                CommandBuilder::new(is(var, 1))
                    .with_action(actions[1])
                    .with_deterministic_update([(var, int(0))])
                    .build(),
                CommandBuilder::new(is(var, 2))
                    .with_action(actions[2])
                    .with_deterministic_update([(var, int(0))])
                    .build(),
            ])
            .unwrap()
            .build()
    };

    ModelBuilder::new("brp", ModelType::Dtmc)
        .with_constants([
            ConstantDeclaration::undefined("N", ConstantType::Int),
            ConstantDeclaration::undefined("MAX", ConstantType::Int),
        ])
        .unwrap()
        .with_modules([
            sender,
            receiver,
            tester,
            channel("channel_k", "k", ["aF", "aG", "TO_Msg"], 0.98),
            channel("channel_l", "l", ["aA", "aB", "TO_Ack"], 0.99),
        ])
        .unwrap()
        .build()
        .unwrap()
}

#[test]
fn test_bounded_retransmission() {
    let model = brp();
    let reach = |target: Expression| probability(PathFormula::eventually(StateFormula::expression(target)));
    let mut options = ModelCheckerOptions::default();
    // the protocol ends after a single file
    options.build.deadlock_policy = DeadlockPolicy::SelfLoop;

    let result = check_with_constants(
        &model,
        options,
        &[("N", Value::Int(64)), ("MAX", Value::Int(4))],
        vec![
            ("nok_but_ok", reach(is("srep", 1) & is("rrep", 3) & v("recv"))),
            ("ok_but_not_ok", reach(is("srep", 3) & !is("rrep", 3) & v("recv"))),
            ("fails", reach(is("s", 5))),
            ("fails_last", reach(is("s", 5) & is("srep", 2))),
            (
                "fails_late",
                reach(is("s", 5) & is("srep", 1) & v("i").greater_than(int(8))),
            ),
            ("reports_unreceived", reach(!is("srep", 0) & !v("recv"))),
        ],
    );

    assert_reference(&result, "nok_but_ok", 0.0);
    assert_reference(&result, "ok_but_not_ok", 0.0);
    assert_reference(&result, "fails", 1.5032933912e-6);
    assert_reference(&result, "fails_last", 2.2772817e-8);
    assert_reference(&result, "fails_late", 1.291824885e-6);
    assert_reference(&result, "reports_unreceived", 3.2e-9);

    // every chunk is lost with probability 1 - 0.98 * 0.99 per try
    let chunk = (1.0 - 0.98 * 0.99f64).powi(5);
    let fails = number(&result, "fails");
    assert!((fails - 64.0 * chunk).abs() < 1e-8, "{fails:e}");
    assert!(number(&result, "fails_late") < fails);
}
