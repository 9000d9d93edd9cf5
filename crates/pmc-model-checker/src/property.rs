//! Abstract syntax of probabilistic properties
//!
//! Properties are [`StateFormula`]s: boolean combinations of atomic state
//! predicates and the probabilistic operators `P`, `R` and `S`. The path
//! formula of a `P` operator is a [`PathFormula`], which can be an arbitrary
//! LTL formula over state formulas. Path formulas of the shape `X a`,
//! `a U b`, `F a` and `G a` (optionally time bounded) are checked directly,
//! all other path formulas are translated into automata.
//!
//! # Example
//!
//! ```
//! use pmc_model::expressions::Expression;
//! use pmc_model_checker::property::{PathFormula, Query, StateFormula};
//!
//! // P=? [ F s=7 & d=3 ]
//! let target = Expression::var("s").equals(Expression::int(7))
//!     & Expression::var("d").equals(Expression::int(3));
//! let property = StateFormula::probability(
//!     None,
//!     Query::Value,
//!     PathFormula::eventually(StateFormula::expression(target)),
//! );
//!
//! assert!(property.is_query());
//! assert_eq!(property.to_string(), "P=? [F (s = 7 & d = 3)]");
//! ```

use std::{collections::HashMap, fmt};

use pmc_model::expressions::{Constant, Expression, Label, Value};
use pmc_solver::Direction;

/// Comparison of a computed value against a bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparison {
    /// `<`
    Less,
    /// `<=`
    LessEq,
    /// `>`
    Greater,
    /// `>=`
    GreaterEq,
}

impl Comparison {
    /// Check whether `value` satisfies the comparison with `bound`
    pub fn holds(&self, value: f64, bound: f64) -> bool {
        match self {
            Comparison::Less => value < bound,
            Comparison::LessEq => value <= bound,
            Comparison::Greater => value > bound,
            Comparison::GreaterEq => value >= bound,
        }
    }

    /// Whether the bound is a lower bound on the value
    pub fn is_lower_bound(&self) -> bool {
        matches!(self, Comparison::Greater | Comparison::GreaterEq)
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparison::Less => write!(f, "<"),
            Comparison::LessEq => write!(f, "<="),
            Comparison::Greater => write!(f, ">"),
            Comparison::GreaterEq => write!(f, ">="),
        }
    }
}

/// Whether an operator asks for a value or compares it against a bound
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Query {
    /// `=?`, the numeric value is the result
    Value,
    /// `~ bound`, the operator is a boolean state formula
    Bound(Comparison, f64),
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Value => write!(f, "=?"),
            Query::Bound(cmp, bound) => write!(f, "{cmp}{bound}"),
        }
    }
}

/// Interval of steps (discrete-time models) or time (CTMCs) of a temporal
/// operator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeBound {
    lower: f64,
    upper: Option<f64>,
}

impl TimeBound {
    /// Interval `[0, upper]`
    pub fn at_most(upper: f64) -> Self {
        Self {
            lower: 0.0,
            upper: Some(upper),
        }
    }

    /// Interval `[lower, ∞)`
    pub fn at_least(lower: f64) -> Self {
        Self { lower, upper: None }
    }

    /// Interval `[lower, upper]`
    pub fn between(lower: f64, upper: f64) -> Self {
        Self {
            lower,
            upper: Some(upper),
        }
    }

    /// Lower end of the interval
    pub fn lower(&self) -> f64 {
        self.lower
    }

    /// Upper end of the interval, `None` if unbounded
    pub fn upper(&self) -> Option<f64> {
        self.upper
    }
}

impl fmt::Display for TimeBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upper {
            Some(upper) if self.lower == 0.0 => write!(f, "<={upper}"),
            Some(upper) => write!(f, "[{},{upper}]", self.lower),
            None => write!(f, ">={}", self.lower),
        }
    }
}

/// Quantity accumulated by a reward operator
#[derive(Debug, Clone, PartialEq)]
pub enum RewardObjective {
    /// `F phi`: reward accumulated until a `phi` state is reached
    Reachability(Box<StateFormula>),
    /// `C<=t`: reward accumulated up to step (time) `t`
    Cumulative(f64),
    /// `I=t`: state reward at step (time) `t`
    Instantaneous(f64),
    /// `S`: long-run average reward
    LongRunAverage,
}

impl fmt::Display for RewardObjective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RewardObjective::Reachability(target) => write!(f, "F {target}"),
            RewardObjective::Cumulative(t) => write!(f, "C<={t}"),
            RewardObjective::Instantaneous(t) => write!(f, "I={t}"),
            RewardObjective::LongRunAverage => write!(f, "S"),
        }
    }
}

/// Accumulation of the values of a property over the states of a filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
    /// The property holds in all filter states
    Forall,
    /// The property holds in some filter state
    Exists,
    /// Smallest value in the filter states
    Min,
    /// Largest value in the filter states
    Max,
    /// Average value over the filter states
    Avg,
    /// Number of filter states satisfying the property
    Count,
    /// Sum of the values in the filter states
    Sum,
    /// Value in the single filter state
    State,
    /// Value in the filter state with the smallest index
    First,
    /// Filter states in which the value is minimal
    Argmin,
    /// Filter states in which the value is maximal
    Argmax,
    /// Smallest and largest value in the filter states
    Range,
}

impl FilterKind {
    /// Whether the filter yields a set of states instead of a single value
    pub fn is_per_state(&self) -> bool {
        matches!(self, FilterKind::Argmin | FilterKind::Argmax)
    }

    /// Whether the property of the filter needs to be numeric, `None` if
    /// both kinds of properties are accepted
    pub fn needs_numeric_property(&self) -> Option<bool> {
        match self {
            FilterKind::Forall | FilterKind::Exists | FilterKind::Count => Some(false),
            FilterKind::State | FilterKind::First => None,
            _ => Some(true),
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FilterKind::Forall => "forall",
            FilterKind::Exists => "exists",
            FilterKind::Min => "min",
            FilterKind::Max => "max",
            FilterKind::Avg => "avg",
            FilterKind::Count => "count",
            FilterKind::Sum => "sum",
            FilterKind::State => "state",
            FilterKind::First => "first",
            FilterKind::Argmin => "argmin",
            FilterKind::Argmax => "argmax",
            FilterKind::Range => "range",
        };
        write!(f, "{name}")
    }
}

/// Formula evaluated in a single state
#[derive(Debug, Clone, PartialEq)]
pub enum StateFormula {
    /// Holds in every state
    True,
    /// Holds in no state
    False,
    /// Boolean expression over the variables of the model
    Expression(Expression),
    /// Label of the model, including the built-in labels `init` and
    /// `deadlock`
    Label(Label),
    /// Negation
    Not(Box<StateFormula>),
    /// Conjunction
    And(Box<StateFormula>, Box<StateFormula>),
    /// Disjunction
    Or(Box<StateFormula>, Box<StateFormula>),
    /// Probability of the paths satisfying a path formula
    Probability {
        /// Optimization direction, required for queries on MDPs
        direction: Option<Direction>,
        /// Value query or bound
        query: Query,
        /// Path formula
        path: Box<PathFormula>,
    },
    /// Expected reward
    Reward {
        /// Name of the reward structure, the first structure if `None`
        structure: Option<String>,
        /// Optimization direction, required for queries on MDPs
        direction: Option<Direction>,
        /// Value query or bound
        query: Query,
        /// Accumulated quantity
        objective: RewardObjective,
    },
    /// Long-run probability of being in a state satisfying the formula
    SteadyState {
        /// Value query or bound
        query: Query,
        /// States whose long-run probability is measured
        formula: Box<StateFormula>,
    },
    /// Value of `property` accumulated over the states satisfying `states`
    ///
    /// Apart from `argmin` and `argmax` the value is the same in every
    /// state.
    Filter {
        /// Accumulation
        kind: FilterKind,
        /// Filtered property, may be a numeric query
        property: Box<StateFormula>,
        /// States the property is accumulated over
        states: Box<StateFormula>,
    },
}

impl StateFormula {
    /// Atomic predicate given by a boolean expression
    pub fn expression(expr: Expression) -> Self {
        StateFormula::Expression(expr)
    }

    /// Reference to a label of the model
    pub fn label(name: impl ToString) -> Self {
        StateFormula::Label(Label::new(name))
    }

    /// `!self`
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        StateFormula::Not(Box::new(self))
    }

    /// `self & rhs`
    pub fn and(self, rhs: StateFormula) -> Self {
        StateFormula::And(Box::new(self), Box::new(rhs))
    }

    /// `self | rhs`
    pub fn or(self, rhs: StateFormula) -> Self {
        StateFormula::Or(Box::new(self), Box::new(rhs))
    }

    /// `P [path]`
    pub fn probability(direction: Option<Direction>, query: Query, path: PathFormula) -> Self {
        StateFormula::Probability {
            direction,
            query,
            path: Box::new(path),
        }
    }

    /// `R{structure} [objective]`
    pub fn reward(
        structure: Option<&str>,
        direction: Option<Direction>,
        query: Query,
        objective: RewardObjective,
    ) -> Self {
        StateFormula::Reward {
            structure: structure.map(str::to_string),
            direction,
            query,
            objective,
        }
    }

    /// `S [formula]`
    pub fn steady_state(query: Query, formula: StateFormula) -> Self {
        StateFormula::SteadyState {
            query,
            formula: Box::new(formula),
        }
    }

    /// `filter(kind, property, states)`
    pub fn filter(kind: FilterKind, property: StateFormula, states: StateFormula) -> Self {
        StateFormula::Filter {
            kind,
            property: Box::new(property),
            states: Box::new(states),
        }
    }

    /// Whether the formula asks for a numeric value (`=?`) instead of a
    /// truth value
    pub fn is_query(&self) -> bool {
        match self {
            StateFormula::Probability { query, .. }
            | StateFormula::Reward { query, .. }
            | StateFormula::SteadyState { query, .. } => *query == Query::Value,
            StateFormula::Filter { kind, property, .. } => match kind {
                FilterKind::Forall | FilterKind::Exists | FilterKind::Argmin | FilterKind::Argmax => {
                    false
                }
                FilterKind::State | FilterKind::First => property.is_query(),
                _ => true,
            },
            _ => false,
        }
    }

    /// Direct state sub-formulas, including those of path formulas and
    /// reward objectives
    pub(crate) fn children(&self) -> Vec<&StateFormula> {
        match self {
            StateFormula::True
            | StateFormula::False
            | StateFormula::Expression(_)
            | StateFormula::Label(_) => Vec::new(),
            StateFormula::Not(a) => vec![a],
            StateFormula::And(a, b) | StateFormula::Or(a, b) => vec![a, b],
            StateFormula::Probability { path, .. } => path.state_formulas(),
            StateFormula::Reward { objective, .. } => match objective {
                RewardObjective::Reachability(target) => vec![target],
                _ => Vec::new(),
            },
            StateFormula::SteadyState { formula, .. } => vec![formula],
            StateFormula::Filter {
                property, states, ..
            } => vec![property, states],
        }
    }
}

impl StateFormula {
    /// Replace all constants in atomic expressions by their values
    pub(crate) fn substitute_constants(&self, values: &HashMap<Constant, Value>) -> StateFormula {
        let boxed = |f: &StateFormula| Box::new(f.substitute_constants(values));
        match self {
            StateFormula::True => StateFormula::True,
            StateFormula::False => StateFormula::False,
            StateFormula::Expression(expr) => {
                StateFormula::Expression(expr.substitute_constants(values))
            }
            StateFormula::Label(label) => StateFormula::Label(label.clone()),
            StateFormula::Not(a) => StateFormula::Not(boxed(a)),
            StateFormula::And(a, b) => StateFormula::And(boxed(a), boxed(b)),
            StateFormula::Or(a, b) => StateFormula::Or(boxed(a), boxed(b)),
            StateFormula::Probability {
                direction,
                query,
                path,
            } => StateFormula::Probability {
                direction: *direction,
                query: *query,
                path: Box::new(path.substitute_constants(values)),
            },
            StateFormula::Reward {
                structure,
                direction,
                query,
                objective,
            } => StateFormula::Reward {
                structure: structure.clone(),
                direction: *direction,
                query: *query,
                objective: match objective {
                    RewardObjective::Reachability(target) => {
                        RewardObjective::Reachability(boxed(target))
                    }
                    other => other.clone(),
                },
            },
            StateFormula::SteadyState { query, formula } => StateFormula::SteadyState {
                query: *query,
                formula: boxed(formula),
            },
            StateFormula::Filter {
                kind,
                property,
                states,
            } => StateFormula::Filter {
                kind: *kind,
                property: boxed(property),
                states: boxed(states),
            },
        }
    }
}

impl fmt::Display for StateFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let direction = |d: &Option<Direction>| d.map(|d| d.to_string()).unwrap_or_default();
        match self {
            StateFormula::True => write!(f, "true"),
            StateFormula::False => write!(f, "false"),
            StateFormula::Expression(expr @ (Expression::Binary(..) | Expression::Ite(..))) => {
                write!(f, "({expr})")
            }
            StateFormula::Expression(expr) => write!(f, "{expr}"),
            StateFormula::Label(label) => write!(f, "{label}"),
            StateFormula::Not(a) => write!(f, "!{a}"),
            StateFormula::And(a, b) => write!(f, "({a} & {b})"),
            StateFormula::Or(a, b) => write!(f, "({a} | {b})"),
            StateFormula::Probability {
                direction: d,
                query,
                path,
            } => write!(f, "P{}{query} [{path}]", direction(d)),
            StateFormula::Reward {
                structure,
                direction: d,
                query,
                objective,
            } => {
                write!(f, "R")?;
                if let Some(name) = structure {
                    write!(f, "{{\"{name}\"}}")?;
                }
                write!(f, "{}{query} [{objective}]", direction(d))
            }
            StateFormula::SteadyState { query, formula } => write!(f, "S{query} [{formula}]"),
            StateFormula::Filter {
                kind,
                property,
                states,
            } => match states.as_ref() {
                StateFormula::True => write!(f, "filter({kind}, {property})"),
                states => write!(f, "filter({kind}, {property}, {states})"),
            },
        }
    }
}

/// Formula evaluated on an infinite path
#[derive(Debug, Clone, PartialEq)]
pub enum PathFormula {
    /// State formula holding in the first state of the path
    State(Box<StateFormula>),
    /// Negation
    Not(Box<PathFormula>),
    /// Conjunction
    And(Box<PathFormula>, Box<PathFormula>),
    /// Disjunction
    Or(Box<PathFormula>, Box<PathFormula>),
    /// Implication
    Implies(Box<PathFormula>, Box<PathFormula>),
    /// Next
    Next(Box<PathFormula>),
    /// Until, optionally time bounded
    Until(Box<PathFormula>, Box<PathFormula>, Option<TimeBound>),
    /// Release
    Release(Box<PathFormula>, Box<PathFormula>),
    /// Eventually, optionally time bounded
    Finally(Box<PathFormula>, Option<TimeBound>),
    /// Always, optionally time bounded
    Globally(Box<PathFormula>, Option<TimeBound>),
}

impl PathFormula {
    /// Path formula holding iff `formula` holds in the first state
    pub fn state(formula: StateFormula) -> Self {
        PathFormula::State(Box::new(formula))
    }

    /// `X formula`
    pub fn next(formula: impl Into<PathFormula>) -> Self {
        PathFormula::Next(Box::new(formula.into()))
    }

    /// `F formula`
    pub fn eventually(formula: impl Into<PathFormula>) -> Self {
        PathFormula::Finally(Box::new(formula.into()), None)
    }

    /// `F{bound} formula`
    pub fn bounded_eventually(formula: impl Into<PathFormula>, bound: TimeBound) -> Self {
        PathFormula::Finally(Box::new(formula.into()), Some(bound))
    }

    /// `G formula`
    pub fn always(formula: impl Into<PathFormula>) -> Self {
        PathFormula::Globally(Box::new(formula.into()), None)
    }

    /// `G{bound} formula`
    pub fn bounded_always(formula: impl Into<PathFormula>, bound: TimeBound) -> Self {
        PathFormula::Globally(Box::new(formula.into()), Some(bound))
    }

    /// `lhs U rhs`
    pub fn until(lhs: impl Into<PathFormula>, rhs: impl Into<PathFormula>) -> Self {
        PathFormula::Until(Box::new(lhs.into()), Box::new(rhs.into()), None)
    }

    /// `lhs U{bound} rhs`
    pub fn bounded_until(
        lhs: impl Into<PathFormula>,
        rhs: impl Into<PathFormula>,
        bound: TimeBound,
    ) -> Self {
        PathFormula::Until(Box::new(lhs.into()), Box::new(rhs.into()), Some(bound))
    }

    /// `lhs R rhs`
    pub fn release(lhs: impl Into<PathFormula>, rhs: impl Into<PathFormula>) -> Self {
        PathFormula::Release(Box::new(lhs.into()), Box::new(rhs.into()))
    }

    /// `!self`
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        PathFormula::Not(Box::new(self))
    }

    /// `self & rhs`
    pub fn and(self, rhs: impl Into<PathFormula>) -> Self {
        PathFormula::And(Box::new(self), Box::new(rhs.into()))
    }

    /// `self | rhs`
    pub fn or(self, rhs: impl Into<PathFormula>) -> Self {
        PathFormula::Or(Box::new(self), Box::new(rhs.into()))
    }

    /// `self -> rhs`
    pub fn implies(self, rhs: impl Into<PathFormula>) -> Self {
        PathFormula::Implies(Box::new(self), Box::new(rhs.into()))
    }

    /// The state formula if the path formula is a plain state formula
    pub fn as_state(&self) -> Option<&StateFormula> {
        match self {
            PathFormula::State(s) => Some(s),
            _ => None,
        }
    }

    /// Time bounds appearing in the formula
    pub fn time_bounds(&self) -> Vec<&TimeBound> {
        let mut bounds = Vec::new();
        self.visit(&mut |p| match p {
            PathFormula::Until(_, _, Some(b))
            | PathFormula::Finally(_, Some(b))
            | PathFormula::Globally(_, Some(b)) => bounds.push(b),
            _ => {}
        });
        bounds
    }

    /// Maximal state sub-formulas
    pub(crate) fn state_formulas(&self) -> Vec<&StateFormula> {
        let mut states = Vec::new();
        self.visit(&mut |p| {
            if let PathFormula::State(s) = p {
                states.push(s.as_ref());
            }
        });
        states
    }

    /// Pre-order traversal of all path sub-formulas
    fn visit<'a>(&'a self, f: &mut impl FnMut(&'a PathFormula)) {
        f(self);
        match self {
            PathFormula::State(_) => {}
            PathFormula::Not(a)
            | PathFormula::Next(a)
            | PathFormula::Finally(a, _)
            | PathFormula::Globally(a, _) => a.visit(f),
            PathFormula::And(a, b)
            | PathFormula::Or(a, b)
            | PathFormula::Implies(a, b)
            | PathFormula::Until(a, b, _)
            | PathFormula::Release(a, b) => {
                a.visit(f);
                b.visit(f);
            }
        }
    }
}

impl PathFormula {
    fn substitute_constants(&self, values: &HashMap<Constant, Value>) -> PathFormula {
        let boxed = |p: &PathFormula| Box::new(p.substitute_constants(values));
        match self {
            PathFormula::State(s) => PathFormula::State(Box::new(s.substitute_constants(values))),
            PathFormula::Not(a) => PathFormula::Not(boxed(a)),
            PathFormula::And(a, b) => PathFormula::And(boxed(a), boxed(b)),
            PathFormula::Or(a, b) => PathFormula::Or(boxed(a), boxed(b)),
            PathFormula::Implies(a, b) => PathFormula::Implies(boxed(a), boxed(b)),
            PathFormula::Next(a) => PathFormula::Next(boxed(a)),
            PathFormula::Until(a, b, tb) => PathFormula::Until(boxed(a), boxed(b), *tb),
            PathFormula::Release(a, b) => PathFormula::Release(boxed(a), boxed(b)),
            PathFormula::Finally(a, tb) => PathFormula::Finally(boxed(a), *tb),
            PathFormula::Globally(a, tb) => PathFormula::Globally(boxed(a), *tb),
        }
    }
}

impl From<StateFormula> for PathFormula {
    fn from(formula: StateFormula) -> Self {
        PathFormula::state(formula)
    }
}

impl fmt::Display for PathFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bound = |b: &Option<TimeBound>| b.map(|b| b.to_string()).unwrap_or_default();
        match self {
            PathFormula::State(s) => write!(f, "{s}"),
            PathFormula::Not(a) => write!(f, "!{a}"),
            PathFormula::And(a, b) => write!(f, "({a} & {b})"),
            PathFormula::Or(a, b) => write!(f, "({a} | {b})"),
            PathFormula::Implies(a, b) => write!(f, "({a} => {b})"),
            PathFormula::Next(a) => write!(f, "X {a}"),
            PathFormula::Until(a, b, tb) => write!(f, "({a} U{} {b})", bound(tb)),
            PathFormula::Release(a, b) => write!(f, "({a} R {b})"),
            PathFormula::Finally(a, tb) => write!(f, "F{} {a}", bound(tb)),
            PathFormula::Globally(a, tb) => write!(f, "G{} {a}", bound(tb)),
        }
    }
}
