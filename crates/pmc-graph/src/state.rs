//! Encoding of model states
//!
//! A [`State`] stores the values of all variables of a model in the fixed
//! order given by a [`VariableLayout`]: global variables first, followed by
//! the local variables of the modules in declaration order. Booleans are
//! stored as 0 and 1.

use std::{collections::HashMap, fmt, ops::RangeInclusive};

use pmc_display_utils::join_iterator;
use pmc_model::{
    Model, VariableType,
    expressions::{EvaluationContext, Value, Variable},
};

use crate::BuildError;

/// Domain of a variable after constants have been substituted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    /// Boolean variable
    Bool,
    /// Integer variable with inclusive bounds
    Int {
        /// Lower bound
        lower: i64,
        /// Upper bound
        upper: i64,
    },
}

impl Domain {
    /// Raw values of the domain in increasing order
    pub fn values(&self) -> RangeInclusive<i64> {
        match self {
            Domain::Bool => 0..=1,
            Domain::Int { lower, upper } => *lower..=*upper,
        }
    }
}

/// Order and domains of the variables of a model
#[derive(Debug, Clone, PartialEq)]
pub struct VariableLayout {
    variables: Vec<(Variable, Domain)>,
    index: HashMap<Variable, usize>,
}

impl VariableLayout {
    /// Compute the layout of a model whose constants are bound
    pub fn new(model: &Model) -> Result<Self, BuildError> {
        let empty = HashMap::<Variable, Value>::new();
        let mut variables = Vec::new();

        for decl in model.variables() {
            let domain = match decl.ty() {
                VariableType::Bool => Domain::Bool,
                VariableType::Int { lower, upper } => {
                    let eval = |ex: &pmc_model::expressions::Expression| {
                        ex.evaluate_int(&empty).map_err(|error| BuildError::Evaluation {
                            context: format!("bounds of variable {}", decl.variable()),
                            error,
                        })
                    };
                    let (lower, upper) = (eval(lower)?, eval(upper)?);
                    if lower > upper {
                        return Err(BuildError::InvalidBounds {
                            variable: decl.variable().clone(),
                            lower,
                            upper,
                        });
                    }
                    Domain::Int { lower, upper }
                }
            };
            variables.push((decl.variable().clone(), domain));
        }

        let index = variables
            .iter()
            .enumerate()
            .map(|(i, (v, _))| (v.clone(), i))
            .collect();

        Ok(Self { variables, index })
    }

    /// Number of variables
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Whether the model has no variables
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Position of a variable in the state vector
    pub fn index_of(&self, var: &Variable) -> Option<usize> {
        self.index.get(var).copied()
    }

    /// Variables and their domains in layout order
    pub fn variables(&self) -> impl Iterator<Item = &(Variable, Domain)> {
        self.variables.iter()
    }

    /// Domain of the variable at position `i`
    pub fn domain(&self, i: usize) -> Domain {
        self.variables[i].1
    }

    /// Convert a value into its raw representation for position `i`
    ///
    /// Fails if the value has the wrong type or lies outside of the domain.
    pub fn encode(&self, i: usize, value: Value) -> Result<i64, BuildError> {
        let (var, domain) = &self.variables[i];
        let raw = match (domain, value) {
            (Domain::Bool, Value::Bool(b)) => i64::from(b),
            (Domain::Int { .. }, Value::Int(n)) => n,
            (_, value) => {
                return Err(BuildError::IllTypedValue {
                    variable: var.clone(),
                    value,
                });
            }
        };
        if !domain.values().contains(&raw) {
            return Err(BuildError::VariableOutOfBounds {
                variable: var.clone(),
                value: raw,
                state: String::new(),
            });
        }
        Ok(raw)
    }

    /// Convert the raw value at position `i` back into a [`Value`]
    pub fn decode(&self, i: usize, raw: i64) -> Value {
        match self.variables[i].1 {
            Domain::Bool => Value::Bool(raw != 0),
            Domain::Int { .. } => Value::Int(raw),
        }
    }

    /// Human readable rendering of a state, e.g. `(s=1, b=true)`
    pub fn display_state(&self, state: &State) -> String {
        self.display_values(state.values())
    }

    fn display_values(&self, values: &[i64]) -> String {
        let assignments = self
            .variables
            .iter()
            .enumerate()
            .map(|(i, (var, _))| format!("{var}={}", self.decode(i, values[i])));
        format!("({})", join_iterator(assignments, ", "))
    }

    /// Total number of valuations of all domains, saturating at `u128::MAX`
    pub fn num_valuations(&self) -> u128 {
        self.variables.iter().fold(1u128, |acc, (_, d)| {
            let size = d.values().end().abs_diff(*d.values().start()) as u128 + 1;
            acc.saturating_mul(size)
        })
    }

    /// All valuations of the domains in lexicographic order, the first
    /// variable being the most significant
    pub fn valuations(&self) -> impl Iterator<Item = State> + '_ {
        let mut next = Some(
            self.variables
                .iter()
                .map(|(_, d)| *d.values().start())
                .collect::<Vec<_>>(),
        );

        std::iter::from_fn(move || {
            let current = next.take()?;
            let mut succ = current.clone();
            for i in (0..succ.len()).rev() {
                if succ[i] < *self.variables[i].1.values().end() {
                    succ[i] += 1;
                    next = Some(succ);
                    break;
                }
                succ[i] = *self.variables[i].1.values().start();
            }
            Some(State::new(current))
        })
    }
}

/// Valuation of all variables of a model
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct State(Box<[i64]>);

impl State {
    /// Create a state from its raw values
    pub fn new(values: impl Into<Box<[i64]>>) -> Self {
        Self(values.into())
    }

    /// Raw values of the variables in layout order
    pub fn values(&self) -> &[i64] {
        &self.0
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", join_iterator(self.0.iter(), ","))
    }
}

/// A state together with its layout, used to evaluate expressions
#[derive(Debug, Clone, Copy)]
pub struct StateValuation<'a> {
    layout: &'a VariableLayout,
    values: &'a [i64],
}

impl<'a> StateValuation<'a> {
    /// Create the valuation of `state`
    pub fn new(layout: &'a VariableLayout, state: &'a State) -> Self {
        Self {
            layout,
            values: state.values(),
        }
    }

    /// Human readable rendering of the state
    pub fn display(&self) -> String {
        self.layout.display_values(self.values)
    }
}

impl EvaluationContext for StateValuation<'_> {
    fn variable(&self, var: &Variable) -> Option<Value> {
        let i = self.layout.index_of(var)?;
        Some(self.layout.decode(i, self.values[i]))
    }
}
