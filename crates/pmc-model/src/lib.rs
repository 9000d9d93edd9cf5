//! Guarded-command models of probabilistic systems
//!
//! A [`Model`] consists of bounded integer and boolean variables, declared
//! globally or inside [`Module`]s, and guarded [`Command`]s of the form
//! `[action] guard -> w_1 : update_1 + ... + w_n : update_n`. Depending on the
//! [`ModelType`], the weights `w_i` are probabilities (DTMC, MDP) or rates
//! (CTMC). Models additionally carry named constants, labels, reward
//! structures and an optional initial-state predicate.
//!
//! Models are constructed through the [`builder::ModelBuilder`], which ensures
//! that all names are declared and unique. Before the state space of a model
//! can be explored, its constants need to be bound using
//! [`Model::bind_constants`].

use std::{
    collections::{BTreeSet, HashMap},
    error,
    fmt::{self, Display},
};

use expressions::{
    Action, Atomic, Constant, EvaluationError, Expression, Label, Value, Variable,
};
use pmc_display_utils::{indent_all, join_iterator};

pub mod builder;
pub mod expressions;

/// Kind of stochastic model described by a [`Model`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "config_deserialize", derive(serde::Deserialize))]
pub enum ModelType {
    /// Discrete-time Markov chain
    Dtmc,
    /// Continuous-time Markov chain
    Ctmc,
    /// Markov decision process
    Mdp,
}

impl ModelType {
    /// Whether states can have more than one nondeterministic choice
    pub fn is_nondeterministic(&self) -> bool {
        matches!(self, ModelType::Mdp)
    }

    /// Whether the weights of the model are rates
    pub fn is_continuous_time(&self) -> bool {
        matches!(self, ModelType::Ctmc)
    }
}

impl Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelType::Dtmc => write!(f, "dtmc"),
            ModelType::Ctmc => write!(f, "ctmc"),
            ModelType::Mdp => write!(f, "mdp"),
        }
    }
}

/// Type of a named constant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstantType {
    /// Boolean constant
    Bool,
    /// Integer constant
    Int,
    /// Real constant
    Real,
}

impl Display for ConstantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstantType::Bool => write!(f, "bool"),
            ConstantType::Int => write!(f, "int"),
            ConstantType::Real => write!(f, "double"),
        }
    }
}

/// Declaration of a named constant, optionally with its defining expression
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantDeclaration {
    constant: Constant,
    ty: ConstantType,
    value: Option<Expression>,
}

impl ConstantDeclaration {
    /// Declare a constant whose value is supplied when binding constants
    pub fn undefined(name: impl ToString, ty: ConstantType) -> Self {
        Self {
            constant: Constant::new(name),
            ty,
            value: None,
        }
    }

    /// Declare a constant defined by the given expression
    pub fn defined(name: impl ToString, ty: ConstantType, value: Expression) -> Self {
        Self {
            constant: Constant::new(name),
            ty,
            value: Some(value),
        }
    }

    /// Get the declared constant
    pub fn constant(&self) -> &Constant {
        &self.constant
    }

    /// Get the type of the constant
    pub fn ty(&self) -> ConstantType {
        self.ty
    }

    /// Get the defining expression of the constant, if any
    pub fn value(&self) -> Option<&Expression> {
        self.value.as_ref()
    }
}

/// Type and domain of a state variable
#[derive(Debug, Clone, PartialEq)]
pub enum VariableType {
    /// Boolean variable
    Bool,
    /// Integer variable with inclusive bounds
    Int {
        /// Lower bound
        lower: Expression,
        /// Upper bound
        upper: Expression,
    },
}

/// Declaration of a state variable
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDeclaration {
    variable: Variable,
    ty: VariableType,
    init: Option<Expression>,
}

impl VariableDeclaration {
    /// Declare a boolean variable, initially `false`
    pub fn boolean(name: impl ToString) -> Self {
        Self {
            variable: Variable::new(name),
            ty: VariableType::Bool,
            init: None,
        }
    }

    /// Declare an integer variable with domain `[lower..upper]`, initially
    /// `lower`
    pub fn bounded_int(name: impl ToString, lower: Expression, upper: Expression) -> Self {
        Self {
            variable: Variable::new(name),
            ty: VariableType::Int { lower, upper },
            init: None,
        }
    }

    /// Set the initial value of the variable
    pub fn with_init(mut self, init: Expression) -> Self {
        self.init = Some(init);
        self
    }

    /// Get the declared variable
    pub fn variable(&self) -> &Variable {
        &self.variable
    }

    /// Get the type of the variable
    pub fn ty(&self) -> &VariableType {
        &self.ty
    }

    /// Get the explicitly declared initial value
    pub fn init(&self) -> Option<&Expression> {
        self.init.as_ref()
    }

    /// Get the initial value, defaulting to `false` or the lower bound
    pub fn init_or_default(&self) -> Expression {
        match (&self.init, &self.ty) {
            (Some(init), _) => init.clone(),
            (None, VariableType::Bool) => Expression::bool(false),
            (None, VariableType::Int { lower, .. }) => lower.clone(),
        }
    }

    fn expressions(&self) -> impl Iterator<Item = &Expression> {
        let bounds = match &self.ty {
            VariableType::Bool => vec![],
            VariableType::Int { lower, upper } => vec![lower, upper],
        };
        bounds.into_iter().chain(self.init.iter())
    }

    fn map_expressions(&self, f: &impl Fn(&Expression) -> Expression) -> Self {
        let ty = match &self.ty {
            VariableType::Bool => VariableType::Bool,
            VariableType::Int { lower, upper } => VariableType::Int {
                lower: f(lower),
                upper: f(upper),
            },
        };
        Self {
            variable: self.variable.clone(),
            ty,
            init: self.init.as_ref().map(f),
        }
    }
}

/// Assignment `(variable' = value)` of an update
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    variable: Variable,
    value: Expression,
}

impl Assignment {
    /// Create a new assignment
    pub fn new(variable: impl Into<Variable>, value: Expression) -> Self {
        Self {
            variable: variable.into(),
            value,
        }
    }

    /// Get the assigned variable
    pub fn variable(&self) -> &Variable {
        &self.variable
    }

    /// Get the assigned expression
    pub fn value(&self) -> &Expression {
        &self.value
    }
}

/// Weighted update of a command, assigning all variables simultaneously
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    weight: Expression,
    assignments: Vec<Assignment>,
}

impl Update {
    /// Create a new update with the given probability or rate
    pub fn new(weight: Expression, assignments: Vec<Assignment>) -> Self {
        Self {
            weight,
            assignments,
        }
    }

    /// Get the probability or rate of the update
    pub fn weight(&self) -> &Expression {
        &self.weight
    }

    /// Get the assignments of the update
    pub fn assignments(&self) -> &[Assignment] {
        &self.assignments
    }
}

/// Guarded command `[action] guard -> updates`
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    action: Option<Action>,
    guard: Expression,
    updates: Vec<Update>,
}

impl Command {
    /// Get the action label, `None` for unlabelled commands
    pub fn action(&self) -> Option<&Action> {
        self.action.as_ref()
    }

    /// Get the guard of the command
    pub fn guard(&self) -> &Expression {
        &self.guard
    }

    /// Get the weighted updates of the command
    pub fn updates(&self) -> &[Update] {
        &self.updates
    }

    fn expressions(&self) -> impl Iterator<Item = &Expression> {
        std::iter::once(&self.guard).chain(self.updates.iter().flat_map(|u| {
            std::iter::once(&u.weight).chain(u.assignments.iter().map(|a| &a.value))
        }))
    }

    fn map_expressions(&self, f: &impl Fn(&Expression) -> Expression) -> Self {
        Self {
            action: self.action.clone(),
            guard: f(&self.guard),
            updates: self
                .updates
                .iter()
                .map(|u| Update {
                    weight: f(&u.weight),
                    assignments: u
                        .assignments
                        .iter()
                        .map(|a| Assignment::new(a.variable.clone(), f(&a.value)))
                        .collect(),
                })
                .collect(),
        }
    }
}

/// Module with local variables and commands
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    name: String,
    variables: Vec<VariableDeclaration>,
    commands: Vec<Command>,
}

impl Module {
    /// Get the name of the module
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the local variables of the module
    pub fn variables(&self) -> &[VariableDeclaration] {
        &self.variables
    }

    /// Get the commands of the module
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Get the actions the module synchronizes on
    pub fn alphabet(&self) -> BTreeSet<&Action> {
        self.commands.iter().filter_map(|c| c.action()).collect()
    }
}

/// State reward `guard : value`, earned in every state satisfying the guard
#[derive(Debug, Clone, PartialEq)]
pub struct StateReward {
    guard: Expression,
    value: Expression,
}

impl StateReward {
    /// Create a new state reward
    pub fn new(guard: Expression, value: Expression) -> Self {
        Self { guard, value }
    }

    /// Get the guard of the reward
    pub fn guard(&self) -> &Expression {
        &self.guard
    }

    /// Get the reward value
    pub fn value(&self) -> &Expression {
        &self.value
    }
}

/// Transition reward `[action] guard : value`, earned whenever a command with
/// the given action is taken in a state satisfying the guard
///
/// A transition reward without action applies to unlabelled commands only.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionReward {
    action: Option<Action>,
    guard: Expression,
    value: Expression,
}

impl TransitionReward {
    /// Create a new transition reward
    pub fn new(action: Option<Action>, guard: Expression, value: Expression) -> Self {
        Self {
            action,
            guard,
            value,
        }
    }

    /// Get the action the reward applies to
    pub fn action(&self) -> Option<&Action> {
        self.action.as_ref()
    }

    /// Get the guard of the reward
    pub fn guard(&self) -> &Expression {
        &self.guard
    }

    /// Get the reward value
    pub fn value(&self) -> &Expression {
        &self.value
    }
}

/// Named reward structure
#[derive(Debug, Clone, PartialEq)]
pub struct RewardStructure {
    name: String,
    state_rewards: Vec<StateReward>,
    transition_rewards: Vec<TransitionReward>,
}

impl RewardStructure {
    /// Create a new empty reward structure
    pub fn new(name: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            state_rewards: vec![],
            transition_rewards: vec![],
        }
    }

    /// Add a state reward
    pub fn with_state_reward(mut self, guard: Expression, value: Expression) -> Self {
        self.state_rewards.push(StateReward::new(guard, value));
        self
    }

    /// Add a transition reward
    pub fn with_transition_reward(
        mut self,
        action: Option<&str>,
        guard: Expression,
        value: Expression,
    ) -> Self {
        self.transition_rewards.push(TransitionReward::new(
            action.map(Action::new),
            guard,
            value,
        ));
        self
    }

    /// Get the name of the reward structure
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the state rewards
    pub fn state_rewards(&self) -> &[StateReward] {
        &self.state_rewards
    }

    /// Get the transition rewards
    pub fn transition_rewards(&self) -> &[TransitionReward] {
        &self.transition_rewards
    }

    /// Whether the structure contains any transition reward
    pub fn has_transition_rewards(&self) -> bool {
        !self.transition_rewards.is_empty()
    }

    fn expressions(&self) -> impl Iterator<Item = &Expression> {
        self.state_rewards
            .iter()
            .flat_map(|r| [&r.guard, &r.value])
            .chain(
                self.transition_rewards
                    .iter()
                    .flat_map(|r| [&r.guard, &r.value]),
            )
    }

    fn map_expressions(&self, f: &impl Fn(&Expression) -> Expression) -> Self {
        Self {
            name: self.name.clone(),
            state_rewards: self
                .state_rewards
                .iter()
                .map(|r| StateReward::new(f(&r.guard), f(&r.value)))
                .collect(),
            transition_rewards: self
                .transition_rewards
                .iter()
                .map(|r| TransitionReward::new(r.action.clone(), f(&r.guard), f(&r.value)))
                .collect(),
        }
    }
}

/// Guarded-command model of a DTMC, CTMC or MDP
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    name: String,
    model_type: ModelType,
    constants: Vec<ConstantDeclaration>,
    globals: Vec<VariableDeclaration>,
    modules: Vec<Module>,
    labels: Vec<(Label, Expression)>,
    rewards: Vec<RewardStructure>,
    init: Option<Expression>,
}

impl Model {
    /// Get the name of the model
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the type of the model
    pub fn model_type(&self) -> ModelType {
        self.model_type
    }

    /// Get the constant declarations in declaration order
    pub fn constants(&self) -> &[ConstantDeclaration] {
        &self.constants
    }

    /// Get the global variables
    pub fn globals(&self) -> &[VariableDeclaration] {
        &self.globals
    }

    /// Get the modules
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// Iterate over all variables, globals first, then module by module
    pub fn variables(&self) -> impl Iterator<Item = &VariableDeclaration> {
        self.globals
            .iter()
            .chain(self.modules.iter().flat_map(|m| m.variables.iter()))
    }

    /// Get the labels
    pub fn labels(&self) -> &[(Label, Expression)] {
        &self.labels
    }

    /// Get the expression of a label
    pub fn label(&self, label: &Label) -> Option<&Expression> {
        self.labels.iter().find(|(l, _)| l == label).map(|(_, e)| e)
    }

    /// Get the reward structures
    pub fn reward_structures(&self) -> &[RewardStructure] {
        &self.rewards
    }

    /// Get a reward structure by name
    pub fn reward_structure(&self, name: &str) -> Option<&RewardStructure> {
        self.rewards.iter().find(|r| r.name == name)
    }

    /// Get the initial state predicate, if the model has one
    pub fn init(&self) -> Option<&Expression> {
        self.init.as_ref()
    }

    /// Whether all constants of the model have a value and no expression
    /// references a constant anymore
    pub fn is_closed(&self) -> bool {
        self.constants
            .iter()
            .all(|c| matches!(c.value, Some(Expression::Literal(_))))
            && self.expressions().all(|e| e.constants().is_empty())
    }

    /// Values of the constants of a model whose constants have been bound
    pub fn constant_values(&self) -> HashMap<Constant, Value> {
        self.constants
            .iter()
            .filter_map(|c| match &c.value {
                Some(Expression::Literal(v)) => Some((c.constant.clone(), *v)),
                _ => None,
            })
            .collect()
    }

    /// Bind all constants of the model
    ///
    /// Constants without a definition take their value from `values`, defined
    /// constants are evaluated in declaration order. The returned model has all
    /// constants replaced by their values.
    ///
    /// # Example
    ///
    /// ```
    /// use std::collections::HashMap;
    /// use pmc_model::{*, builder::*, expressions::*};
    ///
    /// let model = ModelBuilder::new("m", ModelType::Dtmc)
    ///     .with_constant(ConstantDeclaration::undefined("N", ConstantType::Int)).unwrap()
    ///     .with_constant(ConstantDeclaration::defined(
    ///         "M",
    ///         ConstantType::Int,
    ///         Expression::constant("N") + Expression::int(1),
    ///     )).unwrap()
    ///     .build()
    ///     .unwrap();
    ///
    /// let bound = model
    ///     .bind_constants(&HashMap::from([("N".to_string(), Value::Int(2))]))
    ///     .unwrap();
    /// assert_eq!(bound.constant_values()[&Constant::new("M")], Value::Int(3));
    /// ```
    pub fn bind_constants(&self, values: &HashMap<String, Value>) -> Result<Model, ConstantError> {
        if let Some(unknown) = values
            .keys()
            .find(|name| !self.constants.iter().any(|c| c.constant.name() == name.as_str()))
        {
            return Err(ConstantError::UnknownConstant(unknown.clone()));
        }

        let mut bound: HashMap<Constant, Value> = HashMap::new();
        for decl in &self.constants {
            let value = match (&decl.value, values.get(decl.constant.name())) {
                (Some(_), Some(_)) => {
                    return Err(ConstantError::AlreadyDefined(decl.constant.clone()));
                }
                (None, None) => return Err(ConstantError::Undefined(decl.constant.clone())),
                (None, Some(v)) => *v,
                (Some(ex), None) => ex
                    .evaluate(&bound)
                    .map_err(|e| ConstantError::Evaluation(decl.constant.clone(), e))?,
            };

            let value = match decl.ty {
                ConstantType::Bool => value.as_bool().map(Value::Bool),
                ConstantType::Int => value.as_int().map(Value::Int),
                ConstantType::Real => value.as_real().map(Value::Real),
            }
            .map_err(|e| ConstantError::Evaluation(decl.constant.clone(), e))?;

            bound.insert(decl.constant.clone(), value);
        }

        let subst = |ex: &Expression| ex.substitute_constants(&bound);

        Ok(Model {
            name: self.name.clone(),
            model_type: self.model_type,
            constants: self
                .constants
                .iter()
                .map(|c| ConstantDeclaration {
                    constant: c.constant.clone(),
                    ty: c.ty,
                    value: Some(Expression::Literal(bound[&c.constant])),
                })
                .collect(),
            globals: self.globals.iter().map(|v| v.map_expressions(&subst)).collect(),
            modules: self
                .modules
                .iter()
                .map(|m| Module {
                    name: m.name.clone(),
                    variables: m.variables.iter().map(|v| v.map_expressions(&subst)).collect(),
                    commands: m.commands.iter().map(|c| c.map_expressions(&subst)).collect(),
                })
                .collect(),
            labels: self
                .labels
                .iter()
                .map(|(l, e)| (l.clone(), subst(e)))
                .collect(),
            rewards: self.rewards.iter().map(|r| r.map_expressions(&subst)).collect(),
            init: self.init.as_ref().map(subst),
        })
    }

    /// Iterate over all expressions appearing in the model
    fn expressions(&self) -> impl Iterator<Item = &Expression> {
        self.constants
            .iter()
            .filter_map(|c| c.value.as_ref())
            .chain(self.variables().flat_map(|v| v.expressions()))
            .chain(
                self.modules
                    .iter()
                    .flat_map(|m| m.commands.iter().flat_map(|c| c.expressions())),
            )
            .chain(self.labels.iter().map(|(_, e)| e))
            .chain(self.rewards.iter().flat_map(|r| r.expressions()))
            .chain(self.init.iter())
    }
}

impl Display for VariableDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ty {
            VariableType::Bool => write!(f, "{} : bool", self.variable)?,
            VariableType::Int { lower, upper } => {
                write!(f, "{} : [{lower}..{upper}]", self.variable)?
            }
        }
        if let Some(init) = &self.init {
            write!(f, " init {init}")?;
        }
        write!(f, ";")
    }
}

impl Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}' = {})", self.variable, self.value)
    }
}

impl Display for Update {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let assignments = if self.assignments.is_empty() {
            "true".to_string()
        } else {
            join_iterator(self.assignments.iter(), " & ")
        };
        write!(f, "{} : {assignments}", self.weight)
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let action = self.action.as_ref().map(|a| a.to_string()).unwrap_or_default();
        write!(
            f,
            "[{action}] {} -> {};",
            self.guard,
            join_iterator(self.updates.iter(), " + ")
        )
    }
}

impl Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = join_iterator(
            self.variables
                .iter()
                .map(|v| v.to_string())
                .chain(self.commands.iter().map(|c| c.to_string())),
            "\n",
        );
        write!(f, "module {}\n{}\nendmodule", self.name, indent_all(body))
    }
}

impl Display for RewardStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = join_iterator(
            self.state_rewards
                .iter()
                .map(|r| format!("{} : {};", r.guard, r.value))
                .chain(self.transition_rewards.iter().map(|r| {
                    let action = r.action.as_ref().map(|a| a.to_string()).unwrap_or_default();
                    format!("[{action}] {} : {};", r.guard, r.value)
                })),
            "\n",
        );
        write!(f, "rewards \"{}\"\n{}\nendrewards", self.name, indent_all(body))
    }
}

impl Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.model_type)?;

        for c in &self.constants {
            match &c.value {
                Some(v) => writeln!(f, "\nconst {} {} = {v};", c.ty, c.constant)?,
                None => writeln!(f, "\nconst {} {};", c.ty, c.constant)?,
            }
        }
        for v in &self.globals {
            writeln!(f, "\nglobal {v}")?;
        }
        for m in &self.modules {
            writeln!(f, "\n{m}")?;
        }
        for (l, e) in &self.labels {
            writeln!(f, "\nlabel {l} = {e};")?;
        }
        for r in &self.rewards {
            writeln!(f, "\n{r}")?;
        }
        if let Some(init) = &self.init {
            writeln!(f, "\ninit\n{}\nendinit", indent_all(init.to_string()))?;
        }
        Ok(())
    }
}

/// Error that can occur while binding the constants of a model
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantError {
    /// Constant has neither a definition nor a supplied value
    Undefined(Constant),
    /// A value was supplied for a constant that is defined in the model
    AlreadyDefined(Constant),
    /// A value was supplied for a constant that is not declared
    UnknownConstant(String),
    /// The definition of the constant could not be evaluated, or its value
    /// does not match the declared type
    Evaluation(Constant, EvaluationError),
}

impl error::Error for ConstantError {}

impl Display for ConstantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstantError::Undefined(c) => write!(f, "Constant {c} is undefined"),
            ConstantError::AlreadyDefined(c) => {
                write!(f, "Constant {c} is already defined in the model")
            }
            ConstantError::UnknownConstant(name) => write!(f, "Unknown constant {name}"),
            ConstantError::Evaluation(c, e) => {
                write!(f, "Failed to evaluate constant {c}: {e}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{CommandBuilder, ModelBuilder, ModuleBuilder};

    fn coin_model() -> Model {
        let module = ModuleBuilder::new("coin")
            .with_variable(VariableDeclaration::bounded_int(
                "c",
                Expression::int(0),
                Expression::constant("N"),
            ))
            .unwrap()
            .with_command(
                CommandBuilder::new(Expression::var("c").less_than(Expression::constant("N")))
                    .with_update(Expression::constant("p"), [("c", Expression::var("c") + Expression::int(1))])
                    .with_update(
                        Expression::real(1.0) - Expression::constant("p"),
                        [("c", Expression::int(0))],
                    )
                    .build(),
            )
            .unwrap()
            .build();

        ModelBuilder::new("coin", ModelType::Dtmc)
            .with_constant(ConstantDeclaration::undefined("N", ConstantType::Int))
            .unwrap()
            .with_constant(ConstantDeclaration::defined(
                "p",
                ConstantType::Real,
                Expression::int(1) / Expression::constant("N"),
            ))
            .unwrap()
            .with_module(module)
            .unwrap()
            .with_label("full", Expression::var("c").equals(Expression::constant("N")))
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn test_bind_constants() {
        let model = coin_model();
        assert!(!model.is_closed());

        let bound = model
            .bind_constants(&HashMap::from([("N".to_string(), Value::Int(4))]))
            .unwrap();
        assert!(bound.is_closed());
        assert_eq!(
            bound.constant_values(),
            HashMap::from([
                (Constant::new("N"), Value::Int(4)),
                (Constant::new("p"), Value::Real(0.25)),
            ])
        );
        assert_eq!(
            bound.label(&Label::new("full")),
            Some(&Expression::var("c").equals(Expression::int(4)))
        );
        assert!(bound.expressions().all(|e| e.constants().is_empty()));
    }

    #[test]
    fn test_bind_constants_errors() {
        let model = coin_model();

        assert_eq!(
            model.bind_constants(&HashMap::new()),
            Err(ConstantError::Undefined(Constant::new("N")))
        );
        assert_eq!(
            model.bind_constants(&HashMap::from([
                ("N".to_string(), Value::Int(4)),
                ("p".to_string(), Value::Real(0.5)),
            ])),
            Err(ConstantError::AlreadyDefined(Constant::new("p")))
        );
        assert_eq!(
            model.bind_constants(&HashMap::from([
                ("N".to_string(), Value::Int(4)),
                ("K".to_string(), Value::Int(1)),
            ])),
            Err(ConstantError::UnknownConstant("K".to_string()))
        );
        assert!(matches!(
            model.bind_constants(&HashMap::from([("N".to_string(), Value::Bool(true))])),
            Err(ConstantError::Evaluation(_, EvaluationError::TypeMismatch { .. }))
        ));
    }

    #[test]
    fn test_model_display() {
        let model = coin_model();
        let expected = "dtmc

const int N;

const double p = 1 / N;

module coin
    c : [0..N];
    [] c < N -> p : (c' = c + 1) + 1 - p : (c' = 0);
endmodule

label \"full\" = c = N;
";
        assert_eq!(model.to_string(), expected);
    }

    #[test]
    fn test_module_alphabet() {
        let module = ModuleBuilder::new("m")
            .with_command(
                CommandBuilder::new(Expression::bool(true))
                    .with_action("b")
                    .with_deterministic_update(Vec::<(&str, Expression)>::new())
                    .build(),
            )
            .unwrap()
            .with_command(
                CommandBuilder::new(Expression::bool(true))
                    .with_action("a")
                    .with_deterministic_update(Vec::<(&str, Expression)>::new())
                    .build(),
            )
            .unwrap()
            .with_command(
                CommandBuilder::new(Expression::bool(true))
                    .with_deterministic_update(Vec::<(&str, Expression)>::new())
                    .build(),
            )
            .unwrap()
            .build();

        assert_eq!(
            module.alphabet().into_iter().cloned().collect::<Vec<_>>(),
            vec![Action::new("a"), Action::new("b")]
        );
    }
}
