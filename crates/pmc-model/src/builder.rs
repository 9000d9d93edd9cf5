//! Factory methods for building a valid [`Model`]
//!
//! This module contains the builder [`ModelBuilder`] for a [`Model`], as well
//! as the builders [`ModuleBuilder`] and [`CommandBuilder`] for its
//! components. The builders ensure that the model is well-formed, e.g., that
//! all names are unique, that all variables and constants referenced in
//! expressions are declared and that modules only update variables they are
//! allowed to write.

use std::{
    collections::HashSet,
    error,
    fmt::{self, Display},
};

use crate::{
    Assignment, Command, ConstantDeclaration, Model, ModelType, Module, RewardStructure, Update,
    VariableDeclaration,
    expressions::{Action, Atomic, Constant, Expression, Label, Variable},
};

/// Labels that are always defined and cannot be declared by a model
pub const RESERVED_LABELS: [&str; 2] = ["init", "deadlock"];

/// Builder for constructing a [`Model`]
///
/// Constants, global variables, modules, labels, reward structures and the
/// initial state predicate are added one by one. Every `with_*` method checks
/// for duplicate and clashing names, [`ModelBuilder::build`] validates that
/// all expressions only reference declared names.
///
/// # Example
///
/// ```
/// use pmc_model::{*, builder::*, expressions::*};
///
/// let module = ModuleBuilder::new("coin")
///     .with_variable(VariableDeclaration::boolean("heads")).unwrap()
///     .with_command(
///         CommandBuilder::new(!Expression::var("heads"))
///             .with_update(Expression::real(0.5), [("heads", Expression::bool(true))])
///             .with_update(Expression::real(0.5), [("heads", Expression::bool(false))])
///             .build(),
///     ).unwrap()
///     .build();
///
/// let model = ModelBuilder::new("coin", ModelType::Dtmc)
///     .with_module(module).unwrap()
///     .with_label("heads", Expression::var("heads")).unwrap()
///     .build()
///     .unwrap();
///
/// assert_eq!(model.modules().len(), 1);
/// assert!(model.label(&Label::new("heads")).is_some());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ModelBuilder {
    model: Model,
}

impl ModelBuilder {
    /// Create a new model builder
    pub fn new(name: impl ToString, model_type: ModelType) -> Self {
        ModelBuilder {
            model: Model {
                name: name.to_string(),
                model_type,
                constants: vec![],
                globals: vec![],
                modules: vec![],
                labels: vec![],
                rewards: vec![],
                init: None,
            },
        }
    }

    /// Checks whether a name is already used by a constant or variable
    fn check_for_name_clash(&self, name: &str) -> bool {
        self.model.constants.iter().any(|c| c.constant.name() == name)
            || self.model.variables().any(|v| v.variable.name() == name)
    }

    /// Adds a constant to the model
    ///
    /// If the constant is already declared or its name is already taken an
    /// error is returned.
    pub fn with_constant(mut self, decl: ConstantDeclaration) -> Result<Self, BuilderError> {
        if self.model.constants.iter().any(|c| c.constant == decl.constant) {
            return Err(BuilderError::DuplicateConstant(decl.constant));
        }

        if self.check_for_name_clash(decl.constant.name()) {
            return Err(BuilderError::NameClash(decl.constant.name().to_string()));
        }

        self.model.constants.push(decl);
        Ok(self)
    }

    /// Adds multiple constants to the model
    pub fn with_constants(
        self,
        decls: impl IntoIterator<Item = ConstantDeclaration>,
    ) -> Result<Self, BuilderError> {
        let mut res = self;
        for decl in decls {
            res = res.with_constant(decl)?;
        }
        Ok(res)
    }

    /// Adds a global variable to the model
    pub fn with_global_variable(mut self, decl: VariableDeclaration) -> Result<Self, BuilderError> {
        if self.model.variables().any(|v| v.variable == decl.variable) {
            return Err(BuilderError::DuplicateVariable(decl.variable));
        }

        if self.check_for_name_clash(decl.variable.name()) {
            return Err(BuilderError::NameClash(decl.variable.name().to_string()));
        }

        self.model.globals.push(decl);
        Ok(self)
    }

    /// Adds a module to the model
    ///
    /// Returns an error if a module with the same name exists or one of the
    /// local variables of the module is already declared.
    pub fn with_module(mut self, module: Module) -> Result<Self, BuilderError> {
        if self.model.modules.iter().any(|m| m.name == module.name) {
            return Err(BuilderError::DuplicateModule(module.name));
        }

        for decl in &module.variables {
            if self.model.variables().any(|v| v.variable == decl.variable) {
                return Err(BuilderError::DuplicateVariable(decl.variable.clone()));
            }
            if self.check_for_name_clash(decl.variable.name()) {
                return Err(BuilderError::NameClash(decl.variable.name().to_string()));
            }
        }

        self.model.modules.push(module);
        Ok(self)
    }

    /// Adds multiple modules to the model
    pub fn with_modules(self, modules: impl IntoIterator<Item = Module>) -> Result<Self, BuilderError> {
        let mut res = self;
        for module in modules {
            res = res.with_module(module)?;
        }
        Ok(res)
    }

    /// Adds a label, i.e., a named state predicate, to the model
    pub fn with_label(mut self, name: impl ToString, expr: Expression) -> Result<Self, BuilderError> {
        let label = Label::new(name);

        if RESERVED_LABELS.contains(&label.name()) {
            return Err(BuilderError::ReservedLabel(label));
        }

        if self.model.labels.iter().any(|(l, _)| *l == label) {
            return Err(BuilderError::DuplicateLabel(label));
        }

        self.model.labels.push((label, expr));
        Ok(self)
    }

    /// Adds a reward structure to the model
    pub fn with_reward_structure(mut self, rewards: RewardStructure) -> Result<Self, BuilderError> {
        if self.model.rewards.iter().any(|r| r.name == rewards.name) {
            return Err(BuilderError::DuplicateRewardStructure(rewards.name));
        }

        self.model.rewards.push(rewards);
        Ok(self)
    }

    /// Sets the initial state predicate of the model
    ///
    /// A model with an initial state predicate must not declare initial values
    /// for its variables, this is checked in [`ModelBuilder::build`].
    pub fn with_init(mut self, init: Expression) -> Result<Self, BuilderError> {
        if self.model.init.is_some() {
            return Err(BuilderError::MalformedInit(
                "initial states are already defined".to_string(),
            ));
        }

        self.model.init = Some(init);
        Ok(self)
    }

    /// Check that `expr` only references declared variables and the given
    /// constants
    fn check_declared(
        expr: &Expression,
        variables: &HashSet<&Variable>,
        constants: &HashSet<&Constant>,
    ) -> Result<(), BuilderError> {
        if let Some(v) = expr.variables().into_iter().find(|v| !variables.contains(v)) {
            return Err(BuilderError::UnknownComponent(format!("variable {v} in {expr}")));
        }
        if let Some(c) = expr.constants().into_iter().find(|c| !constants.contains(c)) {
            return Err(BuilderError::UnknownComponent(format!("constant {c} in {expr}")));
        }
        Ok(())
    }

    /// Validate the model and return it
    pub fn build(self) -> Result<Model, BuilderError> {
        let no_variables = HashSet::new();

        // constants may only reference constants declared before them
        let mut constants = HashSet::new();
        for decl in &self.model.constants {
            if let Some(value) = &decl.value {
                Self::check_declared(value, &no_variables, &constants)?;
            }
            constants.insert(&decl.constant);
        }

        // variable bounds and initial values may only reference constants
        for decl in self.model.variables() {
            for ex in decl.expressions() {
                Self::check_declared(ex, &no_variables, &constants)?;
            }
        }

        if self.model.init.is_some()
            && let Some(decl) = self.model.variables().find(|v| v.init.is_some())
        {
            return Err(BuilderError::MalformedInit(format!(
                "variable {} declares an initial value although the model has an init predicate",
                decl.variable
            )));
        }

        let variables = self.model.variables().map(|v| &v.variable).collect::<HashSet<_>>();
        let globals = self.model.globals.iter().map(|v| &v.variable).collect::<HashSet<_>>();

        for module in &self.model.modules {
            let writable = module
                .variables
                .iter()
                .map(|v| &v.variable)
                .chain(globals.iter().copied())
                .collect::<HashSet<_>>();

            for cmd in &module.commands {
                for ex in cmd.expressions() {
                    Self::check_declared(ex, &variables, &constants)?;
                }

                for update in &cmd.updates {
                    for a in &update.assignments {
                        if !variables.contains(&a.variable) {
                            return Err(BuilderError::UnknownComponent(format!(
                                "variable {} assigned in module {}",
                                a.variable, module.name
                            )));
                        }
                        if !writable.contains(&a.variable) {
                            return Err(BuilderError::ForeignAssignment {
                                module: module.name.clone(),
                                variable: a.variable.clone(),
                            });
                        }
                    }
                }
            }
        }

        for (_, ex) in &self.model.labels {
            Self::check_declared(ex, &variables, &constants)?;
        }
        for rewards in &self.model.rewards {
            for ex in rewards.expressions() {
                Self::check_declared(ex, &variables, &constants)?;
            }
        }
        if let Some(init) = &self.model.init {
            Self::check_declared(init, &variables, &constants)?;
        }

        Ok(self.model)
    }
}

/// Builder for a [`Module`]
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleBuilder {
    module: Module,
}

impl ModuleBuilder {
    /// Create a new module builder
    pub fn new(name: impl ToString) -> Self {
        ModuleBuilder {
            module: Module {
                name: name.to_string(),
                variables: vec![],
                commands: vec![],
            },
        }
    }

    /// Adds a local variable to the module
    pub fn with_variable(mut self, decl: VariableDeclaration) -> Result<Self, BuilderError> {
        if self.module.variables.iter().any(|v| v.variable == decl.variable) {
            return Err(BuilderError::DuplicateVariable(decl.variable));
        }

        self.module.variables.push(decl);
        Ok(self)
    }

    /// Adds multiple local variables to the module
    pub fn with_variables(
        self,
        decls: impl IntoIterator<Item = VariableDeclaration>,
    ) -> Result<Self, BuilderError> {
        let mut res = self;
        for decl in decls {
            res = res.with_variable(decl)?;
        }
        Ok(res)
    }

    /// Adds a command to the module
    ///
    /// Returns an error if the command has no update or an update assigns the
    /// same variable twice.
    pub fn with_command(mut self, cmd: Command) -> Result<Self, BuilderError> {
        if cmd.updates.is_empty() {
            return Err(BuilderError::MalformedCommand(
                Box::new(cmd),
                "command has no update".to_string(),
            ));
        }

        for update in &cmd.updates {
            let mut assigned = HashSet::new();
            if let Some(a) = update.assignments.iter().find(|a| !assigned.insert(&a.variable)) {
                let msg = format!("variable {} is assigned twice", a.variable);
                return Err(BuilderError::MalformedCommand(Box::new(cmd.clone()), msg));
            }
        }

        self.module.commands.push(cmd);
        Ok(self)
    }

    /// Adds multiple commands to the module
    pub fn with_commands(self, cmds: impl IntoIterator<Item = Command>) -> Result<Self, BuilderError> {
        let mut res = self;
        for cmd in cmds {
            res = res.with_command(cmd)?;
        }
        Ok(res)
    }

    /// Complete the module
    pub fn build(self) -> Module {
        self.module
    }
}

/// Builder for a [`Command`]
///
/// # Example
///
/// ```
/// use pmc_model::{builder::*, expressions::*};
///
/// let cmd = CommandBuilder::new(Expression::var("s").equals(Expression::int(0)))
///     .with_action("flip")
///     .with_update(Expression::real(0.5), [("s", Expression::int(1))])
///     .with_update(Expression::real(0.5), [("s", Expression::int(2))])
///     .build();
///
/// assert_eq!(cmd.to_string(), "[flip] s = 0 -> 0.5 : (s' = 1) + 0.5 : (s' = 2);");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CommandBuilder {
    cmd: Command,
}

impl CommandBuilder {
    /// Create a new unlabelled command with the given guard
    pub fn new(guard: Expression) -> Self {
        CommandBuilder {
            cmd: Command {
                action: None,
                guard,
                updates: vec![],
            },
        }
    }

    /// Set the action of the command
    pub fn with_action(mut self, action: impl ToString) -> Self {
        self.cmd.action = Some(Action::new(action));
        self
    }

    /// Add an update with the given probability or rate
    pub fn with_update<V: Into<Variable>>(
        mut self,
        weight: Expression,
        assignments: impl IntoIterator<Item = (V, Expression)>,
    ) -> Self {
        let assignments = assignments
            .into_iter()
            .map(|(v, ex)| Assignment::new(v, ex))
            .collect();
        self.cmd.updates.push(Update::new(weight, assignments));
        self
    }

    /// Add an update with probability (or rate) 1
    pub fn with_deterministic_update<V: Into<Variable>>(
        self,
        assignments: impl IntoIterator<Item = (V, Expression)>,
    ) -> Self {
        self.with_update(Expression::int(1), assignments)
    }

    /// Complete the command
    pub fn build(self) -> Command {
        self.cmd
    }
}

/// Custom Error type to indicate an error when building a model
#[derive(Debug, Clone, PartialEq)]
pub enum BuilderError {
    /// Constant with the same name was already declared
    DuplicateConstant(Constant),
    /// Variable with the same name was already declared
    DuplicateVariable(Variable),
    /// Module with the same name was already added
    DuplicateModule(String),
    /// Label with the same name was already added
    DuplicateLabel(Label),
    /// Reward structure with the same name was already added
    DuplicateRewardStructure(String),
    /// Name is already used by a different kind of component
    NameClash(String),
    /// Label name is reserved for a built-in label
    ReservedLabel(Label),
    /// Expression references an undeclared component
    UnknownComponent(String),
    /// Command is malformed
    MalformedCommand(Box<Command>, String),
    /// Initial states are specified inconsistently
    MalformedInit(String),
    /// Module assigns a local variable of another module
    ForeignAssignment {
        /// Name of the assigning module
        module: String,
        /// Assigned variable
        variable: Variable,
    },
}

impl error::Error for BuilderError {}

impl Display for BuilderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuilderError::DuplicateConstant(c) => write!(f, "Duplicate constant: {c}"),
            BuilderError::DuplicateVariable(v) => write!(f, "Duplicate variable: {v}"),
            BuilderError::DuplicateModule(m) => write!(f, "Duplicate module: {m}"),
            BuilderError::DuplicateLabel(l) => write!(f, "Duplicate label: {l}"),
            BuilderError::DuplicateRewardStructure(r) => {
                write!(f, "Duplicate reward structure: \"{r}\"")
            }
            BuilderError::NameClash(name) => write!(f, "Name {name} already taken"),
            BuilderError::ReservedLabel(l) => write!(f, "Label {l} is reserved"),
            BuilderError::UnknownComponent(c) => write!(f, "Unknown component: {c}"),
            BuilderError::MalformedCommand(cmd, msg) => {
                write!(f, "Malformed command: {msg}. Command: {cmd}")
            }
            BuilderError::MalformedInit(msg) => write!(f, "Malformed initial states: {msg}"),
            BuilderError::ForeignAssignment { module, variable } => write!(
                f,
                "Module {module} assigns variable {variable}, which belongs to another module"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::ConstantType;

    use super::*;

    fn counter_module(name: &str, var: &str) -> Module {
        ModuleBuilder::new(name)
            .with_variable(VariableDeclaration::bounded_int(
                var,
                Expression::int(0),
                Expression::constant("N"),
            ))
            .unwrap()
            .with_command(
                CommandBuilder::new(Expression::var(var).less_than(Expression::constant("N")))
                    .with_deterministic_update([(var, Expression::var(var) + Expression::int(1))])
                    .build(),
            )
            .unwrap()
            .build()
    }

    fn base_builder() -> ModelBuilder {
        ModelBuilder::new("test", ModelType::Mdp)
            .with_constant(ConstantDeclaration::undefined("N", ConstantType::Int))
            .unwrap()
    }

    #[test]
    fn test_build_valid_model() {
        let model = base_builder()
            .with_global_variable(VariableDeclaration::boolean("g"))
            .unwrap()
            .with_modules([counter_module("a", "x"), counter_module("b", "y")])
            .unwrap()
            .with_label("both", Expression::var("x").equals(Expression::var("y")))
            .unwrap()
            .with_reward_structure(
                RewardStructure::new("steps").with_transition_reward(
                    None,
                    Expression::bool(true),
                    Expression::int(1),
                ),
            )
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(model.model_type(), ModelType::Mdp);
        assert_eq!(
            model.variables().map(|v| v.variable().name()).collect::<Vec<_>>(),
            vec!["g", "x", "y"]
        );
        assert!(model.reward_structure("steps").is_some());
    }

    #[test]
    fn test_duplicate_names() {
        let res = base_builder().with_constant(ConstantDeclaration::undefined("N", ConstantType::Real));
        assert_eq!(res, Err(BuilderError::DuplicateConstant(Constant::new("N"))));

        let res = base_builder().with_global_variable(VariableDeclaration::boolean("N"));
        assert_eq!(res, Err(BuilderError::NameClash("N".to_string())));

        let res = base_builder()
            .with_module(counter_module("a", "x"))
            .unwrap()
            .with_module(counter_module("b", "x"));
        assert_eq!(res, Err(BuilderError::DuplicateVariable(Variable::new("x"))));

        let res = base_builder()
            .with_module(counter_module("a", "x"))
            .unwrap()
            .with_module(counter_module("a", "y"));
        assert_eq!(res, Err(BuilderError::DuplicateModule("a".to_string())));

        let res = base_builder()
            .with_label("l", Expression::bool(true))
            .unwrap()
            .with_label("l", Expression::bool(false));
        assert_eq!(res, Err(BuilderError::DuplicateLabel(Label::new("l"))));

        let res = base_builder().with_label("deadlock", Expression::bool(true));
        assert_eq!(res, Err(BuilderError::ReservedLabel(Label::new("deadlock"))));
    }

    #[test]
    fn test_unknown_components() {
        let res = base_builder()
            .with_label("l", Expression::var("z").equals(Expression::int(1)))
            .unwrap()
            .build();
        assert!(matches!(res, Err(BuilderError::UnknownComponent(_))));

        let res = ModelBuilder::new("test", ModelType::Dtmc)
            .with_module(counter_module("a", "x"))
            .unwrap()
            .build();
        assert!(matches!(res, Err(BuilderError::UnknownComponent(_))));

        let res = ModelBuilder::new("test", ModelType::Dtmc)
            .with_constant(ConstantDeclaration::defined(
                "A",
                ConstantType::Int,
                Expression::constant("B"),
            ))
            .unwrap()
            .with_constant(ConstantDeclaration::undefined("B", ConstantType::Int))
            .unwrap()
            .build();
        assert!(matches!(res, Err(BuilderError::UnknownComponent(_))));
    }

    #[test]
    fn test_foreign_assignment() {
        let intruder = ModuleBuilder::new("b")
            .with_command(
                CommandBuilder::new(Expression::bool(true))
                    .with_deterministic_update([("x", Expression::int(0))])
                    .build(),
            )
            .unwrap()
            .build();

        let res = base_builder()
            .with_module(counter_module("a", "x"))
            .unwrap()
            .with_module(intruder)
            .unwrap()
            .build();
        assert_eq!(
            res,
            Err(BuilderError::ForeignAssignment {
                module: "b".to_string(),
                variable: Variable::new("x")
            })
        );
    }

    #[test]
    fn test_malformed_commands() {
        let res = ModuleBuilder::new("m").with_command(CommandBuilder::new(Expression::bool(true)).build());
        assert!(matches!(res, Err(BuilderError::MalformedCommand(_, _))));

        let res = ModuleBuilder::new("m").with_command(
            CommandBuilder::new(Expression::bool(true))
                .with_deterministic_update([("x", Expression::int(0)), ("x", Expression::int(1))])
                .build(),
        );
        assert!(matches!(res, Err(BuilderError::MalformedCommand(_, _))));
    }

    #[test]
    fn test_init_conflicts_with_variable_init() {
        let module = ModuleBuilder::new("m")
            .with_variable(VariableDeclaration::boolean("b").with_init(Expression::bool(true)))
            .unwrap()
            .build();

        let res = ModelBuilder::new("test", ModelType::Dtmc)
            .with_module(module)
            .unwrap()
            .with_init(Expression::var("b"))
            .unwrap()
            .build();
        assert!(matches!(res, Err(BuilderError::MalformedInit(_))));
    }
}
