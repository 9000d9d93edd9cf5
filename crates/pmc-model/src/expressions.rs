//! Type definitions for the arithmetic and boolean expressions of a model
//!
//! Expressions appear in guards, update assignments, probabilities and rates,
//! reward values, labels and variable bounds. They are built over
//! - [`Variable`]s, which are evaluated in a state, and
//! - [`Constant`]s, which are bound once before the state space is explored.
//!
//! The names that can appear in a model all implement the [`Atomic`] trait.
//! Expressions are evaluated in an [`EvaluationContext`] that supplies the
//! values of variables and constants.

use std::{
    collections::{BTreeSet, HashMap},
    error,
    fmt::{self, Debug, Display},
    hash::Hash,
    ops::{Add, BitAnd, BitOr, Div, Mul, Neg, Not, Sub},
};

use pmc_display_utils::join_iterator;

pub mod fraction;

/// Atomic trait implemented by the names of model components
///
/// All atomic names have a name associated with them, that must be unique
/// within their kind in a model.
pub trait Atomic: Debug + Display + Hash + Clone + Eq + for<'a> From<&'a str> + Ord {
    /// Returns the name of the atom
    fn name(&self) -> &str;
}

/// State variable of a model
///
/// Variables are either bounded integers or booleans. A state of the model is
/// an assignment of values to all variables.
#[derive(Debug, PartialEq, Eq, Hash, Clone, PartialOrd, Ord)]
pub struct Variable(String);
impl Variable {
    /// Create a new variable with given name
    pub fn new(name: impl ToString) -> Self {
        Variable(name.to_string())
    }
}

impl From<&str> for Variable {
    fn from(s: &str) -> Self {
        Variable::new(s)
    }
}

impl Atomic for Variable {
    fn name(&self) -> &str {
        &self.0
    }
}

/// Named constant of a model
///
/// Constants are bound to concrete values before the state space of a model
/// is built, e.g., the number of processes or the number of retransmissions.
#[derive(Debug, PartialEq, Eq, Hash, Clone, PartialOrd, Ord)]
pub struct Constant(String);
impl Constant {
    /// Create a new constant with given name
    pub fn new(name: impl ToString) -> Self {
        Constant(name.to_string())
    }
}

impl From<&str> for Constant {
    fn from(s: &str) -> Self {
        Constant::new(s)
    }
}

impl Atomic for Constant {
    fn name(&self) -> &str {
        &self.0
    }
}

/// Action label of a command
///
/// Commands of different modules carrying the same action synchronize.
#[derive(Debug, PartialEq, Eq, Hash, Clone, PartialOrd, Ord)]
pub struct Action(String);
impl Action {
    /// Create a new action with given name
    pub fn new(name: impl ToString) -> Self {
        Action(name.to_string())
    }
}

impl From<&str> for Action {
    fn from(s: &str) -> Self {
        Action::new(s)
    }
}

impl Atomic for Action {
    fn name(&self) -> &str {
        &self.0
    }
}

/// Name of a label, i.e., of a named state predicate
#[derive(Debug, PartialEq, Eq, Hash, Clone, PartialOrd, Ord)]
pub struct Label(String);
impl Label {
    /// Create a new label with given name
    pub fn new(name: impl ToString) -> Self {
        Label(name.to_string())
    }
}

impl From<&str> for Label {
    fn from(s: &str) -> Self {
        Label::new(s)
    }
}

impl Atomic for Label {
    fn name(&self) -> &str {
        &self.0
    }
}

impl Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.0)
    }
}

/// Value an expression evaluates to
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Real value
    Real(f64),
}

impl Value {
    /// Interpret the value as a boolean
    pub fn as_bool(&self) -> Result<bool, EvaluationError> {
        match self {
            Value::Bool(b) => Ok(*b),
            _ => Err(EvaluationError::TypeMismatch {
                expected: "bool",
                found: *self,
            }),
        }
    }

    /// Interpret the value as an integer
    ///
    /// Booleans are not converted, reals are only accepted if they are
    /// integral.
    pub fn as_int(&self) -> Result<i64, EvaluationError> {
        match self {
            Value::Int(i) => Ok(*i),
            Value::Real(r) if r.fract() == 0.0 && r.is_finite() => Ok(*r as i64),
            _ => Err(EvaluationError::TypeMismatch {
                expected: "int",
                found: *self,
            }),
        }
    }

    /// Interpret the value as a real number
    pub fn as_real(&self) -> Result<f64, EvaluationError> {
        match self {
            Value::Int(i) => Ok(*i as f64),
            Value::Real(r) => Ok(*r),
            Value::Bool(_) => Err(EvaluationError::TypeMismatch {
                expected: "double",
                found: *self,
            }),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(r: f64) -> Self {
        Value::Real(r)
    }
}

/// Unary operators
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
pub enum UnaryOp {
    /// Boolean negation `!`
    Not,
    /// Arithmetic negation `-`
    Neg,
}

/// Binary operators
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
pub enum BinaryOp {
    /// Addition `+`
    Add,
    /// Subtraction `-`
    Sub,
    /// Multiplication `*`
    Mul,
    /// Division `/`, always evaluates to a real number
    Div,
    /// Conjunction `&`
    And,
    /// Disjunction `|`
    Or,
    /// Implication `=>`
    Implies,
    /// Equivalence `<=>`
    Iff,
    /// Equality `=`
    Eq,
    /// Inequality `!=`
    Ne,
    /// Less than `<`
    Lt,
    /// Less or equal `<=`
    Le,
    /// Greater than `>`
    Gt,
    /// Greater or equal `>=`
    Ge,
}

impl BinaryOp {
    /// Binding strength of the operator, higher binds stronger
    fn precedence(&self) -> u8 {
        match self {
            BinaryOp::Implies | BinaryOp::Iff => 1,
            BinaryOp::Or => 2,
            BinaryOp::And => 3,
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge => 4,
            BinaryOp::Add | BinaryOp::Sub => 5,
            BinaryOp::Mul | BinaryOp::Div => 6,
        }
    }
}

/// Built-in functions
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
pub enum Function {
    /// Minimum of one or more arguments
    Min,
    /// Maximum of one or more arguments
    Max,
    /// Round down to the next integer
    Floor,
    /// Round up to the next integer
    Ceil,
    /// Exponentiation `pow(base, exponent)`
    Pow,
    /// Integer modulo `mod(i, n)`, the result is always non-negative
    Mod,
}

/// Expression over variables and constants
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Literal value
    Literal(Value),
    /// Reference to a state variable
    Var(Variable),
    /// Reference to a named constant
    Const(Constant),
    /// Unary operator applied to an expression
    Unary(UnaryOp, Box<Expression>),
    /// Binary operator applied to two expressions
    Binary(Box<Expression>, BinaryOp, Box<Expression>),
    /// If-then-else `c ? t : e`
    Ite(Box<Expression>, Box<Expression>, Box<Expression>),
    /// Application of a built-in function
    Function(Function, Vec<Expression>),
}

/// Context in which an expression is evaluated
///
/// The context supplies the values of variables and constants. Implementations
/// return `None` for unknown names.
pub trait EvaluationContext {
    /// Value of a variable
    fn variable(&self, var: &Variable) -> Option<Value>;

    /// Value of a constant
    fn constant(&self, _constant: &Constant) -> Option<Value> {
        None
    }
}

impl EvaluationContext for HashMap<Variable, Value> {
    fn variable(&self, var: &Variable) -> Option<Value> {
        self.get(var).copied()
    }
}

impl EvaluationContext for HashMap<Constant, Value> {
    fn variable(&self, _var: &Variable) -> Option<Value> {
        None
    }

    fn constant(&self, constant: &Constant) -> Option<Value> {
        self.get(constant).copied()
    }
}

impl Expression {
    /// Create an expression referencing the variable with the given name
    pub fn var(name: impl ToString) -> Self {
        Expression::Var(Variable::new(name))
    }

    /// Create an expression referencing the constant with the given name
    pub fn constant(name: impl ToString) -> Self {
        Expression::Const(Constant::new(name))
    }

    /// Create an integer literal
    pub fn int(i: i64) -> Self {
        Expression::Literal(Value::Int(i))
    }

    /// Create a real literal
    pub fn real(r: f64) -> Self {
        Expression::Literal(Value::Real(r))
    }

    /// Create a boolean literal
    pub fn bool(b: bool) -> Self {
        Expression::Literal(Value::Bool(b))
    }

    fn binary(self, op: BinaryOp, rhs: Expression) -> Self {
        Expression::Binary(Box::new(self), op, Box::new(rhs))
    }

    /// `self = rhs`
    pub fn equals(self, rhs: Expression) -> Self {
        self.binary(BinaryOp::Eq, rhs)
    }

    /// `self != rhs`
    pub fn not_equals(self, rhs: Expression) -> Self {
        self.binary(BinaryOp::Ne, rhs)
    }

    /// `self < rhs`
    pub fn less_than(self, rhs: Expression) -> Self {
        self.binary(BinaryOp::Lt, rhs)
    }

    /// `self <= rhs`
    pub fn less_eq(self, rhs: Expression) -> Self {
        self.binary(BinaryOp::Le, rhs)
    }

    /// `self > rhs`
    pub fn greater_than(self, rhs: Expression) -> Self {
        self.binary(BinaryOp::Gt, rhs)
    }

    /// `self >= rhs`
    pub fn greater_eq(self, rhs: Expression) -> Self {
        self.binary(BinaryOp::Ge, rhs)
    }

    /// `self => rhs`
    pub fn implies(self, rhs: Expression) -> Self {
        self.binary(BinaryOp::Implies, rhs)
    }

    /// `self <=> rhs`
    pub fn iff(self, rhs: Expression) -> Self {
        self.binary(BinaryOp::Iff, rhs)
    }

    /// `cond ? then : otherwise`
    pub fn ite(cond: Expression, then: Expression, otherwise: Expression) -> Self {
        Expression::Ite(Box::new(cond), Box::new(then), Box::new(otherwise))
    }

    /// `min(args..)`
    pub fn min(args: impl IntoIterator<Item = Expression>) -> Self {
        Expression::Function(Function::Min, args.into_iter().collect())
    }

    /// `max(args..)`
    pub fn max(args: impl IntoIterator<Item = Expression>) -> Self {
        Expression::Function(Function::Max, args.into_iter().collect())
    }

    /// `floor(self)`
    pub fn floor(self) -> Self {
        Expression::Function(Function::Floor, vec![self])
    }

    /// `ceil(self)`
    pub fn ceil(self) -> Self {
        Expression::Function(Function::Ceil, vec![self])
    }

    /// `pow(self, exponent)`
    pub fn pow(self, exponent: Expression) -> Self {
        Expression::Function(Function::Pow, vec![self, exponent])
    }

    /// `mod(self, n)`
    pub fn modulo(self, n: Expression) -> Self {
        Expression::Function(Function::Mod, vec![self, n])
    }

    /// Evaluate the expression in the given context
    ///
    /// # Example
    ///
    /// ```
    /// use std::collections::HashMap;
    /// use pmc_model::expressions::*;
    ///
    /// let env = HashMap::from([(Variable::new("s"), Value::Int(3))]);
    ///
    /// let expr = (Expression::var("s") + Expression::int(1)).equals(Expression::int(4));
    /// assert_eq!(expr.evaluate(&env), Ok(Value::Bool(true)));
    ///
    /// let expr = Expression::var("s") / Expression::int(2);
    /// assert_eq!(expr.evaluate(&env), Ok(Value::Real(1.5)));
    ///
    /// let expr = Expression::var("t");
    /// assert_eq!(
    ///     expr.evaluate(&env),
    ///     Err(EvaluationError::UnknownVariable(Variable::new("t")))
    /// );
    /// ```
    pub fn evaluate<C: EvaluationContext + ?Sized>(&self, ctx: &C) -> Result<Value, EvaluationError> {
        match self {
            Expression::Literal(v) => Ok(*v),
            Expression::Var(var) => ctx
                .variable(var)
                .ok_or_else(|| EvaluationError::UnknownVariable(var.clone())),
            Expression::Const(c) => ctx
                .constant(c)
                .ok_or_else(|| EvaluationError::UnboundConstant(c.clone())),
            Expression::Unary(op, ex) => {
                let v = ex.evaluate(ctx)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!v.as_bool()?)),
                    UnaryOp::Neg => match v {
                        Value::Int(i) => i.checked_neg().map(Value::Int).ok_or(EvaluationError::Overflow),
                        _ => Ok(Value::Real(-v.as_real()?)),
                    },
                }
            }
            Expression::Binary(lhs, op, rhs) => evaluate_binary(lhs, *op, rhs, ctx),
            Expression::Ite(cond, then, otherwise) => {
                if cond.evaluate(ctx)?.as_bool()? {
                    then.evaluate(ctx)
                } else {
                    otherwise.evaluate(ctx)
                }
            }
            Expression::Function(fun, args) => {
                let args = args
                    .iter()
                    .map(|a| a.evaluate(ctx))
                    .collect::<Result<Vec<_>, _>>()?;
                evaluate_function(*fun, &args)
            }
        }
    }

    /// Evaluate the expression and interpret the result as a boolean
    pub fn evaluate_bool<C: EvaluationContext + ?Sized>(&self, ctx: &C) -> Result<bool, EvaluationError> {
        self.evaluate(ctx)?.as_bool()
    }

    /// Evaluate the expression and interpret the result as a real number
    pub fn evaluate_real<C: EvaluationContext + ?Sized>(&self, ctx: &C) -> Result<f64, EvaluationError> {
        self.evaluate(ctx)?.as_real()
    }

    /// Evaluate the expression and interpret the result as an integer
    pub fn evaluate_int<C: EvaluationContext + ?Sized>(&self, ctx: &C) -> Result<i64, EvaluationError> {
        self.evaluate(ctx)?.as_int()
    }

    /// Replace every constant that has a value in `values` by its value
    ///
    /// # Example
    ///
    /// ```
    /// use std::collections::HashMap;
    /// use pmc_model::expressions::*;
    ///
    /// let values = HashMap::from([(Constant::new("N"), Value::Int(3))]);
    /// let expr = Expression::var("i").less_than(Expression::constant("N"));
    ///
    /// assert_eq!(
    ///     expr.substitute_constants(&values),
    ///     Expression::var("i").less_than(Expression::int(3))
    /// );
    /// ```
    pub fn substitute_constants(&self, values: &HashMap<Constant, Value>) -> Expression {
        match self {
            Expression::Const(c) => values
                .get(c)
                .map(|v| Expression::Literal(*v))
                .unwrap_or_else(|| self.clone()),
            Expression::Literal(_) | Expression::Var(_) => self.clone(),
            Expression::Unary(op, ex) => Expression::Unary(*op, Box::new(ex.substitute_constants(values))),
            Expression::Binary(lhs, op, rhs) => Expression::Binary(
                Box::new(lhs.substitute_constants(values)),
                *op,
                Box::new(rhs.substitute_constants(values)),
            ),
            Expression::Ite(c, t, e) => Expression::Ite(
                Box::new(c.substitute_constants(values)),
                Box::new(t.substitute_constants(values)),
                Box::new(e.substitute_constants(values)),
            ),
            Expression::Function(fun, args) => Expression::Function(
                *fun,
                args.iter().map(|a| a.substitute_constants(values)).collect(),
            ),
        }
    }

    /// Collect all variables referenced in the expression
    pub fn variables(&self) -> BTreeSet<&Variable> {
        let mut res = BTreeSet::new();
        self.visit(&mut |ex| {
            if let Expression::Var(v) = ex {
                res.insert(v);
            }
        });
        res
    }

    /// Collect all constants referenced in the expression
    pub fn constants(&self) -> BTreeSet<&Constant> {
        let mut res = BTreeSet::new();
        self.visit(&mut |ex| {
            if let Expression::Const(c) = ex {
                res.insert(c);
            }
        });
        res
    }

    /// Call `f` on this expression and all of its sub-expressions
    fn visit<'a, F: FnMut(&'a Expression)>(&'a self, f: &mut F) {
        f(self);
        match self {
            Expression::Literal(_) | Expression::Var(_) | Expression::Const(_) => {}
            Expression::Unary(_, ex) => ex.visit(f),
            Expression::Binary(lhs, _, rhs) => {
                lhs.visit(f);
                rhs.visit(f);
            }
            Expression::Ite(c, t, e) => {
                c.visit(f);
                t.visit(f);
                e.visit(f);
            }
            Expression::Function(_, args) => {
                for a in args {
                    a.visit(f);
                }
            }
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expression::Ite(..) => 0,
            Expression::Binary(_, op, _) => op.precedence(),
            _ => 7,
        }
    }
}

fn evaluate_binary<C: EvaluationContext + ?Sized>(
    lhs: &Expression,
    op: BinaryOp,
    rhs: &Expression,
    ctx: &C,
) -> Result<Value, EvaluationError> {
    // boolean connectives short-circuit
    match op {
        BinaryOp::And => {
            return Ok(Value::Bool(lhs.evaluate_bool(ctx)? && rhs.evaluate_bool(ctx)?));
        }
        BinaryOp::Or => {
            return Ok(Value::Bool(lhs.evaluate_bool(ctx)? || rhs.evaluate_bool(ctx)?));
        }
        BinaryOp::Implies => {
            return Ok(Value::Bool(!lhs.evaluate_bool(ctx)? || rhs.evaluate_bool(ctx)?));
        }
        _ => {}
    }

    let l = lhs.evaluate(ctx)?;
    let r = rhs.evaluate(ctx)?;

    match op {
        BinaryOp::Iff => Ok(Value::Bool(l.as_bool()? == r.as_bool()?)),
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul => match (l, r) {
            (Value::Int(a), Value::Int(b)) => {
                let res = match op {
                    BinaryOp::Add => a.checked_add(b),
                    BinaryOp::Sub => a.checked_sub(b),
                    _ => a.checked_mul(b),
                };
                res.map(Value::Int).ok_or(EvaluationError::Overflow)
            }
            _ => {
                let (a, b) = (l.as_real()?, r.as_real()?);
                Ok(Value::Real(match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    _ => a * b,
                }))
            }
        },
        BinaryOp::Div => Ok(Value::Real(l.as_real()? / r.as_real()?)),
        BinaryOp::Eq | BinaryOp::Ne => {
            let equal = match (l, r) {
                (Value::Bool(a), Value::Bool(b)) => a == b,
                (Value::Int(a), Value::Int(b)) => a == b,
                (Value::Bool(_), _) | (_, Value::Bool(_)) => {
                    return Err(EvaluationError::TypeMismatch {
                        expected: "bool",
                        found: if matches!(l, Value::Bool(_)) { r } else { l },
                    });
                }
                _ => l.as_real()? == r.as_real()?,
            };
            Ok(Value::Bool(if op == BinaryOp::Eq { equal } else { !equal }))
        }
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (l, r) {
                (Value::Int(a), Value::Int(b)) => a.partial_cmp(&b),
                _ => l.as_real()?.partial_cmp(&r.as_real()?),
            };
            let Some(ordering) = ordering else {
                return Ok(Value::Bool(false));
            };
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }))
        }
        BinaryOp::And | BinaryOp::Or | BinaryOp::Implies => unreachable!("handled above"),
    }
}

fn evaluate_function(fun: Function, args: &[Value]) -> Result<Value, EvaluationError> {
    let check_arity = |expected: usize| {
        if args.len() != expected {
            return Err(EvaluationError::InvalidArguments(format!(
                "{fun} expects {expected} argument(s), got {}",
                args.len()
            )));
        }
        Ok(())
    };

    match fun {
        Function::Min | Function::Max => {
            if args.is_empty() {
                return Err(EvaluationError::InvalidArguments(format!(
                    "{fun} expects at least one argument"
                )));
            }
            if args.iter().all(|a| matches!(a, Value::Int(_))) {
                let ints = args.iter().map(|a| a.as_int()).collect::<Result<Vec<_>, _>>()?;
                let res = if fun == Function::Min {
                    ints.into_iter().min()
                } else {
                    ints.into_iter().max()
                };
                return Ok(Value::Int(res.unwrap_or_default()));
            }
            let reals = args.iter().map(|a| a.as_real()).collect::<Result<Vec<_>, _>>()?;
            let res = reals.into_iter().reduce(|a, b| {
                if fun == Function::Min { a.min(b) } else { a.max(b) }
            });
            Ok(Value::Real(res.unwrap_or_default()))
        }
        Function::Floor | Function::Ceil => {
            check_arity(1)?;
            let r = args[0].as_real()?;
            if !r.is_finite() {
                return Err(EvaluationError::NotFinite(r));
            }
            let r = if fun == Function::Floor { r.floor() } else { r.ceil() };
            if r < i64::MIN as f64 || r >= i64::MAX as f64 {
                return Err(EvaluationError::Overflow);
            }
            Ok(Value::Int(r as i64))
        }
        Function::Pow => {
            check_arity(2)?;
            match (args[0], args[1]) {
                (Value::Int(b), Value::Int(e)) if e >= 0 => u32::try_from(e)
                    .ok()
                    .and_then(|e| b.checked_pow(e))
                    .map(Value::Int)
                    .ok_or(EvaluationError::Overflow),
                (b, e) => Ok(Value::Real(b.as_real()?.powf(e.as_real()?))),
            }
        }
        Function::Mod => {
            check_arity(2)?;
            let (i, n) = (args[0].as_int()?, args[1].as_int()?);
            if n == 0 {
                return Err(EvaluationError::DivisionByZero);
            }
            i.checked_rem_euclid(n)
                .map(Value::Int)
                .ok_or(EvaluationError::Overflow)
        }
    }
}

impl Add for Expression {
    type Output = Expression;

    fn add(self, rhs: Self) -> Self::Output {
        self.binary(BinaryOp::Add, rhs)
    }
}

impl Sub for Expression {
    type Output = Expression;

    fn sub(self, rhs: Self) -> Self::Output {
        self.binary(BinaryOp::Sub, rhs)
    }
}

impl Mul for Expression {
    type Output = Expression;

    fn mul(self, rhs: Self) -> Self::Output {
        self.binary(BinaryOp::Mul, rhs)
    }
}

impl Div for Expression {
    type Output = Expression;

    fn div(self, rhs: Self) -> Self::Output {
        self.binary(BinaryOp::Div, rhs)
    }
}

impl Neg for Expression {
    type Output = Expression;

    fn neg(self) -> Self::Output {
        Expression::Unary(UnaryOp::Neg, Box::new(self))
    }
}

impl Not for Expression {
    type Output = Expression;

    fn not(self) -> Self::Output {
        Expression::Unary(UnaryOp::Not, Box::new(self))
    }
}

impl BitAnd for Expression {
    type Output = Expression;

    fn bitand(self, rhs: Self) -> Self::Output {
        self.binary(BinaryOp::And, rhs)
    }
}

impl BitOr for Expression {
    type Output = Expression;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.binary(BinaryOp::Or, rhs)
    }
}

impl From<Variable> for Expression {
    fn from(v: Variable) -> Self {
        Expression::Var(v)
    }
}

impl From<Value> for Expression {
    fn from(v: Value) -> Self {
        Expression::Literal(v)
    }
}

impl Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Not => write!(f, "!"),
            UnaryOp::Neg => write!(f, "-"),
        }
    }
}

impl Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
            BinaryOp::Implies => "=>",
            BinaryOp::Iff => "<=>",
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        };
        write!(f, "{op}")
    }
}

impl Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Function::Min => "min",
            Function::Max => "max",
            Function::Floor => "floor",
            Function::Ceil => "ceil",
            Function::Pow => "pow",
            Function::Mod => "mod",
        };
        write!(f, "{name}")
    }
}

/// Display `ex`, wrapped in parentheses if it binds weaker than `min_prec`
struct Operand<'a>(&'a Expression, u8);

impl Display for Operand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.precedence() < self.1 {
            write!(f, "({})", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal(v) => write!(f, "{v}"),
            Expression::Var(v) => write!(f, "{v}"),
            Expression::Const(c) => write!(f, "{c}"),
            Expression::Unary(op, ex) => write!(f, "{op}{}", Operand(ex, 7)),
            Expression::Binary(lhs, op, rhs) => {
                let prec = op.precedence();
                write!(f, "{} {op} {}", Operand(lhs, prec), Operand(rhs, prec + 1))
            }
            Expression::Ite(c, t, e) => {
                write!(f, "{} ? {} : {}", Operand(c, 1), Operand(t, 1), Operand(e, 0))
            }
            Expression::Function(fun, args) => {
                write!(f, "{fun}({})", join_iterator(args.iter(), ", "))
            }
        }
    }
}

/// Error that can occur during the evaluation of an expression
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationError {
    /// Variable has no value in the evaluation context
    UnknownVariable(Variable),
    /// Constant has no value in the evaluation context
    UnboundConstant(Constant),
    /// Value has a different type than required by the operator
    TypeMismatch {
        /// Name of the expected type
        expected: &'static str,
        /// Value that was found instead
        found: Value,
    },
    /// Integer arithmetic overflowed
    Overflow,
    /// Integer modulo by zero
    DivisionByZero,
    /// Real value that is NaN or infinite where an integer is required
    NotFinite(f64),
    /// Function applied to an invalid number of arguments
    InvalidArguments(String),
}

impl error::Error for EvaluationError {}

impl Display for EvaluationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvaluationError::UnknownVariable(v) => write!(f, "Unknown variable {v}"),
            EvaluationError::UnboundConstant(c) => write!(f, "Constant {c} has no value"),
            EvaluationError::TypeMismatch { expected, found } => {
                write!(f, "Type error: expected {expected} but found value {found}")
            }
            EvaluationError::Overflow => write!(f, "Integer overflow"),
            EvaluationError::DivisionByZero => write!(f, "Modulo by zero"),
            EvaluationError::NotFinite(r) => write!(f, "Cannot round {r} to an integer"),
            EvaluationError::InvalidArguments(msg) => write!(f, "Invalid arguments: {msg}"),
        }
    }
}
