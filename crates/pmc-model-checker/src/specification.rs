//! Named collections of properties checked against one model
//!
//! Use the [`PropertySpecificationBuilder`] to create a
//! [`PropertySpecification`]. The builder ensures that properties only
//! reference variables, constants, labels and reward structures declared by
//! the model, that bounds and time bounds are meaningful, and that numeric
//! queries (`=?`) only appear at the top level of a property.

use std::{collections::HashMap, fmt, vec};

use pmc_display_utils::TAB_SIZE;
use pmc_graph::{DEADLOCK_LABEL, INIT_LABEL};
use pmc_model::{
    Model,
    expressions::{Atomic, Constant, Value},
};

use crate::property::{Query, RewardObjective, StateFormula, TimeBound};

/// A property together with its name
pub type Property = (String, StateFormula);

/// Ordered collection of named properties
#[derive(Debug, Clone, PartialEq)]
pub struct PropertySpecification {
    properties: Vec<Property>,
}

impl PropertySpecification {
    /// Get a slice of the contained properties
    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    /// Number of properties
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Whether the specification contains no property
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Replace the constants of all properties by their values
    pub(crate) fn substitute_constants(&self, values: &HashMap<Constant, Value>) -> Self {
        Self {
            properties: self
                .properties
                .iter()
                .map(|(name, f)| (name.clone(), f.substitute_constants(values)))
                .collect(),
        }
    }
}

impl IntoIterator for PropertySpecification {
    type Item = Property;
    type IntoIter = vec::IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.properties.into_iter()
    }
}

impl fmt::Display for PropertySpecification {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "properties({}) {{", self.properties.len())?;
        let indent = " ".repeat(TAB_SIZE);

        for (name, formula) in &self.properties {
            writeln!(f, "{indent}{name}: {formula};")?;
        }

        write!(f, "}}")
    }
}

/// Builder for a [`PropertySpecification`] over a model
///
/// # Example
///
/// ```
/// use pmc_model::{ModelType, VariableDeclaration, builder::*, expressions::*};
/// use pmc_model_checker::{
///     property::{PathFormula, Query, StateFormula},
///     specification::PropertySpecificationBuilder,
/// };
///
/// let model = ModelBuilder::new("m", ModelType::Dtmc)
///     .with_global_variable(
///         VariableDeclaration::bounded_int("s", Expression::int(0), Expression::int(1))
///             .with_init(Expression::int(0)),
///     )
///     .unwrap()
///     .with_label("done", Expression::var("s").equals(Expression::int(1)))
///     .unwrap()
///     .build()
///     .unwrap();
///
/// let mut builder = PropertySpecificationBuilder::new(&model);
/// builder
///     .add_property(
///         "reach",
///         StateFormula::probability(
///             None,
///             Query::Value,
///             PathFormula::eventually(StateFormula::label("done")),
///         ),
///     )
///     .unwrap();
///
/// // unknown labels are rejected
/// assert!(builder
///     .add_property(
///         "other",
///         StateFormula::probability(
///             None,
///             Query::Value,
///             PathFormula::eventually(StateFormula::label("finished")),
///         ),
///     )
///     .is_err());
///
/// assert_eq!(builder.build().len(), 1);
/// ```
pub struct PropertySpecificationBuilder<'a> {
    /// Model the properties are checked against
    model: &'a Model,
    /// Properties added so far
    properties: Vec<Property>,
}

impl<'a> PropertySpecificationBuilder<'a> {
    /// Create a new empty builder
    pub fn new(model: &'a Model) -> Self {
        Self {
            model,
            properties: Vec::new(),
        }
    }

    /// Add a property to the specification
    ///
    /// Returns an error if the name is already taken or the formula is not
    /// valid for the model of the builder.
    pub fn add_property(
        &mut self,
        name: impl ToString,
        formula: StateFormula,
    ) -> Result<(), SpecificationError> {
        let name = name.to_string();
        if self.properties.iter().any(|(n, _)| *n == name) {
            return Err(SpecificationError::DuplicateName {
                property_name: name,
            });
        }

        self.validate_state(&formula, true)
            .map_err(|err| err.into_specification_error(name.clone()))?;

        self.properties.push((name, formula));
        Ok(())
    }

    /// Add multiple properties to the specification
    pub fn add_properties(
        &mut self,
        properties: impl IntoIterator<Item = Property>,
    ) -> Result<(), SpecificationError> {
        for (name, formula) in properties {
            self.add_property(name, formula)?;
        }
        Ok(())
    }

    /// Build the specification
    pub fn build(self) -> PropertySpecification {
        PropertySpecification {
            properties: self.properties,
        }
    }

    fn validate_state(&self, formula: &StateFormula, top_level: bool) -> Result<(), InternalError> {
        match formula {
            StateFormula::Expression(expr) => {
                if let Some(var) = expr
                    .variables()
                    .into_iter()
                    .find(|v| !self.model.variables().any(|d| d.variable() == *v))
                {
                    return Err(InternalError::UnknownIdentifier(format!("variable {var}")));
                }
                if let Some(c) = expr
                    .constants()
                    .into_iter()
                    .find(|c| !self.model.constants().iter().any(|d| d.constant() == *c))
                {
                    return Err(InternalError::UnknownIdentifier(format!("constant {c}")));
                }
            }
            StateFormula::Label(label) => {
                let name = label.name();
                if name != INIT_LABEL && name != DEADLOCK_LABEL && self.model.label(label).is_none() {
                    return Err(InternalError::UnknownIdentifier(format!("label {label}")));
                }
            }
            StateFormula::Probability { query, path, .. } => {
                self.validate_query(formula, query, top_level, 1.0)?;
                for bound in path.time_bounds() {
                    self.validate_time_bound(bound)?;
                }
            }
            StateFormula::Reward {
                structure,
                query,
                objective,
                ..
            } => {
                self.validate_query(formula, query, top_level, f64::INFINITY)?;
                match structure {
                    Some(name) if self.model.reward_structure(name).is_none() => {
                        return Err(InternalError::UnknownIdentifier(format!(
                            "reward structure \"{name}\""
                        )));
                    }
                    None if self.model.reward_structures().is_empty() => {
                        return Err(InternalError::NoRewardStructure);
                    }
                    _ => {}
                }
                if let RewardObjective::Cumulative(t) | RewardObjective::Instantaneous(t) = objective {
                    self.validate_time_bound(&TimeBound::at_most(*t))?;
                }
            }
            StateFormula::SteadyState { query, .. } => {
                self.validate_query(formula, query, top_level, 1.0)?;
            }
            StateFormula::Filter {
                kind,
                property,
                states,
            } => {
                if formula.is_query() && !top_level {
                    return Err(InternalError::NestedQuery(formula.clone()));
                }
                if let Some(numeric) = kind.needs_numeric_property()
                    && numeric != property.is_query()
                {
                    let expected = if numeric { "numeric query" } else { "boolean formula" };
                    return Err(InternalError::InvalidFilter(format!(
                        "{kind} needs a {expected} as property, got {property}"
                    )));
                }
                // the filtered property may itself ask for a value
                self.validate_state(property, true)?;
                return self.validate_state(states, false);
            }
            StateFormula::True
            | StateFormula::False
            | StateFormula::Not(_)
            | StateFormula::And(_, _)
            | StateFormula::Or(_, _) => {}
        }

        formula
            .children()
            .into_iter()
            .try_for_each(|child| self.validate_state(child, false))
    }

    fn validate_query(
        &self,
        formula: &StateFormula,
        query: &Query,
        top_level: bool,
        max: f64,
    ) -> Result<(), InternalError> {
        match query {
            Query::Value if !top_level => Err(InternalError::NestedQuery(formula.clone())),
            Query::Bound(_, bound) if bound.is_nan() || *bound < 0.0 || *bound > max => {
                Err(InternalError::InvalidBound(*bound))
            }
            _ => Ok(()),
        }
    }

    fn validate_time_bound(&self, bound: &TimeBound) -> Result<(), InternalError> {
        let discrete = !self.model.model_type().is_continuous_time();
        let ends = std::iter::once(bound.lower()).chain(bound.upper());

        for t in ends {
            if !t.is_finite() || t < 0.0 {
                return Err(InternalError::InvalidTimeBound(format!(
                    "{t} is not a finite non-negative number"
                )));
            }
            if discrete && t.fract() != 0.0 {
                return Err(InternalError::InvalidTimeBound(format!(
                    "step bound {t} of a {} is not an integer",
                    self.model.model_type()
                )));
            }
        }
        if let Some(upper) = bound.upper()
            && upper < bound.lower()
        {
            return Err(InternalError::InvalidTimeBound(format!(
                "interval {bound} is empty"
            )));
        }
        Ok(())
    }
}

/// Errors that can occur when building a [`PropertySpecification`]
#[derive(Debug, Clone, PartialEq)]
pub enum SpecificationError {
    /// Two properties have the same name
    DuplicateName {
        /// Name of the property
        property_name: String,
    },
    /// The property references an undeclared identifier
    UnknownIdentifier {
        /// Name of the property
        property_name: String,
        /// Kind and name of the identifier
        ident: String,
    },
    /// A reward operator without structure name on a model without reward
    /// structures
    NoRewardStructure {
        /// Name of the property
        property_name: String,
    },
    /// A probability bound outside of `[0, 1]` or a negative reward bound
    InvalidBound {
        /// Name of the property
        property_name: String,
        /// The bound
        bound: f64,
    },
    /// A time or step bound that is negative, not finite, empty, or not an
    /// integer for a discrete-time model
    InvalidTimeBound {
        /// Name of the property
        property_name: String,
        /// Description of the problem
        reason: String,
    },
    /// A numeric query (`=?`) nested inside another formula
    NestedQuery {
        /// Name of the property
        property_name: String,
        /// The nested query
        formula: Box<StateFormula>,
    },
    /// A filter whose property does not fit its kind
    InvalidFilter {
        /// Name of the property
        property_name: String,
        /// Description of the problem
        reason: String,
    },
}

/// Internal error type without the name of the property
enum InternalError {
    UnknownIdentifier(String),
    NoRewardStructure,
    InvalidBound(f64),
    InvalidTimeBound(String),
    NestedQuery(StateFormula),
    InvalidFilter(String),
}

impl InternalError {
    fn into_specification_error(self, property_name: String) -> SpecificationError {
        match self {
            InternalError::UnknownIdentifier(ident) => SpecificationError::UnknownIdentifier {
                property_name,
                ident,
            },
            InternalError::NoRewardStructure => {
                SpecificationError::NoRewardStructure { property_name }
            }
            InternalError::InvalidBound(bound) => SpecificationError::InvalidBound {
                property_name,
                bound,
            },
            InternalError::InvalidTimeBound(reason) => SpecificationError::InvalidTimeBound {
                property_name,
                reason,
            },
            InternalError::NestedQuery(formula) => SpecificationError::NestedQuery {
                property_name,
                formula: Box::new(formula),
            },
            InternalError::InvalidFilter(reason) => SpecificationError::InvalidFilter {
                property_name,
                reason,
            },
        }
    }
}

impl std::error::Error for SpecificationError {}

impl fmt::Display for SpecificationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SpecificationError::DuplicateName { property_name } => write!(
                f,
                "Duplicate name in specification: The name '{property_name}' is defined twice"
            ),
            SpecificationError::UnknownIdentifier {
                property_name,
                ident,
            } => write!(
                f,
                "Unknown identifier in property '{property_name}': {ident} is not declared in the model"
            ),
            SpecificationError::NoRewardStructure { property_name } => write!(
                f,
                "Property '{property_name}' refers to rewards, but the model has no reward structure"
            ),
            SpecificationError::InvalidBound {
                property_name,
                bound,
            } => write!(f, "Property '{property_name}' has the invalid bound {bound}"),
            SpecificationError::InvalidTimeBound {
                property_name,
                reason,
            } => write!(
                f,
                "Property '{property_name}' has an invalid time bound: {reason}"
            ),
            SpecificationError::NestedQuery {
                property_name,
                formula,
            } => write!(
                f,
                "Property '{property_name}' contains the numeric query '{formula}' as a sub-formula"
            ),
            SpecificationError::InvalidFilter {
                property_name,
                reason,
            } => write!(f, "Property '{property_name}' has an invalid filter: {reason}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use pmc_model::{
        ConstantDeclaration, ConstantType, ModelType, RewardStructure, VariableDeclaration,
        builder::ModelBuilder,
        expressions::Expression,
    };

    use super::*;
    use crate::property::{Comparison, FilterKind, PathFormula};

    fn model(model_type: ModelType) -> Model {
        ModelBuilder::new("m", model_type)
            .with_constant(ConstantDeclaration::undefined("N", ConstantType::Int))
            .unwrap()
            .with_global_variable(
                VariableDeclaration::bounded_int("s", Expression::int(0), Expression::int(3))
                    .with_init(Expression::int(0)),
            )
            .unwrap()
            .with_label("done", Expression::var("s").equals(Expression::int(3)))
            .unwrap()
            .with_reward_structure(
                RewardStructure::new("steps").with_state_reward(Expression::bool(true), Expression::int(1)),
            )
            .unwrap()
            .build()
            .unwrap()
    }

    fn reach(target: StateFormula) -> StateFormula {
        StateFormula::probability(None, Query::Value, PathFormula::eventually(target))
    }

    #[test]
    fn test_valid_properties() {
        let m = model(ModelType::Dtmc);
        let mut builder = PropertySpecificationBuilder::new(&m);
        builder
            .add_properties([
                ("a".to_string(), reach(StateFormula::label("done"))),
                ("b".to_string(), reach(StateFormula::label("deadlock"))),
                (
                    "c".to_string(),
                    reach(StateFormula::expression(
                        Expression::var("s").equals(Expression::constant("N")),
                    )),
                ),
                (
                    "d".to_string(),
                    StateFormula::reward(
                        None,
                        None,
                        Query::Value,
                        RewardObjective::Cumulative(10.0),
                    ),
                ),
                (
                    "e".to_string(),
                    StateFormula::probability(
                        None,
                        Query::Bound(Comparison::Greater, 0.5),
                        PathFormula::eventually(StateFormula::probability(
                            None,
                            Query::Bound(Comparison::GreaterEq, 1.0),
                            PathFormula::next(StateFormula::label("done")),
                        )),
                    ),
                ),
            ])
            .unwrap();

        let spec = builder.build();
        assert_eq!(spec.len(), 5);
        assert_eq!(spec.properties()[0].0, "a");
        assert_eq!(spec.properties()[4].0, "e");
    }

    #[test]
    fn test_duplicate_name() {
        let m = model(ModelType::Dtmc);
        let mut builder = PropertySpecificationBuilder::new(&m);
        builder.add_property("a", reach(StateFormula::True)).unwrap();
        assert_eq!(
            builder.add_property("a", reach(StateFormula::False)),
            Err(SpecificationError::DuplicateName {
                property_name: "a".to_string()
            })
        );
    }

    #[test]
    fn test_unknown_identifiers() {
        let m = model(ModelType::Dtmc);
        let mut builder = PropertySpecificationBuilder::new(&m);

        let err = builder
            .add_property(
                "p",
                reach(StateFormula::expression(Expression::var("t").equals(Expression::int(1)))),
            )
            .unwrap_err();
        assert_eq!(
            err,
            SpecificationError::UnknownIdentifier {
                property_name: "p".to_string(),
                ident: "variable t".to_string()
            }
        );
        assert_eq!(
            err.to_string(),
            "Unknown identifier in property 'p': variable t is not declared in the model"
        );

        assert!(matches!(
            builder.add_property(
                "q",
                StateFormula::reward(
                    Some("time"),
                    None,
                    Query::Value,
                    RewardObjective::LongRunAverage
                )
            ),
            Err(SpecificationError::UnknownIdentifier { .. })
        ));
        assert!(builder.build().is_empty());
    }

    #[test]
    fn test_bounds() {
        let m = model(ModelType::Dtmc);
        let mut builder = PropertySpecificationBuilder::new(&m);

        assert!(matches!(
            builder.add_property(
                "p",
                StateFormula::probability(
                    None,
                    Query::Bound(Comparison::Less, 1.5),
                    PathFormula::eventually(StateFormula::True)
                )
            ),
            Err(SpecificationError::InvalidBound { bound, .. }) if bound == 1.5
        ));
        assert!(matches!(
            builder.add_property(
                "q",
                StateFormula::probability(
                    None,
                    Query::Value,
                    PathFormula::bounded_eventually(StateFormula::True, TimeBound::at_most(2.5))
                )
            ),
            Err(SpecificationError::InvalidTimeBound { .. })
        ));
        assert!(matches!(
            builder.add_property(
                "r",
                StateFormula::probability(
                    None,
                    Query::Value,
                    PathFormula::bounded_eventually(StateFormula::True, TimeBound::between(3.0, 2.0))
                )
            ),
            Err(SpecificationError::InvalidTimeBound { .. })
        ));

        // real-valued time bounds are fine for CTMCs
        let ctmc = model(ModelType::Ctmc);
        let mut builder = PropertySpecificationBuilder::new(&ctmc);
        builder
            .add_property(
                "q",
                StateFormula::probability(
                    None,
                    Query::Value,
                    PathFormula::bounded_eventually(StateFormula::True, TimeBound::at_most(2.5)),
                ),
            )
            .unwrap();
    }

    #[test]
    fn test_nested_query() {
        let m = model(ModelType::Dtmc);
        let mut builder = PropertySpecificationBuilder::new(&m);
        let nested = reach(StateFormula::label("done"));
        assert!(matches!(
            builder.add_property("p", nested.clone().and(StateFormula::True)),
            Err(SpecificationError::NestedQuery { formula, .. }) if *formula == nested
        ));
    }

    #[test]
    fn test_filters() {
        let m = model(ModelType::Dtmc);
        let mut builder = PropertySpecificationBuilder::new(&m);
        let done = || StateFormula::label("done");
        let bounded = || {
            StateFormula::probability(
                None,
                Query::Bound(Comparison::GreaterEq, 0.5),
                PathFormula::eventually(done()),
            )
        };

        // the filtered property may be a query
        builder
            .add_property("max", StateFormula::filter(FilterKind::Max, reach(done()), done().not()))
            .unwrap();
        builder
            .add_property(
                "all",
                StateFormula::filter(FilterKind::Forall, bounded(), StateFormula::True)
                    .and(StateFormula::True),
            )
            .unwrap();

        assert!(matches!(
            builder.add_property(
                "sum",
                StateFormula::filter(FilterKind::Sum, bounded(), StateFormula::True)
            ),
            Err(SpecificationError::InvalidFilter { .. })
        ));
        assert!(matches!(
            builder.add_property(
                "count",
                StateFormula::filter(FilterKind::Count, reach(done()), StateFormula::True)
            ),
            Err(SpecificationError::InvalidFilter { .. })
        ));
        assert!(matches!(
            builder.add_property(
                "nested",
                StateFormula::filter(FilterKind::Min, reach(done()), StateFormula::True)
                    .and(StateFormula::True)
            ),
            Err(SpecificationError::NestedQuery { .. })
        ));
        // the filter states are a boolean formula
        assert!(matches!(
            builder.add_property(
                "states",
                StateFormula::filter(FilterKind::Forall, bounded(), reach(done()))
            ),
            Err(SpecificationError::NestedQuery { .. })
        ));
        assert!(matches!(
            builder.add_property(
                "label",
                StateFormula::filter(FilterKind::Exists, StateFormula::label("unknown"), done())
            ),
            Err(SpecificationError::UnknownIdentifier { .. })
        ));
        assert_eq!(builder.build().len(), 2);
    }

    #[test]
    fn test_display() {
        let m = model(ModelType::Dtmc);
        let mut builder = PropertySpecificationBuilder::new(&m);
        builder.add_property("a", reach(StateFormula::label("done"))).unwrap();
        assert_eq!(
            builder.build().to_string(),
            "properties(1) {\n    a: P=? [F \"done\"];\n}"
        );
    }
}
