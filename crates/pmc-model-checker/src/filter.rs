//! Filters accumulating the values of a property over a set of states
//!
//! `filter(kind, property, states)` first determines the states satisfying
//! `states` and then combines the values of `property` in these states. The
//! result does not depend on the state the filter is evaluated in, except
//! for `argmin` and `argmax`, which hold in the filter states where the
//! value is extremal.

use bitvec::prelude::*;
use log::debug;

use crate::{
    FailureKind, PropertyFailure, ResultValue,
    pctl::Evaluator,
    property::{FilterKind, StateFormula},
};

/// Values of the filtered property in every state
enum Operand {
    Bool(BitVec),
    Number(Vec<f64>),
}

impl Operand {
    fn value(&self, state: usize) -> ResultValue {
        match self {
            Operand::Bool(sat) => ResultValue::Bool(sat[state]),
            Operand::Number(values) => ResultValue::Number(values[state]),
        }
    }
}

impl Evaluator<'_> {
    /// Value of a filter that is not an `argmin` or `argmax`
    pub(crate) fn filter_value(
        &self,
        kind: FilterKind,
        property: &StateFormula,
        states: &StateFormula,
    ) -> Result<ResultValue, PropertyFailure> {
        let (selected, operand) = self.filter_operand(property, states)?;
        let empty = || {
            PropertyFailure::new(
                FailureKind::ModelError,
                format!("no state satisfies the filter {states}"),
            )
        };

        let value = match (kind, &operand) {
            (FilterKind::Forall, Operand::Bool(sat)) => {
                ResultValue::Bool(selected.iter().all(|&s| sat[s]))
            }
            (FilterKind::Exists, Operand::Bool(sat)) => {
                ResultValue::Bool(selected.iter().any(|&s| sat[s]))
            }
            (FilterKind::Count, Operand::Bool(sat)) => {
                ResultValue::Number(selected.iter().filter(|&&s| sat[s]).count() as f64)
            }
            (FilterKind::Sum, Operand::Number(values)) => {
                ResultValue::Number(selected.iter().map(|&s| values[s]).sum())
            }
            (FilterKind::Avg, Operand::Number(values)) => {
                if selected.is_empty() {
                    return Err(empty());
                }
                let sum = selected.iter().map(|&s| values[s]).sum::<f64>();
                ResultValue::Number(sum / selected.len() as f64)
            }
            (FilterKind::Min | FilterKind::Max | FilterKind::Range, Operand::Number(values)) => {
                let (lo, hi) = extrema(&selected, values).ok_or_else(empty)?;
                match kind {
                    FilterKind::Min => ResultValue::Number(lo),
                    FilterKind::Max => ResultValue::Number(hi),
                    _ => ResultValue::Interval(lo, hi),
                }
            }
            (FilterKind::State, _) => match selected.as_slice() {
                [state] => operand.value(*state),
                [] => return Err(empty()),
                _ => {
                    return Err(PropertyFailure::new(
                        FailureKind::ModelError,
                        format!(
                            "filter state needs a single state, but {states} holds in {} states",
                            selected.len()
                        ),
                    ));
                }
            },
            (FilterKind::First, _) => operand.value(*selected.first().ok_or_else(empty)?),
            _ => {
                return Err(PropertyFailure::unsupported(format!(
                    "{kind} filter of {property}"
                )));
            }
        };

        debug!("filter({kind}, {property}, {states}) = {value}");
        Ok(value)
    }

    /// Filter states in which the value of `property` is minimal (`argmin`)
    /// or maximal (`argmax`)
    pub(crate) fn filter_extremum_states(
        &self,
        kind: FilterKind,
        property: &StateFormula,
        states: &StateFormula,
    ) -> Result<BitVec, PropertyFailure> {
        let (selected, operand) = self.filter_operand(property, states)?;
        let Operand::Number(values) = operand else {
            return Err(PropertyFailure::unsupported(format!(
                "{kind} filter of the boolean formula {property}"
            )));
        };

        let mut result = bitvec![0; self.space().num_states()];
        if let Some((lo, hi)) = extrema(&selected, &values) {
            let target = if kind == FilterKind::Argmin { lo } else { hi };
            for &s in &selected {
                if values[s] == target {
                    result.set(s, true);
                }
            }
        }
        Ok(result)
    }

    /// Filter states in ascending order and the values of the property
    fn filter_operand(
        &self,
        property: &StateFormula,
        states: &StateFormula,
    ) -> Result<(Vec<usize>, Operand), PropertyFailure> {
        let all = bitvec![1; self.space().num_states()];
        let filter = self.states(states, &all)?;
        let selected = filter.iter_ones().collect::<Vec<_>>();
        debug!("Filter {states} selects {} states", selected.len());

        let operand = if property.is_query() {
            Operand::Number(self.values(property, &filter)?)
        } else {
            Operand::Bool(self.states(property, &filter)?)
        };
        Ok((selected, operand))
    }
}

/// Smallest and largest value of the selected states
fn extrema(selected: &[usize], values: &[f64]) -> Option<(f64, f64)> {
    selected
        .iter()
        .map(|&s| values[s])
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}
