//! Numeric solvers for explicit Markov models
//!
//! This crate contains the graph-based precomputations and numeric
//! algorithms used to check probabilistic properties of discrete-time Markov
//! chains (DTMCs), continuous-time Markov chains (CTMCs) and Markov decision
//! processes (MDPs) represented as a [`sparse::SparseMatrix`].
//!
//! The algorithms are organized as follows:
//! - [`precompute`]: qualitative analysis (states with probability 0 or 1)
//! - [`components`]: strongly connected components, bottom SCCs and maximal
//!   end components
//! - [`reachability`]: (bounded) until and next probabilities
//! - [`rewards`]: expected reachability, cumulative and instantaneous rewards
//! - [`ctmc`]: transient analysis of CTMCs via uniformization
//! - [`steady`]: steady-state distributions and long-run averages
//!
//! Markov chains are treated as MDPs with exactly one choice per state, so
//! every algorithm takes an optimization [`Direction`]. It has no effect on
//! deterministic matrices.

use std::{error, fmt};

pub mod components;
pub mod ctmc;
pub mod deadline;
pub mod foxglynn;
pub mod options;
pub mod precompute;
pub mod reachability;
pub mod rewards;
pub mod sparse;
pub mod steady;

mod iteration;

pub use deadline::Deadline;
pub use options::{IterationMethod, SolverOptions, StopCriterion};
pub use sparse::{SparseMatrix, SparseMatrixBuilder};

/// Whether a quantity is minimized or maximized over all schedulers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Minimum over all schedulers
    Minimize,
    /// Maximum over all schedulers
    Maximize,
}

impl Direction {
    /// Neutral element of the optimization
    pub fn neutral(&self) -> f64 {
        match self {
            Direction::Minimize => f64::INFINITY,
            Direction::Maximize => f64::NEG_INFINITY,
        }
    }

    /// Combine two candidate values
    pub fn optimize(&self, a: f64, b: f64) -> f64 {
        match self {
            Direction::Minimize => a.min(b),
            Direction::Maximize => a.max(b),
        }
    }

    /// The opposite direction
    pub fn opposite(&self) -> Self {
        match self {
            Direction::Minimize => Direction::Maximize,
            Direction::Maximize => Direction::Minimize,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Minimize => write!(f, "min"),
            Direction::Maximize => write!(f, "max"),
        }
    }
}

/// Errors that can occur during a numeric computation
#[derive(Debug, Clone, PartialEq)]
pub enum SolverError {
    /// The iteration limit was reached before the iterates converged
    NotConverged {
        /// Number of iterations performed
        iterations: usize,
        /// Difference between the last two iterates
        difference: f64,
    },
    /// The deadline of the computation passed
    Timeout,
    /// A computed probability left the interval `[0, 1]` or became NaN
    Diverged {
        /// State at which the divergence was detected
        state: usize,
        /// Offending value
        value: f64,
    },
    /// The input of the algorithm is not valid (e.g. a negative time bound)
    InvalidInput(String),
}

impl fmt::Display for SolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverError::NotConverged {
                iterations,
                difference,
            } => write!(
                f,
                "Iterative method did not converge within {iterations} iterations (last difference: {difference:e})"
            ),
            SolverError::Timeout => write!(f, "Computation exceeded its deadline"),
            SolverError::Diverged { state, value } => write!(
                f,
                "Numerical divergence: state {state} has invalid value {value}"
            ),
            SolverError::InvalidInput(msg) => write!(f, "Invalid solver input: {msg}"),
        }
    }
}

impl error::Error for SolverError {}
