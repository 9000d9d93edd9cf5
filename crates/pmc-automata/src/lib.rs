//! Translation of LTL formulas into deterministic ω-automata
//!
//! The pipeline implemented by this crate is
//! - [`ltl`]: LTL formulas over indexed atomic propositions, negation normal
//!   form and canonical renaming of propositions,
//! - [`buchi`]: tableau translation into a generalized Büchi automaton and
//!   degeneralization,
//! - [`rabin`]: Safra's determinisation into a Rabin automaton, either
//!   lazily or eagerly,
//! - [`cache`]: the [`cache::AutomatonCompiler`] tying the steps together
//!   and caching Büchi automata by the shape of their formula.
//!
//! Letters are bitmasks over the atomic propositions, therefore formulas may
//! use at most [`MAX_PROPOSITIONS`] propositions.

use std::{error, fmt};

pub mod buchi;
pub mod cache;
pub mod ltl;
pub mod options;
pub mod rabin;

/// Maximal number of atomic propositions of a formula
pub const MAX_PROPOSITIONS: usize = 64;

/// Maximal number of atomic propositions for the eager construction, which
/// enumerates all letters
pub const MAX_EAGER_PROPOSITIONS: usize = 16;

/// Errors that can occur while compiling a formula
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutomatonError {
    /// The formula uses more atomic propositions than supported
    TooManyPropositions {
        /// Number of propositions of the formula
        count: usize,
        /// Supported number of propositions
        max: usize,
    },
}

impl fmt::Display for AutomatonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AutomatonError::TooManyPropositions { count, max } => write!(
                f,
                "Formula has {count} atomic propositions, but at most {max} are supported"
            ),
        }
    }
}

impl error::Error for AutomatonError {}
