//! Options of the automaton construction

#[cfg(feature = "config_deserialize")]
use serde::Deserialize;

/// When the states of the deterministic automaton are constructed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "config_deserialize", derive(Deserialize))]
pub enum AutomatonConstruction {
    /// States are computed on demand during the product construction
    #[default]
    Lazy,
    /// All states reachable under any letter are computed up front
    Eager,
}

/// Options of the [`crate::cache::AutomatonCompiler`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "config_deserialize", derive(Deserialize), serde(default))]
pub struct AutomatonOptions {
    /// Lazy or eager determinisation
    pub construction: AutomatonConstruction,
    /// Share equal label sets between Safra trees
    pub canonical_singletons: bool,
    /// Reuse Büchi automata of formulas with the same canonical shape
    pub cache: bool,
}

impl Default for AutomatonOptions {
    fn default() -> Self {
        Self {
            construction: AutomatonConstruction::Lazy,
            canonical_singletons: true,
            cache: true,
        }
    }
}
