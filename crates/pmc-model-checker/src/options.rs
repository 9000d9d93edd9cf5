//! Options of the model checker
//!
//! [`ModelCheckerOptions`] bundles the options of all stages. With the
//! `config_deserialize` feature, options can be loaded from a configuration
//! file (any format supported by the `config` crate) and from environment
//! variables prefixed with `PMC_`, where nested keys are separated by `__`,
//! e.g. `PMC_SOLVER__TOLERANCE=1e-8`.

use std::time::Duration;

use pmc_automata::options::AutomatonOptions;
use pmc_graph::BuildOptions;
use pmc_solver::SolverOptions;

#[cfg(feature = "config_deserialize")]
use serde::Deserialize;
#[cfg(feature = "config_deserialize")]
use std::{
    fmt,
    path::{Path, PathBuf},
};

/// How numeric results are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "config_deserialize", derive(Deserialize))]
pub enum OutputMode {
    /// Floating-point value
    #[default]
    Float,
    /// Closest fraction with a bounded denominator
    Rational,
}

/// Options of the model checker
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "config_deserialize", derive(Deserialize), serde(default))]
pub struct ModelCheckerOptions {
    /// Options of the state-space construction
    pub build: BuildOptions,
    /// Options of the numeric solvers
    pub solver: SolverOptions,
    /// Options of the automaton construction
    pub automaton: AutomatonOptions,
    /// Rendering of numeric results
    pub output: OutputMode,
    /// Wall-clock limit in seconds for the state-space construction and for
    /// every single property
    pub timeout_secs: Option<u64>,
    /// Check independent properties in parallel
    pub parallel_properties: bool,
}

impl ModelCheckerOptions {
    /// Timeout as a [`Duration`]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(feature = "config_deserialize")]
impl ModelCheckerOptions {
    /// Load options from an optional configuration file, overridden by
    /// `PMC_` environment variables
    ///
    /// Options that are set in neither source keep their default value.
    pub fn load(file: Option<&Path>) -> Result<Self, OptionsError> {
        let mut settings = config::Config::builder();

        if let Some(file) = file {
            if !file.exists() {
                return Err(OptionsError::MissingFile(file.to_path_buf()));
            }
            settings = settings.add_source(config::File::from(file));
        }

        settings = settings.add_source(
            config::Environment::with_prefix("PMC")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let options = settings.build()?.try_deserialize::<Self>()?;
        Ok(options)
    }
}

/// Errors that can occur while loading [`ModelCheckerOptions`]
#[cfg(feature = "config_deserialize")]
#[derive(Debug)]
pub enum OptionsError {
    /// The configuration file does not exist
    MissingFile(PathBuf),
    /// The configuration could not be read or deserialized
    Config(config::ConfigError),
}

#[cfg(feature = "config_deserialize")]
impl From<config::ConfigError> for OptionsError {
    fn from(err: config::ConfigError) -> Self {
        OptionsError::Config(err)
    }
}

#[cfg(feature = "config_deserialize")]
impl fmt::Display for OptionsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionsError::MissingFile(path) => write!(
                f,
                "Specified configuration file '{}' does not exist",
                path.display()
            ),
            OptionsError::Config(err) => write!(f, "Failed to load configuration: {err}"),
        }
    }
}

#[cfg(feature = "config_deserialize")]
impl std::error::Error for OptionsError {}
