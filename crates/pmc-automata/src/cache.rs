//! Compilation of LTL formulas into deterministic automata with caching
//!
//! Formulas are first brought into negation normal form and their atomic
//! propositions are renumbered by first occurrence. The Büchi automaton of
//! this canonical shape is cached, so that formulas which only differ in
//! their propositions share one translation.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
};

use log::debug;

use crate::{
    AutomatonError,
    buchi::BuchiAutomaton,
    ltl::Ltl,
    options::{AutomatonConstruction, AutomatonOptions},
    rabin::{DeterministicAutomaton, EagerRabinAutomaton, LazyRabinAutomaton},
};

/// Hits and misses of the automaton cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStatistics {
    /// Number of lookups answered from the cache
    pub hits: usize,
    /// Number of translations performed
    pub misses: usize,
}

/// Thread-safe compiler from LTL formulas to deterministic automata
///
/// # Example
///
/// ```
/// use pmc_automata::{cache::AutomatonCompiler, ltl::Ltl, options::AutomatonOptions};
///
/// let compiler = AutomatonCompiler::new(AutomatonOptions::default());
/// compiler.compile(&Ltl::ap(0).finally().globally()).unwrap();
/// compiler.compile(&Ltl::ap(3).finally().globally()).unwrap();
///
/// let stats = compiler.statistics();
/// assert_eq!((stats.hits, stats.misses), (1, 1));
/// ```
#[derive(Debug)]
pub struct AutomatonCompiler {
    options: AutomatonOptions,
    cache: Mutex<HashMap<Ltl, Arc<BuchiAutomaton>>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl AutomatonCompiler {
    /// Create a compiler with an empty cache
    pub fn new(options: AutomatonOptions) -> Self {
        Self {
            options,
            cache: Mutex::new(HashMap::new()),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    /// Options of the compiler
    pub fn options(&self) -> &AutomatonOptions {
        &self.options
    }

    /// Büchi automaton of the canonical shape of `formula`
    ///
    /// Returns the automaton together with the original index of every
    /// proposition of the automaton.
    pub fn buchi(&self, formula: &Ltl) -> Result<(Arc<BuchiAutomaton>, Vec<usize>), AutomatonError> {
        let (canonical, mapping) = formula.to_nnf().canonical();

        if self.options.cache {
            let cached = self
                .cache
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&canonical)
                .cloned();
            if let Some(buchi) = cached {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("Automaton cache hit for {canonical}");
                return Ok((buchi, mapping));
            }
            debug!("Automaton cache miss for {canonical}");
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let buchi = Arc::new(BuchiAutomaton::from_ltl(&canonical)?);

        if self.options.cache {
            let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            let shared = cache.entry(canonical).or_insert(buchi);
            return Ok((shared.clone(), mapping));
        }
        Ok((buchi, mapping))
    }

    /// Deterministic Rabin automaton accepting exactly the words satisfying
    /// `formula`
    ///
    /// Letters passed to the automaton are bitmasks over the atomic
    /// propositions of `formula`.
    pub fn compile(&self, formula: &Ltl) -> Result<Box<dyn DeterministicAutomaton>, AutomatonError> {
        let (buchi, mapping) = self.buchi(formula)?;
        let lazy = LazyRabinAutomaton::new(buchi, mapping, self.options.canonical_singletons);

        match self.options.construction {
            AutomatonConstruction::Lazy => Ok(Box::new(lazy)),
            AutomatonConstruction::Eager => Ok(Box::new(EagerRabinAutomaton::new(lazy)?)),
        }
    }

    /// Hits and misses of the cache so far
    pub fn statistics(&self) -> CacheStatistics {
        CacheStatistics {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl Default for AutomatonCompiler {
    fn default() -> Self {
        Self::new(AutomatonOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_shares_canonical_shapes() {
        let compiler = AutomatonCompiler::default();
        let (a, ma) = compiler.buchi(&Ltl::ap(2).until(Ltl::ap(5))).unwrap();
        let (b, mb) = compiler.buchi(&Ltl::ap(1).until(Ltl::ap(0))).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(ma, vec![2, 5]);
        assert_eq!(mb, vec![1, 0]);
        assert_eq!(
            compiler.statistics(),
            CacheStatistics { hits: 1, misses: 1 }
        );
    }

    #[test]
    fn test_disabled_cache() {
        let compiler = AutomatonCompiler::new(AutomatonOptions {
            cache: false,
            ..Default::default()
        });
        let f = Ltl::ap(0).finally();
        let (a, _) = compiler.buchi(&f).unwrap();
        let (b, _) = compiler.buchi(&f).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(compiler.statistics().misses, 2);
    }

    #[test]
    fn test_compile_uses_original_propositions() {
        for construction in [AutomatonConstruction::Lazy, AutomatonConstruction::Eager] {
            let compiler = AutomatonCompiler::new(AutomatonOptions {
                construction,
                ..Default::default()
            });
            // p3 until p1
            let mut automaton = compiler.compile(&Ltl::ap(3).until(Ltl::ap(1))).unwrap();
            let good = crate::ltl::Lasso::new(vec![0b1000], vec![0b0010]).unwrap();
            let bad = crate::ltl::Lasso::new(vec![0b0001], vec![0b0010]).unwrap();
            assert!(automaton.accepts_lasso(&good));
            assert!(!automaton.accepts_lasso(&bad));
        }
    }

    #[test]
    fn test_compiler_is_shareable() {
        fn assert_sync<T: Sync + Send>() {}
        assert_sync::<AutomatonCompiler>();
    }
}
