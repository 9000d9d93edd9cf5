//! Linear temporal logic formulas over indexed atomic propositions
//!
//! Atomic propositions are referred to by their index. A letter of the
//! alphabet is a bitmask in which bit `i` is set iff proposition `i` holds.

use std::{collections::HashMap, fmt};

/// LTL formula
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Ltl {
    /// Constant true
    True,
    /// Constant false
    False,
    /// Atomic proposition with the given index
    Ap(usize),
    /// Negation
    Not(Box<Ltl>),
    /// Conjunction
    And(Box<Ltl>, Box<Ltl>),
    /// Disjunction
    Or(Box<Ltl>, Box<Ltl>),
    /// Implication
    Implies(Box<Ltl>, Box<Ltl>),
    /// Next
    Next(Box<Ltl>),
    /// Until
    Until(Box<Ltl>, Box<Ltl>),
    /// Release, the dual of until
    Release(Box<Ltl>, Box<Ltl>),
    /// Eventually
    Finally(Box<Ltl>),
    /// Always
    Globally(Box<Ltl>),
}

impl Ltl {
    /// Atomic proposition `i`
    pub fn ap(i: usize) -> Self {
        Ltl::Ap(i)
    }

    /// `!self`
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Ltl::Not(Box::new(self))
    }

    /// `self & rhs`
    pub fn and(self, rhs: Ltl) -> Self {
        Ltl::And(Box::new(self), Box::new(rhs))
    }

    /// `self | rhs`
    pub fn or(self, rhs: Ltl) -> Self {
        Ltl::Or(Box::new(self), Box::new(rhs))
    }

    /// `self -> rhs`
    pub fn implies(self, rhs: Ltl) -> Self {
        Ltl::Implies(Box::new(self), Box::new(rhs))
    }

    /// `X self`
    pub fn next(self) -> Self {
        Ltl::Next(Box::new(self))
    }

    /// `self U rhs`
    pub fn until(self, rhs: Ltl) -> Self {
        Ltl::Until(Box::new(self), Box::new(rhs))
    }

    /// `self R rhs`
    pub fn release(self, rhs: Ltl) -> Self {
        Ltl::Release(Box::new(self), Box::new(rhs))
    }

    /// `F self`
    pub fn finally(self) -> Self {
        Ltl::Finally(Box::new(self))
    }

    /// `G self`
    pub fn globally(self) -> Self {
        Ltl::Globally(Box::new(self))
    }

    /// Number of atomic propositions, i.e., the largest index plus one
    pub fn num_aps(&self) -> usize {
        match self {
            Ltl::True | Ltl::False => 0,
            Ltl::Ap(i) => i + 1,
            Ltl::Not(a) | Ltl::Next(a) | Ltl::Finally(a) | Ltl::Globally(a) => a.num_aps(),
            Ltl::And(a, b)
            | Ltl::Or(a, b)
            | Ltl::Implies(a, b)
            | Ltl::Until(a, b)
            | Ltl::Release(a, b) => a.num_aps().max(b.num_aps()),
        }
    }

    /// Number of nodes of the syntax tree
    pub fn size(&self) -> usize {
        match self {
            Ltl::True | Ltl::False | Ltl::Ap(_) => 1,
            Ltl::Not(a) | Ltl::Next(a) | Ltl::Finally(a) | Ltl::Globally(a) => 1 + a.size(),
            Ltl::And(a, b)
            | Ltl::Or(a, b)
            | Ltl::Implies(a, b)
            | Ltl::Until(a, b)
            | Ltl::Release(a, b) => 1 + a.size() + b.size(),
        }
    }

    /// Negation normal form
    ///
    /// The result contains no implications and negations only directly in
    /// front of atomic propositions.
    ///
    /// # Example
    ///
    /// ```
    /// use pmc_automata::ltl::Ltl;
    ///
    /// let f = Ltl::ap(0).until(Ltl::ap(1)).not();
    /// assert_eq!(f.to_nnf().to_string(), "(!p0 R !p1)");
    /// ```
    pub fn to_nnf(&self) -> Ltl {
        self.nnf(false)
    }

    fn nnf(&self, negate: bool) -> Ltl {
        match (self, negate) {
            (Ltl::True, false) | (Ltl::False, true) => Ltl::True,
            (Ltl::True, true) | (Ltl::False, false) => Ltl::False,
            (Ltl::Ap(i), false) => Ltl::Ap(*i),
            (Ltl::Ap(i), true) => Ltl::Ap(*i).not(),
            (Ltl::Not(a), _) => a.nnf(!negate),
            (Ltl::And(a, b), false) => a.nnf(false).and(b.nnf(false)),
            (Ltl::And(a, b), true) => a.nnf(true).or(b.nnf(true)),
            (Ltl::Or(a, b), false) => a.nnf(false).or(b.nnf(false)),
            (Ltl::Or(a, b), true) => a.nnf(true).and(b.nnf(true)),
            (Ltl::Implies(a, b), false) => a.nnf(true).or(b.nnf(false)),
            (Ltl::Implies(a, b), true) => a.nnf(false).and(b.nnf(true)),
            (Ltl::Next(a), _) => a.nnf(negate).next(),
            (Ltl::Until(a, b), false) => a.nnf(false).until(b.nnf(false)),
            (Ltl::Until(a, b), true) => a.nnf(true).release(b.nnf(true)),
            (Ltl::Release(a, b), false) => a.nnf(false).release(b.nnf(false)),
            (Ltl::Release(a, b), true) => a.nnf(true).until(b.nnf(true)),
            (Ltl::Finally(a), false) => a.nnf(false).finally(),
            (Ltl::Finally(a), true) => a.nnf(true).globally(),
            (Ltl::Globally(a), false) => a.nnf(false).globally(),
            (Ltl::Globally(a), true) => a.nnf(true).finally(),
        }
    }

    /// Rename the atomic propositions in order of their first occurrence
    ///
    /// Returns the renamed formula together with the original index of every
    /// new index. Formulas that only differ in the numbering of their
    /// propositions have the same canonical form.
    ///
    /// # Example
    ///
    /// ```
    /// use pmc_automata::ltl::Ltl;
    ///
    /// let f = Ltl::ap(4).until(Ltl::ap(2).and(Ltl::ap(4)));
    /// let (canonical, mapping) = f.canonical();
    /// assert_eq!(canonical, Ltl::ap(0).until(Ltl::ap(1).and(Ltl::ap(0))));
    /// assert_eq!(mapping, vec![4, 2]);
    /// ```
    pub fn canonical(&self) -> (Ltl, Vec<usize>) {
        let mut renaming = HashMap::new();
        let mut mapping = Vec::new();
        let canonical = self.rename(&mut renaming, &mut mapping);
        (canonical, mapping)
    }

    fn rename(&self, renaming: &mut HashMap<usize, usize>, mapping: &mut Vec<usize>) -> Ltl {
        let unary = |a: &Ltl, renaming: &mut HashMap<usize, usize>, mapping: &mut Vec<usize>| {
            Box::new(a.rename(renaming, mapping))
        };
        match self {
            Ltl::True => Ltl::True,
            Ltl::False => Ltl::False,
            Ltl::Ap(i) => {
                let j = *renaming.entry(*i).or_insert_with(|| {
                    mapping.push(*i);
                    mapping.len() - 1
                });
                Ltl::Ap(j)
            }
            Ltl::Not(a) => Ltl::Not(unary(a, renaming, mapping)),
            Ltl::Next(a) => Ltl::Next(unary(a, renaming, mapping)),
            Ltl::Finally(a) => Ltl::Finally(unary(a, renaming, mapping)),
            Ltl::Globally(a) => Ltl::Globally(unary(a, renaming, mapping)),
            Ltl::And(a, b) => {
                let a = unary(a, renaming, mapping);
                Ltl::And(a, unary(b, renaming, mapping))
            }
            Ltl::Or(a, b) => {
                let a = unary(a, renaming, mapping);
                Ltl::Or(a, unary(b, renaming, mapping))
            }
            Ltl::Implies(a, b) => {
                let a = unary(a, renaming, mapping);
                Ltl::Implies(a, unary(b, renaming, mapping))
            }
            Ltl::Until(a, b) => {
                let a = unary(a, renaming, mapping);
                Ltl::Until(a, unary(b, renaming, mapping))
            }
            Ltl::Release(a, b) => {
                let a = unary(a, renaming, mapping);
                Ltl::Release(a, unary(b, renaming, mapping))
            }
        }
    }

    /// Check whether the formula holds on an ultimately periodic word
    pub fn holds_on_lasso(&self, lasso: &Lasso) -> bool {
        self.truth_values(lasso)[0]
    }

    /// Truth value of the formula at every position of the lasso
    fn truth_values(&self, lasso: &Lasso) -> Vec<bool> {
        let len = lasso.len();
        match self {
            Ltl::True => vec![true; len],
            Ltl::False => vec![false; len],
            Ltl::Ap(i) => (0..len)
                .map(|p| *i < 64 && lasso.letter(p) >> i & 1 == 1)
                .collect(),
            Ltl::Not(a) => a.truth_values(lasso).into_iter().map(|v| !v).collect(),
            Ltl::And(a, b) => zip_with(a.truth_values(lasso), b.truth_values(lasso), |x, y| x && y),
            Ltl::Or(a, b) => zip_with(a.truth_values(lasso), b.truth_values(lasso), |x, y| x || y),
            Ltl::Implies(a, b) => {
                zip_with(a.truth_values(lasso), b.truth_values(lasso), |x, y| !x || y)
            }
            Ltl::Next(a) => {
                let a = a.truth_values(lasso);
                (0..len).map(|p| a[lasso.successor(p)]).collect()
            }
            Ltl::Until(a, b) => until(lasso, &a.truth_values(lasso), &b.truth_values(lasso)),
            Ltl::Release(a, b) => release(lasso, &a.truth_values(lasso), &b.truth_values(lasso)),
            Ltl::Finally(a) => until(lasso, &vec![true; len], &a.truth_values(lasso)),
            Ltl::Globally(a) => release(lasso, &vec![false; len], &a.truth_values(lasso)),
        }
    }
}

fn zip_with(a: Vec<bool>, b: Vec<bool>, f: impl Fn(bool, bool) -> bool) -> Vec<bool> {
    a.into_iter().zip(b).map(|(x, y)| f(x, y)).collect()
}

/// Least fixed point of `v = b | (a & X v)`
fn until(lasso: &Lasso, a: &[bool], b: &[bool]) -> Vec<bool> {
    let mut v = b.to_vec();
    let mut changed = true;
    while changed {
        changed = false;
        for p in (0..lasso.len()).rev() {
            if !v[p] && a[p] && v[lasso.successor(p)] {
                v[p] = true;
                changed = true;
            }
        }
    }
    v
}

/// Greatest fixed point of `v = b & (a | X v)`
fn release(lasso: &Lasso, a: &[bool], b: &[bool]) -> Vec<bool> {
    let mut v = b.to_vec();
    let mut changed = true;
    while changed {
        changed = false;
        for p in (0..lasso.len()).rev() {
            if v[p] && !a[p] && !v[lasso.successor(p)] {
                v[p] = false;
                changed = true;
            }
        }
    }
    v
}

impl fmt::Display for Ltl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ltl::True => write!(f, "true"),
            Ltl::False => write!(f, "false"),
            Ltl::Ap(i) => write!(f, "p{i}"),
            Ltl::Not(a) => write!(f, "!{a}"),
            Ltl::And(a, b) => write!(f, "({a} & {b})"),
            Ltl::Or(a, b) => write!(f, "({a} | {b})"),
            Ltl::Implies(a, b) => write!(f, "({a} -> {b})"),
            Ltl::Next(a) => write!(f, "X {a}"),
            Ltl::Until(a, b) => write!(f, "({a} U {b})"),
            Ltl::Release(a, b) => write!(f, "({a} R {b})"),
            Ltl::Finally(a) => write!(f, "F {a}"),
            Ltl::Globally(a) => write!(f, "G {a}"),
        }
    }
}

/// Ultimately periodic word `prefix cycle cycle ...`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lasso {
    prefix: Vec<u64>,
    cycle: Vec<u64>,
}

impl Lasso {
    /// Create a lasso, returns `None` if the cycle is empty
    pub fn new(prefix: Vec<u64>, cycle: Vec<u64>) -> Option<Self> {
        if cycle.is_empty() {
            return None;
        }
        Some(Self { prefix, cycle })
    }

    /// Letters read before the cycle
    pub fn prefix(&self) -> &[u64] {
        &self.prefix
    }

    /// Letters repeated forever
    pub fn cycle(&self) -> &[u64] {
        &self.cycle
    }

    /// Number of distinct positions
    pub fn len(&self) -> usize {
        self.prefix.len() + self.cycle.len()
    }

    /// Always false, the cycle of a lasso is never empty
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Letter at position `p < self.len()`
    pub fn letter(&self, p: usize) -> u64 {
        if p < self.prefix.len() {
            self.prefix[p]
        } else {
            self.cycle[p - self.prefix.len()]
        }
    }

    /// Position following `p`
    pub fn successor(&self, p: usize) -> usize {
        if p + 1 < self.len() {
            p + 1
        } else {
            self.prefix.len()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lasso(prefix: &[u64], cycle: &[u64]) -> Lasso {
        Lasso::new(prefix.to_vec(), cycle.to_vec()).unwrap()
    }

    #[test]
    fn test_nnf() {
        let f = Ltl::ap(0).implies(Ltl::ap(1).finally()).globally().not();
        assert_eq!(f.to_nnf().to_string(), "F (p0 & G !p1)");
        assert_eq!(Ltl::True.not().to_nnf(), Ltl::False);
        assert_eq!(
            Ltl::ap(0).next().not().to_nnf(),
            Ltl::ap(0).not().next()
        );
    }

    #[test]
    fn test_num_aps_and_size() {
        let f = Ltl::ap(3).until(Ltl::ap(1).not());
        assert_eq!(f.num_aps(), 4);
        assert_eq!(f.size(), 4);
        assert_eq!(Ltl::True.num_aps(), 0);
    }

    #[test]
    fn test_canonical_shares_shape() {
        let f = Ltl::ap(7).finally().globally();
        let g = Ltl::ap(2).finally().globally();
        assert_eq!(f.canonical().0, g.canonical().0);
        assert_eq!(f.canonical().1, vec![7]);
    }

    #[test]
    fn test_lasso() {
        assert!(Lasso::new(vec![1], vec![]).is_none());
        let l = lasso(&[1, 2], &[3]);
        assert_eq!(l.len(), 3);
        assert_eq!(l.successor(2), 2);
        assert_eq!(l.letter(1), 2);
    }

    #[test]
    fn test_holds_on_lasso() {
        let p = || Ltl::ap(0);
        let q = || Ltl::ap(1);

        // p p (q)^w
        let w = lasso(&[0b01, 0b01], &[0b10]);
        assert!(p().until(q()).holds_on_lasso(&w));
        assert!(q().globally().finally().holds_on_lasso(&w));
        assert!(!p().finally().globally().holds_on_lasso(&w));
        assert!(p().next().holds_on_lasso(&w));
        assert!(!p().next().next().holds_on_lasso(&w));

        // (p q)^w
        let w = lasso(&[], &[0b01, 0b10]);
        assert!(p().finally().globally().holds_on_lasso(&w));
        assert!(!p().globally().finally().holds_on_lasso(&w));
        assert!(q().release(p().or(q())).holds_on_lasso(&w));
        assert!(!q().release(p()).holds_on_lasso(&w));
    }
}
