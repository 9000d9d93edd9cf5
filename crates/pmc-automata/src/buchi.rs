//! Translation of LTL formulas into Büchi automata
//!
//! The translation proceeds in two steps. A tableau construction first
//! produces a generalized Büchi automaton whose states are sets of
//! obligations (formulas in negation normal form that need to hold at the
//! current position) and whose transitions are labelled with conjunctions of
//! literals. Every until subformula `a U b` induces an acceptance set
//! containing the transitions that do not postpone `b`. The generalized
//! automaton is then degeneralized into a state-based Büchi automaton by
//! the usual counter construction.

use std::{
    collections::{BTreeSet, HashMap, HashSet, VecDeque},
    fmt,
};

use bitvec::prelude::*;
use log::debug;
use pmc_display_utils::join_iterator;

use crate::{
    AutomatonError, MAX_PROPOSITIONS,
    ltl::{Lasso, Ltl},
};

/// Conjunction of literals over atomic propositions
///
/// Bit `i` of `pos` (resp. `neg`) is set if proposition `i` must hold (resp.
/// must not hold).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Guard {
    pos: u64,
    neg: u64,
}

impl Guard {
    /// Guard satisfied by every letter
    pub fn top() -> Self {
        Self::default()
    }

    /// Add the literal `ap` (or `!ap` if `positive` is false)
    ///
    /// Returns `false` if the guard becomes unsatisfiable.
    fn require(&mut self, ap: usize, positive: bool) -> bool {
        let bit = 1u64 << ap;
        if positive {
            self.pos |= bit;
            self.neg & bit == 0
        } else {
            self.neg |= bit;
            self.pos & bit == 0
        }
    }

    /// Check whether the letter satisfies all literals
    pub fn matches(&self, letter: u64) -> bool {
        letter & self.pos == self.pos && letter & self.neg == 0
    }

    /// Propositions that need to hold
    pub fn positive(&self) -> u64 {
        self.pos
    }

    /// Propositions that must not hold
    pub fn negative(&self) -> u64 {
        self.neg
    }
}

impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.pos == 0 && self.neg == 0 {
            return write!(f, "true");
        }
        let literals = (0..64)
            .filter(|i| (self.pos | self.neg) >> i & 1 == 1)
            .map(|i| {
                if self.pos >> i & 1 == 1 {
                    format!("p{i}")
                } else {
                    format!("!p{i}")
                }
            });
        write!(f, "{}", join_iterator(literals, " & "))
    }
}

/// Subformula of a formula in negation normal form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Node {
    True,
    False,
    Ap(usize),
    NotAp(usize),
    And(usize, usize),
    Or(usize, usize),
    Next(usize),
    Until(usize, usize),
    Release(usize, usize),
}

/// Hash-consed subformulas of the translated formula
#[derive(Debug, Default)]
struct Arena {
    nodes: Vec<Node>,
    index: HashMap<Node, usize>,
}

impl Arena {
    fn intern(&mut self, node: Node) -> usize {
        if let Some(&i) = self.index.get(&node) {
            return i;
        }
        self.nodes.push(node);
        self.index.insert(node, self.nodes.len() - 1);
        self.nodes.len() - 1
    }

    /// Insert the negation normal form of `f` (or of `!f` if `negate`)
    fn insert(&mut self, f: &Ltl, negate: bool) -> usize {
        let node = match (f, negate) {
            (Ltl::True, false) | (Ltl::False, true) => Node::True,
            (Ltl::True, true) | (Ltl::False, false) => Node::False,
            (Ltl::Ap(i), false) => Node::Ap(*i),
            (Ltl::Ap(i), true) => Node::NotAp(*i),
            (Ltl::Not(a), _) => return self.insert(a, !negate),
            (Ltl::And(a, b), false) => Node::And(self.insert(a, false), self.insert(b, false)),
            (Ltl::And(a, b), true) => Node::Or(self.insert(a, true), self.insert(b, true)),
            (Ltl::Or(a, b), false) => Node::Or(self.insert(a, false), self.insert(b, false)),
            (Ltl::Or(a, b), true) => Node::And(self.insert(a, true), self.insert(b, true)),
            (Ltl::Implies(a, b), false) => Node::Or(self.insert(a, true), self.insert(b, false)),
            (Ltl::Implies(a, b), true) => Node::And(self.insert(a, false), self.insert(b, true)),
            (Ltl::Next(a), _) => Node::Next(self.insert(a, negate)),
            (Ltl::Until(a, b), false) => Node::Until(self.insert(a, false), self.insert(b, false)),
            (Ltl::Until(a, b), true) => Node::Release(self.insert(a, true), self.insert(b, true)),
            (Ltl::Release(a, b), false) => {
                Node::Release(self.insert(a, false), self.insert(b, false))
            }
            (Ltl::Release(a, b), true) => Node::Until(self.insert(a, true), self.insert(b, true)),
            (Ltl::Finally(a), false) => {
                let t = self.intern(Node::True);
                Node::Until(t, self.insert(a, false))
            }
            (Ltl::Finally(a), true) => {
                let ff = self.intern(Node::False);
                Node::Release(ff, self.insert(a, true))
            }
            (Ltl::Globally(a), false) => {
                let ff = self.intern(Node::False);
                Node::Release(ff, self.insert(a, false))
            }
            (Ltl::Globally(a), true) => {
                let t = self.intern(Node::True);
                Node::Until(t, self.insert(a, true))
            }
        };
        self.intern(node)
    }
}

/// One way to satisfy the obligations of a tableau state in the current step
#[derive(Debug, Clone, Default)]
struct Cover {
    guard: Guard,
    next: BTreeSet<usize>,
    expanded: HashSet<usize>,
}

/// Transition of the generalized Büchi automaton
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TableauEdge {
    guard: Guard,
    target: usize,
    /// Membership in the acceptance set of every until subformula
    accepting: BitVec,
}

/// Generalized Büchi automaton with transition-based acceptance
#[derive(Debug)]
struct Tableau {
    edges: Vec<Vec<TableauEdge>>,
    num_sets: usize,
}

impl Tableau {
    fn build(formula: &Ltl) -> Self {
        let mut arena = Arena::default();
        let root = arena.insert(formula, false);
        let untils = arena
            .nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| match n {
                Node::Until(_, b) => Some((i, *b)),
                _ => None,
            })
            .collect::<Vec<_>>();

        let mut states: Vec<BTreeSet<usize>> = vec![BTreeSet::from([root])];
        let mut index: HashMap<BTreeSet<usize>, usize> = HashMap::from([(states[0].clone(), 0)]);
        let mut edges = Vec::new();
        let mut queue = VecDeque::from([0]);

        while let Some(current) = queue.pop_front() {
            let mut seen = HashSet::new();
            let mut outgoing = Vec::new();

            for cover in expand(&arena, &states[current]) {
                let accepting = untils
                    .iter()
                    .map(|(u, b)| !cover.next.contains(u) || cover.expanded.contains(b))
                    .collect::<BitVec>();

                let target = match index.get(&cover.next) {
                    Some(&t) => t,
                    None => {
                        let t = states.len();
                        index.insert(cover.next.clone(), t);
                        states.push(cover.next.clone());
                        queue.push_back(t);
                        t
                    }
                };

                let edge = TableauEdge {
                    guard: cover.guard,
                    target,
                    accepting,
                };
                if seen.insert(edge.clone()) {
                    outgoing.push(edge);
                }
            }

            // states are processed in the order of their indices
            edges.push(outgoing);
        }

        Self {
            edges,
            num_sets: untils.len(),
        }
    }
}

/// All covers of the conjunction of `obligations`
fn expand(arena: &Arena, obligations: &BTreeSet<usize>) -> Vec<Cover> {
    let mut covers = Vec::new();
    let mut stack = vec![(obligations.iter().copied().collect::<Vec<_>>(), Cover::default())];

    while let Some((mut todo, mut cover)) = stack.pop() {
        let consistent = loop {
            let Some(f) = todo.pop() else {
                break true;
            };
            if !cover.expanded.insert(f) {
                continue;
            }
            match arena.nodes[f] {
                Node::True => {}
                Node::False => break false,
                Node::Ap(i) => {
                    if !cover.guard.require(i, true) {
                        break false;
                    }
                }
                Node::NotAp(i) => {
                    if !cover.guard.require(i, false) {
                        break false;
                    }
                }
                Node::And(a, b) => {
                    todo.push(a);
                    todo.push(b);
                }
                Node::Or(a, b) => {
                    let mut alternative = todo.clone();
                    alternative.push(b);
                    stack.push((alternative, cover.clone()));
                    todo.push(a);
                }
                Node::Next(a) => {
                    cover.next.insert(a);
                }
                Node::Until(a, b) => {
                    // postpone: a now and a U b in the next step
                    let mut postponed = cover.clone();
                    postponed.next.insert(f);
                    let mut alternative = todo.clone();
                    alternative.push(a);
                    stack.push((alternative, postponed));
                    todo.push(b);
                }
                Node::Release(a, b) => {
                    let mut postponed = cover.clone();
                    postponed.next.insert(f);
                    let mut alternative = todo.clone();
                    alternative.push(b);
                    stack.push((alternative, postponed));
                    todo.push(a);
                    todo.push(b);
                }
            }
        };

        if consistent {
            covers.push(cover);
        }
    }

    covers
}

/// State of a [`BuchiAutomaton`]
#[derive(Debug, Clone, PartialEq)]
struct BuchiState {
    accepting: bool,
    transitions: Vec<(Guard, usize)>,
}

/// Nondeterministic Büchi automaton with state-based acceptance
///
/// Transitions are labelled with [`Guard`]s over the atomic propositions of
/// the translated formula.
#[derive(Debug, Clone, PartialEq)]
pub struct BuchiAutomaton {
    num_aps: usize,
    states: Vec<BuchiState>,
}

impl BuchiAutomaton {
    /// Translate an LTL formula
    ///
    /// # Example
    ///
    /// ```
    /// use pmc_automata::{buchi::BuchiAutomaton, ltl::{Lasso, Ltl}};
    ///
    /// // infinitely often p0
    /// let f = Ltl::ap(0).finally().globally();
    /// let automaton = BuchiAutomaton::from_ltl(&f).unwrap();
    ///
    /// assert!(automaton.accepts_lasso(&Lasso::new(vec![], vec![0, 1]).unwrap()));
    /// assert!(!automaton.accepts_lasso(&Lasso::new(vec![1], vec![0]).unwrap()));
    /// ```
    pub fn from_ltl(formula: &Ltl) -> Result<Self, AutomatonError> {
        let num_aps = formula.num_aps();
        if num_aps > MAX_PROPOSITIONS {
            return Err(AutomatonError::TooManyPropositions {
                count: num_aps,
                max: MAX_PROPOSITIONS,
            });
        }

        let tableau = Tableau::build(formula);
        let automaton = Self::degeneralize(&tableau, num_aps);
        debug!(
            "Translated {formula} into a Büchi automaton with {} states (tableau with {} states and {} acceptance sets)",
            automaton.num_states(),
            tableau.edges.len(),
            tableau.num_sets
        );
        Ok(automaton)
    }

    /// Counter construction: a state `(q, i, acc)` waits for a transition of
    /// acceptance set `i`, `acc` records that the last transition completed
    /// a round through all sets
    fn degeneralize(tableau: &Tableau, num_aps: usize) -> Self {
        let k = tableau.num_sets;
        let mut index: HashMap<(usize, usize, bool), usize> = HashMap::from([((0, 0, false), 0)]);
        let mut keys = vec![(0, 0, false)];
        let mut states: Vec<BuchiState> = Vec::new();
        let mut current = 0;

        while current < keys.len() {
            let (q, level, accepting) = keys[current];
            let mut transitions = Vec::with_capacity(tableau.edges[q].len());

            for edge in &tableau.edges[q] {
                let mut next_level = level;
                while next_level < k && edge.accepting[next_level] {
                    next_level += 1;
                }
                let completed = next_level == k;
                if completed {
                    next_level = 0;
                }

                let key = (edge.target, next_level, completed);
                let target = match index.get(&key) {
                    Some(&t) => t,
                    None => {
                        let t = keys.len();
                        index.insert(key, t);
                        keys.push(key);
                        t
                    }
                };
                transitions.push((edge.guard, target));
            }

            transitions.sort();
            transitions.dedup();
            states.push(BuchiState {
                accepting,
                transitions,
            });
            current += 1;
        }

        Self { num_aps, states }
    }

    /// Number of atomic propositions
    pub fn num_aps(&self) -> usize {
        self.num_aps
    }

    /// Number of states
    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    /// The initial state
    pub fn initial_state(&self) -> usize {
        0
    }

    /// Whether `state` is accepting
    pub fn is_accepting(&self, state: usize) -> bool {
        self.states[state].accepting
    }

    /// Outgoing transitions of `state`
    pub fn transitions(&self, state: usize) -> &[(Guard, usize)] {
        &self.states[state].transitions
    }

    /// Successors of `state` under `letter`
    pub fn successors(&self, state: usize, letter: u64) -> impl Iterator<Item = usize> + '_ {
        self.states[state]
            .transitions
            .iter()
            .filter(move |(g, _)| g.matches(letter))
            .map(|(_, t)| *t)
    }

    /// Check whether the automaton accepts an ultimately periodic word
    ///
    /// The word is accepted iff some accepting node of the product of the
    /// automaton with the lasso is reachable and lies on a cycle.
    pub fn accepts_lasso(&self, lasso: &Lasso) -> bool {
        let node = |q: usize, p: usize| q * lasso.len() + p;
        let successors = |n: usize| {
            let (q, p) = (n / lasso.len(), n % lasso.len());
            let next = lasso.successor(p);
            self.successors(q, lasso.letter(p))
                .map(move |t| node(t, next))
        };
        let reach = |from: Vec<usize>| {
            let mut visited = bitvec![0; self.num_states() * lasso.len()];
            let mut stack = from;
            while let Some(n) = stack.pop() {
                for m in successors(n) {
                    if !visited[m] {
                        visited.set(m, true);
                        stack.push(m);
                    }
                }
            }
            visited
        };

        let start = node(self.initial_state(), 0);
        let mut reachable = reach(vec![start]);
        reachable.set(start, true);

        reachable.iter_ones().any(|n| {
            self.is_accepting(n / lasso.len()) && reach(vec![n])[n]
        })
    }
}

impl fmt::Display for BuchiAutomaton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (q, state) in self.states.iter().enumerate() {
            let marker = if state.accepting { " (accepting)" } else { "" };
            writeln!(f, "state {q}{marker}:")?;
            for (guard, target) in &state.transitions {
                writeln!(f, "    {guard} -> {target}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lasso(prefix: &[u64], cycle: &[u64]) -> Lasso {
        Lasso::new(prefix.to_vec(), cycle.to_vec()).unwrap()
    }

    #[test]
    fn test_guard() {
        let mut g = Guard::top();
        assert!(g.matches(0));
        assert!(g.require(0, true));
        assert!(g.require(2, false));
        assert!(g.matches(0b011));
        assert!(!g.matches(0b101));
        assert_eq!(g.to_string(), "p0 & !p2");
        assert!(!g.require(2, true));
    }

    #[test]
    fn test_constants() {
        let t = BuchiAutomaton::from_ltl(&Ltl::True).unwrap();
        assert!(t.accepts_lasso(&lasso(&[], &[0])));

        let f = BuchiAutomaton::from_ltl(&Ltl::False).unwrap();
        assert_eq!(f.num_states(), 1);
        assert!(f.transitions(0).is_empty());
        assert!(!f.accepts_lasso(&lasso(&[], &[0])));
    }

    #[test]
    fn test_until() {
        let a = BuchiAutomaton::from_ltl(&Ltl::ap(0).until(Ltl::ap(1))).unwrap();
        assert!(a.accepts_lasso(&lasso(&[0b01, 0b01], &[0b10])));
        assert!(a.accepts_lasso(&lasso(&[], &[0b10])));
        assert!(!a.accepts_lasso(&lasso(&[0b01], &[0b00])));
        // b is postponed forever
        assert!(!a.accepts_lasso(&lasso(&[], &[0b01])));
    }

    #[test]
    fn test_generalized_acceptance() {
        let f = Ltl::ap(0).finally().globally().and(Ltl::ap(1).finally().globally());
        let a = BuchiAutomaton::from_ltl(&f).unwrap();
        assert!(a.accepts_lasso(&lasso(&[], &[0b01, 0b10])));
        assert!(a.accepts_lasso(&lasso(&[0b00], &[0b11])));
        assert!(!a.accepts_lasso(&lasso(&[0b11], &[0b01])));
    }

    #[test]
    fn test_too_many_propositions() {
        assert_eq!(
            BuchiAutomaton::from_ltl(&Ltl::ap(64)),
            Err(AutomatonError::TooManyPropositions {
                count: 65,
                max: MAX_PROPOSITIONS
            })
        );
    }
}
