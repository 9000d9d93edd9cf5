//! Deterministic Rabin automata obtained by Safra's construction
//!
//! A state of the deterministic automaton is a Safra tree: an ordered tree
//! whose nodes carry a name, a set of Büchi states (the label) and a mark.
//! For a Büchi automaton with `n` states, at most `2n` names are needed.
//! Every name `i` induces a Rabin pair: a run is accepting iff for some name
//! the trees without that name are visited only finitely often while trees
//! in which the node with that name is marked are visited infinitely often.
//!
//! [`LazyRabinAutomaton`] computes the successors of a tree only when they
//! are requested, while [`EagerRabinAutomaton`] explores all reachable trees
//! under all letters up front. Both accept the same language.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use bitvec::prelude::*;
use log::debug;

use crate::{AutomatonError, MAX_EAGER_PROPOSITIONS, buchi::BuchiAutomaton, ltl::Lasso};

/// Deterministic automaton with Rabin acceptance over letters given as
/// bitmasks of atomic propositions
pub trait DeterministicAutomaton: Send {
    /// The initial state
    fn initial_state(&self) -> usize;

    /// Successor of `state` under `letter`
    ///
    /// Lazy implementations create the successor on the first request.
    fn successor(&mut self, state: usize, letter: u64) -> usize;

    /// Number of states created so far
    fn num_states(&self) -> usize;

    /// Number of Rabin pairs
    fn num_pairs(&self) -> usize;

    /// Whether `state` belongs to the set that must be visited finitely often
    /// for `pair`
    fn is_fin(&self, state: usize, pair: usize) -> bool;

    /// Whether `state` belongs to the set that must be visited infinitely
    /// often for `pair`
    fn is_inf(&self, state: usize, pair: usize) -> bool;

    /// Check whether the automaton accepts an ultimately periodic word
    fn accepts_lasso(&mut self, lasso: &Lasso) -> bool {
        let mut state = self.initial_state();
        for &letter in lasso.prefix() {
            state = self.successor(state, letter);
        }

        // states visited during every traversal of the cycle, until the
        // state at the beginning of a traversal repeats
        let mut round_of: HashMap<usize, usize> = HashMap::new();
        let mut rounds: Vec<Vec<usize>> = Vec::new();
        let first_repeated = loop {
            if let Some(&r) = round_of.get(&state) {
                break r;
            }
            round_of.insert(state, rounds.len());
            let mut visited = Vec::with_capacity(lasso.cycle().len());
            for &letter in lasso.cycle() {
                visited.push(state);
                state = self.successor(state, letter);
            }
            rounds.push(visited);
        };

        let infinite = rounds[first_repeated..]
            .iter()
            .flatten()
            .copied()
            .collect::<HashSet<_>>();
        (0..self.num_pairs()).any(|pair| {
            infinite.iter().all(|&q| !self.is_fin(q, pair))
                && infinite.iter().any(|&q| self.is_inf(q, pair))
        })
    }
}

/// Translate a letter over the original propositions into a letter over the
/// propositions of the canonical formula
fn translate(mapping: &[usize], letter: u64) -> u64 {
    mapping
        .iter()
        .enumerate()
        .filter(|(_, original)| **original < 64 && letter >> **original & 1 == 1)
        .fold(0, |acc, (i, _)| acc | 1 << i)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SafraNode {
    name: usize,
    /// Sorted Büchi states
    label: Arc<[usize]>,
    marked: bool,
    /// Children, from oldest to youngest
    children: Vec<SafraNode>,
}

impl SafraNode {
    fn visit(&self, f: &mut impl FnMut(&SafraNode)) {
        f(self);
        for child in &self.children {
            child.visit(f);
        }
    }
}

/// A Safra tree, `None` for the empty tree
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SafraTree(Option<SafraNode>);

/// Names present and marked in a tree
#[derive(Debug, Clone, PartialEq, Eq)]
struct RabinMarks {
    present: BitVec,
    marked: BitVec,
}

impl RabinMarks {
    fn of(tree: &SafraTree, num_pairs: usize) -> Self {
        let mut present = bitvec![0; num_pairs];
        let mut marked = bitvec![0; num_pairs];
        if let Some(root) = &tree.0 {
            root.visit(&mut |node| {
                if let Some(pair) = node.name.checked_sub(1).filter(|p| *p < num_pairs) {
                    present.set(pair, true);
                    marked.set(pair, node.marked);
                }
            });
        }
        Self { present, marked }
    }
}

/// Shares equal label sets between Safra trees
#[derive(Debug, Default)]
struct LabelInterner {
    labels: HashSet<Arc<[usize]>>,
    reused: usize,
}

impl LabelInterner {
    fn intern(&mut self, label: &Arc<[usize]>) -> Arc<[usize]> {
        if let Some(shared) = self.labels.get(label) {
            self.reused += 1;
            return shared.clone();
        }
        self.labels.insert(label.clone());
        label.clone()
    }

    fn intern_tree(&mut self, node: &mut SafraNode) {
        node.label = self.intern(&node.label);
        for child in &mut node.children {
            self.intern_tree(child);
        }
    }
}

/// Rabin automaton whose states are computed on demand
#[derive(Debug)]
pub struct LazyRabinAutomaton {
    buchi: Arc<BuchiAutomaton>,
    /// Original proposition of every proposition of the Büchi automaton
    mapping: Vec<usize>,
    num_pairs: usize,
    trees: Vec<SafraTree>,
    marks: Vec<RabinMarks>,
    index: HashMap<SafraTree, usize>,
    /// Memoized successors by state and translated letter
    transitions: HashMap<(usize, u64), usize>,
    interner: Option<LabelInterner>,
}

impl LazyRabinAutomaton {
    /// Determinize `buchi`
    ///
    /// Proposition `i` of the Büchi automaton corresponds to bit `mapping[i]`
    /// of the letters passed to [`DeterministicAutomaton::successor`]. If
    /// `canonical_singletons` is set, equal label sets of Safra trees share
    /// one allocation.
    pub fn new(buchi: Arc<BuchiAutomaton>, mapping: Vec<usize>, canonical_singletons: bool) -> Self {
        let num_pairs = 2 * buchi.num_states();
        let mut automaton = Self {
            num_pairs,
            mapping,
            trees: Vec::new(),
            marks: Vec::new(),
            index: HashMap::new(),
            transitions: HashMap::new(),
            interner: canonical_singletons.then(LabelInterner::default),
            buchi,
        };

        let initial = SafraNode {
            name: 1,
            label: Arc::from([automaton.buchi.initial_state()]),
            marked: false,
            children: Vec::new(),
        };
        automaton.insert(SafraTree(Some(initial)));
        automaton
    }

    fn insert(&mut self, tree: SafraTree) -> usize {
        if let Some(&i) = self.index.get(&tree) {
            return i;
        }
        let i = self.trees.len();
        self.marks.push(RabinMarks::of(&tree, self.num_pairs));
        self.index.insert(tree.clone(), i);
        self.trees.push(tree);
        i
    }

    /// Successor under a letter over the propositions of the Büchi automaton
    fn step(&mut self, state: usize, letter: u64) -> usize {
        if let Some(&t) = self.transitions.get(&(state, letter)) {
            return t;
        }
        let tree = self.successor_tree(state, letter);
        let t = self.insert(tree);
        self.transitions.insert((state, letter), t);
        t
    }

    fn successor_tree(&mut self, state: usize, letter: u64) -> SafraTree {
        let Some(root) = &self.trees[state].0 else {
            return SafraTree(None);
        };
        let mut root = root.clone();

        let mut used = bitvec![0; self.num_pairs + 1];
        used.set(0, true);
        root.visit(&mut |node| {
            if node.name < used.len() {
                used.set(node.name, true);
            }
        });

        self.spawn(&mut root, &mut used);
        self.advance(&mut root, letter);
        merge_horizontally(&mut root, &HashSet::new());
        if root.label.is_empty() {
            return SafraTree(None);
        }
        remove_empty(&mut root);
        merge_vertically(&mut root);

        if let Some(interner) = &mut self.interner {
            interner.intern_tree(&mut root);
        }
        SafraTree(Some(root))
    }

    /// Unmark all nodes and give every node with accepting states a new
    /// youngest child labelled with these states
    fn spawn(&self, node: &mut SafraNode, used: &mut BitVec) {
        node.marked = false;
        for child in &mut node.children {
            self.spawn(child, used);
        }

        let accepting = node
            .label
            .iter()
            .copied()
            .filter(|&q| self.buchi.is_accepting(q))
            .collect::<Arc<[usize]>>();
        if !accepting.is_empty() {
            let name = match used.first_zero() {
                Some(name) => {
                    used.set(name, true);
                    name
                }
                None => {
                    used.push(true);
                    used.len() - 1
                }
            };
            node.children.push(SafraNode {
                name,
                label: accepting,
                marked: false,
                children: Vec::new(),
            });
        }
    }

    /// Replace every label by the set of its successors
    fn advance(&self, node: &mut SafraNode, letter: u64) {
        let mut label = node
            .label
            .iter()
            .flat_map(|&q| self.buchi.successors(q, letter))
            .collect::<Vec<_>>();
        label.sort_unstable();
        label.dedup();
        node.label = label.into();

        for child in &mut node.children {
            self.advance(child, letter);
        }
    }

    /// Number of label sets shared between trees
    pub fn reused_labels(&self) -> usize {
        self.interner.as_ref().map_or(0, |i| i.reused)
    }

    /// The underlying Büchi automaton
    pub fn buchi(&self) -> &BuchiAutomaton {
        &self.buchi
    }
}

/// Remove states that also belong to an older sibling (of the node or one of
/// its ancestors)
fn merge_horizontally(node: &mut SafraNode, forbidden: &HashSet<usize>) {
    if node.label.iter().any(|q| forbidden.contains(q)) {
        node.label = node
            .label
            .iter()
            .copied()
            .filter(|q| !forbidden.contains(q))
            .collect();
    }

    let mut taken = forbidden.clone();
    for child in &mut node.children {
        merge_horizontally(child, &taken);
        taken.extend(child.label.iter().copied());
    }
}

/// Remove nodes with empty labels
fn remove_empty(node: &mut SafraNode) {
    node.children.retain(|child| !child.label.is_empty());
    for child in &mut node.children {
        remove_empty(child);
    }
}

/// Remove the descendants of nodes whose children cover the whole label and
/// mark these nodes
fn merge_vertically(node: &mut SafraNode) {
    // labels of siblings are disjoint subsets of the parent label
    let covered = node.children.iter().map(|c| c.label.len()).sum::<usize>();
    if !node.children.is_empty() && covered == node.label.len() {
        node.children.clear();
        node.marked = true;
        return;
    }
    for child in &mut node.children {
        merge_vertically(child);
    }
}

impl DeterministicAutomaton for LazyRabinAutomaton {
    fn initial_state(&self) -> usize {
        0
    }

    fn successor(&mut self, state: usize, letter: u64) -> usize {
        let letter = translate(&self.mapping, letter);
        self.step(state, letter)
    }

    fn num_states(&self) -> usize {
        self.trees.len()
    }

    fn num_pairs(&self) -> usize {
        self.num_pairs
    }

    fn is_fin(&self, state: usize, pair: usize) -> bool {
        !self.marks[state].present[pair]
    }

    fn is_inf(&self, state: usize, pair: usize) -> bool {
        self.marks[state].marked[pair]
    }
}

/// Rabin automaton with a complete transition table
#[derive(Debug, Clone, PartialEq)]
pub struct EagerRabinAutomaton {
    mapping: Vec<usize>,
    num_pairs: usize,
    /// Successor of every state under every translated letter
    table: Vec<Box<[usize]>>,
    marks: Vec<RabinMarks>,
}

impl EagerRabinAutomaton {
    /// Explore all states of `lazy` reachable under any letter
    ///
    /// Fails if the alphabet has more than `2^MAX_EAGER_PROPOSITIONS`
    /// letters.
    pub fn new(mut lazy: LazyRabinAutomaton) -> Result<Self, AutomatonError> {
        let num_aps = lazy.buchi.num_aps();
        if num_aps > MAX_EAGER_PROPOSITIONS {
            return Err(AutomatonError::TooManyPropositions {
                count: num_aps,
                max: MAX_EAGER_PROPOSITIONS,
            });
        }

        let letters = 1u64 << num_aps;
        let mut table = Vec::new();
        let mut state = 0;
        while state < lazy.trees.len() {
            let row = (0..letters)
                .map(|letter| lazy.step(state, letter))
                .collect::<Box<[usize]>>();
            table.push(row);
            state += 1;
        }
        debug!(
            "Explored Rabin automaton with {} states and {} pairs",
            table.len(),
            lazy.num_pairs
        );

        Ok(Self {
            mapping: lazy.mapping,
            num_pairs: lazy.num_pairs,
            table,
            marks: lazy.marks,
        })
    }
}

impl DeterministicAutomaton for EagerRabinAutomaton {
    fn initial_state(&self) -> usize {
        0
    }

    fn successor(&mut self, state: usize, letter: u64) -> usize {
        self.table[state][translate(&self.mapping, letter) as usize]
    }

    fn num_states(&self) -> usize {
        self.table.len()
    }

    fn num_pairs(&self) -> usize {
        self.num_pairs
    }

    fn is_fin(&self, state: usize, pair: usize) -> bool {
        !self.marks[state].present[pair]
    }

    fn is_inf(&self, state: usize, pair: usize) -> bool {
        self.marks[state].marked[pair]
    }
}
