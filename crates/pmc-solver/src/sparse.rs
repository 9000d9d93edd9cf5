//! Sparse matrix with row groups
//!
//! A [`SparseMatrix`] stores, for every state, a group of rows (one row per
//! nondeterministic choice), and for every row the weighted successor states.
//! Markov chains have exactly one row per state. The rows of a DTMC or MDP
//! hold probabilities, the rows of a CTMC hold rates.

use std::ops::Range;

/// Compressed sparse row matrix with row groups
#[derive(Debug, Clone, PartialEq)]
pub struct SparseMatrix {
    /// `row_groups[s]..row_groups[s + 1]` are the choices of state `s`
    row_groups: Vec<usize>,
    /// `rows[c]..rows[c + 1]` are the entries of choice `c`
    rows: Vec<usize>,
    columns: Vec<usize>,
    values: Vec<f64>,
}

impl SparseMatrix {
    /// Number of states (row groups)
    pub fn num_states(&self) -> usize {
        self.row_groups.len() - 1
    }

    /// Number of choices (rows)
    pub fn num_choices(&self) -> usize {
        self.rows.len() - 1
    }

    /// Number of non-zero entries
    pub fn num_transitions(&self) -> usize {
        self.values.len()
    }

    /// Choices of a state
    pub fn choices(&self, state: usize) -> Range<usize> {
        self.row_groups[state]..self.row_groups[state + 1]
    }

    /// Entries `(successor, weight)` of a choice, ordered by successor
    pub fn row(&self, choice: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let range = self.rows[choice]..self.rows[choice + 1];
        self.columns[range.clone()]
            .iter()
            .copied()
            .zip(self.values[range].iter().copied())
    }

    /// Successor states of a choice
    pub fn row_columns(&self, choice: usize) -> &[usize] {
        &self.columns[self.rows[choice]..self.rows[choice + 1]]
    }

    /// Sum of the weights of a choice
    pub fn row_sum(&self, choice: usize) -> f64 {
        self.values[self.rows[choice]..self.rows[choice + 1]].iter().sum()
    }

    /// Weighted sum `Σ weight * x[successor]` over the entries of a choice
    pub fn multiply_row(&self, choice: usize, x: &[f64]) -> f64 {
        self.row(choice).map(|(col, val)| val * x[col]).sum()
    }

    /// Whether every state has exactly one choice
    pub fn is_deterministic(&self) -> bool {
        self.num_states() == self.num_choices()
    }

    /// Successor states over all choices of a state, possibly with duplicates
    pub fn successors(&self, state: usize) -> impl Iterator<Item = usize> + '_ {
        let choices = self.choices(state);
        self.columns[self.rows[choices.start]..self.rows[choices.end]]
            .iter()
            .copied()
    }

    /// Owning state of every choice
    pub fn choice_owners(&self) -> Vec<usize> {
        let mut owners = Vec::with_capacity(self.num_choices());
        for state in 0..self.num_states() {
            owners.extend(self.choices(state).map(|_| state));
        }
        owners
    }

    /// Compute the predecessor relation of the matrix
    pub fn predecessors(&self) -> Predecessors {
        let n = self.num_states();
        let mut counts = vec![0usize; n + 1];
        for &col in &self.columns {
            counts[col + 1] += 1;
        }
        for i in 0..n {
            counts[i + 1] += counts[i];
        }

        let offsets = counts.clone();
        let mut sources = vec![0; self.columns.len()];
        for state in 0..n {
            for succ in self.successors(state) {
                sources[counts[succ]] = state;
                counts[succ] += 1;
            }
        }

        Predecessors { offsets, sources }
    }

    /// Normalize every row to a probability distribution
    ///
    /// Applied to the rate matrix of a CTMC this yields its embedded DTMC.
    /// Rows without any weight become self-loops.
    pub fn normalized(&self) -> SparseMatrix {
        let mut builder = SparseMatrixBuilder::new();
        for state in 0..self.num_states() {
            builder.new_state();
            for choice in self.choices(state) {
                let sum = self.row_sum(choice);
                if sum > 0.0 {
                    builder.add_choice(self.row(choice).map(|(col, val)| (col, val / sum)));
                } else {
                    builder.add_choice([(state, 1.0)]);
                }
            }
        }
        builder.build()
    }
}

/// Predecessor relation of a [`SparseMatrix`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predecessors {
    offsets: Vec<usize>,
    sources: Vec<usize>,
}

impl Predecessors {
    /// States with a transition into `state`, possibly with duplicates
    pub fn of(&self, state: usize) -> &[usize] {
        &self.sources[self.offsets[state]..self.offsets[state + 1]]
    }
}

/// Builder for a [`SparseMatrix`]
///
/// States are added in order by calling [`SparseMatrixBuilder::new_state`],
/// followed by the choices of that state.
///
/// # Example
///
/// ```
/// use pmc_solver::sparse::SparseMatrixBuilder;
///
/// let mut builder = SparseMatrixBuilder::new();
/// builder.new_state();
/// builder.add_choice([(1, 0.25), (0, 0.5), (1, 0.25)]);
/// builder.new_state();
/// builder.add_choice([(1, 1.0)]);
/// let matrix = builder.build();
///
/// assert_eq!(matrix.num_states(), 2);
/// assert_eq!(matrix.row(0).collect::<Vec<_>>(), vec![(0, 0.5), (1, 0.5)]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SparseMatrixBuilder {
    row_groups: Vec<usize>,
    rows: Vec<usize>,
    columns: Vec<usize>,
    values: Vec<f64>,
}

impl SparseMatrixBuilder {
    /// Create a new empty builder
    pub fn new() -> Self {
        Self {
            row_groups: vec![],
            rows: vec![0],
            columns: vec![],
            values: vec![],
        }
    }

    /// Start the row group of the next state
    pub fn new_state(&mut self) {
        self.row_groups.push(self.rows.len() - 1);
    }

    /// Add a choice to the current state
    ///
    /// Entries with the same successor are summed up, entries are stored
    /// ordered by successor.
    pub fn add_choice(&mut self, entries: impl IntoIterator<Item = (usize, f64)>) {
        debug_assert!(!self.row_groups.is_empty(), "choice added before first state");

        let mut entries = entries.into_iter().collect::<Vec<_>>();
        entries.sort_by_key(|(col, _)| *col);

        for (col, val) in entries {
            if self.columns.len() > *self.rows.last().unwrap_or(&0)
                && self.columns.last() == Some(&col)
            {
                if let Some(last) = self.values.last_mut() {
                    *last += val;
                }
                continue;
            }
            self.columns.push(col);
            self.values.push(val);
        }

        self.rows.push(self.columns.len());
    }

    /// Number of states added so far
    pub fn num_states(&self) -> usize {
        self.row_groups.len()
    }

    /// Complete the matrix
    pub fn build(mut self) -> SparseMatrix {
        self.row_groups.push(self.rows.len() - 1);
        debug_assert!(
            self.columns.iter().all(|&c| c < self.row_groups.len() - 1),
            "successor out of range"
        );

        SparseMatrix {
            row_groups: self.row_groups,
            rows: self.rows,
            columns: self.columns,
            values: self.values,
        }
    }
}
