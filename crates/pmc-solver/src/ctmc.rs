//! Transient analysis of continuous-time Markov chains
//!
//! All computations reduce to sums `Σ_k c(k) P^k v` over the powers of the
//! uniformized matrix `P = I + Q / q`, where the coefficients are derived
//! from the Poisson distribution with rate `q t` (see [`crate::foxglynn`]).

use bitvec::prelude::*;
use log::debug;

use crate::{
    Deadline, Direction, SolverError, SolverOptions,
    foxglynn::FoxGlynn,
    iteration::{Bellman, iterate_steps},
    precompute::{and_not, prob0a},
    reachability::check_probabilities,
    sparse::{Predecessors, SparseMatrix, SparseMatrixBuilder},
};

/// Factor by which the uniformization rate exceeds the maximal exit rate
const UNIFORMIZATION_FACTOR: f64 = 1.02;

/// Total outgoing rate of every state
pub fn exit_rates(rates: &SparseMatrix) -> Vec<f64> {
    (0..rates.num_states())
        .map(|s| rates.choices(s).map(|c| rates.row_sum(c)).sum())
        .collect()
}

/// Uniformize a rate matrix
///
/// Returns the stochastic matrix `P = I + Q / q` together with the
/// uniformization rate `q`, which is slightly larger than the maximal exit
/// rate (or 1 if no state has outgoing rates).
pub fn uniformize(rates: &SparseMatrix) -> (SparseMatrix, f64) {
    let exits = exit_rates(rates);
    let max_exit = exits.iter().copied().fold(0.0, f64::max);
    let q = if max_exit > 0.0 {
        UNIFORMIZATION_FACTOR * max_exit
    } else {
        1.0
    };

    let mut builder = SparseMatrixBuilder::new();
    for (state, exit) in exits.iter().enumerate() {
        builder.new_state();
        let entries = rates
            .choices(state)
            .flat_map(|c| rates.row(c))
            .map(|(t, r)| (t, r / q))
            .chain(std::iter::once((state, 1.0 - exit / q)));
        builder.add_choice(entries);
    }

    (builder.build(), q)
}

fn validate_time(time: f64) -> Result<(), SolverError> {
    if !time.is_finite() || time < 0.0 {
        return Err(SolverError::InvalidInput(format!(
            "time bound must be finite and non-negative, got {time}"
        )));
    }
    Ok(())
}

/// Compute `Σ_k coefficients[k] x_k` where `x_0 = init` and
/// `x_{k+1}(s) = Σ_t P(s, t) x_k(t)` for the `active` states, while inactive
/// states keep their initial value
fn power_series(
    uniformized: &SparseMatrix,
    active: &[usize],
    init: Vec<f64>,
    coefficients: &[f64],
    options: &SolverOptions,
    deadline: &Deadline,
) -> Result<Vec<f64>, SolverError> {
    let c0 = coefficients.first().copied().unwrap_or(0.0);
    let mut result = init.iter().map(|v| c0 * v).collect::<Vec<_>>();
    let mut x = init;
    let bellman = Bellman {
        matrix: uniformized,
        offsets: None,
        direction: Direction::Maximize,
    };

    for &c in coefficients.iter().skip(1) {
        iterate_steps(&bellman, active, &mut x, 1, options.parallel, deadline)?;
        if c != 0.0 {
            for (r, v) in result.iter_mut().zip(&x) {
                *r += c * v;
            }
        }
    }

    Ok(result)
}

fn poisson_coefficients(q: f64, time: f64, options: &SolverOptions) -> Result<FoxGlynn, SolverError> {
    let fg = FoxGlynn::new(q * time, options.tolerance)?;
    debug!(
        "Uniformization with rate {q} for time {time}: {} iterations",
        fg.right()
    );
    Ok(fg)
}

/// Probability of `phi U<=time psi`
pub fn bounded_until(
    rates: &SparseMatrix,
    predecessors: &Predecessors,
    phi: &BitSlice,
    psi: &BitSlice,
    time: f64,
    options: &SolverOptions,
    deadline: &Deadline,
) -> Result<Vec<f64>, SolverError> {
    validate_time(time)?;

    let no = prob0a(predecessors, phi, psi);
    let active = and_not(&and_not(phi, psi), &no)
        .iter_ones()
        .collect::<Vec<_>>();
    let init = psi
        .iter()
        .by_vals()
        .map(|p| if p { 1.0 } else { 0.0 })
        .collect::<Vec<_>>();

    let (uniformized, q) = uniformize(rates);
    let fg = poisson_coefficients(q, time, options)?;
    let coefficients = (0..=fg.right()).map(|k| fg.probability(k)).collect::<Vec<_>>();

    let mut x = power_series(&uniformized, &active, init, &coefficients, options, deadline)?;
    check_probabilities(&mut x, options.tolerance)?;
    Ok(x)
}

/// Propagate the values `init` backwards over `time` through `phi` states
///
/// Values of states outside of `phi` are 0. Applied to the values of
/// `phi U<=(t2 - t1) psi` this yields `phi U[t1, t2] psi`.
pub fn restricted_transient(
    rates: &SparseMatrix,
    phi: &BitSlice,
    mut init: Vec<f64>,
    time: f64,
    options: &SolverOptions,
    deadline: &Deadline,
) -> Result<Vec<f64>, SolverError> {
    validate_time(time)?;

    for s in phi.iter_zeros() {
        init[s] = 0.0;
    }
    let active = phi.iter_ones().collect::<Vec<_>>();

    let (uniformized, q) = uniformize(rates);
    let fg = poisson_coefficients(q, time, options)?;
    let coefficients = (0..=fg.right()).map(|k| fg.probability(k)).collect::<Vec<_>>();

    let mut x = power_series(&uniformized, &active, init, &coefficients, options, deadline)?;
    check_probabilities(&mut x, options.tolerance)?;
    Ok(x)
}

/// Expected state reward at time `time`
pub fn instantaneous_rewards(
    rates: &SparseMatrix,
    state_rewards: &[f64],
    time: f64,
    options: &SolverOptions,
    deadline: &Deadline,
) -> Result<Vec<f64>, SolverError> {
    validate_time(time)?;

    let (uniformized, q) = uniformize(rates);
    let fg = poisson_coefficients(q, time, options)?;
    let coefficients = (0..=fg.right()).map(|k| fg.probability(k)).collect::<Vec<_>>();
    let all = (0..rates.num_states()).collect::<Vec<_>>();

    power_series(
        &uniformized,
        &all,
        state_rewards.to_vec(),
        &coefficients,
        options,
        deadline,
    )
}

/// Expected reward accumulated up to time `time`
///
/// `reward_rates` are earned per time unit spent in a state.
pub fn cumulative_rewards(
    rates: &SparseMatrix,
    reward_rates: &[f64],
    time: f64,
    options: &SolverOptions,
    deadline: &Deadline,
) -> Result<Vec<f64>, SolverError> {
    validate_time(time)?;
    if time == 0.0 {
        return Ok(vec![0.0; rates.num_states()]);
    }

    let (uniformized, q) = uniformize(rates);
    let fg = poisson_coefficients(q, time, options)?;

    // c(k) = P(N > k) / q for a Poisson distributed N
    let mut mass = 0.0;
    let coefficients = (0..=fg.right())
        .map(|k| {
            mass += fg.probability(k);
            (1.0 - mass).max(0.0) / q
        })
        .collect::<Vec<_>>();
    let all = (0..rates.num_states()).collect::<Vec<_>>();

    power_series(
        &uniformized,
        &all,
        reward_rates.to_vec(),
        &coefficients,
        options,
        deadline,
    )
}
