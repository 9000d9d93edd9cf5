//! Reward vectors of an explored state space

use pmc_model::{ModelType, RewardStructure, expressions::Action};

use crate::{BuildError, explorer::Transition, state::StateValuation};

/// Rewards of one reward structure evaluated on the explored states
///
/// `choice_rewards` holds, for every choice of the state space, the reward
/// collected when the choice is taken: the state reward plus the (expected)
/// transition reward. For CTMCs there is one choice per state and its entry
/// is the reward rate of the state, i.e., the state reward plus the
/// transition rewards weighted by their rates.
#[derive(Debug, Clone, PartialEq)]
pub struct RewardVectors {
    name: String,
    state_rewards: Vec<f64>,
    choice_rewards: Vec<f64>,
}

impl RewardVectors {
    /// Name of the reward structure
    pub fn name(&self) -> &str {
        &self.name
    }

    /// State reward of every state
    pub fn state_rewards(&self) -> &[f64] {
        &self.state_rewards
    }

    /// Reward of every choice
    pub fn choice_rewards(&self) -> &[f64] {
        &self.choice_rewards
    }
}

/// Accumulates the [`RewardVectors`] of a reward structure during exploration
pub(crate) struct RewardEvaluator<'a> {
    structure: &'a RewardStructure,
    model_type: ModelType,
    state_rewards: Vec<f64>,
    choice_rewards: Vec<f64>,
}

impl<'a> RewardEvaluator<'a> {
    pub fn new(structure: &'a RewardStructure, model_type: ModelType) -> Self {
        Self {
            structure,
            model_type,
            state_rewards: Vec::new(),
            choice_rewards: Vec::new(),
        }
    }

    fn check(&self, valuation: &StateValuation<'_>, value: f64) -> Result<f64, BuildError> {
        if !value.is_finite() || value < 0.0 {
            return Err(BuildError::InvalidReward {
                structure: self.structure.name().to_string(),
                state: valuation.display(),
                value,
            });
        }
        Ok(value)
    }

    fn evaluation_error(
        &self,
        valuation: &StateValuation<'_>,
        error: pmc_model::expressions::EvaluationError,
    ) -> BuildError {
        BuildError::Evaluation {
            context: format!(
                "reward structure \"{}\" in state {}",
                self.structure.name(),
                valuation.display()
            ),
            error,
        }
    }

    fn state_reward(&self, valuation: &StateValuation<'_>) -> Result<f64, BuildError> {
        let mut total = 0.0;
        for reward in self.structure.state_rewards() {
            let applies = reward
                .guard()
                .evaluate_bool(valuation)
                .map_err(|e| self.evaluation_error(valuation, e))?;
            if applies {
                total += reward
                    .value()
                    .evaluate_real(valuation)
                    .map_err(|e| self.evaluation_error(valuation, e))?;
            }
        }
        self.check(valuation, total)
    }

    fn transition_reward(
        &self,
        valuation: &StateValuation<'_>,
        action: Option<&Action>,
    ) -> Result<f64, BuildError> {
        let mut total = 0.0;
        for reward in self.structure.transition_rewards() {
            if reward.action() != action {
                continue;
            }
            let applies = reward
                .guard()
                .evaluate_bool(valuation)
                .map_err(|e| self.evaluation_error(valuation, e))?;
            if applies {
                total += reward
                    .value()
                    .evaluate_real(valuation)
                    .map_err(|e| self.evaluation_error(valuation, e))?;
            }
        }
        self.check(valuation, total)
    }

    /// Record a deadlock state that received a self-loop
    pub fn add_deadlock(&mut self, valuation: &StateValuation<'_>) -> Result<(), BuildError> {
        let r = self.state_reward(valuation)?;
        self.state_rewards.push(r);
        self.choice_rewards.push(r);
        Ok(())
    }

    /// Record a state together with its enabled transitions
    ///
    /// Must be called in the order in which the choices were added to the
    /// matrix.
    pub fn add_state(
        &mut self,
        valuation: &StateValuation<'_>,
        transitions: &[Transition],
    ) -> Result<(), BuildError> {
        let r = self.state_reward(valuation)?;
        self.state_rewards.push(r);

        if !self.structure.has_transition_rewards() {
            match self.model_type {
                ModelType::Mdp => self.choice_rewards.extend(transitions.iter().map(|_| r)),
                ModelType::Dtmc | ModelType::Ctmc => self.choice_rewards.push(r),
            }
            return Ok(());
        }

        match self.model_type {
            ModelType::Dtmc => {
                let k = transitions.len() as f64;
                let mut expected = 0.0;
                for t in transitions {
                    expected += self.transition_reward(valuation, t.action.as_ref())? / k;
                }
                self.choice_rewards.push(r + expected);
            }
            ModelType::Ctmc => {
                let mut rate = 0.0;
                for t in transitions {
                    rate += t.total_weight() * self.transition_reward(valuation, t.action.as_ref())?;
                }
                self.choice_rewards.push(r + rate);
            }
            ModelType::Mdp => {
                for t in transitions {
                    let tr = self.transition_reward(valuation, t.action.as_ref())?;
                    self.choice_rewards.push(r + tr);
                }
            }
        }
        Ok(())
    }

    pub fn finish(self) -> RewardVectors {
        RewardVectors {
            name: self.structure.name().to_string(),
            state_rewards: self.state_rewards,
            choice_rewards: self.choice_rewards,
        }
    }
}
