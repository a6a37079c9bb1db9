//! Category selection by tabular Q-learning.
//!
//! The engine asks the policy which category to place next. The state is the
//! multiset of remaining demand; the value table lives for one engine run.

use std::collections::HashMap;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::PolicyConfig;
use crate::constants::EPSILON;

/// Sorted `(category index, remaining)` pairs with remaining > 0.
pub type State = Vec<(usize, u32)>;

/// Outcome of one placement attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reward {
    /// Region placed and validated.
    Placed,
    /// No contiguous region of the requested size.
    NotFound,
    /// Region placed but cut off from free space (or not a single polygon).
    Disconnected,
}

impl Reward {
    pub fn value(self) -> f64 {
        match self {
            Reward::Placed => 2.0,
            Reward::NotFound => -1.0,
            Reward::Disconnected => -2.0,
        }
    }
}

/// Build the state key from per-category remaining counts.
pub fn state_of(remaining: &[u32]) -> State {
    remaining
        .iter()
        .enumerate()
        .filter(|(_, &n)| n > 0)
        .map(|(k, &n)| (k, n))
        .collect()
}

/// Epsilon-greedy policy over a `(state, action)` value table.
#[derive(Debug, Clone)]
pub struct HeuristicPolicy {
    q: HashMap<(State, usize), f64>,
    config: PolicyConfig,
}

impl HeuristicPolicy {
    pub fn new(config: PolicyConfig) -> Self {
        Self {
            q: HashMap::new(),
            config,
        }
    }

    /// Learned value, 0 when never visited.
    pub fn value(&self, state: &State, action: usize) -> f64 {
        self.q
            .get(&(state.clone(), action))
            .copied()
            .unwrap_or(0.0)
    }

    /// Number of visited `(state, action)` pairs.
    pub fn len(&self) -> usize {
        self.q.len()
    }

    pub fn is_empty(&self) -> bool {
        self.q.is_empty()
    }

    fn best_value(&self, state: &State) -> f64 {
        state
            .iter()
            .map(|&(a, _)| self.value(state, a))
            .fold(None, |best: Option<f64>, v| Some(best.map_or(v, |b| b.max(v))))
            .unwrap_or(0.0)
    }

    /// Pick a category from `actions`. Returns `None` when `actions` is empty.
    pub fn choose<R: Rng + ?Sized>(
        &self,
        state: &State,
        actions: &[usize],
        rng: &mut R,
    ) -> Option<usize> {
        if actions.is_empty() {
            return None;
        }
        if rng.gen::<f64>() < self.config.epsilon {
            return actions.choose(rng).copied();
        }
        let best = actions
            .iter()
            .map(|&a| self.value(state, a))
            .fold(f64::NEG_INFINITY, f64::max);
        let ties: Vec<usize> = actions
            .iter()
            .copied()
            .filter(|&a| (self.value(state, a) - best).abs() <= EPSILON)
            .collect();
        ties.choose(rng).copied()
    }

    /// One-step Q-learning update. `next` empty means terminal.
    pub fn update(&mut self, state: &State, action: usize, reward: Reward, next: &State) {
        let PolicyConfig { alpha, gamma, .. } = self.config;
        let target = reward.value() + gamma * self.best_value(next);
        let entry = self.q.entry((state.clone(), action)).or_insert(0.0);
        *entry += alpha * (target - *entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn greedy() -> HeuristicPolicy {
        HeuristicPolicy::new(PolicyConfig {
            epsilon: 0.0,
            ..PolicyConfig::default()
        })
    }

    #[test]
    fn state_skips_satisfied_categories() {
        assert_eq!(state_of(&[2, 0, 1]), vec![(0, 2), (2, 1)]);
        assert!(state_of(&[0, 0]).is_empty());
    }

    #[test]
    fn terminal_update_uses_reward_only() {
        let mut policy = greedy();
        let s = state_of(&[1]);
        policy.update(&s, 0, Reward::Placed, &Vec::new());
        // 0 + 0.5 * (2 + 0 - 0)
        assert!((policy.value(&s, 0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn bootstraps_from_next_state() {
        let mut policy = greedy();
        let next = state_of(&[0, 1]);
        policy.update(&next, 1, Reward::Placed, &Vec::new());
        let s = state_of(&[1, 1]);
        policy.update(&s, 0, Reward::NotFound, &next);
        // 0.5 * (-1 + 0.9 * 1.0)
        assert!((policy.value(&s, 0) + 0.05).abs() < 1e-12);
    }

    #[test]
    fn greedy_prefers_rewarded_action() {
        let mut policy = greedy();
        let s = state_of(&[3, 3]);
        policy.update(&s, 0, Reward::Disconnected, &s);
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..20 {
            assert_eq!(policy.choose(&s, &[0, 1], &mut rng), Some(1));
        }
    }

    #[test]
    fn ties_are_broken_randomly() {
        let policy = greedy();
        let s = state_of(&[1, 1, 1]);
        let mut rng = StdRng::seed_from_u64(10);
        let mut picked = [false; 3];
        for _ in 0..100 {
            let a = policy.choose(&s, &[0, 1, 2], &mut rng).unwrap();
            picked[a] = true;
        }
        assert!(picked.iter().all(|&p| p));
    }

    #[test]
    fn no_actions_no_choice() {
        let policy = greedy();
        let mut rng = StdRng::seed_from_u64(11);
        assert_eq!(policy.choose(&Vec::new(), &[], &mut rng), None);
    }
}
