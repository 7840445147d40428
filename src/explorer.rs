//! Epsilon-greedy exploration.
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Epsilon-greedy explorer with a linearly decaying schedule.
///
/// The schedule is a pure function of the global optimization-step counter,
/// which is owned by the caller: `epsilon(step) = max(0, init - step *
/// decay)`.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct EpsilonGreedy {
    /// Exploration probability at step 0.
    pub eps_init: f64,

    /// Linear decay per step.
    pub decay: f64,
}

impl Default for EpsilonGreedy {
    fn default() -> Self {
        Self {
            eps_init: 0.2,
            decay: 0.000002,
        }
    }
}

impl EpsilonGreedy {
    /// Sets the initial exploration probability.
    pub fn eps_init(mut self, v: f64) -> Self {
        self.eps_init = v;
        self
    }

    /// Sets the linear decay per step.
    pub fn decay(mut self, v: f64) -> Self {
        self.decay = v;
        self
    }

    /// Exploration probability at the given step.
    ///
    /// The ramp hits the floor exactly: a residual smaller than half a
    /// decay step is rounding noise of the subtraction, not a schedule
    /// value.
    pub fn epsilon(&self, step: usize) -> f64 {
        let e = self.eps_init - step as f64 * self.decay;
        if e < 0.5 * self.decay {
            0.0
        } else {
            e
        }
    }

    /// Chooses an action from the action values.
    ///
    /// With probability `epsilon(step)` a uniformly random index is chosen;
    /// otherwise the stable argmax of `q`.
    pub fn action(&self, q: &[f32], step: usize, rng: &mut impl Rng) -> usize {
        if rng.gen::<f64>() < self.epsilon(step) {
            rng.gen_range(0..q.len())
        } else {
            stable_argmax(q)
        }
    }
}

/// Index of the maximum value, ties broken by the lowest index.
pub fn stable_argmax(q: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in q.iter().enumerate().skip(1) {
        if v > q[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::SmallRng, SeedableRng};

    #[test]
    fn epsilon_is_monotonically_non_increasing() {
        let e = EpsilonGreedy::default();
        let mut prev = e.epsilon(0);
        for step in (0..200_000).step_by(1000) {
            let cur = e.epsilon(step);
            assert!(cur <= prev);
            assert!(cur >= 0.0);
            prev = cur;
        }
    }

    #[test]
    fn epsilon_reaches_the_floor_exactly() {
        let e = EpsilonGreedy::default().eps_init(0.2).decay(0.000002);
        assert_eq!(e.epsilon(100_000), 0.0);
        assert_eq!(e.epsilon(100_001), 0.0);
    }

    #[test]
    fn last_ramp_step_is_still_positive() {
        // Snapping to the floor must not swallow real schedule values.
        let e = EpsilonGreedy::default().eps_init(0.2).decay(0.000002);
        assert!(e.epsilon(99_999) > 0.0);
        assert!((e.epsilon(99_999) - 0.000002).abs() < 1e-9);
    }

    #[test]
    fn argmax_breaks_ties_with_lowest_index() {
        assert_eq!(stable_argmax(&[1.0, 3.0, 3.0, 2.0]), 1);
        assert_eq!(stable_argmax(&[5.0, 5.0]), 0);
        assert_eq!(stable_argmax(&[-1.0]), 0);
    }

    #[test]
    fn greedy_action_after_decay_floor() {
        // At the floor the explorer is fully greedy.
        let e = EpsilonGreedy::default();
        let mut rng = SmallRng::seed_from_u64(0);
        for _ in 0..100 {
            assert_eq!(e.action(&[0.1, 0.9, 0.5], 100_000, &mut rng), 1);
        }
    }

    #[test]
    fn random_action_stays_in_range() {
        let e = EpsilonGreedy::default().eps_init(1.0).decay(0.0);
        let mut rng = SmallRng::seed_from_u64(1);
        for _ in 0..100 {
            assert!(e.action(&[0.0; 7], 0, &mut rng) < 7);
        }
    }
}
