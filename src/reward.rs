use tracing::warn;

use crate::catalog::ActionCatalog;
use crate::model::PointTotals;

pub const DEFAULT_REWARD_THRESHOLD: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateResult {
    pub new_total: i64,
    pub new_cycle: i64,
    pub reward_achieved: bool,
}

impl UpdateResult {
    pub fn totals(&self) -> PointTotals {
        PointTotals {
            total_points: self.new_total,
            cycle_points: self.new_cycle,
        }
    }
}

/// Applies action points to a child's running totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewardAccumulator {
    threshold: i64,
}

impl Default for RewardAccumulator {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_REWARD_THRESHOLD,
        }
    }
}

impl RewardAccumulator {
    /// `threshold` must be positive; the config layer rejects anything else.
    pub fn new(threshold: i64) -> Self {
        debug_assert!(threshold > 0, "reward threshold must be positive");
        Self { threshold }
    }

    pub fn threshold(&self) -> i64 {
        self.threshold
    }

    /// Warn when an action in `catalog` alone reaches the threshold, since a
    /// single subtraction then leaves the cycle at or above it. Returns whether
    /// it warned.
    pub fn check_catalog(&self, catalog: &ActionCatalog, household: &str) -> bool {
        let max_points = catalog.max_points().unwrap_or(0);
        if max_points < self.threshold {
            return false;
        }
        warn!(
            target: "gohoubi",
            event = "config_warning",
            household,
            reward_threshold = self.threshold,
            max_action_points = max_points,
            msg = "a single action can cross the reward threshold more than once"
        );
        true
    }

    /// The threshold is subtracted once per application. An action worth at
    /// least the threshold can therefore leave `new_cycle >= threshold`.
    pub fn apply_action(&self, current: PointTotals, points: i64) -> UpdateResult {
        let new_total = current.total_points + points;
        let raw_cycle = current.cycle_points + points;
        let reward_achieved = raw_cycle >= self.threshold;
        let new_cycle = if reward_achieved {
            raw_cycle - self.threshold
        } else {
            raw_cycle
        };
        UpdateResult {
            new_total,
            new_cycle,
            reward_achieved,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn totals(total: i64, cycle: i64) -> PointTotals {
        PointTotals {
            total_points: total,
            cycle_points: cycle,
        }
    }

    #[test]
    fn catalog_check_flags_actions_worth_a_whole_cycle() {
        let acc = RewardAccumulator::new(10);
        assert!(!acc.check_catalog(&ActionCatalog::from_pairs([("宿題", 3), ("お手伝い", 9)]), "hh"));
        assert!(acc.check_catalog(&ActionCatalog::from_pairs([("宿題", 3), ("大掃除", 10)]), "hh"));
        assert!(!acc.check_catalog(&ActionCatalog::default(), "hh"));
    }

    #[test]
    fn crossing_at_exact_threshold_resets_to_zero() {
        let acc = RewardAccumulator::new(100);
        let result = acc.apply_action(totals(150, 99), 1);
        assert_eq!(result.new_cycle, 0);
        assert_eq!(result.new_total, 151);
        assert!(result.reward_achieved);
    }

    #[test]
    fn crossing_carries_the_overflow() {
        let acc = RewardAccumulator::new(100);
        let result = acc.apply_action(totals(98, 98), 3);
        assert_eq!(result.new_cycle, 1);
        assert!(result.reward_achieved);
    }

    #[test]
    fn below_threshold_accumulates() {
        let acc = RewardAccumulator::default();
        let result = acc.apply_action(totals(0, 0), 1);
        assert_eq!(
            result,
            UpdateResult {
                new_total: 1,
                new_cycle: 1,
                reward_achieved: false
            }
        );
    }

    #[test]
    fn oversized_action_subtracts_only_once() {
        let acc = RewardAccumulator::new(100);
        let result = acc.apply_action(totals(0, 50), 250);
        assert!(result.reward_achieved);
        assert_eq!(result.new_cycle, 200);
        assert_eq!(result.new_total, 250);
    }

    proptest! {
        #[test]
        fn cycle_matches_modulo_for_small_actions(
            threshold in 2i64..500,
            seed_cycle in 0i64..10_000,
            seed_points in 0i64..10_000,
        ) {
            let cycle = seed_cycle % threshold;
            let points = 1 + seed_points % (threshold - 1);
            let acc = RewardAccumulator::new(threshold);
            let result = acc.apply_action(totals(cycle, cycle), points);
            prop_assert_eq!(result.new_cycle, (cycle + points) % threshold);
            prop_assert_eq!(result.reward_achieved, cycle + points >= threshold);
        }

        #[test]
        fn total_never_decreases(steps in proptest::collection::vec(1i64..10, 1..50)) {
            let acc = RewardAccumulator::new(17);
            let mut current = totals(0, 0);
            for points in steps {
                let next = acc.apply_action(current, points);
                prop_assert!(next.new_total > current.total_points);
                prop_assert!(next.new_cycle < 17);
                current = next.totals();
            }
        }
    }
}
