//! Coin hour burn and distribution.

use serde::{Deserialize, Serialize};

/// How many of the input hours are burned and how the rest is shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourPolicy {
    /// Percent of input hours retained by the network.
    pub fee_percent: u64,
    /// Percent of the spendable hours assigned to the change output.
    pub change_percent: u64,
}

impl Default for HourPolicy {
    fn default() -> Self {
        HourPolicy {
            fee_percent: 50,
            change_percent: 90,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HourSplit {
    pub change: u64,
    pub destination: u64,
}

impl HourSplit {
    pub fn total(&self) -> u64 {
        self.change + self.destination
    }
}

fn percent_of(value: u64, percent: u64) -> u64 {
    (u128::from(value) * u128::from(percent) / 100) as u64
}

impl HourPolicy {
    /// Hours left after the burn. The burn is rounded up, so 101 hours at
    /// 50% leave 50 spendable.
    pub fn spendable(&self, total_hours: u64) -> u64 {
        percent_of(total_hours, 100 - self.fee_percent.min(100))
    }

    /// Divides the spendable hours between change and destination. Without
    /// a change output the destination receives all of them. Floor division
    /// on both shares loses at most one hour.
    pub fn split(&self, total_hours: u64, has_change: bool) -> HourSplit {
        let spendable = self.spendable(total_hours);
        if !has_change {
            return HourSplit {
                change: 0,
                destination: spendable,
            };
        }
        let change_percent = self.change_percent.min(100);
        HourSplit {
            change: percent_of(spendable, change_percent),
            destination: percent_of(spendable, 100 - change_percent),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_of_the_hours_are_burned() {
        let policy = HourPolicy::default();
        assert_eq!(policy.spendable(100), 50);
        assert_eq!(policy.spendable(101), 50);
        assert_eq!(policy.spendable(1), 0);
        assert_eq!(policy.spendable(0), 0);
    }

    #[test]
    fn change_takes_ninety_percent() {
        let split = HourPolicy::default().split(100, true);
        assert_eq!(split, HourSplit { change: 45, destination: 5 });
    }

    #[test]
    fn destination_takes_everything_without_change() {
        let split = HourPolicy::default().split(100, false);
        assert_eq!(split, HourSplit { change: 0, destination: 50 });
    }

    #[test]
    fn rounding_drift_is_at_most_one_hour() {
        let policy = HourPolicy::default();
        for hours in 0..2_000u64 {
            let split = policy.split(hours, true);
            let spendable = policy.spendable(hours);
            assert!(split.total() <= spendable);
            assert!(spendable - split.total() <= 1, "drift at {hours}");
        }
    }

    #[test]
    fn huge_hour_counts_do_not_overflow() {
        let policy = HourPolicy::default();
        assert_eq!(policy.spendable(u64::MAX), u64::MAX / 2);
    }
}
