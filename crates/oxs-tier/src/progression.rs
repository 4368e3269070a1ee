//! Conversion progression curve.
//!
//! Maps staking duration in weeks to a conversion rate in basis points
//! (10_000 = 100%). The curve is a knot table with one entry every 13 weeks,
//! linearly interpolated between knots and saturating at week 104.

use oxs_core::constants::{MAX_PROGRESSION_RANGE, MAX_PROGRESSION_WEEK};
use oxs_core::error::TierError;

/// Weeks between consecutive knots.
pub const PROGRESSION_STEP_WEEKS: u32 = 13;

/// Knot values for weeks 0, 13, 26, ..., 104.
const PROGRESSION_TABLE: [u32; 9] = [600, 1_250, 1_900, 2_900, 3_900, 5_000, 6_300, 8_000, 10_000];

/// Conversion rate after `weeks` of staking. Strictly increasing up to week
/// 104, constant afterwards.
pub fn conversion_rate_at(weeks: u32) -> u32 {
    if weeks >= MAX_PROGRESSION_WEEK {
        return PROGRESSION_TABLE[PROGRESSION_TABLE.len() - 1];
    }
    let index = (weeks / PROGRESSION_STEP_WEEKS) as usize;
    let frac = weeks % PROGRESSION_STEP_WEEKS;
    let lo = PROGRESSION_TABLE[index];
    let hi = PROGRESSION_TABLE[index + 1];
    lo + (hi - lo) * frac / PROGRESSION_STEP_WEEKS
}

/// Rates for every week in `from..=to`.
///
/// Rejects inverted ranges, ranges longer than 50 weeks and ranges ending
/// after week 104.
pub fn progression(from: u32, to: u32) -> Result<Vec<u32>, TierError> {
    if from > to {
        return Err(TierError::InvalidRange { from, to });
    }
    let len = to - from + 1;
    if len > MAX_PROGRESSION_RANGE {
        return Err(TierError::RangeTooLarge { len, max: MAX_PROGRESSION_RANGE });
    }
    if to > MAX_PROGRESSION_WEEK {
        return Err(TierError::WeekLimitExceeded { week: to, max: MAX_PROGRESSION_WEEK });
    }
    Ok((from..=to).map(conversion_rate_at).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn knot_values() {
        assert_eq!(conversion_rate_at(0), 600);
        assert_eq!(conversion_rate_at(13), 1_250);
        assert_eq!(conversion_rate_at(26), 1_900);
        assert_eq!(conversion_rate_at(104), 10_000);
    }

    #[test]
    fn interpolates_between_knots() {
        // 600 + 650 * 1 / 13
        assert_eq!(conversion_rate_at(1), 650);
        assert!(conversion_rate_at(10) > conversion_rate_at(1));
        assert!(conversion_rate_at(52) > conversion_rate_at(10));
    }

    #[test]
    fn saturates_after_limit() {
        assert_eq!(conversion_rate_at(105), 10_000);
        assert_eq!(conversion_rate_at(u32::MAX), 10_000);
    }

    #[test]
    fn progression_returns_each_week() {
        let rates = progression(1, 10).unwrap();
        assert_eq!(rates.len(), 10);
        assert!(rates.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn progression_bounds() {
        assert_eq!(progression(1, 60), Err(TierError::RangeTooLarge { len: 60, max: 50 }));
        assert_eq!(progression(100, 110), Err(TierError::WeekLimitExceeded { week: 110, max: 104 }));
        assert_eq!(progression(5, 4), Err(TierError::InvalidRange { from: 5, to: 4 }));
        assert_eq!(progression(55, 104).unwrap().len(), 50);
        assert_eq!(progression(104, 104).unwrap(), vec![10_000]);
    }

    proptest! {
        #[test]
        fn strictly_increasing_until_saturation(w in 0u32..104) {
            prop_assert!(conversion_rate_at(w + 1) > conversion_rate_at(w));
        }

        #[test]
        fn bounded(w in any::<u32>()) {
            let r = conversion_rate_at(w);
            prop_assert!((600..=10_000).contains(&r));
        }
    }
}
