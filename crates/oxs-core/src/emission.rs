//! Logarithmic weekly emission schedule.
//!
//! Week `w` carries growth factor `g(w) = log2(w + 2)` in Q32. The budget is
//! split across weeks `0..=MAX_WEEK` in proportion to `g`, so early weeks emit
//! less and later weeks more:
//!
//! `amount(w) = floor(budget * g(w) / sum(g))`
//!
//! The schedule depends on the week index alone, never on call time.

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_EMISSION_BUDGET, MAX_WEEK};
use crate::error::CurveError;
use crate::math::{log2_q32, mul_div};

/// Precomputed emission schedule for a fixed budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmissionCurve {
    budget: u128,
    total_growth: u128,
}

impl EmissionCurve {
    pub fn new(budget: u128) -> Result<Self, CurveError> {
        if budget == 0 {
            return Err(CurveError::EmptyBudget);
        }
        let total_growth = (0..=MAX_WEEK).map(|w| growth_q32(w) as u128).sum();
        Ok(Self { budget, total_growth })
    }

    pub fn budget(&self) -> u128 {
        self.budget
    }

    /// Q32 growth factor for week `w`.
    pub fn growth_factor(&self, week: u32) -> Result<u64, CurveError> {
        check_week(week)?;
        Ok(growth_q32(week))
    }

    /// Tokens released for week `w`.
    pub fn weekly_amount(&self, week: u32) -> Result<u128, CurveError> {
        check_week(week)?;
        Ok(mul_div(self.budget, growth_q32(week) as u128, self.total_growth)?)
    }

    /// Sum of every weekly amount. Never exceeds the budget.
    pub fn scheduled_total(&self) -> Result<u128, CurveError> {
        (0..=MAX_WEEK).try_fold(0u128, |acc, w| Ok(acc + self.weekly_amount(w)?))
    }
}

impl Default for EmissionCurve {
    fn default() -> Self {
        Self {
            budget: DEFAULT_EMISSION_BUDGET,
            total_growth: (0..=MAX_WEEK).map(|w| growth_q32(w) as u128).sum(),
        }
    }
}

fn check_week(week: u32) -> Result<(), CurveError> {
    if week > MAX_WEEK {
        return Err(CurveError::WeekLimitExceeded { week, max: MAX_WEEK });
    }
    Ok(())
}

fn growth_q32(week: u32) -> u64 {
    log2_q32(week as u64 + 2)
}
