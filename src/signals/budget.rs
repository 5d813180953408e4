use std::sync::Mutex;

use chrono::{NaiveDate, Utc};
use serde::Serialize;

/// USD per million tokens.
const INPUT_TOKEN_COST_PER_MILLION: f64 = 0.05;
const OUTPUT_TOKEN_COST_PER_MILLION: f64 = 0.40;
/// Answer allowance used for pre-call estimates.
pub const EXPECTED_OUTPUT_TOKENS: u32 = 120;

/// Limits the daily LLM spend. Shared by all concurrent requests.
pub struct DetectionBudget {
    max_calls_per_day: u32,
    daily_cost_limit: f64,
    single_call_cost_limit: f64,
    state: Mutex<BudgetState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BudgetState {
    pub day: NaiveDate,
    pub calls_used: u32,
    pub cost_used: f64,
}

/// Why a reservation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetRefusal {
    CallLimit,
    DailyCost,
    SingleCallCost,
}

impl DetectionBudget {
    pub fn new(max_calls_per_day: u32, daily_cost_limit: f64, single_call_cost_limit: f64) -> Self {
        Self {
            max_calls_per_day,
            daily_cost_limit,
            single_call_cost_limit,
            state: Mutex::new(BudgetState {
                day: Utc::now().date_naive(),
                calls_used: 0,
                cost_used: 0.0,
            }),
        }
    }

    /// Check all limits and, if they hold, count the call. Check and increment
    /// happen under one lock so concurrent callers cannot overshoot the cap.
    pub fn try_reserve(&self, cost: f64) -> Result<BudgetState, BudgetRefusal> {
        self.try_reserve_on(Utc::now().date_naive(), cost)
    }

    pub(crate) fn try_reserve_on(&self, today: NaiveDate, cost: f64) -> Result<BudgetState, BudgetRefusal> {
        if cost > self.single_call_cost_limit {
            return Err(BudgetRefusal::SingleCallCost);
        }
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        roll_over(&mut state, today);
        if state.calls_used >= self.max_calls_per_day {
            return Err(BudgetRefusal::CallLimit);
        }
        if state.cost_used + cost > self.daily_cost_limit {
            return Err(BudgetRefusal::DailyCost);
        }
        state.calls_used += 1;
        state.cost_used += cost;
        Ok(*state)
    }

    /// Carry over usage persisted by an earlier process. Ignored unless it is
    /// for the budget's current day.
    pub fn restore(&self, saved: BudgetState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if saved.day == state.day {
            state.calls_used = state.calls_used.max(saved.calls_used);
            state.cost_used = state.cost_used.max(saved.cost_used);
        }
    }

    pub fn snapshot(&self) -> BudgetState {
        self.snapshot_on(Utc::now().date_naive())
    }

    pub(crate) fn snapshot_on(&self, today: NaiveDate) -> BudgetState {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        roll_over(&mut state, today);
        *state
    }
}

fn roll_over(state: &mut BudgetState, today: NaiveDate) {
    if state.day != today {
        tracing::info!(
            previous_day = %state.day,
            calls = state.calls_used,
            cost = state.cost_used,
            "LLM budget reset for new day"
        );
        *state = BudgetState {
            day: today,
            calls_used: 0,
            cost_used: 0.0,
        };
    }
}

/// Rough token count: Hangul ≈ 2 chars/token, ASCII letters ≈ 4, anything else ≈ 3.
pub fn estimate_tokens(text: &str) -> u32 {
    if text.is_empty() {
        return 0;
    }
    let (mut hangul, mut ascii, mut other) = (0u32, 0u32, 0u32);
    for c in text.chars() {
        if is_hangul(c) {
            hangul += 1;
        } else if c.is_ascii_alphabetic() {
            ascii += 1;
        } else {
            other += 1;
        }
    }
    hangul / 2 + ascii / 4 + other / 3 + 1
}

fn is_hangul(c: char) -> bool {
    matches!(c as u32, 0xAC00..=0xD7A3 | 0x1100..=0x11FF | 0x3130..=0x318F)
}

pub fn call_cost(input_tokens: u32, output_tokens: u32) -> f64 {
    input_tokens as f64 / 1_000_000.0 * INPUT_TOKEN_COST_PER_MILLION
        + output_tokens as f64 / 1_000_000.0 * OUTPUT_TOKEN_COST_PER_MILLION
}

/// Projected cost of sending `prompt`.
pub fn estimate_call_cost(prompt: &str) -> f64 {
    call_cost(estimate_tokens(prompt), EXPECTED_OUTPUT_TOKENS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    #[test]
    fn call_cap_enforced() {
        let budget = DetectionBudget::new(2, 1.0, 1.0);
        assert!(budget.try_reserve_on(day(1), 0.0001).is_ok());
        assert!(budget.try_reserve_on(day(1), 0.0001).is_ok());
        assert_eq!(budget.try_reserve_on(day(1), 0.0001), Err(BudgetRefusal::CallLimit));
        assert_eq!(budget.snapshot_on(day(1)).calls_used, 2);
    }

    #[test]
    fn daily_cost_cap_enforced() {
        let budget = DetectionBudget::new(100, 0.001, 0.001);
        assert!(budget.try_reserve_on(day(1), 0.0006).is_ok());
        assert_eq!(budget.try_reserve_on(day(1), 0.0006), Err(BudgetRefusal::DailyCost));
        // A refused call is not counted.
        assert_eq!(budget.snapshot_on(day(1)).calls_used, 1);
    }

    #[test]
    fn single_call_cap_enforced() {
        let budget = DetectionBudget::new(100, 1.0, 0.001);
        assert_eq!(budget.try_reserve_on(day(1), 0.002), Err(BudgetRefusal::SingleCallCost));
    }

    #[test]
    fn restored_usage_counts_toward_cap() {
        let budget = DetectionBudget::new(3, 1.0, 1.0);
        let today = budget.snapshot().day;
        budget.restore(BudgetState { day: today, calls_used: 3, cost_used: 0.0003 });
        assert_eq!(budget.try_reserve(0.0001), Err(BudgetRefusal::CallLimit));
    }

    #[test]
    fn stale_restore_ignored() {
        let budget = DetectionBudget::new(3, 1.0, 1.0);
        let yesterday = budget.snapshot().day.pred_opt().unwrap();
        budget.restore(BudgetState { day: yesterday, calls_used: 3, cost_used: 0.0003 });
        assert_eq!(budget.snapshot().calls_used, 0);
    }

    #[test]
    fn resets_on_new_day() {
        let budget = DetectionBudget::new(1, 1.0, 1.0);
        assert!(budget.try_reserve_on(day(1), 0.0001).is_ok());
        assert!(budget.try_reserve_on(day(1), 0.0001).is_err());
        let state = budget.try_reserve_on(day(2), 0.0001).unwrap();
        assert_eq!(state.day, day(2));
        assert_eq!(state.calls_used, 1);
    }

    #[test]
    fn concurrent_reservations_never_exceed_cap() {
        let budget = Arc::new(DetectionBudget::new(50, 10.0, 1.0));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let budget = budget.clone();
                std::thread::spawn(move || {
                    (0..20)
                        .filter(|_| budget.try_reserve_on(day(1), 0.0001).is_ok())
                        .count()
                })
            })
            .collect();
        let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(granted, 50);
        assert_eq!(budget.snapshot_on(day(1)).calls_used, 50);
    }

    #[test]
    fn token_estimate_by_script() {
        assert_eq!(estimate_tokens(""), 0);
        // 8 ASCII letters → 2, +1
        assert_eq!(estimate_tokens("abcdefgh"), 3);
        // 4 Hangul → 2, +1
        assert_eq!(estimate_tokens("안녕하세"), 3);
        // 3 digits → 1, +1
        assert_eq!(estimate_tokens("123"), 2);
    }

    #[test]
    fn cost_per_million() {
        assert!((call_cost(1_000_000, 0) - 0.05).abs() < 1e-12);
        assert!((call_cost(0, 1_000_000) - 0.40).abs() < 1e-12);
        // A typical prompt is far below the default single-call cap.
        assert!(estimate_call_cost(&"a".repeat(2000)) < 0.001);
    }
}
