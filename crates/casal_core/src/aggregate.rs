//! crates/casal_core/src/aggregate.rs
//!
//! Derived values computed from the current view. Nothing here is stored.

use serde::Serialize;
use std::cmp::Reverse;

use crate::domain::{ChecklistItem, Goal, Moment};

/// Savings totals of one trip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavingsSummary {
    pub total_target: f64,
    pub total_current: f64,
    pub progress_percent: u32,
    pub missing: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistSummary {
    pub completed_count: usize,
    pub pending_count: usize,
    pub progress_percent: u32,
}

pub fn savings_summary(goals: &[Goal]) -> SavingsSummary {
    let total_target = stable_sum(goals.iter().map(|goal| goal.target));
    let total_current = stable_sum(goals.iter().map(|goal| goal.current));
    SavingsSummary {
        total_target,
        total_current,
        progress_percent: percent(total_current, total_target),
        missing: (total_target - total_current).max(0.0),
    }
}

pub fn goal_progress(goal: &Goal) -> u32 {
    percent(goal.current, goal.target)
}

pub fn goal_missing(goal: &Goal) -> f64 {
    (goal.target - goal.current).max(0.0)
}

pub fn checklist_summary(items: &[ChecklistItem]) -> ChecklistSummary {
    let completed_count = items.iter().filter(|item| item.completed).count();
    ChecklistSummary {
        completed_count,
        pending_count: items.len() - completed_count,
        progress_percent: percent(completed_count as f64, items.len() as f64),
    }
}

/// Gallery order: most recent date first, undated moments last.
pub fn moments_newest_first(moments: &[Moment]) -> Vec<&Moment> {
    let mut sorted: Vec<&Moment> = moments.iter().collect();
    sorted.sort_by_key(|moment| Reverse(moment.date));
    sorted
}

/// Integer percentage, zero when the whole is not positive.
fn percent(part: f64, whole: f64) -> u32 {
    if whole > 0.0 {
        (100.0 * part / whole).round().max(0.0) as u32
    } else {
        0
    }
}

// Float addition is not associative; summing in sorted order makes the total
// independent of the order the goals arrive in.
fn stable_sum(values: impl Iterator<Item = f64>) -> f64 {
    let mut values: Vec<f64> = values.collect();
    values.sort_by(f64::total_cmp);
    values.into_iter().sum()
}
