use super::pick::{Pick, PickResult};
use chrono::{DateTime, Utc};
use std::cmp::Reverse;

/// Pick the single best upcoming pending pick to feature.
///
/// Eligible: `Pending` with a commence time strictly after `now`.
/// Order: confidence descending, then soonest commence time; any remaining tie
/// goes to the earlier pick in `picks`. `None` means there is nothing to feature.
pub fn select_featured(picks: &[Pick], now: DateTime<Utc>) -> Option<&Pick> {
    picks
        .iter()
        .filter(|p| is_eligible(p, now))
        // min_by_key returns the first of equal minima.
        .min_by_key(|p| (Reverse(p.confidence), p.commence_time))
}

/// Whether a pick can be featured at `now`.
pub fn is_eligible(pick: &Pick, now: DateTime<Utc>) -> bool {
    pick.result == PickResult::Pending && pick.commence_time.is_some_and(|t| t > now)
}
