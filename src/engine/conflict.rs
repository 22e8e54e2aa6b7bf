//! Guards against storing picks that contradict picks already on the board.

use super::normalize::normalize_side;
use crate::feed::types::MarketKind;

const LINE_EPSILON: f64 = 1e-9;

/// A selection already recorded for the same game+market.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection<'a> {
    pub side: &'a str,
    pub line: Option<f64>,
}

/// Whether `new` contradicts any of `existing` for the same game+market.
///
/// - spread: the other team (opposite line signs), or the same team at the same
///   absolute line
/// - total: Over against Under
/// - moneyline: a different team
pub fn conflicts(market: MarketKind, new: &Selection<'_>, existing: &[Selection<'_>]) -> bool {
    existing.iter().any(|old| conflicts_with(market, new, old))
}

fn conflicts_with(market: MarketKind, new: &Selection<'_>, old: &Selection<'_>) -> bool {
    let new_side = normalize_side(new.side);
    let old_side = normalize_side(old.side);
    match market {
        MarketKind::Spread => {
            let (Some(new_line), Some(old_line)) = (new.line, old.line) else {
                return false;
            };
            if new_side == old_side && (new_line.abs() - old_line.abs()).abs() < LINE_EPSILON {
                return true;
            }
            (new_line > 0.0 && old_line < 0.0) || (new_line < 0.0 && old_line > 0.0)
        }
        MarketKind::Total => {
            (new_side == "OVER" && old_side == "UNDER") || (new_side == "UNDER" && old_side == "OVER")
        }
        MarketKind::Moneyline => new_side != old_side,
    }
}
