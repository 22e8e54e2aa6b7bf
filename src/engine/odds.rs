/// Convert American odds to implied probability.
/// Positive odds (e.g., +150): prob = 100 / (odds + 100)
/// Negative odds (e.g., -150): prob = |odds| / (|odds| + 100)
pub fn american_to_probability(odds: f64) -> f64 {
    if odds > 0.0 {
        100.0 / (odds + 100.0)
    } else {
        let abs = odds.abs();
        abs / (abs + 100.0)
    }
}

/// Profit in units for a one-unit winning stake at the given American odds.
/// Missing odds are treated as even money.
pub fn win_units(odds: Option<f64>) -> f64 {
    match odds {
        Some(o) if o > 0.0 => o / 100.0,
        Some(o) if o < 0.0 => 100.0 / o.abs(),
        _ => 1.0,
    }
}

/// Whether a price falls inside the accepted -max_abs..=+max_abs window.
pub fn within_odds_window(odds: f64, max_abs: f64) -> bool {
    odds.abs() <= max_abs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_american_to_probability() {
        let prob = american_to_probability(-150.0);
        assert!((prob - 0.6).abs() < 0.001);

        let prob = american_to_probability(150.0);
        assert!((prob - 0.4).abs() < 0.001);
    }

    #[test]
    fn test_win_units() {
        assert!((win_units(Some(150.0)) - 1.5).abs() < 1e-9);
        assert!((win_units(Some(-110.0)) - 0.909).abs() < 0.001);
        assert_eq!(win_units(None), 1.0);
    }

    #[test]
    fn test_odds_window() {
        assert!(within_odds_window(-150.0, 150.0));
        assert!(within_odds_window(120.0, 150.0));
        assert!(!within_odds_window(-155.0, 150.0));
        assert!(!within_odds_window(210.0, 150.0));
    }
}
