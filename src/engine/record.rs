use super::odds::win_units;
use super::pick::PickResult;

/// Win/loss record over graded picks, one unit staked per pick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSummary {
    pub wins: u32,
    pub losses: u32,
    pub pushes: u32,
    pub units: f64,
    /// Percent of graded picks won.
    pub win_rate: f64,
    /// Units returned per pick, percent.
    pub roi: f64,
}

impl RecordSummary {
    /// Build from (result, American odds) pairs. Pending entries are ignored.
    pub fn from_results<I>(results: I) -> Self
    where
        I: IntoIterator<Item = (PickResult, Option<f64>)>,
    {
        let mut summary = RecordSummary::default();
        for (result, odds) in results {
            match result {
                PickResult::Win => {
                    summary.wins += 1;
                    summary.units += win_units(odds);
                }
                PickResult::Loss => {
                    summary.losses += 1;
                    summary.units -= 1.0;
                }
                PickResult::Push => summary.pushes += 1,
                PickResult::Pending => {}
            }
        }
        let total = summary.graded();
        if total > 0 {
            summary.win_rate = round1(summary.wins as f64 / total as f64 * 100.0);
            summary.roi = round1(summary.units / total as f64 * 100.0);
        }
        summary.units = (summary.units * 100.0).round() / 100.0;
        summary
    }

    pub fn graded(&self) -> u32 {
        self.wins + self.losses + self.pushes
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_record() {
        let summary = RecordSummary::from_results(Vec::new());
        assert_eq!(summary, RecordSummary::default());
    }

    #[test]
    fn test_mixed_record() {
        let summary = RecordSummary::from_results(vec![
            (PickResult::Win, Some(150.0)),
            (PickResult::Win, Some(-110.0)),
            (PickResult::Loss, Some(-120.0)),
            (PickResult::Push, Some(-110.0)),
            (PickResult::Pending, Some(-110.0)),
        ]);
        assert_eq!(summary.wins, 2);
        assert_eq!(summary.losses, 1);
        assert_eq!(summary.pushes, 1);
        assert_eq!(summary.graded(), 4);
        // 1.5 + 0.909 - 1.0
        assert_eq!(summary.units, 1.41);
        assert_eq!(summary.win_rate, 50.0);
        assert_eq!(summary.roi, 35.2);
    }
}
