//! Pure computations behind the activity commands.

use crate::db::RankRow;
use crate::models::MessageDay;
use chrono::NaiveDate;
use std::collections::HashMap;

pub const DEFAULT_ROLLING_WINDOW: usize = 14;

/// Position of an author in a leaderboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rank {
    /// 1-based, ties share the best position.
    pub position: usize,
    pub count: i64,
    /// Authors with at least one match.
    pub out_of: usize,
}

/// Competition ranking: one plus the number of authors with strictly more matches.
pub fn competition_rank(counts: &[RankRow], author_id: &str) -> Option<Rank> {
    let own = counts
        .iter()
        .find(|r| r.author_id == author_id && r.count > 0)?
        .count;
    let ahead = counts.iter().filter(|r| r.count > own).count();
    Some(Rank {
        position: ahead + 1,
        count: own,
        out_of: counts.iter().filter(|r| r.count > 0).count(),
    })
}

/// Daily ratio of matching messages over all messages on `[start, end]`.
///
/// Days without any message count as zero.
pub fn daily_ratios(
    matches: &[MessageDay],
    totals: &[MessageDay],
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<(NaiveDate, f64)> {
    let matches: HashMap<NaiveDate, i64> = matches.iter().map(|d| (d.date, d.count)).collect();
    let totals: HashMap<NaiveDate, i64> = totals.iter().map(|d| (d.date, d.count)).collect();

    start
        .iter_days()
        .take_while(|day| *day <= end)
        .map(|day| {
            let total = totals.get(&day).copied().unwrap_or(0);
            let hits = matches.get(&day).copied().unwrap_or(0);
            let ratio = if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            };
            (day, ratio)
        })
        .collect()
}

/// Daily counts on `[start, end]`, zero on days without any message.
pub fn daily_counts(days: &[MessageDay], start: NaiveDate, end: NaiveDate) -> Vec<(NaiveDate, f64)> {
    let counts: HashMap<NaiveDate, i64> = days.iter().map(|d| (d.date, d.count)).collect();
    start
        .iter_days()
        .take_while(|day| *day <= end)
        .map(|day| (day, counts.get(&day).copied().unwrap_or(0) as f64))
        .collect()
}

/// Trailing mean over `window` days. The first `window - 1` days have no
/// complete window and are dropped.
pub fn rolling_mean(series: &[(NaiveDate, f64)], window: usize) -> Vec<(NaiveDate, f64)> {
    let window = window.max(1);
    if series.len() < window {
        return Vec::new();
    }

    let mut out = Vec::with_capacity(series.len() + 1 - window);
    let mut sum: f64 = series[..window].iter().map(|(_, v)| v).sum();
    out.push((series[window - 1].0, sum / window as f64));
    for i in window..series.len() {
        sum += series[i].1 - series[i - window].1;
        out.push((series[i].0, sum / window as f64));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(author: &str, count: i64) -> RankRow {
        RankRow {
            author_id: author.to_string(),
            real_author_id: None,
            count,
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, d).unwrap()
    }

    #[test]
    fn test_competition_rank() {
        let counts = vec![row("a", 10), row("b", 10), row("c", 7), row("d", 3), row("e", 0)];

        let positions: Vec<Option<usize>> = ["a", "b", "c", "d", "e", "unknown"]
            .iter()
            .map(|a| competition_rank(&counts, a).map(|r| r.position))
            .collect();
        assert_eq!(positions, vec![Some(1), Some(1), Some(3), Some(4), None, None]);

        let c = competition_rank(&counts, "c").unwrap();
        assert_eq!(c.count, 7);
        assert_eq!(c.out_of, 4);
    }

    #[test]
    fn test_daily_ratios_fill_gaps() {
        let totals = vec![
            MessageDay { date: day(1), count: 10 },
            MessageDay { date: day(3), count: 4 },
        ];
        let matches = vec![
            MessageDay { date: day(1), count: 5 },
            MessageDay { date: day(3), count: 1 },
        ];

        let series = daily_ratios(&matches, &totals, day(1), day(4));
        assert_eq!(
            series,
            vec![(day(1), 0.5), (day(2), 0.0), (day(3), 0.25), (day(4), 0.0)]
        );
        assert!(daily_ratios(&matches, &totals, day(4), day(1)).is_empty());
    }

    #[test]
    fn test_daily_counts_fill_gaps() {
        let days = vec![
            MessageDay { date: day(2), count: 7 },
            MessageDay { date: day(4), count: 1 },
        ];
        assert_eq!(
            daily_counts(&days, day(1), day(4)),
            vec![(day(1), 0.0), (day(2), 7.0), (day(3), 0.0), (day(4), 1.0)]
        );
    }

    #[test]
    fn test_rolling_mean() {
        let series: Vec<(NaiveDate, f64)> = (1..=5).map(|d| (day(d), d as f64)).collect();

        let smoothed = rolling_mean(&series, 3);
        assert_eq!(smoothed, vec![(day(3), 2.0), (day(4), 3.0), (day(5), 4.0)]);

        // A one-day window is the identity
        assert_eq!(rolling_mean(&series, 1), series);
        assert!(rolling_mean(&series, 6).is_empty());
    }
}
