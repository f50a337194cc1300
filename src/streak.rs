//! Daily streak ledger: append-only activity log and derived streak stats

use std::collections::BTreeMap;

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Document key for the streak ledger
pub const STREAK_KEY: &str = "streak.json";

/// Activity recorded for one calendar day
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayActivity {
    pub hits: u32,
    pub last_hit: DateTime<Utc>,
}

/// Calendar-day keyed activity map. BTreeMap keeps days in chronological
/// order, which the longest-run scan relies on.
pub type StreakLedger = BTreeMap<NaiveDate, DayActivity>;

/// Derived streak statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreakStats {
    pub current: u32,
    pub longest: u32,
    pub total_active_days: u32,
    pub today_hits: u32,
}

/// One cell of the recent-days calendar window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayCell {
    pub date: NaiveDate,
    pub weekday: String,
    pub hits: u32,
    pub active: bool,
}

/// Record one qualifying engine interaction for `today`, creating the day
/// entry if absent. Returns the updated entry.
pub fn record_hit(ledger: &mut StreakLedger, now: DateTime<Utc>) -> DayActivity {
    let entry = ledger.entry(now.date_naive()).or_insert(DayActivity {
        hits: 0,
        last_hit: now,
    });
    entry.hits += 1;
    entry.last_hit = now;
    entry.clone()
}

fn is_active(ledger: &StreakLedger, day: NaiveDate) -> bool {
    ledger.get(&day).map(|d| d.hits > 0).unwrap_or(false)
}

fn walk_back(ledger: &StreakLedger, mut cursor: NaiveDate) -> u32 {
    let mut run = 0;
    while is_active(ledger, cursor) {
        run += 1;
        match cursor.checked_sub_days(Days::new(1)) {
            Some(previous) => cursor = previous,
            None => break,
        }
    }
    run
}

/// Compute current/longest streaks as of `today`.
///
/// The current streak walks backward from today through consecutive active
/// days; when today has no hits yet, it starts from yesterday instead, so a
/// streak is not broken merely because the user has not acted yet today.
pub fn compute_streak(ledger: &StreakLedger, today: NaiveDate) -> StreakStats {
    if ledger.is_empty() {
        return StreakStats::default();
    }

    let mut current = walk_back(ledger, today);
    if current == 0 {
        if let Some(yesterday) = today.checked_sub_days(Days::new(1)) {
            current = walk_back(ledger, yesterday);
        }
    }

    let mut longest = 0;
    let mut run = 0;
    let mut previous: Option<NaiveDate> = None;
    for (day, activity) in ledger {
        if activity.hits == 0 {
            run = 0;
            previous = None;
            continue;
        }
        run = match previous {
            Some(prev) if prev.checked_add_days(Days::new(1)) == Some(*day) => run + 1,
            _ => 1,
        };
        longest = longest.max(run);
        previous = Some(*day);
    }

    StreakStats {
        current,
        longest,
        total_active_days: ledger.values().filter(|d| d.hits > 0).count() as u32,
        today_hits: ledger.get(&today).map(|d| d.hits).unwrap_or(0),
    }
}

/// The last `n` calendar days ending at `today`, oldest first. Always
/// exactly `n` cells; days absent from the ledger render as inactive.
pub fn recent_days(ledger: &StreakLedger, today: NaiveDate, n: usize) -> Vec<DayCell> {
    let mut cells = Vec::with_capacity(n);
    for offset in (0..n as u64).rev() {
        let Some(date) = today.checked_sub_days(Days::new(offset)) else { continue };
        let hits = ledger.get(&date).map(|d| d.hits).unwrap_or(0);
        cells.push(DayCell {
            date,
            weekday: date.format("%a").to_string(),
            hits,
            active: hits > 0,
        });
    }
    cells
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn ledger(days: &[(&str, u32)]) -> StreakLedger {
        days.iter()
            .map(|(d, hits)| (day(d), DayActivity { hits: *hits, last_hit: Utc::now() }))
            .collect()
    }

    #[test]
    fn empty_ledger_has_no_streak() {
        let stats = compute_streak(&StreakLedger::new(), day("2026-08-06"));
        assert_eq!(stats.current, 0);
        assert_eq!(stats.longest, 0);
    }

    #[test]
    fn inactive_today_counts_from_yesterday() {
        // D-2 and D-1 active, D not yet: the streak is still alive at 2
        let ledger = ledger(&[("2026-08-04", 1), ("2026-08-05", 1)]);
        let stats = compute_streak(&ledger, day("2026-08-06"));
        assert_eq!(stats.current, 2);
        assert_eq!(stats.today_hits, 0);
    }

    #[test]
    fn gap_at_yesterday_breaks_the_run() {
        // D-2 active, D-1 gap, D active: only today counts
        let ledger = ledger(&[("2026-08-04", 1), ("2026-08-06", 1)]);
        let stats = compute_streak(&ledger, day("2026-08-06"));
        assert_eq!(stats.current, 1);
    }

    #[test]
    fn longest_run_scans_all_history() {
        let ledger = ledger(&[
            ("2026-07-01", 1),
            ("2026-07-02", 3),
            ("2026-07-03", 1),
            ("2026-07-10", 1),
            ("2026-08-05", 2),
            ("2026-08-06", 1),
        ]);
        let stats = compute_streak(&ledger, day("2026-08-06"));
        assert_eq!(stats.longest, 3);
        assert_eq!(stats.current, 2);
        assert_eq!(stats.total_active_days, 6);
    }

    #[test]
    fn zero_hit_days_are_not_active() {
        let ledger = ledger(&[("2026-08-05", 0), ("2026-08-06", 1)]);
        let stats = compute_streak(&ledger, day("2026-08-06"));
        assert_eq!(stats.current, 1);
        assert_eq!(stats.total_active_days, 1);
    }

    #[test]
    fn record_hit_increments_today() {
        let mut ledger = StreakLedger::new();
        let now = Utc::now();
        record_hit(&mut ledger, now);
        let entry = record_hit(&mut ledger, now);
        assert_eq!(entry.hits, 2);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn recent_days_fills_gaps_and_is_oldest_first() {
        let ledger = ledger(&[("2026-08-04", 2)]);
        let cells = recent_days(&ledger, day("2026-08-06"), 7);

        assert_eq!(cells.len(), 7);
        assert_eq!(cells[0].date, day("2026-07-31"));
        assert_eq!(cells[6].date, day("2026-08-06"));

        let active: Vec<_> = cells.iter().filter(|c| c.active).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].date, day("2026-08-04"));
        assert_eq!(active[0].hits, 2);
    }
}
