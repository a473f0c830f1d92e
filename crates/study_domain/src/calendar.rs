//! Pure resolution of commitments and study windows against a date.

use chrono::{Datelike, NaiveDate, NaiveTime};

use crate::commitment::{FixedCommitment, Recurrence};
use crate::settings::UserSettings;

/// Whether a commitment occupies the given date.
///
/// A recurring commitment applies iff the weekday matches, the date is
/// inside the configured range (if any), and the occurrence has not
/// been deleted for that date. A one-time commitment applies iff the
/// date is listed.
pub fn applies_on(commitment: &FixedCommitment, date: NaiveDate) -> bool {
    match &commitment.recurrence {
        Recurrence::Weekly { days, date_range } => {
            if !days.contains(&date.weekday()) {
                return false;
            }
            if let Some((from, to)) = date_range {
                if date < *from || date > *to {
                    return false;
                }
            }
            !commitment.deleted_occurrences.contains(&date)
        }
        Recurrence::Dates(dates) => dates.contains(&date),
    }
}

/// The clock interval the commitment occupies on `date`, with any
/// per-occurrence modification applied. `None` means all-day.
pub fn occurrence_window(
    commitment: &FixedCommitment,
    date: NaiveDate,
) -> Option<(NaiveTime, NaiveTime)> {
    if commitment.is_all_day {
        return None;
    }
    let (mut start, mut end) = (commitment.start_time, commitment.end_time);
    if let Some(change) = commitment.modified_occurrences.get(&date) {
        if let Some(s) = change.start_time {
            start = s;
        }
        if let Some(e) = change.end_time {
            end = e;
        }
    }
    Some((start, end))
}

/// Effective study window for a date: the active per-date override if
/// one exists, otherwise the settings default.
pub fn effective_window(settings: &UserSettings, date: NaiveDate) -> (u32, u32) {
    settings
        .window_overrides
        .iter()
        .find(|o| o.active && o.date == date)
        .map(|o| (o.start_hour, o.end_hour))
        .unwrap_or((
            settings.study_window_start_hour,
            settings.study_window_end_hour,
        ))
}

/// Hours of commitments on `date` that count toward daily capacity.
/// An all-day commitment consumes the whole study window.
pub fn commitment_hours(
    commitments: &[FixedCommitment],
    settings: &UserSettings,
    date: NaiveDate,
) -> f64 {
    let (window_start, window_end) = effective_window(settings, date);
    commitments
        .iter()
        .filter(|c| c.counts_toward_daily_hours && applies_on(c, date))
        .map(|c| match occurrence_window(c, date) {
            Some((start, end)) => {
                let minutes = (end - start).num_minutes().max(0);
                minutes as f64 / 60.0
            }
            None => (window_end.saturating_sub(window_start)) as f64,
        })
        .sum()
}

/// Daily study capacity left after commitments.
pub fn available_hours(
    settings: &UserSettings,
    commitments: &[FixedCommitment],
    date: NaiveDate,
) -> f64 {
    (settings.daily_available_hours - commitment_hours(commitments, settings, date)).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commitment::OccurrenceOverride;
    use chrono::Weekday;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 11, 3).unwrap()
    }

    #[test]
    fn recurring_commitment_covers_matching_weekdays_only() {
        let lecture = FixedCommitment::weekly("Lecture", vec![Weekday::Mon], t(9, 0), t(11, 0));
        assert!(applies_on(&lecture, monday()));
        assert!(!applies_on(&lecture, monday().succ_opt().unwrap()));
    }

    #[test]
    fn deleted_occurrence_suppresses_one_date() {
        let mut lecture = FixedCommitment::weekly("Lecture", vec![Weekday::Mon], t(9, 0), t(11, 0));
        lecture.delete_occurrence(monday());
        assert!(!applies_on(&lecture, monday()));
        let next_monday = monday() + chrono::Duration::days(7);
        assert!(applies_on(&lecture, next_monday));
    }

    #[test]
    fn date_range_bounds_recurrence() {
        let mut course = FixedCommitment::weekly("Course", vec![Weekday::Mon], t(9, 0), t(10, 0));
        course.recurrence = Recurrence::Weekly {
            days: vec![Weekday::Mon],
            date_range: Some((
                NaiveDate::from_ymd_opt(2025, 11, 10).unwrap(),
                NaiveDate::from_ymd_opt(2025, 12, 8).unwrap(),
            )),
        };
        assert!(!applies_on(&course, monday()));
        assert!(applies_on(&course, NaiveDate::from_ymd_opt(2025, 11, 10).unwrap()));
    }

    #[test]
    fn one_time_commitment_applies_on_listed_dates() {
        let exam = FixedCommitment::one_time("Exam", vec![monday()], t(13, 0), t(15, 0));
        assert!(applies_on(&exam, monday()));
        assert!(!applies_on(&exam, monday().succ_opt().unwrap()));
    }

    #[test]
    fn occurrence_window_applies_modification() {
        let mut shift = FixedCommitment::weekly("Work", vec![Weekday::Mon], t(14, 0), t(18, 0));
        shift.modify_occurrence(
            monday(),
            OccurrenceOverride {
                start_time: Some(t(15, 0)),
                end_time: None,
                title: None,
            },
        );
        assert_eq!(occurrence_window(&shift, monday()), Some((t(15, 0), t(18, 0))));
        let next_monday = monday() + chrono::Duration::days(7);
        assert_eq!(occurrence_window(&shift, next_monday), Some((t(14, 0), t(18, 0))));
    }

    #[test]
    fn window_override_takes_effect_only_when_active() {
        let mut settings = UserSettings::default();
        settings.window_overrides.push(crate::settings::WindowOverride {
            date: monday(),
            start_hour: 10,
            end_hour: 16,
            active: false,
        });
        assert_eq!(effective_window(&settings, monday()), (8, 22));
        settings.window_overrides[0].active = true;
        assert_eq!(effective_window(&settings, monday()), (10, 16));
    }

    #[test]
    fn capacity_subtracts_counting_commitments() {
        let mut settings = UserSettings::default();
        settings.daily_available_hours = 5.0;
        let lecture = FixedCommitment::weekly("Lecture", vec![Weekday::Mon], t(9, 0), t(11, 0));
        let mut gym = FixedCommitment::weekly("Gym", vec![Weekday::Mon], t(18, 0), t(19, 0));
        gym.counts_toward_daily_hours = false;
        let commitments = vec![lecture, gym];
        assert_eq!(available_hours(&settings, &commitments, monday()), 3.0);
    }

    #[test]
    fn all_day_commitment_consumes_the_whole_window() {
        let mut settings = UserSettings::default();
        settings.daily_available_hours = 6.0;
        let mut trip = FixedCommitment::one_time("Trip", vec![monday()], t(0, 0), t(0, 0));
        trip.is_all_day = true;
        assert_eq!(available_hours(&settings, &[trip], monday()), 0.0);
    }
}
