use chrono::{Datelike, NaiveDate};
use tyr_types::GroupBy;

/// Monday of the ISO week containing `date` — the same boundary Postgres's
/// `DATE_TRUNC('week', date)` uses, so "today's" weekly bucket and the
/// historical query can never disagree (spec.md §9's `formatPeriod` note).
pub fn week_start_date(date: NaiveDate) -> NaiveDate {
    let days_since_monday = date.weekday().num_days_from_monday();
    date - chrono::Duration::days(days_since_monday as i64)
}

pub fn month_start_date(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1).expect("valid month start")
}

/// The period label a given date falls into under `group_by`, matching the
/// historical rows' `period` formatting (ISO date, Monday-of-week ISO date,
/// or `YYYY-MM`).
pub fn period_label(date: NaiveDate, group_by: GroupBy) -> String {
    match group_by {
        GroupBy::Daily => date.to_string(),
        GroupBy::Weekly => week_start_date(date).to_string(),
        GroupBy::Monthly => {
            let start = month_start_date(date);
            format!("{:04}-{:02}", start.year(), start.month())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn week_start_is_monday_on_or_before() {
        let wed = NaiveDate::from_ymd_opt(2024, 1, 17).unwrap();
        assert_eq!(week_start_date(wed), NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        let mon = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(week_start_date(mon), mon);
    }

    #[test]
    fn period_label_formats_match_group_by() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(period_label(date, GroupBy::Daily), "2024-03-07");
        assert_eq!(period_label(date, GroupBy::Weekly), "2024-03-04");
        assert_eq!(period_label(date, GroupBy::Monthly), "2024-03");
    }
}
