//! Retention - ローカルコピーの保持期間
//!
//! ローカルのエントリ名の先頭 `YYYY-MM-DD` だけを見て期限切れを判定します。
//! 状態は持たず、sweep のたびに `now` から cutoff を計算します。

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

const DATE_PREFIX_LEN: usize = 10;
const DATE_PREFIX_FORMAT: &str = "%Y-%m-%d";

/// Supported retention windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RetentionInterval {
    Days3,
    #[default]
    Days7,
    Days14,
    Days30,
}

impl RetentionInterval {
    pub const ALL: [RetentionInterval; 4] = [
        RetentionInterval::Days3,
        RetentionInterval::Days7,
        RetentionInterval::Days14,
        RetentionInterval::Days30,
    ];

    pub fn days(self) -> u64 {
        match self {
            RetentionInterval::Days3 => 3,
            RetentionInterval::Days7 => 7,
            RetentionInterval::Days14 => 14,
            RetentionInterval::Days30 => 30,
        }
    }

    /// First date that is still retained. Anything dated strictly before it
    /// is expired.
    pub fn cutoff(self, now: DateTime<Utc>) -> NaiveDate {
        let today = now.date_naive();
        today
            .checked_sub_days(Days::new(self.days()))
            .unwrap_or(NaiveDate::MIN)
    }

    /// Whether a local entity named `name` is expired at `now`.
    ///
    /// Names without a leading date are never expired.
    pub fn is_expired(self, name: &str, now: DateTime<Utc>) -> bool {
        parse_date_prefix(name).is_some_and(|date| self.is_date_expired(date, now))
    }

    pub fn is_date_expired(self, date: NaiveDate, now: DateTime<Utc>) -> bool {
        date < self.cutoff(now)
    }
}

impl fmt::Display for RetentionInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}d", self.days())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported retention interval {0:?} (expected one of 3d, 7d, 14d, 30d)")]
pub struct ParseIntervalError(String);

impl FromStr for RetentionInterval {
    type Err = ParseIntervalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_suffix('d')
            .or_else(|| trimmed.strip_suffix('D'))
            .unwrap_or(trimmed);
        let days: u64 = digits
            .parse()
            .map_err(|_| ParseIntervalError(s.to_string()))?;
        RetentionInterval::ALL
            .into_iter()
            .find(|interval| interval.days() == days)
            .ok_or_else(|| ParseIntervalError(s.to_string()))
    }
}

/// Parses the first ten characters of `name` as `YYYY-MM-DD`.
pub fn parse_date_prefix(name: &str) -> Option<NaiveDate> {
    let prefix = name.get(..DATE_PREFIX_LEN)?;
    NaiveDate::parse_from_str(prefix, DATE_PREFIX_FORMAT).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 20, 0, 0).unwrap()
    }

    #[rstest]
    #[case("3", RetentionInterval::Days3)]
    #[case("7d", RetentionInterval::Days7)]
    #[case(" 14D ", RetentionInterval::Days14)]
    #[case("30d", RetentionInterval::Days30)]
    fn parses_supported_intervals(#[case] input: &str, #[case] expected: RetentionInterval) {
        assert_eq!(input.parse::<RetentionInterval>().unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("5d")]
    #[case("week")]
    #[case("-7")]
    fn rejects_unsupported_intervals(#[case] input: &str) {
        assert!(input.parse::<RetentionInterval>().is_err());
    }

    #[rstest]
    #[case("2024-05-01", Some((2024, 5, 1)))]
    #[case("2024-05-01_logs.tar.gz", Some((2024, 5, 1)))]
    #[case("2024-13-01", None)]
    #[case("2024-5-1", None)]
    #[case("logs-2024-05-01", None)]
    #[case("short", None)]
    #[case("2024-05-0é", None)]
    fn date_prefix(#[case] name: &str, #[case] expected: Option<(i32, u32, u32)>) {
        let expected = expected.map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap());
        assert_eq!(parse_date_prefix(name), expected);
    }

    #[test]
    fn seven_day_window() {
        let now = at(2024, 5, 20);
        let interval = RetentionInterval::Days7;

        assert_eq!(interval.cutoff(now), NaiveDate::from_ymd_opt(2024, 5, 13).unwrap());
        assert!(interval.is_expired("2024-05-10", now));
        assert!(interval.is_expired("2024-05-12", now));
        // exactly at the cutoff is kept
        assert!(!interval.is_expired("2024-05-13", now));
        assert!(!interval.is_expired("2024-05-15", now));
        assert!(!interval.is_expired("token.json", now));
    }

    #[test]
    fn display_round_trips_through_from_str() {
        for interval in RetentionInterval::ALL {
            assert_eq!(interval.to_string().parse::<RetentionInterval>().unwrap(), interval);
        }
    }
}
