//! Due-date arithmetic in the viewer's UTC offset.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuickPick {
    Today,
    Tomorrow,
    ThisSunday,
    NextSunday,
    EndOfMonth,
    EndOfNextMonth,
}

impl QuickPick {
    pub const ALL: [QuickPick; 6] = [
        Self::Today,
        Self::Tomorrow,
        Self::ThisSunday,
        Self::NextSunday,
        Self::EndOfMonth,
        Self::EndOfNextMonth,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Today => "Today",
            Self::Tomorrow => "Tomorrow",
            Self::ThisSunday => "Sunday",
            Self::NextSunday => "Next Sunday",
            Self::EndOfMonth => "End of this month",
            Self::EndOfNextMonth => "End of next month",
        }
    }

    /// Last second of the picked day as seen from `offset`.
    pub fn resolve(self, now: DateTime<Utc>, offset: FixedOffset) -> Option<DateTime<Utc>> {
        let today = now.with_timezone(&offset).date_naive();
        let sunday = today + Duration::days(6 - i64::from(today.weekday().num_days_from_monday()));
        let day = match self {
            Self::Today => today,
            Self::Tomorrow => today.succ_opt()?,
            Self::ThisSunday => sunday,
            Self::NextSunday => sunday + Duration::days(7),
            Self::EndOfMonth => last_day_of_month(today.year(), today.month())?,
            Self::EndOfNextMonth => {
                let (year, month) =
                    if today.month() == 12 { (today.year() + 1, 1) } else { (today.year(), today.month() + 1) };
                last_day_of_month(year, month)?
            }
        };
        end_of_day(day, offset)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DueParseError {
    #[error("expected `dd.MM hh:mm`, got `{0}`")]
    Format(String),
}

/// Parses `dd.MM hh:mm` in the current year of `offset`, rolling over to the
/// next year when the month has already passed.
pub fn parse_manual(
    input: &str,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> Result<DateTime<Utc>, DueParseError> {
    let input = input.trim();
    let (day_month, time) =
        input.split_once(' ').ok_or_else(|| DueParseError::Format(input.to_owned()))?;
    let local_now = now.with_timezone(&offset);
    let parse = |year: i32| {
        NaiveDateTime::parse_from_str(&format!("{day_month}.{year} {}", time.trim()), "%d.%m.%Y %H:%M")
            .map_err(|_| DueParseError::Format(input.to_owned()))
    };

    let mut local = parse(local_now.year())?;
    if local.month() < local_now.month() {
        local = parse(local_now.year() + 1)?;
    }
    offset
        .from_local_datetime(&local)
        .single()
        .map(|instant| instant.with_timezone(&Utc))
        .ok_or_else(|| DueParseError::Format(input.to_owned()))
}

fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()
}

fn end_of_day(day: NaiveDate, offset: FixedOffset) -> Option<DateTime<Utc>> {
    let local = day.and_hms_opt(23, 59, 59)?;
    offset.from_local_datetime(&local).single().map(|instant| instant.with_timezone(&Utc))
}
