use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::ImportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum RelativeDay {
    Yesterday,
    Today,
    Tomorrow,
}

/// What to import when no dates are given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultDates {
    /// Forecasts: today through tomorrow.
    TodayAndTomorrow,
    /// Measurements: yesterday.
    Yesterday,
}

/// Inclusive range of local calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let to = self.to;
        self.from.iter_days().take_while(move |day| *day <= to)
    }

    pub fn len(&self) -> usize {
        self.days().count()
    }

    pub fn is_empty(&self) -> bool {
        self.from > self.to
    }
}

/// Resolve CLI date options against `today` (in the market timezone).
pub fn resolve_dates(
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    day: Option<RelativeDay>,
    defaults: DefaultDates,
    today: NaiveDate,
) -> Result<DateRange, ImportError> {
    if let Some(day) = day {
        if from.is_some() || to.is_some() {
            return Err(ImportError::Configuration(
                "--day cannot be combined with --from-date or --to-date".to_string(),
            ));
        }
        let date = match day {
            RelativeDay::Yesterday => shift(today, -1)?,
            RelativeDay::Today => today,
            RelativeDay::Tomorrow => shift(today, 1)?,
        };
        return Ok(DateRange { from: date, to: date });
    }

    let range = match defaults {
        DefaultDates::TodayAndTomorrow => DateRange {
            from: from.unwrap_or(today),
            to: match to {
                Some(to) => to,
                None => shift(today, 1)?,
            },
        },
        DefaultDates::Yesterday => {
            let from = match from {
                Some(from) => from,
                None => shift(today, -1)?,
            };
            DateRange { from, to: to.unwrap_or(from) }
        }
    };

    if range.is_empty() {
        return Err(ImportError::Configuration(format!(
            "from-date {} is after to-date {}",
            range.from, range.to
        )));
    }
    Ok(range)
}

/// The calendar day `now` falls on in `tz`.
pub fn local_today(tz: Tz, now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&tz).date_naive()
}

/// `[start, end)` in UTC of a local calendar day; 23 or 25 hours on DST changes.
pub fn day_window(day: NaiveDate, tz: Tz) -> Result<(DateTime<Utc>, DateTime<Utc>), ImportError> {
    let next = shift(day, 1)?;
    Ok((local_day_start(day, tz)?, local_day_start(next, tz)?))
}

fn local_day_start(day: NaiveDate, tz: Tz) -> Result<DateTime<Utc>, ImportError> {
    let midnight = day.and_time(NaiveTime::MIN);
    // a DST gap at midnight moves the day start to the first valid instant
    let start = tz
        .from_local_datetime(&midnight)
        .earliest()
        .or_else(|| {
            (1..=2)
                .filter_map(|h| tz.from_local_datetime(&(midnight + TimeDelta::hours(h))).earliest())
                .next()
        })
        .ok_or_else(|| ImportError::Configuration(format!("{day} has no start in timezone {tz}")))?;
    Ok(start.with_timezone(&Utc))
}

fn shift(day: NaiveDate, days: i64) -> Result<NaiveDate, ImportError> {
    let shifted = if days >= 0 {
        day.checked_add_days(Days::new(days.unsigned_abs()))
    } else {
        day.checked_sub_days(Days::new(days.unsigned_abs()))
    };
    shifted.ok_or_else(|| ImportError::Configuration(format!("date {day} out of range")))
}
