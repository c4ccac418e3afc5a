use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};

use super::parser::{CronError, CronFields};

/// Upper bound on the next-fire search, roughly two years of minutes.
const MAX_SEARCH_STEPS: u32 = 2 * 365 * 24 * 60;

/// A parsed cron expression that can compute its next fire time.
///
/// All evaluation is done in UTC at minute granularity.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    fields: CronFields,
}

impl CronSchedule {
    /// Parse a five-field cron expression.
    pub fn parse(expression: &str) -> Result<Self, CronError> {
        Ok(CronSchedule {
            expression: expression.to_string(),
            fields: CronFields::parse(expression)?,
        })
    }

    /// The original expression string.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The expanded per-field value sets.
    pub fn fields(&self) -> &CronFields {
        &self.fields
    }

    /// Compute the earliest instant `>= from` (rounded up to a whole minute)
    /// that satisfies the expression.
    ///
    /// The cursor walks forward by the largest step the first mismatched
    /// field allows: unmatched month jumps to the next month's first minute,
    /// unmatched day to the next midnight, unmatched hour to the next hour,
    /// unmatched minute by one minute.
    ///
    /// # Errors
    ///
    /// [`CronError::Unsatisfiable`] when no match exists within roughly two
    /// years of the starting point.
    pub fn next_fire(&self, from: DateTime<Utc>) -> Result<DateTime<Utc>, CronError> {
        let mut cursor = truncate_to_minute(from);
        if cursor < from {
            cursor += Duration::minutes(1);
        }

        for _ in 0..MAX_SEARCH_STEPS {
            if !self.fields.months.contains(&(cursor.month() as u8)) {
                cursor = next_month_start(cursor);
                continue;
            }

            if !self.day_matches(cursor) {
                cursor = next_day_start(cursor);
                continue;
            }

            if !self.fields.hours.contains(&(cursor.hour() as u8)) {
                cursor = next_hour_start(cursor);
                continue;
            }

            if !self.fields.minutes.contains(&(cursor.minute() as u8)) {
                cursor += Duration::minutes(1);
                continue;
            }

            return Ok(cursor);
        }

        Err(CronError::Unsatisfiable)
    }

    /// POSIX day rule: with both fields restricted the day matches when
    /// either one accepts it; with exactly one restricted, that one decides.
    fn day_matches(&self, cursor: DateTime<Utc>) -> bool {
        let dom = self.fields.days_of_month.contains(&(cursor.day() as u8));
        let dow = self
            .fields
            .days_of_week
            .contains(&(cursor.weekday().num_days_from_sunday() as u8));

        match (self.fields.dom_is_wildcard(), self.fields.dow_is_wildcard()) {
            (true, true) => true,
            (true, false) => dow,
            (false, true) => dom,
            (false, false) => dom || dow,
        }
    }
}

fn truncate_to_minute(t: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(t.year(), t.month(), t.day(), t.hour(), t.minute(), 0)
        .single()
        .expect("UTC timestamps are unambiguous")
}

fn next_month_start(cursor: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if cursor.month() == 12 {
        (cursor.year() + 1, 1)
    } else {
        (cursor.year(), cursor.month() + 1)
    };
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .expect("UTC timestamps are unambiguous")
}

fn next_day_start(cursor: DateTime<Utc>) -> DateTime<Utc> {
    let next = cursor
        .date_naive()
        .succ_opt()
        .expect("date range exhausted");
    Utc.from_utc_datetime(&next.and_hms_opt(0, 0, 0).expect("midnight is valid"))
}

fn next_hour_start(cursor: DateTime<Utc>) -> DateTime<Utc> {
    truncate_to_minute(cursor)
        .with_minute(0)
        .expect("minute zero is valid")
        + Duration::hours(1)
}
