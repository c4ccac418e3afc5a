use std::collections::BTreeSet;
use std::fmt;

/// Failure modes of cron expression handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CronError {
    /// The expression (or one of its fields) is malformed.
    Syntax(String),
    /// No matching runtime exists within the bounded search window.
    Unsatisfiable,
}

impl fmt::Display for CronError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CronError::Syntax(detail) => write!(f, "invalid cron expression: {detail}"),
            CronError::Unsatisfiable => {
                f.write_str("no matching runtime within the search window")
            }
        }
    }
}

impl std::error::Error for CronError {}

/// Which field of the expression is being parsed. Month and day-of-week
/// fields additionally resolve symbolic names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Minute,
    Hour,
    DayOfMonth,
    Month,
    DayOfWeek,
}

impl FieldKind {
    fn range(self) -> (i64, i64) {
        match self {
            FieldKind::Minute => (0, 59),
            FieldKind::Hour => (0, 23),
            FieldKind::DayOfMonth => (1, 31),
            FieldKind::Month => (1, 12),
            // 7 is accepted as an alias of Sunday and folded to 0 on insert.
            FieldKind::DayOfWeek => (0, 7),
        }
    }

    fn label(self) -> &'static str {
        match self {
            FieldKind::Minute => "minute",
            FieldKind::Hour => "hour",
            FieldKind::DayOfMonth => "day-of-month",
            FieldKind::Month => "month",
            FieldKind::DayOfWeek => "day-of-week",
        }
    }
}

/// The expanded value sets of a five-field cron expression.
///
/// Each set holds the concrete values at which the field matches. Sets are
/// never empty after a successful parse, and day-of-week never contains 7:
/// the Sunday alias is folded to 0 while parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronFields {
    pub minutes: BTreeSet<u8>,
    pub hours: BTreeSet<u8>,
    pub days_of_month: BTreeSet<u8>,
    pub months: BTreeSet<u8>,
    pub days_of_week: BTreeSet<u8>,
}

impl CronFields {
    /// Parse a full five-field expression.
    pub fn parse(expression: &str) -> Result<Self, CronError> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(CronError::Syntax(format!(
                "expected 5 fields, found {}",
                fields.len()
            )));
        }

        Ok(CronFields {
            minutes: parse_field(fields[0], FieldKind::Minute)?,
            hours: parse_field(fields[1], FieldKind::Hour)?,
            days_of_month: parse_field(fields[2], FieldKind::DayOfMonth)?,
            months: parse_field(fields[3], FieldKind::Month)?,
            days_of_week: parse_field(fields[4], FieldKind::DayOfWeek)?,
        })
    }

    /// Whether the day-of-month field covers its entire 1..=31 range.
    pub(crate) fn dom_is_wildcard(&self) -> bool {
        self.days_of_month.len() == 31
    }

    /// Whether the day-of-week field covers every weekday.
    pub(crate) fn dow_is_wildcard(&self) -> bool {
        self.days_of_week.len() == 7
    }
}

/// Fold the day-of-week Sunday alias so downstream code never sees a 7.
fn normalize(value: i64, kind: FieldKind) -> u8 {
    if kind == FieldKind::DayOfWeek && value == 7 {
        0
    } else {
        value as u8
    }
}

fn parse_field(field: &str, kind: FieldKind) -> Result<BTreeSet<u8>, CronError> {
    let (min, max) = kind.range();
    let mut values = BTreeSet::new();

    for item in field.split(',') {
        if item == "*" {
            for v in min..=max {
                values.insert(normalize(v, kind));
            }
        } else if let Some((base, step)) = item.split_once('/') {
            let step: i64 = step
                .parse()
                .map_err(|_| CronError::Syntax(format!("invalid step in '{item}'")))?;
            if step <= 0 {
                return Err(CronError::Syntax(format!(
                    "step must be positive in '{item}'"
                )));
            }

            let (start, end) = if base == "*" {
                (min, max)
            } else if let Some((lo, hi)) = base.split_once('-') {
                (resolve_value(lo, kind)?, resolve_value(hi, kind)?)
            } else {
                let v = resolve_value(base, kind)?;
                (v, v)
            };

            let mut v = start;
            while v <= end {
                if v >= min && v <= max {
                    values.insert(normalize(v, kind));
                }
                v += step;
            }
        } else if let Some((lo, hi)) = item.split_once('-') {
            let start = resolve_value(lo, kind)?;
            let end = resolve_value(hi, kind)?;
            if start > end {
                // Wrap-around range: the union of [start, max] and [min, end].
                for v in start..=max {
                    values.insert(normalize(v, kind));
                }
                for v in min..=end {
                    values.insert(normalize(v, kind));
                }
            } else {
                for v in start..=end {
                    if v >= min && v <= max {
                        values.insert(normalize(v, kind));
                    }
                }
            }
        } else {
            let v = resolve_value(item, kind)?;
            if v < min || v > max {
                return Err(CronError::Syntax(format!(
                    "{} value {v} out of range [{min}-{max}]",
                    kind.label()
                )));
            }
            values.insert(normalize(v, kind));
        }
    }

    if values.is_empty() {
        return Err(CronError::Syntax(format!(
            "{} field '{field}' produced no values",
            kind.label()
        )));
    }

    Ok(values)
}

/// Resolve a single token to its numeric value, accepting month and weekday
/// names case-insensitively.
fn resolve_value(token: &str, kind: FieldKind) -> Result<i64, CronError> {
    let upper = token.to_ascii_uppercase();

    if kind == FieldKind::Month {
        let month = match upper.as_str() {
            "JAN" => Some(1),
            "FEB" => Some(2),
            "MAR" => Some(3),
            "APR" => Some(4),
            "MAY" => Some(5),
            "JUN" => Some(6),
            "JUL" => Some(7),
            "AUG" => Some(8),
            "SEP" => Some(9),
            "OCT" => Some(10),
            "NOV" => Some(11),
            "DEC" => Some(12),
            _ => None,
        };
        if let Some(month) = month {
            return Ok(month);
        }
    }

    if kind == FieldKind::DayOfWeek {
        let day = match upper.as_str() {
            "SUN" => Some(0),
            "MON" => Some(1),
            "TUE" => Some(2),
            "WED" => Some(3),
            "THU" => Some(4),
            "FRI" => Some(5),
            "SAT" => Some(6),
            _ => None,
        };
        if let Some(day) = day {
            return Ok(day);
        }
    }

    token
        .parse()
        .map_err(|_| CronError::Syntax(format!("unrecognized token '{token}'")))
}
