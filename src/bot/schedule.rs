//! Recurrence expressions for meetup schedules.
//!
//! An expression is a comma-separated list of leaves, each leaf being one or
//! more day names (or `everyday`) followed by a `HH:MM` time, e.g.
//! `"monday wednesday 20:30, saturday 12:00"`. Parsing is case-insensitive;
//! formatting always emits the canonical lowercase form.

use std::fmt;

use chrono::{DateTime, Datelike, Duration, Utc, Weekday};

/// Bitmask of weekdays, one bit per day starting at Monday.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub const MONDAY: WeekdaySet = WeekdaySet(1 << 0);
    pub const TUESDAY: WeekdaySet = WeekdaySet(1 << 1);
    pub const WEDNESDAY: WeekdaySet = WeekdaySet(1 << 2);
    pub const THURSDAY: WeekdaySet = WeekdaySet(1 << 3);
    pub const FRIDAY: WeekdaySet = WeekdaySet(1 << 4);
    pub const SATURDAY: WeekdaySet = WeekdaySet(1 << 5);
    pub const SUNDAY: WeekdaySet = WeekdaySet(1 << 6);
    pub const ALL: WeekdaySet = WeekdaySet(0b0111_1111);

    const EMPTY: WeekdaySet = WeekdaySet(0);

    pub fn contains(self, day: Weekday) -> bool {
        self.0 & Self::from_weekday(day).0 != 0
    }

    fn union(self, other: WeekdaySet) -> WeekdaySet {
        WeekdaySet(self.0 | other.0)
    }

    fn from_weekday(day: Weekday) -> WeekdaySet {
        match day {
            Weekday::Mon => Self::MONDAY,
            Weekday::Tue => Self::TUESDAY,
            Weekday::Wed => Self::WEDNESDAY,
            Weekday::Thu => Self::THURSDAY,
            Weekday::Fri => Self::FRIDAY,
            Weekday::Sat => Self::SATURDAY,
            Weekday::Sun => Self::SUNDAY,
        }
    }
}

/// Day names recognized by the parser, in canonical display order.
const DAY_NAMES: [(&str, WeekdaySet); 7] = [
    ("monday", WeekdaySet::MONDAY),
    ("tuesday", WeekdaySet::TUESDAY),
    ("wednesday", WeekdaySet::WEDNESDAY),
    ("thursday", WeekdaySet::THURSDAY),
    ("friday", WeekdaySet::FRIDAY),
    ("saturday", WeekdaySet::SATURDAY),
    ("sunday", WeekdaySet::SUNDAY),
];

const EVERYDAY: &str = "everyday";

fn valid_day_names() -> String {
    let mut names: Vec<&str> = DAY_NAMES.iter().map(|(n, _)| *n).collect();
    names.push(EVERYDAY);
    names.join(", ")
}

/// Why a schedule expression failed to parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleParseError {
    Empty,
    /// Leaf has fewer than two space-separated parts.
    MissingTime { leaf: String },
    /// A day token is not a recognized day name.
    UnknownDayName { leaf: String, name: String },
    /// The time token is not two colon-separated integers.
    BadTime { leaf: String },
    HourOutOfRange { leaf: String },
    MinuteOutOfRange { leaf: String },
}

impl fmt::Display for ScheduleParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty schedule expression"),
            Self::MissingTime { leaf } => {
                write!(f, "expected day names and a time in '{}'", leaf)
            }
            Self::UnknownDayName { leaf, name } => {
                write!(
                    f,
                    "unknown day name '{}' in '{}', valid names are: {}",
                    name,
                    leaf,
                    valid_day_names()
                )
            }
            Self::BadTime { leaf } => write!(f, "expected a HH:MM time in '{}'", leaf),
            Self::HourOutOfRange { leaf } => write!(f, "hour out of range (0-23) in '{}'", leaf),
            Self::MinuteOutOfRange { leaf } => {
                write!(f, "minute out of range (0-59) in '{}'", leaf)
            }
        }
    }
}

impl std::error::Error for ScheduleParseError {}

/// One weekday-set + time-of-day component of a schedule expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleLeaf {
    days: WeekdaySet,
    hour: u32,
    minute: u32,
}

impl ScheduleLeaf {
    fn parse(src: &str) -> Result<Self, ScheduleParseError> {
        let parts: Vec<&str> = src.split_whitespace().collect();
        if parts.len() < 2 {
            return Err(ScheduleParseError::MissingTime { leaf: src.to_string() });
        }

        let mut days = WeekdaySet::EMPTY;
        for part in &parts[..parts.len() - 1] {
            let name = part.to_lowercase();
            if name == EVERYDAY {
                days = days.union(WeekdaySet::ALL);
                continue;
            }
            match DAY_NAMES.iter().find(|(n, _)| *n == name) {
                Some((_, day)) => days = days.union(*day),
                None => {
                    return Err(ScheduleParseError::UnknownDayName {
                        leaf: src.to_string(),
                        name: part.to_string(),
                    });
                }
            }
        }

        let time_parts: Vec<&str> = parts[parts.len() - 1].split(':').collect();
        if time_parts.len() != 2 {
            return Err(ScheduleParseError::BadTime { leaf: src.to_string() });
        }
        let hour: u32 = time_parts[0]
            .parse()
            .map_err(|_| ScheduleParseError::BadTime { leaf: src.to_string() })?;
        let minute: u32 = time_parts[1]
            .parse()
            .map_err(|_| ScheduleParseError::BadTime { leaf: src.to_string() })?;
        if hour > 23 {
            return Err(ScheduleParseError::HourOutOfRange { leaf: src.to_string() });
        }
        if minute > 59 {
            return Err(ScheduleParseError::MinuteOutOfRange { leaf: src.to_string() });
        }

        Ok(Self { days, hour, minute })
    }

    /// Earliest instant strictly after `now` on a day in the set, at this
    /// leaf's time of day. Starts the scan at `now`'s own date so a
    /// later-the-same-day time is found.
    fn next_occurrence(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let mut t = now
            .date_naive()
            .and_hms_opt(self.hour, self.minute, 0)
            .expect("hour and minute validated at parse")
            .and_utc();
        // 8 days: a full week plus the possibly-already-passed starting day.
        for _ in 0..8 {
            if self.days.contains(t.weekday()) && t > now {
                return t;
            }
            t += Duration::days(1);
        }
        unreachable!("a non-empty weekday set matches within 8 days");
    }
}

impl fmt::Display for ScheduleLeaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.days == WeekdaySet::ALL {
            write!(f, "{} {:02}:{:02}", EVERYDAY, self.hour, self.minute)
        } else {
            let names: Vec<&str> = DAY_NAMES
                .iter()
                .filter(|(_, day)| self.days.0 & day.0 != 0)
                .map(|(n, _)| *n)
                .collect();
            write!(f, "{} {:02}:{:02}", names.join(" "), self.hour, self.minute)
        }
    }
}

/// A parsed recurrence expression. Always holds at least one leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleExpression {
    leaves: Vec<ScheduleLeaf>,
}

impl ScheduleExpression {
    /// Parse a comma-separated list of leaves. Fails on the first bad leaf.
    pub fn parse(src: &str) -> Result<Self, ScheduleParseError> {
        if src.trim().is_empty() {
            return Err(ScheduleParseError::Empty);
        }
        let mut leaves = Vec::new();
        for segment in src.split(',') {
            leaves.push(ScheduleLeaf::parse(segment.trim())?);
        }
        Ok(Self { leaves })
    }

    /// Earliest next occurrence across all leaves, strictly after `now`.
    pub fn next_occurrence(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.leaves
            .iter()
            .map(|leaf| leaf.next_occurrence(now))
            .min()
            .expect("parsed expressions hold at least one leaf")
    }
}

impl fmt::Display for ScheduleExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let leaves: Vec<String> = self.leaves.iter().map(ScheduleLeaf::to_string).collect();
        write!(f, "{}", leaves.join(", "))
    }
}
