use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Days, NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

/// Earliest and latest start times offered for a class, in minutes since midnight.
const FIRST_SLOT: u16 = 9 * 60;
const LAST_SLOT: u16 = 19 * 60 + 30;
const SLOT_STEP: u16 = 30;

/// Every class lasts an hour and a half.
const CLASS_LENGTH: u16 = 90;

/// A new class may not start within the hour before another one on the same day.
const SLOT_GAP: i32 = 60;

const START_DATE_OPTIONS: usize = 8;

const MINUTES_PER_DAY: u16 = 24 * 60;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
    ToSchema,
)]
pub enum Weekday {
    #[strum(serialize = "Lunes")]
    #[serde(rename = "Lunes")]
    Monday,
    #[strum(serialize = "Martes")]
    #[serde(rename = "Martes")]
    Tuesday,
    #[strum(to_string = "Miércoles", serialize = "Miercoles")]
    #[serde(rename = "Miércoles", alias = "Miercoles")]
    Wednesday,
    #[strum(serialize = "Jueves")]
    #[serde(rename = "Jueves")]
    Thursday,
    #[strum(serialize = "Viernes")]
    #[serde(rename = "Viernes")]
    Friday,
    #[strum(to_string = "Sábado", serialize = "Sabado")]
    #[serde(rename = "Sábado", alias = "Sabado")]
    Saturday,
    #[strum(serialize = "Domingo")]
    #[serde(rename = "Domingo")]
    Sunday,
}

impl Weekday {
    pub fn to_chrono(self) -> chrono::Weekday {
        match self {
            Weekday::Monday => chrono::Weekday::Mon,
            Weekday::Tuesday => chrono::Weekday::Tue,
            Weekday::Wednesday => chrono::Weekday::Wed,
            Weekday::Thursday => chrono::Weekday::Thu,
            Weekday::Friday => chrono::Weekday::Fri,
            Weekday::Saturday => chrono::Weekday::Sat,
            Weekday::Sunday => chrono::Weekday::Sun,
        }
    }

    pub fn matches(self, date: NaiveDate) -> bool {
        date.weekday() == self.to_chrono()
    }
}

/// Days from `from` until the next `day`, zero when they coincide.
fn days_until(from: NaiveDate, day: Weekday) -> u64 {
    let current = from.weekday().num_days_from_monday();
    let target = day.to_chrono().num_days_from_monday();
    u64::from((7 + target - current) % 7)
}

/// Every date of the given month falling on `day`, ascending.
pub fn session_dates(month: MonthKey, day: Weekday) -> Vec<NaiveDate> {
    let Some(first) = NaiveDate::from_ymd_opt(month.year, month.month, 1) else {
        return Vec::new();
    };

    let mut dates = Vec::with_capacity(5);
    let mut next = first.checked_add_days(Days::new(days_until(first, day)));

    while let Some(date) = next {
        if date.month() != month.month {
            break;
        }
        dates.push(date);
        next = date.checked_add_days(Days::new(7));
    }

    dates
}

/// The next eight occurrences of `day`, today included.
pub fn start_date_options(today: NaiveDate, day: Weekday) -> Vec<NaiveDate> {
    let mut dates = Vec::with_capacity(START_DATE_OPTIONS);
    let mut next = today.checked_add_days(Days::new(days_until(today, day)));

    while let Some(date) = next {
        if dates.len() == START_DATE_OPTIONS {
            break;
        }
        dates.push(date);
        next = date.checked_add_days(Days::new(7));
    }

    dates
}

/// `dd/mm/yyyy`, the way dates are shown to staff.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

const MONTH_NAMES: [&str; 12] = [
    "Enero",
    "Febrero",
    "Marzo",
    "Abril",
    "Mayo",
    "Junio",
    "Julio",
    "Agosto",
    "Septiembre",
    "Octubre",
    "Noviembre",
    "Diciembre",
];

/// A calendar month, written `YYYY-MM` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Spanish label, e.g. `Mayo 2024`.
    pub fn label(&self) -> String {
        let name = MONTH_NAMES[(self.month as usize - 1) % 12];
        format!("{} {}", name, self.year)
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((y, m)) = s.trim().split_once('-') else {
            return Err("month must be YYYY-MM".to_string());
        };
        let year = y
            .parse::<i32>()
            .map_err(|_| "month year must be numeric".to_string())?;
        let month = m
            .parse::<u32>()
            .map_err(|_| "month must be YYYY-MM".to_string())?;
        if !(1..=12).contains(&month) {
            return Err("month must be between 01 and 12".to_string());
        }
        Ok(Self { year, month })
    }
}

/// A wall-clock start or end time, written `h:mmam` / `h:mmpm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClassTime {
    minutes: u16,
}

impl ClassTime {
    pub fn from_hm(hour: u16, minute: u16) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self {
                minutes: hour * 60 + minute,
            })
        } else {
            None
        }
    }

    pub fn minutes(self) -> u16 {
        self.minutes
    }

    /// When a class starting at `self` finishes.
    pub fn end_time(self) -> Self {
        Self {
            minutes: (self.minutes + CLASS_LENGTH) % MINUTES_PER_DAY,
        }
    }
}

const CLOCK_FORMAT: &str = "%-I:%M%P";

impl fmt::Display for ClassTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (hour, minute) = (u32::from(self.minutes / 60), u32::from(self.minutes % 60));
        let clock = NaiveTime::from_hms_opt(hour, minute, 0).ok_or(fmt::Error)?;
        write!(f, "{}", clock.format(CLOCK_FORMAT))
    }
}

impl FromStr for ClassTime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let clock = NaiveTime::parse_from_str(s.trim(), CLOCK_FORMAT)
            .map_err(|e| format!("invalid class time {}: {}", s, e))?;
        ClassTime::from_hm(clock.hour() as u16, clock.minute() as u16)
            .ok_or_else(|| format!("invalid class time: {}", s))
    }
}

impl TryFrom<String> for ClassTime {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ClassTime> for String {
    fn from(value: ClassTime) -> Self {
        value.to_string()
    }
}

/// Start times offered when scheduling a class.
pub fn time_options() -> Vec<ClassTime> {
    (FIRST_SLOT..=LAST_SLOT)
        .step_by(SLOT_STEP as usize)
        .map(|minutes| ClassTime { minutes })
        .collect()
}

/// The weekly time slot a group occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub day: Weekday,
    pub start: ClassTime,
    pub end: ClassTime,
}

impl Slot {
    /// Whether a class starting at `start` on `day` would collide with this slot.
    pub fn blocks(&self, day: Weekday, start: ClassTime) -> bool {
        if self.day != day {
            return false;
        }
        let start = i32::from(start.minutes);
        let from = i32::from(self.start.minutes) - SLOT_GAP;
        let until = i32::from(self.end.minutes);
        start >= from && start < until
    }
}

pub fn slot_taken<'a>(
    day: Weekday,
    start: ClassTime,
    existing: impl IntoIterator<Item = &'a Slot>,
) -> bool {
    existing.into_iter().any(|slot| slot.blocks(day, start))
}
