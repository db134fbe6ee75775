use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

use crate::schedule::{ClassTime, Weekday};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize, ToSchema)]
pub enum Level {
    #[default]
    #[strum(serialize = "Nivel I")]
    #[serde(rename = "Nivel I")]
    One,
    #[strum(serialize = "Nivel II-A")]
    #[serde(rename = "Nivel II-A")]
    TwoA,
    #[strum(serialize = "Nivel II-B")]
    #[serde(rename = "Nivel II-B")]
    TwoB,
    #[strum(serialize = "Nivel III-1")]
    #[serde(rename = "Nivel III-1")]
    ThreeOne,
    #[strum(serialize = "Nivel III-2")]
    #[serde(rename = "Nivel III-2")]
    ThreeTwo,
    #[strum(serialize = "Nivel III-3")]
    #[serde(rename = "Nivel III-3")]
    ThreeThree,
    #[strum(serialize = "Nivel IV")]
    #[serde(rename = "Nivel IV")]
    Four,
    /// One-off workshop, billed separately from the monthly fee.
    #[strum(serialize = "Taller")]
    #[serde(rename = "Taller")]
    Workshop,
}

impl Level {
    pub fn is_workshop(self) -> bool {
        self == Level::Workshop
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[schema(
    example = json!({
        "id": 7,
        "name": "Lunes 7:00pm",
        "instructor_id": 2,
        "instructor": "Andrea Mora",
        "day": "Lunes",
        "start_time": "7:00pm",
        "end_time": "8:30pm",
        "level": "Nivel I",
        "start_date": "2024-05-06"
    })
)]
pub struct Group {
    pub id: u64,
    pub name: String,
    pub instructor_id: u64,
    pub instructor: String,
    pub day: Weekday,
    #[schema(value_type = String, example = "7:00pm")]
    pub start_time: ClassTime,
    #[schema(value_type = String, example = "8:30pm")]
    pub end_time: ClassTime,
    pub level: Level,
    #[schema(value_type = String, format = "date")]
    pub start_date: NaiveDate,
}

/// Raw `dance_groups` row joined with the instructor's name.
#[derive(Debug, sqlx::FromRow)]
pub struct GroupRow {
    pub id: u64,
    pub name: String,
    pub instructor_id: u64,
    pub instructor: String,
    pub day: String,
    pub start_time: String,
    pub end_time: String,
    pub level: String,
    pub start_date: NaiveDate,
}

impl TryFrom<GroupRow> for Group {
    type Error = String;

    fn try_from(row: GroupRow) -> Result<Self, Self::Error> {
        let day = row
            .day
            .parse::<Weekday>()
            .map_err(|_| format!("group {}: unknown day {:?}", row.id, row.day))?;
        let level = row
            .level
            .parse::<Level>()
            .map_err(|_| format!("group {}: unknown level {:?}", row.id, row.level))?;

        Ok(Group {
            id: row.id,
            name: row.name,
            instructor_id: row.instructor_id,
            instructor: row.instructor,
            day,
            start_time: row.start_time.parse()?,
            end_time: row.end_time.parse()?,
            level,
            start_date: row.start_date,
        })
    }
}

/// A group as listed on a student's card.
#[derive(Debug, Clone, Serialize, ToSchema, sqlx::FromRow)]
pub struct GroupMembership {
    pub id: u64,
    pub name: String,
    pub level: String,
    pub instructor_id: u64,
    pub is_primary: bool,
}
