use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize, ToSchema)]
pub enum Gender {
    #[strum(serialize = "Mujer")]
    #[serde(rename = "Mujer")]
    Female,
    #[strum(serialize = "Hombre")]
    #[serde(rename = "Hombre")]
    Male,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PaymentStatus {
    Paid,
    Pending,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Student {
    #[schema(example = 12)]
    pub id: u64,
    #[schema(example = "María Jiménez")]
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub gender: Gender,
    #[schema(value_type = Option<String>, format = "date")]
    pub birthday: Option<NaiveDate>,
    pub emergency_name: Option<String>,
    pub emergency_phone: Option<String>,
    pub payment_status: PaymentStatus,
    #[schema(value_type = Option<String>, format = "date")]
    pub payment_date: Option<NaiveDate>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct StudentRow {
    pub id: u64,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub gender: String,
    pub birthday: Option<NaiveDate>,
    pub emergency_name: Option<String>,
    pub emergency_phone: Option<String>,
    pub payment_status: String,
    pub payment_date: Option<NaiveDate>,
}

impl TryFrom<StudentRow> for Student {
    type Error = String;

    fn try_from(row: StudentRow) -> Result<Self, Self::Error> {
        let gender = row
            .gender
            .parse::<Gender>()
            .map_err(|_| format!("student {}: unknown gender {:?}", row.id, row.gender))?;
        // Anything not explicitly paid is still owed.
        let payment_status = row
            .payment_status
            .parse::<PaymentStatus>()
            .unwrap_or(PaymentStatus::Pending);

        Ok(Student {
            id: row.id,
            name: row.name,
            phone: row.phone,
            email: row.email,
            gender,
            birthday: row.birthday,
            emergency_name: row.emergency_name,
            emergency_phone: row.emergency_phone,
            payment_status,
            payment_date: row.payment_date,
        })
    }
}
