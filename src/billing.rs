use chrono::NaiveDate;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::model::group::{GroupMembership, Level};

/// Monthly fee, in colones, for a student attending one regular group.
pub const BASE_MONTHLY_FEE: u32 = 20_000;
/// Fee for two regular groups.
pub const TWO_GROUP_FEE: u32 = 23_000;
/// Added for every regular group beyond the second.
pub const EXTRA_GROUP_FEE: u32 = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum PaymentConcept {
    #[serde(rename = "Mensualidad")]
    Monthly,
    #[serde(rename = "Clases Privadas")]
    PrivateLessons,
    #[serde(rename = "Taller")]
    Workshop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum PaymentMethod {
    #[serde(rename = "SINPE")]
    Sinpe,
    #[serde(rename = "Efectivo")]
    Cash,
    #[serde(rename = "Transferencia")]
    Transfer,
}

#[derive(Debug, Display, PartialEq, Eq)]
pub enum ReceiptError {
    #[display(fmt = "Please fill in every field")]
    MissingFields,

    #[display(fmt = "An amount is required for this concept")]
    MissingAmount,

    #[display(fmt = "The student is not enrolled in any workshop")]
    NoWorkshops,

    #[display(fmt = "Unknown workshop: {}", _0)]
    UnknownWorkshop(String),
}

impl std::error::Error for ReceiptError {}

pub fn monthly_fee(regular_groups: usize) -> u32 {
    match regular_groups {
        0 | 1 => BASE_MONTHLY_FEE,
        n => TWO_GROUP_FEE + (n as u32 - 2) * EXTRA_GROUP_FEE,
    }
}

/// `₡23000`
pub fn format_amount(amount: u32) -> String {
    format!("₡{}", amount)
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReceiptRequest {
    #[schema(example = 12)]
    pub student_id: u64,
    pub concept: Option<PaymentConcept>,
    pub method: Option<PaymentMethod>,
    /// Only read for private lessons and workshops; the monthly fee is computed.
    #[schema(example = 15000)]
    pub amount: Option<u32>,
    pub workshop: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Receipt {
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    pub student: String,
    pub concept: PaymentConcept,
    /// Regular groups covered by a monthly payment.
    pub groups: Vec<String>,
    pub workshop: Option<String>,
    pub amount: u32,
    #[schema(example = "₡23000")]
    pub amount_label: String,
    pub method: PaymentMethod,
}

/// Assembles the receipt for `student`, given the groups they attend.
pub fn build_receipt(
    student: &str,
    memberships: &[GroupMembership],
    request: &ReceiptRequest,
    today: NaiveDate,
) -> Result<Receipt, ReceiptError> {
    let (Some(concept), Some(method)) = (request.concept, request.method) else {
        return Err(ReceiptError::MissingFields);
    };

    let (workshops, regular): (Vec<&GroupMembership>, Vec<&GroupMembership>) = memberships
        .iter()
        .partition(|g| g.level.parse::<Level>().is_ok_and(Level::is_workshop));

    let mut groups = Vec::new();
    let mut workshop = None;

    let amount = match concept {
        PaymentConcept::Monthly => {
            groups = regular.iter().map(|g| g.name.clone()).collect();
            monthly_fee(regular.len())
        }
        PaymentConcept::PrivateLessons => request.amount.ok_or(ReceiptError::MissingAmount)?,
        PaymentConcept::Workshop => {
            if workshops.is_empty() {
                return Err(ReceiptError::NoWorkshops);
            }
            let name = request
                .workshop
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .ok_or(ReceiptError::MissingFields)?;
            if !workshops.iter().any(|g| g.name == name) {
                return Err(ReceiptError::UnknownWorkshop(name.to_string()));
            }
            workshop = Some(name.to_string());
            request.amount.ok_or(ReceiptError::MissingAmount)?
        }
    };

    if amount == 0 {
        return Err(ReceiptError::MissingAmount);
    }

    Ok(Receipt {
        date: today,
        student: student.to_string(),
        concept,
        groups,
        workshop,
        amount,
        amount_label: format_amount(amount),
        method,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn membership(id: u64, name: &str, level: &str) -> GroupMembership {
        GroupMembership {
            id,
            name: name.to_string(),
            level: level.to_string(),
            instructor_id: 2,
            is_primary: id == 1,
        }
    }

    fn request(concept: PaymentConcept) -> ReceiptRequest {
        ReceiptRequest {
            student_id: 12,
            concept: Some(concept),
            method: Some(PaymentMethod::Sinpe),
            amount: None,
            workshop: None,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 6).unwrap()
    }

    #[test]
    fn monthly_fee_grows_with_groups() {
        assert_eq!(monthly_fee(0), 20_000);
        assert_eq!(monthly_fee(1), 20_000);
        assert_eq!(monthly_fee(2), 23_000);
        assert_eq!(monthly_fee(3), 25_000);
        assert_eq!(monthly_fee(5), 29_000);
    }

    #[test]
    fn monthly_receipt_ignores_workshops() {
        let groups = [
            membership(1, "Lunes 7:00pm", "Nivel I"),
            membership(2, "Jueves 6:00pm", "Nivel II-A"),
            membership(3, "Salsa Caleña", "Taller"),
        ];

        let receipt = build_receipt("Ana", &groups, &request(PaymentConcept::Monthly), today()).unwrap();

        assert_eq!(receipt.amount, 23_000);
        assert_eq!(receipt.amount_label, "₡23000");
        assert_eq!(receipt.groups, vec!["Lunes 7:00pm", "Jueves 6:00pm"]);
        assert_eq!(receipt.workshop, None);
    }

    #[test]
    fn private_lessons_need_an_amount() {
        let mut req = request(PaymentConcept::PrivateLessons);
        assert_eq!(
            build_receipt("Ana", &[], &req, today()).unwrap_err(),
            ReceiptError::MissingAmount
        );

        req.amount = Some(15_000);
        let receipt = build_receipt("Ana", &[], &req, today()).unwrap();
        assert_eq!(receipt.amount_label, "₡15000");
        assert!(receipt.groups.is_empty());
    }

    #[test]
    fn workshop_must_belong_to_the_student() {
        let groups = [membership(3, "Salsa Caleña", "Taller")];
        let mut req = request(PaymentConcept::Workshop);
        req.amount = Some(8_000);

        req.workshop = Some("Bachata".to_string());
        assert_eq!(
            build_receipt("Ana", &groups, &req, today()).unwrap_err(),
            ReceiptError::UnknownWorkshop("Bachata".to_string())
        );

        req.workshop = Some("Salsa Caleña".to_string());
        let receipt = build_receipt("Ana", &groups, &req, today()).unwrap();
        assert_eq!(receipt.workshop.as_deref(), Some("Salsa Caleña"));

        assert_eq!(
            build_receipt("Ana", &[], &req, today()).unwrap_err(),
            ReceiptError::NoWorkshops
        );
    }

    #[test]
    fn concept_and_method_are_required() {
        let mut req = request(PaymentConcept::Monthly);
        req.method = None;
        assert_eq!(
            build_receipt("Ana", &[], &req, today()).unwrap_err(),
            ReceiptError::MissingFields
        );
    }

    #[test]
    fn concepts_use_their_spanish_names() {
        let concept: PaymentConcept = serde_json::from_str("\"Clases Privadas\"").unwrap();
        assert_eq!(concept, PaymentConcept::PrivateLessons);
        assert_eq!(serde_json::to_string(&PaymentMethod::Cash).unwrap(), "\"Efectivo\"");
    }
}
