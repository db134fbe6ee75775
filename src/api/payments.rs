use actix_web::{HttpResponse, Responder, web};
use chrono::Local;
use tracing::{info, instrument};

use crate::api::students::{fetch_memberships, fetch_student};
use crate::auth::auth::AuthUser;
use crate::billing::{ReceiptRequest, build_receipt};
use crate::config::Config;
use crate::error::AppError;
use crate::store::RosterStore;

/// Payment receipt
#[utoipa::path(
    post,
    path = "/api/v1/payments/receipt",
    request_body = ReceiptRequest,
    responses(
        (status = 200, description = "Receipt for the payment", body = crate::billing::Receipt),
        (status = 400, description = "Incomplete request", body = Object, example = json!({
            "message": "Please fill in every field"
        })),
        (status = 404, description = "Student not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
#[instrument(
    name = "payment_receipt",
    skip(auth, roster, config, request),
    fields(user_id = auth.user_id, student_id = request.student_id)
)]
pub async fn receipt(
    auth: AuthUser,
    roster: web::Data<dyn RosterStore>,
    config: web::Data<Config>,
    request: web::Json<ReceiptRequest>,
) -> Result<impl Responder, AppError> {
    auth.require_admin()?;

    let student = fetch_student(roster.get_ref(), &config, request.student_id).await?;
    let memberships = fetch_memberships(roster.get_ref(), &config, request.student_id).await?;

    let receipt = build_receipt(
        &student.name,
        &memberships,
        &request,
        Local::now().date_naive(),
    )?;

    info!(amount = receipt.amount, concept = ?receipt.concept, "Receipt issued");
    Ok(HttpResponse::Ok().json(receipt))
}
