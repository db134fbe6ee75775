use actix_web::{HttpResponse, Responder, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::auth::auth::AuthUser;
use crate::error::AppError;
use crate::model::group::Group;
use crate::model::student::{Gender, PaymentStatus, Student};
use crate::reconciler::{CellState, EditMode, Reconciler, ReconcileError, SaveReport, Toggle};
use crate::schedule::{MonthKey, session_dates};
use crate::sessions::EditSessions;
use crate::store::{AttendanceStore, RosterStore, within};

#[derive(Deserialize, IntoParams)]
pub struct SheetQuery {
    /// Month to show as `YYYY-MM`; defaults to the group's start month.
    pub month: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct SheetRow {
    pub student_id: u64,
    pub name: String,
    pub gender: Gender,
    pub payment_status: PaymentStatus,
    #[schema(value_type = Option<String>, format = "date")]
    pub payment_date: Option<NaiveDate>,
    /// One state per entry of `dates`.
    pub cells: Vec<CellState>,
}

#[derive(Serialize, ToSchema)]
pub struct AttendanceSheet {
    pub group_id: u64,
    pub group_name: String,
    #[schema(example = "2024-05")]
    pub month: String,
    #[schema(example = "Mayo 2024")]
    pub month_label: String,
    #[schema(value_type = Vec<String>)]
    pub dates: Vec<NaiveDate>,
    pub mode: EditMode,
    pub pending: usize,
    pub rows: Vec<SheetRow>,
    pub total_female: usize,
    pub total_male: usize,
}

#[derive(Deserialize, ToSchema)]
pub struct ToggleRequest {
    #[schema(example = 12)]
    pub student_id: u64,
    #[schema(example = "2024-05-13", value_type = String, format = "date")]
    pub date: NaiveDate,
}

#[derive(Serialize, ToSchema)]
pub struct ToggleResponse {
    pub outcome: Toggle,
    pub state: CellState,
    pub pending: usize,
}

#[derive(Serialize, ToSchema)]
pub struct SaveResponse {
    pub message: String,
    pub report: SaveReport,
}

/// Rows for women first, then men, each already in roster order.
pub fn build_sheet(
    group: &Group,
    students: &[Student],
    month: MonthKey,
    reconciler: &Reconciler,
) -> AttendanceSheet {
    let dates = session_dates(month, group.day);

    let row = |student: &Student| SheetRow {
        student_id: student.id,
        name: student.name.clone(),
        gender: student.gender,
        payment_status: student.payment_status,
        payment_date: student.payment_date,
        cells: dates
            .iter()
            .map(|date| reconciler.cell_state(student.id, *date))
            .collect(),
    };

    let female: Vec<SheetRow> = students
        .iter()
        .filter(|s| s.gender == Gender::Female)
        .map(row)
        .collect();
    let male: Vec<SheetRow> = students
        .iter()
        .filter(|s| s.gender == Gender::Male)
        .map(row)
        .collect();

    AttendanceSheet {
        group_id: group.id,
        group_name: group.name.clone(),
        month: month.to_string(),
        month_label: month.label(),
        dates,
        mode: reconciler.mode(),
        pending: reconciler.pending().len(),
        total_female: female.len(),
        total_male: male.len(),
        rows: female.into_iter().chain(male).collect(),
    }
}

async fn accessible_group(
    auth: &AuthUser,
    roster: &dyn RosterStore,
    sessions: &EditSessions,
    group_id: u64,
) -> Result<Group, AppError> {
    let group = within(sessions.call_timeout(), roster.find_group(group_id))
        .await?
        .ok_or_else(|| AppError::NotFound("Group not found".into()))?;
    auth.require_access(&group)?;
    Ok(group)
}

/// Attendance sheet of a group
#[utoipa::path(
    get,
    path = "/api/v1/groups/{group_id}/attendance",
    params(("group_id" = u64, Path, description = "Group ID"), SheetQuery),
    responses(
        (status = 200, description = "Attendance sheet for the month", body = AttendanceSheet),
        (status = 400, description = "Malformed month"),
        (status = 403, description = "Group belongs to another instructor"),
        (status = 404, description = "Group not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn get_sheet(
    auth: AuthUser,
    path: web::Path<u64>,
    query: web::Query<SheetQuery>,
    roster: web::Data<dyn RosterStore>,
    store: web::Data<dyn AttendanceStore>,
    sessions: web::Data<EditSessions>,
) -> Result<impl Responder, AppError> {
    let group_id = path.into_inner();
    let group = accessible_group(&auth, roster.get_ref(), &sessions, group_id).await?;

    let month = match query.month.as_deref() {
        Some(raw) => raw.parse::<MonthKey>().map_err(AppError::BadRequest)?,
        None => MonthKey::of(group.start_date),
    };

    let students = within(sessions.call_timeout(), roster.group_students(group_id)).await?;

    let sheet = match sessions.get(auth.user_id, group_id).await {
        Some(session) => {
            let reconciler = session.lock().await;
            build_sheet(&group, &students, month, &reconciler)
        }
        None => {
            let snapshot =
                Reconciler::load(store.get_ref(), group_id, sessions.call_timeout()).await?;
            build_sheet(&group, &students, month, &snapshot)
        }
    };

    Ok(HttpResponse::Ok().json(sheet))
}

/// Start taking attendance
#[utoipa::path(
    post,
    path = "/api/v1/groups/{group_id}/attendance/edit",
    params(("group_id" = u64, Path, description = "Group ID")),
    responses(
        (status = 200, description = "Edit mode enabled", body = Object, example = json!({
            "message": "Edit mode enabled", "mode": "editing", "pending": 0
        })),
        (status = 409, description = "Already editing")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn enter_edit(
    auth: AuthUser,
    path: web::Path<u64>,
    roster: web::Data<dyn RosterStore>,
    store: web::Data<dyn AttendanceStore>,
    sessions: web::Data<EditSessions>,
) -> Result<impl Responder, AppError> {
    let group_id = path.into_inner();
    accessible_group(&auth, roster.get_ref(), &sessions, group_id).await?;

    let session = match sessions.get(auth.user_id, group_id).await {
        Some(session) => {
            {
                let mut reconciler = session.lock().await;
                // Changes left over from a failed save are kept for a retry.
                if !reconciler.is_editing() && reconciler.pending().is_empty() {
                    reconciler.refresh(store.get_ref()).await?;
                }
            }
            session
        }
        None => sessions.open(auth.user_id, group_id, store.get_ref()).await?,
    };

    let mut reconciler = session.lock().await;
    reconciler.enter_edit_mode()?;
    info!(user_id = auth.user_id, group_id, "Attendance edit started");

    Ok(HttpResponse::Ok().json(json!({
        "message": "Edit mode enabled",
        "mode": reconciler.mode(),
        "pending": reconciler.pending().len(),
    })))
}

/// Toggle one attendance cell
#[utoipa::path(
    post,
    path = "/api/v1/groups/{group_id}/attendance/toggle",
    params(("group_id" = u64, Path, description = "Group ID")),
    request_body = ToggleRequest,
    responses(
        (status = 200, description = "Cell toggled, or ignored when not editing", body = ToggleResponse),
        (status = 400, description = "Date is not a session of the group")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn toggle_cell(
    auth: AuthUser,
    path: web::Path<u64>,
    body: web::Json<ToggleRequest>,
    roster: web::Data<dyn RosterStore>,
    store: web::Data<dyn AttendanceStore>,
    sessions: web::Data<EditSessions>,
) -> Result<impl Responder, AppError> {
    let group_id = path.into_inner();
    let group = accessible_group(&auth, roster.get_ref(), &sessions, group_id).await?;

    if !group.day.matches(body.date) {
        return Err(AppError::BadRequest(format!(
            "{} is not a {} session",
            body.date, group.day
        )));
    }

    let students = within(sessions.call_timeout(), roster.group_students(group_id)).await?;
    if !students.iter().any(|s| s.id == body.student_id) {
        return Err(AppError::BadRequest(format!(
            "Student {} is not enrolled in this group",
            body.student_id
        )));
    }

    let session = sessions.open(auth.user_id, group_id, store.get_ref()).await?;
    let mut reconciler = session.lock().await;

    let outcome = reconciler.toggle_cell(body.student_id, body.date);

    Ok(HttpResponse::Ok().json(ToggleResponse {
        outcome,
        state: reconciler.cell_state(body.student_id, body.date),
        pending: reconciler.pending().len(),
    }))
}

/// Save pending attendance changes
#[utoipa::path(
    post,
    path = "/api/v1/groups/{group_id}/attendance/save",
    params(("group_id" = u64, Path, description = "Group ID")),
    responses(
        (status = 200, description = "Every change applied", body = SaveResponse),
        (status = 409, description = "Not editing"),
        (status = 502, description = "A change failed; earlier ones stay applied", body = SaveResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn save(
    auth: AuthUser,
    path: web::Path<u64>,
    roster: web::Data<dyn RosterStore>,
    store: web::Data<dyn AttendanceStore>,
    sessions: web::Data<EditSessions>,
) -> Result<impl Responder, AppError> {
    let group_id = path.into_inner();
    accessible_group(&auth, roster.get_ref(), &sessions, group_id).await?;

    let session = sessions
        .get(auth.user_id, group_id)
        .await
        .ok_or(ReconcileError::NotEditing)?;

    let report = session.lock().await.save(store.get_ref()).await?;
    let response = SaveResponse {
        message: report.message(),
        report,
    };

    if response.report.is_complete() {
        info!(
            user_id = auth.user_id,
            group_id,
            applied = response.report.applied(),
            "Attendance saved"
        );
        Ok(HttpResponse::Ok().json(response))
    } else {
        Ok(HttpResponse::BadGateway().json(response))
    }
}

/// Discard pending attendance changes
#[utoipa::path(
    post,
    path = "/api/v1/groups/{group_id}/attendance/cancel",
    params(("group_id" = u64, Path, description = "Group ID")),
    responses(
        (status = 200, description = "Pending changes discarded", body = Object, example = json!({
            "message": "Changes discarded"
        }))
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn cancel(
    auth: AuthUser,
    path: web::Path<u64>,
    sessions: web::Data<EditSessions>,
) -> Result<impl Responder, AppError> {
    let group_id = path.into_inner();

    if let Some(session) = sessions.get(auth.user_id, group_id).await {
        session.lock().await.cancel();
        sessions.close(auth.user_id, group_id).await;
    }

    Ok(HttpResponse::Ok().json(json!({ "message": "Changes discarded" })))
}

/// `/{group_id}/attendance`, mounted inside the `/groups` scope.
pub fn scope() -> actix_web::Scope {
    web::scope("/{group_id}/attendance")
        .service(web::resource("").route(web::get().to(get_sheet)))
        .service(web::resource("/edit").route(web::post().to(enter_edit)))
        .service(web::resource("/toggle").route(web::post().to(toggle_cell)))
        .service(web::resource("/save").route(web::post().to(save)))
        .service(web::resource("/cancel").route(web::post().to(cancel)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::{Subject, generate_access_token};
    use crate::config::Config;
    use crate::model::group::Level;
    use crate::schedule::Weekday;
    use crate::store::memory::MemoryStore;
    use actix_web::{App, http::StatusCode, test};
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;

    const SECRET: &str = "test-secret";

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn config() -> Config {
        Config::from_lookup(|key| match key {
            "SERVER_ADDR" => Some("127.0.0.1:0".into()),
            "DATABASE_URL" => Some("mysql://unused".into()),
            "JWT_SECRET" => Some(SECRET.into()),
            _ => None,
        })
        .unwrap()
    }

    fn group() -> Group {
        Group {
            id: 7,
            name: "Lunes 7:00pm".into(),
            instructor_id: 2,
            instructor: "Andrea Mora".into(),
            day: Weekday::Monday,
            start_time: "7:00pm".parse().unwrap(),
            end_time: "8:30pm".parse().unwrap(),
            level: Level::One,
            start_date: date(2024, 5, 6),
        }
    }

    fn student(id: u64, name: &str, gender: Gender) -> Student {
        Student {
            id,
            name: name.into(),
            phone: None,
            email: None,
            gender,
            birthday: None,
            emergency_name: None,
            emergency_phone: None,
            payment_status: PaymentStatus::Paid,
            payment_date: None,
        }
    }

    fn store() -> Arc<MemoryStore> {
        Arc::new(
            MemoryStore::new()
                .with_group(
                    group(),
                    vec![
                        student(2, "Luis", Gender::Male),
                        student(1, "Ana", Gender::Female),
                    ],
                )
                .with_record("rec-1", 7, 1, date(2024, 5, 6))
                .with_next_id(41),
        )
    }

    fn token(user_id: u64, role: u8, instructor_id: Option<u64>) -> String {
        let subject = Subject {
            user_id,
            username: "staff",
            role,
            instructor_id,
        };
        format!(
            "Bearer {}",
            generate_access_token(&subject, SECRET, 300).unwrap()
        )
    }

    fn admin() -> String {
        token(1, 1, None)
    }

    macro_rules! app {
        ($store:expr) => {{
            let store = $store.clone();
            let attendance: Arc<dyn AttendanceStore> = store.clone();
            let roster: Arc<dyn RosterStore> = store;
            test::init_service(
                App::new()
                    .app_data(web::Data::new(config()))
                    .app_data(web::Data::from(attendance))
                    .app_data(web::Data::from(roster))
                    .app_data(web::Data::new(EditSessions::new(
                        Duration::from_secs(60),
                        Duration::from_secs(5),
                    )))
                    .service(web::scope("/groups").service(scope())),
            )
            .await
        }};
    }

    fn post(uri: &str, auth: &str) -> test::TestRequest {
        test::TestRequest::post()
            .uri(uri)
            .insert_header(("Authorization", auth.to_string()))
    }

    fn toggle(auth: &str, student_id: u64, day: &str) -> test::TestRequest {
        post("/groups/7/attendance/toggle", auth)
            .set_json(json!({ "student_id": student_id, "date": day }))
    }

    #[actix_web::test]
    async fn sheet_lists_women_first_with_cell_states() {
        let store = store();
        let app = app!(store);

        let req = test::TestRequest::get()
            .uri("/groups/7/attendance")
            .insert_header(("Authorization", admin()))
            .to_request();
        let sheet: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(sheet["month"], "2024-05");
        assert_eq!(sheet["month_label"], "Mayo 2024");
        assert_eq!(
            sheet["dates"],
            json!(["2024-05-06", "2024-05-13", "2024-05-20", "2024-05-27"])
        );
        assert_eq!(sheet["mode"], "viewing");
        assert_eq!(sheet["rows"][0]["name"], "Ana");
        assert_eq!(sheet["rows"][0]["cells"][0], "present");
        assert_eq!(sheet["rows"][0]["cells"][1], "absent_readonly");
        assert_eq!(sheet["rows"][1]["name"], "Luis");
        assert_eq!(sheet["total_female"], 1);
        assert_eq!(sheet["total_male"], 1);
    }

    #[actix_web::test]
    async fn instructors_only_reach_their_own_groups() {
        let store = store();
        let app = app!(store);

        let req = test::TestRequest::get()
            .uri("/groups/7/attendance")
            .insert_header(("Authorization", token(5, 2, Some(3))))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

        let req = test::TestRequest::get()
            .uri("/groups/7/attendance?month=2024-06")
            .insert_header(("Authorization", token(5, 2, Some(2))))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn requests_without_a_token_are_rejected() {
        let store = store();
        let app = app!(store);

        let req = test::TestRequest::get().uri("/groups/7/attendance").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn edit_toggle_save_round() {
        let store = store();
        let app = app!(store);

        // Clicks before edit mode are ignored.
        let resp: Value = test::call_and_read_body_json(&app, toggle(&admin(), 2, "2024-05-13").to_request()).await;
        assert_eq!(resp["outcome"], "ignored");
        assert_eq!(resp["state"], "absent_readonly");

        let resp = test::call_service(&app, post("/groups/7/attendance/edit", &admin()).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp: Value = test::call_and_read_body_json(&app, toggle(&admin(), 2, "2024-05-13").to_request()).await;
        assert_eq!(resp["outcome"], "pending_add");
        assert_eq!(resp["state"], "pending_add");
        assert_eq!(resp["pending"], 1);

        let resp: Value = test::call_and_read_body_json(&app, toggle(&admin(), 1, "2024-05-06").to_request()).await;
        assert_eq!(resp["state"], "pending_delete");

        let resp = test::call_service(&app, post("/groups/7/attendance/save", &admin()).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "Attendance saved");
        assert_eq!(body["report"]["changes"][0]["status"], "applied");
        assert_eq!(body["report"]["changes"][0]["key"], "rec-1");
        assert_eq!(body["report"]["changes"][1]["key"], "rec-42");

        let records = store.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records.values().next().unwrap().student_id, 2);
    }

    #[actix_web::test]
    async fn edit_twice_conflicts() {
        let store = store();
        let app = app!(store);

        let first = test::call_service(&app, post("/groups/7/attendance/edit", &admin()).to_request()).await;
        assert_eq!(first.status(), StatusCode::OK);
        let second = test::call_service(&app, post("/groups/7/attendance/edit", &admin()).to_request()).await;
        assert_eq!(second.status(), StatusCode::CONFLICT);
    }

    #[actix_web::test]
    async fn toggles_off_the_group_weekday_are_rejected() {
        let store = store();
        let app = app!(store);

        test::call_service(&app, post("/groups/7/attendance/edit", &admin()).to_request()).await;
        // 2024-05-14 is a Tuesday.
        let resp = test::call_service(&app, toggle(&admin(), 1, "2024-05-14").to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn toggles_for_students_outside_the_group_are_rejected() {
        let store = store();
        let app = app!(store);

        test::call_service(&app, post("/groups/7/attendance/edit", &admin()).to_request()).await;
        let resp = test::call_service(&app, toggle(&admin(), 999, "2024-05-13").to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "Student 999 is not enrolled in this group");

        let resp: Value = test::call_and_read_body_json(&app, post("/groups/7/attendance/save", &admin()).to_request()).await;
        assert!(resp["report"]["changes"].as_array().unwrap().is_empty());

        let records = store.records();
        assert_eq!(records.len(), 1);
        assert!(records.values().all(|r| r.student_id != 999));
    }

    #[actix_web::test]
    async fn save_without_editing_conflicts() {
        let store = store();
        let app = app!(store);

        let resp = test::call_service(&app, post("/groups/7/attendance/save", &admin()).to_request()).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[actix_web::test]
    async fn partial_failures_answer_bad_gateway_with_the_report() {
        let store = store();
        store.fail_create(2, date(2024, 5, 13));
        let app = app!(store);

        test::call_service(&app, post("/groups/7/attendance/edit", &admin()).to_request()).await;
        test::call_service(&app, toggle(&admin(), 1, "2024-05-06").to_request()).await;
        test::call_service(&app, toggle(&admin(), 2, "2024-05-13").to_request()).await;

        let resp = test::call_service(&app, post("/groups/7/attendance/save", &admin()).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["report"]["changes"][0]["status"], "applied");
        assert_eq!(body["report"]["changes"][1]["status"], "failed");

        // Student 1's delete went through before the failure.
        assert!(store.records().is_empty());
    }

    #[actix_web::test]
    async fn cancel_discards_pending_toggles() {
        let store = store();
        let app = app!(store);

        test::call_service(&app, post("/groups/7/attendance/edit", &admin()).to_request()).await;
        test::call_service(&app, toggle(&admin(), 1, "2024-05-06").to_request()).await;

        let resp = test::call_service(&app, post("/groups/7/attendance/cancel", &admin()).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = test::TestRequest::get()
            .uri("/groups/7/attendance")
            .insert_header(("Authorization", admin()))
            .to_request();
        let sheet: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(sheet["mode"], "viewing");
        assert_eq!(sheet["pending"], 0);
        assert_eq!(sheet["rows"][0]["cells"][0], "present");
        assert!(!store.calls().iter().any(|c| c.starts_with("delete")));
    }
}
