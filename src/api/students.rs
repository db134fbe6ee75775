use actix_web::{HttpResponse, Responder, web};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::auth::AuthUser;
use crate::config::Config;
use crate::error::AppError;
use crate::model::group::GroupMembership;
use crate::model::student::Student;
use crate::store::{RosterStore, within};

#[derive(Serialize, ToSchema)]
pub struct StudentDetails {
    pub student: Student,
    /// Primary group first.
    pub groups: Vec<GroupMembership>,
}

pub async fn fetch_student(
    roster: &dyn RosterStore,
    config: &Config,
    student_id: u64,
) -> Result<Student, AppError> {
    within(config.store_timeout, roster.find_student(student_id))
        .await?
        .ok_or_else(|| AppError::NotFound("Student not found".into()))
}

/// The student's groups, primary first and then by name.
pub async fn fetch_memberships(
    roster: &dyn RosterStore,
    config: &Config,
    student_id: u64,
) -> Result<Vec<GroupMembership>, AppError> {
    let mut groups = within(config.store_timeout, roster.student_groups(student_id)).await?;
    order_memberships(&mut groups);
    Ok(groups)
}

fn order_memberships(groups: &mut [GroupMembership]) {
    groups.sort_by(|a, b| {
        b.is_primary
            .cmp(&a.is_primary)
            .then_with(|| a.name.cmp(&b.name))
    });
}

/// Instructors only see students enrolled in one of their groups.
fn ensure_visible(auth: &AuthUser, groups: &[GroupMembership]) -> Result<(), AppError> {
    if !auth.is_instructor() {
        return Ok(());
    }

    let shared = groups
        .iter()
        .any(|g| Some(g.instructor_id) == auth.instructor_id);
    if !shared {
        return Err(AppError::Forbidden("Not your student".into()));
    }
    Ok(())
}

/// Student details
#[utoipa::path(
    get,
    path = "/api/v1/students/{student_id}",
    params(("student_id" = u64, Path, description = "Student ID")),
    responses(
        (status = 200, description = "Student with the groups they attend", body = StudentDetails),
        (status = 403, description = "Student is not in any of the caller's groups"),
        (status = 404, description = "Student not found", body = Object, example = json!({
            "message": "Student not found"
        }))
    ),
    security(("bearer_auth" = [])),
    tag = "Students"
)]
pub async fn get_student(
    auth: AuthUser,
    path: web::Path<u64>,
    roster: web::Data<dyn RosterStore>,
    config: web::Data<Config>,
) -> Result<impl Responder, AppError> {
    let student_id = path.into_inner();

    let student = fetch_student(roster.get_ref(), &config, student_id).await?;
    let groups = fetch_memberships(roster.get_ref(), &config, student_id).await?;
    ensure_visible(&auth, &groups)?;

    Ok(HttpResponse::Ok().json(StudentDetails { student, groups }))
}
