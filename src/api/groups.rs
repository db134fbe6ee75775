use actix_web::{HttpResponse, Responder, web};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{debug, info, instrument};
use utoipa::{IntoParams, ToSchema};

use crate::auth::auth::AuthUser;
use crate::config::Config;
use crate::error::AppError;
use crate::model::group::{Group, GroupRow, Level};
use crate::model::student::{Gender, Student};
use crate::schedule::{
    ClassTime, MonthKey, Slot, Weekday, format_date, slot_taken, start_date_options, time_options,
};
use crate::store::mysql::GROUP_COLUMNS;
use crate::store::{RosterStore, StoreError, within};

#[derive(Debug, Deserialize, IntoParams)]
pub struct GroupQuery {
    /// Case-insensitive match on the group name.
    pub search: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct GroupListResponse {
    pub data: Vec<Group>,
    #[schema(example = 4)]
    pub total: usize,
}

#[derive(Serialize, ToSchema)]
pub struct GroupDetails {
    pub group: Group,
    #[schema(example = "Mayo 2024")]
    pub month_label: String,
    #[schema(example = "06/05/2024")]
    pub start_date_label: String,
    pub female: Vec<Student>,
    pub male: Vec<Student>,
    pub total_female: usize,
    pub total_male: usize,
    pub total: usize,
}

/// Body of group create and update.
#[derive(Debug, Deserialize, ToSchema)]
pub struct GroupForm {
    #[schema(example = 2)]
    pub instructor_id: Option<u64>,
    pub day: Option<Weekday>,
    #[schema(value_type = Option<String>, example = "7:00pm")]
    pub start_time: Option<ClassTime>,
    #[serde(default)]
    pub level: Level,
    /// Required, and used as the group name, for workshops.
    pub workshop_name: Option<String>,
    #[schema(value_type = Option<String>, format = "date", example = "2024-05-06")]
    pub start_date: Option<NaiveDate>,
}

/// A group form with every field present and the derived fields filled in.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidGroup {
    pub instructor_id: u64,
    pub name: String,
    pub day: Weekday,
    pub start_time: ClassTime,
    pub end_time: ClassTime,
    pub level: Level,
    pub start_date: NaiveDate,
}

impl GroupForm {
    pub fn validate(&self) -> Result<ValidGroup, AppError> {
        let missing = || AppError::BadRequest("All fields are required".into());

        let (Some(instructor_id), Some(day), Some(start_time), Some(start_date)) =
            (self.instructor_id, self.day, self.start_time, self.start_date)
        else {
            return Err(missing());
        };

        let name = if self.level.is_workshop() {
            self.workshop_name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .ok_or_else(missing)?
                .to_string()
        } else {
            format!("{} {}", day, start_time)
        };

        Ok(ValidGroup {
            instructor_id,
            name,
            day,
            start_time,
            end_time: start_time.end_time(),
            level: self.level,
            start_date,
        })
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SlotQuery {
    #[param(value_type = String, example = "Lunes")]
    pub day: Weekday,
    /// Group being edited; its own slot does not count as taken.
    pub exclude: Option<u64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TimeOption {
    #[schema(value_type = String, example = "7:00pm")]
    pub start_time: ClassTime,
    #[schema(value_type = String, example = "8:30pm")]
    pub end_time: ClassTime,
    pub available: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SlotOptions {
    pub day: Weekday,
    pub times: Vec<TimeOption>,
    #[schema(value_type = Vec<String>)]
    pub start_dates: Vec<NaiveDate>,
}

pub fn slot_options(day: Weekday, taken: &[Slot], today: NaiveDate) -> SlotOptions {
    SlotOptions {
        day,
        times: time_options()
            .into_iter()
            .map(|start| TimeOption {
                start_time: start,
                end_time: start.end_time(),
                available: !slot_taken(day, start, taken),
            })
            .collect(),
        start_dates: start_date_options(today, day),
    }
}

#[derive(sqlx::FromRow)]
struct SlotRow {
    start_time: String,
    end_time: String,
}

/// Slots other groups hold on `day`.
async fn day_slots(
    pool: &MySqlPool,
    day: Weekday,
    exclude: Option<u64>,
) -> Result<Vec<Slot>, AppError> {
    let rows = sqlx::query_as::<_, SlotRow>(
        r#"
        SELECT start_time, end_time
        FROM dance_groups
        WHERE day = ? AND id <> ?
        "#,
    )
    .bind(day.to_string())
    .bind(exclude.unwrap_or(0))
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| -> Result<Slot, AppError> {
            Ok(Slot {
                day,
                start: row.start_time.parse().map_err(StoreError::Decode)?,
                end: row.end_time.parse().map_err(StoreError::Decode)?,
            })
        })
        .collect()
}

async fn ensure_slot_free(
    pool: &MySqlPool,
    group: &ValidGroup,
    exclude: Option<u64>,
) -> Result<(), AppError> {
    let taken = day_slots(pool, group.day, exclude).await?;
    if slot_taken(group.day, group.start_time, &taken) {
        return Err(AppError::Conflict(format!(
            "{} {} overlaps another group",
            group.day, group.start_time
        )));
    }
    Ok(())
}

async fn ensure_instructor(pool: &MySqlPool, instructor_id: u64) -> Result<(), AppError> {
    let found = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM instructors WHERE id = ?")
        .bind(instructor_id)
        .fetch_one(pool)
        .await?;

    if found == 0 {
        return Err(AppError::BadRequest("Unknown instructor".into()));
    }
    Ok(())
}

async fn fetch_group(pool: &MySqlPool, group_id: u64) -> Result<Group, AppError> {
    let sql = format!(
        "SELECT {} FROM dance_groups g JOIN instructors i ON i.id = g.instructor_id WHERE g.id = ?",
        GROUP_COLUMNS
    );

    let row = sqlx::query_as::<_, GroupRow>(&sql)
        .bind(group_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Group not found".into()))?;

    Group::try_from(row).map_err(|e| StoreError::Decode(e).into())
}

/// Which groups a caller may list.
#[derive(Debug, PartialEq, Eq)]
enum ListScope {
    Everything,
    Instructor(u64),
    Nothing,
}

fn list_scope(auth: &AuthUser) -> ListScope {
    if !auth.is_instructor() {
        return ListScope::Everything;
    }
    match auth.instructor_id {
        Some(id) => ListScope::Instructor(id),
        // An instructor login not linked to any instructor teaches nothing.
        None => ListScope::Nothing,
    }
}

/// `LIKE` pattern for a name search; blank searches match everything.
fn search_pattern(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", s.to_lowercase()))
}

/// List groups
#[utoipa::path(
    get,
    path = "/api/v1/groups",
    params(GroupQuery),
    responses(
        (status = 200, description = "Groups visible to the caller", body = GroupListResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Groups"
)]
pub async fn list_groups(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<GroupQuery>,
) -> Result<impl Responder, AppError> {
    let instructor = match list_scope(&auth) {
        ListScope::Everything => None,
        ListScope::Instructor(id) => Some(id),
        ListScope::Nothing => {
            return Ok(HttpResponse::Ok().json(GroupListResponse {
                data: Vec::new(),
                total: 0,
            }));
        }
    };
    let search = search_pattern(query.search.as_deref());

    let sql = format!(
        r#"
        SELECT {}
        FROM dance_groups g
        JOIN instructors i ON i.id = g.instructor_id
        WHERE (? IS NULL OR g.instructor_id = ?)
          AND (? IS NULL OR LOWER(g.name) LIKE ?)
        ORDER BY g.name
        "#,
        GROUP_COLUMNS
    );
    debug!(?instructor, search = ?search, "Listing groups");

    let rows = sqlx::query_as::<_, GroupRow>(&sql)
        .bind(instructor)
        .bind(instructor)
        .bind(&search)
        .bind(&search)
        .fetch_all(pool.get_ref())
        .await?;

    let groups = rows
        .into_iter()
        .map(Group::try_from)
        .collect::<Result<Vec<_>, _>>()
        .map_err(StoreError::Decode)?;

    Ok(HttpResponse::Ok().json(GroupListResponse {
        total: groups.len(),
        data: groups,
    }))
}

/// Group details
#[utoipa::path(
    get,
    path = "/api/v1/groups/{group_id}",
    params(("group_id" = u64, Path, description = "Group ID")),
    responses(
        (status = 200, description = "Group with its students", body = GroupDetails),
        (status = 403, description = "Group belongs to another instructor"),
        (status = 404, description = "Group not found", body = Object, example = json!({
            "message": "Group not found"
        }))
    ),
    security(("bearer_auth" = [])),
    tag = "Groups"
)]
pub async fn group_details(
    auth: AuthUser,
    path: web::Path<u64>,
    roster: web::Data<dyn RosterStore>,
    config: web::Data<Config>,
) -> Result<impl Responder, AppError> {
    let group_id = path.into_inner();

    let group = within(config.store_timeout, roster.find_group(group_id))
        .await?
        .ok_or_else(|| AppError::NotFound("Group not found".into()))?;
    auth.require_access(&group)?;

    let students = within(config.store_timeout, roster.group_students(group_id)).await?;
    let (female, male): (Vec<Student>, Vec<Student>) = students
        .into_iter()
        .partition(|s| s.gender == Gender::Female);

    Ok(HttpResponse::Ok().json(GroupDetails {
        month_label: MonthKey::of(group.start_date).label(),
        start_date_label: format_date(group.start_date),
        total_female: female.len(),
        total_male: male.len(),
        total: female.len() + male.len(),
        female,
        male,
        group,
    }))
}

/// Create group
#[utoipa::path(
    post,
    path = "/api/v1/groups",
    request_body = GroupForm,
    responses(
        (status = 201, description = "Group created", body = Object, example = json!({
            "message": "Group created", "id": 7
        })),
        (status = 400, description = "Missing fields"),
        (status = 409, description = "Time slot taken")
    ),
    security(("bearer_auth" = [])),
    tag = "Groups"
)]
#[instrument(name = "group_create", skip(auth, pool, form), fields(user_id = auth.user_id))]
pub async fn create_group(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    form: web::Json<GroupForm>,
) -> Result<impl Responder, AppError> {
    auth.require_admin()?;
    let group = form.validate()?;

    ensure_instructor(pool.get_ref(), group.instructor_id).await?;
    ensure_slot_free(pool.get_ref(), &group, None).await?;

    let result = sqlx::query(
        r#"
        INSERT INTO dance_groups
        (name, instructor_id, day, start_time, end_time, level, start_date)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&group.name)
    .bind(group.instructor_id)
    .bind(group.day.to_string())
    .bind(group.start_time.to_string())
    .bind(group.end_time.to_string())
    .bind(group.level.to_string())
    .bind(group.start_date)
    .execute(pool.get_ref())
    .await?;

    let id = result.last_insert_id();
    info!(group_id = id, name = %group.name, "Group created");

    Ok(HttpResponse::Created().json(json!({ "message": "Group created", "id": id })))
}

/// Update group
#[utoipa::path(
    put,
    path = "/api/v1/groups/{group_id}",
    params(("group_id" = u64, Path, description = "Group ID")),
    request_body = GroupForm,
    responses(
        (status = 200, description = "Group updated", body = Object, example = json!({
            "message": "Group updated"
        })),
        (status = 404, description = "Group not found"),
        (status = 409, description = "Time slot taken")
    ),
    security(("bearer_auth" = [])),
    tag = "Groups"
)]
#[instrument(name = "group_update", skip(auth, pool, form), fields(user_id = auth.user_id))]
pub async fn update_group(
    auth: AuthUser,
    path: web::Path<u64>,
    pool: web::Data<MySqlPool>,
    form: web::Json<GroupForm>,
) -> Result<impl Responder, AppError> {
    auth.require_admin()?;
    let group_id = path.into_inner();
    let mut group = form.validate()?;

    let existing = fetch_group(pool.get_ref(), group_id).await?;
    // Classes already under way keep the date they started on.
    if existing.start_date < Local::now().date_naive() {
        group.start_date = existing.start_date;
    }

    ensure_instructor(pool.get_ref(), group.instructor_id).await?;
    ensure_slot_free(pool.get_ref(), &group, Some(group_id)).await?;

    sqlx::query(
        r#"
        UPDATE dance_groups
        SET name = ?, instructor_id = ?, day = ?, start_time = ?, end_time = ?,
            level = ?, start_date = ?
        WHERE id = ?
        "#,
    )
    .bind(&group.name)
    .bind(group.instructor_id)
    .bind(group.day.to_string())
    .bind(group.start_time.to_string())
    .bind(group.end_time.to_string())
    .bind(group.level.to_string())
    .bind(group.start_date)
    .bind(group_id)
    .execute(pool.get_ref())
    .await?;

    info!(group_id, name = %group.name, "Group updated");
    Ok(HttpResponse::Ok().json(json!({ "message": "Group updated" })))
}

/// Delete group
#[utoipa::path(
    delete,
    path = "/api/v1/groups/{group_id}",
    params(("group_id" = u64, Path, description = "Group ID")),
    responses(
        (status = 200, description = "Group deleted with its attendance", body = Object, example = json!({
            "message": "Group deleted"
        })),
        (status = 404, description = "Group not found"),
        (status = 409, description = "Students are still enrolled", body = Object, example = json!({
            "message": "Group still has 3 students; move them to another group first"
        }))
    ),
    security(("bearer_auth" = [])),
    tag = "Groups"
)]
#[instrument(name = "group_delete", skip(auth, pool, roster, config), fields(user_id = auth.user_id))]
pub async fn delete_group(
    auth: AuthUser,
    path: web::Path<u64>,
    pool: web::Data<MySqlPool>,
    roster: web::Data<dyn RosterStore>,
    config: web::Data<Config>,
) -> Result<impl Responder, AppError> {
    auth.require_admin()?;
    let group_id = path.into_inner();

    within(config.store_timeout, roster.find_group(group_id))
        .await?
        .ok_or_else(|| AppError::NotFound("Group not found".into()))?;
    let enrolled = within(config.store_timeout, roster.group_students(group_id)).await?;
    if !enrolled.is_empty() {
        return Err(still_enrolled(enrolled.len()));
    }

    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM attendance WHERE group_id = ?")
        .bind(group_id)
        .execute(&mut *tx)
        .await?;
    // Enrolments may have appeared since the check above.
    let deleted = sqlx::query(
        r#"
        DELETE FROM dance_groups
        WHERE id = ?
          AND NOT EXISTS (SELECT 1 FROM student_groups WHERE group_id = ?)
        "#,
    )
    .bind(group_id)
    .bind(group_id)
    .execute(&mut *tx)
    .await?;

    if deleted.rows_affected() == 0 {
        // Dropping the transaction rolls the attendance delete back.
        let enrolled = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM student_groups WHERE group_id = ?",
        )
        .bind(group_id)
        .fetch_one(&mut *tx)
        .await?;
        return Err(if enrolled > 0 {
            still_enrolled(enrolled as usize)
        } else {
            AppError::NotFound("Group not found".into())
        });
    }

    tx.commit().await?;

    info!(group_id, "Group deleted");
    Ok(HttpResponse::Ok().json(json!({ "message": "Group deleted" })))
}

fn still_enrolled(students: usize) -> AppError {
    AppError::Conflict(format!(
        "Group still has {} students; move them to another group first",
        students
    ))
}

/// Start times and start dates offered for a weekday
#[utoipa::path(
    get,
    path = "/api/v1/groups/slots",
    params(SlotQuery),
    responses((status = 200, description = "Start time availability", body = SlotOptions)),
    security(("bearer_auth" = [])),
    tag = "Groups"
)]
pub async fn slots(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<SlotQuery>,
) -> Result<impl Responder, AppError> {
    let taken = day_slots(pool.get_ref(), query.day, query.exclude).await?;
    Ok(HttpResponse::Ok().json(slot_options(
        query.day,
        &taken,
        Local::now().date_naive(),
    )))
}
