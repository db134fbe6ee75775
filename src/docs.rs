use crate::api::attendance::{AttendanceSheet, SaveResponse, SheetRow, ToggleRequest, ToggleResponse};
use crate::api::groups::{GroupDetails, GroupForm, GroupListResponse, SlotOptions, TimeOption};
use crate::api::students::StudentDetails;
use crate::auth::handlers::LoginResponse;
use crate::billing::{PaymentConcept, PaymentMethod, Receipt, ReceiptRequest};
use crate::model::group::{Group, GroupMembership, Level};
use crate::model::student::{Gender, PaymentStatus, Student};
use crate::models::LoginReqDto;
use crate::reconciler::{
    CellState, ChangeAction, ChangeReport, ChangeStatus, EditMode, SaveReport, Toggle,
};
use crate::schedule::Weekday;
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Dance School Admin API",
        version = "1.0.0",
        description = r#"
## Dance school administration

Back office for a dance school: class groups, their students, weekly
attendance and payment receipts.

### 🔹 Key Features
- **Groups**
  - Schedule classes on a free weekly slot, list and search them, see who is enrolled
- **Attendance**
  - Monthly sheet per group; enter edit mode, toggle cells, then save or cancel
  - Saves apply changes one by one and report exactly which reached the store
- **Students**
  - Contact details and the groups each student attends
- **Payments**
  - Monthly fee from the number of groups, private lessons and workshops

### 🔐 Security
Every `/api/v1` endpoint requires a **JWT Bearer** access token.
Instructors only see their own groups; scheduling and payments are admin only.
"#,
    ),
    paths(
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,

        crate::api::groups::list_groups,
        crate::api::groups::group_details,
        crate::api::groups::create_group,
        crate::api::groups::update_group,
        crate::api::groups::delete_group,
        crate::api::groups::slots,

        crate::api::attendance::get_sheet,
        crate::api::attendance::enter_edit,
        crate::api::attendance::toggle_cell,
        crate::api::attendance::save,
        crate::api::attendance::cancel,

        crate::api::students::get_student,

        crate::api::payments::receipt
    ),
    components(
        schemas(
            LoginReqDto,
            LoginResponse,
            Group,
            GroupMembership,
            Level,
            Weekday,
            GroupForm,
            GroupListResponse,
            GroupDetails,
            SlotOptions,
            TimeOption,
            Student,
            Gender,
            PaymentStatus,
            StudentDetails,
            AttendanceSheet,
            SheetRow,
            CellState,
            EditMode,
            Toggle,
            ToggleRequest,
            ToggleResponse,
            SaveResponse,
            SaveReport,
            ChangeReport,
            ChangeAction,
            ChangeStatus,
            PaymentConcept,
            PaymentMethod,
            ReceiptRequest,
            Receipt
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Login and token rotation"),
        (name = "Groups", description = "Class group scheduling"),
        (name = "Attendance", description = "Attendance sheets and edit sessions"),
        (name = "Students", description = "Student records"),
        (name = "Payments", description = "Payment receipts"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}
