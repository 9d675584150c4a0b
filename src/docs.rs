use crate::api::employee::{CreateEmployee, EmployeeListResponse, UpdateEmployee};
use crate::api::notification::CreateNotification;
use crate::api::org::{CreateLevel, CreateUnit, OrgTreeResponse, UpdateUnit};
use crate::api::payroll_period::{CreatePeriod, UpdatePeriod};
use crate::api::payslip::{GenerateError, GenerateRequest, GenerateSummary, UpdatePayslip};
use crate::api::schema::{ForeignKey, OrphanReport, TableInfo};
use crate::auth::auth::AuthUser;
use crate::model::employee::{Employee, EmployeeStatus};
use crate::model::notification::{Notification, NotificationKind};
use crate::model::org::{OrgLevel, OrgNode, OrgUnit};
use crate::model::payroll_period::{PayrollPeriod, PeriodStatus};
use crate::model::payslip::{Payslip, PayslipDetail, PayslipStatus};
use crate::model::role::Role;
use crate::model::user::User;
use crate::models::{CreateUserReq, LoginReqDto, TokenPair};
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "PayLens API",
        version = "1.0.0",
        description = r#"
## PayLens payroll backend

Multi-tenant payroll and HR API. Each tenant has its own database; the tenant
is chosen at login and carried in the access token.

### Key Features
- **Employees**: create, update, list and view employee records
- **Organization**: levels, units and the nested organization tree
- **Payroll periods**: monthly periods with a draft / open / closed lifecycle
- **Payslips**: bulk generation, adjustments, issuing and PDF export
- **Notifications**: per-user inbox, broadcast by HR
- **Schema review**: foreign keys and orphaned rows, for admins

### Security
Endpoints under `/api` require a **JWT Bearer** access token.
Writes are limited to **Admin** or **HR** unless noted otherwise.

### Response Format
Every JSON response is `{ "success": bool, "data": ..., "message": ... }`.
List endpoints return `{ items, page, per_page, total }` in `data`.
"#,
    ),
    paths(
        crate::api::health::health,

        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,
        crate::auth::handlers::me,
        crate::auth::handlers::create_user,

        crate::api::employee::create_employee,
        crate::api::employee::get_employee,
        crate::api::employee::list_employees,
        crate::api::employee::update_employee,
        crate::api::employee::delete_employee,

        crate::api::org::list_levels,
        crate::api::org::create_level,
        crate::api::org::delete_level,
        crate::api::org::list_units,
        crate::api::org::get_unit,
        crate::api::org::create_unit,
        crate::api::org::update_unit,
        crate::api::org::delete_unit,
        crate::api::org::get_tree,

        crate::api::payroll_period::create_period,
        crate::api::payroll_period::list_periods,
        crate::api::payroll_period::get_period,
        crate::api::payroll_period::update_period,
        crate::api::payroll_period::delete_period,
        crate::api::payroll_period::open_period,
        crate::api::payroll_period::close_period,
        crate::api::payroll_period::reopen_period,

        crate::api::payslip::generate_payslips,
        crate::api::payslip::list_payslips,
        crate::api::payslip::get_payslip,
        crate::api::payslip::update_payslip,
        crate::api::payslip::issue_payslip,
        crate::api::payslip::delete_payslip,
        crate::api::payslip::payslip_pdf,

        crate::api::notification::list_notifications,
        crate::api::notification::unread_count,
        crate::api::notification::create_notification,
        crate::api::notification::mark_read,
        crate::api::notification::mark_all_read,
        crate::api::notification::delete_notification,

        crate::api::schema::list_tables,
        crate::api::schema::list_relationships,
        crate::api::schema::find_orphans
    ),
    components(
        schemas(
            LoginReqDto,
            TokenPair,
            CreateUserReq,
            User,
            AuthUser,
            Role,
            CreateEmployee,
            UpdateEmployee,
            Employee,
            EmployeeStatus,
            EmployeeListResponse,
            OrgLevel,
            OrgUnit,
            OrgNode,
            OrgTreeResponse,
            CreateLevel,
            CreateUnit,
            UpdateUnit,
            PayrollPeriod,
            PeriodStatus,
            CreatePeriod,
            UpdatePeriod,
            Payslip,
            PayslipDetail,
            PayslipStatus,
            GenerateRequest,
            GenerateSummary,
            GenerateError,
            UpdatePayslip,
            Notification,
            NotificationKind,
            CreateNotification,
            TableInfo,
            ForeignKey,
            OrphanReport
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Liveness"),
        (name = "Auth", description = "Login, token rotation and user accounts"),
        (name = "Employee", description = "Employee management APIs"),
        (name = "Organization", description = "Organization hierarchy APIs"),
        (name = "Payroll", description = "Payroll period APIs"),
        (name = "Payslips", description = "Payslip generation and export APIs"),
        (name = "Notifications", description = "User notification APIs"),
        (name = "Admin", description = "Database schema review"),
    )
)]
pub struct ApiDoc;

/// Registers the `bearer_auth` scheme referenced by protected paths
pub struct SecurityAddon;

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_module_and_bearer_scheme() {
        let doc = ApiDoc::openapi();
        let paths = &doc.paths.paths;

        for path in [
            "/health",
            "/auth/login",
            "/api/employees/{employee_id}",
            "/api/org/tree",
            "/api/payroll-periods/{period_id}/payslips/generate",
            "/api/payslips/{payslip_id}/pdf",
            "/api/notifications/read-all",
            "/api/admin/schema/orphans",
        ] {
            assert!(paths.contains_key(path), "missing {}", path);
        }

        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
