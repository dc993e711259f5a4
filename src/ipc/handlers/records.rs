use crate::backend::{AttendanceStatus, DataService, Identity, NewAttendance, NewStudent};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{get_optional_str, get_required_str, workspace_parts};
use crate::ipc::types::{AppState, Request};
use crate::role::Role;
use crate::session::Session;
use crate::stats::{self, Period};
use chrono::{Datelike, Local, NaiveDate, Timelike};
use serde_json::json;

fn signed_in(session: &Session) -> Result<Identity, HandlerErr> {
    session.identity().cloned().ok_or_else(HandlerErr::not_authenticated)
}

/// Dashboard buckets reach back a year from the date, so only four-digit
/// years are accepted.
fn parse_date(raw: &str) -> Result<NaiveDate, HandlerErr> {
    let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| HandlerErr::bad_params("date must be YYYY-MM-DD"))?;
    if !(1..=9999).contains(&date.year()) {
        return Err(HandlerErr::bad_params("date year must be between 0001 and 9999")
            .with_details(json!({ "date": raw })));
    }
    Ok(date)
}

fn accounts_set_role(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (backend, session) = workspace_parts(state)?;
    let identity = signed_in(session)?;
    if session.role() != Role::Admin {
        return Err(HandlerErr::new("forbidden", "admin role required"));
    }
    let user_id = get_required_str(&req.params, "userId")?;
    let role_raw = get_required_str(&req.params, "role")?;
    let role = Role::parse(&role_raw).ok_or_else(|| HandlerErr::bad_params("unknown role"))?;
    backend.set_role(&user_id, role).map_err(HandlerErr::update)?;
    tracing::info!(user_id = %user_id, role = role.as_str(), by = %identity.id, "role changed");

    // A cached pair for the changed account is now wrong.
    session.roles.invalidate(&user_id);
    let current_role = if user_id == identity.id {
        session.sync_identity(Some(identity), backend)
    } else {
        session.role()
    };
    Ok(json!({ "ok": true, "role": current_role }))
}

fn students_list(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let (backend, session) = workspace_parts(state)?;
    signed_in(session)?;
    let students = backend.list_students().map_err(HandlerErr::query)?;
    Ok(json!({ "students": students }))
}

fn students_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (backend, session) = workspace_parts(state)?;
    signed_in(session)?;
    let first_name = get_required_str(&req.params, "firstName")?.trim().to_string();
    let last_name = get_required_str(&req.params, "lastName")?.trim().to_string();
    if first_name.is_empty() || last_name.is_empty() {
        return Err(HandlerErr::bad_params("firstName and lastName must not be empty"));
    }
    let student = backend
        .insert_student(&NewStudent {
            first_name,
            last_name,
            student_no: get_optional_str(&req.params, "studentNo")?,
        })
        .map_err(HandlerErr::update)?;
    Ok(json!({ "studentId": student.id, "student": student }))
}

fn students_count(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let (backend, session) = workspace_parts(state)?;
    signed_in(session)?;
    let count = backend.count_students().map_err(HandlerErr::query)?;
    Ok(json!({ "count": count }))
}

fn attendance_record(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (backend, session) = workspace_parts(state)?;
    let identity = signed_in(session)?;
    let student_id = get_required_str(&req.params, "studentId")?;
    let date = parse_date(&get_required_str(&req.params, "date")?)?;
    let status_raw = get_required_str(&req.params, "status")?;
    let status = AttendanceStatus::parse(status_raw.trim())
        .ok_or_else(|| HandlerErr::bad_params("status must be present, absent, late or excused"))?;
    backend
        .insert_attendance(&NewAttendance {
            student_id,
            date,
            status,
            recorded_by: Some(identity.id),
        })
        .map_err(|e| {
            HandlerErr::update(e).with_details(json!({ "table": "attendance_records" }))
        })?;
    Ok(json!({ "ok": true }))
}

fn dashboard_summary(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (backend, session) = workspace_parts(state)?;
    let identity = signed_in(session)?;
    let period_raw = get_optional_str(&req.params, "period")?;
    let period = match period_raw.as_deref() {
        None => Period::Week,
        Some(p) => Period::parse(p)
            .ok_or_else(|| HandlerErr::bad_params("period must be week, month or year"))?,
    };
    let now = Local::now();
    let today = match get_optional_str(&req.params, "today")? {
        Some(raw) => parse_date(&raw)?,
        None => now.date_naive(),
    };
    let hour = match req.params.get("hour").and_then(|v| v.as_u64()) {
        Some(h) if h < 24 => h as u32,
        Some(_) => return Err(HandlerErr::bad_params("hour must be between 0 and 23")),
        None => now.hour(),
    };

    // Profile and count failures degrade to defaults; the dashboard still renders.
    let profile = match backend.fetch_profile(&identity.id) {
        Ok(row) => Some(row),
        Err(e) => {
            tracing::error!(user_id = %identity.id, error = %format!("{e:#}"), "error fetching user profile");
            None
        }
    };
    let total_students = match backend.count_students() {
        Ok(n) => n,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "error fetching total students");
            0
        }
    };
    let (from, to) = stats::series_range(period, today);
    let rows = backend.attendance_between(from, to).map_err(HandlerErr::query)?;
    let series = stats::attendance_series(period, today, &rows);

    Ok(json!({
        "title": stats::dashboard_title(session.role()),
        "greeting": stats::greeting(hour),
        "displayName": stats::display_name(profile.as_ref(), Some(&identity)),
        "totalStudents": total_students,
        "series": series
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "accounts.setRole" => Some(respond(&req.id, accounts_set_role(state, req))),
        "students.list" => Some(respond(&req.id, students_list(state))),
        "students.create" => Some(respond(&req.id, students_create(state, req))),
        "students.count" => Some(respond(&req.id, students_count(state))),
        "attendance.record" => Some(respond(&req.id, attendance_record(state, req))),
        "dashboard.summary" => Some(respond(&req.id, dashboard_summary(state, req))),
        _ => None,
    }
}
