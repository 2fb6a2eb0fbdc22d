use crate::ipc::error::{db_query_failed, ok, respond, HandlerErr};
use crate::ipc::helpers::{
    get_optional_str, get_optional_date, get_required_date, get_required_str, require_db,
};
use crate::ipc::types::{AppState, Request};
use crate::registry::{self, NewStudent};
use rusqlite::Connection;
use serde_json::json;

fn courses_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let name = get_required_str(params, "name")?;
    let modules: Vec<String> = match params.get("modules") {
        None | Some(serde_json::Value::Null) => Vec::new(),
        Some(v) => {
            let Some(arr) = v.as_array() else {
                return Err(HandlerErr::bad_params("modules must be an array of strings"));
            };
            arr.iter()
                .map(|m| {
                    m.as_str()
                        .map(|s| s.to_string())
                        .ok_or_else(|| HandlerErr::bad_params("modules must be an array of strings"))
                })
                .collect::<Result<Vec<_>, _>>()?
        }
    };
    let course = registry::create_course(conn, &name, &modules)?;
    tracing::info!(course_id = %course.course_id, modules = course.modules.len(), "course created");
    serde_json::to_value(&course).map_err(|e| HandlerErr::new("internal", e.to_string()))
}

fn students_enroll(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let course_id = get_required_str(params, "courseId")?;
    let student = NewStudent {
        name: get_required_str(params, "name")?,
        birth_date: get_optional_date(params, "birthDate")?,
        photo_url: get_optional_str(params, "photoUrl")?,
        enrollment_date: get_required_date(params, "enrollmentDate")?,
    };
    let student_id = registry::enroll_student(conn, &course_id, &student)?;
    Ok(json!({ "studentId": student_id, "courseId": course_id }))
}

fn handle_courses_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "courses": [] }));
    };
    respond(
        &req.id,
        registry::list_courses(conn)
            .map(|courses| json!({ "courses": courses }))
            .map_err(db_query_failed),
    )
}

fn handle_courses_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(
        &req.id,
        require_db(state).and_then(|conn| courses_create(conn, &req.params)),
    )
}

fn handle_students_enroll(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(
        &req.id,
        require_db(state).and_then(|conn| students_enroll(conn, &req.params)),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "courses.list" => Some(handle_courses_list(state, req)),
        "courses.create" => Some(handle_courses_create(state, req)),
        "students.enroll" => Some(handle_students_enroll(state, req)),
        _ => None,
    }
}
