use crate::attendance::{AttendanceEngine, AttendanceStatus, NotificationMessages};
use crate::config::NOTIFY_MESSAGES_KEY;
use crate::db;
use crate::guard;
use crate::history;
use crate::ipc::error::{db_query_failed, respond, HandlerErr};
use crate::ipc::helpers::{get_optional_str, get_required_date, get_required_str, require_db};
use crate::ipc::types::{AppState, Request};
use crate::registry;
use crate::roster::{RosterSource, SqliteRosterSource};
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

fn snapshot(handle: &str, engine: &AttendanceEngine) -> serde_json::Value {
    json!({
        "sessionHandle": handle,
        "session": engine.session(),
        "students": engine.students(),
        "empty": engine.roster().is_empty(),
        "summary": engine.summary(),
    })
}

fn get_status(params: &serde_json::Value) -> Result<AttendanceStatus, HandlerErr> {
    let raw = get_required_str(params, "status")?;
    AttendanceStatus::parse(&raw).ok_or_else(|| {
        HandlerErr::bad_params("status must be one of present, absent, partial, pending")
    })
}

fn unknown_session(handle: &str) -> HandlerErr {
    HandlerErr::new("unknown_session", "check-in session not open")
        .with_details(json!({ "sessionHandle": handle }))
}

fn session_ref<'a>(
    state: &'a AppState,
    params: &serde_json::Value,
) -> Result<(String, &'a AttendanceEngine), HandlerErr> {
    let handle = get_required_str(params, "sessionHandle")?;
    match state.sessions.get(&handle) {
        Some(engine) => Ok((handle, engine)),
        None => Err(unknown_session(&handle)),
    }
}

/// Runs one mutation against an open session and returns the updated
/// snapshot. A rejected mutation leaves the session unchanged.
fn mutate<F>(state: &mut AppState, params: &serde_json::Value, f: F) -> Result<serde_json::Value, HandlerErr>
where
    F: FnOnce(&mut AttendanceEngine, &serde_json::Value) -> Result<(), HandlerErr>,
{
    let handle = get_required_str(params, "sessionHandle")?;
    let Some(engine) = state.sessions.get_mut(&handle) else {
        return Err(unknown_session(&handle));
    };
    f(engine, params)?;
    Ok(snapshot(&handle, engine))
}

fn notify_messages(conn: Option<&Connection>) -> NotificationMessages {
    let Some(conn) = conn else {
        return NotificationMessages::default();
    };
    match db::settings_get_json(conn, NOTIFY_MESSAGES_KEY) {
        Ok(Some(v)) => serde_json::from_value(v).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "ignoring malformed notification messages setting");
            NotificationMessages::default()
        }),
        Ok(None) => NotificationMessages::default(),
        Err(e) => {
            tracing::warn!(error = %e, "failed to read notification messages setting");
            NotificationMessages::default()
        }
    }
}

fn checkin_set_notify_messages(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let defaults = NotificationMessages::default();
    let messages = NotificationMessages {
        warranted: get_optional_str(params, "warranted")?.unwrap_or(defaults.warranted),
        neutral: get_optional_str(params, "neutral")?.unwrap_or(defaults.neutral),
    };
    let value = serde_json::to_value(&messages).map_err(|e| HandlerErr::new("internal", e.to_string()))?;
    db::settings_set_json(conn, NOTIFY_MESSAGES_KEY, &value)
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    Ok(value)
}

fn checkin_open(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let course_id = get_required_str(params, "courseId")?;
    let date = get_required_date(params, "date")?;
    if let Some((open_handle, _)) = state
        .sessions
        .iter()
        .find(|(_, e)| e.session().course_id == course_id && e.session().date == date)
    {
        return Err(HandlerErr::new(
            "session_already_open",
            "a check-in session for this course and date is already open",
        )
        .with_details(json!({
            "courseId": course_id,
            "date": date,
            "sessionHandle": open_handle,
        })));
    }
    let conn = require_db(state)?;

    let roster = SqliteRosterSource::new(conn)
        .load(&course_id, date)
        .map_err(|e| {
            tracing::warn!(course_id = %course_id, %date, error = %e, "roster load failed");
            HandlerErr::from(e)
        })?;

    let handle = Uuid::new_v4().to_string();
    let engine = AttendanceEngine::new(roster);
    tracing::info!(
        session = %handle,
        course_id = %course_id,
        %date,
        students = engine.students().len(),
        modules = engine.session().modules.len(),
        "check-in session opened"
    );
    let out = snapshot(&handle, &engine);
    state.sessions.insert(handle, engine);
    Ok(out)
}

fn checkin_get(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (handle, engine) = session_ref(state, params)?;
    Ok(snapshot(&handle, engine))
}

fn checkin_set_overall(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    mutate(state, params, |engine, p| {
        let student_id = get_required_str(p, "studentId")?;
        let status = get_status(p)?;
        engine.set_overall_status(&student_id, status)?;
        Ok(())
    })
}

fn checkin_set_module(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    mutate(state, params, |engine, p| {
        let student_id = get_required_str(p, "studentId")?;
        let module_id = get_required_str(p, "moduleId")?;
        let status = get_status(p)?;
        engine.set_module_status(&student_id, &module_id, status)?;
        Ok(())
    })
}

fn checkin_mark_all_present(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    mutate(state, params, |engine, _| {
        engine.mark_all_present();
        Ok(())
    })
}

fn checkin_reset_all(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    mutate(state, params, |engine, _| {
        engine.reset_all();
        Ok(())
    })
}

fn checkin_set_justification(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    mutate(state, params, |engine, p| {
        let student_id = get_required_str(p, "studentId")?;
        let text = get_optional_str(p, "text")?.unwrap_or_default();
        engine.set_justification(&student_id, &text)?;
        Ok(())
    })
}

fn checkin_notification(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (_, engine) = session_ref(state, params)?;
    let student_id = get_required_str(params, "studentId")?;
    let messages = notify_messages(state.db.as_ref());
    let decision = engine.notification(&student_id, &messages)?;
    serde_json::to_value(&decision).map_err(|e| HandlerErr::new("internal", e.to_string()))
}

fn checkin_validate(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (_, engine) = session_ref(state, params)?;
    Ok(match guard::validate_for_submission(engine.students()) {
        Ok(()) => json!({ "ok": true, "pendingCount": 0 }),
        Err(w) => json!({ "ok": false, "pendingCount": w.pending_count }),
    })
}

fn checkin_submit(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let handle = get_required_str(params, "sessionHandle")?;
    let acknowledge = params
        .get("acknowledgePending")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let Some(conn) = state.db.as_ref() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    let Some(engine) = state.sessions.get(&handle) else {
        return Err(unknown_session(&handle));
    };

    let decision = guard::confirm_submission(engine.students(), acknowledge).map_err(|w| {
        tracing::warn!(session = %handle, pending = w.pending_count, "submission needs acknowledgement");
        HandlerErr::from(w)
    })?;

    let Some(engine) = state.sessions.remove(&handle) else {
        return Err(unknown_session(&handle));
    };
    let roster = engine.finish();
    match history::record_submission(conn, &roster, decision) {
        Ok(receipt) => {
            tracing::info!(
                session = %handle,
                submission = %receipt.submission_id,
                students = receipt.student_count,
                pending = receipt.pending_count,
                "check-in submitted"
            );
            serde_json::to_value(&receipt).map_err(|e| HandlerErr::new("internal", e.to_string()))
        }
        Err(e)
            if history::is_submitted(conn, &roster.session.course_id, roster.session.date)
                .unwrap_or(false) =>
        {
            // Submitted elsewhere meanwhile; a retry can never land.
            tracing::warn!(session = %handle, error = %e, "already submitted, session dropped");
            Err(HandlerErr::new(
                "already_submitted",
                "attendance for this course and date was already submitted",
            )
            .with_details(json!({
                "courseId": roster.session.course_id,
                "date": roster.session.date,
            })))
        }
        Err(e) => {
            // Keep the session open so the operator can retry.
            tracing::warn!(session = %handle, error = %e, "submission write failed");
            state.sessions.insert(handle, AttendanceEngine::new(roster));
            Err(HandlerErr::new("db_insert_failed", e.to_string())
                .with_details(json!({ "table": "attendance_sessions" })))
        }
    }
}

fn checkin_close(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let handle = get_required_str(params, "sessionHandle")?;
    let closed = state.sessions.remove(&handle).is_some();
    if closed {
        tracing::info!(session = %handle, "check-in session discarded");
    }
    Ok(json!({ "closed": closed }))
}

fn attendance_history(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let course_id = get_required_str(params, "courseId")?;
    let student_id = get_optional_str(params, "studentId")?;
    if !registry::course_exists(conn, &course_id).map_err(db_query_failed)? {
        return Err(HandlerErr::new("not_found", "course not found"));
    }
    let sessions = history::list_sessions(conn, &course_id, student_id.as_deref())
        .map_err(db_query_failed)?;
    Ok(json!({ "courseId": course_id, "sessions": sessions }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let handler: fn(&mut AppState, &serde_json::Value) -> Result<serde_json::Value, HandlerErr> =
        match req.method.as_str() {
            "checkin.open" => checkin_open,
            "checkin.get" => checkin_get,
            "checkin.setOverall" => checkin_set_overall,
            "checkin.setModule" => checkin_set_module,
            "checkin.markAllPresent" => checkin_mark_all_present,
            "checkin.resetAll" => checkin_reset_all,
            "checkin.setJustification" => checkin_set_justification,
            "checkin.notification" => checkin_notification,
            "checkin.setNotifyMessages" => checkin_set_notify_messages,
            "checkin.validate" => checkin_validate,
            "checkin.submit" => checkin_submit,
            "checkin.close" => checkin_close,
            "attendance.history" => attendance_history,
            _ => return None,
        };
    Some(respond(&req.id, handler(state, &req.params)))
}
