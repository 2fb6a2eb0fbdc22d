use serde_json::json;

use crate::attendance::AttendanceError;
use crate::guard::SubmissionWarning;
use crate::registry::RegistryError;
use crate::roster::LoadError;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Error carried out of a handler body; rendered into the response envelope
/// by [`respond`].
#[derive(Debug)]
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        HandlerErr {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        HandlerErr::new("bad_params", message)
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<AttendanceError> for HandlerErr {
    fn from(e: AttendanceError) -> Self {
        HandlerErr::new(e.code(), e.to_string())
    }
}

impl From<LoadError> for HandlerErr {
    fn from(e: LoadError) -> Self {
        let details = match &e {
            LoadError::AlreadySubmitted { course_id, date } => {
                Some(json!({ "courseId": course_id, "date": date }))
            }
            _ => None,
        };
        HandlerErr {
            code: e.code(),
            message: e.to_string(),
            details,
        }
    }
}

impl From<RegistryError> for HandlerErr {
    fn from(e: RegistryError) -> Self {
        let code = match &e {
            RegistryError::CourseNotFound(_) => "not_found",
            RegistryError::InvalidInput(_) => "bad_params",
            RegistryError::Store(_) => "db_update_failed",
        };
        HandlerErr::new(code, e.to_string())
    }
}

impl From<SubmissionWarning> for HandlerErr {
    fn from(w: SubmissionWarning) -> Self {
        HandlerErr::new("pending_entries", w.to_string())
            .with_details(json!({ "pendingCount": w.pending_count }))
    }
}

pub fn db_query_failed(e: rusqlite::Error) -> HandlerErr {
    HandlerErr::new("db_query_failed", e.to_string())
}

pub fn respond(id: &str, result: Result<serde_json::Value, HandlerErr>) -> serde_json::Value {
    match result {
        Ok(v) => ok(id, v),
        Err(e) => e.response(id),
    }
}
