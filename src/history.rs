use crate::attendance::{AttendanceStatus, ModuleStatus, Roster};
use crate::guard::SubmitDecision;
use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

const DATE_FMT: &str = "%Y-%m-%d";

pub fn date_key(date: NaiveDate) -> String {
    date.format(DATE_FMT).to_string()
}

/// Counts the student's most recent submitted sessions of `course_id` before
/// `before` that were fully absent, stopping at the first other status.
/// Sessions without a record for the student do not break the streak.
pub fn consecutive_absences(
    conn: &Connection,
    course_id: &str,
    student_id: &str,
    before: NaiveDate,
) -> rusqlite::Result<u32> {
    let mut stmt = conn.prepare_cached(
        "SELECT r.overall_status
         FROM attendance_sessions s
         JOIN attendance_records r ON r.session_id = s.id
         WHERE s.course_id = ? AND r.student_id = ? AND s.session_date < ?
         ORDER BY s.session_date DESC",
    )?;
    let mut rows = stmt.query((course_id, student_id, date_key(before)))?;
    let mut streak = 0u32;
    while let Some(row) = rows.next()? {
        let status: String = row.get(0)?;
        if AttendanceStatus::parse(&status) != Some(AttendanceStatus::Absent) {
            break;
        }
        streak += 1;
    }
    Ok(streak)
}

pub fn is_submitted(conn: &Connection, course_id: &str, date: NaiveDate) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT 1 FROM attendance_sessions WHERE course_id = ? AND session_date = ?",
        (course_id, date_key(date)),
        |r| r.get::<_, i64>(0),
    )
    .optional()
    .map(|v| v.is_some())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    pub submission_id: String,
    pub submitted_at: String,
    pub student_count: usize,
    pub pending_count: usize,
}

/// Writes a finished roster in one transaction. Either every record lands or
/// none does.
pub fn record_submission(
    conn: &Connection,
    roster: &Roster,
    decision: SubmitDecision,
) -> rusqlite::Result<SubmissionReceipt> {
    let submission_id = Uuid::new_v4().to_string();
    let submitted_at = Utc::now().to_rfc3339();
    let overridden = matches!(decision, SubmitDecision::Overridden { .. });

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO attendance_sessions(id, course_id, session_date, submitted_at, pending_overridden)
         VALUES(?, ?, ?, ?, ?)",
        (
            &submission_id,
            &roster.session.course_id,
            date_key(roster.session.date),
            &submitted_at,
            overridden as i64,
        ),
    )?;
    {
        let mut rec_stmt = tx.prepare(
            "INSERT INTO attendance_records(session_id, student_id, overall_status, justification)
             VALUES(?, ?, ?, ?)",
        )?;
        let mut mod_stmt = tx.prepare(
            "INSERT INTO attendance_module_records(session_id, student_id, module_id, status)
             VALUES(?, ?, ?, ?)",
        )?;
        for s in &roster.students {
            rec_stmt.execute((
                &submission_id,
                s.student_id(),
                s.overall_status().as_str(),
                s.justification(),
            ))?;
            for m in s.module_statuses() {
                mod_stmt.execute((&submission_id, s.student_id(), &m.module_id, m.status.as_str()))?;
            }
        }
    }
    tx.commit()?;

    Ok(SubmissionReceipt {
        submission_id,
        submitted_at,
        student_count: roster.students.len(),
        pending_count: decision.pending_count(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub student_id: String,
    pub overall_status: AttendanceStatus,
    pub justification: Option<String>,
    pub module_statuses: Vec<ModuleStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySession {
    pub session_id: String,
    pub date: String,
    pub submitted_at: String,
    pub pending_overridden: bool,
    pub records: Vec<HistoryRecord>,
}

/// Submitted sessions of a course, newest first. With `student_id`, each
/// session carries only that student's record and sessions without one are
/// dropped.
pub fn list_sessions(
    conn: &Connection,
    course_id: &str,
    student_id: Option<&str>,
) -> rusqlite::Result<Vec<HistorySession>> {
    let mut sess_stmt = conn.prepare(
        "SELECT id, session_date, submitted_at, pending_overridden
         FROM attendance_sessions
         WHERE course_id = ?
         ORDER BY session_date DESC",
    )?;
    let sessions = sess_stmt
        .query_map([course_id], |r| {
            Ok(HistorySession {
                session_id: r.get(0)?,
                date: r.get(1)?,
                submitted_at: r.get(2)?,
                pending_overridden: r.get::<_, i64>(3)? != 0,
                records: Vec::new(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut rec_stmt = conn.prepare(
        "SELECT r.student_id, r.overall_status, r.justification
         FROM attendance_records r
         JOIN students st ON st.id = r.student_id
         WHERE r.session_id = ?1 AND (?2 IS NULL OR r.student_id = ?2)
         ORDER BY st.name, r.student_id",
    )?;
    let mut mod_stmt = conn.prepare(
        "SELECT mr.module_id, mr.status
         FROM attendance_module_records mr
         JOIN course_modules cm ON cm.id = mr.module_id
         WHERE mr.session_id = ? AND mr.student_id = ?
         ORDER BY cm.sort_order",
    )?;

    let mut out = Vec::with_capacity(sessions.len());
    for mut session in sessions {
        let rows = rec_stmt
            .query_map((&session.session_id, student_id), |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, Option<String>>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (sid, overall, justification) in rows {
            let module_statuses = mod_stmt
                .query_map((&session.session_id, &sid), |r| {
                    let status: String = r.get(1)?;
                    Ok(ModuleStatus {
                        module_id: r.get(0)?,
                        status: AttendanceStatus::parse(&status).unwrap_or_default(),
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            session.records.push(HistoryRecord {
                student_id: sid,
                overall_status: AttendanceStatus::parse(&overall).unwrap_or_default(),
                justification,
                module_statuses,
            });
        }
        if student_id.is_some() && session.records.is_empty() {
            continue;
        }
        out.push(session);
    }
    Ok(out)
}
