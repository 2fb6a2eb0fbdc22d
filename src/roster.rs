use crate::attendance::{Roster, Session, StudentAttendance, StudentIdentity};
use crate::history::{self, date_key};
use crate::registry;
use chrono::NaiveDate;
use rusqlite::Connection;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("course not found: {0}")]
    CourseNotFound(String),
    #[error("attendance for course {course_id} on {date} was already submitted")]
    AlreadySubmitted { course_id: String, date: NaiveDate },
    #[error(transparent)]
    Store(#[from] rusqlite::Error),
}

impl LoadError {
    pub fn code(&self) -> &'static str {
        match self {
            LoadError::CourseNotFound(_) => "not_found",
            LoadError::AlreadySubmitted { .. } => "already_submitted",
            LoadError::Store(_) => "db_query_failed",
        }
    }
}

/// Produces the initial roster of a check-in session: every status pending,
/// consecutive absences filled in from history. An empty course is an empty
/// roster, not an error.
pub trait RosterSource {
    fn load(&self, course_id: &str, date: NaiveDate) -> Result<Roster, LoadError>;
}

pub struct SqliteRosterSource<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteRosterSource<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        SqliteRosterSource { conn }
    }
}

struct EnrolledStudent {
    id: String,
    name: String,
    birth_date: Option<String>,
    photo_url: Option<String>,
    enrolled_on: String,
}

fn parse_stored_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

fn age_on(birth_date: Option<&str>, on: NaiveDate) -> Option<u32> {
    birth_date
        .and_then(parse_stored_date)
        .and_then(|b| on.years_since(b))
}

impl RosterSource for SqliteRosterSource<'_> {
    fn load(&self, course_id: &str, date: NaiveDate) -> Result<Roster, LoadError> {
        if !registry::course_exists(self.conn, course_id)? {
            return Err(LoadError::CourseNotFound(course_id.to_string()));
        }
        if history::is_submitted(self.conn, course_id, date)? {
            return Err(LoadError::AlreadySubmitted {
                course_id: course_id.to_string(),
                date,
            });
        }

        let modules = registry::list_modules(self.conn, course_id)?;

        let mut stmt = self.conn.prepare(
            "SELECT s.id, s.name, s.birth_date, s.photo_url, e.enrolled_on
             FROM enrollments e
             JOIN students s ON s.id = e.student_id
             WHERE e.course_id = ? AND e.enrolled_on <= ?
             ORDER BY s.name, s.id",
        )?;
        let enrolled = stmt
            .query_map((course_id, date_key(date)), |r| {
                Ok(EnrolledStudent {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    birth_date: r.get(2)?,
                    photo_url: r.get(3)?,
                    enrolled_on: r.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut students = Vec::with_capacity(enrolled.len());
        for e in enrolled {
            let absences = history::consecutive_absences(self.conn, course_id, &e.id, date)?;
            let identity = StudentIdentity {
                age: age_on(e.birth_date.as_deref(), date),
                enrollment_date: parse_stored_date(&e.enrolled_on).unwrap_or(date),
                student_id: e.id,
                name: e.name,
                photo_url: e.photo_url,
            };
            students.push(StudentAttendance::pending(identity, &modules, absences));
        }

        Ok(Roster {
            session: Session {
                course_id: course_id.to_string(),
                date,
                modules,
            },
            students,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::tests::date;
    use crate::attendance::{AttendanceEngine, AttendanceStatus};
    use crate::db;
    use crate::guard::SubmitDecision;
    use crate::registry::NewStudent;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().expect("open memory db");
        db::init_schema(&conn).expect("init schema");
        conn
    }

    fn enroll(conn: &Connection, course_id: &str, name: &str, enrolled: &str) -> String {
        registry::enroll_student(
            conn,
            course_id,
            &NewStudent {
                name: name.to_string(),
                birth_date: Some(date("2012-06-15")),
                photo_url: None,
                enrollment_date: date(enrolled),
            },
        )
        .expect("enroll student")
    }

    fn submit_with(conn: &Connection, course_id: &str, day: &str, absent: &[&str]) {
        let source = SqliteRosterSource::new(conn);
        let mut engine = AttendanceEngine::new(source.load(course_id, date(day)).expect("load"));
        engine.mark_all_present();
        for id in absent {
            engine
                .set_overall_status(id, AttendanceStatus::Absent)
                .expect("mark absent");
        }
        history::record_submission(conn, &engine.finish(), SubmitDecision::Clean)
            .expect("record submission");
    }

    #[test]
    fn roster_is_pending_sorted_and_respects_enrollment_date() {
        let conn = memory_db();
        let course = registry::create_course(
            &conn,
            "Judo Juniors",
            &["warm-up".to_string(), "practice".to_string()],
        )
        .expect("create course");
        let zed = enroll(&conn, &course.course_id, "Zed", "2024-01-10");
        let amy = enroll(&conn, &course.course_id, "Amy", "2024-01-10");
        let _late = enroll(&conn, &course.course_id, "Late", "2024-05-01");

        let roster = SqliteRosterSource::new(&conn)
            .load(&course.course_id, date("2024-03-04"))
            .expect("load roster");

        assert_eq!(roster.session.modules, course.modules);
        let ids: Vec<&str> = roster.students.iter().map(|s| s.student_id()).collect();
        assert_eq!(ids, vec![amy.as_str(), zed.as_str()]);
        for s in &roster.students {
            assert_eq!(s.overall_status(), AttendanceStatus::Pending);
            assert_eq!(s.module_statuses().len(), 2);
            assert_eq!(s.module_statuses()[0].module_id, course.modules[0].id);
            assert!(s
                .module_statuses()
                .iter()
                .all(|m| m.status == AttendanceStatus::Pending));
            assert_eq!(s.identity().age, Some(11));
            assert_eq!(s.identity().enrollment_date, date("2024-01-10"));
            assert_eq!(s.consecutive_absences(), 0);
        }
    }

    #[test]
    fn empty_course_loads_empty_roster() {
        let conn = memory_db();
        let course = registry::create_course(&conn, "Empty", &["only".to_string()])
            .expect("create course");
        let roster = SqliteRosterSource::new(&conn)
            .load(&course.course_id, date("2024-03-04"))
            .expect("load roster");
        assert!(roster.is_empty());
        assert_eq!(roster.session.modules.len(), 1);
    }

    #[test]
    fn unknown_course_is_a_load_error() {
        let conn = memory_db();
        let e = SqliteRosterSource::new(&conn)
            .load("missing", date("2024-03-04"))
            .expect_err("unknown course");
        assert!(matches!(e, LoadError::CourseNotFound(_)));
        assert_eq!(e.code(), "not_found");
    }

    #[test]
    fn consecutive_absences_count_back_to_last_attended_session() {
        let conn = memory_db();
        let course = registry::create_course(&conn, "Chess", &["opening".to_string()])
            .expect("create course");
        let a = enroll(&conn, &course.course_id, "Ana", "2024-01-01");
        let b = enroll(&conn, &course.course_id, "Bo", "2024-01-01");

        submit_with(&conn, &course.course_id, "2024-03-01", &[a.as_str()]);
        submit_with(&conn, &course.course_id, "2024-03-02", &[]);
        submit_with(&conn, &course.course_id, "2024-03-03", &[a.as_str(), b.as_str()]);
        submit_with(&conn, &course.course_id, "2024-03-04", &[a.as_str(), b.as_str()]);

        let roster = SqliteRosterSource::new(&conn)
            .load(&course.course_id, date("2024-03-05"))
            .expect("load roster");
        let engine = AttendanceEngine::new(roster);
        assert_eq!(engine.student(&a).expect("a").consecutive_absences(), 2);
        assert_eq!(engine.student(&b).expect("b").consecutive_absences(), 2);
        assert!(engine.is_notification_warranted(&a).expect("a"));

        // Only sessions strictly before the requested date count.
        assert_eq!(
            history::consecutive_absences(&conn, &course.course_id, &a, date("2024-03-03"))
                .expect("streak"),
            0
        );
    }

    #[test]
    fn submitted_date_cannot_be_reopened() {
        let conn = memory_db();
        let course = registry::create_course(&conn, "Swim", &["laps".to_string()])
            .expect("create course");
        enroll(&conn, &course.course_id, "Cy", "2024-01-01");
        submit_with(&conn, &course.course_id, "2024-03-01", &[]);

        let e = SqliteRosterSource::new(&conn)
            .load(&course.course_id, date("2024-03-01"))
            .expect_err("already submitted");
        assert!(matches!(e, LoadError::AlreadySubmitted { .. }));
        assert_eq!(e.code(), "already_submitted");
    }

    #[test]
    fn history_lists_submitted_records_newest_first() {
        let conn = memory_db();
        let course = registry::create_course(
            &conn,
            "Art",
            &["sketch".to_string(), "paint".to_string()],
        )
        .expect("create course");
        let a = enroll(&conn, &course.course_id, "Ana", "2024-01-01");
        let b = enroll(&conn, &course.course_id, "Bo", "2024-01-01");

        submit_with(&conn, &course.course_id, "2024-03-01", &[b.as_str()]);

        let source = SqliteRosterSource::new(&conn);
        let mut engine =
            AttendanceEngine::new(source.load(&course.course_id, date("2024-03-08")).expect("load"));
        engine
            .set_module_status(&a, &course.modules[1].id, AttendanceStatus::Absent)
            .expect("module");
        engine.set_justification(&a, "left early").expect("justify");
        let receipt = history::record_submission(
            &conn,
            &engine.finish(),
            SubmitDecision::Overridden { pending_count: 1 },
        )
        .expect("record");
        assert_eq!(receipt.student_count, 2);
        assert_eq!(receipt.pending_count, 1);

        let all = history::list_sessions(&conn, &course.course_id, None).expect("history");
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].date, "2024-03-08");
        assert!(all[0].pending_overridden);
        assert_eq!(all[0].records.len(), 2);

        let ana = history::list_sessions(&conn, &course.course_id, Some(&a)).expect("history");
        assert_eq!(ana.len(), 2);
        let latest = &ana[0].records[0];
        assert_eq!(latest.overall_status, AttendanceStatus::Partial);
        assert_eq!(latest.justification.as_deref(), Some("left early"));
        assert_eq!(latest.module_statuses[0].status, AttendanceStatus::Pending);
        assert_eq!(latest.module_statuses[1].status, AttendanceStatus::Absent);
        assert_eq!(ana[1].records[0].overall_status, AttendanceStatus::Present);
    }
}
