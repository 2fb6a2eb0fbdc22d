use crate::attendance::Module;
use crate::history::date_key;
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("course not found: {0}")]
    CourseNotFound(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error(transparent)]
    Store(#[from] rusqlite::Error),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseRecord {
    pub course_id: String,
    pub name: String,
    pub modules: Vec<Module>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseRow {
    pub id: String,
    pub name: String,
    pub module_count: i64,
    pub student_count: i64,
}

#[derive(Debug, Clone)]
pub struct NewStudent {
    pub name: String,
    pub birth_date: Option<NaiveDate>,
    pub photo_url: Option<String>,
    pub enrollment_date: NaiveDate,
}

pub fn course_exists(conn: &Connection, course_id: &str) -> rusqlite::Result<bool> {
    conn.query_row("SELECT 1 FROM courses WHERE id = ?", [course_id], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
}

/// Creates a course with its ordered session modules.
pub fn create_course(
    conn: &Connection,
    name: &str,
    module_names: &[String],
) -> Result<CourseRecord, RegistryError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(RegistryError::InvalidInput("name must not be empty".to_string()));
    }
    if module_names.iter().any(|m| m.trim().is_empty()) {
        return Err(RegistryError::InvalidInput(
            "module names must not be empty".to_string(),
        ));
    }

    let course_id = Uuid::new_v4().to_string();
    let tx = conn.unchecked_transaction()?;
    tx.execute("INSERT INTO courses(id, name) VALUES(?, ?)", (&course_id, name))?;
    let mut modules = Vec::with_capacity(module_names.len());
    for (i, module_name) in module_names.iter().enumerate() {
        let module = Module {
            id: Uuid::new_v4().to_string(),
            name: module_name.trim().to_string(),
        };
        tx.execute(
            "INSERT INTO course_modules(id, course_id, name, sort_order) VALUES(?, ?, ?, ?)",
            (&module.id, &course_id, &module.name, i as i64),
        )?;
        modules.push(module);
    }
    tx.commit()?;

    Ok(CourseRecord {
        course_id,
        name: name.to_string(),
        modules,
    })
}

pub fn list_courses(conn: &Connection) -> rusqlite::Result<Vec<CourseRow>> {
    // Correlated subqueries keep the counts independent of each other.
    let mut stmt = conn.prepare(
        "SELECT
           c.id,
           c.name,
           (SELECT COUNT(*) FROM course_modules m WHERE m.course_id = c.id) AS module_count,
           (SELECT COUNT(*) FROM enrollments e WHERE e.course_id = c.id) AS student_count
         FROM courses c
         ORDER BY c.name",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(CourseRow {
                id: r.get(0)?,
                name: r.get(1)?,
                module_count: r.get(2)?,
                student_count: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn list_modules(conn: &Connection, course_id: &str) -> rusqlite::Result<Vec<Module>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, name FROM course_modules WHERE course_id = ? ORDER BY sort_order",
    )?;
    let rows = stmt
        .query_map([course_id], |r| {
            Ok(Module {
                id: r.get(0)?,
                name: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Creates the student and enrolls them in `course_id`. Returns the new
/// student id.
pub fn enroll_student(
    conn: &Connection,
    course_id: &str,
    student: &NewStudent,
) -> Result<String, RegistryError> {
    let name = student.name.trim();
    if name.is_empty() {
        return Err(RegistryError::InvalidInput("name must not be empty".to_string()));
    }
    if !course_exists(conn, course_id)? {
        return Err(RegistryError::CourseNotFound(course_id.to_string()));
    }

    let student_id = Uuid::new_v4().to_string();
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO students(id, name, birth_date, photo_url) VALUES(?, ?, ?, ?)",
        (
            &student_id,
            name,
            student.birth_date.map(date_key),
            student.photo_url.as_deref(),
        ),
    )?;
    tx.execute(
        "INSERT INTO enrollments(course_id, student_id, enrolled_on) VALUES(?, ?, ?)",
        (course_id, &student_id, date_key(student.enrollment_date)),
    )?;
    tx.commit()?;
    Ok(student_id)
}
