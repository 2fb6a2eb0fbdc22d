use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Partial,
    #[default]
    Pending,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Partial => "partial",
            AttendanceStatus::Pending => "pending",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "present" => Some(AttendanceStatus::Present),
            "absent" => Some(AttendanceStatus::Absent),
            "partial" => Some(AttendanceStatus::Partial),
            "pending" => Some(AttendanceStatus::Pending),
            _ => None,
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    pub id: String,
    pub name: String,
}

/// One course meeting on one date. Built by the roster loader and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub course_id: String,
    pub date: NaiveDate,
    pub modules: Vec<Module>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentIdentity {
    pub student_id: String,
    pub name: String,
    pub age: Option<u32>,
    pub photo_url: Option<String>,
    pub enrollment_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleStatus {
    pub module_id: String,
    pub status: AttendanceStatus,
}

/// Attendance of one student for one session.
///
/// Status fields are only reachable through [`AttendanceEngine`], which keeps
/// the overall status and the per-module vector consistent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentAttendance {
    #[serde(flatten)]
    identity: StudentIdentity,
    overall_status: AttendanceStatus,
    module_statuses: Vec<ModuleStatus>,
    justification: Option<String>,
    consecutive_absences: u32,
}

impl StudentAttendance {
    /// Fresh roster entry: everything `pending`, one module slot per session
    /// module in session order.
    pub fn pending(identity: StudentIdentity, modules: &[Module], consecutive_absences: u32) -> Self {
        StudentAttendance {
            identity,
            overall_status: AttendanceStatus::Pending,
            module_statuses: modules
                .iter()
                .map(|m| ModuleStatus {
                    module_id: m.id.clone(),
                    status: AttendanceStatus::Pending,
                })
                .collect(),
            justification: None,
            consecutive_absences,
        }
    }

    #[cfg(test)]
    pub fn identity(&self) -> &StudentIdentity {
        &self.identity
    }

    pub fn student_id(&self) -> &str {
        &self.identity.student_id
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn overall_status(&self) -> AttendanceStatus {
        self.overall_status
    }

    pub fn module_statuses(&self) -> &[ModuleStatus] {
        &self.module_statuses
    }

    #[cfg(test)]
    pub fn module_status(&self, module_id: &str) -> Option<AttendanceStatus> {
        self.module_statuses
            .iter()
            .find(|m| m.module_id == module_id)
            .map(|m| m.status)
    }

    pub fn justification(&self) -> Option<&str> {
        self.justification.as_deref()
    }

    pub fn consecutive_absences(&self) -> u32 {
        self.consecutive_absences
    }

    fn fill_modules(&mut self, status: AttendanceStatus) {
        for m in &mut self.module_statuses {
            m.status = status;
        }
    }

    fn rederive_overall(&mut self) {
        self.overall_status = derive_overall(&self.module_statuses);
    }
}

/// Bottom-up rule: uniform present/absent carries through, any mix is partial.
/// A mix never derives to `pending`.
pub fn derive_overall(modules: &[ModuleStatus]) -> AttendanceStatus {
    if modules.iter().all(|m| m.status == AttendanceStatus::Present) {
        AttendanceStatus::Present
    } else if modules.iter().all(|m| m.status == AttendanceStatus::Absent) {
        AttendanceStatus::Absent
    } else {
        AttendanceStatus::Partial
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Roster {
    pub session: Session,
    pub students: Vec<StudentAttendance>,
}

impl Roster {
    pub fn is_empty(&self) -> bool {
        self.students.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttendanceError {
    #[error("student not found: {0}")]
    StudentNotFound(String),
    #[error("module {module_id} not found for student {student_id}")]
    ModuleNotFound {
        student_id: String,
        module_id: String,
    },
    #[error("module status must be present or absent, got {0}")]
    InvalidModuleStatus(AttendanceStatus),
    #[error("student {student_id} cannot be partial while every module is {modules}")]
    UniformModules {
        student_id: String,
        modules: AttendanceStatus,
    },
}

impl AttendanceError {
    pub fn code(&self) -> &'static str {
        match self {
            AttendanceError::StudentNotFound(_) | AttendanceError::ModuleNotFound { .. } => {
                "not_found"
            }
            AttendanceError::InvalidModuleStatus(_) | AttendanceError::UniformModules { .. } => {
                "bad_params"
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    pub total: usize,
    pub present: usize,
    pub absent: usize,
    pub partial: usize,
    pub pending: usize,
    pub notifications_warranted: usize,
}

/// Message templates for the guardian notification prompt. `{name}` and
/// `{count}` are substituted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationMessages {
    pub warranted: String,
    pub neutral: String,
}

impl Default for NotificationMessages {
    fn default() -> Self {
        NotificationMessages {
            warranted: "{name} has missed the last {count} session(s); notify guardians?"
                .to_string(),
            neutral: "{name} has no recent consecutive absences.".to_string(),
        }
    }
}

impl NotificationMessages {
    fn render(template: &str, student: &StudentAttendance) -> String {
        template
            .replace("{name}", student.name())
            .replace("{count}", &student.consecutive_absences().to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationDecision {
    pub student_id: String,
    pub warranted: bool,
    pub consecutive_absences: u32,
    pub message: String,
}

/// In-memory attendance state for one open check-in session.
#[derive(Debug, Clone)]
pub struct AttendanceEngine {
    roster: Roster,
}

impl AttendanceEngine {
    pub fn new(roster: Roster) -> Self {
        AttendanceEngine { roster }
    }

    pub fn session(&self) -> &Session {
        &self.roster.session
    }

    pub fn students(&self) -> &[StudentAttendance] {
        &self.roster.students
    }

    pub fn student(&self, student_id: &str) -> Option<&StudentAttendance> {
        self.roster
            .students
            .iter()
            .find(|s| s.student_id() == student_id)
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    fn student_mut(&mut self, student_id: &str) -> Result<&mut StudentAttendance, AttendanceError> {
        self.roster
            .students
            .iter_mut()
            .find(|s| s.identity.student_id == student_id)
            .ok_or_else(|| AttendanceError::StudentNotFound(student_id.to_string()))
    }

    fn find_student(&self, student_id: &str) -> Result<&StudentAttendance, AttendanceError> {
        self.student(student_id)
            .ok_or_else(|| AttendanceError::StudentNotFound(student_id.to_string()))
    }

    /// Top-down path. `present`/`absent` overwrite every module, `pending`
    /// clears them, `partial` leaves them for per-module editing.
    ///
    /// `partial` is refused while every module is already `present` or every
    /// module is `absent`, since that vector is not a mix.
    pub fn set_overall_status(
        &mut self,
        student_id: &str,
        status: AttendanceStatus,
    ) -> Result<(), AttendanceError> {
        let student = self.student_mut(student_id)?;
        if status == AttendanceStatus::Partial && !student.module_statuses.is_empty() {
            let derived = derive_overall(&student.module_statuses);
            if derived != AttendanceStatus::Partial {
                return Err(AttendanceError::UniformModules {
                    student_id: student_id.to_string(),
                    modules: derived,
                });
            }
        }
        student.overall_status = status;
        match status {
            AttendanceStatus::Present | AttendanceStatus::Absent | AttendanceStatus::Pending => {
                student.fill_modules(status)
            }
            AttendanceStatus::Partial => {}
        }
        Ok(())
    }

    /// Bottom-up path. Only `present`/`absent` are accepted; the overall
    /// status is re-derived from the module vector afterwards.
    pub fn set_module_status(
        &mut self,
        student_id: &str,
        module_id: &str,
        status: AttendanceStatus,
    ) -> Result<(), AttendanceError> {
        let student = self.student_mut(student_id)?;
        let Some(idx) = student
            .module_statuses
            .iter()
            .position(|m| m.module_id == module_id)
        else {
            return Err(AttendanceError::ModuleNotFound {
                student_id: student_id.to_string(),
                module_id: module_id.to_string(),
            });
        };
        if !matches!(status, AttendanceStatus::Present | AttendanceStatus::Absent) {
            return Err(AttendanceError::InvalidModuleStatus(status));
        }
        student.module_statuses[idx].status = status;
        student.rederive_overall();
        Ok(())
    }

    pub fn mark_all_present(&mut self) {
        for student in &mut self.roster.students {
            student.overall_status = AttendanceStatus::Present;
            student.fill_modules(AttendanceStatus::Present);
        }
    }

    pub fn reset_all(&mut self) {
        for student in &mut self.roster.students {
            student.overall_status = AttendanceStatus::Pending;
            student.fill_modules(AttendanceStatus::Pending);
        }
    }

    /// Blank text clears the justification.
    pub fn set_justification(&mut self, student_id: &str, text: &str) -> Result<(), AttendanceError> {
        let student = self.student_mut(student_id)?;
        let t = text.trim();
        student.justification = if t.is_empty() {
            None
        } else {
            Some(text.to_string())
        };
        Ok(())
    }

    pub fn is_notification_warranted(&self, student_id: &str) -> Result<bool, AttendanceError> {
        Ok(self.find_student(student_id)?.consecutive_absences() > 0)
    }

    pub fn notification(
        &self,
        student_id: &str,
        messages: &NotificationMessages,
    ) -> Result<NotificationDecision, AttendanceError> {
        let warranted = self.is_notification_warranted(student_id)?;
        let student = self.find_student(student_id)?;
        let template = if warranted {
            &messages.warranted
        } else {
            &messages.neutral
        };
        Ok(NotificationDecision {
            student_id: student.student_id().to_string(),
            warranted,
            consecutive_absences: student.consecutive_absences(),
            message: NotificationMessages::render(template, student),
        })
    }

    pub fn summary(&self) -> AttendanceSummary {
        let mut out = AttendanceSummary {
            total: self.roster.students.len(),
            ..AttendanceSummary::default()
        };
        for s in &self.roster.students {
            match s.overall_status() {
                AttendanceStatus::Present => out.present += 1,
                AttendanceStatus::Absent => out.absent += 1,
                AttendanceStatus::Partial => out.partial += 1,
                AttendanceStatus::Pending => out.pending += 1,
            }
            if s.consecutive_absences() > 0 {
                out.notifications_warranted += 1;
            }
        }
        out
    }

    /// Ends the session. The returned roster is what gets handed to storage.
    pub fn finish(self) -> Roster {
        self.roster
    }
}
