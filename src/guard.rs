use crate::attendance::{AttendanceStatus, StudentAttendance};
use thiserror::Error;

/// Advisory raised when entries are still undecided. Not a hard block: the
/// operator may resubmit after acknowledging it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{pending_count} student(s) still pending")]
pub struct SubmissionWarning {
    pub pending_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitDecision {
    Clean,
    Overridden { pending_count: usize },
}

impl SubmitDecision {
    pub fn pending_count(self) -> usize {
        match self {
            SubmitDecision::Clean => 0,
            SubmitDecision::Overridden { pending_count } => pending_count,
        }
    }
}

pub fn pending_count(students: &[StudentAttendance]) -> usize {
    students
        .iter()
        .filter(|s| s.overall_status() == AttendanceStatus::Pending)
        .count()
}

pub fn validate_for_submission(students: &[StudentAttendance]) -> Result<(), SubmissionWarning> {
    match pending_count(students) {
        0 => Ok(()),
        pending_count => Err(SubmissionWarning { pending_count }),
    }
}

/// Gate for the save action: clean rosters pass, rosters with pending
/// entries pass only when the operator acknowledged the warning.
pub fn confirm_submission(
    students: &[StudentAttendance],
    acknowledge_pending: bool,
) -> Result<SubmitDecision, SubmissionWarning> {
    match validate_for_submission(students) {
        Ok(()) => Ok(SubmitDecision::Clean),
        Err(warning) if acknowledge_pending => Ok(SubmitDecision::Overridden {
            pending_count: warning.pending_count,
        }),
        Err(warning) => Err(warning),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::tests::roster;
    use crate::attendance::AttendanceEngine;

    #[test]
    fn one_pending_of_four_is_flagged_until_decided() {
        let mut engine = AttendanceEngine::new(roster(
            &[("s1", 0), ("s2", 0), ("s3", 0), ("s4", 0)],
            &["m1", "m2"],
        ));
        for id in ["s1", "s2", "s3"] {
            engine
                .set_overall_status(id, AttendanceStatus::Present)
                .expect("set status");
        }

        assert_eq!(
            validate_for_submission(engine.students()),
            Err(SubmissionWarning { pending_count: 1 })
        );

        engine
            .set_module_status("s4", "m1", AttendanceStatus::Absent)
            .expect("set module");
        assert_eq!(validate_for_submission(engine.students()), Ok(()));
    }

    #[test]
    fn empty_roster_validates() {
        let engine = AttendanceEngine::new(roster(&[], &["m1"]));
        assert_eq!(validate_for_submission(engine.students()), Ok(()));
    }

    #[test]
    fn acknowledgement_overrides_the_warning() {
        let mut engine = AttendanceEngine::new(roster(&[("s1", 0), ("s2", 0)], &["m1"]));
        assert_eq!(
            confirm_submission(engine.students(), false),
            Err(SubmissionWarning { pending_count: 2 })
        );
        let decision = confirm_submission(engine.students(), true).expect("override");
        assert_eq!(decision, SubmitDecision::Overridden { pending_count: 2 });
        assert_eq!(decision.pending_count(), 2);

        engine.mark_all_present();
        assert_eq!(
            confirm_submission(engine.students(), false),
            Ok(SubmitDecision::Clean)
        );
    }
}
