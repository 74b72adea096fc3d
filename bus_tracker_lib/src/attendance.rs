use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::TrackerError,
    route::{Route, Stop, StopId},
};

pub type StudentId = String;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Pending,
    Boarded,
    Absent,
    /// Shown to parents once the child has been dropped off. Never set by [`AttendanceTracker::mark`].
    Dropped,
}

/// What a driver can record for a student at the current stop.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceOutcome {
    Boarded,
    Absent,
}

impl From<AttendanceOutcome> for AttendanceStatus {
    fn from(outcome: AttendanceOutcome) -> Self {
        match outcome {
            AttendanceOutcome::Boarded => AttendanceStatus::Boarded,
            AttendanceOutcome::Absent => AttendanceStatus::Absent,
        }
    }
}

/// A student the fleet configuration expects at a stop.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ScheduledStudent {
    pub student_id: StudentId,
    pub name: String,
    pub grade: String,
    pub stop_id: StopId,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AttendanceRecord {
    pub student_id: StudentId,
    pub name: String,
    pub grade: String,
    pub stop_id: StopId,
    pub status: AttendanceStatus,
    pub marked_at: Option<DateTime<Utc>>,
    /// Absent because a parent applied for leave.
    #[serde(default)]
    pub on_leave: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttendanceSummary {
    pub total: usize,
    pub pending: usize,
    pub boarded: usize,
    pub absent: usize,
    pub dropped: usize,
}

/// One record per scheduled student, created when the trip starts.
#[derive(Debug, Clone)]
pub struct AttendanceTracker {
    records: Vec<AttendanceRecord>,
}

impl AttendanceTracker {
    pub fn new(route: &Route, roster: Vec<ScheduledStudent>) -> Result<Self, TrackerError> {
        let mut seen = HashSet::new();
        let mut records = Vec::with_capacity(roster.len());

        for student in roster {
            let stop_index = route.stop_index(&student.stop_id)?;
            if !seen.insert(student.student_id.clone()) {
                return Err(TrackerError::InvalidRoute(format!(
                    "student {} is scheduled twice on route {}",
                    student.student_id,
                    route.route_id()
                )));
            }
            records.push((
                stop_index,
                AttendanceRecord {
                    student_id: student.student_id,
                    name: student.name,
                    grade: student.grade,
                    stop_id: student.stop_id,
                    status: AttendanceStatus::Pending,
                    marked_at: None,
                    on_leave: false,
                },
            ));
        }
        records.sort_by_key(|(stop_index, _)| *stop_index);

        Ok(Self {
            records: records.into_iter().map(|(_, record)| record).collect(),
        })
    }

    /// All records in route order.
    pub fn records(&self) -> &[AttendanceRecord] {
        &self.records
    }

    pub fn records_at(&self, stop_id: &str) -> Vec<AttendanceRecord> {
        self.records.iter().filter(|record| record.stop_id == stop_id).cloned().collect()
    }

    /// Records the outcome for a student waiting at `current_stop`.
    ///
    /// Students of other stops are unknown here, and a record can only leave
    /// `pending` once; a second mark is rejected and the first outcome kept.
    pub fn mark(&mut self, current_stop: &Stop, student_id: &str, outcome: AttendanceOutcome) -> Result<AttendanceRecord, TrackerError> {
        let record = self
            .records
            .iter_mut()
            .find(|record| record.student_id == student_id && record.stop_id == current_stop.stop_id)
            .ok_or_else(|| TrackerError::UnknownStudent(student_id.to_string()))?;

        if record.status != AttendanceStatus::Pending {
            return Err(TrackerError::AlreadyRecorded(student_id.to_string()));
        }

        record.status = outcome.into();
        record.marked_at = Some(Utc::now());
        tracing::info!("Marked {} as {:?} at {}", record.name, record.status, current_stop.name);

        Ok(record.clone())
    }

    /// Marks a student absent on leave, wherever the bus currently is.
    pub fn excuse(&mut self, student_id: &str) -> Result<AttendanceRecord, TrackerError> {
        let record = self
            .records
            .iter_mut()
            .find(|record| record.student_id == student_id)
            .ok_or_else(|| TrackerError::UnknownStudent(student_id.to_string()))?;

        if record.status != AttendanceStatus::Pending {
            return Err(TrackerError::AlreadyRecorded(student_id.to_string()));
        }

        record.status = AttendanceStatus::Absent;
        record.on_leave = true;
        record.marked_at = Some(Utc::now());
        tracing::info!("{} is on leave", record.name);

        Ok(record.clone())
    }

    pub fn record(&self, student_id: &str) -> Option<&AttendanceRecord> {
        self.records.iter().find(|record| record.student_id == student_id)
    }

    pub fn summary(&self) -> AttendanceSummary {
        let mut summary = AttendanceSummary {
            total: self.records.len(),
            ..AttendanceSummary::default()
        };
        for record in &self.records {
            match record.status {
                AttendanceStatus::Pending => summary.pending += 1,
                AttendanceStatus::Boarded => summary.boarded += 1,
                AttendanceStatus::Absent => summary.absent += 1,
                AttendanceStatus::Dropped => summary.dropped += 1,
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveTime;

    use super::*;

    fn route() -> Route {
        let t = NaiveTime::from_hms_opt(7, 30, 0).unwrap();
        Route::new(
            "r",
            "Route",
            vec![
                Stop::new("a", "A", t, 0.0, 0.0),
                Stop::new("b", "B", t, 0.0, 1.0),
                Stop::new("c", "C", t, 0.0, 2.0),
            ],
        )
        .unwrap()
    }

    fn student(id: &str, stop: &str) -> ScheduledStudent {
        ScheduledStudent {
            student_id: id.into(),
            name: format!("Student {id}"),
            grade: "Grade 4".into(),
            stop_id: stop.into(),
        }
    }

    fn tracker() -> AttendanceTracker {
        AttendanceTracker::new(&route(), vec![student("s3", "c"), student("s1", "b"), student("s2", "b")]).unwrap()
    }

    #[test]
    fn records_start_pending_in_route_order() {
        let tracker = tracker();
        let ids: Vec<_> = tracker.records().iter().map(|r| r.student_id.as_str()).collect();
        assert_eq!(ids, ["s1", "s2", "s3"]);
        assert!(tracker.records().iter().all(|r| r.status == AttendanceStatus::Pending));
        assert_eq!(tracker.records_at("b").len(), 2);
    }

    #[test]
    fn second_mark_is_rejected_and_first_kept() {
        let route = route();
        let mut tracker = tracker();
        let stop_b = route.stop("b").unwrap();

        let record = tracker.mark(stop_b, "s1", AttendanceOutcome::Boarded).unwrap();
        assert_eq!(record.status, AttendanceStatus::Boarded);
        assert!(record.marked_at.is_some());

        assert_eq!(
            tracker.mark(stop_b, "s1", AttendanceOutcome::Absent),
            Err(TrackerError::AlreadyRecorded("s1".into()))
        );
        assert_eq!(tracker.records_at("b")[0].status, AttendanceStatus::Boarded);
    }

    #[test]
    fn students_of_other_stops_are_unknown() {
        let route = route();
        let mut tracker = tracker();
        assert_eq!(
            tracker.mark(route.stop("b").unwrap(), "s3", AttendanceOutcome::Boarded),
            Err(TrackerError::UnknownStudent("s3".into()))
        );
        assert_eq!(
            tracker.mark(route.stop("b").unwrap(), "nobody", AttendanceOutcome::Absent),
            Err(TrackerError::UnknownStudent("nobody".into()))
        );
        assert_eq!(tracker.summary().pending, 3);
    }

    #[test]
    fn summary_counts_every_record_once() {
        let route = route();
        let mut tracker = tracker();
        let stop_b = route.stop("b").unwrap();
        tracker.mark(stop_b, "s1", AttendanceOutcome::Boarded).unwrap();
        tracker.mark(stop_b, "s2", AttendanceOutcome::Absent).unwrap();

        let summary = tracker.summary();
        assert_eq!(
            summary,
            AttendanceSummary {
                total: 3,
                pending: 1,
                boarded: 1,
                absent: 1,
                dropped: 0,
            }
        );
    }

    #[test]
    fn leave_marks_absent_at_any_stop() {
        let route = route();
        let mut tracker = tracker();

        let record = tracker.excuse("s3").unwrap();
        assert_eq!(record.status, AttendanceStatus::Absent);
        assert!(record.on_leave);
        assert_eq!(
            tracker.mark(route.stop("c").unwrap(), "s3", AttendanceOutcome::Boarded),
            Err(TrackerError::AlreadyRecorded("s3".into()))
        );
        assert_eq!(tracker.excuse("s3"), Err(TrackerError::AlreadyRecorded("s3".into())));
        assert_eq!(tracker.excuse("nobody"), Err(TrackerError::UnknownStudent("nobody".into())));
        assert_eq!(tracker.summary().absent, 1);
    }

    #[test]
    fn roster_must_match_route() {
        assert!(matches!(
            AttendanceTracker::new(&route(), vec![student("s1", "zz")]),
            Err(TrackerError::NotFound(_))
        ));
        assert!(matches!(
            AttendanceTracker::new(&route(), vec![student("s1", "a"), student("s1", "b")]),
            Err(TrackerError::InvalidRoute(_))
        ));
    }
}
