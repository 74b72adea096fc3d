use std::{str::FromStr, sync::Arc, time::Instant};

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::{
    attendance::{AttendanceOutcome, AttendanceRecord, AttendanceStatus, AttendanceSummary, AttendanceTracker, ScheduledStudent, StudentId},
    error::TrackerError,
    motion::{LiveUpdate, MotionConfig, MotionModel, KM_PER_DEGREE},
    notification::{Notification, NotificationFeed, NotificationKind},
    route::{Route, Stop, StopId, StopStatus},
    trip::{TripEngine, TripEvent, TripEventKind, TripState, VehicleId},
};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Parent,
    Driver,
    Admin,
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "parent" => Ok(Role::Parent),
            "driver" => Ok(Role::Driver),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// Who is looking and which vehicle they are looking at.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub role: Role,
    pub vehicle_id: VehicleId,
}

impl SessionContext {
    pub fn new(role: Role, vehicle_id: impl Into<VehicleId>) -> Self {
        Self {
            role,
            vehicle_id: vehicle_id.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StopView {
    #[serde(flatten)]
    pub stop: Stop,
    pub status: StopStatus,
}

/// Everything a screen needs to draw one vehicle's trip.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TripSnapshot {
    pub context: SessionContext,
    pub route_id: Option<String>,
    pub route_name: Option<String>,
    pub state: TripState,
    pub current_stop: Option<Stop>,
    pub next_stop: Option<Stop>,
    pub stops: Vec<StopView>,
    pub current_stop_attendance: Vec<AttendanceRecord>,
    pub attendance: Vec<AttendanceRecord>,
    pub attendance_summary: AttendanceSummary,
    pub live: Option<LiveUpdate>,
    pub events: Vec<TripEvent>,
}

/// Where a child is, as shown on the parent's status log.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ChildStatus {
    Waiting,
    Boarded,
    InTransit,
    Dropped,
    Absent,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChildStatusView {
    pub student_id: StudentId,
    pub name: String,
    pub stop_id: StopId,
    pub stop_name: String,
    pub scheduled_time: NaiveTime,
    pub status: ChildStatus,
    pub on_leave: bool,
    pub stops: Vec<StopView>,
    /// Events at the child's stop or about the child, oldest first.
    pub events: Vec<TripEvent>,
}

/// One vehicle's trip, its attendance and its simulated motion.
///
/// Every action either applies completely or returns an error and leaves the
/// session untouched.
#[derive(Debug)]
pub struct TripSession {
    context: SessionContext,
    engine: TripEngine,
    attendance: Option<AttendanceTracker>,
    motion: Option<MotionModel>,
    motion_config: MotionConfig,
    notifications: NotificationFeed,
}

impl TripSession {
    pub fn new(context: SessionContext, motion_config: MotionConfig) -> Self {
        let mut engine = TripEngine::new(context.vehicle_id.clone());
        engine.set_role(context.role);
        Self {
            context,
            engine,
            attendance: None,
            motion: None,
            motion_config,
            notifications: NotificationFeed::default(),
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Switches the acting role, e.g. after the user logs in as someone else.
    pub fn set_role(&mut self, role: Role) {
        self.context.role = role;
        self.engine.set_role(role);
    }

    pub fn state(&self) -> TripState {
        self.engine.state()
    }

    /// Route of the current or last trip.
    pub fn route_id(&self) -> Option<&str> {
        self.engine.route().map(|route| route.route_id())
    }

    pub fn trip_number(&self) -> u64 {
        self.engine.trip_number()
    }

    pub fn events(&self) -> &[TripEvent] {
        self.engine.events()
    }

    pub fn current_stop(&self) -> Option<&Stop> {
        self.engine.current_stop()
    }

    pub fn status_of(&self, stop_index: usize) -> Result<StopStatus, TrackerError> {
        self.engine.status_of(stop_index)
    }

    pub fn start_trip(&mut self, route: Arc<Route>, roster: Vec<ScheduledStudent>) -> Result<TripState, TrackerError> {
        if self.engine.state().is_active() {
            return Err(TrackerError::InvalidTransition(format!(
                "vehicle {} already has an active trip",
                self.context.vehicle_id
            )));
        }

        let attendance = AttendanceTracker::new(&route, roster)?;
        let motion = match route.path() {
            Ok(path) => Some(MotionModel::new(path, KM_PER_DEGREE, self.motion_config)),
            Err(err) => {
                tracing::warn!(vehicle = %self.context.vehicle_id, "No simulated motion for route {}: {err}", route.route_id());
                None
            }
        };

        let route_name = route.name().to_string();
        let state = self.engine.start(route)?;
        self.attendance = Some(attendance);
        self.motion = motion;
        tracing::debug!(vehicle = %self.context.vehicle_id, role = ?self.context.role, "Trip session started");

        self.notifications.push(
            NotificationKind::General,
            "Trip started",
            format!("Bus {} has started {route_name}", self.context.vehicle_id),
            None,
        );
        Ok(state)
    }

    pub fn advance_stop(&mut self) -> Result<TripState, TrackerError> {
        let state = self.engine.advance()?;
        if state == TripState::Ended {
            self.notify_drops();
        }
        Ok(state)
    }

    pub fn skip_stop(&mut self) -> Result<TripState, TrackerError> {
        let skipped = self.engine.current_stop().map(|stop| stop.name.clone());
        let state = self.engine.skip()?;

        if let Some(name) = skipped {
            self.notifications
                .push(NotificationKind::Alert, "Stop skipped", format!("The bus did not stop at {name}"), None);
        }
        if state == TripState::Ended {
            self.notify_drops();
        }
        Ok(state)
    }

    /// Ends the trip. Attendance stays readable until the next trip starts.
    pub fn end_trip(&mut self) -> TripState {
        let was_active = self.engine.state().is_active();
        let state = self.engine.end();
        if was_active {
            self.notify_drops();
        }
        state
    }

    fn notify_drops(&mut self) {
        let Some(attendance) = self.attendance.as_ref() else {
            return;
        };
        let boarded: Vec<_> = attendance
            .records()
            .iter()
            .filter(|record| record.status == AttendanceStatus::Boarded)
            .map(|record| (record.student_id.clone(), record.name.clone()))
            .collect();

        for (student_id, name) in boarded {
            self.notifications.push(
                NotificationKind::Drop,
                format!("{name} dropped"),
                format!("{name} has reached school on bus {}", self.context.vehicle_id),
                Some(student_id),
            );
        }
    }

    pub fn records_for_current_stop(&self) -> Vec<AttendanceRecord> {
        match (self.engine.current_stop(), self.attendance.as_ref()) {
            (Some(stop), Some(attendance)) => attendance.records_at(&stop.stop_id),
            _ => Vec::new(),
        }
    }

    pub fn mark_attendance(&mut self, student_id: &str, outcome: AttendanceOutcome) -> Result<AttendanceRecord, TrackerError> {
        let (Some(stop), Some(attendance)) = (self.engine.current_stop(), self.attendance.as_mut()) else {
            return Err(TrackerError::no_active_trip("mark attendance"));
        };

        let stop_name = stop.name.clone();
        let record = attendance.mark(stop, student_id, outcome)?;
        self.engine.record(
            self.context.role,
            TripEventKind::AttendanceMarked {
                student_id: record.student_id.clone(),
                status: record.status,
            },
        );

        let (kind, title, message) = match outcome {
            AttendanceOutcome::Boarded => (
                NotificationKind::Pickup,
                format!("{} boarded", record.name),
                format!("Picked up at {stop_name}"),
            ),
            AttendanceOutcome::Absent => (
                NotificationKind::Alert,
                format!("{} marked absent", record.name),
                format!("Not at {stop_name} when the bus arrived"),
            ),
        };
        self.notifications.push(kind, title, message, Some(record.student_id.clone()));
        Ok(record)
    }

    /// A parent's leave for today: the child is marked absent and the driver is told not to wait.
    pub fn apply_leave(&mut self, student_id: &str, reason: Option<String>) -> Result<AttendanceRecord, TrackerError> {
        let attendance = match self.attendance.as_mut() {
            Some(attendance) if self.engine.state().is_active() => attendance,
            _ => return Err(TrackerError::no_active_trip("apply for leave")),
        };

        let record = attendance.excuse(student_id)?;
        self.engine.record(
            Role::Parent,
            TripEventKind::LeaveApplied {
                student_id: record.student_id.clone(),
                reason: reason.clone(),
            },
        );

        let stop_name = self
            .engine
            .route()
            .and_then(|route| route.stop(&record.stop_id).ok())
            .map_or(record.stop_id.as_str(), |stop| stop.name.as_str());
        let mut message = format!("{} will not be boarding at {stop_name}", record.name);
        if let Some(reason) = reason {
            message.push_str(&format!(" ({reason})"));
        }
        self.notifications
            .push(NotificationKind::Alert, "Leave applied", message, Some(record.student_id.clone()));
        Ok(record)
    }

    /// Posts a notification to every parent on the bus, e.g. a delay.
    pub fn announce(&mut self, kind: NotificationKind, title: impl Into<String>, message: impl Into<String>) -> Notification {
        self.notifications.push(kind, title, message, None)
    }

    pub fn notifications(&self) -> &NotificationFeed {
        &self.notifications
    }

    pub fn notifications_mut(&mut self) -> &mut NotificationFeed {
        &mut self.notifications
    }

    /// The status log of one child on the current or last trip.
    pub fn child_status(&self, student_id: &str) -> Result<ChildStatusView, TrackerError> {
        let (Some(route), Some(attendance)) = (self.engine.route(), self.attendance.as_ref()) else {
            return Err(TrackerError::InvalidTransition(format!(
                "no trip has started on vehicle {}",
                self.context.vehicle_id
            )));
        };
        let record = attendance
            .record(student_id)
            .ok_or_else(|| TrackerError::NotFound(format!("student {student_id} on route {}", route.route_id())))?;
        let stop_index = route.stop_index(&record.stop_id)?;
        let stop = route.stop_at(stop_index)?;

        let bus_has_left = match self.engine.state() {
            TripState::Active { current_stop_index } => current_stop_index > stop_index,
            TripState::Ended => true,
            TripState::NotStarted => false,
        };
        let status = match record.status {
            AttendanceStatus::Absent => ChildStatus::Absent,
            AttendanceStatus::Dropped => ChildStatus::Dropped,
            AttendanceStatus::Boarded if self.engine.state() == TripState::Ended => ChildStatus::Dropped,
            AttendanceStatus::Boarded if bus_has_left => ChildStatus::InTransit,
            AttendanceStatus::Boarded => ChildStatus::Boarded,
            AttendanceStatus::Pending if bus_has_left => ChildStatus::Absent,
            AttendanceStatus::Pending => ChildStatus::Waiting,
        };

        let events = self
            .engine
            .events()
            .iter()
            .filter(|event| match &event.kind {
                TripEventKind::Arrived { stop_id } | TripEventKind::Skipped { stop_id } => *stop_id == record.stop_id,
                TripEventKind::AttendanceMarked { student_id, .. } | TripEventKind::LeaveApplied { student_id, .. } => {
                    *student_id == record.student_id
                }
                TripEventKind::Started { .. } | TripEventKind::Ended => true,
            })
            .cloned()
            .collect();

        Ok(ChildStatusView {
            student_id: record.student_id.clone(),
            name: record.name.clone(),
            stop_id: stop.stop_id.clone(),
            stop_name: stop.name.clone(),
            scheduled_time: stop.scheduled_time,
            status,
            on_leave: record.on_leave,
            stops: self.stop_views(),
            events,
        })
    }

    fn stop_views(&self) -> Vec<StopView> {
        self.engine
            .stop_statuses()
            .into_iter()
            .map(|(stop, status)| StopView { stop, status })
            .collect()
    }

    pub fn attendance_summary(&self) -> AttendanceSummary {
        self.attendance.as_ref().map(AttendanceTracker::summary).unwrap_or_default()
    }

    /// Returns whether a new refresh was scheduled.
    pub fn refresh_telemetry(&mut self, now: Instant) -> Result<bool, TrackerError> {
        let active = self.engine.state().is_active();
        match (self.motion.as_mut(), self.engine.route()) {
            (Some(motion), _) => Ok(motion.refresh(now)),
            (None, Some(route)) if active => Err(TrackerError::InvalidTransition(format!(
                "cannot refresh telemetry, route {} has a single stop and no simulated motion",
                route.route_id()
            ))),
            (None, _) => Err(TrackerError::no_active_trip("refresh telemetry")),
        }
    }

    /// Whether the simulated marker has parked at the end of its path.
    pub fn motion_finished(&self) -> bool {
        self.motion.as_ref().is_some_and(MotionModel::is_finished)
    }

    /// Advances the simulated marker. Only moves while the trip is active.
    pub fn tick(&mut self, now: Instant) -> Option<LiveUpdate> {
        if !self.engine.state().is_active() {
            return None;
        }
        self.motion.as_mut().map(|motion| motion.tick(now))
    }

    pub fn snapshot(&mut self, now: Instant) -> TripSnapshot {
        let stops = self.stop_views();
        let route = self.engine.route();

        TripSnapshot {
            context: self.context.clone(),
            route_id: route.map(|route| route.route_id().to_string()),
            route_name: route.map(|route| route.name().to_string()),
            state: self.engine.state(),
            current_stop: self.engine.current_stop().cloned(),
            next_stop: self.engine.next_stop().cloned(),
            stops,
            current_stop_attendance: self.records_for_current_stop(),
            attendance: self.attendance.as_ref().map(|a| a.records().to_vec()).unwrap_or_default(),
            attendance_summary: self.attendance_summary(),
            live: self.motion.as_mut().map(|motion| motion.snapshot(now)),
            events: self.engine.events().to_vec(),
        }
    }
}
