use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    attendance::AttendanceStatus,
    error::TrackerError,
    route::{Route, RouteId, Stop, StopId, StopStatus},
    session::Role,
};

pub type VehicleId = String;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TripState {
    NotStarted,
    Active { current_stop_index: usize },
    Ended,
}

impl TripState {
    pub fn is_active(&self) -> bool {
        matches!(self, TripState::Active { .. })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TripEventKind {
    Started { route_id: RouteId },
    Arrived { stop_id: StopId },
    Skipped { stop_id: StopId },
    AttendanceMarked { student_id: String, status: AttendanceStatus },
    LeaveApplied { student_id: String, reason: Option<String> },
    Ended,
}

/// One line of a trip's audit log.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TripEvent {
    pub timestamp: DateTime<Utc>,
    /// Who performed the action.
    pub role: Role,
    #[serde(flatten)]
    pub kind: TripEventKind,
}

/// The stop-by-stop state machine of one vehicle.
///
/// Stop statuses are never stored, every accessor derives them from the
/// current state so they cannot go stale across a transition.
#[derive(Debug, Clone)]
pub struct TripEngine {
    vehicle_id: VehicleId,
    route: Option<Arc<Route>>,
    state: TripState,
    started_at: Option<DateTime<Utc>>,
    events: Vec<TripEvent>,
    role: Role,
    trip_number: u64,
}

impl TripEngine {
    pub fn new(vehicle_id: impl Into<VehicleId>) -> Self {
        Self {
            vehicle_id: vehicle_id.into(),
            route: None,
            state: TripState::NotStarted,
            started_at: None,
            events: Vec::new(),
            role: Role::default(),
            trip_number: 0,
        }
    }

    /// The role recorded on every following event.
    pub fn set_role(&mut self, role: Role) {
        self.role = role;
    }

    /// Counts started trips. Each successful [`Self::start`] gets a new number.
    pub fn trip_number(&self) -> u64 {
        self.trip_number
    }

    pub fn vehicle_id(&self) -> &str {
        &self.vehicle_id
    }

    pub fn state(&self) -> TripState {
        self.state
    }

    pub fn route(&self) -> Option<&Arc<Route>> {
        self.route.as_ref()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn events(&self) -> &[TripEvent] {
        &self.events
    }

    /// Begins a fresh trip at the first stop. A vehicle has at most one active trip.
    pub fn start(&mut self, route: Arc<Route>) -> Result<TripState, TrackerError> {
        if self.state.is_active() {
            return Err(TrackerError::InvalidTransition(format!(
                "vehicle {} already has an active trip",
                self.vehicle_id
            )));
        }

        let first_stop = route.stop_at(0)?.stop_id.clone();
        let now = Utc::now();
        tracing::info!(vehicle = %self.vehicle_id, "Trip started on route {}", route.route_id());

        self.events.clear();
        self.push(
            now,
            TripEventKind::Started {
                route_id: route.route_id().to_string(),
            },
        );
        self.push(now, TripEventKind::Arrived { stop_id: first_stop });
        self.route = Some(route);
        self.started_at = Some(now);
        self.state = TripState::Active { current_stop_index: 0 };
        self.trip_number += 1;

        Ok(self.state)
    }

    /// Arrives at the next stop. Arriving at the final stop completes the trip.
    pub fn advance(&mut self) -> Result<TripState, TrackerError> {
        self.step(false)
    }

    /// Leaves the current stop without serving it. Same transition as [`Self::advance`].
    pub fn skip(&mut self) -> Result<TripState, TrackerError> {
        self.step(true)
    }

    fn step(&mut self, skipped: bool) -> Result<TripState, TrackerError> {
        let action = if skipped { "skip" } else { "advance" };
        let (TripState::Active { current_stop_index }, Some(route)) = (self.state, self.route.clone()) else {
            return Err(TrackerError::no_active_trip(action));
        };

        let now = Utc::now();
        let leaving = &route.stops()[current_stop_index];
        if skipped {
            tracing::info!(vehicle = %self.vehicle_id, "Skipped stop {}", leaving.name);
            self.push(
                now,
                TripEventKind::Skipped {
                    stop_id: leaving.stop_id.clone(),
                },
            );
        }

        let next_index = (current_stop_index + 1).min(route.len() - 1);
        let next = &route.stops()[next_index];
        if next_index != current_stop_index {
            tracing::info!(vehicle = %self.vehicle_id, "Arrived at stop {} ({}/{})", next.name, next_index + 1, route.len());
            self.push(
                now,
                TripEventKind::Arrived {
                    stop_id: next.stop_id.clone(),
                },
            );
        }

        if next_index + 1 >= route.len() {
            self.finish(now);
        } else {
            self.state = TripState::Active {
                current_stop_index: next_index,
            };
        }

        Ok(self.state)
    }

    /// Ends the trip from any state. Ending twice is a no-op.
    pub fn end(&mut self) -> TripState {
        if self.state != TripState::Ended {
            self.finish(Utc::now());
        }
        self.state
    }

    fn finish(&mut self, now: DateTime<Utc>) {
        tracing::info!(vehicle = %self.vehicle_id, "Trip ended");
        self.push(now, TripEventKind::Ended);
        self.state = TripState::Ended;
    }

    fn push(&mut self, timestamp: DateTime<Utc>, kind: TripEventKind) {
        self.events.push(TripEvent {
            timestamp,
            role: self.role,
            kind,
        });
    }

    /// Appends an event performed by `role`, which may differ from the acting role.
    pub(crate) fn record(&mut self, role: Role, kind: TripEventKind) {
        self.events.push(TripEvent {
            timestamp: Utc::now(),
            role,
            kind,
        });
    }

    pub fn current_stop_index(&self) -> Option<usize> {
        match self.state {
            TripState::Active { current_stop_index } => Some(current_stop_index),
            _ => None,
        }
    }

    pub fn current_stop(&self) -> Option<&Stop> {
        let index = self.current_stop_index()?;
        self.route.as_ref().map(|route| &route.stops()[index])
    }

    pub fn next_stop(&self) -> Option<&Stop> {
        let index = self.current_stop_index()?;
        self.route.as_ref().and_then(|route| route.stops().get(index + 1))
    }

    /// Derives the display status of the stop at `stop_index`.
    pub fn status_of(&self, stop_index: usize) -> Result<StopStatus, TrackerError> {
        let route = self
            .route
            .as_ref()
            .ok_or_else(|| TrackerError::NotFound(format!("no route assigned to vehicle {}", self.vehicle_id)))?;
        route.stop_at(stop_index)?;

        Ok(match self.state {
            TripState::NotStarted => StopStatus::Upcoming,
            TripState::Ended => StopStatus::Passed,
            TripState::Active { current_stop_index } => match stop_index.cmp(&current_stop_index) {
                std::cmp::Ordering::Less => StopStatus::Passed,
                std::cmp::Ordering::Equal => StopStatus::Current,
                std::cmp::Ordering::Greater => StopStatus::Upcoming,
            },
        })
    }

    /// Every stop of the route with its derived status, in travel order.
    pub fn stop_statuses(&self) -> Vec<(Stop, StopStatus)> {
        let Some(route) = self.route.as_ref() else {
            return Vec::new();
        };
        route
            .stops()
            .iter()
            .enumerate()
            .filter_map(|(index, stop)| self.status_of(index).ok().map(|status| (stop.clone(), status)))
            .collect()
    }
}
