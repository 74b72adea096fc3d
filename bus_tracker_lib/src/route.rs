use std::collections::HashSet;

use chrono::NaiveTime;
use geo_types::Point;
use serde::{Deserialize, Serialize};

use crate::{error::TrackerError, position::Path};

pub type RouteId = String;
pub type StopId = String;

/// Display status of a stop, always derived from the trip's current-stop index.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StopStatus {
    Passed,
    Current,
    Upcoming,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Stop {
    pub stop_id: StopId,
    pub name: String,
    pub scheduled_time: NaiveTime,
    /// x is longitude, y is latitude.
    pub location: Point,
    pub students_count: Option<u32>,
}

impl Stop {
    pub fn new(stop_id: impl Into<StopId>, name: impl Into<String>, scheduled_time: NaiveTime, lat: f64, lng: f64) -> Self {
        Self {
            stop_id: stop_id.into(),
            name: name.into(),
            scheduled_time,
            location: Point::new(lng, lat),
            students_count: None,
        }
    }

    pub fn with_students_count(mut self, count: u32) -> Self {
        self.students_count = Some(count);
        self
    }

    pub fn lat(&self) -> f64 {
        self.location.y()
    }

    pub fn lng(&self) -> f64 {
        self.location.x()
    }

    /// "07:30 AM" style label used on the timeline.
    pub fn time_label(&self) -> String {
        self.scheduled_time.format("%I:%M %p").to_string()
    }
}

/// An ordered, immutable list of stops. Order is travel order.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(try_from = "RawRoute")]
pub struct Route {
    route_id: RouteId,
    name: String,
    stops: Vec<Stop>,
}

#[derive(Deserialize)]
struct RawRoute {
    route_id: RouteId,
    name: String,
    stops: Vec<Stop>,
}

impl TryFrom<RawRoute> for Route {
    type Error = TrackerError;

    fn try_from(raw: RawRoute) -> Result<Self, Self::Error> {
        Route::new(raw.route_id, raw.name, raw.stops)
    }
}

impl Route {
    pub fn new(route_id: impl Into<RouteId>, name: impl Into<String>, stops: Vec<Stop>) -> Result<Self, TrackerError> {
        let route_id = route_id.into();
        if stops.is_empty() {
            return Err(TrackerError::InvalidRoute(format!("route {route_id} has no stops")));
        }

        let mut seen = HashSet::new();
        if let Some(dup) = stops.iter().find(|stop| !seen.insert(stop.stop_id.as_str())) {
            return Err(TrackerError::InvalidRoute(format!("route {route_id} has duplicate stop id {}", dup.stop_id)));
        }

        Ok(Self {
            route_id,
            name: name.into(),
            stops,
        })
    }

    pub fn route_id(&self) -> &str {
        &self.route_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stops(&self) -> &[Stop] {
        &self.stops
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    pub fn stop_at(&self, index: usize) -> Result<&Stop, TrackerError> {
        self.stops
            .get(index)
            .ok_or_else(|| TrackerError::NotFound(format!("stop #{index} on route {}", self.route_id)))
    }

    pub fn stop_index(&self, stop_id: &str) -> Result<usize, TrackerError> {
        self.stops
            .iter()
            .position(|stop| stop.stop_id == stop_id)
            .ok_or_else(|| TrackerError::NotFound(format!("stop {stop_id} on route {}", self.route_id)))
    }

    pub fn stop(&self, stop_id: &str) -> Result<&Stop, TrackerError> {
        self.stop_index(stop_id).map(|index| &self.stops[index])
    }

    /// Waypoint path through the stop coordinates, in travel order.
    pub fn path(&self) -> Result<Path, TrackerError> {
        Path::new(self.stops.iter().map(|stop| stop.location.0).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn sample() -> Route {
        Route::new(
            "r1",
            "RT-FALNIR",
            vec![
                Stop::new("a", "Falnir", time(7, 30), 12.8698, 74.8430),
                Stop::new("b", "Kankanady", time(7, 42), 12.8725, 74.8562),
                Stop::new("c", "St. Aloysius", time(8, 0), 12.8741, 74.8460),
            ],
        )
        .unwrap()
    }

    #[test]
    fn lookups_follow_travel_order() {
        let route = sample();
        assert_eq!(route.len(), 3);
        assert_eq!(route.stop_at(1).unwrap().name, "Kankanady");
        assert_eq!(route.stop_index("c").unwrap(), 2);
        assert_eq!(route.stop("a").unwrap().time_label(), "07:30 AM");
    }

    #[test]
    fn unknown_lookups_are_not_found() {
        let route = sample();
        assert!(matches!(route.stop_at(3), Err(TrackerError::NotFound(_))));
        assert!(matches!(route.stop_index("zz"), Err(TrackerError::NotFound(_))));
    }

    #[test]
    fn rejects_empty_and_duplicate_routes() {
        assert!(matches!(Route::new("r", "empty", vec![]), Err(TrackerError::InvalidRoute(_))));

        let stops = vec![
            Stop::new("a", "One", time(7, 0), 0.0, 0.0),
            Stop::new("a", "Two", time(7, 5), 1.0, 1.0),
        ];
        assert!(matches!(Route::new("r", "dup", stops), Err(TrackerError::InvalidRoute(_))));
    }

    #[test]
    fn deserialized_routes_are_validated() {
        let err = serde_json::from_str::<Route>(r#"{"route_id": "r", "name": "empty", "stops": []}"#).unwrap_err();
        assert!(err.to_string().contains("has no stops"), "got: {err}");

        let json = serde_json::to_string(&sample()).unwrap();
        assert_eq!(serde_json::from_str::<Route>(&json).unwrap(), sample());
    }

    #[test]
    fn coordinates_are_lat_lng() {
        let route = sample();
        let stop = route.stop_at(0).unwrap();
        assert_eq!(stop.lat(), 12.8698);
        assert_eq!(stop.lng(), 74.8430);
        assert_eq!(route.path().unwrap().waypoints().len(), 3);
    }
}
