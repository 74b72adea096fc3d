use std::str::FromStr;

use geo_types::{coord, Coord};
use serde::{Deserialize, Serialize};

use crate::error::TrackerError;

/// Progress added on every tick by the simulated driver.
pub const DEFAULT_PROGRESS_STEP: f64 = 0.2;

/// What happens when the marker reaches the end of the path.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EndPolicy {
    /// Wrap from 100 back to 0, the vehicle loops the route forever.
    Loop,
    /// Hold at the final waypoint.
    #[default]
    StopAtEnd,
}

impl FromStr for EndPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "loop" => Ok(EndPolicy::Loop),
            "stop_at_end" => Ok(EndPolicy::StopAtEnd),
            other => Err(format!("unknown end policy '{other}', expected loop or stop_at_end")),
        }
    }
}

/// A polyline of at least two waypoints.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(try_from = "RawPath")]
pub struct Path {
    waypoints: Vec<Coord>,
}

#[derive(Deserialize)]
struct RawPath {
    waypoints: Vec<Coord>,
}

impl TryFrom<RawPath> for Path {
    type Error = TrackerError;

    fn try_from(raw: RawPath) -> Result<Self, Self::Error> {
        Path::new(raw.waypoints)
    }
}

impl Path {
    pub fn new(waypoints: Vec<Coord>) -> Result<Self, TrackerError> {
        if waypoints.len() < 2 {
            return Err(TrackerError::InvalidPath(waypoints.len()));
        }
        Ok(Self { waypoints })
    }

    /// The hand-drawn map path of the Falnir route, in screen units.
    pub fn demo() -> Self {
        Self {
            waypoints: vec![
                coord! { x: 100., y: 100. },
                coord! { x: 200., y: 250. },
                coord! { x: 350., y: 220. },
                coord! { x: 450., y: 400. },
                coord! { x: 650., y: 350. },
                coord! { x: 800., y: 200. },
            ],
        }
    }

    pub fn waypoints(&self) -> &[Coord] {
        &self.waypoints
    }

    pub fn segments(&self) -> usize {
        self.waypoints.len() - 1
    }

    /// Total euclidean length in path units.
    pub fn length(&self) -> f64 {
        self.waypoints
            .windows(2)
            .map(|pair| (pair[1].x - pair[0].x).hypot(pair[1].y - pair[0].y))
            .sum()
    }

    /// Maps a progress value in [0, 100] to a point on the path.
    ///
    /// Progress is split into one equal-width band per segment, and the point is
    /// interpolated linearly inside its band. Out of range progress wraps under
    /// [`EndPolicy::Loop`] and is clamped under [`EndPolicy::StopAtEnd`].
    pub fn point_at(&self, progress: f64, policy: EndPolicy) -> Coord {
        let progress = normalize(progress, policy);
        let segments = self.segments();

        let scaled = progress / 100.0 * segments as f64;
        let band = (scaled.floor() as usize).min(segments - 1);
        let fraction = scaled - band as f64;

        let from = self.waypoints[band];
        let to = self.waypoints[band + 1];
        coord! {
            x: from.x + (to.x - from.x) * fraction,
            y: from.y + (to.y - from.y) * fraction,
        }
    }
}

fn normalize(progress: f64, policy: EndPolicy) -> f64 {
    if !progress.is_finite() {
        return 0.0;
    }
    match policy {
        EndPolicy::Loop => progress.rem_euclid(100.0),
        EndPolicy::StopAtEnd => progress.clamp(0.0, 100.0),
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct VehiclePosition {
    pub progress: f64,
    pub point: Coord,
}

/// Moves a marker along a [`Path`] by a fixed step on every tick.
#[derive(Debug, Clone)]
pub struct PositionSimulator {
    path: Path,
    progress: f64,
    step: f64,
    policy: EndPolicy,
}

impl PositionSimulator {
    pub fn new(path: Path, step: f64, policy: EndPolicy) -> Self {
        Self {
            path,
            progress: 0.0,
            step,
            policy,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn policy(&self) -> EndPolicy {
        self.policy
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn reset(&mut self) {
        self.progress = 0.0;
    }

    pub fn is_finished(&self) -> bool {
        self.policy == EndPolicy::StopAtEnd && self.progress >= 100.0
    }

    pub fn position(&self) -> VehiclePosition {
        VehiclePosition {
            progress: self.progress,
            point: self.path.point_at(self.progress, self.policy),
        }
    }

    pub fn tick(&mut self) -> VehiclePosition {
        self.progress = match self.policy {
            EndPolicy::Loop => (self.progress + self.step).rem_euclid(100.0),
            EndPolicy::StopAtEnd => (self.progress + self.step).min(100.0),
        };
        self.position()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn l_path() -> Path {
        Path::new(vec![
            coord! { x: 0., y: 0. },
            coord! { x: 10., y: 0. },
            coord! { x: 10., y: 10. },
        ])
        .unwrap()
    }

    #[test]
    fn interpolates_within_bands() {
        let path = l_path();
        assert_eq!(path.point_at(25.0, EndPolicy::StopAtEnd), coord! { x: 5., y: 0. });
        assert_eq!(path.point_at(75.0, EndPolicy::StopAtEnd), coord! { x: 10., y: 5. });
        assert_eq!(path.point_at(50.0, EndPolicy::Loop), coord! { x: 10., y: 0. });
        assert_eq!(path.point_at(0.0, EndPolicy::Loop), coord! { x: 0., y: 0. });
    }

    #[test]
    fn end_of_path_depends_on_policy() {
        let path = l_path();
        assert_eq!(path.point_at(100.0, EndPolicy::StopAtEnd), coord! { x: 10., y: 10. });
        assert_eq!(path.point_at(100.0, EndPolicy::Loop), coord! { x: 0., y: 0. });
        assert_eq!(path.point_at(140.0, EndPolicy::StopAtEnd), coord! { x: 10., y: 10. });
        assert_eq!(path.point_at(125.0, EndPolicy::Loop), coord! { x: 5., y: 0. });
    }

    #[test]
    fn demo_path_matches_hand_drawn_bands() {
        let path = Path::demo();
        assert_eq!(path.segments(), 5);
        assert_eq!(path.point_at(10.0, EndPolicy::Loop), coord! { x: 150., y: 175. });
        assert_eq!(path.point_at(40.0, EndPolicy::Loop), coord! { x: 350., y: 220. });
    }

    #[test]
    fn too_few_waypoints_is_invalid() {
        assert_eq!(Path::new(vec![]), Err(TrackerError::InvalidPath(0)));
        assert_eq!(Path::new(vec![coord! { x: 1., y: 1. }]), Err(TrackerError::InvalidPath(1)));
    }

    #[test]
    fn deserialized_paths_are_validated() {
        let err = serde_json::from_str::<Path>(r#"{"waypoints": [{"x": 1.0, "y": 1.0}]}"#).unwrap_err();
        assert!(err.to_string().contains("at least 2 waypoints"), "got: {err}");

        let path: Path = serde_json::from_str(r#"{"waypoints": [{"x": 0.0, "y": 0.0}, {"x": 10.0, "y": 0.0}]}"#).unwrap();
        assert_eq!(path.point_at(50.0, EndPolicy::StopAtEnd), coord! { x: 5., y: 0. });
    }

    #[test]
    fn length_sums_segments() {
        assert_eq!(l_path().length(), 20.0);
    }

    #[test]
    fn simulator_stops_at_end() {
        let mut sim = PositionSimulator::new(l_path(), 30.0, EndPolicy::StopAtEnd);
        sim.tick();
        sim.tick();
        sim.tick();
        assert!(!sim.is_finished());
        let last = sim.tick();
        assert_eq!(last.progress, 100.0);
        assert_eq!(last.point, coord! { x: 10., y: 10. });
        assert!(sim.is_finished());
        assert_eq!(sim.tick().progress, 100.0);
    }

    #[test]
    fn simulator_loops() {
        let mut sim = PositionSimulator::new(l_path(), 30.0, EndPolicy::Loop);
        for _ in 0..4 {
            sim.tick();
        }
        assert_eq!(sim.progress(), 20.0);
        assert!(!sim.is_finished());

        sim.reset();
        assert_eq!(sim.position().point, coord! { x: 0., y: 0. });
    }

    #[test]
    fn end_policy_parses() {
        assert_eq!("loop".parse::<EndPolicy>(), Ok(EndPolicy::Loop));
        assert_eq!("stop_at_end".parse::<EndPolicy>(), Ok(EndPolicy::StopAtEnd));
        assert!("bounce".parse::<EndPolicy>().is_err());
    }
}
