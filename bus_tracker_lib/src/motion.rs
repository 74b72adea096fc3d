use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::{
    position::{EndPolicy, Path, PositionSimulator, VehiclePosition, DEFAULT_PROGRESS_STEP},
    telemetry::{TelemetryMode, TelemetrySample, TelemetrySynthesizer, DEFAULT_REFRESH_DELAY},
};

/// Rough kilometres per degree, good enough for a city-sized route.
pub const KM_PER_DEGREE: f64 = 111.32;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionConfig {
    pub step: f64,
    pub end_policy: EndPolicy,
    pub telemetry_mode: TelemetryMode,
    pub refresh_delay: Duration,
    /// Fixed seed for the speed samples, random when unset.
    pub seed: Option<u64>,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            step: DEFAULT_PROGRESS_STEP,
            end_policy: EndPolicy::default(),
            telemetry_mode: TelemetryMode::default(),
            refresh_delay: DEFAULT_REFRESH_DELAY,
            seed: None,
        }
    }
}

/// What the live map shows on every tick.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LiveUpdate {
    pub position: VehiclePosition,
    pub telemetry: TelemetrySample,
}

/// Drives the marker and the telemetry readout from one clock.
///
/// In [`TelemetryMode::Synthetic`] the readout is independent of the marker.
/// In [`TelemetryMode::Derived`] distance and ETA are computed from the same
/// progress value that places the marker.
#[derive(Debug, Clone)]
pub struct MotionModel {
    position: PositionSimulator,
    telemetry: TelemetrySynthesizer,
    mode: TelemetryMode,
    km_per_unit: f64,
}

impl MotionModel {
    pub fn new(path: Path, km_per_unit: f64, config: MotionConfig) -> Self {
        let telemetry = match config.seed {
            Some(seed) => TelemetrySynthesizer::with_seed(seed, config.refresh_delay),
            None => TelemetrySynthesizer::new(config.refresh_delay),
        };

        let mut model = Self {
            position: PositionSimulator::new(path, config.step, config.end_policy),
            telemetry,
            mode: config.telemetry_mode,
            km_per_unit,
        };
        model.update_readout();
        model
    }

    pub fn mode(&self) -> TelemetryMode {
        self.mode
    }

    pub fn position(&self) -> VehiclePosition {
        self.position.position()
    }

    pub fn is_finished(&self) -> bool {
        self.position.is_finished()
    }

    pub fn tick(&mut self, now: Instant) -> LiveUpdate {
        let position = self.position.tick();
        self.telemetry.tick(now);
        self.update_readout();
        LiveUpdate {
            position,
            telemetry: self.telemetry.sample(),
        }
    }

    pub fn refresh(&mut self, now: Instant) -> bool {
        self.telemetry.refresh(now)
    }

    pub fn snapshot(&mut self, now: Instant) -> LiveUpdate {
        self.telemetry.settle(now);
        LiveUpdate {
            position: self.position.position(),
            telemetry: self.telemetry.sample(),
        }
    }

    pub fn reset(&mut self) {
        self.position.reset();
        self.update_readout();
    }

    /// Remaining distance in km along the path from the current progress.
    pub fn remaining_km(&self) -> f64 {
        let left = (100.0 - self.position.progress()).max(0.0) / 100.0;
        self.position.path().length() * left * self.km_per_unit
    }

    fn update_readout(&mut self) {
        if self.mode != TelemetryMode::Derived {
            return;
        }

        let remaining = self.remaining_km();
        let speed = self.telemetry.speed_kmh().max(1) as f64;
        let minutes = (remaining / speed * 60.0).ceil() as u64;
        let eta = if minutes == 1 { "1 min".to_string() } else { format!("{minutes} mins") };
        self.telemetry.set_readout(format!("{remaining:.1} km"), eta);
    }
}
