use std::{
    ops::Range,
    str::FromStr,
    time::{Duration, Instant},
};

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Sampled speed in km/h, upper bound exclusive.
pub const SPEED_RANGE_KMH: Range<u32> = 40..45;
pub const DEFAULT_REFRESH_DELAY: Duration = Duration::from_millis(1500);

pub const DEFAULT_DISTANCE: &str = "4.2 km";
pub const DEFAULT_ETA: &str = "12 mins";
pub const DEFAULT_ADDRESS: &str = "Falnir Road, Mangalore - 575001";

/// Addresses shown after a refresh, in order, wrapping around.
pub const REFRESHED_ADDRESSES: &[&str] = &[
    "Kankanady Bypass, Mangalore",
    "Bejai Main Road, Mangalore",
    "Lighthouse Hill Road, Mangalore",
];

/// Whether telemetry is canned or computed from the marker's progress.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryMode {
    #[default]
    Synthetic,
    Derived,
}

impl FromStr for TelemetryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "synthetic" => Ok(TelemetryMode::Synthetic),
            "derived" => Ok(TelemetryMode::Derived),
            other => Err(format!("unknown telemetry mode '{other}', expected synthetic or derived")),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TelemetrySample {
    pub speed_kmh: u32,
    pub distance: String,
    pub eta: String,
    pub address: String,
    pub refreshing: bool,
}

/// Keeps the speed/ETA/distance readout populated.
#[derive(Debug, Clone)]
pub struct TelemetrySynthesizer {
    rng: StdRng,
    speed_kmh: u32,
    distance: String,
    eta: String,
    address: String,
    refresh_delay: Duration,
    pending_refresh: Option<Instant>,
    refreshes_applied: usize,
}

impl TelemetrySynthesizer {
    pub fn new(refresh_delay: Duration) -> Self {
        Self::with_rng(StdRng::from_os_rng(), refresh_delay)
    }

    pub fn with_seed(seed: u64, refresh_delay: Duration) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed), refresh_delay)
    }

    fn with_rng(rng: StdRng, refresh_delay: Duration) -> Self {
        Self {
            rng,
            speed_kmh: 42,
            distance: DEFAULT_DISTANCE.to_string(),
            eta: DEFAULT_ETA.to_string(),
            address: DEFAULT_ADDRESS.to_string(),
            refresh_delay,
            pending_refresh: None,
            refreshes_applied: 0,
        }
    }

    /// Draws a new speed and applies a refresh that has come due.
    pub fn tick(&mut self, now: Instant) -> TelemetrySample {
        self.speed_kmh = self.rng.random_range(SPEED_RANGE_KMH);
        self.settle(now);
        self.sample()
    }

    /// Schedules one address change after the refresh delay.
    ///
    /// Returns false when a refresh is already pending; the pending one is kept
    /// as is, so repeated calls never stack up changes or push the deadline out.
    pub fn refresh(&mut self, now: Instant) -> bool {
        if self.pending_refresh.is_some() {
            tracing::debug!("Refresh already pending, ignoring");
            return false;
        }
        self.pending_refresh = Some(now + self.refresh_delay);
        true
    }

    pub fn is_refreshing(&self) -> bool {
        self.pending_refresh.is_some()
    }

    pub fn settle(&mut self, now: Instant) {
        let Some(due) = self.pending_refresh else {
            return;
        };
        if now < due {
            return;
        }

        let next = REFRESHED_ADDRESSES[self.refreshes_applied % REFRESHED_ADDRESSES.len()];
        self.address = next.to_string();
        self.refreshes_applied += 1;
        self.pending_refresh = None;
        tracing::info!("Telemetry refreshed, address is now {}", self.address);
    }

    /// Overrides the canned distance and ETA strings.
    pub fn set_readout(&mut self, distance: String, eta: String) {
        self.distance = distance;
        self.eta = eta;
    }

    pub fn speed_kmh(&self) -> u32 {
        self.speed_kmh
    }

    pub fn sample(&self) -> TelemetrySample {
        TelemetrySample {
            speed_kmh: self.speed_kmh,
            distance: self.distance.clone(),
            eta: self.eta.clone(),
            address: self.address.clone(),
            refreshing: self.is_refreshing(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed_stays_in_range() {
        let mut telemetry = TelemetrySynthesizer::with_seed(7, DEFAULT_REFRESH_DELAY);
        let now = Instant::now();
        for _ in 0..500 {
            let sample = telemetry.tick(now);
            assert!(SPEED_RANGE_KMH.contains(&sample.speed_kmh), "got {}", sample.speed_kmh);
            assert_eq!(sample.distance, DEFAULT_DISTANCE);
            assert_eq!(sample.eta, DEFAULT_ETA);
        }
    }

    #[test]
    fn refresh_changes_address_once_after_delay() {
        let mut telemetry = TelemetrySynthesizer::with_seed(1, DEFAULT_REFRESH_DELAY);
        let t0 = Instant::now();

        assert!(telemetry.refresh(t0));
        assert!(telemetry.sample().refreshing);

        telemetry.settle(t0 + Duration::from_millis(1499));
        assert_eq!(telemetry.sample().address, DEFAULT_ADDRESS);

        telemetry.settle(t0 + DEFAULT_REFRESH_DELAY);
        let sample = telemetry.sample();
        assert_eq!(sample.address, REFRESHED_ADDRESSES[0]);
        assert!(!sample.refreshing);

        telemetry.settle(t0 + Duration::from_secs(10));
        assert_eq!(telemetry.sample().address, REFRESHED_ADDRESSES[0]);
    }

    #[test]
    fn repeated_refresh_is_coalesced() {
        let mut telemetry = TelemetrySynthesizer::with_seed(1, DEFAULT_REFRESH_DELAY);
        let t0 = Instant::now();

        assert!(telemetry.refresh(t0));
        assert!(!telemetry.refresh(t0 + Duration::from_millis(500)));
        assert!(!telemetry.refresh(t0 + Duration::from_millis(1000)));

        // The deadline is still the first call's.
        telemetry.tick(t0 + DEFAULT_REFRESH_DELAY);
        assert_eq!(telemetry.sample().address, REFRESHED_ADDRESSES[0]);

        telemetry.tick(t0 + Duration::from_secs(30));
        assert_eq!(telemetry.sample().address, REFRESHED_ADDRESSES[0]);

        // A new refresh after the first settled moves on to the next address.
        let t1 = t0 + Duration::from_secs(31);
        assert!(telemetry.refresh(t1));
        telemetry.settle(t1 + DEFAULT_REFRESH_DELAY);
        assert_eq!(telemetry.sample().address, REFRESHED_ADDRESSES[1]);
    }

    #[test]
    fn mode_parses() {
        assert_eq!("derived".parse::<TelemetryMode>(), Ok(TelemetryMode::Derived));
        assert!("random".parse::<TelemetryMode>().is_err());
    }
}
