use std::{
    fmt,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use bus_tracker_lib::{
    motion::MotionConfig,
    position::{DEFAULT_PROGRESS_STEP, EndPolicy},
    telemetry::{DEFAULT_REFRESH_DELAY, TelemetryMode},
};

#[derive(Debug)]
pub enum ConfigurationError {
    Read(PathBuf, std::io::Error),
    /// A non-comment line without `=`.
    Malformed { line: usize, text: String },
    InvalidValue { key: String, value: String, reason: String },
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigurationError::Read(path, err) => write!(f, "Failed to read {}: {err}", path.display()),
            ConfigurationError::Malformed { line, text } => write!(f, "Line {line} is not key = value: '{text}'"),
            ConfigurationError::InvalidValue { key, value, reason } => write!(f, "Invalid value '{value}' for {key}: {reason}"),
        }
    }
}

impl std::error::Error for ConfigurationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigurationError::Read(_, err) => Some(err),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    pub bind_address: IpAddr,
    pub port: u16,
    pub position_tick: Duration,
    pub refresh_delay: Duration,
    pub progress_step: f64,
    pub end_policy: EndPolicy,
    pub telemetry_mode: TelemetryMode,
    pub log_dir: PathBuf,
    pub live_channel_capacity: usize,
    /// Keys that were present but not recognised. Reported once logging is up.
    pub unknown_keys: Vec<String>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 3169,
            position_tick: Duration::from_millis(50),
            refresh_delay: DEFAULT_REFRESH_DELAY,
            progress_step: DEFAULT_PROGRESS_STEP,
            end_policy: EndPolicy::StopAtEnd,
            telemetry_mode: TelemetryMode::Synthetic,
            log_dir: PathBuf::from("server/log"),
            live_channel_capacity: 100,
            unknown_keys: Vec::new(),
        }
    }
}

impl Configuration {
    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let text = std::fs::read_to_string(path).map_err(|err| ConfigurationError::Read(path.to_path_buf(), err))?;
        Self::parse(&text)
    }

    /// Parses `key = value` lines. Missing keys keep their default.
    pub fn parse(text: &str) -> Result<Self, ConfigurationError> {
        let mut configuration = Self::default();

        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(ConfigurationError::Malformed {
                    line: number + 1,
                    text: line.to_string(),
                });
            };
            let key = key.trim();
            let value = value.trim();

            match key {
                "bind_address" => configuration.bind_address = parse_value(key, value)?,
                "port" => configuration.port = parse_value(key, value)?,
                "position_tick_ms" => configuration.position_tick = Duration::from_millis(positive(key, value)?),
                "refresh_delay_ms" => configuration.refresh_delay = Duration::from_millis(parse_value(key, value)?),
                "progress_step" => {
                    let step: f64 = parse_value(key, value)?;
                    if !step.is_finite() || step <= 0.0 {
                        return Err(invalid(key, value, "must be a positive number"));
                    }
                    configuration.progress_step = step;
                }
                "end_policy" => configuration.end_policy = parse_value(key, value)?,
                "telemetry_mode" => configuration.telemetry_mode = parse_value(key, value)?,
                "log_dir" => configuration.log_dir = PathBuf::from(value),
                "live_channel_capacity" => configuration.live_channel_capacity = positive(key, value)? as usize,
                _ => configuration.unknown_keys.push(key.to_string()),
            }
        }

        Ok(configuration)
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    pub fn motion_config(&self) -> MotionConfig {
        MotionConfig {
            step: self.progress_step,
            end_policy: self.end_policy,
            telemetry_mode: self.telemetry_mode,
            refresh_delay: self.refresh_delay,
            seed: None,
        }
    }
}

fn parse_value<T>(key: &str, value: &str) -> Result<T, ConfigurationError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value.parse().map_err(|err: T::Err| invalid(key, value, &err.to_string()))
}

fn positive(key: &str, value: &str) -> Result<u64, ConfigurationError> {
    match parse_value::<u64>(key, value)? {
        0 => Err(invalid(key, value, "must be greater than zero")),
        n => Ok(n),
    }
}

fn invalid(key: &str, value: &str, reason: &str) -> ConfigurationError {
    ConfigurationError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        assert_eq!(Configuration::parse("").unwrap(), Configuration::default());
        assert_eq!(Configuration::default().socket_addr().to_string(), "127.0.0.1:3169");
    }

    #[test]
    fn parses_every_key() {
        let text = "
            # demo box
            bind_address = 0.0.0.0
            port = 8080
            position_tick_ms = 100
            refresh_delay_ms = 500
            progress_step = 0.5
            end_policy = loop
            telemetry_mode = derived
            log_dir = /tmp/bus
            live_channel_capacity = 16
        ";
        let configuration = Configuration::parse(text).unwrap();

        assert_eq!(configuration.socket_addr().to_string(), "0.0.0.0:8080");
        assert_eq!(configuration.position_tick, Duration::from_millis(100));
        assert_eq!(configuration.refresh_delay, Duration::from_millis(500));
        assert_eq!(configuration.progress_step, 0.5);
        assert_eq!(configuration.end_policy, EndPolicy::Loop);
        assert_eq!(configuration.telemetry_mode, TelemetryMode::Derived);
        assert_eq!(configuration.log_dir, PathBuf::from("/tmp/bus"));
        assert_eq!(configuration.live_channel_capacity, 16);
        assert!(configuration.unknown_keys.is_empty());
    }

    #[test]
    fn unknown_keys_are_collected() {
        let configuration = Configuration::parse("sim_pin = 1234\nport = 80").unwrap();
        assert_eq!(configuration.unknown_keys, vec!["sim_pin".to_string()]);
        assert_eq!(configuration.port, 80);
    }

    #[test]
    fn malformed_lines_are_errors() {
        let err = Configuration::parse("port = 80\nlog_dir").unwrap_err();
        assert!(matches!(err, ConfigurationError::Malformed { line: 2, .. }));
    }

    #[test]
    fn bad_values_are_errors() {
        for text in [
            "port = eighty",
            "position_tick_ms = 0",
            "progress_step = -1",
            "end_policy = bounce",
            "live_channel_capacity = 0",
        ] {
            assert!(
                matches!(Configuration::parse(text), Err(ConfigurationError::InvalidValue { .. })),
                "{text}"
            );
        }
    }

    #[test]
    fn motion_config_follows_file() {
        let configuration = Configuration::parse("end_policy = loop\nprogress_step = 1").unwrap();
        let motion = configuration.motion_config();
        assert_eq!(motion.end_policy, EndPolicy::Loop);
        assert_eq!(motion.step, 1.0);
        assert_eq!(motion.seed, None);
    }
}
