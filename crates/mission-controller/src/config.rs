use config::builder::DefaultState;
use config::ConfigBuilder;
use mission_core::{MissionParams, ParamsError};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use vehicle_link::{RetryPolicy, VehicleConfig};

/// The autopilot falls back to failsafe below 2 Hz; keep a 10x margin.
pub const MIN_TICK_RATE_HZ: f64 = 20.0;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// mavlink address, e.g. `udpin:0.0.0.0:14550` or `serial:/dev/ttyACM0:921600`.
    pub address: String,
    pub system_id: u8,
    pub component_id: u8,
    pub heartbeat_interval_ms: u64,
    pub connect_timeout_ms: u64,
    pub retry_policy: RetryPolicy,
}

impl Default for LinkConfig {
    fn default() -> Self {
        let vehicle = VehicleConfig::default();
        Self {
            address: String::from("udpin:0.0.0.0:14550"),
            system_id: vehicle.system_id,
            component_id: vehicle.component_id,
            heartbeat_interval_ms: vehicle.heartbeat_interval.as_millis() as u64,
            connect_timeout_ms: vehicle.connect_timeout.as_millis() as u64,
            retry_policy: vehicle.retry_policy,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TickConfig {
    pub rate_hz: f64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            rate_hz: MIN_TICK_RATE_HZ,
        }
    }
}

impl TickConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.rate_hz)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AbortConfig {
    /// Send the forced-disarm magic value, which disarms even in flight.
    pub force_disarm: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub link: LinkConfig,
    pub server: ServerConfig,
    pub tick: TickConfig,
    pub mission: MissionParams,
    pub abort: AbortConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Source(#[from] config::ConfigError),
    #[error("tick rate {0} Hz is below the {MIN_TICK_RATE_HZ} Hz minimum")]
    TickRateTooLow(f64),
    #[error("heartbeat interval must be non-zero")]
    ZeroHeartbeatInterval,
    #[error("invalid mission parameters: {0}")]
    Mission(#[from] ParamsError),
}

impl ControllerConfig {
    /// Read an optional TOML file, then apply `MISSION_CONTROLLER__SECTION__KEY`
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        Self::build(builder)
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let config: Self = builder
            .add_source(
                config::Environment::with_prefix("MISSION_CONTROLLER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.tick.rate_hz.is_finite() && self.tick.rate_hz >= MIN_TICK_RATE_HZ) {
            return Err(ConfigError::TickRateTooLow(self.tick.rate_hz));
        }
        if self.link.heartbeat_interval_ms == 0 {
            return Err(ConfigError::ZeroHeartbeatInterval);
        }
        self.mission.validate()?;
        Ok(())
    }

    pub fn vehicle_config(&self) -> VehicleConfig {
        VehicleConfig {
            system_id: self.link.system_id,
            component_id: self.link.component_id,
            retry_policy: self.link.retry_policy,
            heartbeat_interval: Duration::from_millis(self.link.heartbeat_interval_ms),
            connect_timeout: Duration::from_millis(self.link.connect_timeout_ms),
            ..VehicleConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat};

    fn parse(toml: &str) -> Result<ControllerConfig, ConfigError> {
        ControllerConfig::build(
            config::Config::builder().add_source(File::from_str(toml, FileFormat::Toml)),
        )
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.link.address, "udpin:0.0.0.0:14550");
        assert_eq!(config.tick.rate_hz, 20.0);
        assert_eq!(config.tick.period(), Duration::from_millis(50));
        assert_eq!(config.mission, MissionParams::default());
        assert!(!config.abort.force_disarm);
    }

    #[test]
    fn sections_override_defaults() {
        let config = parse(
            r#"
            [link]
            address = "serial:/dev/ttyACM0:921600"

            [server]
            bind = "127.0.0.1:9000"

            [tick]
            rate_hz = 50.0

            [mission]
            capture_radius_m = 0.5

            [abort]
            force_disarm = true
            "#,
        )
        .unwrap();

        assert_eq!(config.link.address, "serial:/dev/ttyACM0:921600");
        assert_eq!(config.server.bind, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.tick.period(), Duration::from_millis(20));
        assert_eq!(config.mission.capture_radius_m, 0.5);
        assert_eq!(config.mission.hover_altitude_m, 1.5);
        assert!(config.abort.force_disarm);
        assert_eq!(config.vehicle_config().heartbeat_interval, Duration::from_secs(1));
    }

    #[test]
    fn slow_tick_rate_is_rejected() {
        let err = parse("[tick]\nrate_hz = 5.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::TickRateTooLow(rate) if rate == 5.0));
    }

    #[test]
    fn invalid_mission_params_are_rejected() {
        let err = parse("[mission]\nland_divisor = 0.5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Mission(ParamsError::DivisorTooSmall(_))));
    }

    #[test]
    fn bundled_config_matches_defaults() {
        let config = parse(include_str!("../mission-controller.toml")).unwrap();
        let defaults = ControllerConfig::default();
        assert_eq!(config.link.address, defaults.link.address);
        assert_eq!(config.server.bind, defaults.server.bind);
        assert_eq!(config.mission, defaults.mission);
        assert_eq!(config.vehicle_config().connect_timeout, Duration::from_secs(30));
    }
}
