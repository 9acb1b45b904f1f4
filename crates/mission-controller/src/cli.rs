use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[clap(version, about = "Offboard mission controller for a MAVLink vehicle")]
pub struct MainArgs {
    /// Path to a TOML config file
    #[clap(long, short)]
    pub config: Option<PathBuf>,

    /// Override the mavlink address, e.g. `udpin:0.0.0.0:14550`
    #[clap(long, short)]
    pub address: Option<String>,

    /// Override the operator api bind address
    #[clap(long, short)]
    pub bind: Option<SocketAddr>,

    /// Directory for rolling log files
    #[clap(long, default_value = "logs")]
    pub log_dir: PathBuf,
}

impl MainArgs {
    pub fn apply(&self, config: &mut crate::config::ControllerConfig) {
        if let Some(address) = &self.address {
            config.link.address = address.clone();
        }
        if let Some(bind) = self.bind {
            config.server.bind = bind;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControllerConfig;

    #[test]
    fn overrides_replace_config_values() {
        let args = MainArgs::parse_from([
            "mission-controller",
            "--address",
            "tcpout:127.0.0.1:5760",
            "--bind",
            "127.0.0.1:9000",
        ]);
        let mut config = ControllerConfig::default();
        args.apply(&mut config);
        assert_eq!(config.link.address, "tcpout:127.0.0.1:5760");
        assert_eq!(config.server.bind, "127.0.0.1:9000".parse().unwrap());
        assert!(args.config.is_none());
    }

    #[test]
    fn no_overrides_keep_defaults() {
        let args = MainArgs::parse_from(["mission-controller"]);
        let mut config = ControllerConfig::default();
        args.apply(&mut config);
        assert_eq!(config.link.address, "udpin:0.0.0.0:14550");
    }
}
