pub use clap::Parser;

use std::{path::PathBuf, time::Duration};

use crate::agentx::{AddressError, MasterAddress};

/// Largest accepted receive timeout, in milliseconds.
pub const MAX_RECV_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Invalid AgentX address: {0}")]
    Address(#[from] AddressError),
    #[error("Update period must be at least one second")]
    PeriodTooShort,
    #[error("Receive timeout must be within 1..=5000 ms, got {0}")]
    RecvTimeout(u64),
}

#[derive(Parser, Debug, Clone)]
#[command(
    version,
    about = "AgentX sub-agent exporting dataplane interfaces as IF-MIB",
    long_about = None
)]
pub struct Configuration {
    /// Master agent socket: an absolute Unix socket path or host:port
    #[arg(short = 'a', long, default_value = "/var/agentx/master")]
    pub agentx_addr: String,
    /// Seconds between dataplane polls
    #[arg(short, long, default_value_t = 30)]
    pub period: u64,
    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,
    /// Dump every AgentX PDU sent and received (needs --debug)
    #[arg(long)]
    pub debug_agent: bool,
    /// YAML file with interface descriptions
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Directory listing the dataplane interfaces
    #[arg(long, default_value = "/sys/class/net")]
    pub sysfs_root: PathBuf,
    /// How long one receive waits for a request, in milliseconds
    #[arg(long, default_value_t = 100)]
    pub recv_timeout_ms: u64,
}

impl Configuration {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.master_address()?;
        if self.period == 0 {
            return Err(ConfigurationError::PeriodTooShort);
        }
        if !(1..=MAX_RECV_TIMEOUT_MS).contains(&self.recv_timeout_ms) {
            return Err(ConfigurationError::RecvTimeout(self.recv_timeout_ms));
        }
        Ok(())
    }

    pub fn master_address(&self) -> Result<MasterAddress, AddressError> {
        self.agentx_addr.parse()
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period)
    }

    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Configuration {
        let argv = std::iter::once("dataplane-snmp-agent").chain(args.iter().copied());
        Configuration::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let conf = parse(&[]);
        assert_eq!(conf.agentx_addr, "/var/agentx/master");
        assert_eq!(conf.period(), Duration::from_secs(30));
        assert_eq!(conf.recv_timeout(), Duration::from_millis(100));
        assert!(!conf.debug);
        assert!(!conf.debug_agent);
        assert!(conf.config.is_none());
        assert!(conf.validate().is_ok());
    }

    #[test]
    fn test_flags() {
        let conf = parse(&[
            "-a",
            "localhost:705",
            "-p",
            "5",
            "-d",
            "--debug-agent",
            "-c",
            "/etc/ifmib.yaml",
        ]);
        assert_eq!(
            conf.master_address().unwrap(),
            MasterAddress::Tcp {
                host: "localhost".to_string(),
                port: 705
            }
        );
        assert_eq!(conf.period, 5);
        assert!(conf.debug);
        assert!(conf.debug_agent);
        assert_eq!(conf.config, Some(PathBuf::from("/etc/ifmib.yaml")));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut conf = parse(&[]);
        conf.period = 0;
        assert!(matches!(conf.validate(), Err(ConfigurationError::PeriodTooShort)));

        let mut conf = parse(&[]);
        conf.recv_timeout_ms = 0;
        assert!(matches!(conf.validate(), Err(ConfigurationError::RecvTimeout(0))));
        conf.recv_timeout_ms = 10_000;
        assert!(matches!(conf.validate(), Err(ConfigurationError::RecvTimeout(10_000))));

        let mut conf = parse(&[]);
        conf.agentx_addr = "master".to_string();
        assert!(matches!(conf.validate(), Err(ConfigurationError::Address(_))));
    }
}
