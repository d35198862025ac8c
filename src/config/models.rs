//! Configuration data structures for portico.
//!
//! These types map to the INI file `gateway.ini`:
//!
//! ```ini
//! [common]
//! RuntimePath=/var/run/portico
//!
//! [gateway]
//! Port=80
//! WWWPath=/var/lib/portico/www
//! ```
//!
//! Every field has a default so a missing file or section still yields a
//! usable configuration. Key lookups accept the lowercase spelling as well.
use std::{net::IpAddr, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    adapters::listener_supervisor::SupervisorSettings,
    config::validation::{ValidationError, ValidationResult},
    core::state::GatewaySettings,
};

pub const DEFAULT_RUNTIME_PATH: &str = "/var/run/portico";
pub const DEFAULT_WWW_PATH: &str = "/var/lib/portico/www";
pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    #[serde(alias = "Common")]
    pub common: CommonSection,
    #[serde(alias = "Gateway")]
    pub gateway: GatewaySection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommonSection {
    #[serde(rename = "RuntimePath", alias = "runtimepath")]
    pub runtime_path: String,
}

impl Default for CommonSection {
    fn default() -> Self {
        Self {
            runtime_path: DEFAULT_RUNTIME_PATH.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySection {
    /// Empty means "pick one at startup".
    #[serde(rename = "Port", alias = "port")]
    pub port: String,

    #[serde(rename = "WWWPath", alias = "wwwpath")]
    pub www_path: String,

    /// Shared secret accepted from non-local management callers.
    #[serde(rename = "AuthToken", alias = "authtoken")]
    pub auth_token: String,

    #[serde(rename = "BindHost", alias = "bindhost")]
    pub bind_host: String,

    #[serde(rename = "ProbeAttempts", alias = "probeattempts")]
    pub probe_attempts: u32,

    #[serde(rename = "ProbeIntervalMillis", alias = "probeintervalmillis")]
    pub probe_interval_millis: u64,

    #[serde(rename = "ProbeTimeoutMillis", alias = "probetimeoutmillis")]
    pub probe_timeout_millis: u64,

    #[serde(rename = "GraceDelayMillis", alias = "gracedelaymillis")]
    pub grace_delay_millis: u64,

    #[serde(rename = "ShutdownTimeoutSecs", alias = "shutdowntimeoutsecs")]
    pub shutdown_timeout_secs: u64,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            port: String::new(),
            www_path: DEFAULT_WWW_PATH.to_string(),
            auth_token: String::new(),
            bind_host: DEFAULT_BIND_HOST.to_string(),
            probe_attempts: 10,
            probe_interval_millis: 1000,
            probe_timeout_millis: 1000,
            grace_delay_millis: 1000,
            shutdown_timeout_secs: 10,
        }
    }
}

impl GatewayConfig {
    /// Initial values for the gateway state.
    pub fn gateway_settings(&self) -> GatewaySettings {
        GatewaySettings {
            gateway_port: self.gateway.port.trim().to_string(),
            runtime_path: PathBuf::from(&self.common.runtime_path),
            www_path: PathBuf::from(&self.gateway.www_path),
        }
    }

    pub fn supervisor_settings(&self) -> ValidationResult<SupervisorSettings> {
        let bind_host: IpAddr =
            self.gateway
                .bind_host
                .parse()
                .map_err(|_| ValidationError::InvalidField {
                    field: "gateway.BindHost".to_string(),
                    message: format!("'{}' is not an IP address", self.gateway.bind_host),
                })?;

        Ok(SupervisorSettings {
            bind_host,
            probe_attempts: self.gateway.probe_attempts,
            probe_interval: Duration::from_millis(self.gateway.probe_interval_millis),
            probe_timeout: Duration::from_millis(self.gateway.probe_timeout_millis),
            grace_delay: Duration::from_millis(self.gateway.grace_delay_millis),
            shutdown_timeout: self.shutdown_timeout(),
        })
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway.shutdown_timeout_secs)
    }

    pub fn auth_token(&self) -> Option<String> {
        Some(self.gateway.auth_token.trim().to_string()).filter(|t| !t.is_empty())
    }

    /// Render as INI text in the layout the loader reads back.
    pub fn to_ini(&self) -> String {
        let g = &self.gateway;
        format!(
            "[common]\n\
             RuntimePath={}\n\
             \n\
             [gateway]\n\
             Port={}\n\
             WWWPath={}\n\
             AuthToken={}\n\
             BindHost={}\n\
             ProbeAttempts={}\n\
             ProbeIntervalMillis={}\n\
             ProbeTimeoutMillis={}\n\
             GraceDelayMillis={}\n\
             ShutdownTimeoutSecs={}\n",
            self.common.runtime_path,
            g.port,
            g.www_path,
            g.auth_token,
            g.bind_host,
            g.probe_attempts,
            g.probe_interval_millis,
            g.probe_timeout_millis,
            g.grace_delay_millis,
            g.shutdown_timeout_secs,
        )
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        let settings = config.gateway_settings();
        assert_eq!(settings.gateway_port, "");
        assert_eq!(settings.runtime_path, PathBuf::from(DEFAULT_RUNTIME_PATH));
        assert_eq!(settings.www_path, PathBuf::from(DEFAULT_WWW_PATH));
        assert!(config.auth_token().is_none());

        let supervisor = config.supervisor_settings().unwrap();
        assert_eq!(supervisor, SupervisorSettings::default());
        assert_eq!(supervisor.bind_host, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    }

    #[test]
    fn test_invalid_bind_host() {
        let mut config = GatewayConfig::default();
        config.gateway.bind_host = "localhost:80".to_string();
        assert!(matches!(
            config.supervisor_settings(),
            Err(ValidationError::InvalidField { .. })
        ));
    }

    #[test]
    fn test_to_ini_layout() {
        let mut config = GatewayConfig::default();
        config.gateway.port = "8080".to_string();
        let ini = config.to_ini();
        assert!(ini.starts_with("[common]\nRuntimePath=/var/run/portico\n"));
        assert!(ini.contains("\n[gateway]\nPort=8080\n"));
    }
}
