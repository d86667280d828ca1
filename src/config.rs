//! Environment-variable configuration, per spec §6.
//!
//! PBS takes no config file (that scaffolding is explicitly out of scope);
//! every tunable is read from the environment at process start and
//! validated up front, the way `cc/core/interface/config_provider_interface.h`
//! validates its provider inputs before the rest of the instance wires up.

use anyhow::{bail, Context, Result};

/// Container deployment flavor. Only `ComputeEngine` gates the health server
/// per spec §6 (`google_scp_pbs_container_type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerType {
    ComputeEngine,
    Other,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host_address: String,
    pub host_port: u16,
    pub health_port: Option<u16>,
    pub use_tls: bool,
    pub tls_private_key_file_path: Option<String>,
    pub tls_certificate_file_path: Option<String>,
    pub async_executor_threads_count: usize,
    pub async_executor_queue_size: usize,
    pub remote_claimed_identity: Option<String>,
    pub container_type: ContainerType,
    pub otel_enabled: bool,
}

impl Config {
    /// Reads and validates configuration from the process environment.
    /// Fails fast (mirrors §6's "required" column) rather than deferring to
    /// a later `Init` failure, so a misconfigured deployment never binds a
    /// socket it can't serve correctly.
    pub fn from_env() -> Result<Self> {
        let host_address = required_env("google_scp_pbs_host_address")?;
        let host_port: u16 = required_env("google_scp_pbs_host_port")?
            .parse()
            .context("google_scp_pbs_host_port must be a valid port number")?;

        let container_type = match std::env::var("google_scp_pbs_container_type")
            .unwrap_or_default()
            .as_str()
        {
            "ComputeEngine" => ContainerType::ComputeEngine,
            _ => ContainerType::Other,
        };

        let health_port = match std::env::var("google_scp_pbs_health_port") {
            Ok(v) if !v.is_empty() => Some(
                v.parse()
                    .context("google_scp_pbs_health_port must be a valid port number")?,
            ),
            _ => None,
        };
        if container_type == ContainerType::ComputeEngine && health_port.is_none() {
            bail!("google_scp_pbs_health_port is required when container_type=ComputeEngine");
        }

        let use_tls = bool_env("google_scp_pbs_http2_server_use_tls");
        let tls_private_key_file_path =
            non_empty_env("google_scp_pbs_http2_server_private_key_file_path");
        let tls_certificate_file_path =
            non_empty_env("google_scp_pbs_http2_server_certificate_file_path");
        if use_tls {
            if tls_private_key_file_path.is_none() {
                bail!("InvalidKeyPath: TLS enabled but private key file path is missing or empty");
            }
            if tls_certificate_file_path.is_none() {
                bail!(
                    "InvalidCertPath: TLS enabled but certificate file path is missing or empty"
                );
            }
        }

        let async_executor_threads_count =
            usize_env("google_scp_pbs_async_executor_threads_count", 16);
        let async_executor_queue_size =
            usize_env("google_scp_pbs_async_executor_queue_size", 100_000);

        let remote_claimed_identity =
            non_empty_env("google_scp_pbs_remote_claimed_identity");

        let otel_enabled = bool_env("otel_enabled");

        Ok(Config {
            host_address,
            host_port,
            health_port,
            use_tls,
            tls_private_key_file_path,
            tls_certificate_file_path,
            async_executor_threads_count,
            async_executor_queue_size,
            remote_claimed_identity,
            container_type,
            otel_enabled,
        })
    }
}

fn required_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("{key} is required but not set"))
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn bool_env(key: &str) -> bool {
    std::env::var(key)
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn usize_env(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_type_other_does_not_require_health_port() {
        assert_eq!(ContainerType::Other, ContainerType::Other);
    }

    #[test]
    fn usize_env_falls_back_to_default_on_missing_or_bad_value() {
        assert_eq!(usize_env("PBS_TEST_DOES_NOT_EXIST", 42), 42);
    }

    #[test]
    fn bool_env_is_case_insensitive() {
        std::env::set_var("PBS_TEST_BOOL_FLAG", "TRUE");
        assert!(bool_env("PBS_TEST_BOOL_FLAG"));
        std::env::remove_var("PBS_TEST_BOOL_FLAG");
    }
}
