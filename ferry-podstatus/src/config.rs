//! Status service configuration
//!
//! Flags fall back to environment variables so the control pod can
//! configure the service without arguments.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// How often the stages semaphore is checked
pub const SEMAPHORE_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Parser)]
#[command(name = "ferry-podstatus")]
#[command(about = "Reports the aggregated container state of ferry stage pods", long_about = None)]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "FERRY_PODSTATUS_ADDR", default_value = "0.0.0.0:8080")]
    pub addr: SocketAddr,

    /// Namespace passed to kubectl
    #[arg(long, env = "KUBECTL_NAMESPACE")]
    pub namespace: Option<String>,

    /// Shut down once this file disappears
    #[arg(long, env = "STAGES_RUNNING_SEMAPHORE")]
    pub semaphore_file: Option<PathBuf>,

    /// kubectl binary used to look up pods
    #[arg(long, env = "KUBECTL", default_value = "kubectl")]
    pub kubectl: String,

    /// Log every request
    #[arg(long)]
    pub debug: bool,
}

impl Config {
    /// Default log filter when `RUST_LOG` is unset
    pub fn log_filter(&self) -> &'static str {
        if self.debug {
            "ferry_podstatus=debug,tower_http=debug"
        } else {
            "ferry_podstatus=info"
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.kubectl.trim().is_empty() {
            anyhow::bail!("kubectl cannot be empty");
        }

        if self.namespace.as_deref().is_some_and(|ns| ns.trim().is_empty()) {
            anyhow::bail!("namespace cannot be blank");
        }

        if self
            .semaphore_file
            .as_ref()
            .is_some_and(|path| path.as_os_str().is_empty())
        {
            anyhow::bail!("semaphore_file cannot be empty");
        }

        Ok(())
    }
}
