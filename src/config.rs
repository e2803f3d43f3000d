//! Binary configuration from the environment

use std::path::PathBuf;

/// Path of the resource store file
pub const STATE_ENV: &str = "SVCCTL_STATE";
/// Base URL the `curl` command sends requests to
pub const INGRESS_ENV: &str = "SVCCTL_INGRESS_URL";

pub const DEFAULT_INGRESS_URL: &str = "http://127.0.0.1:80";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliConfig {
    pub state_path: PathBuf,
    pub ingress_url: String,
}

impl CliConfig {
    pub fn new(state_path: impl Into<PathBuf>, ingress_url: impl Into<String>) -> Self {
        Self { state_path: state_path.into(), ingress_url: ingress_url.into() }
    }

    /// Read `SVCCTL_STATE` and `SVCCTL_INGRESS_URL`, falling back to
    /// `~/.svcctl/state.json` and a local ingress.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let state_path = lookup(STATE_ENV)
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_state_path);
        let ingress_url = lookup(INGRESS_ENV)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_INGRESS_URL.to_string());
        Self { state_path, ingress_url: ingress_url.trim_end_matches('/').to_string() }
    }
}

fn default_state_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".svcctl")
        .join("state.json")
}
