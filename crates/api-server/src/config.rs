//! Environment configuration
//!
//! Every setting has a default; values that fail to parse fall back to
//! it with a warning rather than aborting startup.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use agent_runner::{AgentClientConfig, PollConfig};
use runner_core::correlation::CorrelationPolicy;
use tracing::warn;

const DEFAULT_AGENT_BASE_URL: &str = "http://localhost:3020";
const DEFAULT_DATA_DIR: &str = ".runner-data";
const DEFAULT_PORT: u16 = 8080;

/// Server settings
#[derive(Debug, Clone)]
pub struct Config {
    pub agent: AgentClientConfig,
    pub data_dir: PathBuf,
    pub poll: PollConfig,
    pub webhook_secret: Option<String>,
    pub correlation_policy: CorrelationPolicy,
    pub resume_polling: bool,
    pub listen_addr: SocketAddr,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any name -> value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let env = Env(&lookup);

        let poll_min = env.seconds("POLL_MIN_SECONDS", 3);
        let poll_max = env.seconds("POLL_MAX_SECONDS", 20);
        if poll_min > poll_max {
            warn!(
                "POLL_MIN_SECONDS ({:?}) exceeds POLL_MAX_SECONDS ({:?}), clamping",
                poll_min, poll_max
            );
        }

        let host = env.parsed("HOST", IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        let port = env.parsed("PORT", DEFAULT_PORT);

        Self {
            agent: AgentClientConfig {
                base_url: env
                    .string("AGENT_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_AGENT_BASE_URL.to_string()),
                token: env.string("AGENT_TOKEN"),
                create_timeout: env.seconds("AGENT_CREATE_TIMEOUT_SECONDS", 60),
                status_timeout: env.seconds("AGENT_STATUS_TIMEOUT_SECONDS", 30),
                health_timeout: env.seconds("AGENT_HEALTH_TIMEOUT_SECONDS", 10),
            },
            data_dir: env
                .string("RUNNER_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            poll: PollConfig::new(poll_min, poll_max),
            webhook_secret: env.string("GITHUB_WEBHOOK_SECRET"),
            correlation_policy: env.parsed("CORRELATION_POLICY", CorrelationPolicy::default()),
            resume_polling: env.flag("RESUME_POLLING", true),
            listen_addr: SocketAddr::new(host, port),
        }
    }
}

/// Level used for this workspace's crates when `RUST_LOG` is unset.
pub fn log_level() -> String {
    std::env::var("LOG_LEVEL")
        .ok()
        .map(|level| level.trim().to_ascii_lowercase())
        .filter(|level| matches!(level.as_str(), "trace" | "debug" | "info" | "warn" | "error"))
        .unwrap_or_else(|| "info".to_string())
}

/// Default `EnvFilter` directives for `level`.
pub fn default_filter(level: &str) -> String {
    format!(
        "api_server={level},agent_runner={level},runner_core={level},tower_http=info",
        level = level
    )
}

struct Env<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    /// Non-blank value, trimmed.
    fn string(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|raw| raw.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn parsed<T: FromStr>(&self, name: &str, default: T) -> T {
        match self.string(name) {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                warn!("Invalid value for {}: {:?}, using default", name, raw);
                default
            }),
            None => default,
        }
    }

    fn seconds(&self, name: &str, default: u64) -> Duration {
        Duration::from_secs(self.parsed(name, default))
    }

    fn flag(&self, name: &str, default: bool) -> bool {
        match self.string(name) {
            Some(raw) => match raw.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    warn!("Invalid value for {}: {:?}, using default", name, raw);
                    default
                }
            },
            None => default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let config = config(&[]);
        assert_eq!(config.agent.base_url, "http://localhost:3020");
        assert_eq!(config.agent.token, None);
        assert_eq!(config.agent.create_timeout, Duration::from_secs(60));
        assert_eq!(config.data_dir, PathBuf::from(".runner-data"));
        assert_eq!(config.poll.min_delay, Duration::from_secs(3));
        assert_eq!(config.poll.max_delay, Duration::from_secs(20));
        assert_eq!(config.correlation_policy, CorrelationPolicy::Lenient);
        assert!(config.resume_polling);
        assert!(config.webhook_secret.is_none());
        assert_eq!(config.listen_addr, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn reads_overrides() {
        let config = config(&[
            ("AGENT_BASE_URL", "http://agent:9000"),
            ("AGENT_TOKEN", "tok"),
            ("POLL_MIN_SECONDS", "1"),
            ("POLL_MAX_SECONDS", "8"),
            ("GITHUB_WEBHOOK_SECRET", "s3cret"),
            ("CORRELATION_POLICY", "STRICT"),
            ("RESUME_POLLING", "off"),
            ("HOST", "127.0.0.1"),
            ("PORT", "9090"),
        ]);
        assert_eq!(config.agent.base_url, "http://agent:9000");
        assert_eq!(config.agent.token.as_deref(), Some("tok"));
        assert_eq!(config.poll.min_delay, Duration::from_secs(1));
        assert_eq!(config.poll.max_delay, Duration::from_secs(8));
        assert_eq!(config.webhook_secret.as_deref(), Some("s3cret"));
        assert_eq!(config.correlation_policy, CorrelationPolicy::Strict);
        assert!(!config.resume_polling);
        assert_eq!(config.listen_addr, "127.0.0.1:9090".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn invalid_values_fall_back() {
        let config = config(&[
            ("POLL_MIN_SECONDS", "soon"),
            ("PORT", "-1"),
            ("CORRELATION_POLICY", "fuzzy"),
            ("RESUME_POLLING", "maybe"),
            ("AGENT_TOKEN", "   "),
        ]);
        assert_eq!(config.poll.min_delay, Duration::from_secs(3));
        assert_eq!(config.listen_addr.port(), 8080);
        assert_eq!(config.correlation_policy, CorrelationPolicy::Lenient);
        assert!(config.resume_polling);
        assert_eq!(config.agent.token, None);
    }

    #[test]
    fn poll_min_is_clamped_to_max() {
        let config = config(&[("POLL_MIN_SECONDS", "30"), ("POLL_MAX_SECONDS", "10")]);
        assert_eq!(config.poll.min_delay, Duration::from_secs(10));
    }

    #[test]
    fn default_filter_covers_workspace_crates() {
        assert_eq!(
            default_filter("debug"),
            "api_server=debug,agent_runner=debug,runner_core=debug,tower_http=info"
        );
    }
}
