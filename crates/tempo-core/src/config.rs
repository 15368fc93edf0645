use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_ALLOWED_ORIGIN: &str = "http://localhost:3000";
pub const DEFAULT_MAX_CONCURRENCY: usize = 3;
pub const DEFAULT_MAX_IDLE_SECS: u64 = 1;
pub const DEFAULT_API_CALL_URL: &str = "https://httpbin.org/uuid";
pub const DEFAULT_API_CALL_TIMEOUT_SECS: u64 = 30;

/// Top-level config (tempo.toml + TEMPO_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TempoConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub tasks: TasksConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Origins allowed by the CORS layer.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Upper bound on executions running at the same time, across all jobs.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Longest the timer loop sleeps before re-checking the fire queue.
    #[serde(default = "default_max_idle_secs")]
    pub max_idle_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            max_idle_secs: default_max_idle_secs(),
        }
    }
}

/// Settings for the built-in task bodies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TasksConfig {
    /// Endpoint hit by the `api_call` job type.
    #[serde(default = "default_api_call_url")]
    pub api_call_url: String,
    #[serde(default = "default_api_call_timeout_secs")]
    pub api_call_timeout_secs: u64,
    /// When true the bodies sleep for their nominal work duration.
    #[serde(default = "bool_true")]
    pub simulate_work: bool,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            api_call_url: default_api_call_url(),
            api_call_timeout_secs: default_api_call_timeout_secs(),
            simulate_work: true,
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_allowed_origins() -> Vec<String> {
    vec![DEFAULT_ALLOWED_ORIGIN.to_string()]
}
fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}
fn default_max_idle_secs() -> u64 {
    DEFAULT_MAX_IDLE_SECS
}
fn default_api_call_url() -> String {
    DEFAULT_API_CALL_URL.to_string()
}
fn default_api_call_timeout_secs() -> u64 {
    DEFAULT_API_CALL_TIMEOUT_SECS
}
fn default_db_path() -> String {
    format!("{}/.tempo/tempo.db", home_dir())
}

fn home_dir() -> String {
    std::env::var("HOME").unwrap_or_else(|_| ".".to_string())
}

impl TempoConfig {
    /// Load config from a TOML file with TEMPO_* env var overrides.
    ///
    /// The file is chosen in order:
    ///   1. Explicit path argument
    ///   2. `$TEMPO_CONFIG`
    ///   3. ~/.tempo/tempo.toml
    ///
    /// Nested keys use a double underscore in env vars, e.g.
    /// `TEMPO_SCHEDULER__MAX_CONCURRENCY=8`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .or_else(|| std::env::var("TEMPO_CONFIG").ok())
            .unwrap_or_else(default_config_path);

        tracing::debug!(%path, "loading configuration");

        Figment::from(Serialized::defaults(TempoConfig::default()))
            .merge(Toml::file(&path))
            .merge(Env::prefixed("TEMPO_").ignore(&["CONFIG"]).split("__"))
            .extract()
            .map_err(|e| crate::error::TempoError::Config(e.to_string()))
    }

    /// `bind:port` for the HTTP listener.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.bind, self.server.port)
    }
}

fn default_config_path() -> String {
    format!("{}/.tempo/tempo.toml", home_dir())
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_without_file() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            let cfg = TempoConfig::load(Some("does-not-exist.toml")).unwrap();
            assert_eq!(cfg.server.port, DEFAULT_PORT);
            assert_eq!(cfg.server.allowed_origins, vec![DEFAULT_ALLOWED_ORIGIN]);
            assert_eq!(cfg.scheduler.max_concurrency, 3);
            assert_eq!(cfg.scheduler.max_idle_secs, 1);
            assert!(cfg.tasks.simulate_work);
            assert!(cfg.database.path.ends_with(".tempo/tempo.db"));
            Ok(())
        });
    }

    #[test]
    fn file_then_env_overrides() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file(
                "tempo.toml",
                r#"
                [server]
                port = 9100

                [scheduler]
                max_concurrency = 5

                [tasks]
                simulate_work = false
                "#,
            )?;
            jail.set_env("TEMPO_SCHEDULER__MAX_CONCURRENCY", "8");
            jail.set_env("TEMPO_DATABASE__PATH", "/tmp/t.db");

            let cfg = TempoConfig::load(Some("tempo.toml")).unwrap();
            assert_eq!(cfg.server.port, 9100);
            assert_eq!(cfg.server.bind, DEFAULT_BIND);
            assert_eq!(cfg.scheduler.max_concurrency, 8);
            assert_eq!(cfg.database.path, "/tmp/t.db");
            assert!(!cfg.tasks.simulate_work);
            assert_eq!(cfg.listen_addr(), "127.0.0.1:9100");
            Ok(())
        });
    }

    #[test]
    fn config_path_from_env() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file("alt.toml", "[server]\nport = 7000\n")?;
            jail.set_env("TEMPO_CONFIG", "alt.toml");
            let cfg = TempoConfig::load(None).unwrap();
            assert_eq!(cfg.server.port, 7000);
            Ok(())
        });
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file("bad.toml", "[server]\nport = \"not a port\"\n")?;
            assert!(TempoConfig::load(Some("bad.toml")).is_err());
            Ok(())
        });
    }
}
