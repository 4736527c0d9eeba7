//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.relay/config.json`) and environment.
//! Environment variables win over the file so deployments can keep secrets out of it.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Remote dialog engine settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Connector identity used for outbound activities.
    #[serde(default)]
    pub connector: ConnectorConfig,

    /// Retention of conversation references for proactive messages.
    #[serde(default)]
    pub references: ReferencesConfig,

    /// Fixed texts sent by the gateway itself.
    #[serde(default)]
    pub messages: MessagesConfig,
}

/// Gateway bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP (default 3978). Overridden by PORT / port env.
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "0.0.0.0"; the connector has to reach us).
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

fn default_gateway_port() -> u16 {
    3978
}

fn default_gateway_bind() -> String {
    "0.0.0.0".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
        }
    }
}

/// Remote engine endpoint and request policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Engine URL. Overridden by TENEO_ENGINE_URL env.
    pub url: Option<String>,
    /// External sheet id passed through to the engine unmodified.
    /// Overridden by GOOGLE_SHEET_ID env.
    pub sheet_id: Option<String>,
    /// Per-request timeout in seconds.
    #[serde(default = "default_engine_timeout_secs")]
    pub timeout_secs: u64,
    /// Extra attempts after a transport failure. 0 = single attempt.
    #[serde(default)]
    pub max_retries: u32,
    /// Delay between attempts in milliseconds.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_engine_timeout_secs() -> u64 {
    30
}

fn default_retry_backoff_ms() -> u64 {
    500
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            url: None,
            sheet_id: None,
            timeout_secs: default_engine_timeout_secs(),
            max_retries: 0,
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

/// Connector app identity. When app id and password are both absent, outbound calls are
/// unauthenticated (emulator).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorConfig {
    /// Overridden by MICROSOFT_APP_ID env.
    pub app_id: Option<String>,
    /// Overridden by MICROSOFT_APP_PASSWORD env.
    pub app_password: Option<String>,
    /// OAuth token endpoint for the client-credentials grant.
    /// Defaults to the Bot Framework login endpoint.
    pub token_endpoint: Option<String>,
}

/// Bounds on the conversation reference store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferencesConfig {
    #[serde(default = "default_max_references")]
    pub max_entries: usize,
    /// Entries not refreshed for this long are pruned.
    #[serde(default = "default_reference_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_prune_interval_secs")]
    pub prune_interval_secs: u64,
}

fn default_max_references() -> usize {
    10_000
}

fn default_reference_ttl_secs() -> u64 {
    30 * 24 * 60 * 60
}

fn default_prune_interval_secs() -> u64 {
    3600
}

impl Default for ReferencesConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_references(),
            ttl_secs: default_reference_ttl_secs(),
            prune_interval_secs: default_prune_interval_secs(),
        }
    }
}

/// Static texts: greeting on members added and the proactive notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesConfig {
    #[serde(default = "default_greeting")]
    pub greeting: String,
    #[serde(default = "default_notification")]
    pub notification: String,
}

pub const DEFAULT_GREETING: &str = "Proactive Greeting. Hi! In future I will expose a url '/api/notify?msg=This is a notification' that will proactively message everyone who has previously messaged this bot.";

pub const DEFAULT_NOTIFICATION: &str = "This is a proactive message... If you eat something & nobody see you eat it, it has no calories.";

fn default_greeting() -> String {
    DEFAULT_GREETING.to_string()
}

fn default_notification() -> String {
    DEFAULT_NOTIFICATION.to_string()
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            greeting: default_greeting(),
            notification: default_notification(),
        }
    }
}

/// Read a non-empty, trimmed env var.
fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_ref()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Resolve the engine URL: env TENEO_ENGINE_URL overrides config.
pub fn resolve_engine_url(config: &Config) -> Option<String> {
    env_nonempty("TENEO_ENGINE_URL").or_else(|| trimmed(&config.engine.url))
}

/// Resolve the sheet id: env GOOGLE_SHEET_ID overrides config.
pub fn resolve_sheet_id(config: &Config) -> Option<String> {
    env_nonempty("GOOGLE_SHEET_ID").or_else(|| trimmed(&config.engine.sheet_id))
}

/// Resolve the connector app id: env MICROSOFT_APP_ID overrides config.
pub fn resolve_app_id(config: &Config) -> Option<String> {
    env_nonempty("MICROSOFT_APP_ID").or_else(|| trimmed(&config.connector.app_id))
}

/// Resolve the connector app password: env MICROSOFT_APP_PASSWORD overrides config.
pub fn resolve_app_password(config: &Config) -> Option<String> {
    env_nonempty("MICROSOFT_APP_PASSWORD").or_else(|| trimmed(&config.connector.app_password))
}

/// Resolve the listen port: env `port` or `PORT` overrides config; unparsable values are ignored.
pub fn resolve_port(config: &Config) -> u16 {
    env_nonempty("port")
        .or_else(|| env_nonempty("PORT"))
        .and_then(|p| match p.parse::<u16>() {
            Ok(port) => Some(port),
            Err(_) => {
                log::warn!("ignoring invalid port from environment: {}", p);
                None
            }
        })
        .unwrap_or(config.gateway.port)
}

/// Apply all environment overrides in place. Called once at startup so the rest of the
/// gateway reads plain config fields.
pub fn apply_env_overrides(config: &mut Config) {
    config.engine.url = resolve_engine_url(config);
    config.engine.sheet_id = resolve_sheet_id(config);
    config.connector.app_id = resolve_app_id(config);
    config.connector.app_password = resolve_app_password(config);
    config.gateway.port = resolve_port(config);
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("RELAY_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".relay").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the given path (or RELAY_CONFIG_PATH / default).
/// Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_gateway_port_and_bind() {
        let g = GatewayConfig::default();
        assert_eq!(g.port, 3978);
        assert_eq!(g.bind, "0.0.0.0");
    }

    #[test]
    fn empty_json_yields_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.gateway.port, 3978);
        assert_eq!(config.engine.timeout_secs, 30);
        assert_eq!(config.engine.max_retries, 0);
        assert_eq!(config.references.max_entries, 10_000);
        assert_eq!(config.messages.greeting, DEFAULT_GREETING);
    }

    #[test]
    fn camel_case_keys_parse() {
        let config: Config = serde_json::from_str(
            r#"{
                "engine": { "url": "https://engine.example/app/", "sheetId": "s1", "maxRetries": 2 },
                "connector": { "appId": "app", "appPassword": "pw" },
                "references": { "maxEntries": 5 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.engine.url.as_deref(), Some("https://engine.example/app/"));
        assert_eq!(config.engine.sheet_id.as_deref(), Some("s1"));
        assert_eq!(config.engine.max_retries, 2);
        assert_eq!(config.connector.app_id.as_deref(), Some("app"));
        assert_eq!(config.references.max_entries, 5);
        assert_eq!(config.references.ttl_secs, 30 * 24 * 60 * 60);
    }

    #[test]
    fn blank_config_values_are_ignored() {
        let mut config = Config::default();
        config.connector.app_id = Some("   ".to_string());
        assert_eq!(trimmed(&config.connector.app_id), None);
    }

    #[test]
    fn missing_file_loads_defaults() {
        let path =
            std::env::temp_dir().join(format!("relay-missing-{}.json", uuid::Uuid::new_v4()));
        let (config, used) = load_config(Some(path.clone())).unwrap();
        assert_eq!(used, path);
        assert_eq!(config.gateway.port, 3978);
    }

    const OVERRIDE_VARS: [&str; 6] = [
        "TENEO_ENGINE_URL",
        "GOOGLE_SHEET_ID",
        "MICROSOFT_APP_ID",
        "MICROSOFT_APP_PASSWORD",
        "port",
        "PORT",
    ];

    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    /// Holds the env lock, clears the override variables, and restores them on drop.
    struct EnvGuard {
        saved: Vec<(&'static str, Option<String>)>,
        _lock: std::sync::MutexGuard<'static, ()>,
    }

    impl EnvGuard {
        fn clean() -> Self {
            let lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
            let saved = OVERRIDE_VARS
                .iter()
                .map(|k| (*k, std::env::var(k).ok()))
                .collect();
            for k in OVERRIDE_VARS {
                std::env::remove_var(k);
            }
            Self { saved, _lock: lock }
        }

        fn set(&self, key: &str, value: &str) {
            std::env::set_var(key, value);
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (k, v) in &self.saved {
                match v {
                    Some(v) => std::env::set_var(k, v),
                    None => std::env::remove_var(k),
                }
            }
        }
    }

    fn configured() -> Config {
        let mut config = Config::default();
        config.engine.url = Some("https://file.example/engine/".into());
        config.engine.sheet_id = Some("file-sheet".into());
        config.connector.app_id = Some("file-app".into());
        config.connector.app_password = Some("file-pw".into());
        config.gateway.port = 4100;
        config
    }

    #[test]
    fn env_overrides_win_over_file() {
        let env = EnvGuard::clean();
        env.set("TENEO_ENGINE_URL", " https://env.example/engine/ ");
        env.set("GOOGLE_SHEET_ID", "env-sheet");
        env.set("MICROSOFT_APP_ID", "env-app");
        env.set("MICROSOFT_APP_PASSWORD", "env-pw");
        env.set("PORT", "5000");

        let mut config = configured();
        apply_env_overrides(&mut config);
        assert_eq!(config.engine.url.as_deref(), Some("https://env.example/engine/"));
        assert_eq!(config.engine.sheet_id.as_deref(), Some("env-sheet"));
        assert_eq!(config.connector.app_id.as_deref(), Some("env-app"));
        assert_eq!(config.connector.app_password.as_deref(), Some("env-pw"));
        assert_eq!(config.gateway.port, 5000);
    }

    #[test]
    fn without_env_file_values_are_kept_trimmed() {
        let _env = EnvGuard::clean();
        let mut config = configured();
        config.engine.sheet_id = Some("  ".into());
        apply_env_overrides(&mut config);
        assert_eq!(config.engine.url.as_deref(), Some("https://file.example/engine/"));
        assert_eq!(config.engine.sheet_id, None);
        assert_eq!(config.connector.app_id.as_deref(), Some("file-app"));
        assert_eq!(config.gateway.port, 4100);
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let env = EnvGuard::clean();
        env.set("TENEO_ENGINE_URL", "   ");
        env.set("MICROSOFT_APP_ID", "");
        env.set("PORT", " ");
        let mut config = configured();
        apply_env_overrides(&mut config);
        assert_eq!(config.engine.url.as_deref(), Some("https://file.example/engine/"));
        assert_eq!(config.connector.app_id.as_deref(), Some("file-app"));
        assert_eq!(config.gateway.port, 4100);
    }

    #[test]
    fn lowercase_port_wins_over_uppercase() {
        let env = EnvGuard::clean();
        env.set("port", "6001");
        env.set("PORT", "6002");
        assert_eq!(resolve_port(&configured()), 6001);
    }

    #[test]
    fn invalid_port_is_ignored() {
        let env = EnvGuard::clean();
        env.set("PORT", "not-a-port");
        assert_eq!(resolve_port(&configured()), 4100);
        env.set("PORT", "70000");
        assert_eq!(resolve_port(&configured()), 4100);
    }
}
