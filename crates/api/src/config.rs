use std::time::Duration;

use scriptd_core::script_types::ScriptLanguage;
use scriptd_core::scripting::engine::EngineConfig;

/// A configuration value that could not be used.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} has invalid value '{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, value: &str, reason: impl ToString) -> Self {
        Self::Invalid {
            key,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Graceful shutdown timeout in seconds (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// PostgreSQL URL. Scripts are kept in memory only when unset.
    pub database_url: Option<String>,
    pub scripting: ScriptingConfig,
}

/// Script registry and engine settings.
#[derive(Debug, Clone)]
pub struct ScriptingConfig {
    /// `active` for scripts created without one.
    pub default_active: bool,
    pub default_timeout_ms: u64,
    /// Upper bound applied to caller-supplied run timeouts.
    pub max_timeout_ms: u64,
    pub compile_timeout_ms: u64,
    /// Languages with a registered engine.
    pub languages: Vec<ScriptLanguage>,
    pub engines: EngineConfig,
}

impl ScriptingConfig {
    /// Run timeout for a request: the caller's value clamped to the
    /// configured maximum, or the default when absent.
    pub fn run_timeout(&self, requested_ms: Option<u64>) -> Duration {
        let ms = requested_ms
            .unwrap_or(self.default_timeout_ms)
            .clamp(1, self.max_timeout_ms);
        Duration::from_millis(ms)
    }

    pub fn compile_timeout(&self) -> Duration {
        Duration::from_millis(self.compile_timeout_ms)
    }
}

impl Default for ScriptingConfig {
    fn default() -> Self {
        Self {
            default_active: true,
            default_timeout_ms: 5_000,
            max_timeout_ms: 25_000,
            compile_timeout_ms: 10_000,
            languages: ScriptLanguage::ALL.to_vec(),
            engines: EngineConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default                         |
    /// |-----------------------------|---------------------------------|
    /// | `HOST`                      | `0.0.0.0`                       |
    /// | `PORT`                      | `3000`                          |
    /// | `CORS_ORIGINS`              | `http://localhost:5173`         |
    /// | `REQUEST_TIMEOUT_SECS`      | `30`                            |
    /// | `SHUTDOWN_TIMEOUT_SECS`     | `30`                            |
    /// | `DATABASE_URL`              | unset (in-memory store)         |
    /// | `SCRIPTS_DEFAULT_ACTIVE`    | `true`                          |
    /// | `SCRIPT_DEFAULT_TIMEOUT_MS` | `5000`                          |
    /// | `SCRIPT_MAX_TIMEOUT_MS`     | `25000`                         |
    /// | `SCRIPT_COMPILE_TIMEOUT_MS` | `10000`                         |
    /// | `SCRIPT_LANGUAGES`          | `lua,shell,python,javascript`   |
    /// | `BASH_BIN`                  | `bash`                          |
    /// | `PYTHON_BIN`                | `python3`                       |
    /// | `NODE_BIN`                  | `node`                          |
    ///
    /// `SCRIPT_MAX_TIMEOUT_MS` must stay below `REQUEST_TIMEOUT_SECS` so a
    /// slow run ends as an evaluation timeout, not an HTTP one.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env), reading values through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let host = var("HOST", "0.0.0.0");
        let port = parse("PORT", &var("PORT", "3000"))?;

        let cors_origins: Vec<String> = var("CORS_ORIGINS", "http://localhost:5173")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        for origin in &cors_origins {
            axum::http::HeaderValue::from_str(origin)
                .map_err(|e| ConfigError::invalid("CORS_ORIGINS", origin, e))?;
        }

        let request_timeout_secs: u64 = parse("REQUEST_TIMEOUT_SECS", &var("REQUEST_TIMEOUT_SECS", "30"))?;
        let shutdown_timeout_secs =
            parse("SHUTDOWN_TIMEOUT_SECS", &var("SHUTDOWN_TIMEOUT_SECS", "30"))?;
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        let defaults = ScriptingConfig::default();
        let scripting = ScriptingConfig {
            default_active: parse("SCRIPTS_DEFAULT_ACTIVE", &var("SCRIPTS_DEFAULT_ACTIVE", "true"))?,
            default_timeout_ms: parse(
                "SCRIPT_DEFAULT_TIMEOUT_MS",
                &var("SCRIPT_DEFAULT_TIMEOUT_MS", "5000"),
            )?,
            max_timeout_ms: parse("SCRIPT_MAX_TIMEOUT_MS", &var("SCRIPT_MAX_TIMEOUT_MS", "25000"))?,
            compile_timeout_ms: parse(
                "SCRIPT_COMPILE_TIMEOUT_MS",
                &var("SCRIPT_COMPILE_TIMEOUT_MS", "10000"),
            )?,
            languages: match lookup("SCRIPT_LANGUAGES") {
                Some(raw) => parse_languages(&raw)?,
                None => defaults.languages,
            },
            engines: EngineConfig {
                bash_bin: var("BASH_BIN", &defaults.engines.bash_bin),
                python_bin: var("PYTHON_BIN", &defaults.engines.python_bin),
                node_bin: var("NODE_BIN", &defaults.engines.node_bin),
            },
        };

        if scripting.max_timeout_ms == 0 {
            return Err(ConfigError::invalid("SCRIPT_MAX_TIMEOUT_MS", "0", "must be positive"));
        }
        if scripting.max_timeout_ms >= request_timeout_secs.saturating_mul(1000) {
            return Err(ConfigError::invalid(
                "SCRIPT_MAX_TIMEOUT_MS",
                &scripting.max_timeout_ms.to_string(),
                "must be below REQUEST_TIMEOUT_SECS",
            ));
        }
        if scripting.default_timeout_ms > scripting.max_timeout_ms {
            return Err(ConfigError::invalid(
                "SCRIPT_DEFAULT_TIMEOUT_MS",
                &scripting.default_timeout_ms.to_string(),
                "exceeds SCRIPT_MAX_TIMEOUT_MS",
            ));
        }

        Ok(Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            database_url,
            scripting,
        })
    }
}

fn parse<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| ConfigError::invalid(key, raw, e))
}

fn parse_languages(raw: &str) -> Result<Vec<ScriptLanguage>, ConfigError> {
    let mut languages = Vec::new();
    for tag in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let language: ScriptLanguage = parse("SCRIPT_LANGUAGES", tag)?;
        if !languages.contains(&language) {
            languages.push(language);
        }
    }
    if languages.is_empty() {
        return Err(ConfigError::invalid(
            "SCRIPT_LANGUAGES",
            raw,
            "at least one language is required",
        ));
    }
    Ok(languages)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let config = load(&[]).expect("defaults");
        assert_eq!(config.port, 3000);
        assert_eq!(config.cors_origins, vec!["http://localhost:5173"]);
        assert!(config.database_url.is_none());
        assert!(config.scripting.default_active);
        assert_eq!(config.scripting.languages, ScriptLanguage::ALL.to_vec());
        assert_eq!(config.scripting.engines.python_bin, "python3");
    }

    #[test]
    fn reads_scripting_overrides() {
        let config = load(&[
            ("SCRIPTS_DEFAULT_ACTIVE", "false"),
            ("SCRIPT_LANGUAGES", "lua, sh,lua"),
            ("PYTHON_BIN", "/usr/bin/python3.12"),
            ("DATABASE_URL", "postgres://localhost/scriptd"),
        ])
        .expect("valid");
        assert!(!config.scripting.default_active);
        assert_eq!(
            config.scripting.languages,
            vec![ScriptLanguage::Lua, ScriptLanguage::Shell]
        );
        assert_eq!(config.scripting.engines.python_bin, "/usr/bin/python3.12");
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/scriptd")
        );
    }

    #[test]
    fn rejects_bad_values() {
        let err = load(&[("PORT", "http")]).unwrap_err();
        assert!(err.to_string().starts_with("PORT has invalid value 'http'"));

        assert!(load(&[("SCRIPT_LANGUAGES", "lua,cobol")]).is_err());
        assert!(load(&[("SCRIPT_LANGUAGES", " , ")]).is_err());
        assert!(load(&[("SCRIPTS_DEFAULT_ACTIVE", "maybe")]).is_err());
        assert!(load(&[("SCRIPT_DEFAULT_TIMEOUT_MS", "90000")]).is_err());
    }

    #[test]
    fn run_budget_must_fit_inside_request_timeout() {
        let err = load(&[("SCRIPT_MAX_TIMEOUT_MS", "45000")]).unwrap_err();
        assert!(err.to_string().starts_with("SCRIPT_MAX_TIMEOUT_MS"));
        assert!(load(&[("SCRIPT_MAX_TIMEOUT_MS", "30000")]).is_err());

        let config = load(&[
            ("SCRIPT_MAX_TIMEOUT_MS", "45000"),
            ("REQUEST_TIMEOUT_SECS", "60"),
        ])
        .expect("fits");
        assert_eq!(config.scripting.max_timeout_ms, 45_000);
    }

    #[test]
    fn run_timeout_is_clamped() {
        let scripting = ScriptingConfig::default();
        assert_eq!(scripting.run_timeout(None), Duration::from_millis(5_000));
        assert_eq!(scripting.run_timeout(Some(250)), Duration::from_millis(250));
        assert_eq!(
            scripting.run_timeout(Some(10_000_000)),
            Duration::from_millis(25_000)
        );
        assert_eq!(scripting.run_timeout(Some(0)), Duration::from_millis(1));
    }
}
