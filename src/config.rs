//! Layered configuration loading.

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use tracing::info;

use crate::Result;

/// Loads any `Deserialize` configuration struct.
///
/// Sources, later ones overriding earlier ones:
/// 1. `config/default.toml`
/// 2. `config/{env}.toml` (where {env} is RUN_MODE, defaults to "development")
/// 3. `config/local.toml`
/// 4. Environment variables prefixed with `APP__` (`APP__SERVER__PORT=9000`)
///
/// A `.env` file is read first if present.
pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load<T>() -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        dotenvy::dotenv().ok();

        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());
        info!("Loading configuration for environment: {}", run_mode);

        let settings = Config::builder()
            .add_source(File::new("config/default", FileFormat::Toml).required(false))
            .add_source(File::new(&format!("config/{}", run_mode), FileFormat::Toml).required(false))
            .add_source(File::new("config/local", FileFormat::Toml).required(false))
            .add_source(Environment::with_prefix("APP").prefix_separator("__").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Parse configuration from a TOML string, defaults filling the gaps.
    pub fn from_toml<T>(source: &str) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let settings = Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

/// Top-level settings understood by `SchemaApp::configure`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub docs: DocsConfig,
    pub log: LogConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        ConfigLoader::load()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Maximum accepted request body, in bytes.
    pub body_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            body_limit: 2 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DocsConfig {
    pub title: String,
    pub version: String,
    pub description: Option<String>,
    /// Path of the generated OpenAPI JSON.
    pub path: String,
    /// Path of the Scalar UI; `None` disables it.
    pub scalar_path: Option<String>,
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            title: "API".to_string(),
            version: "0.1.0".to_string(),
            description: None,
            path: "/openapi.json".to_string(),
            scalar_path: Some("/scalar".to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directives; `RUST_LOG` takes precedence.
    pub filter: String,
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            ansi: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.addr(), "0.0.0.0:8080");
        assert_eq!(config.docs.path, "/openapi.json");
        assert_eq!(config.docs.scalar_path.as_deref(), Some("/scalar"));
        assert_eq!(config.log.filter, "info");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: AppConfig = ConfigLoader::from_toml(
            r#"
            [server]
            port = 9000

            [docs]
            title = "Users"
            path = "/docs/openapi.json"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.docs.title, "Users");
        assert_eq!(config.docs.version, "0.1.0");
        assert_eq!(config.docs.path, "/docs/openapi.json");
    }
}
