//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `MACROLENS_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `MACROLENS_` override YAML values
//! 3. **GEMINI_API_KEY** - Special case: overrides `inference.api_key` if set
//! 4. **PORT** - Special case: overrides `port` if set
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `MACROLENS_INFERENCE__MODEL=gemini-1.5-pro` sets the `inference.model` field.
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! # The inference credential (required)
//! GEMINI_API_KEY="..."
//!
//! # Override server port
//! PORT=8080
//!
//! # Override nested values
//! MACROLENS_INFERENCE__STRUCTURED_OUTPUT=false
//! MACROLENS_UPLOADS__MAX_FILE_SIZE=5242880
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};
use url::Url;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "MACROLENS_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    /// Useful for CI/CD pipelines to catch config errors before deployment.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// This is the root configuration structure loaded from YAML and environment variables.
/// All fields have defaults defined in the `Default` implementation; only the inference
/// credential has no default and must be supplied.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Outbound inference service configuration
    pub inference: InferenceConfig,
    /// Transient upload spooling configuration
    pub uploads: UploadsConfig,
    /// CORS configuration for browser clients
    pub cors: CorsConfig,
}

/// Outbound inference service configuration.
///
/// Credentials should be set via the `GEMINI_API_KEY` environment variable rather
/// than committed to the config file.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct InferenceConfig {
    /// API key for the inference service. Startup fails if this is unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Base URL of the inference API. Overridable so tests can point at a mock server.
    pub base_url: Url,
    /// Model name sent in the request path
    pub model: String,
    /// Bounded timeout for the outbound call. The upstream service gives no
    /// latency guarantee, so an unset timeout would hang the request with it.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Ask the service for schema-constrained JSON output instead of free text.
    /// Disabling this falls back to prompt-only JSON coercion, which is fragile.
    pub structured_output: bool,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: Url::parse("https://generativelanguage.googleapis.com").unwrap(),
            model: "gemini-1.5-flash-latest".to_string(),
            timeout: Duration::from_secs(30),
            structured_output: true,
        }
    }
}

/// Transient upload configuration.
///
/// Each request spools its uploaded file under `dir` with a unique name and removes
/// it before responding. The directory is created at startup if missing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadsConfig {
    /// Directory where per-request temp files are written
    pub dir: PathBuf,
    /// Maximum upload size in bytes. Checked incrementally while streaming
    /// so oversized uploads fail fast. Default: 10MB
    pub max_file_size: u64,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("uploads"),
            max_file_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// CORS (Cross-Origin Resource Sharing) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins for CORS requests
    pub allowed_origins: Vec<CorsOrigin>,
    /// Cache preflight requests for this many seconds
    pub max_age: Option<u64>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            // The relay is consumed by arbitrary frontends, so CORS is open
            // unless a deployment narrows it.
            allowed_origins: vec![CorsOrigin::Wildcard],
            max_age: Some(3600),
        }
    }
}

/// CORS origin specification.
///
/// Can be either a wildcard (`*`) to allow all origins, or a specific URL.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    /// Allow all origins (`*`)
    #[serde(deserialize_with = "parse_wildcard")]
    Wildcard,
    /// Specific origin URL (e.g., `https://app.example.com`)
    #[serde(deserialize_with = "parse_url")]
    Url(Url),
}

fn parse_wildcard<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s == "*" {
        Ok(())
    } else {
        Err(serde::de::Error::custom("Expected '*'"))
    }
}

fn parse_url<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Url::parse(&s).map_err(serde::de::Error::custom)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            inference: InferenceConfig::default(),
            uploads: UploadsConfig::default(),
            cors: CorsConfig::default(),
        }
    }
}

impl Config {
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let mut config: Self = Self::figment(args).extract()?;

        // GEMINI_API_KEY takes precedence over anything in the config file,
        // matching how the credential is conventionally deployed
        if let Ok(key) = std::env::var("GEMINI_API_KEY")
            && !key.is_empty()
        {
            config.inference.api_key = Some(key);
        }

        // Bare PORT is honored for platform compatibility (Heroku-style runtimes set it)
        if let Ok(port) = std::env::var("PORT")
            && let Ok(port) = port.parse::<u16>()
        {
            config.port = port;
        }

        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    fn figment(args: &Args) -> Figment {
        Figment::new()
            .merge(Yaml::file(&args.config))
            .merge(Env::prefixed("MACROLENS_").split("__"))
    }

    /// Validate the configuration before the server starts.
    ///
    /// Refusing to start without a credential is deliberate: every request would
    /// otherwise fail at the upstream call with a confusing auth error.
    pub fn validate(&self) -> anyhow::Result<()> {
        match self.inference.api_key.as_deref() {
            None | Some("") => anyhow::bail!(
                "inference.api_key is not set; provide it via the GEMINI_API_KEY environment variable"
            ),
            Some(_) => {}
        }
        if self.uploads.max_file_size == 0 {
            anyhow::bail!("uploads.max_file_size must be greater than zero");
        }
        Ok(())
    }

    /// Full bind address for the HTTP listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
