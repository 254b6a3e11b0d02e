//! # Engine Configuration
//!
//! [`EngineConfig`] is read from a YAML or TOML file (chosen by extension)
//! and then overlaid with environment variables:
//!
//! | variable                | field             |
//! |-------------------------|-------------------|
//! | `BRRTD_DETAILED_ERRORS` | `detailed_errors` |
//! | `BRRTD_DEFAULT_OUTPUT`  | `default_output`  |
//!
//! ```yaml
//! detailed_errors: false
//! default_output: json
//! output_overrides:
//!   Reports::export: csv
//! content_type_overrides:
//!   application/vnd.api+json: json
//! static_dir: ./public
//! cors:
//!   allowed_origins: ["https://app.example.com"]
//!   allowed_methods: ["GET", "POST"]
//!   max_age: 600
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use http::Method;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::middleware::{CorsConfigError, CorsMiddleware, CorsMiddlewareBuilder};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Include private messages, metadata and cause traces in error bodies.
    pub detailed_errors: bool,
    /// Processor used when a route does not name one.
    pub default_output: Option<String>,
    /// operationId -> processor name, for schema-derived routes
    pub output_overrides: HashMap<String, String>,
    /// mime -> processor name, for schema-derived routes
    pub content_type_overrides: HashMap<String, String>,
    /// Serve files from this directory for unmatched GET/HEAD requests.
    pub static_dir: Option<PathBuf>,
    pub cors: Option<CorsConfig>,
}

/// Declarative form of [`CorsMiddlewareBuilder`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub origin_patterns: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub allow_credentials: bool,
    pub expose_headers: Vec<String>,
    pub max_age: Option<u32>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            origin_patterns: Vec::new(),
            allowed_methods: ["GET", "POST", "PUT", "DELETE", "OPTIONS"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            allowed_headers: vec!["Content-Type".into(), "Authorization".into()],
            allow_credentials: false,
            expose_headers: Vec::new(),
            max_age: None,
        }
    }
}

fn strs(v: &[String]) -> Vec<&str> {
    v.iter().map(String::as_str).collect()
}

impl CorsConfig {
    pub fn build(&self) -> Result<CorsMiddleware, CorsConfigError> {
        let methods = self
            .allowed_methods
            .iter()
            .map(|m| {
                Method::from_bytes(m.to_ascii_uppercase().as_bytes())
                    .map_err(|_| CorsConfigError::InvalidMethod { method: m.clone() })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let mut builder = CorsMiddlewareBuilder::new()
            .allowed_origins(&strs(&self.allowed_origins))
            .origin_patterns(&strs(&self.origin_patterns))
            .allowed_methods(&methods)
            .allowed_headers(&strs(&self.allowed_headers))
            .allow_credentials(self.allow_credentials)
            .expose_headers(&strs(&self.expose_headers));
        if let Some(max_age) = self.max_age {
            builder = builder.max_age(max_age);
        }
        builder.build()
    }
}

fn parse_bool(name: &str, value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("{name}: expected a boolean, got '{other}'"),
    }
}

impl EngineConfig {
    /// Load from `.yaml`/`.yml` or `.toml`.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        let config = match ext.as_str() {
            "yaml" | "yml" => serde_yaml::from_str(&content)
                .with_context(|| format!("parsing YAML config {}", path.display()))?,
            "toml" => toml::from_str(&content)
                .with_context(|| format!("parsing TOML config {}", path.display()))?,
            other => bail!("unsupported config format '{other}' for {}", path.display()),
        };
        debug!(config = %path.display(), "Engine config loaded");
        Ok(config)
    }

    /// Overlay `BRRTD_*` environment variables.
    pub fn apply_env(&mut self) -> anyhow::Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Overlay values from `lookup`, which maps variable names to values.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("BRRTD_DETAILED_ERRORS") {
            self.detailed_errors = parse_bool("BRRTD_DETAILED_ERRORS", &v)?;
        }
        if let Some(v) = lookup("BRRTD_DEFAULT_OUTPUT") {
            let v = v.trim();
            self.default_output = (!v.is_empty()).then(|| v.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_yaml_and_toml() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = dir.path().join("engine.yaml");
        std::fs::write(
            &yaml,
            "detailed_errors: true\ndefault_output: xml\noutput_overrides:\n  Reports::export: csv\n",
        )
        .unwrap();
        let config = EngineConfig::from_file(&yaml).unwrap();
        assert!(config.detailed_errors);
        assert_eq!(config.default_output.as_deref(), Some("xml"));
        assert_eq!(config.output_overrides["Reports::export"], "csv");

        let toml_path = dir.path().join("engine.toml");
        std::fs::write(
            &toml_path,
            "static_dir = \"public\"\n[cors]\nallowed_origins = [\"https://a.example\"]\nmax_age = 60\n",
        )
        .unwrap();
        let config = EngineConfig::from_file(&toml_path).unwrap();
        assert_eq!(config.static_dir, Some(PathBuf::from("public")));
        let cors = config.cors.unwrap();
        assert_eq!(cors.max_age, Some(60));
        assert_eq!(cors.allowed_methods.len(), 5);
        assert!(cors.build().is_ok());
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.ini");
        std::fs::write(&path, "").unwrap();
        assert!(EngineConfig::from_file(&path).is_err());
    }

    #[test]
    fn env_overrides() {
        let mut config = EngineConfig::default();
        config
            .apply_overrides(|name| match name {
                "BRRTD_DETAILED_ERRORS" => Some("yes".into()),
                "BRRTD_DEFAULT_OUTPUT" => Some("yaml".into()),
                _ => None,
            })
            .unwrap();
        assert!(config.detailed_errors);
        assert_eq!(config.default_output.as_deref(), Some("yaml"));

        let err = config
            .apply_overrides(|_| Some("maybe".into()))
            .unwrap_err();
        assert!(err.to_string().contains("BRRTD_DETAILED_ERRORS"));
    }

    #[test]
    fn bad_cors_method() {
        let cors = CorsConfig {
            allowed_methods: vec!["G E T".into()],
            ..CorsConfig::default()
        };
        assert!(matches!(cors.build(), Err(CorsConfigError::InvalidMethod { .. })));
    }
}
