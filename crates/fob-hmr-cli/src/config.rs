//! Server configuration with multi-source loading.
//!
//! Priority: CLI flags > `FOB_HMR_*` environment > config file > defaults.

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format as _, Json, Serialized},
};
use serde::{Deserialize, Serialize};

use crate::cli::ServeArgs;
use crate::error::{ConfigError, Result};

/// Config file looked up in the project root when `--config` is not given.
pub const CONFIG_FILE_NAME: &str = "fob-hmr.config.json";

/// Environment variable prefix, e.g. `FOB_HMR_PORT=9000`.
pub const ENV_PREFIX: &str = "FOB_HMR_";

/// HMR server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HmrServerConfig {
    /// Project root. Watched recursively; entry files resolve against it.
    pub root: PathBuf,

    pub host: String,

    pub port: u16,

    /// Repeated changes to the same file within this window are dropped.
    pub debounce_ms: u64,

    /// Watch ignore patterns: directory names (`node_modules`) or extension
    /// globs (`*.log`). Hidden files are always ignored.
    pub watch_ignore: Vec<String>,

    /// Extensions tried when resolving extension-less specifiers.
    pub extensions: Vec<String>,
}

impl Default for HmrServerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            host: "localhost".to_string(),
            port: 8081,
            debounce_ms: 50,
            watch_ignore: vec![
                "node_modules".to_string(),
                "dist".to_string(),
                "target".to_string(),
                "*.log".to_string(),
            ],
            extensions: [".js", ".jsx", ".mjs", ".cjs", ".ts", ".tsx", ".json"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Values given on the command line. Unset flags are left out so they don't
/// shadow lower-priority sources.
#[derive(Serialize)]
struct CliOverrides<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    root: Option<&'a Path>,
    #[serde(skip_serializing_if = "Option::is_none")]
    host: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    debounce_ms: Option<u64>,
}

impl<'a> From<&'a ServeArgs> for CliOverrides<'a> {
    fn from(args: &'a ServeArgs) -> Self {
        Self {
            root: args.root.as_deref(),
            host: args.host.as_deref(),
            port: args.port,
            debounce_ms: args.debounce_ms,
        }
    }
}

impl HmrServerConfig {
    /// Load, normalize and validate the configuration for `serve`.
    pub fn load(args: &ServeArgs) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));

        if let Some(path) = Self::config_file(args)? {
            tracing::debug!(path = %path.display(), "Loading config file");
            figment = figment.merge(Json::file(path));
        }

        figment = figment
            .merge(Env::prefixed(ENV_PREFIX))
            .merge(Serialized::defaults(CliOverrides::from(args)));

        let mut config: Self = figment
            .extract()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        config.root = absolutize(&config.root)?;
        config.validate()?;
        Ok(config)
    }

    /// Explicit `--config` must exist; the default file is optional.
    fn config_file(args: &ServeArgs) -> Result<Option<PathBuf>> {
        if let Some(path) = &args.config {
            if !path.is_file() {
                return Err(ConfigError::NotFound(path.clone()).into());
            }
            return Ok(Some(path.clone()));
        }

        let root = args.root.clone().unwrap_or_else(|| PathBuf::from("."));
        let default_path = root.join(CONFIG_FILE_NAME);
        Ok(default_path.is_file().then_some(default_path))
    }

    pub fn validate(&self) -> Result<()> {
        if !self.root.is_dir() {
            return Err(ConfigError::InvalidValue {
                field: "root".to_string(),
                value: self.root.display().to_string(),
                hint: "The project root must be an existing directory".to_string(),
            }
            .into());
        }

        if self.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "port".to_string(),
                value: "0".to_string(),
                hint: "Use a port between 1 and 65535".to_string(),
            }
            .into());
        }

        if self.host.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "host".to_string(),
                value: String::new(),
                hint: "Use a host name or IP address, e.g. localhost".to_string(),
            }
            .into());
        }

        if self.extensions.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "extensions".to_string(),
                value: "[]".to_string(),
                hint: "List at least one extension, e.g. [\".js\"]".to_string(),
            }
            .into());
        }

        if let Some(bad) = self.extensions.iter().find(|ext| !ext.starts_with('.')) {
            return Err(ConfigError::InvalidValue {
                field: "extensions".to_string(),
                value: bad.clone(),
                hint: "Extensions start with a dot, e.g. \".tsx\"".to_string(),
            }
            .into());
        }

        Ok(())
    }

    /// Settings the HMR service needs for building `sourceURLs`.
    pub fn hmr_config(&self) -> fob_hmr::HmrConfig {
        fob_hmr::HmrConfig::new(self.host.clone(), self.port)
    }

    /// `host:port` string suitable for address lookup.
    pub fn listen_target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn server_url(&self) -> String {
        let hmr = self.hmr_config();
        format!("ws://{}:{}/hot", hmr.public_host(), self.port)
    }
}

fn absolutize(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Ok(path_clean::clean(absolute))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    fn args_for(root: &Path) -> ServeArgs {
        ServeArgs {
            root: Some(root.to_path_buf()),
            ..Default::default()
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        let temp = TempDir::new().unwrap();
        let config = HmrServerConfig::load(&args_for(temp.path())).unwrap();

        assert_eq!(config.port, 8081);
        assert_eq!(config.host, "localhost");
        assert!(config.root.is_absolute());
        assert!(config.watch_ignore.contains(&"node_modules".to_string()));
    }

    #[test]
    #[serial]
    fn test_config_file_then_cli() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join(CONFIG_FILE_NAME),
            r#"{ "port": 9000, "debounce_ms": 10, "extensions": [".js"] }"#,
        )
        .unwrap();

        let config = HmrServerConfig::load(&args_for(temp.path())).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.debounce_ms, 10);
        assert_eq!(config.extensions, vec![".js".to_string()]);

        let mut args = args_for(temp.path());
        args.port = Some(9100);
        let config = HmrServerConfig::load(&args).unwrap();
        assert_eq!(config.port, 9100);
        assert_eq!(config.debounce_ms, 10);
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(CONFIG_FILE_NAME), r#"{ "port": 9000 }"#).unwrap();

        unsafe {
            std::env::set_var("FOB_HMR_PORT", "9200");
        }
        let result = HmrServerConfig::load(&args_for(temp.path()));
        unsafe {
            std::env::remove_var("FOB_HMR_PORT");
        }

        assert_eq!(result.unwrap().port, 9200);
    }

    #[test]
    #[serial]
    fn test_missing_explicit_config() {
        let temp = TempDir::new().unwrap();
        let mut args = args_for(temp.path());
        args.config = Some(temp.path().join("nope.json"));

        let err = HmrServerConfig::load(&args).unwrap_err();
        assert!(matches!(
            err,
            crate::error::CliError::Config(ConfigError::NotFound(_))
        ));
    }

    #[test]
    #[serial]
    fn test_unknown_field_rejected() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(CONFIG_FILE_NAME), r#"{ "prot": 9000 }"#).unwrap();

        let err = HmrServerConfig::load(&args_for(temp.path())).unwrap_err();
        assert!(matches!(
            err,
            crate::error::CliError::Config(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_validation() {
        let temp = TempDir::new().unwrap();
        let valid = HmrServerConfig {
            root: temp.path().to_path_buf(),
            ..Default::default()
        };
        assert!(valid.validate().is_ok());

        let bad_port = HmrServerConfig {
            port: 0,
            ..valid.clone()
        };
        assert!(bad_port.validate().is_err());

        let no_extensions = HmrServerConfig {
            extensions: vec![],
            ..valid.clone()
        };
        assert!(no_extensions.validate().is_err());

        let bad_extension = HmrServerConfig {
            extensions: vec!["js".to_string()],
            ..valid.clone()
        };
        assert!(bad_extension.validate().is_err());

        let missing_root = HmrServerConfig {
            root: temp.path().join("missing"),
            ..valid
        };
        assert!(missing_root.validate().is_err());
    }

    #[test]
    fn test_urls_for_wildcard_host() {
        let config = HmrServerConfig {
            host: "0.0.0.0".to_string(),
            port: 9090,
            ..Default::default()
        };
        assert_eq!(config.listen_target(), "0.0.0.0:9090");
        assert_eq!(config.server_url(), "ws://localhost:9090/hot");
        assert_eq!(config.hmr_config().public_host(), "localhost");
    }
}
