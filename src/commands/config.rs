use crate::Result;
use crate::model::RepositorySlug;
use camino::{Utf8Path, Utf8PathBuf};
use core::time::Duration;
use ohno::{IntoAppError, app_err};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use url::Url;

/// The default configuration TOML content, embedded from `default_config.toml`
pub const DEFAULT_CONFIG_TOML: &str = include_str!("../../default_config.toml");

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "used-by.toml";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Repository (`owner/name`) whose dependents are enumerated
    #[serde(default = "default_repository")]
    pub repository: String,

    /// Package of that repository to list dependents for; empty lists dependents of any package
    #[serde(default = "default_package_id")]
    pub package_id: String,

    /// Package whose component usage is tracked
    #[serde(default = "default_package")]
    pub package: String,

    /// Component whose call sites are extracted
    #[serde(default = "default_component")]
    pub component: String,

    /// Dependents with fewer stars are not scanned
    #[serde(default = "default_min_stars")]
    pub min_stars: u64,

    /// Pause between two dependents pages, in milliseconds
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,

    /// Remaining query quota at or below which requests wait for the quota to reset
    #[serde(default = "default_rate_limit_low_water")]
    pub rate_limit_low_water: u64,

    /// Directory names whose contents are never scanned
    #[serde(default = "default_vendored_dirs")]
    pub vendored_dirs: Vec<String>,

    /// Buffer capacity of the stages that produce repositories
    #[serde(default = "default_max_repositories_in_memory")]
    pub max_repositories_in_memory: usize,

    /// Buffer capacity of the stages that produce files or findings
    #[serde(default = "default_max_files_in_memory")]
    pub max_files_in_memory: usize,

    /// Base URL of the GitHub web site
    #[serde(default = "default_web_url")]
    pub web_url: String,

    /// Base URL of the GitHub API
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

fn default_repository() -> String {
    "mui-org/material-ui".to_string()
}

fn default_package_id() -> String {
    "UGFja2FnZS00NTUzMzAxNTM".to_string()
}

fn default_package() -> String {
    crate::stages::usage_code::DEFAULT_PACKAGE.to_string()
}

fn default_component() -> String {
    crate::stages::usage_code::DEFAULT_COMPONENT.to_string()
}

const fn default_min_stars() -> u64 {
    1
}

const fn default_page_delay_ms() -> u64 {
    3000
}

const fn default_rate_limit_low_water() -> u64 {
    1
}

fn default_vendored_dirs() -> Vec<String> {
    crate::stages::usage_files::DEFAULT_VENDORED_DIRS
        .iter()
        .map(ToString::to_string)
        .collect()
}

const fn default_max_repositories_in_memory() -> usize {
    16 * 8192
}

const fn default_max_files_in_memory() -> usize {
    16 * 1024
}

fn default_web_url() -> String {
    "https://github.com".to_string()
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

impl Config {
    /// Load configuration from `config_path`, or from `used-by.toml` in `base_dir`, or use defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or holds invalid values
    pub fn load(base_dir: &Utf8Path, config_path: Option<&Utf8PathBuf>) -> Result<Self> {
        let (final_path, text) = if let Some(path) = config_path {
            let text = fs::read_to_string(path).into_app_err_with(|| format!("reading configuration file '{path}'"))?;
            (path.clone(), text)
        } else {
            let path = base_dir.join(CONFIG_FILE_NAME);
            match fs::read_to_string(&path) {
                Ok(text) => (path, text),
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
                Err(e) => return Err(e).into_app_err_with(|| format!("reading configuration file '{path}'")),
            }
        };

        let config: Self = toml::from_str(&text).into_app_err_with(|| format!("parsing configuration file '{final_path}'"))?;
        config.validate()?;

        Ok(config)
    }

    /// Write the commented default configuration to `output_path`
    pub fn save_default(output_path: &Utf8Path) -> Result<()> {
        fs::write(output_path, DEFAULT_CONFIG_TOML).into_app_err_with(|| format!("writing default configuration to {output_path}"))?;
        Ok(())
    }

    /// Check that every value is usable
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid setting
    pub fn validate(&self) -> Result<()> {
        let _ = self.repository_slug()?;

        if self.package.trim().is_empty() {
            return Err(app_err!("package must not be empty"));
        }

        if self.component.trim().is_empty() {
            return Err(app_err!("component must not be empty"));
        }

        if self.max_repositories_in_memory == 0 {
            return Err(app_err!("max_repositories_in_memory must be at least 1"));
        }

        if self.max_files_in_memory == 0 {
            return Err(app_err!("max_files_in_memory must be at least 1"));
        }

        for (name, value) in [("web_url", &self.web_url), ("api_url", &self.api_url)] {
            let _ = Url::parse(value).into_app_err_with(|| format!("{name} '{value}' is not a valid URL"))?;
        }

        Ok(())
    }

    pub fn repository_slug(&self) -> Result<RepositorySlug> {
        self.repository.parse()
    }

    /// The package id, or `None` when dependents of every package are wanted.
    #[must_use]
    pub fn package_id(&self) -> Option<&str> {
        Some(self.package_id.as_str()).filter(|id| !id.is_empty())
    }

    #[must_use]
    pub const fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG_TOML).expect("default_config.toml should be valid TOML that deserializes to Config")
    }
}
