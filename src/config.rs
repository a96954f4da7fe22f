use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rules::RuleTable;
use crate::xml::{ns, qname};

/// Application-level constants
pub const APP_NAME: &str = "qmstamp";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// OSLC headers sent with every request to the QM server.
pub const OSLC_CORE_VERSION: (&str, &str) = ("OSLC-Core-Version", "2.0");
pub const ACCEPT_XML: &str = "application/xml";
pub const CONTENT_TYPE_RDF: &str = "application/rdf+xml";

/// Overrides the configured server URL.
pub const BASE_URL_ENV: &str = "QMSTAMP_BASE_URL";
/// Points at a JSON configuration file.
pub const CONFIG_PATH_ENV: &str = "QMSTAMP_CONFIG";

/// Default `tracing` filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "qmstamp=info,warn"
}

/// ~/.qmstamp/
pub fn app_data_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".qmstamp"))
}

pub fn default_config_path() -> Option<PathBuf> {
    app_data_dir().map(|dir| dir.join("config.json"))
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Server endpoints, RDF keys and classification vocabularies.
///
/// Category identifiers are project-specific; the UUID tables must be filled
/// in from the QM project area before updates can be pushed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QmConfig {
    /// Server root, e.g. `https://qm.example.com/qm`.
    pub base_url: String,
    /// Project area used when building resource URLs.
    pub project_area: String,
    /// Qualified key of the test case's ASIL category element.
    pub asil_category_key: String,
    /// Qualified key of the test case's Security category element.
    pub security_category_key: String,
    /// Qualified key of the test case's approval-state element.
    pub state_key: String,
    /// Qualified key of the requirement's ASIL attribute.
    pub requirement_asil_key: String,
    /// Qualified key of the requirement's category attribute.
    pub requirement_category_key: String,
    /// URL prefix of category term resources.
    pub term: String,
    /// ASIL value → category value UUID.
    pub asil_uuids: BTreeMap<String, String>,
    /// Security classification → category value UUID.
    pub security_uuids: BTreeMap<String, String>,
    /// Approval state value that marks a test case as approved.
    pub approved_state: String,
    /// State resource assigned to approved test cases whose classification
    /// changes. `None` leaves the state alone.
    pub new_state: Option<String>,
    pub rules: RuleTable,
}

impl Default for QmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://localhost:9443/qm".into(),
            project_area: String::new(),
            asil_category_key: qname(ns::RQM, "category_723hYsvQEeWQV8qCNxbd3g"),
            security_category_key: qname(ns::RQM, "category__9K0EV8pEe25Tv9E4OgVfQ"),
            state_key: qname(ns::PROCESS, "state"),
            requirement_asil_key: qname("http://jazz.net/ns/rm/dng/attribute#", "ASIL"),
            requirement_category_key: qname("http://jazz.net/ns/rm/dng/attribute#", "Category"),
            term: String::new(),
            asil_uuids: BTreeMap::new(),
            security_uuids: BTreeMap::new(),
            approved_state: "approved".into(),
            new_state: None,
            rules: RuleTable::default(),
        }
    }
}

impl QmConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Resolve configuration: `QMSTAMP_CONFIG`, then `~/.qmstamp/config.json`,
    /// then defaults. `QMSTAMP_BASE_URL` wins over any file value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let explicit = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
        let mut config = match explicit {
            Some(path) => Self::load(&path)?,
            None => match default_config_path().filter(|p| p.is_file()) {
                Some(path) => Self::load(&path)?,
                None => Self::default(),
            },
        };

        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            config.base_url = url;
        }
        config.base_url = config.base_url.trim_end_matches('/').to_string();
        Ok(config)
    }

    pub fn is_approved(&self, state: &str) -> bool {
        state.trim().eq_ignore_ascii_case(&self.approved_state)
    }
}
