use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::info;

use crate::codes::{CodeMapping, CodeTable};
use crate::defaults::DEFAULT_SCHEME;
use crate::ExtractionRequest;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write config `{path}`: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("config `{path}` is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("config is missing `{key}`")]
    MissingKey { key: &'static str },
}

/// Flat JSON settings shared with the desktop tools that edit the same file.
///
/// Every key is optional. Keys this type does not know are kept in `extra` and written back
/// unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    pub host: String,
    pub scheme: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub watershed_id: Option<String>,
    pub watershed_slug: Option<String>,
    /// A part override for produced pathnames.
    pub apart: Option<String>,
    /// Output store path.
    pub dss: Option<PathBuf>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub after: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub before: Option<OffsetDateTime>,
    pub products: Vec<String>,
    /// Seconds.
    pub timeout: Option<u64>,
    pub codes: BTreeMap<String, CodeMapping>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            scheme: DEFAULT_SCHEME.to_string(),
            token: None,
            watershed_id: None,
            watershed_slug: None,
            apart: None,
            dss: None,
            after: None,
            before: None,
            products: Vec::new(),
            timeout: None,
            codes: BTreeMap::new(),
            extra: BTreeMap::new(),
        }
    }
}

impl ExtractConfig {
    /// Builds the request this configuration describes. Unset window ends keep the request's
    /// default of the last seven days.
    pub fn to_request(&self) -> Result<ExtractionRequest, ConfigError> {
        let slug = self
            .watershed_slug
            .as_deref()
            .filter(|slug| !slug.trim().is_empty())
            .ok_or(ConfigError::MissingKey {
                key: "watershed_slug",
            })?;

        let mut request = ExtractionRequest::new(&self.host, slug)
            .scheme(&self.scheme)
            .products(self.products.iter().cloned());
        if let Some(token) = &self.token {
            request = request.token(token);
        }
        if let Some(id) = &self.watershed_id {
            request = request.watershed_id(id);
        }
        if let Some(apart) = &self.apart {
            request = request.location(apart);
        }
        if let Some(timeout) = self.timeout {
            request = request.timeout(Duration::from_secs(timeout));
        }
        let after = self.after.unwrap_or(request.after);
        let before = self.before.unwrap_or(request.before);
        Ok(request.window(after, before))
    }

    /// The built-in code table with this file's `codes` laid over it.
    pub fn code_table(&self) -> CodeTable {
        let mut table = CodeTable::builtin();
        table.extend(self.codes.clone());
        table
    }
}

/// A configuration file on disk.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: PathBuf,
}

impl ConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the file, first creating it with the default document when it does not exist.
    pub fn read(&self) -> Result<ExtractConfig, ConfigError> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                let config = ExtractConfig::default();
                self.write(&config)?;
                info!(path = %self.path.display(), "created new configuration file");
                return Ok(config);
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        serde_json::from_slice(&raw).map_err(|source| ConfigError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Writes `config` as indented JSON, creating parent directories as needed.
    pub fn write(&self, config: &ExtractConfig) -> Result<(), ConfigError> {
        let mut rendered = serde_json::to_vec_pretty(config).map_err(ConfigError::Serialize)?;
        rendered.push(b'\n');
        let write_err = |source| ConfigError::Write {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        fs::write(&self.path, rendered).map_err(write_err)
    }

    /// Read-modify-write.
    pub fn update<F>(&self, edit: F) -> Result<ExtractConfig, ConfigError>
    where
        F: FnOnce(&mut ExtractConfig),
    {
        let mut config = self.read()?;
        edit(&mut config);
        self.write(&config)?;
        Ok(config)
    }
}
