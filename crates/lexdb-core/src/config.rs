//! Lightweight configuration loader, store settings and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars.
//! The `store` section deserializes into [`StoreSettings`].

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::types::{DuplicatePolicy, DEFAULT_NAMESPACE};

const URL_SCHEME: &str = "redb://";
const IN_MEMORY: &str = ":memory:";

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new()
            .merge(Serialized::defaults(SettingsFile::default()))
            .merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.validate_for_env(&env_name)?;
        Ok(config)
    }

    pub fn from_figment(figment: Figment) -> Self { Self { figment } }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    pub fn store_settings(&self) -> anyhow::Result<StoreSettings> {
        let settings: StoreSettings = self.get("store")?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate_for_env(&self, env: &str) -> anyhow::Result<()> {
        if matches!(env, "prod" | "production") {
            let settings = self.store_settings()?;
            if matches!(settings.target()?, StoreTarget::InMemory) {
                return Err(anyhow::anyhow!("Prod config must use an on-disk store, got '{}'", settings.url));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default, Serialize)]
struct SettingsFile {
    store: StoreSettings,
}

/// Settings for opening a document store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreSettings {
    /// `redb://:memory:` or `redb://<directory>`.
    pub url: String,
    /// Namespace used when a call does not name one.
    pub namespace: String,
    pub duplicate_documents: DuplicatePolicy,
    /// Rows per materializer page.
    pub batch_size: usize,
    /// Memory budget of the ranking index writer.
    pub writer_memory_bytes: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            url: format!("{}{}", URL_SCHEME, IN_MEMORY),
            namespace: DEFAULT_NAMESPACE.to_string(),
            duplicate_documents: DuplicatePolicy::Overwrite,
            batch_size: 10_000,
            writer_memory_bytes: 50_000_000,
        }
    }
}

impl StoreSettings {
    pub fn in_memory() -> Self { Self::default() }

    pub fn on_disk(dir: &Path) -> Self {
        Self { url: format!("{}{}", URL_SCHEME, dir.display()), ..Self::default() }
    }

    pub fn validate(&self) -> Result<(), Error> {
        self.target()?;
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be positive".into()));
        }
        if self.namespace.is_empty() {
            return Err(Error::InvalidConfig("namespace must not be empty".into()));
        }
        // tantivy refuses writer budgets below 15MB
        if self.writer_memory_bytes < 15_000_000 {
            return Err(Error::InvalidConfig(format!("writer_memory_bytes too small: {}", self.writer_memory_bytes)));
        }
        Ok(())
    }

    pub fn target(&self) -> Result<StoreTarget, Error> { StoreTarget::parse(&self.url) }
}

/// Where the document table and ranking index live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreTarget {
    InMemory,
    Directory(PathBuf),
}

impl StoreTarget {
    pub fn parse(url: &str) -> Result<Self, Error> {
        let rest = url
            .strip_prefix(URL_SCHEME)
            .ok_or_else(|| Error::InvalidConfig(format!("store url must start with '{}', got '{}'", URL_SCHEME, url)))?;
        match rest {
            "" => Err(Error::InvalidConfig(format!("store url '{}' names no location", url))),
            IN_MEMORY => Ok(StoreTarget::InMemory),
            path => Ok(StoreTarget::Directory(expand_path(path))),
        }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
