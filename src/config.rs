//! Configuration loading.
//!
//! Configuration is an opaque JSON mapping produced by a [`ConfigLoader`].
//! The [`Config`] facade picks the first loader that accepts a source,
//! memoizes what it loaded and answers dotted-path lookups against it.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::cache::MemoStore;
use crate::error::{DiError, DiResult};

/// Loaded configuration: a JSON object.
pub type ConfigMap = serde_json::Map<String, Value>;

/// Source of configuration mappings.
#[async_trait]
pub trait ConfigLoader: Send + Sync {
    /// Returns true if this loader understands `source`.
    fn can_load(&self, source: &str) -> bool;

    /// Reads `source` into a mapping.
    async fn load(&self, source: &str) -> DiResult<ConfigMap>;
}

/// Reads `*.json` files from disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonFileLoader;

#[async_trait]
impl ConfigLoader for JsonFileLoader {
    fn can_load(&self, source: &str) -> bool {
        Path::new(source)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
    }

    async fn load(&self, source: &str) -> DiResult<ConfigMap> {
        let invalid = |message: String| DiError::Config {
            source_name: source.to_string(),
            message,
        };

        let text = tokio::fs::read_to_string(source)
            .await
            .map_err(|err| invalid(err.to_string()))?;
        match serde_json::from_str::<Value>(&text).map_err(|err| invalid(err.to_string()))? {
            Value::Object(map) => {
                tracing::debug!(source, keys = map.len(), "configuration loaded");
                Ok(map)
            }
            other => Err(invalid(format!(
                "expected a JSON object at the top level, found {}",
                json_kind(&other)
            ))),
        }
    }
}

/// Serves a fixed mapping under one source name.
#[derive(Debug, Clone)]
pub struct StaticLoader {
    name: String,
    values: ConfigMap,
}

impl StaticLoader {
    pub fn new(name: impl Into<String>, values: ConfigMap) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Builds the mapping from a `serde_json::json!` object literal.
    ///
    /// Non-object values yield an empty mapping.
    pub fn from_value(name: impl Into<String>, value: Value) -> Self {
        let values = match value {
            Value::Object(map) => map,
            _ => ConfigMap::new(),
        };
        Self::new(name, values)
    }
}

#[async_trait]
impl ConfigLoader for StaticLoader {
    fn can_load(&self, source: &str) -> bool {
        source == self.name
    }

    async fn load(&self, _source: &str) -> DiResult<ConfigMap> {
        Ok(self.values.clone())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Configuration facade over a list of loaders.
///
/// Loaders are consulted in registration order. Each source is loaded at
/// most once until [`reload`](Config::reload) is called; concurrent first
/// reads share one load.
///
/// ```
/// use ferrous_container::config::{Config, StaticLoader};
/// use serde_json::json;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> ferrous_container::DiResult<()> {
/// let config = Config::new().with_loader(StaticLoader::from_value(
///     "app",
///     json!({ "server": { "port": 8080 } }),
/// ));
///
/// let port: Option<u16> = config.get("app", "server.port").await?;
/// assert_eq!(port, Some(8080));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct Config {
    loaders: Vec<Arc<dyn ConfigLoader>>,
    loaded: MemoStore<String, Arc<ConfigMap>>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_loader<L: ConfigLoader + 'static>(mut self, loader: L) -> Self {
        self.add_loader(Arc::new(loader));
        self
    }

    pub fn add_loader(&mut self, loader: Arc<dyn ConfigLoader>) {
        self.loaders.push(loader);
    }

    pub fn loader_count(&self) -> usize {
        self.loaders.len()
    }

    /// Loads `source`, or returns the mapping loaded earlier.
    pub async fn load(&self, source: &str) -> DiResult<Arc<ConfigMap>> {
        let loader = self
            .loaders
            .iter()
            .find(|loader| loader.can_load(source))
            .cloned()
            .ok_or_else(|| DiError::NoConfigLoader(source.to_string()))?;

        let owned = source.to_string();
        self.loaded
            .try_remember(source.to_string(), Duration::ZERO, move || async move {
                loader.load(&owned).await.map(Arc::new)
            })
            .await
    }

    /// Drops the memoized mapping for `source` and loads it again.
    pub async fn reload(&self, source: &str) -> DiResult<Arc<ConfigMap>> {
        self.loaded.remove(&source.to_string());
        tracing::debug!(source, "configuration reload requested");
        self.load(source).await
    }

    pub fn is_loaded(&self, source: &str) -> bool {
        self.loaded.has(&source.to_string())
    }

    /// Looks up a dotted `path` in `source` and deserializes it.
    ///
    /// A missing path is `Ok(None)`; a value of the wrong shape is
    /// [`DiError::Config`].
    pub async fn get<T: DeserializeOwned>(&self, source: &str, path: &str) -> DiResult<Option<T>> {
        let map = self.load(source).await?;
        let Some(value) = lookup(&map, path) else {
            return Ok(None);
        };
        T::deserialize(value)
            .map(Some)
            .map_err(|err| DiError::Config {
                source_name: source.to_string(),
                message: format!("{path}: {err}"),
            })
    }

    /// Like [`get`](Self::get), falling back to `default` when the path is
    /// missing.
    pub async fn get_or<T: DeserializeOwned>(
        &self,
        source: &str,
        path: &str,
        default: T,
    ) -> DiResult<T> {
        Ok(self.get(source, path).await?.unwrap_or(default))
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("loaders", &self.loaders.len())
            .field("loaded", &self.loaded.len())
            .finish()
    }
}

fn lookup<'a>(map: &'a ConfigMap, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = map.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(inner) => inner.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}
